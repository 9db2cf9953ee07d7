use std::{
	fmt,
	thread::{self, ThreadId},
};

use super::error::PreconditionError;

/// Decides whether the calling thread may touch the coordinator.
pub trait ThreadAffinity: Send + Sync + fmt::Debug + 'static {
	fn check(&self) -> Result<(), PreconditionError>;
}

/// Pins the coordinator to the thread that created it.
#[derive(Debug, Clone)]
pub struct PinnedThread {
	id: ThreadId,
	name: Option<String>,
}

impl PinnedThread {
	#[must_use]
	pub fn current() -> Self {
		let current = thread::current();
		Self {
			id: current.id(),
			name: current.name().map(ToString::to_string),
		}
	}
}

fn describe(id: ThreadId, name: Option<&str>) -> String {
	name.map_or_else(|| format!("{id:?}"), |name| format!("{name} ({id:?})"))
}

impl ThreadAffinity for PinnedThread {
	fn check(&self) -> Result<(), PreconditionError> {
		let current = thread::current();
		if current.id() == self.id {
			Ok(())
		} else {
			Err(PreconditionError::OffCoordinatingThread {
				expected: describe(self.id, self.name.as_deref()),
				actual: describe(current.id(), current.name()),
			})
		}
	}
}

/// No thread check, for hosts that already serialise every access to the coordinator.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyThread;

impl ThreadAffinity for AnyThread {
	fn check(&self) -> Result<(), PreconditionError> {
		Ok(())
	}
}
