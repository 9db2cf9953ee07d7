use std::fmt;

use tokio::runtime::Handle;

/// A unit of work handed to an [`Executor`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// The execution substrate where task bodies run.
///
/// Bodies may block, so implementations must run jobs off the coordinating thread.
pub trait Executor: Send + Sync + fmt::Debug + 'static {
	fn execute(&self, job: Job);
}

/// Runs jobs on tokio's blocking thread pool.
#[derive(Debug, Clone)]
pub struct TokioBlockingPool {
	handle: Handle,
}

impl TokioBlockingPool {
	#[must_use]
	pub const fn new(handle: Handle) -> Self {
		Self { handle }
	}

	/// Uses the runtime of the calling context.
	///
	/// # Panics
	///
	/// Panics if called outside of a tokio runtime, as [`Handle::current`] does.
	#[must_use]
	pub fn current() -> Self {
		Self::new(Handle::current())
	}
}

impl Executor for TokioBlockingPool {
	fn execute(&self, job: Job) {
		drop(self.handle.spawn_blocking(job));
	}
}
