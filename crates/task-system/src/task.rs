use std::{
	fmt,
	panic::{self, AssertUnwindSafe},
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use parking_lot::Mutex;
use tracing::{error, trace, warn};
use uuid::Uuid;

/// A unique identifier for a task using the [`uuid`](https://docs.rs/uuid) crate.
///
/// It only exists for logging purposes, tasks are compared by reference identity.
pub type TaskId = Uuid;

/// Represents whether the body of a task ran to completion or honoured a cancellation request.
#[derive(Debug)]
pub enum ExecStatus<T> {
	Done(T),
	Canceled,
}

type Body<T, P> = Box<dyn FnOnce(&TaskContext<'_, P>) -> ExecStatus<T> + Send + 'static>;

#[derive(Debug)]
enum TaskState<T> {
	Created,
	Running,
	/// `None` means the body panicked or the output was already taken.
	Done(Option<T>),
	Canceled,
}

struct Inner<T, P> {
	id: TaskId,
	body: Mutex<Option<Body<T, P>>>,
	cancel_requested: AtomicBool,
	state: Mutex<TaskState<T>>,
}

/// A unit of cancellable work.
///
/// A `Task` is a cheap handle, cloning it gives another reference to the same unit of work.
/// Equality is reference identity: two handles are equal only if they point to the same task.
///
/// The body runs at most once. Cancellation is cooperative: [`Task::cancel`] only raises a
/// flag that the body may observe through its [`TaskContext`]. A task cancelled before its
/// body starts never runs the body at all.
pub struct Task<T, P = ()> {
	inner: Arc<Inner<T, P>>,
}

impl<T, P> Clone for Task<T, P> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T, P> PartialEq for Task<T, P> {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl<T, P> Eq for Task<T, P> {}

impl<T, P> fmt::Debug for Task<T, P> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = match &*self.inner.state.lock() {
			TaskState::Created => "created",
			TaskState::Running => "running",
			TaskState::Done(_) => "done",
			TaskState::Canceled => "canceled",
		};

		f.debug_struct("Task")
			.field("id", &self.inner.id)
			.field("state", &state)
			.field(
				"cancel_requested",
				&self.inner.cancel_requested.load(Ordering::Relaxed),
			)
			.finish()
	}
}

impl<T: Send + 'static, P: 'static> Task<T, P> {
	pub fn new(body: impl FnOnce(&TaskContext<'_, P>) -> ExecStatus<T> + Send + 'static) -> Self {
		Self {
			inner: Arc::new(Inner {
				id: TaskId::new_v4(),
				body: Mutex::new(Some(Box::new(body))),
				cancel_requested: AtomicBool::new(false),
				state: Mutex::new(TaskState::Created),
			}),
		}
	}
}

impl<T, P> Task<T, P> {
	#[must_use]
	pub fn id(&self) -> TaskId {
		self.inner.id
	}

	/// Requests the task to cancel, returning `true` if this was the first request.
	///
	/// Best-effort only, a running body may ignore it and complete normally.
	pub fn cancel(&self) -> bool {
		let first = !self.inner.cancel_requested.swap(true, Ordering::AcqRel);
		if first {
			trace!(task_id = %self.inner.id, "Cancellation requested");
		}
		first
	}

	#[must_use]
	pub fn is_cancel_requested(&self) -> bool {
		self.inner.cancel_requested.load(Ordering::Acquire)
	}

	/// Whether the task reached a terminal state, either done or canceled.
	#[must_use]
	pub fn is_done(&self) -> bool {
		matches!(
			&*self.inner.state.lock(),
			TaskState::Done(_) | TaskState::Canceled
		)
	}

	/// Whether the task ended canceled: its body honoured a cancellation request or never ran.
	#[must_use]
	pub fn is_canceled(&self) -> bool {
		matches!(&*self.inner.state.lock(), TaskState::Canceled)
	}

	/// Takes the output produced by the body, if it finished normally and nobody took it yet.
	#[must_use]
	pub fn take_output(&self) -> Option<T> {
		match &mut *self.inner.state.lock() {
			TaskState::Done(out) => out.take(),
			TaskState::Created | TaskState::Running | TaskState::Canceled => None,
		}
	}

	/// Discards a task that will never run: raises the cancellation flag, drops the body and
	/// marks the task as canceled.
	pub(crate) fn discard(&self) {
		self.cancel();
		drop(self.inner.body.lock().take());

		let mut state = self.inner.state.lock();
		if matches!(&*state, TaskState::Created) {
			*state = TaskState::Canceled;
		}
	}

	/// Runs the body on the calling thread, forwarding progress to `report`.
	pub(crate) fn run(&self, report: &dyn Fn(P)) {
		let Some(body) = self.inner.body.lock().take() else {
			warn!(task_id = %self.inner.id, "Tried to run a task that already ran or was discarded");
			return;
		};

		if self.is_cancel_requested() {
			trace!(task_id = %self.inner.id, "Task canceled before it started, skipping body");
			*self.inner.state.lock() = TaskState::Canceled;
			return;
		}

		*self.inner.state.lock() = TaskState::Running;

		let ctx = TaskContext {
			task_id: self.inner.id,
			cancel_requested: &self.inner.cancel_requested,
			report,
		};

		let state = match panic::catch_unwind(AssertUnwindSafe(|| body(&ctx))) {
			Ok(ExecStatus::Done(out)) => TaskState::Done(Some(out)),
			Ok(ExecStatus::Canceled) => TaskState::Canceled,
			Err(_) => {
				error!(task_id = %self.inner.id, "Task body panicked, finishing it without output");
				TaskState::Done(None)
			}
		};

		*self.inner.state.lock() = state;
	}
}

/// Handed to a task body while it runs, to check for cancellation and report progress.
pub struct TaskContext<'a, P> {
	task_id: TaskId,
	cancel_requested: &'a AtomicBool,
	report: &'a dyn Fn(P),
}

impl<P> TaskContext<'_, P> {
	#[must_use]
	pub const fn task_id(&self) -> TaskId {
		self.task_id
	}

	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.cancel_requested.load(Ordering::Acquire)
	}

	/// Sends a progress update to the coordinating thread.
	pub fn report(&self, progress: P) {
		(self.report)(progress);
	}
}

impl<P> fmt::Debug for TaskContext<'_, P> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TaskContext")
			.field("task_id", &self.task_id)
			.field("is_cancelled", &self.is_cancelled())
			.finish_non_exhaustive()
	}
}

#[macro_export]
macro_rules! check_interruption {
	($ctx:ident) => {
		if $ctx.is_cancelled() {
			::tracing::trace!(task_id = %$ctx.task_id(), "Task was canceled by the coordinator");
			return $crate::ExecStatus::Canceled;
		}
	};
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use super::*;

	#[test]
	fn runs_body_once_and_keeps_output() {
		let calls = Arc::new(AtomicUsize::new(0));
		let task = Task::<_, ()>::new({
			let calls = Arc::clone(&calls);
			move |_ctx| {
				calls.fetch_add(1, Ordering::SeqCst);
				ExecStatus::Done(42)
			}
		});

		task.run(&|()| {});
		task.run(&|()| {});

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert!(task.is_done());
		assert!(!task.is_canceled());
		assert_eq!(task.take_output(), Some(42));
		assert_eq!(task.take_output(), None);
	}

	#[test]
	fn cancel_before_start_skips_body() {
		let task = Task::<(), ()>::new(|_ctx| panic!("body must not run"));

		assert!(task.cancel());
		assert!(!task.cancel());
		task.run(&|()| {});

		assert!(task.is_canceled());
		assert!(task.is_done());
	}

	#[test]
	fn body_observes_cancellation_and_reports_progress() {
		let task = Task::<u32, u32>::new(|ctx| {
			ctx.report(1);
			if ctx.is_cancelled() {
				return ExecStatus::Canceled;
			}
			ExecStatus::Done(7)
		});

		let seen = Mutex::new(Vec::new());
		let report = |p| {
			seen.lock().push(p);
			task.cancel();
		};
		task.run(&report);

		assert_eq!(*seen.lock(), vec![1]);
		assert!(task.is_canceled());
		assert_eq!(task.take_output(), None);
	}

	#[test]
	fn panicking_body_finishes_without_output() {
		let task = Task::<u32, ()>::new(|_ctx| panic!("boom"));
		task.run(&|()| {});

		assert!(task.is_done());
		assert!(!task.is_canceled());
		assert_eq!(task.take_output(), None);
	}

	#[test]
	fn identity_equality() {
		let a = Task::<(), ()>::new(|_ctx| ExecStatus::Done(()));
		let b = Task::<(), ()>::new(|_ctx| ExecStatus::Done(()));

		assert_eq!(a, a.clone());
		assert_ne!(a, b);
	}

	#[test]
	fn discard_marks_canceled_without_running() {
		let task = Task::<(), ()>::new(|_ctx| panic!("body must not run"));
		task.discard();
		task.run(&|()| {});

		assert!(task.is_canceled());
		assert!(task.is_cancel_requested());
	}
}
