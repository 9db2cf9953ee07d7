use std::{
	collections::{hash_map::Entry, HashMap},
	fmt,
	hash::Hash,
	sync::Arc,
};

use async_channel as chan;
use tracing::{debug, error, instrument, trace, warn};

use super::{
	affinity::{PinnedThread, ThreadAffinity},
	error::{Error, PreconditionError},
	executor::Executor,
	message::WorkerReport,
	task::Task,
};

/// Receives the lifecycle notifications of the tasks submitted to a [`Coordinator`].
///
/// Every callback runs on the coordinating thread, never on a worker.
pub trait TaskListener<K>: 'static {
	type Output: Send + 'static;
	type Progress: Send + 'static;

	/// The task completed normally while being the current task for its key.
	fn task_finished(&mut self, key: &K, task: &Task<Self::Output, Self::Progress>);

	/// The task completed canceled while being the current task for its key.
	fn task_cancelled(&mut self, key: &K, task: &Task<Self::Output, Self::Progress>);

	/// The task was canceled without ever being the current task for its key.
	fn task_preempted(&mut self, key: &K, task: &Task<Self::Output, Self::Progress>);

	/// Progress reported by the body of the current task for `key`.
	fn task_progress(
		&mut self,
		_key: &K,
		_task: &Task<Self::Output, Self::Progress>,
		_progress: Self::Progress,
	) {
	}
}

type ListenerTask<K, L> = Task<<L as TaskListener<K>>::Output, <L as TaskListener<K>>::Progress>;

type ListenerReport<K, L> =
	WorkerReport<K, <L as TaskListener<K>>::Output, <L as TaskListener<K>>::Progress>;

struct TaskSlot<T, P> {
	current: Task<T, P>,
	pending: Option<Task<T, P>>,
}

/// Runs at most one task per key at a time.
///
/// Each key owns a slot with the task currently dispatched to the executor and at most one
/// pending task queued behind it. Submitting to a busy key asks the current task to cancel
/// and replaces the pending one, which is reported as preempted right away. When the current
/// task completes, the pending one is promoted and dispatched.
///
/// The slot table belongs to the coordinating thread, the thread that created the
/// coordinator unless another [`ThreadAffinity`] is injected. Workers never touch it, they
/// send [`WorkerReport`]s that the coordinating thread handles through
/// [`Coordinator::process_next`], [`Coordinator::process_ready`] or
/// [`Coordinator::handle_report`].
pub struct Coordinator<K, L: TaskListener<K>> {
	slots: HashMap<K, TaskSlot<L::Output, L::Progress>>,
	listener: L,
	executor: Arc<dyn Executor>,
	affinity: Box<dyn ThreadAffinity>,
	reports_tx: chan::Sender<ListenerReport<K, L>>,
	reports_rx: chan::Receiver<ListenerReport<K, L>>,
	disposed: bool,
}

impl<K, L> fmt::Debug for Coordinator<K, L>
where
	K: fmt::Debug,
	L: TaskListener<K>,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Coordinator")
			.field("active_keys", &self.slots.keys().collect::<Vec<_>>())
			.field("executor", &self.executor)
			.field("affinity", &self.affinity)
			.field("disposed", &self.disposed)
			.finish_non_exhaustive()
	}
}

impl<K, L> Coordinator<K, L>
where
	K: Clone + Eq + Hash + fmt::Debug + Send + 'static,
	L: TaskListener<K>,
{
	/// Creates a coordinator pinned to the calling thread.
	pub fn new(listener: L, executor: Arc<dyn Executor>) -> Self {
		Self::with_affinity(listener, executor, PinnedThread::current())
	}

	pub fn with_affinity(
		listener: L,
		executor: Arc<dyn Executor>,
		affinity: impl ThreadAffinity,
	) -> Self {
		let (reports_tx, reports_rx) = chan::unbounded();

		Self {
			slots: HashMap::new(),
			listener,
			executor,
			affinity: Box::new(affinity),
			reports_tx,
			reports_rx,
			disposed: false,
		}
	}

	/// Fails if called off the coordinating thread.
	pub fn check_thread(&self) -> Result<(), PreconditionError> {
		self.affinity.check()
	}

	fn check_usable(&self) -> Result<(), PreconditionError> {
		self.affinity.check()?;
		if self.disposed {
			return Err(PreconditionError::Disposed);
		}
		Ok(())
	}

	/// Submits `task` for `key`.
	///
	/// Outcomes are delivered to the listener, a pending task replaced by this submission is
	/// reported as preempted before this method returns.
	#[instrument(skip(self, task), fields(task_id = %task.id()), err)]
	pub fn submit(&mut self, key: K, task: ListenerTask<K, L>) -> Result<(), PreconditionError> {
		self.check_usable()?;

		match self.slots.entry(key) {
			Entry::Vacant(entry) => {
				trace!("Key is idle, dispatching task right away");
				let key = entry.key().clone();
				entry.insert(TaskSlot {
					current: task.clone(),
					pending: None,
				});
				self.dispatch(key, task);
			}

			Entry::Occupied(mut entry) => {
				let slot = entry.get_mut();
				slot.current.cancel();

				if let Some(preempted) = slot.pending.replace(task) {
					trace!(preempted_task_id = %preempted.id(), "Preempting pending task");
					preempted.discard();
					self.listener.task_preempted(entry.key(), &preempted);
				} else {
					trace!("Key is busy, task is now pending");
				}
			}
		}

		Ok(())
	}

	/// Cancels the work for `key`: requests the current task to cancel and preempts the
	/// pending one. Returns `false` if the key had no slot.
	///
	/// The slot remains until the current task reports back.
	#[instrument(skip(self), err)]
	pub fn cancel(&mut self, key: &K) -> Result<bool, PreconditionError> {
		self.check_usable()?;

		let Some(slot) = self.slots.get_mut(key) else {
			return Ok(false);
		};

		slot.current.cancel();
		if let Some(preempted) = slot.pending.take() {
			preempted.discard();
			self.listener.task_preempted(key, &preempted);
		}

		Ok(true)
	}

	#[instrument(skip(self, task), fields(task_id = %task.id()))]
	fn dispatch(&self, key: K, task: ListenerTask<K, L>) {
		let reports_tx = self.reports_tx.clone();

		self.executor.execute(Box::new(move || {
			let report = |progress| {
				if reports_tx
					.send_blocking(WorkerReport::Progress {
						key: key.clone(),
						task: task.clone(),
						progress,
					})
					.is_err()
				{
					trace!("Coordinator is gone, dropping progress report");
				}
			};

			task.run(&report);

			if reports_tx
				.send_blocking(WorkerReport::Completed { key, task })
				.is_err()
			{
				trace!("Coordinator is gone, dropping completion report");
			}
		}));
	}

	/// Waits for the next report from the workers.
	///
	/// Returns `None` only if the report channel closed, which cannot happen while the
	/// coordinator is alive.
	pub async fn next_report(&self) -> Option<ListenerReport<K, L>> {
		self.reports_rx.recv().await.ok()
	}

	/// Handles a report previously obtained through [`Coordinator::next_report`].
	pub fn handle_report(&mut self, report: ListenerReport<K, L>) -> Result<(), Error> {
		self.affinity.check()?;

		if self.disposed {
			trace!("Coordinator disposed, discarding late worker report");
			return Ok(());
		}

		match report {
			WorkerReport::Progress {
				key,
				task,
				progress,
			} => {
				if self.is_current(&key, &task) {
					self.listener.task_progress(&key, &task, progress);
				} else {
					trace!(?key, task_id = %task.id(), "Dropping progress of a task that is no longer current");
				}
				Ok(())
			}

			WorkerReport::Completed { key, task } => self.complete(key, &task),
		}
	}

	fn is_current(&self, key: &K, task: &ListenerTask<K, L>) -> bool {
		self.slots
			.get(key)
			.is_some_and(|slot| slot.current == *task)
	}

	#[instrument(skip(self, task), fields(task_id = %task.id()), err)]
	fn complete(&mut self, key: K, task: &ListenerTask<K, L>) -> Result<(), Error> {
		let Some(slot) = self
			.slots
			.get_mut(&key)
			.filter(|slot| slot.current == *task)
		else {
			return self.complete_stale(&key, task);
		};

		if task.is_canceled() {
			self.listener.task_cancelled(&key, task);
		} else {
			self.listener.task_finished(&key, task);
		}

		if let Some(next) = slot.pending.take() {
			trace!(next_task_id = %next.id(), "Promoting pending task");
			slot.current = next.clone();
			self.dispatch(key, next);
		} else {
			trace!("No pending task, releasing key");
			self.slots.remove(&key);
		}

		Ok(())
	}

	fn complete_stale(&mut self, key: &K, task: &ListenerTask<K, L>) -> Result<(), Error> {
		if task.is_canceled() {
			self.listener.task_preempted(key, task);
			return Ok(());
		}

		error!(
			?key,
			"Stale task completed normally without being canceled, slot table is inconsistent"
		);
		Err(Error::StaleCompletion {
			key: format!("{key:?}"),
			task_id: task.id(),
		})
	}

	/// Waits for the next worker report and handles it.
	pub async fn process_next(&mut self) -> Result<(), Error> {
		self.affinity.check()?;
		if let Some(report) = self.next_report().await {
			self.handle_report(report)?;
		}
		Ok(())
	}

	/// Handles every report already waiting, without blocking. Returns how many were handled.
	pub fn process_ready(&mut self) -> Result<usize, Error> {
		self.affinity.check()?;

		let mut handled = 0;
		while let Ok(report) = self.reports_rx.try_recv() {
			self.handle_report(report)?;
			handled += 1;
		}

		Ok(handled)
	}

	/// Cancels every current and pending task and makes the coordinator inert.
	///
	/// Doesn't wait for running bodies, they finish on their own and their reports are
	/// discarded.
	#[instrument(skip(self), err)]
	pub fn dispose(&mut self) -> Result<(), PreconditionError> {
		self.affinity.check()?;

		if self.disposed {
			warn!("Trying to dispose a coordinator that was already disposed");
			return Ok(());
		}

		debug!(active_keys = self.slots.len(), "Disposing coordinator");
		self.disposed = true;
		for (_, slot) in self.slots.drain() {
			slot.current.cancel();
			if let Some(pending) = slot.pending {
				pending.discard();
			}
		}

		Ok(())
	}

	#[must_use]
	pub fn is_disposed(&self) -> bool {
		self.disposed
	}

	/// Whether `key` has a task dispatched or waiting to report back.
	#[must_use]
	pub fn is_active(&self, key: &K) -> bool {
		self.slots.contains_key(key)
	}

	#[must_use]
	pub fn has_pending(&self, key: &K) -> bool {
		self.slots
			.get(key)
			.is_some_and(|slot| slot.pending.is_some())
	}

	#[must_use]
	pub fn is_idle(&self) -> bool {
		self.slots.is_empty()
	}

	pub fn active_keys(&self) -> impl Iterator<Item = &K> + '_ {
		self.slots.keys()
	}

	#[must_use]
	pub const fn listener(&self) -> &L {
		&self.listener
	}

	pub fn listener_mut(&mut self) -> &mut L {
		&mut self.listener
	}
}

impl<K, L: TaskListener<K>> Drop for Coordinator<K, L> {
	fn drop(&mut self) {
		for slot in self.slots.values() {
			slot.current.cancel();
			if let Some(pending) = &slot.pending {
				pending.discard();
			}
		}
	}
}
