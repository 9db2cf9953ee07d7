#![allow(dead_code)]

use md_task_system::{ExecStatus, Executor, Job, Task, TaskId, TaskListener, WorkerPool};

use std::{
	future::Future,
	num::NonZeroUsize,
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering},
		Arc,
	},
	thread::{self, ThreadId},
	time::Duration,
};

use tokio::{sync::oneshot, time::timeout};

pub type Key = &'static str;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
	Finished(Key, TaskId),
	Cancelled(Key, TaskId),
	Preempted(Key, TaskId),
	Progress(Key, TaskId, u32),
}

/// Records every notification and the thread it arrived on.
#[derive(Debug, Default)]
pub struct Recorder {
	pub events: Vec<Event>,
	pub outputs: Vec<&'static str>,
	pub threads: Vec<ThreadId>,
}

impl Recorder {
	fn saw(&mut self, event: Event) {
		self.threads.push(thread::current().id());
		self.events.push(event);
	}
}

impl TaskListener<Key> for Recorder {
	type Output = &'static str;
	type Progress = u32;

	fn task_finished(&mut self, key: &Key, task: &Task<&'static str, u32>) {
		self.outputs.extend(task.take_output());
		self.saw(Event::Finished(key, task.id()));
	}

	fn task_cancelled(&mut self, key: &Key, task: &Task<&'static str, u32>) {
		self.saw(Event::Cancelled(key, task.id()));
	}

	fn task_preempted(&mut self, key: &Key, task: &Task<&'static str, u32>) {
		self.saw(Event::Preempted(key, task.id()));
	}

	fn task_progress(&mut self, key: &Key, task: &Task<&'static str, u32>, progress: u32) {
		self.saw(Event::Progress(key, task.id(), progress));
	}
}

/// Counts how many jobs were handed to the pool.
#[derive(Debug)]
pub struct CountingExecutor {
	pool: WorkerPool,
	executed: AtomicUsize,
}

impl CountingExecutor {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			pool: WorkerPool::new(NonZeroUsize::new(4).expect("non zero")),
			executed: AtomicUsize::new(0),
		})
	}

	pub fn executed(&self) -> usize {
		self.executed.load(Ordering::SeqCst)
	}
}

impl Executor for CountingExecutor {
	fn execute(&self, job: Job) {
		self.executed.fetch_add(1, Ordering::SeqCst);
		self.pool.execute(job);
	}
}

pub async fn within<F: Future>(fut: F) -> F::Output {
	timeout(Duration::from_secs(5), fut)
		.await
		.expect("timed out waiting for workers")
}

/// A task that signals when its body starts and then blocks until released, ignoring
/// cancellation requests.
pub struct Blocking {
	pub task: Task<&'static str, u32>,
	pub started: oneshot::Receiver<()>,
	pub release: oneshot::Sender<()>,
}

impl Blocking {
	pub fn new(output: &'static str) -> Self {
		let (started_tx, started_rx) = oneshot::channel();
		let (release_tx, release_rx) = oneshot::channel::<()>();

		let task = Task::new(move |_ctx| {
			started_tx.send(()).ok();
			release_rx.blocking_recv().ok();
			ExecStatus::Done(output)
		});

		Self {
			task,
			started: started_rx,
			release: release_tx,
		}
	}
}

/// A task that signals when it starts, then spins until it is asked to cancel.
pub fn cancellable(started_tx: oneshot::Sender<()>) -> Task<&'static str, u32> {
	Task::new(move |ctx| {
		started_tx.send(()).ok();
		loop {
			if ctx.is_cancelled() {
				return ExecStatus::Canceled;
			}
			thread::sleep(Duration::from_millis(5));
		}
	})
}

/// A task that flips `ran` if its body is ever invoked.
pub fn tracked(output: &'static str, ran: &Arc<AtomicBool>) -> Task<&'static str, u32> {
	let ran = Arc::clone(ran);
	Task::new(move |_ctx| {
		ran.store(true, Ordering::SeqCst);
		ExecStatus::Done(output)
	})
}
