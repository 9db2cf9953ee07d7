use std::{
	num::NonZeroUsize,
	panic::{self, AssertUnwindSafe},
	thread,
};

use async_channel as chan;
use tracing::{error, info, trace};

use super::executor::{Executor, Job};

pub type WorkerId = usize;

/// A fixed set of OS threads pulling jobs from a shared queue.
///
/// Dropping the pool closes the queue, workers finish the job at hand and exit. Nothing
/// waits for them, so dropping never blocks.
#[derive(Debug)]
pub struct WorkerPool {
	jobs_tx: chan::Sender<Job>,
}

impl WorkerPool {
	#[must_use]
	pub fn new(workers_count: NonZeroUsize) -> Self {
		let (jobs_tx, jobs_rx) = chan::unbounded::<Job>();

		for worker_id in 0..workers_count.get() {
			let jobs_rx = jobs_rx.clone();

			if let Err(e) = thread::Builder::new()
				.name(format!("md-worker-{worker_id}"))
				.spawn(move || run(worker_id, &jobs_rx))
			{
				error!(%worker_id, ?e, "Failed to spawn worker thread");
			}
		}

		Self { jobs_tx }
	}

	/// One worker per available CPU core.
	#[must_use]
	pub fn with_available_parallelism() -> Self {
		Self::new(thread::available_parallelism().unwrap_or_else(|e| {
			error!("Failed to get available parallelism for the worker pool: {e:#?}");
			NonZeroUsize::MIN
		}))
	}
}

impl Executor for WorkerPool {
	fn execute(&self, job: Job) {
		if self.jobs_tx.send_blocking(job).is_err() {
			error!("Worker pool queue closed, dropping job");
		}
	}
}

impl Drop for WorkerPool {
	fn drop(&mut self) {
		self.jobs_tx.close();
	}
}

fn run(worker_id: WorkerId, jobs_rx: &chan::Receiver<Job>) {
	trace!(%worker_id, "Worker starting...");

	while let Ok(job) = jobs_rx.recv_blocking() {
		if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
			error!(%worker_id, "Job panicked, worker keeps running");
		}
	}

	info!(%worker_id, "Worker gracefully shutdown");
}
