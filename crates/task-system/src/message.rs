use super::task::Task;

/// A report sent by a worker back to the coordinating thread.
///
/// Reports of a single task are always delivered in order, so all of its progress
/// updates are handled before its completion.
#[derive(Debug)]
pub enum WorkerReport<K, T, P> {
	Progress { key: K, task: Task<T, P>, progress: P },
	Completed { key: K, task: Task<T, P> },
}
