use thiserror::Error;

use super::task::TaskId;

/// Misuse of the coordinator's threading contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
	#[error("coordinator used off its coordinating thread <expected='{expected}', actual='{actual}'>")]
	OffCoordinatingThread { expected: String, actual: String },
	#[error("coordinator was already disposed")]
	Disposed,
}

#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Precondition(#[from] PreconditionError),
	/// A task that is no longer current for its key completed normally without being
	/// canceled, the slot table and the task disagree about who owns the key.
	#[error("stale task <id='{task_id}'> for key <{key}> completed without being canceled")]
	StaleCompletion { key: String, task_id: TaskId },
}
