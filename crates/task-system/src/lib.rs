//!
//! # Task System
//!
//! A keyed task coordinator: tasks are submitted under a key and the coordinator guarantees
//! that at most one task runs per key at any time. A newer submission for a busy key asks the
//! running task to cancel and queues behind it, replacing (and preempting) any task that was
//! already queued. Lifecycle notifications are delivered to a [`TaskListener`] on the
//! coordinating thread only, task bodies run on an [`Executor`].
//!
//! ## Basic example
//!
//! ```
//! use std::sync::Arc;
//!
//! use md_task_system::{Coordinator, ExecStatus, Task, TaskListener, WorkerPool};
//!
//! #[derive(Default)]
//! struct Finished(Vec<u32>);
//!
//! impl TaskListener<&'static str> for Finished {
//!     type Output = u32;
//!     type Progress = ();
//!
//!     fn task_finished(&mut self, _key: &&'static str, task: &Task<u32>) {
//!         self.0.extend(task.take_output());
//!     }
//!
//!     fn task_cancelled(&mut self, _key: &&'static str, _task: &Task<u32>) {}
//!
//!     fn task_preempted(&mut self, _key: &&'static str, _task: &Task<u32>) {}
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let mut coordinator = Coordinator::new(
//!         Finished::default(),
//!         Arc::new(WorkerPool::with_available_parallelism()),
//!     );
//!
//!     coordinator
//!         .submit("answer", Task::new(|_ctx| ExecStatus::Done(42)))
//!         .unwrap();
//!
//!     while !coordinator.is_idle() {
//!         coordinator.process_next().await.unwrap();
//!     }
//!
//!     assert_eq!(coordinator.listener().0, vec![42]);
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod affinity;
mod coordinator;
mod error;
mod executor;
mod message;
mod task;
mod worker;

pub use affinity::{AnyThread, PinnedThread, ThreadAffinity};
pub use coordinator::{Coordinator, TaskListener};
pub use error::{Error as CoordinatorError, PreconditionError};
pub use executor::{Executor, Job, TokioBlockingPool};
pub use message::WorkerReport;
pub use task::{ExecStatus, Task, TaskContext, TaskId};
pub use worker::{WorkerId, WorkerPool};
