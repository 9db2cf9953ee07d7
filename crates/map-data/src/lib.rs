//!
//! # Map Data
//!
//! Keeps an aggregate view of the map data resources reported by a set of sources. Newly
//! reported resources are classified by pluggable [`ResolverProvider`]s on worker threads,
//! one resolution batch per source at a time, through the keyed coordinator of
//! `md-task-system`.
//!
//! ```no_run
//! use md_map_data::{MapDataConfig, Reconciler};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MapDataConfig::load("map_data.json").await?;
//! let mut reconciler = Reconciler::from_config(&config)?;
//!
//! reconciler.settle().await?;
//! for layer in reconciler.view().layers() {
//!     println!("{} ({:?})", layer.name, layer.kind);
//! }
//! # Ok(())
//! # }
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

mod config;
mod error;
mod provider;
mod reconciler;
mod resolve;
mod resource;
mod source;
mod view;

pub use config::{DirectoryConfig, MapDataConfig};
pub use error::{ConfigError, Error, ResolveError};
pub use provider::{default_providers, GeoJsonProvider, ResolverProvider, TileDirectoryProvider};
pub use reconciler::Reconciler;
pub use resolve::{
	BatchResult, FailedResolve, KnownResolved, ResolveBatch, ResolveProgress, ResolveTask,
};
pub use resource::{
	LayerDescriptor, LayerKind, ProviderId, ResolvedInfo, Resource, ResourceUri, SourceId,
};
pub use source::{DirectorySource, ManualSource, ResourceSource, SourceReport};
pub use view::{AggregateView, Status};
