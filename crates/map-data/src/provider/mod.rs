use std::{fmt, sync::Arc};

use super::{
	error::ResolveError,
	resource::{ProviderId, ResolvedInfo, Resource},
};

mod geojson;
mod tile_dir;

pub use geojson::GeoJsonProvider;
pub use tile_dir::TileDirectoryProvider;

/// A strategy that claims and resolves a specific kind of resource.
///
/// Providers run on worker threads and may block, the first registered provider whose
/// [`ResolverProvider::can_handle`] claims a resource is the only one that gets to resolve it.
pub trait ResolverProvider: Send + Sync + fmt::Debug + 'static {
	fn id(&self) -> ProviderId;

	fn can_handle(&self, resource: &Resource) -> bool;

	fn resolve(&self, resource: &Resource) -> Result<ResolvedInfo, ResolveError>;
}

/// The providers for the local formats this crate understands.
#[must_use]
pub fn default_providers() -> Vec<Arc<dyn ResolverProvider>> {
	vec![
		Arc::new(TileDirectoryProvider),
		Arc::new(GeoJsonProvider),
	]
}
