use std::{fs, path::Path};

use tracing::trace;

use crate::{
	error::ResolveError,
	resource::{LayerDescriptor, LayerKind, ProviderId, ResolvedInfo, Resource},
};

use super::ResolverProvider;

/// Resolves local directories of `z/x/y` raster tiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct TileDirectoryProvider;

impl TileDirectoryProvider {
	pub const ID: ProviderId = ProviderId::new("tile_directory");
}

fn zoom_levels(dir: &Path) -> std::io::Result<Vec<u8>> {
	let mut levels = Vec::new();

	for entry in fs::read_dir(dir)? {
		let entry = entry?;
		if !entry.file_type()?.is_dir() {
			continue;
		}

		if let Some(zoom) = entry
			.file_name()
			.to_str()
			.and_then(|name| name.parse::<u8>().ok())
		{
			levels.push(zoom);
		}
	}

	levels.sort_unstable();
	Ok(levels)
}

impl ResolverProvider for TileDirectoryProvider {
	fn id(&self) -> ProviderId {
		Self::ID
	}

	fn can_handle(&self, resource: &Resource) -> bool {
		resource
			.uri()
			.local_path()
			.filter(|path| path.is_dir())
			.and_then(|path| zoom_levels(&path).ok())
			.is_some_and(|levels| !levels.is_empty())
	}

	fn resolve(&self, resource: &Resource) -> Result<ResolvedInfo, ResolveError> {
		let uri = resource.uri();
		let path = uri
			.local_path()
			.ok_or_else(|| ResolveError::provider(uri, Self::ID, "not a local directory"))?;

		let levels =
			zoom_levels(&path).map_err(|e| ResolveError::provider(uri, Self::ID, e.to_string()))?;

		let (Some(&min_zoom), Some(&max_zoom)) = (levels.first(), levels.last()) else {
			return Err(ResolveError::provider(uri, Self::ID, "no zoom level directories"));
		};

		let name = path
			.file_name()
			.map_or_else(|| uri.to_string(), |name| name.to_string_lossy().into_owned());

		trace!(%uri, %min_zoom, %max_zoom, "Resolved tile directory");

		Ok(ResolvedInfo::new(
			name.clone(),
			Self::ID,
			[LayerDescriptor::new(
				name,
				uri.clone(),
				LayerKind::TileDirectory { min_zoom, max_zoom },
			)],
		))
	}
}
