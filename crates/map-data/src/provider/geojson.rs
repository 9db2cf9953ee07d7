use std::fs;

use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

use crate::{
	error::ResolveError,
	resource::{LayerDescriptor, LayerKind, ProviderId, ResolvedInfo, Resource},
};

use super::ResolverProvider;

const EXTENSIONS: [&str; 2] = ["geojson", "json"];

/// Resolves local GeoJSON feature collections into a single static features layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoJsonProvider;

impl GeoJsonProvider {
	pub const ID: ProviderId = ProviderId::new("geojson");
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
	#[serde(rename = "type")]
	kind: String,
	name: Option<String>,
	features: Vec<Value>,
}

impl ResolverProvider for GeoJsonProvider {
	fn id(&self) -> ProviderId {
		Self::ID
	}

	fn can_handle(&self, resource: &Resource) -> bool {
		resource.uri().local_path().is_some_and(|path| {
			path.extension()
				.and_then(|ext| ext.to_str())
				.is_some_and(|ext| EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
		})
	}

	fn resolve(&self, resource: &Resource) -> Result<ResolvedInfo, ResolveError> {
		let uri = resource.uri();
		let path = uri
			.local_path()
			.ok_or_else(|| ResolveError::provider(uri, Self::ID, "not a local file"))?;

		let bytes = fs::read(&path).map_err(|e| ResolveError::provider(uri, Self::ID, e.to_string()))?;

		let collection = serde_json::from_slice::<FeatureCollection>(&bytes)
			.map_err(|e| ResolveError::provider(uri, Self::ID, e.to_string()))?;

		if collection.kind != "FeatureCollection" {
			return Err(ResolveError::provider(
				uri,
				Self::ID,
				format!("expected a FeatureCollection, found '{}'", collection.kind),
			));
		}

		let name = collection
			.name
			.or_else(|| {
				path.file_stem()
					.map(|stem| stem.to_string_lossy().into_owned())
			})
			.unwrap_or_else(|| uri.to_string());

		trace!(%uri, features = collection.features.len(), "Resolved feature collection");

		Ok(ResolvedInfo::new(
			name.clone(),
			Self::ID,
			[LayerDescriptor::new(
				name,
				uri.clone(),
				LayerKind::StaticFeatures {
					feature_count: collection.features.len(),
				},
			)],
		))
	}
}
