use std::{
	collections::BTreeMap,
	fmt,
	hash::{Hash, Hasher},
	path::{Path, PathBuf},
	sync::Arc,
};

use chrono::{DateTime, Utc};
use url::Url;

/// Identity of a resource, ordered by its serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceUri(Url);

impl ResourceUri {
	pub fn parse(uri: &str) -> Result<Self, url::ParseError> {
		Url::parse(uri).map(Self)
	}

	/// Builds a `file:` uri, `path` must be absolute.
	#[must_use]
	pub fn from_file_path(path: impl AsRef<Path>) -> Option<Self> {
		Url::from_file_path(path).ok().map(Self)
	}

	/// Builds a `file:` uri for a directory, `path` must be absolute.
	#[must_use]
	pub fn from_directory_path(path: impl AsRef<Path>) -> Option<Self> {
		Url::from_directory_path(path).ok().map(Self)
	}

	/// The local path this uri refers to, if it is a `file:` uri.
	#[must_use]
	pub fn local_path(&self) -> Option<PathBuf> {
		(self.0.scheme() == "file")
			.then(|| self.0.to_file_path().ok())
			.flatten()
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		self.0.as_str()
	}
}

impl From<Url> for ResourceUri {
	fn from(url: Url) -> Self {
		Self(url)
	}
}

impl fmt::Display for ResourceUri {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Stable identity of a resource source, also the key its resolutions run under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(Arc<str>);

impl SourceId {
	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl From<&str> for SourceId {
	fn from(id: &str) -> Self {
		Self(id.into())
	}
}

impl From<String> for SourceId {
	fn from(id: String) -> Self {
		Self(id.into())
	}
}

impl fmt::Display for SourceId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Names the provider that resolved a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(&'static str);

impl ProviderId {
	#[must_use]
	pub const fn new(id: &'static str) -> Self {
		Self(id)
	}

	#[must_use]
	pub const fn as_str(self) -> &'static str {
		self.0
	}
}

impl fmt::Display for ProviderId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.0)
	}
}

/// The kinds of layers a resolved resource may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
	/// Vector features stored in a table of a container file.
	FeatureTable,
	/// Raster tiles stored in a table of a container file.
	TileTable,
	/// Raster tiles laid out as `z/x/y` files in a directory.
	TileDirectory { min_zoom: u8, max_zoom: u8 },
	/// A fixed set of vector features loaded at once.
	StaticFeatures { feature_count: usize },
}

/// A named, independently drawable part of a resolved resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerDescriptor {
	pub name: String,
	/// The resource this layer belongs to.
	pub resource: ResourceUri,
	pub kind: LayerKind,
}

impl LayerDescriptor {
	pub fn new(name: impl Into<String>, resource: ResourceUri, kind: LayerKind) -> Self {
		Self {
			name: name.into(),
			resource,
			kind,
		}
	}
}

/// What a provider learned about a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInfo {
	pub display_name: String,
	pub provider: ProviderId,
	/// Keyed by layer name, unique within the resource.
	pub layers: BTreeMap<String, LayerDescriptor>,
}

impl ResolvedInfo {
	pub fn new(
		display_name: impl Into<String>,
		provider: ProviderId,
		layers: impl IntoIterator<Item = LayerDescriptor>,
	) -> Self {
		Self {
			display_name: display_name.into(),
			provider,
			layers: layers
				.into_iter()
				.map(|layer| (layer.name.clone(), layer))
				.collect(),
		}
	}
}

/// A piece of map data reported by a source.
///
/// Resources are immutable values and compare equal by uri alone, resolving one produces a
/// new resource that supersedes the old one. Use [`Resource::is_same_state`] to compare
/// everything.
#[derive(Debug, Clone)]
pub struct Resource {
	uri: ResourceUri,
	source: SourceId,
	content_version: DateTime<Utc>,
	resolved: Option<Arc<ResolvedInfo>>,
}

impl PartialEq for Resource {
	fn eq(&self, other: &Self) -> bool {
		self.uri == other.uri
	}
}

impl Eq for Resource {}

impl Hash for Resource {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.uri.hash(state);
	}
}

impl Resource {
	/// A resource known to exist but not classified yet.
	#[must_use]
	pub const fn new(uri: ResourceUri, source: SourceId, content_version: DateTime<Utc>) -> Self {
		Self {
			uri,
			source,
			content_version,
			resolved: None,
		}
	}

	#[must_use]
	pub fn resolve(&self, info: ResolvedInfo) -> Self {
		self.with_resolved(Arc::new(info))
	}

	#[must_use]
	pub fn with_resolved(&self, info: Arc<ResolvedInfo>) -> Self {
		Self {
			resolved: Some(info),
			..self.clone()
		}
	}

	#[must_use]
	pub const fn uri(&self) -> &ResourceUri {
		&self.uri
	}

	#[must_use]
	pub const fn source(&self) -> &SourceId {
		&self.source
	}

	#[must_use]
	pub const fn content_version(&self) -> DateTime<Utc> {
		self.content_version
	}

	#[must_use]
	pub fn resolved(&self) -> Option<&ResolvedInfo> {
		self.resolved.as_deref()
	}

	#[must_use]
	pub const fn is_resolved(&self) -> bool {
		self.resolved.is_some()
	}

	pub fn layers(&self) -> impl Iterator<Item = &LayerDescriptor> + '_ {
		self.resolved
			.iter()
			.flat_map(|resolved| resolved.layers.values())
	}

	/// Full comparison, including source, version and resolved content.
	#[must_use]
	pub fn is_same_state(&self, other: &Self) -> bool {
		self.uri == other.uri
			&& self.source == other.source
			&& self.content_version == other.content_version
			&& match (&self.resolved, &other.resolved) {
				(None, None) => true,
				(Some(a), Some(b)) => Arc::ptr_eq(a, b) || a == b,
				_ => false,
			}
	}
}

#[cfg(test)]
mod tests {
	use chrono::TimeZone;

	use super::*;

	fn uri(s: &str) -> ResourceUri {
		ResourceUri::parse(s).expect("valid uri")
	}

	fn version(secs: i64) -> DateTime<Utc> {
		Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
	}

	#[test]
	fn equality_is_by_uri_only() {
		let unresolved = Resource::new(uri("https://maps.test/a"), "remote".into(), version(1));
		let resolved = unresolved.resolve(ResolvedInfo::new(
			"A",
			ProviderId::new("test"),
			[],
		));

		assert_eq!(unresolved, resolved);
		assert!(!unresolved.is_same_state(&resolved));
		assert!(resolved.is_same_state(&resolved.clone()));
	}

	#[test]
	fn local_path_only_for_file_uris() {
		assert!(uri("https://maps.test/a.geojson").local_path().is_none());

		let local = uri("file:///maps/a.geojson");
		assert_eq!(local.local_path(), Some(PathBuf::from("/maps/a.geojson")));
	}

	#[test]
	fn uris_order_by_serialization() {
		let mut uris = vec![uri("https://maps.test/b"), uri("https://maps.test/a")];
		uris.sort();
		assert_eq!(uris[0].as_str(), "https://maps.test/a");
	}

	#[test]
	fn layers_are_keyed_by_name() {
		let owner = uri("https://maps.test/a");
		let info = ResolvedInfo::new(
			"A",
			ProviderId::new("test"),
			[
				LayerDescriptor::new("roads", owner.clone(), LayerKind::FeatureTable),
				LayerDescriptor::new("imagery", owner.clone(), LayerKind::TileTable),
			],
		);
		let resource = Resource::new(owner, "remote".into(), version(1)).resolve(info);

		let names = resource.layers().map(|l| l.name.as_str()).collect::<Vec<_>>();
		assert_eq!(names, vec!["imagery", "roads"]);
		assert!(resource.layers().any(|l| l.kind == LayerKind::TileTable));
	}
}
