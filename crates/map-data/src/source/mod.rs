use std::{
	collections::{HashMap, HashSet},
	fmt,
};

use tokio::sync::watch;
use tracing::trace;

use super::resource::{Resource, ResourceUri, SourceId};

mod directory;

pub use directory::DirectorySource;

/// What a source currently knows about its resources.
#[derive(Debug, Clone)]
pub enum SourceReport {
	/// The source is (re)building its resource set.
	Loading,
	Resources(HashSet<Resource>),
}

/// Produces sets of candidate resources and owns their persistence.
///
/// Reports are published on a [`watch`] channel, the reconciler only ever cares about the
/// latest one.
pub trait ResourceSource: Send + Sync + fmt::Debug + 'static {
	fn id(&self) -> &SourceId;

	fn reports(&self) -> watch::Receiver<SourceReport>;

	fn owns_resource(&self, uri: &ResourceUri) -> bool;

	/// Re-scans the source. `known_resolved` holds the resources of this source that are
	/// currently resolved, a source may report them as-is when their content didn't change.
	fn refresh(&self, known_resolved: HashMap<ResourceUri, Resource>);
}

/// A source whose owner pushes reports by hand.
#[derive(Debug)]
pub struct ManualSource {
	id: SourceId,
	reports_tx: watch::Sender<SourceReport>,
}

impl ManualSource {
	/// Starts out loading until the first report.
	pub fn new(id: impl Into<SourceId>) -> Self {
		let (reports_tx, _reports_rx) = watch::channel(SourceReport::Loading);
		Self {
			id: id.into(),
			reports_tx,
		}
	}

	pub fn set_loading(&self) {
		self.reports_tx.send_replace(SourceReport::Loading);
	}

	pub fn report(&self, resources: impl IntoIterator<Item = Resource>) {
		self.reports_tx
			.send_replace(SourceReport::Resources(resources.into_iter().collect()));
	}
}

impl ResourceSource for ManualSource {
	fn id(&self) -> &SourceId {
		&self.id
	}

	fn reports(&self) -> watch::Receiver<SourceReport> {
		self.reports_tx.subscribe()
	}

	fn owns_resource(&self, uri: &ResourceUri) -> bool {
		match &*self.reports_tx.borrow() {
			SourceReport::Loading => false,
			SourceReport::Resources(resources) => resources.iter().any(|r| r.uri() == uri),
		}
	}

	fn refresh(&self, known_resolved: HashMap<ResourceUri, Resource>) {
		self.reports_tx.send_modify(|report| {
			if let SourceReport::Resources(resources) = report {
				let refreshed = resources
					.drain()
					.map(|resource| match known_resolved.get(resource.uri()) {
						Some(known)
							if !resource.is_resolved()
								&& known.content_version() >= resource.content_version() =>
						{
							known.clone()
						}
						_ => resource,
					})
					.collect();
				*resources = refreshed;
			}
		});
		trace!(source = %self.id, "Manual source re-published its resources");
	}
}
