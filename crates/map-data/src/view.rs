use std::collections::BTreeMap;

use super::resource::{LayerDescriptor, Resource, ResourceUri};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
	/// Some source is loading or some resolution is in flight.
	Loading,
	Success,
	/// The reconciler hit an internal-consistency fault, the view won't change anymore.
	Error,
}

/// The merged, published state of every source.
///
/// Only resolved resources are part of the view, keyed by uri.
#[derive(Debug, Clone)]
pub struct AggregateView {
	pub status: Status,
	pub resources: BTreeMap<ResourceUri, Resource>,
}

impl Default for AggregateView {
	fn default() -> Self {
		Self {
			status: Status::Success,
			resources: BTreeMap::new(),
		}
	}
}

impl AggregateView {
	#[must_use]
	pub fn get(&self, uri: &ResourceUri) -> Option<&Resource> {
		self.resources.get(uri)
	}

	pub fn layers(&self) -> impl Iterator<Item = &LayerDescriptor> + '_ {
		self.resources.values().flat_map(Resource::layers)
	}

	/// Whether publishing `status` and `resources` would change nothing observable.
	#[must_use]
	pub fn same_as(&self, status: Status, resources: &BTreeMap<ResourceUri, Resource>) -> bool {
		self.status == status
			&& self.resources.len() == resources.len()
			&& self
				.resources
				.values()
				.zip(resources.values())
				.all(|(a, b)| a.is_same_state(b))
	}
}
