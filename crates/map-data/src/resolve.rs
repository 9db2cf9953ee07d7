use md_task_system::{check_interruption, ExecStatus, Task, TaskContext};
use md_utils::error::FileIOError;

use std::{
	collections::{BTreeMap, HashMap},
	fmt, fs,
	panic::{self, AssertUnwindSafe},
	path::Path,
	sync::Arc,
};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, error, instrument, trace};

use super::{
	error::ResolveError,
	provider::ResolverProvider,
	resource::{Resource, ResourceUri, SourceId},
};

/// Resolved resources of one source, shared by the coordinating thread and the batches
/// resolving for that source.
///
/// Batches check it before invoking any provider, so work finished by a canceled batch is
/// picked up by the next one as long as its content version is still current.
#[derive(Debug, Clone, Default)]
pub struct KnownResolved(Arc<RwLock<HashMap<ResourceUri, Resource>>>);

impl KnownResolved {
	#[must_use]
	pub fn get(&self, uri: &ResourceUri) -> Option<Resource> {
		self.0.read().get(uri).cloned()
	}

	/// Keeps `resource` if it is resolved and at least as recent as what's already known.
	pub fn insert(&self, resource: Resource) {
		if !resource.is_resolved() {
			return;
		}

		let mut known = self.0.write();
		match known.get(resource.uri()) {
			Some(current) if current.content_version() > resource.content_version() => {}
			_ => {
				known.insert(resource.uri().clone(), resource);
			}
		}
	}

	pub fn retain(&self, mut keep: impl FnMut(&ResourceUri) -> bool) {
		self.0.write().retain(|uri, _| keep(uri));
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}

/// The outcome of one resource of a batch, reported as soon as it is known.
#[derive(Debug)]
pub struct ResolveProgress {
	pub uri: ResourceUri,
	/// Content version of the resource as the batch received it.
	pub content_version: DateTime<Utc>,
	pub outcome: Result<Resource, ResolveError>,
}

/// A resource a batch failed to resolve, at the content version it tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedResolve {
	pub content_version: DateTime<Utc>,
	pub error: ResolveError,
}

/// Everything a batch resolved or failed to resolve.
#[derive(Debug, Default)]
pub struct BatchResult {
	pub resolved: BTreeMap<ResourceUri, Resource>,
	pub failed: BTreeMap<ResourceUri, FailedResolve>,
}

pub type ResolveTask = Task<BatchResult, ResolveProgress>;

/// Resolves the unresolved resources of one source report, in uri order.
pub struct ResolveBatch {
	source: SourceId,
	unresolved: Vec<Resource>,
	known: KnownResolved,
	providers: Arc<[Arc<dyn ResolverProvider>]>,
}

impl fmt::Debug for ResolveBatch {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ResolveBatch")
			.field("source", &self.source)
			.field("unresolved", &self.unresolved.len())
			.field("known", &self.known.len())
			.field("providers", &self.providers.len())
			.finish()
	}
}

impl ResolveBatch {
	pub fn new(
		source: SourceId,
		unresolved: impl IntoIterator<Item = Resource>,
		known: KnownResolved,
		providers: Arc<[Arc<dyn ResolverProvider>]>,
	) -> Self {
		let mut unresolved = unresolved.into_iter().collect::<Vec<_>>();
		unresolved.sort_by(|a, b| a.uri().cmp(b.uri()));

		Self {
			source,
			unresolved,
			known,
			providers,
		}
	}

	#[must_use]
	pub fn into_task(self) -> ResolveTask {
		Task::new(move |ctx| self.run(ctx))
	}

	#[instrument(skip_all, fields(source = %self.source, count = self.unresolved.len()))]
	fn run(self, ctx: &TaskContext<'_, ResolveProgress>) -> ExecStatus<BatchResult> {
		let mut result = BatchResult::default();

		for resource in &self.unresolved {
			check_interruption!(ctx);

			let outcome = self.resolve_one(resource);
			match &outcome {
				Ok(resolved) => {
					self.known.insert(resolved.clone());
					result.resolved.insert(resolved.uri().clone(), resolved.clone());
				}
				Err(e) => {
					trace!(%e, "Resource failed to resolve");
					result.failed.insert(
						resource.uri().clone(),
						FailedResolve {
							content_version: resource.content_version(),
							error: e.clone(),
						},
					);
				}
			}

			ctx.report(ResolveProgress {
				uri: resource.uri().clone(),
				content_version: resource.content_version(),
				outcome,
			});
		}

		debug!(
			resolved = result.resolved.len(),
			failed = result.failed.len(),
			"Resolve batch done"
		);

		ExecStatus::Done(result)
	}

	/// Resolves a single resource: unreadable local content fails, a known resolution at
	/// least as recent is reused, otherwise the first provider claiming it resolves it.
	pub fn resolve_one(&self, resource: &Resource) -> Result<Resource, ResolveError> {
		let uri = resource.uri();

		if let Some(path) = uri.local_path() {
			check_readable(uri, &path)?;
		}

		if let Some(known) = self.known.get(uri) {
			if known.is_resolved() && known.content_version() >= resource.content_version() {
				trace!(%uri, "Reusing known resolution");
				return Ok(known);
			}
		}

		let provider = self
			.providers
			.iter()
			.find(|provider| provider.can_handle(resource))
			.ok_or_else(|| ResolveError::NoProvider(uri.clone()))?;

		trace!(%uri, provider = %provider.id(), "Resolving resource");

		match panic::catch_unwind(AssertUnwindSafe(|| provider.resolve(resource))) {
			Ok(res) => res.map(|info| resource.resolve(info)),
			Err(_) => {
				error!(%uri, provider = %provider.id(), "Provider panicked while resolving");
				Err(ResolveError::provider(uri, provider.id(), "provider panicked"))
			}
		}
	}
}

fn check_readable(uri: &ResourceUri, path: &Path) -> Result<(), ResolveError> {
	let unreadable = |e| ResolveError::Unreadable {
		uri: uri.clone(),
		reason: FileIOError::from((path, e)).to_string(),
	};

	let metadata = fs::metadata(path).map_err(unreadable)?;
	if metadata.is_dir() {
		fs::read_dir(path).map(drop).map_err(unreadable)
	} else {
		fs::File::open(path).map(drop).map_err(unreadable)
	}
}
