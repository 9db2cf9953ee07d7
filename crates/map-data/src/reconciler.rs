use md_task_system::{
	Coordinator, CoordinatorError, Executor, PinnedThread, PreconditionError, TaskListener,
	ThreadAffinity, WorkerPool, WorkerReport,
};

use std::{
	collections::{BTreeMap, HashMap, HashSet},
	fmt,
	sync::Arc,
};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::watch;
use tokio_stream::{wrappers::WatchStream, StreamExt, StreamMap};
use tracing::{debug, error, instrument, trace, warn};

use super::{
	config::MapDataConfig,
	error::{Error, ResolveError},
	provider::{default_providers, ResolverProvider},
	resolve::{
		BatchResult, FailedResolve, KnownResolved, ResolveBatch, ResolveProgress, ResolveTask,
	},
	resource::{Resource, ResourceUri, SourceId},
	source::{DirectorySource, ResourceSource, SourceReport},
	view::{AggregateView, Status},
};

type BatchReport = WorkerReport<SourceId, BatchResult, ResolveProgress>;

/// Reconciliation state, owned by the coordinator so lifecycle notifications can update it.
#[derive(Debug, Default)]
struct Tracker {
	resources: BTreeMap<ResourceUri, Resource>,
	/// Sources that are loading or didn't report yet.
	loading: HashSet<SourceId>,
	/// Uris of each source's latest report, with the reported content version.
	claimed: HashMap<SourceId, HashMap<ResourceUri, DateTime<Utc>>>,
	known: HashMap<SourceId, KnownResolved>,
	failures: HashMap<SourceId, BTreeMap<ResourceUri, ResolveError>>,
	faulted: bool,
}

impl Tracker {
	fn is_claimed(&self, source: &SourceId, resource: &Resource) -> bool {
		self.claimed
			.get(source)
			.and_then(|claimed| claimed.get(resource.uri()))
			.is_some_and(|version| resource.content_version() >= *version)
	}

	/// Inserts a resolved resource unless another source already holds its uri.
	fn merge(&mut self, source: &SourceId, resource: Resource) {
		if let Some(failures) = self.failures.get_mut(source) {
			failures.remove(resource.uri());
		}

		match self.resources.get(resource.uri()) {
			Some(current) if current.source() != source => {
				warn!(
					uri = %resource.uri(),
					owner = %current.source(),
					%source,
					"Resource already provided by another source, ignoring it"
				);
			}
			_ => {
				self.resources.insert(resource.uri().clone(), resource);
			}
		}
	}

	fn strip(&mut self, source: &SourceId) {
		self.resources
			.retain(|_, resource| resource.source() != source);
	}

	fn apply_outcome(
		&mut self,
		source: &SourceId,
		uri: &ResourceUri,
		content_version: DateTime<Utc>,
		outcome: Result<Resource, ResolveError>,
	) {
		match outcome {
			Ok(resource) => {
				if self.is_claimed(source, &resource) {
					trace!(%uri, "Merging resolved resource");
					self.merge(source, resource);
				} else {
					trace!(%uri, "Resolved resource no longer claimed, keeping it for later reuse only");
				}
			}

			Err(e) => {
				let current = self
					.claimed
					.get(source)
					.and_then(|claimed| claimed.get(uri))
					.is_some_and(|claimed| *claimed == content_version);

				if !current {
					trace!(%uri, "Failed resource no longer claimed at this version, ignoring failure");
					return;
				}

				if self.resources.get(uri).is_some_and(|resource| {
					resource.source() == source && resource.content_version() <= content_version
				}) {
					self.resources.remove(uri);
				}
				self.failures
					.entry(source.clone())
					.or_default()
					.insert(uri.clone(), e);
			}
		}
	}

	fn apply_batch(&mut self, source: &SourceId, result: BatchResult) {
		for (uri, resource) in result.resolved {
			let content_version = resource.content_version();
			self.apply_outcome(source, &uri, content_version, Ok(resource));
		}

		for (uri, FailedResolve { content_version, error }) in result.failed {
			self.apply_outcome(source, &uri, content_version, Err(error));
		}
	}
}

impl TaskListener<SourceId> for Tracker {
	type Output = BatchResult;
	type Progress = ResolveProgress;

	fn task_finished(&mut self, source: &SourceId, task: &ResolveTask) {
		match task.take_output() {
			Some(result) => {
				debug!(
					%source,
					resolved = result.resolved.len(),
					failed = result.failed.len(),
					"Resolution finished"
				);
				self.apply_batch(source, result);
			}
			None => warn!(%source, task_id = %task.id(), "Resolution finished without output"),
		}
	}

	fn task_cancelled(&mut self, source: &SourceId, task: &ResolveTask) {
		debug!(%source, task_id = %task.id(), "Resolution canceled");
	}

	fn task_preempted(&mut self, source: &SourceId, task: &ResolveTask) {
		trace!(%source, task_id = %task.id(), "Resolution preempted before running");
	}

	fn task_progress(&mut self, source: &SourceId, _task: &ResolveTask, progress: ResolveProgress) {
		let ResolveProgress {
			uri,
			content_version,
			outcome,
		} = progress;
		self.apply_outcome(source, &uri, content_version, outcome);
	}
}

enum Next {
	Source(SourceId, SourceReport),
	Worker(BatchReport),
	Idle,
}

/// Merges the reports of every registered [`ResourceSource`] into one [`AggregateView`],
/// resolving new resources through the registered [`ResolverProvider`]s.
///
/// Each source gets at most one resolution batch running at a time, keyed by its id. A newer
/// report for a source preempts the resolution of the older one, whatever that older batch
/// resolved is reused by the next one.
///
/// Every method must be called from the thread that created the reconciler, unless another
/// [`ThreadAffinity`] is given through [`Reconciler::with_affinity`].
pub struct Reconciler {
	coordinator: Coordinator<SourceId, Tracker>,
	sources: Vec<Arc<dyn ResourceSource>>,
	providers: Arc<[Arc<dyn ResolverProvider>]>,
	reports: StreamMap<SourceId, WatchStream<SourceReport>>,
	view_tx: watch::Sender<AggregateView>,
}

impl fmt::Debug for Reconciler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Reconciler")
			.field("coordinator", &self.coordinator)
			.field("sources", &self.sources)
			.field("providers", &self.providers)
			.finish_non_exhaustive()
	}
}

impl Reconciler {
	/// Creates a reconciler pinned to the calling thread.
	pub fn new(
		providers: impl IntoIterator<Item = Arc<dyn ResolverProvider>>,
		executor: Arc<dyn Executor>,
	) -> Self {
		Self::with_affinity(providers, executor, PinnedThread::current())
	}

	pub fn with_affinity(
		providers: impl IntoIterator<Item = Arc<dyn ResolverProvider>>,
		executor: Arc<dyn Executor>,
		affinity: impl ThreadAffinity,
	) -> Self {
		let (view_tx, _view_rx) = watch::channel(AggregateView::default());

		Self {
			coordinator: Coordinator::with_affinity(Tracker::default(), executor, affinity),
			sources: Vec::new(),
			providers: providers.into_iter().collect(),
			reports: StreamMap::new(),
			view_tx,
		}
	}

	/// Builds a reconciler with the default providers, a worker pool and one
	/// [`DirectorySource`] per configured directory.
	pub fn from_config(config: &MapDataConfig) -> Result<Self, Error> {
		let executor = config
			.workers
			.map_or_else(WorkerPool::with_available_parallelism, WorkerPool::new);

		let mut reconciler = Self::new(default_providers(), Arc::new(executor));
		for directory in &config.directories {
			reconciler.add_source(Arc::new(DirectorySource::new(
				directory.id.as_str(),
				directory.path.clone(),
			)))?;
		}

		Ok(reconciler)
	}

	fn check_usable(&self) -> Result<(), PreconditionError> {
		self.coordinator.check_thread()?;
		if self.coordinator.is_disposed() {
			return Err(PreconditionError::Disposed);
		}
		Ok(())
	}

	fn source(&self, id: &SourceId) -> Option<&Arc<dyn ResourceSource>> {
		self.sources.iter().find(|source| source.id() == id)
	}

	/// Registers `source` and asks it to refresh. The source counts as loading until its
	/// first report is handled.
	#[instrument(skip_all, fields(source = %source.id()), err)]
	pub fn add_source(&mut self, source: Arc<dyn ResourceSource>) -> Result<(), Error> {
		self.check_usable()?;

		let id = source.id().clone();
		if self.source(&id).is_some() {
			return Err(Error::DuplicateSource(id));
		}

		self.reports
			.insert(id.clone(), WatchStream::new(source.reports()));

		let tracker = self.coordinator.listener_mut();
		tracker.loading.insert(id.clone());
		tracker.known.insert(id.clone(), KnownResolved::default());

		self.sources.push(Arc::clone(&source));
		self.publish();

		source.refresh(HashMap::new());

		Ok(())
	}

	/// Unregisters a source, dropping its resources and canceling its resolution.
	#[instrument(skip(self), err)]
	pub fn remove_source(&mut self, id: &SourceId) -> Result<(), Error> {
		self.check_usable()?;

		let Some(idx) = self.sources.iter().position(|source| source.id() == id) else {
			return Err(Error::UnknownSource(id.clone()));
		};

		self.sources.remove(idx);
		self.reports.remove(id);
		self.coordinator.cancel(id)?;

		let tracker = self.coordinator.listener_mut();
		tracker.loading.remove(id);
		tracker.claimed.remove(id);
		tracker.known.remove(id);
		tracker.failures.remove(id);
		tracker.strip(id);

		self.publish();

		Ok(())
	}

	/// Reconciles the aggregate with a report from `source`.
	#[instrument(skip_all, fields(%source), err)]
	pub fn on_source_report(&mut self, source: &SourceId, report: SourceReport) -> Result<(), Error> {
		self.check_usable()?;

		if self.source(source).is_none() {
			return Err(Error::UnknownSource(source.clone()));
		}

		match report {
			SourceReport::Loading => {
				trace!("Source is loading, stripping its resources");
				let tracker = self.coordinator.listener_mut();
				tracker.loading.insert(source.clone());
				tracker.claimed.remove(source);
				tracker.strip(source);
			}

			SourceReport::Resources(resources) => self.reconcile(source, resources)?,
		}

		self.publish();

		Ok(())
	}

	fn reconcile(&mut self, source: &SourceId, reported: HashSet<Resource>) -> Result<(), Error> {
		let tracker = self.coordinator.listener_mut();
		tracker.loading.remove(source);

		let known = tracker.known.entry(source.clone()).or_default().clone();

		let claimed = reported
			.iter()
			.map(|resource| (resource.uri().clone(), resource.content_version()))
			.collect::<HashMap<_, _>>();

		let removed = tracker
			.resources
			.values()
			.filter(|resource| {
				resource.source() == source && !claimed.contains_key(resource.uri())
			})
			.map(|resource| resource.uri().clone())
			.collect::<Vec<_>>();

		let mut unresolved = Vec::new();
		let mut changed = Vec::new();
		for resource in reported {
			if !resource.is_resolved() {
				unresolved.push(resource);
			} else if tracker
				.resources
				.get(resource.uri())
				.is_some_and(|current| current.is_same_state(&resource))
			{
				trace!(uri = %resource.uri(), "Resource unchanged");
			} else {
				changed.push(resource);
			}
		}

		trace!(
			unresolved = unresolved.len(),
			changed = changed.len(),
			removed = removed.len(),
			"Diffed source report"
		);

		for uri in &removed {
			tracker.resources.remove(uri);
		}

		if let Some(failures) = tracker.failures.get_mut(source) {
			failures.retain(|uri, _| claimed.contains_key(uri));
		}

		known.retain(|uri| claimed.contains_key(uri));
		for resource in changed {
			known.insert(resource.clone());
			tracker.merge(source, resource);
		}

		tracker.claimed.insert(source.clone(), claimed);

		if unresolved.is_empty() {
			if self.coordinator.cancel(source)? {
				debug!("Canceled stale resolution, nothing left to resolve");
			}
		} else {
			let batch = ResolveBatch::new(
				source.clone(),
				unresolved,
				known,
				Arc::clone(&self.providers),
			);
			self.coordinator.submit(source.clone(), batch.into_task())?;
		}

		Ok(())
	}

	/// Waits for the next source report or worker report and handles it.
	///
	/// Never returns if there are no sources and no resolution in flight.
	pub async fn process_next(&mut self) -> Result<(), Error> {
		self.coordinator.check_thread()?;

		let next = tokio::select! {
			Some((source, report)) = self.reports.next() => Next::Source(source, report),
			Some(report) = self.coordinator.next_report() => Next::Worker(report),
			else => Next::Idle,
		};

		match next {
			Next::Source(source, report) => self.on_source_report(&source, report),
			Next::Worker(report) => self.on_worker_report(report),
			Next::Idle => Ok(()),
		}
	}

	/// Handles every source and worker report already waiting, without blocking.
	pub fn process_ready(&mut self) -> Result<(), Error> {
		self.coordinator.check_thread()?;

		while let Some(Some((source, report))) = self.reports.next().now_or_never() {
			self.on_source_report(&source, report)?;
		}

		if let Err(e) = self.coordinator.process_ready() {
			return Err(self.fault(e));
		}
		self.publish();

		Ok(())
	}

	/// Processes reports until no source is loading and no resolution is in flight.
	pub async fn settle(&mut self) -> Result<(), Error> {
		loop {
			self.process_ready()?;
			if self.is_settled() {
				return Ok(());
			}
			self.process_next().await?;
		}
	}

	#[must_use]
	pub fn is_settled(&self) -> bool {
		self.coordinator.listener().loading.is_empty() && self.coordinator.is_idle()
	}

	fn on_worker_report(&mut self, report: BatchReport) -> Result<(), Error> {
		if let Err(e) = self.coordinator.handle_report(report) {
			return Err(self.fault(e));
		}
		self.publish();
		Ok(())
	}

	fn fault(&mut self, e: CoordinatorError) -> Error {
		if matches!(e, CoordinatorError::StaleCompletion { .. }) {
			error!(?e, "Reconciler hit an internal-consistency fault");
			self.coordinator.listener_mut().faulted = true;
			self.publish();
		}
		e.into()
	}

	fn status(&self) -> Status {
		let tracker = self.coordinator.listener();
		if tracker.faulted {
			Status::Error
		} else if !tracker.loading.is_empty() || !self.coordinator.is_idle() {
			Status::Loading
		} else {
			Status::Success
		}
	}

	fn publish(&self) {
		let status = self.status();
		let resources = &self.coordinator.listener().resources;

		let published = self.view_tx.send_if_modified(|view| {
			if view.same_as(status, resources) {
				return false;
			}
			view.status = status;
			view.resources.clone_from(resources);
			true
		});

		if published {
			trace!(?status, resources = resources.len(), "Published aggregate view");
		}
	}

	#[must_use]
	pub fn subscribe(&self) -> watch::Receiver<AggregateView> {
		self.view_tx.subscribe()
	}

	/// The latest published view.
	#[must_use]
	pub fn view(&self) -> AggregateView {
		self.view_tx.borrow().clone()
	}

	#[must_use]
	pub fn resolve_failures(&self) -> &HashMap<SourceId, BTreeMap<ResourceUri, ResolveError>> {
		&self.coordinator.listener().failures
	}

	#[must_use]
	pub fn failure(&self, uri: &ResourceUri) -> Option<&ResolveError> {
		self.resolve_failures()
			.values()
			.find_map(|failures| failures.get(uri))
	}

	/// Asks the source to re-scan, passing along the resources of it that are resolved.
	#[instrument(skip(self), err)]
	pub fn refresh_source(&self, id: &SourceId) -> Result<(), Error> {
		self.check_usable()?;

		let source = self
			.source(id)
			.ok_or_else(|| Error::UnknownSource(id.clone()))?;

		let known_resolved = self
			.coordinator
			.listener()
			.resources
			.values()
			.filter(|resource| resource.source() == id)
			.map(|resource| (resource.uri().clone(), resource.clone()))
			.collect();

		source.refresh(known_resolved);

		Ok(())
	}

	/// The first registered source that owns `uri`.
	#[must_use]
	pub fn owner_of(&self, uri: &ResourceUri) -> Option<&SourceId> {
		self.sources
			.iter()
			.find(|source| source.owns_resource(uri))
			.map(|source| source.id())
	}

	/// Cancels every resolution and stops listening to sources. The last published view is
	/// kept as is.
	pub fn dispose(&mut self) -> Result<(), Error> {
		self.coordinator.dispose()?;
		self.reports.clear();
		self.coordinator.listener_mut().loading.clear();
		Ok(())
	}

	#[must_use]
	pub fn is_disposed(&self) -> bool {
		self.coordinator.is_disposed()
	}
}
