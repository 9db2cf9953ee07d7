#![allow(dead_code)]

use md_map_data::{
	LayerDescriptor, LayerKind, ProviderId, Reconciler, ResolveError, ResolvedInfo, Resource,
	ResolverProvider, ResourceUri,
};
use md_task_system::WorkerPool;

use std::{
	future::Future,
	num::NonZeroUsize,
	sync::{
		atomic::{AtomicUsize, Ordering},
		mpsc, Arc,
	},
	time::Duration,
};

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tokio::time::{error::Elapsed, timeout};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub async fn within<F: Future>(fut: F) -> Result<F::Output, Elapsed> {
	timeout(TIMEOUT, fut).await
}

pub fn version(secs: i64) -> DateTime<Utc> {
	Utc.timestamp_opt(secs, 0).single().unwrap()
}

pub fn uri(name: &str) -> ResourceUri {
	ResourceUri::parse(&format!("https://maps.test/{name}")).unwrap()
}

pub fn remote(name: &str, secs: i64) -> Resource {
	Resource::new(uri(name), "remote".into(), version(secs))
}

/// Claims resources whose uri ends with `.gpkg` and resolves them to a single feature table.
/// Resources named `corrupt*` fail to resolve.
#[derive(Debug)]
pub struct GpkgProvider {
	calls: AtomicUsize,
	gate: Option<Gate>,
}

#[derive(Debug)]
struct Gate {
	entered_tx: Mutex<mpsc::Sender<String>>,
	release_rx: Mutex<mpsc::Receiver<()>>,
}

/// The test side of a gated provider: observes every resolve call and releases them one by
/// one.
pub struct GateHandle {
	entered_rx: mpsc::Receiver<String>,
	release_tx: mpsc::Sender<()>,
}

impl GateHandle {
	/// Waits for the provider to start resolving, returning the resource name.
	pub fn entered(&self) -> String {
		self.entered_rx.recv_timeout(TIMEOUT).unwrap()
	}

	pub fn release(&self, count: usize) {
		for _ in 0..count {
			self.release_tx.send(()).unwrap();
		}
	}
}

impl GpkgProvider {
	pub const ID: ProviderId = ProviderId::new("gpkg");

	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			calls: AtomicUsize::new(0),
			gate: None,
		})
	}

	pub fn gated() -> (Arc<Self>, GateHandle) {
		let (entered_tx, entered_rx) = mpsc::channel();
		let (release_tx, release_rx) = mpsc::channel();

		(
			Arc::new(Self {
				calls: AtomicUsize::new(0),
				gate: Some(Gate {
					entered_tx: Mutex::new(entered_tx),
					release_rx: Mutex::new(release_rx),
				}),
			}),
			GateHandle {
				entered_rx,
				release_tx,
			},
		)
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

impl ResolverProvider for GpkgProvider {
	fn id(&self) -> ProviderId {
		Self::ID
	}

	fn can_handle(&self, resource: &Resource) -> bool {
		resource.uri().as_str().ends_with(".gpkg")
	}

	fn resolve(&self, resource: &Resource) -> Result<ResolvedInfo, ResolveError> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let name = resource
			.uri()
			.as_str()
			.rsplit('/')
			.next()
			.unwrap_or_default()
			.trim_end_matches(".gpkg")
			.to_string();

		if let Some(gate) = &self.gate {
			gate.entered_tx.lock().send(name.clone()).unwrap();
			gate.release_rx.lock().recv_timeout(TIMEOUT).unwrap();
		}

		if name.starts_with("corrupt") {
			return Err(ResolveError::provider(resource.uri(), Self::ID, "corrupt"));
		}

		Ok(ResolvedInfo::new(
			name.clone(),
			Self::ID,
			[LayerDescriptor::new(
				name,
				resource.uri().clone(),
				LayerKind::FeatureTable,
			)],
		))
	}
}

pub fn reconciler(providers: Vec<Arc<dyn ResolverProvider>>) -> Reconciler {
	Reconciler::new(
		providers,
		Arc::new(WorkerPool::new(NonZeroUsize::new(2).unwrap())),
	)
}
