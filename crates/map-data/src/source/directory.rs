use md_utils::error::FileIOError;

use std::{
	collections::{HashMap, HashSet},
	fs,
	path::{Path, PathBuf},
	sync::Arc,
};

use chrono::{DateTime, Utc};
use tokio::{runtime::Handle, sync::watch};
use tracing::{debug, error, instrument, trace, warn};

use crate::resource::{Resource, ResourceUri, SourceId};

use super::{ResourceSource, SourceReport};

/// Reports every entry of a local directory as a resource.
///
/// Files and directories directly under the root are reported (hidden ones skipped), the
/// content version of each is its modification time.
#[derive(Debug)]
pub struct DirectorySource {
	id: SourceId,
	root: Arc<PathBuf>,
	reports_tx: watch::Sender<SourceReport>,
}

impl DirectorySource {
	pub fn new(id: impl Into<SourceId>, root: impl Into<PathBuf>) -> Self {
		let (reports_tx, _reports_rx) = watch::channel(SourceReport::Loading);
		Self {
			id: id.into(),
			root: Arc::new(root.into()),
			reports_tx,
		}
	}

	/// Scans the root directory on the calling thread.
	pub fn scan(
		&self,
		known_resolved: &HashMap<ResourceUri, Resource>,
	) -> Result<HashSet<Resource>, FileIOError> {
		scan(&self.id, &self.root, known_resolved)
	}
}

#[instrument(skip_all, fields(%source, root = %root.display()), err)]
fn scan(
	source: &SourceId,
	root: &Path,
	known_resolved: &HashMap<ResourceUri, Resource>,
) -> Result<HashSet<Resource>, FileIOError> {
	let mut resources = HashSet::new();

	let entries = fs::read_dir(root)
		.map_err(|e| FileIOError::from((root, e, "Failed to read map data directory")))?;

	for entry in entries {
		let entry = match entry {
			Ok(entry) => entry,
			Err(e) => {
				let e = FileIOError::from((root, e, "Failed to read directory entry"));
				warn!(?e, "Skipping unreadable directory entry");
				continue;
			}
		};
		let path = entry.path();

		if entry.file_name().to_string_lossy().starts_with('.') {
			continue;
		}

		// follows symlinks, the resource is whatever the link points to
		let metadata = match fs::metadata(&path) {
			Ok(metadata) => metadata,
			Err(e) => {
				let e = FileIOError::from((&path, e));
				warn!(?e, "Skipping directory entry without readable metadata");
				continue;
			}
		};

		let maybe_uri = if metadata.is_dir() {
			ResourceUri::from_directory_path(&path)
		} else {
			ResourceUri::from_file_path(&path)
		};

		let Some(uri) = maybe_uri else {
			trace!(path = %path.display(), "Skipping entry that can't be expressed as a file uri");
			continue;
		};

		let content_version = metadata
			.modified()
			.map_or_else(|_| Utc::now(), DateTime::<Utc>::from);

		let resource = match known_resolved.get(&uri) {
			Some(known) if known.is_resolved() && known.content_version() >= content_version => {
				known.clone()
			}
			_ => Resource::new(uri, source.clone(), content_version),
		};

		resources.insert(resource);
	}

	debug!(count = resources.len(), "Scanned map data directory");

	Ok(resources)
}

impl ResourceSource for DirectorySource {
	fn id(&self) -> &SourceId {
		&self.id
	}

	fn reports(&self) -> watch::Receiver<SourceReport> {
		self.reports_tx.subscribe()
	}

	fn owns_resource(&self, uri: &ResourceUri) -> bool {
		uri.local_path()
			.is_some_and(|path| path.starts_with(self.root.as_path()))
	}

	fn refresh(&self, known_resolved: HashMap<ResourceUri, Resource>) {
		self.reports_tx.send_replace(SourceReport::Loading);

		let id = self.id.clone();
		let root = Arc::clone(&self.root);
		let reports_tx = self.reports_tx.clone();

		let job = move || {
			let resources = scan(&id, &root, &known_resolved).unwrap_or_else(|e| {
				error!(source = %id, ?e, "Failed to scan map data directory, reporting it empty");
				HashSet::new()
			});
			reports_tx.send_replace(SourceReport::Resources(resources));
		};

		match Handle::try_current() {
			Ok(handle) => drop(handle.spawn_blocking(job)),
			Err(_) => job(),
		}
	}
}
