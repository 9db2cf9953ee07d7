use md_utils::error::FileIOError;

use std::{
	num::NonZeroUsize,
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use super::error::ConfigError;

/// How to build a [`Reconciler`](crate::Reconciler) at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapDataConfig {
	/// Worker threads resolving resources, defaults to the available parallelism.
	pub workers: Option<NonZeroUsize>,
	pub directories: Vec<DirectoryConfig>,
}

/// A local directory scanned for map data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConfig {
	pub id: String,
	pub path: PathBuf,
}

impl MapDataConfig {
	pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();

		let config: Self = serde_json::from_slice(
			&fs::read(path)
				.await
				.map_err(|e| FileIOError::from((path, e, "Failed to read map data config")))?,
		)?;

		debug!(
			path = %path.display(),
			directories = config.directories.len(),
			"Loaded map data config"
		);

		Ok(config)
	}

	pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
		let path = path.as_ref();

		fs::write(path, serde_json::to_vec_pretty(self)?)
			.await
			.map_err(|e| FileIOError::from((path, e, "Failed to write map data config")).into())
	}
}

#[cfg(test)]
mod tests {
	use tempfile::tempdir;

	use super::*;

	#[tokio::test]
	async fn missing_fields_use_defaults() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("map_data.json");
		tokio::fs::write(&path, r#"{ "directories": [{ "id": "local", "path": "/maps" }] }"#)
			.await
			.unwrap();

		let config = MapDataConfig::load(&path).await.unwrap();
		assert_eq!(config.workers, None);
		assert_eq!(
			config.directories,
			vec![DirectoryConfig {
				id: "local".to_string(),
				path: PathBuf::from("/maps"),
			}]
		);
	}

	#[tokio::test]
	async fn save_then_load() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("map_data.json");
		let config = MapDataConfig {
			workers: NonZeroUsize::new(2),
			directories: vec![],
		};

		config.save(&path).await.unwrap();
		assert_eq!(MapDataConfig::load(&path).await.unwrap(), config);
	}

	#[tokio::test]
	async fn io_and_parse_errors_are_distinct() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("map_data.json");

		assert!(matches!(
			MapDataConfig::load(&path).await,
			Err(ConfigError::FileIO(_))
		));

		tokio::fs::write(&path, "not json").await.unwrap();
		assert!(matches!(
			MapDataConfig::load(&path).await,
			Err(ConfigError::SerdeJson(_))
		));
	}
}
