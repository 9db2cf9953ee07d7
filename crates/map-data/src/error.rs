use md_task_system::{CoordinatorError, PreconditionError};
use md_utils::error::FileIOError;

use thiserror::Error;

use super::resource::{ProviderId, ResourceUri, SourceId};

/// Why a single resource couldn't be resolved.
///
/// These never abort a batch, they are recorded per resource and exposed as data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
	#[error("resource content is not readable <uri='{uri}'>: {reason}")]
	Unreadable { uri: ResourceUri, reason: String },
	#[error("no provider can handle resource <uri='{0}'>")]
	NoProvider(ResourceUri),
	#[error("provider '{provider}' failed to resolve resource <uri='{uri}'>: {reason}")]
	Provider {
		uri: ResourceUri,
		provider: ProviderId,
		reason: String,
	},
}

impl ResolveError {
	pub fn provider(uri: &ResourceUri, provider: ProviderId, reason: impl Into<String>) -> Self {
		Self::Provider {
			uri: uri.clone(),
			provider,
			reason: reason.into(),
		}
	}

	#[must_use]
	pub const fn uri(&self) -> &ResourceUri {
		match self {
			Self::Unreadable { uri, .. } | Self::NoProvider(uri) | Self::Provider { uri, .. } => uri,
		}
	}
}

#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Coordinator(#[from] CoordinatorError),
	#[error("unknown resource source <id='{0}'>")]
	UnknownSource(SourceId),
	#[error("resource source already registered <id='{0}'>")]
	DuplicateSource(SourceId),
}

impl From<PreconditionError> for Error {
	fn from(e: PreconditionError) -> Self {
		Self::Coordinator(e.into())
	}
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error(transparent)]
	FileIO(#[from] FileIOError),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
}
