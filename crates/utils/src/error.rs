use std::{fmt::Display, io, path::Path};

use thiserror::Error;

/// File I/O error that includes the path that caused the error
#[derive(Error, Debug)]
pub struct FileIOError {
	pub path: Box<Path>,
	#[source]
	pub source: io::Error,
	pub maybe_context: Option<&'static str>,
}

impl Display for FileIOError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "file I/O error")?;
		if let Some(ctx) = self.maybe_context {
			write!(f, " ({ctx})")?;
		}
		write!(f, ": {}; path: '{}'", self.source, self.path.display())
	}
}

impl<P: AsRef<Path>> From<(P, io::Error)> for FileIOError {
	fn from((path, source): (P, io::Error)) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: None,
		}
	}
}

impl<P: AsRef<Path>> From<(P, io::Error, &'static str)> for FileIOError {
	fn from((path, source, context): (P, io::Error, &'static str)) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: Some(context),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_includes_context_and_path() {
		let err = FileIOError::from((
			"/maps/missing.geojson",
			io::Error::from(io::ErrorKind::NotFound),
			"Failed to read map data",
		));

		let msg = err.to_string();
		assert!(msg.starts_with("file I/O error (Failed to read map data): "));
		assert!(msg.ends_with("path: '/maps/missing.geojson'"));
	}
}
