use std::{io, path::Path};

use thiserror::Error;

/// File I/O error annotated with the path that caused it.
#[derive(Error, Debug)]
#[error("I/O error at '{}': {source}", .path.display())]
pub struct FileIOError {
	pub path: Box<Path>,
	#[source]
	pub source: io::Error,
}

impl<P: AsRef<Path>> From<(P, io::Error)> for FileIOError {
	fn from((path, source): (P, io::Error)) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
		}
	}
}

/// Failure to turn an external reference into a name plus byte stream.
#[derive(Error, Debug)]
pub enum ResolutionError {
	#[error("resource carries neither a display name nor a content type hint")]
	AmbiguousResource,
	#[error("failed to open the resource byte stream")]
	StreamOpen(#[source] io::Error),
}

/// I/O failure while copying or extracting; surfaced to the user only as an
/// operation-category message, never as raw diagnostics.
#[derive(Error, Debug)]
pub enum TransferError {
	#[error(transparent)]
	Io(#[from] FileIOError),
	#[error(transparent)]
	Archive(#[from] sg_archive::ArchiveError),
}
