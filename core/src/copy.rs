//! Byte-level transfer primitives shared by the import, export, and seeding
//! flows.

use std::{
	collections::VecDeque,
	path::{Path, PathBuf},
};

use tokio::{fs, io};
use tracing::trace;

use crate::{
	error::{FileIOError, TransferError},
	resource::ResolvedResource,
};

/// Streams a resolved resource into `destination`, creating parent
/// directories as needed. An existing destination is truncated (the conflict
/// gate has already run by the time this is called).
pub(crate) async fn stream_to_file(
	resource: &ResolvedResource,
	destination: &Path,
) -> Result<(), crate::Error> {
	if let Some(parent) = destination.parent() {
		fs::create_dir_all(parent)
			.await
			.map_err(|e| TransferError::from(FileIOError::from((parent, e))))?;
	}

	let mut reader = resource.open().await?;
	let mut file = fs::File::create(destination)
		.await
		.map_err(|e| TransferError::from(FileIOError::from((destination, e))))?;

	let written = io::copy(&mut reader, &mut file)
		.await
		.map_err(|e| TransferError::from(FileIOError::from((destination, e))))?;

	trace!(destination = %destination.display(), written, "resource streamed to file");

	Ok(())
}

/// Recursively mirrors `source` into `destination`, preserving structure.
/// Existing files are overwritten in place; extra files already present in
/// the destination are left alone.
pub(crate) async fn mirror_directory(
	source: &Path,
	destination: &Path,
) -> Result<(), FileIOError> {
	let mut pending = VecDeque::from([(source.to_path_buf(), destination.to_path_buf())]);

	while let Some((source_dir, target_dir)) = pending.pop_front() {
		fs::create_dir_all(&target_dir)
			.await
			.map_err(|e| FileIOError::from((&target_dir, e)))?;

		let mut read_dir = fs::read_dir(&source_dir)
			.await
			.map_err(|e| FileIOError::from((&source_dir, e)))?;

		while let Some(entry) = read_dir
			.next_entry()
			.await
			.map_err(|e| FileIOError::from((&source_dir, e)))?
		{
			let source_path = entry.path();
			let target_path = target_dir.join(entry.file_name());

			let file_type = entry
				.file_type()
				.await
				.map_err(|e| FileIOError::from((&source_path, e)))?;

			if file_type.is_dir() {
				pending.push_back((source_path, target_path));
			} else {
				fs::copy(&source_path, &target_path)
					.await
					.map_err(|e| FileIOError::from((&source_path, e)))?;
			}
		}
	}

	Ok(())
}

/// Copies a single managed path (file or directory) into `destination_dir`
/// under its own name.
pub(crate) async fn copy_into_dir(
	source: &Path,
	destination_dir: &Path,
) -> Result<PathBuf, FileIOError> {
	let name = source.file_name().ok_or_else(|| {
		FileIOError::from((
			source,
			std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
		))
	})?;
	let destination = destination_dir.join(name);

	let metadata = fs::metadata(source)
		.await
		.map_err(|e| FileIOError::from((source, e)))?;

	if metadata.is_dir() {
		mirror_directory(source, &destination).await?;
	} else {
		fs::copy(source, &destination)
			.await
			.map_err(|e| FileIOError::from((source, e)))?;
	}

	Ok(destination)
}
