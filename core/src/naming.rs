use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::FileIOError;

/// Splits a base name into stem and extension at the last `.`; the extension
/// keeps its leading dot and is empty when there is none.
pub fn split_base_name(base_name: &str) -> (&str, &str) {
	match base_name.rfind('.') {
		Some(idx) => base_name.split_at(idx),
		None => (base_name, ""),
	}
}

/// The naming rule alone: where `base_name` would land inside `dir`, with no
/// existence probing. Used by the conflict gate and by confirmed
/// overwrite-in-place imports.
pub fn proposed_path(dir: impl AsRef<Path>, base_name: &str) -> PathBuf {
	dir.as_ref().join(base_name)
}

/// Finds an unused path for `base_name` inside `dir` by probing `_1, _2, …`
/// suffixes between stem and extension.
///
/// The probe is linear and unbounded; collisions come from user-driven
/// imports, not bulk ingestion. No lock is taken, so two concurrent
/// allocations racing on the same name may pick the same free slot — callers
/// must create the returned path promptly.
pub async fn find_available_path(
	dir: impl AsRef<Path>,
	base_name: &str,
) -> Result<PathBuf, FileIOError> {
	let dir = dir.as_ref();

	let first = dir.join(base_name);
	if !try_exists(&first).await? {
		return Ok(first);
	}

	let (stem, extension) = split_base_name(base_name);

	let mut counter = 1u32;
	loop {
		let candidate = dir.join(format!("{stem}_{counter}{extension}"));
		if !try_exists(&candidate).await? {
			return Ok(candidate);
		}
		counter += 1;
	}
}

async fn try_exists(path: &Path) -> Result<bool, FileIOError> {
	fs::try_exists(path)
		.await
		.map_err(|e| FileIOError::from((path, e)))
}
