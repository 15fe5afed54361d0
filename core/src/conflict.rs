use std::path::PathBuf;

use tokio::fs;

use crate::error::FileIOError;

/// The subset of a job's proposed destinations that already exist, computed
/// non-destructively before any write.
#[derive(Debug, Default)]
pub struct ConflictSet {
	existing: Vec<PathBuf>,
}

impl ConflictSet {
	pub fn is_empty(&self) -> bool {
		self.existing.is_empty()
	}

	pub fn len(&self) -> usize {
		self.existing.len()
	}

	pub fn paths(&self) -> &[PathBuf] {
		&self.existing
	}
}

/// The host's answer to a non-empty [`ConflictSet`]. `Proceed` means
/// overwrite-or-allocate, not blind overwrite: destinations that no longer
/// collide at execution time are simply written, the rest are overwritten in
/// place. `Abandon` leaves the filesystem untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictDecision {
	Proceed,
	Abandon,
}

pub async fn check(proposed: &[PathBuf]) -> Result<ConflictSet, FileIOError> {
	let mut conflicts = ConflictSet::default();

	for path in proposed {
		if fs::try_exists(path)
			.await
			.map_err(|e| FileIOError::from((path, e)))?
		{
			conflicts.existing.push(path.clone());
		}
	}

	Ok(conflicts)
}
