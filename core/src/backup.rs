//! Timestamped zip snapshots of project folders, kept in a backups
//! directory under the managed app data tree.

use std::{
	io,
	path::{Path, PathBuf},
};

use chrono::Local;
use tokio::fs;
use tracing::info;

use crate::{
	error::{FileIOError, TransferError},
	storage::AppStorage,
};

pub struct BackupManager {
	backups_dir: PathBuf,
}

impl BackupManager {
	pub fn new(backups_dir: impl Into<PathBuf>) -> Self {
		Self {
			backups_dir: backups_dir.into(),
		}
	}

	pub fn for_storage(storage: &AppStorage) -> Self {
		Self::new(storage.app_data_dir().join("backups"))
	}

	pub fn backups_dir(&self) -> &Path {
		&self.backups_dir
	}

	/// Zips `project_dir` into `<name>_<timestamp>.zip` under the backups
	/// directory and returns the backup path.
	pub async fn create_backup(&self, project_dir: &Path) -> Result<PathBuf, TransferError> {
		let name = project_dir
			.file_name()
			.ok_or_else(|| {
				FileIOError::from((
					project_dir,
					io::Error::new(io::ErrorKind::InvalidInput, "project folder has no name"),
				))
			})?
			.to_string_lossy()
			.into_owned();

		fs::create_dir_all(&self.backups_dir)
			.await
			.map_err(|e| FileIOError::from((&self.backups_dir, e)))?;

		let stamp = Local::now().format("%Y%m%d_%H%M%S");
		let backup_path = self.backups_dir.join(format!("{name}_{stamp}.zip"));

		let project_dir = project_dir.to_path_buf();
		let target = backup_path.clone();
		tokio::task::spawn_blocking(move || -> Result<(), TransferError> {
			let file =
				std::fs::File::create(&target).map_err(|e| FileIOError::from((&target, e)))?;
			sg_archive::bundle_dir(file, &project_dir).map_err(TransferError::from)
		})
		.await
		.expect("backup bundling task panicked")?;

		info!(backup = %backup_path.display(), "project backup created");

		Ok(backup_path)
	}

	pub async fn restore_backup(
		&self,
		backup_path: &Path,
		destination: &Path,
	) -> Result<(), TransferError> {
		fs::create_dir_all(destination)
			.await
			.map_err(|e| FileIOError::from((destination, e)))?;

		let backup_path = backup_path.to_path_buf();
		let destination_dir = destination.to_path_buf();
		tokio::task::spawn_blocking(move || -> Result<(), TransferError> {
			let file = std::fs::File::open(&backup_path)
				.map_err(|e| FileIOError::from((&backup_path, e)))?;
			sg_archive::extract_all(file, &destination_dir).map_err(TransferError::from)
		})
		.await
		.expect("backup restore task panicked")?;

		info!(destination = %destination.display(), "project backup restored");

		Ok(())
	}

	/// Backups for `project_name`, oldest first. A missing backups
	/// directory just means there are none yet.
	pub async fn list_backups(&self, project_name: &str) -> Result<Vec<PathBuf>, FileIOError> {
		let prefix = format!("{project_name}_");
		let mut backups = Vec::new();

		let mut read_dir = match fs::read_dir(&self.backups_dir).await {
			Ok(read_dir) => read_dir,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(backups),
			Err(e) => return Err(FileIOError::from((&self.backups_dir, e))),
		};

		while let Some(entry) = read_dir
			.next_entry()
			.await
			.map_err(|e| FileIOError::from((&self.backups_dir, e)))?
		{
			let path = entry.path();
			let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
				continue;
			};

			if file_name.starts_with(&prefix) && file_name.ends_with(".zip") {
				backups.push(path);
			}
		}

		backups.sort();

		Ok(backups)
	}

	pub async fn delete_backup(&self, backup_path: &Path) -> Result<(), FileIOError> {
		fs::remove_file(backup_path)
			.await
			.map_err(|e| FileIOError::from((backup_path, e)))?;
		info!(backup = %backup_path.display(), "backup deleted");

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use tempfile::tempdir;

	async fn sample_project(root: &Path) -> PathBuf {
		let project_dir = root.join("fieldwork");
		fs::create_dir_all(project_dir.join("layers")).await.unwrap();
		fs::write(project_dir.join("fieldwork.qgs"), b"<qgis/>")
			.await
			.unwrap();
		fs::write(project_dir.join("layers/points.gpkg"), b"payload")
			.await
			.unwrap();
		project_dir
	}

	#[tokio::test]
	async fn backup_and_restore_round_trip() {
		let dir = tempdir().unwrap();
		let project_dir = sample_project(dir.path()).await;
		let manager = BackupManager::new(dir.path().join("backups"));

		let backup = manager.create_backup(&project_dir).await.unwrap();
		assert!(backup.file_name().unwrap().to_str().unwrap().starts_with("fieldwork_"));

		let restored = dir.path().join("restored");
		manager.restore_backup(&backup, &restored).await.unwrap();

		assert_eq!(
			fs::read(restored.join("fieldwork.qgs")).await.unwrap(),
			b"<qgis/>"
		);
		assert_eq!(
			fs::read(restored.join("layers/points.gpkg")).await.unwrap(),
			b"payload"
		);
	}

	#[tokio::test]
	async fn listing_filters_by_project_name() {
		let dir = tempdir().unwrap();
		let project_dir = sample_project(dir.path()).await;
		let manager = BackupManager::new(dir.path().join("backups"));

		assert!(manager.list_backups("fieldwork").await.unwrap().is_empty());

		let backup = manager.create_backup(&project_dir).await.unwrap();

		assert_eq!(manager.list_backups("fieldwork").await.unwrap(), [backup.clone()]);
		assert!(manager.list_backups("other").await.unwrap().is_empty());

		manager.delete_backup(&backup).await.unwrap();
		assert!(manager.list_backups("fieldwork").await.unwrap().is_empty());
	}
}
