use std::{
	io,
	path::{Path, PathBuf},
};

use tokio::fs;
use tracing::{info, warn};

use crate::error::FileIOError;

pub const DATASETS_DIR: &str = "Imported Datasets";
pub const PROJECTS_DIR: &str = "Imported Projects";
pub const APP_DATA_DIR: &str = "SIGPACGO";

const APP_DATA_SUBDIRS: &[&str] = &["basemaps", "fonts", "proj", "auth", "logs", "plugins"];
// System-wide roots carry no plugin code.
const SYSTEM_DATA_SUBDIRS: &[&str] = &["basemaps", "fonts", "proj", "auth", "logs"];

/// Whether the host granted access to system-wide storage roots. `Denied`
/// restricts the pipeline to its managed roots; it is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageAccess {
	Granted,
	Denied,
}

/// The application-managed storage tree. All imported and seeded content
/// lives under these roots; the layout is created idempotently at bootstrap.
#[derive(Debug, Clone)]
pub struct AppStorage {
	root: PathBuf,
	cache_dir: PathBuf,
	data_dirs: Vec<PathBuf>,
}

impl AppStorage {
	pub async fn bootstrap(
		root: impl Into<PathBuf>,
		cache_dir: impl Into<PathBuf>,
		system_roots: &[PathBuf],
		access: StorageAccess,
	) -> Result<Self, FileIOError> {
		let root = root.into();
		let cache_dir = cache_dir.into();

		create_dir(&root.join(DATASETS_DIR)).await?;
		create_dir(&root.join(PROJECTS_DIR)).await?;

		let app_data_dir = root.join(APP_DATA_DIR);
		for subdir in APP_DATA_SUBDIRS {
			create_dir(&app_data_dir.join(subdir)).await?;
		}

		create_dir(&cache_dir).await?;

		let mut data_dirs = vec![app_data_dir];

		match access {
			StorageAccess::Granted => {
				for system_root in system_roots {
					let data_dir = system_root.join(APP_DATA_DIR);
					// An unwritable system root is skipped, never fatal.
					match prepare_system_data_dir(&data_dir).await {
						Ok(()) => data_dirs.push(data_dir),
						Err(e) => {
							warn!(data_dir = %data_dir.display(), "skipping unwritable storage root: {e}");
						}
					}
				}
			}
			StorageAccess::Denied => {
				info!("system-wide storage access denied, operating on managed roots only");
			}
		}

		info!(root = %root.display(), "managed storage ready");

		Ok(Self {
			root,
			cache_dir,
			data_dirs,
		})
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn imported_datasets_dir(&self) -> PathBuf {
		self.root.join(DATASETS_DIR)
	}

	pub fn imported_projects_dir(&self) -> PathBuf {
		self.root.join(PROJECTS_DIR)
	}

	pub fn app_data_dir(&self) -> PathBuf {
		self.root.join(APP_DATA_DIR)
	}

	/// Private cache location for export bundles and open-staging copies.
	pub fn cache_dir(&self) -> &Path {
		&self.cache_dir
	}

	/// Every data directory the engine layer should scan, managed root
	/// first, then any granted system-wide roots.
	pub fn data_dirs(&self) -> &[PathBuf] {
		&self.data_dirs
	}

	/// Deletes a managed dataset file, returning its parent directory so the
	/// caller can re-open the containing view.
	pub async fn remove_dataset(&self, path: impl AsRef<Path>) -> Result<PathBuf, FileIOError> {
		let path = path.as_ref();
		let parent = self.managed_parent(path)?;

		fs::remove_file(path)
			.await
			.map_err(|e| FileIOError::from((path, e)))?;
		info!(path = %path.display(), "removed dataset");

		Ok(parent)
	}

	/// Deletes a managed project folder recursively, returning its parent
	/// directory.
	pub async fn remove_project_folder(
		&self,
		path: impl AsRef<Path>,
	) -> Result<PathBuf, FileIOError> {
		let path = path.as_ref();
		let parent = self.managed_parent(path)?;

		fs::remove_dir_all(path)
			.await
			.map_err(|e| FileIOError::from((path, e)))?;
		info!(path = %path.display(), "removed project folder");

		Ok(parent)
	}

	fn managed_parent(&self, path: &Path) -> Result<PathBuf, FileIOError> {
		if !path.starts_with(&self.root) {
			return Err(FileIOError::from((
				path,
				io::Error::new(
					io::ErrorKind::PermissionDenied,
					"path is outside managed storage",
				),
			)));
		}

		path.parent().map(Path::to_path_buf).ok_or_else(|| {
			FileIOError::from((
				path,
				io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"),
			))
		})
	}
}

async fn create_dir(path: &Path) -> Result<(), FileIOError> {
	fs::create_dir_all(path)
		.await
		.map_err(|e| FileIOError::from((path, e)))
}

async fn prepare_system_data_dir(data_dir: &Path) -> Result<(), FileIOError> {
	for subdir in SYSTEM_DATA_SUBDIRS {
		create_dir(&data_dir.join(subdir)).await?;
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	use tempfile::tempdir;

	async fn bootstrap(root: &Path) -> AppStorage {
		AppStorage::bootstrap(root, root.join("cache"), &[], StorageAccess::Denied)
			.await
			.unwrap()
	}

	#[tokio::test]
	async fn bootstrap_creates_the_managed_layout() {
		let dir = tempdir().unwrap();

		let storage = bootstrap(dir.path()).await;

		assert!(storage.imported_datasets_dir().is_dir());
		assert!(storage.imported_projects_dir().is_dir());
		for subdir in ["basemaps", "fonts", "proj", "auth", "logs", "plugins"] {
			assert!(storage.app_data_dir().join(subdir).is_dir());
		}

		// Idempotent on a second run.
		bootstrap(dir.path()).await;
	}

	#[tokio::test]
	async fn granted_access_adds_system_roots() {
		let dir = tempdir().unwrap();
		let system_root = dir.path().join("sdcard");
		tokio::fs::create_dir(&system_root).await.unwrap();

		let storage = AppStorage::bootstrap(
			dir.path().join("app"),
			dir.path().join("cache"),
			&[system_root.clone()],
			StorageAccess::Granted,
		)
		.await
		.unwrap();

		assert_eq!(storage.data_dirs().len(), 2);
		assert!(system_root.join(APP_DATA_DIR).join("basemaps").is_dir());
		assert!(!system_root.join(APP_DATA_DIR).join("plugins").exists());
	}

	#[tokio::test]
	async fn removal_refuses_paths_outside_managed_storage() {
		let dir = tempdir().unwrap();
		let storage = bootstrap(dir.path()).await;

		let outside = tempdir().unwrap();
		let stray = outside.path().join("stray.gpkg");
		tokio::fs::write(&stray, b"x").await.unwrap();

		assert!(storage.remove_dataset(&stray).await.is_err());
		assert!(stray.exists());
	}

	#[tokio::test]
	async fn remove_dataset_returns_parent() {
		let dir = tempdir().unwrap();
		let storage = bootstrap(dir.path()).await;
		let dataset = storage.imported_datasets_dir().join("survey.gpkg");
		tokio::fs::write(&dataset, b"x").await.unwrap();

		let parent = storage.remove_dataset(&dataset).await.unwrap();

		assert_eq!(parent, storage.imported_datasets_dir());
		assert!(!dataset.exists());
	}
}
