//! The export mirror flow: bundling managed paths and handing them to an
//! external consumer, or copying batches into an externally chosen tree.

use std::{
	io,
	path::{Path, PathBuf},
	sync::Arc,
};

use tokio::fs;
use tracing::{debug, error, instrument, warn};

use crate::{
	copy,
	error::{FileIOError, TransferError},
	events::{ExportSignal, PipelineEvents, ProgressSlot},
	pipeline::WorkerPool,
	resource::content_type_for_path,
	storage::AppStorage,
};

/// The external side of a handoff (share sheet, viewer, editor). Handoffs
/// are fire-and-forget; an `Err` means the consumer could not be reached at
/// all, not that it later declined the content.
pub trait ExternalConsumer: Send + Sync {
	fn share_file(&self, path: &Path, content_type: &str) -> io::Result<()>;
	fn open_file(&self, path: &Path, content_type: &str, editing: bool) -> io::Result<()>;
}

#[derive(Clone)]
pub struct Exporter {
	inner: Arc<Inner>,
}

struct Inner {
	storage: AppStorage,
	pool: Arc<WorkerPool>,
	events: Arc<dyn PipelineEvents>,
	progress: ProgressSlot,
	consumer: Arc<dyn ExternalConsumer>,
}

impl Exporter {
	pub fn new(
		storage: AppStorage,
		pool: Arc<WorkerPool>,
		events: Arc<dyn PipelineEvents>,
		progress: ProgressSlot,
		consumer: Arc<dyn ExternalConsumer>,
	) -> Self {
		Self {
			inner: Arc::new(Inner {
				storage,
				pool,
				events,
				progress,
				consumer,
			}),
		}
	}

	/// Shares one or more managed paths. A single path is handed off
	/// directly with no copy; more than one is first bundled into a single
	/// archive in the private cache. Bundling failure aborts before any
	/// handoff occurs.
	pub fn send_paths(&self, paths: Vec<PathBuf>) {
		let exporter = self.clone();
		self.inner
			.pool
			.dispatch(async move { exporter.send_paths_job(paths).await });
	}

	/// Zips a directory tree to the private cache, then hands it off.
	pub fn send_folder(&self, dir: impl Into<PathBuf>) {
		let dir = dir.into();
		let exporter = self.clone();
		self.inner
			.pool
			.dispatch(async move { exporter.send_folder_job(dir).await });
	}

	/// Copies each managed path into an externally chosen destination tree.
	/// The first per-file failure aborts the remaining batch and is reported
	/// as a single aggregate failure; files already copied stay in place.
	pub fn export_to_folder(&self, paths: Vec<PathBuf>, destination_dir: impl Into<PathBuf>) {
		let destination_dir = destination_dir.into();
		let exporter = self.clone();
		self.inner
			.pool
			.dispatch(async move { exporter.export_to_folder_job(paths, destination_dir).await });
	}

	/// Stages a managed file in the private cache and hands it to an
	/// external viewer or editor. After an edit, the host calls
	/// [`finish_external_edit`](Self::finish_external_edit) to copy the
	/// staged file back over the original.
	pub fn open_resource(&self, path: impl Into<PathBuf>, editing: bool) {
		let path = path.into();
		let exporter = self.clone();
		self.inner
			.pool
			.dispatch(async move { exporter.open_resource_job(path, editing).await });
	}

	pub async fn finish_external_edit(
		&self,
		staged: impl AsRef<Path>,
		original: impl AsRef<Path>,
	) -> Result<(), FileIOError> {
		let staged = staged.as_ref();
		let original = original.as_ref();

		fs::copy(staged, original)
			.await
			.map_err(|e| FileIOError::from((staged, e)))?;
		debug!(original = %original.display(), "external edit copied back");

		Ok(())
	}

	#[instrument(skip_all, fields(count = paths.len()))]
	async fn send_paths_job(self, paths: Vec<PathBuf>) {
		let signal = ExportSignal::new(Arc::clone(&self.inner.events), self.inner.progress.clone());
		self.inner.progress.begin("Preparing content to share…");

		if paths.is_empty() {
			warn!("export requested with no paths");
			signal.failed("Nothing to export");
			return;
		}

		if let [path] = paths.as_slice() {
			self.hand_off(signal, path, content_type_for_path(path));
			return;
		}

		let bundle = match self.bundle_paths(&paths).await {
			Ok(bundle) => bundle,
			Err(e) => {
				error!("failed to bundle files for export: {e}");
				signal.failed("Failed to share the selected files");
				return;
			}
		};

		self.hand_off(signal, &bundle, "application/zip");
	}

	#[instrument(skip_all, fields(dir = %dir.display()))]
	async fn send_folder_job(self, dir: PathBuf) {
		let signal = ExportSignal::new(Arc::clone(&self.inner.events), self.inner.progress.clone());
		self.inner.progress.begin("Preparing content to share…");

		let bundle = match self.bundle_folder(&dir).await {
			Ok(bundle) => bundle,
			Err(e) => {
				error!("failed to compress folder for export: {e}");
				signal.failed("Failed to share the compressed folder");
				return;
			}
		};

		self.hand_off(signal, &bundle, "application/zip");
	}

	async fn export_to_folder_job(self, paths: Vec<PathBuf>, destination_dir: PathBuf) {
		let signal = ExportSignal::new(Arc::clone(&self.inner.events), self.inner.progress.clone());
		self.inner.progress.begin("Exporting to folder…");

		for path in &paths {
			if let Err(e) = copy::copy_into_dir(path, &destination_dir).await {
				// First failure aborts the remainder; earlier copies stay.
				error!("export to folder failed: {e}");
				signal.failed("Failed to export files to the selected folder");
				return;
			}
		}

		debug!(destination = %destination_dir.display(), "export to folder finished");
		signal.succeeded();
	}

	async fn open_resource_job(self, path: PathBuf, editing: bool) {
		let signal = ExportSignal::new(Arc::clone(&self.inner.events), self.inner.progress.clone());
		self.inner.progress.begin("Opening file…");

		let Some(name) = path.file_name() else {
			warn!(path = %path.display(), "cannot stage a path without a file name");
			signal.failed("Failed to open the file externally");
			return;
		};

		let staged = self.inner.storage.cache_dir().join(name);
		if let Err(e) = fs::copy(&path, &staged).await {
			error!("failed to stage file for external open: {e}");
			signal.failed("Failed to open the file externally");
			return;
		}

		match self
			.inner
			.consumer
			.open_file(&staged, content_type_for_path(&path), editing)
		{
			Ok(()) => signal.succeeded(),
			Err(e) => {
				error!("external open handoff failed: {e}");
				signal.failed("Failed to open the file externally");
			}
		}
	}

	fn hand_off(&self, signal: ExportSignal, path: &Path, content_type: &str) {
		match self.inner.consumer.share_file(path, content_type) {
			Ok(()) => {
				debug!(path = %path.display(), "content handed to external consumer");
				signal.succeeded();
			}
			Err(e) => {
				error!("share handoff failed: {e}");
				signal.failed("Failed to share the selected files");
			}
		}
	}

	async fn bundle_paths(&self, paths: &[PathBuf]) -> Result<PathBuf, TransferError> {
		let first_name = paths[0].file_name().ok_or_else(|| {
			FileIOError::from((
				&paths[0],
				io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
			))
		})?;

		let bundle_path = self
			.inner
			.storage
			.cache_dir()
			.join(format!("{}.zip", first_name.to_string_lossy()));

		let paths = paths.to_vec();
		let target = bundle_path.clone();
		tokio::task::spawn_blocking(move || -> Result<(), TransferError> {
			let file =
				std::fs::File::create(&target).map_err(|e| FileIOError::from((&target, e)))?;
			sg_archive::bundle_files(file, &paths).map_err(TransferError::from)
		})
		.await
		.expect("export bundling task panicked")?;

		Ok(bundle_path)
	}

	async fn bundle_folder(&self, dir: &Path) -> Result<PathBuf, TransferError> {
		let name = dir.file_name().ok_or_else(|| {
			FileIOError::from((
				dir,
				io::Error::new(io::ErrorKind::InvalidInput, "folder has no name"),
			))
		})?;

		let bundle_path = self
			.inner
			.storage
			.cache_dir()
			.join(format!("{}.zip", name.to_string_lossy()));

		let dir = dir.to_path_buf();
		let target = bundle_path.clone();
		tokio::task::spawn_blocking(move || -> Result<(), TransferError> {
			let file =
				std::fs::File::create(&target).map_err(|e| FileIOError::from((&target, e)))?;
			sg_archive::bundle_dir(file, &dir).map_err(TransferError::from)
		})
		.await
		.expect("folder bundling task panicked")?;

		Ok(bundle_path)
	}
}
