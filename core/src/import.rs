//! The import state machine: `Created → Resolving → ConflictCheck →
//! [Paused] → Transferring → Notifying → Done | Failed`.
//!
//! The conflict check and the transfer are two separately dispatched units
//! of work, so no worker is ever held idle waiting for a human decision; a
//! job with conflicts parks in a single pending-decision slot until the host
//! answers through [`Importer::resolve_conflict`].

use std::{
	fmt, io,
	path::{Path, PathBuf},
	sync::{Arc, Mutex},
};

use futures_concurrency::future::TryJoin;
use tokio::fs;
use tokio_util::io::SyncIoBridge;
use tracing::{debug, error, instrument, warn};

use crate::{
	conflict::{self, ConflictDecision, ConflictSet},
	copy,
	error::{FileIOError, TransferError},
	events::{ImportSignal, PipelineEvents, ProgressSlot},
	naming,
	pipeline::WorkerPool,
	resource::{self, ExternalResource, ResolvedResource},
	storage::AppStorage,
	Error,
};

/// Manifest extensions recognized by default; hosts override them at the
/// boundary, the archive logic itself never hard-codes any.
pub const DEFAULT_MANIFEST_EXTENSIONS: &[&str] = &["qgs", "qgz"];

/// One import request, consumed entirely by the [`Importer`]. Jobs are not
/// persisted; an interrupted job is simply lost and must be restarted.
pub enum ImportJob {
	Datasets {
		sources: Vec<ExternalResource>,
	},
	ProjectFolder {
		source_dir: PathBuf,
	},
	ProjectArchive {
		source: ExternalResource,
	},
	ProjectUpdate {
		source: ExternalResource,
		project_path: PathBuf,
	},
	FileToTarget {
		source: ExternalResource,
		target_dir: PathBuf,
		file_name: Option<String>,
	},
}

impl ImportJob {
	pub fn single_dataset(source: ExternalResource) -> Self {
		Self::Datasets {
			sources: vec![source],
		}
	}

	pub fn datasets(sources: Vec<ExternalResource>) -> Self {
		Self::Datasets { sources }
	}

	pub fn project_folder(source_dir: impl Into<PathBuf>) -> Self {
		Self::ProjectFolder {
			source_dir: source_dir.into(),
		}
	}

	pub fn project_archive(source: ExternalResource) -> Self {
		Self::ProjectArchive { source }
	}

	pub fn project_update(source: ExternalResource, project_path: impl Into<PathBuf>) -> Self {
		Self::ProjectUpdate {
			source,
			project_path: project_path.into(),
		}
	}

	pub fn file_to_target(source: ExternalResource, target_dir: impl Into<PathBuf>) -> Self {
		Self::FileToTarget {
			source,
			target_dir: target_dir.into(),
			file_name: None,
		}
	}

	pub fn file_to_target_named(
		source: ExternalResource,
		target_dir: impl Into<PathBuf>,
		file_name: impl Into<String>,
	) -> Self {
		Self::FileToTarget {
			source,
			target_dir: target_dir.into(),
			file_name: Some(file_name.into()),
		}
	}

	pub fn kind(&self) -> ImportKind {
		match self {
			Self::Datasets { sources } if sources.len() > 1 => ImportKind::MultiDataset,
			Self::Datasets { .. } => ImportKind::SingleDataset,
			Self::ProjectFolder { .. } => ImportKind::ProjectFolder,
			Self::ProjectArchive { .. } => ImportKind::ProjectArchive,
			Self::ProjectUpdate { .. } => ImportKind::ProjectUpdate,
			Self::FileToTarget { .. } => ImportKind::FileToTarget,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
	SingleDataset,
	MultiDataset,
	ProjectFolder,
	ProjectArchive,
	ProjectUpdate,
	FileToTarget,
}

impl ImportKind {
	/// Updating a project overwrites its destination by definition, and a
	/// file-to-target caller has already chosen its destination; neither
	/// passes the conflict gate.
	fn is_gated(self) -> bool {
		matches!(
			self,
			Self::SingleDataset | Self::MultiDataset | Self::ProjectFolder | Self::ProjectArchive
		)
	}

	fn progress_message(self) -> &'static str {
		match self {
			Self::SingleDataset => "Importing dataset…",
			Self::MultiDataset => "Importing datasets…",
			Self::ProjectFolder | Self::ProjectArchive => "Importing project…",
			Self::ProjectUpdate => "Updating project…",
			Self::FileToTarget => "Receiving file…",
		}
	}

	/// Category message surfaced to the user; raw I/O diagnostics only ever
	/// reach the logs.
	fn failure_message(self) -> &'static str {
		match self {
			Self::SingleDataset | Self::MultiDataset => "Failed to import the selected dataset(s)",
			Self::ProjectFolder => "Failed to import the selected project folder",
			Self::ProjectArchive => "Failed to import the selected project archive",
			Self::ProjectUpdate => "Failed to update the project from the selected archive",
			Self::FileToTarget => "Failed to receive the selected file",
		}
	}
}

impl fmt::Display for ImportKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::SingleDataset => "dataset",
			Self::MultiDataset => "datasets",
			Self::ProjectFolder => "project folder",
			Self::ProjectArchive => "project archive",
			Self::ProjectUpdate => "project update",
			Self::FileToTarget => "file",
		})
	}
}

struct PendingImport {
	job: ImportJob,
	resolved: Vec<ResolvedResource>,
	signal: ImportSignal,
}

enum DirAllocation {
	/// The gate-checked destination; extraction overwrites in place.
	Proposed,
	/// A fresh `_n`-suffixed directory; used where no decision prompt is
	/// possible.
	CollisionAvoiding,
}

#[derive(Clone)]
pub struct Importer {
	inner: Arc<Inner>,
}

struct Inner {
	storage: AppStorage,
	pool: Arc<WorkerPool>,
	events: Arc<dyn PipelineEvents>,
	progress: ProgressSlot,
	pending: Mutex<Option<PendingImport>>,
	manifest_extensions: Vec<String>,
}

impl Importer {
	pub fn new(
		storage: AppStorage,
		pool: Arc<WorkerPool>,
		events: Arc<dyn PipelineEvents>,
		progress: ProgressSlot,
	) -> Self {
		Self::with_manifest_extensions(
			storage,
			pool,
			events,
			progress,
			DEFAULT_MANIFEST_EXTENSIONS
				.iter()
				.map(ToString::to_string)
				.collect(),
		)
	}

	pub fn with_manifest_extensions(
		storage: AppStorage,
		pool: Arc<WorkerPool>,
		events: Arc<dyn PipelineEvents>,
		progress: ProgressSlot,
		manifest_extensions: Vec<String>,
	) -> Self {
		Self {
			inner: Arc::new(Inner {
				storage,
				pool,
				events,
				progress,
				pending: Mutex::new(None),
				manifest_extensions,
			}),
		}
	}

	/// Submits a job; resolution and the conflict check run as one unit of
	/// work on the pool, the transfer as another.
	pub fn submit(&self, job: ImportJob) {
		let importer = self.clone();
		self.inner
			.pool
			.dispatch(async move { importer.check_phase(job).await });
	}

	/// The host's answer to a `conflict_pending` event. Ignored when nothing
	/// is awaiting a decision.
	pub fn resolve_conflict(&self, decision: ConflictDecision) {
		let Some(pending) = self
			.inner
			.pending
			.lock()
			.expect("pending import lock poisoned")
			.take()
		else {
			warn!("received a conflict decision with no import awaiting one");
			return;
		};

		match decision {
			ConflictDecision::Abandon => {
				debug!(kind = %pending.job.kind(), "conflict decision: abandon");
				pending.signal.cancelled();
			}
			ConflictDecision::Proceed => {
				debug!(kind = %pending.job.kind(), "conflict decision: proceed");
				self.dispatch_transfer(pending.job, pending.resolved, pending.signal);
			}
		}
	}

	#[instrument(skip_all, fields(kind = %job.kind()))]
	async fn check_phase(self, job: ImportJob) {
		let signal = ImportSignal::new(Arc::clone(&self.inner.events), self.inner.progress.clone());
		let kind = job.kind();

		let resolved = match self.resolve_sources(&job).await {
			Ok(resolved) => resolved,
			Err(e) => {
				warn!("resolution failed: {e}");
				signal.failed(kind.failure_message());
				return;
			}
		};

		if resolved.is_empty() && matches!(job, ImportJob::Datasets { .. }) {
			debug!("empty dataset batch, nothing to import");
			signal.cancelled();
			return;
		}

		if kind.is_gated() {
			let proposed = match self.proposed_destinations(&job, &resolved) {
				Ok(proposed) => proposed,
				Err(message) => {
					warn!("{message}");
					signal.failed(kind.failure_message());
					return;
				}
			};

			match conflict::check(&proposed).await {
				Ok(conflicts) if !conflicts.is_empty() => {
					debug!(
						conflicts = conflicts.len(),
						"destinations already exist, awaiting decision"
					);
					self.park(
						PendingImport {
							job,
							resolved,
							signal,
						},
						conflicts,
					);
					return;
				}
				Ok(_) => {}
				Err(e) => {
					error!("conflict check failed: {e}");
					signal.failed(kind.failure_message());
					return;
				}
			}
		}

		self.dispatch_transfer(job, resolved, signal);
	}

	fn park(&self, pending: PendingImport, conflicts: ConflictSet) {
		let superseded = self
			.inner
			.pending
			.lock()
			.expect("pending import lock poisoned")
			.replace(pending);

		// The decision slot is single-occupancy, like the progress
		// indicator: a newer import replaces the parked one.
		if let Some(superseded) = superseded {
			debug!("a newer import superseded the one awaiting a conflict decision");
			superseded.signal.cancelled();
		}

		self.inner.events.conflict_pending(conflicts.paths());
	}

	fn dispatch_transfer(
		&self,
		job: ImportJob,
		resolved: Vec<ResolvedResource>,
		signal: ImportSignal,
	) {
		let importer = self.clone();
		self.inner
			.pool
			.dispatch(async move { importer.transfer_phase(job, resolved, signal).await });
	}

	#[instrument(skip_all, fields(kind = %job.kind()))]
	async fn transfer_phase(
		self,
		job: ImportJob,
		resolved: Vec<ResolvedResource>,
		signal: ImportSignal,
	) {
		let kind = job.kind();
		self.inner.progress.begin(kind.progress_message());

		match self.transfer(job, resolved).await {
			Ok(path) => {
				debug!(path = %path.display(), "import finished");
				signal.succeeded(&path);
			}
			Err(e) => {
				error!("transfer failed: {e}");
				signal.failed(kind.failure_message());
			}
		}
	}

	async fn resolve_sources(&self, job: &ImportJob) -> Result<Vec<ResolvedResource>, Error> {
		Ok(match job {
			ImportJob::Datasets { sources } => {
				// Any single failure aborts the whole batch; partial success
				// is never reported as success.
				sources
					.iter()
					.map(resource::resolve)
					.collect::<Vec<_>>()
					.try_join()
					.await?
			}
			ImportJob::ProjectArchive { source }
			| ImportJob::ProjectUpdate { source, .. }
			| ImportJob::FileToTarget { source, .. } => vec![resource::resolve(source).await?],
			ImportJob::ProjectFolder { .. } => Vec::new(),
		})
	}

	fn proposed_destinations(
		&self,
		job: &ImportJob,
		resolved: &[ResolvedResource],
	) -> Result<Vec<PathBuf>, &'static str> {
		Ok(match job {
			ImportJob::Datasets { .. } => {
				let datasets_dir = self.inner.storage.imported_datasets_dir();
				resolved
					.iter()
					.map(|resource| naming::proposed_path(&datasets_dir, &resource.display_name))
					.collect()
			}
			ImportJob::ProjectFolder { source_dir } => {
				let name = source_dir
					.file_name()
					.ok_or("project folder source has no name")?;
				vec![self.inner.storage.imported_projects_dir().join(name)]
			}
			ImportJob::ProjectArchive { .. } => {
				let resource = resolved
					.first()
					.ok_or("archive import without a resolved source")?;
				let (stem, _) = naming::split_base_name(&resource.display_name);
				vec![naming::proposed_path(
					self.inner.storage.imported_projects_dir(),
					stem,
				)]
			}
			ImportJob::ProjectUpdate { .. } | ImportJob::FileToTarget { .. } => Vec::new(),
		})
	}

	async fn transfer(
		&self,
		job: ImportJob,
		mut resolved: Vec<ResolvedResource>,
	) -> Result<PathBuf, Error> {
		match job {
			ImportJob::Datasets { .. } => self.transfer_datasets(resolved).await,
			ImportJob::ProjectFolder { source_dir } => {
				self.transfer_project_folder(&source_dir).await
			}
			ImportJob::ProjectArchive { .. } => {
				let resource = take_single(&mut resolved);
				self.transfer_project_archive(resource).await
			}
			ImportJob::ProjectUpdate { project_path, .. } => {
				let resource = take_single(&mut resolved);
				self.transfer_project_update(resource, project_path).await
			}
			ImportJob::FileToTarget {
				target_dir,
				file_name,
				..
			} => {
				let resource = take_single(&mut resolved);
				self.transfer_file_to_target(resource, target_dir, file_name)
					.await
			}
		}
	}

	async fn transfer_datasets(&self, resolved: Vec<ResolvedResource>) -> Result<PathBuf, Error> {
		let datasets_dir = self.inner.storage.imported_datasets_dir();

		// A lone `.zip` carrying a project manifest is a project archive in
		// disguise; reclassify before any byte is written.
		if let [resource] = resolved.as_slice() {
			if resource.is_zip() {
				match self.scan_manifest(resource).await {
					Ok(Some(manifest)) => {
						debug!(%manifest, "dataset import reclassified as project archive");
						return self
							.extract_project(resource, &manifest, DirAllocation::CollisionAvoiding)
							.await;
					}
					Ok(None) => {}
					Err(e) => warn!("manifest scan failed, importing archive as dataset: {e}"),
				}
			}
		}

		let mut destination = datasets_dir.clone();
		for resource in &resolved {
			destination = naming::proposed_path(&datasets_dir, &resource.display_name);
			copy::stream_to_file(resource, &destination).await?;
		}

		Ok(if resolved.len() == 1 {
			destination
		} else {
			datasets_dir
		})
	}

	async fn transfer_project_folder(&self, source_dir: &Path) -> Result<PathBuf, Error> {
		let name = source_dir.file_name().ok_or_else(|| {
			TransferError::from(FileIOError::from((
				source_dir,
				io::Error::new(io::ErrorKind::InvalidInput, "source folder has no name"),
			)))
		})?;

		let target_dir = self.inner.storage.imported_projects_dir().join(name);
		copy::mirror_directory(source_dir, &target_dir)
			.await
			.map_err(TransferError::from)?;

		Ok(target_dir)
	}

	async fn transfer_project_archive(
		&self,
		resource: ResolvedResource,
	) -> Result<PathBuf, Error> {
		match self.scan_manifest(&resource).await? {
			Some(manifest) => {
				self.extract_project(&resource, &manifest, DirAllocation::Proposed)
					.await
			}
			None => {
				// A valid archive without a recognizable manifest is a plain
				// dataset, not a project bundle.
				debug!("archive carries no project manifest, importing as dataset");
				let destination = naming::proposed_path(
					self.inner.storage.imported_datasets_dir(),
					&resource.display_name,
				);
				copy::stream_to_file(&resource, &destination).await?;
				Ok(destination)
			}
		}
	}

	async fn transfer_project_update(
		&self,
		resource: ResolvedResource,
		project_path: PathBuf,
	) -> Result<PathBuf, Error> {
		let parent = project_path
			.parent()
			.ok_or_else(|| {
				TransferError::from(FileIOError::from((
					&project_path,
					io::Error::new(io::ErrorKind::InvalidInput, "project path has no parent"),
				)))
			})?
			.to_path_buf();

		extract_resource(&resource, &parent).await?;

		// The caller reloads this same path.
		Ok(project_path)
	}

	async fn transfer_file_to_target(
		&self,
		resource: ResolvedResource,
		target_dir: PathBuf,
		file_name: Option<String>,
	) -> Result<PathBuf, Error> {
		let destination = target_dir.join(file_name.as_deref().unwrap_or(&resource.display_name));
		copy::stream_to_file(&resource, &destination).await?;

		Ok(destination)
	}

	async fn extract_project(
		&self,
		resource: &ResolvedResource,
		manifest: &str,
		allocation: DirAllocation,
	) -> Result<PathBuf, Error> {
		let projects_dir = self.inner.storage.imported_projects_dir();
		let (stem, _) = naming::split_base_name(&resource.display_name);

		let target_dir = match allocation {
			DirAllocation::CollisionAvoiding => naming::find_available_path(&projects_dir, stem)
				.await
				.map_err(TransferError::from)?,
			DirAllocation::Proposed => naming::proposed_path(&projects_dir, stem),
		};

		fs::create_dir_all(&target_dir)
			.await
			.map_err(|e| TransferError::from(FileIOError::from((&target_dir, e))))?;
		extract_resource(resource, &target_dir).await?;

		Ok(target_dir.join(manifest))
	}

	async fn scan_manifest(&self, resource: &ResolvedResource) -> Result<Option<String>, Error> {
		let stream = resource.open().await?;
		let extensions = self.inner.manifest_extensions.clone();

		tokio::task::spawn_blocking(move || {
			let extensions = extensions.iter().map(String::as_str).collect::<Vec<_>>();
			sg_archive::find_manifest_name(SyncIoBridge::new(stream), &extensions)
		})
		.await
		.expect("manifest scan task panicked")
		.map_err(|e| Error::Transfer(TransferError::Archive(e)))
	}
}

async fn extract_resource(resource: &ResolvedResource, destination: &Path) -> Result<(), Error> {
	let stream = resource.open().await?;
	let destination = destination.to_path_buf();

	tokio::task::spawn_blocking(move || {
		sg_archive::extract_all(SyncIoBridge::new(stream), &destination)
	})
	.await
	.expect("archive extraction task panicked")
	.map_err(|e| Error::Transfer(TransferError::Archive(e)))
}

fn take_single(resolved: &mut Vec<ResolvedResource>) -> ResolvedResource {
	resolved
		.pop()
		.expect("resolution always yields exactly one resource for single-source kinds")
}
