#![allow(dead_code)]

use std::{
	io,
	path::{Path, PathBuf},
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc;

use sg_core::{
	resource::ResourceStream, AppStorage, ExternalConsumer, ExternalResource, Exporter, Importer,
	PipelineEvents, ProgressSlot, ResourceReference, StorageAccess, WorkerPool,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
	ImportSucceeded(PathBuf),
	ImportCancelled,
	ImportFailed(String),
	ExportSucceeded,
	ExportFailed(String),
	ConflictPending(Vec<PathBuf>),
}

pub struct RecordingEvents {
	tx: mpsc::UnboundedSender<Signal>,
}

impl RecordingEvents {
	pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<Signal>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Arc::new(Self { tx }), rx)
	}
}

impl PipelineEvents for RecordingEvents {
	fn import_succeeded(&self, path: &Path) {
		let _ = self.tx.send(Signal::ImportSucceeded(path.to_path_buf()));
	}

	fn import_cancelled(&self) {
		let _ = self.tx.send(Signal::ImportCancelled);
	}

	fn import_failed(&self, message: &str) {
		let _ = self.tx.send(Signal::ImportFailed(message.to_owned()));
	}

	fn export_succeeded(&self) {
		let _ = self.tx.send(Signal::ExportSucceeded);
	}

	fn export_failed(&self, message: &str) {
		let _ = self.tx.send(Signal::ExportFailed(message.to_owned()));
	}

	fn conflict_pending(&self, conflicts: &[PathBuf]) {
		let _ = self.tx.send(Signal::ConflictPending(conflicts.to_vec()));
	}
}

#[derive(Default)]
pub struct RecordingConsumer {
	pub shares: Mutex<Vec<(PathBuf, String)>>,
	pub opens: Mutex<Vec<(PathBuf, String, bool)>>,
	pub fail: AtomicBool,
}

impl ExternalConsumer for RecordingConsumer {
	fn share_file(&self, path: &Path, content_type: &str) -> io::Result<()> {
		if self.fail.load(Ordering::SeqCst) {
			return Err(io::Error::new(io::ErrorKind::Other, "no consumer available"));
		}
		self.shares
			.lock()
			.unwrap()
			.push((path.to_path_buf(), content_type.to_owned()));
		Ok(())
	}

	fn open_file(&self, path: &Path, content_type: &str, editing: bool) -> io::Result<()> {
		if self.fail.load(Ordering::SeqCst) {
			return Err(io::Error::new(io::ErrorKind::Other, "no consumer available"));
		}
		self.opens
			.lock()
			.unwrap()
			.push((path.to_path_buf(), content_type.to_owned(), editing));
		Ok(())
	}
}

/// In-memory resource for driving imports without a host picker.
pub struct MemoryResource {
	name: Option<String>,
	content_type: Option<String>,
	bytes: Vec<u8>,
}

impl MemoryResource {
	pub fn new(name: &str, bytes: impl Into<Vec<u8>>) -> Self {
		Self {
			name: Some(name.to_owned()),
			content_type: None,
			bytes: bytes.into(),
		}
	}

	pub fn with_content_type(name: &str, content_type: &str, bytes: impl Into<Vec<u8>>) -> Self {
		Self {
			name: Some(name.to_owned()),
			content_type: Some(content_type.to_owned()),
			bytes: bytes.into(),
		}
	}

	pub fn nameless(bytes: impl Into<Vec<u8>>) -> Self {
		Self {
			name: None,
			content_type: None,
			bytes: bytes.into(),
		}
	}

	pub fn arc(self) -> ExternalResource {
		Arc::new(self)
	}
}

#[async_trait]
impl ResourceReference for MemoryResource {
	fn display_name(&self) -> Option<String> {
		self.name.clone()
	}

	fn content_type(&self) -> Option<String> {
		self.content_type.clone()
	}

	async fn size_bytes(&self) -> Option<u64> {
		Some(self.bytes.len() as u64)
	}

	async fn open(&self) -> io::Result<ResourceStream> {
		Ok(Box::new(std::io::Cursor::new(self.bytes.clone())))
	}
}

/// A resource whose stream panics on open, for exercising the worker's
/// panic containment and the exactly-once signal guard.
pub struct PanickingResource;

impl PanickingResource {
	pub fn arc() -> ExternalResource {
		Arc::new(Self)
	}
}

#[async_trait]
impl ResourceReference for PanickingResource {
	fn display_name(&self) -> Option<String> {
		Some("poisoned.gpkg".to_owned())
	}

	fn content_type(&self) -> Option<String> {
		None
	}

	async fn size_bytes(&self) -> Option<u64> {
		None
	}

	async fn open(&self) -> io::Result<ResourceStream> {
		panic!("injected panic at stream open")
	}
}

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
	use std::io::{Cursor, Write};
	use zip::{write::FileOptions, CompressionMethod, ZipWriter};

	let cursor = Cursor::new(Vec::new());
	let mut zip = ZipWriter::new(cursor);
	let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

	for (name, contents) in entries {
		zip.start_file(*name, options).unwrap();
		zip.write_all(contents).unwrap();
	}
	let cursor = zip.finish().unwrap();

	cursor.into_inner()
}

pub struct TestPipeline {
	pub storage: AppStorage,
	pub importer: Importer,
	pub exporter: Exporter,
	pub consumer: Arc<RecordingConsumer>,
	pub rx: mpsc::UnboundedReceiver<Signal>,
	_root: TempDir,
}

impl TestPipeline {
	pub async fn new() -> Self {
		let root = TempDir::new().unwrap();
		let storage = AppStorage::bootstrap(
			root.path().join("app"),
			root.path().join("cache"),
			&[],
			StorageAccess::Denied,
		)
		.await
		.unwrap();

		let pool = Arc::new(WorkerPool::default());
		let (events, rx) = RecordingEvents::channel();
		let progress = ProgressSlot::new();
		let consumer = Arc::new(RecordingConsumer::default());

		let importer = Importer::new(
			storage.clone(),
			Arc::clone(&pool),
			events.clone(),
			progress.clone(),
		);
		let exporter = Exporter::new(
			storage.clone(),
			pool,
			events,
			progress,
			Arc::clone(&consumer) as Arc<dyn ExternalConsumer>,
		);

		Self {
			storage,
			importer,
			exporter,
			consumer,
			rx,
			_root: root,
		}
	}

	pub async fn next_signal(&mut self) -> Signal {
		tokio::time::timeout(Duration::from_secs(10), self.rx.recv())
			.await
			.expect("timed out waiting for a pipeline signal")
			.expect("signal channel closed")
	}
}
