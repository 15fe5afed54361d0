use std::{
	path::{Path, PathBuf},
	sync::Arc,
};

use tokio::sync::watch;
use tracing::{debug, error};

/// Outward signals emitted by the pipeline, each fire-and-forget and exactly
/// once per job.
///
/// Implementations are invoked from worker context; marshaling onto an
/// interactive thread is the host's concern. `conflict_pending` is the one
/// inbound-response hook: the host must eventually answer it through
/// [`Importer::resolve_conflict`](crate::import::Importer::resolve_conflict).
pub trait PipelineEvents: Send + Sync {
	fn import_succeeded(&self, path: &Path);
	fn import_cancelled(&self);
	fn import_failed(&self, message: &str);
	fn export_succeeded(&self);
	fn export_failed(&self, message: &str);
	fn conflict_pending(&self, conflicts: &[PathBuf]);
}

/// Single-slot progress indicator shared across user-visible operations.
/// Beginning a new operation replaces the slot's content; it never stacks.
#[derive(Clone)]
pub struct ProgressSlot {
	tx: Arc<watch::Sender<Option<String>>>,
}

impl ProgressSlot {
	pub fn new() -> Self {
		Self {
			tx: Arc::new(watch::channel(None).0),
		}
	}

	pub fn begin(&self, message: impl Into<String>) {
		if let Some(previous) = self.tx.send_replace(Some(message.into())) {
			debug!(%previous, "replacing active progress indicator");
		}
	}

	pub fn finish(&self) {
		self.tx.send_replace(None);
	}

	pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
		self.tx.subscribe()
	}
}

impl Default for ProgressSlot {
	fn default() -> Self {
		Self::new()
	}
}

/// Fire-once terminal signal for an import job.
///
/// Exactly one of the three outcomes is delivered. Dropping an unfired
/// guard reports a failure, so a panicking or short-circuited transfer still
/// terminates the callback protocol.
pub(crate) struct ImportSignal {
	events: Arc<dyn PipelineEvents>,
	progress: ProgressSlot,
	fired: bool,
}

impl ImportSignal {
	pub(crate) fn new(events: Arc<dyn PipelineEvents>, progress: ProgressSlot) -> Self {
		Self {
			events,
			progress,
			fired: false,
		}
	}

	pub(crate) fn succeeded(mut self, path: &Path) {
		self.fired = true;
		self.progress.finish();
		self.events.import_succeeded(path);
	}

	pub(crate) fn cancelled(mut self) {
		self.fired = true;
		self.progress.finish();
		self.events.import_cancelled();
	}

	pub(crate) fn failed(mut self, message: &str) {
		self.fired = true;
		self.progress.finish();
		self.events.import_failed(message);
	}
}

impl Drop for ImportSignal {
	fn drop(&mut self) {
		if !self.fired {
			error!("import job ended without a terminal signal, reporting failure");
			self.progress.finish();
			self.events
				.import_failed("The import was interrupted unexpectedly");
		}
	}
}

/// Export counterpart of [`ImportSignal`].
pub(crate) struct ExportSignal {
	events: Arc<dyn PipelineEvents>,
	progress: ProgressSlot,
	fired: bool,
}

impl ExportSignal {
	pub(crate) fn new(events: Arc<dyn PipelineEvents>, progress: ProgressSlot) -> Self {
		Self {
			events,
			progress,
			fired: false,
		}
	}

	pub(crate) fn succeeded(mut self) {
		self.fired = true;
		self.progress.finish();
		self.events.export_succeeded();
	}

	pub(crate) fn failed(mut self, message: &str) {
		self.fired = true;
		self.progress.finish();
		self.events.export_failed(message);
	}
}

impl Drop for ExportSignal {
	fn drop(&mut self) {
		if !self.fired {
			error!("export job ended without a terminal signal, reporting failure");
			self.progress.finish();
			self.events
				.export_failed("The export was interrupted unexpectedly");
		}
	}
}
