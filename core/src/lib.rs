//! SIGPACGO resource import/export pipeline.
//!
//! Materializes externally-referenced resources (content-provider entries,
//! camera and gallery captures, picked files, picked directory trees,
//! compressed archives) as files inside the application-managed storage
//! tree, and conversely hands managed files to external consumers. The host
//! shell contributes resource pickers, a storage-access grant, and a
//! [`PipelineEvents`] implementation; everything else happens here, off the
//! interactive thread, on a bounded [`WorkerPool`].

pub mod backup;
pub mod conflict;
mod copy;
pub mod error;
pub mod events;
pub mod export;
pub mod import;
pub mod naming;
pub mod pipeline;
pub mod resource;
pub mod seed;
pub mod storage;

use error::{ResolutionError, TransferError};

pub use conflict::{ConflictDecision, ConflictSet};
pub use events::{PipelineEvents, ProgressSlot};
pub use export::{ExternalConsumer, Exporter};
pub use import::{ImportJob, ImportKind, Importer};
pub use pipeline::WorkerPool;
pub use resource::{ExternalResource, FsResource, ResourceReference};
pub use storage::{AppStorage, StorageAccess};

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error(transparent)]
	Resolution(#[from] ResolutionError),
	#[error(transparent)]
	Transfer(#[from] TransferError),
}
