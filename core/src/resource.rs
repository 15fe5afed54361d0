use std::{
	io,
	path::{Path, PathBuf},
	sync::Arc,
};

use async_trait::async_trait;
use chrono::Local;
use tokio::{
	fs::{self, File},
	io::AsyncRead,
};

use crate::error::ResolutionError;

pub type ResourceStream = Box<dyn AsyncRead + Send + Unpin>;

/// Opaque handle to externally-owned bytes (a content-provider entry, a
/// camera capture, a picked file). Read-only, and only valid for the
/// duration of the current operation — consume it before returning control
/// to the host.
#[async_trait]
pub trait ResourceReference: Send + Sync {
	fn display_name(&self) -> Option<String>;
	fn content_type(&self) -> Option<String>;
	async fn size_bytes(&self) -> Option<u64>;
	async fn open(&self) -> io::Result<ResourceStream>;
}

pub type ExternalResource = Arc<dyn ResourceReference>;

/// A reference resolved to a name plus metadata. Resolution is a pure query;
/// the byte stream opens only when the transfer stage actually copies data,
/// so a resolution failure never leaves a half-open handle behind.
pub struct ResolvedResource {
	pub display_name: String,
	pub size_bytes: Option<u64>,
	pub declared_type: Option<String>,
	source: ExternalResource,
}

impl ResolvedResource {
	pub async fn open(&self) -> Result<ResourceStream, ResolutionError> {
		self.source.open().await.map_err(ResolutionError::StreamOpen)
	}

	pub fn is_zip(&self) -> bool {
		self.declared_type.as_deref() == Some("application/zip")
			|| Path::new(&self.display_name)
				.extension()
				.is_some_and(|extension| extension.eq_ignore_ascii_case("zip"))
	}
}

pub async fn resolve(source: &ExternalResource) -> Result<ResolvedResource, ResolutionError> {
	let display_name = match source.display_name() {
		Some(name) => name,
		None => {
			// No name from the provider; a type hint lets us synthesize one,
			// otherwise the reference is unusable.
			let declared = source
				.content_type()
				.ok_or(ResolutionError::AmbiguousResource)?;

			format!(
				"{}.{}",
				Local::now().format("%d%m%Y_%H%M%S"),
				extension_for_content_type(&declared)
			)
		}
	};

	Ok(ResolvedResource {
		display_name,
		size_bytes: source.size_bytes().await,
		declared_type: source.content_type(),
		source: Arc::clone(source),
	})
}

pub fn extension_for_content_type(content_type: &str) -> &str {
	match content_type {
		"application/geopackage+sqlite3" => "gpkg",
		"application/zip" => "zip",
		"application/pdf" => "pdf",
		"image/jpeg" => "jpg",
		"image/png" => "png",
		"image/tiff" => "tif",
		"video/mp4" => "mp4",
		"text/csv" => "csv",
		"text/plain" => "txt",
		other => other
			.rsplit_once('/')
			.map_or("bin", |(_, subtype)| subtype),
	}
}

pub fn content_type_for_path(path: &Path) -> &'static str {
	match path
		.extension()
		.and_then(|extension| extension.to_str())
		.map(str::to_ascii_lowercase)
		.as_deref()
	{
		Some("gpkg") => "application/geopackage+sqlite3",
		Some("zip") => "application/zip",
		Some("pdf") => "application/pdf",
		Some("jpg" | "jpeg") => "image/jpeg",
		Some("png") => "image/png",
		Some("tif" | "tiff") => "image/tiff",
		Some("mp4") => "video/mp4",
		Some("csv") => "text/csv",
		Some("txt") => "text/plain",
		_ => "application/octet-stream",
	}
}

/// File-backed reference, used by host layers that hand over plain paths and
/// by tests.
pub struct FsResource {
	path: PathBuf,
	content_type: Option<String>,
}

impl FsResource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			content_type: None,
		}
	}

	pub fn with_content_type(path: impl Into<PathBuf>, content_type: impl Into<String>) -> Self {
		Self {
			path: path.into(),
			content_type: Some(content_type.into()),
		}
	}
}

#[async_trait]
impl ResourceReference for FsResource {
	fn display_name(&self) -> Option<String> {
		self.path
			.file_name()
			.map(|name| name.to_string_lossy().into_owned())
	}

	fn content_type(&self) -> Option<String> {
		self.content_type
			.clone()
			.or_else(|| Some(content_type_for_path(&self.path).to_owned()))
	}

	async fn size_bytes(&self) -> Option<u64> {
		fs::metadata(&self.path).await.ok().map(|metadata| metadata.len())
	}

	async fn open(&self) -> io::Result<ResourceStream> {
		Ok(Box::new(File::open(&self.path).await?))
	}
}
