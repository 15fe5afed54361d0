//! Zip container handling for the resource pipeline.
//!
//! Everything here is synchronous and stream-oriented: inspection and
//! extraction make a single forward pass over the archive, so they work on
//! non-seekable sources (content-provider streams). Callers that need to
//! inspect and then extract the same logical archive must re-open the source
//! between the two calls; a stream is consumed exactly once per open.

use std::{
	fs::{self, File},
	io::{self, Read, Seek, Write},
	path::{Component, Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, trace};
use zip::{
	read::read_zipfile_from_stream, result::ZipError, write::FileOptions, CompressionMethod,
	ZipWriter,
};

#[derive(Error, Debug)]
pub enum ArchiveError {
	#[error("malformed archive: {0}")]
	Malformed(#[from] ZipError),
	#[error("archive entry '{name}' escapes the destination directory")]
	UnsafeEntryPath { name: String },
	#[error("non UTF-8 path cannot be archived: '{}'", .path.display())]
	NonUtf8Path { path: PathBuf },
	#[error("I/O error at '{}': {source}", .path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
}

impl ArchiveError {
	fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
		Self::Io {
			path: path.into(),
			source,
		}
	}
}

/// Scans the archive's entry headers for a file whose extension matches one
/// of `manifest_extensions`, without reading any entry contents.
///
/// Returns `Ok(None)` when no such entry exists; an archive without a
/// manifest is a valid plain payload, not an error. `Err` is reserved for a
/// container that cannot be read at all.
pub fn find_manifest_name<R: Read>(
	mut reader: R,
	manifest_extensions: &[&str],
) -> Result<Option<String>, ArchiveError> {
	loop {
		let Some(entry) = read_zipfile_from_stream(&mut reader)? else {
			return Ok(None);
		};

		if entry.is_dir() {
			continue;
		}

		let name = entry.name();
		if let Some((_, extension)) = name.rsplit_once('.') {
			if manifest_extensions
				.iter()
				.any(|candidate| candidate.eq_ignore_ascii_case(extension))
			{
				trace!(name, "found manifest entry");
				return Ok(Some(name.to_owned()));
			}
		}
	}
}

/// Extracts every entry into `destination`, recreating the directory
/// structure. Any entry failure leaves the destination in an indeterminate
/// state; callers surface that as a job failure rather than attempt repair.
pub fn extract_all<R: Read>(mut reader: R, destination: &Path) -> Result<(), ArchiveError> {
	let mut entries = 0usize;

	while let Some(mut entry) = read_zipfile_from_stream(&mut reader)? {
		let relative = sanitize_entry_path(entry.name())?;
		let out_path = destination.join(&relative);

		if entry.is_dir() {
			fs::create_dir_all(&out_path).map_err(|e| ArchiveError::io(&out_path, e))?;
		} else {
			if let Some(parent) = out_path.parent() {
				fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
			}
			let mut out_file =
				File::create(&out_path).map_err(|e| ArchiveError::io(&out_path, e))?;
			io::copy(&mut entry, &mut out_file).map_err(|e| ArchiveError::io(&out_path, e))?;
		}

		entries += 1;
	}

	debug!(destination = %destination.display(), entries, "archive extracted");

	Ok(())
}

/// Bundles a flat list of files into a single archive, each at the archive
/// root under its own file name.
pub fn bundle_files<W: Write + Seek>(writer: W, paths: &[PathBuf]) -> Result<(), ArchiveError> {
	let mut zip = ZipWriter::new(writer);
	let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

	for path in paths {
		let name = path
			.file_name()
			.and_then(|name| name.to_str())
			.ok_or_else(|| ArchiveError::NonUtf8Path { path: path.clone() })?;

		zip.start_file(name, options)?;
		let mut input = File::open(path).map_err(|e| ArchiveError::io(path, e))?;
		io::copy(&mut input, &mut zip).map_err(|e| ArchiveError::io(path, e))?;
	}

	zip.finish()?;

	Ok(())
}

/// Bundles a directory tree into an archive, preserving the structure
/// relative to `dir` with forward-slash entry names.
pub fn bundle_dir<W: Write + Seek>(writer: W, dir: &Path) -> Result<(), ArchiveError> {
	let mut zip = ZipWriter::new(writer);
	let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

	let mut pending = vec![dir.to_path_buf()];
	while let Some(current) = pending.pop() {
		for dir_entry in fs::read_dir(&current).map_err(|e| ArchiveError::io(&current, e))? {
			let dir_entry = dir_entry.map_err(|e| ArchiveError::io(&current, e))?;
			let path = dir_entry.path();
			let relative = path
				.strip_prefix(dir)
				.expect("read_dir only yields children of the walked root");
			let name = relative
				.to_str()
				.ok_or_else(|| ArchiveError::NonUtf8Path { path: path.clone() })?
				.replace('\\', "/");

			let file_type = dir_entry
				.file_type()
				.map_err(|e| ArchiveError::io(&path, e))?;

			if file_type.is_dir() {
				zip.add_directory(name, options)?;
				pending.push(path);
			} else {
				zip.start_file(name, options)?;
				let mut input = File::open(&path).map_err(|e| ArchiveError::io(&path, e))?;
				io::copy(&mut input, &mut zip).map_err(|e| ArchiveError::io(&path, e))?;
			}
		}
	}

	zip.finish()?;

	Ok(())
}

fn sanitize_entry_path(name: &str) -> Result<PathBuf, ArchiveError> {
	let mut relative = PathBuf::new();

	for component in Path::new(name).components() {
		match component {
			Component::Normal(part) => relative.push(part),
			Component::CurDir => {}
			Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
				return Err(ArchiveError::UnsafeEntryPath {
					name: name.to_owned(),
				})
			}
		}
	}

	Ok(relative)
}

#[cfg(test)]
mod tests {
	use super::*;

	use std::io::Cursor;

	use tempfile::tempdir;

	fn sample_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
		let cursor = Cursor::new(Vec::new());
		let mut zip = ZipWriter::new(cursor);
		let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

		for (name, contents) in entries {
			if name.ends_with('/') {
				zip.add_directory(name.trim_end_matches('/'), options)
					.unwrap();
			} else {
				zip.start_file(*name, options).unwrap();
				zip.write_all(contents).unwrap();
			}
		}

		let cursor = zip.finish().unwrap();

		cursor.into_inner()
	}

	#[test]
	fn manifest_scan_finds_recognized_extension() {
		let bytes = sample_archive(&[
			("readme.txt", b"notes".as_slice()),
			("data/points.gpkg", b"not really a geopackage".as_slice()),
			("field.qgs", b"<qgis/>".as_slice()),
		]);

		let manifest = find_manifest_name(Cursor::new(bytes), &["qgs", "qgz"]).unwrap();

		assert_eq!(manifest.as_deref(), Some("field.qgs"));
	}

	#[test]
	fn manifest_scan_without_manifest_is_not_an_error() {
		let bytes = sample_archive(&[("readme.txt", b"notes".as_slice())]);

		let manifest = find_manifest_name(Cursor::new(bytes), &["qgs", "qgz"]).unwrap();

		assert_eq!(manifest, None);
	}

	#[test]
	fn manifest_scan_rejects_garbage_container() {
		let result = find_manifest_name(Cursor::new(b"definitely not a zip".to_vec()), &["qgs"]);

		assert!(matches!(result, Err(ArchiveError::Malformed(_))));
	}

	#[test]
	fn extract_recreates_directory_structure() {
		let bytes = sample_archive(&[
			("project.qgs", b"<qgis/>".as_slice()),
			("layers/", b"".as_slice()),
			("layers/points.gpkg", b"payload".as_slice()),
		]);
		let destination = tempdir().unwrap();

		extract_all(Cursor::new(bytes), destination.path()).unwrap();

		assert_eq!(
			fs::read(destination.path().join("project.qgs")).unwrap(),
			b"<qgis/>"
		);
		assert_eq!(
			fs::read(destination.path().join("layers/points.gpkg")).unwrap(),
			b"payload"
		);
	}

	#[test]
	fn traversal_entry_names_are_rejected() {
		assert!(matches!(
			sanitize_entry_path("../evil.sh"),
			Err(ArchiveError::UnsafeEntryPath { .. })
		));
		assert!(matches!(
			sanitize_entry_path("/etc/passwd"),
			Err(ArchiveError::UnsafeEntryPath { .. })
		));
		assert_eq!(
			sanitize_entry_path("./a/b.txt").unwrap(),
			PathBuf::from("a/b.txt")
		);
	}

	#[test]
	fn bundle_files_round_trips_through_extract() {
		let source = tempdir().unwrap();
		let first = source.path().join("observations.csv");
		let second = source.path().join("notes.txt");
		fs::write(&first, b"fid,name\n1,well\n").unwrap();
		fs::write(&second, b"field notes").unwrap();

		let mut cursor = Cursor::new(Vec::new());
		bundle_files(&mut cursor, &[first, second]).unwrap();

		let destination = tempdir().unwrap();
		extract_all(Cursor::new(cursor.into_inner()), destination.path()).unwrap();

		assert_eq!(
			fs::read(destination.path().join("observations.csv")).unwrap(),
			b"fid,name\n1,well\n"
		);
		assert_eq!(
			fs::read(destination.path().join("notes.txt")).unwrap(),
			b"field notes"
		);
	}

	#[test]
	fn bundle_dir_preserves_relative_structure() {
		let source = tempdir().unwrap();
		fs::create_dir_all(source.path().join("layers")).unwrap();
		fs::write(source.path().join("project.qgs"), b"<qgis/>").unwrap();
		fs::write(source.path().join("layers/points.gpkg"), b"payload").unwrap();

		let mut cursor = Cursor::new(Vec::new());
		bundle_dir(&mut cursor, source.path()).unwrap();

		let destination = tempdir().unwrap();
		extract_all(Cursor::new(cursor.into_inner()), destination.path()).unwrap();

		assert!(destination.path().join("project.qgs").is_file());
		assert!(destination.path().join("layers/points.gpkg").is_file());
	}
}
