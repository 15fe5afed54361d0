//! One-time bootstrap population of managed storage from bundled assets.
//!
//! Each logical asset declares an ordered candidate list; the first
//! candidate that exists wins. When every candidate is absent, a minimal
//! valid placeholder is synthesized so downstream code never observes a
//! missing-required-file state. Assets seed independently: one failure
//! never blocks the others, and nothing here is fatal to startup.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::{copy, error::FileIOError, storage::AppStorage};

const PLACEHOLDER_PROJECT: &[u8] = br#"<!DOCTYPE qgis PUBLIC 'http://mrcc.com/qgis.dtd' 'SYSTEM'>
<qgis projectname="SIGPACGO Base Map" version="3.34.0">
  <layer-tree-group/>
</qgis>
"#;

const PLACEHOLDER_DATASET: &[u8] = b"fid,name,latitude,longitude\n";

pub struct SeedAsset {
	pub name: String,
	pub candidates: Vec<PathBuf>,
	pub destination: PathBuf,
	pub placeholder: SeedPlaceholder,
}

pub enum SeedPlaceholder {
	File { contents: Vec<u8> },
	Directory,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub enum SeedOutcome {
	/// The destination was already populated by an earlier run.
	AlreadyPresent,
	Copied {
		candidate: PathBuf,
	},
	Placeholder,
	Failed {
		message: String,
	},
}

#[derive(Debug, Serialize)]
pub struct SeedReport {
	pub outcomes: Vec<(String, SeedOutcome)>,
}

impl SeedReport {
	/// `false` when any asset fell back to a placeholder or failed outright;
	/// a log-level condition, never surfaced to the end user.
	pub fn is_complete(&self) -> bool {
		self.outcomes.iter().all(|(_, outcome)| {
			matches!(
				outcome,
				SeedOutcome::AlreadyPresent | SeedOutcome::Copied { .. }
			)
		})
	}
}

/// The assets SIGPACGO requires at first run, probed under
/// `bundled_assets_root` the way the bundled package lays them out.
pub fn default_assets(storage: &AppStorage, bundled_assets_root: &Path) -> Vec<SeedAsset> {
	vec![
		SeedAsset {
			name: "sample projects".to_owned(),
			candidates: vec![
				bundled_assets_root.join("resources/sample_projects"),
				bundled_assets_root.join("qfield/sample_projects"),
			],
			destination: storage.root().join("sample_projects"),
			placeholder: SeedPlaceholder::Directory,
		},
		SeedAsset {
			name: "base map project".to_owned(),
			candidates: vec![
				bundled_assets_root.join("resources/basemaps/base_map.qgs"),
				bundled_assets_root.join("basemaps/base_map.qgs"),
			],
			destination: storage.app_data_dir().join("basemaps/base_map.qgs"),
			placeholder: SeedPlaceholder::File {
				contents: PLACEHOLDER_PROJECT.to_vec(),
			},
		},
		SeedAsset {
			name: "seed dataset".to_owned(),
			candidates: vec![
				bundled_assets_root.join("resources/sample_projects/sample_points.csv"),
				bundled_assets_root.join("qfield/sample_projects/sample_points.csv"),
			],
			destination: storage.root().join("sample_projects/sample_points.csv"),
			placeholder: SeedPlaceholder::File {
				contents: PLACEHOLDER_DATASET.to_vec(),
			},
		},
	]
}

#[instrument(skip_all, fields(assets = assets.len()))]
pub async fn seed_all(assets: Vec<SeedAsset>) -> SeedReport {
	let mut outcomes = Vec::with_capacity(assets.len());

	for asset in assets {
		let outcome = seed_asset(&asset).await;
		match &outcome {
			SeedOutcome::AlreadyPresent => {
				info!(asset = %asset.name, "already present, skipping")
			}
			SeedOutcome::Copied { candidate } => {
				info!(asset = %asset.name, candidate = %candidate.display(), "seeded from bundle")
			}
			SeedOutcome::Placeholder => {
				warn!(asset = %asset.name, "no bundled candidate found, placeholder synthesized")
			}
			SeedOutcome::Failed { message } => {
				warn!(asset = %asset.name, "seeding failed: {message}")
			}
		}
		outcomes.push((asset.name, outcome));
	}

	let report = SeedReport { outcomes };
	if let Ok(json) = serde_json::to_string(&report) {
		debug!(report = %json, "seeding finished");
	}

	report
}

async fn seed_asset(asset: &SeedAsset) -> SeedOutcome {
	match destination_present(&asset.destination).await {
		Ok(true) => return SeedOutcome::AlreadyPresent,
		Ok(false) => {}
		Err(e) => {
			return SeedOutcome::Failed {
				message: e.to_string(),
			}
		}
	}

	for candidate in &asset.candidates {
		match candidate_kind(candidate).await {
			Some(CandidateKind::File) => {
				return match copy_candidate_file(candidate, &asset.destination).await {
					Ok(()) => SeedOutcome::Copied {
						candidate: candidate.clone(),
					},
					Err(e) => SeedOutcome::Failed {
						message: e.to_string(),
					},
				}
			}
			Some(CandidateKind::Directory) => {
				return match copy::mirror_directory(candidate, &asset.destination).await {
					Ok(()) => SeedOutcome::Copied {
						candidate: candidate.clone(),
					},
					Err(e) => SeedOutcome::Failed {
						message: e.to_string(),
					},
				}
			}
			None => {}
		}
	}

	match synthesize_placeholder(asset).await {
		Ok(()) => SeedOutcome::Placeholder,
		Err(e) => SeedOutcome::Failed {
			message: e.to_string(),
		},
	}
}

enum CandidateKind {
	File,
	Directory,
}

/// A candidate counts as existing when it is a file, or a directory with at
/// least one entry.
async fn candidate_kind(candidate: &Path) -> Option<CandidateKind> {
	let metadata = fs::metadata(candidate).await.ok()?;

	if metadata.is_file() {
		return Some(CandidateKind::File);
	}

	let mut read_dir = fs::read_dir(candidate).await.ok()?;
	match read_dir.next_entry().await {
		Ok(Some(_)) => Some(CandidateKind::Directory),
		_ => None,
	}
}

async fn destination_present(destination: &Path) -> Result<bool, FileIOError> {
	let Ok(metadata) = fs::metadata(destination).await else {
		return Ok(false);
	};

	if metadata.is_file() {
		return Ok(true);
	}

	let mut read_dir = fs::read_dir(destination)
		.await
		.map_err(|e| FileIOError::from((destination, e)))?;
	Ok(read_dir
		.next_entry()
		.await
		.map_err(|e| FileIOError::from((destination, e)))?
		.is_some())
}

async fn copy_candidate_file(candidate: &Path, destination: &Path) -> Result<(), FileIOError> {
	if let Some(parent) = destination.parent() {
		fs::create_dir_all(parent)
			.await
			.map_err(|e| FileIOError::from((parent, e)))?;
	}

	fs::copy(candidate, destination)
		.await
		.map_err(|e| FileIOError::from((candidate, e)))?;

	Ok(())
}

async fn synthesize_placeholder(asset: &SeedAsset) -> Result<(), FileIOError> {
	match &asset.placeholder {
		SeedPlaceholder::File { contents } => {
			if let Some(parent) = asset.destination.parent() {
				fs::create_dir_all(parent)
					.await
					.map_err(|e| FileIOError::from((parent, e)))?;
			}
			fs::write(&asset.destination, contents)
				.await
				.map_err(|e| FileIOError::from((&asset.destination, e)))
		}
		SeedPlaceholder::Directory => fs::create_dir_all(&asset.destination)
			.await
			.map_err(|e| FileIOError::from((&asset.destination, e))),
	}
}
