//! Merges every per-variant metadata document under a directory tree into
//! one JSON array.
//!
//! The merge is a pure aggregation: every regular file named
//! `apk-metadata.json` below the input directory is included, with no
//! filtering and no skipping of malformed files. Discovered files are
//! sorted by path so the manifest order is stable across platforms.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;
use walkdir::WalkDir;

use crate::packaging::layout::METADATA_FILE_NAME;

#[derive(Error, Debug)]
pub enum MergeError {
    /// Directory walk or file read/write failure
    #[error("Failed to {action} '{path}': {source}")]
    Io {
        action: &'static str,
        path: String,
        source: std::io::Error,
    },

    /// Directory traversal failed below the input root
    #[error("Failed to scan metadata directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// A per-variant file is not valid JSON; the merge produces no output
    /// in that case
    #[error("Malformed metadata file '{path}': {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    /// Merged array could not be serialized
    #[error("Failed to serialize merged manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn io_err<'a>(
    action: &'static str,
    path: &'a Path,
) -> impl FnOnce(std::io::Error) -> MergeError + 'a {
    move |source| MergeError::Io {
        action,
        path: path.display().to_string(),
        source,
    }
}

/// Concatenates all per-variant metadata files under `input_dir` into a
/// pretty-printed JSON array at `output_file`.
///
/// A missing `input_dir` is not an error: a build with zero variants
/// produces a valid empty manifest. Returns the number of merged records.
///
/// # Errors
///
/// Any unreadable or malformed per-variant file fails the whole merge; no
/// partial manifest is written.
pub fn merge_metadata(input_dir: &Path, output_file: &Path) -> Result<usize, MergeError> {
    let mut records: Vec<serde_json::Value> = Vec::new();

    if input_dir.exists() {
        for path in collect_metadata_files(input_dir)? {
            let contents = fs::read_to_string(&path).map_err(io_err("read metadata file", &path))?;
            let value =
                serde_json::from_str(&contents).map_err(|source| MergeError::Parse {
                    path: path.display().to_string(),
                    source,
                })?;
            records.push(value);
        }
    }

    if let Some(parent) = output_file.parent() {
        fs::create_dir_all(parent).map_err(io_err("create manifest directory", parent))?;
    }

    let json = serde_json::to_string_pretty(&records)?;
    fs::write(output_file, json).map_err(io_err("write merged manifest", output_file))?;

    info!(
        records = records.len(),
        manifest = %output_file.display(),
        "Merged plugin metadata"
    );
    Ok(records.len())
}

/// Walks `input_dir` depth-first and returns every regular file named
/// exactly [`METADATA_FILE_NAME`], sorted by path.
fn collect_metadata_files(input_dir: &Path) -> Result<Vec<PathBuf>, MergeError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(input_dir) {
        let entry = entry?;
        if entry.file_type().is_file() && entry.file_name() == METADATA_FILE_NAME {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}
