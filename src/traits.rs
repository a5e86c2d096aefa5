use crate::model::{BuildVariant, BuiltArtifact};
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("No APKs found for variant '{variant}' under '{apk_dir}'")]
    NoArtifacts { variant: String, apk_dir: String },
    #[error("Failed to read build output listing: {0}")]
    Listing(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Seam to the Android build toolchain: reports the APKs a variant build
/// produced, together with their version labels and split filters.
///
/// The packager treats loaded artifacts as read-only facts; it never writes
/// into the toolchain's output directory.
#[async_trait]
pub trait ArtifactLoader: Send + Sync {
    /// Returns an identifier for the toolchain backing this loader
    /// (e.g. "agp", "fixture"). Used for logging only.
    fn toolchain_id(&self) -> &str;

    /// Loads the built artifacts for `variant` from its APK output
    /// directory. Returns at least one artifact or fails — a variant that
    /// built nothing is an error, matching the upstream toolchain contract.
    async fn load(
        &self,
        variant: &BuildVariant,
        apk_dir: &Path,
    ) -> Result<Vec<BuiltArtifact>, LoadError>;
}
