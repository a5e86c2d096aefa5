//! Fixed on-disk layout of everything the packager reads and writes.
//!
//! All paths are derived from one build directory root so that tasks which
//! run for different variants can never collide: each variant gets its own
//! metadata and APK output subdirectory.

use std::path::{Path, PathBuf};

/// Release URL of the Block IDLE plugin API archive the packager compiles
/// plugins against.
pub const PLUGIN_SDK_URL: &str =
    "https://github.com/Innovative-CST/blockidle-plugin-api/releases/download/0.0.0/app-plugin-api-release.aar";

/// Local cache filename for the downloaded SDK archive.
pub const PLUGIN_SDK_NAME: &str = "plugin-sdk";

/// Fixed filename of every per-variant metadata document. The merge step
/// matches on this exact name.
pub const METADATA_FILE_NAME: &str = "apk-metadata.json";

/// Filename of the merged manifest.
pub const MERGED_MANIFEST_NAME: &str = "all-plugins.json";

/// Path derivations rooted at the host project's build directory.
#[derive(Debug, Clone)]
pub struct BuildLayout {
    build_dir: PathBuf,
}

impl BuildLayout {
    pub fn new(build_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
        }
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// Cache location of the vendor SDK archive:
    /// `<build>/plugin-sdk/plugin-sdk.aar`
    pub fn sdk_archive(&self) -> PathBuf {
        self.build_dir
            .join("plugin-sdk")
            .join(format!("{PLUGIN_SDK_NAME}.aar"))
    }

    /// Scratch directory for nested-archive extraction:
    /// `<build>/plugin-sdk-metadata/`
    pub fn sdk_metadata_dir(&self) -> PathBuf {
        self.build_dir.join("plugin-sdk-metadata")
    }

    /// Root under which every per-variant metadata file is written.
    pub fn metadata_root(&self) -> PathBuf {
        self.build_dir.join("plugin-metadata").join("tmp")
    }

    /// Per-variant metadata document:
    /// `<build>/plugin-metadata/tmp/<variant>/apk-metadata.json`
    pub fn variant_metadata_file(&self, variant: &str) -> PathBuf {
        self.metadata_root().join(variant).join(METADATA_FILE_NAME)
    }

    /// Publishable APK directory for one variant:
    /// `<build>/plugin-outputs/<variant>/`
    pub fn variant_output_dir(&self, variant: &str) -> PathBuf {
        self.build_dir.join("plugin-outputs").join(variant)
    }

    /// Merged manifest: `<build>/plugin-metadata/all-plugins.json`
    pub fn merged_manifest(&self) -> PathBuf {
        self.build_dir
            .join("plugin-metadata")
            .join(MERGED_MANIFEST_NAME)
    }
}
