//! Per-variant metadata building: copies a variant's APKs into the
//! publishable output directory and writes the variant's metadata document.

use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::model::{ApkOutput, BuildVariant, BuiltArtifact, SdkAnnotations, SdkMetadata,
    VariantMetadataRecord};
use crate::packaging::layout::BuildLayout;

#[derive(Error, Debug)]
pub enum RecordError {
    /// APK source path has no filename component to derive the portable
    /// manifest entry from
    #[error("Artifact path has no filename: '{0}'")]
    MissingFileName(String),

    /// Copying an APK or writing the metadata document failed
    #[error("Failed to {action} '{path}': {source}")]
    Io {
        action: &'static str,
        path: String,
        source: std::io::Error,
    },

    /// Record could not be serialized (should not happen for well-formed
    /// records; kept separate from I/O for diagnosis)
    #[error("Failed to serialize variant metadata: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn io_err<'a>(
    action: &'static str,
    path: &'a Path,
) -> impl FnOnce(std::io::Error) -> RecordError + 'a {
    move |source| RecordError::Io {
        action,
        path: path.display().to_string(),
        source,
    }
}

/// Builds the metadata record for one variant and copies each built APK
/// into the variant's output directory.
///
/// Copies overwrite existing files of the same name, so rebuilding a
/// variant replaces prior outputs in place. The record references each APK
/// by filename only.
///
/// # Errors
///
/// Any copy failure is fatal. APKs copied before the failure stay on disk;
/// the metadata document is only written by [`write_variant_record`], so a
/// failed build never leaves a partial record behind.
pub fn build_variant_record(
    variant: &BuildVariant,
    artifacts: &[BuiltArtifact],
    sdk: Option<&SdkMetadata>,
    layout: &BuildLayout,
) -> Result<VariantMetadataRecord, RecordError> {
    info!(
        variant = %variant.name,
        build_type = %variant.build_type,
        flavors = ?variant.product_flavors,
        min_sdk = variant.min_sdk,
        target_sdk = variant.target_sdk,
        "Packaging variant"
    );

    let output_dir = layout.variant_output_dir(&variant.name);
    fs::create_dir_all(&output_dir).map_err(io_err("create output directory", &output_dir))?;

    let mut outputs = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let file_name = artifact
            .output_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                RecordError::MissingFileName(artifact.output_path.display().to_string())
            })?;

        let dest = output_dir.join(file_name);
        fs::copy(&artifact.output_path, &dest).map_err(io_err("copy APK to", &dest))?;

        info!(
            apk = file_name,
            version_name = %artifact.version_label,
            filters = ?artifact.filters,
            "Copied APK output"
        );

        outputs.push(ApkOutput {
            apk_path: file_name.to_string(),
            version_name: artifact.version_label.clone(),
            filters: artifact.filters.clone(),
        });
    }

    Ok(VariantMetadataRecord {
        variant: variant.name.clone(),
        build_type: variant.build_type.clone(),
        flavors: variant.product_flavors.clone(),
        min_sdk: variant.min_sdk,
        target_sdk: variant.target_sdk,
        sdk: sdk.map(SdkAnnotations::from),
        outputs,
    })
}

/// Writes `record` as pretty-printed JSON to the variant's fixed metadata
/// path, creating parent directories as needed.
pub fn write_variant_record(
    record: &VariantMetadataRecord,
    layout: &BuildLayout,
) -> Result<(), RecordError> {
    let path = layout.variant_metadata_file(&record.variant);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err("create metadata directory", parent))?;
    }

    let json = serde_json::to_string_pretty(record)?;
    fs::write(&path, json).map_err(io_err("write metadata file", &path))?;

    info!(variant = %record.variant, path = %path.display(), "Wrote variant metadata");
    Ok(())
}
