//! Nested-archive extraction of the vendor SDK's compatibility metadata.
//!
//! The plugin SDK ships as an AAR (a zip) that embeds `classes.jar`
//! (another zip) which carries `META-INF/sdk-metadata.json`. Extraction is
//! all-or-nothing: any unreadable archive, missing entry, or malformed JSON
//! aborts with an error and no partial metadata is returned.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::info;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::model::SdkMetadata;

/// Entry inside the AAR that holds the compiled SDK classes.
const CLASSES_JAR_ENTRY: &str = "classes.jar";

/// Entry inside `classes.jar` that holds the metadata document.
const METADATA_ENTRY: &str = "META-INF/sdk-metadata.json";

#[derive(Error, Debug)]
pub enum ExtractError {
    /// Resolved dependency is not an AAR; checked before any archive is
    /// opened
    #[error("Resolved SDK is not an AAR: {0}")]
    InvalidArtifactType(String),

    /// Outer or inner archive could not be opened or read
    #[error("Failed to read archive '{archive}': {source}")]
    Archive { archive: String, source: ZipError },

    /// Expected entry is missing from an archive
    #[error("Entry '{entry}' not found in '{archive}'")]
    MissingEntry { entry: String, archive: String },

    /// Filesystem failure while staging extracted entries
    #[error("Failed to stage SDK metadata: {0}")]
    Io(#[from] std::io::Error),

    /// `sdk-metadata.json` does not match the expected schema
    #[error("Invalid SDK metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Extracts [`SdkMetadata`] from the SDK archive at `archive_path`,
/// staging intermediate files under `scratch_dir`.
///
/// Repeated extraction from the same archive is idempotent: staged files
/// are overwritten in place and the parsed metadata is byte-for-byte
/// identical.
///
/// # Errors
///
/// Fails fast with [`ExtractError::InvalidArtifactType`] when the file is
/// not named `*.aar`; otherwise any archive, entry, or parse failure maps
/// to the corresponding [`ExtractError`] variant.
pub fn extract_sdk_metadata(
    archive_path: &Path,
    scratch_dir: &Path,
) -> Result<SdkMetadata, ExtractError> {
    let is_aar = archive_path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("aar"))
        .unwrap_or(false);
    if !is_aar {
        return Err(ExtractError::InvalidArtifactType(
            archive_path.display().to_string(),
        ));
    }

    fs::create_dir_all(scratch_dir)?;

    let classes_jar = scratch_dir.join("classes.jar");
    copy_entry(archive_path, CLASSES_JAR_ENTRY, &classes_jar)?;

    let metadata_json = scratch_dir.join("sdk-metadata.json");
    copy_entry(&classes_jar, METADATA_ENTRY, &metadata_json)?;

    let file = File::open(&metadata_json)?;
    let metadata: SdkMetadata = serde_json::from_reader(file)?;

    info!(
        sdk_version = %metadata.version,
        min_sdk_supported = metadata.min_sdk_supported,
        "Extracted SDK metadata"
    );
    Ok(metadata)
}

/// Copies one entry out of the zip at `archive` to `dest`, overwriting any
/// previous copy.
fn copy_entry(archive: &Path, entry: &str, dest: &Path) -> Result<(), ExtractError> {
    let archive_name = archive.display().to_string();
    let file = File::open(archive).map_err(ExtractError::Io)?;
    let mut zip = ZipArchive::new(file).map_err(|source| ExtractError::Archive {
        archive: archive_name.clone(),
        source,
    })?;

    let mut reader = match zip.by_name(entry) {
        Ok(reader) => reader,
        Err(ZipError::FileNotFound) => {
            return Err(ExtractError::MissingEntry {
                entry: entry.to_string(),
                archive: archive_name,
            })
        }
        Err(source) => {
            return Err(ExtractError::Archive {
                archive: archive_name,
                source,
            })
        }
    };

    let mut out = File::create(dest)?;
    io::copy(&mut reader, &mut out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const SDK_JSON: &str = r#"{
        "minSdkSupported": 26,
        "version": "1.2.0",
        "versionNumber": 12,
        "versionType": "alpha",
        "subVersion": 3,
        "versionName": "Aurora"
    }"#;

    /// Builds an AAR fixture: outer zip containing classes.jar containing
    /// META-INF/sdk-metadata.json.
    fn write_aar(path: &Path, metadata: Option<&str>, with_classes_jar: bool) {
        let mut inner = Vec::new();
        {
            let mut jar = ZipWriter::new(std::io::Cursor::new(&mut inner));
            jar.start_file("Dummy.class", SimpleFileOptions::default())
                .unwrap();
            jar.write_all(b"\xca\xfe\xba\xbe").unwrap();
            if let Some(json) = metadata {
                jar.start_file(METADATA_ENTRY, SimpleFileOptions::default())
                    .unwrap();
                jar.write_all(json.as_bytes()).unwrap();
            }
            jar.finish().unwrap();
        }

        let mut aar = ZipWriter::new(File::create(path).unwrap());
        aar.start_file("AndroidManifest.xml", SimpleFileOptions::default())
            .unwrap();
        aar.write_all(b"<manifest/>").unwrap();
        if with_classes_jar {
            aar.start_file(CLASSES_JAR_ENTRY, SimpleFileOptions::default())
                .unwrap();
            aar.write_all(&inner).unwrap();
        }
        aar.finish().unwrap();
    }

    #[test]
    fn test_extracts_nested_metadata() {
        let dir = tempdir().unwrap();
        let aar = dir.path().join("plugin-sdk.aar");
        write_aar(&aar, Some(SDK_JSON), true);

        let metadata = extract_sdk_metadata(&aar, &dir.path().join("scratch")).unwrap();
        assert_eq!(metadata.min_sdk_supported, 26);
        assert_eq!(metadata.version, "1.2.0");
        assert_eq!(metadata.version_type, "alpha");
        assert_eq!(metadata.sub_version, 3);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let dir = tempdir().unwrap();
        let aar = dir.path().join("plugin-sdk.aar");
        write_aar(&aar, Some(SDK_JSON), true);

        let scratch = dir.path().join("scratch");
        let first = extract_sdk_metadata(&aar, &scratch).unwrap();
        let second = extract_sdk_metadata(&aar, &scratch).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_rejects_non_aar_extension() {
        let dir = tempdir().unwrap();
        let jar = dir.path().join("plugin-sdk.jar");
        write_aar(&jar, Some(SDK_JSON), true);

        let err = extract_sdk_metadata(&jar, &dir.path().join("scratch")).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidArtifactType(_)));
    }

    #[test]
    fn test_missing_classes_jar() {
        let dir = tempdir().unwrap();
        let aar = dir.path().join("plugin-sdk.aar");
        write_aar(&aar, Some(SDK_JSON), false);

        let err = extract_sdk_metadata(&aar, &dir.path().join("scratch")).unwrap_err();
        match err {
            ExtractError::MissingEntry { entry, .. } => assert_eq!(entry, CLASSES_JAR_ENTRY),
            other => panic!("expected MissingEntry, got {other}"),
        }
    }

    #[test]
    fn test_missing_metadata_entry() {
        let dir = tempdir().unwrap();
        let aar = dir.path().join("plugin-sdk.aar");
        write_aar(&aar, None, true);

        let err = extract_sdk_metadata(&aar, &dir.path().join("scratch")).unwrap_err();
        match err {
            ExtractError::MissingEntry { entry, .. } => assert_eq!(entry, METADATA_ENTRY),
            other => panic!("expected MissingEntry, got {other}"),
        }
    }

    #[test]
    fn test_malformed_metadata_json() {
        let dir = tempdir().unwrap();
        let aar = dir.path().join("plugin-sdk.aar");
        write_aar(&aar, Some("{ not json"), true);

        let err = extract_sdk_metadata(&aar, &dir.path().join("scratch")).unwrap_err();
        assert!(matches!(err, ExtractError::Metadata(_)));
    }

    #[test]
    fn test_unreadable_outer_archive() {
        let dir = tempdir().unwrap();
        let aar = dir.path().join("broken.aar");
        fs::write(&aar, b"this is not a zip").unwrap();

        let err = extract_sdk_metadata(&aar, &dir.path().join("scratch")).unwrap_err();
        assert!(matches!(err, ExtractError::Archive { .. }));
    }
}
