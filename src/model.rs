use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One build configuration of the host application (build type + product
/// flavors), as reported by the Android build toolchain.
///
/// Variants are read-only inputs: the packager never mutates them, it only
/// validates them and derives metadata from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildVariant {
    /// Variant name, e.g. `"debug"` or `"paidRelease"`
    pub name: String,

    /// Build type component of the variant, e.g. `"debug"`, `"release"`
    pub build_type: String,

    /// Flavor-dimension name → flavor name (e.g. `"tier" -> "paid"`)
    pub product_flavors: BTreeMap<String, String>,

    /// Minimum Android API level the variant declares
    pub min_sdk: u32,

    /// Target Android API level the variant declares
    pub target_sdk: u32,
}

/// One APK the toolchain produced for a variant.
///
/// A variant has zero or more of these (one per split/universal APK).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltArtifact {
    /// Source-of-truth location of the APK before it is copied into the
    /// publishable output directory
    pub output_path: PathBuf,

    /// Version name baked into the APK, e.g. `"1.0"`
    pub version_label: String,

    /// Split/selector attributes, e.g. `"abi" -> "arm64-v8a"`
    pub filters: BTreeMap<String, String>,
}

/// Compatibility metadata embedded in the vendor plugin SDK archive at
/// `META-INF/sdk-metadata.json` (inside `classes.jar`).
///
/// Field names mirror the wire format exactly; this is the one place the
/// vendor schema enters the crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkMetadata {
    /// Lowest host API level the SDK supports
    pub min_sdk_supported: u32,

    /// Human-readable SDK version, e.g. `"1.2.0"`
    pub version: String,

    /// Monotonic numeric version
    pub version_number: i64,

    /// Release channel, e.g. `"alpha"`, `"stable"`
    pub version_type: String,

    /// Sub-release counter within the channel
    pub sub_version: i64,

    /// Display name of the release
    pub version_name: String,
}

/// The flattened SDK fields as they appear in a per-variant metadata record.
///
/// The record uses different key names than the SDK's own wire format
/// (`version` becomes `sdkVersion` and so on), so the mapping lives in one
/// conversion instead of being scattered across serializers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkAnnotations {
    pub min_sdk_supported: u32,
    pub sdk_version: String,
    pub sdk_version_number: i64,
    pub sdk_sub_version_type: String,
    pub sdk_sub_version_number: i64,
    pub sdk_version_name: String,
}

impl From<&SdkMetadata> for SdkAnnotations {
    fn from(sdk: &SdkMetadata) -> Self {
        Self {
            min_sdk_supported: sdk.min_sdk_supported,
            sdk_version: sdk.version.clone(),
            sdk_version_number: sdk.version_number,
            sdk_sub_version_type: sdk.version_type.clone(),
            sdk_sub_version_number: sdk.sub_version,
            sdk_version_name: sdk.version_name.clone(),
        }
    }
}

/// One `outputs` entry of a per-variant metadata record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApkOutput {
    /// Filename of the copied APK, relative to the variant's output
    /// directory. Never an absolute path — the manifest must stay portable.
    pub apk_path: String,

    /// Version name reported by the toolchain for this APK
    pub version_name: String,

    /// Split/selector attributes carried over from [`BuiltArtifact`]
    pub filters: BTreeMap<String, String>,
}

/// The JSON document written to `<variant>/apk-metadata.json`.
///
/// Key order is fixed by field order here; the merged manifest is a JSON
/// array of these objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantMetadataRecord {
    /// Variant name (identity)
    pub variant: String,

    /// Build type of the variant
    pub build_type: String,

    /// Flavor-dimension name → flavor name
    pub flavors: BTreeMap<String, String>,

    /// Variant's declared minimum API level
    pub min_sdk: u32,

    /// Variant's declared target API level
    pub target_sdk: u32,

    /// Flattened vendor SDK fields; absent when no SDK metadata was
    /// extracted for this build
    #[serde(flatten)]
    pub sdk: Option<SdkAnnotations>,

    /// One entry per APK the variant produced, in toolchain order
    pub outputs: Vec<ApkOutput>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sdk() -> SdkMetadata {
        SdkMetadata {
            min_sdk_supported: 26,
            version: "1.2.0".to_string(),
            version_number: 12,
            version_type: "alpha".to_string(),
            sub_version: 3,
            version_name: "Aurora".to_string(),
        }
    }

    #[test]
    fn test_sdk_metadata_wire_keys() {
        let json = serde_json::to_value(sample_sdk()).unwrap();
        let obj = json.as_object().unwrap();
        for key in [
            "minSdkSupported",
            "version",
            "versionNumber",
            "versionType",
            "subVersion",
            "versionName",
        ] {
            assert!(obj.contains_key(key), "missing wire key {key}");
        }
    }

    #[test]
    fn test_sdk_annotations_renames_version_fields() {
        let annotations = SdkAnnotations::from(&sample_sdk());
        let json = serde_json::to_value(&annotations).unwrap();
        assert_eq!(json["sdkVersion"], "1.2.0");
        assert_eq!(json["sdkSubVersionType"], "alpha");
        assert_eq!(json["sdkSubVersionNumber"], 3);
        assert_eq!(json["sdkVersionName"], "Aurora");
        assert_eq!(json["minSdkSupported"], 26);
    }

    #[test]
    fn test_record_without_sdk_omits_sdk_keys() {
        let record = VariantMetadataRecord {
            variant: "debug".to_string(),
            build_type: "debug".to_string(),
            flavors: BTreeMap::new(),
            min_sdk: 26,
            target_sdk: 34,
            sdk: None,
            outputs: vec![],
        };

        let json = serde_json::to_value(&record).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("sdkVersion"));
        assert!(!obj.contains_key("minSdkSupported"));
        assert_eq!(json["variant"], "debug");
        assert_eq!(json["buildType"], "debug");
    }

    #[test]
    fn test_record_round_trips() {
        let mut filters = BTreeMap::new();
        filters.insert("abi".to_string(), "arm64-v8a".to_string());

        let record = VariantMetadataRecord {
            variant: "debug".to_string(),
            build_type: "debug".to_string(),
            flavors: BTreeMap::new(),
            min_sdk: 26,
            target_sdk: 34,
            sdk: Some(SdkAnnotations::from(&sample_sdk())),
            outputs: vec![ApkOutput {
                apk_path: "app-debug.apk".to_string(),
                version_name: "1.0".to_string(),
                filters,
            }],
        };

        let json = serde_json::to_string_pretty(&record).unwrap();
        let parsed: VariantMetadataRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
