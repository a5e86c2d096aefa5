//! Packaging module - the variant-build metadata pipeline.
//!
//! This module holds the packaging stages and their coordinator:
//! - **Layout**: fixed on-disk locations via [`BuildLayout`]
//! - **Validation**: platform-version policy for variants
//! - **Fetch**: cache-first download of the vendor SDK archive
//! - **Extract**: nested-archive SDK metadata extraction
//! - **Record**: per-variant APK copy + metadata document
//! - **Merge**: aggregation into the single manifest
//! - **Pipeline**: dependency-graph orchestration via [`PackagingPipeline`]

pub mod extract;
pub mod fetch;
pub mod layout;
pub mod merge;
pub mod pipeline;
pub mod record;
pub mod validate;

// Re-export commonly used types
pub use extract::{extract_sdk_metadata, ExtractError};
pub use fetch::{ensure_local, ensure_local_verified, FetchError};
pub use layout::{BuildLayout, METADATA_FILE_NAME, MERGED_MANIFEST_NAME, PLUGIN_SDK_URL};
pub use merge::{merge_metadata, MergeError};
pub use pipeline::{PackagingPipeline, PackagingReport, PipelineError};
pub use record::{build_variant_record, write_variant_record, RecordError};
pub use validate::{validate_variant, ValidationError, ValidationPolicy, MIN_SUPPORTED_SDK};
