//! End-to-end packaging pipeline.
//!
//! [`PackagingPipeline`] turns registered build variants into a dependency
//! graph of named steps and runs it:
//!
//! ```text
//! fetch-sdk ──► extract-sdk-metadata ──► build-variant-metadata:<name> ──► merge-metadata
//!                                    └─► build-variant-metadata:<name> ──┘
//! ```
//!
//! Validation happens eagerly at [`PackagingPipeline::register_variant`]
//! time, so a variant that fails the platform policy never gets a step and
//! never writes a metadata file. The merge step declares every variant step
//! as a predecessor, which is the "runs after all producers" contract the
//! host build tool otherwise enforces.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::info;

use crate::executor::{
    CompletedStep, ExecutionError, GraphError, StepError, TaskGraph,
};
use crate::model::{BuildVariant, SdkMetadata, VariantMetadataRecord};
use crate::packaging::extract::{extract_sdk_metadata, ExtractError};
use crate::packaging::fetch::{ensure_local, FetchError};
use crate::packaging::layout::{BuildLayout, PLUGIN_SDK_URL};
use crate::packaging::merge::{merge_metadata, MergeError};
use crate::packaging::record::{build_variant_record, write_variant_record, RecordError};
use crate::packaging::validate::{validate_variant, ValidationError, ValidationPolicy};
use crate::traits::{ArtifactLoader, LoadError};

/// Everything that can fail across the pipeline, one variant per component.
/// Every failure is fatal to the current build; there is no retry or
/// partial-success reporting.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Step(#[from] StepError),

    /// Started on a current-thread runtime; packaging steps block on
    /// loader futures from worker threads, which would deadlock there
    #[error("Packaging pipeline requires a multi-thread tokio runtime")]
    Runtime,
}

/// Outcome of a completed pipeline run.
#[derive(Debug)]
pub struct PackagingReport {
    /// Records built this run, sorted by variant name
    pub records: Vec<VariantMetadataRecord>,

    /// Number of records aggregated into the manifest (includes records
    /// left over from earlier runs under the same metadata root)
    pub records_merged: usize,

    /// Path of the merged manifest
    pub manifest_path: PathBuf,

    /// Step completions in finish order, with durations
    pub steps: Vec<CompletedStep>,
}

struct RegisteredVariant {
    variant: BuildVariant,
    apk_dir: PathBuf,
}

/// Coordinates validation, SDK fetching/extraction, per-variant packaging,
/// and the final metadata merge.
pub struct PackagingPipeline<L>
where
    L: ArtifactLoader + 'static,
{
    layout: BuildLayout,
    loader: Arc<L>,
    sdk_url: String,
    policy: ValidationPolicy,
    annotate_sdk: bool,
    concurrency: usize,
    step_timeout: Option<Duration>,
    variants: Vec<RegisteredVariant>,
}

impl<L> PackagingPipeline<L>
where
    L: ArtifactLoader + 'static,
{
    /// Creates a pipeline with the default configuration:
    /// - SDK annotation enabled, fetched from the Block IDLE release URL
    /// - Default validation policy (minSdk floor only)
    /// - Sequential step execution, no step timeout
    pub fn new(layout: BuildLayout, loader: L) -> Self {
        Self {
            layout,
            loader: Arc::new(loader),
            sdk_url: PLUGIN_SDK_URL.to_string(),
            policy: ValidationPolicy::new(),
            annotate_sdk: true,
            concurrency: 1,
            step_timeout: None,
            variants: Vec::new(),
        }
    }

    /// Overrides the SDK archive URL (e.g. a mirror).
    pub fn with_sdk_url(mut self, url: impl Into<String>) -> Self {
        self.sdk_url = url.into();
        self
    }

    /// Replaces the validation policy.
    pub fn with_validation_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Disables SDK fetching/extraction; records carry no SDK fields.
    pub fn with_sdk_annotation(mut self, annotate: bool) -> Self {
        self.annotate_sdk = annotate;
        self
    }

    /// Bounds parallel step execution. Per-variant steps write only into
    /// their own subdirectories, so raising this is safe.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Applies a wall-clock timeout to every step.
    pub fn with_step_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = Some(step_timeout);
        self
    }

    /// Validates `variant` and queues it for packaging.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the variant fails the platform
    /// policy; a rejected variant is not queued and no file is ever
    /// written for it.
    pub fn register_variant(
        &mut self,
        variant: BuildVariant,
        apk_dir: impl Into<PathBuf>,
    ) -> Result<(), ValidationError> {
        validate_variant(&variant, &self.policy)?;
        info!(variant = %variant.name, "Registered variant for packaging");
        self.variants.push(RegisteredVariant {
            variant,
            apk_dir: apk_dir.into(),
        });
        Ok(())
    }

    /// Runs the full pipeline.
    ///
    /// With zero registered variants only the merge step runs, producing a
    /// valid (possibly empty) manifest from whatever metadata already sits
    /// under the metadata root.
    ///
    /// Must run on a multi-thread tokio runtime: each step executes on a
    /// blocking worker thread and drives the loader future with
    /// [`Handle::block_on`], which cannot make progress when the runtime
    /// has no other worker to poll it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Runtime`] on a current-thread runtime;
    /// otherwise the first step failure, as its typed component error.
    pub async fn execute(self) -> Result<PackagingReport, PipelineError> {
        let handle = Handle::current();
        if handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
            return Err(PipelineError::Runtime);
        }

        let Self {
            layout,
            loader,
            sdk_url,
            policy: _,
            annotate_sdk,
            concurrency,
            step_timeout,
            variants,
        } = self;

        info!(
            variants = variants.len(),
            toolchain = loader.toolchain_id(),
            "Starting packaging pipeline"
        );

        let mut graph = TaskGraph::new().with_concurrency(concurrency);
        if let Some(limit) = step_timeout {
            graph = graph.with_step_timeout(limit);
        }

        let sdk_slot: Arc<OnceLock<SdkMetadata>> = Arc::new(OnceLock::new());
        let records: Arc<Mutex<Vec<VariantMetadataRecord>>> = Arc::new(Mutex::new(Vec::new()));
        let merged_count: Arc<OnceLock<usize>> = Arc::new(OnceLock::new());

        if annotate_sdk {
            let archive = layout.sdk_archive();
            graph.register(
                "fetch-sdk",
                Vec::<String>::new(),
                Box::new(move || {
                    ensure_local(&sdk_url, &archive)
                        .map(drop)
                        .map_err(|error| boxed(PipelineError::Fetch(error)))
                }),
            );

            let archive = layout.sdk_archive();
            let scratch = layout.sdk_metadata_dir();
            let slot = Arc::clone(&sdk_slot);
            graph.register(
                "extract-sdk-metadata",
                ["fetch-sdk"],
                Box::new(move || {
                    let metadata = extract_sdk_metadata(&archive, &scratch)
                        .map_err(|error| boxed(PipelineError::Extract(error)))?;
                    let _ = slot.set(metadata);
                    Ok(())
                }),
            );
        }

        let mut variant_steps = Vec::with_capacity(variants.len());
        for registered in variants {
            let step_name = format!("build-variant-metadata:{}", registered.variant.name);
            variant_steps.push(step_name.clone());

            let deps: Vec<String> = if annotate_sdk {
                vec!["extract-sdk-metadata".to_string()]
            } else {
                Vec::new()
            };

            let loader = Arc::clone(&loader);
            let layout = layout.clone();
            let slot = Arc::clone(&sdk_slot);
            let records = Arc::clone(&records);
            let handle = handle.clone();
            graph.register(
                step_name,
                deps,
                Box::new(move || {
                    package_variant(
                        &handle,
                        loader.as_ref(),
                        &registered.variant,
                        &registered.apk_dir,
                        slot.get(),
                        &layout,
                    )
                    .map(|record| records.lock().expect("records lock poisoned").push(record))
                    .map_err(boxed)
                }),
            );
        }

        let metadata_root = layout.metadata_root();
        let manifest_path = layout.merged_manifest();
        {
            let manifest_path = manifest_path.clone();
            let merged_count = Arc::clone(&merged_count);
            graph.register(
                "merge-metadata",
                variant_steps,
                Box::new(move || {
                    let count = merge_metadata(&metadata_root, &manifest_path)
                        .map_err(|error| boxed(PipelineError::Merge(error)))?;
                    let _ = merged_count.set(count);
                    Ok(())
                }),
            );
        }

        let steps = graph.run().await.map_err(unwrap_execution_error)?;

        let mut records = Arc::try_unwrap(records)
            .map(|mutex| mutex.into_inner().expect("records lock poisoned"))
            .unwrap_or_default();
        records.sort_by(|a, b| a.variant.cmp(&b.variant));

        let records_merged = merged_count.get().copied().unwrap_or(0);
        info!(
            records = records.len(),
            records_merged,
            manifest = %manifest_path.display(),
            "Packaging pipeline finished"
        );

        Ok(PackagingReport {
            records,
            records_merged,
            manifest_path,
            steps,
        })
    }
}

/// Loads a variant's artifacts and builds + writes its metadata record.
/// Runs on a blocking thread; the loader future is driven via the runtime
/// handle.
fn package_variant<L>(
    handle: &Handle,
    loader: &L,
    variant: &BuildVariant,
    apk_dir: &Path,
    sdk: Option<&SdkMetadata>,
    layout: &BuildLayout,
) -> Result<VariantMetadataRecord, PipelineError>
where
    L: ArtifactLoader,
{
    let artifacts = handle.block_on(loader.load(variant, apk_dir))?;
    if artifacts.is_empty() {
        return Err(PipelineError::Load(LoadError::NoArtifacts {
            variant: variant.name.clone(),
            apk_dir: apk_dir.display().to_string(),
        }));
    }

    let record = build_variant_record(variant, &artifacts, sdk, layout)?;
    write_variant_record(&record, layout)?;
    Ok(record)
}

fn boxed(error: PipelineError) -> crate::executor::BoxedStepError {
    Box::new(error)
}

/// Recovers the typed pipeline error a step job boxed, falling back to the
/// step-level error for panics, timeouts, and graph problems.
fn unwrap_execution_error(error: ExecutionError) -> PipelineError {
    match error {
        ExecutionError::Graph(graph) => PipelineError::Graph(graph),
        ExecutionError::Step(StepError::Failed { step, source }) => {
            match source.downcast::<PipelineError>() {
                Ok(pipeline_error) => *pipeline_error,
                Err(source) => PipelineError::Step(StepError::Failed { step, source }),
            }
        }
        ExecutionError::Step(step) => PipelineError::Step(step),
    }
}
