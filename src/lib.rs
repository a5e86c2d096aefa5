//! plugin-packager - packages Android application variants into Block IDLE
//! plugin artifacts.
//!
//! For every build variant that passes the platform-version policy, the
//! pipeline copies the variant's APK outputs to a publishable location,
//! annotates them with compatibility metadata extracted from the vendor
//! plugin SDK archive, writes one JSON metadata document per variant, and
//! merges all documents into a single manifest
//! (`plugin-metadata/all-plugins.json`).
//!
//! The host build tool drives ordering through [`executor::TaskGraph`]:
//! named steps with declared predecessors, where the merge step always
//! runs after every per-variant step.

pub mod executor;
pub mod model;
pub mod packaging;
pub mod traits;

// Re-export common types for convenience
pub use executor::*;
pub use model::*;
pub use packaging::*;
pub use traits::*;

/// Installs a `tracing` subscriber honoring `RUST_LOG`, for embedders that
/// have not set one up. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
