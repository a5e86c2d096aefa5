//! Platform-version policy applied to every variant before any packaging
//! task is registered for it.

use crate::model::BuildVariant;
use thiserror::Error;
use tracing::debug;

/// Lowest Android API level a plugin variant may declare as `minSdk`.
pub const MIN_SUPPORTED_SDK: u32 = 26;

/// Errors that fail variant validation. Validation failures halt the build
/// for the affected variant; there is no recovery path.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Variant declares a minSdk below the supported floor
    #[error("minSdk must be >= {MIN_SUPPORTED_SDK} for variant '{variant}' (got {min_sdk})")]
    UnsupportedMinSdk { variant: String, min_sdk: u32 },

    /// Variant's targetSdk does not match the policy's required level.
    /// Only raised when [`ValidationPolicy::required_target_sdk`] is set.
    #[error("targetSdk must be {required} for variant '{variant}' (got {target_sdk})")]
    TargetSdkMismatch {
        variant: String,
        target_sdk: u32,
        required: u32,
    },
}

/// Tunable part of the validation rules.
///
/// The targetSdk equality rule exists upstream but has always shipped
/// disabled; it stays off unless a caller opts in via
/// [`ValidationPolicy::require_target_sdk`].
#[derive(Debug, Clone, Default)]
pub struct ValidationPolicy {
    required_target_sdk: Option<u32>,
}

impl ValidationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables the exact-targetSdk rule at the given level.
    pub fn require_target_sdk(mut self, level: u32) -> Self {
        self.required_target_sdk = Some(level);
        self
    }
}

/// Checks `variant` against the platform-version policy.
///
/// # Errors
///
/// Returns [`ValidationError::UnsupportedMinSdk`] when the variant's minSdk
/// is below [`MIN_SUPPORTED_SDK`], or [`ValidationError::TargetSdkMismatch`]
/// when the opt-in targetSdk rule is active and violated.
pub fn validate_variant(
    variant: &BuildVariant,
    policy: &ValidationPolicy,
) -> Result<(), ValidationError> {
    if variant.min_sdk < MIN_SUPPORTED_SDK {
        return Err(ValidationError::UnsupportedMinSdk {
            variant: variant.name.clone(),
            min_sdk: variant.min_sdk,
        });
    }

    if let Some(required) = policy.required_target_sdk {
        if variant.target_sdk != required {
            return Err(ValidationError::TargetSdkMismatch {
                variant: variant.name.clone(),
                target_sdk: variant.target_sdk,
                required,
            });
        }
    }

    debug!(variant = %variant.name, min_sdk = variant.min_sdk, "Variant passed validation");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn variant(min_sdk: u32, target_sdk: u32) -> BuildVariant {
        BuildVariant {
            name: "staging".to_string(),
            build_type: "debug".to_string(),
            product_flavors: BTreeMap::new(),
            min_sdk,
            target_sdk,
        }
    }

    #[test]
    fn test_min_sdk_below_floor_rejected() {
        let err = validate_variant(&variant(21, 34), &ValidationPolicy::new()).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::UnsupportedMinSdk { min_sdk: 21, .. }
        ));
    }

    #[test]
    fn test_min_sdk_at_floor_accepted() {
        assert!(validate_variant(&variant(26, 34), &ValidationPolicy::new()).is_ok());
        assert!(validate_variant(&variant(33, 34), &ValidationPolicy::new()).is_ok());
    }

    #[test]
    fn test_target_sdk_rule_disabled_by_default() {
        // Any targetSdk passes unless the rule is explicitly enabled.
        assert!(validate_variant(&variant(26, 28), &ValidationPolicy::new()).is_ok());
        assert!(validate_variant(&variant(26, 35), &ValidationPolicy::new()).is_ok());
    }

    #[test]
    fn test_target_sdk_rule_opt_in() {
        let policy = ValidationPolicy::new().require_target_sdk(28);
        assert!(validate_variant(&variant(26, 28), &policy).is_ok());
        let err = validate_variant(&variant(26, 34), &policy).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::TargetSdkMismatch {
                target_sdk: 34,
                required: 28,
                ..
            }
        ));
    }
}
