use crate::error::{ValidationError, ValidationErrors};
use crate::query::SkipQueryOption;
use crate::settings::ValidationSettings;
use crate::violations::Violations;

/// `$skip` against `MaxSkip`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipQueryValidator;

impl SkipQueryValidator {
    /// # Errors
    /// Returns the violation, if any.
    pub fn validate(
        self,
        option: &SkipQueryOption,
        settings: &ValidationSettings,
    ) -> Result<(), ValidationError> {
        tracing::trace!(option = "$skip", raw = %option.raw, "validating query option");
        Violations::run_fail_fast(|v| self.validate_value(option.value, settings, v))
    }

    /// # Errors
    /// Returns the violation, if any.
    pub fn try_validate(
        self,
        option: &SkipQueryOption,
        settings: &ValidationSettings,
    ) -> Result<(), ValidationErrors> {
        tracing::trace!(option = "$skip", raw = %option.raw, "validating query option");
        Violations::run_collect(|v| self.validate_value(option.value, settings, v))
    }

    /// # Errors
    /// Propagates the sink's verdict.
    pub fn validate_value(
        self,
        value: u64,
        settings: &ValidationSettings,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        match settings.max_skip {
            Some(max) if value > max => violations.report(ValidationError::SkipTopLimitExceeded {
                limit: max,
                option: "Skip",
                value,
            }),
            _ => Ok(()),
        }
    }
}
