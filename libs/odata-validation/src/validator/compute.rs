use crate::error::{ValidationError, ValidationErrors};
use crate::query::ComputeQueryOption;
use crate::violations::Violations;

/// `$compute` has no rules of its own; validation forces the deferred parse
/// so that parse failures surface as validation errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComputeQueryValidator;

impl ComputeQueryValidator {
    /// # Errors
    /// Returns the violation, if any.
    pub fn validate(self, option: &ComputeQueryOption) -> Result<(), ValidationError> {
        tracing::trace!(option = "$compute", raw = %option.raw, "validating query option");
        Violations::run_fail_fast(|v| self.validate_option(option, v))
    }

    /// # Errors
    /// Returns the violation, if any.
    pub fn try_validate(self, option: &ComputeQueryOption) -> Result<(), ValidationErrors> {
        tracing::trace!(option = "$compute", raw = %option.raw, "validating query option");
        Violations::run_collect(|v| self.validate_option(option, v))
    }

    /// # Errors
    /// Propagates the sink's verdict.
    pub fn validate_option(
        self,
        option: &ComputeQueryOption,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        match &option.clause {
            None => violations.report(ValidationError::ArgumentNull("ComputeClause")),
            Some(Err(reason)) => violations.report(ValidationError::ComputeParse(reason.clone())),
            Some(Ok(_)) => Ok(()),
        }
    }
}
