use crate::error::{ValidationError, ValidationErrors};
use crate::query::{ODataQueryContext, SkipTokenQueryOption};
use crate::violations::Violations;

/// `$skiptoken` is only accepted when the model enables server-driven paging tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipTokenQueryValidator;

impl SkipTokenQueryValidator {
    /// # Errors
    /// Returns the violation, if any.
    pub fn validate(self, option: &SkipTokenQueryOption) -> Result<(), ValidationError> {
        tracing::trace!(option = "$skiptoken", "validating query option");
        Violations::run_fail_fast(|v| self.validate_context(&option.context, v))
    }

    /// # Errors
    /// Returns the violation, if any.
    pub fn try_validate(self, option: &SkipTokenQueryOption) -> Result<(), ValidationErrors> {
        tracing::trace!(option = "$skiptoken", "validating query option");
        Violations::run_collect(|v| self.validate_context(&option.context, v))
    }

    /// # Errors
    /// Propagates the sink's verdict.
    pub fn validate_context(
        self,
        query: &ODataQueryContext,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        if query.defaults().enable_skip_token {
            return Ok(());
        }
        violations.report(ValidationError::NotEnabledQueryOption {
            option: "SkipToken",
            setting: "EnableSkipToken",
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::edm::{DefaultQuerySettings, EdmModel, StructuredTypeBuilder};
    use std::sync::Arc;

    fn option(enable_skip_token: bool) -> SkipTokenQueryOption {
        let model = EdmModel::builder()
            .with_type(StructuredTypeBuilder::entity("NS.Item").property("Id", "Edm.Int32"))
            .build()
            .unwrap();
        let ty = Arc::clone(model.structured_type("NS.Item").unwrap());
        let context = ODataQueryContext::new(Arc::new(model), ty, "Items").with_defaults(
            DefaultQuerySettings {
                enable_skip_token,
                ..DefaultQuerySettings::default()
            },
        );
        SkipTokenQueryOption {
            raw: "token".to_owned(),
            context,
        }
    }

    #[test]
    fn test_enabled_by_default() {
        assert!(SkipTokenQueryValidator.validate(&option(true)).is_ok());
    }

    #[test]
    fn test_disabled_skip_token() {
        let errors = SkipTokenQueryValidator.try_validate(&option(false)).unwrap_err();
        assert_eq!(
            errors.messages(),
            vec![
                "Query option 'SkipToken' is not enabled by the model. To enable it, set the 'EnableSkipToken' default query setting."
                    .to_owned()
            ]
        );
    }
}
