use crate::error::{ValidationError, ValidationErrors};
use crate::query::{ODataQueryContext, TopQueryOption};
use crate::settings::ValidationSettings;
use crate::violations::Violations;

/// `$top` against the global `MaxTop` and the model-bound max top.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopQueryValidator;

impl TopQueryValidator {
    /// # Errors
    /// Returns the first violation.
    pub fn validate(
        self,
        option: &TopQueryOption,
        settings: &ValidationSettings,
    ) -> Result<(), ValidationError> {
        tracing::trace!(option = "$top", raw = %option.raw, "validating query option");
        Violations::run_fail_fast(|v| self.validate_value(option.value, &option.context, settings, v))
    }

    /// # Errors
    /// Returns every distinct violation.
    pub fn try_validate(
        self,
        option: &TopQueryOption,
        settings: &ValidationSettings,
    ) -> Result<(), ValidationErrors> {
        tracing::trace!(option = "$top", raw = %option.raw, "validating query option");
        Violations::run_collect(|v| self.validate_value(option.value, &option.context, settings, v))
    }

    /// # Errors
    /// Propagates the sink's verdicts.
    pub fn validate_value(
        self,
        value: u64,
        query: &ODataQueryContext,
        settings: &ValidationSettings,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        if let Some(max) = settings.max_top
            && value > max
        {
            violations.report(ValidationError::SkipTopLimitExceeded {
                limit: max,
                option: "Top",
                value,
            })?;
        }

        let model_max = query
            .policy()
            .max_top(query.target_property().map(AsRef::as_ref), query.element_type());
        if let Some(max) = model_max
            && value > max
        {
            violations.report(ValidationError::SkipTopLimitExceeded {
                limit: max,
                option: "Top",
                value,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::edm::{DefaultQuerySettings, EdmModel, QuerySettings, StructuredTypeBuilder};
    use std::sync::Arc;

    fn context(model_max_top: Option<u64>) -> ODataQueryContext {
        let mut product = StructuredTypeBuilder::entity("NS.Product").property("Id", "Edm.Int32");
        if let Some(max) = model_max_top {
            product = product.settings(QuerySettings::new().with_max_top(max));
        }
        let model = EdmModel::builder().with_type(product).build().unwrap();
        let ty = Arc::clone(model.structured_type("NS.Product").unwrap());
        ODataQueryContext::new(Arc::new(model), ty, "Products")
    }

    fn option(context: &ODataQueryContext, value: u64) -> TopQueryOption {
        TopQueryOption {
            raw: value.to_string(),
            value,
            context: context.clone(),
        }
    }

    #[test]
    fn test_global_max_top() {
        let context = context(None);
        let settings = ValidationSettings::new().with_max_top(10);
        assert!(TopQueryValidator.validate(&option(&context, 10), &settings).is_ok());
        let err = TopQueryValidator
            .validate(&option(&context, 11), &settings)
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::SkipTopLimitExceeded {
                limit: 10,
                option: "Top",
                value: 11
            }
        );
    }

    #[test]
    fn test_model_max_top_is_also_enforced() {
        let context = context(Some(5));
        let settings = ValidationSettings::new().with_max_top(10);
        let errors = TopQueryValidator
            .try_validate(&option(&context, 20), &settings)
            .unwrap_err();
        assert_eq!(errors.len(), 2);

        let err = TopQueryValidator
            .validate(&option(&context, 7), &settings)
            .unwrap_err();
        assert!(err.to_string().contains("'5'"));
    }

    #[test]
    fn test_global_default_max_top() {
        let context = context(None).with_defaults(DefaultQuerySettings {
            max_top: Some(3),
            ..DefaultQuerySettings::default()
        });
        assert!(
            TopQueryValidator
                .validate(&option(&context, 4), &ValidationSettings::default())
                .is_err()
        );
    }
}
