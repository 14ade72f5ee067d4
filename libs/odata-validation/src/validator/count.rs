use std::sync::Arc;

use crate::error::{ValidationError, ValidationErrors};
use crate::query::{CountQueryOption, ODataQueryContext};
use crate::violations::Violations;

/// `$count=true` requires the targeted entity set or collection property to
/// be countable.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountQueryValidator;

impl CountQueryValidator {
    /// # Errors
    /// Returns the violation, if any.
    pub fn validate(self, option: &CountQueryOption) -> Result<(), ValidationError> {
        tracing::trace!(option = "$count", raw = %option.raw, "validating query option");
        Violations::run_fail_fast(|v| self.validate_value(option.value, &option.context, v))
    }

    /// # Errors
    /// Returns the violation, if any.
    pub fn try_validate(self, option: &CountQueryOption) -> Result<(), ValidationErrors> {
        tracing::trace!(option = "$count", raw = %option.raw, "validating query option");
        Violations::run_collect(|v| self.validate_value(option.value, &option.context, v))
    }

    /// # Errors
    /// Propagates the sink's verdict.
    pub fn validate_value(
        self,
        value: bool,
        query: &ODataQueryContext,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        let Some(name) = query.target_name().filter(|_| value) else {
            return Ok(());
        };
        let policy = query.policy();

        match query.target_property() {
            Some(property) => {
                let declaring = query
                    .model()
                    .structured_type(property.declaring_type())
                    .map_or_else(|| Arc::clone(query.element_type()), Arc::clone);
                if policy.is_not_countable(property, None, &declaring) {
                    return violations.report(ValidationError::NotCountableProperty(name.to_owned()));
                }
            }
            None => {
                if policy.is_entity_set_not_countable(query.element_type()) {
                    return violations.report(ValidationError::NotCountableEntitySet(name.to_owned()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::edm::{EdmModel, QueryRestrictions, QuerySettings, StructuredTypeBuilder};

    fn model() -> Arc<EdmModel> {
        Arc::new(
            EdmModel::builder()
                .with_type(
                    StructuredTypeBuilder::entity("NS.Customer")
                        .property("Id", "Edm.Int32")
                        .collection_navigation("Orders", "NS.Order")
                        .collection_navigation("Notes", "NS.Order")
                        .restrict("Notes", QueryRestrictions::not_countable()),
                )
                .with_type(
                    StructuredTypeBuilder::entity("NS.Order")
                        .property("Id", "Edm.Int32")
                        .settings(QuerySettings::new().with_countable(false)),
                )
                .build()
                .unwrap(),
        )
    }

    fn entity_set_option(model: &Arc<EdmModel>, type_name: &str, value: bool) -> CountQueryOption {
        let ty = Arc::clone(model.structured_type(type_name).unwrap());
        CountQueryOption {
            raw: value.to_string(),
            value,
            context: ODataQueryContext::new(Arc::clone(model), ty, "Set"),
        }
    }

    #[test]
    fn test_countable_entity_set() {
        let model = model();
        assert!(
            CountQueryValidator
                .validate(&entity_set_option(&model, "NS.Customer", true))
                .is_ok()
        );
    }

    #[test]
    fn test_not_countable_entity_set() {
        let model = model();
        let err = CountQueryValidator
            .validate(&entity_set_option(&model, "NS.Order", true))
            .unwrap_err();
        assert_eq!(err, ValidationError::NotCountableEntitySet("Set".to_owned()));
    }

    #[test]
    fn test_count_false_is_never_checked() {
        let model = model();
        assert!(
            CountQueryValidator
                .validate(&entity_set_option(&model, "NS.Order", false))
                .is_ok()
        );
    }

    #[test]
    fn test_not_countable_property() {
        let model = model();
        let notes = model.find_property("NS.Customer", "Notes").unwrap();
        let order = Arc::clone(model.structured_type("NS.Order").unwrap());
        let option = CountQueryOption {
            raw: "true".to_owned(),
            value: true,
            context: ODataQueryContext::for_property(Arc::clone(&model), order, notes),
        };
        let err = CountQueryValidator.validate(&option).unwrap_err();
        assert_eq!(err, ValidationError::NotCountableProperty("Notes".to_owned()));
    }
}
