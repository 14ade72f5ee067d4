use crate::ast::{IT, OrderByClause, SingleValueNode};
use crate::context::{OrderByValidatorContext, QueryValidatorContext};
use crate::error::{ValidationError, ValidationErrors};
use crate::query::{ODataQueryContext, OrderByQueryOption};
use crate::settings::ValidationSettings;
use crate::validator::filter::FilterValidator;
use crate::validator::order_by_limits::OrderByModelLimitationsValidator;
use crate::violations::Violations;

/// What an `$orderby` clause sorts by, as far as the allow-list is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderByTarget<'a> {
    /// A declared structural property.
    Property(&'a str),
    /// A dynamic property of an open type.
    OpenProperty(&'a str),
    /// The resource itself or any other expression, named `$it`.
    It,
}

impl<'a> OrderByTarget<'a> {
    #[must_use]
    pub fn of(expression: &'a SingleValueNode) -> Self {
        match expression {
            SingleValueNode::SingleValuePropertyAccess { property, .. }
            | SingleValueNode::SingleComplex { property, .. } => OrderByTarget::Property(property.name()),
            SingleValueNode::SingleValueOpenPropertyAccess { name, .. } => OrderByTarget::OpenProperty(name),
            _ => OrderByTarget::It,
        }
    }

    #[must_use]
    pub fn name(self) -> &'a str {
        match self {
            OrderByTarget::Property(name) | OrderByTarget::OpenProperty(name) => name,
            OrderByTarget::It => IT,
        }
    }
}

/// `$orderby` validation: clause count, then per clause either the explicit
/// `AllowedOrderByProperties` list or the model's sortability rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderByQueryValidator;

impl OrderByQueryValidator {
    /// # Errors
    /// Returns the first violation.
    pub fn validate(
        self,
        option: &OrderByQueryOption,
        settings: &ValidationSettings,
    ) -> Result<(), ValidationError> {
        tracing::trace!(option = "$orderby", raw = %option.raw, "validating query option");
        Violations::run_fail_fast(|v| self.validate_clause(&option.clause, &option.context, settings, v))
    }

    /// # Errors
    /// Returns every distinct violation.
    pub fn try_validate(
        self,
        option: &OrderByQueryOption,
        settings: &ValidationSettings,
    ) -> Result<(), ValidationErrors> {
        tracing::trace!(option = "$orderby", raw = %option.raw, "validating query option");
        Violations::run_collect(|v| self.validate_clause(&option.clause, &option.context, settings, v))
    }

    /// Validate the chain starting at `clause`.
    ///
    /// # Errors
    /// Propagates the sink's verdicts.
    pub fn validate_clause(
        self,
        clause: &OrderByClause,
        query: &ODataQueryContext,
        settings: &ValidationSettings,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        let mut ctx = OrderByValidatorContext::new(QueryValidatorContext::new(query, settings));
        let explicit = settings.has_explicit_order_by_properties();

        for clause in clause.iter() {
            ctx.count_clause(violations)?;

            let target = OrderByTarget::of(&clause.expression);
            if explicit {
                if !settings.allowed_order_by_properties.contains(target.name()) {
                    violations.report(ValidationError::NotAllowedOrderByProperty {
                        property: target.name().to_owned(),
                        setting: "AllowedOrderByProperties",
                    })?;
                }
            } else if !matches!(target, OrderByTarget::OpenProperty(_)) {
                OrderByModelLimitationsValidator.validate_expression(
                    &clause.expression,
                    query,
                    settings,
                    violations,
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::ast::OrderByDirection;
    use crate::edm::{EdmModel, QueryRestrictions, StructuredTypeBuilder};
    use std::sync::Arc;

    fn context() -> ODataQueryContext {
        let model = EdmModel::builder()
            .with_type(
                StructuredTypeBuilder::entity("NS.City")
                    .property("Name", "Edm.String")
                    .property("Population", "Edm.Int64")
                    .property("Motto", "Edm.String")
                    .restrict("Motto", QueryRestrictions::not_sortable()),
            )
            .build()
            .unwrap();
        let ty = Arc::clone(model.structured_type("NS.City").unwrap());
        ODataQueryContext::new(Arc::new(model), ty, "Cities")
    }

    fn option(context: &ODataQueryContext, expressions: Vec<SingleValueNode>) -> OrderByQueryOption {
        OrderByQueryOption {
            raw: String::new(),
            clause: OrderByClause::chain(
                expressions
                    .into_iter()
                    .map(|e| (e, OrderByDirection::Ascending))
                    .collect::<Vec<_>>(),
            )
            .unwrap(),
            context: context.clone(),
        }
    }

    fn prop(context: &ODataQueryContext, name: &str) -> SingleValueNode {
        SingleValueNode::property(context.model().find_property("NS.City", name).unwrap())
    }

    #[test]
    fn test_target_names() {
        let context = context();
        assert_eq!(OrderByTarget::of(&prop(&context, "Name")).name(), "Name");
        assert_eq!(OrderByTarget::of(&SingleValueNode::it()).name(), "$it");
        let open = SingleValueNode::SingleValueOpenPropertyAccess {
            source: Box::new(SingleValueNode::it()),
            name: "Extra".to_owned(),
        };
        assert_eq!(OrderByTarget::of(&open), OrderByTarget::OpenProperty("Extra"));
    }

    #[test]
    fn test_model_sortability_applies_without_explicit_list() {
        let context = context();
        let option = option(&context, vec![prop(&context, "Name"), prop(&context, "Motto")]);
        let err = OrderByQueryValidator
            .validate(&option, &ValidationSettings::default())
            .unwrap_err();
        assert_eq!(err, ValidationError::NotSortableProperty("Motto".to_owned()));
    }

    #[test]
    fn test_explicit_list_replaces_model_sortability() {
        let context = context();
        let option = option(&context, vec![prop(&context, "Motto")]);
        let settings = ValidationSettings::new().with_allowed_order_by_properties(["Motto"]);
        assert!(OrderByQueryValidator.validate(&option, &settings).is_ok());
    }

    #[test]
    fn test_it_checked_against_explicit_list() {
        let context = context();
        let option = option(&context, vec![SingleValueNode::it()]);
        let settings = ValidationSettings::new().with_allowed_order_by_properties(["Name"]);
        let err = OrderByQueryValidator.validate(&option, &settings).unwrap_err();
        assert!(err.to_string().contains("'$it'"));
        assert!(err.to_string().contains("AllowedOrderByProperties"));

        let settings = ValidationSettings::new().with_allowed_order_by_properties(["Name", "$it"]);
        assert!(OrderByQueryValidator.validate(&option, &settings).is_ok());
    }

    #[test]
    fn test_clause_count_collects_once_per_extra_clause() {
        let context = context();
        let option = option(
            &context,
            vec![
                prop(&context, "Name"),
                prop(&context, "Population"),
                prop(&context, "Name"),
                prop(&context, "Population"),
            ],
        );
        let settings = ValidationSettings::new().with_max_order_by_node_count(2);
        let errors = OrderByQueryValidator.try_validate(&option, &settings).unwrap_err();
        // the same message is raised for clauses 3 and 4
        assert_eq!(errors.len(), 1);
        assert!(errors.to_string().contains("is 2."));
    }
}
