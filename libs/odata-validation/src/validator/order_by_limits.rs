use crate::ast::{BinaryOperatorKind, UnaryOperatorKind};
use crate::context::FilterValidatorContext;
use crate::edm::{EdmProperty, EdmStructuredType};
use crate::error::ValidationError;
use crate::settings::{AllowedArithmeticOperators, AllowedLogicalOperators};
use crate::validator::filter::FilterValidator;
use crate::violations::Violations;

/// Walks an `$orderby` expression for model limitations only: structural
/// properties must be sortable and navigation segments navigable.
///
/// The `$filter` allow-lists and `MaxNodeCount` do not apply here; clause
/// count is bounded by `MaxOrderByNodeCount` in the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderByModelLimitationsValidator;

impl FilterValidator for OrderByModelLimitationsValidator {
    fn validator_name(&self) -> &'static str {
        "OrderByModelLimitationsValidator"
    }

    fn count_node(
        &self,
        _ctx: &mut FilterValidatorContext<'_>,
        _violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        Ok(())
    }

    fn validate_logical_operator(
        &self,
        _operator: BinaryOperatorKind,
        _flag: AllowedLogicalOperators,
        _ctx: &mut FilterValidatorContext<'_>,
        _violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        Ok(())
    }

    fn validate_arithmetic_operator(
        &self,
        _operator: BinaryOperatorKind,
        _flag: AllowedArithmeticOperators,
        _ctx: &mut FilterValidatorContext<'_>,
        _violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        Ok(())
    }

    fn validate_unary_operator(
        &self,
        _operator: UnaryOperatorKind,
        _ctx: &mut FilterValidatorContext<'_>,
        _violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        Ok(())
    }

    fn validate_function(
        &self,
        _name: &str,
        _ctx: &mut FilterValidatorContext<'_>,
        _violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        Ok(())
    }

    fn check_property(
        &self,
        property: &EdmProperty,
        path_property: Option<&EdmProperty>,
        path_type: &EdmStructuredType,
        ctx: &FilterValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        if ctx.query.policy().is_not_sortable(property, path_property, path_type) {
            return violations.report(ValidationError::NotSortableProperty(property.name().to_owned()));
        }
        Ok(())
    }

    fn check_navigation(
        &self,
        property: &EdmProperty,
        _path_property: Option<&EdmProperty>,
        _path_type: &EdmStructuredType,
        ctx: &FilterValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        if ctx.query.policy().is_not_navigable(property) {
            return violations.report(ValidationError::NotNavigableProperty(property.name().to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::ast::{QueryNode, SingleValueNode};
    use crate::edm::{EdmModel, QueryRestrictions, StructuredTypeBuilder};
    use crate::query::ODataQueryContext;
    use crate::settings::{AllowedFunctions, ValidationSettings};
    use std::sync::Arc;

    fn context() -> ODataQueryContext {
        let model = EdmModel::builder()
            .with_type(
                StructuredTypeBuilder::entity("NS.Order")
                    .property("Total", "Edm.Decimal")
                    .property("Note", "Edm.String")
                    .navigation("Buyer", "NS.Buyer")
                    .restrict("Note", QueryRestrictions::not_sortable())
                    .restrict("Buyer", QueryRestrictions::not_navigable()),
            )
            .with_type(StructuredTypeBuilder::entity("NS.Buyer").property("Name", "Edm.String"))
            .build()
            .unwrap();
        let ty = Arc::clone(model.structured_type("NS.Order").unwrap());
        ODataQueryContext::new(Arc::new(model), ty, "Orders")
    }

    fn check(context: &ODataQueryContext, expression: &SingleValueNode) -> Result<(), ValidationError> {
        Violations::run_fail_fast(|v| {
            OrderByModelLimitationsValidator.validate_expression(
                expression,
                context,
                &ValidationSettings::default(),
                v,
            )
        })
    }

    #[test]
    fn test_sortable_property_passes() {
        let context = context();
        let total = context.model().find_property("NS.Order", "Total").unwrap();
        assert!(check(&context, &SingleValueNode::property(total)).is_ok());
    }

    #[test]
    fn test_not_sortable_property() {
        let context = context();
        let note = context.model().find_property("NS.Order", "Note").unwrap();
        assert_eq!(
            check(&context, &SingleValueNode::property(note)).unwrap_err(),
            ValidationError::NotSortableProperty("Note".to_owned())
        );
    }

    #[test]
    fn test_filter_allow_lists_do_not_apply() {
        let context = context();
        let total = context.model().find_property("NS.Order", "Total").unwrap();
        let expression = SingleValueNode::call(
            "round",
            vec![QueryNode::from(SingleValueNode::binary(
                BinaryOperatorKind::Multiply,
                SingleValueNode::property(total),
                SingleValueNode::constant("2"),
            ))],
        );
        let settings = ValidationSettings::new()
            .with_allowed_functions(AllowedFunctions::NONE)
            .with_allowed_arithmetic_operators(AllowedArithmeticOperators::NONE)
            .with_max_node_count(1);
        let result = Violations::run_fail_fast(|v| {
            OrderByModelLimitationsValidator.validate_expression(&expression, &context, &settings, v)
        });
        assert!(result.is_ok());
    }

    #[test]
    fn test_not_navigable_segment() {
        let context = context();
        let model = context.model();
        let buyer = model.find_property("NS.Order", "Buyer").unwrap();
        let name = model.find_property("NS.Buyer", "Name").unwrap();
        let expression = SingleValueNode::property_of(SingleValueNode::property(buyer), name);
        assert_eq!(
            check(&context, &expression).unwrap_err(),
            ValidationError::NotNavigableProperty("Buyer".to_owned())
        );
    }
}
