//! `$filter` validation.
//!
//! [`FilterValidator`] walks a filter expression once, dispatching on the
//! node shape family first and on the node kind second. Each node kind has
//! its own provided method, so an implementor can replace the policy for a
//! single construct and inherit the rest. [`FilterQueryValidator`] is the
//! stock implementation.

use std::sync::Arc;

use crate::ast::{
    BinaryOperatorKind, CollectionNode, OperatorFlag, QueryNode, QueryNodeKind, SingleValueNode,
    UnaryOperatorKind,
};
use crate::context::{FilterValidatorContext, PropertyScope, QueryValidatorContext};
use crate::edm::{EdmProperty, EdmStructuredType};
use crate::error::{ValidationError, ValidationErrors};
use crate::query::{FilterQueryOption, ODataQueryContext};
use crate::settings::{
    AllowedArithmeticOperators, AllowedFunctions, AllowedLogicalOperators, ValidationSettings,
};
use crate::violations::Violations;

pub trait FilterValidator {
    /// Name reported when a node kind is not supported.
    fn validator_name(&self) -> &'static str {
        "FilterQueryValidator"
    }

    /// Validate `option`, stopping at the first violation.
    ///
    /// # Errors
    /// Returns the first violation in document order.
    fn validate(
        &self,
        option: &FilterQueryOption,
        settings: &ValidationSettings,
    ) -> Result<(), ValidationError> {
        tracing::trace!(option = "$filter", raw = %option.raw, "validating query option");
        Violations::run_fail_fast(|v| {
            self.validate_expression(&option.clause.expression, &option.context, settings, v)
        })
    }

    /// Validate `option`, collecting every violation.
    ///
    /// # Errors
    /// Returns the ordered, de-duplicated violations.
    fn try_validate(
        &self,
        option: &FilterQueryOption,
        settings: &ValidationSettings,
    ) -> Result<(), ValidationErrors> {
        tracing::trace!(option = "$filter", raw = %option.raw, "validating query option");
        Violations::run_collect(|v| {
            self.validate_expression(&option.clause.expression, &option.context, settings, v)
        })
    }

    /// Walk one expression rooted at `query` with a fresh context.
    ///
    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_expression(
        &self,
        expression: &SingleValueNode,
        query: &ODataQueryContext,
        settings: &ValidationSettings,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        let mut ctx = FilterValidatorContext::new(QueryValidatorContext::new(query, settings));
        self.validate_single_value_node(expression, &mut ctx, violations)
    }

    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_query_node(
        &self,
        node: &QueryNode,
        ctx: &mut FilterValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        match node {
            QueryNode::Single(node) => self.validate_single_value_node(node, ctx, violations),
            QueryNode::Collection(node) => self.validate_collection_node(node, ctx, violations),
        }
    }

    /// Count the node, guard the recursion, then dispatch on its kind.
    ///
    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_single_value_node(
        &self,
        node: &SingleValueNode,
        ctx: &mut FilterValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        self.count_node(ctx, violations)?;
        ctx.descend(violations)?;
        let result = self.dispatch_single_value_node(node, ctx, violations);
        ctx.ascend();
        result
    }

    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_collection_node(
        &self,
        node: &CollectionNode,
        ctx: &mut FilterValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        self.count_node(ctx, violations)?;
        ctx.descend(violations)?;
        let result = self.dispatch_collection_node(node, ctx, violations);
        ctx.ascend();
        result
    }

    /// Count one node against `MaxNodeCount`.
    ///
    /// # Errors
    /// Propagates the sink's verdict.
    fn count_node(
        &self,
        ctx: &mut FilterValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        ctx.count_node(violations)
    }

    /// # Errors
    /// Propagates the sink's verdicts.
    fn dispatch_single_value_node(
        &self,
        node: &SingleValueNode,
        ctx: &mut FilterValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        match node {
            SingleValueNode::BinaryOperator {
                operator,
                left,
                right,
            } => self.validate_binary_operator_node(*operator, left, right, ctx, violations),
            SingleValueNode::UnaryOperator { operator, operand } => {
                self.validate_unary_operator_node(*operator, operand, ctx, violations)
            }
            SingleValueNode::Constant(_)
            | SingleValueNode::ResourceRangeVariableReference(_)
            | SingleValueNode::NonResourceRangeVariableReference(_)
            | SingleValueNode::ParameterAlias(_)
            | SingleValueNode::SearchTerm(_) => Ok(()),
            SingleValueNode::Convert { source, .. } => {
                self.validate_single_value_node(source, ctx, violations)
            }
            SingleValueNode::SingleValuePropertyAccess { source, property }
            | SingleValueNode::SingleComplex { source, property } => {
                self.validate_property_access(property, source, ctx, violations)
            }
            SingleValueNode::SingleNavigation { source, property } => {
                self.validate_navigation_access(property, source, ctx, violations)
            }
            SingleValueNode::SingleValueFunctionCall { name, arguments }
            | SingleValueNode::SingleResourceFunctionCall { name, arguments } => {
                self.validate_function_call(name, arguments, ctx, violations)
            }
            SingleValueNode::Any {
                range_variable,
                source,
                body,
            } => self.validate_lambda("any", range_variable, source, body, ctx, violations),
            SingleValueNode::All {
                range_variable,
                source,
                body,
            } => self.validate_lambda("all", range_variable, source, body, ctx, violations),
            SingleValueNode::Count {
                source,
                filter,
                search,
            } => {
                self.validate_collection_node(source, ctx, violations)?;
                if let Some(filter) = filter {
                    self.validate_single_value_node(filter, ctx, violations)?;
                }
                if let Some(search) = search {
                    self.validate_single_value_node(search, ctx, violations)?;
                }
                Ok(())
            }
            SingleValueNode::In { left, right } => {
                self.validate_single_value_node(left, ctx, violations)?;
                self.validate_collection_node(right, ctx, violations)
            }
            SingleValueNode::NamedFunctionParameter { value, .. } => {
                self.validate_query_node(value, ctx, violations)
            }
            SingleValueNode::SingleValueOpenPropertyAccess { .. } => {
                self.unsupported(node.kind(), violations)
            }
        }
    }

    /// # Errors
    /// Propagates the sink's verdicts.
    fn dispatch_collection_node(
        &self,
        node: &CollectionNode,
        ctx: &mut FilterValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        match node {
            CollectionNode::CollectionPropertyAccess { source, property }
            | CollectionNode::CollectionComplex { source, property } => {
                self.validate_property_access(property, source, ctx, violations)
            }
            CollectionNode::CollectionNavigation { source, property } => {
                self.validate_navigation_access(property, source, ctx, violations)
            }
            CollectionNode::CollectionConstant(_) => Ok(()),
            CollectionNode::CollectionFunctionCall { .. }
            | CollectionNode::CollectionOpenPropertyAccess { .. } => {
                self.unsupported(node.kind(), violations)
            }
        }
    }

    /// Hard failure for a node kind outside the dispatch table.
    ///
    /// # Errors
    /// Always returns `ValidationError::Unsupported`.
    fn unsupported(&self, kind: QueryNodeKind, violations: &mut Violations) -> Result<(), ValidationError> {
        violations.report(ValidationError::Unsupported {
            kind: kind.to_string(),
            validator: self.validator_name(),
        })
    }

    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_binary_operator_node(
        &self,
        operator: BinaryOperatorKind,
        left: &SingleValueNode,
        right: &SingleValueNode,
        ctx: &mut FilterValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        match operator.flag() {
            OperatorFlag::Logical(flag) => self.validate_logical_operator(operator, flag, ctx, violations)?,
            OperatorFlag::Arithmetic(flag) => {
                self.validate_arithmetic_operator(operator, flag, ctx, violations)?;
            }
        }
        self.validate_single_value_node(left, ctx, violations)?;
        self.validate_single_value_node(right, ctx, violations)
    }

    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_logical_operator(
        &self,
        operator: BinaryOperatorKind,
        flag: AllowedLogicalOperators,
        ctx: &mut FilterValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        if ctx.settings().allowed_logical_operators.contains(flag) {
            return Ok(());
        }
        violations.report(ValidationError::NotAllowedLogicalOperator {
            operator: operator.name(),
            setting: "AllowedLogicalOperators",
        })
    }

    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_arithmetic_operator(
        &self,
        operator: BinaryOperatorKind,
        flag: AllowedArithmeticOperators,
        ctx: &mut FilterValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        if ctx.settings().allowed_arithmetic_operators.contains(flag) {
            return Ok(());
        }
        violations.report(ValidationError::NotAllowedArithmeticOperator {
            operator: operator.name(),
            setting: "AllowedArithmeticOperators",
        })
    }

    /// `not` and unary minus are both governed by the logical `Not` flag.
    ///
    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_unary_operator(
        &self,
        operator: UnaryOperatorKind,
        ctx: &mut FilterValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        if ctx.settings().allowed_logical_operators.contains(AllowedLogicalOperators::NOT) {
            return Ok(());
        }
        violations.report(ValidationError::NotAllowedLogicalOperator {
            operator: operator.name(),
            setting: "AllowedLogicalOperators",
        })
    }

    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_unary_operator_node(
        &self,
        operator: UnaryOperatorKind,
        operand: &SingleValueNode,
        ctx: &mut FilterValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        self.validate_unary_operator(operator, ctx, violations)?;
        self.validate_single_value_node(operand, ctx, violations)
    }

    /// Check `name` against `AllowedFunctions`. Names outside the canonical
    /// table are custom functions and pass.
    ///
    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_function(
        &self,
        name: &str,
        ctx: &mut FilterValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        match AllowedFunctions::for_function_name(name) {
            Some(flag) if !ctx.settings().allowed_functions.contains(flag) => {
                violations.report(ValidationError::NotAllowedFunction {
                    function: name.to_owned(),
                    setting: "AllowedFunctions",
                })
            }
            _ => Ok(()),
        }
    }

    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_function_call(
        &self,
        name: &str,
        arguments: &[QueryNode],
        ctx: &mut FilterValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        self.validate_function(name, ctx, violations)?;
        for argument in arguments {
            self.validate_query_node(argument, ctx, violations)?;
        }
        Ok(())
    }

    /// Any/all: the function flag, then one level of lambda nesting around
    /// the source and the body. The body sees `range_variable` bound to the
    /// element scope of `source`. A constant body is not walked.
    ///
    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_lambda(
        &self,
        function: &str,
        range_variable: &str,
        source: &CollectionNode,
        body: &SingleValueNode,
        ctx: &mut FilterValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        self.validate_function(function, ctx, violations)?;
        ctx.enter_lambda(violations)?;
        let result = self
            .validate_collection_node(source, ctx, violations)
            .and_then(|()| self.validate_lambda_body(range_variable, source, body, ctx, violations));
        ctx.exit_lambda();
        result
    }

    /// Walk `body` with `range_variable` bound; the source is resolved
    /// outside that binding.
    ///
    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_lambda_body(
        &self,
        range_variable: &str,
        source: &CollectionNode,
        body: &SingleValueNode,
        ctx: &mut FilterValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        if matches!(body, SingleValueNode::Constant(_)) {
            return Ok(());
        }
        let Some(scope) = self.lambda_scope(source, ctx) else {
            return self.validate_single_value_node(body, ctx, violations);
        };
        ctx.bind_range_variable(range_variable, scope);
        let result = self.validate_single_value_node(body, ctx, violations);
        ctx.unbind_range_variable();
        result
    }

    /// Element scope of a lambda source; `None` for primitive collections.
    fn lambda_scope(&self, source: &CollectionNode, ctx: &FilterValidatorContext<'_>) -> Option<PropertyScope> {
        match source {
            CollectionNode::CollectionNavigation { property, .. }
            | CollectionNode::CollectionComplex { property, .. } => ctx
                .query
                .model()
                .target_type(property)
                .map(|element| (Some(Arc::clone(property)), Arc::clone(element))),
            _ => None,
        }
    }

    /// Where a property reached through `source` is resolved.
    fn property_scope(&self, source: &SingleValueNode, ctx: &FilterValidatorContext<'_>) -> PropertyScope {
        let fallback = || (ctx.query.property.clone(), Arc::clone(&ctx.query.structured_type));
        match source {
            SingleValueNode::SingleNavigation { property, .. }
            | SingleValueNode::SingleComplex { property, .. } => ctx
                .query
                .model()
                .target_type(property)
                .map_or_else(fallback, |target| (Some(Arc::clone(property)), Arc::clone(target))),
            SingleValueNode::ResourceRangeVariableReference(name) => ctx
                .range_variable_scope(name)
                .cloned()
                .unwrap_or_else(fallback),
            _ => fallback(),
        }
    }

    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_property_access(
        &self,
        property: &Arc<EdmProperty>,
        source: &SingleValueNode,
        ctx: &mut FilterValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        let (path_property, path_type) = self.property_scope(source, ctx);
        self.check_property(property, path_property.as_deref(), &path_type, ctx, violations)?;
        self.validate_single_value_node(source, ctx, violations)
    }

    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_navigation_access(
        &self,
        property: &Arc<EdmProperty>,
        source: &SingleValueNode,
        ctx: &mut FilterValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        let (path_property, path_type) = self.property_scope(source, ctx);
        self.check_navigation(property, path_property.as_deref(), &path_type, ctx, violations)?;
        self.validate_single_value_node(source, ctx, violations)
    }

    /// Policy applied to a structural property access.
    ///
    /// # Errors
    /// Propagates the sink's verdicts.
    fn check_property(
        &self,
        property: &EdmProperty,
        path_property: Option<&EdmProperty>,
        path_type: &EdmStructuredType,
        ctx: &FilterValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        if ctx.query.policy().is_not_filterable(property, path_property, path_type) {
            return violations.report(ValidationError::NotFilterableProperty(property.name().to_owned()));
        }
        Ok(())
    }

    /// Policy applied to a navigation property access.
    ///
    /// # Errors
    /// Propagates the sink's verdicts.
    fn check_navigation(
        &self,
        property: &EdmProperty,
        path_property: Option<&EdmProperty>,
        path_type: &EdmStructuredType,
        ctx: &FilterValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        self.check_property(property, path_property, path_type, ctx, violations)
    }
}

/// Stock `$filter` validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterQueryValidator;

impl FilterValidator for FilterQueryValidator {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::ast::FilterClause;
    use crate::edm::{EdmModel, QueryRestrictions, StructuredTypeBuilder};

    fn context() -> ODataQueryContext {
        let model = EdmModel::builder()
            .with_type(
                StructuredTypeBuilder::entity("NS.Product")
                    .property("Name", "Edm.String")
                    .property("Price", "Edm.Decimal")
                    .property("Secret", "Edm.String")
                    .collection_property("Tags", "Edm.String")
                    .restrict("Secret", QueryRestrictions::not_filterable()),
            )
            .build()
            .unwrap();
        let ty = Arc::clone(model.structured_type("NS.Product").unwrap());
        ODataQueryContext::new(Arc::new(model), ty, "Products")
    }

    fn option(context: &ODataQueryContext, expression: SingleValueNode) -> FilterQueryOption {
        FilterQueryOption {
            raw: String::new(),
            clause: FilterClause::new(expression),
            context: context.clone(),
        }
    }

    fn prop(context: &ODataQueryContext, name: &str) -> SingleValueNode {
        SingleValueNode::property(context.model().find_property("NS.Product", name).unwrap())
    }

    #[test]
    fn test_arithmetic_operator_not_allowed() {
        let context = context();
        let expr = SingleValueNode::binary(
            BinaryOperatorKind::Add,
            prop(&context, "Price"),
            SingleValueNode::constant("1"),
        );
        let settings = ValidationSettings::new().with_allowed_arithmetic_operators(
            crate::settings::AllowedArithmeticOperators::ALL
                .difference(crate::settings::AllowedArithmeticOperators::ADD),
        );

        let err = FilterQueryValidator
            .validate(&option(&context, expr), &settings)
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::NotAllowedArithmeticOperator { operator: "Add", .. }
        ));
    }

    #[test]
    fn test_negate_is_governed_by_not_flag() {
        let context = context();
        let expr = SingleValueNode::unary(UnaryOperatorKind::Negate, prop(&context, "Price"));
        let settings = ValidationSettings::new().with_allowed_logical_operators(
            AllowedLogicalOperators::ALL.difference(AllowedLogicalOperators::NOT),
        );

        let err = FilterQueryValidator
            .validate(&option(&context, expr), &settings)
            .unwrap_err();
        assert!(err.to_string().contains("'Negate'"));
    }

    #[test]
    fn test_not_filterable_property() {
        let context = context();
        let expr = SingleValueNode::binary(
            BinaryOperatorKind::Equal,
            prop(&context, "Secret"),
            SingleValueNode::constant("'x'"),
        );
        let err = FilterQueryValidator
            .validate(&option(&context, expr), &ValidationSettings::default())
            .unwrap_err();
        assert_eq!(err, ValidationError::NotFilterableProperty("Secret".to_owned()));
    }

    #[test]
    fn test_custom_function_passes() {
        let context = context();
        let expr = SingleValueNode::call(
            "NS.Custom",
            vec![QueryNode::from(prop(&context, "Name"))],
        );
        let settings = ValidationSettings::new().with_allowed_functions(AllowedFunctions::NONE);
        assert!(FilterQueryValidator.validate(&option(&context, expr), &settings).is_ok());
    }

    #[test]
    fn test_in_walks_both_sides() {
        let context = context();
        let expr = SingleValueNode::In {
            left: Box::new(prop(&context, "Secret")),
            right: Box::new(CollectionNode::CollectionConstant(vec!["'a'".to_owned()])),
        };
        let errors = FilterQueryValidator
            .try_validate(&option(&context, expr), &ValidationSettings::default())
            .unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_count_segment_walks_nested_filter() {
        let context = context();
        let tags = context.model().find_property("NS.Product", "Tags").unwrap();
        let expr = SingleValueNode::binary(
            BinaryOperatorKind::GreaterThan,
            SingleValueNode::Count {
                source: Box::new(CollectionNode::property(tags)),
                filter: Some(Box::new(SingleValueNode::binary(
                    BinaryOperatorKind::Equal,
                    prop(&context, "Secret"),
                    SingleValueNode::constant("'a'"),
                ))),
                search: Some(Box::new(SingleValueNode::SearchTerm("blue".to_owned()))),
            },
            SingleValueNode::constant("1"),
        );
        let err = FilterQueryValidator
            .validate(&option(&context, expr), &ValidationSettings::default())
            .unwrap_err();
        assert_eq!(err, ValidationError::NotFilterableProperty("Secret".to_owned()));
    }

    #[test]
    fn test_open_property_is_unsupported() {
        let context = context();
        let expr = SingleValueNode::SingleValueOpenPropertyAccess {
            source: Box::new(SingleValueNode::it()),
            name: "Dynamic".to_owned(),
        };
        let err = FilterQueryValidator
            .validate(&option(&context, expr), &ValidationSettings::default())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "'SingleValueOpenPropertyAccess' is not supported by FilterQueryValidator."
        );
    }

    struct AllowEverythingButSecrets;

    impl FilterValidator for AllowEverythingButSecrets {
        fn validate_logical_operator(
            &self,
            _operator: BinaryOperatorKind,
            _flag: AllowedLogicalOperators,
            _ctx: &mut FilterValidatorContext<'_>,
            _violations: &mut Violations,
        ) -> Result<(), ValidationError> {
            Ok(())
        }
    }

    #[test]
    fn test_single_handler_can_be_overridden() {
        let context = context();
        let expr = SingleValueNode::binary(
            BinaryOperatorKind::And,
            SingleValueNode::constant("true"),
            SingleValueNode::binary(
                BinaryOperatorKind::Equal,
                prop(&context, "Secret"),
                SingleValueNode::constant("'x'"),
            ),
        );
        let settings =
            ValidationSettings::new().with_allowed_logical_operators(AllowedLogicalOperators::NONE);

        let errors = AllowEverythingButSecrets
            .try_validate(&option(&context, expr.clone()), &settings)
            .unwrap_err();
        assert_eq!(errors.messages(), vec![
            "The property 'Secret' cannot be used in the $filter query option.".to_owned()
        ]);

        let errors = FilterQueryValidator
            .try_validate(&option(&context, expr), &settings)
            .unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
