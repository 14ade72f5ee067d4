#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use odata_validation::ast::{
    BinaryOperatorKind, OrderByClause, OrderByDirection, QueryNode, SingleValueNode,
    UnaryOperatorKind,
};
use odata_validation::query::OrderByQueryOption;
use odata_validation::{
    AllowedArithmeticOperators, AllowedFunctions, AllowedLogicalOperators, ODataQueryContext, OrderByQueryValidator,
    QuerySettings, ValidationError, ValidationSettings,
};
use support::{ADDRESS, customer, customers, model, model_with, model_with_types, prop};

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

#[test]
fn test_clause_count_limit_names_setting() {
    let model = model();
    let context = customers(&model);
    let option = option(
        &context,
        vec![
            customer(&model, "Name"),
            customer(&model, "Id"),
            customer(&model, "City"),
        ],
    );
    let settings = ValidationSettings::new().with_max_order_by_node_count(2);

    let err = OrderByQueryValidator.validate(&option, &settings).unwrap_err();
    assert_eq!(err, ValidationError::OrderByNodeCountExceeded { limit: 2 });
    assert!(err.to_string().contains("MaxOrderByNodeCount"));

    let errors = OrderByQueryValidator.try_validate(&option, &settings).unwrap_err();
    assert!(errors.to_string().contains("MaxOrderByNodeCount"));
}

#[test]
fn test_explicit_list_rejects_unlisted_property() {
    let model = model();
    let context = customers(&model);
    let option = option(&context, vec![customer(&model, "Name"), customer(&model, "Id")]);
    let settings = ValidationSettings::new()
        .with_max_order_by_node_count(0)
        .with_allowed_order_by_properties(["Name"]);

    let err = OrderByQueryValidator.validate(&option, &settings).unwrap_err();
    assert_eq!(
        err,
        ValidationError::NotAllowedOrderByProperty {
            property: "Id".to_owned(),
            setting: "AllowedOrderByProperties",
        }
    );
}

#[test]
fn test_restricted_property_is_not_sortable() {
    let model = model();
    let context = customers(&model);
    let option = option(&context, vec![customer(&model, "Secret")]);
    let err = OrderByQueryValidator
        .validate(&option, &ValidationSettings::default())
        .unwrap_err();
    assert_eq!(err, ValidationError::NotSortableProperty("Secret".to_owned()));
}

#[test]
fn test_model_bound_order_by_configuration() {
    let model = model_with(
        QuerySettings::new()
            .with_default_order_by(false)
            .with_order_by("Name", true),
    );
    let context = customers(&model);

    let by_name = option(&context, vec![customer(&model, "Name")]);
    assert!(
        OrderByQueryValidator
            .validate(&by_name, &ValidationSettings::default())
            .is_ok()
    );

    let by_age = option(&context, vec![customer(&model, "Age")]);
    let err = OrderByQueryValidator
        .validate(&by_age, &ValidationSettings::default())
        .unwrap_err();
    assert_eq!(err, ValidationError::NotSortableProperty("Age".to_owned()));
}

#[test]
fn test_complex_path_is_walked() {
    let model = model();
    let context = customers(&model);
    let city = SingleValueNode::property_of(
        customer(&model, "Address"),
        prop(&model, ADDRESS, "City"),
    );
    let option = option(&context, vec![city]);
    assert!(
        OrderByQueryValidator
            .validate(&option, &ValidationSettings::default())
            .is_ok()
    );
}

#[test]
fn test_filter_allow_lists_do_not_govern_order_by() {
    let model = model();
    let context = customers(&model);
    let length_of_name = SingleValueNode::call("length", vec![QueryNode::from(customer(&model, "Name"))]);
    let negated_age = SingleValueNode::unary(
        UnaryOperatorKind::Negate,
        SingleValueNode::binary(
            BinaryOperatorKind::Add,
            customer(&model, "Age"),
            SingleValueNode::constant("1"),
        ),
    );
    let option = option(&context, vec![length_of_name, negated_age]);
    let settings = ValidationSettings::new()
        .with_allowed_functions(AllowedFunctions::NONE)
        .with_allowed_logical_operators(AllowedLogicalOperators::NONE)
        .with_allowed_arithmetic_operators(AllowedArithmeticOperators::NONE)
        .with_max_node_count(1);

    assert!(OrderByQueryValidator.validate(&option, &settings).is_ok());
    assert!(OrderByQueryValidator.try_validate(&option, &settings).is_ok());
}

#[test]
fn test_sortability_still_applies_inside_functions() {
    let model = model();
    let context = customers(&model);
    let length_of_secret =
        SingleValueNode::call("length", vec![QueryNode::from(customer(&model, "Secret"))]);
    let err = OrderByQueryValidator
        .validate(&option(&context, vec![length_of_secret]), &ValidationSettings::default())
        .unwrap_err();
    assert_eq!(err, ValidationError::NotSortableProperty("Secret".to_owned()));
}

#[test]
fn test_complex_member_uses_complex_type_sortability() {
    let model = model_with_types(
        QuerySettings::new(),
        QuerySettings::new(),
        QuerySettings::new().with_default_order_by(false),
    );
    let context = customers(&model);
    let city = SingleValueNode::property_of(customer(&model, "Address"), prop(&model, ADDRESS, "City"));
    let err = OrderByQueryValidator
        .validate(&option(&context, vec![city]), &ValidationSettings::default())
        .unwrap_err();
    assert_eq!(err, ValidationError::NotSortableProperty("City".to_owned()));
}
