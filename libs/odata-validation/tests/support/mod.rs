#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]
//! Shared model for the integration tests:
//! `Customer` (with an `Address` complex value) owns `Orders`, each `Order`
//! owns `Lines`.

use std::sync::Arc;

use odata_validation::ast::SingleValueNode;
use odata_validation::edm::{EdmProperty, StructuredTypeBuilder};
use odata_validation::{EdmModel, ODataQueryContext, QueryRestrictions, QuerySettings};

pub const CUSTOMER: &str = "NS.Customer";
pub const ORDER: &str = "NS.Order";
pub const ORDER_LINE: &str = "NS.OrderLine";
pub const ADDRESS: &str = "NS.Address";

/// The fixture model with `customer_settings` attached to `Customer`.
#[must_use]
pub fn model_with(customer_settings: QuerySettings) -> Arc<EdmModel> {
    model_with_types(customer_settings, QuerySettings::new(), QuerySettings::new())
}

/// The fixture model with settings on `Customer`, `Order` and the `Address`
/// complex type.
#[must_use]
pub fn model_with_types(
    customer_settings: QuerySettings,
    order_settings: QuerySettings,
    address_settings: QuerySettings,
) -> Arc<EdmModel> {
    let secret = QueryRestrictions {
        not_filterable: true,
        not_sortable: true,
        ..QueryRestrictions::default()
    };
    let model = EdmModel::builder()
        .with_type(
            StructuredTypeBuilder::entity(CUSTOMER)
                .property("Id", "Edm.Int32")
                .property("Name", "Edm.String")
                .property("Age", "Edm.Int32")
                .property("City", "Edm.String")
                .property("Secret", "Edm.String")
                .collection_property("Tags", "Edm.String")
                .complex_property("Address", ADDRESS)
                .collection_navigation("Orders", ORDER)
                .restrict("Secret", secret)
                .settings(customer_settings),
        )
        .with_type(
            StructuredTypeBuilder::entity(ORDER)
                .property("Id", "Edm.Int32")
                .property("Total", "Edm.Decimal")
                .navigation("Buyer", CUSTOMER)
                .collection_navigation("Lines", ORDER_LINE)
                .settings(order_settings),
        )
        .with_type(
            StructuredTypeBuilder::entity(ORDER_LINE)
                .property("Id", "Edm.Int32")
                .property("Sku", "Edm.String")
                .property("Quantity", "Edm.Int32")
                .navigation("Order", ORDER),
        )
        .with_type(
            StructuredTypeBuilder::complex(ADDRESS)
                .property("Street", "Edm.String")
                .property("City", "Edm.String")
                .settings(address_settings),
        )
        .build()
        .unwrap();
    Arc::new(model)
}

#[must_use]
pub fn model() -> Arc<EdmModel> {
    model_with(QuerySettings::new())
}

/// Query against the `Customers` entity set.
#[must_use]
pub fn customers(model: &Arc<EdmModel>) -> ODataQueryContext {
    let ty = Arc::clone(model.structured_type(CUSTOMER).unwrap());
    ODataQueryContext::new(Arc::clone(model), ty, "Customers")
}

#[must_use]
pub fn prop(model: &EdmModel, type_name: &str, name: &str) -> Arc<EdmProperty> {
    model.find_property(type_name, name).unwrap()
}

/// `Name` style access on `$it`.
#[must_use]
pub fn customer(model: &EdmModel, name: &str) -> SingleValueNode {
    SingleValueNode::property(prop(model, CUSTOMER, name))
}
