//! OData query option validation.
//!
//! Checks already-parsed query options (`$filter`, `$orderby`, `$select`,
//! `$expand`, `$top`, `$skip`, `$count`, `$skiptoken`, `$compute`, ...)
//! against caller-supplied [`ValidationSettings`] and the query policies
//! carried by an [`EdmModel`]. Every validator has two entry points sharing
//! one walk:
//! - `validate` stops at the first violation and returns a [`ValidationError`];
//! - `try_validate` keeps going and returns every distinct violation as
//!   [`ValidationErrors`].
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod ast;
pub mod config;
pub mod context;
pub mod edm;
pub mod error;
pub mod policy;
pub mod problem;
pub mod query;
pub mod settings;
pub mod validator;
pub mod violations;

pub use edm::{DefaultQuerySettings, EdmModel, ExpandConfiguration, QueryRestrictions, QuerySettings};
pub use error::{ValidationError, ValidationErrors};
pub use policy::PropertyPolicy;
pub use problem::{APPLICATION_PROBLEM_JSON, Problem};
pub use query::{ODataQueryContext, ODataQueryOptions};
pub use settings::{
    AllowedArithmeticOperators, AllowedFunctions, AllowedLogicalOperators, AllowedQueryOptions,
    ValidationSettings,
};
pub use validator::{
    FilterQueryValidator, FilterValidator, ODataQueryValidator, OrderByQueryValidator,
    SelectExpandQueryValidator, SelectExpandValidator,
};
pub use violations::Violations;
