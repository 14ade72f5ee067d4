//! Per-option validators and the request-level orchestrator.

pub mod compute;
pub mod count;
pub mod filter;
pub mod order_by;
pub mod order_by_limits;
pub mod query;
pub mod select_expand;
pub mod skip;
pub mod skip_token;
pub mod top;

pub use compute::ComputeQueryValidator;
pub use count::CountQueryValidator;
pub use filter::{FilterQueryValidator, FilterValidator};
pub use order_by::{OrderByQueryValidator, OrderByTarget};
pub use order_by_limits::OrderByModelLimitationsValidator;
pub use query::ODataQueryValidator;
pub use select_expand::{
    SelectExpandQueryValidator, SelectExpandValidator, reconcile_levels_max_literal_expansion_depth,
};
pub use skip::SkipQueryValidator;
pub use skip_token::SkipTokenQueryValidator;
pub use top::TopQueryValidator;
