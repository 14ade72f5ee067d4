//! Per-walk validator state.
//!
//! The scope of a walk (settings, query context, current property and type)
//! is immutable and shared by reference; descending into a nested scope
//! builds a new context value, so sibling branches never observe each
//! other's depth state. Counters that must span the whole walk (node count,
//! order-by clause count) live in the walk's own context and are passed by
//! `&mut`.

use std::sync::Arc;

use crate::edm::{EdmModel, EdmProperty, EdmStructuredType};
use crate::error::ValidationError;
use crate::policy::PropertyPolicy;
use crate::query::ODataQueryContext;
use crate::settings::ValidationSettings;
use crate::violations::Violations;

/// Nesting depth at which a walk gives up instead of recursing further.
pub const MAX_RECURSION_DEPTH: usize = 256;

/// Scope a property access is resolved in: the property it was reached
/// through and the type that property sits on.
pub type PropertyScope = (Option<Arc<EdmProperty>>, Arc<EdmStructuredType>);

#[derive(Clone, Debug)]
pub struct QueryValidatorContext<'a> {
    pub settings: &'a ValidationSettings,
    pub query: &'a ODataQueryContext,
    /// Property the current position was reached through, if any.
    pub property: Option<Arc<EdmProperty>>,
    pub structured_type: Arc<EdmStructuredType>,
    /// Absolute depth from the root of the query.
    pub current_depth: usize,
}

impl<'a> QueryValidatorContext<'a> {
    #[must_use]
    pub fn new(query: &'a ODataQueryContext, settings: &'a ValidationSettings) -> Self {
        Self {
            settings,
            query,
            property: query.target_property().cloned(),
            structured_type: Arc::clone(query.element_type()),
            current_depth: 0,
        }
    }

    #[must_use]
    pub fn model(&self) -> &'a EdmModel {
        self.query.model()
    }

    #[must_use]
    pub fn policy(&self) -> PropertyPolicy<'a> {
        self.query.policy()
    }

    #[must_use]
    pub fn path_property(&self) -> Option<&EdmProperty> {
        self.property.as_deref()
    }
}

/// State of one `$filter` walk.
#[derive(Debug)]
pub struct FilterValidatorContext<'a> {
    pub query: QueryValidatorContext<'a>,
    node_count: usize,
    any_all_depth: usize,
    nesting: usize,
    /// Lambda range variables in scope, innermost last.
    range_variables: Vec<(String, PropertyScope)>,
}

impl<'a> FilterValidatorContext<'a> {
    #[must_use]
    pub fn new(query: QueryValidatorContext<'a>) -> Self {
        Self {
            query,
            node_count: 0,
            any_all_depth: 0,
            nesting: 0,
            range_variables: Vec::new(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &'a ValidationSettings {
        self.query.settings
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    #[must_use]
    pub fn any_all_depth(&self) -> usize {
        self.any_all_depth
    }

    /// Count one node against `max_node_count`.
    ///
    /// # Errors
    /// Propagates the sink's verdict on a limit violation.
    pub fn count_node(&mut self, violations: &mut Violations) -> Result<(), ValidationError> {
        let max = self.query.settings.max_node_count;
        if max > 0 && self.node_count >= max {
            return violations.report(ValidationError::MaxNodeLimitExceeded {
                limit: max,
                setting: "MaxNodeCount",
            });
        }
        self.node_count += 1;
        Ok(())
    }

    /// Enter an any/all lambda. Always paired with [`Self::exit_lambda`].
    ///
    /// # Errors
    /// Propagates the sink's verdict on a nesting violation.
    pub fn enter_lambda(&mut self, violations: &mut Violations) -> Result<(), ValidationError> {
        let max = self.query.settings.max_any_all_expression_depth;
        let outcome = if max > 0 && self.any_all_depth >= max {
            violations.report(ValidationError::MaxAnyAllExpressionLimitExceeded {
                limit: max,
                setting: "MaxAnyAllExpressionDepth",
            })
        } else {
            Ok(())
        };
        if outcome.is_ok() {
            self.any_all_depth += 1;
        }
        outcome
    }

    pub fn exit_lambda(&mut self) {
        self.any_all_depth = self.any_all_depth.saturating_sub(1);
    }

    /// Bind `name` to the element scope of a lambda source. Always paired
    /// with [`Self::unbind_range_variable`].
    pub fn bind_range_variable(&mut self, name: &str, scope: PropertyScope) {
        self.range_variables.push((name.to_owned(), scope));
    }

    pub fn unbind_range_variable(&mut self) {
        self.range_variables.pop();
    }

    /// Scope bound to `name` by the innermost enclosing lambda.
    #[must_use]
    pub fn range_variable_scope(&self, name: &str) -> Option<&PropertyScope> {
        self.range_variables
            .iter()
            .rev()
            .find_map(|(bound, scope)| (bound == name).then_some(scope))
    }

    /// Guard one level of recursion. Always paired with [`Self::ascend`].
    ///
    /// # Errors
    /// Returns `RecursionLimitExceeded` past [`MAX_RECURSION_DEPTH`].
    pub fn descend(&mut self, violations: &mut Violations) -> Result<(), ValidationError> {
        if self.nesting >= MAX_RECURSION_DEPTH {
            return violations.report(ValidationError::RecursionLimitExceeded {
                limit: MAX_RECURSION_DEPTH,
            });
        }
        self.nesting += 1;
        Ok(())
    }

    pub fn ascend(&mut self) {
        self.nesting = self.nesting.saturating_sub(1);
    }
}

/// State of one `$orderby` walk.
#[derive(Debug)]
pub struct OrderByValidatorContext<'a> {
    pub query: QueryValidatorContext<'a>,
    order_by_node_count: usize,
}

impl<'a> OrderByValidatorContext<'a> {
    #[must_use]
    pub fn new(query: QueryValidatorContext<'a>) -> Self {
        Self {
            query,
            order_by_node_count: 0,
        }
    }

    #[must_use]
    pub fn order_by_node_count(&self) -> usize {
        self.order_by_node_count
    }

    /// Count one clause against `max_order_by_node_count`.
    ///
    /// # Errors
    /// Propagates the sink's verdict on a limit violation.
    pub fn count_clause(&mut self, violations: &mut Violations) -> Result<(), ValidationError> {
        self.order_by_node_count += 1;
        let max = self.query.settings.max_order_by_node_count;
        if max > 0 && self.order_by_node_count > max {
            return violations.report(ValidationError::OrderByNodeCountExceeded { limit: max });
        }
        Ok(())
    }
}

/// Position inside a `$select` / `$expand` tree.
///
/// Passed by value: each branch owns its copy of `current_depth` and
/// `remaining_depth`.
#[derive(Clone, Debug)]
pub struct SelectExpandValidatorContext<'a> {
    pub query: QueryValidatorContext<'a>,
    /// Expansion budget left on this branch; `None` until a per-property
    /// `ExpandConfiguration` bounds it.
    pub remaining_depth: Option<usize>,
}

impl<'a> SelectExpandValidatorContext<'a> {
    #[must_use]
    pub fn new(query: QueryValidatorContext<'a>) -> Self {
        Self {
            query,
            remaining_depth: None,
        }
    }

    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.query.current_depth
    }

    /// Context one level below, positioned on `property` / `structured_type`.
    ///
    /// # Errors
    /// Returns `RecursionLimitExceeded` past [`MAX_RECURSION_DEPTH`].
    pub fn descend(
        &self,
        property: Arc<EdmProperty>,
        structured_type: Arc<EdmStructuredType>,
        remaining_depth: Option<usize>,
        violations: &mut Violations,
    ) -> Result<Self, ValidationError> {
        let current_depth = self.query.current_depth + 1;
        if current_depth > MAX_RECURSION_DEPTH {
            violations.report(ValidationError::RecursionLimitExceeded {
                limit: MAX_RECURSION_DEPTH,
            })?;
        }
        Ok(Self {
            query: QueryValidatorContext {
                settings: self.query.settings,
                query: self.query.query,
                property: Some(property),
                structured_type,
                current_depth,
            },
            remaining_depth,
        })
    }
}
