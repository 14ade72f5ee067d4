//! `$select` / `$expand` validation.
//!
//! Two passes over the clause:
//! 1. a structural walk, item by item, checking selectability,
//!    expandability, navigability, per-branch expansion budgets and every
//!    query option nested in an item;
//! 2. when `MaxExpansionDepth > 0`, an iterative depth-first pass with an
//!    explicit stack that accounts for `$levels` arithmetic across the whole
//!    tree.
//!
//! The structural walk passes a [`SelectExpandValidatorContext`] by value to
//! each nested scope, so sibling branches never share depth state.

use std::sync::Arc;

use crate::ast::{
    ExpandedCountSelectItem, ExpandedNavigationSelectItem, ExpandedReferenceSelectItem,
    LevelsClause, NestedOptions, OrderByClause, PathSelectItem, SelectExpandClause, SelectItem,
};
use crate::context::{QueryValidatorContext, SelectExpandValidatorContext};
use crate::edm::{EdmProperty, ExpandConfiguration, SelectExpandType};
use crate::error::{ValidationError, ValidationErrors};
use crate::query::{ODataQueryContext, SelectExpandQueryOption};
use crate::settings::{AllowedQueryOptions, ValidationSettings};
use crate::validator::count::CountQueryValidator;
use crate::validator::filter::{FilterQueryValidator, FilterValidator};
use crate::validator::order_by::OrderByTarget;
use crate::validator::order_by_limits::OrderByModelLimitationsValidator;
use crate::validator::skip::SkipQueryValidator;
use crate::validator::top::TopQueryValidator;
use crate::violations::Violations;

const MAX_EXPANSION_DEPTH: &str = "MaxExpansionDepth";

/// Reconcile the `$levels=max` literal cap of an option with
/// `MaxExpansionDepth`.
///
/// An unset cap takes the global value. A cap above the global value is
/// rejected. A cap at or below it is kept as is.
///
/// # Errors
/// Returns `InvalidExpansionDepthValue` when `option_value` exceeds
/// `settings.max_expansion_depth`.
pub fn reconcile_levels_max_literal_expansion_depth(
    option_value: Option<usize>,
    settings: &ValidationSettings,
) -> Result<usize, ValidationError> {
    let max = settings.max_expansion_depth;
    match option_value {
        None => Ok(max),
        Some(value) if value > max => Err(ValidationError::InvalidExpansionDepthValue {
            name: "LevelsMaxLiteralExpansionDepth",
            setting: MAX_EXPANSION_DEPTH,
        }),
        Some(value) => Ok(value),
    }
}

fn depth_exceeded(limit: usize, setting: &'static str) -> ValidationError {
    ValidationError::MaxExpandDepthExceeded { limit, setting }
}

fn level_as_depth(level: u64) -> usize {
    usize::try_from(level).unwrap_or(usize::MAX)
}

pub trait SelectExpandValidator {
    /// Validator used for `$filter` nested in items.
    #[must_use]
    fn filter_validator(&self) -> &dyn FilterValidator {
        &FilterQueryValidator
    }

    /// # Errors
    /// Returns the first violation.
    fn validate(
        &self,
        option: &SelectExpandQueryOption,
        settings: &ValidationSettings,
    ) -> Result<(), ValidationError> {
        tracing::trace!(option = "$select/$expand", "validating query option");
        Violations::run_fail_fast(|v| self.validate_option(option, settings, v))
    }

    /// # Errors
    /// Returns every distinct violation.
    fn try_validate(
        &self,
        option: &SelectExpandQueryOption,
        settings: &ValidationSettings,
    ) -> Result<(), ValidationErrors> {
        tracing::trace!(option = "$select/$expand", "validating query option");
        Violations::run_collect(|v| self.validate_option(option, settings, v))
    }

    /// Structural walk, then the global depth pass.
    ///
    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_option(
        &self,
        option: &SelectExpandQueryOption,
        settings: &ValidationSettings,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        let ctx = SelectExpandValidatorContext::new(QueryValidatorContext::new(&option.context, settings));
        self.validate_select_expand_clause(&option.clause, &ctx, violations)?;

        if settings.max_expansion_depth > 0 {
            if let Err(err) =
                reconcile_levels_max_literal_expansion_depth(option.levels_max_literal_expansion_depth, settings)
            {
                violations.report(err)?;
            }
            self.validate_expansion_depth(&option.clause, settings.max_expansion_depth, violations)?;
        }
        Ok(())
    }

    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_select_expand_clause(
        &self,
        clause: &SelectExpandClause,
        ctx: &SelectExpandValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        for item in &clause.items {
            match item {
                SelectItem::Wildcard => self.validate_wildcard(ctx, violations)?,
                SelectItem::NamespaceWildcard(namespace) => {
                    self.validate_namespace_wildcard(namespace, ctx, violations)?;
                }
                SelectItem::Path(item) => self.validate_path_select_item(item, ctx, violations)?,
                SelectItem::ExpandedNavigation(item) => {
                    self.validate_expanded_navigation(item, ctx, violations)?;
                }
                SelectItem::ExpandedReference(item) => {
                    self.validate_expanded_reference(item, ctx, violations)?;
                }
                SelectItem::ExpandedCount(item) => self.validate_expanded_count(item, ctx, violations)?,
            }
        }
        Ok(())
    }

    /// Every structural property of the current type must be selectable.
    ///
    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_wildcard(
        &self,
        ctx: &SelectExpandValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        let query = &ctx.query;
        let policy = query.policy();
        for property in query.model().structural_properties(&query.structured_type) {
            if policy.is_not_selectable(&property, query.path_property(), &query.structured_type) {
                violations.report(ValidationError::NotSelectableProperty(property.name().to_owned()))?;
            }
        }
        Ok(())
    }

    /// No default policy for `NS.*`.
    ///
    /// # Errors
    /// Never fails by default.
    fn validate_namespace_wildcard(
        &self,
        _namespace: &str,
        _ctx: &SelectExpandValidatorContext<'_>,
        _violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        Ok(())
    }

    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_path_select_item(
        &self,
        item: &PathSelectItem,
        ctx: &SelectExpandValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        let Some(last) = item.path.last() else {
            return Ok(());
        };
        let query = &ctx.query;
        let model = query.model();
        let policy = query.policy();

        if last.is_navigation() {
            if policy.is_not_navigable(last) {
                violations.report(ValidationError::NotNavigableProperty(last.name().to_owned()))?;
            }
        } else {
            let (path_property, path_type) = match item.path.len().checked_sub(2).map(|i| &item.path[i]) {
                Some(previous) => (
                    Some(Arc::clone(previous)),
                    model
                        .target_type(previous)
                        .map_or_else(|| Arc::clone(&query.structured_type), Arc::clone),
                ),
                None => (query.property.clone(), Arc::clone(&query.structured_type)),
            };
            if policy.is_not_selectable(last, path_property.as_deref(), &path_type) {
                violations.report(ValidationError::NotSelectableProperty(last.name().to_owned()))?;
            }
        }

        let target = model
            .target_type(last)
            .map_or_else(|| Arc::clone(&query.structured_type), Arc::clone);
        let scoped = query.query.scoped(Arc::clone(&target), Arc::clone(last));
        self.validate_nested_options(&item.options, &scoped, query.settings, violations)?;

        if let Some(nested) = &item.select_and_expand {
            // selection moves one level down without spending expansion budget
            let child = ctx.descend(Arc::clone(last), target, ctx.remaining_depth, violations)?;
            self.validate_select_expand_clause(nested, &child, violations)?;
        }
        Ok(())
    }

    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_expanded_navigation(
        &self,
        item: &ExpandedNavigationSelectItem,
        ctx: &SelectExpandValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        let navigation = &item.navigation;
        let (configuration, scoped) = self.expand_scope(navigation, ctx);

        let remaining = self.validate_expansion_budget(item, configuration, ctx, violations)?;
        let expandable = self.check_expandable(navigation, configuration, ctx, violations)?;
        self.validate_nested_options(&item.options, &scoped, ctx.query.settings, violations)?;

        if let (Some(levels), Some(remaining)) = (item.levels, remaining) {
            self.validate_levels(levels, remaining, violations)?;
        }

        if !expandable {
            return Ok(());
        }
        if let Some(nested) = &item.select_and_expand {
            let child = ctx.descend(
                Arc::clone(navigation),
                Arc::clone(scoped.element_type()),
                remaining.map(|r| r.saturating_sub(1)),
                violations,
            )?;
            self.validate_select_expand_clause(nested, &child, violations)?;
        }
        Ok(())
    }

    /// Tighten the branch budget with the navigation's configured
    /// `MaxDepth`, then check both the branch budget and the global
    /// `MaxExpansionDepth` at the current absolute depth.
    ///
    /// Returns the budget in force for this item.
    ///
    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_expansion_budget(
        &self,
        item: &ExpandedNavigationSelectItem,
        configuration: Option<ExpandConfiguration>,
        ctx: &SelectExpandValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<Option<usize>, ValidationError> {
        let configured = configuration.map(|c| c.max_depth).filter(|depth| *depth > 0);
        let remaining = match (ctx.remaining_depth, configured) {
            (Some(inherited), Some(configured)) => Some(inherited.min(configured)),
            (inherited, configured) => inherited.or(configured),
        };

        if remaining == Some(0) {
            violations.report(depth_exceeded(ctx.current_depth(), MAX_EXPANSION_DEPTH))?;
        }

        let max = ctx.query.settings.max_expansion_depth;
        let literal_zero = item.levels.and_then(|l| l.literal_level()) == Some(0);
        if max > 0 && ctx.current_depth() >= max && !literal_zero {
            violations.report(depth_exceeded(max, MAX_EXPANSION_DEPTH))?;
        }
        Ok(remaining)
    }

    /// Legacy annotation first, then the model-bound expand configuration.
    /// Returns whether the navigation may be expanded.
    ///
    /// # Errors
    /// Propagates the sink's verdicts.
    fn check_expandable(
        &self,
        navigation: &EdmProperty,
        configuration: Option<ExpandConfiguration>,
        ctx: &SelectExpandValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<bool, ValidationError> {
        let policy = ctx.query.policy();
        let allowed = !policy.is_not_expandable(navigation)
            && configuration.map_or(policy.defaults().enable_expand, |c| {
                c.expand_type != SelectExpandType::Disabled
            });
        if !allowed {
            violations.report(ValidationError::NotExpandableProperty(navigation.name().to_owned()))?;
        }
        Ok(allowed)
    }

    /// `$levels=max` needs at least one level left below this item; a
    /// literal level must fit in the remaining budget.
    ///
    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_levels(
        &self,
        levels: LevelsClause,
        remaining: usize,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        let below = remaining.saturating_sub(1);
        let exceeded = match levels.literal_level() {
            None => below == 0,
            Some(level) => level_as_depth(level) > remaining,
        };
        if exceeded {
            violations.report(depth_exceeded(remaining, "MaxDepth"))?;
        }
        Ok(())
    }

    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_expanded_reference(
        &self,
        item: &ExpandedReferenceSelectItem,
        ctx: &SelectExpandValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        let (configuration, scoped) = self.expand_scope(&item.navigation, ctx);
        self.check_expandable(&item.navigation, configuration, ctx, violations)?;
        self.validate_nested_options(&item.options, &scoped, ctx.query.settings, violations)
    }

    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_expanded_count(
        &self,
        item: &ExpandedCountSelectItem,
        ctx: &SelectExpandValidatorContext<'_>,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        let navigation = &item.navigation;
        let (configuration, scoped) = self.expand_scope(navigation, ctx);
        self.check_expandable(navigation, configuration, ctx, violations)?;

        let query = &ctx.query;
        if query
            .policy()
            .is_not_countable(navigation, query.path_property(), &query.structured_type)
        {
            violations.report(ValidationError::NotCountableProperty(navigation.name().to_owned()))?;
        }

        let options = NestedOptions {
            filter: item.filter.clone(),
            search: item.search.clone(),
            ..NestedOptions::default()
        };
        self.validate_nested_options(&options, &scoped, query.settings, violations)
    }

    /// Expand configuration of `navigation` and the query context rooted at its target.
    #[must_use]
    fn expand_scope(
        &self,
        navigation: &Arc<EdmProperty>,
        ctx: &SelectExpandValidatorContext<'_>,
    ) -> (Option<ExpandConfiguration>, ODataQueryContext) {
        let query = &ctx.query;
        let configuration =
            query
                .policy()
                .expand_configuration(navigation, query.path_property(), &query.structured_type);
        let target = query
            .model()
            .target_type(navigation)
            .map_or_else(|| Arc::clone(&query.structured_type), Arc::clone);
        (configuration, query.query.scoped(target, Arc::clone(navigation)))
    }

    /// Options nested in an item, validated against a context rooted at the
    /// item's property.
    ///
    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_nested_options(
        &self,
        options: &NestedOptions,
        scoped: &ODataQueryContext,
        settings: &ValidationSettings,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        if let Some(filter) = &options.filter {
            self.filter_validator()
                .validate_expression(&filter.expression, scoped, settings, violations)?;
        }
        if let Some(order_by) = &options.order_by {
            self.validate_nested_order_by(order_by, scoped, settings, violations)?;
        }
        if let Some(top) = options.top {
            TopQueryValidator.validate_value(top, scoped, settings, violations)?;
        }
        if let Some(skip) = options.skip {
            SkipQueryValidator.validate_value(skip, settings, violations)?;
        }
        if let Some(count) = options.count {
            CountQueryValidator.validate_value(count, scoped, violations)?;
        }

        let unstructured = [
            (options.search.is_some(), AllowedQueryOptions::SEARCH, "Search"),
            (options.compute.is_some(), AllowedQueryOptions::COMPUTE, "Compute"),
            (options.apply.is_some(), AllowedQueryOptions::APPLY, "Apply"),
        ];
        for (present, flag, option) in unstructured {
            if present && !settings.allowed_query_options.contains(flag) {
                violations.report(ValidationError::NotAllowedQueryOption {
                    option,
                    setting: "AllowedQueryOptions",
                })?;
            }
        }
        Ok(())
    }

    /// Nested `$orderby` follows the model's sortability rules only.
    ///
    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_nested_order_by(
        &self,
        order_by: &OrderByClause,
        scoped: &ODataQueryContext,
        settings: &ValidationSettings,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        for clause in order_by.iter() {
            if matches!(OrderByTarget::of(&clause.expression), OrderByTarget::OpenProperty(_)) {
                continue;
            }
            OrderByModelLimitationsValidator.validate_expression(
                &clause.expression,
                scoped,
                settings,
                violations,
            )?;
        }
        Ok(())
    }

    /// Depth pass over expanded navigations using an explicit stack.
    ///
    /// At depth `d` an item fails when `d` has reached `max` (unless it
    /// carries `$levels=0`) or when its literal `$levels` exceeds `max - d`.
    /// Children of an item with `$levels=n` start at `d + n`; children of
    /// `$levels=max` start at `max`.
    ///
    /// # Errors
    /// Propagates the sink's verdicts.
    fn validate_expansion_depth(
        &self,
        clause: &SelectExpandClause,
        max: usize,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        let mut stack: Vec<(usize, &SelectExpandClause)> = vec![(0, clause)];

        while let Some((depth, clause)) = stack.pop() {
            for item in clause.expanded_navigations() {
                let literal = item.levels.and_then(|l| l.literal_level()).map(level_as_depth);
                let exceeded = if depth >= max {
                    literal != Some(0)
                } else {
                    literal.is_some_and(|level| level > max - depth)
                };
                if exceeded {
                    violations.report(depth_exceeded(max, MAX_EXPANSION_DEPTH))?;
                    continue;
                }

                if let Some(nested) = &item.select_and_expand {
                    let child_depth = match (item.levels, literal) {
                        (Some(levels), _) if levels.is_max_level => max,
                        (_, Some(level)) => depth.saturating_add(level.max(1)),
                        (_, None) => depth + 1,
                    };
                    stack.push((child_depth, nested));
                }
            }
        }
        Ok(())
    }
}

/// Stock `$select` / `$expand` validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectExpandQueryValidator;

impl SelectExpandValidator for SelectExpandQueryValidator {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_unset_takes_global() {
        let settings = ValidationSettings::new().with_max_expansion_depth(4);
        assert_eq!(reconcile_levels_max_literal_expansion_depth(None, &settings), Ok(4));
    }

    #[test]
    fn test_reconcile_smaller_value_is_kept() {
        let settings = ValidationSettings::new().with_max_expansion_depth(4);
        assert_eq!(reconcile_levels_max_literal_expansion_depth(Some(2), &settings), Ok(2));
        assert_eq!(reconcile_levels_max_literal_expansion_depth(Some(4), &settings), Ok(4));
    }

    #[test]
    fn test_reconcile_larger_value_is_rejected() {
        let settings = ValidationSettings::new().with_max_expansion_depth(4);
        let err = reconcile_levels_max_literal_expansion_depth(Some(5), &settings).unwrap_err();
        assert_eq!(
            err.to_string(),
            "'LevelsMaxLiteralExpansionDepth' should be less than or equal to 'MaxExpansionDepth'."
        );
    }

    #[test]
    fn test_level_conversion_saturates() {
        assert_eq!(level_as_depth(3), 3);
        assert_eq!(level_as_depth(u64::MAX), usize::try_from(u64::MAX).unwrap_or(usize::MAX));
    }
}
