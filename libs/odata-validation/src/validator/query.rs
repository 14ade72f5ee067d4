use crate::error::{ValidationError, ValidationErrors};
use crate::query::ODataQueryOptions;
use crate::settings::{AllowedQueryOptions, ValidationSettings};
use crate::validator::compute::ComputeQueryValidator;
use crate::validator::count::CountQueryValidator;
use crate::validator::filter::{FilterQueryValidator, FilterValidator};
use crate::validator::order_by::OrderByQueryValidator;
use crate::validator::select_expand::{SelectExpandQueryValidator, SelectExpandValidator};
use crate::validator::skip::SkipQueryValidator;
use crate::validator::skip_token::SkipTokenQueryValidator;
use crate::validator::top::TopQueryValidator;
use crate::violations::Violations;

fn ensure_allowed(
    settings: &ValidationSettings,
    flag: AllowedQueryOptions,
    option: &'static str,
    violations: &mut Violations,
) -> Result<(), ValidationError> {
    if settings.allowed_query_options.contains(flag) {
        return Ok(());
    }
    violations.report(ValidationError::NotAllowedQueryOption {
        option,
        setting: "AllowedQueryOptions",
    })
}

fn ensure_not_blank(
    raw: &str,
    option: &'static str,
    violations: &mut Violations,
) -> Result<(), ValidationError> {
    if raw.trim().is_empty() {
        return violations.report(ValidationError::EmptyQueryOption { option });
    }
    Ok(())
}

/// Validates every option of a request in a fixed order: for each option
/// present, the `AllowedQueryOptions` flag first, then the option's own
/// validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ODataQueryValidator;

impl ODataQueryValidator {
    /// # Errors
    /// Returns the first violation across all options.
    pub fn validate(
        self,
        options: &ODataQueryOptions,
        settings: &ValidationSettings,
    ) -> Result<(), ValidationError> {
        tracing::trace!(
            target_name = options.context.target_name().unwrap_or_default(),
            "validating query options"
        );
        Violations::run_fail_fast(|v| self.validate_options(options, settings, v))
    }

    /// # Errors
    /// Returns every distinct violation across all options, in slot order.
    pub fn try_validate(
        self,
        options: &ODataQueryOptions,
        settings: &ValidationSettings,
    ) -> Result<(), ValidationErrors> {
        tracing::trace!(
            target_name = options.context.target_name().unwrap_or_default(),
            "validating query options"
        );
        Violations::run_collect(|v| self.validate_options(options, settings, v))
    }

    /// # Errors
    /// Propagates the sink's verdicts.
    pub fn validate_options(
        self,
        options: &ODataQueryOptions,
        settings: &ValidationSettings,
        violations: &mut Violations,
    ) -> Result<(), ValidationError> {
        validate_shaping(options, settings, violations)?;
        validate_predicates(options, settings, violations)?;
        validate_count(options, settings, violations)?;
        validate_projection(options, settings, violations)?;
        validate_raw_only(options, settings, violations)
    }
}

/// `$compute`, `$apply`, `$skip`, `$top`.
fn validate_shaping(
    options: &ODataQueryOptions,
    settings: &ValidationSettings,
    violations: &mut Violations,
) -> Result<(), ValidationError> {
    if let Some(compute) = &options.compute {
        ensure_allowed(settings, AllowedQueryOptions::COMPUTE, "Compute", violations)?;
        ComputeQueryValidator.validate_option(compute, violations)?;
    }
    if options.apply.is_some() {
        ensure_allowed(settings, AllowedQueryOptions::APPLY, "Apply", violations)?;
    }
    if let Some(skip) = &options.skip {
        ensure_allowed(settings, AllowedQueryOptions::SKIP, "Skip", violations)?;
        SkipQueryValidator.validate_value(skip.value, settings, violations)?;
    }
    if let Some(top) = &options.top {
        ensure_allowed(settings, AllowedQueryOptions::TOP, "Top", violations)?;
        TopQueryValidator.validate_value(top.value, &top.context, settings, violations)?;
    }
    Ok(())
}

/// `$orderby`, `$filter`, `$search`.
fn validate_predicates(
    options: &ODataQueryOptions,
    settings: &ValidationSettings,
    violations: &mut Violations,
) -> Result<(), ValidationError> {
    if let Some(order_by) = &options.order_by {
        ensure_allowed(settings, AllowedQueryOptions::ORDER_BY, "OrderBy", violations)?;
        OrderByQueryValidator.validate_clause(&order_by.clause, &order_by.context, settings, violations)?;
    }
    if let Some(filter) = &options.filter {
        ensure_allowed(settings, AllowedQueryOptions::FILTER, "Filter", violations)?;
        FilterQueryValidator.validate_expression(
            &filter.clause.expression,
            &filter.context,
            settings,
            violations,
        )?;
    }
    if options.search.is_some() {
        ensure_allowed(settings, AllowedQueryOptions::SEARCH, "Search", violations)?;
    }
    Ok(())
}

/// `$count=...` or a `/$count` path segment.
fn validate_count(
    options: &ODataQueryOptions,
    settings: &ValidationSettings,
    violations: &mut Violations,
) -> Result<(), ValidationError> {
    if options.count.is_none() && !options.is_count_request {
        return Ok(());
    }
    ensure_allowed(settings, AllowedQueryOptions::COUNT, "Count", violations)?;
    if let Some(count) = &options.count {
        CountQueryValidator.validate_value(count.value, &count.context, violations)?;
    }
    Ok(())
}

/// `$skiptoken`, raw `$expand` / `$select`, then the combined clause.
fn validate_projection(
    options: &ODataQueryOptions,
    settings: &ValidationSettings,
    violations: &mut Violations,
) -> Result<(), ValidationError> {
    if let Some(skip_token) = &options.skip_token {
        ensure_allowed(settings, AllowedQueryOptions::SKIP_TOKEN, "SkipToken", violations)?;
        SkipTokenQueryValidator.validate_context(&skip_token.context, violations)?;
    }
    if let Some(expand) = &options.raw.expand {
        ensure_allowed(settings, AllowedQueryOptions::EXPAND, "Expand", violations)?;
        ensure_not_blank(expand, "$expand", violations)?;
    }
    if let Some(select) = &options.raw.select {
        ensure_allowed(settings, AllowedQueryOptions::SELECT, "Select", violations)?;
        ensure_not_blank(select, "$select", violations)?;
    }
    if let Some(select_expand) = &options.select_expand {
        SelectExpandQueryValidator.validate_option(select_expand, settings, violations)?;
    }
    Ok(())
}

/// Options with no structure of their own.
fn validate_raw_only(
    options: &ODataQueryOptions,
    settings: &ValidationSettings,
    violations: &mut Violations,
) -> Result<(), ValidationError> {
    let raw = &options.raw;
    let slots = [
        (raw.format.is_some(), AllowedQueryOptions::FORMAT, "Format"),
        (raw.skip_token.is_some(), AllowedQueryOptions::SKIP_TOKEN, "SkipToken"),
        (raw.delta_token.is_some(), AllowedQueryOptions::DELTA_TOKEN, "DeltaToken"),
    ];
    for (present, flag, option) in slots {
        if present {
            ensure_allowed(settings, flag, option, violations)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::edm::{EdmModel, StructuredTypeBuilder};
    use crate::query::ODataQueryContext;
    use std::sync::Arc;

    fn options() -> ODataQueryOptions {
        let model = EdmModel::builder()
            .with_type(StructuredTypeBuilder::entity("NS.Item").property("Id", "Edm.Int32"))
            .build()
            .unwrap();
        let ty = Arc::clone(model.structured_type("NS.Item").unwrap());
        ODataQueryOptions::new(ODataQueryContext::new(Arc::new(model), ty, "Items"))
    }

    #[test]
    fn test_empty_request_passes() {
        assert!(
            ODataQueryValidator
                .validate(&options(), &ValidationSettings::default())
                .is_ok()
        );
    }

    #[test]
    fn test_disallowed_option_is_named() {
        let settings = ValidationSettings::new()
            .with_allowed_query_options(AllowedQueryOptions::ALL.difference(AllowedQueryOptions::TOP));
        let err = ODataQueryValidator
            .validate(&options().with_top(5), &settings)
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::NotAllowedQueryOption {
                option: "Top",
                setting: "AllowedQueryOptions",
            }
        );
    }

    #[test]
    fn test_blank_raw_expand() {
        let mut options = options();
        options.raw.expand = Some("  ".to_owned());
        let err = ODataQueryValidator
            .validate(&options, &ValidationSettings::default())
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptyQueryOption { option: "$expand" });
    }

    #[test]
    fn test_skip_token_reported_once_across_slots() {
        let settings = ValidationSettings::new().with_allowed_query_options(
            AllowedQueryOptions::ALL.difference(AllowedQueryOptions::SKIP_TOKEN),
        );
        let errors = ODataQueryValidator
            .try_validate(&options().with_skip_token("abc"), &settings)
            .unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_slot_order_is_preserved() {
        let settings = ValidationSettings::new().with_allowed_query_options(AllowedQueryOptions::NONE);
        let options = options().with_raw_format("json").with_top(1).with_skip(1);
        let errors = ODataQueryValidator.try_validate(&options, &settings).unwrap_err();
        let messages = errors.messages();
        assert_eq!(messages.len(), 3);
        assert!(messages[0].contains("'Skip'"));
        assert!(messages[1].contains("'Top'"));
        assert!(messages[2].contains("'Format'"));
    }
}
