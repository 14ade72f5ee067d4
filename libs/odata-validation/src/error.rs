use std::fmt;

/// A single validation failure.
///
/// Every policy variant names the offending construct together with the
/// setting that governs it, so the rendered message can be returned to API
/// clients as is.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("'{0}' is required but was not provided.")]
    ArgumentNull(&'static str),

    #[error(
        "The node count limit of '{limit}' has been exceeded. To increase the limit, set the '{setting}' validation setting."
    )]
    MaxNodeLimitExceeded { limit: usize, setting: &'static str },

    #[error(
        "The Any/All nesting limit of '{limit}' has been exceeded. '{setting}' can be configured in the validation settings."
    )]
    MaxAnyAllExpressionLimitExceeded { limit: usize, setting: &'static str },

    #[error(
        "Logical operator '{operator}' is not allowed. To allow it, set the '{setting}' validation setting."
    )]
    NotAllowedLogicalOperator {
        operator: &'static str,
        setting: &'static str,
    },

    #[error(
        "Arithmetic operator '{operator}' is not allowed. To allow it, set the '{setting}' validation setting."
    )]
    NotAllowedArithmeticOperator {
        operator: &'static str,
        setting: &'static str,
    },

    #[error("Function '{function}' is not allowed. To allow it, set the '{setting}' validation setting.")]
    NotAllowedFunction {
        function: String,
        setting: &'static str,
    },

    #[error("Query option '{option}' is not allowed. To allow it, set the '{setting}' validation setting.")]
    NotAllowedQueryOption {
        option: &'static str,
        setting: &'static str,
    },

    #[error(
        "Query option '{option}' is not enabled by the model. To enable it, set the '{setting}' default query setting."
    )]
    NotEnabledQueryOption {
        option: &'static str,
        setting: &'static str,
    },

    #[error("The property '{0}' cannot be used in the $filter query option.")]
    NotFilterableProperty(String),

    #[error("The property '{0}' cannot be used in the $orderby query option.")]
    NotSortableProperty(String),

    #[error("The property '{0}' cannot be used in the $expand query option.")]
    NotExpandableProperty(String),

    #[error("The property '{0}' cannot be used in the $select query option.")]
    NotSelectableProperty(String),

    #[error("The property '{0}' cannot be used for navigation.")]
    NotNavigableProperty(String),

    #[error("The property '{0}' cannot be used for $count.")]
    NotCountableProperty(String),

    #[error("The entity set '{0}' cannot be used for $count.")]
    NotCountableEntitySet(String),

    #[error("Order by '{property}' is not allowed. To allow it, set the '{setting}' validation setting.")]
    NotAllowedOrderByProperty {
        property: String,
        setting: &'static str,
    },

    #[error(
        "The number of clauses in $orderby query option exceeded the maximum number allowed. The maximum number of $orderby clauses allowed is {limit}. To increase the limit, set the 'MaxOrderByNodeCount' validation setting."
    )]
    OrderByNodeCountExceeded { limit: usize },

    #[error(
        "The request includes a $expand path which is too deep. The maximum depth allowed is {limit}. To increase the limit, set the '{setting}' validation setting."
    )]
    MaxExpandDepthExceeded { limit: usize, setting: &'static str },

    #[error("'{name}' should be less than or equal to '{setting}'.")]
    InvalidExpansionDepthValue {
        name: &'static str,
        setting: &'static str,
    },

    #[error("The limit of '{limit}' for {option} query has been exceeded. The value from the incoming request is '{value}'.")]
    SkipTopLimitExceeded {
        limit: u64,
        option: &'static str,
        value: u64,
    },

    #[error("'{option}' cannot be empty or whitespace. Omit the parameter from the query if it is not used.")]
    EmptyQueryOption { option: &'static str },

    #[error("The $compute query option could not be parsed: {0}")]
    ComputeParse(String),

    #[error("'{kind}' is not supported by {validator}.")]
    Unsupported {
        kind: String,
        validator: &'static str,
    },

    #[error("The query is nested too deeply. The maximum supported nesting depth is {limit}.")]
    RecursionLimitExceeded { limit: usize },
}

impl ValidationError {
    /// `false` for the defensive failures that signal a gap in node-kind
    /// coverage or a runaway input rather than a client policy violation.
    #[must_use]
    pub fn is_policy_violation(&self) -> bool {
        !matches!(
            self,
            ValidationError::Unsupported { .. } | ValidationError::RecursionLimitExceeded { .. }
        )
    }

    /// Stable machine-readable kind, used in problem codes.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::ArgumentNull(_) => "argument_null",
            ValidationError::MaxNodeLimitExceeded { .. } => "max_node_count_exceeded",
            ValidationError::MaxAnyAllExpressionLimitExceeded { .. } => "max_any_all_depth_exceeded",
            ValidationError::NotAllowedLogicalOperator { .. } => "logical_operator_not_allowed",
            ValidationError::NotAllowedArithmeticOperator { .. } => "arithmetic_operator_not_allowed",
            ValidationError::NotAllowedFunction { .. } => "function_not_allowed",
            ValidationError::NotAllowedQueryOption { .. } => "query_option_not_allowed",
            ValidationError::NotEnabledQueryOption { .. } => "query_option_not_enabled",
            ValidationError::NotFilterableProperty(_) => "property_not_filterable",
            ValidationError::NotSortableProperty(_) => "property_not_sortable",
            ValidationError::NotExpandableProperty(_) => "property_not_expandable",
            ValidationError::NotSelectableProperty(_) => "property_not_selectable",
            ValidationError::NotNavigableProperty(_) => "property_not_navigable",
            ValidationError::NotCountableProperty(_) => "property_not_countable",
            ValidationError::NotCountableEntitySet(_) => "entity_set_not_countable",
            ValidationError::NotAllowedOrderByProperty { .. } => "orderby_property_not_allowed",
            ValidationError::OrderByNodeCountExceeded { .. } => "orderby_node_count_exceeded",
            ValidationError::MaxExpandDepthExceeded { .. } => "max_expand_depth_exceeded",
            ValidationError::InvalidExpansionDepthValue { .. } => "invalid_expansion_depth",
            ValidationError::SkipTopLimitExceeded { .. } => "skip_top_limit_exceeded",
            ValidationError::EmptyQueryOption { .. } => "empty_query_option",
            ValidationError::ComputeParse(_) => "compute_parse_failed",
            ValidationError::Unsupported { .. } => "unsupported_node",
            ValidationError::RecursionLimitExceeded { .. } => "recursion_limit_exceeded",
        }
    }
}

/// Ordered, de-duplicated list of failures returned by every `try_validate`.
///
/// Two failures are duplicates when their rendered messages are identical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `error` unless an error with the same message is already present.
    pub fn push(&mut self, error: ValidationError) {
        let message = error.to_string();
        if !self.errors.iter().any(|e| e.to_string() == message) {
            self.errors.push(error);
        }
    }

    /// Append every error of `other`, keeping first-seen order.
    pub fn extend(&mut self, other: ValidationErrors) {
        for error in other.errors {
            self.push(error);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.errors.iter()
    }

    /// Rendered messages in report order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    /// `Ok(())` when empty, `Err(self)` otherwise.
    ///
    /// # Errors
    /// Returns `self` when at least one error was collected.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl IntoIterator for ValidationErrors {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_governing_setting() {
        let err = ValidationError::NotAllowedLogicalOperator {
            operator: "And",
            setting: "AllowedLogicalOperators",
        };
        let message = err.to_string();
        assert!(message.contains("'And'"));
        assert!(message.contains("AllowedLogicalOperators"));
    }

    #[test]
    fn test_skip_top_message() {
        let err = ValidationError::SkipTopLimitExceeded {
            limit: 10,
            option: "Top",
            value: 11,
        };
        assert_eq!(
            err.to_string(),
            "The limit of '10' for Top query has been exceeded. The value from the incoming request is '11'."
        );
    }

    #[test]
    fn test_defensive_failures_are_not_policy_violations() {
        assert!(
            !ValidationError::Unsupported {
                kind: "CollectionFunctionCall".to_owned(),
                validator: "FilterQueryValidator",
            }
            .is_policy_violation()
        );
        assert!(!ValidationError::RecursionLimitExceeded { limit: 8 }.is_policy_violation());
        assert!(ValidationError::NotFilterableProperty("Name".to_owned()).is_policy_violation());
    }

    #[test]
    fn test_errors_deduplicate_by_message() {
        let mut errors = ValidationErrors::new();
        errors.push(ValidationError::NotCountableProperty("Orders".to_owned()));
        errors.push(ValidationError::NotFilterableProperty("Name".to_owned()));
        errors.push(ValidationError::NotCountableProperty("Orders".to_owned()));

        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors.messages(),
            vec![
                "The property 'Orders' cannot be used for $count.".to_owned(),
                "The property 'Name' cannot be used in the $filter query option.".to_owned(),
            ]
        );
    }

    #[test]
    fn test_into_result() {
        assert!(ValidationErrors::new().into_result().is_ok());
        let errors = ValidationErrors::from(ValidationError::ArgumentNull("clause"));
        assert_eq!(errors.into_result().unwrap_err().len(), 1);
    }

    #[test]
    fn test_display_joins_lines() {
        let mut errors = ValidationErrors::new();
        errors.push(ValidationError::NotSortableProperty("A".to_owned()));
        errors.push(ValidationError::NotSortableProperty("B".to_owned()));
        assert_eq!(errors.to_string().lines().count(), 2);
    }
}
