//! RFC 9457 Problem Details for validation failures (pure data, no HTTP framework).
//!
//! Hosts convert a [`ValidationError`] or a collected [`ValidationErrors`]
//! into a [`Problem`] and add the instance path and trace id before writing
//! the response.

use http::StatusCode;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ValidationError, ValidationErrors};

/// Content type for Problem Details as per RFC 9457.
pub const APPLICATION_PROBLEM_JSON: &str = "application/problem+json";

const CODE_PREFIX: &str = "odata.validation";

#[allow(clippy::trivially_copy_pass_by_ref)] // serde requires &T signature
fn serialize_status_code<S>(status: &StatusCode, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u16(status.as_u16())
}

fn deserialize_status_code<'de, D>(deserializer: D) -> Result<StatusCode, D::Error>
where
    D: Deserializer<'de>,
{
    let code = u16::deserialize(deserializer)?;
    StatusCode::from_u16(code).map_err(serde::de::Error::custom)
}

/// RFC 9457 Problem Details.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[must_use]
pub struct Problem {
    #[serde(rename = "type")]
    pub type_url: String,
    pub title: String,
    /// Serializes as u16.
    #[serde(
        serialize_with = "serialize_status_code",
        deserialize_with = "deserialize_status_code"
    )]
    pub status: StatusCode,
    pub detail: String,
    pub instance: String,
    /// Machine-readable code, `odata.validation.<kind>`.
    pub code: String,
    pub trace_id: Option<String>,
    /// One entry per collected violation.
    pub errors: Option<Vec<Violation>>,
}

/// One violation inside a collected problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Problem {
    pub fn new(status: StatusCode, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            type_url: "about:blank".to_owned(),
            title: title.into(),
            status,
            detail: detail.into(),
            instance: String::new(),
            code: String::new(),
            trace_id: None,
            errors: None,
        }
    }

    pub fn with_instance(mut self, uri: impl Into<String>) -> Self {
        self.instance = uri.into();
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_trace_id(mut self, id: impl Into<String>) -> Self {
        self.trace_id = Some(id.into());
        self
    }

    pub fn with_errors(mut self, errors: Vec<Violation>) -> Self {
        self.errors = Some(errors);
        self
    }
}

fn code_for(err: &ValidationError) -> String {
    format!("{CODE_PREFIX}.{}", err.kind())
}

impl From<ValidationError> for Problem {
    fn from(err: ValidationError) -> Self {
        let code = code_for(&err);
        if err.is_policy_violation() {
            Problem::new(StatusCode::BAD_REQUEST, "Invalid OData Query", err.to_string()).with_code(code)
        } else {
            // detail stays generic: the message names internal node kinds
            tracing::warn!(error = %err, "internal OData validation failure");
            Problem::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "OData Validation Failure",
                "An internal error occurred while validating the OData query",
            )
            .with_code(code)
        }
    }
}

impl From<ValidationErrors> for Problem {
    fn from(errors: ValidationErrors) -> Self {
        let status = if errors.iter().all(ValidationError::is_policy_violation) {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let detail = match errors.len() {
            1 => errors.to_string(),
            n => format!("The query contains {n} validation errors"),
        };
        let violations = errors
            .iter()
            .map(|e| Violation {
                message: e.to_string(),
                code: Some(code_for(e)),
            })
            .collect();

        Problem::new(status, "Invalid OData Query", detail)
            .with_code(format!("{CODE_PREFIX}.invalid_query"))
            .with_errors(violations)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_policy_violation_maps_to_400() {
        let problem: Problem = ValidationError::NotFilterableProperty("Secret".to_owned()).into();
        assert_eq!(problem.status, StatusCode::BAD_REQUEST);
        assert_eq!(problem.code, "odata.validation.property_not_filterable");
        assert!(problem.detail.contains("Secret"));
    }

    #[test]
    fn test_defensive_failure_maps_to_500_without_leaking() {
        let problem: Problem = ValidationError::Unsupported {
            kind: "CollectionFunctionCall".to_owned(),
            validator: "FilterQueryValidator",
        }
        .into();
        assert_eq!(problem.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(problem.code, "odata.validation.unsupported_node");
        assert!(!problem.detail.contains("CollectionFunctionCall"));
    }

    #[test]
    fn test_collected_errors_carry_one_entry_each() {
        let mut errors = ValidationErrors::new();
        errors.push(ValidationError::NotSortableProperty("A".to_owned()));
        errors.push(ValidationError::OrderByNodeCountExceeded { limit: 2 });
        let problem: Problem = errors.into();

        assert_eq!(problem.status, StatusCode::BAD_REQUEST);
        let entries = problem.errors.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[1].code.as_deref(),
            Some("odata.validation.orderby_node_count_exceeded")
        );
    }

    #[test]
    fn test_problem_serializes_status_as_u16() {
        let problem: Problem = ValidationError::OrderByNodeCountExceeded { limit: 1 }.into();
        let json = serde_json::to_string(&problem).unwrap();
        assert!(json.contains("\"status\":400"));
        assert!(json.contains("\"type\":\"about:blank\""));

        let back: Problem = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, StatusCode::BAD_REQUEST);
    }
}
