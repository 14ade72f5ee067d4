//! Validation policy shared by every validator
//!
//! `ValidationSettings` is a read-only description of what a client query may
//! use. It is cheap to clone and safe to share between concurrent validations:
//! - allow-lists (query options, operators, functions) are additive flag sets
//! - numeric caps (node count, any/all depth, `$orderby` clauses, `$expand` depth)
//! - optional `$top`/`$skip` ceilings
//! - an optional explicit allow-list of `$orderby` properties

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Declares a copyable bit-flag set with named single flags and composites.
///
/// Names are matched case-insensitively when parsing; `all` and `none` are
/// always accepted. Sets serialize as the list of contained single-flag names.
macro_rules! flag_set {
    (
        $(#[$outer:meta])*
        pub struct $name:ident($repr:ty) {
            $(
                $(#[$inner:meta])*
                const $flag:ident = $value:expr, $text:literal;
            )*
        }
    ) => {
        $(#[$outer])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name($repr);

        impl $name {
            /// Empty set.
            pub const NONE: Self = Self(0);
            $(
                $(#[$inner])*
                pub const $flag: Self = Self($value);
            )*
            /// Every known flag.
            pub const ALL: Self = Self(0 $(| $value)*);

            const NAMED: &'static [(&'static str, $name)] = &[$(($text, Self($value))),*];

            #[must_use]
            pub const fn bits(self) -> $repr {
                self.0
            }

            #[must_use]
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            #[must_use]
            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            #[must_use]
            pub const fn union(self, other: Self) -> Self {
                Self(self.0 | other.0)
            }

            #[must_use]
            pub const fn difference(self, other: Self) -> Self {
                Self(self.0 & !other.0)
            }

            /// Resolve a flag (single or composite) by name, ignoring ASCII case.
            #[must_use]
            pub fn from_name(name: &str) -> Option<Self> {
                if name.eq_ignore_ascii_case("all") {
                    return Some(Self::ALL);
                }
                if name.eq_ignore_ascii_case("none") {
                    return Some(Self::NONE);
                }
                Self::NAMED
                    .iter()
                    .find(|(text, _)| text.eq_ignore_ascii_case(name))
                    .map(|(_, flag)| *flag)
            }

            /// Names of the single flags contained in this set, in declaration order.
            pub fn names(self) -> impl Iterator<Item = &'static str> {
                Self::NAMED
                    .iter()
                    .filter(move |(_, flag)| flag.0.count_ones() == 1 && self.contains(*flag))
                    .map(|(text, _)| *text)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::ALL
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                self.union(rhs)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                *self = self.union(rhs);
            }
        }

        impl std::ops::BitAnd for $name {
            type Output = Self;

            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if let Some((text, _)) = Self::NAMED.iter().find(|(_, flag)| flag == self) {
                    return f.write_str(text);
                }
                if self.is_empty() {
                    return f.write_str("None");
                }
                f.write_str(&self.names().collect::<Vec<_>>().join(", "))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({self})", stringify!($name))
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_seq(self.names())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct FlagVisitor;

                impl<'de> serde::de::Visitor<'de> for FlagVisitor {
                    type Value = $name;

                    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        write!(f, "a list of {} names", stringify!($name))
                    }

                    fn visit_str<E: serde::de::Error>(self, value: &str) -> Result<$name, E> {
                        value
                            .split(',')
                            .map(str::trim)
                            .filter(|name| !name.is_empty())
                            .try_fold($name::NONE, |acc, name| {
                                $name::from_name(name).map(|flag| acc | flag).ok_or_else(|| {
                                    E::custom(format!("unknown {} flag '{name}'", stringify!($name)))
                                })
                            })
                    }

                    fn visit_seq<A: serde::de::SeqAccess<'de>>(
                        self,
                        mut seq: A,
                    ) -> Result<$name, A::Error> {
                        let mut flags = $name::NONE;
                        while let Some(name) = seq.next_element::<String>()? {
                            let flag = $name::from_name(&name).ok_or_else(|| {
                                <A::Error as serde::de::Error>::custom(format!(
                                    "unknown {} flag '{name}'",
                                    stringify!($name)
                                ))
                            })?;
                            flags |= flag;
                        }
                        Ok(flags)
                    }
                }

                deserializer.deserialize_any(FlagVisitor)
            }
        }
    };
}

flag_set! {
    /// Query options a request may carry.
    pub struct AllowedQueryOptions(u32) {
        const FILTER = 1 << 0, "Filter";
        const EXPAND = 1 << 1, "Expand";
        const SELECT = 1 << 2, "Select";
        const ORDER_BY = 1 << 3, "OrderBy";
        const TOP = 1 << 4, "Top";
        const SKIP = 1 << 5, "Skip";
        const COUNT = 1 << 6, "Count";
        const FORMAT = 1 << 7, "Format";
        const SKIP_TOKEN = 1 << 8, "SkipToken";
        const DELTA_TOKEN = 1 << 9, "DeltaToken";
        const APPLY = 1 << 10, "Apply";
        const COMPUTE = 1 << 11, "Compute";
        const SEARCH = 1 << 12, "Search";
    }
}

flag_set! {
    /// Logical operators usable in `$filter`.
    pub struct AllowedLogicalOperators(u32) {
        const OR = 1 << 0, "Or";
        const AND = 1 << 1, "And";
        const EQUAL = 1 << 2, "Equal";
        const NOT_EQUAL = 1 << 3, "NotEqual";
        const GREATER_THAN = 1 << 4, "GreaterThan";
        const GREATER_THAN_OR_EQUAL = 1 << 5, "GreaterThanOrEqual";
        const LESS_THAN = 1 << 6, "LessThan";
        const LESS_THAN_OR_EQUAL = 1 << 7, "LessThanOrEqual";
        const NOT = 1 << 8, "Not";
        const HAS = 1 << 9, "Has";
    }
}

flag_set! {
    /// Arithmetic operators usable in `$filter`.
    pub struct AllowedArithmeticOperators(u32) {
        const ADD = 1 << 0, "Add";
        const SUBTRACT = 1 << 1, "Subtract";
        const MULTIPLY = 1 << 2, "Multiply";
        const DIVIDE = 1 << 3, "Divide";
        const MODULO = 1 << 4, "Modulo";
    }
}

flag_set! {
    /// Canonical functions usable in `$filter` and `$orderby`.
    pub struct AllowedFunctions(u64) {
        const STARTS_WITH = 1 << 0, "StartsWith";
        const ENDS_WITH = 1 << 1, "EndsWith";
        const CONTAINS = 1 << 2, "Contains";
        const LENGTH = 1 << 3, "Length";
        const INDEX_OF = 1 << 4, "IndexOf";
        const CONCAT = 1 << 5, "Concat";
        const SUBSTRING = 1 << 6, "Substring";
        const TO_LOWER = 1 << 7, "ToLower";
        const TO_UPPER = 1 << 8, "ToUpper";
        const TRIM = 1 << 9, "Trim";
        const MATCHES_PATTERN = 1 << 10, "MatchesPattern";
        const CAST = 1 << 11, "Cast";
        const IS_OF = 1 << 12, "IsOf";
        const YEAR = 1 << 13, "Year";
        const MONTH = 1 << 14, "Month";
        const DAY = 1 << 15, "Day";
        const HOUR = 1 << 16, "Hour";
        const MINUTE = 1 << 17, "Minute";
        const SECOND = 1 << 18, "Second";
        const FRACTIONAL_SECONDS = 1 << 19, "FractionalSeconds";
        const DATE = 1 << 20, "Date";
        const TIME = 1 << 21, "Time";
        const TOTAL_OFFSET_MINUTES = 1 << 22, "TotalOffsetMinutes";
        const TOTAL_SECONDS = 1 << 23, "TotalSeconds";
        const NOW = 1 << 24, "Now";
        const MAX_DATE_TIME = 1 << 25, "MaxDateTime";
        const MIN_DATE_TIME = 1 << 26, "MinDateTime";
        const ROUND = 1 << 27, "Round";
        const FLOOR = 1 << 28, "Floor";
        const CEILING = 1 << 29, "Ceiling";
        const ANY = 1 << 30, "Any";
        const ALL_LAMBDA = 1 << 31, "All";
        const ALL_STRING_FUNCTIONS = (1 << 0) | (1 << 1) | (1 << 2) | (1 << 3) | (1 << 4)
            | (1 << 5) | (1 << 6) | (1 << 7) | (1 << 8) | (1 << 9) | (1 << 10), "AllStringFunctions";
        const ALL_DATE_TIME_FUNCTIONS = (1 << 13) | (1 << 14) | (1 << 15) | (1 << 16)
            | (1 << 17) | (1 << 18) | (1 << 19) | (1 << 20) | (1 << 21) | (1 << 22)
            | (1 << 23) | (1 << 24) | (1 << 25) | (1 << 26), "AllDateTimeFunctions";
        const ALL_MATH_FUNCTIONS = (1 << 27) | (1 << 28) | (1 << 29), "AllMathFunctions";
    }
}

impl AllowedFunctions {
    /// Map a canonical function name to its flag.
    ///
    /// Names outside the canonical set return `None`: custom and extension
    /// functions are not governed by `AllowedFunctions` and pass validation.
    #[must_use]
    pub fn for_function_name(name: &str) -> Option<Self> {
        let flag = match name {
            "any" => Self::ANY,
            "all" => Self::ALL_LAMBDA,
            "cast" => Self::CAST,
            "ceiling" => Self::CEILING,
            "concat" => Self::CONCAT,
            "contains" => Self::CONTAINS,
            "day" => Self::DAY,
            "endswith" => Self::ENDS_WITH,
            "floor" => Self::FLOOR,
            "fractionalseconds" => Self::FRACTIONAL_SECONDS,
            "hour" => Self::HOUR,
            "indexof" => Self::INDEX_OF,
            "isof" => Self::IS_OF,
            "length" => Self::LENGTH,
            "matchesPattern" => Self::MATCHES_PATTERN,
            "minute" => Self::MINUTE,
            "month" => Self::MONTH,
            "round" => Self::ROUND,
            "second" => Self::SECOND,
            "startswith" => Self::STARTS_WITH,
            "substring" => Self::SUBSTRING,
            "tolower" => Self::TO_LOWER,
            "toupper" => Self::TO_UPPER,
            "trim" => Self::TRIM,
            "year" => Self::YEAR,
            "date" => Self::DATE,
            "time" => Self::TIME,
            "now" => Self::NOW,
            "maxdatetime" => Self::MAX_DATE_TIME,
            "mindatetime" => Self::MIN_DATE_TIME,
            "totaloffsetminutes" => Self::TOTAL_OFFSET_MINUTES,
            "totalseconds" => Self::TOTAL_SECONDS,
            _ => return None,
        };
        Some(flag)
    }
}

/// Policy applied by every validator.
///
/// `max_expansion_depth = 0` disables the `$expand` depth checks; `None` for
/// `max_top`/`max_skip` means no ceiling. An empty
/// `allowed_order_by_properties` allows any sortable property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationSettings {
    pub allowed_query_options: AllowedQueryOptions,
    pub allowed_logical_operators: AllowedLogicalOperators,
    pub allowed_arithmetic_operators: AllowedArithmeticOperators,
    pub allowed_functions: AllowedFunctions,
    pub allowed_order_by_properties: BTreeSet<String>,
    #[serde(default = "default_max_node_count")]
    pub max_node_count: usize,
    #[serde(default = "default_max_any_all_expression_depth")]
    pub max_any_all_expression_depth: usize,
    #[serde(default = "default_max_order_by_node_count")]
    pub max_order_by_node_count: usize,
    #[serde(default = "default_max_expansion_depth")]
    pub max_expansion_depth: usize,
    pub max_top: Option<u64>,
    pub max_skip: Option<u64>,
}

fn default_max_node_count() -> usize {
    100
}

fn default_max_any_all_expression_depth() -> usize {
    1
}

fn default_max_order_by_node_count() -> usize {
    5
}

fn default_max_expansion_depth() -> usize {
    2
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            allowed_query_options: AllowedQueryOptions::ALL,
            allowed_logical_operators: AllowedLogicalOperators::ALL,
            allowed_arithmetic_operators: AllowedArithmeticOperators::ALL,
            allowed_functions: AllowedFunctions::ALL,
            allowed_order_by_properties: BTreeSet::new(),
            max_node_count: default_max_node_count(),
            max_any_all_expression_depth: default_max_any_all_expression_depth(),
            max_order_by_node_count: default_max_order_by_node_count(),
            max_expansion_depth: default_max_expansion_depth(),
            max_top: None,
            max_skip: None,
        }
    }
}

impl ValidationSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_allowed_query_options(mut self, options: AllowedQueryOptions) -> Self {
        self.allowed_query_options = options;
        self
    }

    #[must_use]
    pub fn with_allowed_logical_operators(mut self, operators: AllowedLogicalOperators) -> Self {
        self.allowed_logical_operators = operators;
        self
    }

    #[must_use]
    pub fn with_allowed_arithmetic_operators(
        mut self,
        operators: AllowedArithmeticOperators,
    ) -> Self {
        self.allowed_arithmetic_operators = operators;
        self
    }

    #[must_use]
    pub fn with_allowed_functions(mut self, functions: AllowedFunctions) -> Self {
        self.allowed_functions = functions;
        self
    }

    /// Restrict `$orderby` to the given property names (`$it` orders by the instance itself).
    #[must_use]
    pub fn with_allowed_order_by_properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_order_by_properties = properties.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_max_node_count(mut self, max: usize) -> Self {
        self.max_node_count = max;
        self
    }

    #[must_use]
    pub fn with_max_any_all_expression_depth(mut self, max: usize) -> Self {
        self.max_any_all_expression_depth = max;
        self
    }

    #[must_use]
    pub fn with_max_order_by_node_count(mut self, max: usize) -> Self {
        self.max_order_by_node_count = max;
        self
    }

    #[must_use]
    pub fn with_max_expansion_depth(mut self, max: usize) -> Self {
        self.max_expansion_depth = max;
        self
    }

    #[must_use]
    pub fn with_max_top(mut self, max: u64) -> Self {
        self.max_top = Some(max);
        self
    }

    #[must_use]
    pub fn with_max_skip(mut self, max: u64) -> Self {
        self.max_skip = Some(max);
        self
    }

    /// Whether an explicit `$orderby` allow-list was configured.
    #[must_use]
    pub fn has_explicit_order_by_properties(&self) -> bool {
        !self.allowed_order_by_properties.is_empty()
    }
}
