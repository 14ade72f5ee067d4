//! Parsed query clauses consumed by the validators.
//!
//! The trees are produced by an upstream URI parser; validation never
//! re-parses query text. Every node belongs to one of two shape families,
//! [`SingleValueNode`] (produces a scalar or a single resource) and
//! [`CollectionNode`] (produces a sequence), and carries a closed
//! [`QueryNodeKind`] tag.

use std::fmt;
use std::sync::Arc;

use crate::edm::EdmProperty;
use crate::settings::{AllowedArithmeticOperators, AllowedLogicalOperators};

/// Name of the implicit range variable bound to the resource being queried.
pub const IT: &str = "$it";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryNodeKind {
    BinaryOperator,
    UnaryOperator,
    Constant,
    Convert,
    SingleValuePropertyAccess,
    SingleComplexNode,
    SingleNavigationNode,
    SingleValueFunctionCall,
    SingleResourceFunctionCall,
    ResourceRangeVariableReference,
    NonResourceRangeVariableReference,
    Any,
    All,
    Count,
    In,
    ParameterAlias,
    NamedFunctionParameter,
    SingleValueOpenPropertyAccess,
    SearchTerm,
    CollectionPropertyAccess,
    CollectionComplexNode,
    CollectionNavigationNode,
    CollectionFunctionCall,
    CollectionOpenPropertyAccess,
    CollectionConstant,
}

impl fmt::Display for QueryNodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOperatorKind {
    Or,
    And,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Has,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

/// Allow-list flag governing a binary operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperatorFlag {
    Logical(AllowedLogicalOperators),
    Arithmetic(AllowedArithmeticOperators),
}

impl BinaryOperatorKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            BinaryOperatorKind::Or => "Or",
            BinaryOperatorKind::And => "And",
            BinaryOperatorKind::Equal => "Equal",
            BinaryOperatorKind::NotEqual => "NotEqual",
            BinaryOperatorKind::GreaterThan => "GreaterThan",
            BinaryOperatorKind::GreaterThanOrEqual => "GreaterThanOrEqual",
            BinaryOperatorKind::LessThan => "LessThan",
            BinaryOperatorKind::LessThanOrEqual => "LessThanOrEqual",
            BinaryOperatorKind::Has => "Has",
            BinaryOperatorKind::Add => "Add",
            BinaryOperatorKind::Subtract => "Subtract",
            BinaryOperatorKind::Multiply => "Multiply",
            BinaryOperatorKind::Divide => "Divide",
            BinaryOperatorKind::Modulo => "Modulo",
        }
    }

    #[must_use]
    pub fn flag(self) -> OperatorFlag {
        match self {
            Self::Or => OperatorFlag::Logical(AllowedLogicalOperators::OR),
            Self::And => OperatorFlag::Logical(AllowedLogicalOperators::AND),
            Self::Equal => OperatorFlag::Logical(AllowedLogicalOperators::EQUAL),
            Self::NotEqual => OperatorFlag::Logical(AllowedLogicalOperators::NOT_EQUAL),
            Self::GreaterThan => OperatorFlag::Logical(AllowedLogicalOperators::GREATER_THAN),
            Self::GreaterThanOrEqual => {
                OperatorFlag::Logical(AllowedLogicalOperators::GREATER_THAN_OR_EQUAL)
            }
            Self::LessThan => OperatorFlag::Logical(AllowedLogicalOperators::LESS_THAN),
            Self::LessThanOrEqual => OperatorFlag::Logical(AllowedLogicalOperators::LESS_THAN_OR_EQUAL),
            Self::Has => OperatorFlag::Logical(AllowedLogicalOperators::HAS),
            Self::Add => OperatorFlag::Arithmetic(AllowedArithmeticOperators::ADD),
            Self::Subtract => OperatorFlag::Arithmetic(AllowedArithmeticOperators::SUBTRACT),
            Self::Multiply => OperatorFlag::Arithmetic(AllowedArithmeticOperators::MULTIPLY),
            Self::Divide => OperatorFlag::Arithmetic(AllowedArithmeticOperators::DIVIDE),
            Self::Modulo => OperatorFlag::Arithmetic(AllowedArithmeticOperators::MODULO),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOperatorKind {
    Not,
    Negate,
}

impl UnaryOperatorKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            UnaryOperatorKind::Not => "Not",
            UnaryOperatorKind::Negate => "Negate",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SingleValueNode {
    BinaryOperator {
        operator: BinaryOperatorKind,
        left: Box<SingleValueNode>,
        right: Box<SingleValueNode>,
    },
    UnaryOperator {
        operator: UnaryOperatorKind,
        operand: Box<SingleValueNode>,
    },
    /// Literal in its URI text form.
    Constant(String),
    Convert {
        source: Box<SingleValueNode>,
        type_name: String,
    },
    SingleValuePropertyAccess {
        source: Box<SingleValueNode>,
        property: Arc<EdmProperty>,
    },
    SingleComplex {
        source: Box<SingleValueNode>,
        property: Arc<EdmProperty>,
    },
    SingleNavigation {
        source: Box<SingleValueNode>,
        property: Arc<EdmProperty>,
    },
    SingleValueFunctionCall {
        name: String,
        arguments: Vec<QueryNode>,
    },
    SingleResourceFunctionCall {
        name: String,
        arguments: Vec<QueryNode>,
    },
    ResourceRangeVariableReference(String),
    NonResourceRangeVariableReference(String),
    Any {
        range_variable: String,
        source: Box<CollectionNode>,
        body: Box<SingleValueNode>,
    },
    All {
        range_variable: String,
        source: Box<CollectionNode>,
        body: Box<SingleValueNode>,
    },
    /// `Collection/$count` with optional nested `$filter` / `$search`.
    Count {
        source: Box<CollectionNode>,
        filter: Option<Box<SingleValueNode>>,
        search: Option<Box<SingleValueNode>>,
    },
    In {
        left: Box<SingleValueNode>,
        right: Box<CollectionNode>,
    },
    ParameterAlias(String),
    NamedFunctionParameter {
        name: String,
        value: Box<QueryNode>,
    },
    SingleValueOpenPropertyAccess {
        source: Box<SingleValueNode>,
        name: String,
    },
    SearchTerm(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum CollectionNode {
    CollectionPropertyAccess {
        source: Box<SingleValueNode>,
        property: Arc<EdmProperty>,
    },
    CollectionComplex {
        source: Box<SingleValueNode>,
        property: Arc<EdmProperty>,
    },
    CollectionNavigation {
        source: Box<SingleValueNode>,
        property: Arc<EdmProperty>,
    },
    CollectionFunctionCall {
        name: String,
        arguments: Vec<QueryNode>,
    },
    CollectionOpenPropertyAccess {
        source: Box<SingleValueNode>,
        name: String,
    },
    /// Literal list, e.g. the right side of `in`.
    CollectionConstant(Vec<String>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum QueryNode {
    Single(SingleValueNode),
    Collection(CollectionNode),
}

impl From<SingleValueNode> for QueryNode {
    fn from(node: SingleValueNode) -> Self {
        QueryNode::Single(node)
    }
}

impl From<CollectionNode> for QueryNode {
    fn from(node: CollectionNode) -> Self {
        QueryNode::Collection(node)
    }
}

impl QueryNode {
    #[must_use]
    pub fn kind(&self) -> QueryNodeKind {
        match self {
            QueryNode::Single(node) => node.kind(),
            QueryNode::Collection(node) => node.kind(),
        }
    }
}

impl SingleValueNode {
    #[must_use]
    pub fn kind(&self) -> QueryNodeKind {
        match self {
            SingleValueNode::BinaryOperator { .. } => QueryNodeKind::BinaryOperator,
            SingleValueNode::UnaryOperator { .. } => QueryNodeKind::UnaryOperator,
            SingleValueNode::Constant(_) => QueryNodeKind::Constant,
            SingleValueNode::Convert { .. } => QueryNodeKind::Convert,
            SingleValueNode::SingleValuePropertyAccess { .. } => {
                QueryNodeKind::SingleValuePropertyAccess
            }
            SingleValueNode::SingleComplex { .. } => QueryNodeKind::SingleComplexNode,
            SingleValueNode::SingleNavigation { .. } => QueryNodeKind::SingleNavigationNode,
            SingleValueNode::SingleValueFunctionCall { .. } => QueryNodeKind::SingleValueFunctionCall,
            SingleValueNode::SingleResourceFunctionCall { .. } => {
                QueryNodeKind::SingleResourceFunctionCall
            }
            SingleValueNode::ResourceRangeVariableReference(_) => {
                QueryNodeKind::ResourceRangeVariableReference
            }
            SingleValueNode::NonResourceRangeVariableReference(_) => {
                QueryNodeKind::NonResourceRangeVariableReference
            }
            SingleValueNode::Any { .. } => QueryNodeKind::Any,
            SingleValueNode::All { .. } => QueryNodeKind::All,
            SingleValueNode::Count { .. } => QueryNodeKind::Count,
            SingleValueNode::In { .. } => QueryNodeKind::In,
            SingleValueNode::ParameterAlias(_) => QueryNodeKind::ParameterAlias,
            SingleValueNode::NamedFunctionParameter { .. } => QueryNodeKind::NamedFunctionParameter,
            SingleValueNode::SingleValueOpenPropertyAccess { .. } => {
                QueryNodeKind::SingleValueOpenPropertyAccess
            }
            SingleValueNode::SearchTerm(_) => QueryNodeKind::SearchTerm,
        }
    }

    /// `$it`
    #[must_use]
    pub fn it() -> Self {
        SingleValueNode::ResourceRangeVariableReference(IT.to_owned())
    }

    #[must_use]
    pub fn constant(literal: impl Into<String>) -> Self {
        SingleValueNode::Constant(literal.into())
    }

    /// Property access on `$it`, choosing the node kind from the property's shape.
    #[must_use]
    pub fn property(property: Arc<EdmProperty>) -> Self {
        Self::property_of(Self::it(), property)
    }

    /// Single-valued property access on `source`, choosing the node kind from the property's shape.
    #[must_use]
    pub fn property_of(source: SingleValueNode, property: Arc<EdmProperty>) -> Self {
        use crate::edm::PropertyKind;
        let source = Box::new(source);
        match property.kind() {
            PropertyKind::Navigation { .. } => SingleValueNode::SingleNavigation { source, property },
            PropertyKind::Complex { .. } => SingleValueNode::SingleComplex { source, property },
            PropertyKind::Primitive { .. } => {
                SingleValueNode::SingleValuePropertyAccess { source, property }
            }
        }
    }

    #[must_use]
    pub fn binary(operator: BinaryOperatorKind, left: SingleValueNode, right: SingleValueNode) -> Self {
        SingleValueNode::BinaryOperator {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn unary(operator: UnaryOperatorKind, operand: SingleValueNode) -> Self {
        SingleValueNode::UnaryOperator {
            operator,
            operand: Box::new(operand),
        }
    }

    #[must_use]
    pub fn call(name: impl Into<String>, arguments: Vec<QueryNode>) -> Self {
        SingleValueNode::SingleValueFunctionCall {
            name: name.into(),
            arguments,
        }
    }

    #[must_use]
    pub fn any(range_variable: impl Into<String>, source: CollectionNode, body: SingleValueNode) -> Self {
        SingleValueNode::Any {
            range_variable: range_variable.into(),
            source: Box::new(source),
            body: Box::new(body),
        }
    }

    #[must_use]
    pub fn all(range_variable: impl Into<String>, source: CollectionNode, body: SingleValueNode) -> Self {
        SingleValueNode::All {
            range_variable: range_variable.into(),
            source: Box::new(source),
            body: Box::new(body),
        }
    }
}

impl CollectionNode {
    #[must_use]
    pub fn kind(&self) -> QueryNodeKind {
        match self {
            CollectionNode::CollectionPropertyAccess { .. } => QueryNodeKind::CollectionPropertyAccess,
            CollectionNode::CollectionComplex { .. } => QueryNodeKind::CollectionComplexNode,
            CollectionNode::CollectionNavigation { .. } => QueryNodeKind::CollectionNavigationNode,
            CollectionNode::CollectionFunctionCall { .. } => QueryNodeKind::CollectionFunctionCall,
            CollectionNode::CollectionOpenPropertyAccess { .. } => {
                QueryNodeKind::CollectionOpenPropertyAccess
            }
            CollectionNode::CollectionConstant(_) => QueryNodeKind::CollectionConstant,
        }
    }

    /// Collection-valued property access on `$it`.
    #[must_use]
    pub fn property(property: Arc<EdmProperty>) -> Self {
        Self::property_of(SingleValueNode::it(), property)
    }

    /// Collection-valued property access on `source`, choosing the node kind from the property's shape.
    #[must_use]
    pub fn property_of(source: SingleValueNode, property: Arc<EdmProperty>) -> Self {
        use crate::edm::PropertyKind;
        let source = Box::new(source);
        match property.kind() {
            PropertyKind::Navigation { .. } => CollectionNode::CollectionNavigation { source, property },
            PropertyKind::Complex { .. } => CollectionNode::CollectionComplex { source, property },
            PropertyKind::Primitive { .. } => {
                CollectionNode::CollectionPropertyAccess { source, property }
            }
        }
    }
}

/// Parsed `$filter`.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterClause {
    pub expression: SingleValueNode,
}

impl FilterClause {
    #[must_use]
    pub fn new(expression: SingleValueNode) -> Self {
        Self { expression }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrderByDirection {
    #[default]
    Ascending,
    Descending,
}

/// One `$orderby` clause and the `ThenBy` chain that follows it.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderByClause {
    pub expression: SingleValueNode,
    pub direction: OrderByDirection,
    pub then_by: Option<Box<OrderByClause>>,
}

impl OrderByClause {
    #[must_use]
    pub fn new(expression: SingleValueNode, direction: OrderByDirection) -> Self {
        Self {
            expression,
            direction,
            then_by: None,
        }
    }

    /// Build a chain from `(expression, direction)` pairs in request order.
    ///
    /// Returns `None` for an empty iterator.
    #[must_use]
    pub fn chain<I>(clauses: I) -> Option<Self>
    where
        I: IntoIterator<Item = (SingleValueNode, OrderByDirection)>,
        I::IntoIter: DoubleEndedIterator,
    {
        clauses.into_iter().rev().fold(None, |then_by, (expression, direction)| {
            Some(OrderByClause {
                expression,
                direction,
                then_by: then_by.map(Box::new),
            })
        })
    }

    /// Iterate the chain starting at this clause.
    pub fn iter(&self) -> impl Iterator<Item = &OrderByClause> {
        std::iter::successors(Some(self), |clause| clause.then_by.as_deref())
    }
}

/// Parsed `$search`.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchClause {
    pub expression: SingleValueNode,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComputeExpression {
    pub expression: SingleValueNode,
    pub alias: String,
}

/// Parsed `$compute`.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ComputeClause {
    pub expressions: Vec<ComputeExpression>,
}

/// Parsed `$apply`; transformations are kept in their textual form.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ApplyClause {
    pub transformations: Vec<String>,
}

/// `$levels` inside an `$expand` item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelsClause {
    pub is_max_level: bool,
    pub level: u64,
}

impl LevelsClause {
    #[must_use]
    pub fn max() -> Self {
        Self {
            is_max_level: true,
            level: 0,
        }
    }

    #[must_use]
    pub fn literal(level: u64) -> Self {
        Self {
            is_max_level: false,
            level,
        }
    }

    #[must_use]
    pub fn literal_level(&self) -> Option<u64> {
        (!self.is_max_level).then_some(self.level)
    }
}

/// Query options nested in a `$select` or `$expand` item.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NestedOptions {
    pub filter: Option<FilterClause>,
    pub order_by: Option<OrderByClause>,
    pub top: Option<u64>,
    pub skip: Option<u64>,
    pub count: Option<bool>,
    pub search: Option<SearchClause>,
    pub compute: Option<ComputeClause>,
    pub apply: Option<ApplyClause>,
}

/// `$expand=Nav(...)`
#[derive(Clone, Debug, PartialEq)]
pub struct ExpandedNavigationSelectItem {
    pub navigation: Arc<EdmProperty>,
    pub options: NestedOptions,
    pub levels: Option<LevelsClause>,
    pub select_and_expand: Option<SelectExpandClause>,
}

/// `$expand=Nav/$ref`
#[derive(Clone, Debug, PartialEq)]
pub struct ExpandedReferenceSelectItem {
    pub navigation: Arc<EdmProperty>,
    pub options: NestedOptions,
}

/// `$expand=Nav/$count`
#[derive(Clone, Debug, PartialEq)]
pub struct ExpandedCountSelectItem {
    pub navigation: Arc<EdmProperty>,
    pub filter: Option<FilterClause>,
    pub search: Option<SearchClause>,
}

/// `$select=Prop` or `$select=Complex/Prop(...)`
#[derive(Clone, Debug, PartialEq)]
pub struct PathSelectItem {
    /// Non-empty; the last segment is the selected property.
    pub path: Vec<Arc<EdmProperty>>,
    pub options: NestedOptions,
    pub select_and_expand: Option<SelectExpandClause>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SelectItem {
    /// `$select=*`
    Wildcard,
    /// `$select=NS.*`
    NamespaceWildcard(String),
    Path(PathSelectItem),
    ExpandedNavigation(ExpandedNavigationSelectItem),
    ExpandedReference(ExpandedReferenceSelectItem),
    ExpandedCount(ExpandedCountSelectItem),
}

/// Combined `$select` / `$expand`.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct SelectExpandClause {
    pub items: Vec<SelectItem>,
    pub all_selected: bool,
}

impl SelectExpandClause {
    #[must_use]
    pub fn new(items: Vec<SelectItem>) -> Self {
        Self {
            items,
            all_selected: false,
        }
    }

    /// Expanded navigation items of this level only.
    pub fn expanded_navigations(&self) -> impl Iterator<Item = &ExpandedNavigationSelectItem> {
        self.items.iter().filter_map(|item| match item {
            SelectItem::ExpandedNavigation(expand) => Some(expand),
            _ => None,
        })
    }
}

impl ExpandedNavigationSelectItem {
    #[must_use]
    pub fn new(navigation: Arc<EdmProperty>) -> Self {
        Self {
            navigation,
            options: NestedOptions::default(),
            levels: None,
            select_and_expand: None,
        }
    }

    #[must_use]
    pub fn with_levels(mut self, levels: LevelsClause) -> Self {
        self.levels = Some(levels);
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: NestedOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_nested(mut self, items: Vec<SelectItem>) -> Self {
        self.select_and_expand = Some(SelectExpandClause::new(items));
        self
    }
}
