//! The query being validated: where it is rooted in the model and which
//! options it carries.

use std::sync::Arc;

use crate::ast::{
    ApplyClause, ComputeClause, FilterClause, OrderByClause, SearchClause, SelectExpandClause,
};
use crate::edm::{DefaultQuerySettings, EdmModel, EdmProperty, EdmStructuredType};
use crate::policy::PropertyPolicy;

/// Position of a query in the model.
///
/// A root query targets an entity set (`target_name`); a query nested in an
/// `$expand` or `$select` item targets the navigation or complex property it
/// was reached through (`target_property`).
#[derive(Clone, Debug)]
pub struct ODataQueryContext {
    model: Arc<EdmModel>,
    element_type: Arc<EdmStructuredType>,
    target_property: Option<Arc<EdmProperty>>,
    target_name: Option<String>,
    defaults: Arc<DefaultQuerySettings>,
}

impl ODataQueryContext {
    /// Context for a query against the entity set `entity_set` of `element_type`.
    #[must_use]
    pub fn new(
        model: Arc<EdmModel>,
        element_type: Arc<EdmStructuredType>,
        entity_set: impl Into<String>,
    ) -> Self {
        Self {
            model,
            element_type,
            target_property: None,
            target_name: Some(entity_set.into()),
            defaults: Arc::new(DefaultQuerySettings::default()),
        }
    }

    /// Context for a query nested under `property`, whose items are `element_type`.
    #[must_use]
    pub fn for_property(
        model: Arc<EdmModel>,
        element_type: Arc<EdmStructuredType>,
        property: Arc<EdmProperty>,
    ) -> Self {
        let target_name = Some(property.name().to_owned());
        Self {
            model,
            element_type,
            target_property: Some(property),
            target_name,
            defaults: Arc::new(DefaultQuerySettings::default()),
        }
    }

    #[must_use]
    pub fn with_defaults(mut self, defaults: DefaultQuerySettings) -> Self {
        self.defaults = Arc::new(defaults);
        self
    }

    /// Same model and defaults, rooted at `property` / `element_type`.
    #[must_use]
    pub fn scoped(&self, element_type: Arc<EdmStructuredType>, property: Arc<EdmProperty>) -> Self {
        Self {
            model: Arc::clone(&self.model),
            element_type,
            target_name: Some(property.name().to_owned()),
            target_property: Some(property),
            defaults: Arc::clone(&self.defaults),
        }
    }

    #[must_use]
    pub fn model(&self) -> &EdmModel {
        &self.model
    }

    #[must_use]
    pub fn element_type(&self) -> &Arc<EdmStructuredType> {
        &self.element_type
    }

    #[must_use]
    pub fn target_property(&self) -> Option<&Arc<EdmProperty>> {
        self.target_property.as_ref()
    }

    #[must_use]
    pub fn target_name(&self) -> Option<&str> {
        self.target_name.as_deref()
    }

    #[must_use]
    pub fn defaults(&self) -> &DefaultQuerySettings {
        &self.defaults
    }

    #[must_use]
    pub fn policy(&self) -> PropertyPolicy<'_> {
        PropertyPolicy::new(&self.model, &self.defaults)
    }
}

#[derive(Clone, Debug)]
pub struct FilterQueryOption {
    pub raw: String,
    pub clause: FilterClause,
    pub context: ODataQueryContext,
}

#[derive(Clone, Debug)]
pub struct OrderByQueryOption {
    pub raw: String,
    pub clause: OrderByClause,
    pub context: ODataQueryContext,
}

#[derive(Clone, Debug)]
pub struct SelectExpandQueryOption {
    pub raw_select: Option<String>,
    pub raw_expand: Option<String>,
    pub clause: SelectExpandClause,
    /// Cap applied by the parser when expanding `$levels=max`; `None` until reconciled.
    pub levels_max_literal_expansion_depth: Option<usize>,
    pub context: ODataQueryContext,
}

#[derive(Clone, Debug)]
pub struct TopQueryOption {
    pub raw: String,
    pub value: u64,
    pub context: ODataQueryContext,
}

#[derive(Clone, Debug)]
pub struct SkipQueryOption {
    pub raw: String,
    pub value: u64,
    pub context: ODataQueryContext,
}

#[derive(Clone, Debug)]
pub struct CountQueryOption {
    pub raw: String,
    pub value: bool,
    pub context: ODataQueryContext,
}

#[derive(Clone, Debug)]
pub struct SkipTokenQueryOption {
    pub raw: String,
    pub context: ODataQueryContext,
}

/// `$compute`, whose clause is parsed lazily upstream.
///
/// `clause` is `None` when no parse was attached and `Some(Err(..))` when
/// the deferred parse failed.
#[derive(Clone, Debug)]
pub struct ComputeQueryOption {
    pub raw: String,
    pub clause: Option<Result<ComputeClause, String>>,
    pub context: ODataQueryContext,
}

#[derive(Clone, Debug)]
pub struct ApplyQueryOption {
    pub raw: String,
    pub clause: Option<ApplyClause>,
    pub context: ODataQueryContext,
}

#[derive(Clone, Debug)]
pub struct SearchQueryOption {
    pub raw: String,
    pub clause: SearchClause,
    pub context: ODataQueryContext,
}

/// Raw option strings exactly as they appeared in the request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawValues {
    pub filter: Option<String>,
    pub order_by: Option<String>,
    pub top: Option<String>,
    pub skip: Option<String>,
    pub select: Option<String>,
    pub expand: Option<String>,
    pub count: Option<String>,
    pub format: Option<String>,
    pub skip_token: Option<String>,
    pub delta_token: Option<String>,
    pub apply: Option<String>,
    pub compute: Option<String>,
    pub search: Option<String>,
}

/// Every parsed option of one request.
#[derive(Clone, Debug)]
pub struct ODataQueryOptions {
    pub context: ODataQueryContext,
    pub raw: RawValues,
    pub filter: Option<FilterQueryOption>,
    pub order_by: Option<OrderByQueryOption>,
    pub select_expand: Option<SelectExpandQueryOption>,
    pub top: Option<TopQueryOption>,
    pub skip: Option<SkipQueryOption>,
    pub count: Option<CountQueryOption>,
    pub skip_token: Option<SkipTokenQueryOption>,
    pub compute: Option<ComputeQueryOption>,
    pub apply: Option<ApplyQueryOption>,
    pub search: Option<SearchQueryOption>,
    /// The request path ends with `/$count`.
    pub is_count_request: bool,
}

impl ODataQueryOptions {
    #[must_use]
    pub fn new(context: ODataQueryContext) -> Self {
        Self {
            context,
            raw: RawValues::default(),
            filter: None,
            order_by: None,
            select_expand: None,
            top: None,
            skip: None,
            count: None,
            skip_token: None,
            compute: None,
            apply: None,
            search: None,
            is_count_request: false,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, raw: &str, clause: FilterClause) -> Self {
        self.raw.filter = Some(raw.to_owned());
        self.filter = Some(FilterQueryOption {
            raw: raw.to_owned(),
            clause,
            context: self.context.clone(),
        });
        self
    }

    #[must_use]
    pub fn with_order_by(mut self, raw: &str, clause: OrderByClause) -> Self {
        self.raw.order_by = Some(raw.to_owned());
        self.order_by = Some(OrderByQueryOption {
            raw: raw.to_owned(),
            clause,
            context: self.context.clone(),
        });
        self
    }

    #[must_use]
    pub fn with_select_expand(
        mut self,
        raw_select: Option<&str>,
        raw_expand: Option<&str>,
        clause: SelectExpandClause,
    ) -> Self {
        self.raw.select = raw_select.map(str::to_owned);
        self.raw.expand = raw_expand.map(str::to_owned);
        self.select_expand = Some(SelectExpandQueryOption {
            raw_select: self.raw.select.clone(),
            raw_expand: self.raw.expand.clone(),
            clause,
            levels_max_literal_expansion_depth: None,
            context: self.context.clone(),
        });
        self
    }

    #[must_use]
    pub fn with_top(mut self, value: u64) -> Self {
        let raw = value.to_string();
        self.raw.top = Some(raw.clone());
        self.top = Some(TopQueryOption {
            raw,
            value,
            context: self.context.clone(),
        });
        self
    }

    #[must_use]
    pub fn with_skip(mut self, value: u64) -> Self {
        let raw = value.to_string();
        self.raw.skip = Some(raw.clone());
        self.skip = Some(SkipQueryOption {
            raw,
            value,
            context: self.context.clone(),
        });
        self
    }

    #[must_use]
    pub fn with_count(mut self, value: bool) -> Self {
        let raw = value.to_string();
        self.raw.count = Some(raw.clone());
        self.count = Some(CountQueryOption {
            raw,
            value,
            context: self.context.clone(),
        });
        self
    }

    #[must_use]
    pub fn with_skip_token(mut self, raw: &str) -> Self {
        self.raw.skip_token = Some(raw.to_owned());
        self.skip_token = Some(SkipTokenQueryOption {
            raw: raw.to_owned(),
            context: self.context.clone(),
        });
        self
    }

    #[must_use]
    pub fn with_compute(mut self, raw: &str, clause: Result<ComputeClause, String>) -> Self {
        self.raw.compute = Some(raw.to_owned());
        self.compute = Some(ComputeQueryOption {
            raw: raw.to_owned(),
            clause: Some(clause),
            context: self.context.clone(),
        });
        self
    }

    #[must_use]
    pub fn with_apply(mut self, raw: &str, clause: Option<ApplyClause>) -> Self {
        self.raw.apply = Some(raw.to_owned());
        self.apply = Some(ApplyQueryOption {
            raw: raw.to_owned(),
            clause,
            context: self.context.clone(),
        });
        self
    }

    #[must_use]
    pub fn with_search(mut self, raw: &str, clause: SearchClause) -> Self {
        self.raw.search = Some(raw.to_owned());
        self.search = Some(SearchQueryOption {
            raw: raw.to_owned(),
            clause,
            context: self.context.clone(),
        });
        self
    }

    #[must_use]
    pub fn with_raw_format(mut self, raw: &str) -> Self {
        self.raw.format = Some(raw.to_owned());
        self
    }

    #[must_use]
    pub fn with_raw_delta_token(mut self, raw: &str) -> Self {
        self.raw.delta_token = Some(raw.to_owned());
        self
    }

    #[must_use]
    pub fn with_count_request(mut self) -> Self {
        self.is_count_request = true;
        self
    }
}
