//! Property-policy resolution: is a property filterable, sortable,
//! selectable, expandable, navigable or countable at a given position?
//!
//! Facts are derived on demand from the legacy restriction annotation, the
//! model-bound [`QuerySettings`] and the global [`DefaultQuerySettings`].
//! Precedence, strongest first:
//! 1. legacy restriction on the property
//! 2. per-name configuration in the effective settings
//! 3. type-level default in the effective settings
//! 4. global default
//!
//! The effective settings at a position merge the type-level settings along
//! the base-type chain (derived wins) and then the settings of the property
//! the position was reached through (property wins).

use crate::edm::{
    DefaultQuerySettings, EdmModel, EdmProperty, EdmStructuredType, ExpandConfiguration,
    QuerySettings, SelectExpandType,
};

#[derive(Clone, Copy)]
pub struct PropertyPolicy<'a> {
    model: &'a EdmModel,
    defaults: &'a DefaultQuerySettings,
}

fn decide(explicit: Option<bool>, type_default: Option<bool>, global: bool) -> bool {
    explicit.or(type_default).unwrap_or(global)
}

fn select_enabled(select_type: SelectExpandType) -> bool {
    select_type != SelectExpandType::Disabled
}

impl<'a> PropertyPolicy<'a> {
    #[must_use]
    pub fn new(model: &'a EdmModel, defaults: &'a DefaultQuerySettings) -> Self {
        Self { model, defaults }
    }

    #[must_use]
    pub fn defaults(&self) -> &'a DefaultQuerySettings {
        self.defaults
    }

    /// Settings in force at (`path_property`, `path_type`).
    #[must_use]
    pub fn effective_settings(
        &self,
        path_property: Option<&EdmProperty>,
        path_type: &EdmStructuredType,
    ) -> QuerySettings {
        let hierarchy: Vec<_> = self.model.type_hierarchy(path_type).collect();
        let type_settings = hierarchy
            .into_iter()
            .rev()
            .filter_map(EdmStructuredType::query_settings)
            .fold(QuerySettings::default(), |base, derived| derived.merged_over(&base));

        match path_property.and_then(EdmProperty::query_settings) {
            Some(property_settings) => property_settings.merged_over(&type_settings),
            None => type_settings,
        }
    }

    #[must_use]
    pub fn is_not_filterable(
        &self,
        property: &EdmProperty,
        path_property: Option<&EdmProperty>,
        path_type: &EdmStructuredType,
    ) -> bool {
        if property.restrictions().not_filterable {
            return true;
        }
        let settings = self.effective_settings(path_property, path_type);
        !decide(
            settings.filter_configurations.get(property.name()).copied(),
            settings.default_enable_filter,
            self.defaults.enable_filter,
        )
    }

    #[must_use]
    pub fn is_not_sortable(
        &self,
        property: &EdmProperty,
        path_property: Option<&EdmProperty>,
        path_type: &EdmStructuredType,
    ) -> bool {
        if property.restrictions().not_sortable {
            return true;
        }
        let settings = self.effective_settings(path_property, path_type);
        !decide(
            settings.order_by_configurations.get(property.name()).copied(),
            settings.default_enable_order_by,
            self.defaults.enable_order_by,
        )
    }

    #[must_use]
    pub fn is_not_selectable(
        &self,
        property: &EdmProperty,
        path_property: Option<&EdmProperty>,
        path_type: &EdmStructuredType,
    ) -> bool {
        let settings = self.effective_settings(path_property, path_type);
        !decide(
            settings
                .select_configurations
                .get(property.name())
                .copied()
                .map(select_enabled),
            settings.default_select_type.map(select_enabled),
            self.defaults.enable_select,
        )
    }

    /// Legacy annotation only; navigability has no model-bound setting.
    #[must_use]
    pub fn is_not_navigable(&self, property: &EdmProperty) -> bool {
        property.restrictions().not_navigable
    }

    /// Legacy annotation only; see [`Self::expand_configuration`] for model-bound expand.
    #[must_use]
    pub fn is_not_expandable(&self, property: &EdmProperty) -> bool {
        property.restrictions().not_expandable
    }

    /// Countability of a collection property reached at (`path_property`, `path_type`).
    #[must_use]
    pub fn is_not_countable(
        &self,
        property: &EdmProperty,
        path_property: Option<&EdmProperty>,
        path_type: &EdmStructuredType,
    ) -> bool {
        if property.restrictions().not_countable {
            return true;
        }
        // a navigation target type can carry its own countable setting
        let target_settings = self
            .model
            .target_type(property)
            .map(|target| self.effective_settings(Some(property), target));
        let settings = self.effective_settings(path_property, path_type);
        let countable = target_settings
            .and_then(|s| s.countable)
            .or(property.query_settings().and_then(|s| s.countable))
            .or(settings.countable);
        !countable.unwrap_or(self.defaults.enable_count)
    }

    /// Countability of the entity set rooted at `element_type`.
    #[must_use]
    pub fn is_entity_set_not_countable(&self, element_type: &EdmStructuredType) -> bool {
        let settings = self.effective_settings(None, element_type);
        !settings.countable.unwrap_or(self.defaults.enable_count)
    }

    /// Model-bound expand configuration of `navigation` at (`path_property`, `path_type`).
    #[must_use]
    pub fn expand_configuration(
        &self,
        navigation: &EdmProperty,
        path_property: Option<&EdmProperty>,
        path_type: &EdmStructuredType,
    ) -> Option<ExpandConfiguration> {
        self.effective_settings(path_property, path_type)
            .expand_configuration(navigation.name())
    }

    /// Model-bound `$top` ceiling, falling back to the global default.
    #[must_use]
    pub fn max_top(
        &self,
        path_property: Option<&EdmProperty>,
        path_type: &EdmStructuredType,
    ) -> Option<u64> {
        self.effective_settings(path_property, path_type)
            .max_top
            .filter(|max| *max > 0)
            .or(self.defaults.max_top)
    }
}
