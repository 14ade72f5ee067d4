//! Minimal Entity Data Model consumed by the validators.
//!
//! The model carries exactly what query validation needs: structured types
//! (entity and complex), their properties, navigation properties, the legacy
//! per-property restriction annotation and the model-bound query settings
//! that can be attached to types and to properties.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructuredTypeKind {
    Entity,
    Complex,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertyKind {
    /// Primitive or enum value (`Edm.String`, `Edm.Int32`, ...)
    Primitive { type_name: String, collection: bool },
    /// Structural property typed by a complex type
    Complex { type_name: String, collection: bool },
    /// Navigation to an entity type
    Navigation { target: String, collection: bool },
}

/// Legacy per-property restriction annotation.
#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryRestrictions {
    pub not_filterable: bool,
    pub not_sortable: bool,
    pub not_navigable: bool,
    pub not_expandable: bool,
    pub not_countable: bool,
}

impl QueryRestrictions {
    #[must_use]
    pub fn not_filterable() -> Self {
        Self {
            not_filterable: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn not_sortable() -> Self {
        Self {
            not_sortable: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn not_navigable() -> Self {
        Self {
            not_navigable: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn not_expandable() -> Self {
        Self {
            not_expandable: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn not_countable() -> Self {
        Self {
            not_countable: true,
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectExpandType {
    Disabled,
    Allowed,
    Automatic,
}

/// Per-navigation expand policy. `max_depth = 0` leaves the depth unbounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpandConfiguration {
    pub expand_type: SelectExpandType,
    #[serde(default)]
    pub max_depth: usize,
}

impl ExpandConfiguration {
    #[must_use]
    pub fn allowed(max_depth: usize) -> Self {
        Self {
            expand_type: SelectExpandType::Allowed,
            max_depth,
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            expand_type: SelectExpandType::Disabled,
            max_depth: 0,
        }
    }
}

/// Depth applied to expand configurations synthesized from `default_expand_type`.
pub const DEFAULT_EXPAND_MAX_DEPTH: usize = 2;

/// Model-bound query settings attachable to a structured type or a property.
///
/// Every field is optional so that settings can be layered: derived types
/// override base types and property-level settings override type-level ones.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuerySettings {
    pub countable: Option<bool>,
    pub max_top: Option<u64>,
    pub default_expand_type: Option<SelectExpandType>,
    pub default_max_depth: Option<usize>,
    pub expand_configurations: BTreeMap<String, ExpandConfiguration>,
    pub default_enable_filter: Option<bool>,
    pub filter_configurations: BTreeMap<String, bool>,
    pub default_enable_order_by: Option<bool>,
    pub order_by_configurations: BTreeMap<String, bool>,
    pub default_select_type: Option<SelectExpandType>,
    pub select_configurations: BTreeMap<String, SelectExpandType>,
}

impl QuerySettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_countable(mut self, countable: bool) -> Self {
        self.countable = Some(countable);
        self
    }

    #[must_use]
    pub fn with_max_top(mut self, max_top: u64) -> Self {
        self.max_top = Some(max_top);
        self
    }

    #[must_use]
    pub fn with_default_expand(mut self, expand_type: SelectExpandType, max_depth: usize) -> Self {
        self.default_expand_type = Some(expand_type);
        self.default_max_depth = Some(max_depth);
        self
    }

    #[must_use]
    pub fn with_expand(mut self, property: &str, configuration: ExpandConfiguration) -> Self {
        self.expand_configurations
            .insert(property.to_owned(), configuration);
        self
    }

    #[must_use]
    pub fn with_default_filter(mut self, enabled: bool) -> Self {
        self.default_enable_filter = Some(enabled);
        self
    }

    #[must_use]
    pub fn with_filter(mut self, property: &str, enabled: bool) -> Self {
        self.filter_configurations.insert(property.to_owned(), enabled);
        self
    }

    #[must_use]
    pub fn with_default_order_by(mut self, enabled: bool) -> Self {
        self.default_enable_order_by = Some(enabled);
        self
    }

    #[must_use]
    pub fn with_order_by(mut self, property: &str, enabled: bool) -> Self {
        self.order_by_configurations
            .insert(property.to_owned(), enabled);
        self
    }

    #[must_use]
    pub fn with_default_select(mut self, select_type: SelectExpandType) -> Self {
        self.default_select_type = Some(select_type);
        self
    }

    #[must_use]
    pub fn with_select(mut self, property: &str, select_type: SelectExpandType) -> Self {
        self.select_configurations
            .insert(property.to_owned(), select_type);
        self
    }

    /// Layer `self` over `base`: values present in `self` win.
    #[must_use]
    pub fn merged_over(&self, base: &QuerySettings) -> QuerySettings {
        fn layer<V: Clone>(
            top: &BTreeMap<String, V>,
            base: &BTreeMap<String, V>,
        ) -> BTreeMap<String, V> {
            let mut merged = base.clone();
            merged.extend(top.iter().map(|(k, v)| (k.clone(), v.clone())));
            merged
        }

        QuerySettings {
            countable: self.countable.or(base.countable),
            max_top: self.max_top.or(base.max_top),
            default_expand_type: self.default_expand_type.or(base.default_expand_type),
            default_max_depth: self.default_max_depth.or(base.default_max_depth),
            expand_configurations: layer(&self.expand_configurations, &base.expand_configurations),
            default_enable_filter: self.default_enable_filter.or(base.default_enable_filter),
            filter_configurations: layer(&self.filter_configurations, &base.filter_configurations),
            default_enable_order_by: self.default_enable_order_by.or(base.default_enable_order_by),
            order_by_configurations: layer(
                &self.order_by_configurations,
                &base.order_by_configurations,
            ),
            default_select_type: self.default_select_type.or(base.default_select_type),
            select_configurations: layer(&self.select_configurations, &base.select_configurations),
        }
    }

    /// Effective expand configuration for `property`, if the property is expandable.
    #[must_use]
    pub fn expand_configuration(&self, property: &str) -> Option<ExpandConfiguration> {
        if let Some(configuration) = self.expand_configurations.get(property) {
            return Some(*configuration);
        }
        self.default_expand_type.map(|expand_type| ExpandConfiguration {
            expand_type,
            max_depth: self.default_max_depth.unwrap_or(DEFAULT_EXPAND_MAX_DEPTH),
        })
    }
}

/// Global defaults that apply when no model-bound setting decides.
#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefaultQuerySettings {
    pub enable_filter: bool,
    pub enable_order_by: bool,
    pub enable_select: bool,
    pub enable_expand: bool,
    pub enable_count: bool,
    pub enable_skip_token: bool,
    pub max_top: Option<u64>,
}

impl Default for DefaultQuerySettings {
    fn default() -> Self {
        Self {
            enable_filter: true,
            enable_order_by: true,
            enable_select: true,
            enable_expand: true,
            enable_count: true,
            enable_skip_token: true,
            max_top: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdmProperty {
    name: String,
    declaring_type: String,
    kind: PropertyKind,
    restrictions: QueryRestrictions,
    query_settings: Option<QuerySettings>,
}

impl EdmProperty {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Qualified name of the type declaring this property.
    #[must_use]
    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    #[must_use]
    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    #[must_use]
    pub fn restrictions(&self) -> QueryRestrictions {
        self.restrictions
    }

    #[must_use]
    pub fn query_settings(&self) -> Option<&QuerySettings> {
        self.query_settings.as_ref()
    }

    #[must_use]
    pub fn is_navigation(&self) -> bool {
        matches!(self.kind, PropertyKind::Navigation { .. })
    }

    #[must_use]
    pub fn is_collection(&self) -> bool {
        match &self.kind {
            PropertyKind::Primitive { collection, .. }
            | PropertyKind::Complex { collection, .. }
            | PropertyKind::Navigation { collection, .. } => *collection,
        }
    }

    /// Name of the structured type this property leads to (complex type or navigation target).
    #[must_use]
    pub fn structured_type_name(&self) -> Option<&str> {
        match &self.kind {
            PropertyKind::Primitive { .. } => None,
            PropertyKind::Complex { type_name, .. } => Some(type_name),
            PropertyKind::Navigation { target, .. } => Some(target),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EdmStructuredType {
    name: String,
    kind: StructuredTypeKind,
    base_type: Option<String>,
    properties: Vec<Arc<EdmProperty>>,
    query_settings: Option<QuerySettings>,
}

impl EdmStructuredType {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> StructuredTypeKind {
        self.kind
    }

    #[must_use]
    pub fn base_type(&self) -> Option<&str> {
        self.base_type.as_deref()
    }

    /// Properties declared directly on this type.
    #[must_use]
    pub fn declared_properties(&self) -> &[Arc<EdmProperty>] {
        &self.properties
    }

    #[must_use]
    pub fn query_settings(&self) -> Option<&QuerySettings> {
        self.query_settings.as_ref()
    }

    fn declared_property(&self, name: &str) -> Option<&Arc<EdmProperty>> {
        self.properties.iter().find(|p| p.name == name)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("duplicate structured type '{0}'")]
    DuplicateType(String),
    #[error("duplicate property '{property}' on type '{type_name}'")]
    DuplicateProperty { type_name: String, property: String },
    #[error("type '{type_name}' references unknown type '{referenced}'")]
    UnknownType {
        type_name: String,
        referenced: String,
    },
    #[error("type '{type_name}' has no property '{property}'")]
    UnknownProperty { type_name: String, property: String },
    #[error("inheritance cycle through type '{0}'")]
    InheritanceCycle(String),
}

/// Read-only model shared by every validation.
#[derive(Clone, Debug, Default)]
pub struct EdmModel {
    types: HashMap<String, Arc<EdmStructuredType>>,
}

impl EdmModel {
    #[must_use]
    pub fn builder() -> EdmModelBuilder {
        EdmModelBuilder::default()
    }

    #[must_use]
    pub fn structured_type(&self, name: &str) -> Option<&Arc<EdmStructuredType>> {
        self.types.get(name)
    }

    /// The type followed by its base types, most derived first.
    pub fn type_hierarchy<'a>(
        &'a self,
        structured_type: &'a EdmStructuredType,
    ) -> impl Iterator<Item = &'a EdmStructuredType> + 'a {
        std::iter::successors(Some(structured_type), move |current| {
            current
                .base_type
                .as_deref()
                .and_then(|base| self.types.get(base))
                .map(AsRef::as_ref)
        })
        // the builder rejects cycles; the bound only protects hand-built models
        .take(self.types.len().max(1))
    }

    /// Find a property on `type_name` or any of its base types.
    #[must_use]
    pub fn find_property(&self, type_name: &str, property: &str) -> Option<Arc<EdmProperty>> {
        let structured_type = self.types.get(type_name)?;
        self.type_hierarchy(structured_type)
            .find_map(|t| t.declared_property(property))
            .cloned()
    }

    /// All non-navigation properties visible on the type, base-type properties first.
    #[must_use]
    pub fn structural_properties(&self, structured_type: &EdmStructuredType) -> Vec<Arc<EdmProperty>> {
        let hierarchy: Vec<_> = self.type_hierarchy(structured_type).collect();
        hierarchy
            .into_iter()
            .rev()
            .flat_map(|t| t.properties.iter())
            .filter(|p| !p.is_navigation())
            .cloned()
            .collect()
    }

    /// The structured type a property leads to, if any.
    #[must_use]
    pub fn target_type(&self, property: &EdmProperty) -> Option<&Arc<EdmStructuredType>> {
        property
            .structured_type_name()
            .and_then(|name| self.types.get(name))
    }
}

#[derive(Default)]
#[must_use]
pub struct EdmModelBuilder {
    types: Vec<StructuredTypeBuilder>,
}

impl EdmModelBuilder {
    pub fn with_type(mut self, structured_type: StructuredTypeBuilder) -> Self {
        self.types.push(structured_type);
        self
    }

    /// Build the model, checking that every referenced type exists and that
    /// inheritance is acyclic.
    ///
    /// # Errors
    /// Returns `ModelError` describing the first inconsistency found.
    pub fn build(self) -> Result<EdmModel, ModelError> {
        let mut types: HashMap<String, Arc<EdmStructuredType>> = HashMap::new();
        for builder in self.types {
            let structured_type = builder.finish()?;
            let name = structured_type.name.clone();
            if types.insert(name.clone(), Arc::new(structured_type)).is_some() {
                return Err(ModelError::DuplicateType(name));
            }
        }

        for structured_type in types.values() {
            let referenced = structured_type.base_type.iter().map(String::as_str).chain(
                structured_type
                    .properties
                    .iter()
                    .filter_map(|p| match &p.kind {
                        PropertyKind::Primitive { .. } => None,
                        PropertyKind::Complex { type_name, .. } => Some(type_name.as_str()),
                        PropertyKind::Navigation { target, .. } => Some(target.as_str()),
                    }),
            );
            for name in referenced {
                if !types.contains_key(name) {
                    return Err(ModelError::UnknownType {
                        type_name: structured_type.name.clone(),
                        referenced: name.to_owned(),
                    });
                }
            }

            let mut seen = HashSet::new();
            let mut current = Some(structured_type.as_ref());
            while let Some(t) = current {
                if !seen.insert(t.name.as_str()) {
                    return Err(ModelError::InheritanceCycle(structured_type.name.clone()));
                }
                current = t.base_type.as_deref().and_then(|b| types.get(b)).map(AsRef::as_ref);
            }
        }

        Ok(EdmModel { types })
    }
}

/// Fluent description of one structured type.
#[must_use]
pub struct StructuredTypeBuilder {
    name: String,
    kind: StructuredTypeKind,
    base_type: Option<String>,
    properties: Vec<(String, PropertyKind)>,
    restrictions: Vec<(String, QueryRestrictions)>,
    property_settings: Vec<(String, QuerySettings)>,
    query_settings: Option<QuerySettings>,
}

impl StructuredTypeBuilder {
    pub fn entity(name: impl Into<String>) -> Self {
        Self::new(name.into(), StructuredTypeKind::Entity)
    }

    pub fn complex(name: impl Into<String>) -> Self {
        Self::new(name.into(), StructuredTypeKind::Complex)
    }

    fn new(name: String, kind: StructuredTypeKind) -> Self {
        Self {
            name,
            kind,
            base_type: None,
            properties: Vec::new(),
            restrictions: Vec::new(),
            property_settings: Vec::new(),
            query_settings: None,
        }
    }

    pub fn derives_from(mut self, base: impl Into<String>) -> Self {
        self.base_type = Some(base.into());
        self
    }

    pub fn property(self, name: &str, type_name: &str) -> Self {
        self.with_property(
            name,
            PropertyKind::Primitive {
                type_name: type_name.to_owned(),
                collection: false,
            },
        )
    }

    pub fn collection_property(self, name: &str, type_name: &str) -> Self {
        self.with_property(
            name,
            PropertyKind::Primitive {
                type_name: type_name.to_owned(),
                collection: true,
            },
        )
    }

    pub fn complex_property(self, name: &str, type_name: &str) -> Self {
        self.with_property(
            name,
            PropertyKind::Complex {
                type_name: type_name.to_owned(),
                collection: false,
            },
        )
    }

    pub fn complex_collection(self, name: &str, type_name: &str) -> Self {
        self.with_property(
            name,
            PropertyKind::Complex {
                type_name: type_name.to_owned(),
                collection: true,
            },
        )
    }

    pub fn navigation(self, name: &str, target: &str) -> Self {
        self.with_property(
            name,
            PropertyKind::Navigation {
                target: target.to_owned(),
                collection: false,
            },
        )
    }

    pub fn collection_navigation(self, name: &str, target: &str) -> Self {
        self.with_property(
            name,
            PropertyKind::Navigation {
                target: target.to_owned(),
                collection: true,
            },
        )
    }

    /// Attach the legacy restriction annotation to a declared property.
    pub fn restrict(mut self, property: &str, restrictions: QueryRestrictions) -> Self {
        self.restrictions.push((property.to_owned(), restrictions));
        self
    }

    /// Attach model-bound settings to a declared (navigation or complex) property.
    pub fn property_settings(mut self, property: &str, settings: QuerySettings) -> Self {
        self.property_settings.push((property.to_owned(), settings));
        self
    }

    /// Attach model-bound settings to the type itself.
    pub fn settings(mut self, settings: QuerySettings) -> Self {
        self.query_settings = Some(settings);
        self
    }

    fn with_property(mut self, name: &str, kind: PropertyKind) -> Self {
        self.properties.push((name.to_owned(), kind));
        self
    }

    fn finish(self) -> Result<EdmStructuredType, ModelError> {
        let mut properties: Vec<EdmProperty> = Vec::with_capacity(self.properties.len());
        for (name, kind) in self.properties {
            if properties.iter().any(|p| p.name == name) {
                return Err(ModelError::DuplicateProperty {
                    type_name: self.name,
                    property: name,
                });
            }
            properties.push(EdmProperty {
                name,
                declaring_type: self.name.clone(),
                kind,
                restrictions: QueryRestrictions::default(),
                query_settings: None,
            });
        }

        for (name, restrictions) in self.restrictions {
            let property = properties.iter_mut().find(|p| p.name == name).ok_or_else(|| {
                ModelError::UnknownProperty {
                    type_name: self.name.clone(),
                    property: name.clone(),
                }
            })?;
            property.restrictions = restrictions;
        }

        for (name, settings) in self.property_settings {
            let property = properties.iter_mut().find(|p| p.name == name).ok_or_else(|| {
                ModelError::UnknownProperty {
                    type_name: self.name.clone(),
                    property: name.clone(),
                }
            })?;
            property.query_settings = Some(settings);
        }

        Ok(EdmStructuredType {
            name: self.name,
            kind: self.kind,
            base_type: self.base_type,
            properties: properties.into_iter().map(Arc::new).collect(),
            query_settings: self.query_settings,
        })
    }
}
