//! What the reconstructor needs to know about the application schema.

use std::collections::{HashMap, HashSet};

use crate::mapping::ElementDeclaration;
use crate::name::QName;

/// Occurrence and nillability of a feature property.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PropertyDeclaration {
    pub min_occurs: u32,
    pub nillable: bool,
}

/// Element names that the schema substitutes for the general surface and
/// curve types.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeometryHierarchy {
    pub surface_substitutions: HashSet<QName>,
    pub curve_substitutions: HashSet<QName>,
}

pub trait SchemaIntrospector: Send + Sync {
    /// Declaration of a (non-feature) element.
    fn element(&self, name: &QName) -> Option<ElementDeclaration>;

    /// Declaration of a property of a feature type.
    fn property(&self, feature_type: &QName, name: &QName) -> Option<PropertyDeclaration>;

    /// The schema geometry type when `name` is a geometry element.
    fn geometry_type(&self, name: &QName) -> Option<QName>;

    fn geometry_hierarchy(&self) -> Option<&GeometryHierarchy>;
}

/// In-memory schema, filled through its builder methods.
#[derive(Clone, Debug, Default)]
pub struct StaticSchema {
    elements: HashMap<QName, ElementDeclaration>,
    properties: HashMap<(QName, QName), PropertyDeclaration>,
    geometry_types: HashMap<QName, QName>,
    hierarchy: Option<GeometryHierarchy>,
}

impl StaticSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(mut self, decl: ElementDeclaration) -> Self {
        if let Some(name) = decl.name.clone() {
            self.elements.insert(name, decl);
        }
        self
    }

    pub fn with_property(mut self, feature_type: QName, name: QName, decl: PropertyDeclaration) -> Self {
        self.properties.insert((feature_type, name), decl);
        self
    }

    pub fn with_geometry_element(mut self, name: QName, geometry_type: QName) -> Self {
        self.geometry_types.insert(name, geometry_type);
        self
    }

    pub fn with_surface_substitution(mut self, name: QName) -> Self {
        self.hierarchy
            .get_or_insert_with(Default::default)
            .surface_substitutions
            .insert(name);
        self
    }

    pub fn with_curve_substitution(mut self, name: QName) -> Self {
        self.hierarchy
            .get_or_insert_with(Default::default)
            .curve_substitutions
            .insert(name);
        self
    }
}

impl SchemaIntrospector for StaticSchema {
    fn element(&self, name: &QName) -> Option<ElementDeclaration> {
        self.elements.get(name).cloned()
    }

    fn property(&self, feature_type: &QName, name: &QName) -> Option<PropertyDeclaration> {
        self.properties.get(&(feature_type.clone(), name.clone())).copied()
    }

    fn geometry_type(&self, name: &QName) -> Option<QName> {
        self.geometry_types.get(name).cloned()
    }

    fn geometry_hierarchy(&self) -> Option<&GeometryHierarchy> {
        self.hierarchy.as_ref()
    }
}
