//! Reconstructed document tree.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::geometry::Geometry;
use crate::name::QName;
use crate::value::PrimitiveValue;

pub type Attributes = BTreeMap<QName, PrimitiveValue>;

/// One reconstructed unit of document content.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Particle {
    Primitive { value: PrimitiveValue },
    Geometry { geometry: Box<Geometry> },
    Element(Element),
    Feature(FeatureReference),
}

impl Particle {
    pub fn primitive(value: PrimitiveValue) -> Self {
        Particle::Primitive { value }
    }

    pub fn geometry(geometry: Geometry) -> Self {
        Particle::Geometry {
            geometry: Box::new(geometry),
        }
    }

    pub fn as_primitive(&self) -> Option<&PrimitiveValue> {
        match self {
            Particle::Primitive { value } => Some(value),
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Particle::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_geometry(&self) -> Option<&Geometry> {
        match self {
            Particle::Geometry { geometry } => Some(geometry),
            _ => None,
        }
    }
}

impl From<PrimitiveValue> for Particle {
    fn from(value: PrimitiveValue) -> Self {
        Particle::primitive(value)
    }
}

impl From<Element> for Particle {
    fn from(element: Element) -> Self {
        Particle::Element(element)
    }
}

/// A generic XML-like element.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Element {
    pub name: QName,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Particle>,
}

impl Element {
    pub fn new(name: QName, attributes: Attributes, children: Vec<Particle>) -> Self {
        Self {
            name,
            attributes,
            children,
        }
    }

    /// `true` when the element carries `xsi:nil="true"`.
    pub fn is_nil(&self) -> bool {
        self.attributes
            .get(&QName::xsi_nil())
            .map(PrimitiveValue::is_true)
            .unwrap_or(false)
    }
}

/// Link to another feature, optionally already resolved.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeatureReference {
    pub href: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<Arc<Feature>>,
}

impl FeatureReference {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            resolved: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Property {
    pub name: QName,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Particle>,
}

impl Property {
    pub fn new(name: QName, attributes: Attributes, children: Vec<Particle>) -> Self {
        Self {
            name,
            attributes,
            children,
        }
    }

    /// Property holding a single particle.
    pub fn with_value(name: QName, value: Particle) -> Self {
        Self::new(name, Attributes::new(), vec![value])
    }

    /// `<name xsi:nil="true"/>`
    pub fn nil(name: QName) -> Self {
        let mut attributes = Attributes::new();
        attributes.insert(QName::xsi_nil(), PrimitiveValue::boolean(true));
        Self::new(name, attributes, Vec::new())
    }

    pub fn is_nil(&self) -> bool {
        self.attributes
            .get(&QName::xsi_nil())
            .map(PrimitiveValue::is_true)
            .unwrap_or(false)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Feature {
    pub id: String,
    pub type_name: QName,
    pub properties: Vec<Property>,
}

impl Feature {
    pub fn new(id: impl Into<String>, type_name: QName, properties: Vec<Property>) -> Self {
        Self {
            id: id.into(),
            type_name,
            properties,
        }
    }

    /// All properties with the given name, in document order.
    pub fn properties_named<'a>(&'a self, name: &QName) -> impl Iterator<Item = &'a Property> + 'a {
        let name = name.clone();
        self.properties.iter().filter(move |p| p.name == name)
    }
}

/// Features of several types rebuilt from one row, in member order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeatureTuple {
    pub features: Vec<Arc<Feature>>,
}

impl FeatureTuple {
    pub fn new(features: Vec<Arc<Feature>>) -> Self {
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.id.as_str())
    }
}
