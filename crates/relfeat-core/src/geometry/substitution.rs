use tracing::debug;

use super::{Geometry, GeometryFactory, GeometryKind};
use crate::name::QName;
use crate::node::{Element, Particle, Property};
use crate::schema::GeometryHierarchy;

/// Turns a geometry-typed element into the geometry it wraps.
///
/// The embedded geometry is promoted to a surface or curve when the element
/// name is registered as such a substitution, stamped with `declared_type`
/// and given the element's other element children as properties. Returns
/// `None` when the element holds no geometry.
pub fn resolve(
    element: &Element,
    declared_type: &QName,
    hierarchy: Option<&GeometryHierarchy>,
    factory: &dyn GeometryFactory,
) -> Option<Geometry> {
    let mut geometry = None;
    let mut properties = Vec::new();

    for child in &element.children {
        match child {
            Particle::Geometry { geometry: g } if geometry.is_none() => geometry = Some(g.as_ref().clone()),
            Particle::Element(e) => properties.push(Property::new(
                e.name.clone(),
                e.attributes.clone(),
                e.children.clone(),
            )),
            other => debug!(element = %element.name, "ignoring particle {:?} inside geometry element", other),
        }
    }

    let mut geometry = geometry?;

    if let Some(h) = hierarchy {
        geometry = match geometry.kind {
            GeometryKind::Polygon { exterior, interiors } if h.surface_substitutions.contains(&element.name) => {
                let mut surface = factory.create_surface(geometry.id, geometry.crs, exterior, interiors);
                surface.declared_type = geometry.declared_type;
                surface.properties = geometry.properties;
                surface
            }
            GeometryKind::LineString { points } if h.curve_substitutions.contains(&element.name) => {
                let mut curve = factory.create_curve(geometry.id, geometry.crs, points);
                curve.declared_type = geometry.declared_type;
                curve.properties = geometry.properties;
                curve
            }
            kind => Geometry { kind, ..geometry },
        };
    }

    geometry.declared_type = Some(declared_type.clone());
    geometry.properties.extend(properties);
    Some(geometry)
}
