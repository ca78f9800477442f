//! Minimal geometry model: enough to carry decoded geometries through the
//! document tree and to promote them along the schema substitution hierarchy.

mod substitution;

use serde::Serialize;

use crate::name::QName;
use crate::node::Property;

pub use substitution::resolve;

pub type Coordinate = Vec<f64>;
pub type Ring = Vec<Coordinate>;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeometryKind {
    Point { coordinate: Coordinate },
    LineString { points: Vec<Coordinate> },
    Polygon { exterior: Ring, interiors: Vec<Ring> },
    Surface { patches: Vec<SurfacePatch> },
    Curve { segments: Vec<CurveSegment> },
    Multi { members: Vec<Geometry> },
}

impl GeometryKind {
    pub fn name(&self) -> &'static str {
        match self {
            GeometryKind::Point { .. } => "Point",
            GeometryKind::LineString { .. } => "LineString",
            GeometryKind::Polygon { .. } => "Polygon",
            GeometryKind::Surface { .. } => "Surface",
            GeometryKind::Curve { .. } => "Curve",
            GeometryKind::Multi { .. } => "Multi",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SurfacePatch {
    pub exterior: Ring,
    pub interiors: Vec<Ring>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CurveSegment {
    pub points: Vec<Coordinate>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Geometry {
    pub id: Option<String>,
    pub crs: Option<String>,
    pub kind: GeometryKind,
    /// Geometry type declared by the application schema, once resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<QName>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Property>,
}

impl Geometry {
    pub fn new(kind: GeometryKind, crs: Option<String>) -> Self {
        Self {
            id: None,
            crs,
            kind,
            declared_type: None,
            properties: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Builds the promoted geometry forms.
pub trait GeometryFactory: Send + Sync {
    /// One-patch surface from a polygon's rings.
    fn create_surface(
        &self,
        id: Option<String>,
        crs: Option<String>,
        exterior: Ring,
        interiors: Vec<Ring>,
    ) -> Geometry;

    /// One-segment curve from a line string's control points.
    fn create_curve(&self, id: Option<String>, crs: Option<String>, points: Vec<Coordinate>) -> Geometry;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultGeometryFactory;

impl GeometryFactory for DefaultGeometryFactory {
    fn create_surface(
        &self,
        id: Option<String>,
        crs: Option<String>,
        exterior: Ring,
        interiors: Vec<Ring>,
    ) -> Geometry {
        Geometry {
            id,
            crs,
            kind: GeometryKind::Surface {
                patches: vec![SurfacePatch { exterior, interiors }],
            },
            declared_type: None,
            properties: Vec::new(),
        }
    }

    fn create_curve(&self, id: Option<String>, crs: Option<String>, points: Vec<Coordinate>) -> Geometry {
        Geometry {
            id,
            crs,
            kind: GeometryKind::Curve {
                segments: vec![CurveSegment { points }],
            },
            declared_type: None,
            properties: Vec::new(),
        }
    }
}
