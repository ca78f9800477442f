use tracing::debug;

use crate::connection::{Connection, Row};
use crate::convert::ConverterResolver;
use crate::error::{warning, RelfeatError, Result, Warning};
use crate::fetch::fetch;
use crate::geometry::{self, GeometryFactory};
use crate::mapping::{Axis, ElementDeclaration, Mapping, MappingKind};
use crate::name::QName;
use crate::node::{Attributes, Element, Particle};
use crate::plan::ColumnIndex;
use crate::schema::SchemaIntrospector;
use crate::value::PrimitiveValue;

/// Outcome of rebuilding one mapping node.
#[derive(Clone, Debug, PartialEq)]
pub enum Built {
    Present(Particle),
    Absent,
    /// Absent because a nil element could not carry its required
    /// attributes. Only non-voidable compounds produce it, so the enclosing
    /// compound sees an empty non-voidable child and escalates in turn.
    AbsentEscalating,
}

impl Built {
    pub fn into_particle(self) -> Option<Particle> {
        match self {
            Built::Present(p) => Some(p),
            Built::Absent | Built::AbsentEscalating => None,
        }
    }
}

/// Present particles of one mapping, in fetch order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParticleList {
    pub values: Vec<Particle>,
}

impl ParticleList {
    fn push(&mut self, built: Built) {
        if let Some(particle) = built.into_particle() {
            self.values.push(particle);
        }
    }
}

/// Rebuilds particles of one row; recursion follows the mapping tree and
/// crosses joins by issuing follow-up queries.
pub(crate) struct ParticleBuilder<'a> {
    pub conn: &'a dyn Connection,
    pub converters: &'a dyn ConverterResolver,
    pub schema: &'a dyn SchemaIntrospector,
    pub geometry_factory: &'a dyn GeometryFactory,
    pub null_escalation: bool,
}

impl ParticleBuilder<'_> {
    /// Every occurrence of `mapping`. A join-bearing mapping (other than a
    /// feature reference) follows its first join and yields one particle per
    /// joined row, with `_<i>` appended to the id prefix.
    pub fn build_particles(
        &self,
        mapping: &Mapping,
        row: &Row,
        index: &ColumnIndex,
        alias: &str,
        id_prefix: &str,
    ) -> Result<ParticleList> {
        let mut list = ParticleList::default();

        let join = match mapping.first_join() {
            Some(join) if !mapping.is_feature_reference() => join,
            _ => {
                list.push(self.build_particle(mapping, row, index, alias, id_prefix)?);
                return Ok(list);
            }
        };

        let mut rows = fetch(self.conn, self.converters, join, mapping, row, index, alias)?;
        let mut i = 0usize;
        while rows.advance()? {
            let Some(joined_row) = rows.current() else {
                break;
            };
            let built = self.build_particle(
                mapping,
                joined_row,
                rows.column_index(),
                rows.alias(),
                &format!("{id_prefix}_{i}"),
            )?;
            list.push(built);
            i += 1;
        }
        rows.close()?;
        Ok(list)
    }

    pub fn build_particle(
        &self,
        mapping: &Mapping,
        row: &Row,
        index: &ColumnIndex,
        alias: &str,
        id_prefix: &str,
    ) -> Result<Built> {
        debug!(path = %mapping.path, "building particle");

        let built = match &mapping.kind {
            MappingKind::Primitive { .. } | MappingKind::FeatureReference { .. } | MappingKind::Blob { .. } => {
                self.decode(mapping, row, index, alias)?
            }
            MappingKind::Geometry { expression, .. } => {
                if expression.is_column() {
                    match self.decode(mapping, row, index, alias)? {
                        Built::Present(Particle::Geometry { mut geometry }) => {
                            geometry.id = Some(id_prefix.to_string());
                            Built::Present(Particle::Geometry { geometry })
                        }
                        other => other,
                    }
                } else {
                    debug!(path = %mapping.path, "computed geometry expressions are not rebuilt");
                    Built::Absent
                }
            }
            MappingKind::Compound { particles, element } => {
                if self.converters.resolve(mapping).is_some() {
                    self.decode(mapping, row, index, alias)?
                } else {
                    self.assemble(mapping, particles, element.as_ref(), row, index, alias, id_prefix)?
                }
            }
            MappingKind::Expression { .. } => Built::Absent,
        };

        match &built {
            Built::Present(_) => debug!(path = %mapping.path, "built particle"),
            _ => debug!(path = %mapping.path, "particle is absent"),
        }
        Ok(built)
    }

    /// Decodes the converter column of `mapping` from `row`.
    fn decode(&self, mapping: &Mapping, row: &Row, index: &ColumnIndex, alias: &str) -> Result<Built> {
        let Some(converter) = self.converters.resolve(mapping) else {
            warning!(Warning::UnsupportedMapping, path = %mapping.path, "no converter for {}", mapping);
            return Ok(Built::Absent);
        };
        let snippet = converter.select_snippet(alias);
        let position = index.position(&snippet).ok_or_else(|| {
            RelfeatError::reconstruction(
                format!("`{snippet}` for {mapping} is not in the select list"),
                format!("selected: {:?}", index.to_vec()),
            )
        })?;
        let particle = converter
            .to_particle(row, position)
            .map_err(|e| RelfeatError::reconstruction(format!("decoding {mapping} failed"), e))?;
        Ok(particle.map_or(Built::Absent, Built::Present))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        mapping: &Mapping,
        particles: &[Mapping],
        element: Option<&ElementDeclaration>,
        row: &Row,
        index: &ColumnIndex,
        alias: &str,
        id_prefix: &str,
    ) -> Result<Built> {
        let mut attributes = Attributes::new();
        let mut children = Vec::new();
        let mut escalate = false;

        for child in particles {
            let list = self.build_particles(child, row, index, alias, id_prefix)?;

            if self.null_escalation && list.values.is_empty() && !child.voidable {
                escalate = true;
            }

            if let Err(reason) = child.path.check_predicates() {
                warning!(Warning::UnsupportedMapping, path = %child.path, "skipping particle: {}", reason);
                continue;
            }

            match (child.path.axis(), child.path.name()) {
                (Axis::Attribute, Some(name)) => {
                    for value in list.values {
                        match value {
                            Particle::Primitive { value } => {
                                attributes.insert(name.clone(), value);
                            }
                            other => warning!(
                                Warning::UnsupportedMapping,
                                path = %child.path,
                                "value not suitable for an attribute: {:?}",
                                other
                            ),
                        }
                    }
                }
                (Axis::Child, Some(name)) => {
                    for value in list.values {
                        match value {
                            Particle::Primitive { .. } => {
                                children.push(Particle::Element(Element::new(name.clone(), Attributes::new(), vec![value])))
                            }
                            other => children.push(other),
                        }
                    }
                }
                _ => children.extend(list.values),
            }
        }

        let declaration = element.cloned().or_else(|| {
            mapping
                .element_name()
                .and_then(|name| self.schema.element(&name))
        });

        let nilled = attributes
            .get(&QName::xsi_nil())
            .is_some_and(PrimitiveValue::is_true);

        let built = if nilled {
            self.element(mapping, attributes, Vec::new())
        } else if escalate {
            self.escalate(mapping, declaration.as_ref(), attributes)
        } else if !attributes.is_empty() || !children.is_empty() {
            self.element(mapping, attributes, children)
        } else {
            Built::Absent
        };

        Ok(self.substitute_geometry(mapping, built))
    }

    /// A required child is missing: omit, nil, or push the void upwards.
    fn escalate(&self, mapping: &Mapping, declaration: Option<&ElementDeclaration>, attributes: Attributes) -> Built {
        if mapping.voidable {
            debug!(path = %mapping.path, "materializing void by omitting particle");
            return Built::Absent;
        }
        let Some(declaration) = declaration.filter(|d| d.nillable) else {
            return Built::Absent;
        };

        debug!(path = %mapping.path, "materializing void by nilling particle");
        let mut nil_attributes = Attributes::new();
        for required in &declaration.required_attributes {
            match attributes.get(required) {
                Some(value) => {
                    nil_attributes.insert(required.clone(), value.clone());
                }
                None => {
                    warning!(
                        Warning::SchemaViolation,
                        path = %mapping.path,
                        attribute = %required,
                        "required attribute missing, cannot nil the element; escalating void"
                    );
                    return Built::AbsentEscalating;
                }
            }
        }
        nil_attributes.insert(QName::xsi_nil(), PrimitiveValue::boolean(true));
        self.element(mapping, nil_attributes, Vec::new())
    }

    fn element(&self, mapping: &Mapping, attributes: Attributes, children: Vec<Particle>) -> Built {
        match mapping.element_name() {
            Some(name) => Built::Present(Particle::Element(Element::new(name, attributes, children))),
            None => {
                warning!(Warning::UnsupportedMapping, path = %mapping.path, "no element name for {}", mapping);
                Built::Absent
            }
        }
    }

    /// Elements the schema declares as geometries become the geometry they wrap.
    fn substitute_geometry(&self, mapping: &Mapping, built: Built) -> Built {
        let Built::Present(Particle::Element(element)) = built else {
            return built;
        };
        if element.is_nil() {
            return Built::Present(Particle::Element(element));
        }
        let Some(declared_type) = self.schema.geometry_type(&element.name) else {
            return Built::Present(Particle::Element(element));
        };
        match geometry::resolve(
            &element,
            &declared_type,
            self.schema.geometry_hierarchy(),
            self.geometry_factory,
        ) {
            Some(g) => Built::Present(Particle::geometry(g)),
            None => {
                warning!(
                    Warning::UnsupportedMapping,
                    path = %mapping.path,
                    "geometry element {} holds no geometry",
                    element.name
                );
                Built::Absent
            }
        }
    }
}
