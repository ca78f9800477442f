//! Select-list planning: which expressions a query level must fetch and at
//! which position each one lands.

use indexmap::IndexSet;

use crate::convert::ConverterResolver;
use crate::error::{warning, Warning};
use crate::mapping::{FeatureTypeMapping, Mapping, MappingKind};
use crate::sql::qualify;

/// Ordered, duplicate-free select list of one query level.
///
/// Positions are 1-based, matching [`Row::get`](crate::connection::Row::get).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColumnIndex {
    columns: IndexSet<String>,
}

impl ColumnIndex {
    pub fn position(&self, expression: &str) -> Option<usize> {
        self.columns.get_index_of(expression).map(|i| i + 1)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.columns.iter().cloned().collect()
    }
}

impl FromIterator<String> for ColumnIndex {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

/// Columns needed to rebuild `mapping` at the level aliased `alias`.
///
/// With `crossing_join` the node's own join has just been followed, so its
/// contribution comes from the joined table. Otherwise a join-bearing node
/// only contributes the key columns its first join starts from.
pub fn plan(mapping: &Mapping, alias: &str, crossing_join: bool, converters: &dyn ConverterResolver) -> ColumnIndex {
    let mut columns = IndexSet::new();
    add_select_columns(mapping, alias, crossing_join, converters, &mut columns);
    ColumnIndex { columns }
}

/// Fid columns of the feature type followed by what its root mappings need.
pub fn initial_select_list(ft: &FeatureTypeMapping, alias: &str, converters: &dyn ConverterResolver) -> ColumnIndex {
    let mut columns = IndexSet::new();
    add_feature_type_columns(ft, alias, converters, &mut columns);
    tracing::debug!(feature_type = %ft.name, columns = ?columns, "initial select list");
    ColumnIndex { columns }
}

/// Select list of a row carrying several feature types, each under its own
/// alias. Lists are concatenated in member order; shared expressions keep
/// their first position.
pub fn combined_select_list<'m, I>(members: I, converters: &dyn ConverterResolver) -> ColumnIndex
where
    I: IntoIterator<Item = (&'m FeatureTypeMapping, &'m str)>,
{
    let mut columns = IndexSet::new();
    for (ft, alias) in members {
        add_feature_type_columns(ft, alias, converters, &mut columns);
    }
    tracing::debug!(columns = ?columns, "combined select list");
    ColumnIndex { columns }
}

fn add_feature_type_columns(
    ft: &FeatureTypeMapping,
    alias: &str,
    converters: &dyn ConverterResolver,
    columns: &mut IndexSet<String>,
) {
    columns.extend(ft.fid.columns().iter().map(|(col, _)| qualify(alias, col)));
    for mapping in &ft.mappings {
        add_select_columns(mapping, alias, false, converters, columns);
    }
}

fn add_select_columns(
    mapping: &Mapping,
    alias: &str,
    crossing_join: bool,
    converters: &dyn ConverterResolver,
    columns: &mut IndexSet<String>,
) {
    if !crossing_join {
        if let Some(join) = mapping.first_join() {
            if mapping.is_feature_reference() {
                add_converter_snippet(mapping, alias, converters, columns);
            } else {
                for col in join.from_columns() {
                    columns.insert(qualify(join.key_alias(alias), col));
                }
            }
            return;
        }
    }

    match &mapping.kind {
        MappingKind::Primitive { .. }
        | MappingKind::Geometry { .. }
        | MappingKind::FeatureReference { .. }
        | MappingKind::Blob { .. } => add_converter_snippet(mapping, alias, converters, columns),
        MappingKind::Compound { particles, .. } => match converters.resolve(mapping) {
            Some(converter) => {
                columns.insert(converter.select_snippet(alias));
            }
            None => {
                for particle in particles {
                    add_select_columns(particle, alias, false, converters, columns);
                }
            }
        },
        MappingKind::Expression { .. } => {}
    }
}

fn add_converter_snippet(
    mapping: &Mapping,
    alias: &str,
    converters: &dyn ConverterResolver,
    columns: &mut IndexSet<String>,
) {
    match converters.resolve(mapping) {
        Some(converter) => {
            columns.insert(converter.select_snippet(alias));
        }
        None => warning!(
            Warning::UnsupportedMapping,
            mapping = %mapping.path,
            "omitting {} from the select list: no converter",
            mapping
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::ConverterRegistry;
    use crate::mapping::{FidMapping, MappingExpression, PathStep, TableJoin};
    use crate::name::QName;
    use crate::value::PrimitiveType;
    use pretty_assertions::assert_eq;

    fn prim(name: &str, col: &str) -> Mapping {
        Mapping::primitive(
            PathStep::child(QName::local(name)),
            MappingExpression::Column(col.into()),
            PrimitiveType::String,
        )
    }

    fn contact() -> Mapping {
        Mapping::compound(
            PathStep::child(QName::local("contact")),
            vec![prim("phone", "phone"), prim("email", "email")],
            None,
        )
        .with_join(TableJoin::new("road", ["gid"], "contact", ["road_id"], ["seq"]).unwrap())
    }

    fn road() -> Mapping {
        Mapping::compound(
            PathStep::child(QName::local("Road")),
            vec![
                prim("name", "name"),
                prim("label", "name"),
                contact(),
                Mapping::expression(PathStep::child(QName::local("calc")), "1 + 1"),
                prim("kind", "kind"),
            ],
            None,
        )
    }

    #[test]
    fn plan_is_deterministic_and_deduplicated() {
        let registry = ConverterRegistry::new();
        let first = plan(&road(), "x1", false, &registry);
        let second = plan(&road(), "x1", false, &registry);
        assert_eq!(first, second);
        assert_eq!(first.to_vec(), vec!["x1.name", "x1.gid", "x1.kind"]);
        assert_eq!(first.position("x1.name"), Some(1));
        assert_eq!(first.position("x1.kind"), Some(3));
        assert_eq!(first.position("x1.phone"), None);
    }

    #[test]
    fn join_boundary_stops_at_key_columns() {
        let cols = plan(&contact(), "x1", false, &ConverterRegistry::new()).to_vec();
        assert_eq!(cols, vec!["x1.gid"]);
    }

    #[test]
    fn crossing_a_join_plans_the_joined_table() {
        let cols = plan(&contact(), "x2", true, &ConverterRegistry::new()).to_vec();
        assert_eq!(cols, vec!["x2.phone", "x2.email"]);
    }

    #[test]
    fn nested_joins_below_a_crossing_stay_closed() {
        let phones = Mapping::compound(PathStep::child(QName::local("phones")), vec![prim("nr", "nr")], None)
            .with_join(TableJoin::new("contact", ["id"], "phone", ["contact_id"], Vec::<&str>::new()).unwrap());
        let m = Mapping::compound(
            PathStep::child(QName::local("contact")),
            vec![prim("email", "email"), phones],
            None,
        )
        .with_join(TableJoin::new("road", ["gid"], "contact", ["road_id"], Vec::<&str>::new()).unwrap());

        assert_eq!(plan(&m, "x", true, &ConverterRegistry::new()).to_vec(), vec!["x.email", "x.id"]);
    }

    #[test]
    fn joined_feature_reference_keeps_its_own_column() {
        let m = Mapping::feature_reference(
            PathStep::child(QName::local("owner")),
            MappingExpression::Column("owner_fid".into()),
        )
        .with_join(TableJoin::new("road", ["gid"], "owner", ["road_id"], Vec::<&str>::new()).unwrap());
        assert_eq!(plan(&m, "x1", false, &ConverterRegistry::new()).to_vec(), vec!["x1.owner_fid"]);
    }

    #[test]
    fn unconvertible_mappings_are_skipped() {
        let geom = Mapping::geometry(
            PathStep::child(QName::local("geom")),
            MappingExpression::Column("geom".into()),
            None,
        );
        let m = Mapping::compound(PathStep::child(QName::local("Road")), vec![geom, prim("name", "name")], None);
        assert_eq!(plan(&m, "x1", false, &ConverterRegistry::new()).to_vec(), vec!["x1.name"]);
    }

    #[test]
    fn initial_select_list_starts_with_fid_columns() -> anyhow::Result<()> {
        let ft = FeatureTypeMapping::new(
            QName::local("Road"),
            "road",
            FidMapping::new("F", "_", vec![("gid".into(), PrimitiveType::Integer)])?,
            vec![prim("name", "name"), contact(), prim("id", "gid")],
        )?;
        let cols = initial_select_list(&ft, "x1", &ConverterRegistry::new());
        assert_eq!(cols.to_vec(), vec!["x1.gid", "x1.name"]);
        Ok(())
    }

    #[test]
    fn join_keys_use_the_source_alias() -> anyhow::Result<()> {
        let aliased = Mapping::compound(PathStep::child(QName::local("contact")), vec![prim("phone", "phone")], None)
            .with_join(TableJoin::new("road", ["gid"], "contact", ["road_id"], ["seq"])?.with_from_alias("r")?);
        assert_eq!(plan(&aliased, "x1", false, &ConverterRegistry::new()).to_vec(), vec!["r.gid"]);
        Ok(())
    }

    #[test]
    fn combined_select_list_concatenates_feature_types() -> anyhow::Result<()> {
        let road = FeatureTypeMapping::new(
            QName::local("Road"),
            "road",
            FidMapping::new("R", "_", vec![("gid".into(), PrimitiveType::Integer)])?,
            vec![prim("name", "name")],
        )?;
        let owner = FeatureTypeMapping::new(
            QName::local("Owner"),
            "owner",
            FidMapping::new("O", "_", vec![("id".into(), PrimitiveType::Integer)])?,
            vec![prim("name", "name"), prim("city", "city")],
        )?;
        let cols = combined_select_list([(&road, "a"), (&owner, "b"), (&road, "a")], &ConverterRegistry::new());
        assert_eq!(cols.to_vec(), vec!["a.gid", "a.name", "b.id", "b.name", "b.city"]);
        Ok(())
    }
}
