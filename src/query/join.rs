//! Join planner (§4.2): walks a dotted path over a starting model and
//! resolves it into an ordered list of `LEFT JOIN`s plus a terminal
//! model/column, allocating collision-free aliases as it goes.
//!
//! Aliases follow §6's bit-exact grammar: `<table><P><A>` for a plain join,
//! `joint_table<P><A>` for the junction half of a many-to-many hop. `P` is
//! the primary-join index (threaded through the whole statement so it never
//! repeats, even across duplicate path traversals — §9 Open Question 2) and
//! `A` is the annotate index (`0` outside an annotation subselect).

use crate::error::OrmError;
use crate::field::FieldKind;
use crate::model::{ModelDef, ModelRegistry};

/// `LEFT JOIN` is the planner's default (§4.2); the join-planner itself
/// never emits anything else. `Inner` is used by the membership-query
/// variant (`SELECT EXISTS(... INNER JOIN <table> AS intersect ...)`,
/// §4.4 "Membership"), which the assembler builds directly rather than
/// through [`plan_path`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Left,
    Inner,
}

impl JoinKind {
    fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Inner => "INNER JOIN",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JoinClause {
    pub table: String,
    pub alias: String,
    pub on: String,
    pub kind: JoinKind,
}

impl JoinClause {
    fn left(table: String, alias: String, on: String) -> JoinClause {
        JoinClause { table, alias, on, kind: JoinKind::Left }
    }

    /// Used only by [`crate::query::assembler`] to build the membership
    /// query's `INNER JOIN ... AS intersect` clause (§4.4 "Membership") —
    /// the planner itself never produces one.
    pub(crate) fn inner(table: String, alias: String, on: String) -> JoinClause {
        JoinClause { table, alias, on, kind: JoinKind::Inner }
    }

    pub fn render(&self) -> String {
        format!("{} {} AS {} ON {}", self.kind.as_sql(), self.table, self.alias, self.on)
    }
}

/// The outer alias `<table>0<annotate_index>` a statement (or annotation
/// subselect) starts its FROM clause with — `<table>00` for the outer
/// query, `<table>0<aidx>` inside an annotation subselect (§4.4 step 5).
pub fn base_alias(model: &ModelDef, annotate_index: usize) -> String {
    format!("{}0{annotate_index}", model.table_name)
}

#[derive(Debug, Clone)]
pub struct PlannedPath {
    pub joins: Vec<JoinClause>,
    /// Alias of the table carrying the terminal column (or, for a
    /// link-as-id terminal, the referent's own table).
    pub terminal_alias: String,
    pub terminal_column: String,
    pub terminal_model: ModelDef,
    /// The arrival alias after each link hop, in traversal order — used by
    /// [`crate::container`] to plan prefetch grouping without re-deriving
    /// join structure.
    pub hop_aliases: Vec<String>,
    /// The field name that caused each hop, parallel to `hop_aliases`.
    pub hop_fields: Vec<String>,
    /// The model landed on after each hop, parallel to `hop_aliases`.
    pub hop_models: Vec<ModelDef>,
    /// Whether each hop was a many-to-many traversal (`true`) or a
    /// foreign key (`false`), parallel to `hop_aliases` — a prefetch
    /// accessor attaches a single related instance for an FK hop and a
    /// list for an M2M hop.
    pub hop_is_m2m: Vec<bool>,
    pub next_primary_index: usize,
}

/// Plans a dotted path (`"a__b__c"`, already split on `__`) starting at
/// `model`. `primary_index` is the caller's running join counter; it comes
/// back incremented by the number of link hops this path traversed so the
/// next call in the same statement scope keeps allocating fresh aliases.
pub fn plan_path(
    model: &ModelDef,
    segments: &[String],
    mut primary_index: usize,
    annotate_index: usize,
) -> Result<PlannedPath, OrmError> {
    if segments.is_empty() {
        return Err(OrmError::misuse("empty dotted path"));
    }
    let mut joins = Vec::new();
    let mut hop_aliases = Vec::new();
    let mut hop_fields = Vec::new();
    let mut hop_models = Vec::new();
    let mut hop_is_m2m = Vec::new();
    let mut current_model = model.clone();
    let mut parent_alias = base_alias(model, annotate_index);

    for (i, seg) in segments.iter().enumerate() {
        let field = current_model.field(seg).ok_or_else(|| {
            OrmError::schema(format!(
                "unknown field \"{seg}\" on model \"{}\"",
                current_model.name
            ))
        })?;
        let is_last = i == segments.len() - 1;

        if !field.kind.is_link() {
            if !is_last {
                return Err(OrmError::schema(format!(
                    "\"{seg}\" on model \"{}\" is a scalar field but the path continues past it",
                    current_model.name
                )));
            }
            return Ok(PlannedPath {
                joins,
                terminal_alias: parent_alias,
                terminal_column: seg.clone(),
                terminal_model: current_model,
                hop_aliases,
                hop_fields,
                hop_models,
                hop_is_m2m,
                next_primary_index: primary_index,
            });
        }

        match field.kind.clone() {
            FieldKind::ForeignKey { ref_model, .. } => {
                let ref_def = ModelRegistry::get(ref_model)?;
                let alias = format!("{}{primary_index}{annotate_index}", ref_def.table_name);
                joins.push(JoinClause::left(
                    ref_def.table_name.clone(),
                    alias.clone(),
                    format!("{parent_alias}.{seg} = {alias}.id"),
                ));
                hop_aliases.push(alias.clone());
                hop_fields.push(seg.clone());
                hop_models.push(ref_def.clone());
                hop_is_m2m.push(false);
                if is_last {
                    return Ok(PlannedPath {
                        joins,
                        terminal_alias: alias,
                        terminal_column: "id".to_string(),
                        terminal_model: ref_def,
                        hop_aliases,
                        hop_fields,
                        hop_models,
                        hop_is_m2m,
                        next_primary_index: primary_index + 1,
                    });
                }
                parent_alias = alias;
                current_model = ref_def;
                primary_index += 1;
            }
            FieldKind::ManyToMany { ref_model, .. } => {
                let ref_def = ModelRegistry::get(ref_model)?;
                let junction = format!("{}_{}", current_model.name, ref_model);
                let junction_alias = format!("joint_table{primary_index}{annotate_index}");
                let m1_col = format!("{}_id", current_model.name.to_lowercase());
                let m2_col = format!("{}_id", ref_model.to_lowercase());
                joins.push(JoinClause::left(
                    junction,
                    junction_alias.clone(),
                    format!("{parent_alias}.id = {junction_alias}.{m1_col}"),
                ));
                let ref_alias = format!("{}{primary_index}{annotate_index}", ref_def.table_name);
                joins.push(JoinClause::left(
                    ref_def.table_name.clone(),
                    ref_alias.clone(),
                    format!("{junction_alias}.{m2_col} = {ref_alias}.id"),
                ));
                hop_aliases.push(ref_alias.clone());
                hop_fields.push(seg.clone());
                hop_models.push(ref_def.clone());
                hop_is_m2m.push(true);
                if is_last {
                    return Ok(PlannedPath {
                        joins,
                        terminal_alias: ref_alias,
                        terminal_column: "id".to_string(),
                        terminal_model: ref_def,
                        hop_aliases,
                        hop_fields,
                        hop_models,
                        hop_is_m2m,
                        next_primary_index: primary_index + 1,
                    });
                }
                parent_alias = ref_alias;
                current_model = ref_def;
                primary_index += 1;
            }
            _ => unreachable!("is_link() guarantees FK or M2M"),
        }
    }
    unreachable!("loop always returns by the last segment")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldDef, FieldKind as FK, RefAction, Value};
    use crate::model::ModelBuilder;

    fn register_fixture() {
        ModelRegistry::register(ModelBuilder::new("Airport").build());
        ModelRegistry::register(ModelBuilder::new("Airline").build());
        ModelRegistry::register(
            ModelBuilder::new("Plane")
                .field(
                    "airline",
                    FieldDef::new(FK::ForeignKey {
                        ref_model: "Airline",
                        on_delete: RefAction::Cascade,
                        on_update: RefAction::Cascade,
                    }),
                )
                .unwrap()
                .build(),
        );
        ModelRegistry::register(
            ModelBuilder::new("Route")
                .field(
                    "departure_point",
                    FieldDef::new(FK::ForeignKey {
                        ref_model: "Airport",
                        on_delete: RefAction::Cascade,
                        on_update: RefAction::Cascade,
                    }),
                )
                .unwrap()
                .field(
                    "arrival_point",
                    FieldDef::new(FK::ForeignKey {
                        ref_model: "Airport",
                        on_delete: RefAction::Cascade,
                        on_update: RefAction::Cascade,
                    }),
                )
                .unwrap()
                .field(
                    "plane",
                    FieldDef::new(FK::ForeignKey {
                        ref_model: "Plane",
                        on_delete: RefAction::Cascade,
                        on_update: RefAction::Cascade,
                    }),
                )
                .unwrap()
                .build(),
        );
        let _ = Value::Int(0); // silence unused import when test order changes
    }

    #[test]
    fn three_hop_fk_chain_allocates_distinct_aliases() {
        register_fixture();
        let route = ModelRegistry::get("Route").unwrap();
        let segments: Vec<String> = "plane__airline__country"
            .split("__")
            .map(str::to_string)
            .collect();
        let planned = plan_path(&route, &segments, 1, 0).unwrap();
        assert_eq!(planned.joins.len(), 2);
        assert_eq!(planned.joins[0].alias, "Planes10");
        assert_eq!(planned.joins[1].alias, "Airlines20");
        assert_eq!(planned.terminal_alias, "Airlines20");
        assert_eq!(planned.terminal_column, "country");
        assert_eq!(planned.next_primary_index, 3);
    }

    #[test]
    fn link_as_terminal_segment_means_id_of_referent() {
        register_fixture();
        let route = ModelRegistry::get("Route").unwrap();
        let segments: Vec<String> = vec!["plane".to_string()];
        let planned = plan_path(&route, &segments, 1, 0).unwrap();
        assert_eq!(planned.terminal_column, "id");
        assert_eq!(planned.terminal_model.name, "Plane");
    }

    #[test]
    fn repeated_prefix_traversal_does_not_dedupe_aliases() {
        register_fixture();
        let route = ModelRegistry::get("Route").unwrap();
        let segs_a: Vec<String> = vec!["departure_point".to_string(), "capacity".to_string()];
        let segs_b: Vec<String> = vec!["departure_point".to_string(), "city".to_string()];
        let first = plan_path(&route, &segs_a, 1, 0).unwrap();
        let second = plan_path(&route, &segs_b, first.next_primary_index, 0).unwrap();
        assert_ne!(first.joins[0].alias, second.joins[0].alias);
    }

    #[test]
    fn unknown_segment_is_a_schema_error() {
        register_fixture();
        let route = ModelRegistry::get("Route").unwrap();
        let segments: Vec<String> = vec!["not_a_field".to_string()];
        let err = plan_path(&route, &segments, 1, 0).unwrap_err();
        assert!(matches!(err, OrmError::Schema(_)));
    }
}
