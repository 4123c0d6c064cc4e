//! SQL assembler (§4.4): the pure function(s) that turn a
//! [`QueryDescriptor`] into SQL text. Every public `assemble_*` entry point
//! here is side-effect-free — no I/O, no mutation — consuming a model and a
//! descriptor and returning a `String`.
//!
//! Grounded on the source's `containers.py`/`query.py` assembly logic, but
//! restructured around a `Vec`/`String`-typed [`AssembledParts`] rather than
//! splicing extra clauses into already-rendered SQL text by locating the
//! word `WHERE` — the variant statements (COUNT, EXISTS, membership,
//! UPDATE, DELETE) each build their own statement out of the same
//! structured parts instead.

use crate::error::OrmError;
use crate::field::{escape_like, raw_str, render_value, Value};
use crate::model::ModelDef;
use crate::query::aggregate::Agg;
use crate::query::descriptor::QueryDescriptor;
use crate::query::join::{base_alias, plan_path, JoinClause};
use crate::query::predicate::{parse_path, Op, QNode};
use std::collections::HashSet;

/// The structured, not-yet-concatenated pieces of one `SELECT` statement
/// (§4.4 step 8). Variant statements (UPDATE/DELETE/membership) are built
/// by modifying these parts before composing, rather than by re-parsing
/// rendered SQL text.
#[derive(Debug, Clone)]
pub struct AssembledParts {
    pub table: String,
    pub base_alias: String,
    pub joins: Vec<JoinClause>,
    pub projection: Vec<String>,
    pub where_clauses: Vec<String>,
    pub having_clauses: Vec<String>,
    pub order_by: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl AssembledParts {
    /// Composes `SELECT <proj> FROM <table> AS <base> <joins> [WHERE …]
    /// [HAVING …] [ORDER BY …] [LIMIT n] [OFFSET n]` (§4.4 step 8).
    pub fn to_sql(&self) -> String {
        let mut sql = format!(
            "SELECT {} FROM {} AS {}",
            self.projection.join(", "),
            self.table,
            self.base_alias
        );
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.render());
        }
        if !self.where_clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_clauses.join(" AND "));
        }
        if !self.having_clauses.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&self.having_clauses.join(" AND "));
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        sql
    }
}

/// Renders one operator-tagged predicate against an already-resolved
/// `column` text (either a fully-qualified `alias.col`, for a WHERE leaf,
/// or a bare annotation alias, for a HAVING leaf) — §4.1's operator table.
fn render_predicate_op(column: &str, op: Op, value: &Value) -> Result<String, OrmError> {
    match op {
        Op::Eq => Ok(format!("{column} = {}", render_value(value)?)),
        Op::Gt => Ok(format!("{column} > {}", render_value(value)?)),
        Op::Gte => Ok(format!("{column} >= {}", render_value(value)?)),
        Op::Lt => Ok(format!("{column} < {}", render_value(value)?)),
        Op::Lte => Ok(format!("{column} <= {}", render_value(value)?)),
        Op::StartsWith => Ok(format!("{column} LIKE BINARY '{}%'", escape_like(raw_str(value)?))),
        Op::IStartsWith => Ok(format!(
            "LOWER({column}) LIKE '{}%'",
            escape_like(raw_str(value)?).to_lowercase()
        )),
        Op::EndsWith => Ok(format!("{column} LIKE BINARY '%{}'", escape_like(raw_str(value)?))),
        Op::IEndsWith => Ok(format!(
            "LOWER({column}) LIKE '%{}'",
            escape_like(raw_str(value)?).to_lowercase()
        )),
        Op::Contains => Ok(format!("{column} LIKE BINARY '%{}%'", escape_like(raw_str(value)?))),
        Op::IContains => Ok(format!(
            "LOWER({column}) LIKE '%{}%'",
            escape_like(raw_str(value)?).to_lowercase()
        )),
        Op::Range => {
            let Value::Tuple(items) = value else {
                return Err(OrmError::misuse("range expects a two-element tuple value"));
            };
            if items.len() != 2 {
                return Err(OrmError::misuse("range expects exactly two values"));
            }
            Ok(format!(
                "{column} BETWEEN {} AND {}",
                render_value(&items[0])?,
                render_value(&items[1])?
            ))
        }
        Op::Year => Ok(format!("YEAR({column}) = {}", render_value(value)?)),
        Op::Month => Ok(format!("MONTH({column}) = {}", render_value(value)?)),
        Op::Day => Ok(format!("DAY({column}) = {}", render_value(value)?)),
        Op::Hour => Ok(format!("HOUR({column}) = {}", render_value(value)?)),
        Op::Minute => Ok(format!("MINUTE({column}) = {}", render_value(value)?)),
        Op::Second => Ok(format!("SECOND({column}) = {}", render_value(value)?)),
        Op::IsNull => Ok(if value.is_truthy() {
            format!("{column} IS NULL")
        } else {
            format!("{column} IS NOT NULL")
        }),
        Op::Regex => Ok(format!("{column} LIKE {}", render_value(value)?)),
        Op::In => {
            let Value::Tuple(items) = value else {
                return Err(OrmError::misuse("in expects a tuple value"));
            };
            let rendered: Result<Vec<String>, OrmError> = items.iter().map(render_value).collect();
            Ok(format!("{column} IN ({})", rendered?.join(", ")))
        }
    }
}

/// Renders a single leaf, routing it to WHERE (plans joins over `model`) or
/// HAVING (the path is exactly an annotation alias, rendered bare — §4.1
/// "A Q-tree leaf whose terminal segment ... refers to an annotation alias
/// emits its predicate into the having bucket").
fn render_leaf(
    model: &ModelDef,
    path: &str,
    op: Op,
    value: &Value,
    primary_index: usize,
    annotate_index: usize,
    annotation_aliases: &HashSet<String>,
) -> Result<(Vec<JoinClause>, usize, bool, String), OrmError> {
    if annotation_aliases.contains(path) {
        let text = render_predicate_op(path, op, value)?;
        return Ok((Vec::new(), primary_index, true, text));
    }
    let segments: Vec<String> = path.split("__").map(str::to_string).collect();
    let planned = plan_path(model, &segments, primary_index, annotate_index)?;
    let table_alias = if planned.joins.is_empty() {
        base_alias(model, annotate_index)
    } else {
        planned.terminal_alias.clone()
    };
    let column = format!("{table_alias}.{}", planned.terminal_column);
    let text = render_predicate_op(&column, op, value)?;
    Ok((planned.joins, planned.next_primary_index, false, text))
}

/// Renders a whole `Q`-tree node, bubbling up the `having` flag from any
/// descendant leaf (a pragmatic simplification documented in DESIGN.md: a
/// mixed WHERE/HAVING predicate is routed to HAVING in its entirety rather
/// than split node-by-node, since MySQL's HAVING also accepts plain
/// columns).
fn render_node(
    model: &ModelDef,
    node: &QNode,
    primary_index: usize,
    annotate_index: usize,
    annotation_aliases: &HashSet<String>,
) -> Result<(Vec<JoinClause>, usize, bool, String), OrmError> {
    match node {
        QNode::Leaf { path, op, value } => {
            render_leaf(model, path, *op, value, primary_index, annotate_index, annotation_aliases)
        }
        QNode::And(children) => {
            render_compound(model, children, primary_index, annotate_index, annotation_aliases, " AND ")
        }
        QNode::Or(children) => {
            render_compound(model, children, primary_index, annotate_index, annotation_aliases, " OR ")
        }
        QNode::Not(inner) => {
            let (joins, next_idx, having, text) =
                render_node(model, inner, primary_index, annotate_index, annotation_aliases)?;
            Ok((joins, next_idx, having, format!("NOT ({text})")))
        }
    }
}

fn render_compound(
    model: &ModelDef,
    children: &[QNode],
    mut primary_index: usize,
    annotate_index: usize,
    annotation_aliases: &HashSet<String>,
    joiner: &str,
) -> Result<(Vec<JoinClause>, usize, bool, String), OrmError> {
    let mut joins = Vec::new();
    let mut having = false;
    let mut parts = Vec::new();
    for child in children {
        let (child_joins, next_idx, child_having, text) =
            render_node(model, child, primary_index, annotate_index, annotation_aliases)?;
        joins.extend(child_joins);
        having = having || child_having;
        parts.push(format!("({text})"));
        primary_index = next_idx;
    }
    Ok((joins, primary_index, having, parts.join(joiner)))
}

/// Builds the structured parts of one `SELECT` statement for `descriptor`
/// over `model` (§4.4 steps 1-8, minus the outer aggregate wrap and UNION
/// tail, which the `assemble_*` entry points layer on top).
pub fn build_parts(model: &ModelDef, descriptor: &QueryDescriptor) -> Result<AssembledParts, OrmError> {
    let outer_annotate_index = 0usize;
    let mut primary_index = 1usize;
    let table_alias = base_alias(model, outer_annotate_index);

    let annotation_aliases: HashSet<String> = descriptor
        .annotations
        .iter()
        .map(QueryDescriptor::annotation_alias)
        .collect();

    let mut joins: Vec<JoinClause> = Vec::new();
    let mut where_parts: Vec<String> = Vec::new();
    let mut having_parts: Vec<String> = Vec::new();

    for predicate in &descriptor.predicates {
        let (child_joins, next_idx, having, text) =
            render_node(model, &predicate.0, primary_index, outer_annotate_index, &annotation_aliases)?;
        joins.extend(child_joins);
        primary_index = next_idx;
        let wrapped = format!("({text})");
        if having {
            having_parts.push(wrapped);
        } else {
            where_parts.push(wrapped);
        }
    }

    if !descriptor.keyword_predicates.is_empty() {
        let mut kw_parts = Vec::new();
        let mut kw_having = false;
        for (raw_path, value) in &descriptor.keyword_predicates {
            let (segments, op) = parse_path(raw_path);
            let leaf_path = segments.join("__");
            let (child_joins, next_idx, having, text) = render_leaf(
                model,
                &leaf_path,
                op,
                value,
                primary_index,
                outer_annotate_index,
                &annotation_aliases,
            )?;
            joins.extend(child_joins);
            primary_index = next_idx;
            kw_having = kw_having || having;
            kw_parts.push(text);
        }
        let wrapped = format!("({})", kw_parts.join(" AND "));
        if kw_having {
            having_parts.push(wrapped);
        } else {
            where_parts.push(wrapped);
        }
    }

    // Base projection: every scalar column of `model`, M2M excluded (§4.4
    // step 6) — foreign-key id columns are real columns and are included.
    let mut projection: Vec<String> = model
        .own_columns()
        .map(|(name, _)| format!("{table_alias}.{name}"))
        .collect();

    // select_related: project every column of the terminal model, aliased
    // `<path>__<column>` (§4.4 step 4).
    for path in &descriptor.select_related {
        let segments: Vec<String> = path.split("__").map(str::to_string).collect();
        let planned = plan_path(model, &segments, primary_index, outer_annotate_index)?;
        let terminal_alias = planned.terminal_alias.clone();
        joins.extend(planned.joins);
        primary_index = planned.next_primary_index;
        for (col, _) in planned.terminal_model.own_columns() {
            projection.push(format!("{terminal_alias}.{col} AS {path}__{col}"));
        }
    }

    // annotations: each is a correlated subselect against a fresh
    // annotate_index, its own primary_index scope (§4.4 step 5).
    let mut annotate_index = outer_annotate_index;
    for annotation in &descriptor.annotations {
        annotate_index += 1;
        let planned = annotation.agg.plan(model, 1, annotate_index)?;
        let alias = QueryDescriptor::annotation_alias(annotation);
        let sub_alias = base_alias(model, annotate_index);
        let mut sub_sql = format!("SELECT {} FROM {} AS {sub_alias}", planned.expr, model.table_name);
        for join in &planned.joins {
            sub_sql.push(' ');
            sub_sql.push_str(&join.render());
        }
        sub_sql.push_str(&format!(" WHERE {sub_alias}.id = {table_alias}.id"));
        projection.push(format!("({sub_sql}) AS {alias}"));
    }

    // order_by: join-plan each path, rendering `<alias>.<col>` or the
    // annotation alias bare (§4.4 step 7).
    let mut order_by = Vec::new();
    for term in &descriptor.order_by {
        let direction = if term.descending { "DESC" } else { "ASC" };
        if annotation_aliases.contains(&term.path) {
            order_by.push(format!("{} {direction}", term.path));
            continue;
        }
        let segments: Vec<String> = term.path.split("__").map(str::to_string).collect();
        let planned = plan_path(model, &segments, primary_index, outer_annotate_index)?;
        let alias = if planned.joins.is_empty() {
            table_alias.clone()
        } else {
            planned.terminal_alias.clone()
        };
        joins.extend(planned.joins);
        primary_index = planned.next_primary_index;
        order_by.push(format!("{alias}.{} {direction}", planned.terminal_column));
    }

    Ok(AssembledParts {
        table: model.table_name.clone(),
        base_alias: table_alias,
        joins,
        projection,
        where_clauses: where_parts,
        having_clauses: having_parts,
        order_by,
        limit: descriptor.limit,
        offset: descriptor.offset,
    })
}

/// The plain `SELECT` statement, with its `union_tail` appended via
/// `UNION` (§4.4 step 10).
pub fn assemble_select(model: &ModelDef, descriptor: &QueryDescriptor) -> Result<String, OrmError> {
    let mut sql = build_parts(model, descriptor)?.to_sql();
    for tail in &descriptor.union_tail {
        sql.push_str(" UNION ");
        sql.push_str(&build_parts(model, tail)?.to_sql());
    }
    Ok(sql)
}

/// Wraps `descriptor`'s SELECT as a subquery aliased `<table>00` and
/// projects `aggs` as the outer projection (§4.4 step 9).
pub fn assemble_aggregate_group(
    model: &ModelDef,
    descriptor: &QueryDescriptor,
    aggs: &[(Option<String>, Agg)],
) -> Result<String, OrmError> {
    let inner = build_parts(model, descriptor)?.to_sql();
    let outer_alias = base_alias(model, 0);
    let mut projection = Vec::new();
    let mut joins = Vec::new();
    let mut primary_index = 1usize;
    for (alias_override, agg) in aggs {
        let planned = agg.plan(model, primary_index, 0)?;
        primary_index = planned.next_primary_index;
        joins.extend(planned.joins);
        let alias = alias_override.clone().unwrap_or_else(|| agg.default_alias());
        projection.push(format!("{} AS {alias}", planned.expr));
    }
    let mut sql = format!(
        "SELECT {} FROM ({inner}) AS {outer_alias}",
        projection.join(", ")
    );
    for join in &joins {
        sql.push(' ');
        sql.push_str(&join.render());
    }
    Ok(sql)
}

/// `COUNT(*)` over `descriptor`'s filtered set, via the same outer-
/// aggregate-group path used by explicit `.aggregate(Count(...))` calls
/// (§4.4 "Variant statements — COUNT").
pub fn assemble_count(model: &ModelDef, descriptor: &QueryDescriptor) -> Result<String, OrmError> {
    assemble_aggregate_group(model, descriptor, &[(Some("count".to_string()), Agg::count("id"))])
}

/// `SELECT EXISTS(<select>)` (§4.4 "Variant statements — EXISTS").
pub fn assemble_exists(model: &ModelDef, descriptor: &QueryDescriptor) -> Result<String, OrmError> {
    let parts = build_parts(model, descriptor)?;
    Ok(format!("SELECT EXISTS({})", parts.to_sql()))
}

/// Membership test (`instance ∈ queryset`): an `INNER JOIN` against the
/// owning table narrowed to one id, wrapped in `EXISTS` (§4.4 "Variant
/// statements — Membership").
pub fn assemble_membership(
    model: &ModelDef,
    descriptor: &QueryDescriptor,
    instance_id: i64,
) -> Result<String, OrmError> {
    let mut parts = build_parts(model, descriptor)?;
    let intersect_on = format!(
        "{}.id = intersect.id AND intersect.id = {instance_id}",
        parts.base_alias
    );
    parts
        .joins
        .push(JoinClause::inner(parts.table.clone(), "intersect".to_string(), intersect_on));
    Ok(format!("SELECT EXISTS({})", parts.to_sql()))
}

/// `UPDATE <T>, (<id-select>) AS __tab SET … WHERE <T>.id = __tab.id`
/// (§4.4 "Variant statements — UPDATE-by-query").
pub fn assemble_update(
    model: &ModelDef,
    descriptor: &QueryDescriptor,
    assignments: &[(String, Value)],
) -> Result<String, OrmError> {
    if assignments.is_empty() {
        return Err(OrmError::misuse("update() requires at least one field assignment"));
    }
    let mut parts = build_parts(model, descriptor)?;
    parts.projection = vec![format!("{}.id", parts.base_alias)];
    let select_ids = parts.to_sql();

    let mut set_parts = Vec::with_capacity(assignments.len());
    for (name, value) in assignments {
        let field = model
            .field(name)
            .ok_or_else(|| OrmError::schema(format!("unknown field \"{name}\" on model \"{}\"", model.name)))?;
        set_parts.push(format!("{name} = {}", field.to_sql(value)?));
    }

    Ok(format!(
        "UPDATE {table}, ({select_ids}) AS __tab SET {set} WHERE {table}.id = __tab.id",
        table = model.table_name,
        set = set_parts.join(", ")
    ))
}

/// `DELETE FROM <T> WHERE <T>.id IN (SELECT <T>00.id FROM (<select>) AS
/// <T>00)` (§4.4 "Variant statements — DELETE-by-query").
pub fn assemble_delete(model: &ModelDef, descriptor: &QueryDescriptor) -> Result<String, OrmError> {
    let parts = build_parts(model, descriptor)?;
    let wrap_alias = base_alias(model, 0);
    let inner = parts.to_sql();
    Ok(format!(
        "DELETE FROM {table} WHERE {table}.id IN (SELECT {wrap_alias}.id FROM ({inner}) AS {wrap_alias})",
        table = model.table_name
    ))
}
