//! Result container (§4.5): the lazy, chainable object every model-level
//! query returns — deferred execution, iteration, indexing, slicing,
//! union/intersection/difference-by-predicate, `update`/`delete`, and
//! prefetch bookkeeping.
//!
//! Grounded on the source's `QuerySet` (`__exec`, `__getitem__`,
//! `__contains__`, `filter`/`exclude`/`order_by`/`select_related`/
//! `prefetch_related`/`aggregate`/`annotate`/`update`/`delete`/`__add__`/
//! `__or__`/`__and__`), restructured around an explicit `execute()` state
//! transition (§9 "Laziness") rather than execution triggered by the first
//! attribute touch.

use crate::driver::Row;
use crate::error::OrmError;
use crate::field::Value;
use crate::instance::Instance;
use crate::model::ModelDef;
use crate::query::aggregate::Agg;
use crate::query::assembler::{
    assemble_aggregate_group, assemble_count, assemble_delete, assemble_exists, assemble_membership,
    assemble_select, assemble_update,
};
use crate::query::descriptor::{OrderTerm, QueryDescriptor};
use crate::query::join::{base_alias, plan_path};
use crate::query::predicate::Q;
use crate::session::Session;
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum State {
    Unexecuted,
    Executed(Vec<Instance>),
}

/// The lazy, chainable query object every model-level method returns
/// (§4.5). Mutation methods consume `self` and return a fresh, unexecuted
/// `QuerySet`; terminal methods borrow and execute on demand.
pub struct QuerySet {
    session: Session,
    model: ModelDef,
    descriptor: QueryDescriptor,
    state: State,
}

impl QuerySet {
    pub fn new(session: Session, model: ModelDef) -> QuerySet {
        QuerySet {
            session,
            model,
            descriptor: QueryDescriptor::new(),
            state: State::Unexecuted,
        }
    }

    fn fresh(&self, descriptor: QueryDescriptor) -> QuerySet {
        QuerySet {
            session: self.session.clone(),
            model: self.model.clone(),
            descriptor,
            state: State::Unexecuted,
        }
    }

    pub fn filter(self, predicate: Q) -> QuerySet {
        let descriptor = self.descriptor.clone().filter(predicate);
        self.fresh(descriptor)
    }

    pub fn filter_kw(self, path: impl Into<String>, value: impl Into<Value>) -> QuerySet {
        let descriptor = self.descriptor.clone().filter_kw(path, value);
        self.fresh(descriptor)
    }

    /// `exclude(A)` is `filter(~A)` (§4.5, §8 "Exclude duality").
    pub fn exclude(self, predicate: Q) -> QuerySet {
        self.filter(predicate.not_())
    }

    pub fn exclude_kw(self, path: &str, value: impl Into<Value>) -> QuerySet {
        self.filter(Q::new(path, value).not_())
    }

    pub fn order_by(self, path: &str) -> QuerySet {
        let descriptor = self.descriptor.clone().order_by(path);
        self.fresh(descriptor)
    }

    pub fn select_related(self, path: impl Into<String>) -> QuerySet {
        let descriptor = self.descriptor.clone().select_related(path);
        self.fresh(descriptor)
    }

    pub fn prefetch_related(self, path: impl Into<String>) -> QuerySet {
        let descriptor = self.descriptor.clone().prefetch_related(path);
        self.fresh(descriptor)
    }

    pub fn annotate(self, alias: Option<String>, agg: Agg) -> QuerySet {
        let descriptor = self.descriptor.clone().annotate(alias, agg);
        self.fresh(descriptor)
    }

    pub fn with_limit(self, limit: u64) -> QuerySet {
        let descriptor = self.descriptor.clone().with_limit(limit);
        self.fresh(descriptor)
    }

    pub fn with_offset(self, offset: u64) -> QuerySet {
        let descriptor = self.descriptor.clone().with_offset(offset);
        self.fresh(descriptor)
    }

    /// `q1 + q2` (§4.5 "union via +"): appends `other`'s descriptor to this
    /// one's `union_tail`. Both sides must share a model.
    pub fn union(self, other: QuerySet) -> Result<QuerySet, OrmError> {
        self.require_same_model(&other)?;
        let mut descriptor = self.descriptor.clone();
        descriptor.union_tail.push(other.descriptor);
        Ok(self.fresh(descriptor))
    }

    /// `q1 | q2`: `Or` of both sides' predicate conjunctions (§4.5).
    pub fn or(self, other: QuerySet) -> Result<QuerySet, OrmError> {
        self.require_same_model(&other)?;
        let left = self.conjunction()?;
        let right = other.conjunction()?;
        let base = QuerySet::new(self.session.clone(), self.model.clone());
        Ok(base.filter(left.or_(right)))
    }

    /// `q1 & q2`: `And` of both sides' predicate conjunctions (§4.5).
    pub fn and(self, other: QuerySet) -> Result<QuerySet, OrmError> {
        self.require_same_model(&other)?;
        let left = self.conjunction()?;
        let right = other.conjunction()?;
        let base = QuerySet::new(self.session.clone(), self.model.clone());
        Ok(base.filter(left.and_(right)))
    }

    fn require_same_model(&self, other: &QuerySet) -> Result<(), OrmError> {
        if self.model.name != other.model.name {
            return Err(OrmError::misuse(format!(
                "QuerySet models must match: \"{}\" vs \"{}\"",
                self.model.name, other.model.name
            )));
        }
        Ok(())
    }

    /// Folds this descriptor's own `predicates` plus `keyword_predicates`
    /// into a single conjunction — the form `|`/`&` need to combine two
    /// querysets' constraints (§4.5).
    fn conjunction(&self) -> Result<Q, OrmError> {
        let mut parts: Vec<Q> = self.descriptor.predicates.clone();
        for (path, value) in &self.descriptor.keyword_predicates {
            parts.push(Q::new(path, value.clone()));
        }
        if parts.is_empty() {
            return Err(OrmError::misuse("cannot combine an unconstrained QuerySet with | or &"));
        }
        Q::all_of(parts)
    }

    /// Explicit `execute()` state transition (§9 "Laziness"): runs the
    /// assembled `SELECT`, hydrates every row, and fetches+attaches every
    /// `prefetch_related` path. A no-op once already executed.
    pub fn execute(&mut self) -> Result<(), OrmError> {
        if matches!(self.state, State::Executed(_)) {
            return Ok(());
        }
        self.session.check_table(self.model.name)?;
        let sql = assemble_select(&self.model, &self.descriptor)?;
        let rows = self.session.fetch(&sql)?;
        let mut instances = Vec::with_capacity(rows.len());
        for row in &rows {
            instances.push(Instance::hydrate(&self.model, row, &self.descriptor.select_related)?);
        }
        for path in self.descriptor.prefetch_related.clone() {
            self.attach_prefetch(&mut instances, &path)?;
        }
        self.state = State::Executed(instances);
        Ok(())
    }

    /// Companion `SELECT` for one `prefetch_related` path (§4.5
    /// "Prefetch"): re-plans the full path, fetches every own column of
    /// every hop's model plus the root id, regroups in memory, and attaches
    /// the result to each hydrated instance's own link cache — so the
    /// whole path is loaded with exactly one extra statement regardless of
    /// how many rows it touches.
    fn attach_prefetch(&self, instances: &mut [Instance], path: &str) -> Result<(), OrmError> {
        let segments: Vec<String> = path.split("__").map(str::to_string).collect();
        let planned = plan_path(&self.model, &segments, 1, 0)?;
        if planned.hop_aliases.is_empty() {
            return Err(OrmError::misuse(format!(
                "prefetch_related(\"{path}\") does not traverse any link field"
            )));
        }

        let root_alias = base_alias(&self.model, 0);
        let mut cumulative_prefixes: Vec<String> = Vec::with_capacity(planned.hop_fields.len());
        let mut running = String::new();
        for field in &planned.hop_fields {
            if !running.is_empty() {
                running.push_str("__");
            }
            running.push_str(field);
            cumulative_prefixes.push(running.clone());
        }

        let mut projection = vec![format!("{root_alias}.id AS __root_id")];
        for (i, hop_alias) in planned.hop_aliases.iter().enumerate() {
            for (col, _) in planned.hop_models[i].own_columns() {
                projection.push(format!("{hop_alias}.{col} AS {}__{col}", cumulative_prefixes[i]));
            }
        }
        let mut sql = format!(
            "SELECT {} FROM {} AS {root_alias}",
            projection.join(", "),
            self.model.table_name
        );
        for join in &planned.joins {
            sql.push(' ');
            sql.push_str(&join.render());
        }
        let rows = self.session.fetch(&sql)?;

        let mut nodes: HashMap<(usize, i64), Instance> = HashMap::new();
        let mut row_ids: Vec<(i64, Vec<Option<i64>>)> = Vec::with_capacity(rows.len());
        for row in &rows {
            let root_id = extract_i64(row, "__root_id")?;
            let mut ids = Vec::with_capacity(planned.hop_aliases.len());
            for (i, prefix) in cumulative_prefixes.iter().enumerate() {
                let id_key = format!("{prefix}__id");
                let id_opt = match row.get(&id_key) {
                    Some(Value::Null) | None => None,
                    Some(v) => Some(as_i64(v)?),
                };
                if let Some(id) = id_opt {
                    if !nodes.contains_key(&(i, id)) {
                        let col_prefix = format!("{prefix}__");
                        let hop_row: Row = row
                            .iter()
                            .filter_map(|(k, v)| k.strip_prefix(col_prefix.as_str()).map(|c| (c.to_string(), v.clone())))
                            .collect();
                        let hop_instance = Instance::hydrate(&planned.hop_models[i], &hop_row, &[])?;
                        nodes.insert((i, id), hop_instance);
                    }
                }
                ids.push(id_opt);
            }
            row_ids.push((root_id, ids));
        }

        for (root_id, ids) in &row_ids {
            let depth = ids.iter().take_while(|v| v.is_some()).count();
            if depth == 0 {
                continue;
            }
            for i in (0..depth - 1).rev() {
                let parent_key = (i, ids[i].expect("depth guarantees this hop has an id"));
                let child_key = (i + 1, ids[i + 1].expect("depth guarantees this hop has an id"));
                let child = nodes.get(&child_key).cloned();
                if let Some(child_instance) = child {
                    if let Some(parent_instance) = nodes.get_mut(&parent_key) {
                        if planned.hop_is_m2m[i + 1] {
                            parent_instance.push_many(&planned.hop_fields[i + 1], child_instance);
                        } else {
                            parent_instance.seed_one(&planned.hop_fields[i + 1], Some(child_instance));
                        }
                    }
                }
            }
            let hop0_key = (0, ids[0].expect("depth guarantees this hop has an id"));
            if let Some(hop0_instance) = nodes.get(&hop0_key).cloned() {
                if let Some(root_instance) = instances.iter_mut().find(|inst| inst.id().ok() == Some(*root_id)) {
                    if planned.hop_is_m2m[0] {
                        root_instance.push_many(&planned.hop_fields[0], hop0_instance);
                    } else {
                        root_instance.seed_one(&planned.hop_fields[0], Some(hop0_instance));
                    }
                }
            }
        }

        // every root instance this path never matched still gets a defined
        // (empty) cache entry, so later access never re-queries (§4.5).
        for instance in instances.iter_mut() {
            if planned.hop_is_m2m[0] {
                if instance.related_many_cached(&planned.hop_fields[0]).is_none() {
                    instance.push_many_empty(&planned.hop_fields[0]);
                }
            }
        }

        Ok(())
    }

    /// `COUNT(*)` over this descriptor's filtered set (§4.4 "Variant
    /// statements — COUNT"). Reads off the already-materialized result set
    /// if this queryset has executed, rather than re-querying.
    pub fn count(&mut self) -> Result<i64, OrmError> {
        if let State::Executed(rows) = &self.state {
            return Ok(rows.len() as i64);
        }
        self.session.check_table(self.model.name)?;
        let sql = assemble_count(&self.model, &self.descriptor)?;
        let rows = self.session.fetch(&sql)?;
        let row = rows.into_iter().next().ok_or(OrmError::NotFound)?;
        row.get("count").map(as_i64).unwrap_or(Err(OrmError::misuse(
            "COUNT(*) query returned no usable count column",
        )))
    }

    /// `EXISTS(...)` over this descriptor's filtered set (§4.4 "Variant
    /// statements — EXISTS").
    pub fn exists(&mut self) -> Result<bool, OrmError> {
        if let State::Executed(rows) = &self.state {
            return Ok(!rows.is_empty());
        }
        self.session.check_table(self.model.name)?;
        let sql = assemble_exists(&self.model, &self.descriptor)?;
        let rows = self.session.fetch(&sql)?;
        let row = rows.into_iter().next().ok_or(OrmError::NotFound)?;
        let value = row.values().next().ok_or(OrmError::NotFound)?;
        Ok(value.is_truthy())
    }

    /// `instance in queryset` (§4.4 "Variant statements — Membership").
    pub fn contains(&mut self, instance: &Instance) -> Result<bool, OrmError> {
        let id = instance.id()?;
        if let State::Executed(rows) = &self.state {
            return Ok(rows.iter().any(|row| row.id().map(|rid| rid == id).unwrap_or(false)));
        }
        self.session.check_table(self.model.name)?;
        let sql = assemble_membership(&self.model, &self.descriptor, id)?;
        let rows = self.session.fetch(&sql)?;
        let row = rows.into_iter().next().ok_or(OrmError::NotFound)?;
        let value = row.values().next().ok_or(OrmError::NotFound)?;
        Ok(value.is_truthy())
    }

    /// A summary row over one or more aggregate expressions, independent of
    /// this queryset's own projection (§4.4 "Variant statements —
    /// aggregate"). Always issues its own query.
    pub fn aggregate(&self, aggs: Vec<(Option<String>, Agg)>) -> Result<Row, OrmError> {
        if aggs.is_empty() {
            return Err(OrmError::misuse("aggregate() requires at least one aggregate expression"));
        }
        self.session.check_table(self.model.name)?;
        let sql = assemble_aggregate_group(&self.model, &self.descriptor, &aggs)?;
        let rows = self.session.fetch(&sql)?;
        rows.into_iter().next().ok_or(OrmError::NotFound)
    }

    /// `queryset[i]` (§4.5 "Indexing"). Non-negative `i` sets `offset=i,
    /// limit=1` on a fresh descriptor and executes a single-row fetch,
    /// rather than materializing the whole set and reading an offset out
    /// of it. Negative `i` prepends `-id` to `order_by` and re-enters with
    /// the equivalent non-negative offset under that reversed order
    /// (§4.5 "prepends `-id` to order_by; re-enters `[i]`").
    pub fn index(self, i: i64) -> Result<Instance, OrmError> {
        if i < 0 {
            let mut descriptor = self.descriptor.clone();
            descriptor.order_by.insert(0, OrderTerm { path: "id".to_string(), descending: true });
            return self.fresh(descriptor).index(-i - 1);
        }
        let mut bounded = self.with_offset(i as u64).with_limit(1);
        bounded.execute()?;
        match bounded.state {
            State::Executed(mut rows) => rows.pop().ok_or(OrmError::NotFound),
            State::Unexecuted => unreachable!("execute() just ran"),
        }
    }

    /// `get(predicate)` (§4.5): `filter(predicate)[0]`, swallowing
    /// *not-found* into `None` rather than propagating it (§7
    /// "Not-found").
    pub fn get(self, predicate: Q) -> Result<Option<Instance>, OrmError> {
        match self.filter(predicate).index(0) {
            Ok(instance) => Ok(Some(instance)),
            Err(OrmError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// `queryset[start:end]` with `0 <= start < end` (§4.5 "Slicing"):
    /// sets offset/limit on a cloned descriptor and hands back a
    /// read-only [`QuerySetSlice`] that re-executes its own SELECT on
    /// every access rather than snapshotting rows once.
    pub fn slice(self, start: i64, end: Option<i64>) -> Result<QuerySetSlice, OrmError> {
        if start < 0 || end.is_some_and(|e| e <= start) {
            return Err(OrmError::misuse(format!(
                "slice bounds must satisfy 0 <= start < end, got [{start}:{end:?}]"
            )));
        }
        let mut descriptor = self.descriptor.clone();
        descriptor.offset = Some(start as u64);
        if let Some(end) = end {
            descriptor.limit = Some((end - start) as u64);
        }
        Ok(QuerySetSlice { session: self.session, model: self.model, descriptor })
    }

    /// `queryset[::-1]` (§4.5 "Slicing"): prepends `-id` to order_by and
    /// returns a fresh, unexecuted queryset under the reversed order —
    /// no execution happens until a terminal method runs.
    pub fn reversed(self) -> QuerySet {
        let mut descriptor = self.descriptor.clone();
        descriptor.order_by.insert(0, OrderTerm { path: "id".to_string(), descending: true });
        self.fresh(descriptor)
    }

    /// `UPDATE ... WHERE <this descriptor's ids>` (§4.4 "Variant statements
    /// — UPDATE-by-query"), mirrored into any already-hydrated instances so
    /// a caller holding onto them doesn't read stale values back (§4.5
    /// "Update mirrors into hydrated instances").
    pub fn update(&mut self, assignments: Vec<(String, Value)>) -> Result<(), OrmError> {
        self.session.check_table(self.model.name)?;
        let sql = assemble_update(&self.model, &self.descriptor, &assignments)?;
        self.session.execute(&sql)?;
        if let State::Executed(rows) = &mut self.state {
            for row in rows.iter_mut() {
                for (name, value) in &assignments {
                    row.set_raw(name, value.clone());
                }
            }
        }
        Ok(())
    }

    /// `DELETE ... WHERE <this descriptor's ids>` (§4.4 "Variant statements
    /// — DELETE-by-query"). Leaves this queryset executed with zero rows.
    pub fn delete(&mut self) -> Result<(), OrmError> {
        self.session.check_table(self.model.name)?;
        let sql = assemble_delete(&self.model, &self.descriptor)?;
        self.session.execute(&sql)?;
        self.state = State::Executed(Vec::new());
        Ok(())
    }

    /// Forces execution and hands back every hydrated instance.
    pub fn into_vec(mut self) -> Result<Vec<Instance>, OrmError> {
        self.execute()?;
        match self.state {
            State::Executed(rows) => Ok(rows),
            State::Unexecuted => unreachable!("execute() just ran"),
        }
    }

    pub fn len(&mut self) -> Result<usize, OrmError> {
        self.execute()?;
        match &self.state {
            State::Executed(rows) => Ok(rows.len()),
            State::Unexecuted => unreachable!("execute() just ran"),
        }
    }

    pub fn is_empty(&mut self) -> Result<bool, OrmError> {
        Ok(self.len()? == 0)
    }
}

/// A read-only view over a bounded slice of a [`QuerySet`] (§4.5 "Slicing"
/// — "a read-only slice view that re-executes on access but forbids
/// mutation methods"). Carries the offset/limit-bounded descriptor rather
/// than a materialized `Vec`, so every access issues its own SELECT.
#[derive(Clone)]
pub struct QuerySetSlice {
    session: Session,
    model: ModelDef,
    descriptor: QueryDescriptor,
}

impl QuerySetSlice {
    fn fetch(&self) -> Result<Vec<Instance>, OrmError> {
        self.session.check_table(self.model.name)?;
        let sql = assemble_select(&self.model, &self.descriptor)?;
        let rows = self.session.fetch(&sql)?;
        rows.iter()
            .map(|row| Instance::hydrate(&self.model, row, &self.descriptor.select_related))
            .collect()
    }

    pub fn to_vec(&self) -> Result<Vec<Instance>, OrmError> {
        self.fetch()
    }

    pub fn len(&self) -> Result<usize, OrmError> {
        Ok(self.fetch()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, OrmError> {
        Ok(self.len()? == 0)
    }
}

fn as_i64(value: &Value) -> Result<i64, OrmError> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::UInt(u) => Ok(*u as i64),
        other => Err(OrmError::misuse(format!("expected an integer id column, got {other:?}"))),
    }
}

fn extract_i64(row: &Row, key: &str) -> Result<i64, OrmError> {
    row.get(key)
        .ok_or_else(|| OrmError::schema(format!("row missing expected column \"{key}\"")))
        .and_then(as_i64)
}
