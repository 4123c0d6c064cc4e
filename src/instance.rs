//! Hydrated model instance (§4.6): one row decoded through its model's
//! field codecs, with lazy foreign-key/many-to-many accessors that query
//! through a [`crate::session::Session`] only on first touch and cache the
//! result afterward.
//!
//! Grounded on the source's `ModelInstance`, whose `__getattr__` resolves a
//! link field by issuing a fresh query the first time it's read and
//! memoizing the result as a dynamic attribute. This rewrite makes that
//! memoization an explicit `RefCell`-backed cache rather than dynamic
//! attribute assignment; a missing link value (`NULL` FK) resolves to
//! `Ok(None)` instead of raising on access.
//!
//! `select_related`'s cache is keyed by the *full* dotted path rather than
//! nested per-hop, since the assembler itself only ever projects the
//! terminal model's columns for a multi-hop `select_related` path (§4.4
//! step 4) — an intermediate hop has nothing in the row to hydrate from.

use crate::driver::Row;
use crate::error::OrmError;
use crate::field::{FieldKind, Value};
use crate::model::{ModelDef, ModelRegistry};
use crate::query::join::plan_path;
use crate::query::predicate::Q;
use crate::session::Session;
use std::cell::RefCell;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Instance {
    model: ModelDef,
    values: BTreeMap<String, Value>,
    fk_cache: RefCell<BTreeMap<String, Option<Box<Instance>>>>,
    m2m_cache: RefCell<BTreeMap<String, Vec<Instance>>>,
}

impl Instance {
    /// Decodes `row` into an `Instance` of `model`, then hydrates every
    /// `select_related` path eagerly from the same row (§4.4 step 4, §4.6).
    pub fn hydrate(model: &ModelDef, row: &Row, select_related: &[String]) -> Result<Instance, OrmError> {
        let mut values = BTreeMap::new();
        for (name, field) in model.own_columns() {
            let raw = row.get(name).ok_or_else(|| {
                OrmError::schema(format!(
                    "row missing column \"{name}\" for model \"{}\"",
                    model.name
                ))
            })?;
            values.insert(name.to_string(), field.from_sql(raw)?);
        }
        let instance = Instance {
            model: model.clone(),
            values,
            fk_cache: RefCell::new(BTreeMap::new()),
            m2m_cache: RefCell::new(BTreeMap::new()),
        };
        for path in select_related {
            instance.hydrate_select_related(row, path)?;
        }
        Ok(instance)
    }

    fn hydrate_select_related(&self, row: &Row, path: &str) -> Result<(), OrmError> {
        let segments: Vec<String> = path.split("__").map(str::to_string).collect();
        let planned = plan_path(&self.model, &segments, 1, 0)?;
        if planned.hop_is_m2m.iter().any(|&is_m2m| is_m2m) {
            return Err(OrmError::misuse(format!(
                "select_related(\"{path}\") traverses a many-to-many field; use prefetch_related instead"
            )));
        }
        let prefix = format!("{path}__");
        let related_row: Row = row
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(prefix.as_str()).map(|c| (c.to_string(), v.clone())))
            .collect();
        let is_absent = match related_row.get("id") {
            Some(Value::Null) | None => true,
            _ => false,
        };
        let mut cache = self.fk_cache.borrow_mut();
        if is_absent {
            cache.insert(path.to_string(), None);
        } else {
            let related = Instance::hydrate(&planned.terminal_model, &related_row, &[])?;
            cache.insert(path.to_string(), Some(Box::new(related)));
        }
        Ok(())
    }

    pub fn model(&self) -> &ModelDef {
        &self.model
    }

    /// The decoded value of an own column. Errs if `name` isn't a column
    /// on this model, or wasn't projected by the query that produced this
    /// row (e.g. a `.values()`-style partial projection — not modeled
    /// here since every `Instance` is always fully hydrated).
    pub fn get(&self, name: &str) -> Result<&Value, OrmError> {
        self.values.get(name).ok_or_else(|| {
            OrmError::schema(format!(
                "model \"{}\" has no column \"{name}\"",
                self.model.name
            ))
        })
    }

    pub fn id(&self) -> Result<i64, OrmError> {
        match self.get("id")? {
            Value::Int(i) => Ok(*i),
            Value::UInt(u) => Ok(*u as i64),
            other => Err(OrmError::misuse(format!(
                "id column decoded to a non-integer value: {other:?}"
            ))),
        }
    }

    /// Lazily resolves a foreign-key field by name (§4.6). A path already
    /// hydrated by `select_related` (cached under its full dotted path) or
    /// seeded by `prefetch_related` is served from cache without a query.
    pub fn related(&self, session: &Session, field_name: &str) -> Result<Option<Instance>, OrmError> {
        if let Some(cached) = self.fk_cache.borrow().get(field_name) {
            return Ok(cached.as_ref().map(|boxed| (**boxed).clone()));
        }
        let field = self.model.field(field_name).ok_or_else(|| {
            OrmError::schema(format!(
                "model \"{}\" has no field \"{field_name}\"",
                self.model.name
            ))
        })?;
        let FieldKind::ForeignKey { ref_model, .. } = &field.kind else {
            return Err(OrmError::misuse(format!(
                "\"{field_name}\" on model \"{}\" is not a foreign key",
                self.model.name
            )));
        };
        let fk_value = self.get(field_name)?.clone();
        let result = match fk_value {
            Value::Null => None,
            Value::Int(id) => self.fetch_one(session, ref_model, id)?,
            Value::UInt(id) => self.fetch_one(session, ref_model, id as i64)?,
            other => {
                return Err(OrmError::misuse(format!(
                    "foreign key value is not an integer: {other:?}"
                )))
            }
        };
        self.fk_cache
            .borrow_mut()
            .insert(field_name.to_string(), result.clone().map(Box::new));
        Ok(result)
    }

    fn fetch_one(&self, session: &Session, ref_model: &str, id: i64) -> Result<Option<Instance>, OrmError> {
        let mut query_set = session.query_set(ref_model)?.filter(Q::new("id", id));
        query_set.execute()?;
        Ok(query_set.into_vec()?.into_iter().next())
    }

    /// Lazily resolves a many-to-many field by name (§4.6), joining through
    /// the field's junction table directly (the join planner itself only
    /// walks forward through named fields, and a referent model carries no
    /// named field pointing back at its owner). `prefetch_related` seeds
    /// this cache directly via [`Instance::seed_many`] so a prefetched
    /// instance never re-queries here.
    pub fn related_many(&self, session: &Session, field_name: &str) -> Result<Vec<Instance>, OrmError> {
        if let Some(cached) = self.m2m_cache.borrow().get(field_name) {
            return Ok(cached.clone());
        }
        let field = self.model.field(field_name).ok_or_else(|| {
            OrmError::schema(format!(
                "model \"{}\" has no field \"{field_name}\"",
                self.model.name
            ))
        })?;
        let FieldKind::ManyToMany { ref_model, .. } = &field.kind else {
            return Err(OrmError::misuse(format!(
                "\"{field_name}\" on model \"{}\" is not many-to-many",
                self.model.name
            )));
        };
        let ref_def = ModelRegistry::get(ref_model)?;
        session.check_table(self.model.name)?;
        let junction = format!("{}_{}", self.model.name, ref_model);
        let m1_col = format!("{}_id", self.model.name.to_lowercase());
        let m2_col = format!("{}_id", ref_model.to_lowercase());
        let id = self.id()?;
        let projection: Vec<String> = ref_def
            .own_columns()
            .map(|(name, _)| format!("{}.{name}", ref_def.table_name))
            .collect();
        let sql = format!(
            "SELECT {} FROM {} JOIN {junction} ON {}.id = {junction}.{m2_col} WHERE {junction}.{m1_col} = {id}",
            projection.join(", "),
            ref_def.table_name,
            ref_def.table_name,
        );
        let rows = session.fetch(&sql)?;
        let mut related = Vec::with_capacity(rows.len());
        for row in &rows {
            related.push(Instance::hydrate(&ref_def, row, &[])?);
        }
        self.m2m_cache.borrow_mut().insert(field_name.to_string(), related.clone());
        Ok(related)
    }

    /// Pre-seeds the many-to-many cache directly, bypassing a query — used
    /// by `prefetch_related`'s companion SELECT (§4.5 "Prefetch").
    pub fn seed_many(&mut self, field_name: &str, related: Vec<Instance>) {
        self.m2m_cache.get_mut().insert(field_name.to_string(), related);
    }

    /// Pre-seeds the foreign-key cache directly, bypassing a query — used
    /// by `prefetch_related`'s companion SELECT over an FK hop (§4.5
    /// "Prefetch").
    pub fn seed_one(&mut self, field_name: &str, related: Option<Instance>) {
        self.fk_cache.get_mut().insert(field_name.to_string(), related.map(Box::new));
    }

    /// Appends one related instance to the many-to-many cache under
    /// `field_name`, starting a fresh cache if this is the first push and
    /// skipping a duplicate id — used when `prefetch_related`'s companion
    /// SELECT discovers a parent/child edge row by row rather than all at
    /// once (§4.5 "Prefetch").
    pub fn push_many(&mut self, field_name: &str, related: Instance) {
        let new_id = related.id().ok();
        let list = self.m2m_cache.get_mut().entry(field_name.to_string()).or_default();
        if new_id.is_none() || !list.iter().any(|existing| existing.id().ok() == new_id) {
            list.push(related);
        }
    }

    /// Marks a many-to-many field's cache as loaded-but-empty, so a root
    /// instance a prefetch path never matched still avoids a later query
    /// (§4.5 "Prefetch").
    pub fn push_many_empty(&mut self, field_name: &str) {
        self.m2m_cache.get_mut().entry(field_name.to_string()).or_default();
    }

    /// Whether `field_name`'s many-to-many cache has already been loaded
    /// (by a query or by `prefetch_related`), without triggering one.
    pub fn related_many_cached(&self, field_name: &str) -> Option<Vec<Instance>> {
        self.m2m_cache.borrow().get(field_name).cloned()
    }

    /// Overwrites an already-hydrated column's in-memory value without
    /// issuing any SQL — used by `QuerySet::update` to keep already-executed
    /// instances consistent with a query-level `UPDATE` it just issued
    /// (§4.5 "Update mirrors into hydrated instances").
    pub(crate) fn set_raw(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    /// Writes every own column except `id` back to the row by id (§4.6
    /// "save"). Does not re-read the row afterward.
    pub fn save(&self, session: &Session) -> Result<(), OrmError> {
        let id = self.id()?;
        let mut set_parts = Vec::new();
        for (name, field) in self.model.own_columns() {
            if name == "id" {
                continue;
            }
            let value = self.values.get(name).cloned().unwrap_or(Value::Null);
            set_parts.push(format!("{name} = {}", field.to_sql(&value)?));
        }
        if set_parts.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "UPDATE {} SET {} WHERE id = {id}",
            self.model.table_name,
            set_parts.join(", ")
        );
        session.execute(&sql)
    }

    pub fn delete(&self, session: &Session) -> Result<(), OrmError> {
        let id = self.id()?;
        session.execute(&format!("DELETE FROM {} WHERE id = {id}", self.model.table_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldDef, FieldKind as FK, RefAction};
    use crate::model::ModelBuilder;
    use std::collections::BTreeMap as Map;

    fn register_fixture() {
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
                .field("capacity", FieldDef::new(FK::Int))
                .unwrap()
                .build(),
        );
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        let mut row: Row = Map::new();
        for (k, v) in pairs {
            row.insert(k.to_string(), v.clone());
        }
        row
    }

    #[test]
    fn hydrate_decodes_own_columns_including_fk_id() {
        register_fixture();
        let plane = ModelRegistry::get("Plane").unwrap();
        let instance = Instance::hydrate(
            &plane,
            &row(&[("id", Value::Int(1)), ("airline", Value::Int(7)), ("capacity", Value::Int(180))]),
            &[],
        )
        .unwrap();
        assert_eq!(instance.id().unwrap(), 1);
        assert_eq!(*instance.get("airline").unwrap(), Value::Int(7));
        assert_eq!(*instance.get("capacity").unwrap(), Value::Int(180));
    }

    #[test]
    fn select_related_with_null_fk_caches_none() {
        register_fixture();
        let plane = ModelRegistry::get("Plane").unwrap();
        let instance = Instance::hydrate(
            &plane,
            &row(&[
                ("id", Value::Int(1)),
                ("airline", Value::Null),
                ("capacity", Value::Int(180)),
                ("airline__id", Value::Null),
                ("airline__country", Value::Null),
            ]),
            &["airline".to_string()],
        )
        .unwrap();
        assert!(matches!(instance.fk_cache.borrow().get("airline"), Some(None)));
    }

    #[test]
    fn seed_many_avoids_later_query() {
        register_fixture();
        let plane = ModelRegistry::get("Plane").unwrap();
        let mut instance = Instance::hydrate(
            &plane,
            &row(&[("id", Value::Int(1)), ("airline", Value::Int(7)), ("capacity", Value::Int(180))]),
            &[],
        )
        .unwrap();
        instance.seed_many("routes", Vec::new());
        assert!(instance.m2m_cache.borrow().contains_key("routes"));
    }
}
