//! Session (§3 "Lifecycles", §6 "Driver contract"): the single handle a
//! caller opens once and threads through every query set, raw query, and
//! model-level operation. Ties together a [`Connector`], its [`Config`],
//! and the process-wide [`ModelRegistry`].
//!
//! Grounded on the source's `Model` class methods (`create`, `bulk_create`,
//! `check_table`) — there they hang directly off each model class via a
//! shared module-level connection; here they hang off an explicit,
//! cloneable handle instead, since Rust has no metaclass-style machinery to
//! attach them to a type built from data (§1 "Model declarations ... as
//! data, not as code").

use crate::container::QuerySet;
use crate::driver::{with_cursor, Connector, Row};
use crate::config::Config;
use crate::error::OrmError;
use crate::field::Value;
use crate::instance::Instance;
use crate::model::ModelRegistry;
use crate::query::predicate::Q;
use std::sync::Arc;
use tracing::debug;

/// A connection/config-holding handle, cheap to clone (an `Arc` around the
/// connector plus an owned [`Config`]) so every [`QuerySet`] can carry its
/// own copy without a lifetime.
#[derive(Clone)]
pub struct Session {
    connector: Arc<dyn Connector + Send + Sync>,
    config: Config,
}

impl Session {
    pub fn new(connector: Arc<dyn Connector + Send + Sync>, config: Config) -> Session {
        Session { connector, config }
    }

    pub(crate) fn fetch(&self, sql: &str) -> Result<Vec<Row>, OrmError> {
        debug!("[Session::fetch] {sql}");
        with_cursor(self.connector.as_ref(), &self.config, true, |cursor| {
            cursor.execute(sql)?;
            cursor.fetchall()
        })
    }

    pub(crate) fn execute(&self, sql: &str) -> Result<(), OrmError> {
        debug!("[Session::execute] {sql}");
        with_cursor(self.connector.as_ref(), &self.config, false, |cursor| {
            cursor.execute(sql)?;
            cursor.fetchall()?;
            Ok(())
        })
    }

    /// An unexecuted [`QuerySet`] over `model_name` (§4.5).
    pub fn query_set(&self, model_name: &str) -> Result<QuerySet, OrmError> {
        let model = ModelRegistry::get(model_name)?;
        Ok(QuerySet::new(self.clone(), model))
    }

    /// Creates `model_name`'s table (and the junction tables any of its
    /// many-to-many fields own) the first time it's needed, mirroring the
    /// source's lazy `check_table` call at the top of every entry point
    /// (§3 "Lifecycles").
    pub fn check_table(&self, model_name: &str) -> Result<(), OrmError> {
        let model = ModelRegistry::get(model_name)?;
        let existing = self.fetch("SHOW TABLES")?;
        let present = existing.iter().any(|row| {
            row.values()
                .any(|v| matches!(v, Value::Str(s) if s == &model.table_name))
        });
        if !present {
            self.execute(&model.create_table_sql()?)?;
        }
        for (junction, ddl) in model.junction_table_ddl() {
            let junction_present = existing
                .iter()
                .any(|row| row.values().any(|v| matches!(v, Value::Str(s) if s == &junction)));
            if !junction_present {
                self.execute(&ddl)?;
            }
        }
        Ok(())
    }

    pub fn drop_table(&self, model_name: &str) -> Result<(), OrmError> {
        let model = ModelRegistry::get(model_name)?;
        self.execute(&format!("DROP TABLE IF EXISTS {}", model.table_name))
    }

    /// `INSERT`s one row, then re-fetches it via `get(**fields)` (source's
    /// `Model.create`) so the returned instance carries the server-assigned
    /// `id` and any column defaults.
    pub fn create(&self, model_name: &str, fields: &[(String, Value)]) -> Result<Instance, OrmError> {
        if fields.is_empty() {
            return Err(OrmError::misuse("create() requires at least one field"));
        }
        let model = ModelRegistry::get(model_name)?;
        self.check_table(model_name)?;
        let mut names = Vec::with_capacity(fields.len());
        let mut literals = Vec::with_capacity(fields.len());
        for (name, value) in fields {
            let field = model
                .field(name)
                .ok_or_else(|| OrmError::schema(format!("unknown field \"{name}\" on model \"{model_name}\"")))?;
            names.push(name.clone());
            literals.push(field.to_sql(value)?);
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            model.table_name,
            names.join(", "),
            literals.join(", ")
        );
        self.execute(&sql)?;
        let conjunction = Q::all_of(fields.iter().map(|(n, v)| Q::new(n, v.clone())).collect())?;
        let mut query_set = self.query_set(model_name)?.filter(conjunction).order_by("-id");
        query_set.execute()?;
        query_set
            .into_vec()?
            .into_iter()
            .next()
            .ok_or(OrmError::NotFound)
    }

    /// `INSERT`s every row in one statement, then returns a [`QuerySet`]
    /// matching the `OR` of each row's exact field conjunction (source's
    /// `Model.bulk_create`) — unexecuted, so the caller decides whether to
    /// pay for the follow-up `SELECT`.
    pub fn bulk_create(&self, model_name: &str, rows: &[Vec<(String, Value)>]) -> Result<QuerySet, OrmError> {
        if rows.is_empty() {
            return Err(OrmError::misuse("bulk_create() requires at least one row"));
        }
        let keys: Vec<&str> = rows[0].iter().map(|(n, _)| n.as_str()).collect();
        for row in &rows[1..] {
            let row_keys: Vec<&str> = row.iter().map(|(n, _)| n.as_str()).collect();
            if row_keys != keys {
                return Err(OrmError::misuse("bulk_create() rows must all declare the same fields"));
            }
        }
        let model = ModelRegistry::get(model_name)?;
        self.check_table(model_name)?;
        let mut value_tuples = Vec::with_capacity(rows.len());
        for row in rows {
            let mut literals = Vec::with_capacity(row.len());
            for (name, value) in row {
                let field = model
                    .field(name)
                    .ok_or_else(|| OrmError::schema(format!("unknown field \"{name}\" on model \"{model_name}\"")))?;
                literals.push(field.to_sql(value)?);
            }
            value_tuples.push(format!("({})", literals.join(", ")));
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            model.table_name,
            keys.join(", "),
            value_tuples.join(", ")
        );
        self.execute(&sql)?;
        let disjunction = Q::any_of(
            rows.iter()
                .map(|row| Q::all_of(row.iter().map(|(n, v)| Q::new(n, v.clone())).collect()))
                .collect::<Result<Vec<Q>, OrmError>>()?,
        )?;
        Ok(self.query_set(model_name)?.filter(disjunction))
    }
}
