//! Model registry: the authoritative owner of every model's field list.
//!
//! The source ORM declares models as classes walked via `dir()`; the typed
//! rewrite models the same thing as data, built once with [`ModelBuilder`]
//! and registered by name in [`ModelRegistry`]. Link fields store the
//! referenced model's name rather than an owning reference so definitions
//! may be mutually cyclic (§9, "Cyclic model references").

use crate::error::OrmError;
use crate::field::{FieldDef, FieldKind};
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};
use tracing::debug;

/// An ordered `name → Field` mapping plus the table name it backs.
#[derive(Debug, Clone)]
pub struct ModelDef {
    pub name: &'static str,
    pub table_name: String,
    /// Declaration order is preserved; the synthetic `id` field is always
    /// first.
    fields: Vec<(String, FieldDef)>,
    index: HashMap<String, usize>,
}

impl ModelDef {
    pub fn table_name_for(model_name: &str) -> String {
        format!("{model_name}s")
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.index.get(name).map(|&i| &self.fields[i].1)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Every field in declaration order, `id` first.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldDef)> {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }

    /// Scalar (non-link) fields, in declaration order.
    pub fn scalar_fields(&self) -> impl Iterator<Item = (&str, &FieldDef)> {
        self.fields().filter(|(_, f)| !f.kind.is_link())
    }

    /// Every field that owns a real column on this model's table: scalars
    /// plus foreign keys, many-to-many excluded (§4.4 step 6, "M2M
    /// excluded" — a foreign key's id column is still projected). This is
    /// the set the assembler's base projection and `select_related`
    /// terminal projection iterate.
    pub fn own_columns(&self) -> impl Iterator<Item = (&str, &FieldDef)> {
        self.fields().filter(|(_, f)| !f.kind.is_many_to_many())
    }

    /// Foreign-key fields, in declaration order.
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&str, &FieldDef)> {
        self.fields()
            .filter(|(_, f)| matches!(f.kind, FieldKind::ForeignKey { .. }))
    }

    /// Many-to-many fields, in declaration order.
    pub fn many_to_many_fields(&self) -> impl Iterator<Item = (&str, &FieldDef)> {
        self.fields().filter(|(_, f)| f.kind.is_many_to_many())
    }

    /// The `CREATE TABLE IF NOT EXISTS` statement for this model's own
    /// table (junction tables for M2M fields are separate, see
    /// [`ModelDef::junction_table_ddl`]).
    pub fn create_table_sql(&self) -> Result<String, OrmError> {
        let mut columns = vec!["id int NOT NULL UNIQUE AUTO_INCREMENT".to_string(), "PRIMARY KEY (id)".to_string()];
        for (name, field) in self.fields() {
            if name == "id" {
                continue;
            }
            let ddl = field.ddl(name)?;
            if !ddl.is_empty() {
                columns.push(ddl);
            }
        }
        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.table_name,
            columns.join(", ")
        ))
    }

    /// One `CREATE TABLE IF NOT EXISTS <a>_<b> (...)` statement per
    /// many-to-many field declared on this model.
    pub fn junction_table_ddl(&self) -> Vec<(String, String)> {
        self.many_to_many_fields()
            .map(|(_, field)| {
                let FieldKind::ManyToMany {
                    ref_model,
                    on_delete,
                    on_update,
                } = &field.kind
                else {
                    unreachable!()
                };
                let m1 = self.name;
                let m2 = *ref_model;
                let junction = format!("{m1}_{m2}");
                let m1_col = format!("{}_id", m1.to_lowercase());
                let m2_col = format!("{}_id", m2.to_lowercase());
                let m1_table = ModelDef::table_name_for(m1);
                let m2_table = ModelDef::table_name_for(m2);
                let ddl = format!(
                    "CREATE TABLE IF NOT EXISTS {junction} ({m1_col} int, \
                     FOREIGN KEY ({m1_col}) REFERENCES {m1_table} (id) ON DELETE CASCADE ON UPDATE CASCADE, \
                     {m2_col} int, \
                     FOREIGN KEY ({m2_col}) REFERENCES {m2_table} (id) ON DELETE {} ON UPDATE {}, \
                     UNIQUE ({m1_col}, {m2_col}))",
                    on_delete.as_sql(),
                    on_update.as_sql()
                );
                (junction, ddl)
            })
            .collect()
    }
}

/// Builds a [`ModelDef`], validating field names as it goes (§3 invariant 4:
/// no `__` in a field name, no user field named `id`).
pub struct ModelBuilder {
    name: &'static str,
    fields: Vec<(String, FieldDef)>,
}

impl ModelBuilder {
    pub fn new(name: &'static str) -> Self {
        ModelBuilder {
            name,
            fields: vec![("id".to_string(), FieldDef::new(FieldKind::Int).null(false).unique(true))],
        }
    }

    pub fn field(mut self, name: &str, field: FieldDef) -> Result<Self, OrmError> {
        validate_field_name(name)?;
        self.fields.push((name.to_string(), field));
        Ok(self)
    }

    pub fn build(self) -> ModelDef {
        let index = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, (n, _))| (n.clone(), i))
            .collect();
        ModelDef {
            name: self.name,
            table_name: ModelDef::table_name_for(self.name),
            fields: self.fields,
            index,
        }
    }
}

fn validate_field_name(name: &str) -> Result<(), OrmError> {
    if name.contains("__") {
        return Err(OrmError::schema(format!(
            "field name must not contain \"__\": \"{name}\""
        )));
    }
    if name == "id" {
        return Err(OrmError::schema(
            "you cannot name your model field \"id\"; this field name is reserved",
        ));
    }
    Ok(())
}

/// Process-wide, read-mostly registry of every declared model. Populated
/// once at process start (§3 "Lifecycles"); every later lookup is a simple
/// read-lock.
pub struct ModelRegistry {
    models: RwLock<HashMap<&'static str, ModelDef>>,
}

static REGISTRY: OnceLock<ModelRegistry> = OnceLock::new();

impl ModelRegistry {
    fn global() -> &'static ModelRegistry {
        REGISTRY.get_or_init(|| ModelRegistry {
            models: RwLock::new(HashMap::new()),
        })
    }

    /// Registers a model definition. Link targets must already be
    /// registered (FK targets initialised before owners, §9 "Process-wide
    /// state") — this only matters for `get`/`create_table_sql`, since link
    /// fields store the referent's name, not a reference.
    pub fn register(def: ModelDef) {
        debug!("[ModelRegistry::register] registering model \"{}\"", def.name);
        let mut models = Self::global().models.write().expect("model registry lock poisoned");
        models.insert(def.name, def);
    }

    pub fn get(name: &str) -> Result<ModelDef, OrmError> {
        let models = Self::global().models.read().expect("model registry lock poisoned");
        models
            .get(name)
            .cloned()
            .ok_or_else(|| OrmError::schema(format!("model \"{name}\" is not registered")))
    }
}
