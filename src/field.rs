//! Field catalog: the typed column descriptors every [`crate::model::Model`]
//! is built out of. Each field kind knows its own DDL fragment and how to
//! move a value to and from SQL text.

use crate::error::OrmError;
use chrono::NaiveDateTime;
use std::time::Duration;

/// Dynamic value carried in and out of the field codecs. Rows coming back
/// from the driver, literals passed to `filter`/`create`, and defaults all
/// flow through this type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bool(bool),
    DateTime(NaiveDateTime),
    Duration(Duration),
    Json(serde_json::Value),
    /// A tuple of values, used by the `range` and `in` operator tags.
    Tuple(Vec<Value>),
}

impl Value {
    /// Truthiness as used by `isnull`'s "falsy" test (`IS NOT NULL` when the
    /// value passed is falsy).
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::UInt(u) => *u != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}
impl From<Duration> for Value {
    fn from(v: Duration) -> Self {
        Value::Duration(v)
    }
}
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

/// On delete / on update referential actions available to link fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefAction {
    Cascade,
    Restrict,
    SetNull,
    SetDefault,
    NoAction,
}

impl RefAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            RefAction::Cascade => "CASCADE",
            RefAction::Restrict => "RESTRICT",
            RefAction::SetNull => "SET NULL",
            RefAction::SetDefault => "SET DEFAULT",
            RefAction::NoAction => "NO ACTION",
        }
    }
}

/// The scalar/link kind a [`FieldDef`] describes. Link kinds carry the
/// referenced model's name rather than an owning reference, so model
/// definitions can be cyclic (resolved later through the registry).
#[derive(Debug, Clone)]
pub enum FieldKind {
    Int,
    UnsignedInt,
    Float,
    Varchar { size: u32 },
    Text,
    DateTime,
    Duration,
    Bool,
    Json,
    ForeignKey {
        ref_model: &'static str,
        on_delete: RefAction,
        on_update: RefAction,
    },
    ManyToMany {
        ref_model: &'static str,
        on_delete: RefAction,
        on_update: RefAction,
    },
}

impl FieldKind {
    pub fn is_link(&self) -> bool {
        matches!(self, FieldKind::ForeignKey { .. } | FieldKind::ManyToMany { .. })
    }

    pub fn is_many_to_many(&self) -> bool {
        matches!(self, FieldKind::ManyToMany { .. })
    }

    fn sql_type(&self) -> String {
        match self {
            FieldKind::Int => "int".to_string(),
            FieldKind::UnsignedInt => "int unsigned".to_string(),
            FieldKind::Float => "float".to_string(),
            FieldKind::Varchar { size } => format!("VARCHAR({size})"),
            FieldKind::Text => "TEXT".to_string(),
            FieldKind::DateTime => "DATETIME".to_string(),
            FieldKind::Duration => "int".to_string(),
            FieldKind::Bool => "bit".to_string(),
            FieldKind::Json => "JSON".to_string(),
            FieldKind::ForeignKey { .. } => "int".to_string(),
            FieldKind::ManyToMany { .. } => unreachable!("ManyToMany owns no column"),
        }
    }
}

/// A declared model field: its kind plus the common attributes every kind
/// shares (nullability, uniqueness, default, allowed-values enum).
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub kind: FieldKind,
    pub null: bool,
    pub unique: bool,
    pub default: Option<Value>,
    pub choices: Vec<Value>,
}

impl FieldDef {
    pub fn new(kind: FieldKind) -> Self {
        FieldDef {
            kind,
            null: true,
            unique: false,
            default: None,
            choices: Vec::new(),
        }
    }

    pub fn null(mut self, null: bool) -> Self {
        self.null = null;
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn choices(mut self, choices: Vec<Value>) -> Self {
        self.choices = choices;
        self
    }

    /// The `<name> <TYPE> [UNIQUE] [NOT NULL] [DEFAULT v] [CHECK (...)]`
    /// DDL fragment for this field, plus the `FOREIGN KEY` clause for FKs.
    /// `ManyToManyField`s own no column on either side and return an empty
    /// string here; their DDL lives entirely in the junction table.
    pub fn ddl(&self, name: &str) -> Result<String, OrmError> {
        if self.kind.is_many_to_many() {
            return Ok(String::new());
        }
        let mut out = format!("{name} {}", self.kind.sql_type());
        if self.unique {
            out.push_str(" UNIQUE");
        }
        if !self.null {
            out.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            out.push_str(&format!(" DEFAULT {}", self.to_sql(default)?));
        }
        if !self.choices.is_empty() {
            let literals: Result<Vec<String>, OrmError> =
                self.choices.iter().map(|c| self.to_sql(c)).collect();
            out.push_str(&format!(" CHECK ({name} IN ({}))", literals?.join(", ")));
        }
        if let FieldKind::ForeignKey {
            ref_model,
            on_delete,
            on_update,
        } = &self.kind
        {
            let ref_table = format!("{ref_model}s");
            out.push_str(&format!(
                ", FOREIGN KEY ({name}) REFERENCES {ref_table} (id) ON DELETE {} ON UPDATE {}",
                on_delete.as_sql(),
                on_update.as_sql()
            ));
        }
        Ok(out)
    }

    /// Value → SQL literal. Strings are quoted, datetimes formatted
    /// `YYYY-MM-DD HH:MM:SS`, booleans rendered `0`/`1`, JSON encoded and
    /// quoted, durations rendered as integer seconds.
    pub fn to_sql(&self, value: &Value) -> Result<String, OrmError> {
        if matches!(value, Value::Null) {
            return Ok("NULL".to_string());
        }
        match (&self.kind, value) {
            (FieldKind::Int, Value::Int(i)) => Ok(i.to_string()),
            (FieldKind::UnsignedInt, Value::UInt(u)) => Ok(u.to_string()),
            (FieldKind::UnsignedInt, Value::Int(i)) => Ok(i.to_string()),
            (FieldKind::Float, Value::Float(f)) => Ok(f.to_string()),
            (FieldKind::Varchar { .. }, Value::Str(s)) => Ok(quote_str(s)),
            (FieldKind::Text, Value::Str(s)) => Ok(quote_str(s)),
            (FieldKind::DateTime, Value::DateTime(dt)) => {
                Ok(format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S")))
            }
            (FieldKind::Bool, Value::Bool(b)) => Ok((*b as i32).to_string()),
            (FieldKind::Json, Value::Json(j)) => Ok(quote_str(&j.to_string())),
            (FieldKind::Duration, Value::Duration(d)) => Ok(d.as_secs().to_string()),
            (FieldKind::ForeignKey { .. }, Value::Int(i)) => Ok(i.to_string()),
            (FieldKind::ForeignKey { .. }, Value::UInt(u)) => Ok(u.to_string()),
            (kind, other) => Err(OrmError::misuse(format!(
                "wrong value type for field of kind {kind:?}: got {other:?}"
            ))),
        }
    }

    /// SQL value → value, the inverse of [`FieldDef::to_sql`] applied to a
    /// row the driver has already decoded into a [`Value`].
    pub fn from_sql(&self, raw: &Value) -> Result<Value, OrmError> {
        if matches!(raw, Value::Null) {
            return Ok(Value::Null);
        }
        match &self.kind {
            FieldKind::Int | FieldKind::ForeignKey { .. } => Ok(Value::Int(coerce_i64(raw)?)),
            FieldKind::UnsignedInt => Ok(Value::UInt(coerce_i64(raw)? as u64)),
            FieldKind::Float => Ok(Value::Float(coerce_f64(raw)?)),
            FieldKind::Varchar { .. } | FieldKind::Text => Ok(Value::Str(coerce_str(raw)?)),
            FieldKind::DateTime => match raw {
                Value::DateTime(dt) => Ok(Value::DateTime(*dt)),
                Value::Str(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                    .map(Value::DateTime)
                    .map_err(|e| OrmError::misuse(format!("bad datetime literal '{s}': {e}"))),
                other => Err(OrmError::misuse(format!("cannot decode datetime from {other:?}"))),
            },
            FieldKind::Bool => Ok(Value::Bool(coerce_i64(raw)? != 0)),
            FieldKind::Json => match raw {
                Value::Json(j) => Ok(Value::Json(j.clone())),
                Value::Str(s) => serde_json::from_str(s)
                    .map(Value::Json)
                    .map_err(|e| OrmError::misuse(format!("bad json literal: {e}"))),
                other => Err(OrmError::misuse(format!("cannot decode json from {other:?}"))),
            },
            FieldKind::Duration => Ok(Value::Duration(Duration::from_secs(coerce_i64(raw)? as u64))),
            FieldKind::ManyToMany { .. } => {
                Err(OrmError::misuse("ManyToManyField has no scalar SQL representation"))
            }
        }
    }
}

fn coerce_i64(v: &Value) -> Result<i64, OrmError> {
    match v {
        Value::Int(i) => Ok(*i),
        Value::UInt(u) => Ok(*u as i64),
        Value::Bool(b) => Ok(*b as i64),
        Value::Str(s) => s
            .parse()
            .map_err(|_| OrmError::misuse(format!("expected integer, got '{s}'"))),
        other => Err(OrmError::misuse(format!("expected integer, got {other:?}"))),
    }
}

fn coerce_f64(v: &Value) -> Result<f64, OrmError> {
    match v {
        Value::Float(f) => Ok(*f),
        Value::Int(i) => Ok(*i as f64),
        Value::Str(s) => s
            .parse()
            .map_err(|_| OrmError::misuse(format!("expected float, got '{s}'"))),
        other => Err(OrmError::misuse(format!("expected float, got {other:?}"))),
    }
}

fn coerce_str(v: &Value) -> Result<String, OrmError> {
    match v {
        Value::Str(s) => Ok(s.clone()),
        other => Err(OrmError::misuse(format!("expected string, got {other:?}"))),
    }
}

/// Quotes a string for SQL, escaping embedded single quotes. This is the
/// "leaf's field codec" quoting referenced by §4.1 — `LIKE`-style operators
/// strip these surrounding quotes back off before re-wrapping with `%`.
pub fn quote_str(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Renders a [`Value`] as a SQL literal purely off its own variant, with no
/// field context. Used by the predicate/aggregate renderers, whose leaves
/// may compare against a column (`FieldDef`-typed) or an annotation alias
/// (untyped) alike — both quote the same way.
pub fn render_value(value: &Value) -> Result<String, OrmError> {
    match value {
        Value::Null => Ok("NULL".to_string()),
        Value::Int(i) => Ok(i.to_string()),
        Value::UInt(u) => Ok(u.to_string()),
        Value::Float(f) => Ok(f.to_string()),
        Value::Str(s) => Ok(quote_str(s)),
        Value::Bool(b) => Ok((*b as i32).to_string()),
        Value::DateTime(dt) => Ok(format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S"))),
        Value::Duration(d) => Ok(d.as_secs().to_string()),
        Value::Json(j) => Ok(quote_str(&j.to_string())),
        Value::Tuple(_) => Err(OrmError::misuse(
            "a tuple value cannot be rendered as a single SQL literal",
        )),
    }
}

/// Unwraps a string value for the `*startswith`/`*endswith`/`*contains`
/// operator tags, which need the raw text to re-wrap with `%` (§4.1).
pub fn raw_str(value: &Value) -> Result<&str, OrmError> {
    match value {
        Value::Str(s) => Ok(s.as_str()),
        other => Err(OrmError::misuse(format!(
            "expected a string value for this operator, got {other:?}"
        ))),
    }
}

/// Escapes a raw string for embedding inside a single-quoted `LIKE`
/// pattern, without adding the surrounding quotes itself (§6 "LIKE-style
/// operator escaping").
pub fn escape_like(raw: &str) -> String {
    raw.replace('\'', "''")
}
