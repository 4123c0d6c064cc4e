//! Raw query wrapper (§4.7): a textual `SELECT` a caller trusts over a
//! model's table, exposed as a lazy result container once it passes a
//! whitelist validation pass.
//!
//! Grounded on the teacher's `sql_parser.rs` family, which classifies SQL
//! text into clauses and tokens for autocompletion; a full tokenizer is
//! more than this wrapper needs, since it never has to understand the
//! statement, only reject anything outside the allowed grammar. It uses
//! the same `regex` crate the teacher already depends on for that purpose
//! instead.

use crate::driver::Row;
use crate::error::OrmError;
use crate::instance::Instance;
use crate::model::{ModelDef, ModelRegistry};
use crate::session::Session;
use regex::Regex;
use std::sync::OnceLock;

/// `SELECT <projection> FROM <table>[ AS <alias>][ <JOIN ...>]*[ WHERE ...]
/// [ GROUP BY ...][ HAVING ...][ ORDER BY ...][ LIMIT ...][ OFFSET ...]
/// [ FOR UPDATE|SHARE]`, case-insensitive, anchored at both ends so nothing
/// can hide a second statement after a terminator.
fn whitelist() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = concat!(
            r"(?is)^\s*SELECT\s+.+?\s+FROM\s+`?[A-Za-z_][A-Za-z0-9_]*`?(\s+AS\s+[A-Za-z_][A-Za-z0-9_]*)?",
            r"(\s+(LEFT\s+|RIGHT\s+|INNER\s+)?JOIN\s+.+?\s+ON\s+.+?)*",
            r"(\s+WHERE\s+.+?)?",
            r"(\s+GROUP\s+BY\s+.+?)?",
            r"(\s+HAVING\s+.+?)?",
            r"(\s+ORDER\s+BY\s+.+?)?",
            r"(\s+LIMIT\s+\d+)?",
            r"(\s+OFFSET\s+\d+)?",
            r"(\s+FOR\s+(UPDATE|SHARE))?\s*;?\s*$",
        );
        Regex::new(pattern).expect("raw query whitelist pattern is a fixed, valid regex")
    })
}

/// A raw SQL `SELECT` validated against the whitelist grammar and bound to
/// one model, so its rows can still be hydrated through that model's field
/// codecs (§4.7).
pub struct RawQuery {
    session: Session,
    model: ModelDef,
    sql: String,
}

impl RawQuery {
    /// Validates `sql` against the whitelist grammar before accepting it.
    /// Anything outside `SELECT ... FROM <table's own table> ...` fails
    /// *misuse* — this never reaches the database (§7 "Propagation
    /// policy").
    pub fn new(session: Session, model_name: &str, sql: impl Into<String>) -> Result<RawQuery, OrmError> {
        let model = ModelRegistry::get(model_name)?;
        let sql = sql.into();
        if !whitelist().is_match(&sql) {
            return Err(OrmError::misuse(format!(
                "raw query does not match the allowed SELECT grammar: \"{sql}\""
            )));
        }
        Ok(RawQuery { session, model, sql })
    }

    /// Executes the statement and hydrates every row through this raw
    /// query's bound model. Lazy: nothing runs until this is called
    /// (§4.7 "Iteration/indexing execute lazily").
    pub fn fetch(&self) -> Result<Vec<Instance>, OrmError> {
        let rows: Vec<Row> = self.session.fetch(&self.sql)?;
        rows.iter().map(|row| Instance::hydrate(&self.model, row, &[])).collect()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::driver::fake::FakeConnector;
    use crate::field::{FieldDef, FieldKind, Value};
    use crate::model::ModelBuilder;
    use std::sync::Arc;

    fn test_session() -> Session {
        Session::new(
            Arc::new(FakeConnector::new()),
            Config {
                host: "localhost".to_string(),
                user: "root".to_string(),
                password: String::new(),
                database: "test".to_string(),
            },
        )
    }

    fn register_airport() {
        ModelRegistry::register(
            ModelBuilder::new("Airport")
                .field("city", FieldDef::new(FieldKind::Varchar { size: 64 }))
                .unwrap()
                .build(),
        );
    }

    #[test]
    fn accepts_plain_select_with_where_and_order_by() {
        register_airport();
        let session = test_session();
        let raw = RawQuery::new(session, "Airport", "SELECT * FROM Airports WHERE city = 'Kyiv' ORDER BY id DESC");
        assert!(raw.is_ok());
    }

    #[test]
    fn rejects_a_second_statement_appended_after_a_terminator() {
        register_airport();
        let session = test_session();
        let raw = RawQuery::new(session, "Airport", "SELECT * FROM Airports; DROP TABLE Airports");
        assert!(raw.is_err());
    }

    #[test]
    fn rejects_non_select_statements() {
        register_airport();
        let session = test_session();
        let raw = RawQuery::new(session, "Airport", "DELETE FROM Airports");
        assert!(raw.is_err());
    }

    #[test]
    fn fetch_hydrates_through_the_bound_models_field_codecs() {
        register_airport();
        let connector = FakeConnector::new();
        let session = Session::new(
            Arc::new(connector.clone()),
            Config {
                host: "localhost".to_string(),
                user: "root".to_string(),
                password: String::new(),
                database: "test".to_string(),
            },
        );
        let mut row = Row::new();
        row.insert("id".to_string(), Value::Int(1));
        row.insert("city".to_string(), Value::from("Kyiv"));
        connector.seed("SELECT * FROM Airports WHERE city = 'Kyiv'", vec![row]);
        let raw = RawQuery::new(session, "Airport", "SELECT * FROM Airports WHERE city = 'Kyiv'").unwrap();
        let instances = raw.fetch().unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].id().unwrap(), 1);
    }
}
