//! Driver contract (§6 "Driver contract (minimal)"): the minimal surface
//! the rest of this crate needs from a SQL backend. Everything above this
//! module talks to `dyn Connector`/`dyn Connection`/`dyn Cursor`, never to
//! a concrete driver crate directly — the production adapter
//! ([`mysql_driver`]) and the in-memory test double ([`fake`]) are
//! interchangeable behind it.

pub mod fake;
pub mod mysql_driver;

use crate::config::Config;
use crate::error::OrmError;
use crate::field::Value;
use std::collections::BTreeMap;

/// One fetched row, keyed by column name — the "dict rows" cursor mode
/// required by §6.
pub type Row = BTreeMap<String, Value>;

/// Opens connections against a configured backend.
pub trait Connector {
    fn connect(&self, config: &Config) -> Result<Box<dyn Connection>, OrmError>;
}

/// A single live connection. Cursors borrow it for the scope of one
/// statement; dropping either releases the underlying resource
/// deterministically (§5 "scoped acquisition").
pub trait Connection {
    fn cursor(&mut self, dict_rows: bool) -> Result<Box<dyn Cursor + '_>, OrmError>;
    fn commit(&mut self) -> Result<(), OrmError>;
}

/// A buffered cursor: `execute` dispatches one statement, `fetchall` drains
/// every row it produced. Both can fail with a driver-level [`OrmError::Sql`].
pub trait Cursor {
    fn execute(&mut self, sql: &str) -> Result<(), OrmError>;
    fn fetchall(&mut self) -> Result<Vec<Row>, OrmError>;
}

/// Runs `f` against a freshly opened connection and cursor, releasing both
/// on every exit path — the Rust expression of the source's
/// `with connect(...) as connection: with connection.cursor() as cursor:`
/// nesting (§5).
pub fn with_cursor<T>(
    connector: &dyn Connector,
    config: &Config,
    dict_rows: bool,
    f: impl FnOnce(&mut dyn Cursor) -> Result<T, OrmError>,
) -> Result<T, OrmError> {
    let mut connection = connector.connect(config)?;
    let result = {
        let mut cursor = connection.cursor(dict_rows)?;
        f(cursor.as_mut())
    }?;
    connection.commit()?;
    Ok(result)
}
