//! Synchronous MySQL adapter (§6 "Driver contract"): the production
//! backend behind `dyn Connector`, built on the `mysql` crate. This
//! crate's execution model is deliberately synchronous and one statement
//! at a time, so it reaches for `mysql`'s blocking pool rather than the
//! async `sqlx` stack the wider codebase otherwise favors (see DESIGN.md
//! for the dependency-swap rationale).

use crate::config::Config;
use crate::driver::{Connection, Connector, Cursor, Row};
use crate::error::OrmError;
use crate::field::Value as OrmValue;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use mysql::prelude::Queryable;
use mysql::{Opts, OptsBuilder, Pool, PooledConn};
use std::time::Duration;
use tracing::debug;

/// Holds one connection pool per configured backend. `connect` just checks
/// a connection out; the pool itself is built once, at construction.
pub struct MySqlConnector {
    pool: Pool,
}

impl MySqlConnector {
    pub fn new(config: &Config) -> Result<MySqlConnector, OrmError> {
        let opts = OptsBuilder::new()
            .ip_or_hostname(Some(config.host.clone()))
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .db_name(Some(config.database.clone()));
        let pool = Pool::new(Opts::from(opts)).map_err(|e| OrmError::Connection(e.to_string()))?;
        Ok(MySqlConnector { pool })
    }
}

impl Connector for MySqlConnector {
    fn connect(&self, _config: &Config) -> Result<Box<dyn Connection>, OrmError> {
        let conn = self.pool.get_conn().map_err(|e| OrmError::Connection(e.to_string()))?;
        Ok(Box::new(MySqlConnection { conn }))
    }
}

struct MySqlConnection {
    conn: PooledConn,
}

impl Connection for MySqlConnection {
    fn cursor(&mut self, dict_rows: bool) -> Result<Box<dyn Cursor + '_>, OrmError> {
        // every row is always decoded keyed by column name; `dict_rows`
        // exists on the trait only because the source driver can be asked
        // for positional tuples instead (§6).
        let _ = dict_rows;
        Ok(Box::new(MySqlCursor { conn: &mut self.conn, pending: None }))
    }

    fn commit(&mut self) -> Result<(), OrmError> {
        Ok(())
    }
}

struct MySqlCursor<'a> {
    conn: &'a mut PooledConn,
    pending: Option<Vec<Row>>,
}

impl<'a> Cursor for MySqlCursor<'a> {
    fn execute(&mut self, sql: &str) -> Result<(), OrmError> {
        if self.pending.is_some() {
            return Err(OrmError::from_sql_error(-1, "unread result"));
        }
        debug!("[MySqlCursor::execute] {sql}");
        let query_result = self.conn.query_iter(sql).map_err(map_mysql_error)?;
        let mut rows = Vec::new();
        for row_result in query_result {
            let row = row_result.map_err(map_mysql_error)?;
            rows.push(decode_row(row));
        }
        self.pending = Some(rows);
        Ok(())
    }

    fn fetchall(&mut self) -> Result<Vec<Row>, OrmError> {
        self.pending
            .take()
            .ok_or_else(|| OrmError::misuse("fetchall() called before execute()"))
    }
}

fn decode_row(row: mysql::Row) -> Row {
    let mut out = Row::new();
    for (i, column) in row.columns_ref().iter().enumerate() {
        let raw = row.as_ref(i).cloned().unwrap_or(mysql::Value::NULL);
        out.insert(column.name_str().into_owned(), convert_value(raw));
    }
    out
}

/// `mysql::Value` → [`OrmValue`]. Bytes decode as UTF-8 text (every textual
/// column this crate declares is `VARCHAR`/`TEXT`/`JSON`, never raw binary).
fn convert_value(value: mysql::Value) -> OrmValue {
    match value {
        mysql::Value::NULL => OrmValue::Null,
        mysql::Value::Bytes(bytes) => OrmValue::Str(String::from_utf8_lossy(&bytes).into_owned()),
        mysql::Value::Int(i) => OrmValue::Int(i),
        mysql::Value::UInt(u) => OrmValue::UInt(u),
        mysql::Value::Float(f) => OrmValue::Float(f as f64),
        mysql::Value::Double(d) => OrmValue::Float(d),
        mysql::Value::Date(year, month, day, hour, minute, second, micros) => {
            let date = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32).unwrap_or(NaiveDate::MIN);
            let time = NaiveTime::from_hms_micro_opt(hour as u32, minute as u32, second as u32, micros)
                .unwrap_or(NaiveTime::MIN);
            OrmValue::DateTime(NaiveDateTime::new(date, time))
        }
        mysql::Value::Time(_negative, days, hours, minutes, seconds, micros) => {
            let total_secs = u64::from(days) * 86_400 + u64::from(hours) * 3_600 + u64::from(minutes) * 60 + u64::from(seconds);
            OrmValue::Duration(Duration::new(total_secs, micros * 1_000))
        }
    }
}

fn map_mysql_error(err: mysql::Error) -> OrmError {
    match err {
        mysql::Error::MySqlError(inner) => OrmError::from_sql_error(inner.code as i32, &inner.message),
        other => OrmError::Connection(other.to_string()),
    }
}
