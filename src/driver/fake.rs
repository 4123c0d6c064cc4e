//! In-memory test double for the driver contract (§6). Rather than
//! evaluating SQL, it is pre-seeded with canned rows (or errors) keyed by
//! exact statement text — the approach §4.11 settles on in place of a
//! small WHERE/HAVING expression evaluator, since the assembler's output is
//! itself the thing under test throughout this crate's suite.
//!
//! A statement nobody seeded returns zero rows rather than erroring, so a
//! test only needs to seed the statements it actually cares about; the
//! `check_table`/bookkeeping calls every entry point makes first can be
//! left unseeded.

use crate::config::Config;
use crate::driver::{Connection, Connector, Cursor, Row};
use crate::error::OrmError;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

struct FakeState {
    responses: HashMap<String, VecDeque<Result<Vec<Row>, OrmError>>>,
    log: Vec<String>,
}

/// Cloning a `FakeConnector` shares the same underlying seed/log state —
/// the handle a test keeps and the one handed to a [`crate::session::Session`]
/// see the same queue.
#[derive(Clone)]
pub struct FakeConnector {
    state: Arc<Mutex<FakeState>>,
}

impl FakeConnector {
    pub fn new() -> FakeConnector {
        FakeConnector {
            state: Arc::new(Mutex::new(FakeState {
                responses: HashMap::new(),
                log: Vec::new(),
            })),
        }
    }

    /// Queues one canned row set for the next `execute()` whose SQL text
    /// matches `sql` exactly. Repeat calls for the same text queue in FIFO
    /// order, so a test can seed a different answer per call.
    pub fn seed(&self, sql: impl Into<String>, rows: Vec<Row>) {
        self.state
            .lock()
            .expect("fake connector lock poisoned")
            .responses
            .entry(sql.into())
            .or_default()
            .push_back(Ok(rows));
    }

    /// Queues an error response instead of rows.
    pub fn seed_error(&self, sql: impl Into<String>, err: OrmError) {
        self.state
            .lock()
            .expect("fake connector lock poisoned")
            .responses
            .entry(sql.into())
            .or_default()
            .push_back(Err(err));
    }

    /// Every statement executed so far, in order — lets a test assert on
    /// the exact SQL the assembler produced.
    pub fn log(&self) -> Vec<String> {
        self.state.lock().expect("fake connector lock poisoned").log.clone()
    }
}

impl Default for FakeConnector {
    fn default() -> Self {
        FakeConnector::new()
    }
}

impl Connector for FakeConnector {
    fn connect(&self, _config: &Config) -> Result<Box<dyn Connection>, OrmError> {
        Ok(Box::new(FakeConnection { state: self.state.clone() }))
    }
}

struct FakeConnection {
    state: Arc<Mutex<FakeState>>,
}

impl Connection for FakeConnection {
    fn cursor(&mut self, _dict_rows: bool) -> Result<Box<dyn Cursor + '_>, OrmError> {
        Ok(Box::new(FakeCursor { state: self.state.clone(), pending: None }))
    }

    fn commit(&mut self) -> Result<(), OrmError> {
        Ok(())
    }
}

struct FakeCursor {
    state: Arc<Mutex<FakeState>>,
    pending: Option<Result<Vec<Row>, OrmError>>,
}

impl Cursor for FakeCursor {
    fn execute(&mut self, sql: &str) -> Result<(), OrmError> {
        if self.pending.is_some() {
            return Err(OrmError::from_sql_error(-1, "unread result"));
        }
        let mut state = self.state.lock().expect("fake connector lock poisoned");
        state.log.push(sql.to_string());
        let response = state
            .responses
            .get_mut(sql)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Ok(Vec::new()));
        self.pending = Some(response);
        Ok(())
    }

    fn fetchall(&mut self) -> Result<Vec<Row>, OrmError> {
        match self.pending.take() {
            Some(result) => result,
            None => Err(OrmError::misuse("fetchall() called before execute()")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::with_cursor;
    use crate::field::Value;

    fn cfg() -> Config {
        Config { host: "h".into(), user: "u".into(), password: "p".into(), database: "d".into() }
    }

    #[test]
    fn seeded_statement_returns_its_canned_rows() {
        let connector = FakeConnector::new();
        let mut row = Row::new();
        row.insert("id".to_string(), Value::Int(1));
        connector.seed("SELECT 1", vec![row]);
        let rows = with_cursor(&connector, &cfg(), true, |cursor| {
            cursor.execute("SELECT 1")?;
            cursor.fetchall()
        })
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(connector.log(), vec!["SELECT 1".to_string()]);
    }

    #[test]
    fn unseeded_statement_returns_zero_rows() {
        let connector = FakeConnector::new();
        let rows = with_cursor(&connector, &cfg(), true, |cursor| {
            cursor.execute("SHOW TABLES")?;
            cursor.fetchall()
        })
        .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn executing_again_before_fetchall_is_an_unread_result_error() {
        let connector = FakeConnector::new();
        let mut connection = connector.connect(&cfg()).unwrap();
        let mut cursor = connection.cursor(true).unwrap();
        cursor.execute("SELECT 1").unwrap();
        let err = cursor.execute("SELECT 2").unwrap_err();
        assert!(matches!(err, OrmError::Sql { code: -1, .. }));
    }
}
