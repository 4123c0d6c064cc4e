//! Error taxonomy for the ORM core.
//!
//! Mirrors the flat, `thiserror`-derived error enum style of the database
//! abstraction layer this crate is descended from: one enum, one `#[error(...)]`
//! message per variant, `#[from]` conversions at the driver boundary.

use thiserror::Error;

/// Every fallible operation in this crate returns `Result<T, OrmError>`.
#[derive(Error, Debug)]
pub enum OrmError {
    /// Bad call shape caught before any SQL is built: a `Q` leaf with more
    /// than one keyword pair, wrong argument types passed to
    /// `aggregate`/`annotate`/`order_by`, mismatched models on `+`/`|`/`&`,
    /// an empty aggregate call, or an unsupported index type.
    #[error("misuse: {0}")]
    Misuse(String),

    /// A dotted path referenced a field that does not exist on the model
    /// being walked, a reserved name (`id`) was declared by a user field,
    /// or a field name contained the reserved `__` separator.
    #[error("schema error: {0}")]
    Schema(String),

    /// A driver-level error, carrying the engine's numeric error code and
    /// a message resolved through the curated map in [`crate::error::sql_message`].
    #[error("SQL error {code}: {message}")]
    Sql { code: i32, message: String },

    /// `QuerySet[i]` found fewer than `i + 1` rows.
    #[error("not found")]
    NotFound,

    /// Connection/config layer failure (malformed config file, unreachable
    /// host, authentication failure) distinct from a query-time SQL error.
    #[error("connection error: {0}")]
    Connection(String),
}

impl OrmError {
    pub fn misuse(msg: impl Into<String>) -> Self {
        OrmError::Misuse(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        OrmError::Schema(msg.into())
    }

    /// Builds a [`OrmError::Sql`] from a raw MySQL `errno`/`msg` pair,
    /// applying the curated message map fixed by the spec (§7): the six
    /// named codes get a canonical or pass-through message, everything
    /// else keeps the engine's own message verbatim.
    pub fn from_sql_error(errno: i32, engine_message: &str) -> Self {
        OrmError::Sql {
            code: errno,
            message: sql_message(errno, engine_message),
        }
    }
}

/// The curated MySQL error-code → message map. Locked to six codes by the
/// spec; every other code passes the engine's message through unchanged.
pub fn sql_message(errno: i32, engine_message: &str) -> String {
    match errno {
        -1 => "unread result found inside of cursor".to_string(),
        1054 => engine_message.to_string(),
        1062 => engine_message.to_string(),
        1064 => "syntax error".to_string(),
        1136 => "INSERT INTO <columns> does not match <values>".to_string(),
        1146 => engine_message.to_string(),
        _ => engine_message.to_string(),
    }
}
