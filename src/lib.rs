//! A synchronous MySQL ORM core: predicate algebra, join planning, SQL
//! assembly and a lazy result container, built the way the teacher this
//! crate grew out of builds its own connection, config, and logging layers
//! — just turned toward query building instead of an interactive client.
//!
//! Start at [`session::Session`]: open one against a [`config::Config`] and
//! a [`driver::Connector`], register your [`model::ModelDef`]s, and every
//! other module follows from there.

pub mod config;
pub mod container;
pub mod driver;
pub mod error;
pub mod field;
pub mod instance;
pub mod logging;
pub mod model;
pub mod query;
pub mod raw;
pub mod session;

pub use container::{QuerySet, QuerySetSlice};
pub use error::OrmError;
pub use field::{FieldDef, FieldKind, Value};
pub use instance::Instance;
pub use model::{ModelBuilder, ModelDef, ModelRegistry};
pub use query::aggregate::Agg;
pub use query::predicate::Q;
pub use raw::RawQuery;
pub use session::Session;
