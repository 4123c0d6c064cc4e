//! The query expression pipeline: predicate algebra, join planning,
//! aggregate algebra, the query descriptor they all feed, and the
//! assembler that renders a descriptor into SQL text.

pub mod aggregate;
pub mod assembler;
pub mod descriptor;
pub mod join;
pub mod predicate;
