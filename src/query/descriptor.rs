//! Query descriptor (§3 "Query descriptor"): the in-memory structure a
//! [`crate::container::QuerySet`] accumulates before execution, and the
//! single input the assembler consumes.

use crate::field::Value;
use crate::query::aggregate::Agg;
use crate::query::predicate::Q;

/// One `annotate()` entry: an explicit alias if the caller gave one,
/// otherwise `None` and the aggregate's [`Agg::default_alias`] is used.
#[derive(Debug, Clone)]
pub struct Annotation {
    pub alias: Option<String>,
    pub agg: Agg,
}

/// An ordering entry: a dotted path with an optional leading `-` for
/// descending order, already split apart.
#[derive(Debug, Clone)]
pub struct OrderTerm {
    pub path: String,
    pub descending: bool,
}

impl OrderTerm {
    /// Parses `"[-]segment(__segment)*"` (§3 invariant 1).
    pub fn parse(raw: &str) -> OrderTerm {
        if let Some(rest) = raw.strip_prefix('-') {
            OrderTerm { path: rest.to_string(), descending: true }
        } else {
            OrderTerm { path: raw.to_string(), descending: false }
        }
    }

    pub fn render(&self) -> String {
        if self.descending {
            format!("-{}", self.path)
        } else {
            self.path.clone()
        }
    }
}

/// The central, immutable-once-executed in-memory structure every query
/// builds up before the assembler turns it into SQL (§3 "Query
/// descriptor"). Mutation methods on [`crate::container::QuerySet`] return
/// a fresh, unexecuted descriptor rather than mutating a shared one.
#[derive(Debug, Clone, Default)]
pub struct QueryDescriptor {
    pub predicates: Vec<Q>,
    pub keyword_predicates: Vec<(String, Value)>,
    pub order_by: Vec<OrderTerm>,
    pub annotations: Vec<Annotation>,
    pub select_related: Vec<String>,
    pub prefetch_related: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Other descriptors UNIONed onto this one, in insertion order (§5
    /// "UNION preserves insertion order of descriptors").
    pub union_tail: Vec<QueryDescriptor>,
}

impl QueryDescriptor {
    pub fn new() -> QueryDescriptor {
        QueryDescriptor::default()
    }

    pub fn filter(mut self, predicate: Q) -> QueryDescriptor {
        self.predicates.push(predicate);
        self
    }

    pub fn filter_kw(mut self, path: impl Into<String>, value: impl Into<Value>) -> QueryDescriptor {
        self.keyword_predicates.push((path.into(), value.into()));
        self
    }

    /// `exclude` is `filter(~predicate)` (§4.5, §8 "Exclude duality") —
    /// folded at the container layer, not re-implemented here; see
    /// [`crate::container::QuerySet::exclude`].
    pub fn order_by(mut self, path: &str) -> QueryDescriptor {
        self.order_by.push(OrderTerm::parse(path));
        self
    }

    pub fn annotate(mut self, alias: Option<String>, agg: Agg) -> QueryDescriptor {
        self.annotations.push(Annotation { alias, agg });
        self
    }

    pub fn select_related(mut self, path: impl Into<String>) -> QueryDescriptor {
        self.select_related.push(path.into());
        self
    }

    pub fn prefetch_related(mut self, path: impl Into<String>) -> QueryDescriptor {
        self.prefetch_related.push(path.into());
        self
    }

    pub fn with_limit(mut self, limit: u64) -> QueryDescriptor {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> QueryDescriptor {
        self.offset = Some(offset);
        self
    }

    /// The alias an annotation renders under: its explicit alias if given,
    /// else the aggregate's structural default.
    pub fn annotation_alias(annotation: &Annotation) -> String {
        annotation
            .alias
            .clone()
            .unwrap_or_else(|| annotation.agg.default_alias())
    }
}
