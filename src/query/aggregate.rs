//! Aggregate algebra (§4.3): `MAX/MIN/AVG/COUNT/SUM` leaves plus the
//! arithmetic/comparison tree that composes them into a single SQL
//! expression with a derived alias.
//!
//! Grounded on the source's `BaseAggregate`/`AggregateOperationWrapper`
//! pair (`orm/aggregate.py`): a leaf plans its own joins and renders
//! `FN(<alias>.<col>)`; a binary wrapper recursively renders both operands
//! and threads the primary-join counter through left-to-right.

use crate::error::OrmError;
use crate::model::ModelDef;
use crate::query::join::{base_alias, plan_path};
use crate::query::predicate::parse_path;

/// The closed set of MySQL aggregate functions this crate supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFn {
    Max,
    Min,
    Avg,
    Count,
    Sum,
}

impl AggFn {
    fn as_sql(&self) -> &'static str {
        match self {
            AggFn::Max => "MAX",
            AggFn::Min => "MIN",
            AggFn::Avg => "AVG",
            AggFn::Count => "COUNT",
            AggFn::Sum => "SUM",
        }
    }

    fn lowercase(&self) -> &'static str {
        match self {
            AggFn::Max => "max",
            AggFn::Min => "min",
            AggFn::Avg => "avg",
            AggFn::Count => "count",
            AggFn::Sum => "sum",
        }
    }
}

/// Result of planning one aggregate expression: the joins it needs, the
/// SQL it renders to, its default (or explicitly given) alias, and the
/// primary-join index advanced past whatever joins it planned.
pub struct PlannedAggregate {
    pub joins: Vec<crate::query::join::JoinClause>,
    pub expr: String,
    pub alias: String,
    pub next_primary_index: usize,
}

/// A binary operator composing two aggregate expressions (§4.3
/// "Composition").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl AggOp {
    fn as_sql(&self) -> &'static str {
        match self {
            AggOp::Add => "+",
            AggOp::Sub => "-",
            AggOp::Mul => "*",
            AggOp::Div => "/",
            AggOp::FloorDiv => "DIV",
            AggOp::Eq => "=",
            AggOp::Ne => "!=",
            AggOp::Gt => ">",
            AggOp::Gte => ">=",
            AggOp::Lt => "<",
            AggOp::Lte => "<=",
        }
    }

    /// The alias-joining token the source calls `operation_alias`
    /// (`add`, `sub`, `mul`, `div`, `floor_div`, `equals`, ...).
    pub(crate) fn alias_tag(&self) -> &'static str {
        match self {
            AggOp::Add => "add",
            AggOp::Sub => "sub",
            AggOp::Mul => "mul",
            AggOp::Div => "div",
            AggOp::FloorDiv => "floor_div",
            AggOp::Eq => "equals",
            AggOp::Ne => "not_equals",
            AggOp::Gt => "greater_than",
            AggOp::Gte => "greater_than_or_equals",
            AggOp::Lt => "less_than",
            AggOp::Lte => "less_than_or_equals",
        }
    }
}

/// An aggregate expression tree: a single function applied to a dotted
/// path, or a binary operation composing two sub-expressions.
#[derive(Debug, Clone)]
pub enum Agg {
    Leaf { path: String, func: AggFn },
    Binary(AggOp, Box<Agg>, Box<Agg>),
}

impl Agg {
    pub fn max(path: impl Into<String>) -> Agg {
        Agg::Leaf { path: path.into(), func: AggFn::Max }
    }
    pub fn min(path: impl Into<String>) -> Agg {
        Agg::Leaf { path: path.into(), func: AggFn::Min }
    }
    pub fn avg(path: impl Into<String>) -> Agg {
        Agg::Leaf { path: path.into(), func: AggFn::Avg }
    }
    pub fn sum(path: impl Into<String>) -> Agg {
        Agg::Leaf { path: path.into(), func: AggFn::Sum }
    }
    /// `Count('id')` is the canonical form used internally for the
    /// outer `COUNT(*)` variant statement (§4.4 "COUNT").
    pub fn count(path: impl Into<String>) -> Agg {
        Agg::Leaf { path: path.into(), func: AggFn::Count }
    }

    pub fn add(self, other: Agg) -> Agg {
        Agg::Binary(AggOp::Add, Box::new(self), Box::new(other))
    }
    pub fn sub(self, other: Agg) -> Agg {
        Agg::Binary(AggOp::Sub, Box::new(self), Box::new(other))
    }
    pub fn mul(self, other: Agg) -> Agg {
        Agg::Binary(AggOp::Mul, Box::new(self), Box::new(other))
    }
    pub fn div(self, other: Agg) -> Agg {
        Agg::Binary(AggOp::Div, Box::new(self), Box::new(other))
    }
    pub fn floor_div(self, other: Agg) -> Agg {
        Agg::Binary(AggOp::FloorDiv, Box::new(self), Box::new(other))
    }
    pub fn eq_(self, other: Agg) -> Agg {
        Agg::Binary(AggOp::Eq, Box::new(self), Box::new(other))
    }
    pub fn ne_(self, other: Agg) -> Agg {
        Agg::Binary(AggOp::Ne, Box::new(self), Box::new(other))
    }
    pub fn gt_(self, other: Agg) -> Agg {
        Agg::Binary(AggOp::Gt, Box::new(self), Box::new(other))
    }
    pub fn gte_(self, other: Agg) -> Agg {
        Agg::Binary(AggOp::Gte, Box::new(self), Box::new(other))
    }
    pub fn lt_(self, other: Agg) -> Agg {
        Agg::Binary(AggOp::Lt, Box::new(self), Box::new(other))
    }
    pub fn lte_(self, other: Agg) -> Agg {
        Agg::Binary(AggOp::Lte, Box::new(self), Box::new(other))
    }

    /// The alias this expression renders to absent an explicit
    /// `annotate(name=...)` override — computed purely from the tree shape,
    /// with no join planning, so the assembler can precompute the full set
    /// of annotation aliases before it has to classify `Q`-leaves as WHERE
    /// or HAVING (§4.4 step 4).
    pub fn default_alias(&self) -> String {
        match self {
            Agg::Leaf { path, func } => format!("{path}__{}", func.lowercase()),
            Agg::Binary(op, lhs, rhs) => {
                format!("{}___{}___{}", lhs.default_alias(), op.alias_tag(), rhs.default_alias())
            }
        }
    }

    /// Plans this aggregate expression against `model`, threading the
    /// primary-join and annotate indices the same way the join planner
    /// does (§4.3 "Each aggregate invocation takes (model, primary_index,
    /// annotate_index)").
    pub fn plan(
        &self,
        model: &ModelDef,
        primary_index: usize,
        annotate_index: usize,
    ) -> Result<PlannedAggregate, OrmError> {
        match self {
            Agg::Leaf { path, func } => {
                let (segments, _op) = parse_path(path);
                if segments.is_empty() {
                    return Err(OrmError::misuse("aggregate path must not be empty"));
                }
                let planned = plan_path(model, &segments, primary_index, annotate_index)?;
                let column_alias = if planned.joins.is_empty() {
                    base_alias(model, annotate_index)
                } else {
                    planned.terminal_alias.clone()
                };
                let expr = if matches!(func, AggFn::Count) {
                    "COUNT(*)".to_string()
                } else {
                    format!("{}({column_alias}.{})", func.as_sql(), planned.terminal_column)
                };
                Ok(PlannedAggregate {
                    joins: planned.joins,
                    expr,
                    alias: self.default_alias(),
                    next_primary_index: planned.next_primary_index,
                })
            }
            Agg::Binary(op, lhs, rhs) => {
                let left = lhs.plan(model, primary_index, annotate_index)?;
                let right = rhs.plan(model, left.next_primary_index, annotate_index)?;
                let mut joins = left.joins;
                joins.extend(right.joins);
                Ok(PlannedAggregate {
                    joins,
                    expr: format!("({}) {} ({})", left.expr, op.as_sql(), right.expr),
                    alias: format!("{}___{}___{}", left.alias, op.alias_tag(), right.alias),
                    next_primary_index: right.next_primary_index,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;

    #[test]
    fn leaf_aggregate_renders_function_and_default_alias() {
        let model = ModelBuilder::new("Ticket").build();
        let planned = Agg::max("price").plan(&model, 1, 0).unwrap();
        assert_eq!(planned.expr, "MAX(Tickets00.price)");
        assert_eq!(planned.alias, "price__max");
        assert_eq!(planned.next_primary_index, 1);
    }

    #[test]
    fn count_ignores_column_but_still_renders_count_star() {
        let model = ModelBuilder::new("Ticket").build();
        let planned = Agg::count("id").plan(&model, 1, 0).unwrap();
        assert_eq!(planned.expr, "COUNT(*)");
        assert_eq!(planned.alias, "id__count");
    }

    #[test]
    fn binary_composition_wraps_operands_and_joins_aliases() {
        let model = ModelBuilder::new("Ticket").build();
        let expr = Agg::max("price").floor_div(Agg::min("price"));
        let planned = expr.plan(&model, 1, 0).unwrap();
        assert_eq!(planned.expr, "(MAX(Tickets00.price)) DIV (MIN(Tickets00.price))");
        assert_eq!(planned.alias, "price__max___floor_div___price__min");
    }
}
