//! Predicate algebra (§4.1): the `Q`-tree. A leaf binds a dotted path (with
//! an optional operator tag on its last segment) to a value; `And`/`Or`/`Not`
//! compose leaves and other compound nodes.
//!
//! The source's dynamic `Q(field__op=value)` keyword call becomes a single
//! fallible constructor here — [`Q::new`] — since a Rust struct literal
//! cannot reject "more than one keyword pair" at compile time the way a
//! Python `**kwargs` dict can at runtime. Composition is exposed both as
//! explicit combinator methods (`and_`, `or_`, `not_`) and as `BitAnd`/
//! `BitOr`/`Not` trait sugar over the same methods (§9 "Operator
//! overloading").

use crate::error::OrmError;
use crate::field::Value;
use std::ops::{BitAnd, BitOr, Not as StdNot};

/// The closed set of operator tags a path's last segment may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    Contains,
    IContains,
    Range,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    IsNull,
    Regex,
    In,
}

impl Op {
    fn from_tag(tag: &str) -> Option<Op> {
        Some(match tag {
            "gt" => Op::Gt,
            "gte" => Op::Gte,
            "lt" => Op::Lt,
            "lte" => Op::Lte,
            "startswith" => Op::StartsWith,
            "istartswith" => Op::IStartsWith,
            "endswith" => Op::EndsWith,
            "iendswith" => Op::IEndsWith,
            "contains" => Op::Contains,
            "icontains" => Op::IContains,
            "range" => Op::Range,
            "year" => Op::Year,
            "month" => Op::Month,
            "day" => Op::Day,
            "hour" => Op::Hour,
            "minute" => Op::Minute,
            "second" => Op::Second,
            "isnull" => Op::IsNull,
            "regex" => Op::Regex,
            "in" => Op::In,
            _ => return None,
        })
    }
}

/// Splits a dotted-path key like `"plane__airline__country__in"` into its
/// field-path segments and an operator tag, defaulting to [`Op::Eq`] when
/// the last segment isn't one of the closed set of tag names (§4.1, §3
/// invariant 1).
pub fn parse_path(key: &str) -> (Vec<String>, Op) {
    let mut segments: Vec<String> = key.split("__").map(str::to_string).collect();
    if segments.len() > 1 {
        if let Some(op) = Op::from_tag(segments.last().unwrap()) {
            segments.pop();
            return (segments, op);
        }
    }
    (segments, Op::Eq)
}

#[derive(Debug, Clone)]
pub enum QNode {
    Leaf { path: String, op: Op, value: Value },
    And(Vec<QNode>),
    Or(Vec<QNode>),
    Not(Box<QNode>),
}

/// A predicate expression. Wraps a single [`QNode`]; composition methods
/// consume and return new values, keeping the algebra side-effect-free
/// (§4.1 "Composition is side-effect-free at the algebra level").
#[derive(Debug, Clone)]
pub struct Q(pub QNode);

impl Q {
    /// Builds a leaf from exactly one dotted-path/value pair. There is no
    /// way to pass more than one pair through this constructor — the
    /// source's "more than one keyword pair fails with misuse" rule is
    /// enforced structurally rather than at runtime.
    pub fn new(key: &str, value: impl Into<Value>) -> Q {
        let (segments, op) = parse_path(key);
        Q(QNode::Leaf {
            path: segments.join("__"),
            op,
            value: value.into(),
        })
    }

    pub fn and_(self, other: Q) -> Q {
        Q(QNode::And(vec![self.0, other.0]))
    }

    pub fn or_(self, other: Q) -> Q {
        Q(QNode::Or(vec![self.0, other.0]))
    }

    /// Negates the expression. Collapses double negation (`~~A` → `A`) and
    /// folds De Morgan's laws over `And`/`Or` children rather than wrapping
    /// blindly in a fresh `Not` node (§4.1, §8 "Double negation", "De
    /// Morgan").
    pub fn not_(self) -> Q {
        Q(not_node(self.0))
    }
}

fn not_node(node: QNode) -> QNode {
    match node {
        QNode::Not(inner) => *inner,
        QNode::And(children) => QNode::Or(children.into_iter().map(not_node).collect()),
        QNode::Or(children) => QNode::And(children.into_iter().map(not_node).collect()),
        leaf => QNode::Not(Box::new(leaf)),
    }
}

impl BitAnd for Q {
    type Output = Q;
    fn bitand(self, rhs: Q) -> Q {
        self.and_(rhs)
    }
}

impl BitOr for Q {
    type Output = Q;
    fn bitor(self, rhs: Q) -> Q {
        self.or_(rhs)
    }
}

impl StdNot for Q {
    type Output = Q;
    fn not(self) -> Q {
        self.not_()
    }
}

/// Variadic `AND`/`OR` constructors mirroring the source's `Q.And(*args)`/
/// `Q.Or(*args)` class methods, used when composing more than two leaves at
/// once (scenario 3, §8).
impl Q {
    pub fn all_of(parts: Vec<Q>) -> Result<Q, OrmError> {
        if parts.is_empty() {
            return Err(OrmError::misuse("Q::all_of requires at least one operand"));
        }
        Ok(Q(QNode::And(parts.into_iter().map(|q| q.0).collect())))
    }

    pub fn any_of(parts: Vec<Q>) -> Result<Q, OrmError> {
        if parts.is_empty() {
            return Err(OrmError::misuse("Q::any_of requires at least one operand"));
        }
        Ok(Q(QNode::Or(parts.into_iter().map(|q| q.0).collect())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_operator_tag_off_the_last_segment() {
        let (segs, op) = parse_path("plane__airline__country__in");
        assert_eq!(segs, vec!["plane", "airline", "country"]);
        assert_eq!(op, Op::In);
    }

    #[test]
    fn defaults_to_eq_when_last_segment_is_not_a_known_tag() {
        let (segs, op) = parse_path("ticket__flight__economy_price");
        assert_eq!(segs, vec!["ticket", "flight", "economy_price"]);
        assert_eq!(op, Op::Eq);
    }

    #[test]
    fn single_segment_path_has_no_operator_to_strip() {
        let (segs, op) = parse_path("city");
        assert_eq!(segs, vec!["city"]);
        assert_eq!(op, Op::Eq);
    }

    #[test]
    fn double_negation_collapses() {
        let a = Q::new("city", "Kyiv");
        let collapsed = a.clone().not_().not_();
        match collapsed.0 {
            QNode::Leaf { path, .. } => assert_eq!(path, "city"),
            other => panic!("expected collapsed leaf, got {other:?}"),
        }
    }

    #[test]
    fn de_morgan_and_folds_to_or_of_nots() {
        let expr = Q::new("a", 1) & Q::new("b", 2);
        let negated = expr.not_();
        match negated.0 {
            QNode::Or(children) => {
                assert_eq!(children.len(), 2);
                assert!(children.iter().all(|c| matches!(c, QNode::Not(_))));
            }
            other => panic!("expected Or(Not, Not), got {other:?}"),
        }
    }

    #[test]
    fn de_morgan_or_folds_to_and_of_nots() {
        let expr = Q::new("a", 1) | Q::new("b", 2);
        let negated = expr.not_();
        assert!(matches!(negated.0, QNode::And(_)));
    }

    #[test]
    fn bitor_and_bitand_precedence_matches_rust_operator_precedence() {
        // `&` binds tighter than `|` in Rust too, so `a | b & c` parses as
        // `a | (b & c)` — matching §4.1's "AND binds tighter than OR".
        let a = Q::new("a", 1);
        let b = Q::new("b", 2);
        let c = Q::new("c", 3);
        let combined = a | b & c;
        match combined.0 {
            QNode::Or(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(children[1], QNode::And(_)));
            }
            other => panic!("expected Or(leaf, And), got {other:?}"),
        }
    }
}
