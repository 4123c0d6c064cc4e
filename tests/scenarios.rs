//! End-to-end scenario tests (§8) over the booking-system fixture: the six
//! concrete scenarios the spec calls out by number, plus the quantified
//! properties (De Morgan, double negation, exclude duality, idempotent
//! ordering) exercised against the same schema.

mod common;

use ormcrust::config::Config;
use ormcrust::driver::fake::FakeConnector;
use ormcrust::driver::Row;
use ormcrust::field::Value;
use ormcrust::query::assembler::{assemble_exists, build_parts};
use ormcrust::query::descriptor::QueryDescriptor;
use ormcrust::{Agg, ModelRegistry, Q, Session};
use std::sync::Arc;

fn session(connector: &FakeConnector) -> Session {
    Session::new(
        Arc::new(connector.clone()),
        Config {
            host: "localhost".to_string(),
            user: "root".to_string(),
            password: String::new(),
            database: "booking".to_string(),
        },
    )
}

fn row(pairs: &[(&str, Value)]) -> Row {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

/// Scenario 1: a three-hop FK chain plus a direct FK filter emits one
/// SELECT with three LEFT JOINs and both WHERE conditions.
#[test]
fn scenario_1_three_hop_chain_and_direct_fk_filter() {
    common::register();
    let route = ModelRegistry::get("Route").unwrap();
    let descriptor = QueryDescriptor::new()
        .filter(Q::new(
            "plane__airline__country__in",
            Value::Tuple(vec![Value::from("Russia"), Value::from("Belarus")]),
        ))
        .filter(Q::new("arrival_point__city", "Kyiv"));
    let parts = build_parts(&route, &descriptor).unwrap();
    assert_eq!(parts.joins.len(), 3);
    assert!(parts.joins[0].alias.starts_with("Planes"));
    assert!(parts.joins[1].alias.starts_with("Airlines"));
    assert!(parts.joins[2].alias.starts_with("Airports"));
    let sql = parts.to_sql();
    assert!(sql.contains("IN ('Russia', 'Belarus')"));
    assert!(sql.contains("= 'Kyiv'"));
}

/// Scenario 2: `&` binds tighter than `|`, and the keyword-predicate group
/// renders as its own WHERE clause alongside the Q-tree's clause.
#[test]
fn scenario_2_and_before_or_precedence_in_where_clause() {
    common::register();
    let route = ModelRegistry::get("Route").unwrap();
    let expr = (Q::new("departure_point__capacity__gte", 100i64)
        | (Q::new(
            "plane__airline__country__in",
            Value::Tuple(vec![Value::from("Russia"), Value::from("Belarus")]),
        ) & !Q::new("arrival_point__city", "Kyiv")))
        & Q::new("departure_point__capacity__lte", 900i64);
    let descriptor = QueryDescriptor::new()
        .filter(expr)
        .filter_kw("arrival_point__capacity__lte", 900i64);
    let parts = build_parts(&route, &descriptor).unwrap();
    assert_eq!(parts.where_clauses.len(), 2);
    let clause = &parts.where_clauses[0];
    assert!(clause.contains("NOT ("));
    assert!(clause.contains(") AND ("));
    assert!(clause.contains(") OR ("));
}

/// Scenario 3: `filter(...).delete()` issues a `LIKE`-filtered DELETE;
/// `bulk_create` inserts every row in one statement and the rows it just
/// inserted are findable through the `Q::any_of(Q::all_of(...))` tree the
/// returned queryset carries.
#[test]
fn scenario_3_delete_by_query_then_bulk_create() {
    common::register();
    let connector = FakeConnector::new();
    let session = session(&connector);

    let mut stale_users = session.query_set("User").unwrap().filter(Q::new("username__startswith", "test"));
    stale_users.delete().unwrap();
    let delete_sql = connector.log().into_iter().find(|s| s.starts_with("DELETE FROM Users")).unwrap();
    assert!(delete_sql.contains("LIKE BINARY 'test%'"));

    let rows = vec![
        vec![("username".to_string(), Value::from("test1")), ("email".to_string(), Value::from("a@x.com"))],
        vec![("username".to_string(), Value::from("test2")), ("email".to_string(), Value::from("b@x.com"))],
        vec![("username".to_string(), Value::from("test3")), ("email".to_string(), Value::from("c@x.com"))],
    ];
    let created = session.bulk_create("User", &rows).unwrap();
    let insert_sql = connector.log().into_iter().find(|s| s.starts_with("INSERT INTO Users")).unwrap();
    assert!(insert_sql.contains("'test1'"));
    assert!(insert_sql.contains("'test2'"));
    assert!(insert_sql.contains("'test3'"));

    // Reconstruct the exact disjunction `bulk_create` built (one `Q::all_of`
    // per row, OR'd together) through the same assembler entry point it
    // uses, so the seeded statement can only match if the real descriptor
    // built the tree this scenario expects.
    let user_model = ModelRegistry::get("User").unwrap();
    let disjunction = Q::any_of(
        rows.iter()
            .map(|row| Q::all_of(row.iter().map(|(n, v)| Q::new(n, v.clone())).collect()).unwrap())
            .collect(),
    )
    .unwrap();
    let expected_descriptor = QueryDescriptor::new().filter(disjunction);
    let expected_sql = assemble_exists(&user_model, &expected_descriptor).unwrap();
    connector.seed(&expected_sql, vec![row(&[("exists_flag", Value::Int(1))])]);

    let mut created = created;
    assert!(created.exists().unwrap());
}

/// Scenario 4: `&` on two QuerySets combines each side's own conjunction
/// into a single AND, preserving both sides' OR-grouping untouched.
#[test]
fn scenario_4_queryset_and_combines_both_sides_predicates() {
    common::register();
    let connector = FakeConnector::new();
    let session = session(&connector);
    let left = session
        .query_set("Airport")
        .unwrap()
        .filter(Q::new("capacity__lte", 900i64))
        .filter_kw("city__startswith", "M");
    let right = session
        .query_set("Airport")
        .unwrap()
        .filter(Q::new("capacity__lte", 500i64) | Q::new("capacity__gte", 50i64));
    let mut combined = left.and(right).unwrap();
    combined.execute().unwrap();

    let select = connector
        .log()
        .into_iter()
        .find(|s| s.starts_with("SELECT Airports"))
        .expect("combined queryset issues exactly one SELECT");
    assert!(select.contains("<= 900"));
    assert!(select.contains("LIKE BINARY 'M%'"));
    assert!(select.contains("<= 500"));
    assert!(select.contains(">= 50"));
    assert!(select.contains(") AND ("));
    assert!(select.contains(") OR ("));
}

/// Scenario 5: `prefetch_related` over a four-hop path (two FKs, an M2M,
/// then another FK) composed with `get(id=7)` issues at most two SELECTs
/// total regardless of how many rows the root query matches.
#[test]
fn scenario_5_prefetch_related_is_two_selects_total() {
    common::register();
    let connector = FakeConnector::new();
    let session = session(&connector);

    let main_sql = "SELECT Orders00.id, Orders00.user, Orders00.ticket FROM Orders AS Orders00 \
WHERE (Orders00.id = 7) LIMIT 1 OFFSET 0";
    connector.seed(main_sql, vec![row(&[("id", Value::Int(7)), ("user", Value::Int(1)), ("ticket", Value::Int(3))])]);

    let before = connector.log().len();
    let order = session
        .query_set("Order")
        .unwrap()
        .prefetch_related("ticket__flight__routes__plane")
        .get(Q::new("id", 7i64))
        .unwrap();
    let issued_selects = connector.log()[before..].iter().filter(|s| s.starts_with("SELECT")).count();
    assert!(issued_selects <= 2, "expected at most 2 SELECTs for prefetch, got {issued_selects}");
    assert_eq!(order.unwrap().id().unwrap(), 7);
}

/// Scenario 6: an annotated aggregate formula renders as a single aliased
/// subselect and `order_by` on its alias renders bare, descending.
#[test]
fn scenario_6_annotated_formula_orders_on_its_alias() {
    common::register();
    let order = ModelRegistry::get("Order").unwrap();
    let formula = Agg::max("ticket__economy_price")
        .floor_div(Agg::min("ticket__economy_price"))
        .sub(Agg::avg("ticket__economy_price").mul(Agg::sum("ticket__economy_price")));
    let descriptor = QueryDescriptor::new()
        .filter(Q::new("ticket__flight__routes__plane__name__istartswith", "airbus"))
        .annotate(Some("price_formula".to_string()), formula)
        .order_by("-price_formula");
    let parts = build_parts(&order, &descriptor).unwrap();
    let annotation_cols: Vec<&String> = parts.projection.iter().filter(|p| p.contains("AS price_formula")).collect();
    assert_eq!(annotation_cols.len(), 1);
    assert!(annotation_cols[0].starts_with("(SELECT"));
    assert_eq!(parts.order_by, vec!["price_formula DESC".to_string()]);
}

/// De Morgan + double negation (§8), checked at the predicate-algebra level
/// rather than by round-tripping through the database.
#[test]
fn de_morgan_and_double_negation_hold_over_the_fixture_schema() {
    common::register();
    let airport = ModelRegistry::get("Airport").unwrap();
    let a = Q::new("city", "Kyiv");
    let b = Q::new("country", "Ukraine");

    let not_and = (a.clone() & b.clone()).not_();
    let or_of_nots = a.clone().not_() | b.clone().not_();
    let lhs = build_parts(&airport, &QueryDescriptor::new().filter(not_and)).unwrap().where_clauses;
    let rhs = build_parts(&airport, &QueryDescriptor::new().filter(or_of_nots)).unwrap().where_clauses;
    assert_eq!(lhs, rhs);

    let double_negated = a.clone().not_().not_();
    let plain = build_parts(&airport, &QueryDescriptor::new().filter(a)).unwrap().where_clauses;
    let doubled = build_parts(&airport, &QueryDescriptor::new().filter(double_negated)).unwrap().where_clauses;
    assert_eq!(plain, doubled);
}

/// Exclude duality (§8): `exclude(A)` assembles to the exact same SELECT as
/// `filter(~A)`, verified through the real container/session round trip
/// rather than by comparing descriptors directly.
#[test]
fn exclude_duality_matches_filter_of_not() {
    common::register();
    let connector = FakeConnector::new();
    let session = session(&connector);

    let mut excluded = session.query_set("Airport").unwrap().exclude(Q::new("city", "Kyiv"));
    excluded.execute().unwrap();
    let mut filtered_not = session.query_set("Airport").unwrap().filter(Q::new("city", "Kyiv").not_());
    filtered_not.execute().unwrap();

    let selects: Vec<String> = connector.log().into_iter().filter(|s| s.starts_with("SELECT Airports")).collect();
    assert_eq!(selects.len(), 2);
    assert_eq!(selects[0], selects[1]);
}

/// Idempotent ordering (§8): applying `order_by` twice with the same path
/// appends rather than replaces — the resolved Open Question 1.
#[test]
fn repeated_order_by_same_path_is_stable_under_append_semantics() {
    common::register();
    let airport = ModelRegistry::get("Airport").unwrap();
    let once = QueryDescriptor::new().order_by("city");
    let twice = QueryDescriptor::new().order_by("city").order_by("city");
    let parts_once = build_parts(&airport, &once).unwrap();
    let parts_twice = build_parts(&airport, &twice).unwrap();
    assert_eq!(parts_once.order_by, vec!["Airports00.city ASC".to_string()]);
    assert_eq!(parts_twice.order_by, vec!["Airports00.city ASC".to_string(), "Airports00.city ASC".to_string()]);
}
