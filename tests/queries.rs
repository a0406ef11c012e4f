//! End-to-end query scenarios over the simple in-memory graph.

use std::collections::HashSet;
use std::sync::Arc;

use umbra::builder::{agg, app, bind, filter, not, or, pattern, var};
use umbra::{
    new_node, BindValue, Form, MultiGraph, QueryBuilder, QueryEngine, QueryInput, QueryResult,
    SimpleGraph, Triple, UmbraError, Value,
};

fn rows_of(result: QueryResult) -> HashSet<Vec<Value>> {
    match result {
        QueryResult::Relation(rel) => rel.rows.into_iter().collect(),
        other => panic!("expected a relation, got {other:?}"),
    }
}

fn scalar_of(result: QueryResult) -> Option<Value> {
    match result {
        QueryResult::Scalar(v) => v,
        other => panic!("expected a scalar, got {other:?}"),
    }
}

fn graph_of(triples: Vec<Triple>) -> SimpleGraph {
    SimpleGraph::new().transact(1, &[], &triples)
}

#[test]
fn basic_join_follows_references() {
    let n1 = Value::Node(new_node());
    let n2 = Value::Node(new_node());
    let g = graph_of(vec![
        Triple::new(n1.clone(), Value::kw("artist", "name"), "Paul"),
        Triple::new(n2.clone(), Value::kw("release", "artists"), n1.clone()),
        Triple::new(n2.clone(), Value::kw("release", "name"), "MSL"),
    ]);
    let query = QueryBuilder::new()
        .find([var("?name")])
        .where_all([
            pattern(var("?r"), Form::kw(":release/name"), Form::from("MSL")),
            pattern(var("?r"), Form::kw(":release/artists"), var("?a")),
            pattern(var("?a"), Form::kw(":artist/name"), var("?name")),
        ])
        .build()
        .unwrap();
    let result = QueryEngine::new().q(&query, &g, Vec::new()).unwrap();
    assert_eq!(
        rows_of(result),
        HashSet::from([vec![Value::Str("Paul".into())]])
    );
}

/// Four children under address A, two under address B.
fn family_graph() -> (SimpleGraph, Value, Value) {
    let addr_a = Value::Str("A".into());
    let addr_b = Value::Str("B".into());
    let pa1 = Value::Node(new_node());
    let pa2 = Value::Node(new_node());
    let pb = Value::Node(new_node());
    let mut triples = vec![
        Triple::new(pa1.clone(), Value::kw("person", "address"), addr_a.clone()),
        Triple::new(pa2.clone(), Value::kw("person", "address"), addr_a.clone()),
        Triple::new(pb.clone(), Value::kw("person", "address"), addr_b.clone()),
    ];
    for parent in [&pa1, &pa2] {
        for _ in 0..2 {
            triples.push(Triple::new(
                parent.clone(),
                Value::kw("person", "child"),
                Value::Node(new_node()),
            ));
        }
    }
    for _ in 0..2 {
        triples.push(Triple::new(
            pb.clone(),
            Value::kw("person", "child"),
            Value::Node(new_node()),
        ));
    }
    (graph_of(triples), addr_a, addr_b)
}

#[test]
fn grouped_count_by_address() {
    let (g, addr_a, addr_b) = family_graph();
    let query = QueryBuilder::new()
        .find([var("?addr"), agg("count", "?child")])
        .where_all([
            pattern(var("?p"), Form::kw(":person/address"), var("?addr")),
            pattern(var("?p"), Form::kw(":person/child"), var("?child")),
        ])
        .build()
        .unwrap();
    let result = QueryEngine::new().q(&query, &g, Vec::new()).unwrap();
    match &result {
        QueryResult::Relation(rel) => {
            assert_eq!(rel.cols, vec!["?addr".to_owned(), "?count-child".to_owned()]);
        }
        other => panic!("expected a relation, got {other:?}"),
    }
    assert_eq!(
        rows_of(result),
        HashSet::from([
            vec![addr_a, Value::Int(4)],
            vec![addr_b, Value::Int(2)],
        ])
    );
}

#[test]
fn or_unions_branches() {
    let n1 = Value::Node(new_node());
    let n2 = Value::Node(new_node());
    let v1 = Value::Str("guilty".into());
    let s1 = Value::Str("confirmed".into());
    let g = graph_of(vec![
        Triple::new(n1.clone(), Value::kw("case", "verdict"), v1.clone()),
        Triple::new(n2.clone(), Value::kw("case", "sighting"), s1.clone()),
    ]);
    let query = QueryBuilder::new()
        .find([var("?o"), var("?r")])
        .where_clause(or([
            pattern(var("?o"), Form::kw(":case/verdict"), var("?r")),
            pattern(var("?o"), Form::kw(":case/sighting"), var("?r")),
        ]))
        .build()
        .unwrap();
    let result = QueryEngine::new().q(&query, &g, Vec::new()).unwrap();
    assert_eq!(
        rows_of(result),
        HashSet::from([vec![n1, v1], vec![n2, s1]])
    );
}

#[test]
fn or_fills_disjoint_columns_with_nil() {
    let n1 = Value::Node(new_node());
    let n2 = Value::Node(new_node());
    let g = graph_of(vec![
        Triple::new(n1.clone(), Value::kw("t", "a"), Value::Int(1)),
        Triple::new(n2.clone(), Value::kw("t", "b"), Value::Int(2)),
    ]);
    let query = QueryBuilder::new()
        .find([var("?o"), var("?x"), var("?y")])
        .where_clause(or([
            pattern(var("?o"), Form::kw(":t/a"), var("?x")),
            pattern(var("?o"), Form::kw(":t/b"), var("?y")),
        ]))
        .build()
        .unwrap();
    let result = QueryEngine::new().q(&query, &g, Vec::new()).unwrap();
    assert_eq!(
        rows_of(result),
        HashSet::from([
            vec![n1, Value::Int(1), Value::Nil],
            vec![n2, Value::Nil, Value::Int(2)],
        ])
    );
}

#[test]
fn negation_drops_matching_rows() {
    let visible = Value::Node(new_node());
    let hidden = Value::Node(new_node());
    let g = graph_of(vec![
        Triple::new(visible.clone(), Value::kw("doc", "title"), "public"),
        Triple::new(hidden.clone(), Value::kw("doc", "title"), "secret"),
        Triple::new(hidden.clone(), Value::kw("doc", "internal"), Value::Bool(true)),
    ]);
    let query = QueryBuilder::new()
        .find([var("?o")])
        .where_all([
            pattern(var("?o"), Form::kw(":doc/title"), var("?t")),
            not([pattern(
                var("?o"),
                Form::kw(":doc/internal"),
                Form::from(true),
            )]),
        ])
        .build()
        .unwrap();
    let result = QueryEngine::new().q(&query, &g, Vec::new()).unwrap();
    assert_eq!(rows_of(result), HashSet::from([vec![visible]]));
}

#[test]
fn negation_with_empty_sub_plan_keeps_everything() {
    let n = Value::Node(new_node());
    let g = graph_of(vec![Triple::new(
        n.clone(),
        Value::kw("doc", "title"),
        "only",
    )]);
    let query = QueryBuilder::new()
        .find([var("?o")])
        .where_all([
            pattern(var("?o"), Form::kw(":doc/title"), var("?t")),
            not([pattern(
                var("?o"),
                Form::kw(":doc/missing"),
                var("?anything"),
            )]),
        ])
        .build()
        .unwrap();
    let result = QueryEngine::new().q(&query, &g, Vec::new()).unwrap();
    assert_eq!(rows_of(result), HashSet::from([vec![n]]));
}

/// Three parents and seven children; addresses cover five of them.
fn aggregate_graph() -> SimpleGraph {
    let p1 = Value::Node(new_node());
    let p2 = Value::Node(new_node());
    let p3 = Value::Node(new_node());
    let mut triples = vec![
        Triple::new(p1.clone(), Value::kw("person", "address"), "A"),
        Triple::new(p2.clone(), Value::kw("person", "address"), "B"),
    ];
    for (parent, children) in [(&p1, 3), (&p2, 2), (&p3, 2)] {
        for _ in 0..children {
            triples.push(Triple::new(
                parent.clone(),
                Value::kw("person", "child"),
                Value::Node(new_node()),
            ));
        }
    }
    graph_of(triples)
}

#[test]
fn aggregate_projection_forms() {
    let g = aggregate_graph();
    let engine = QueryEngine::new();

    // Children of parents that have an address: 3 + 2.
    let counted = QueryBuilder::new()
        .find_scalar(agg("count", "?c"))
        .where_all([
            pattern(var("?p"), Form::kw(":person/address"), var("?a")),
            pattern(var("?p"), Form::kw(":person/child"), var("?c")),
        ])
        .build()
        .unwrap();
    assert_eq!(
        scalar_of(engine.q(&counted, &g, Vec::new()).unwrap()),
        Some(Value::Int(5))
    );

    // All child rows.
    let rows = QueryBuilder::new()
        .find_scalar(Form::list([Form::sym("count"), Form::sym("*")]))
        .where_clause(pattern(var("?p"), Form::kw(":person/child"), var("?c")))
        .build()
        .unwrap();
    assert_eq!(
        scalar_of(engine.q(&rows, &g, Vec::new()).unwrap()),
        Some(Value::Int(7))
    );

    // All distinct children.
    let distinct = QueryBuilder::new()
        .find_scalar(agg("count-distinct", "?c"))
        .where_clause(pattern(var("?p"), Form::kw(":person/child"), var("?c")))
        .build()
        .unwrap();
    assert_eq!(
        scalar_of(engine.q(&distinct, &g, Vec::new()).unwrap()),
        Some(Value::Int(7))
    );
}

#[test]
fn numeric_aggregates_and_with() {
    let g = graph_of(vec![
        Triple::new(Value::Str("x".into()), Value::kw("m", "v"), Value::Int(3)),
        Triple::new(Value::Str("y".into()), Value::kw("m", "v"), Value::Int(3)),
        Triple::new(Value::Str("z".into()), Value::kw("m", "v"), Value::Int(6)),
    ]);
    let engine = QueryEngine::new();

    // Without :with, set semantics collapse the two 3s.
    let plain = QueryBuilder::new()
        .find_scalar(agg("sum", "?v"))
        .where_clause(pattern(var("?s"), Form::kw(":m/v"), var("?v")))
        .build()
        .unwrap();
    assert_eq!(
        scalar_of(engine.q(&plain, &g, Vec::new()).unwrap()),
        Some(Value::Int(9))
    );

    // :with keeps otherwise-identical rows apart.
    let with = QueryBuilder::new()
        .find_scalar(agg("sum", "?v"))
        .with_var("?s")
        .where_clause(pattern(var("?s"), Form::kw(":m/v"), var("?v")))
        .build()
        .unwrap();
    assert_eq!(
        scalar_of(engine.q(&with, &g, Vec::new()).unwrap()),
        Some(Value::Int(12))
    );

    let stats = QueryBuilder::new()
        .find([agg("min", "?v"), agg("max", "?v"), agg("avg", "?v")])
        .with_var("?s")
        .where_clause(pattern(var("?s"), Form::kw(":m/v"), var("?v")))
        .build()
        .unwrap();
    assert_eq!(
        rows_of(engine.q(&stats, &g, Vec::new()).unwrap()),
        HashSet::from([vec![Value::Int(3), Value::Int(6), Value::Float(4.0)]])
    );
}

#[test]
fn coll_and_tuple_projections() {
    let g = graph_of(vec![
        Triple::new(Value::Int(1), Value::kw("t", "v"), Value::Int(10)),
        Triple::new(Value::Int(2), Value::kw("t", "v"), Value::Int(20)),
    ]);
    let engine = QueryEngine::new();

    let coll = QueryBuilder::new()
        .find_coll(var("?v"))
        .where_clause(pattern(var("?s"), Form::kw(":t/v"), var("?v")))
        .build()
        .unwrap();
    match engine.q(&coll, &g, Vec::new()).unwrap() {
        QueryResult::Coll(values) => {
            assert_eq!(
                values.into_iter().collect::<HashSet<_>>(),
                HashSet::from([Value::Int(10), Value::Int(20)])
            );
        }
        other => panic!("expected a collection, got {other:?}"),
    }

    let tuple = QueryBuilder::new()
        .find_tuple([var("?s"), var("?v")])
        .where_clause(pattern(var("?s"), Form::kw(":t/v"), var("?v")))
        .build()
        .unwrap();
    match engine.q(&tuple, &g, Vec::new()).unwrap() {
        QueryResult::Tuple(Some(row)) => assert_eq!(row.len(), 2),
        other => panic!("expected one tuple, got {other:?}"),
    }
}

#[test]
fn bind_and_filter_clauses() {
    let g = graph_of(vec![
        Triple::new(Value::Str("small".into()), Value::kw("t", "n"), Value::Int(2)),
        Triple::new(Value::Str("large".into()), Value::kw("t", "n"), Value::Int(20)),
    ]);
    let query = QueryBuilder::new()
        .find([var("?s"), var("?doubled")])
        .where_all([
            pattern(var("?s"), Form::kw(":t/n"), var("?n")),
            filter(app("<", [Form::sym("?n"), Form::from(10)])),
            bind(app("*", [Form::sym("?n"), Form::from(2)]), var("?doubled")),
        ])
        .build()
        .unwrap();
    let result = QueryEngine::new().q(&query, &g, Vec::new()).unwrap();
    assert_eq!(
        rows_of(result),
        HashSet::from([vec![Value::Str("small".into()), Value::Int(4)]])
    );
}

#[test]
fn sandbox_rejects_unknown_operations() {
    let g = graph_of(vec![Triple::new(
        Value::Int(1),
        Value::kw("t", "n"),
        Value::Int(2),
    )]);
    let query = QueryBuilder::new()
        .find([var("?s")])
        .where_all([
            pattern(var("?s"), Form::kw(":t/n"), var("?n")),
            filter(app("system-exec", [Form::sym("?n")])),
        ])
        .build()
        .unwrap();
    let err = QueryEngine::new().q(&query, &g, Vec::new()).unwrap_err();
    assert!(matches!(err, UmbraError::UnsupportedOperation(name) if name == "system-exec"));
}

#[test]
fn inputs_bind_scalars_collections_tuples_and_functions() {
    let g = graph_of(vec![
        Triple::new(Value::Int(1), Value::kw("t", "n"), Value::Int(10)),
        Triple::new(Value::Int(2), Value::kw("t", "n"), Value::Int(20)),
        Triple::new(Value::Int(3), Value::kw("t", "n"), Value::Int(30)),
    ]);
    let engine = QueryEngine::new();

    // Collection binding expands row-wise.
    let coll_query = QueryBuilder::new()
        .find([var("?s"), var("?n")])
        .input(Form::vector([Form::sym("?s"), Form::sym("...")]))
        .where_clause(pattern(var("?s"), Form::kw(":t/n"), var("?n")))
        .build()
        .unwrap();
    let result = engine
        .q(
            &coll_query,
            &g,
            vec![QueryInput::Coll(vec![Value::Int(1), Value::Int(3)])],
        )
        .unwrap();
    assert_eq!(
        rows_of(result),
        HashSet::from([
            vec![Value::Int(1), Value::Int(10)],
            vec![Value::Int(3), Value::Int(30)],
        ])
    );

    // Tuple binding destructures one input across variables.
    let tuple_query = QueryBuilder::new()
        .find([var("?n")])
        .input(Form::vector([Form::sym("?s"), Form::sym("?expect")]))
        .where_all([
            pattern(var("?s"), Form::kw(":t/n"), var("?n")),
            filter(app("=", [Form::sym("?n"), Form::sym("?expect")])),
        ])
        .build()
        .unwrap();
    let result = engine
        .q(
            &tuple_query,
            &g,
            vec![QueryInput::Tuple(vec![Value::Int(2), Value::Int(20)])],
        )
        .unwrap();
    assert_eq!(rows_of(result), HashSet::from([vec![Value::Int(20)]]));

    // Function inputs are callable from bind clauses.
    let fn_query = QueryBuilder::new()
        .find([var("?s"), var("?label")])
        .input(Form::sym("?labeler"))
        .where_all([
            pattern(var("?s"), Form::kw(":t/n"), var("?n")),
            bind(app("?labeler", [Form::sym("?n")]), var("?label")),
            filter(app("=", [Form::sym("?s"), Form::from(1)])),
        ])
        .build()
        .unwrap();
    let labeler: umbra::NativeFn = Arc::new(|args: &[Value]| match args {
        [Value::Int(n)] => Ok(BindValue::One(Value::Str(format!("n{n}")))),
        _ => Err(UmbraError::Invalid("labeler takes one integer")),
    });
    let result = engine
        .q(&fn_query, &g, vec![QueryInput::Fn(labeler)])
        .unwrap();
    assert_eq!(
        rows_of(result),
        HashSet::from([vec![Value::Int(1), Value::Str("n10".into())]])
    );
}

#[test]
fn conjunction_is_order_independent() {
    let (g, _, _) = family_graph();
    let forward = QueryBuilder::new()
        .find([var("?p"), var("?addr"), var("?child")])
        .where_all([
            pattern(var("?p"), Form::kw(":person/address"), var("?addr")),
            pattern(var("?p"), Form::kw(":person/child"), var("?child")),
        ])
        .build()
        .unwrap();
    let reversed = QueryBuilder::new()
        .find([var("?p"), var("?addr"), var("?child")])
        .where_all([
            pattern(var("?p"), Form::kw(":person/child"), var("?child")),
            pattern(var("?p"), Form::kw(":person/address"), var("?addr")),
        ])
        .build()
        .unwrap();
    let engine = QueryEngine::new();
    assert_eq!(
        rows_of(engine.q(&forward, &g, Vec::new()).unwrap()),
        rows_of(engine.q(&reversed, &g, Vec::new()).unwrap())
    );
}

#[test]
fn empty_graph_queries_are_empty() {
    let g = SimpleGraph::new();
    let query = QueryBuilder::new()
        .find([var("?s"), var("?p"), var("?o")])
        .where_clause(pattern(var("?s"), var("?p"), var("?o")))
        .build()
        .unwrap();
    assert!(rows_of(QueryEngine::new().q(&query, &g, Vec::new()).unwrap()).is_empty());
}

#[test]
fn transitive_patterns_traverse() {
    let a = Value::Node(new_node());
    let b = Value::Node(new_node());
    let c = Value::Node(new_node());
    let g = graph_of(vec![
        Triple::new(a.clone(), Value::kw("org", "parent"), b.clone()),
        Triple::new(b.clone(), Value::kw("org", "parent"), c.clone()),
    ]);
    let query = QueryBuilder::new()
        .find([var("?ancestor")])
        .where_clause(pattern(
            Form::Lit(a.clone()),
            Form::kw(":org/parent+"),
            var("?ancestor"),
        ))
        .build()
        .unwrap();
    let result = QueryEngine::new().q(&query, &g, Vec::new()).unwrap();
    assert_eq!(rows_of(result), HashSet::from([vec![b], vec![c]]));
}

#[test]
fn multi_graph_preserves_duplicates_in_aggregates() {
    let g = MultiGraph::new()
        .with_triple(
            &Value::Int(1),
            &Value::kw("m", "hit"),
            &Value::Str("x".into()),
            1,
        )
        .with_triple(
            &Value::Int(1),
            &Value::kw("m", "hit"),
            &Value::Str("x".into()),
            2,
        );
    let query = QueryBuilder::new()
        .find_scalar(Form::list([Form::sym("count"), Form::sym("*")]))
        .where_clause(pattern(var("?s"), Form::kw(":m/hit"), var("?v")))
        .build()
        .unwrap();
    assert_eq!(
        scalar_of(QueryEngine::new().q(&query, &g, Vec::new()).unwrap()),
        Some(Value::Int(2))
    );
}
