//! Black-box seed-test scenarios run against a real in-memory SQLite
//! database, covering the boundary scenarios: hierarchy count, multi-sort
//! stability, min-on-trait-subquery, self-ref rejection, case-insensitive
//! field equality over an array, and regexp/LIKE escaping.

use query_ast::{
    Aggregation, AssignmentSource, CmpOp, ComputedValue, ErrorKind, ExprRef, FieldRef, FilterExpr,
    Literal, Pipeline, PipelineStage, Predicate, PredicateKind, Query, QueryKind, SortCriterion,
    StringFuncKind, Target,
};
use query_core::sql::object::compile_object;
use query_core::sql::Ctx;
use query_core::resolver::ResolverAdapter;
use query_core::{Executor, ExecutorOptions};
use rusqlite::Connection;

fn seeded_conn() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE objects (
            id TEXT PRIMARY KEY, type TEXT, fields TEXT, file_path TEXT,
            line_start INT, parent_id TEXT, alias TEXT
        );
        CREATE TABLE traits (
            id TEXT PRIMARY KEY, trait_type TEXT, value TEXT, content TEXT,
            file_path TEXT, line_number INT, parent_object_id TEXT
        );
        CREATE TABLE refs (source_id TEXT, target_id TEXT, target_raw TEXT, file_path TEXT, line_number INT);
        CREATE VIRTUAL TABLE fts_content USING fts5(object_id UNINDEXED, body);

        INSERT INTO objects VALUES ('alpha', 'project', '{\"status\":\"active\",\"priority\":\"high\"}', 'alpha.md', 1, NULL, NULL);
        INSERT INTO objects VALUES ('beta', 'project', '{\"status\":\"active\",\"priority\":\"medium\"}', 'beta.md', 1, NULL, NULL);
        INSERT INTO objects VALUES ('gamma', 'project', '{\"status\":\"paused\",\"priority\":\"low\"}', 'gamma.md', 1, NULL, NULL);
        INSERT INTO objects VALUES ('alpha-section', 'section', '{}', 'alpha.md', 5, 'alpha', NULL);

        INSERT INTO traits VALUES ('tr1', 'todo', 'todo', 'todo one', 'alpha.md', 6, 'alpha-section');
        INSERT INTO traits VALUES ('tr2', 'todo', 'todo', 'todo two', 'alpha.md', 7, 'alpha-section');
        INSERT INTO traits VALUES ('tr3', 'todo', 'done', 'todo three', 'alpha.md', 8, 'alpha-section');
        INSERT INTO traits VALUES ('tr4', 'todo', 'todo', 'todo four', 'beta.md', 3, 'beta');

        INSERT INTO traits VALUES ('due1', 'due', '2025-01-20', 'due one', 'alpha.md', 9, 'alpha-section');
        INSERT INTO traits VALUES ('due2', 'due', '2025-01-15', 'due two', 'alpha.md', 2, 'alpha');
        INSERT INTO traits VALUES ('due3', 'due', '2025-02-01', 'due three', 'beta.md', 4, 'beta');"
    ).unwrap();
    conn
}

fn executor(conn: Connection) -> Executor {
    Executor::new(conn, ExecutorOptions::default()).unwrap()
}

fn todos_subquery() -> Query {
    Query::new(QueryKind::Trait, "todo")
        .with_predicate(Predicate::new(PredicateKind::Value {
            cmp_op: CmpOp::Eq,
            value: Literal::String("todo".into()),
        }))
        .with_predicate(Predicate::new(PredicateKind::Within(Target::SelfRef)))
}

#[test]
fn hierarchy_count_orders_active_projects_by_todo_count() {
    let exec = executor(seeded_conn());
    let query = Query::new(QueryKind::Object, "project")
        .with_predicate(Predicate::new(PredicateKind::Field {
            field: "status".into(),
            value: Some(Literal::String("active".into())),
            is_exists: false,
            cmp_op: CmpOp::Eq,
        }))
        .with_pipeline(Pipeline::new(vec![
            PipelineStage::Assignment {
                name: "todos".into(),
                agg: Aggregation::Count,
                agg_field: None,
                source: AssignmentSource::SubQuery(Box::new(todos_subquery())),
            },
            PipelineStage::Filter(FilterExpr {
                left: ExprRef::Computed("todos".into()),
                op: CmpOp::Gt,
                right: Literal::Number(0.0),
            }),
            PipelineStage::Sort(vec![SortCriterion {
                key: ExprRef::Computed("todos".into()),
                descending: true,
            }]),
            PipelineStage::Limit(5),
        ]));

    let results = exec.run_object_query(&query).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].base.id, "alpha");
    assert_eq!(results[0].computed["todos"], ComputedValue::Number(2.0));
    assert_eq!(results[1].base.id, "beta");
    assert_eq!(results[1].computed["todos"], ComputedValue::Number(1.0));
}

#[test]
fn hierarchy_count_matches_with_batching_disabled() {
    let options = ExecutorOptions {
        batched_aggregation: false,
        ..ExecutorOptions::default()
    };
    let exec = Executor::new(seeded_conn(), options).unwrap();
    let query = Query::new(QueryKind::Object, "project")
        .with_predicate(Predicate::new(PredicateKind::Field {
            field: "status".into(),
            value: Some(Literal::String("active".into())),
            is_exists: false,
            cmp_op: CmpOp::Eq,
        }))
        .with_pipeline(Pipeline::new(vec![PipelineStage::Assignment {
            name: "todos".into(),
            agg: Aggregation::Count,
            agg_field: None,
            source: AssignmentSource::SubQuery(Box::new(todos_subquery())),
        }]));

    let results = exec.run_object_query(&query).unwrap();
    let by_id: std::collections::HashMap<_, _> =
        results.iter().map(|r| (r.base.id.clone(), r.computed["todos"].clone())).collect();
    assert_eq!(by_id["alpha"], ComputedValue::Number(2.0));
    assert_eq!(by_id["beta"], ComputedValue::Number(1.0));
}

#[test]
fn multi_sort_is_stable_across_status_then_priority() {
    let exec = executor(seeded_conn());
    let query = Query::new(QueryKind::Object, "project").with_pipeline(Pipeline::new(vec![
        PipelineStage::Sort(vec![SortCriterion {
            key: ExprRef::Field("status".into()),
            descending: false,
        }]),
        PipelineStage::Sort(vec![SortCriterion {
            key: ExprRef::Field("priority".into()),
            descending: true,
        }]),
    ]));

    let results = exec.run_object_query(&query).unwrap();
    let order: Vec<&str> = results.iter().map(|r| r.base.id.as_str()).collect();
    assert_eq!(order, vec!["beta", "alpha", "gamma"]);
}

#[test]
fn min_on_trait_sub_query_finds_earliest_due_date_per_project() {
    let exec = executor(seeded_conn());
    let due_subquery = Query::new(QueryKind::Trait, "due")
        .with_predicate(Predicate::new(PredicateKind::Within(Target::SelfRef)));
    let query = Query::new(QueryKind::Object, "project").with_pipeline(Pipeline::new(vec![
        PipelineStage::Assignment {
            name: "earliest".into(),
            agg: Aggregation::Min,
            agg_field: None,
            source: AssignmentSource::SubQuery(Box::new(due_subquery)),
        },
    ]));

    let results = exec.run_object_query(&query).unwrap();
    let by_id: std::collections::HashMap<_, _> =
        results.iter().map(|r| (r.base.id.clone(), r.computed["earliest"].clone())).collect();
    assert_eq!(by_id["alpha"], ComputedValue::String("2025-01-15".into()));
    assert_eq!(by_id["beta"], ComputedValue::String("2025-02-01".into()));
    assert_eq!(by_id["gamma"], ComputedValue::Null);
}

#[test]
fn self_ref_rejection_names_the_offending_predicate() {
    let exec = executor(seeded_conn());
    let object_sub_query = Query::new(QueryKind::Object, "project")
        .with_predicate(Predicate::new(PredicateKind::Within(Target::SelfRef)));
    let query = Query::new(QueryKind::Trait, "todo").with_pipeline(Pipeline::new(vec![
        PipelineStage::Assignment {
            name: "x".into(),
            agg: Aggregation::Count,
            agg_field: None,
            source: AssignmentSource::SubQuery(Box::new(object_sub_query)),
        },
    ]));

    let err = exec.run_trait_query(&query).unwrap_err();
    assert_eq!(err.kind, ErrorKind::SelfRefContext);
    assert!(err.message.contains("within:_"));
}

#[test]
fn case_insensitive_field_equality_matches_array_elements() {
    let conn = seeded_conn();
    conn.execute(
        "INSERT INTO objects VALUES ('tagged', 'item', '{\"tags\":[\"Urgent\",\"Ops\"]}', 'tagged.md', 1, NULL, NULL)",
        [],
    )
    .unwrap();
    let exec = executor(conn);

    let matches = |needle: &str| {
        let query = Query::new(QueryKind::Object, "item").with_predicate(Predicate::new(
            PredicateKind::Field {
                field: "tags".into(),
                value: Some(Literal::String(needle.into())),
                is_exists: false,
                cmp_op: CmpOp::Eq,
            },
        ));
        exec.run_object_query(&query).unwrap().len()
    };

    assert_eq!(matches("urgent"), 1);
    assert_eq!(matches("URGENT"), 1);
    assert_eq!(matches("urgency"), 0);
}

#[test]
fn compiled_array_equality_has_both_scalar_and_json_each_branches() {
    let conn = Connection::open_in_memory().unwrap();
    let resolver = ResolverAdapter::new(&conn);
    let mut ctx = Ctx::new(&resolver);
    let pred = Predicate::new(PredicateKind::Field {
        field: "tags".into(),
        value: Some(Literal::String("urgent".into())),
        is_exists: false,
        cmp_op: CmpOp::Eq,
    });
    let compiled = compile_object(&pred, "o", &mut ctx).unwrap();
    assert!(compiled.sql.contains("LOWER("));
    assert!(compiled.sql.contains("json_each"));
    assert!(compiled.sql.to_uppercase().contains("WHERE LOWER(JSON_EACH.VALUE)"));
}

#[test]
fn includes_escapes_like_wildcards_with_single_bind() {
    let conn = Connection::open_in_memory().unwrap();
    let resolver = ResolverAdapter::new(&conn);
    let mut ctx = Ctx::new(&resolver);
    let pred = Predicate::new(PredicateKind::StringFunc {
        kind: StringFuncKind::Includes,
        target: FieldRef::Field("title".into()),
        value: "a%b_c\\z".into(),
        case_sensitive: true,
    });
    let compiled = compile_object(&pred, "o", &mut ctx).unwrap();
    assert!(compiled.sql.contains("LIKE ? ESCAPE '\\'"));
    assert!(!compiled.sql.contains("REGEXP"));
    assert_eq!(compiled.binds.len(), 1);
}

#[test]
fn matches_is_case_insensitive_via_inline_flag_with_one_bind() {
    let conn = Connection::open_in_memory().unwrap();
    let resolver = ResolverAdapter::new(&conn);
    let mut ctx = Ctx::new(&resolver);
    let pred = Predicate::new(PredicateKind::StringFunc {
        kind: StringFuncKind::Matches,
        target: FieldRef::Field("title".into()),
        value: "^foo".into(),
        case_sensitive: false,
    });
    let compiled = compile_object(&pred, "o", &mut ctx).unwrap();
    assert!(compiled.sql.contains("REGEXP"));
    assert_eq!(compiled.binds.len(), 1);
    assert_eq!(
        compiled.binds[0],
        query_core::sql::BindValue::Text("(?i)^foo".into())
    );
}
