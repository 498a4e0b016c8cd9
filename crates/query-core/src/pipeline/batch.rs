//! The batched aggregator (§4.9): a transparent optimisation over
//! `pipeline::aggregate`'s one-sub-query-per-row fallback. Recognises a
//! handful of common `count` shapes and answers all outer rows with a
//! single grouped SQL statement instead of N correlated ones.
//!
//! Load-bearing invariant: this module never changes the *answer*, only how
//! fast it is computed. Any shape it doesn't recognise, and any SQL error it
//! hits, must fall back to the per-row path silently — callers treat `Ok(None)`
//! and `Err(_)` the same way (see `pipeline::executor`).

use std::collections::HashMap;

use query_ast::{Aggregation, AssignmentSource, ComputedValue, NavFunc, PredicateKind, QueryKind, Target};
use rusqlite::Connection;

use crate::error::{store_err, CoreResult};

/// Attempt to batch one `Assignment` stage across every outer row at once.
/// `Ok(None)` means "not a recognised shape"; the caller falls back to
/// `pipeline::aggregate`'s per-row path. Only `count` with no `agg_field` is
/// ever batched, matching the per-row nav-function restriction.
pub fn try_batch(
    agg: Aggregation,
    agg_field: Option<&str>,
    source: &AssignmentSource,
    outer_ids: &[String],
    conn: &Connection,
) -> CoreResult<Option<HashMap<String, i64>>> {
    if agg != Aggregation::Count || agg_field.is_some() || outer_ids.is_empty() {
        return Ok(None);
    }

    match source {
        AssignmentSource::NavFunc(nav) => Ok(Some(batch_nav_func(*nav, outer_ids, conn)?)),
        AssignmentSource::SubQuery(q) => {
            if q.predicates.len() != 1 {
                return Ok(None);
            }
            batch_sub_query(q.kind, &q.predicates[0].kind, &q.type_name, outer_ids, conn)
        }
    }
}

pub fn counts_to_computed(counts: HashMap<String, i64>, outer_ids: &[String]) -> HashMap<String, ComputedValue> {
    outer_ids
        .iter()
        .map(|id| {
            let n = counts.get(id).copied().unwrap_or(0);
            (id.clone(), ComputedValue::Number(n as f64))
        })
        .collect()
}

fn placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(", ")
}

fn batch_nav_func(nav: NavFunc, outer_ids: &[String], conn: &Connection) -> CoreResult<HashMap<String, i64>> {
    let ph = placeholders(outer_ids.len());
    let sql: String = match nav {
        NavFunc::Parent => format!(
            "SELECT id AS oid, (SELECT COUNT(*) FROM objects c WHERE c.id = p.id) AS n FROM objects p WHERE p.id IN (SELECT parent_id FROM objects WHERE id IN ({ph}))"
        ),
        NavFunc::Child => format!(
            "SELECT parent_id AS oid, COUNT(*) AS n FROM objects WHERE parent_id IN ({ph}) GROUP BY parent_id"
        ),
        NavFunc::Refs => format!(
            "SELECT source_id AS oid, COUNT(*) AS n FROM refs WHERE source_id IN ({ph}) GROUP BY source_id"
        ),
        NavFunc::Refd => format!(
            "SELECT COALESCE(target_id, target_raw) AS oid, COUNT(*) AS n FROM refs WHERE COALESCE(target_id, target_raw) IN ({ph}) GROUP BY COALESCE(target_id, target_raw)"
        ),
        NavFunc::Ancestors => format!(
            "WITH RECURSIVE anc(start_id, id) AS (
                SELECT id, parent_id FROM objects WHERE id IN ({ph}) AND parent_id IS NOT NULL
                UNION ALL
                SELECT a.start_id, o2.parent_id FROM objects o2 JOIN anc a ON o2.id = a.id WHERE o2.parent_id IS NOT NULL
            )
            SELECT start_id AS oid, COUNT(*) AS n FROM anc GROUP BY start_id"
        ),
        NavFunc::Descendants => descendants_cte_batched(outer_ids.len()),
    };

    let mut stmt = conn.prepare(&sql).map_err(|e| store_err(e, &sql))?;
    let params: Vec<&dyn rusqlite::ToSql> = outer_ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
    let mut rows = stmt.query(params.as_slice()).map_err(|e| store_err(e, &sql))?;
    let mut out = HashMap::new();
    while let Some(row) = rows.next().map_err(|e| store_err(e, &sql))? {
        let id: String = row.get(0).map_err(|e| store_err(e, &sql))?;
        let n: i64 = row.get(1).map_err(|e| store_err(e, &sql))?;
        out.insert(id, n);
    }
    Ok(out)
}

fn descendants_cte_batched(n: usize) -> String {
    let ph = placeholders(n);
    format!(
        "WITH RECURSIVE desc(start_id, id) AS (
            SELECT id, id FROM objects WHERE id IN ({ph})
            UNION ALL
            SELECT d.start_id, o2.id FROM objects o2 JOIN desc d ON o2.parent_id = d.id
        )
        SELECT start_id AS oid, COUNT(*) AS n FROM desc WHERE id NOT IN (SELECT id FROM objects WHERE id IN ({ph})) GROUP BY start_id"
    )
}

fn batch_sub_query(
    kind: QueryKind,
    pred: &PredicateKind,
    type_name: &str,
    outer_ids: &[String],
    conn: &Connection,
) -> CoreResult<Option<HashMap<String, i64>>> {
    let ph = placeholders(outer_ids.len());

    let sql = match (kind, pred) {
        (QueryKind::Trait, PredicateKind::On(Target::SelfRef)) => format!(
            "SELECT parent_object_id AS oid, COUNT(*) AS n FROM traits WHERE trait_type = ? AND parent_object_id IN ({ph}) GROUP BY parent_object_id"
        ),
        (QueryKind::Trait, PredicateKind::Within(Target::SelfRef)) => format!(
            "WITH RECURSIVE desc(start_id, id) AS (
                SELECT id, id FROM objects WHERE id IN ({ph})
                UNION ALL
                SELECT d.start_id, o2.id FROM objects o2 JOIN desc d ON o2.parent_id = d.id
            )
            SELECT desc.start_id AS oid, COUNT(*) AS n
            FROM desc JOIN traits t ON t.parent_object_id = desc.id
            WHERE t.trait_type = ?
            GROUP BY desc.start_id"
        ),
        (QueryKind::Object, PredicateKind::Parent(Target::SelfRef)) => format!(
            "SELECT parent_id AS oid, COUNT(*) AS n FROM objects WHERE type = ? AND parent_id IN ({ph}) GROUP BY parent_id"
        ),
        (QueryKind::Object, PredicateKind::Ancestor(Target::SelfRef)) => format!(
            "WITH RECURSIVE desc(start_id, id) AS (
                SELECT id, id FROM objects WHERE id IN ({ph})
                UNION ALL
                SELECT d.start_id, o2.id FROM objects o2 JOIN desc d ON o2.parent_id = d.id
            )
            SELECT desc.start_id AS oid, COUNT(*) AS n
            FROM desc JOIN objects x ON x.id = desc.id
            WHERE x.type = ? AND desc.id != desc.start_id
            GROUP BY desc.start_id"
        ),
        (q_kind, PredicateKind::Refs(Target::SelfRef)) => {
            let table = if q_kind == QueryKind::Object { "objects" } else { "traits" };
            let type_col = if q_kind == QueryKind::Object { "type" } else { "trait_type" };
            format!(
                "SELECT COALESCE(r.target_id, r.target_raw) AS oid, COUNT(*) AS n
                FROM refs r JOIN {table} x ON x.id = r.source_id
                WHERE x.{type_col} = ? AND COALESCE(r.target_id, r.target_raw) IN ({ph})
                GROUP BY oid"
            )
        }
        (q_kind, PredicateKind::Refd(Target::SelfRef)) => {
            let table = if q_kind == QueryKind::Object { "objects" } else { "traits" };
            let type_col = if q_kind == QueryKind::Object { "type" } else { "trait_type" };
            format!(
                "SELECT r.source_id AS oid, COUNT(*) AS n
                FROM refs r JOIN {table} x ON (x.id = r.target_id OR x.id = r.target_raw)
                WHERE x.{type_col} = ? AND r.source_id IN ({ph})
                GROUP BY r.source_id"
            )
        }
        _ => return Ok(None),
    };

    // Every recognised shape above binds `type_name` first, then the
    // outer-id `IN (...)` list, except the `Within`/`Ancestor` CTEs, which
    // bind the id list first (inside the CTE) and `type_name` last.
    let binds_type_first = !matches!(
        pred,
        PredicateKind::Within(_) | PredicateKind::Ancestor(_)
    );

    let mut stmt = conn.prepare(&sql).map_err(|e| store_err(e, &sql))?;
    let mut params: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(outer_ids.len() + 1);
    if binds_type_first {
        params.push(&type_name);
        for id in outer_ids {
            params.push(id);
        }
    } else {
        for id in outer_ids {
            params.push(id);
        }
        params.push(&type_name);
    }
    let mut rows = stmt.query(params.as_slice()).map_err(|e| store_err(e, &sql))?;
    let mut out = HashMap::new();
    while let Some(row) = rows.next().map_err(|e| store_err(e, &sql))? {
        let id: String = row.get(0).map_err(|e| store_err(e, &sql))?;
        let n: i64 = row.get(1).map_err(|e| store_err(e, &sql))?;
        out.insert(id, n);
    }
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_ast::Predicate;

    fn seeded_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE objects (id TEXT PRIMARY KEY, type TEXT, fields TEXT, file_path TEXT, line_start INT, parent_id TEXT);
             CREATE TABLE traits (id TEXT PRIMARY KEY, trait_type TEXT, value TEXT, content TEXT, file_path TEXT, line_number INT, parent_object_id TEXT);
             CREATE TABLE refs (source_id TEXT, target_id TEXT, target_raw TEXT, file_path TEXT, line_number INT);
             INSERT INTO objects VALUES ('alpha', 'project', '{}', 'a.md', 1, NULL);
             INSERT INTO objects VALUES ('beta', 'project', '{}', 'b.md', 1, NULL);
             INSERT INTO objects VALUES ('child-1', 'section', '{}', 'a.md', 2, 'alpha');
             INSERT INTO traits VALUES ('t1', 'todo', 'x', 'todo x', 'a.md', 3, 'alpha');
             INSERT INTO traits VALUES ('t2', 'todo', 'y', 'todo y', 'a.md', 4, 'child-1');
             INSERT INTO traits VALUES ('t3', 'todo', 'z', 'todo z', 'b.md', 3, 'beta');"
        ).unwrap();
        conn
    }

    #[test]
    fn batches_trait_within_count_across_two_outer_objects() {
        let conn = seeded_conn();
        let q = query_ast::Query::new(QueryKind::Trait, "todo")
            .with_predicate(Predicate::new(PredicateKind::Within(Target::SelfRef)));
        let outer_ids = vec!["alpha".to_string(), "beta".to_string()];
        let result = try_batch(
            Aggregation::Count,
            None,
            &AssignmentSource::SubQuery(Box::new(q)),
            &outer_ids,
            &conn,
        )
        .unwrap()
        .unwrap();
        assert_eq!(result.get("alpha").copied().unwrap_or(0), 2);
        assert_eq!(result.get("beta").copied().unwrap_or(0), 1);
    }

    #[test]
    fn unrecognised_shape_returns_none() {
        let conn = seeded_conn();
        let q = query_ast::Query::new(QueryKind::Trait, "todo")
            .with_predicate(Predicate::new(PredicateKind::Value {
                cmp_op: query_ast::CmpOp::Eq,
                value: query_ast::Literal::String("x".into()),
            }));
        let outer_ids = vec!["alpha".to_string()];
        let result = try_batch(
            Aggregation::Count,
            None,
            &AssignmentSource::SubQuery(Box::new(q)),
            &outer_ids,
            &conn,
        )
        .unwrap();
        assert!(result.is_none());
    }
}
