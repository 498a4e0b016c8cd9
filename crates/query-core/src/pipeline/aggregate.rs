//! Per-row (non-batched) assignment reduction (§4.8): bind a sub-query
//! against one outer row, run it, and reduce the matching rows with a single
//! `Aggregation`. This is the fallback path the batched aggregator (`batch`)
//! exists to avoid paying per-row, and also the only path for shapes the
//! batched aggregator doesn't recognise.

use query_ast::{Aggregation, ComputedValue, NavFunc, Query, QueryKind};
use rusqlite::Connection;
use serde_json::Value as Json;

use crate::binder::{bind_query, OuterBinding};
use crate::compare::{self, Normalized};
use crate::error::{store_err, CoreResult, Error};
use crate::resolver::ResolverAdapter;
use crate::sql::{builder, Ctx};
use crate::store;

/// Run `query` bound against `outer`, returning the `agg_field` value (or,
/// for object rows, the whole JSON `fields` map when no `agg_field` is
/// given) of every matching row.
fn fetch_sub_query_values(
    query: &Query,
    outer: &OuterBinding,
    agg_field: Option<&str>,
    conn: &Connection,
    resolver: &ResolverAdapter,
) -> CoreResult<Vec<Normalized>> {
    let bound = bind_query(query, outer)?;
    let mut ctx = Ctx::new(resolver);
    let compiled = builder::build_sql(&bound, &mut ctx)?;

    let mut stmt = conn
        .prepare(&compiled.sql)
        .map_err(|e| store_err(e, &compiled.sql))?;
    let params: Vec<&dyn rusqlite::ToSql> = compiled.binds.iter().map(|b| b as &dyn rusqlite::ToSql).collect();

    let mut values = Vec::new();
    match bound.kind {
        QueryKind::Object => {
            let mut rows = stmt
                .query(params.as_slice())
                .map_err(|e| store_err(e, &compiled.sql))?;
            while let Some(row) = rows.next().map_err(|e| store_err(e, &compiled.sql))? {
                let obj = store::scan_object_row(row).map_err(|e| store_err(e, &compiled.sql))?;
                values.push(match agg_field {
                    Some(field) => compare::normalize_json(obj.fields.get(field).unwrap_or(&Json::Null)),
                    None => Normalized::String(obj.id),
                });
            }
        }
        QueryKind::Trait => {
            let mut rows = stmt
                .query(params.as_slice())
                .map_err(|e| store_err(e, &compiled.sql))?;
            while let Some(row) = rows.next().map_err(|e| store_err(e, &compiled.sql))? {
                let t = store::scan_trait_row(row).map_err(|e| store_err(e, &compiled.sql))?;
                values.push(compare::normalize_opt_str(t.value.as_deref()));
            }
        }
    }
    Ok(values)
}

/// Reduce a value list to one `ComputedValue` per `Aggregation`.
pub fn reduce(agg: Aggregation, values: Vec<Normalized>) -> CoreResult<ComputedValue> {
    Ok(match agg {
        Aggregation::Count => ComputedValue::Number(values.len() as f64),
        Aggregation::First => values
            .into_iter()
            .next()
            .map(normalized_to_computed)
            .unwrap_or(ComputedValue::Null),
        Aggregation::Min => values
            .into_iter()
            .reduce(|a, b| if compare::compare(&a, &b) == std::cmp::Ordering::Greater { b } else { a })
            .map(normalized_to_computed)
            .unwrap_or(ComputedValue::Null),
        Aggregation::Max => values
            .into_iter()
            .reduce(|a, b| if compare::compare(&a, &b) == std::cmp::Ordering::Less { b } else { a })
            .map(normalized_to_computed)
            .unwrap_or(ComputedValue::Null),
        Aggregation::Sum => {
            let mut total = 0.0;
            for v in &values {
                match v {
                    Normalized::Number(n, _) => total += n,
                    Normalized::Null => {}
                    other => {
                        return Err(Error::aggregation_shape(format!(
                            "`sum` requires numeric values, found {other:?}"
                        )))
                    }
                }
            }
            ComputedValue::Number(total)
        }
    })
}

fn normalized_to_computed(n: Normalized) -> ComputedValue {
    match n {
        Normalized::Null => ComputedValue::Null,
        Normalized::Number(n, _) => ComputedValue::Number(n),
        Normalized::Temporal(_, raw) => ComputedValue::String(raw),
        Normalized::String(s) => ComputedValue::String(s),
    }
}

/// Assignment whose source is a correlated sub-query: bind, fetch, reduce.
pub fn compute_sub_query_assignment(
    agg: Aggregation,
    agg_field: Option<&str>,
    query: &Query,
    outer: &OuterBinding,
    conn: &Connection,
    resolver: &ResolverAdapter,
) -> CoreResult<ComputedValue> {
    let values = fetch_sub_query_values(query, outer, agg_field, conn, resolver)?;
    reduce(agg, values)
}

/// Assignment whose source is a navigation function counted directly off the
/// outer row's own relation (no type filter, no `agg_field`: `Count` is the
/// only well-defined reduction here, since there is no bound field to reduce
/// by without a sub-query; see DESIGN.md for this simplification).
///
/// For a trait outer row, only `refs` is defined (§4.8: refs on the trait's
/// own line); every other nav function has no meaning for a trait and is an
/// error rather than a silent zero.
pub fn compute_nav_func_assignment(
    agg: Aggregation,
    agg_field: Option<&str>,
    nav: NavFunc,
    outer: &OuterBinding,
    conn: &Connection,
) -> CoreResult<ComputedValue> {
    if agg != Aggregation::Count || agg_field.is_some() {
        return Err(Error::aggregation_shape(format!(
            "nav-function assignments only support `count` with no `agg_field`, got {agg:?}"
        )));
    }
    let count = match outer {
        OuterBinding::Object { id } => nav_func_count(nav, id, conn)?,
        OuterBinding::Trait { file_path, line, .. } => {
            if nav != NavFunc::Refs {
                return Err(Error::unsupported_predicate(format!(
                    "`{nav:?}` is undefined for a trait outer row; only `refs` is defined (refs on the trait's own line)"
                )));
            }
            refs_on_line_count(file_path, *line, conn)?
        }
    };
    Ok(ComputedValue::Number(count as f64))
}

/// Nav-function counts keyed by an object id. Only legal when the outer row
/// is an object (§4.8).
pub fn nav_func_count(nav: NavFunc, outer_id: &str, conn: &Connection) -> CoreResult<i64> {
    let sql = match nav {
        NavFunc::Parent => "SELECT COUNT(*) FROM objects WHERE id = (SELECT parent_id FROM objects WHERE id = ?1)",
        NavFunc::Child => "SELECT COUNT(*) FROM objects WHERE parent_id = ?1",
        NavFunc::Ancestors => {
            "WITH RECURSIVE ancestors_cte(id) AS (
                SELECT parent_id FROM objects WHERE id = ?1 AND parent_id IS NOT NULL
                UNION ALL
                SELECT o2.parent_id FROM objects o2 JOIN ancestors_cte a ON o2.id = a.id WHERE o2.parent_id IS NOT NULL
            ) SELECT COUNT(*) FROM ancestors_cte"
        }
        NavFunc::Descendants => {
            "WITH RECURSIVE descendants_cte(id) AS (
                SELECT id FROM objects WHERE parent_id = ?1
                UNION ALL
                SELECT o2.id FROM objects o2 JOIN descendants_cte d ON o2.parent_id = d.id
            ) SELECT COUNT(*) FROM descendants_cte"
        }
        NavFunc::Refs => "SELECT COUNT(*) FROM refs WHERE source_id = ?1",
        NavFunc::Refd => "SELECT COUNT(*) FROM refs WHERE target_id = ?1 OR target_raw = ?1",
    };
    conn.query_row(sql, [outer_id], |row| row.get(0))
        .map_err(|e| store_err(e, sql))
}

/// `refs` count for a trait outer row: refs attached to the trait's own
/// `file_path`/`line_number`, not `source_id = <trait id>` (§4.8, §4.9
/// `refsOnLine`).
fn refs_on_line_count(file_path: &str, line: i64, conn: &Connection) -> CoreResult<i64> {
    let sql = "SELECT COUNT(*) FROM refs WHERE file_path = ?1 AND line_number = ?2";
    conn.query_row(sql, (file_path, line), |row| row.get(0))
        .map_err(|e| store_err(e, sql))
}
