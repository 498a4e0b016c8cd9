//! The outer `Query` SQL builder (§4.4): wraps the compiled predicate tree
//! in a full `SELECT` against the fixed schema, with sort and an optional
//! top-level `LIMIT`.

use query_ast::{Query, QueryKind};

use crate::error::CoreResult;
use crate::sql::alias;
use crate::sql::r#trait::frontmatter_expr;
use crate::sql::{self, Compiled, Ctx};
use crate::store;

const OBJECT_COLUMNS: &str = "o.id, o.type, o.fields, o.file_path, o.line_start, o.parent_id";
const TRAIT_COLUMNS_BASE: &str =
    "t.id, t.trait_type, t.value, t.content, t.file_path, t.line_number, t.parent_object_id";

/// `source` (§3: "derived at query time", §4.4: "via a correlated
/// `CASE … EXISTS …`") is never a stored column; it is computed the same way
/// `source:frontmatter`/`source:inline` predicates are.
fn trait_columns(row_alias: &str) -> String {
    format!(
        "{TRAIT_COLUMNS_BASE}, (CASE WHEN {} THEN 'frontmatter' ELSE 'inline' END) AS source",
        frontmatter_expr(row_alias)
    )
}

/// Build the full `SELECT` for an object query.
pub fn build_object_sql(query: &Query, ctx: &mut Ctx) -> CoreResult<Compiled> {
    let row_alias = alias::OBJECT;
    let predicates = sql::compile_all(QueryKind::Object, &query.predicates, row_alias, ctx)?;

    let mut sql = format!(
        "SELECT {OBJECT_COLUMNS} FROM {} {row_alias} WHERE {row_alias}.type = ? AND ({})",
        store::OBJECTS_TABLE, predicates.sql
    );
    sql.push_str(&format!(" ORDER BY {row_alias}.file_path, {row_alias}.line_start"));
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let binds = sql::object::prepend(query.type_name.clone().into(), predicates.binds);
    Ok(Compiled::new(sql, binds))
}

/// Build the full `SELECT` for a trait query.
pub fn build_trait_sql(query: &Query, ctx: &mut Ctx) -> CoreResult<Compiled> {
    let row_alias = alias::TRAIT;
    let predicates = sql::compile_all(QueryKind::Trait, &query.predicates, row_alias, ctx)?;

    let mut sql = format!(
        "SELECT {} FROM {} {row_alias} WHERE {row_alias}.trait_type = ? AND ({})",
        trait_columns(row_alias), store::TRAITS_TABLE, predicates.sql
    );
    sql.push_str(&format!(" ORDER BY {row_alias}.file_path, {row_alias}.line_number"));
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let binds = sql::object::prepend(query.type_name.clone().into(), predicates.binds);
    Ok(Compiled::new(sql, binds))
}

/// Dispatch on `query.kind`.
pub fn build_sql(query: &Query, ctx: &mut Ctx) -> CoreResult<Compiled> {
    match query.kind {
        QueryKind::Object => build_object_sql(query, ctx),
        QueryKind::Trait => build_trait_sql(query, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolverAdapter;
    use query_ast::{Predicate, PredicateKind};
    use rusqlite::Connection;

    #[test]
    fn object_query_wraps_predicates_with_type_filter_and_order() {
        let conn = Connection::open_in_memory().unwrap();
        let resolver = ResolverAdapter::new(&conn);
        let mut ctx = Ctx::new(&resolver);
        let query = Query::new(QueryKind::Object, "project").with_predicate(Predicate::new(
            PredicateKind::Field {
                field: "status".into(),
                value: Some(query_ast::Literal::String("active".into())),
                is_exists: false,
                cmp_op: query_ast::CmpOp::Eq,
            },
        ));
        let compiled = build_object_sql(&query, &mut ctx).unwrap();
        assert!(compiled.sql.starts_with("SELECT o.id"));
        assert!(compiled.sql.contains("o.type = ?"));
        assert!(compiled.sql.contains("ORDER BY o.file_path, o.line_start"));
        assert_eq!(compiled.binds[0], crate::sql::BindValue::Text("project".into()));
    }

    #[test]
    fn limit_is_appended_when_present() {
        let conn = Connection::open_in_memory().unwrap();
        let resolver = ResolverAdapter::new(&conn);
        let mut ctx = Ctx::new(&resolver);
        let query = Query::new(QueryKind::Trait, "todo").with_limit(5);
        let compiled = build_trait_sql(&query, &mut ctx).unwrap();
        assert!(compiled.sql.ends_with("LIMIT 5"));
    }
}
