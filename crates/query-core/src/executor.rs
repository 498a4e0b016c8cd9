//! The top-level `Executor`: resolver, compiler, binder, and pipeline wired
//! together against one store connection, plus the two kind-checked entry
//! points callers go through (`run_object_query` / `run_trait_query`).

use query_ast::{Error, ObjectResult, PipelineObjectResult, PipelineTraitResult, Query, QueryKind, TraitResult};
use rusqlite::Connection;

use crate::error::{store_err, CoreResult};
use crate::pipeline;
use crate::resolver::ResolverAdapter;
use crate::sql::{builder, Ctx};
use crate::store;

/// Executor-level configuration (§10.3): knobs that change performance
/// characteristics, never query semantics.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorOptions {
    /// Attempt the grouped batched aggregator before falling back to a
    /// per-row correlated sub-query for every `Assignment` stage.
    pub batched_aggregation: bool,
    /// Whether the store's `objects` table carries the optional `alias`
    /// column the resolver consults for wikilink disambiguation.
    pub alias_column: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        ExecutorOptions {
            batched_aggregation: true,
            alias_column: true,
        }
    }
}

/// Owns the store connection and the per-executor resolver cache. One
/// `Executor` should live for the lifetime of a single logical session
/// (e.g. one CLI invocation, one language-server request batch); the
/// resolver's lazily built id/alias index is invalidated by creating a new
/// `Executor`, not by any explicit cache-clear call.
pub struct Executor {
    conn: Connection,
    options: ExecutorOptions,
}

impl Executor {
    pub fn new(conn: Connection, options: ExecutorOptions) -> CoreResult<Self> {
        store::register_regexp(&conn).map_err(|e| store_err(e, "register REGEXP"))?;
        Ok(Executor { conn, options })
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Run an object query end to end: compile, execute the base `SELECT`,
    /// then run the pipeline (if any) over the results.
    pub fn run_object_query(&self, query: &Query) -> CoreResult<Vec<PipelineObjectResult>> {
        if query.kind != QueryKind::Object {
            return Err(Error::query_kind_mismatch(
                "run_object_query called with a trait query",
            ));
        }
        let base_rows = self.fetch_object_rows(query)?;
        let resolver = ResolverAdapter::new(&self.conn);
        match &query.pipeline {
            Some(pipeline) => pipeline::run_object_pipeline(base_rows, pipeline, &self.conn, &resolver, &self.options),
            None => Ok(base_rows.into_iter().map(PipelineObjectResult::new).collect()),
        }
    }

    /// Run a trait query end to end.
    pub fn run_trait_query(&self, query: &Query) -> CoreResult<Vec<PipelineTraitResult>> {
        if query.kind != QueryKind::Trait {
            return Err(Error::query_kind_mismatch(
                "run_trait_query called with an object query",
            ));
        }
        let base_rows = self.fetch_trait_rows(query)?;
        let resolver = ResolverAdapter::new(&self.conn);
        match &query.pipeline {
            Some(pipeline) => pipeline::run_trait_pipeline(base_rows, pipeline, &self.conn, &resolver, &self.options),
            None => Ok(base_rows.into_iter().map(PipelineTraitResult::new).collect()),
        }
    }

    fn fetch_object_rows(&self, query: &Query) -> CoreResult<Vec<ObjectResult>> {
        let resolver = ResolverAdapter::new(&self.conn);
        let mut ctx = Ctx::new(&resolver);
        let compiled = builder::build_object_sql(query, &mut ctx)?;
        let mut stmt = self.conn.prepare(&compiled.sql).map_err(|e| store_err(e, &compiled.sql))?;
        let params: Vec<&dyn rusqlite::ToSql> = compiled.binds.iter().map(|b| b as &dyn rusqlite::ToSql).collect();
        let mut rows = stmt.query(params.as_slice()).map_err(|e| store_err(e, &compiled.sql))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| store_err(e, &compiled.sql))? {
            out.push(store::scan_object_row(row).map_err(|e| store_err(e, &compiled.sql))?);
        }
        log::trace!("object query `{}`: {} base rows", query.type_name, out.len());
        Ok(out)
    }

    fn fetch_trait_rows(&self, query: &Query) -> CoreResult<Vec<TraitResult>> {
        let resolver = ResolverAdapter::new(&self.conn);
        let mut ctx = Ctx::new(&resolver);
        let compiled = builder::build_trait_sql(query, &mut ctx)?;
        let mut stmt = self.conn.prepare(&compiled.sql).map_err(|e| store_err(e, &compiled.sql))?;
        let params: Vec<&dyn rusqlite::ToSql> = compiled.binds.iter().map(|b| b as &dyn rusqlite::ToSql).collect();
        let mut rows = stmt.query(params.as_slice()).map_err(|e| store_err(e, &compiled.sql))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| store_err(e, &compiled.sql))? {
            out.push(store::scan_trait_row(row).map_err(|e| store_err(e, &compiled.sql))?);
        }
        log::trace!("trait query `{}`: {} base rows", query.type_name, out.len());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_ast::{CmpOp, Literal, Predicate, PredicateKind};

    fn seeded_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE objects (id TEXT PRIMARY KEY, type TEXT, fields TEXT, file_path TEXT, line_start INT, parent_id TEXT, alias TEXT);
             CREATE TABLE traits (id TEXT PRIMARY KEY, trait_type TEXT, value TEXT, content TEXT, file_path TEXT, line_number INT, parent_object_id TEXT);
             CREATE TABLE refs (source_id TEXT, target_id TEXT, target_raw TEXT, file_path TEXT, line_number INT);
             CREATE VIRTUAL TABLE fts_content USING fts5(object_id UNINDEXED, body);
             INSERT INTO objects VALUES ('alpha', 'project', '{\"status\":\"active\"}', 'a.md', 1, NULL, NULL);
             INSERT INTO objects VALUES ('beta', 'project', '{\"status\":\"done\"}', 'b.md', 1, NULL, NULL);"
        ).unwrap();
        conn
    }

    #[test]
    fn rejects_object_query_on_trait_entry_point() {
        let executor = Executor::new(seeded_conn(), ExecutorOptions::default()).unwrap();
        let query = Query::new(QueryKind::Object, "project");
        let err = executor.run_trait_query(&query).unwrap_err();
        assert_eq!(err.kind, query_ast::ErrorKind::QueryKindMismatch);
    }

    #[test]
    fn runs_a_simple_object_query() {
        let executor = Executor::new(seeded_conn(), ExecutorOptions::default()).unwrap();
        let query = Query::new(QueryKind::Object, "project").with_predicate(Predicate::new(PredicateKind::Field {
            field: "status".into(),
            value: Some(Literal::String("active".into())),
            is_exists: false,
            cmp_op: CmpOp::Eq,
        }));
        let results = executor.run_object_query(&query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].base.id, "alpha");
    }
}
