//! The predicate-to-SQL compiler: a pair of recursive functions,
//! `compile_object` and `compile_trait`, unified through the dispatcher in
//! this module.
//!
//! Invariants preserved throughout this module (spec §4.3):
//! - Emitted SQL uses positional placeholders (`?`); bind arguments are
//!   returned in the exact order of their occurrence.
//! - No user-supplied string is ever interpolated into the SQL text; only
//!   field names (validated safe identifiers) and compiler-chosen aliases
//!   are formatted in.
//! - Every predicate compiles to a single boolean expression; outer
//!   `AND`/`OR` composition across top-level predicates is the caller's job.

pub mod alias;
pub mod builder;
pub mod date;
pub mod like;
pub mod object;
pub mod r#trait;

use query_ast::{Predicate, QueryKind};
use rusqlite::types::{ToSqlOutput, Value};
use rusqlite::ToSql;

use crate::error::CoreResult;
use crate::resolver::ResolverAdapter;
use crate::sql::alias::AliasGen;

/// An owned SQL bind value. `rusqlite::types::Value` already covers this,
/// but a thin wrapper keeps the compiler's public surface from leaking
/// `rusqlite` types into `query-ast`-level call sites that only care about
/// "a SQL literal".
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<&str> for BindValue {
    fn from(s: &str) -> Self {
        BindValue::Text(s.to_string())
    }
}

impl From<String> for BindValue {
    fn from(s: String) -> Self {
        BindValue::Text(s)
    }
}

impl From<f64> for BindValue {
    fn from(n: f64) -> Self {
        BindValue::Real(n)
    }
}

impl From<i64> for BindValue {
    fn from(n: i64) -> Self {
        BindValue::Integer(n)
    }
}

impl ToSql for BindValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            BindValue::Null => ToSqlOutput::Owned(Value::Null),
            BindValue::Integer(n) => ToSqlOutput::Owned(Value::Integer(*n)),
            BindValue::Real(n) => ToSqlOutput::Owned(Value::Real(*n)),
            BindValue::Text(s) => ToSqlOutput::Owned(Value::Text(s.clone())),
        })
    }
}

/// `(sql_fragment, bind_args)`: the result of compiling one predicate (or
/// one whole `AND`/`OR` tree of predicates) to a single boolean expression.
#[derive(Debug, Clone, Default)]
pub struct Compiled {
    pub sql: String,
    pub binds: Vec<BindValue>,
}

impl Compiled {
    pub fn new(sql: impl Into<String>, binds: Vec<BindValue>) -> Self {
        Compiled {
            sql: sql.into(),
            binds,
        }
    }

    pub fn literal(sql: impl Into<String>) -> Self {
        Compiled::new(sql, Vec::new())
    }

    /// Wrap in `NOT ( ... )` when `negated` is set, applied exactly once.
    pub fn negate_if(mut self, negated: bool) -> Self {
        if negated {
            self.sql = format!("NOT ({})", self.sql);
        }
        self
    }

    pub fn and(clauses: Vec<Compiled>) -> Self {
        Compiled::join(clauses, "AND", "1=1")
    }

    pub fn or(clauses: Vec<Compiled>) -> Self {
        Compiled::join(clauses, "OR", "1=0")
    }

    fn join(clauses: Vec<Compiled>, op: &str, empty: &str) -> Self {
        if clauses.is_empty() {
            return Compiled::literal(empty);
        }
        if clauses.len() == 1 {
            return clauses.into_iter().next().unwrap();
        }
        let mut binds = Vec::new();
        let parts: Vec<String> = clauses
            .into_iter()
            .map(|c| {
                binds.extend(c.binds);
                format!("({})", c.sql)
            })
            .collect();
        Compiled::new(parts.join(&format!(" {op} ")), binds)
    }
}

/// Shared compile-time context: the resolver adapter and the alias
/// generator, threaded through every recursive call so nested subqueries
/// never reuse an alias.
pub struct Ctx<'a, 'conn> {
    pub resolver: &'a ResolverAdapter<'conn>,
    pub aliases: AliasGen,
}

impl<'a, 'conn> Ctx<'a, 'conn> {
    pub fn new(resolver: &'a ResolverAdapter<'conn>) -> Self {
        Ctx {
            resolver,
            aliases: AliasGen::new(),
        }
    }
}

/// Top-level dispatcher: compiles a predicate in the context implied by
/// `kind` (object or trait).
pub fn compile(kind: QueryKind, pred: &Predicate, row_alias: &str, ctx: &mut Ctx) -> CoreResult<Compiled> {
    match kind {
        QueryKind::Object => object::compile_object(pred, row_alias, ctx),
        QueryKind::Trait => r#trait::compile_trait(pred, row_alias, ctx),
    }
}

/// Compile a flat list of top-level predicates (implicitly `AND`-ed).
pub fn compile_all(
    kind: QueryKind,
    preds: &[Predicate],
    row_alias: &str,
    ctx: &mut Ctx,
) -> CoreResult<Compiled> {
    let mut clauses = Vec::with_capacity(preds.len());
    for pred in preds {
        clauses.push(compile(kind, pred, row_alias, ctx)?);
    }
    Ok(Compiled::and(clauses))
}

/// Validates a field/type name the parser is responsible for checking is a
/// safe identifier before it ever reaches the compiler. Field names come
/// straight from the AST and are formatted directly into SQL text (there is
/// no way to bind a column/table name), so this is the compiler's own
/// defense-in-depth check, not a substitute for parser-side validation.
pub fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
}
