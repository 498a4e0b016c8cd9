//! The compiler, binder, and executor built on top of `query-ast`'s data
//! model, targeting a SQLite store.
//!
//! Module layout mirrors the pipeline a query actually travels through:
//! `resolver` (wikilink resolution) and `binder` (self-reference binding)
//! run before `sql` (predicate-to-SQL compilation), and `pipeline` runs
//! after the store returns base rows. `executor` wires all of it together
//! behind the two kind-checked entry points callers use.

pub mod binder;
pub mod compare;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod resolver;
pub mod sql;
pub mod store;

pub use error::{CoreResult, Error, ErrorKind};
pub use executor::{Executor, ExecutorOptions};

pub use query_ast::{
    Aggregation, AssignmentSource, CmpOp, ComputedValue, ExprRef, FieldRef, FilterExpr, Literal,
    NavFunc, ObjectResult, Pipeline, PipelineObjectResult, PipelineStage, PipelineTraitResult,
    Predicate, PredicateKind, Query, QueryKind, QuantifierKind, SortCriterion, StringFuncKind,
    Target, TraitResult, TraitSource, TraitSourceKind,
};
