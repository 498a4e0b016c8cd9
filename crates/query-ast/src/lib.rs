//! Abstract syntax tree for the object/trait query language.
//!
//! This crate owns only data: the predicate algebra, the pipeline stages,
//! and the run-time result structs the executor hands back to callers. It
//! has no knowledge of SQL or of any particular store; see `query-core` for
//! the compiler, binder, and executor built on top of this AST.

pub mod error;
pub mod literal;
pub mod pipeline;
pub mod predicate;
pub mod query;
pub mod result;

pub use error::{Error, ErrorKind, Result};
pub use literal::{CmpOp, Literal};
pub use pipeline::{
    Aggregation, AssignmentSource, ExprRef, FilterExpr, NavFunc, Pipeline, PipelineStage,
    SortCriterion,
};
pub use predicate::{
    FieldRef, Predicate, PredicateKind, QuantifierKind, StringFuncKind, Target, TraitSourceKind,
};
pub use query::{Query, QueryKind};
pub use result::{ComputedValue, ObjectResult, PipelineObjectResult, PipelineTraitResult, TraitResult, TraitSource};
