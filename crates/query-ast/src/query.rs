//! The top-level query: a kind (object or trait), a type name, a flat list
//! of top-level predicates (implicitly `AND`-ed), and an optional pipeline.

use serde::{Deserialize, Serialize};

use crate::pipeline::Pipeline;
use crate::predicate::Predicate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum QueryKind {
    Object,
    Trait,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub kind: QueryKind,
    pub type_name: String,
    pub predicates: Vec<Predicate>,
    pub pipeline: Option<Pipeline>,
    /// `LIMIT` attached directly to the top-level query, distinct from a
    /// pipeline `Limit` stage (see `query_core`'s SQL builder).
    pub limit: Option<u64>,
}

impl Query {
    pub fn new(kind: QueryKind, type_name: impl Into<String>) -> Self {
        Query {
            kind,
            type_name: type_name.into(),
            predicates: Vec::new(),
            pipeline: None,
            limit: None,
        }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn is_object(&self) -> bool {
        matches!(self.kind, QueryKind::Object)
    }

    pub fn is_trait(&self) -> bool {
        matches!(self.kind, QueryKind::Trait)
    }
}
