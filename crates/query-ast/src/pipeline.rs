//! The post-processing pipeline: assignment, filter, sort, and limit stages
//! that run in memory over a query's base result set.

use serde::{Deserialize, Serialize};

use crate::literal::{CmpOp, Literal};
use crate::query::Query;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Aggregation {
    First,
    Min,
    Max,
    Count,
    Sum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum NavFunc {
    Refs,
    Refd,
    Parent,
    Child,
    Ancestors,
    Descendants,
}

/// What an `Assignment` stage reduces over: a correlated sub-query (bound to
/// the outer row by the self-ref binder before compilation) or a navigation
/// function counted directly off the outer row's relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssignmentSource {
    SubQuery(Box<Query>),
    NavFunc(NavFunc),
}

/// A reference to either a base-row field or a previously computed value,
/// used by `Filter` and `Sort` stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprRef {
    Field(String),
    Computed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterExpr {
    pub left: ExprRef,
    pub op: CmpOp,
    pub right: Literal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortCriterion {
    pub key: ExprRef,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineStage {
    Assignment {
        name: String,
        agg: Aggregation,
        agg_field: Option<String>,
        source: AssignmentSource,
    },
    Filter(FilterExpr),
    Sort(Vec<SortCriterion>),
    Limit(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Pipeline {
    pub stages: Vec<PipelineStage>,
}

impl Pipeline {
    pub fn new(stages: Vec<PipelineStage>) -> Self {
        Pipeline { stages }
    }

    /// Merge consecutive `Sort` stages into a single multi-key sort, per the
    /// pipeline executor's contract. Returns a new, normalised stage list;
    /// the original pipeline is not mutated.
    pub fn with_merged_sorts(&self) -> Vec<PipelineStage> {
        let mut merged: Vec<PipelineStage> = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            if let PipelineStage::Sort(criteria) = stage {
                if let Some(PipelineStage::Sort(prev)) = merged.last_mut() {
                    prev.extend(criteria.clone());
                    continue;
                }
            }
            merged.push(stage.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sort(key: &str) -> PipelineStage {
        PipelineStage::Sort(vec![SortCriterion {
            key: ExprRef::Field(key.to_string()),
            descending: false,
        }])
    }

    #[test]
    fn merges_consecutive_sorts() {
        let pipeline = Pipeline::new(vec![
            sort("status"),
            sort("priority"),
            PipelineStage::Limit(5),
        ]);
        let merged = pipeline.with_merged_sorts();
        assert_eq!(merged.len(), 2);
        match &merged[0] {
            PipelineStage::Sort(criteria) => assert_eq!(criteria.len(), 2),
            other => panic!("expected merged sort, got {other:?}"),
        }
    }

    #[test]
    fn does_not_merge_across_other_stages() {
        let pipeline = Pipeline::new(vec![
            sort("status"),
            PipelineStage::Limit(5),
            sort("priority"),
        ]);
        let merged = pipeline.with_merged_sorts();
        assert_eq!(merged.len(), 3);
    }
}
