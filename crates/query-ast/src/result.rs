//! Run-time result types: owned by the executor, handed to callers by value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TraitSource {
    Inline,
    Frontmatter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectResult {
    pub id: String,
    pub type_name: String,
    pub fields: Map<String, Json>,
    pub file_path: String,
    pub line_start: i64,
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitResult {
    pub id: String,
    pub trait_type: String,
    pub value: Option<String>,
    pub content: String,
    pub file_path: String,
    pub line: i64,
    pub parent_object_id: String,
    pub source: TraitSource,
}

/// A value computed by a pipeline `Assignment` stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComputedValue {
    Null,
    Number(f64),
    String(String),
}

impl ComputedValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ComputedValue::Number(n) => Some(*n),
            ComputedValue::String(s) => s.trim().parse::<f64>().ok(),
            ComputedValue::Null => None,
        }
    }
}

/// `ObjectResult` plus the `computed` map a pipeline populates as it runs.
/// Created once per base result and mutated only by the pipeline executor
/// for the duration of a single query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineObjectResult {
    pub base: ObjectResult,
    pub computed: BTreeMap<String, ComputedValue>,
}

impl PipelineObjectResult {
    pub fn new(base: ObjectResult) -> Self {
        PipelineObjectResult {
            base,
            computed: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTraitResult {
    pub base: TraitResult,
    pub computed: BTreeMap<String, ComputedValue>,
}

impl PipelineTraitResult {
    pub fn new(base: TraitResult) -> Self {
        PipelineTraitResult {
            base,
            computed: BTreeMap::new(),
        }
    }
}
