//! The post-processing pipeline (§4.7-4.9): assignment, filter, sort, and
//! limit stages run in memory over a query's base SQL result set.

pub mod aggregate;
pub mod batch;
pub mod executor;

pub use executor::{run_object_pipeline, run_trait_pipeline};
