//! Executes a `Pipeline`'s stages, in order, over a base SQL result set
//! (§4.7): assignment (batched-first, per-row fallback), filter, sort,
//! limit.

use query_ast::{
    Aggregation, AssignmentSource, ComputedValue, ExprRef, ObjectResult, Pipeline,
    PipelineObjectResult, PipelineStage, PipelineTraitResult, SortCriterion, TraitResult,
};
use rusqlite::Connection;
use serde_json::Value as Json;

use crate::binder::OuterBinding;
use crate::compare::{self, Normalized};
use crate::error::CoreResult;
use crate::pipeline::{aggregate, batch};
use crate::resolver::ResolverAdapter;
use crate::ExecutorOptions;

pub fn run_object_pipeline(
    base_rows: Vec<ObjectResult>,
    pipeline: &Pipeline,
    conn: &Connection,
    resolver: &ResolverAdapter,
    options: &ExecutorOptions,
) -> CoreResult<Vec<PipelineObjectResult>> {
    let mut rows: Vec<PipelineObjectResult> = base_rows.into_iter().map(PipelineObjectResult::new).collect();

    for stage in pipeline.with_merged_sorts() {
        match stage {
            PipelineStage::Assignment {
                name,
                agg,
                agg_field,
                source,
            } => run_object_assignment(&mut rows, &name, agg, agg_field.as_deref(), &source, conn, resolver, options)?,
            PipelineStage::Filter(expr) => rows.retain(|r| eval_filter(&object_expr_value(r, &expr.left), &expr.op, &expr.right)),
            PipelineStage::Sort(criteria) => sort_rows(&mut rows, &criteria, object_expr_value),
            PipelineStage::Limit(n) => rows.truncate(n as usize),
        }
    }

    Ok(rows)
}

pub fn run_trait_pipeline(
    base_rows: Vec<TraitResult>,
    pipeline: &Pipeline,
    conn: &Connection,
    resolver: &ResolverAdapter,
    options: &ExecutorOptions,
) -> CoreResult<Vec<PipelineTraitResult>> {
    let mut rows: Vec<PipelineTraitResult> = base_rows.into_iter().map(PipelineTraitResult::new).collect();

    for stage in pipeline.with_merged_sorts() {
        match stage {
            PipelineStage::Assignment {
                name,
                agg,
                agg_field,
                source,
            } => run_trait_assignment(&mut rows, &name, agg, agg_field.as_deref(), &source, conn, resolver, options)?,
            PipelineStage::Filter(expr) => rows.retain(|r| eval_filter(&trait_expr_value(r, &expr.left), &expr.op, &expr.right)),
            PipelineStage::Sort(criteria) => sort_rows(&mut rows, &criteria, trait_expr_value),
            PipelineStage::Limit(n) => rows.truncate(n as usize),
        }
    }

    Ok(rows)
}

fn eval_filter(left: &Normalized, op: &query_ast::CmpOp, right: &query_ast::Literal) -> bool {
    let right = compare::normalize_literal(right);
    op.apply(compare::compare(left, &right))
}

fn sort_rows<T>(rows: &mut [T], criteria: &[SortCriterion], value_of: impl Fn(&T, &ExprRef) -> Normalized) {
    rows.sort_by(|a, b| {
        for criterion in criteria {
            let va = value_of(a, &criterion.key);
            let vb = value_of(b, &criterion.key);
            let mut ord = compare::compare(&va, &vb);
            if criterion.descending {
                ord = ord.reverse();
            }
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn object_expr_value(row: &PipelineObjectResult, expr: &ExprRef) -> Normalized {
    match expr {
        ExprRef::Computed(name) => row
            .computed
            .get(name)
            .map(compare::normalize_computed)
            .unwrap_or(Normalized::Null),
        ExprRef::Field(name) => match name.as_str() {
            "id" => Normalized::String(row.base.id.clone()),
            "type" | "type_name" => Normalized::String(row.base.type_name.clone()),
            "file_path" => Normalized::String(row.base.file_path.clone()),
            "line_start" | "line" => Normalized::Number(row.base.line_start as f64, row.base.line_start.to_string()),
            "parent_id" => compare::normalize_opt_str(row.base.parent_id.as_deref()),
            _ => compare::normalize_json(row.base.fields.get(name).unwrap_or(&Json::Null)),
        },
    }
}

fn trait_expr_value(row: &PipelineTraitResult, expr: &ExprRef) -> Normalized {
    match expr {
        ExprRef::Computed(name) => row
            .computed
            .get(name)
            .map(compare::normalize_computed)
            .unwrap_or(Normalized::Null),
        ExprRef::Field(name) => match name.as_str() {
            "id" => Normalized::String(row.base.id.clone()),
            "trait_type" | "type" => Normalized::String(row.base.trait_type.clone()),
            "value" => compare::normalize_opt_str(row.base.value.as_deref()),
            "content" => Normalized::String(row.base.content.clone()),
            "file_path" => Normalized::String(row.base.file_path.clone()),
            "line" | "line_number" => Normalized::Number(row.base.line as f64, row.base.line.to_string()),
            "parent_object_id" => Normalized::String(row.base.parent_object_id.clone()),
            _ => Normalized::Null,
        },
    }
}

#[allow(clippy::too_many_arguments)]
fn run_object_assignment(
    rows: &mut Vec<PipelineObjectResult>,
    name: &str,
    agg: Aggregation,
    agg_field: Option<&str>,
    source: &AssignmentSource,
    conn: &Connection,
    resolver: &ResolverAdapter,
    options: &ExecutorOptions,
) -> CoreResult<()> {
    if options.batched_aggregation {
        let outer_ids: Vec<String> = rows.iter().map(|r| r.base.id.clone()).collect();
        match batch::try_batch(agg, agg_field, source, &outer_ids, conn) {
            Ok(Some(counts)) => {
                let computed = batch::counts_to_computed(counts, &outer_ids);
                for row in rows.iter_mut() {
                    let value = computed.get(&row.base.id).cloned().unwrap_or(ComputedValue::Null);
                    row.computed.insert(name.to_string(), value);
                }
                return Ok(());
            }
            Ok(None) => log::debug!("batched aggregator: `{name}` is not a recognised shape, falling back per-row"),
            Err(err) => log::warn!("batched aggregator failed for `{name}`, falling back per-row: {err}"),
        }
    }

    for row in rows.iter_mut() {
        let outer = OuterBinding::Object { id: row.base.id.clone() };
        let value = compute_assignment(agg, agg_field, source, &outer, conn, resolver)?;
        row.computed.insert(name.to_string(), value);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_trait_assignment(
    rows: &mut Vec<PipelineTraitResult>,
    name: &str,
    agg: Aggregation,
    agg_field: Option<&str>,
    source: &AssignmentSource,
    conn: &Connection,
    resolver: &ResolverAdapter,
    options: &ExecutorOptions,
) -> CoreResult<()> {
    if options.batched_aggregation {
        let outer_ids: Vec<String> = rows.iter().map(|r| r.base.id.clone()).collect();
        match batch::try_batch(agg, agg_field, source, &outer_ids, conn) {
            Ok(Some(counts)) => {
                let computed = batch::counts_to_computed(counts, &outer_ids);
                for row in rows.iter_mut() {
                    let value = computed.get(&row.base.id).cloned().unwrap_or(ComputedValue::Null);
                    row.computed.insert(name.to_string(), value);
                }
                return Ok(());
            }
            Ok(None) => log::debug!("batched aggregator: `{name}` is not a recognised shape, falling back per-row"),
            Err(err) => log::warn!("batched aggregator failed for `{name}`, falling back per-row: {err}"),
        }
    }

    for row in rows.iter_mut() {
        let outer = OuterBinding::Trait {
            id: row.base.id.clone(),
            file_path: row.base.file_path.clone(),
            line: row.base.line,
        };
        let value = compute_assignment(agg, agg_field, source, &outer, conn, resolver)?;
        row.computed.insert(name.to_string(), value);
    }
    Ok(())
}

fn compute_assignment(
    agg: Aggregation,
    agg_field: Option<&str>,
    source: &AssignmentSource,
    outer: &OuterBinding,
    conn: &Connection,
    resolver: &ResolverAdapter,
) -> CoreResult<ComputedValue> {
    match source {
        AssignmentSource::SubQuery(q) => aggregate::compute_sub_query_assignment(agg, agg_field, q, outer, conn, resolver),
        AssignmentSource::NavFunc(nav) => aggregate::compute_nav_func_assignment(agg, agg_field, *nav, outer, conn),
    }
}
