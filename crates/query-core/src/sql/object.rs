//! Compiles a predicate into a boolean SQL fragment, in object context: the
//! correlated row is a row of `objects` aliased as `row_alias`.

use query_ast::{CmpOp, FieldRef, Literal, Predicate, PredicateKind, QuantifierKind, Target};

use crate::error::{CoreResult, Error};
use crate::sql::alias;
use crate::sql::{self, date, like, BindValue, Compiled, Ctx};

pub fn compile_object(pred: &Predicate, row_alias: &str, ctx: &mut Ctx) -> CoreResult<Compiled> {
    let compiled = compile_object_kind(&pred.kind, row_alias, ctx)?;
    Ok(compiled.negate_if(pred.negated))
}

fn compile_object_kind(kind: &PredicateKind, row_alias: &str, ctx: &mut Ctx) -> CoreResult<Compiled> {
    use PredicateKind::*;
    match kind {
        Field {
            field,
            value,
            is_exists,
            cmp_op,
        } => compile_field(field, value.as_ref(), *is_exists, *cmp_op, row_alias),

        ArrayQuantifier {
            kind: qkind,
            field,
            element_predicate,
        } => compile_array_quantifier(*qkind, field, element_predicate, row_alias, ctx),

        StringFunc {
            kind: skind,
            target,
            value,
            case_sensitive,
        } => compile_string_func(*skind, target, value, *case_sensitive, row_alias, None),

        Parent(target) => compile_parent(target, row_alias, ctx),
        Ancestor(target) => compile_ancestor(target, row_alias, ctx),
        Child(target) => compile_child(target, row_alias, ctx),
        Descendant(target) => compile_descendant(target, row_alias, ctx),
        Has(target) => compile_has(target, row_alias, ctx),
        Contains(target) => compile_contains(target, row_alias, ctx),

        Refs(target) => compile_refs(target, row_alias, ctx),
        Refd(target) => compile_refd(target, row_alias, ctx),
        RefdByLine { file_path, line } => compile_refd_by_line(file_path, *line, row_alias),

        At(target) => compile_at(target, row_alias, ctx),
        AtLocation { .. } => Err(Error::unsupported_predicate(
            "`at:_` binds against a trait outer row; it has no meaning for an object",
        )),

        Content(term) => Ok(Compiled::new(
            format!(
                "EXISTS (SELECT 1 FROM fts_content WHERE object_id = {row_alias}.id AND fts_content MATCH ?)"
            ),
            vec![BindValue::from(term.clone())],
        )),

        Or(l, r) => {
            let left = compile_object(l, row_alias, ctx)?;
            let right = compile_object(r, row_alias, ctx)?;
            Ok(Compiled::or(vec![left, right]))
        }
        Group(preds) => {
            let mut clauses = Vec::with_capacity(preds.len());
            for p in preds {
                clauses.push(compile_object(p, row_alias, ctx)?);
            }
            Ok(Compiled::and(clauses))
        }

        Value { .. } | Source(_) | On(_) | Within(_) | ElementEquality { .. } => {
            Err(Error::unsupported_predicate(format!(
                "{kind:?} is only legal in trait context"
            )))
        }
    }
}

fn field_expr(row_alias: &str, field: &str) -> CoreResult<String> {
    if !sql::is_safe_identifier(field) {
        return Err(Error::unsupported_predicate(format!(
            "`{field}` is not a safe field identifier"
        )));
    }
    Ok(format!("json_extract({row_alias}.fields, '$.{field}')"))
}

fn compile_field(
    field: &str,
    value: Option<&Literal>,
    is_exists: bool,
    cmp_op: CmpOp,
    row_alias: &str,
) -> CoreResult<Compiled> {
    let expr = field_expr(row_alias, field)?;

    if is_exists {
        return Ok(Compiled::literal(format!("{expr} IS NOT NULL")));
    }

    let value = value.ok_or_else(|| {
        Error::missing_binding(format!("`{field}` predicate has no value and is not an exists check"))
    })?;

    match cmp_op {
        CmpOp::Eq => Ok(compile_field_eq(&expr, value)),
        CmpOp::Ne => Ok(compile_field_ne(&expr, value)),
        _ => compile_field_order(&expr, cmp_op, value),
    }
}

/// Case-insensitive scalar equality, or-ed with array membership (the field
/// may hold a scalar or a JSON array). A numeric-looking RHS additionally
/// triggers a `CAST(... AS REAL)` branch so `3` matches a stored `3.0`.
pub(crate) fn compile_field_eq(expr: &str, value: &Literal) -> Compiled {
    let text = value.to_display_string();
    let mut clauses = vec![
        Compiled::new(
            format!("LOWER({expr}) = LOWER(?)"),
            vec![BindValue::from(text.clone())],
        ),
        Compiled::new(
            format!(
                "EXISTS (SELECT 1 FROM json_each({expr}) WHERE LOWER(json_each.value) = LOWER(?))"
            ),
            vec![BindValue::from(text.clone())],
        ),
    ];
    if let Literal::Number(n) = value {
        clauses.push(Compiled::new(
            format!("CAST({expr} AS REAL) = ?"),
            vec![BindValue::from(*n)],
        ));
        clauses.push(Compiled::new(
            format!("EXISTS (SELECT 1 FROM json_each({expr}) WHERE CAST(json_each.value AS REAL) = ?)"),
            vec![BindValue::from(*n)],
        ));
    }
    Compiled::or(clauses)
}

pub(crate) fn compile_field_ne(expr: &str, value: &Literal) -> Compiled {
    let eq = compile_field_eq(expr, value);
    Compiled::new(format!("NOT ({})", eq.sql), eq.binds)
}

/// `<`, `>`, `<=`, `>=`: numeric when the RHS parses as a number, temporal
/// when it is a recognised date keyword or an ISO date string, lexicographic
/// otherwise.
pub(crate) fn compile_field_order(expr: &str, cmp_op: CmpOp, value: &Literal) -> CoreResult<Compiled> {
    let op = sql_operator(cmp_op);

    if let Literal::Number(n) = value {
        return Ok(Compiled::new(
            format!("CAST({expr} AS REAL) {op} ?"),
            vec![BindValue::from(*n)],
        ));
    }

    if let Literal::String(s) = value {
        if date::is_date_keyword(s) {
            if let Some((boundary_sql, binds)) = date::boundary(s, expr) {
                // `boundary` returns an equality/range predicate for the
                // keyword itself; order comparisons against a keyword reuse
                // the same boundary and only make sense for `past`/`future`,
                // which already encode a direction.
                return Ok(Compiled::new(boundary_sql, binds));
            }
        }
        if crate::compare::parse_temporal(s).is_some() {
            return Ok(Compiled::new(
                format!("DATE({expr}) {op} DATE(?)"),
                vec![BindValue::from(s.clone())],
            ));
        }
        return Ok(Compiled::new(
            format!("{expr} {op} ?"),
            vec![BindValue::from(s.clone())],
        ));
    }

    Ok(Compiled::new(
        format!("{expr} {op} ?"),
        vec![BindValue::from(value.to_display_string())],
    ))
}

fn sql_operator(cmp_op: CmpOp) -> &'static str {
    match cmp_op {
        CmpOp::Lt => "<",
        CmpOp::Gt => ">",
        CmpOp::Le => "<=",
        CmpOp::Ge => ">=",
        CmpOp::Eq => "=",
        CmpOp::Ne => "!=",
    }
}

pub(crate) fn compile_string_func(
    kind: query_ast::StringFuncKind,
    target: &FieldRef,
    value: &str,
    case_sensitive: bool,
    row_alias: &str,
    element_expr: Option<&str>,
) -> CoreResult<Compiled> {
    use query_ast::StringFuncKind::*;

    let expr = match (target, element_expr) {
        (FieldRef::Field(name), _) => field_expr(row_alias, name)?,
        (FieldRef::Element, Some(e)) => e.to_string(),
        (FieldRef::Element, None) => {
            return Err(Error::unsupported_predicate(
                "string function targets the current element outside an array quantifier",
            ))
        }
    };

    if matches!(kind, Matches) {
        let (lhs, pattern) = if case_sensitive {
            (expr, value.to_string())
        } else {
            (expr, format!("(?i){value}"))
        };
        return Ok(Compiled::new(
            format!("{lhs} REGEXP ?"),
            vec![BindValue::from(pattern)],
        ));
    }

    let pattern = match kind {
        Includes => like::contains_pattern(value),
        StartsWith => like::starts_with_pattern(value),
        EndsWith => like::ends_with_pattern(value),
        Matches => unreachable!(),
    };

    let (lhs, pattern) = if case_sensitive {
        (expr, pattern)
    } else {
        (format!("LOWER({expr})"), pattern.to_lowercase())
    };

    Ok(Compiled::new(
        format!("{lhs} LIKE ? ESCAPE '\\'"),
        vec![BindValue::from(pattern)],
    ))
}

fn compile_array_quantifier(
    qkind: QuantifierKind,
    field: &str,
    element_predicate: &Predicate,
    row_alias: &str,
    ctx: &mut Ctx,
) -> CoreResult<Compiled> {
    let field_sql = field_expr(row_alias, field)?;
    let je = ctx.aliases.next("je");
    let element_sql = compile_element_predicate(element_predicate, &format!("{je}.value"))?;

    Ok(match qkind {
        QuantifierKind::Any => Compiled::new(
            format!("EXISTS (SELECT 1 FROM json_each({field_sql}) AS {je} WHERE {})", element_sql.sql),
            element_sql.binds,
        ),
        QuantifierKind::None => Compiled::new(
            format!(
                "NOT EXISTS (SELECT 1 FROM json_each({field_sql}) AS {je} WHERE {})",
                element_sql.sql
            ),
            element_sql.binds,
        ),
        QuantifierKind::All => Compiled::new(
            format!(
                "NOT EXISTS (SELECT 1 FROM json_each({field_sql}) AS {je} WHERE NOT ({}))",
                element_sql.sql
            ),
            element_sql.binds,
        ),
    })
}

/// Compile an `ElementEquality`/`StringFunc` predicate nested inside an
/// `ArrayQuantifier`, where `element_expr` is the `json_each` row's `value`
/// column instead of a named field.
fn compile_element_predicate(pred: &Predicate, element_expr: &str) -> CoreResult<Compiled> {
    let compiled = match &pred.kind {
        PredicateKind::ElementEquality { cmp_op, value } => match cmp_op {
            CmpOp::Eq => compile_field_eq(element_expr, value),
            CmpOp::Ne => compile_field_ne(element_expr, value),
            _ => compile_field_order(element_expr, *cmp_op, value)?,
        },
        PredicateKind::StringFunc {
            kind,
            target,
            value,
            case_sensitive,
        } => compile_string_func(*kind, target, value, *case_sensitive, "", Some(element_expr))?,
        other => {
            return Err(Error::unsupported_predicate(format!(
                "{other:?} is not legal inside an array quantifier's element predicate"
            )))
        }
    };
    Ok(compiled.negate_if(pred.negated))
}

pub(crate) fn resolve_target_id(id: &str, ctx: &mut Ctx) -> CoreResult<String> {
    if crate::resolver::looks_like_wikilink(id) {
        let token = crate::resolver::strip_wikilink(id);
        let outcome = ctx.resolver.resolve(token)?;
        if outcome.ambiguous {
            return Err(Error::ambiguous_reference(token, &outcome.matches));
        }
        return Ok(outcome.target_id.unwrap_or_else(|| token.to_string()));
    }
    Ok(id.to_string())
}

fn compile_parent(target: &Target, row_alias: &str, ctx: &mut Ctx) -> CoreResult<Compiled> {
    match target {
        Target::Id(id) => {
            let id = resolve_target_id(id, ctx)?;
            Ok(Compiled::new(
                format!("{row_alias}.parent_id = ?"),
                vec![BindValue::from(id)],
            ))
        }
        Target::SubQuery(q) => {
            let child_alias = alias::PARENT_OBJ;
            let inner = sql::compile_all(q.kind, &q.predicates, child_alias, ctx)?;
            Ok(Compiled::new(
                format!(
                    "EXISTS (SELECT 1 FROM objects {child_alias} WHERE {child_alias}.id = {row_alias}.parent_id AND {child_alias}.type = ? AND ({}))",
                    inner.sql
                ),
                prepend(BindValue::from(q.type_name.clone()), inner.binds),
            ))
        }
        Target::SelfRef => Err(Error::missing_binding("`parent:_` was never bound")),
    }
}

fn compile_child(target: &Target, row_alias: &str, ctx: &mut Ctx) -> CoreResult<Compiled> {
    let child_alias = alias::CHILD_OBJ;
    match target {
        Target::Id(id) => {
            let id = resolve_target_id(id, ctx)?;
            Ok(Compiled::new(
                format!(
                    "EXISTS (SELECT 1 FROM objects {child_alias} WHERE {child_alias}.parent_id = {row_alias}.id AND {child_alias}.id = ?)"
                ),
                vec![BindValue::from(id)],
            ))
        }
        Target::SubQuery(q) => {
            let inner = sql::compile_all(q.kind, &q.predicates, child_alias, ctx)?;
            Ok(Compiled::new(
                format!(
                    "EXISTS (SELECT 1 FROM objects {child_alias} WHERE {child_alias}.parent_id = {row_alias}.id AND {child_alias}.type = ? AND ({}))",
                    inner.sql
                ),
                prepend(BindValue::from(q.type_name.clone()), inner.binds),
            ))
        }
        Target::SelfRef => Err(Error::missing_binding("`child:_` was never bound")),
    }
}

/// `WITH RECURSIVE` ancestors CTE, seeded at `row_alias`'s own parent and
/// climbing `parent_id` links.
pub(crate) fn ancestors_cte(row_alias: &str) -> String {
    format!(
        "WITH RECURSIVE ancestors_cte(id) AS (
            SELECT parent_id FROM objects WHERE id = {row_alias}.id AND parent_id IS NOT NULL
            UNION ALL
            SELECT o2.parent_id FROM objects o2 JOIN ancestors_cte a ON o2.id = a.id WHERE o2.parent_id IS NOT NULL
        )"
    )
}

/// `WITH RECURSIVE` descendants CTE, seeded at `row_alias` itself (exclusive
/// of itself in the result set; only children and below are emitted) and
/// descending `parent_id` links.
fn descendants_cte(row_alias: &str) -> String {
    format!(
        "WITH RECURSIVE descendants_cte(id) AS (
            SELECT id FROM objects WHERE parent_id = {row_alias}.id
            UNION ALL
            SELECT o2.id FROM objects o2 JOIN descendants_cte d ON o2.parent_id = d.id
        )"
    )
}

/// Subtree CTE: `row_alias` itself plus every descendant, used by
/// `contains:` (an object "contains" a trait on itself or any descendant).
fn subtree_cte(row_alias: &str) -> String {
    format!(
        "WITH RECURSIVE subtree_cte(id) AS (
            SELECT {row_alias}.id
            UNION ALL
            SELECT o2.id FROM objects o2 JOIN subtree_cte s ON o2.parent_id = s.id
        )"
    )
}

fn compile_ancestor(target: &Target, row_alias: &str, ctx: &mut Ctx) -> CoreResult<Compiled> {
    let cte = ancestors_cte(row_alias);
    match target {
        Target::Id(id) => {
            let id = resolve_target_id(id, ctx)?;
            Ok(Compiled::new(
                format!("EXISTS ({cte} SELECT 1 FROM ancestors_cte WHERE id = ?)"),
                vec![BindValue::from(id)],
            ))
        }
        Target::SubQuery(q) => {
            let a = alias::ANCESTOR;
            let inner = sql::compile_all(q.kind, &q.predicates, a, ctx)?;
            Ok(Compiled::new(
                format!(
                    "EXISTS ({cte} SELECT 1 FROM ancestors_cte JOIN objects {a} ON {a}.id = ancestors_cte.id WHERE {a}.type = ? AND ({}))",
                    inner.sql
                ),
                prepend(BindValue::from(q.type_name.clone()), inner.binds),
            ))
        }
        Target::SelfRef => Err(Error::missing_binding("`ancestor:_` was never bound")),
    }
}

fn compile_descendant(target: &Target, row_alias: &str, ctx: &mut Ctx) -> CoreResult<Compiled> {
    let cte = descendants_cte(row_alias);
    match target {
        Target::Id(id) => {
            let id = resolve_target_id(id, ctx)?;
            Ok(Compiled::new(
                format!("EXISTS ({cte} SELECT 1 FROM descendants_cte WHERE id = ?)"),
                vec![BindValue::from(id)],
            ))
        }
        Target::SubQuery(q) => {
            let d = alias::DESCENDANT_OBJ;
            let inner = sql::compile_all(q.kind, &q.predicates, d, ctx)?;
            Ok(Compiled::new(
                format!(
                    "EXISTS ({cte} SELECT 1 FROM descendants_cte JOIN objects {d} ON {d}.id = descendants_cte.id WHERE {d}.type = ? AND ({}))",
                    inner.sql
                ),
                prepend(BindValue::from(q.type_name.clone()), inner.binds),
            ))
        }
        Target::SelfRef => Err(Error::missing_binding("`descendant:_` was never bound")),
    }
}

fn compile_has(target: &Target, row_alias: &str, ctx: &mut Ctx) -> CoreResult<Compiled> {
    match target {
        Target::Id(trait_id) => Ok(Compiled::new(
            format!("EXISTS (SELECT 1 FROM traits t WHERE t.id = ? AND t.parent_object_id = {row_alias}.id)"),
            vec![BindValue::from(trait_id.clone())],
        )),
        Target::SubQuery(q) => {
            let t = alias::TRAIT;
            let inner = sql::compile_all(q.kind, &q.predicates, t, ctx)?;
            Ok(Compiled::new(
                format!(
                    "EXISTS (SELECT 1 FROM traits {t} WHERE {t}.parent_object_id = {row_alias}.id AND {t}.trait_type = ? AND ({}))",
                    inner.sql
                ),
                prepend(BindValue::from(q.type_name.clone()), inner.binds),
            ))
        }
        Target::SelfRef => Err(Error::missing_binding("`has:_` was never bound")),
    }
}

fn compile_contains(target: &Target, row_alias: &str, ctx: &mut Ctx) -> CoreResult<Compiled> {
    let cte = subtree_cte(row_alias);
    match target {
        Target::Id(trait_id) => Ok(Compiled::new(
            format!(
                "EXISTS ({cte} SELECT 1 FROM traits t JOIN subtree_cte s ON t.parent_object_id = s.id WHERE t.id = ?)"
            ),
            vec![BindValue::from(trait_id.clone())],
        )),
        Target::SubQuery(q) => {
            let t = alias::TRAIT;
            let inner = sql::compile_all(q.kind, &q.predicates, t, ctx)?;
            Ok(Compiled::new(
                format!(
                    "EXISTS ({cte} SELECT 1 FROM traits {t} JOIN subtree_cte s ON {t}.parent_object_id = s.id WHERE {t}.trait_type = ? AND ({}))",
                    inner.sql
                ),
                prepend(BindValue::from(q.type_name.clone()), inner.binds),
            ))
        }
        Target::SelfRef => Err(Error::missing_binding("`contains:_` was never bound")),
    }
}

fn compile_refs(target: &Target, row_alias: &str, ctx: &mut Ctx) -> CoreResult<Compiled> {
    match target {
        Target::Id(id) => {
            let id = resolve_target_id(id, ctx)?;
            Ok(Compiled::new(
                format!(
                    "EXISTS (SELECT 1 FROM refs r WHERE r.source_id = {row_alias}.id AND (r.target_id = ? OR r.target_raw = ?))"
                ),
                vec![BindValue::from(id.clone()), BindValue::from(id)],
            ))
        }
        Target::SubQuery(q) => {
            let target_obj = alias::TARGET_OBJ;
            let inner = sql::compile_all(q.kind, &q.predicates, target_obj, ctx)?;
            Ok(Compiled::new(
                format!(
                    "EXISTS (SELECT 1 FROM refs r JOIN objects {target_obj} ON ({target_obj}.id = r.target_id OR {target_obj}.id = r.target_raw) WHERE r.source_id = {row_alias}.id AND {target_obj}.type = ? AND ({}))",
                    inner.sql
                ),
                prepend(BindValue::from(q.type_name.clone()), inner.binds),
            ))
        }
        Target::SelfRef => Err(Error::missing_binding("`refs:_` was never bound")),
    }
}

fn compile_refd(target: &Target, row_alias: &str, ctx: &mut Ctx) -> CoreResult<Compiled> {
    match target {
        Target::Id(id) => {
            let id = resolve_target_id(id, ctx)?;
            Ok(Compiled::new(
                format!(
                    "EXISTS (SELECT 1 FROM refs r WHERE (r.target_id = {row_alias}.id OR r.target_raw = {row_alias}.id) AND r.source_id = ?)"
                ),
                vec![BindValue::from(id)],
            ))
        }
        Target::SubQuery(q) => {
            let src = alias::SOURCE;
            match q.kind {
                query_ast::QueryKind::Object => {
                    let inner = sql::compile_all(q.kind, &q.predicates, src, ctx)?;
                    Ok(Compiled::new(
                        format!(
                            "EXISTS (SELECT 1 FROM refs r JOIN objects {src} ON {src}.id = r.source_id WHERE (r.target_id = {row_alias}.id OR r.target_raw = {row_alias}.id) AND {src}.type = ? AND ({}))",
                            inner.sql
                        ),
                        prepend(BindValue::from(q.type_name.clone()), inner.binds),
                    ))
                }
                query_ast::QueryKind::Trait => {
                    let src_t = alias::SOURCE_TRAIT;
                    let inner = sql::compile_all(q.kind, &q.predicates, src_t, ctx)?;
                    Ok(Compiled::new(
                        format!(
                            "EXISTS (SELECT 1 FROM refs r JOIN traits {src_t} ON {src_t}.id = r.source_id WHERE (r.target_id = {row_alias}.id OR r.target_raw = {row_alias}.id) AND {src_t}.trait_type = ? AND ({}))",
                            inner.sql
                        ),
                        prepend(BindValue::from(q.type_name.clone()), inner.binds),
                    ))
                }
            }
        }
        Target::SelfRef => Err(Error::missing_binding("`refd:_` was never bound")),
    }
}

/// The trait-line marker produced by the binder for `Trait T: refd:_`:
/// resolves `(file_path, line)` to that trait's id with a scalar subquery,
/// then matches it the same way a direct `Refd(Target::Id(..))` would.
fn compile_refd_by_line(file_path: &str, line: i64, row_alias: &str) -> CoreResult<Compiled> {
    let lookup = "(SELECT id FROM traits WHERE file_path = ? AND line_number = ?)";
    Ok(Compiled::new(
        format!(
            "EXISTS (SELECT 1 FROM refs r WHERE (r.target_id = {row_alias}.id OR r.target_raw = {row_alias}.id) AND r.source_id IN ({lookup}, {lookup}))"
        ),
        vec![
            BindValue::from(file_path.to_string()),
            BindValue::from(line),
            BindValue::from(file_path.to_string()),
            BindValue::from(line),
        ],
    ))
}

fn compile_at(target: &Target, row_alias: &str, ctx: &mut Ctx) -> CoreResult<Compiled> {
    let co = alias::COLOCATED;
    match target {
        Target::Id(trait_id) => Ok(Compiled::new(
            format!(
                "EXISTS (SELECT 1 FROM traits {co} WHERE {co}.file_path = {row_alias}.file_path AND {co}.line_number = {row_alias}.line_start AND {co}.id = ? AND {co}.id != {row_alias}.id)"
            ),
            vec![BindValue::from(trait_id.clone())],
        )),
        Target::SubQuery(q) => {
            let inner = sql::compile_all(q.kind, &q.predicates, co, ctx)?;
            Ok(Compiled::new(
                format!(
                    "EXISTS (SELECT 1 FROM traits {co} WHERE {co}.file_path = {row_alias}.file_path AND {co}.line_number = {row_alias}.line_start AND {co}.trait_type = ? AND ({}))",
                    inner.sql
                ),
                prepend(BindValue::from(q.type_name.clone()), inner.binds),
            ))
        }
        Target::SelfRef => Err(Error::missing_binding("`at:_` was never bound")),
    }
}

pub(crate) fn prepend(value: BindValue, rest: Vec<BindValue>) -> Vec<BindValue> {
    let mut out = Vec::with_capacity(rest.len() + 1);
    out.push(value);
    out.extend(rest);
    out
}

