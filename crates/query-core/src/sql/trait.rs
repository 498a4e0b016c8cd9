//! Compiles a predicate into a boolean SQL fragment, in trait context: the
//! correlated row is a row of `traits` aliased as `row_alias`. Module file is
//! named `trait.rs` but declared as `r#trait` in `sql::mod`, since `trait` is
//! a reserved keyword.

use query_ast::{CmpOp, Predicate, PredicateKind, Target, TraitSourceKind};

use crate::error::{CoreResult, Error};
use crate::sql::alias;
use crate::sql::object::{
    compile_field_eq, compile_field_ne, compile_field_order, compile_string_func, prepend,
    resolve_target_id,
};
use crate::sql::{self, like, BindValue, Compiled, Ctx};

pub fn compile_trait(pred: &Predicate, row_alias: &str, ctx: &mut Ctx) -> CoreResult<Compiled> {
    let compiled = compile_trait_kind(&pred.kind, row_alias, ctx)?;
    Ok(compiled.negate_if(pred.negated))
}

fn compile_trait_kind(kind: &PredicateKind, row_alias: &str, ctx: &mut Ctx) -> CoreResult<Compiled> {
    use PredicateKind::*;
    match kind {
        Value { cmp_op, value } => {
            let expr = format!("{row_alias}.value");
            match cmp_op {
                CmpOp::Eq => Ok(compile_field_eq(&expr, value)),
                CmpOp::Ne => Ok(compile_field_ne(&expr, value)),
                _ => compile_field_order(&expr, *cmp_op, value),
            }
        }

        Source(source_kind) => Ok(compile_source(*source_kind, row_alias)),

        On(target) => compile_on(target, row_alias, ctx),
        Within(target) => compile_within(target, row_alias, ctx),

        StringFunc {
            kind: skind,
            target,
            value,
            case_sensitive,
        } => compile_string_func(*skind, target, value, *case_sensitive, row_alias, None),

        Refs(target) => compile_refs(target, row_alias, ctx),
        Refd(target) => compile_refd(target, row_alias, ctx),
        RefdByLine { file_path, line } => compile_refd_by_line(file_path, *line, row_alias),

        At(target) => compile_at(target, row_alias, ctx),
        AtLocation { file_path, line } => Ok(Compiled::new(
            format!("{row_alias}.file_path = ? AND {row_alias}.line_number = ?"),
            vec![BindValue::from(file_path.clone()), BindValue::from(*line)],
        )),

        Content(term) => Ok(Compiled::new(
            format!("{row_alias}.content LIKE ? ESCAPE '\\'"),
            vec![BindValue::from(like::contains_pattern(term))],
        )),

        Or(l, r) => {
            let left = compile_trait(l, row_alias, ctx)?;
            let right = compile_trait(r, row_alias, ctx)?;
            Ok(Compiled::or(vec![left, right]))
        }
        Group(preds) => {
            let mut clauses = Vec::with_capacity(preds.len());
            for p in preds {
                clauses.push(compile_trait(p, row_alias, ctx)?);
            }
            Ok(Compiled::and(clauses))
        }

        Field { .. }
        | ArrayQuantifier { .. }
        | Parent(_)
        | Ancestor(_)
        | Child(_)
        | Descendant(_)
        | Has(_)
        | Contains(_)
        | ElementEquality { .. } => Err(Error::unsupported_predicate(format!(
            "{kind:?} is only legal in object context"
        ))),
    }
}

/// `source` is derived, not stored directly: a trait is "frontmatter" when
/// it has no inline value and its parent object carries a field keyed by
/// the trait's own type name; everything else is "inline".
pub(crate) fn frontmatter_expr(row_alias: &str) -> String {
    format!(
        "({row_alias}.value IS NULL AND EXISTS (
            SELECT 1 FROM objects po WHERE po.id = {row_alias}.parent_object_id
            AND json_extract(po.fields, '$.' || {row_alias}.trait_type) IS NOT NULL
        ))"
    )
}

fn compile_source(kind: TraitSourceKind, row_alias: &str) -> Compiled {
    let frontmatter = frontmatter_expr(row_alias);
    match kind {
        TraitSourceKind::Frontmatter => Compiled::literal(frontmatter),
        TraitSourceKind::Inline => Compiled::literal(format!("NOT ({frontmatter})")),
    }
}

fn compile_on(target: &Target, row_alias: &str, ctx: &mut Ctx) -> CoreResult<Compiled> {
    match target {
        Target::Id(id) => {
            let id = resolve_target_id(id, ctx)?;
            Ok(Compiled::new(
                format!("{row_alias}.parent_object_id = ?"),
                vec![BindValue::from(id)],
            ))
        }
        Target::SubQuery(q) => {
            let p = alias::PARENT_OBJ;
            let inner = sql::compile_all(q.kind, &q.predicates, p, ctx)?;
            Ok(Compiled::new(
                format!(
                    "EXISTS (SELECT 1 FROM objects {p} WHERE {p}.id = {row_alias}.parent_object_id AND {p}.type = ? AND ({}))",
                    inner.sql
                ),
                prepend(BindValue::from(q.type_name.clone()), inner.binds),
            ))
        }
        Target::SelfRef => Err(Error::missing_binding("`on:_` was never bound")),
    }
}

/// `within:` climbs the parent-object chain starting at the trait's direct
/// parent; "any ancestor" is inclusive of that direct parent.
fn compile_within(target: &Target, row_alias: &str, ctx: &mut Ctx) -> CoreResult<Compiled> {
    let cte = format!(
        "WITH RECURSIVE ancestors_cte(id) AS (
            SELECT parent_object_id FROM traits WHERE id = {row_alias}.id
            UNION ALL
            SELECT o2.parent_id FROM objects o2 JOIN ancestors_cte a ON o2.id = a.id WHERE o2.parent_id IS NOT NULL
        )"
    );
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
        Target::SelfRef => Err(Error::missing_binding("`within:_` was never bound")),
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
            let inner = sql::compile_all(q.kind, &q.predicates, src, ctx)?;
            let table = match q.kind {
                query_ast::QueryKind::Object => "objects",
                query_ast::QueryKind::Trait => "traits",
            };
            let type_col = match q.kind {
                query_ast::QueryKind::Object => "type",
                query_ast::QueryKind::Trait => "trait_type",
            };
            Ok(Compiled::new(
                format!(
                    "EXISTS (SELECT 1 FROM refs r JOIN {table} {src} ON {src}.id = r.source_id WHERE (r.target_id = {row_alias}.id OR r.target_raw = {row_alias}.id) AND {src}.{type_col} = ? AND ({}))",
                    inner.sql
                ),
                prepend(BindValue::from(q.type_name.clone()), inner.binds),
            ))
        }
        Target::SelfRef => Err(Error::missing_binding("`refd:_` was never bound")),
    }
}

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
                "EXISTS (SELECT 1 FROM traits {co} WHERE {co}.file_path = {row_alias}.file_path AND {co}.line_number = {row_alias}.line_number AND {co}.id = ? AND {co}.id != {row_alias}.id)"
            ),
            vec![BindValue::from(trait_id.clone())],
        )),
        Target::SubQuery(q) => {
            let inner = sql::compile_all(q.kind, &q.predicates, co, ctx)?;
            Ok(Compiled::new(
                format!(
                    "EXISTS (SELECT 1 FROM traits {co} WHERE {co}.file_path = {row_alias}.file_path AND {co}.line_number = {row_alias}.line_number AND {co}.id != {row_alias}.id AND {co}.trait_type = ? AND ({}))",
                    inner.sql
                ),
                prepend(BindValue::from(q.type_name.clone()), inner.binds),
            ))
        }
        Target::SelfRef => Err(Error::missing_binding("`at:_` was never bound")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolverAdapter;
    use query_ast::Literal;
    use rusqlite::Connection;

    fn ctx(conn: &Connection) -> ResolverAdapter {
        ResolverAdapter::new(conn)
    }

    #[test]
    fn value_eq_compiles_case_insensitive_comparison() {
        let conn = Connection::open_in_memory().unwrap();
        let resolver = ctx(&conn);
        let mut c = Ctx::new(&resolver);
        let pred = Predicate::new(PredicateKind::Value {
            cmp_op: CmpOp::Eq,
            value: Literal::String("Done".into()),
        });
        let compiled = compile_trait(&pred, "t", &mut c).unwrap();
        assert!(compiled.sql.contains("LOWER(t.value)"));
    }

    #[test]
    fn rejects_object_only_predicate() {
        let conn = Connection::open_in_memory().unwrap();
        let resolver = ctx(&conn);
        let mut c = Ctx::new(&resolver);
        let pred = Predicate::new(PredicateKind::Parent(Target::Id("x".into())));
        let err = compile_trait(&pred, "t", &mut c).unwrap_err();
        assert_eq!(err.kind, query_ast::ErrorKind::UnsupportedPredicate);
    }

    #[test]
    fn unbound_self_ref_is_missing_binding() {
        let conn = Connection::open_in_memory().unwrap();
        let resolver = ctx(&conn);
        let mut c = Ctx::new(&resolver);
        let pred = Predicate::new(PredicateKind::On(Target::SelfRef));
        let err = compile_trait(&pred, "t", &mut c).unwrap_err();
        assert_eq!(err.kind, query_ast::ErrorKind::MissingBinding);
    }

    #[test]
    fn at_location_marker_compiles_to_file_and_line_match() {
        let conn = Connection::open_in_memory().unwrap();
        let resolver = ctx(&conn);
        let mut c = Ctx::new(&resolver);
        let pred = Predicate::new(PredicateKind::AtLocation {
            file_path: "a.md".into(),
            line: 5,
        });
        let compiled = compile_trait(&pred, "t", &mut c).unwrap();
        assert!(compiled.sql.contains("t.file_path = ?"));
        assert_eq!(compiled.binds.len(), 2);
    }
}
