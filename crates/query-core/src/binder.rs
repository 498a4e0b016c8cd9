//! The self-reference binder.
//!
//! For each pipeline assignment whose source is a sub-query, the binder
//! walks that sub-query's predicate tree (recursing through `Or`, `Group`,
//! and nested `Target::SubQuery`s) and substitutes every `Target::SelfRef`
//! with a concrete binding against the outer row, per the table in spec
//! §4.6. It returns a new predicate tree; the original is never mutated.
//!
//! The dispatch key is purely `(outer row kind, predicate kind)` — not which
//! kind of query the self-ref predicate's immediate enclosing `Query`
//! belongs to. That is why `on:_`/`within:_` (trait-only predicates) still
//! bind to an *object* outer row's id: the outer binding identity is
//! threaded down unchanged through every level of nesting.

use query_ast::{Predicate, PredicateKind, Query, QueryKind, Target};

use crate::error::{CoreResult, Error};

/// Identity of the row a pipeline sub-query is correlated against.
#[derive(Debug, Clone)]
pub enum OuterBinding {
    Object { id: String },
    Trait {
        id: String,
        file_path: String,
        line: i64,
    },
}

impl OuterBinding {
    fn kind(&self) -> QueryKind {
        match self {
            OuterBinding::Object { .. } => QueryKind::Object,
            OuterBinding::Trait { .. } => QueryKind::Trait,
        }
    }
}

/// Bind every self-ref in `query`'s predicate tree against `outer`,
/// returning a new, fully-bound query. `query.pipeline` (a sub-query never
/// carries its own nested pipeline in this system) is left untouched.
pub fn bind_query(query: &Query, outer: &OuterBinding) -> CoreResult<Query> {
    let mut bound = query.clone();
    bound.predicates = query
        .predicates
        .iter()
        .map(|p| bind_predicate(p, outer))
        .collect::<CoreResult<Vec<_>>>()?;
    Ok(bound)
}

pub fn bind_predicate(pred: &Predicate, outer: &OuterBinding) -> CoreResult<Predicate> {
    let kind = bind_kind(&pred.kind, outer)?;
    Ok(Predicate {
        kind,
        negated: pred.negated,
    })
}

fn bind_kind(kind: &PredicateKind, outer: &OuterBinding) -> CoreResult<PredicateKind> {
    use PredicateKind::*;
    Ok(match kind {
        Field { .. } | Value { .. } | Source(_) | Content(_) | ElementEquality { .. }
        | RefdByLine { .. } | AtLocation { .. } => kind.clone(),

        StringFunc {
            kind: sk,
            target,
            value,
            case_sensitive,
        } => StringFunc {
            kind: *sk,
            target: target.clone(),
            value: value.clone(),
            case_sensitive: *case_sensitive,
        },

        ArrayQuantifier {
            kind: qk,
            field,
            element_predicate,
        } => ArrayQuantifier {
            kind: *qk,
            field: field.clone(),
            element_predicate: Box::new(bind_predicate(element_predicate, outer)?),
        },

        Parent(t) => Parent(bind_nav_target(t, outer, "parent")?),
        Ancestor(t) => Ancestor(bind_nav_target(t, outer, "ancestor")?),
        Child(t) => Child(bind_nav_target(t, outer, "child")?),
        Descendant(t) => Descendant(bind_nav_target(t, outer, "descendant")?),
        Refs(t) => Refs(bind_nav_target(t, outer, "refs")?),

        Refd(t) => match (t, outer) {
            (Target::SelfRef, OuterBinding::Trait { file_path, line, .. }) => {
                return Ok(RefdByLine {
                    file_path: file_path.clone(),
                    line: *line,
                })
            }
            (Target::SelfRef, OuterBinding::Object { .. }) => Refd(bind_nav_target(t, outer, "refd")?),
            _ => Refd(bind_target_recursive(t, outer)?),
        },

        On(t) => On(bind_trait_only_target(t, outer, "on")?),
        Within(t) => Within(bind_trait_only_target(t, outer, "within")?),

        Has(t) => Has(bind_attachment_target(t, outer)?),
        Contains(t) => Contains(bind_attachment_target(t, outer)?),

        At(t) => match (t, outer) {
            (Target::SelfRef, OuterBinding::Trait { file_path, line, .. }) => {
                return Ok(AtLocation {
                    file_path: file_path.clone(),
                    line: *line,
                })
            }
            (Target::SelfRef, OuterBinding::Object { .. }) => {
                return Err(Error::self_ref_context(
                    "`at:_` expects a trait as the outer row, but the outer row is an object",
                ))
            }
            _ => At(bind_target_recursive(t, outer)?),
        },

        Or(l, r) => Or(
            Box::new(bind_predicate(l, outer)?),
            Box::new(bind_predicate(r, outer)?),
        ),
        Group(preds) => Group(
            preds
                .iter()
                .map(|p| bind_predicate(p, outer))
                .collect::<CoreResult<Vec<_>>>()?,
        ),
    })
}

/// `parent:_` / `ancestor:_` / `child:_` / `descendant:_` / `refs:_`:
/// valid only when the outer row is an object; errors when the outer row is
/// a trait, since these predicates expect an object target.
fn bind_nav_target(t: &Target, outer: &OuterBinding, name: &str) -> CoreResult<Target> {
    match (t, outer) {
        (Target::SelfRef, OuterBinding::Object { id }) => Ok(Target::Id(id.clone())),
        (Target::SelfRef, OuterBinding::Trait { .. }) => Err(Error::self_ref_context(format!(
            "`{name}:_` expects an object target, but `_` refers to a trait"
        ))),
        _ => bind_target_recursive(t, outer),
    }
}

/// `on:_` / `within:_`: bind to the outer row's id regardless of whether the
/// outer row is an object or a trait is not possible — these predicates
/// compare against an *object* id (the trait's parent/ancestor), so they are
/// only legal when the outer row is itself an object.
fn bind_trait_only_target(t: &Target, outer: &OuterBinding, name: &str) -> CoreResult<Target> {
    match (t, outer) {
        (Target::SelfRef, OuterBinding::Object { id }) => Ok(Target::Id(id.clone())),
        (Target::SelfRef, OuterBinding::Trait { .. }) => Err(Error::self_ref_context(format!(
            "`{name}:_` expects an object target, but `_` refers to a trait"
        ))),
        _ => bind_target_recursive(t, outer),
    }
}

/// `has:_` / `contains:_`: when the outer row is a trait, this is a fast
/// path straight to that trait's id. When the outer row is an object, the
/// self-ref is left unbound (passthrough) — it is only meaningful once this
/// predicate's own trait sub-query is itself correlated against some other
/// row, which is a context this binder pass doesn't have yet.
fn bind_attachment_target(t: &Target, outer: &OuterBinding) -> CoreResult<Target> {
    match (t, outer) {
        (Target::SelfRef, OuterBinding::Trait { id, .. }) => Ok(Target::Id(id.clone())),
        (Target::SelfRef, OuterBinding::Object { .. }) => Ok(Target::SelfRef),
        _ => bind_target_recursive(t, outer),
    }
}

/// Recurse into a `Target::SubQuery`'s own predicate tree, carrying the same
/// outer binding down (the self-ref always refers to the original outer
/// row, no matter how many sub-query levels it is nested under).
fn bind_target_recursive(t: &Target, outer: &OuterBinding) -> CoreResult<Target> {
    match t {
        Target::SubQuery(q) => Ok(Target::SubQuery(Box::new(bind_query(q, outer)?))),
        Target::Id(_) => Ok(t.clone()),
        Target::SelfRef => Err(Error::self_ref_context(format!(
            "`_` is not valid here for an outer row of kind {:?}",
            outer.kind()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_ast::{CmpOp, Literal, QueryKind};

    fn trait_query(type_name: &str, pred: Predicate) -> Query {
        Query::new(QueryKind::Trait, type_name).with_predicate(pred)
    }

    fn object_query(type_name: &str, pred: Predicate) -> Query {
        Query::new(QueryKind::Object, type_name).with_predicate(pred)
    }

    #[test]
    fn binds_within_self_ref_to_object_id() {
        let q = trait_query("todo", Predicate::new(PredicateKind::Within(Target::SelfRef)));
        let outer = OuterBinding::Object {
            id: "alpha".to_string(),
        };
        let bound = bind_query(&q, &outer).unwrap();
        match &bound.predicates[0].kind {
            PredicateKind::Within(Target::Id(id)) => assert_eq!(id, "alpha"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rejects_trait_outer_binding_an_object_target_predicate() {
        let q = trait_query("todo", Predicate::new(PredicateKind::Parent(Target::SelfRef)));
        let outer = OuterBinding::Trait {
            id: "t1".to_string(),
            file_path: "a.md".to_string(),
            line: 3,
        };
        let err = bind_query(&q, &outer).unwrap_err();
        assert_eq!(err.kind, query_ast::ErrorKind::SelfRefContext);
    }

    #[test]
    fn binds_at_self_ref_to_at_location_marker() {
        let q = trait_query("mention", Predicate::new(PredicateKind::At(Target::SelfRef)));
        let outer = OuterBinding::Trait {
            id: "t1".to_string(),
            file_path: "notes/a.md".to_string(),
            line: 42,
        };
        let bound = bind_query(&q, &outer).unwrap();
        match &bound.predicates[0].kind {
            PredicateKind::AtLocation { file_path, line } => {
                assert_eq!(file_path, "notes/a.md");
                assert_eq!(*line, 42);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn binds_refd_self_ref_to_trait_line_marker() {
        let q = object_query("project", Predicate::new(PredicateKind::Refd(Target::SelfRef)));
        let outer = OuterBinding::Trait {
            id: "t1".to_string(),
            file_path: "notes/a.md".to_string(),
            line: 7,
        };
        let bound = bind_query(&q, &outer).unwrap();
        match &bound.predicates[0].kind {
            PredicateKind::RefdByLine { file_path, line } => {
                assert_eq!(file_path, "notes/a.md");
                assert_eq!(*line, 7);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn has_self_ref_is_fast_path_for_trait_outer() {
        let q = object_query("project", Predicate::new(PredicateKind::Has(Target::SelfRef)));
        let outer = OuterBinding::Trait {
            id: "t9".to_string(),
            file_path: "a.md".to_string(),
            line: 1,
        };
        let bound = bind_query(&q, &outer).unwrap();
        match &bound.predicates[0].kind {
            PredicateKind::Has(Target::Id(id)) => assert_eq!(id, "t9"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn bound_tree_contains_no_self_ref() {
        let q = trait_query(
            "todo",
            Predicate::new(PredicateKind::Or(
                Box::new(Predicate::new(PredicateKind::Within(Target::SelfRef))),
                Box::new(Predicate::new(PredicateKind::Value {
                    cmp_op: CmpOp::Eq,
                    value: Literal::String("done".into()),
                })),
            )),
        );
        let outer = OuterBinding::Object {
            id: "alpha".to_string(),
        };
        let bound = bind_query(&q, &outer).unwrap();
        assert!(!contains_self_ref(&bound.predicates[0]));
    }

    fn contains_self_ref(pred: &Predicate) -> bool {
        fn target_has_self_ref(t: &Target) -> bool {
            match t {
                Target::SelfRef => true,
                Target::SubQuery(q) => q.predicates.iter().any(contains_self_ref),
                Target::Id(_) => false,
            }
        }
        match &pred.kind {
            PredicateKind::Parent(t)
            | PredicateKind::Ancestor(t)
            | PredicateKind::Child(t)
            | PredicateKind::Descendant(t)
            | PredicateKind::Has(t)
            | PredicateKind::Contains(t)
            | PredicateKind::On(t)
            | PredicateKind::Within(t)
            | PredicateKind::Refs(t)
            | PredicateKind::Refd(t)
            | PredicateKind::At(t) => target_has_self_ref(t),
            PredicateKind::Or(l, r) => contains_self_ref(l) || contains_self_ref(r),
            PredicateKind::Group(preds) => preds.iter().any(contains_self_ref),
            PredicateKind::ArrayQuantifier {
                element_predicate, ..
            } => contains_self_ref(element_predicate),
            _ => false,
        }
    }
}
