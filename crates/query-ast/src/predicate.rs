//! The closed predicate algebra.
//!
//! Predicates are a closed tagged variant on purpose: exhaustiveness over
//! `PredicateKind` is what keeps the SQL compiler and the self-ref binder
//! trivially correct. Add a new predicate kind by extending the enum and
//! both compiler dispatch functions in the same change.

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use crate::literal::{CmpOp, Literal};
use crate::query::Query;

/// The target of a hierarchy/reference/attachment predicate.
///
/// Earlier iterations of this kind of predicate modelled `target`,
/// `sub_query`, and `is_self_ref` as three independent optional fields; that
/// is a straightforward source of "all three absent" or "two present"
/// states that should be unrepresentable. A tagged union closes that hole:
/// exactly one of these three shapes exists for any given predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum Target {
    /// A concrete id: a resolved object id, a raw (unresolved) wikilink
    /// token kept as a fallback key, or a trait id for a `has`/`contains`
    /// fast path.
    Id(String),
    /// A nested query whose rows are matched against via a correlated
    /// `EXISTS`.
    SubQuery(Box<Query>),
    /// The symbolic `_` token. Only legal inside a pipeline sub-query; the
    /// self-ref binder rewrites every occurrence to `Id` before the SQL
    /// compiler ever sees the predicate tree. The compiler treats an
    /// unbound `SelfRef` as a programmer error (`MissingBinding`).
    SelfRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringFuncKind {
    Includes,
    StartsWith,
    EndsWith,
    Matches,
}

/// What the left-hand side of a `StringFunc` predicate refers to: a named
/// object field, or the current array element (`_`) inside a quantifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum FieldRef {
    Field(String),
    Element,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantifierKind {
    Any,
    All,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraitSourceKind {
    Inline,
    Frontmatter,
}

/// The closed set of predicate variants.
///
/// `RefdByLine` and `AtLocation` are binder-only variants: the parser never
/// produces them directly. They replace the `__trait_line:` /
/// `__selfref_trait:` string-encoded markers a dynamic-language origin for
/// this system would have used, since a typed AST can simply add a new
/// variant instead of smuggling file/line through a target string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum PredicateKind {
    // --- object-only ---
    Field {
        field: String,
        value: Option<Literal>,
        is_exists: bool,
        cmp_op: CmpOp,
    },
    ArrayQuantifier {
        kind: QuantifierKind,
        field: String,
        element_predicate: Box<Predicate>,
    },
    Parent(Target),
    Ancestor(Target),
    Child(Target),
    Descendant(Target),
    Has(Target),
    Contains(Target),

    // --- trait-only ---
    Value {
        cmp_op: CmpOp,
        value: Literal,
    },
    Source(TraitSourceKind),
    On(Target),
    Within(Target),

    // --- shared (object or trait context) ---
    StringFunc {
        kind: StringFuncKind,
        target: FieldRef,
        value: String,
        case_sensitive: bool,
    },
    /// Only legal nested inside an `ArrayQuantifier`'s `element_predicate`;
    /// `_` denotes the current array element.
    ElementEquality {
        cmp_op: CmpOp,
        value: Literal,
    },
    Refs(Target),
    Refd(Target),
    /// Binder-produced: "something references the trait at this file/line".
    RefdByLine {
        file_path: String,
        line: i64,
    },
    At(Target),
    /// Binder-produced: "co-located with the trait at this file/line".
    AtLocation {
        file_path: String,
        line: i64,
    },
    Content(String),

    // --- logical ---
    Or(Box<Predicate>, Box<Predicate>),
    Group(Vec<Predicate>),
}

/// A predicate kind plus its negation flag.
///
/// De Morgan simplifications are deliberately not performed: the compiler
/// applies `negated` exactly once, by wrapping the compiled fragment in
/// `NOT ( ... )`, regardless of how deeply the predicate is nested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub kind: PredicateKind,
    pub negated: bool,
}

impl Predicate {
    pub fn new(kind: PredicateKind) -> Self {
        Predicate {
            kind,
            negated: false,
        }
    }

    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }
}
