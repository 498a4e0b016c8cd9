//! Literal values that appear on the right-hand side of a predicate or
//! inside a pipeline filter/sort expression.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An untyped literal as written in the query language. Normalisation into
/// the comparison engine's `{null, number, temporal, string}` kinds happens
/// in `query_core::compare`, not here: the AST only stores what the caller
/// wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Literal {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render the literal the way it would appear in source text, used for
    /// cross-kind string fallback comparisons and for error snippets.
    pub fn to_display_string(&self) -> String {
        match self {
            Literal::Null => String::new(),
            Literal::Bool(b) => b.to_string(),
            Literal::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Literal::String(s) => s.clone(),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::String(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::String(s)
    }
}

impl From<f64> for Literal {
    fn from(n: f64) -> Self {
        Literal::Number(n)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

/// Comparison operator shared by `Field`, `Value`, `ElementEquality`, and
/// pipeline `Filter`/`Sort` expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CmpOp {
    /// Apply this operator to the three-way result of `compare`.
    pub fn apply(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match (self, ordering) {
            (CmpOp::Eq, Equal) => true,
            (CmpOp::Ne, Equal) => false,
            (CmpOp::Ne, _) => true,
            (CmpOp::Lt, Less) => true,
            (CmpOp::Gt, Greater) => true,
            (CmpOp::Le, Less | Equal) => true,
            (CmpOp::Ge, Greater | Equal) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn eq_and_ne_are_complementary() {
        for ord in [Ordering::Less, Ordering::Equal, Ordering::Greater] {
            assert_ne!(CmpOp::Eq.apply(ord), CmpOp::Ne.apply(ord));
        }
    }

    #[test]
    fn le_covers_lt_and_eq() {
        assert!(CmpOp::Le.apply(Ordering::Less));
        assert!(CmpOp::Le.apply(Ordering::Equal));
        assert!(!CmpOp::Le.apply(Ordering::Greater));
    }

    #[test]
    fn display_string_formats_whole_numbers_without_fraction() {
        assert_eq!(Literal::Number(3.0).to_display_string(), "3");
        assert_eq!(Literal::Number(3.5).to_display_string(), "3.5");
    }
}
