//! Date-keyword boundary builder.
//!
//! Spec §9 leaves the exact semantics of date-shorthand values (`past`,
//! `today`, ...) to an external helper whose contract isn't fully visible
//! from the query package; this module is the parameterised boundary
//! builder that contract implies. See DESIGN.md for the keywords chosen.

use crate::sql::BindValue;

/// A boundary expression for a date keyword against a given SQL expression
/// (typically a `json_extract(...)` or column reference), plus any bind
/// arguments it needs (always `DATE('now')`-relative, so there currently are
/// none, but the signature leaves room for e.g. timezone offsets).
pub fn boundary(keyword: &str, expr_sql: &str) -> Option<(String, Vec<BindValue>)> {
    let sql = match keyword {
        "today" => format!("DATE({expr_sql}) = DATE('now')"),
        "past" => format!("DATE({expr_sql}) < DATE('now')"),
        "future" => format!("DATE({expr_sql}) > DATE('now')"),
        "this_week" => format!(
            "DATE({expr_sql}) BETWEEN DATE('now', 'weekday 0', '-6 days') AND DATE('now', 'weekday 0')"
        ),
        "this_month" => format!(
            "strftime('%Y-%m', {expr_sql}) = strftime('%Y-%m', 'now')"
        ),
        "this_year" => format!("strftime('%Y', {expr_sql}) = strftime('%Y', 'now')"),
        _ => return None,
    };
    Some((sql, Vec::new()))
}

pub fn is_date_keyword(token: &str) -> bool {
    matches!(
        token,
        "today" | "past" | "future" | "this_week" | "this_month" | "this_year"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_known_keywords() {
        assert!(is_date_keyword("today"));
        assert!(is_date_keyword("past"));
        assert!(!is_date_keyword("2024-01-01"));
    }

    #[test]
    fn builds_a_boundary_for_today() {
        let (sql, binds) = boundary("today", "json_extract(o.fields, '$.due')").unwrap();
        assert!(sql.contains("DATE('now')"));
        assert!(binds.is_empty());
    }

    #[test]
    fn unknown_keyword_returns_none() {
        assert!(boundary("next_decade", "x").is_none());
    }
}
