//! Type-aware ordering of untyped values.
//!
//! This is the single source of truth shared by pipeline `filter`, pipeline
//! `sort`, per-row `min`/`max`, and any other in-memory aggregation. SQL-side
//! comparisons (`gen` module) are lowered to analogous per-operator SQL
//! fragments, but the *semantics* live here, once.
//!
//! Deliberately a single function rather than a typeclass hierarchy: numbers,
//! temporal values, and strings share one total order, and a normalised enum
//! with a derived `Ord` would need a manual `Ord` impl anyway once cross-kind
//! fallback is in the picture. Keeping it a plain function keeps that one
//! fallback rule in one place.

use std::cmp::Ordering;

use chrono::{NaiveDate, NaiveDateTime};
use query_ast::{ComputedValue, Literal};
use serde_json::Value as Json;

/// A value normalised into one of the four comparable kinds, plus its
/// original string form for cross-kind fallback comparisons.
#[derive(Debug, Clone)]
pub enum Normalized {
    Null,
    Number(f64, String),
    Temporal(NaiveDateTime, String),
    String(String),
}

impl Normalized {
    fn raw(&self) -> &str {
        match self {
            Normalized::Null => "",
            Normalized::Number(_, raw) => raw,
            Normalized::Temporal(_, raw) => raw,
            Normalized::String(raw) => raw,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Normalized::Null => 0,
            Normalized::Number(..) => 1,
            Normalized::Temporal(..) => 2,
            Normalized::String(_) => 3,
        }
    }
}

/// Try to parse `s` as a datetime, then as a bare date (midnight), per the
/// comparison engine's "temporal" detection rule. Tries RFC 3339 first since
/// it is the most common machine-written format, then a couple of common
/// `date time` / `date` shapes.
pub fn parse_temporal(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    None
}

fn normalize_str(s: &str) -> Normalized {
    let trimmed = s.trim();
    if let Some(dt) = parse_temporal(trimmed) {
        return Normalized::Temporal(dt, s.to_string());
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        if !trimmed.is_empty() {
            return Normalized::Number(n, s.to_string());
        }
    }
    Normalized::String(s.to_string())
}

pub fn normalize_literal(value: &Literal) -> Normalized {
    match value {
        Literal::Null => Normalized::Null,
        Literal::Bool(b) => Normalized::Number(if *b { 1.0 } else { 0.0 }, b.to_string()),
        Literal::Number(n) => Normalized::Number(*n, value.to_display_string()),
        Literal::String(s) => normalize_str(s),
    }
}

/// JSON string values are dereferenced the same way a plain string literal
/// is: a field stored as the JSON string `"2024-01-01"` compares as a date,
/// not as text.
pub fn normalize_json(value: &Json) -> Normalized {
    match value {
        Json::Null => Normalized::Null,
        Json::Bool(b) => Normalized::Number(if *b { 1.0 } else { 0.0 }, b.to_string()),
        Json::Number(n) => {
            let f = n.as_f64().unwrap_or(f64::NAN);
            Normalized::Number(f, n.to_string())
        }
        Json::String(s) => normalize_str(s),
        other => Normalized::String(other.to_string()),
    }
}

pub fn normalize_computed(value: &ComputedValue) -> Normalized {
    match value {
        ComputedValue::Null => Normalized::Null,
        ComputedValue::Number(n) => Normalized::Number(*n, n.to_string()),
        ComputedValue::String(s) => normalize_str(s),
    }
}

pub fn normalize_opt_str(value: Option<&str>) -> Normalized {
    match value {
        None => Normalized::Null,
        Some(s) => normalize_str(s),
    }
}

/// Total order over normalised values: `null < anything`; both-null is
/// equal; same-kind values compare naturally (numeric, chronological,
/// lexicographic); different non-null kinds fall back to a lexicographic
/// compare of their original string form.
pub fn compare(a: &Normalized, b: &Normalized) -> Ordering {
    match (a, b) {
        (Normalized::Null, Normalized::Null) => Ordering::Equal,
        (Normalized::Null, _) => Ordering::Less,
        (_, Normalized::Null) => Ordering::Greater,
        (Normalized::Number(x, _), Normalized::Number(y, _)) => {
            x.partial_cmp(y).unwrap_or(Ordering::Equal)
        }
        (Normalized::Temporal(x, _), Normalized::Temporal(y, _)) => x.cmp(y),
        (Normalized::String(x), Normalized::String(y)) => x.cmp(y),
        _ => a.raw().cmp(b.raw()),
    }
}

/// Convenience wrapper matching the spec's `compare(a, b) -> -1 | 0 | 1`
/// contract for callers that want the raw sign rather than an `Ordering`.
pub fn compare_sign(a: &Normalized, b: &Normalized) -> i32 {
    match compare(a, b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

pub fn compare_literals(a: &Literal, b: &Literal) -> Ordering {
    compare(&normalize_literal(a), &normalize_literal(b))
}

/// A helper used purely to keep `Normalized`'s private `rank` reachable from
/// tests that assert the cross-kind fallback is exercised, not natural
/// ordering.
#[cfg(test)]
fn ranks_differ(a: &Normalized, b: &Normalized) -> bool {
    a.rank() != b.rank()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_less_than_everything_and_equal_to_itself() {
        let null = Normalized::Null;
        let num = normalize_literal(&Literal::Number(1.0));
        assert_eq!(compare(&null, &null), Ordering::Equal);
        assert_eq!(compare(&null, &num), Ordering::Less);
        assert_eq!(compare(&num, &null), Ordering::Greater);
    }

    #[test]
    fn compare_is_antisymmetric_and_reflexive() {
        let a = normalize_literal(&Literal::String("2024-02-01".into()));
        let b = normalize_literal(&Literal::String("2024-03-01".into()));
        assert_eq!(compare(&a, &a), Ordering::Equal);
        assert_eq!(compare(&a, &b), compare(&b, &a).reverse());
    }

    #[test]
    fn dates_compare_chronologically_not_lexicographically() {
        let earlier = normalize_literal(&Literal::String("2024-01-02".into()));
        let later = normalize_literal(&Literal::String("2024-01-10".into()));
        // lexicographically "10" < "2", but chronologically Jan 10 > Jan 2
        assert_eq!(compare(&earlier, &later), Ordering::Less);
    }

    #[test]
    fn numbers_compare_numerically() {
        let a = normalize_literal(&Literal::String("9".into()));
        let b = normalize_literal(&Literal::String("10".into()));
        assert_eq!(compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn cross_kind_falls_back_to_raw_string_compare() {
        let number = normalize_literal(&Literal::Number(10.0));
        let text = normalize_literal(&Literal::String("apple".into()));
        assert!(ranks_differ(&number, &text));
        assert_eq!(compare(&number, &text), "10".cmp("apple"));
    }

    #[test]
    fn json_string_field_is_dereferenced_like_a_literal() {
        let from_json = normalize_json(&Json::String("2024-05-01".into()));
        let from_literal = normalize_literal(&Literal::String("2024-05-01".into()));
        assert!(matches!(from_json, Normalized::Temporal(..)));
        assert_eq!(compare(&from_json, &from_literal), Ordering::Equal);
    }

    #[test]
    fn transitive_same_kind_ordering() {
        let a = normalize_literal(&Literal::Number(1.0));
        let b = normalize_literal(&Literal::Number(2.0));
        let c = normalize_literal(&Literal::Number(3.0));
        assert_eq!(compare(&a, &b), Ordering::Less);
        assert_eq!(compare(&b, &c), Ordering::Less);
        assert_eq!(compare(&a, &c), Ordering::Less);
    }
}
