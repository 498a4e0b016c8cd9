//! `LIKE` pattern construction with explicit `ESCAPE '\'` escaping.

/// Escape `%`, `_`, and `\` in a literal substring so it can be embedded in
/// a `LIKE ... ESCAPE '\'` pattern without its characters being interpreted
/// as wildcards.
pub fn escape_like_literal(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\\' | '%' | '_' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out
}

pub fn contains_pattern(needle: &str) -> String {
    format!("%{}%", escape_like_literal(needle))
}

pub fn starts_with_pattern(needle: &str) -> String {
    format!("{}%", escape_like_literal(needle))
}

pub fn ends_with_pattern(needle: &str) -> String {
    format!("%{}", escape_like_literal(needle))
}
