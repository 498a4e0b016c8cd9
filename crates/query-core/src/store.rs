//! The store-facing side of the external interface in the spec: the fixed
//! relational schema, `REGEXP` registration, and row-to-result scanning.
//!
//! The store itself (any SQL engine supporting recursive CTEs, JSON
//! extraction, a user regex function, and FTS) is an external collaborator.
//! This module is the thin adapter that makes that contract concrete against
//! `rusqlite`, since unlike a pure SQL-text compiler this crate also has to
//! run the statements it builds.

use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use query_ast::{ObjectResult, TraitResult, TraitSource};
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, Row};

use crate::error::{store_err, CoreResult};

pub const OBJECTS_TABLE: &str = "objects";
pub const TRAITS_TABLE: &str = "traits";
pub const REFS_TABLE: &str = "refs";
pub const FIELD_REFS_TABLE: &str = "field_refs";
pub const FTS_TABLE: &str = "fts_content";

/// Compiled-pattern cache for the `REGEXP` user function. Patterns are
/// typically static per query, so this never evicts: growth is bounded by
/// the number of distinct literal patterns a caller compiles, not by row
/// count.
static REGEX_CACHE: Lazy<Mutex<HashMap<String, Regex>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Register the `REGEXP(pattern, value) -> 0|1` scalar function used by
/// `matches()` predicates. Idempotent: registering twice on the same
/// connection just replaces the function with an identical implementation.
pub fn register_regexp(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "REGEXP",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let pattern = ctx.get::<String>(0)?;
            let value = ctx.get::<String>(1)?;

            let mut cache = REGEX_CACHE.lock().unwrap();
            let regex = match cache.get(&pattern) {
                Some(re) => re.clone(),
                None => {
                    let re = Regex::new(&pattern).map_err(|e| {
                        rusqlite::Error::UserFunctionError(Box::new(
                            std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
                        ))
                    })?;
                    cache.insert(pattern.clone(), re.clone());
                    re
                }
            };
            Ok(regex.is_match(&value))
        },
    )
}

pub fn scan_object_row(row: &Row) -> rusqlite::Result<ObjectResult> {
    let fields_text: String = row.get("fields")?;
    let fields = serde_json::from_str(&fields_text)
        .unwrap_or_else(|_| serde_json::Map::new());
    Ok(ObjectResult {
        id: row.get("id")?,
        type_name: row.get("type")?,
        fields,
        file_path: row.get("file_path")?,
        line_start: row.get("line_start")?,
        parent_id: row.get("parent_id")?,
    })
}

pub fn scan_trait_row(row: &Row) -> rusqlite::Result<TraitResult> {
    let source: String = row.get("source")?;
    let source = if source == "frontmatter" {
        TraitSource::Frontmatter
    } else {
        TraitSource::Inline
    };
    Ok(TraitResult {
        id: row.get("id")?,
        trait_type: row.get("trait_type")?,
        value: row.get("value")?,
        content: row.get("content")?,
        file_path: row.get("file_path")?,
        line: row.get("line_number")?,
        parent_object_id: row.get("parent_object_id")?,
        source,
    })
}

/// Returns true if `table` has a column named `column`, used to detect the
/// optional `objects.alias` column non-fatally (§4.5).
pub fn has_column(conn: &Connection, table: &str, column: &str) -> CoreResult<bool> {
    let sql = format!("PRAGMA table_info({table})");
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| store_err(e, &sql))?;
    let mut rows = stmt.query([]).map_err(|e| store_err(e, &sql))?;
    while let Some(row) = rows.next().map_err(|e| store_err(e, &sql))? {
        let name: String = row.get("name").map_err(|e| store_err(e, &sql))?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
