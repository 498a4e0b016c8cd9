//! Thin wrapper around the external wikilink resolver. The real resolution
//! logic (alias matching, daily-note disambiguation) lives outside this
//! crate; what lives here is the lazy, per-executor cache over
//! `SELECT id FROM objects` / `SELECT alias, id FROM objects WHERE alias IS
//! NOT NULL` that spec §4.5 describes, plus the `resolve` contract the
//! compiler calls against it.

use std::collections::{HashMap, HashSet};

use once_cell::unsync::OnceCell;
use rusqlite::Connection;

use crate::error::{store_err, CoreResult};
use crate::store;

#[derive(Debug, Clone, Default)]
pub struct ResolveOutcome {
    pub target_id: Option<String>,
    pub matches: Vec<String>,
    pub ambiguous: bool,
}

impl ResolveOutcome {
    fn found(id: String) -> Self {
        ResolveOutcome {
            target_id: Some(id),
            matches: Vec::new(),
            ambiguous: false,
        }
    }

    fn ambiguous(matches: Vec<String>) -> Self {
        ResolveOutcome {
            target_id: None,
            matches,
            ambiguous: true,
        }
    }

    fn unresolved() -> Self {
        ResolveOutcome::default()
    }
}

struct ResolverIndex {
    ids: HashSet<String>,
    aliases: HashMap<String, Vec<String>>,
}

/// `resolve(token) -> { target_id?, matches, ambiguous }`. Cached for the
/// lifetime of the owning executor; the cache is never shared across
/// executor instances, so a schema change between queries can always be
/// picked up by dropping and recreating the executor.
pub struct ResolverAdapter<'conn> {
    conn: &'conn Connection,
    index: OnceCell<ResolverIndex>,
}

impl<'conn> ResolverAdapter<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        ResolverAdapter {
            conn,
            index: OnceCell::new(),
        }
    }

    fn build_index(&self) -> CoreResult<ResolverIndex> {
        let mut ids = HashSet::new();
        {
            let sql = format!("SELECT id FROM {}", store::OBJECTS_TABLE);
            let mut stmt = self.conn.prepare(&sql).map_err(|e| store_err(e, &sql))?;
            let mut rows = stmt.query([]).map_err(|e| store_err(e, &sql))?;
            while let Some(row) = rows.next().map_err(|e| store_err(e, &sql))? {
                let id: String = row.get(0).map_err(|e| store_err(e, &sql))?;
                ids.insert(id);
            }
        }

        let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
        if store::has_column(self.conn, store::OBJECTS_TABLE, "alias")? {
            let sql = format!(
                "SELECT alias, id FROM {} WHERE alias IS NOT NULL",
                store::OBJECTS_TABLE
            );
            let mut stmt = self.conn.prepare(&sql).map_err(|e| store_err(e, &sql))?;
            let mut rows = stmt.query([]).map_err(|e| store_err(e, &sql))?;
            while let Some(row) = rows.next().map_err(|e| store_err(e, &sql))? {
                let alias: String = row.get(0).map_err(|e| store_err(e, &sql))?;
                let id: String = row.get(1).map_err(|e| store_err(e, &sql))?;
                aliases.entry(alias).or_default().push(id);
            }
        } else {
            log::warn!("objects.alias column absent; resolver will only match canonical ids");
        }

        Ok(ResolverIndex { ids, aliases })
    }

    fn index(&self) -> CoreResult<&ResolverIndex> {
        if let Some(index) = self.index.get() {
            return Ok(index);
        }
        let index = self.build_index()?;
        Ok(self.index.get_or_init(|| index))
    }

    /// Resolve a raw `[[wikilink]]` token (brackets already stripped by the
    /// caller) to a canonical object id.
    ///
    /// - Ambiguous (multiple alias matches) surfaces as an error to the
    ///   user.
    /// - Found resolves to the canonical id.
    /// - Not found returns the input unchanged, wrapped as "no match" rather
    ///   than an error, so the predicate simply fails to match at query
    ///   time.
    pub fn resolve(&self, token: &str) -> CoreResult<ResolveOutcome> {
        let index = self.index()?;
        if index.ids.contains(token) {
            return Ok(ResolveOutcome::found(token.to_string()));
        }
        if let Some(matches) = index.aliases.get(token) {
            return Ok(match matches.as_slice() {
                [] => ResolveOutcome::unresolved(),
                [single] => ResolveOutcome::found(single.clone()),
                many => ResolveOutcome::ambiguous(many.to_vec()),
            });
        }
        Ok(ResolveOutcome::unresolved())
    }
}

/// `true` for tokens that look like a `[[wikilink]]` and should be passed
/// through the resolver before becoming a SQL bind argument.
pub fn looks_like_wikilink(token: &str) -> bool {
    token.starts_with("[[") && token.ends_with("]]") && token.len() > 4
}

/// Strip the `[[`/`]]` delimiters from a wikilink token.
pub fn strip_wikilink(token: &str) -> &str {
    token
        .strip_prefix("[[")
        .and_then(|s| s.strip_suffix("]]"))
        .unwrap_or(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE objects (id TEXT PRIMARY KEY, alias TEXT);
             INSERT INTO objects (id, alias) VALUES ('obj-1', 'alpha');
             INSERT INTO objects (id, alias) VALUES ('obj-2', NULL);
             INSERT INTO objects (id, alias) VALUES ('obj-3', 'dup');
             INSERT INTO objects (id, alias) VALUES ('obj-4', 'dup');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn resolves_canonical_id_directly() {
        let conn = seeded_conn();
        let resolver = ResolverAdapter::new(&conn);
        let outcome = resolver.resolve("obj-2").unwrap();
        assert_eq!(outcome.target_id.as_deref(), Some("obj-2"));
    }

    #[test]
    fn resolves_unique_alias() {
        let conn = seeded_conn();
        let resolver = ResolverAdapter::new(&conn);
        let outcome = resolver.resolve("alpha").unwrap();
        assert_eq!(outcome.target_id.as_deref(), Some("obj-1"));
    }

    #[test]
    fn flags_ambiguous_alias() {
        let conn = seeded_conn();
        let resolver = ResolverAdapter::new(&conn);
        let outcome = resolver.resolve("dup").unwrap();
        assert!(outcome.ambiguous);
        assert_eq!(outcome.matches.len(), 2);
    }

    #[test]
    fn unresolved_token_is_not_an_error() {
        let conn = seeded_conn();
        let resolver = ResolverAdapter::new(&conn);
        let outcome = resolver.resolve("missing").unwrap();
        assert!(!outcome.ambiguous);
        assert!(outcome.target_id.is_none());
    }

    #[test]
    fn wikilink_detection() {
        assert!(looks_like_wikilink("[[Some Page]]"));
        assert!(!looks_like_wikilink("Some Page"));
        assert_eq!(strip_wikilink("[[Some Page]]"), "Some Page");
    }
}
