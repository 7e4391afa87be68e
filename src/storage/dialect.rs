//! SQL dialect selection and dialect-specific fragments.
//!
//! Application SQL is written once with `?` placeholders and SQLite/Postgres
//! common syntax. The fragments here cover the places where the two engines
//! genuinely differ.

use crate::error::{Error, Result};
use crate::storage::value::Value;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Which relational backend a connection targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Embedded single-writer engine.
    Sqlite,
    /// Networked relational engine.
    Postgres,
}

impl Dialect {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }

    /// Placeholder token for the 1-based parameter `index`.
    #[must_use]
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::Sqlite => "?".to_string(),
            Self::Postgres => format!("${index}"),
        }
    }

    /// Current UTC time as `YYYY-MM-DD HH:MM:SS` text.
    #[must_use]
    pub const fn now(&self) -> &'static str {
        match self {
            Self::Sqlite => "datetime('now')",
            Self::Postgres => "to_char(NOW() AT TIME ZONE 'UTC', 'YYYY-MM-DD HH24:MI:SS')",
        }
    }

    /// Insert that silently skips rows violating a unique constraint.
    #[must_use]
    pub fn insert_ignore(&self, table: &str, columns: &[&str]) -> String {
        let values = placeholders(columns.len());
        let cols = columns.join(", ");
        match self {
            Self::Sqlite => format!("INSERT OR IGNORE INTO {table} ({cols}) VALUES ({values})"),
            Self::Postgres => {
                format!("INSERT INTO {table} ({cols}) VALUES ({values}) ON CONFLICT DO NOTHING")
            }
        }
    }

    /// Insert-or-update keyed on `conflict`, overwriting `update` columns.
    ///
    /// An empty `update` list degrades to "do nothing" on conflict.
    #[must_use]
    pub fn upsert(&self, table: &str, columns: &[&str], conflict: &[&str], update: &[&str]) -> String {
        let values = placeholders(columns.len());
        let cols = columns.join(", ");
        let keys = conflict.join(", ");
        if update.is_empty() {
            return format!(
                "INSERT INTO {table} ({cols}) VALUES ({values}) ON CONFLICT ({keys}) DO NOTHING"
            );
        }
        let sets = update
            .iter()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("INSERT INTO {table} ({cols}) VALUES ({values}) ON CONFLICT ({keys}) DO UPDATE SET {sets}")
    }

    /// Transcript search statement and its parameters.
    ///
    /// SQLite uses the FTS5 index with ranking and highlighted snippets.
    /// Postgres falls back to `ILIKE` with no ranking and a fixed-width
    /// snippet taken around the first match.
    #[must_use]
    pub fn full_text_search(&self, term: &str, limit: u32) -> (String, Vec<Value>) {
        match self {
            Self::Sqlite => (
                "SELECT t.id, t.task_id, t.phase, t.session_id,
                        snippet(transcripts_fts, 0, '<mark>', '</mark>', '...', 32),
                        bm25(transcripts_fts)
                 FROM transcripts_fts
                 JOIN transcripts t ON t.id = transcripts_fts.rowid
                 WHERE transcripts_fts MATCH ?
                 ORDER BY bm25(transcripts_fts)
                 LIMIT ?"
                    .to_string(),
                vec![Value::Text(fts5_phrase(term)), Value::from(limit)],
            ),
            Self::Postgres => (
                "SELECT id, task_id, phase, session_id,
                        SUBSTRING(content FROM GREATEST(1, POSITION(LOWER(?) IN LOWER(content)) - 20) FOR 64),
                        CAST(0 AS DOUBLE PRECISION)
                 FROM transcripts
                 WHERE content ILIKE ?
                 ORDER BY id DESC
                 LIMIT ?"
                    .to_string(),
                vec![
                    Value::Text(term.to_string()),
                    Value::Text(format!("%{}%", escape_like(term))),
                    Value::from(limit),
                ],
            ),
        }
    }

    /// Rewrite logical `?` placeholders into this dialect's form.
    ///
    /// Question marks inside single-quoted literals, double-quoted
    /// identifiers and `--` comments are left alone.
    #[must_use]
    pub fn rebind(&self, sql: &str) -> String {
        if *self == Self::Sqlite {
            return sql.to_string();
        }

        let mut out = String::with_capacity(sql.len() + 16);
        let mut index = 0;
        let mut chars = sql.chars().peekable();
        let mut in_single = false;
        let mut in_double = false;
        let mut in_comment = false;

        while let Some(c) = chars.next() {
            if in_comment {
                if c == '\n' {
                    in_comment = false;
                }
                out.push(c);
                continue;
            }
            match c {
                '\'' if !in_double => in_single = !in_single,
                '"' if !in_single => in_double = !in_double,
                '-' if !in_single && !in_double && chars.peek() == Some(&'-') => in_comment = true,
                '?' if !in_single && !in_double => {
                    index += 1;
                    out.push_str(&self.placeholder(index));
                    continue;
                }
                _ => {}
            }
            out.push(c);
        }
        out
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            other => Err(Error::InvalidArgument(format!("unknown dialect '{other}'"))),
        }
    }
}

/// `n` comma-separated logical placeholders.
#[must_use]
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Quote a user term as a single FTS5 phrase so operators are not interpreted.
fn fts5_phrase(term: &str) -> String {
    format!("\"{}\"", term.replace('"', "\"\""))
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dialect() {
        for (input, want) in [
            ("sqlite", Dialect::Sqlite),
            ("sqlite3", Dialect::Sqlite),
            ("postgres", Dialect::Postgres),
            ("postgresql", Dialect::Postgres),
            ("pg", Dialect::Postgres),
            ("PG", Dialect::Postgres),
        ] {
            assert_eq!(input.parse::<Dialect>().unwrap(), want, "input {input}");
        }
        assert!("mysql".parse::<Dialect>().is_err());
        assert!("".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_placeholders_and_now() {
        assert_eq!(Dialect::Sqlite.placeholder(1), "?");
        assert_eq!(Dialect::Postgres.placeholder(1), "$1");
        assert_eq!(Dialect::Postgres.placeholder(10), "$10");
        assert_eq!(Dialect::Sqlite.now(), "datetime('now')");
        assert!(Dialect::Postgres.now().contains("NOW()"));
    }

    #[test]
    fn test_rebind_skips_literals_and_comments() {
        let sql = "SELECT '?', \"a?\" FROM t -- what?\nWHERE a = ? AND b IN (?, ?)";
        assert_eq!(
            Dialect::Postgres.rebind(sql),
            "SELECT '?', \"a?\" FROM t -- what?\nWHERE a = $1 AND b IN ($2, $3)"
        );
        assert_eq!(Dialect::Sqlite.rebind(sql), sql);
    }

    #[test]
    fn test_insert_ignore_forms() {
        assert_eq!(
            Dialect::Sqlite.insert_ignore("deps", &["a", "b"]),
            "INSERT OR IGNORE INTO deps (a, b) VALUES (?, ?)"
        );
        assert_eq!(
            Dialect::Postgres.insert_ignore("deps", &["a", "b"]),
            "INSERT INTO deps (a, b) VALUES (?, ?) ON CONFLICT DO NOTHING"
        );
    }

    #[test]
    fn test_upsert() {
        let sql = Dialect::Postgres.upsert("tasks", &["id", "title"], &["id"], &["title"]);
        assert_eq!(
            sql,
            "INSERT INTO tasks (id, title) VALUES (?, ?) ON CONFLICT (id) DO UPDATE SET title = excluded.title"
        );
        let nothing = Dialect::Sqlite.upsert("tasks", &["id"], &["id"], &[]);
        assert!(nothing.ends_with("ON CONFLICT (id) DO NOTHING"));
    }

    #[test]
    fn test_search_forms_differ() {
        let (sqlite, args) = Dialect::Sqlite.full_text_search("say \"hi\"", 10);
        assert!(sqlite.contains("MATCH"));
        assert_eq!(args[0], Value::Text("\"say \"\"hi\"\"\"".to_string()));

        let (pg, args) = Dialect::Postgres.full_text_search("50%", 10);
        assert!(pg.contains("ILIKE"));
        assert_eq!(args[1], Value::Text("%50\\%%".to_string()));
    }
}
