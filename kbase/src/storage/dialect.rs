//! SQL dialect adapters
//!
//! Everything that differs between the supported engines lives here; the
//! repository code above it is written once.

use std::fmt;

/// Engine-specific pieces of SQL text
pub trait QueryDialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Placeholder for the `position`-th bound parameter, starting at 1
    fn placeholder(&self, position: usize) -> String;

    fn quote_identifier(&self, identifier: &str) -> String;

    /// Clause appended to an `INSERT` so that a conflict on `key` updates
    /// `columns` with the incoming values instead of failing
    fn upsert_clause(&self, key: &[&str], columns: &[&str]) -> String;

    /// Whether a backend error message reports a uniqueness violation
    fn is_unique_violation(&self, message: &str) -> bool;

    fn integer_type(&self) -> &'static str {
        "BIGINT"
    }

    /// Column type for text that takes part in a key or unique constraint
    fn key_text_type(&self) -> &'static str {
        "TEXT"
    }

    fn text_type(&self) -> &'static str {
        "TEXT"
    }
}

fn quote_with(identifier: &str, quote: char) -> String {
    let doubled: String = [quote, quote].iter().collect();
    format!(
        "{quote}{}{quote}",
        identifier.replace(quote, &doubled),
        quote = quote
    )
}

fn on_conflict_clause(dialect: &dyn QueryDialect, key: &[&str], columns: &[&str]) -> String {
    let key = key
        .iter()
        .map(|column| dialect.quote_identifier(column))
        .collect::<Vec<_>>()
        .join(", ");
    if columns.is_empty() {
        return format!("ON CONFLICT ({}) DO NOTHING", key);
    }
    let assignments = columns
        .iter()
        .map(|column| {
            let quoted = dialect.quote_identifier(column);
            format!("{} = excluded.{}", quoted, quoted)
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("ON CONFLICT ({}) DO UPDATE SET {}", key, assignments)
}

/// SQLite and libsql
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl QueryDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder(&self, position: usize) -> String {
        format!("?{}", position)
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        quote_with(identifier, '"')
    }

    fn upsert_clause(&self, key: &[&str], columns: &[&str]) -> String {
        on_conflict_clause(self, key, columns)
    }

    fn is_unique_violation(&self, message: &str) -> bool {
        message.contains("UNIQUE constraint failed")
    }

    fn integer_type(&self) -> &'static str {
        "INTEGER"
    }
}

/// PostgreSQL
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl QueryDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder(&self, position: usize) -> String {
        format!("${}", position)
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        quote_with(identifier, '"')
    }

    fn upsert_clause(&self, key: &[&str], columns: &[&str]) -> String {
        on_conflict_clause(self, key, columns)
    }

    fn is_unique_violation(&self, message: &str) -> bool {
        message.contains("duplicate key value violates unique constraint")
    }
}

/// MySQL and MariaDB
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl QueryDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn placeholder(&self, _position: usize) -> String {
        "?".to_string()
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        quote_with(identifier, '`')
    }

    // MySQL reacts to a conflict on any unique key, not only `key`.
    fn upsert_clause(&self, key: &[&str], columns: &[&str]) -> String {
        let assignments = if columns.is_empty() {
            key.iter()
                .map(|column| {
                    let quoted = self.quote_identifier(column);
                    format!("{} = {}", quoted, quoted)
                })
                .collect::<Vec<_>>()
        } else {
            columns
                .iter()
                .map(|column| {
                    let quoted = self.quote_identifier(column);
                    format!("{} = VALUES({})", quoted, quoted)
                })
                .collect::<Vec<_>>()
        };
        format!("ON DUPLICATE KEY UPDATE {}", assignments.join(", "))
    }

    fn is_unique_violation(&self, message: &str) -> bool {
        message.contains("Duplicate entry")
    }

    fn key_text_type(&self) -> &'static str {
        "VARCHAR(512)"
    }
}

static SQLITE: SqliteDialect = SqliteDialect;
static POSTGRES: PostgresDialect = PostgresDialect;
static MYSQL: MySqlDialect = MySqlDialect;

/// Pick the dialect matching a connection URL's scheme
pub fn dialect_for_url(url: &str) -> Option<&'static dyn QueryDialect> {
    let scheme = url.split(':').next().unwrap_or_default();
    match scheme {
        "postgres" | "postgresql" => Some(&POSTGRES),
        "mysql" | "mariadb" => Some(&MYSQL),
        "sqlite" | "libsql" | "file" => Some(&SQLITE),
        _ => None,
    }
}

pub(crate) fn sqlite() -> &'static dyn QueryDialect {
    &SQLITE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(SqliteDialect.placeholder(3), "?3");
        assert_eq!(PostgresDialect.placeholder(3), "$3");
        assert_eq!(MySqlDialect.placeholder(3), "?");
    }

    #[test]
    fn test_identifier_quoting_escapes() {
        assert_eq!(SqliteDialect.quote_identifier("url"), "\"url\"");
        assert_eq!(PostgresDialect.quote_identifier("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(MySqlDialect.quote_identifier("path"), "`path`");
    }

    #[test]
    fn test_upsert_clauses() {
        assert_eq!(
            SqliteDialect.upsert_clause(&["id"], &["url", "title"]),
            "ON CONFLICT (\"id\") DO UPDATE SET \"url\" = excluded.\"url\", \"title\" = excluded.\"title\""
        );
        assert_eq!(
            PostgresDialect.upsert_clause(&["id"], &[]),
            "ON CONFLICT (\"id\") DO NOTHING"
        );
        assert_eq!(
            MySqlDialect.upsert_clause(&["id"], &["url"]),
            "ON DUPLICATE KEY UPDATE `url` = VALUES(`url`)"
        );
    }

    #[test]
    fn test_unique_violation_detection() {
        assert!(SqliteDialect.is_unique_violation("UNIQUE constraint failed: types.name"));
        assert!(PostgresDialect.is_unique_violation(
            "error returned from database: duplicate key value violates unique constraint \"types_name_key\""
        ));
        assert!(MySqlDialect.is_unique_violation("Duplicate entry 'Text' for key 'name'"));
        assert!(!SqliteDialect.is_unique_violation("no such table: types"));
    }

    #[test]
    fn test_dialect_for_url() {
        assert_eq!(dialect_for_url("postgres://localhost/kb").map(|d| d.name()), Some("postgres"));
        assert_eq!(dialect_for_url("mysql://localhost/kb").map(|d| d.name()), Some("mysql"));
        assert_eq!(dialect_for_url("libsql://kb.turso.io").map(|d| d.name()), Some("sqlite"));
        assert!(dialect_for_url("redis://localhost").is_none());
    }
}
