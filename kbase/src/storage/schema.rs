//! Relational schema
//!
//! Every table is created with `IF NOT EXISTS`, so migrating an existing
//! database is a no-op. Secondary indexes are declared inline as unique
//! constraints because MySQL has no `CREATE INDEX IF NOT EXISTS`.

use tracing::info;

use crate::error::{DatabaseError, DatabaseOperation};

use super::{Backend, QueryDialect, Session, Statement, Transaction};

pub const TYPES: &str = "types";
pub const TAGS: &str = "tags";
pub const TAG_ANCESTORS: &str = "tag_ancestors";
pub const TAG_CHILDREN: &str = "tag_children";
pub const BOOKMARKS: &str = "bookmarks";
pub const BOOKMARK_TAGS: &str = "bookmark_tags";
pub const DOCUMENTS: &str = "documents";
pub const DOCUMENT_TAGS: &str = "document_tags";
pub const DOCUMENT_LINKS: &str = "document_links";

/// `CREATE TABLE` statements in dependency order
pub fn statements(dialect: &dyn QueryDialect) -> Vec<String> {
    let int = dialect.integer_type();
    let key = dialect.key_text_type();
    let text = dialect.text_type();

    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {TYPES} (\
             id {int} NOT NULL PRIMARY KEY, \
             name {key} NOT NULL UNIQUE)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {TAGS} (\
             id {int} NOT NULL PRIMARY KEY, \
             name {key} NOT NULL UNIQUE)"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {TAG_ANCESTORS} (\
             tag_id {int} NOT NULL, \
             ancestor_id {int} NOT NULL, \
             depth {int} NOT NULL, \
             PRIMARY KEY (tag_id, ancestor_id), \
             UNIQUE (ancestor_id, tag_id))"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {TAG_CHILDREN} (\
             tag_id {int} NOT NULL, \
             child_id {int} NOT NULL, \
             position {int} NOT NULL, \
             PRIMARY KEY (tag_id, position))"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {BOOKMARKS} (\
             id {int} NOT NULL PRIMARY KEY, \
             url {key} NOT NULL UNIQUE, \
             title {text} NOT NULL, \
             type_id {int}, \
             created_at {int})"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {BOOKMARK_TAGS} (\
             bookmark_id {int} NOT NULL, \
             tag_id {int} NOT NULL, \
             PRIMARY KEY (bookmark_id, tag_id), \
             UNIQUE (tag_id, bookmark_id))"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {DOCUMENTS} (\
             id {int} NOT NULL PRIMARY KEY, \
             path {key} NOT NULL UNIQUE, \
             hash {text} NOT NULL, \
             type_id {int}, \
             modified_at {int})"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {DOCUMENT_TAGS} (\
             document_id {int} NOT NULL, \
             tag_id {int} NOT NULL, \
             PRIMARY KEY (document_id, tag_id), \
             UNIQUE (tag_id, document_id))"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {DOCUMENT_LINKS} (\
             source_id {int} NOT NULL, \
             target_id {int} NOT NULL, \
             position {int} NOT NULL, \
             PRIMARY KEY (source_id, target_id), \
             UNIQUE (target_id, source_id))"
        ),
    ]
}

/// Create every table the repositories use
pub async fn migrate<B: Backend>(backend: &B) -> Result<(), DatabaseError> {
    let dialect = backend.dialect();
    let mut tx = backend.begin().await?;
    for sql in statements(dialect) {
        if let Err(error) = tx.execute(Statement::raw(sql)).await {
            let error = error.during(DatabaseOperation::Migration);
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "Rollback after failed migration failed");
            }
            return Err(error);
        }
    }
    tx.commit().await?;
    info!(dialect = dialect.name(), "Schema migrated");
    Ok(())
}
