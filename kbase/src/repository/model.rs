//! Mapping between domain entities and relational rows
//!
//! A [`Model`] describes how one entity kind is stored: its base table and
//! columns, the link rows written next to it, and how its filter compiles to
//! SQL. [`SqlRepository`](super::SqlRepository) drives these hooks for every
//! CRUD operation, so each entity only states *what* is stored.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::error::DatabaseError;
use crate::model::Entity;
use crate::storage::{QueryBuilder, QueryDialect, Row, Session, SqlValue, Statement};

use super::error::{RepositoryError, RepositoryOperation};
use super::traits::RepositoryResult;

/// Storage description of an entity kind
#[async_trait]
pub trait Model: Entity {
    /// Criteria accepted by `*_where` operations
    type Filter: Send + Sync;
    /// Field mutations accepted by `update` and `update_where`
    type Updater: Send + Sync;

    const TABLE: &'static str;
    /// Base table columns, `id` first
    const COLUMNS: &'static [&'static str];

    /// Values for [`Self::COLUMNS`], resolving references to other tables
    async fn to_row(
        &self,
        session: &mut dyn Session,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Vec<SqlValue>>;

    /// Runs before a replace or upsert overwrites the base row, while the
    /// stored record is still readable
    async fn before_overwrite(
        &self,
        _session: &mut dyn Session,
        _operation: RepositoryOperation,
    ) -> RepositoryResult<()> {
        Ok(())
    }

    /// Replace the link rows owned by this record
    ///
    /// Runs after every base row of the batch is written, so records of one
    /// batch may reference each other.
    async fn write_relations(
        &self,
        session: &mut dyn Session,
        operation: RepositoryOperation,
    ) -> RepositoryResult<()>;

    /// Remove the link rows owned by (or pointing at) record `id`
    async fn delete_relations(
        id: i64,
        session: &mut dyn Session,
        operation: RepositoryOperation,
    ) -> RepositoryResult<()>;

    /// Rebuild an entity from a base row in [`Self::COLUMNS`] order
    async fn from_row(
        row: Row,
        session: &mut dyn Session,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Self>;

    /// Append the conditions of `filter` to `query`
    async fn push_filter(
        filter: &Self::Filter,
        session: &mut dyn Session,
        query: &mut QueryBuilder,
        operation: RepositoryOperation,
    ) -> RepositoryResult<()>;

    fn apply_updater(&mut self, updater: &Self::Updater);
}

/// Map a backend failure, recognising uniqueness violations
pub(crate) fn classify(
    dialect: &dyn QueryDialect,
    operation: RepositoryOperation,
    error: DatabaseError,
) -> RepositoryError {
    if dialect.is_unique_violation(&error.message) {
        RepositoryError::duplicate(operation, error.message)
    } else {
        RepositoryError::backend(operation, &error)
    }
}

pub(crate) async fn execute(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    statement: Statement,
) -> RepositoryResult<u64> {
    let dialect = session.dialect();
    session
        .execute(statement)
        .await
        .map_err(|e| classify(dialect, operation, e))
}

pub(crate) async fn fetch(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    statement: Statement,
) -> RepositoryResult<Vec<Row>> {
    let dialect = session.dialect();
    session
        .query(statement)
        .await
        .map_err(|e| classify(dialect, operation, e))
}

/// Turn a column decoding failure into a `Deserialization` error
pub(crate) fn decode<T>(
    operation: RepositoryOperation,
    result: Result<T, DatabaseError>,
) -> RepositoryResult<T> {
    result.map_err(|e| RepositoryError::deserialization(operation, e.message))
}

pub(crate) fn to_millis(timestamp: &DateTime<Utc>) -> i64 {
    timestamp.timestamp_millis()
}

pub(crate) fn from_millis(
    operation: RepositoryOperation,
    millis: i64,
) -> RepositoryResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
        RepositoryError::deserialization(operation, format!("Invalid timestamp: {}", millis))
    })
}

/// First column of every row as an id
pub(crate) fn ids(operation: RepositoryOperation, rows: &[Row]) -> RepositoryResult<Vec<i64>> {
    rows.iter()
        .map(|row| decode(operation, row.get_i64(0)))
        .collect()
}

/// The subset of `ids` stored in `table`
pub(crate) async fn existing_ids(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    table: &str,
    candidates: &[i64],
) -> RepositoryResult<HashSet<i64>> {
    if candidates.is_empty() {
        return Ok(HashSet::new());
    }
    let mut query = QueryBuilder::new(session.dialect());
    query
        .push("SELECT id FROM ")
        .push_identifier(table)
        .push(" WHERE id IN (")
        .push_bind_list(candidates.iter().copied())
        .push(")");
    let rows = fetch(session, operation, query.build()).await?;
    Ok(ids(operation, &rows)?.into_iter().collect())
}

/// Fail with a missing-dependency error naming the first absent id
pub(crate) async fn require_ids(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    table: &str,
    entity_kind: &str,
    candidates: &[i64],
) -> RepositoryResult<()> {
    let found = existing_ids(session, operation, table, candidates).await?;
    match candidates.iter().find(|id| !found.contains(id)) {
        Some(missing) => Err(RepositoryError::missing_dependency(
            operation,
            entity_kind,
            missing.to_string(),
        )),
        None => Ok(()),
    }
}

/// Replace the `(owner, target)` rows of a link table
pub(crate) async fn replace_links(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    link_table: &str,
    owner_column: &str,
    target_column: &str,
    owner: i64,
    targets: &[i64],
) -> RepositoryResult<()> {
    let mut query = QueryBuilder::new(session.dialect());
    query
        .push("DELETE FROM ")
        .push_identifier(link_table)
        .push(" WHERE ")
        .push(owner_column)
        .push(" = ")
        .push_bind(owner);
    execute(session, operation, query.build()).await?;

    for target in targets {
        let mut query = QueryBuilder::new(session.dialect());
        query
            .push("INSERT INTO ")
            .push_identifier(link_table)
            .push(" (")
            .push(owner_column)
            .push(", ")
            .push(target_column)
            .push(") VALUES (")
            .push_bind(owner)
            .push(", ")
            .push_bind(*target)
            .push(")");
        execute(session, operation, query.build()).await?;
    }
    Ok(())
}

/// Target ids linked from `owner`, in ascending order
pub(crate) async fn linked_ids(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    link_table: &str,
    owner_column: &str,
    target_column: &str,
    owner: i64,
) -> RepositoryResult<Vec<i64>> {
    let mut query = QueryBuilder::new(session.dialect());
    query
        .push("SELECT ")
        .push(target_column)
        .push(" FROM ")
        .push_identifier(link_table)
        .push(" WHERE ")
        .push(owner_column)
        .push(" = ")
        .push_bind(owner)
        .push(" ORDER BY ")
        .push(target_column);
    let rows = fetch(session, operation, query.build()).await?;
    ids(operation, &rows)
}

/// Id of the type called `name`
pub(crate) async fn type_id(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    name: &str,
) -> RepositoryResult<i64> {
    let mut query = QueryBuilder::new(session.dialect());
    query
        .push("SELECT id FROM ")
        .push_identifier(crate::storage::schema::TYPES)
        .push(" WHERE name = ")
        .push_bind(name);
    let rows = fetch(session, operation, query.build()).await?;
    match rows.first() {
        Some(row) => decode(operation, row.get_i64(0)),
        None => Err(RepositoryError::missing_dependency(operation, "Type", name)),
    }
}

/// Name of the type with id `id`
pub(crate) async fn type_name(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    id: i64,
) -> RepositoryResult<String> {
    let mut query = QueryBuilder::new(session.dialect());
    query
        .push("SELECT name FROM ")
        .push_identifier(crate::storage::schema::TYPES)
        .push(" WHERE id = ")
        .push_bind(id);
    let rows = fetch(session, operation, query.build()).await?;
    match rows.first() {
        Some(row) => decode(operation, row.get_string(0)),
        None => Err(RepositoryError::deserialization(
            operation,
            format!("Stored type id {} has no type row", id),
        )),
    }
}

/// `id IN (owners linked to a tag whose name matches)`
pub(crate) fn push_tag_name_condition(
    query: &mut QueryBuilder,
    link_table: &str,
    owner_column: &str,
    expression: &crate::expression::FilterExpression<String>,
) {
    query
        .push_condition()
        .push("id IN (SELECT l.")
        .push(owner_column)
        .push(" FROM ")
        .push_identifier(link_table)
        .push(" l JOIN ")
        .push_identifier(crate::storage::schema::TAGS)
        .push(" t ON t.id = l.tag_id WHERE ");
    query.push_filter("t.name", expression).push(")");
}

/// `type_id IN (types whose name matches)`
pub(crate) fn push_type_name_condition(
    query: &mut QueryBuilder,
    expression: &crate::expression::FilterExpression<String>,
) {
    query
        .push_condition()
        .push("type_id IN (SELECT id FROM ")
        .push_identifier(crate::storage::schema::TYPES)
        .push(" WHERE ");
    query.push_filter("name", expression).push(")");
}
