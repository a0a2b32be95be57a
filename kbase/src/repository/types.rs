//! Type lookup table
//!
//! Bookmarks and documents refer to types by name. Names are registered here
//! and receive repository-allocated ids; a type still referenced by a
//! bookmark or document cannot be deleted.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::RepositoryConfig;
use crate::storage::schema::{BOOKMARKS, DOCUMENTS, TYPES};
use crate::storage::{Backend, QueryBuilder, Session, Transaction};

use super::context::{supervise, CallContext};
use super::error::{RepositoryError, RepositoryOperation};
use super::model::{decode, execute, fetch};
use super::sql::rollback;
use super::traits::RepositoryResult;

const KIND: &str = "Type";

/// Repository of type names
pub struct TypeRepository<B: Backend> {
    backend: Arc<B>,
    config: RepositoryConfig,
}

impl<B: Backend> Clone for TypeRepository<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
        }
    }
}

impl<B: Backend> fmt::Debug for TypeRepository<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRepository")
            .field("dialect", &self.backend.dialect().name())
            .field("config", &self.config)
            .finish()
    }
}

/// Names of a batch, rejecting empty batches and repeated names
fn collect_names<I, S>(operation: RepositoryOperation, names: I) -> RepositoryResult<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let names: Vec<String> = names.into_iter().map(Into::into).collect();
    if names.is_empty() {
        return Err(RepositoryError::ineffective(
            operation,
            RepositoryError::empty_input(operation),
        ));
    }
    let mut seen = HashSet::with_capacity(names.len());
    if let Some(repeated) = names.iter().find(|name| !seen.insert(name.as_str())) {
        return Err(RepositoryError::duplicate(
            operation,
            format!("Type {} appears twice in the batch", repeated),
        )
        .with_entity(KIND, repeated.clone()));
    }
    Ok(names)
}

async fn find_id(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    name: &str,
) -> RepositoryResult<Option<i64>> {
    let mut query = QueryBuilder::new(session.dialect());
    query
        .push("SELECT id FROM ")
        .push_identifier(TYPES)
        .push(" WHERE name = ")
        .push_bind(name);
    let rows = fetch(session, operation, query.build()).await?;
    rows.first()
        .map(|row| decode(operation, row.get_i64(0)))
        .transpose()
}

async fn is_referenced(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    type_id: i64,
) -> RepositoryResult<bool> {
    for table in [BOOKMARKS, DOCUMENTS] {
        let mut query = QueryBuilder::new(session.dialect());
        query
            .push("SELECT COUNT(*) FROM ")
            .push_identifier(table)
            .push(" WHERE type_id = ")
            .push_bind(type_id);
        let rows = fetch(session, operation, query.build()).await?;
        if let Some(row) = rows.first() {
            if decode(operation, row.get_i64(0))? > 0 {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

impl<B: Backend> TypeRepository<B> {
    pub fn new(backend: Arc<B>, config: RepositoryConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    async fn begin(&self, operation: RepositoryOperation) -> RepositoryResult<B::Transaction> {
        self.backend
            .begin()
            .await
            .map_err(|e| RepositoryError::backend(operation, &e))
    }

    async fn finish<T>(
        &self,
        operation: RepositoryOperation,
        tx: B::Transaction,
        outcome: RepositoryResult<T>,
    ) -> RepositoryResult<T> {
        match outcome {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|e| RepositoryError::backend(operation, &e))?;
                Ok(value)
            }
            Err(error) => {
                rollback(tx, operation).await;
                debug!(operation = %operation, kind = %error.kind, "Type call failed");
                Err(error)
            }
        }
    }

    /// Register new type names
    ///
    /// Ids continue after the largest stored id. Any name already stored
    /// fails the whole batch with `DuplicateInsertion`.
    pub async fn add_types<I, S>(&self, ctx: &CallContext, names: I) -> RepositoryResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let operation = RepositoryOperation::AddTypes;
        let names = collect_names(operation, names)?;
        let mut tx = self.begin(operation).await?;
        let work = async {
            let mut query = QueryBuilder::new(tx.dialect());
            query.push("SELECT MAX(id) FROM ").push_identifier(TYPES);
            let rows = fetch(&mut tx, operation, query.build()).await?;
            let mut next = match rows.first() {
                Some(row) => decode(operation, row.get_opt_i64(0))?.map_or(1, |max| max + 1),
                None => 1,
            };
            for name in &names {
                let mut query = QueryBuilder::new(tx.dialect());
                query
                    .push("INSERT INTO ")
                    .push_identifier(TYPES)
                    .push(" (id, name) VALUES (")
                    .push_bind(next)
                    .push(", ")
                    .push_bind(name)
                    .push(")");
                execute(&mut tx, operation, query.build())
                    .await
                    .map_err(|e| e.with_entity(KIND, name.clone()))?;
                next += 1;
            }
            debug!(count = names.len(), "Types added");
            Ok(())
        };
        let outcome = supervise(ctx, self.config.operation_timeout(), operation, work).await;
        self.finish(operation, tx, outcome).await
    }

    /// Remove type names
    ///
    /// Fails with `NonExistentPrimaryData` for an unknown name and with
    /// `ValidationFailed` for a type that is still in use.
    pub async fn delete_types<I, S>(&self, ctx: &CallContext, names: I) -> RepositoryResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let operation = RepositoryOperation::DeleteTypes;
        let names = collect_names(operation, names)?;
        let mut tx = self.begin(operation).await?;
        let work = async {
            for name in &names {
                let Some(id) = find_id(&mut tx, operation, name).await? else {
                    return Err(RepositoryError::nonexistent(operation, KIND, name.clone()));
                };
                if is_referenced(&mut tx, operation, id).await? {
                    return Err(RepositoryError::validation_failed(
                        operation,
                        format!("Type {} is still in use", name),
                    )
                    .with_entity(KIND, name.clone()));
                }
                let mut query = QueryBuilder::new(tx.dialect());
                query
                    .push("DELETE FROM ")
                    .push_identifier(TYPES)
                    .push(" WHERE id = ")
                    .push_bind(id);
                execute(&mut tx, operation, query.build()).await?;
            }
            debug!(count = names.len(), "Types deleted");
            Ok(())
        };
        let outcome = supervise(ctx, self.config.operation_timeout(), operation, work).await;
        self.finish(operation, tx, outcome).await
    }

    /// Every registered name, in allocation order
    pub async fn get_all_types(&self, ctx: &CallContext) -> RepositoryResult<Vec<String>> {
        let operation = RepositoryOperation::GetTypes;
        let mut tx = self.begin(operation).await?;
        let work = async {
            let mut query = QueryBuilder::new(tx.dialect());
            query
                .push("SELECT name FROM ")
                .push_identifier(TYPES)
                .push(" ORDER BY id");
            let rows = fetch(&mut tx, operation, query.build()).await?;
            rows.iter()
                .map(|row| decode(operation, row.get_string(0)))
                .collect::<RepositoryResult<Vec<_>>>()
        };
        let outcome = supervise(ctx, self.config.operation_timeout(), operation, work).await;
        self.finish(operation, tx, outcome).await
    }

    pub async fn does_type_exist(&self, ctx: &CallContext, name: &str) -> RepositoryResult<bool> {
        let operation = RepositoryOperation::GetTypes;
        let mut tx = self.begin(operation).await?;
        let work = async { Ok(find_id(&mut tx, operation, name).await?.is_some()) };
        let outcome = supervise(ctx, self.config.operation_timeout(), operation, work).await;
        self.finish(operation, tx, outcome).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryErrorKind;
    use crate::storage::{schema, LibsqlBackend};

    async fn repository() -> TypeRepository<LibsqlBackend> {
        let backend = LibsqlBackend::memory().await.expect("open in-memory database");
        schema::migrate(&backend).await.expect("migrate");
        TypeRepository::new(Arc::new(backend), RepositoryConfig::default())
    }

    #[tokio::test]
    async fn test_add_and_list_types() {
        let repo = repository().await;
        let ctx = CallContext::new();
        repo.add_types(&ctx, ["Text", "Video"]).await.expect("add");
        repo.add_types(&ctx, ["Paper"]).await.expect("add more");

        assert_eq!(
            repo.get_all_types(&ctx).await.expect("list"),
            vec!["Text", "Video", "Paper"]
        );
        assert!(repo.does_type_exist(&ctx, "Video").await.expect("check"));
        assert!(!repo.does_type_exist(&ctx, "Audio").await.expect("check"));
    }

    #[tokio::test]
    async fn test_adding_a_type_twice_is_a_duplicate() {
        let repo = repository().await;
        let ctx = CallContext::new();
        repo.add_types(&ctx, ["Text"]).await.expect("add");

        let err = repo.add_types(&ctx, ["Text"]).await.expect_err("duplicate");
        assert_eq!(err.kind, RepositoryErrorKind::DuplicateInsertion);

        let err = repo
            .add_types(&ctx, ["Audio", "Audio"])
            .await
            .expect_err("repeated in batch");
        assert_eq!(err.kind, RepositoryErrorKind::DuplicateInsertion);
        assert_eq!(repo.get_all_types(&ctx).await.expect("list"), vec!["Text"]);
    }

    #[tokio::test]
    async fn test_empty_batches_are_ineffective() {
        let repo = repository().await;
        let ctx = CallContext::new();
        let err = repo
            .add_types(&ctx, Vec::<String>::new())
            .await
            .expect_err("empty");
        assert_eq!(err.kind, RepositoryErrorKind::IneffectiveOperation);
        assert_eq!(err.cause().map(|c| c.kind), Some(RepositoryErrorKind::EmptyInput));
    }

    #[tokio::test]
    async fn test_delete_types() {
        let repo = repository().await;
        let ctx = CallContext::new();
        repo.add_types(&ctx, ["Text", "Video"]).await.expect("add");

        repo.delete_types(&ctx, ["Text"]).await.expect("delete");
        assert_eq!(repo.get_all_types(&ctx).await.expect("list"), vec!["Video"]);

        let err = repo.delete_types(&ctx, ["Text"]).await.expect_err("gone");
        assert_eq!(err.kind, RepositoryErrorKind::NonExistentPrimaryData);
        assert_eq!(err.entity_id.as_deref(), Some("Text"));
    }
}
