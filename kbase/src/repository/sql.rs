//! Generic SQL repository
//!
//! [`SqlRepository`] implements [`Repository`] once for every [`Model`] and
//! every [`Backend`]. Each call follows the same shape:
//!
//! 1. validate the input batch
//! 2. run `BeforeAny` hooks and open a transaction
//! 3. run the work under [`supervise`] (cancellation, deadline, timeout)
//! 4. run `AfterAny` hooks and commit, or roll back and run the error hooks
//!
//! Writes happen in two phases: every base row of the batch first, then every
//! link row, so records of one batch may reference each other.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RepositoryConfig;
use crate::storage::{Backend, QueryBuilder, Session, Transaction};

use super::context::{supervise, CallContext};
use super::error::{RepositoryError, RepositoryOperation};
use super::hooks::{HookContext, HookPoint, HookRegistry};
use super::model::{decode, execute, existing_ids, fetch, Model};
use super::traits::{Repository, RepositoryResult};

/// How a batch reaches its base table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Insert,
    Replace,
    Upsert,
}

impl WriteMode {
    fn hook_points(self) -> (HookPoint, HookPoint) {
        match self {
            Self::Insert => (HookPoint::BeforeAdd, HookPoint::AfterAdd),
            Self::Replace => (HookPoint::BeforeUpdate, HookPoint::AfterUpdate),
            Self::Upsert => (HookPoint::BeforeUpsert, HookPoint::AfterUpsert),
        }
    }
}

/// Which records a read targets
enum Selection<'f, F> {
    All,
    Filter(&'f F),
    Id(i64),
}

/// Collect a batch, rejecting `None` elements and empty batches
pub(crate) fn collect_input<M, I, T>(
    operation: RepositoryOperation,
    models: I,
) -> RepositoryResult<Vec<M>>
where
    I: IntoIterator<Item = T>,
    T: Into<Option<M>>,
{
    let mut collected = Vec::new();
    for (index, model) in models.into_iter().enumerate() {
        match model.into() {
            Some(model) => collected.push(model),
            None => return Err(RepositoryError::null_input(operation, index)),
        }
    }
    if collected.is_empty() {
        return Err(RepositoryError::ineffective(
            operation,
            RepositoryError::empty_input(operation),
        ));
    }
    Ok(collected)
}

/// Roll back, logging failures so they never replace the call's own error
pub(crate) async fn rollback<T: Transaction>(tx: T, operation: RepositoryOperation) {
    if let Err(error) = tx.rollback().await {
        warn!(operation = %operation, error = %error, "Rollback failed");
    } else {
        debug!(operation = %operation, "Transaction rolled back");
    }
}

/// Repository over one entity kind and one backend
pub struct SqlRepository<M: Model, B: Backend> {
    backend: Arc<B>,
    hooks: HookRegistry<M>,
    config: RepositoryConfig,
}

impl<M: Model, B: Backend> Clone for SqlRepository<M, B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            hooks: self.hooks.clone(),
            config: self.config.clone(),
        }
    }
}

impl<M: Model, B: Backend> fmt::Debug for SqlRepository<M, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlRepository")
            .field("entity", &M::KIND)
            .field("dialect", &self.backend.dialect().name())
            .field("hooks", &self.hooks)
            .field("config", &self.config)
            .finish()
    }
}

impl<M: Model, B: Backend> SqlRepository<M, B> {
    pub fn new(backend: Arc<B>, config: RepositoryConfig) -> Self {
        Self {
            backend,
            hooks: HookRegistry::new(),
            config,
        }
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: HookRegistry<M>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn hooks(&self) -> &HookRegistry<M> {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut HookRegistry<M> {
        &mut self.hooks
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.config.operation_timeout()
    }

    pub(crate) fn run_hook(
        &self,
        point: HookPoint,
        operation: RepositoryOperation,
        call: &CallContext,
        entity: Option<&mut M>,
    ) -> RepositoryResult<()> {
        let ctx = HookContext {
            point,
            operation,
            entity_kind: M::KIND,
            call,
            error: None,
        };
        self.hooks.run(&ctx, entity)
    }

    fn run_error_hooks(
        &self,
        operation: RepositoryOperation,
        call: &CallContext,
        error: &RepositoryError,
        after_any: bool,
    ) {
        let points = [HookPoint::for_error(error), HookPoint::AfterAny];
        let points = if after_any { &points[..] } else { &points[..1] };
        for &point in points {
            let ctx = HookContext {
                point,
                operation,
                entity_kind: M::KIND,
                call,
                error: Some(error),
            };
            self.hooks.run_logged(&ctx);
        }
    }

    /// Run `BeforeAny` hooks and open the call's transaction
    pub(crate) async fn begin(
        &self,
        ctx: &CallContext,
        operation: RepositoryOperation,
    ) -> RepositoryResult<B::Transaction> {
        let opened = match self.run_hook(HookPoint::BeforeAny, operation, ctx, None) {
            Ok(()) => self
                .backend
                .begin()
                .await
                .map_err(|e| RepositoryError::backend(operation, &e)),
            Err(error) => Err(error),
        };
        if let Err(error) = &opened {
            self.run_error_hooks(operation, ctx, error, true);
        }
        opened
    }

    /// Commit on success, roll back on every other outcome
    ///
    /// `AfterAny` hooks run before the commit, so a failing hook still
    /// discards the call's writes.
    pub(crate) async fn settle<T>(
        &self,
        ctx: &CallContext,
        operation: RepositoryOperation,
        tx: B::Transaction,
        outcome: RepositoryResult<T>,
    ) -> RepositoryResult<T> {
        // AfterAny already ran on the success path, even if it then failed
        let after_any_ran = outcome.is_ok();
        let outcome = match outcome {
            Ok(value) => match self.run_hook(HookPoint::AfterAny, operation, ctx, None) {
                Ok(()) => match tx.commit().await {
                    Ok(()) => {
                        debug!(operation = %operation, entity = M::KIND, "Repository call committed");
                        return Ok(value);
                    }
                    Err(e) => Err(RepositoryError::backend(operation, &e)),
                },
                Err(error) => {
                    rollback(tx, operation).await;
                    Err(error)
                }
            },
            Err(error) => {
                rollback(tx, operation).await;
                Err(error)
            }
        };

        if let Err(error) = &outcome {
            debug!(
                operation = %operation,
                entity = M::KIND,
                kind = %error.kind,
                "Repository call failed"
            );
            self.run_error_hooks(operation, ctx, error, !after_any_ran);
        }
        outcome
    }

    // ------------------------------------------------------------------
    // Work performed inside the transaction
    // ------------------------------------------------------------------

    async fn write_row(
        &self,
        session: &mut dyn Session,
        operation: RepositoryOperation,
        model: &M,
        mode: WriteMode,
    ) -> RepositoryResult<()> {
        let id = model.id();
        let values = model.to_row(session, operation).await?;
        let dialect = session.dialect();
        let mut query = QueryBuilder::new(dialect);

        if mode != WriteMode::Insert {
            model.before_overwrite(session, operation).await?;
        }
        match mode {
            WriteMode::Insert | WriteMode::Upsert => {
                query
                    .push("INSERT INTO ")
                    .push_identifier(M::TABLE)
                    .push(" (")
                    .push_identifiers(M::COLUMNS)
                    .push(") VALUES (")
                    .push_bind_list(values)
                    .push(")");
                if mode == WriteMode::Upsert {
                    let clause = dialect.upsert_clause(&M::COLUMNS[..1], &M::COLUMNS[1..]);
                    query.push(" ").push(&clause);
                }
            }
            WriteMode::Replace => {
                if existing_ids(session, operation, M::TABLE, &[id]).await?.is_empty() {
                    return Err(RepositoryError::nonexistent(operation, M::KIND, id.to_string()));
                }
                query.push("UPDATE ").push_identifier(M::TABLE).push(" SET ");
                for (index, (column, value)) in M::COLUMNS.iter().zip(values).enumerate().skip(1) {
                    if index > 1 {
                        query.push(", ");
                    }
                    query.push_identifier(column).push(" = ").push_bind(value);
                }
                query.push(" WHERE id = ").push_bind(id);
            }
        }

        execute(session, operation, query.build())
            .await
            .map_err(|error| match error.entity_type {
                Some(_) => error,
                None => error.with_entity(M::KIND, id.to_string()),
            })?;
        Ok(())
    }

    async fn write_batch(
        &self,
        session: &mut dyn Session,
        ctx: &CallContext,
        operation: RepositoryOperation,
        mut models: Vec<M>,
        mode: WriteMode,
    ) -> RepositoryResult<u64> {
        let (before, after) = mode.hook_points();
        for model in models.iter_mut() {
            self.run_hook(before, operation, ctx, Some(model))?;
        }
        for model in &models {
            self.write_row(session, operation, model, mode).await?;
        }
        for model in &models {
            model.write_relations(session, operation).await?;
        }
        for model in models.iter_mut() {
            self.run_hook(after, operation, ctx, Some(model))?;
        }
        debug!(
            operation = %operation,
            entity = M::KIND,
            count = models.len(),
            "Records written"
        );
        Ok(models.len() as u64)
    }

    async fn select(
        &self,
        session: &mut dyn Session,
        operation: RepositoryOperation,
        selection: Selection<'_, M::Filter>,
        first_only: bool,
    ) -> RepositoryResult<Vec<M>> {
        let mut query = QueryBuilder::new(session.dialect());
        query
            .push("SELECT ")
            .push_identifiers(M::COLUMNS)
            .push(" FROM ")
            .push_identifier(M::TABLE);
        match selection {
            Selection::All => {}
            Selection::Filter(filter) => M::push_filter(filter, session, &mut query, operation).await?,
            Selection::Id(id) => {
                query.push_condition().push("id = ").push_bind(id);
            }
        }
        query.push(" ORDER BY id");
        if first_only {
            query.push(" LIMIT 1");
        }

        let rows = fetch(session, operation, query.build()).await?;
        let mut models = Vec::with_capacity(rows.len());
        for row in rows {
            models.push(M::from_row(row, session, operation).await?);
        }
        Ok(models)
    }

    /// Stored version of each record, failing on the first missing one
    async fn load_stored(
        &self,
        session: &mut dyn Session,
        operation: RepositoryOperation,
        models: Vec<M>,
    ) -> RepositoryResult<Vec<M>> {
        let mut stored = Vec::with_capacity(models.len());
        for model in models {
            let id = model.id();
            let mut found = self.select(session, operation, Selection::Id(id), true).await?;
            match found.pop() {
                Some(record) => stored.push(record),
                None => return Err(RepositoryError::nonexistent(operation, M::KIND, id.to_string())),
            }
        }
        Ok(stored)
    }

    async fn update_records(
        &self,
        session: &mut dyn Session,
        ctx: &CallContext,
        operation: RepositoryOperation,
        mut records: Vec<M>,
        updater: &M::Updater,
    ) -> RepositoryResult<u64> {
        for record in records.iter_mut() {
            record.apply_updater(updater);
        }
        if records.is_empty() {
            return Ok(0);
        }
        self.write_batch(session, ctx, operation, records, WriteMode::Replace)
            .await
    }

    async fn delete_records(
        &self,
        session: &mut dyn Session,
        ctx: &CallContext,
        operation: RepositoryOperation,
        records: Vec<M>,
    ) -> RepositoryResult<u64> {
        let count = records.len() as u64;
        for mut record in records {
            let id = record.id();
            self.run_hook(HookPoint::BeforeDelete, operation, ctx, Some(&mut record))?;
            M::delete_relations(id, session, operation).await?;

            let mut query = QueryBuilder::new(session.dialect());
            query
                .push("DELETE FROM ")
                .push_identifier(M::TABLE)
                .push(" WHERE id = ")
                .push_bind(id);
            if execute(session, operation, query.build()).await? == 0 {
                return Err(RepositoryError::nonexistent(operation, M::KIND, id.to_string()));
            }
            self.run_hook(HookPoint::AfterDelete, operation, ctx, Some(&mut record))?;
        }
        debug!(operation = %operation, entity = M::KIND, count, "Records deleted");
        Ok(count)
    }

    async fn read(
        &self,
        session: &mut dyn Session,
        ctx: &CallContext,
        operation: RepositoryOperation,
        selection: Selection<'_, M::Filter>,
        first_only: bool,
    ) -> RepositoryResult<Vec<M>> {
        self.run_hook(HookPoint::BeforeSelect, operation, ctx, None)?;
        let mut models = self.select(session, operation, selection, first_only).await?;
        for model in models.iter_mut() {
            self.run_hook(HookPoint::AfterSelect, operation, ctx, Some(model))?;
        }
        debug!(operation = %operation, entity = M::KIND, count = models.len(), "Records read");
        Ok(models)
    }

    async fn count(
        &self,
        session: &mut dyn Session,
        ctx: &CallContext,
        operation: RepositoryOperation,
        filter: Option<&M::Filter>,
    ) -> RepositoryResult<u64> {
        self.run_hook(HookPoint::BeforeSelect, operation, ctx, None)?;
        let mut query = QueryBuilder::new(session.dialect());
        query.push("SELECT COUNT(*) FROM ").push_identifier(M::TABLE);
        if let Some(filter) = filter {
            M::push_filter(filter, session, &mut query, operation).await?;
        }
        let rows = fetch(session, operation, query.build()).await?;
        let count = match rows.first() {
            Some(row) => decode(operation, row.get_i64(0))?,
            None => 0,
        };
        self.run_hook(HookPoint::AfterSelect, operation, ctx, None)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn contains(
        &self,
        session: &mut dyn Session,
        ctx: &CallContext,
        operation: RepositoryOperation,
        id: i64,
    ) -> RepositoryResult<bool> {
        self.run_hook(HookPoint::BeforeSelect, operation, ctx, None)?;
        let found = existing_ids(session, operation, M::TABLE, &[id]).await?;
        self.run_hook(HookPoint::AfterSelect, operation, ctx, None)?;
        Ok(!found.is_empty())
    }
}

impl<M: Model, B: Backend> Repository<M> for SqlRepository<M, B> {
    async fn add<I, T>(&self, ctx: &CallContext, models: I) -> RepositoryResult<()>
    where
        I: IntoIterator<Item = T> + Send,
        T: Into<Option<M>> + Send,
    {
        let operation = RepositoryOperation::Add;
        let models = collect_input(operation, models)?;
        let mut tx = self.begin(ctx, operation).await?;
        let work = self.write_batch(&mut tx, ctx, operation, models, WriteMode::Insert);
        let outcome = supervise(ctx, self.timeout(), operation, work).await;
        self.settle(ctx, operation, tx, outcome.map(drop)).await
    }

    async fn replace<I, T>(&self, ctx: &CallContext, models: I) -> RepositoryResult<()>
    where
        I: IntoIterator<Item = T> + Send,
        T: Into<Option<M>> + Send,
    {
        let operation = RepositoryOperation::Replace;
        let models = collect_input(operation, models)?;
        let mut tx = self.begin(ctx, operation).await?;
        let work = self.write_batch(&mut tx, ctx, operation, models, WriteMode::Replace);
        let outcome = supervise(ctx, self.timeout(), operation, work).await;
        self.settle(ctx, operation, tx, outcome.map(drop)).await
    }

    async fn upsert<I, T>(&self, ctx: &CallContext, models: I) -> RepositoryResult<()>
    where
        I: IntoIterator<Item = T> + Send,
        T: Into<Option<M>> + Send,
    {
        let operation = RepositoryOperation::Upsert;
        let models = collect_input(operation, models)?;
        let mut tx = self.begin(ctx, operation).await?;
        let work = self.write_batch(&mut tx, ctx, operation, models, WriteMode::Upsert);
        let outcome = supervise(ctx, self.timeout(), operation, work).await;
        self.settle(ctx, operation, tx, outcome.map(drop)).await
    }

    async fn update<I, T>(&self, ctx: &CallContext, models: I, updater: &M::Updater) -> RepositoryResult<()>
    where
        I: IntoIterator<Item = T> + Send,
        T: Into<Option<M>> + Send,
    {
        let operation = RepositoryOperation::Update;
        let models = collect_input(operation, models)?;
        let mut tx = self.begin(ctx, operation).await?;
        let work = async {
            let stored = self.load_stored(&mut tx, operation, models).await?;
            self.update_records(&mut tx, ctx, operation, stored, updater).await
        };
        let outcome = supervise(ctx, self.timeout(), operation, work).await;
        self.settle(ctx, operation, tx, outcome.map(drop)).await
    }

    async fn update_where(
        &self,
        ctx: &CallContext,
        filter: &M::Filter,
        updater: &M::Updater,
    ) -> RepositoryResult<u64> {
        let operation = RepositoryOperation::UpdateWhere;
        let mut tx = self.begin(ctx, operation).await?;
        let work = async {
            let matched = self
                .select(&mut tx, operation, Selection::Filter(filter), false)
                .await?;
            self.update_records(&mut tx, ctx, operation, matched, updater).await
        };
        let outcome = supervise(ctx, self.timeout(), operation, work).await;
        self.settle(ctx, operation, tx, outcome).await
    }

    async fn delete<I, T>(&self, ctx: &CallContext, models: I) -> RepositoryResult<()>
    where
        I: IntoIterator<Item = T> + Send,
        T: Into<Option<M>> + Send,
    {
        let operation = RepositoryOperation::Delete;
        let models = collect_input(operation, models)?;
        let mut tx = self.begin(ctx, operation).await?;
        let work = async {
            let stored = self.load_stored(&mut tx, operation, models).await?;
            self.delete_records(&mut tx, ctx, operation, stored).await
        };
        let outcome = supervise(ctx, self.timeout(), operation, work).await;
        self.settle(ctx, operation, tx, outcome.map(drop)).await
    }

    async fn delete_where(&self, ctx: &CallContext, filter: &M::Filter) -> RepositoryResult<u64> {
        let operation = RepositoryOperation::DeleteWhere;
        let mut tx = self.begin(ctx, operation).await?;
        let work = async {
            let matched = self
                .select(&mut tx, operation, Selection::Filter(filter), false)
                .await?;
            self.delete_records(&mut tx, ctx, operation, matched).await
        };
        let outcome = supervise(ctx, self.timeout(), operation, work).await;
        self.settle(ctx, operation, tx, outcome).await
    }

    async fn count_all(&self, ctx: &CallContext) -> RepositoryResult<u64> {
        let operation = RepositoryOperation::CountAll;
        let mut tx = self.begin(ctx, operation).await?;
        let work = self.count(&mut tx, ctx, operation, None);
        let outcome = supervise(ctx, self.timeout(), operation, work).await;
        self.settle(ctx, operation, tx, outcome).await
    }

    async fn count_where(&self, ctx: &CallContext, filter: &M::Filter) -> RepositoryResult<u64> {
        let operation = RepositoryOperation::CountWhere;
        let mut tx = self.begin(ctx, operation).await?;
        let work = self.count(&mut tx, ctx, operation, Some(filter));
        let outcome = supervise(ctx, self.timeout(), operation, work).await;
        self.settle(ctx, operation, tx, outcome).await
    }

    async fn does_exist(&self, ctx: &CallContext, model: &M) -> RepositoryResult<bool> {
        let operation = RepositoryOperation::DoesExist;
        let mut tx = self.begin(ctx, operation).await?;
        let work = self.contains(&mut tx, ctx, operation, model.id());
        let outcome = supervise(ctx, self.timeout(), operation, work).await;
        self.settle(ctx, operation, tx, outcome).await
    }

    async fn does_exist_where(&self, ctx: &CallContext, filter: &M::Filter) -> RepositoryResult<bool> {
        let operation = RepositoryOperation::DoesExistWhere;
        let mut tx = self.begin(ctx, operation).await?;
        let work = self.count(&mut tx, ctx, operation, Some(filter));
        let outcome = supervise(ctx, self.timeout(), operation, work).await;
        self.settle(ctx, operation, tx, outcome.map(|count| count > 0))
            .await
    }

    async fn get_all(&self, ctx: &CallContext) -> RepositoryResult<Vec<M>> {
        let operation = RepositoryOperation::GetAll;
        let mut tx = self.begin(ctx, operation).await?;
        let work = self.read(&mut tx, ctx, operation, Selection::All, false);
        let outcome = supervise(ctx, self.timeout(), operation, work).await;
        self.settle(ctx, operation, tx, outcome).await
    }

    async fn get_first_where(&self, ctx: &CallContext, filter: &M::Filter) -> RepositoryResult<Option<M>> {
        let operation = RepositoryOperation::GetFirstWhere;
        let mut tx = self.begin(ctx, operation).await?;
        let work = self.read(&mut tx, ctx, operation, Selection::Filter(filter), true);
        let outcome = supervise(ctx, self.timeout(), operation, work).await;
        self.settle(ctx, operation, tx, outcome.map(|models| models.into_iter().next()))
            .await
    }

    async fn get_where(&self, ctx: &CallContext, filter: &M::Filter) -> RepositoryResult<Vec<M>> {
        let operation = RepositoryOperation::GetWhere;
        let mut tx = self.begin(ctx, operation).await?;
        let work = self.read(&mut tx, ctx, operation, Selection::Filter(filter), false);
        let outcome = supervise(ctx, self.timeout(), operation, work).await;
        self.settle(ctx, operation, tx, outcome).await
    }
}
