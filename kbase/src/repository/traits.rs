//! Repository trait definitions
//!
//! This module provides the generic CRUD contract using RPITIT (Return
//! Position Impl Trait In Traits), available since Rust 1.75.
//!
//! # Overview
//!
//! Every operation takes a [`CallContext`] carrying cancellation and an
//! optional deadline, and runs inside a single transaction: either all of its
//! effects become visible or none do.
//!
//! Batch inputs accept anything convertible to `Option<M>`, so both
//! `Vec<Bookmark>` and `Vec<Option<Bookmark>>` work. An empty batch fails
//! with `IneffectiveOperation` wrapping `EmptyInput`; a `None` element fails
//! with `NullInput`.
//!
//! # Example
//!
//! ```rust,ignore
//! use kbase::prelude::*;
//!
//! let ctx = CallContext::new();
//! kb.bookmarks()
//!     .add(&ctx, vec![Bookmark::new(1, "https://www.rust-lang.org")])
//!     .await?;
//! let rust = kb
//!     .bookmarks()
//!     .get_where(&ctx, &BookmarkFilter::new().with_url(FilterExpression::like("%rust%".to_string())))
//!     .await?;
//! ```

use std::future::Future;

use super::context::CallContext;
use super::error::RepositoryError;
use super::model::Model;

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Generic CRUD contract over one entity kind
pub trait Repository<M: Model>: Send + Sync {
    /// Insert new records
    ///
    /// Fails with `DuplicateInsertion` when a record collides with a stored
    /// one and with `ReferenceToNonExistentDependency` when it references a
    /// missing tag, type or document.
    fn add<I, T>(&self, ctx: &CallContext, models: I) -> impl Future<Output = RepositoryResult<()>> + Send
    where
        I: IntoIterator<Item = T> + Send,
        T: Into<Option<M>> + Send;

    /// Overwrite existing records, matched by id
    ///
    /// Fails with `NonExistentPrimaryData` when a record is not stored.
    fn replace<I, T>(
        &self,
        ctx: &CallContext,
        models: I,
    ) -> impl Future<Output = RepositoryResult<()>> + Send
    where
        I: IntoIterator<Item = T> + Send,
        T: Into<Option<M>> + Send;

    /// Insert records, overwriting those already stored
    fn upsert<I, T>(
        &self,
        ctx: &CallContext,
        models: I,
    ) -> impl Future<Output = RepositoryResult<()>> + Send
    where
        I: IntoIterator<Item = T> + Send,
        T: Into<Option<M>> + Send;

    /// Apply `updater` to the stored version of each record
    ///
    /// Only the record ids are read from `models`.
    fn update<I, T>(
        &self,
        ctx: &CallContext,
        models: I,
        updater: &M::Updater,
    ) -> impl Future<Output = RepositoryResult<()>> + Send
    where
        I: IntoIterator<Item = T> + Send,
        T: Into<Option<M>> + Send;

    /// Apply `updater` to every record matching `filter`, returning the count
    fn update_where(
        &self,
        ctx: &CallContext,
        filter: &M::Filter,
        updater: &M::Updater,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Remove records, matched by id
    fn delete<I, T>(
        &self,
        ctx: &CallContext,
        models: I,
    ) -> impl Future<Output = RepositoryResult<()>> + Send
    where
        I: IntoIterator<Item = T> + Send,
        T: Into<Option<M>> + Send;

    /// Remove every record matching `filter`, returning the count
    fn delete_where(
        &self,
        ctx: &CallContext,
        filter: &M::Filter,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    fn count_all(&self, ctx: &CallContext) -> impl Future<Output = RepositoryResult<u64>> + Send;

    fn count_where(
        &self,
        ctx: &CallContext,
        filter: &M::Filter,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Whether a record with the same id is stored
    fn does_exist(
        &self,
        ctx: &CallContext,
        model: &M,
    ) -> impl Future<Output = RepositoryResult<bool>> + Send;

    fn does_exist_where(
        &self,
        ctx: &CallContext,
        filter: &M::Filter,
    ) -> impl Future<Output = RepositoryResult<bool>> + Send;

    /// Every record, ordered by id
    fn get_all(&self, ctx: &CallContext) -> impl Future<Output = RepositoryResult<Vec<M>>> + Send;

    /// The matching record with the lowest id
    fn get_first_where(
        &self,
        ctx: &CallContext,
        filter: &M::Filter,
    ) -> impl Future<Output = RepositoryResult<Option<M>>> + Send;

    /// Every matching record, ordered by id
    fn get_where(
        &self,
        ctx: &CallContext,
        filter: &M::Filter,
    ) -> impl Future<Output = RepositoryResult<Vec<M>>> + Send;
}
