//! # kbase
//!
//! Personal knowledge-base backend: bookmarks, documents and namespaced tags
//! persisted through interchangeable SQL backends.
//!
//! ## Features
//!
//! - **Generic expressions**: typed filter and update expressions shared by
//!   every entity repository
//! - **Tag trees**: namespaced tags (`lang::rust::async`) with stored ancestor
//!   chains, subtree moves and leaf-ambiguity resolution
//! - **One repository, many backends**: CRUD implemented once over libsql
//!   (SQLite, local or remote) and sqlx (PostgreSQL, MySQL)
//! - **Scoped transactions**: every call commits or rolls back as a whole,
//!   including on cancellation, deadline and timeout
//! - **Hooks**: callbacks before and after each lifecycle moment
//!
//! ## Example
//!
//! ```rust,no_run
//! use kbase::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config.logging)?;
//!
//!     let kb = KnowledgeBase::connect(config).await?;
//!     let ctx = CallContext::new();
//!
//!     kb.tags()
//!         .add(&ctx, [Tag::new(1, "lang"), Tag::new(2, "lang::rust").with_parent_path([1])])
//!         .await?;
//!     kb.bookmarks()
//!         .add(&ctx, [Bookmark::new(1, "https://www.rust-lang.org").with_tags([Tag::new(2, "lang::rust")])])
//!         .await?;
//!
//!     let below_lang = TagFilter::new().with_ancestor(FilterExpression::eq("lang".to_string()));
//!     for tag in kb.tags().get_where(&ctx, &below_lang).await? {
//!         println!("{}", kb.tags().shorten_tag(&ctx, &tag).await?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod expression;
pub mod knowledge_base;
pub mod model;
pub mod observability;
pub mod repository;
pub mod storage;
pub mod tag;

#[cfg(feature = "interchange")]
pub mod interchange;

pub mod prelude {
    pub use crate::config::{BackendKind, Config, LoggingConfig, RepositoryConfig, StorageConfig};
    pub use crate::error::{DatabaseError, DatabaseErrorKind, DatabaseOperation, Error, Result};
    pub use crate::expression::{FilterExpression, UpdateExpression};
    pub use crate::knowledge_base::KnowledgeBase;
    pub use crate::model::{
        Bookmark, BookmarkFilter, BookmarkUpdater, Document, DocumentFilter, DocumentUpdater, Tag,
        TagFilter, TagUpdater,
    };
    pub use crate::observability::init_tracing;
    pub use crate::repository::{
        BookmarkRepository, CallContext, DocumentRepository, HookContext, HookPoint, Repository,
        RepositoryError, RepositoryErrorKind, RepositoryOperation, TagRepository, TypeRepository,
    };
    pub use crate::storage::Backend;

    #[cfg(feature = "turso")]
    pub use crate::storage::LibsqlBackend;

    #[cfg(feature = "database")]
    pub use crate::storage::SqlxBackend;

    pub use tokio_util::sync::CancellationToken;
}
