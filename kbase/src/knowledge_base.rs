//! The knowledge base: every repository over one backend

use std::fmt;
use std::sync::Arc;

use crate::config::{BackendKind, Config};
use crate::error::{DatabaseError, DatabaseErrorKind, DatabaseOperation, Result};
use crate::repository::{BookmarkRepository, DocumentRepository, TagRepository, TypeRepository};
use crate::storage::{schema, Backend};

#[cfg(feature = "interchange")]
use crate::{model::Tag, repository::CallContext, repository::Repository};

/// Tags, bookmarks, documents and types sharing one backend
///
/// Opening a knowledge base migrates the schema. Repositories are cheap to
/// clone and share the backend; hooks registered through the `*_mut`
/// accessors apply to every later call made through this value.
///
/// ```rust,no_run
/// use kbase::prelude::*;
///
/// # async fn run() -> kbase::error::Result<()> {
/// let config = Config::load()?;
/// init_tracing(&config.logging)?;
///
/// let kb = KnowledgeBase::connect(config).await?;
/// let ctx = CallContext::new();
/// kb.types().add_types(&ctx, ["Article"]).await?;
/// kb.bookmarks()
///     .add(&ctx, [Bookmark::new(1, "https://www.rust-lang.org").with_type("Article")])
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct KnowledgeBase<B: Backend> {
    backend: Arc<B>,
    config: Config,
    tags: TagRepository<B>,
    bookmarks: BookmarkRepository<B>,
    documents: DocumentRepository<B>,
    types: TypeRepository<B>,
}

impl<B: Backend> Clone for KnowledgeBase<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
            tags: self.tags.clone(),
            bookmarks: self.bookmarks.clone(),
            documents: self.documents.clone(),
            types: self.types.clone(),
        }
    }
}

impl<B: Backend> fmt::Debug for KnowledgeBase<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("dialect", &self.backend.dialect().name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<B: Backend> KnowledgeBase<B> {
    /// Migrate `backend` and build the repositories
    pub async fn open(backend: B, config: Config) -> Result<Self> {
        schema::migrate(&backend).await?;
        let backend = Arc::new(backend);
        let repository = config.repository.clone();
        Ok(Self {
            tags: TagRepository::new(Arc::clone(&backend), repository.clone()),
            bookmarks: BookmarkRepository::new(Arc::clone(&backend), repository.clone()),
            documents: DocumentRepository::new(Arc::clone(&backend), repository.clone()),
            types: TypeRepository::new(Arc::clone(&backend), repository),
            backend,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn tags(&self) -> &TagRepository<B> {
        &self.tags
    }

    pub fn tags_mut(&mut self) -> &mut TagRepository<B> {
        &mut self.tags
    }

    pub fn bookmarks(&self) -> &BookmarkRepository<B> {
        &self.bookmarks
    }

    pub fn bookmarks_mut(&mut self) -> &mut BookmarkRepository<B> {
        &mut self.bookmarks
    }

    pub fn documents(&self) -> &DocumentRepository<B> {
        &self.documents
    }

    pub fn documents_mut(&mut self) -> &mut DocumentRepository<B> {
        &mut self.documents
    }

    pub fn types(&self) -> &TypeRepository<B> {
        &self.types
    }

    /// Add every tag of a YAML tag tree, numbering new tags from `first_id`
    ///
    /// The whole tree is added in one call, so an id or name that is already
    /// stored fails it without adding anything.
    #[cfg(feature = "interchange")]
    pub async fn import_tag_tree(&self, ctx: &CallContext, yaml: &str, first_id: i64) -> Result<Vec<Tag>> {
        let separator = self.config.repository.tag_separator.as_str();
        let paths = crate::interchange::parse_tag_tree(yaml, separator)?;
        let tags = crate::interchange::tag_forest(&paths, separator, first_id);
        if !tags.is_empty() {
            self.tags.add(ctx, tags.clone()).await?;
        }
        tracing::info!(count = tags.len(), "Tag tree imported");
        Ok(tags)
    }
}

fn backend_mismatch(expected: BackendKind, configured: BackendKind) -> DatabaseError {
    DatabaseError::new(
        DatabaseOperation::Connect,
        DatabaseErrorKind::Configuration,
        format!(
            "storage.backend is {:?}, but a {:?} knowledge base was requested",
            configured, expected
        ),
    )
}

#[cfg(feature = "turso")]
impl KnowledgeBase<crate::storage::LibsqlBackend> {
    /// Open the libsql database named by `config.storage`
    pub async fn connect(config: Config) -> Result<Self> {
        if config.storage.backend != BackendKind::Libsql {
            return Err(backend_mismatch(BackendKind::Libsql, config.storage.backend).into());
        }
        let backend = crate::storage::LibsqlBackend::connect(&config.storage).await?;
        Self::open(backend, config).await
    }

    /// A fresh in-memory knowledge base
    pub async fn memory(config: Config) -> Result<Self> {
        let backend = crate::storage::LibsqlBackend::memory().await?;
        Self::open(backend, config).await
    }
}

#[cfg(feature = "database")]
impl KnowledgeBase<crate::storage::SqlxBackend> {
    /// Connect to the PostgreSQL or MySQL server named by `config.storage`
    pub async fn connect_sqlx(config: Config) -> Result<Self> {
        if config.storage.backend != BackendKind::Sqlx {
            return Err(backend_mismatch(BackendKind::Sqlx, config.storage.backend).into());
        }
        let backend = crate::storage::SqlxBackend::connect(&config.storage).await?;
        Self::open(backend, config).await
    }
}
