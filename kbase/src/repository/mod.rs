//! Repositories over the knowledge-base entities
//!
//! [`Repository`] is the CRUD contract; [`SqlRepository`] implements it for
//! every [`Model`] on every [`Backend`](crate::storage::Backend). The
//! aliases [`TagRepository`], [`BookmarkRepository`] and
//! [`DocumentRepository`] name the three entity repositories, and
//! [`TypeRepository`] manages the shared type names.

mod bookmark;
mod context;
mod document;
mod error;
mod hooks;
mod model;
mod sql;
mod tag;
mod traits;
mod types;

pub use bookmark::BookmarkRepository;
pub use context::CallContext;
pub use document::DocumentRepository;
pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
pub use hooks::{Hook, HookContext, HookPoint, HookRegistry};
pub use model::Model;
pub use sql::SqlRepository;
pub use tag::TagRepository;
pub use traits::{Repository, RepositoryResult};
pub use types::TypeRepository;
