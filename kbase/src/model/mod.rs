//! Domain entities
//!
//! Identifiers of tags, bookmarks and documents are chosen by the caller;
//! type ids are allocated by the type repository and never exposed on
//! entities, which refer to types by name.

mod bookmark;
mod document;
mod tag;

pub use bookmark::{Bookmark, BookmarkFilter, BookmarkUpdater};
pub use document::{Document, DocumentFilter, DocumentUpdater};
pub use tag::{Tag, TagFilter, TagUpdater};

/// Identifier of a [`Tag`]
pub type TagId = i64;

/// Identifier of a [`Bookmark`]
pub type BookmarkId = i64;

/// Identifier of a [`Document`]
pub type DocumentId = i64;

/// A record persisted by a repository
pub trait Entity: Clone + Send + Sync + 'static {
    /// Entity name used in errors and log fields
    const KIND: &'static str;

    fn id(&self) -> i64;
}

/// Deduplicate tags by id, keeping the first occurrence
pub(crate) fn dedup_tags(tags: &mut Vec<Tag>) {
    let mut seen = std::collections::HashSet::new();
    tags.retain(|tag| seen.insert(tag.id));
}
