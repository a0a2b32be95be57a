use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{dedup_tags, BookmarkId, Entity, Tag, TagId};
use crate::expression::{apply_optional, FilterExpression, UpdateExpression};

/// A saved URL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: BookmarkId,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Name of a registered type
    #[serde(default)]
    pub bookmark_type: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Bookmark {
    pub fn new(id: BookmarkId, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Attach tags; repeated ids are kept once
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.tags.extend(tags);
        dedup_tags(&mut self.tags);
        self
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.bookmark_type = Some(type_name.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn tag_ids(&self) -> Vec<TagId> {
        self.tags.iter().map(|tag| tag.id).collect()
    }
}

impl Entity for Bookmark {
    const KIND: &'static str = "Bookmark";

    fn id(&self) -> i64 {
        self.id
    }
}

/// Criteria selecting bookmarks; set fields are combined with AND
///
/// `tags` matches bookmarks carrying at least one tag whose name satisfies
/// the expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookmarkFilter {
    pub id: Option<FilterExpression<BookmarkId>>,
    pub url: Option<FilterExpression<String>>,
    pub title: Option<FilterExpression<String>>,
    pub tags: Option<FilterExpression<String>>,
    pub bookmark_type: Option<FilterExpression<String>>,
    pub created_at: Option<FilterExpression<DateTime<Utc>>>,
}

impl BookmarkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, expr: FilterExpression<BookmarkId>) -> Self {
        self.id = Some(expr);
        self
    }

    pub fn with_url(mut self, expr: FilterExpression<String>) -> Self {
        self.url = Some(expr);
        self
    }

    pub fn with_title(mut self, expr: FilterExpression<String>) -> Self {
        self.title = Some(expr);
        self
    }

    pub fn with_tags(mut self, expr: FilterExpression<String>) -> Self {
        self.tags = Some(expr);
        self
    }

    pub fn with_type(mut self, expr: FilterExpression<String>) -> Self {
        self.bookmark_type = Some(expr);
        self
    }

    pub fn with_created_at(mut self, expr: FilterExpression<DateTime<Utc>>) -> Self {
        self.created_at = Some(expr);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookmarkUpdater {
    pub url: Option<UpdateExpression<String>>,
    pub title: Option<UpdateExpression<String>>,
    pub tags: Option<UpdateExpression<Vec<Tag>>>,
    pub bookmark_type: Option<UpdateExpression<Option<String>>>,
    pub created_at: Option<UpdateExpression<Option<DateTime<Utc>>>>,
}

impl BookmarkUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, update: UpdateExpression<String>) -> Self {
        self.url = Some(update);
        self
    }

    pub fn title(mut self, update: UpdateExpression<String>) -> Self {
        self.title = Some(update);
        self
    }

    pub fn tags(mut self, update: UpdateExpression<Vec<Tag>>) -> Self {
        self.tags = Some(update);
        self
    }

    pub fn bookmark_type(mut self, update: UpdateExpression<Option<String>>) -> Self {
        self.bookmark_type = Some(update);
        self
    }

    pub fn created_at(mut self, update: UpdateExpression<Option<DateTime<Utc>>>) -> Self {
        self.created_at = Some(update);
        self
    }

    pub fn apply(&self, bookmark: &mut Bookmark) {
        apply_optional(self.url.as_ref(), &mut bookmark.url);
        apply_optional(self.title.as_ref(), &mut bookmark.title);
        apply_optional(self.tags.as_ref(), &mut bookmark.tags);
        dedup_tags(&mut bookmark.tags);
        apply_optional(self.bookmark_type.as_ref(), &mut bookmark.bookmark_type);
        apply_optional(self.created_at.as_ref(), &mut bookmark.created_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_updater_appends_tags_without_duplicates() {
        let rust = Tag::new(1, "rust");
        let web = Tag::new(2, "web");
        let mut bookmark = Bookmark::new(10, "https://example.org").with_tags([rust.clone()]);

        BookmarkUpdater::new()
            .tags(UpdateExpression::append(vec![web.clone(), rust.clone()]))
            .title(UpdateExpression::set("Example".to_string()))
            .apply(&mut bookmark);

        assert_eq!(bookmark.tag_ids(), vec![1, 2]);
        assert_eq!(bookmark.title, "Example");
    }

    #[test]
    fn test_updater_clears_optional_type() {
        let mut bookmark = Bookmark::new(1, "https://example.org").with_type("article");
        BookmarkUpdater::new()
            .bookmark_type(UpdateExpression::clear())
            .apply(&mut bookmark);
        assert_eq!(bookmark.bookmark_type, None);
    }
}
