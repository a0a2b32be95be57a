use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{dedup_tags, DocumentId, Entity, Tag, TagId};
use crate::expression::{apply_optional, FilterExpression, UpdateExpression};

/// A file in the knowledge base and its outgoing links
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub path: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Linked documents, in the order they appear
    #[serde(default)]
    pub links: Vec<DocumentId>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(id: DocumentId, path: impl Into<String>) -> Self {
        Self {
            id,
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = hash.into();
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.tags.extend(tags);
        dedup_tags(&mut self.tags);
        self
    }

    pub fn with_links(mut self, links: impl IntoIterator<Item = DocumentId>) -> Self {
        self.links.extend(links);
        dedup_links(&mut self.links);
        self
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.document_type = Some(type_name.into());
        self
    }

    pub fn with_modified_at(mut self, modified_at: DateTime<Utc>) -> Self {
        self.modified_at = Some(modified_at);
        self
    }

    pub fn tag_ids(&self) -> Vec<TagId> {
        self.tags.iter().map(|tag| tag.id).collect()
    }
}

impl Entity for Document {
    const KIND: &'static str = "Document";

    fn id(&self) -> i64 {
        self.id
    }
}

fn dedup_links(links: &mut Vec<DocumentId>) {
    let mut seen = std::collections::HashSet::new();
    links.retain(|id| seen.insert(*id));
}

/// Criteria selecting documents; set fields are combined with AND
///
/// `links` matches documents linking to a matching id, `backlinks` matches
/// documents linked from one. The backlinks of document 7 are therefore
/// `DocumentFilter::new().with_links(FilterExpression::eq(7))`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentFilter {
    pub id: Option<FilterExpression<DocumentId>>,
    pub path: Option<FilterExpression<String>>,
    pub hash: Option<FilterExpression<String>>,
    pub tags: Option<FilterExpression<String>>,
    pub links: Option<FilterExpression<DocumentId>>,
    pub backlinks: Option<FilterExpression<DocumentId>>,
    pub document_type: Option<FilterExpression<String>>,
    pub modified_at: Option<FilterExpression<DateTime<Utc>>>,
}

impl DocumentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, expr: FilterExpression<DocumentId>) -> Self {
        self.id = Some(expr);
        self
    }

    pub fn with_path(mut self, expr: FilterExpression<String>) -> Self {
        self.path = Some(expr);
        self
    }

    pub fn with_hash(mut self, expr: FilterExpression<String>) -> Self {
        self.hash = Some(expr);
        self
    }

    pub fn with_tags(mut self, expr: FilterExpression<String>) -> Self {
        self.tags = Some(expr);
        self
    }

    pub fn with_links(mut self, expr: FilterExpression<DocumentId>) -> Self {
        self.links = Some(expr);
        self
    }

    pub fn with_backlinks(mut self, expr: FilterExpression<DocumentId>) -> Self {
        self.backlinks = Some(expr);
        self
    }

    pub fn with_type(mut self, expr: FilterExpression<String>) -> Self {
        self.document_type = Some(expr);
        self
    }

    pub fn with_modified_at(mut self, expr: FilterExpression<DateTime<Utc>>) -> Self {
        self.modified_at = Some(expr);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentUpdater {
    pub path: Option<UpdateExpression<String>>,
    pub hash: Option<UpdateExpression<String>>,
    pub tags: Option<UpdateExpression<Vec<Tag>>>,
    pub links: Option<UpdateExpression<Vec<DocumentId>>>,
    pub document_type: Option<UpdateExpression<Option<String>>>,
    pub modified_at: Option<UpdateExpression<Option<DateTime<Utc>>>>,
}

impl DocumentUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, update: UpdateExpression<String>) -> Self {
        self.path = Some(update);
        self
    }

    pub fn hash(mut self, update: UpdateExpression<String>) -> Self {
        self.hash = Some(update);
        self
    }

    pub fn tags(mut self, update: UpdateExpression<Vec<Tag>>) -> Self {
        self.tags = Some(update);
        self
    }

    pub fn links(mut self, update: UpdateExpression<Vec<DocumentId>>) -> Self {
        self.links = Some(update);
        self
    }

    pub fn document_type(mut self, update: UpdateExpression<Option<String>>) -> Self {
        self.document_type = Some(update);
        self
    }

    pub fn modified_at(mut self, update: UpdateExpression<Option<DateTime<Utc>>>) -> Self {
        self.modified_at = Some(update);
        self
    }

    pub fn apply(&self, document: &mut Document) {
        apply_optional(self.path.as_ref(), &mut document.path);
        apply_optional(self.hash.as_ref(), &mut document.hash);
        apply_optional(self.tags.as_ref(), &mut document.tags);
        dedup_tags(&mut document.tags);
        apply_optional(self.links.as_ref(), &mut document.links);
        dedup_links(&mut document.links);
        apply_optional(self.document_type.as_ref(), &mut document.document_type);
        apply_optional(self.modified_at.as_ref(), &mut document.modified_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepended_links_come_first() {
        let mut document = Document::new(1, "notes/rust.md").with_links([3, 4]);
        DocumentUpdater::new()
            .links(UpdateExpression::prepend(vec![2, 4]))
            .apply(&mut document);
        assert_eq!(document.links, vec![2, 4, 3]);
    }
}
