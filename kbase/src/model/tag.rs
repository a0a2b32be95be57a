use serde::{Deserialize, Serialize};

use super::{Entity, TagId};
use crate::expression::{apply_optional, FilterExpression, UpdateExpression};

/// A node of the tag tree
///
/// `name` is the full namespaced name (`"lang::rust::async"`).
/// `parent_path_ids` lists the ancestors from the root down to the direct
/// parent and never contains `id` itself; `subtag_ids` lists the direct
/// children in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    #[serde(default)]
    pub parent_path_ids: Vec<TagId>,
    #[serde(default)]
    pub subtag_ids: Vec<TagId>,
}

impl Tag {
    /// Create a root tag without children
    pub fn new(id: TagId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            parent_path_ids: Vec::new(),
            subtag_ids: Vec::new(),
        }
    }

    pub fn with_parent_path(mut self, ancestors: impl IntoIterator<Item = TagId>) -> Self {
        self.parent_path_ids = ancestors.into_iter().collect();
        self
    }

    pub fn with_subtags(mut self, children: impl IntoIterator<Item = TagId>) -> Self {
        self.subtag_ids = children.into_iter().collect();
        self
    }

    /// Direct parent, if any
    pub fn parent_id(&self) -> Option<TagId> {
        self.parent_path_ids.last().copied()
    }

    pub fn is_root(&self) -> bool {
        self.parent_path_ids.is_empty()
    }
}

impl Entity for Tag {
    const KIND: &'static str = "Tag";

    fn id(&self) -> i64 {
        self.id
    }
}

/// Criteria selecting tags; unset fields match everything
///
/// `ancestor` and `descendant` take tag *names* and are resolved to ids
/// before the query runs. A name that matches no stored tag fails the call
/// with a missing-dependency error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagFilter {
    pub id: Option<FilterExpression<TagId>>,
    pub name: Option<FilterExpression<String>>,
    pub ancestor: Option<FilterExpression<String>>,
    pub descendant: Option<FilterExpression<String>>,
}

impl TagFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, expr: FilterExpression<TagId>) -> Self {
        self.id = Some(expr);
        self
    }

    pub fn with_name(mut self, expr: FilterExpression<String>) -> Self {
        self.name = Some(expr);
        self
    }

    /// Tags having an ancestor whose name matches
    pub fn with_ancestor(mut self, expr: FilterExpression<String>) -> Self {
        self.ancestor = Some(expr);
        self
    }

    /// Tags having a descendant whose name matches
    pub fn with_descendant(mut self, expr: FilterExpression<String>) -> Self {
        self.descendant = Some(expr);
        self
    }
}

/// Field updates applied to every selected tag
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagUpdater {
    pub name: Option<UpdateExpression<String>>,
    pub parent_path_ids: Option<UpdateExpression<Vec<TagId>>>,
    pub subtag_ids: Option<UpdateExpression<Vec<TagId>>>,
}

impl TagUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, update: UpdateExpression<String>) -> Self {
        self.name = Some(update);
        self
    }

    pub fn parent_path_ids(mut self, update: UpdateExpression<Vec<TagId>>) -> Self {
        self.parent_path_ids = Some(update);
        self
    }

    pub fn subtag_ids(mut self, update: UpdateExpression<Vec<TagId>>) -> Self {
        self.subtag_ids = Some(update);
        self
    }

    pub fn apply(&self, tag: &mut Tag) {
        apply_optional(self.name.as_ref(), &mut tag.name);
        apply_optional(self.parent_path_ids.as_ref(), &mut tag.parent_path_ids);
        apply_optional(self.subtag_ids.as_ref(), &mut tag.subtag_ids);
    }
}
