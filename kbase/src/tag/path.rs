//! Materialized tag paths
//!
//! In storage every tag carries its full ancestor chain, so subtree queries
//! never recurse. A [`TagRow`] is the storage-side view of a [`Tag`]:
//! `path` holds the ancestors followed by the tag's own id, `children` the
//! direct children in order. The repository persists the chain as one
//! `tag_ancestors` row per ancestor and the children as `tag_children` rows.

use thiserror::Error;

use crate::model::{Tag, TagId};

/// Structural problems in a tag's ancestor chain
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("tag {tag} references missing ancestor {ancestor}")]
    MissingAncestor { tag: TagId, ancestor: TagId },
    #[error("tag {tag} cannot be its own ancestor")]
    SelfAncestor { tag: TagId },
    #[error("tag {tag} lists ancestor {ancestor} more than once")]
    RepeatedAncestor { tag: TagId, ancestor: TagId },
}

/// Storage representation of a tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRow {
    pub id: TagId,
    pub name: String,
    /// Ancestors from the root, then the tag itself
    pub path: Vec<TagId>,
    pub children: Vec<TagId>,
}

impl TagRow {
    /// Build the storage row for `tag`, checking every ancestor with `exists`
    ///
    /// Fails on the first ancestor for which `exists` returns false.
    pub fn from_domain<F>(tag: &Tag, mut exists: F) -> Result<Self, PathError>
    where
        F: FnMut(TagId) -> bool,
    {
        let mut seen = std::collections::HashSet::with_capacity(tag.parent_path_ids.len());
        for &ancestor in &tag.parent_path_ids {
            if ancestor == tag.id {
                return Err(PathError::SelfAncestor { tag: tag.id });
            }
            if !seen.insert(ancestor) {
                return Err(PathError::RepeatedAncestor {
                    tag: tag.id,
                    ancestor,
                });
            }
            if !exists(ancestor) {
                return Err(PathError::MissingAncestor {
                    tag: tag.id,
                    ancestor,
                });
            }
        }

        let mut path = tag.parent_path_ids.clone();
        path.push(tag.id);
        Ok(Self {
            id: tag.id,
            name: tag.name.clone(),
            path,
            children: tag.subtag_ids.clone(),
        })
    }

    /// Rebuild a row from stored `(ancestor_id, depth)` pairs
    ///
    /// Depth 1 is the direct parent; pairs may arrive in any order.
    pub fn from_ancestor_rows(
        id: TagId,
        name: String,
        mut ancestors: Vec<(TagId, i64)>,
        children: Vec<TagId>,
    ) -> Self {
        ancestors.sort_by(|a, b| b.1.cmp(&a.1));
        let mut path: Vec<TagId> = ancestors.into_iter().map(|(ancestor, _)| ancestor).collect();
        path.push(id);
        Self {
            id,
            name,
            path,
            children,
        }
    }

    pub fn into_domain(mut self) -> Tag {
        self.path.pop();
        Tag {
            id: self.id,
            name: self.name,
            parent_path_ids: self.path,
            subtag_ids: self.children,
        }
    }

    /// Ancestors from the root down to the direct parent
    pub fn parent_path(&self) -> &[TagId] {
        &self.path[..self.path.len().saturating_sub(1)]
    }

    /// `(ancestor_id, depth)` pairs, depth 1 being the direct parent
    pub fn ancestor_rows(&self) -> impl Iterator<Item = (TagId, i64)> + '_ {
        let parents = self.parent_path();
        let len = parents.len();
        parents
            .iter()
            .enumerate()
            .map(move |(index, &ancestor)| (ancestor, (len - index) as i64))
    }

    /// New path of this row after `moved` gets the ancestors `new_prefix`
    ///
    /// Returns `None` when `moved` is not a strict ancestor of this tag.
    pub fn rebase(&self, moved: TagId, new_prefix: &[TagId]) -> Option<Vec<TagId>> {
        let position = self.parent_path().iter().position(|&id| id == moved)?;
        let mut path = new_prefix.to_vec();
        path.extend_from_slice(&self.path[position..]);
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn tree() -> HashMap<TagId, Tag> {
        [
            Tag::new(1, "lang").with_subtags([2, 4]),
            Tag::new(2, "lang::rust").with_parent_path([1]).with_subtags([3]),
            Tag::new(3, "lang::rust::async").with_parent_path([1, 2]),
            Tag::new(4, "lang::go").with_parent_path([1]),
        ]
        .into_iter()
        .map(|tag| (tag.id, tag))
        .collect()
    }

    #[test]
    fn test_round_trip_recovers_every_tag() {
        let tags = tree();
        for tag in tags.values() {
            let row = TagRow::from_domain(tag, |id| tags.contains_key(&id)).expect("ancestors exist");
            assert_eq!(row.path.last(), Some(&tag.id));
            assert_eq!(&row.into_domain(), tag);
        }
    }

    #[test]
    fn test_round_trip_through_ancestor_rows() {
        let tags = tree();
        let tag = &tags[&3];
        let row = TagRow::from_domain(tag, |_| true).expect("row");
        let mut stored: Vec<(TagId, i64)> = row.ancestor_rows().collect();
        assert_eq!(stored, vec![(1, 2), (2, 1)]);

        stored.reverse();
        let rebuilt = TagRow::from_ancestor_rows(3, tag.name.clone(), stored, Vec::new());
        assert_eq!(rebuilt, row);
        assert_eq!(rebuilt.into_domain(), *tag);
    }

    #[test]
    fn test_missing_ancestor_is_reported() {
        let orphan = Tag::new(9, "a::b::c").with_parent_path([1, 7]);
        let err = TagRow::from_domain(&orphan, |id| id == 1).expect_err("7 is missing");
        assert_eq!(err, PathError::MissingAncestor { tag: 9, ancestor: 7 });
    }

    #[test]
    fn test_cycles_are_rejected() {
        let selfish = Tag::new(5, "x").with_parent_path([1, 5]);
        assert_eq!(
            TagRow::from_domain(&selfish, |_| true),
            Err(PathError::SelfAncestor { tag: 5 })
        );
        let repeated = Tag::new(6, "y").with_parent_path([1, 1]);
        assert_eq!(
            TagRow::from_domain(&repeated, |_| true),
            Err(PathError::RepeatedAncestor { tag: 6, ancestor: 1 })
        );
    }

    #[test]
    fn test_rebase_moves_subtree() {
        let row = TagRow::from_domain(&tree()[&3], |_| true).expect("row");
        // lang::rust moves under a new root 10
        assert_eq!(row.rebase(2, &[10]), Some(vec![10, 2, 3]));
        // the tag itself is not a strict ancestor
        assert_eq!(row.rebase(3, &[10]), None);
        assert_eq!(row.rebase(42, &[10]), None);
    }
}
