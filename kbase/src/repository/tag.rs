//! Tag storage
//!
//! Tags live in `tags(id, name)`. The ancestor chain of every tag is kept in
//! the closure table `tag_ancestors(tag_id, ancestor_id, depth)` and the
//! ordered direct children in `tag_children(tag_id, child_id, position)`.
//!
//! Changing a tag's `parent_path_ids` moves its whole subtree: the tag leaves
//! its old parent's child list for the end of the new parent's, and the
//! ancestor rows of every descendant are rebased onto the new chain.
//! Renaming a tag rewrites the matching name prefix of its descendants.
//! Deleting a tag splices it out of the tree; its children move up to its
//! parent.

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use tracing::debug;

use crate::expression::FilterExpression;
use crate::model::{Entity, Tag, TagFilter, TagId, TagUpdater};
use crate::storage::schema::{BOOKMARK_TAGS, DOCUMENT_TAGS, TAGS, TAG_ANCESTORS, TAG_CHILDREN};
use crate::storage::{Backend, QueryBuilder, Row, Session, SqlValue};
use crate::tag::{AmbiguityResolver, PathError, TagRow};

use super::context::{supervise, CallContext};
use super::error::{RepositoryError, RepositoryOperation};
use super::model::{decode, execute, existing_ids, fetch, ids, require_ids, Model};
use super::sql::SqlRepository;
use super::traits::{Repository, RepositoryResult};

/// Repository of [`Tag`]s
pub type TagRepository<B> = SqlRepository<Tag, B>;

fn path_error(operation: RepositoryOperation, error: PathError) -> RepositoryError {
    match error {
        PathError::MissingAncestor { ancestor, .. } => {
            RepositoryError::missing_dependency(operation, Tag::KIND, ancestor.to_string())
        }
        PathError::SelfAncestor { tag } | PathError::RepeatedAncestor { tag, .. } => {
            RepositoryError::validation_failed(operation, error.to_string())
                .with_entity(Tag::KIND, tag.to_string())
        }
    }
}

/// `(ancestor_id, depth)` rows of `tag`
async fn ancestor_rows(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    tag: TagId,
) -> RepositoryResult<Vec<(TagId, i64)>> {
    let mut query = QueryBuilder::new(session.dialect());
    query
        .push("SELECT ancestor_id, depth FROM ")
        .push_identifier(TAG_ANCESTORS)
        .push(" WHERE tag_id = ")
        .push_bind(tag);
    let rows = fetch(session, operation, query.build()).await?;
    rows.iter()
        .map(|row| Ok((decode(operation, row.get_i64(0))?, decode(operation, row.get_i64(1))?)))
        .collect()
}

async fn children_of(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    tag: TagId,
) -> RepositoryResult<Vec<TagId>> {
    let mut query = QueryBuilder::new(session.dialect());
    query
        .push("SELECT child_id FROM ")
        .push_identifier(TAG_CHILDREN)
        .push(" WHERE tag_id = ")
        .push_bind(tag)
        .push(" ORDER BY position");
    let rows = fetch(session, operation, query.build()).await?;
    ids(operation, &rows)
}

/// Every tag that has `tag` in its ancestor chain
async fn descendants_of(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    tag: TagId,
) -> RepositoryResult<Vec<TagId>> {
    let mut query = QueryBuilder::new(session.dialect());
    query
        .push("SELECT tag_id FROM ")
        .push_identifier(TAG_ANCESTORS)
        .push(" WHERE ancestor_id = ")
        .push_bind(tag)
        .push(" ORDER BY tag_id");
    let rows = fetch(session, operation, query.build()).await?;
    ids(operation, &rows)
}

async fn delete_rows(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    table: &str,
    column: &str,
    id: i64,
) -> RepositoryResult<u64> {
    let mut query = QueryBuilder::new(session.dialect());
    query
        .push("DELETE FROM ")
        .push_identifier(table)
        .push(" WHERE ")
        .push(column)
        .push(" = ")
        .push_bind(id);
    execute(session, operation, query.build()).await
}

/// Replace the closure rows of `row.id` with those of `row.path`
async fn write_ancestors(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    row: &TagRow,
) -> RepositoryResult<()> {
    delete_rows(session, operation, TAG_ANCESTORS, "tag_id", row.id).await?;
    for (ancestor, depth) in row.ancestor_rows() {
        let mut query = QueryBuilder::new(session.dialect());
        query
            .push("INSERT INTO ")
            .push_identifier(TAG_ANCESTORS)
            .push(" (tag_id, ancestor_id, depth) VALUES (")
            .push_bind_list([row.id, ancestor, depth])
            .push(")");
        execute(session, operation, query.build()).await?;
    }
    Ok(())
}

/// Position after the last child of `parent`
async fn next_position(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    parent: TagId,
) -> RepositoryResult<i64> {
    let mut query = QueryBuilder::new(session.dialect());
    query
        .push("SELECT MAX(position) FROM ")
        .push_identifier(TAG_CHILDREN)
        .push(" WHERE tag_id = ")
        .push_bind(parent);
    let rows = fetch(session, operation, query.build()).await?;
    match rows.first() {
        Some(row) => Ok(decode(operation, row.get_opt_i64(0))?.map_or(0, |max| max + 1)),
        None => Ok(0),
    }
}

async fn append_child(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    parent: TagId,
    child: TagId,
    position: i64,
) -> RepositoryResult<()> {
    let mut query = QueryBuilder::new(session.dialect());
    query
        .push("INSERT INTO ")
        .push_identifier(TAG_CHILDREN)
        .push(" (tag_id, child_id, position) VALUES (")
        .push_bind_list([parent, child, position])
        .push(")");
    execute(session, operation, query.build()).await?;
    Ok(())
}

async fn write_children(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    tag: TagId,
    children: &[TagId],
) -> RepositoryResult<()> {
    delete_rows(session, operation, TAG_CHILDREN, "tag_id", tag).await?;
    for (position, &child) in children.iter().enumerate() {
        append_child(session, operation, tag, child, position as i64).await?;
    }
    Ok(())
}

/// Rewrite the chains of `descendants` after `moved` got `new_prefix`
async fn rebase_descendants(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    moved: TagId,
    new_prefix: &[TagId],
    descendants: &[TagId],
) -> RepositoryResult<()> {
    for &descendant in descendants {
        let stored = ancestor_rows(session, operation, descendant).await?;
        let row = TagRow::from_ancestor_rows(descendant, String::new(), stored, Vec::new());
        if let Some(path) = row.rebase(moved, new_prefix) {
            let rebased = TagRow { path, ..row };
            write_ancestors(session, operation, &rebased).await?;
        }
    }
    debug!(tag = moved, count = descendants.len(), "Subtree moved");
    Ok(())
}

/// Load the full tag `id` named `name`
async fn load_tag(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    id: TagId,
    name: String,
) -> RepositoryResult<Tag> {
    let ancestors = ancestor_rows(session, operation, id).await?;
    let children = children_of(session, operation, id).await?;
    Ok(TagRow::from_ancestor_rows(id, name, ancestors, children).into_domain())
}

/// Full tags for `tag_ids`, ordered by id
pub(crate) async fn load_tags(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    tag_ids: &[TagId],
) -> RepositoryResult<Vec<Tag>> {
    if tag_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut query = QueryBuilder::new(session.dialect());
    query
        .push("SELECT id, name FROM ")
        .push_identifier(TAGS)
        .push(" WHERE id IN (")
        .push_bind_list(tag_ids.iter().copied())
        .push(") ORDER BY id");
    let rows = fetch(session, operation, query.build()).await?;
    let mut tags = Vec::with_capacity(rows.len());
    for row in rows {
        let id = decode(operation, row.get_i64(0))?;
        let name = decode(operation, row.get_string(1))?;
        tags.push(load_tag(session, operation, id, name).await?);
    }
    Ok(tags)
}

/// Stored name of tag `id`, if the tag exists
async fn stored_name(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    id: TagId,
) -> RepositoryResult<Option<String>> {
    let mut query = QueryBuilder::new(session.dialect());
    query
        .push("SELECT name FROM ")
        .push_identifier(TAGS)
        .push(" WHERE id = ")
        .push_bind(id);
    let rows = fetch(session, operation, query.build()).await?;
    rows.first()
        .map(|row| decode(operation, row.get_string(0)))
        .transpose()
}

/// Move `tag` from the child list of `from` to the end of `to`'s
async fn reparent(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    tag: TagId,
    from: Option<TagId>,
    to: Option<TagId>,
) -> RepositoryResult<()> {
    if let Some(from) = from {
        let mut query = QueryBuilder::new(session.dialect());
        query
            .push("DELETE FROM ")
            .push_identifier(TAG_CHILDREN)
            .push(" WHERE tag_id = ")
            .push_bind(from)
            .push(" AND child_id = ")
            .push_bind(tag);
        execute(session, operation, query.build()).await?;
    }
    if let Some(to) = to {
        if !children_of(session, operation, to).await?.contains(&tag) {
            let position = next_position(session, operation, to).await?;
            append_child(session, operation, to, tag, position).await?;
        }
    }
    Ok(())
}

/// Swap the `old` name prefix of every descendant of `tag` for `new`
async fn rename_descendants(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    tag: TagId,
    old: &str,
    new: &str,
) -> RepositoryResult<()> {
    let mut query = QueryBuilder::new(session.dialect());
    query
        .push("SELECT t.id, t.name FROM ")
        .push_identifier(TAGS)
        .push(" t JOIN ")
        .push_identifier(TAG_ANCESTORS)
        .push(" a ON a.tag_id = t.id WHERE a.ancestor_id = ")
        .push_bind(tag)
        .push(" ORDER BY t.id");
    let rows = fetch(session, operation, query.build()).await?;
    let mut renamed = 0;
    for row in &rows {
        let id = decode(operation, row.get_i64(0))?;
        let name = decode(operation, row.get_string(1))?;
        let Some(rest) = name.strip_prefix(old) else {
            continue;
        };
        let mut update = QueryBuilder::new(session.dialect());
        update
            .push("UPDATE ")
            .push_identifier(TAGS)
            .push(" SET name = ")
            .push_bind(format!("{new}{rest}"))
            .push(" WHERE id = ")
            .push_bind(id);
        execute(session, operation, update.build())
            .await
            .map_err(|e| e.with_entity(Tag::KIND, id.to_string()))?;
        renamed += 1;
    }
    debug!(tag, renamed, "Descendants renamed");
    Ok(())
}

/// `id IN (tags related through the closure table to a tag whose name matches)`
///
/// `own` is the closure column of the filtered tag, `other` that of the
/// tag matched by name.
fn push_relative_condition(
    query: &mut QueryBuilder,
    own: &str,
    other: &str,
    expression: &FilterExpression<String>,
) {
    query
        .push_condition()
        .push("id IN (SELECT a.")
        .push(own)
        .push(" FROM ")
        .push_identifier(TAG_ANCESTORS)
        .push(" a JOIN ")
        .push_identifier(TAGS)
        .push(" t ON t.id = a.")
        .push(other)
        .push(" WHERE ");
    query.push_filter("t.name", expression).push(")");
}

#[async_trait]
impl Model for Tag {
    type Filter = TagFilter;
    type Updater = TagUpdater;

    const TABLE: &'static str = TAGS;
    const COLUMNS: &'static [&'static str] = &["id", "name"];

    async fn to_row(
        &self,
        _session: &mut dyn Session,
        _operation: RepositoryOperation,
    ) -> RepositoryResult<Vec<SqlValue>> {
        Ok(vec![SqlValue::from(self.id), SqlValue::from(&self.name)])
    }

    async fn before_overwrite(
        &self,
        session: &mut dyn Session,
        operation: RepositoryOperation,
    ) -> RepositoryResult<()> {
        let Some(previous_name) = stored_name(session, operation, self.id).await? else {
            return Ok(());
        };
        let mut previous = ancestor_rows(session, operation, self.id).await?;
        previous.sort_by(|a, b| b.1.cmp(&a.1));
        let moved = previous
            .iter()
            .map(|(ancestor, _)| *ancestor)
            .ne(self.parent_path_ids.iter().copied());
        let from = previous
            .iter()
            .find(|(_, depth)| *depth == 1)
            .map(|(ancestor, _)| *ancestor);
        let to = self.parent_path_ids.last().copied();
        if moved && from != to {
            reparent(session, operation, self.id, from, to).await?;
        }
        if previous_name != self.name {
            rename_descendants(session, operation, self.id, &previous_name, &self.name).await?;
        }
        Ok(())
    }

    async fn write_relations(
        &self,
        session: &mut dyn Session,
        operation: RepositoryOperation,
    ) -> RepositoryResult<()> {
        let known = existing_ids(session, operation, TAGS, &self.parent_path_ids).await?;
        let row = TagRow::from_domain(self, |id| known.contains(&id))
            .map_err(|e| path_error(operation, e))?;

        let descendants = descendants_of(session, operation, self.id).await?;
        let below: HashSet<TagId> = descendants.iter().copied().collect();
        if let Some(descendant) = row.parent_path().iter().find(|id| below.contains(id)) {
            return Err(RepositoryError::validation_failed(
                operation,
                format!("tag {} cannot move below its descendant {}", self.id, descendant),
            )
            .with_entity(Tag::KIND, self.id.to_string()));
        }
        require_ids(session, operation, TAGS, Tag::KIND, &self.subtag_ids).await?;

        let mut previous = ancestor_rows(session, operation, self.id).await?;
        previous.sort_by(|a, b| b.1.cmp(&a.1));
        let moved = previous
            .iter()
            .map(|(ancestor, _)| *ancestor)
            .ne(row.parent_path().iter().copied());

        write_ancestors(session, operation, &row).await?;
        write_children(session, operation, self.id, &self.subtag_ids).await?;
        if moved && !descendants.is_empty() {
            rebase_descendants(session, operation, self.id, row.parent_path(), &descendants).await?;
        }
        Ok(())
    }

    async fn delete_relations(
        id: i64,
        session: &mut dyn Session,
        operation: RepositoryOperation,
    ) -> RepositoryResult<()> {
        let parent = ancestor_rows(session, operation, id)
            .await?
            .into_iter()
            .find(|(_, depth)| *depth == 1)
            .map(|(ancestor, _)| ancestor);
        let children = children_of(session, operation, id).await?;

        // drop the tag from every descendant's chain; depths above it shrink
        for descendant in descendants_of(session, operation, id).await? {
            let stored = ancestor_rows(session, operation, descendant).await?;
            let mut row = TagRow::from_ancestor_rows(descendant, String::new(), stored, Vec::new());
            row.path.retain(|&ancestor| ancestor != id);
            write_ancestors(session, operation, &row).await?;
        }

        delete_rows(session, operation, TAG_ANCESTORS, "tag_id", id).await?;
        delete_rows(session, operation, TAG_CHILDREN, "tag_id", id).await?;
        delete_rows(session, operation, TAG_CHILDREN, "child_id", id).await?;

        if let Some(parent) = parent {
            let mut position = next_position(session, operation, parent).await?;
            for child in children {
                append_child(session, operation, parent, child, position).await?;
                position += 1;
            }
        }

        delete_rows(session, operation, BOOKMARK_TAGS, "tag_id", id).await?;
        delete_rows(session, operation, DOCUMENT_TAGS, "tag_id", id).await?;
        Ok(())
    }

    async fn from_row(
        row: Row,
        session: &mut dyn Session,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Self> {
        let id = decode(operation, row.get_i64(0))?;
        let name = decode(operation, row.get_string(1))?;
        load_tag(session, operation, id, name).await
    }

    async fn push_filter(
        filter: &TagFilter,
        _session: &mut dyn Session,
        query: &mut QueryBuilder,
        _operation: RepositoryOperation,
    ) -> RepositoryResult<()> {
        if let Some(expression) = &filter.id {
            query.push_condition().push_filter("id", expression);
        }
        if let Some(expression) = &filter.name {
            query.push_condition().push_filter("name", expression);
        }
        if let Some(expression) = &filter.ancestor {
            push_relative_condition(query, "tag_id", "ancestor_id", expression);
        }
        if let Some(expression) = &filter.descendant {
            push_relative_condition(query, "ancestor_id", "tag_id", expression);
        }
        Ok(())
    }

    fn apply_updater(&mut self, updater: &Self::Updater) {
        updater.apply(self);
    }
}

impl<B: Backend> SqlRepository<Tag, B> {
    /// Separator between the components of stored tag names
    pub fn separator(&self) -> &str {
        &self.config().tag_separator
    }

    /// Tag called exactly `name`
    pub async fn get_by_name(&self, ctx: &CallContext, name: &str) -> RepositoryResult<Option<Tag>> {
        let filter = TagFilter::new().with_name(FilterExpression::eq(name.to_string()));
        self.get_first_where(ctx, &filter).await
    }

    async fn stored_names(&self, ctx: &CallContext) -> RepositoryResult<Vec<String>> {
        let operation = RepositoryOperation::ResolveTags;
        let mut tx = self.begin(ctx, operation).await?;
        let work = async {
            let mut query = QueryBuilder::new(tx.dialect());
            query
                .push("SELECT name FROM ")
                .push_identifier(TAGS)
                .push(" ORDER BY id");
            let rows = fetch(&mut tx, operation, query.build()).await?;
            rows.iter()
                .map(|row| decode(operation, row.get_string(0)))
                .collect::<RepositoryResult<Vec<_>>>()
        };
        let outcome = supervise(ctx, self.timeout(), operation, work).await;
        self.settle(ctx, operation, tx, outcome).await
    }

    /// Whether another stored tag ends with the same component as `tag`
    pub async fn is_leaf_ambiguous(&self, ctx: &CallContext, tag: &Tag) -> RepositoryResult<bool> {
        let names = self.stored_names(ctx).await?;
        let resolver = AmbiguityResolver::new(names.iter().map(String::as_str), self.separator());
        Ok(resolver.is_leaf_ambiguous(&tag.name))
    }

    /// Lowest component index at which `tag` differs from a colliding tag
    pub async fn find_ambiguous_component(
        &self,
        ctx: &CallContext,
        tag: &Tag,
    ) -> RepositoryResult<Option<(usize, String)>> {
        let names = self.stored_names(ctx).await?;
        let resolver = AmbiguityResolver::new(names.iter().map(String::as_str), self.separator());
        Ok(resolver.find_ambiguous_component(&tag.name))
    }

    /// Shortest trailing suffix of `tag` that no other stored tag ends with
    pub async fn shorten_tag(&self, ctx: &CallContext, tag: &Tag) -> RepositoryResult<String> {
        let names = self.stored_names(ctx).await?;
        let resolver = AmbiguityResolver::new(names.iter().map(String::as_str), self.separator());
        Ok(resolver.shorten_tag(&tag.name))
    }

    /// Shortened form of every stored tag
    pub async fn list_tags_shortened(&self, ctx: &CallContext) -> RepositoryResult<BTreeSet<String>> {
        let names = self.stored_names(ctx).await?;
        let resolver = AmbiguityResolver::new(names.iter().map(String::as_str), self.separator());
        Ok(resolver.list_tags_shortened())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::RepositoryConfig;
    use crate::expression::UpdateExpression;
    use crate::repository::RepositoryErrorKind;
    use crate::storage::{schema, LibsqlBackend};

    async fn repository() -> TagRepository<LibsqlBackend> {
        let backend = LibsqlBackend::memory().await.expect("open in-memory database");
        schema::migrate(&backend).await.expect("migrate");
        SqlRepository::new(Arc::new(backend), RepositoryConfig::default())
    }

    fn tree() -> Vec<Tag> {
        vec![
            Tag::new(1, "lang").with_subtags([2, 4]),
            Tag::new(2, "lang::rust").with_parent_path([1]).with_subtags([3]),
            Tag::new(3, "lang::rust::async").with_parent_path([1, 2]),
            Tag::new(4, "lang::go").with_parent_path([1]),
        ]
    }

    async fn get(repo: &TagRepository<LibsqlBackend>, id: TagId) -> Tag {
        let filter = TagFilter::new().with_id(FilterExpression::eq(id));
        repo.get_first_where(&CallContext::new(), &filter)
            .await
            .expect("query")
            .expect("tag exists")
    }

    #[tokio::test]
    async fn test_tree_round_trip() {
        let repo = repository().await;
        let ctx = CallContext::new();
        repo.add(&ctx, tree()).await.expect("add tree");

        assert_eq!(repo.get_all(&ctx).await.expect("get all"), tree());
        assert_eq!(repo.count_all(&ctx).await.expect("count"), 4);
    }

    #[tokio::test]
    async fn test_missing_parent_is_a_missing_dependency() {
        let repo = repository().await;
        let ctx = CallContext::new();
        let err = repo
            .add(&ctx, [Tag::new(2, "a::b").with_parent_path([99])])
            .await
            .expect_err("parent 99 does not exist");
        assert_eq!(err.kind, RepositoryErrorKind::ReferenceToNonExistentDependency);
        assert_eq!(err.entity_id.as_deref(), Some("99"));
        assert_eq!(repo.count_all(&ctx).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn test_move_rewrites_descendants() {
        let repo = repository().await;
        let ctx = CallContext::new();
        repo.add(&ctx, tree()).await.expect("add tree");
        repo.add(&ctx, [Tag::new(5, "tools")]).await.expect("add root");

        let moved = Tag::new(2, "tools::rust").with_parent_path([5]).with_subtags([3]);
        repo.replace(&ctx, [moved.clone()]).await.expect("move subtree");

        assert_eq!(get(&repo, 2).await, moved);
        assert_eq!(
            get(&repo, 3).await,
            Tag::new(3, "tools::rust::async").with_parent_path([5, 2])
        );
        assert_eq!(get(&repo, 4).await.parent_path_ids, vec![1]);
        assert_eq!(get(&repo, 1).await.subtag_ids, vec![4]);
        assert_eq!(get(&repo, 5).await.subtag_ids, vec![2]);
    }

    #[tokio::test]
    async fn test_move_to_root_leaves_old_parent() {
        let repo = repository().await;
        let ctx = CallContext::new();
        repo.add(&ctx, tree()).await.expect("add tree");

        let updater = TagUpdater::new().parent_path_ids(UpdateExpression::clear());
        repo.update(&ctx, [Tag::new(4, "lang::go")], &updater)
            .await
            .expect("move to root");

        assert!(get(&repo, 4).await.parent_path_ids.is_empty());
        assert_eq!(get(&repo, 1).await.subtag_ids, vec![2]);
    }

    #[tokio::test]
    async fn test_rename_rewrites_descendant_names() {
        let repo = repository().await;
        let ctx = CallContext::new();
        repo.add(&ctx, tree()).await.expect("add tree");
        repo.add(&ctx, [Tag::new(5, "langs")]).await.expect("add lookalike");

        repo.replace(&ctx, [Tag::new(1, "code").with_subtags([2, 4])])
            .await
            .expect("rename");

        let names: Vec<String> = repo
            .get_all(&ctx)
            .await
            .expect("get all")
            .into_iter()
            .map(|tag| tag.name)
            .collect();
        assert_eq!(
            names,
            vec!["code", "code::rust", "code::rust::async", "code::go", "langs"]
        );
        assert_eq!(get(&repo, 3).await.parent_path_ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_rename_onto_existing_name_rolls_back() {
        let repo = repository().await;
        let ctx = CallContext::new();
        repo.add(&ctx, tree()).await.expect("add tree");
        repo.add(&ctx, [Tag::new(5, "code::go")]).await.expect("add clash");

        let err = repo
            .replace(&ctx, [Tag::new(1, "code").with_subtags([2, 4])])
            .await
            .expect_err("descendant name clash");
        assert_eq!(err.kind, RepositoryErrorKind::DuplicateInsertion);
        assert_eq!(get(&repo, 4).await.name, "lang::go");
        assert_eq!(get(&repo, 1).await.name, "lang");
    }

    #[tokio::test]
    async fn test_move_below_descendant_is_rejected() {
        let repo = repository().await;
        let ctx = CallContext::new();
        repo.add(&ctx, tree()).await.expect("add tree");

        let err = repo
            .replace(&ctx, [Tag::new(1, "lang").with_parent_path([2])])
            .await
            .expect_err("cycle");
        assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
        assert_eq!(get(&repo, 1).await, tree()[0]);
    }

    #[tokio::test]
    async fn test_self_ancestor_is_rejected() {
        let repo = repository().await;
        let ctx = CallContext::new();
        let err = repo
            .add(&ctx, [Tag::new(1, "loop").with_parent_path([1])])
            .await
            .expect_err("self ancestor");
        assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
        assert_eq!(err.entity_id.as_deref(), Some("1"));
    }

    async fn ids_where(repo: &TagRepository<LibsqlBackend>, filter: &TagFilter) -> Vec<TagId> {
        repo.get_where(&CallContext::new(), filter)
            .await
            .expect("query")
            .iter()
            .map(|tag| tag.id)
            .collect()
    }

    #[tokio::test]
    async fn test_ancestor_and_descendant_filters() {
        let repo = repository().await;
        let ctx = CallContext::new();
        repo.add(&ctx, tree()).await.expect("add tree");

        let below_lang = TagFilter::new().with_ancestor(FilterExpression::eq("lang".to_string()));
        assert_eq!(ids_where(&repo, &below_lang).await, vec![2, 3, 4]);

        let above_async = TagFilter::new()
            .with_descendant(FilterExpression::eq("lang::rust::async".to_string()));
        assert_eq!(repo.count_where(&ctx, &above_async).await.expect("count"), 2);

        let unknown = TagFilter::new().with_ancestor(FilterExpression::eq("nope".to_string()));
        assert!(ids_where(&repo, &unknown).await.is_empty());
    }

    #[tokio::test]
    async fn test_relative_filters_match_names_by_pattern_and_range() {
        let repo = repository().await;
        repo.add(&CallContext::new(), tree()).await.expect("add tree");

        let below_rust = TagFilter::new().with_ancestor(FilterExpression::like("lang::r%".to_string()));
        assert_eq!(ids_where(&repo, &below_rust).await, vec![3]);

        let below_any = TagFilter::new().with_ancestor(FilterExpression::like("la%".to_string()));
        assert_eq!(ids_where(&repo, &below_any).await, vec![2, 3, 4]);

        // only "lang" sorts inside the range
        let below_range = TagFilter::new().with_ancestor(FilterExpression::between(
            "lang".to_string(),
            "lang::a".to_string(),
        ));
        assert_eq!(ids_where(&repo, &below_range).await, vec![2, 3, 4]);

        let above_go = TagFilter::new().with_descendant(FilterExpression::like("%::go".to_string()));
        assert_eq!(ids_where(&repo, &above_go).await, vec![1]);

        let above_rust = TagFilter::new().with_descendant(FilterExpression::between(
            "lang::r".to_string(),
            "lang::s".to_string(),
        ));
        assert_eq!(ids_where(&repo, &above_rust).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_delete_splices_children_into_parent() {
        let repo = repository().await;
        let ctx = CallContext::new();
        repo.add(&ctx, tree()).await.expect("add tree");

        repo.delete(&ctx, [Tag::new(2, "lang::rust")]).await.expect("delete");

        assert_eq!(get(&repo, 3).await.parent_path_ids, vec![1]);
        assert_eq!(get(&repo, 1).await.subtag_ids, vec![4, 3]);
        assert_eq!(repo.count_all(&ctx).await.expect("count"), 3);
    }

    #[tokio::test]
    async fn test_ambiguity_over_stored_names() {
        let repo = repository().await;
        let ctx = CallContext::new();
        repo.add(
            &ctx,
            [
                Tag::new(1, "lang::rust::async"),
                Tag::new(2, "net::async"),
                Tag::new(3, "lang::go"),
            ],
        )
        .await
        .expect("add");

        let rust_async = get(&repo, 1).await;
        assert!(repo.is_leaf_ambiguous(&ctx, &rust_async).await.expect("check"));
        assert_eq!(
            repo.shorten_tag(&ctx, &rust_async).await.expect("shorten"),
            "rust::async"
        );
        assert!(!repo
            .is_leaf_ambiguous(&ctx, &get(&repo, 3).await)
            .await
            .expect("check"));

        let shortened = repo.list_tags_shortened(&ctx).await.expect("list");
        assert!(shortened.contains("go"));
        assert!(shortened.contains("rust::async"));
        assert!(shortened.contains("net::async"));

        let by_name = repo.get_by_name(&ctx, "lang::go").await.expect("query");
        assert_eq!(by_name.map(|tag| tag.id), Some(3));
    }
}
