//! Document storage
//!
//! Besides tags and type, a document owns an ordered list of links to other
//! documents, stored as `document_links(source_id, target_id, position)`.
//! Backlinks are never stored; they are the incoming rows of that table.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::expression::convert_filter_ref;
use crate::model::{Document, DocumentFilter, DocumentUpdater, Entity, Tag};
use crate::storage::schema::{DOCUMENTS, DOCUMENT_LINKS, DOCUMENT_TAGS, TAGS};
use crate::storage::{QueryBuilder, Row, Session, SqlValue};

use super::error::RepositoryOperation;
use super::model::{
    decode, execute, fetch, from_millis, ids, linked_ids, push_tag_name_condition,
    push_type_name_condition, replace_links, require_ids, to_millis, type_id, type_name, Model,
};
use super::sql::SqlRepository;
use super::tag::load_tags;
use super::traits::RepositoryResult;

/// Repository of [`Document`]s
pub type DocumentRepository<B> = SqlRepository<Document, B>;

async fn write_links(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    source: i64,
    targets: &[i64],
) -> RepositoryResult<()> {
    let mut query = QueryBuilder::new(session.dialect());
    query
        .push("DELETE FROM ")
        .push_identifier(DOCUMENT_LINKS)
        .push(" WHERE source_id = ")
        .push_bind(source);
    execute(session, operation, query.build()).await?;

    let mut seen = HashSet::with_capacity(targets.len());
    let unique = targets.iter().copied().filter(|target| seen.insert(*target));
    for (position, target) in unique.enumerate() {
        let mut query = QueryBuilder::new(session.dialect());
        query
            .push("INSERT INTO ")
            .push_identifier(DOCUMENT_LINKS)
            .push(" (source_id, target_id, position) VALUES (")
            .push_bind_list([source, target, position as i64])
            .push(")");
        execute(session, operation, query.build()).await?;
    }
    Ok(())
}

async fn load_links(
    session: &mut dyn Session,
    operation: RepositoryOperation,
    source: i64,
) -> RepositoryResult<Vec<i64>> {
    let mut query = QueryBuilder::new(session.dialect());
    query
        .push("SELECT target_id FROM ")
        .push_identifier(DOCUMENT_LINKS)
        .push(" WHERE source_id = ")
        .push_bind(source)
        .push(" ORDER BY position");
    let rows = fetch(session, operation, query.build()).await?;
    ids(operation, &rows)
}

#[async_trait]
impl Model for Document {
    type Filter = DocumentFilter;
    type Updater = DocumentUpdater;

    const TABLE: &'static str = DOCUMENTS;
    const COLUMNS: &'static [&'static str] = &["id", "path", "hash", "type_id", "modified_at"];

    async fn to_row(
        &self,
        session: &mut dyn Session,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Vec<SqlValue>> {
        let type_id = match &self.document_type {
            Some(name) => Some(type_id(session, operation, name).await?),
            None => None,
        };
        Ok(vec![
            SqlValue::from(self.id),
            SqlValue::from(&self.path),
            SqlValue::from(&self.hash),
            SqlValue::from(type_id),
            SqlValue::from(self.modified_at.as_ref().map(to_millis)),
        ])
    }

    async fn write_relations(
        &self,
        session: &mut dyn Session,
        operation: RepositoryOperation,
    ) -> RepositoryResult<()> {
        let mut tag_ids = self.tag_ids();
        tag_ids.sort_unstable();
        tag_ids.dedup();
        require_ids(session, operation, TAGS, Tag::KIND, &tag_ids).await?;
        require_ids(session, operation, DOCUMENTS, Document::KIND, &self.links).await?;

        replace_links(session, operation, DOCUMENT_TAGS, "document_id", "tag_id", self.id, &tag_ids).await?;
        write_links(session, operation, self.id, &self.links).await
    }

    /// Removes tag rows and links in both directions
    async fn delete_relations(
        id: i64,
        session: &mut dyn Session,
        operation: RepositoryOperation,
    ) -> RepositoryResult<()> {
        replace_links(session, operation, DOCUMENT_TAGS, "document_id", "tag_id", id, &[]).await?;
        for column in ["source_id", "target_id"] {
            let mut query = QueryBuilder::new(session.dialect());
            query
                .push("DELETE FROM ")
                .push_identifier(DOCUMENT_LINKS)
                .push(" WHERE ")
                .push(column)
                .push(" = ")
                .push_bind(id);
            execute(session, operation, query.build()).await?;
        }
        Ok(())
    }

    async fn from_row(
        row: Row,
        session: &mut dyn Session,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Self> {
        let id = decode(operation, row.get_i64(0))?;
        let document_type = match decode(operation, row.get_opt_i64(3))? {
            Some(type_id) => Some(type_name(session, operation, type_id).await?),
            None => None,
        };
        let modified_at = match decode(operation, row.get_opt_i64(4))? {
            Some(millis) => Some(from_millis(operation, millis)?),
            None => None,
        };
        let tag_ids = linked_ids(session, operation, DOCUMENT_TAGS, "document_id", "tag_id", id).await?;

        Ok(Document {
            id,
            path: decode(operation, row.get_string(1))?,
            hash: decode(operation, row.get_string(2))?,
            tags: load_tags(session, operation, &tag_ids).await?,
            links: load_links(session, operation, id).await?,
            document_type,
            modified_at,
        })
    }

    async fn push_filter(
        filter: &DocumentFilter,
        _session: &mut dyn Session,
        query: &mut QueryBuilder,
        _operation: RepositoryOperation,
    ) -> RepositoryResult<()> {
        if let Some(expression) = &filter.id {
            query.push_condition().push_filter("id", expression);
        }
        if let Some(expression) = &filter.path {
            query.push_condition().push_filter("path", expression);
        }
        if let Some(expression) = &filter.hash {
            query.push_condition().push_filter("hash", expression);
        }
        if let Some(expression) = &filter.tags {
            push_tag_name_condition(query, DOCUMENT_TAGS, "document_id", expression);
        }
        if let Some(expression) = &filter.links {
            query
                .push_condition()
                .push("id IN (SELECT source_id FROM ")
                .push_identifier(DOCUMENT_LINKS)
                .push(" WHERE ")
                .push_filter("target_id", expression)
                .push(")");
        }
        if let Some(expression) = &filter.backlinks {
            query
                .push_condition()
                .push("id IN (SELECT target_id FROM ")
                .push_identifier(DOCUMENT_LINKS)
                .push(" WHERE ")
                .push_filter("source_id", expression)
                .push(")");
        }
        if let Some(expression) = &filter.document_type {
            push_type_name_condition(query, expression);
        }
        if let Some(expression) = &filter.modified_at {
            let millis = convert_filter_ref(expression, |timestamp| {
                Ok::<_, std::convert::Infallible>(to_millis(timestamp))
            })
            .unwrap_or_else(|never| match never {});
            query.push_condition().push_filter("modified_at", &millis);
        }
        Ok(())
    }

    fn apply_updater(&mut self, updater: &DocumentUpdater) {
        updater.apply(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use crate::config::RepositoryConfig;
    use crate::expression::{FilterExpression, UpdateExpression};
    use crate::repository::{
        CallContext, Repository, RepositoryErrorKind, TagRepository, TypeRepository,
    };
    use crate::storage::{schema, LibsqlBackend};

    async fn repository() -> DocumentRepository<LibsqlBackend> {
        let backend = Arc::new(LibsqlBackend::memory().await.expect("open in-memory database"));
        schema::migrate(backend.as_ref()).await.expect("migrate");
        let config = RepositoryConfig::default();
        let ctx = CallContext::new();
        TypeRepository::new(Arc::clone(&backend), config.clone())
            .add_types(&ctx, ["Note"])
            .await
            .expect("add types");
        TagRepository::new(Arc::clone(&backend), config.clone())
            .add(&ctx, [Tag::new(1, "project"), Tag::new(2, "draft")])
            .await
            .expect("add tags");
        DocumentRepository::new(backend, config)
    }

    fn notes() -> Vec<Document> {
        let modified = Utc.timestamp_millis_opt(1_650_000_000_000).single().expect("valid");
        vec![
            Document::new(1, "notes/index.md")
                .with_hash("a1")
                .with_tags([Tag::new(1, "project")])
                .with_links([3, 2])
                .with_type("Note")
                .with_modified_at(modified),
            Document::new(2, "notes/design.md")
                .with_hash("b2")
                .with_tags([Tag::new(1, "project"), Tag::new(2, "draft")])
                .with_links([1]),
            Document::new(3, "notes/todo.md").with_hash("c3"),
        ]
    }

    fn ids_of(documents: &[Document]) -> Vec<i64> {
        documents.iter().map(|document| document.id).collect()
    }

    #[tokio::test]
    async fn test_mutual_links_in_one_batch() {
        let repo = repository().await;
        let ctx = CallContext::new();
        repo.add(&ctx, notes()).await.expect("add");

        let stored = repo.get_all(&ctx).await.expect("get");
        assert_eq!(stored, notes());
        assert_eq!(stored[0].links, vec![3, 2]);
    }

    #[tokio::test]
    async fn test_link_to_missing_document() {
        let repo = repository().await;
        let ctx = CallContext::new();
        let orphan = Document::new(5, "orphan.md").with_links([404]);
        let err = repo.add(&ctx, [orphan]).await.expect_err("missing target");
        assert_eq!(err.kind, RepositoryErrorKind::ReferenceToNonExistentDependency);
        assert_eq!(err.entity_type.as_deref(), Some("Document"));
        assert_eq!(err.entity_id.as_deref(), Some("404"));
    }

    #[tokio::test]
    async fn test_links_and_backlinks_filters() {
        let repo = repository().await;
        let ctx = CallContext::new();
        repo.add(&ctx, notes()).await.expect("add");

        let backlinks_of_1 = DocumentFilter::new().with_links(FilterExpression::eq(1));
        assert_eq!(ids_of(&repo.get_where(&ctx, &backlinks_of_1).await.expect("query")), vec![2]);

        let linked_from_1 = DocumentFilter::new().with_backlinks(FilterExpression::eq(1));
        assert_eq!(ids_of(&repo.get_where(&ctx, &linked_from_1).await.expect("query")), vec![2, 3]);

        let drafts = DocumentFilter::new()
            .with_tags(FilterExpression::eq("draft".to_string()))
            .with_path(FilterExpression::like("notes/%".to_string()));
        assert_eq!(ids_of(&repo.get_where(&ctx, &drafts).await.expect("query")), vec![2]);

        let typed = DocumentFilter::new().with_type(FilterExpression::eq("Note".to_string()));
        assert_eq!(repo.count_where(&ctx, &typed).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_incoming_links() {
        let repo = repository().await;
        let ctx = CallContext::new();
        repo.add(&ctx, notes()).await.expect("add");

        let todo = DocumentFilter::new().with_path(FilterExpression::eq("notes/todo.md".to_string()));
        assert_eq!(repo.delete_where(&ctx, &todo).await.expect("delete"), 1);

        let index = repo
            .get_first_where(&ctx, &DocumentFilter::new().with_id(FilterExpression::eq(1)))
            .await
            .expect("query")
            .expect("index exists");
        assert_eq!(index.links, vec![2]);
    }

    #[tokio::test]
    async fn test_update_links() {
        let repo = repository().await;
        let ctx = CallContext::new();
        repo.add(&ctx, notes()).await.expect("add");

        let updater = DocumentUpdater::new().links(UpdateExpression::append(vec![3]));
        let with_draft = DocumentFilter::new().with_tags(FilterExpression::eq("draft".to_string()));
        assert_eq!(repo.update_where(&ctx, &with_draft, &updater).await.expect("update"), 1);

        let design = repo
            .get_first_where(&ctx, &DocumentFilter::new().with_id(FilterExpression::eq(2)))
            .await
            .expect("query")
            .expect("design exists");
        assert_eq!(design.links, vec![1, 3]);
    }
}
