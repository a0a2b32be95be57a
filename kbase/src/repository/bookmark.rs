//! Bookmark storage
//!
//! Base rows live in `bookmarks`; tag membership in `bookmark_tags`. The
//! type is stored as a `types` id and resolved by name on every write.

use async_trait::async_trait;

use crate::expression::convert_filter_ref;
use crate::model::{Bookmark, BookmarkFilter, BookmarkUpdater, Entity, Tag};
use crate::storage::schema::{BOOKMARKS, BOOKMARK_TAGS, TAGS};
use crate::storage::{QueryBuilder, Row, Session, SqlValue};

use super::error::RepositoryOperation;
use super::model::{
    decode, from_millis, linked_ids, push_tag_name_condition, push_type_name_condition,
    replace_links, require_ids, to_millis, type_id, type_name, Model,
};
use super::sql::SqlRepository;
use super::tag::load_tags;
use super::traits::RepositoryResult;

/// Repository of [`Bookmark`]s
pub type BookmarkRepository<B> = SqlRepository<Bookmark, B>;

fn unique_tag_ids(tags: &[Tag]) -> Vec<i64> {
    let mut ids: Vec<i64> = tags.iter().map(|tag| tag.id).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

#[async_trait]
impl Model for Bookmark {
    type Filter = BookmarkFilter;
    type Updater = BookmarkUpdater;

    const TABLE: &'static str = BOOKMARKS;
    const COLUMNS: &'static [&'static str] = &["id", "url", "title", "type_id", "created_at"];

    async fn to_row(
        &self,
        session: &mut dyn Session,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Vec<SqlValue>> {
        let type_id = match &self.bookmark_type {
            Some(name) => Some(type_id(session, operation, name).await?),
            None => None,
        };
        Ok(vec![
            SqlValue::from(self.id),
            SqlValue::from(&self.url),
            SqlValue::from(&self.title),
            SqlValue::from(type_id),
            SqlValue::from(self.created_at.as_ref().map(to_millis)),
        ])
    }

    async fn write_relations(
        &self,
        session: &mut dyn Session,
        operation: RepositoryOperation,
    ) -> RepositoryResult<()> {
        let tag_ids = unique_tag_ids(&self.tags);
        require_ids(session, operation, TAGS, Tag::KIND, &tag_ids).await?;
        replace_links(session, operation, BOOKMARK_TAGS, "bookmark_id", "tag_id", self.id, &tag_ids).await
    }

    async fn delete_relations(
        id: i64,
        session: &mut dyn Session,
        operation: RepositoryOperation,
    ) -> RepositoryResult<()> {
        replace_links(session, operation, BOOKMARK_TAGS, "bookmark_id", "tag_id", id, &[]).await
    }

    async fn from_row(
        row: Row,
        session: &mut dyn Session,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Self> {
        let id = decode(operation, row.get_i64(0))?;
        let bookmark_type = match decode(operation, row.get_opt_i64(3))? {
            Some(type_id) => Some(type_name(session, operation, type_id).await?),
            None => None,
        };
        let created_at = match decode(operation, row.get_opt_i64(4))? {
            Some(millis) => Some(from_millis(operation, millis)?),
            None => None,
        };
        let tag_ids = linked_ids(session, operation, BOOKMARK_TAGS, "bookmark_id", "tag_id", id).await?;

        Ok(Bookmark {
            id,
            url: decode(operation, row.get_string(1))?,
            title: decode(operation, row.get_string(2))?,
            tags: load_tags(session, operation, &tag_ids).await?,
            bookmark_type,
            created_at,
        })
    }

    async fn push_filter(
        filter: &BookmarkFilter,
        _session: &mut dyn Session,
        query: &mut QueryBuilder,
        _operation: RepositoryOperation,
    ) -> RepositoryResult<()> {
        if let Some(expression) = &filter.id {
            query.push_condition().push_filter("id", expression);
        }
        if let Some(expression) = &filter.url {
            query.push_condition().push_filter("url", expression);
        }
        if let Some(expression) = &filter.title {
            query.push_condition().push_filter("title", expression);
        }
        if let Some(expression) = &filter.tags {
            push_tag_name_condition(query, BOOKMARK_TAGS, "bookmark_id", expression);
        }
        if let Some(expression) = &filter.bookmark_type {
            push_type_name_condition(query, expression);
        }
        if let Some(expression) = &filter.created_at {
            let millis = convert_filter_ref(expression, |timestamp| {
                Ok::<_, std::convert::Infallible>(to_millis(timestamp))
            })
            .unwrap_or_else(|never| match never {});
            query.push_condition().push_filter("created_at", &millis);
        }
        Ok(())
    }

    fn apply_updater(&mut self, updater: &BookmarkUpdater) {
        updater.apply(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use chrono::{TimeZone, Utc};
    use tokio_util::sync::CancellationToken;

    use crate::config::RepositoryConfig;
    use crate::expression::{FilterExpression, UpdateExpression};
    use crate::repository::{
        CallContext, HookPoint, Repository, RepositoryErrorKind, TagRepository, TypeRepository,
    };
    use crate::storage::{schema, LibsqlBackend};

    struct Fixture {
        bookmarks: BookmarkRepository<LibsqlBackend>,
        tags: TagRepository<LibsqlBackend>,
    }

    async fn fixture() -> Fixture {
        let backend = Arc::new(LibsqlBackend::memory().await.expect("open in-memory database"));
        schema::migrate(backend.as_ref()).await.expect("migrate");
        let config = RepositoryConfig::default();
        let ctx = CallContext::new();

        TypeRepository::new(Arc::clone(&backend), config.clone())
            .add_types(&ctx, ["Article", "Video"])
            .await
            .expect("add types");
        let tags = TagRepository::new(Arc::clone(&backend), config.clone());
        tags.add(
            &ctx,
            [
                Tag::new(1, "lang").with_subtags([2]),
                Tag::new(2, "lang::rust").with_parent_path([1]),
                Tag::new(3, "reading"),
            ],
        )
        .await
        .expect("add tags");

        Fixture {
            bookmarks: BookmarkRepository::new(backend, config),
            tags,
        }
    }

    fn tag(id: i64, name: &str) -> Tag {
        Tag::new(id, name)
    }

    fn rust_book() -> Bookmark {
        Bookmark::new(10, "https://doc.rust-lang.org/book/")
            .with_title("The Book")
            .with_tags([tag(1, "lang").with_subtags([2]), tag(2, "lang::rust").with_parent_path([1])])
            .with_type("Article")
            .with_created_at(Utc.timestamp_millis_opt(1_700_000_000_000).single().expect("valid"))
    }

    #[tokio::test]
    async fn test_bookmark_round_trip() {
        let fx = fixture().await;
        let ctx = CallContext::new();
        fx.bookmarks.add(&ctx, [rust_book()]).await.expect("add");

        assert_eq!(fx.bookmarks.get_all(&ctx).await.expect("get"), vec![rust_book()]);
        assert!(fx.bookmarks.does_exist(&ctx, &rust_book()).await.expect("exists"));
    }

    #[tokio::test]
    async fn test_input_validation() {
        let fx = fixture().await;
        let ctx = CallContext::new();

        let err = fx
            .bookmarks
            .add(&ctx, Vec::<Bookmark>::new())
            .await
            .expect_err("empty batch");
        assert_eq!(err.kind, RepositoryErrorKind::IneffectiveOperation);
        assert_eq!(err.cause().map(|c| c.kind), Some(RepositoryErrorKind::EmptyInput));

        let err = fx
            .bookmarks
            .add(&ctx, [Some(rust_book()), None])
            .await
            .expect_err("null element");
        assert_eq!(err.kind, RepositoryErrorKind::NullInput);
        assert_eq!(fx.bookmarks.count_all(&ctx).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn test_unknown_references() {
        let fx = fixture().await;
        let ctx = CallContext::new();

        let untagged = Bookmark::new(11, "https://example.com").with_tags([tag(42, "never")]);
        let err = fx.bookmarks.add(&ctx, [untagged]).await.expect_err("unknown tag");
        assert_eq!(err.kind, RepositoryErrorKind::ReferenceToNonExistentDependency);
        assert_eq!(err.entity_type.as_deref(), Some("Tag"));
        assert_eq!(err.entity_id.as_deref(), Some("42"));

        let untyped = Bookmark::new(12, "https://example.org").with_type("Podcast");
        let err = fx.bookmarks.add(&ctx, [untyped]).await.expect_err("unknown type");
        assert_eq!(err.kind, RepositoryErrorKind::ReferenceToNonExistentDependency);
        assert_eq!(err.entity_id.as_deref(), Some("Podcast"));

        assert_eq!(fx.bookmarks.count_all(&ctx).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn test_duplicate_url() {
        let fx = fixture().await;
        let ctx = CallContext::new();
        fx.bookmarks.add(&ctx, [rust_book()]).await.expect("add");

        let copy = Bookmark::new(11, rust_book().url);
        let err = fx.bookmarks.add(&ctx, [copy]).await.expect_err("same url");
        assert_eq!(err.kind, RepositoryErrorKind::DuplicateInsertion);
    }

    #[tokio::test]
    async fn test_replace_and_upsert() {
        let fx = fixture().await;
        let ctx = CallContext::new();

        let err = fx.bookmarks.replace(&ctx, [rust_book()]).await.expect_err("not stored");
        assert_eq!(err.kind, RepositoryErrorKind::NonExistentPrimaryData);

        fx.bookmarks.upsert(&ctx, [rust_book()]).await.expect("upsert inserts");
        let renamed = rust_book().with_title("TRPL");
        fx.bookmarks.upsert(&ctx, [renamed.clone()]).await.expect("upsert updates");
        assert_eq!(fx.bookmarks.get_all(&ctx).await.expect("get"), vec![renamed]);

        let retagged = Bookmark {
            tags: vec![tag(3, "reading")],
            ..rust_book()
        };
        fx.bookmarks.replace(&ctx, [retagged.clone()]).await.expect("replace");
        assert_eq!(fx.bookmarks.get_all(&ctx).await.expect("get"), vec![retagged]);
    }

    #[tokio::test]
    async fn test_filters() {
        let fx = fixture().await;
        let ctx = CallContext::new();
        let video = Bookmark::new(20, "https://youtu.be/rust")
            .with_title("Talk")
            .with_tags([tag(3, "reading")])
            .with_type("Video");
        fx.bookmarks.add(&ctx, [rust_book(), video.clone()]).await.expect("add");

        let by_tag = BookmarkFilter::new().with_tags(FilterExpression::eq("reading".to_string()));
        assert_eq!(fx.bookmarks.get_where(&ctx, &by_tag).await.expect("query"), vec![video.clone()]);

        let by_type = BookmarkFilter::new().with_type(FilterExpression::eq("Article".to_string()));
        assert_eq!(fx.bookmarks.count_where(&ctx, &by_type).await.expect("count"), 1);

        let after = Utc.timestamp_millis_opt(1_600_000_000_000).single().expect("valid");
        let recent = BookmarkFilter::new().with_created_at(FilterExpression::gt(after));
        let first = fx.bookmarks.get_first_where(&ctx, &recent).await.expect("query");
        assert_eq!(first.map(|b| b.id), Some(10));

        let nothing = BookmarkFilter::new().with_url(FilterExpression::like("ftp://%".to_string()));
        assert_eq!(fx.bookmarks.get_first_where(&ctx, &nothing).await.expect("query"), None);
        assert!(!fx.bookmarks.does_exist_where(&ctx, &nothing).await.expect("query"));
    }

    #[tokio::test]
    async fn test_update_where_returns_matched_count() {
        let fx = fixture().await;
        let ctx = CallContext::new();
        let other = Bookmark::new(11, "https://crates.io").with_type("Article");
        let video = Bookmark::new(12, "https://youtu.be/x").with_type("Video");
        fx.bookmarks.add(&ctx, [rust_book(), other, video]).await.expect("add");

        let articles = BookmarkFilter::new().with_type(FilterExpression::eq("Article".to_string()));
        let updater = BookmarkUpdater::new().title(UpdateExpression::append(" (read)".to_string()));
        assert_eq!(fx.bookmarks.update_where(&ctx, &articles, &updater).await.expect("update"), 2);

        let stored = fx.bookmarks.get_where(&ctx, &articles).await.expect("query");
        let titles: Vec<_> = stored.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["The Book (read)", " (read)"]);

        let none = BookmarkFilter::new().with_id(FilterExpression::eq(99));
        assert_eq!(fx.bookmarks.update_where(&ctx, &none, &updater).await.expect("update"), 0);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let fx = fixture().await;
        let ctx = CallContext::new();
        fx.bookmarks.add(&ctx, [rust_book()]).await.expect("add");

        let untype = BookmarkUpdater::new().bookmark_type(UpdateExpression::clear());
        fx.bookmarks
            .update(&ctx, [Bookmark::new(10, "")], &untype)
            .await
            .expect("update reloads stored record");
        let stored = fx.bookmarks.get_all(&ctx).await.expect("get");
        assert_eq!(stored[0].bookmark_type, None);
        assert_eq!(stored[0].title, "The Book");

        let err = fx
            .bookmarks
            .delete(&ctx, [Bookmark::new(99, "")])
            .await
            .expect_err("missing");
        assert_eq!(err.kind, RepositoryErrorKind::NonExistentPrimaryData);

        let rust = BookmarkFilter::new().with_tags(FilterExpression::eq("lang::rust".to_string()));
        assert_eq!(fx.bookmarks.delete_where(&ctx, &rust).await.expect("delete"), 1);
        assert_eq!(fx.bookmarks.count_all(&ctx).await.expect("count"), 0);
        // tags are never removed with the records carrying them
        assert_eq!(fx.tags.count_all(&ctx).await.expect("count"), 3);
    }

    #[tokio::test]
    async fn test_cancelled_call_persists_nothing() {
        let fx = fixture().await;
        let token = CancellationToken::new();
        token.cancel();
        let ctx = CallContext::new().with_cancellation(token);

        let err = fx.bookmarks.add(&ctx, [rust_book()]).await.expect_err("cancelled");
        assert_eq!(err.kind, RepositoryErrorKind::Cancelled);
        assert_eq!(
            fx.bookmarks.count_all(&CallContext::new()).await.expect("count"),
            0
        );
    }

    #[tokio::test]
    async fn test_hooks_run_per_point_in_order() {
        let mut fx = fixture().await;
        let ctx = CallContext::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for point in [
            HookPoint::BeforeAny,
            HookPoint::BeforeAdd,
            HookPoint::AfterAdd,
            HookPoint::AfterAny,
            HookPoint::BeforeDelete,
        ] {
            let seen = Arc::clone(&seen);
            fx.bookmarks.hooks_mut().register(point, move |hook, _| {
                seen.lock().expect("lock").push(hook.point);
                Ok(())
            });
        }
        fx.bookmarks.hooks_mut().register(HookPoint::BeforeAdd, |_, bookmark| {
            if let Some(bookmark) = bookmark {
                bookmark.title = bookmark.title.to_uppercase();
            }
            Ok(())
        });

        fx.bookmarks.add(&ctx, [rust_book()]).await.expect("add");
        assert_eq!(
            *seen.lock().expect("lock"),
            vec![
                HookPoint::BeforeAny,
                HookPoint::BeforeAdd,
                HookPoint::AfterAdd,
                HookPoint::AfterAny
            ]
        );
        let stored = fx.bookmarks.get_all(&ctx).await.expect("get");
        assert_eq!(stored[0].title, "THE BOOK");
    }

    #[tokio::test]
    async fn test_failing_before_hook_rolls_back() {
        let mut fx = fixture().await;
        let ctx = CallContext::new();
        let errors = Arc::new(Mutex::new(0));
        {
            let errors = Arc::clone(&errors);
            fx.bookmarks.hooks_mut().register(HookPoint::AfterError, move |hook, _| {
                assert_eq!(hook.error.map(|e| e.kind), Some(RepositoryErrorKind::Hook));
                *errors.lock().expect("lock") += 1;
                Ok(())
            });
        }
        fx.bookmarks.hooks_mut().register(HookPoint::BeforeAdd, |_, bookmark| {
            match bookmark {
                Some(bookmark) if bookmark.id == 11 => anyhow::bail!("rejected {}", bookmark.url),
                _ => Ok(()),
            }
        });

        let rejected = Bookmark::new(11, "https://spam.example");
        let err = fx
            .bookmarks
            .add(&ctx, [rust_book(), rejected])
            .await
            .expect_err("hook rejects");
        assert_eq!(err.kind, RepositoryErrorKind::Hook);
        assert_eq!(*errors.lock().expect("lock"), 1);
        assert_eq!(fx.bookmarks.count_all(&ctx).await.expect("count"), 0);

        // rows are already written when After hooks run
        fx.bookmarks.hooks_mut().clear(HookPoint::BeforeAdd);
        fx.bookmarks
            .hooks_mut()
            .register(HookPoint::AfterAdd, |_, _| anyhow::bail!("audit log unavailable"));
        let err = fx.bookmarks.add(&ctx, [rust_book()]).await.expect_err("after hook fails");
        assert_eq!(err.kind, RepositoryErrorKind::Hook);
        assert_eq!(fx.bookmarks.count_all(&ctx).await.expect("count"), 0);
    }
}
