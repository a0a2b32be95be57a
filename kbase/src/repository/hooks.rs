//! Lifecycle hooks
//!
//! Callbacks registered against a [`HookPoint`] run in registration order.
//! The first failing callback stops the rest and fails the repository call
//! with kind `Hook`, which rolls the transaction back.
//!
//! Per-entity points (`BeforeAdd`, `AfterSelect`, ...) receive the entity and
//! may modify it; call-level points (`BeforeAny`, `AfterError`, ...) receive
//! `None`.
//!
//! ```rust
//! use kbase::model::Bookmark;
//! use kbase::repository::{HookPoint, HookRegistry};
//!
//! let mut hooks = HookRegistry::<Bookmark>::new();
//! hooks.register(HookPoint::BeforeAdd, |_ctx, bookmark| {
//!     if let Some(bookmark) = bookmark {
//!         if bookmark.title.is_empty() {
//!             bookmark.title = bookmark.url.clone();
//!         }
//!     }
//!     Ok(())
//! });
//! assert_eq!(hooks.count(HookPoint::BeforeAdd), 1);
//! assert_eq!(hooks.count(HookPoint::AfterAdd), 0);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::context::CallContext;
use super::error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};

/// A named lifecycle moment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    BeforeAdd,
    AfterAdd,
    BeforeSelect,
    AfterSelect,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
    BeforeUpsert,
    AfterUpsert,
    /// Start of every call, before the transaction opens
    BeforeAny,
    /// End of every call
    AfterAny,
    /// The call failed for a reason other than an interruption
    AfterError,
    AfterDeadline,
    AfterTimeout,
    AfterCancel,
}

impl HookPoint {
    /// The error-family point matching a failed call
    pub fn for_error(error: &RepositoryError) -> Self {
        match error.kind {
            RepositoryErrorKind::Cancelled => Self::AfterCancel,
            RepositoryErrorKind::Timeout => Self::AfterTimeout,
            RepositoryErrorKind::DeadlineExceeded => Self::AfterDeadline,
            _ => Self::AfterError,
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeAdd => write!(f, "before_add"),
            Self::AfterAdd => write!(f, "after_add"),
            Self::BeforeSelect => write!(f, "before_select"),
            Self::AfterSelect => write!(f, "after_select"),
            Self::BeforeUpdate => write!(f, "before_update"),
            Self::AfterUpdate => write!(f, "after_update"),
            Self::BeforeDelete => write!(f, "before_delete"),
            Self::AfterDelete => write!(f, "after_delete"),
            Self::BeforeUpsert => write!(f, "before_upsert"),
            Self::AfterUpsert => write!(f, "after_upsert"),
            Self::BeforeAny => write!(f, "before_any"),
            Self::AfterAny => write!(f, "after_any"),
            Self::AfterError => write!(f, "after_error"),
            Self::AfterDeadline => write!(f, "after_deadline"),
            Self::AfterTimeout => write!(f, "after_timeout"),
            Self::AfterCancel => write!(f, "after_cancel"),
        }
    }
}

/// What a hook knows about the call it runs in
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub point: HookPoint,
    pub operation: RepositoryOperation,
    /// `Entity::KIND` of the repository
    pub entity_kind: &'static str,
    pub call: &'a CallContext,
    /// The failure, for error-family points
    pub error: Option<&'a RepositoryError>,
}

/// A registered callback
pub type Hook<M> =
    Arc<dyn Fn(&HookContext<'_>, Option<&mut M>) -> anyhow::Result<()> + Send + Sync>;

/// Callbacks per hook point
pub struct HookRegistry<M> {
    hooks: HashMap<HookPoint, Vec<Hook<M>>>,
}

impl<M> Default for HookRegistry<M> {
    fn default() -> Self {
        Self {
            hooks: HashMap::new(),
        }
    }
}

impl<M> Clone for HookRegistry<M> {
    fn clone(&self) -> Self {
        Self {
            hooks: self.hooks.clone(),
        }
    }
}

impl<M> fmt::Debug for HookRegistry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self
            .hooks
            .iter()
            .map(|(point, hooks)| (*point, hooks.len()))
            .collect();
        f.debug_struct("HookRegistry").field("hooks", &counts).finish()
    }
}

impl<M> HookRegistry<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `hook` to the callbacks of `point`
    pub fn register<F>(&mut self, point: HookPoint, hook: F)
    where
        F: Fn(&HookContext<'_>, Option<&mut M>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.entry(point).or_default().push(Arc::new(hook));
    }

    /// Number of callbacks registered for `point`
    pub fn count(&self, point: HookPoint) -> usize {
        self.hooks.get(&point).map_or(0, Vec::len)
    }

    /// Remove every callback registered for `point`
    pub fn clear(&mut self, point: HookPoint) {
        self.hooks.remove(&point);
    }

    /// Run the callbacks of `ctx.point` in order, stopping at the first failure
    pub fn run(&self, ctx: &HookContext<'_>, mut entity: Option<&mut M>) -> Result<(), RepositoryError> {
        let Some(hooks) = self.hooks.get(&ctx.point) else {
            return Ok(());
        };
        for hook in hooks {
            hook(ctx, entity.as_deref_mut()).map_err(|e| {
                RepositoryError::hook(ctx.operation, format!("{} hook failed: {:#}", ctx.point, e))
            })?;
        }
        Ok(())
    }

    /// Run callbacks whose failure must not replace the call's outcome
    pub fn run_logged(&self, ctx: &HookContext<'_>) {
        if let Err(error) = self.run(ctx, None) {
            tracing::warn!(
                point = %ctx.point,
                operation = %ctx.operation,
                entity = ctx.entity_kind,
                error = %error,
                "Hook failed"
            );
        }
    }
}
