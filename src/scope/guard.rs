// SPDX-License-Identifier: MIT OR Apache-2.0

//! Guard-based scopes.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use logwise::privacy::IPromiseItsNotPrivate;

use crate::id::ContextId;
use crate::labels::LabelSet;
use crate::registry::{Lease, Registry};

/// Attaches `payload` to the current thread until the returned guard is dropped.
///
/// This is the guard form of [`run_with_context`](crate::run_with_context). While the
/// guard lives, [`current_context`](crate::current_context) on this thread (and on
/// any task spawned through [`spawn`](crate::spawn) or [`inherit`](crate::inherit))
/// returns `payload`. All other labels on the thread are kept.
///
/// Guards nest. Drop them in reverse order of creation; the guard is `!Send`, so it
/// can't be moved to another thread or held across an `.await` in a `Send` future.
///
/// # Examples
///
/// ```rust
/// use taskctx::{current_context, enter};
///
/// let outer = enter("outer");
/// {
///     let _inner = enter("inner");
///     assert_eq!(*current_context::<&str>().unwrap(), "inner");
/// }
/// assert_eq!(*current_context::<&str>().unwrap(), "outer");
/// drop(outer);
/// assert!(current_context::<&str>().is_none());
/// ```
pub fn enter<T>(payload: T) -> ContextGuard
where
    T: Any + Send + Sync,
{
    let prior = LabelSet::current();
    let lease = Registry::global().register(Arc::new(payload));
    let id = lease.id();
    let labels = prior.clone().unwrap_or_default().with_lease(lease.clone());
    LabelSet::replace_current(Some(labels));
    logwise::debuginternal_sync!("entered context {id}", id = id.get());
    ContextGuard {
        id,
        prior,
        _lease: lease,
        _not_send: PhantomData,
    }
}

/// Keeps a context attached to the current thread.
///
/// Returned by [`enter`]. Dropping it restores the label set the thread had before
/// `enter` was called, then releases its hold on the registry entry. If no task
/// inherited the context, the entry is removed right there.
///
/// Restoration is unconditional. If guards are dropped out of order, the last one
/// to go puts back whatever it saw on entry, so with
///
/// ```rust
/// # use taskctx::{current_context, enter, LabelSet};
/// let outer = enter("outer");
/// let inner = enter("inner");
/// drop(outer); // logs a warning
/// drop(inner);
/// assert_eq!(*current_context::<&str>().unwrap(), "outer");
/// # LabelSet::clear_current();
/// ```
///
/// the outer payload is attached again after both guards are gone, and its registry
/// entry stays alive until the thread's label set is next replaced or cleared.
#[must_use = "the context is detached as soon as the guard is dropped"]
pub struct ContextGuard {
    id: ContextId,
    prior: Option<LabelSet>,
    _lease: Arc<Lease>,
    _not_send: PhantomData<*const ()>,
}

impl ContextGuard {
    /// The identifier this guard published.
    pub fn id(&self) -> ContextId {
        self.id
    }
}

impl std::fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextGuard")
            .field("id", &self.id)
            .field("prior", &self.prior)
            .finish()
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if ContextId::current() != Some(self.id) {
            logwise::warn_sync!(
                "context {id} is no longer current on this thread; a nested guard was leaked, dropped out of order, or the label was overwritten",
                id = IPromiseItsNotPrivate(self.id.get())
            );
        }
        let displaced = LabelSet::replace_current(self.prior.take());
        drop(displaced);
        logwise::debuginternal_sync!("left context {id}", id = self.id.get());
        // `_lease` is released after this, once the thread no longer publishes the id
    }
}
