// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attaching context to a task and reading it back.
//!
//! # Overview
//!
//! - [`run_with_context`] attaches a payload for the dynamic extent of a closure
//! - [`enter`] does the same until a [`ContextGuard`] is dropped
//! - [`with_context`] attaches a payload to a future for as long as it runs
//! - [`attach`] attaches a payload to the thread until something replaces it
//! - [`current_context`] and [`current_payload`] read it back from anywhere inside
//!
//! # How it works
//!
//! Attaching allocates a fresh [`ContextId`](crate::ContextId), registers the payload
//! under it in the global [`Registry`], and publishes the identifier in the task's
//! [`LabelSet`] under [`LABEL_KEY`](crate::LABEL_KEY), next to whatever labels the
//! task already had. Reading parses the identifier back out of the label set and
//! looks it up.
//!
//! Because only the label set is per-task, a task spawned through
//! [`spawn`](crate::spawn) or [`inherit`](crate::inherit) gets a copy of it, and with
//! it the identifier, so it resolves the same payload.
//!
//! When the scope ends, the task's previous label set is put back unconditionally.
//! The registry entry goes away once neither the scope nor any task that inherited
//! it can still see the identifier.
//!
//! ```rust
//! use taskctx::{current_context, run_with_context, spawn};
//!
//! #[derive(Debug, PartialEq)]
//! struct RequestId(u32);
//!
//! fn log_line(msg: &str) -> String {
//!     // no request id is passed in; it is looked up from the task
//!     match current_context::<RequestId>() {
//!         Some(req) => format!("[{}] {msg}", req.0),
//!         None => format!("[-] {msg}"),
//!     }
//! }
//!
//! let child = run_with_context(RequestId(7), || {
//!     assert_eq!(log_line("handling"), "[7] handling");
//!     spawn(|| log_line("from a child thread"))
//! });
//! assert_eq!(child.join().unwrap(), "[7] from a child thread");
//! assert_eq!(log_line("done"), "[-] done");
//! ```

mod guard;


use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use crate::id::ContextId;
use crate::labels::{ApplyLabels, LabelSet};
use crate::registry::{Payload, Registry};

pub use guard::{ContextGuard, enter};

/// Runs `body` with `payload` attached to the current task.
///
/// `body` runs synchronously on the calling thread. Inside it, and inside any task
/// spawned from it through [`spawn`](crate::spawn) or [`inherit`](crate::inherit),
/// [`current_context::<T>()`](current_context) returns `payload`.
///
/// When `body` returns, the thread's previous label set is restored, including an
/// identifier from an enclosing `run_with_context`, so calls nest. Restoration also
/// happens when `body` panics; the panic then continues to unwind. `body`'s return
/// value is passed through untouched, so a `Result` error propagates as usual.
///
/// # Examples
///
/// ```rust
/// use taskctx::{current_context, run_with_context};
///
/// let seen = run_with_context(String::from("outer"), || {
///     run_with_context(String::from("inner"), || {
///         assert_eq!(*current_context::<String>().unwrap(), "inner");
///     });
///     current_context::<String>().map(|s| (*s).clone())
/// });
/// assert_eq!(seen.as_deref(), Some("outer"));
/// assert!(current_context::<String>().is_none());
/// ```
pub fn run_with_context<T, R, F>(payload: T, body: F) -> R
where
    T: Any + Send + Sync,
    F: FnOnce() -> R,
{
    let _guard = enter(payload);
    body()
}

/// Attaches `payload` to a future.
///
/// The payload is registered right away, and the returned future carries its own
/// label set: the labels current at this call, plus the new identifier. That label
/// set is installed on whichever thread polls the future, for the duration of each
/// poll, so the context survives `.await` points and executor thread hops without
/// leaking into other futures sharing the thread.
///
/// The payload is released when the future completes or is dropped, unless futures
/// created inside it with [`inherit`](crate::inherit) are still alive.
///
/// # Examples
///
/// ```rust
/// use taskctx::{current_context, with_context};
///
/// async fn handler() -> u32 {
///     *current_context::<u32>().unwrap()
/// }
///
/// # async fn example() {
/// assert_eq!(with_context(42u32, handler()).await, 42);
/// assert!(current_context::<u32>().is_none());
/// # }
/// # test_executors::spin_on(example());
/// ```
pub fn with_context<T, F>(payload: T, fut: F) -> ApplyLabels<F>
where
    T: Any + Send + Sync,
    F: Future,
{
    let lease = Registry::global().register(Arc::new(payload));
    logwise::debuginternal_sync!("attached context {id} to a future", id = lease.id().get());
    let labels = LabelSet::current().unwrap_or_default().with_lease(lease);
    ApplyLabels::new(Some(labels), fut)
}

/// Attaches `payload` to the current thread with no scope to end it.
///
/// The payload stays attached until the thread's label set is replaced, by another
/// `attach` or by [`LabelSet::set_current`]/[`LabelSet::clear_current`], or until the
/// thread exits. A second `attach` replaces the first; the first payload is released
/// unless a spawned task inherited it. Other labels on the thread are kept.
///
/// Inside a [`run_with_context`] or [`enter`] scope, the scope's exit restores the
/// labels it saw on entry, which detaches anything attached in between.
///
/// ```rust
/// use taskctx::{attach, current_context, spawn};
///
/// spawn(|| {
///     attach("first");
///     let first = taskctx::ContextId::current();
///     attach("second");
///     assert_eq!(*current_context::<&str>().unwrap(), "second");
///     assert_ne!(taskctx::ContextId::current(), first);
/// })
/// .join()
/// .unwrap();
/// ```
pub fn attach<T>(payload: T) -> ContextId
where
    T: Any + Send + Sync,
{
    let lease = Registry::global().register(Arc::new(payload));
    let id = lease.id();
    logwise::debuginternal_sync!("attached context {id} to the thread", id = id.get());
    LabelSet::current()
        .unwrap_or_default()
        .with_lease(lease)
        .set_current();
    id
}

/// Returns the payload attached to the current task, whatever its type.
///
/// Returns `None` when no context is attached, when the label carrying the
/// identifier was overwritten with something unparseable, or when the entry no
/// longer exists. None of these are errors.
pub fn current_payload() -> Option<Payload> {
    let id = ContextId::current()?;
    Registry::global().lookup(id)
}

/// Returns the payload attached to the current task, if it is a `T`.
///
/// This is [`current_payload`] followed by a downcast; a payload of a different type
/// also gives `None`.
///
/// ```rust
/// use taskctx::{current_context, run_with_context};
///
/// assert!(current_context::<u64>().is_none());
/// run_with_context(5u64, || {
///     assert_eq!(*current_context::<u64>().unwrap(), 5);
///     assert!(current_context::<String>().is_none());
/// });
/// ```
pub fn current_context<T>() -> Option<Arc<T>>
where
    T: Any + Send + Sync,
{
    current_payload()?.downcast::<T>().ok()
}
