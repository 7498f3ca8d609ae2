// SPDX-License-Identifier: MIT OR Apache-2.0

//! Spawning tasks that inherit the current label set.
//!
//! Thread-local storage does not follow a new thread, and a new future has no idea
//! which task created it. The functions here take a copy of the spawner's current
//! [`LabelSet`] at the moment of spawning and give it to the child. The copy is the
//! child's own: later changes in the parent do not reach it, and the child's changes
//! do not reach the parent.
//!
//! Threads spawned with plain `std::thread::spawn` start with no labels and therefore
//! no context.

use std::future::Future;

use crate::labels::{ApplyLabels, LabelSet};
use crate::sys::thread;

/// Clears the thread's label set when the spawned closure finishes or unwinds.
struct ClearOnExit;

impl Drop for ClearOnExit {
    fn drop(&mut self) {
        LabelSet::clear_current();
    }
}

fn adopt<F, T>(labels: Option<LabelSet>, f: F) -> T
where
    F: FnOnce() -> T,
{
    LabelSet::replace_current(labels);
    let _clear = ClearOnExit;
    f()
}

/// Spawns a thread that starts with a copy of the current label set.
///
/// Otherwise identical to `std::thread::spawn`. Any context attached to the calling
/// task is visible in the new thread, even after the attaching call has returned.
///
/// ```rust
/// use taskctx::{current_context, run_with_context, spawn};
///
/// let handle = run_with_context("parent", || spawn(|| current_context::<&str>()));
/// assert_eq!(handle.join().unwrap().as_deref(), Some(&"parent"));
/// ```
pub fn spawn<F, T>(f: F) -> thread::JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let labels = LabelSet::current();
    thread::spawn(move || adopt(labels, f))
}

/// Spawns a scoped thread that starts with a copy of the current label set.
///
/// The scoped counterpart of [`spawn`], for use with `std::thread::scope`.
///
/// ```rust
/// use taskctx::{current_context, run_with_context, spawn_scoped};
///
/// run_with_context(3u8, || {
///     std::thread::scope(|s| {
///         let h = spawn_scoped(s, || *current_context::<u8>().unwrap());
///         assert_eq!(h.join().unwrap(), 3);
///     });
/// });
/// ```
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_scoped<'scope, 'env, F, T>(
    scope: &'scope std::thread::Scope<'scope, 'env>,
    f: F,
) -> std::thread::ScopedJoinHandle<'scope, T>
where
    F: FnOnce() -> T + Send + 'scope,
    T: Send + 'scope,
{
    let labels = LabelSet::current();
    scope.spawn(move || adopt(labels, f))
}

/// Wraps `fut` so that it runs with a copy of the current label set.
///
/// Call this where a future is created, before handing it to an executor's spawn
/// function; the copy is taken now, not when the future first runs.
///
/// ```rust
/// use taskctx::{current_context, inherit, run_with_context};
///
/// let child = run_with_context("request-1", || {
///     inherit(async { current_context::<&str>().map(|s| *s) })
/// });
/// // the scope has ended, but the child still carries its copy
/// assert_eq!(test_executors::spin_on(child), Some("request-1"));
/// ```
pub fn inherit<F>(fut: F) -> ApplyLabels<F>
where
    F: Future,
{
    ApplyLabels::new(LabelSet::current(), fut)
}
