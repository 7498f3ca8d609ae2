// SPDX-License-Identifier: MIT OR Apache-2.0

//! Label sets for futures.

use std::future::Future;
use std::pin::Pin;
use std::task::Poll;

use super::label_set::LabelSet;

/// A [`Future`] wrapper that gives the inner future its own task label set.
///
/// Executors poll many futures on the same thread (and one future on many threads),
/// so a thread's label set cannot belong to a future. `ApplyLabels` holds the label
/// set for the future instead, and installs it around each poll:
///
/// 1. Swap the wrapped label set in as the thread's current label set
/// 2. Poll the inner future
/// 3. Swap the thread's label set back out into the wrapper, keeping any changes the
///    future made for its next poll
/// 4. Restore the thread's original label set
///
/// Steps 3 and 4 also run if the inner future panics. Once the inner future
/// completes, the wrapper drops its label set.
///
/// You usually get one from [`inherit`](crate::inherit) or
/// [`with_context`](crate::with_context) rather than building it by hand.
///
/// # Examples
///
/// ```rust
/// use taskctx::{ApplyLabels, LabelSet};
///
/// async fn handler() -> Option<String> {
///     LabelSet::current().and_then(|l| l.get("route").map(str::to_string))
/// }
///
/// # async fn example() {
/// let labels = LabelSet::new().with_label("route", "/index");
/// let route = ApplyLabels::new(Some(labels), handler()).await;
/// assert_eq!(route.as_deref(), Some("/index"));
/// # }
/// # test_executors::spin_on(example());
/// ```
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct ApplyLabels<F> {
    labels: Option<LabelSet>,
    fut: F,
}

impl<F> ApplyLabels<F> {
    /// Wraps `fut` so that it runs with `labels` as its label set.
    pub fn new(labels: Option<LabelSet>, fut: F) -> Self {
        Self { labels, fut }
    }

    /// The label set the future will see on its next poll.
    pub fn labels(&self) -> Option<&LabelSet> {
        self.labels.as_ref()
    }
}

/// Puts the thread's label set back when dropped, stashing the task's set in `slot`.
struct SwapBack<'a> {
    slot: &'a mut Option<LabelSet>,
    prior: Option<LabelSet>,
}

impl Drop for SwapBack<'_> {
    fn drop(&mut self) {
        *self.slot = LabelSet::replace_current(self.prior.take());
    }
}

impl<F> Future for ApplyLabels<F>
where
    F: Future,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `fut` is never moved out of the pinned wrapper; `labels` is not
        // structurally pinned.
        let (labels, fut) = unsafe {
            let d = self.get_unchecked_mut();
            (&mut d.labels, Pin::new_unchecked(&mut d.fut))
        };
        let prior = LabelSet::replace_current(labels.take());
        let swap = SwapBack {
            slot: &mut *labels,
            prior,
        };
        let r = fut.poll(cx);
        drop(swap);
        if r.is_ready() {
            *labels = None;
        }
        r
    }
}
