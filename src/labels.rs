// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-task label storage.
//!
//! A label set is a small ordered map of string labels that belongs to exactly one
//! task. taskctx publishes the active [`ContextId`](crate::ContextId) in it under
//! [`LABEL_KEY`], and that is the only thing tying a task to its context.
//!
//! # Threads
//!
//! Each thread has a current label set in thread-local storage:
//!
//! ```rust
//! use taskctx::LabelSet;
//!
//! assert_eq!(LabelSet::current(), None);
//! LabelSet::new().with_label("job", "reindex").set_current();
//! assert_eq!(LabelSet::current().unwrap().get("job"), Some("reindex"));
//! LabelSet::clear_current();
//! ```
//!
//! Thread-local storage is not inherited by new threads. Spawn through
//! [`taskctx::spawn`](crate::spawn) to hand the child a copy of the current set.
//!
//! # Futures
//!
//! [`ApplyLabels`] carries a label set with a future and installs it during every
//! poll, so the future sees the same labels no matter which thread polls it.

mod apply_labels;
mod label_set;

#[cfg(test)]
mod tests;

pub use apply_labels::ApplyLabels;
pub use label_set::{LABEL_KEY, LabelSet};
pub(crate) use label_set::thread_exiting;
