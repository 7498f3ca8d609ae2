// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core LabelSet implementation.

use crate::id::ContextId;
use crate::registry::Lease;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Reserved label key under which the active [`ContextId`] is published.
///
/// The value is the identifier in lowercase hex. Other producers of labels should
/// stay away from this key; if they overwrite it, [`current_context`](crate::current_context)
/// reports no context rather than failing.
pub const LABEL_KEY: &str = "taskctx_id";

/// An immutable, ordered set of string labels belonging to one task.
///
/// Label sets have value semantics. Cloning is cheap (`Arc`-based), and every
/// "modification" such as [`with_label`](LabelSet::with_label) returns a new set, so
/// a copy handed to a child task can never be changed by its parent or siblings.
///
/// Each thread has a current label set, read with [`LabelSet::current`] and replaced
/// wholesale with [`LabelSet::replace_current`]. Futures carry their own through
/// [`ApplyLabels`](crate::ApplyLabels).
///
/// # Examples
///
/// ```rust
/// use taskctx::LabelSet;
///
/// let labels: LabelSet = [("request", "42")].into_iter().collect();
/// let labels = labels.with_label("user", "alice");
/// assert_eq!(labels.get("request"), Some("42"));
/// assert_eq!(labels.len(), 2);
///
/// labels.set_current();
/// assert_eq!(LabelSet::current().unwrap().get("user"), Some("alice"));
/// LabelSet::clear_current();
/// ```
#[derive(Clone, Default)]
pub struct LabelSet {
    map: Arc<BTreeMap<String, String>>,
    /// Keeps the registry entry for the identifier under [`LABEL_KEY`] alive.
    /// Only present when that identifier was installed by a scope.
    lease: Option<Arc<Lease>>,
}

impl PartialEq for LabelSet {
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map
    }
}

impl Eq for LabelSet {}

impl std::fmt::Debug for LabelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.map.iter()).finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        LabelSet {
            map: Arc::new(
                iter.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            lease: None,
        }
    }
}

/// The current thread's label set.
///
/// When the thread exits, the set may hold the last lease on a registry entry. By then
/// other thread-locals (logwise's among them) may already be gone, so the slot marks
/// the thread as exiting before letting go of it.
struct Slot(RefCell<Option<LabelSet>>);

impl Drop for Slot {
    fn drop(&mut self) {
        let _ = EXITING.try_with(|exiting| exiting.set(true));
        let labels = self.0.get_mut().take();
        drop(labels);
    }
}

thread_local! {
    static LABELS: Slot = const { Slot(RefCell::new(None)) };
    static EXITING: Cell<bool> = const { Cell::new(false) };
}

/// True while the current thread's label storage is being torn down.
///
/// Code running from that destructor must not touch other thread-locals.
pub(crate) fn thread_exiting() -> bool {
    EXITING.try_with(Cell::get).unwrap_or(true)
}

impl LabelSet {
    /// Creates an empty label set.
    pub fn new() -> LabelSet {
        LabelSet::default()
    }

    /// Returns the value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Returns a copy of this set with `key` set to `value`.
    ///
    /// All other labels are preserved. Overwriting [`LABEL_KEY`] detaches the copy
    /// from the scope that installed the previous identifier.
    pub fn with_label(&self, key: impl Into<String>, value: impl Into<String>) -> LabelSet {
        let key = key.into();
        let lease = if key == LABEL_KEY {
            None
        } else {
            self.lease.clone()
        };
        let mut map = (*self.map).clone();
        map.insert(key, value.into());
        LabelSet {
            map: Arc::new(map),
            lease,
        }
    }

    /// Returns a copy of this set without `key`.
    pub fn without_label(&self, key: &str) -> LabelSet {
        let lease = if key == LABEL_KEY {
            None
        } else {
            self.lease.clone()
        };
        let mut map = (*self.map).clone();
        map.remove(key);
        LabelSet {
            map: Arc::new(map),
            lease,
        }
    }

    /// Returns a copy of this set publishing `lease`'s identifier under [`LABEL_KEY`].
    pub(crate) fn with_lease(&self, lease: Arc<Lease>) -> LabelSet {
        let mut map = (*self.map).clone();
        map.insert(LABEL_KEY.to_string(), lease.id().to_string());
        LabelSet {
            map: Arc::new(map),
            lease: Some(lease),
        }
    }

    /// Iterates over the labels in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Parses the identifier stored under [`LABEL_KEY`].
    ///
    /// Returns `None` if the key is absent or its value is not a valid identifier.
    pub fn context_id(&self) -> Option<ContextId> {
        let value = self.get(LABEL_KEY)?;
        match value.parse() {
            Ok(id) => Some(id),
            Err(e) => {
                logwise::debuginternal_sync!(
                    "ignoring label {key}={value}: {err}",
                    key = LABEL_KEY,
                    value = value.to_string(),
                    err = e.to_string()
                );
                None
            }
        }
    }

    /// Returns the current thread's label set.
    ///
    /// Threads start with no label set. Once the thread's local storage has been
    /// torn down this also returns `None`.
    #[inline]
    pub fn current() -> Option<LabelSet> {
        LABELS
            .try_with(|slot| slot.0.borrow().clone())
            .unwrap_or(None)
    }

    /// Replaces the current thread's label set wholesale, returning the one it displaced.
    ///
    /// This is not a merge: labels in the old set that are missing from `labels` are
    /// gone afterwards.
    ///
    /// ```rust
    /// use taskctx::LabelSet;
    ///
    /// let prior = LabelSet::replace_current(Some(LabelSet::new().with_label("a", "1")));
    /// assert_eq!(prior, None);
    /// let displaced = LabelSet::replace_current(prior);
    /// assert_eq!(displaced.unwrap().get("a"), Some("1"));
    /// assert_eq!(LabelSet::current(), None);
    /// ```
    pub fn replace_current(labels: Option<LabelSet>) -> Option<LabelSet> {
        LABELS
            .try_with(|slot| slot.0.replace(labels))
            .unwrap_or(None)
    }

    /// Makes this set the current thread's label set.
    pub fn set_current(self) {
        // the displaced set may hold the last lease on an entry; drop it outside the borrow
        let displaced = LabelSet::replace_current(Some(self));
        drop(displaced);
    }

    /// Removes the current thread's label set.
    pub fn clear_current() {
        let displaced = LabelSet::replace_current(None);
        drop(displaced);
    }
}
