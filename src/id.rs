// SPDX-License-Identifier: MIT OR Apache-2.0

//! Context identifiers and their label encoding.

use std::fmt::{Display, LowerHex};
use std::num::NonZeroU64;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::labels::LabelSet;

/// Last identifier handed out.  0 is never issued; it is the "absent" sentinel.
static LAST_ID: AtomicU64 = AtomicU64::new(0);

/// Advances `counter` and returns the new value, or `None` once it has reached
/// `u64::MAX`. An exhausted counter stays exhausted.
fn bump(counter: &AtomicU64) -> Option<NonZeroU64> {
    let prior = counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
        .ok()?;
    NonZeroU64::new(prior + 1)
}

/// Unique identifier for one attached context.
///
/// Identifiers are allocated from a process-wide counter. They start at 1,
/// increase monotonically, and are never reused, even after the scope that
/// allocated them has ended.
///
/// In a [`LabelSet`] the identifier is stored under [`LABEL_KEY`](crate::LABEL_KEY)
/// as lowercase hex:
///
/// ```rust
/// use taskctx::ContextId;
///
/// let id: ContextId = "2a".parse().unwrap();
/// assert_eq!(id.get(), 42);
/// assert_eq!(id.to_string(), "2a");
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(NonZeroU64);

impl ContextId {
    /// Allocates a fresh identifier.
    ///
    /// Each call returns a value strictly greater than every value returned before.
    ///
    /// ```rust
    /// use taskctx::ContextId;
    ///
    /// let a = ContextId::next();
    /// let b = ContextId::next();
    /// assert!(b > a);
    /// ```
    pub fn next() -> ContextId {
        match bump(&LAST_ID) {
            Some(id) => ContextId(id),
            None => panic!("context identifier space exhausted"),
        }
    }

    /// Returns the numeric value of this identifier.
    #[inline]
    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// Returns the identifier published in the current thread's label set, if any.
    ///
    /// A missing label set, a missing key, and an unparseable value all yield `None`.
    ///
    /// ```rust
    /// use taskctx::ContextId;
    ///
    /// assert_eq!(ContextId::current(), None);
    /// taskctx::run_with_context("payload", || {
    ///     assert!(ContextId::current().is_some());
    /// });
    /// ```
    pub fn current() -> Option<ContextId> {
        LabelSet::current()?.context_id()
    }
}

impl From<NonZeroU64> for ContextId {
    fn from(value: NonZeroU64) -> Self {
        ContextId(value)
    }
}

impl Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl LowerHex for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        LowerHex::fmt(&self.0, f)
    }
}

/// Error returned when a label value is not a valid [`ContextId`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseContextIdError {
    #[error("context id is empty")]
    Empty,
    #[error("context id contains a character that is not a hex digit")]
    InvalidDigit,
    #[error("context id does not fit in 64 bits")]
    Overflow,
    #[error("context id 0 is reserved")]
    Zero,
}

impl FromStr for ContextId {
    type Err = ParseContextIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseContextIdError::Empty);
        }
        // from_str_radix tolerates a leading sign, labels never carry one
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseContextIdError::InvalidDigit);
        }
        let raw = u64::from_str_radix(s, 16).map_err(|_| ParseContextIdError::Overflow)?;
        NonZeroU64::new(raw)
            .map(ContextId)
            .ok_or(ParseContextIdError::Zero)
    }
}
