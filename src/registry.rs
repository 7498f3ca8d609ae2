// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identifier → payload storage shared by every task in the process.
//!
//! The registry is the only shared mutable state in taskctx. Label sets only ever
//! carry a [`ContextId`]; resolving that identifier back to the payload goes through
//! here.
//!
//! # Architecture
//!
//! The map is split into [`SHARD_COUNT`] shards, each a `HashMap` behind a
//! reader/writer spinlock. Identifiers are allocated sequentially, so consecutive
//! scopes land on different shards and unrelated tasks rarely touch the same lock.
//! Lookups take a shared lock; inserts and removals take the exclusive one.
//!
//! # Leases
//!
//! Entries registered through [`Registry::register`] are owned by a [`Lease`].
//! Every label set that carries the identifier also holds a clone of the lease, so
//! the entry stays resolvable for as long as some task can still see the identifier,
//! and is removed as soon as the last such task lets go of it.
//!
//! ```
//! use taskctx::Registry;
//! use std::sync::Arc;
//!
//! let registry = Registry::global();
//! let lease = registry.register(Arc::new("payload"));
//! let id = lease.id();
//! assert!(registry.lookup(id).is_some());
//! drop(lease);
//! assert!(registry.lookup(id).is_none());
//! ```

use crate::id::ContextId;
use crate::spinlock::Spinlock;
use std::any::Any;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, OnceLock};

/// Number of independently locked shards in a [`Registry`].
pub const SHARD_COUNT: usize = 16;

/// A context payload as stored in the registry.
///
/// The registry never looks inside; use [`current_context`](crate::current_context)
/// to get a typed view back.
pub type Payload = Arc<dyn Any + Send + Sync>;

static GLOBAL_REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Concurrency-safe map from [`ContextId`] to [`Payload`].
pub struct Registry {
    shards: [Spinlock<HashMap<ContextId, Payload>>; SHARD_COUNT],
}

impl Registry {
    /// Creates an empty registry.
    ///
    /// Most code wants [`Registry::global`], which is the registry the scope
    /// functions use.
    pub fn new() -> Registry {
        Registry {
            shards: std::array::from_fn(|_| Spinlock::default()),
        }
    }

    /// Returns the process-wide registry, creating it on first use.
    pub fn global() -> &'static Registry {
        GLOBAL_REGISTRY.get_or_init(Registry::new)
    }

    #[inline]
    fn shard(&self, id: ContextId) -> &Spinlock<HashMap<ContextId, Payload>> {
        &self.shards[(id.get() % SHARD_COUNT as u64) as usize]
    }

    /// Registers `payload` under `id`.
    ///
    /// # Panics
    ///
    /// If `id` is already registered. Identifiers come from [`ContextId::next`] and
    /// are never reused, so a duplicate means the registry's bookkeeping is broken.
    /// The existing entry is left as it was.
    pub fn insert(&self, id: ContextId, payload: Payload) {
        let inserted = match self.shard(id).write().entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(payload);
                true
            }
        };
        assert!(inserted, "context id {id} was registered twice");
    }

    /// Looks up the payload registered under `id`.
    ///
    /// Returns `None` if `id` was never registered or has already been removed.
    pub fn lookup(&self, id: ContextId) -> Option<Payload> {
        self.shard(id).read().get(&id).cloned()
    }

    /// Removes the entry for `id`, returning its payload.
    ///
    /// Removing an identifier that is not registered does nothing.
    pub fn remove(&self, id: ContextId) -> Option<Payload> {
        self.shard(id).write().remove(&id)
    }

    /// Number of registered entries.
    ///
    /// The count is assembled shard by shard, so under concurrent use it is only a
    /// snapshot.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocates a fresh identifier, registers `payload` under it and returns the
    /// lease that owns the entry.
    pub fn register(&'static self, payload: Payload) -> Arc<Lease> {
        let id = ContextId::next();
        self.insert(id, payload);
        Arc::new(Lease { id, registry: self })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("len", &self.len()).finish()
    }
}

/// Ownership of one registry entry.
///
/// Created by [`Registry::register`]. Shared via `Arc` between the scope that
/// created it and every label set carrying its identifier; when the last clone is
/// dropped the entry is removed.
pub struct Lease {
    id: ContextId,
    registry: &'static Registry,
}

impl Lease {
    /// The identifier this lease keeps registered.
    #[inline]
    pub fn id(&self) -> ContextId {
        self.id
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease").field("id", &self.id).finish()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.registry.remove(self.id);
        // logwise's own thread-locals may already be gone at thread exit
        if !crate::labels::thread_exiting() {
            logwise::debuginternal_sync!("released context {id}", id = self.id.get());
        }
    }
}
