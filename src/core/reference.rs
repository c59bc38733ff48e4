//! Reference tables for string and trait interning
//!
//! A [`ReferenceTable`] maps a value to the position at which it was first
//! inserted. Positions are dense and strictly increasing, which is what
//! makes rollback cheap: undoing a transaction is a single truncation back
//! to the size recorded when it started.
//!
//! Two lifetimes exist:
//! - **Per message**: the string and trait tables owned by
//!   [`ObjectEncoder`](crate::core::object::ObjectEncoder), cleared after
//!   every message.
//! - **Process scoped**: the [`StringRegistry`], shared by every writer and
//!   mutated only inside a [`ChangeSession`].

use ahash::RandomState;
use indexmap::{Equivalent, IndexSet};
use parking_lot::Mutex;
use std::hash::Hash;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of [`ReferenceTable::intern`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interned {
    /// Already present at this index
    Existing(usize),
    /// Inserted at this index
    New(usize),
}

impl Interned {
    pub fn index(self) -> usize {
        match self {
            Interned::Existing(index) | Interned::New(index) => index,
        }
    }

    pub fn is_new(self) -> bool {
        matches!(self, Interned::New(_))
    }
}

/// Insertion-ordered interning table with transaction support
#[derive(Debug, Clone)]
pub struct ReferenceTable<K> {
    entries: IndexSet<K, RandomState>,
    /// Table size when the open transaction started
    snapshot: Option<usize>,
}

impl<K: Hash + Eq> Default for ReferenceTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq> ReferenceTable<K> {
    pub fn new() -> Self {
        ReferenceTable {
            entries: IndexSet::with_hasher(RandomState::new()),
            snapshot: None,
        }
    }

    /// Index of `key`, if present
    pub fn get<Q>(&self, key: &Q) -> Option<usize>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.entries.get_index_of(key)
    }

    /// Insert `key`, returning its index (existing entries keep theirs)
    pub fn put(&mut self, key: K) -> usize {
        self.entries.insert_full(key).0
    }

    /// Look `key` up, inserting an owned copy when absent
    pub fn intern<Q>(&mut self, key: &Q) -> Interned
    where
        Q: ?Sized + Hash + Equivalent<K> + ToOwned<Owned = K>,
    {
        match self.entries.get_index_of(key) {
            Some(index) => Interned::Existing(index),
            None => Interned::New(self.entries.insert_full(key.to_owned()).0),
        }
    }

    /// Key stored at `index`
    pub fn key(&self, index: usize) -> Option<&K> {
        self.entries.get_index(index)
    }

    /// Keys inserted at or after `index`, in insertion order
    pub fn keys_from(&self, index: usize) -> impl Iterator<Item = &K> {
        self.entries.iter().skip(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry (per-message reset)
    ///
    /// # Panics
    /// Panics if a transaction is open.
    pub fn clear(&mut self) {
        assert!(
            self.snapshot.is_none(),
            "cannot clear a reference table inside a transaction"
        );
        self.entries.clear();
    }

    /// Size recorded by the open transaction
    pub fn transaction_start(&self) -> Option<usize> {
        self.snapshot
    }

    /// Remember the current size so the transaction can be undone
    ///
    /// # Panics
    /// Panics if a transaction is already open.
    pub fn start_transaction(&mut self) {
        assert!(
            self.snapshot.is_none(),
            "reference table transaction already open"
        );
        self.snapshot = Some(self.entries.len());
    }

    /// Keep everything inserted since [`start_transaction`](Self::start_transaction)
    pub fn commit_transaction(&mut self) {
        assert!(self.snapshot.is_some(), "no reference table transaction open");
        self.snapshot = None;
    }

    /// Remove every entry whose index is at or past the snapshot
    pub fn rollback_transaction(&mut self) {
        let Some(snapshot) = self.snapshot.take() else {
            panic!("no reference table transaction open");
        };
        self.entries.truncate(snapshot);
    }

    /// Open a transaction that rolls back unless committed
    pub fn transaction(&mut self) -> Transaction<'_, K> {
        self.start_transaction();
        Transaction {
            table: self,
            committed: false,
        }
    }
}

/// Scoped transaction over a [`ReferenceTable`]
///
/// Dereferences to the table. Dropping the guard without calling
/// [`commit`](Transaction::commit) rolls back.
pub struct Transaction<'a, K: Hash + Eq> {
    table: &'a mut ReferenceTable<K>,
    committed: bool,
}

impl<K: Hash + Eq> Transaction<'_, K> {
    pub fn commit(mut self) {
        self.table.commit_transaction();
        self.committed = true;
    }
}

impl<K: Hash + Eq> Deref for Transaction<'_, K> {
    type Target = ReferenceTable<K>;

    fn deref(&self) -> &Self::Target {
        self.table
    }
}

impl<K: Hash + Eq> DerefMut for Transaction<'_, K> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.table
    }
}

impl<K: Hash + Eq> Drop for Transaction<'_, K> {
    fn drop(&mut self) {
        if !self.committed {
            self.table.rollback_transaction();
        }
    }
}

/// Process-scoped string table shared by all writers
///
/// Cloning yields another handle to the same table. Mutation happens only
/// through a [`ChangeSession`]; at most one may be active at a time. The
/// lock is held only for the duration of each call, so readers on any
/// handle (including the session's own thread) never wait for a session
/// to end. They see committed strings only.
#[derive(Debug, Clone, Default)]
pub struct StringRegistry {
    state: Arc<Mutex<RegistryState>>,
}

#[derive(Debug, Default)]
struct RegistryState {
    table: ReferenceTable<String>,
    active: bool,
}

impl RegistryState {
    fn committed_len(&self) -> usize {
        self.table.transaction_start().unwrap_or(self.table.len())
    }
}

impl StringRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a writer session
    ///
    /// # Panics
    /// Panics if another session is active. Callers serialize writers; a
    /// second concurrent session is a programming error, not contention.
    pub fn start_change(&self) -> ChangeSession<'_> {
        let mut state = self.state.lock();
        assert!(!state.active, "string registry change already in progress");
        state.active = true;
        state.table.start_transaction();
        ChangeSession {
            registry: self,
            finished: false,
        }
    }

    /// Check whether a session is active
    pub fn is_changing(&self) -> bool {
        self.state.lock().active
    }

    /// Index of a committed string
    pub fn get(&self, s: &str) -> Option<usize> {
        let state = self.state.lock();
        state
            .table
            .get(s)
            .filter(|&index| index < state.committed_len())
    }

    /// Number of committed strings
    pub fn len(&self) -> usize {
        self.state.lock().committed_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every string, e.g. when the renderer restarts
    ///
    /// # Panics
    /// Panics if a session is active.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        assert!(
            !state.active,
            "cannot clear the string registry while a change is in progress"
        );
        state.table.clear();
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut RegistryState) -> R) -> R {
        f(&mut self.state.lock())
    }
}

/// One writer's exclusive change to the [`StringRegistry`]
///
/// Rolls back on drop unless [`finish_change`](ChangeSession::finish_change)
/// was called.
pub struct ChangeSession<'r> {
    registry: &'r StringRegistry,
    finished: bool,
}

impl ChangeSession<'_> {
    /// Look up or add a string
    pub fn intern(&mut self, s: &str) -> Interned {
        self.registry.with_state(|state| state.table.intern(s))
    }

    /// Index of a string, including ones added in this session
    pub fn get(&self, s: &str) -> Option<usize> {
        self.registry.with_state(|state| state.table.get(s))
    }

    pub fn len(&self) -> usize {
        self.registry.with_state(|state| state.table.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Strings added in this session, in index order
    pub fn added(&self) -> Vec<String> {
        self.registry.with_state(|state| {
            state
                .table
                .keys_from(state.committed_len())
                .cloned()
                .collect()
        })
    }

    /// Number of strings added in this session
    pub fn added_count(&self) -> usize {
        self.registry
            .with_state(|state| state.table.len() - state.committed_len())
    }

    /// Commit the session
    pub fn finish_change(mut self) {
        let added = self.registry.with_state(|state| {
            let added = state.table.len() - state.committed_len();
            state.table.commit_transaction();
            state.active = false;
            added
        });
        debug!(added, "Committed string registry change");
        self.finished = true;
    }

    /// Discard everything added in this session
    pub fn rollback_change(mut self) {
        let discarded = self.end_with_rollback();
        debug!(discarded, "Rolled back string registry change");
        self.finished = true;
    }

    fn end_with_rollback(&self) -> usize {
        self.registry.with_state(|state| {
            let discarded = state.table.len() - state.committed_len();
            state.table.rollback_transaction();
            state.active = false;
            discarded
        })
    }
}

impl Drop for ChangeSession<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let discarded = self.end_with_rollback();
            warn!(
                discarded,
                "String registry change dropped without finishing; rolling back"
            );
        }
    }
}
