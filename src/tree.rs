//! The tree memory manager (spec §4.D): the authoritative in-memory App tree, guarded
//! by copy-on-write transactions. Translates the original's `treeMemoryManager{root,
//! tree, sync.Mutex}` (`cmd/insprd/memory/tree/manager.go`) into an explicitly
//! constructed `Mutex`-guarded tree with a `MutexGuard`-holding [`Transaction`] — no
//! lazy singleton, per the redesign in spec §9.

use crate::diff::{self, Changelog};
use crate::error::InsprError;
use crate::meta::App;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, info_span};

struct TreeState {
    committed: App,
}

/// Owns the single authoritative App tree. Only one [`Transaction`] can be open at a
/// time; `init_transaction` blocks until the previous one commits or cancels.
pub struct Tree {
    state: Mutex<TreeState>,
    next_txn_id: AtomicU64,
}

impl Tree {
    /// Constructs a tree rooted at `root`. Never call this lazily from a shared
    /// static — construct one explicitly and pass it to whatever owns it.
    pub fn new(root: App) -> Self {
        Tree {
            state: Mutex::new(TreeState { committed: root }),
            next_txn_id: AtomicU64::new(1),
        }
    }

    /// A snapshot of the committed tree, for read-only callers outside a transaction.
    pub fn perm(&self) -> App {
        self.lock_state().committed.clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, TreeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Acquires the exclusive lock and deep-copies `committed` into a fresh staging
    /// tree. Blocks until any in-progress transaction commits or cancels.
    pub fn init_transaction(&self) -> Transaction<'_> {
        let guard = self.lock_state();
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let span = info_span!("transaction", txn_id = id);
        let staging = guard.committed.clone();
        debug!(parent: &span, "transaction opened");
        Transaction {
            guard,
            staging,
            span,
        }
    }
}

/// A single open transaction. Entity manager operations mutate `staging` through
/// [`Transaction::tree_mut`]; `committed` is frozen for the transaction's lifetime
/// because this struct holds the tree's lock.
pub struct Transaction<'a> {
    guard: MutexGuard<'a, TreeState>,
    staging: App,
    span: tracing::Span,
}

impl<'a> Transaction<'a> {
    /// The staging tree: what entity managers read and mutate.
    pub fn tree(&self) -> &App {
        &self.staging
    }

    pub fn tree_mut(&mut self) -> &mut App {
        &mut self.staging
    }

    /// The committed tree as it stood when this transaction opened — "what was",
    /// for reactors that need to compare against the prior state.
    pub fn perm(&self) -> &App {
        &self.guard.committed
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// `Diff(committed, staging)`.
    pub fn changes(&self) -> Result<Changelog, InsprError> {
        diff::diff(&self.guard.committed, &self.staging)
    }

    /// Moves `staging` to `committed` and releases the lock. Callers must have
    /// already run the reactor pipeline (or deliberately skipped it for a dry run)
    /// before calling this.
    pub fn commit(mut self) {
        let _enter = self.span.enter();
        self.guard.committed = std::mem::take(&mut self.staging);
        info!("transaction committed");
    }

    /// Discards `staging` and releases the lock, leaving `committed` untouched.
    pub fn cancel(self) {
        let _enter = self.span.enter();
        debug!("transaction cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Metadata;

    fn named_root(name: &str) -> App {
        App {
            meta: Metadata {
                name: name.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn commit_replaces_committed_with_staging() {
        let tree = Tree::new(named_root("root"));
        let mut txn = tree.init_transaction();
        txn.tree_mut()
            .spec
            .apps
            .insert("child".into(), named_root("child"));
        txn.commit();
        assert!(tree.perm().spec.apps.contains_key("child"));
    }

    #[test]
    fn cancel_leaves_committed_untouched() {
        let tree = Tree::new(named_root("root"));
        let mut txn = tree.init_transaction();
        txn.tree_mut()
            .spec
            .apps
            .insert("child".into(), named_root("child"));
        txn.cancel();
        assert!(!tree.perm().spec.apps.contains_key("child"));
    }

    #[test]
    fn changes_matches_diff_between_committed_and_staging() {
        let tree = Tree::new(named_root("root"));
        let mut txn = tree.init_transaction();
        txn.tree_mut()
            .spec
            .apps
            .insert("child".into(), named_root("child"));
        let cl = txn.changes().unwrap();
        assert!(!cl.is_empty());
        txn.cancel();
    }

    #[test]
    fn transactions_are_serialized() {
        let tree = Tree::new(named_root("root"));
        let first = tree.init_transaction();
        first.cancel();
        let second = tree.init_transaction();
        second.cancel();
    }
}
