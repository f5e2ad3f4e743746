use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::domain::transaction::{DeclineCategory, Transaction};
use crate::error::{RetryError, RetryResult};

/// Thread-safe in-memory storage for transactions.
///
/// Every read hands out an owned clone, so callers can never mutate the
/// canonical record through a returned value. A secondary index
/// (`pending_ids`) tracks transactions in retryable states, giving the
/// scheduler O(pending) lookups instead of O(total) scans. One lock covers
/// the map and the index so they can never drift apart.
pub struct TransactionStore {
    inner: RwLock<StoreInner>,
}

struct StoreInner {
    transactions: HashMap<String, Transaction>,
    pending_ids: HashSet<String>,
}

impl StoreInner {
    fn update_pending_index(&mut self, id: &str) {
        let pending = self.transactions.get(id).map(|tx| tx.status.is_pending()).unwrap_or(false);
        if pending {
            self.pending_ids.insert(id.to_string());
        } else {
            self.pending_ids.remove(id);
        }
    }
}

impl TransactionStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                transactions: HashMap::new(),
                pending_ids: HashSet::new(),
            }),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Atomically store a transaction unless the ID is already taken. This
    /// is the submission-idempotency primitive: there is no separate
    /// exists-then-save window.
    pub fn save_if_absent(&self, tx: &Transaction) -> RetryResult<()> {
        let mut inner = self.write();
        if inner.transactions.contains_key(&tx.id) {
            return Err(RetryError::AlreadyExists(tx.id.clone()));
        }
        inner.transactions.insert(tx.id.clone(), tx.clone());
        inner.update_pending_index(&tx.id);
        Ok(())
    }

    /// Atomically read a transaction, run the mutator on a scratch copy and
    /// install the result. The mutator executes inside the write lock, so
    /// read-modify-write sequences are linearizable with respect to
    /// concurrent writers. On mutator error nothing is installed. Returns
    /// the committed copy.
    pub fn update<F>(&self, id: &str, mutator: F) -> RetryResult<Transaction>
    where
        F: FnOnce(&mut Transaction) -> RetryResult<()>,
    {
        let mut inner = self.write();
        let mut scratch = match inner.transactions.get(id) {
            Some(tx) => tx.clone(),
            None => return Err(RetryError::NotFound(id.to_string())),
        };
        mutator(&mut scratch)?;
        inner.transactions.insert(id.to_string(), scratch.clone());
        inner.update_pending_index(id);
        Ok(scratch)
    }

    pub fn get(&self, id: &str) -> RetryResult<Transaction> {
        self.read()
            .transactions
            .get(id)
            .cloned()
            .ok_or_else(|| RetryError::NotFound(id.to_string()))
    }

    pub fn exists(&self, id: &str) -> bool {
        self.read().transactions.contains_key(id)
    }

    /// All transactions, optionally filtered by status name, newest first.
    pub fn list(&self, status: Option<&str>) -> Vec<Transaction> {
        let inner = self.read();
        let mut result: Vec<Transaction> = inner
            .transactions
            .values()
            .filter(|tx| status.map(|s| tx.status.as_str() == s).unwrap_or(true))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result
    }

    pub fn get_all(&self) -> Vec<Transaction> {
        self.list(None)
    }

    /// Transactions in a retryable state, via the pending index.
    pub fn get_pending(&self) -> Vec<Transaction> {
        let inner = self.read();
        inner
            .pending_ids
            .iter()
            .filter_map(|id| inner.transactions.get(id).cloned())
            .collect()
    }

    /// Pending transactions whose `next_retry_at` is at or before `before`.
    pub fn get_due(&self, before: DateTime<Utc>) -> Vec<Transaction> {
        let inner = self.read();
        inner
            .pending_ids
            .iter()
            .filter_map(|id| inner.transactions.get(id))
            .filter(|tx| tx.next_retry_at.map(|at| at <= before).unwrap_or(false))
            .cloned()
            .collect()
    }

    pub fn get_all_soft_declines(&self) -> Vec<Transaction> {
        let inner = self.read();
        inner
            .transactions
            .values()
            .filter(|tx| tx.decline_category == DeclineCategory::Soft)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.read().transactions.len()
    }

    /// Drop everything; used by seed/reset.
    pub fn clear(&self) {
        let mut inner = self.write();
        inner.transactions.clear();
        inner.pending_ids.clear();
    }
}

impl Default for TransactionStore {
    fn default() -> Self {
        Self::new()
    }
}
