//! Exclusive row lock table with no-wait acquisition.
//!
//! A lock request never queues: it either takes the row immediately or
//! fails with [`StoreError::LockUnavailable`] naming the current holder.
//! Locks are released in bulk when the owning transaction ends.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::schema::RowKey;
use crate::txn::TxnId;

/// Outcome of a successful acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// The lock was free and now belongs to the caller.
    Granted,
    /// The caller already held the lock.
    AlreadyHeld,
}

/// Lock table mapping each locked row to its holder.
#[derive(Debug, Default)]
pub struct RowLockTable {
    locks: Mutex<HashMap<RowKey, TxnId>>,
}

impl RowLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the exclusive lock on `key` for `txn`, or fails immediately.
    pub fn try_acquire(&self, txn: TxnId, key: &RowKey) -> StoreResult<Acquired> {
        let mut locks = self.locks.lock();
        match locks.get(key) {
            None => {
                locks.insert(key.clone(), txn);
                Ok(Acquired::Granted)
            }
            Some(holder) if *holder == txn => Ok(Acquired::AlreadyHeld),
            Some(holder) => Err(StoreError::LockUnavailable {
                key: key.clone(),
                holder: *holder,
            }),
        }
    }

    /// Returns true if `txn` currently holds the lock on `key`.
    pub fn holds(&self, txn: TxnId, key: &RowKey) -> bool {
        self.locks.lock().get(key) == Some(&txn)
    }

    /// Current holder of the lock on `key`, if any.
    pub fn holder(&self, key: &RowKey) -> Option<TxnId> {
        self.locks.lock().get(key).copied()
    }

    /// Releases the given keys if they are held by `txn`.
    pub fn release_all(&self, txn: TxnId, keys: &[RowKey]) {
        let mut locks = self.locks.lock();
        for key in keys {
            if locks.get(key) == Some(&txn) {
                locks.remove(key);
            }
        }
    }

    /// Number of rows currently locked.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_holder_fails_fast() {
        let table = RowLockTable::new();
        let key = RowKey::Book(7);

        assert_eq!(table.try_acquire(TxnId(1), &key), Ok(Acquired::Granted));
        assert_eq!(
            table.try_acquire(TxnId(2), &key),
            Err(StoreError::LockUnavailable {
                key: key.clone(),
                holder: TxnId(1),
            })
        );
        assert_eq!(table.holder(&key), Some(TxnId(1)));
    }

    #[test]
    fn reacquire_by_holder_is_idempotent() {
        let table = RowLockTable::new();
        let key = RowKey::User("ann".to_string());

        table.try_acquire(TxnId(1), &key).unwrap();
        assert_eq!(table.try_acquire(TxnId(1), &key), Ok(Acquired::AlreadyHeld));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn release_only_drops_own_locks() {
        let table = RowLockTable::new();
        let mine = RowKey::Book(1);
        let theirs = RowKey::Book(2);

        table.try_acquire(TxnId(1), &mine).unwrap();
        table.try_acquire(TxnId(2), &theirs).unwrap();

        table.release_all(TxnId(1), &[mine.clone(), theirs.clone()]);

        assert!(!table.holds(TxnId(1), &mine));
        assert!(table.holds(TxnId(2), &theirs));
        assert_eq!(table.try_acquire(TxnId(3), &mine), Ok(Acquired::Granted));
    }
}
