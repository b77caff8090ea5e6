//! Thread-safe handle -> transaction table
//!
//! The registry is the only owner of live transactions. Callers borrow a
//! transaction through a closure that runs inside the critical section, so a
//! reference can never outlive the lock. `remove` is the only way out.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::mux::handle::HttpHandle;
use crate::mux::transaction::Transaction;

pub struct TransactionRegistry<S> {
    entries: Mutex<HashMap<HttpHandle, Transaction<S>>>,
}

impl<S> TransactionRegistry<S> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    // Every critical section is one map operation, so a poisoned map is still consistent
    fn lock(&self) -> MutexGuard<'_, HashMap<HttpHandle, Transaction<S>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take ownership of `transaction` under `handle`.
    ///
    /// A handle that is still live is never overwritten; the transaction is
    /// handed back instead.
    pub fn insert(&self, handle: HttpHandle, transaction: Transaction<S>) -> Result<(), Transaction<S>> {
        let mut entries = self.lock();
        if entries.contains_key(&handle) {
            return Err(transaction);
        }
        entries.insert(handle, transaction);
        Ok(())
    }

    /// Run `f` on the transaction while the registry lock is held
    pub fn with_transaction<R>(
        &self,
        handle: HttpHandle,
        f: impl FnOnce(&mut Transaction<S>) -> R,
    ) -> Option<R> {
        self.lock().get_mut(&handle).map(f)
    }

    /// Detach the transaction and return ownership to the caller
    pub fn remove(&self, handle: HttpHandle) -> Option<Transaction<S>> {
        self.lock().remove(&handle)
    }

    pub fn contains(&self, handle: HttpHandle) -> bool {
        self.lock().contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove every transaction, e.g. on shutdown
    pub fn drain(&self) -> Vec<(HttpHandle, Transaction<S>)> {
        self.lock().drain().collect()
    }
}

impl<S> Default for TransactionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
