//! Request multiplexer
//!
//! Any thread may submit requests, poll for completion and release
//! transactions. A single driver thread calls [`Multiplexer::update`], which
//! advances the engine and delivers each finished transfer to its
//! transaction's callback.
//!
//! Dispatching one finished transfer happens in three steps:
//! 1. under the registry lock, detach the transaction's callback;
//! 2. run the callback with no lock held (it may call back into the
//!    multiplexer);
//! 3. under the lock again, re-check that the transaction still exists and
//!    record its outcome.
//!
//! So a caller that sees `is_completed == true` knows the callback has
//! already returned. A panicking callback is caught and logged; its
//! transaction is still completed and the rest of the batch is delivered.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::engine::{FinishedTransfer, TransferEngine};
use crate::mux::error::MuxError;
use crate::mux::handle::{HandleAllocator, HttpHandle};
use crate::mux::outcome::{Outcome, Response};
use crate::mux::registry::TransactionRegistry;
use crate::mux::stats::{MuxStats, StatsSnapshot};
use crate::mux::transaction::{CompletionCallback, Transaction};
use crate::request::HttpRequest;

/// Handles tried before giving up when wrapped values are still live
const MAX_HANDLE_ATTEMPTS: usize = 64;

pub struct Multiplexer<E: TransferEngine> {
    engine: E,
    handles: HandleAllocator,
    registry: TransactionRegistry<E::Session>,
    stats: MuxStats,
    updating: AtomicBool,
}

impl<E: TransferEngine> Multiplexer<E> {
    pub fn new(engine: E) -> Self {
        Self::with_allocator(engine, HandleAllocator::new())
    }

    pub fn with_allocator(engine: E, handles: HandleAllocator) -> Self {
        Self {
            engine,
            handles,
            registry: TransactionRegistry::new(),
            stats: MuxStats::new(),
            updating: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Submit a request. Returns as soon as the engine has accepted it.
    ///
    /// `callback` runs exactly once, on the driver thread, when the transfer
    /// ends. If the engine rejects the request no handle is issued and the
    /// callback never runs.
    pub fn add_request<F>(&self, request: HttpRequest, callback: F) -> Result<HttpHandle, MuxError>
    where
        F: FnOnce(Outcome, Response) + Send + 'static,
    {
        self.submit(request, Box::new(callback))
    }

    fn submit(&self, request: HttpRequest, callback: CompletionCallback) -> Result<HttpHandle, MuxError> {
        let mut session = self.engine.create_session();
        if let Err(e) = self.engine.configure_session(&mut session, &request) {
            log::warn!("Rejected {} {}: {}", request.method(), request.url(), e);
            self.engine.destroy_session(session);
            self.stats.record_rejected();
            return Err(e);
        }

        let handle = self.insert(Transaction::new(session, callback))?;

        // Registered only after insertion so that its finished-event always
        // finds the transaction.
        let registered = self
            .registry
            .with_transaction(handle, |tx| self.engine.register(handle, tx.session_mut()));

        match registered {
            Some(Ok(())) => {
                self.stats.record_submitted();
                log::debug!("Submitted {} {} {}", handle, request.method(), request.url());
                Ok(handle)
            }
            Some(Err(e)) => {
                log::warn!("Engine refused {} {}: {}", request.method(), request.url(), e);
                if let Some(tx) = self.registry.remove(handle) {
                    self.engine.destroy_session(tx.into_session());
                }
                self.stats.record_rejected();
                Err(e)
            }
            // The handle was never handed out, nothing else can remove it
            None => Err(MuxError::HandleNotFound(handle)),
        }
    }

    fn insert(&self, mut transaction: Transaction<E::Session>) -> Result<HttpHandle, MuxError> {
        for _ in 0..MAX_HANDLE_ATTEMPTS {
            let handle = self.handles.next();
            match self.registry.insert(handle, transaction) {
                Ok(()) => return Ok(handle),
                Err(rejected) => {
                    log::warn!("Handle {} is still live after wraparound, skipping", handle);
                    transaction = rejected;
                }
            }
        }

        log::error!("No free handle after {} attempts", MAX_HANDLE_ATTEMPTS);
        self.engine.destroy_session(transaction.into_session());
        self.stats.record_rejected();
        Err(MuxError::HandleSpaceExhausted)
    }

    /// Advance every transfer and deliver the ones that finished.
    ///
    /// Never blocks on I/O. Must be driven from one thread; an overlapping
    /// call is refused and returns 0. Returns the number of callbacks run.
    pub fn update(&self) -> usize {
        let Some(_busy) = UpdateGuard::acquire(&self.updating) else {
            log::warn!("update() called while another update is running, ignoring");
            return 0;
        };

        self.engine.advance_all();
        let finished = self.engine.drain_finished();
        finished.into_iter().filter(|event| self.dispatch(event)).count()
    }

    fn dispatch(&self, event: &FinishedTransfer) -> bool {
        let handle = event.token;
        let outcome = Outcome::from_code(event.code);

        let callback = match self.registry.with_transaction(handle, |tx| tx.take_callback()) {
            Some(Some(callback)) => callback,
            Some(None) => {
                log::warn!("Duplicate finished-event for {} ({}), ignoring", handle, outcome);
                return false;
            }
            None => {
                log::error!(
                    "Finished-event for {} ({}) has no registered transaction",
                    handle,
                    outcome
                );
                self.stats.record_orphaned();
                return false;
            }
        };

        let response = Response::new(event.status, event.body.clone());
        if panic::catch_unwind(AssertUnwindSafe(|| callback(outcome, response))).is_err() {
            log::error!("Completion callback for {} ({}) panicked", handle, outcome);
            self.stats.record_callback_panic();
        }

        match self.registry.with_transaction(handle, |tx| {
            tx.complete(outcome);
            tx.elapsed_ns()
        }) {
            Some(latency_ns) => {
                self.stats.record_outcome(outcome, latency_ns);
                log::debug!("Completed {}: {}", handle, outcome);
            }
            None => {
                log::debug!("Transaction {} released before its outcome was recorded", handle);
            }
        }
        true
    }

    /// Whether the transaction has finished and its callback has run.
    ///
    /// An unknown handle (already released, or never issued) also reports
    /// `true`, so a poller never spins forever. `true` therefore does not prove
    /// that the callback ran; use [`outcome`](Self::outcome) to tell the cases
    /// apart.
    pub fn is_completed(&self, handle: HttpHandle) -> bool {
        self.registry
            .with_transaction(handle, |tx| tx.is_completed())
            .unwrap_or(true)
    }

    /// `Ok(None)` while pending, `Ok(Some(_))` once finished
    pub fn outcome(&self, handle: HttpHandle) -> Result<Option<Outcome>, MuxError> {
        self.registry
            .with_transaction(handle, |tx| tx.outcome())
            .ok_or(MuxError::HandleNotFound(handle))
    }

    /// Remove and destroy the transaction. Returns false if it was not found.
    ///
    /// Releasing before completion cancels the transfer and its callback
    /// will not run, unless the driver has already started delivering it.
    pub fn release_transaction(&self, handle: HttpHandle) -> bool {
        match self.registry.remove(handle) {
            Some(tx) => {
                if !tx.is_completed() {
                    log::debug!("Releasing {} before completion", handle);
                }
                self.engine.destroy_session(tx.into_session());
                self.stats.record_released();
                true
            }
            None => {
                log::debug!("Release of unknown handle {}", handle);
                false
            }
        }
    }

    /// Transactions inserted and not yet released
    pub fn active_transactions(&self) -> usize {
        self.registry.len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

/// Holds the single-driver flag; released on drop, also when a callback panics
struct UpdateGuard<'a>(&'a AtomicBool);

impl<'a> UpdateGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<E: TransferEngine> Drop for Multiplexer<E> {
    fn drop(&mut self) {
        let leftover = self.registry.drain();
        if !leftover.is_empty() {
            log::info!("Destroying {} unreleased transactions", leftover.len());
        }
        for (_, tx) in leftover {
            self.engine.destroy_session(tx.into_session());
        }
    }
}
