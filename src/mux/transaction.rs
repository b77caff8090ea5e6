//! Per-request transaction state
//!
//! A transaction owns the engine session for one request, the completion
//! callback and the write-once terminal outcome.

use std::sync::OnceLock;

use crate::mux::outcome::{Outcome, Response};
use crate::mux::stats::LatencyTimer;

/// Continuation run once when the transfer finishes
pub type CompletionCallback = Box<dyn FnOnce(Outcome, Response) + Send + 'static>;

pub struct Transaction<S> {
    session: S,
    callback: Option<CompletionCallback>,
    outcome: OnceLock<Outcome>,
    timer: LatencyTimer,
}

impl<S> Transaction<S> {
    pub fn new(session: S, callback: CompletionCallback) -> Self {
        Self {
            session,
            callback: Some(callback),
            outcome: OnceLock::new(),
            timer: LatencyTimer::start(),
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }

    /// Deliver the outcome: run the callback, then mark the transaction done.
    ///
    /// Returns false if an outcome was already delivered; the callback is not
    /// run a second time.
    pub fn record_outcome(&mut self, outcome: Outcome, response: Response) -> bool {
        match self.take_callback() {
            Some(callback) => {
                callback(outcome, response);
                self.complete(outcome)
            }
            None => false,
        }
    }

    /// First half of [`record_outcome`](Self::record_outcome): detach the
    /// callback so it can run without any lock held. `None` once taken.
    pub fn take_callback(&mut self) -> Option<CompletionCallback> {
        self.callback.take()
    }

    /// Second half of [`record_outcome`](Self::record_outcome).
    /// Only the first outcome sticks.
    pub fn complete(&mut self, outcome: Outcome) -> bool {
        self.outcome.set(outcome).is_ok()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome.get().copied()
    }

    pub fn is_completed(&self) -> bool {
        self.outcome.get().is_some()
    }

    pub fn is_ok(&self) -> bool {
        self.outcome().map_or(false, |o| o.is_ok())
    }

    pub fn is_timeout(&self) -> bool {
        self.outcome().map_or(false, |o| o.is_timeout())
    }

    /// Time since submission
    pub fn elapsed_ns(&self) -> u64 {
        self.timer.elapsed_ns()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mux::outcome::TransferCode;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn counting_tx(counter: Arc<AtomicUsize>) -> Transaction<()> {
        Transaction::new(
            (),
            Box::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_pending_transaction() {
        let tx = counting_tx(Arc::new(AtomicUsize::new(0)));

        assert!(!tx.is_completed());
        assert!(!tx.is_ok());
        assert!(!tx.is_timeout());
        assert_eq!(tx.outcome(), None);
    }

    #[test]
    fn test_record_outcome_runs_callback_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut tx = counting_tx(calls.clone());

        assert!(tx.record_outcome(Outcome::Ok, Response::empty()));
        assert!(!tx.record_outcome(Outcome::Timeout, Response::empty()));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(tx.is_ok());
        assert!(!tx.is_timeout());
    }

    #[test]
    fn test_callback_receives_outcome_and_payload() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let mut tx = Transaction::new(
            (),
            Box::new(move |outcome, response: Response| {
                *sink.lock().unwrap() = Some((outcome, response.body));
            }),
        );

        tx.record_outcome(Outcome::Ok, Response::new(Some(200), Bytes::from_static(b"ok")));

        let seen = seen.lock().unwrap().take().unwrap();
        assert_eq!(seen.0, Outcome::Ok);
        assert_eq!(&seen.1[..], b"ok");
    }

    #[test]
    fn test_callback_runs_before_completion_flag() {
        let mut tx = Transaction::new((), Box::new(|_, _| {}));

        let callback = tx.take_callback().unwrap();
        assert!(tx.take_callback().is_none());
        assert!(!tx.is_completed());

        callback(Outcome::Timeout, Response::empty());
        assert!(tx.complete(Outcome::Timeout));
        assert!(tx.is_timeout());
    }

    #[test]
    fn test_outcome_is_write_once() {
        let mut tx = Transaction::new((), Box::new(|_, _| {}));
        let err = Outcome::TransportError(TransferCode::COULDNT_CONNECT);

        assert!(tx.complete(err));
        assert!(!tx.complete(Outcome::Ok));
        assert_eq!(tx.outcome(), Some(err));
    }

    #[test]
    fn test_session_ownership() {
        let mut tx = Transaction::new(vec![1u8], Box::new(|_, _| {}));
        tx.session_mut().push(2);

        assert_eq!(tx.session(), &vec![1, 2]);
        assert_eq!(tx.into_session(), vec![1, 2]);
    }
}
