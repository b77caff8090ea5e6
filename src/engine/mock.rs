//! Mock engine for testing
//!
//! Scripted per URL (or by a default), with no network access. Timeouts set
//! on the request are enforced in `advance_all`, like a real engine would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;

use super::{FinishedTransfer, TransferEngine};
use crate::mux::error::MuxError;
use crate::mux::handle::HttpHandle;
use crate::mux::outcome::TransferCode;
use crate::request::HttpRequest;

/// How a mocked transfer ends
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Finish on the first advance after registration
    Respond { status: u16, body: Bytes },
    /// Finish once `delay` has passed since registration
    RespondAfter { delay: Duration, status: u16, body: Bytes },
    /// Fail on the first advance with the given code
    Fail(TransferCode),
    /// Never finish unless the request has a timeout
    Hang,
}

impl MockBehavior {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        MockBehavior::Respond { status: 200, body: body.into() }
    }
}

#[derive(Debug, Default)]
pub struct MockSession {
    request: Option<HttpRequest>,
    token: Option<HttpHandle>,
}

impl MockSession {
    pub fn request(&self) -> Option<&HttpRequest> {
        self.request.as_ref()
    }

    pub fn token(&self) -> Option<HttpHandle> {
        self.token
    }
}

struct ActiveTransfer {
    behavior: MockBehavior,
    registered_at: Instant,
    timeout: Option<Duration>,
}

impl ActiveTransfer {
    /// The finished-event for this transfer, if it is due at `now`
    fn poll(&self, token: HttpHandle, now: Instant) -> Option<FinishedTransfer> {
        let deadline = self.timeout.map(|t| self.registered_at + t);
        let ready_at = match &self.behavior {
            MockBehavior::Respond { .. } | MockBehavior::Fail(_) => Some(self.registered_at),
            MockBehavior::RespondAfter { delay, .. } => Some(self.registered_at + *delay),
            MockBehavior::Hang => None,
        };

        if let Some(deadline) = deadline {
            let beats_response = ready_at.map_or(true, |ready| ready > deadline);
            if now >= deadline && beats_response {
                return Some(FinishedTransfer::failed(token, TransferCode::OPERATION_TIMEDOUT));
            }
        }

        if ready_at.map_or(false, |ready| now >= ready) {
            return Some(match &self.behavior {
                MockBehavior::Respond { status, body }
                | MockBehavior::RespondAfter { status, body, .. } => {
                    FinishedTransfer::ok(token, *status, body.clone())
                }
                MockBehavior::Fail(code) => FinishedTransfer::failed(token, *code),
                MockBehavior::Hang => return None,
            });
        }
        None
    }
}

pub struct MockEngine {
    default_behavior: Mutex<MockBehavior>,
    by_url: Mutex<HashMap<String, MockBehavior>>,
    active: Mutex<HashMap<HttpHandle, ActiveTransfer>>,
    finished: Mutex<Vec<FinishedTransfer>>,
    registrations: AtomicUsize,
    advances: AtomicUsize,
    destroyed: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockEngine {
    /// Every request succeeds with status 200 and an empty body
    pub fn new() -> Self {
        Self::with_default(MockBehavior::ok(Bytes::new()))
    }

    pub fn with_default(behavior: MockBehavior) -> Self {
        Self {
            default_behavior: Mutex::new(behavior),
            by_url: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
            finished: Mutex::new(Vec::new()),
            registrations: AtomicUsize::new(0),
            advances: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
        }
    }

    pub fn set_default_behavior(&self, behavior: MockBehavior) {
        *lock(&self.default_behavior) = behavior;
    }

    /// Script the behavior for one URL; applies to sessions registered afterwards
    pub fn set_behavior(&self, url: &str, behavior: MockBehavior) {
        lock(&self.by_url).insert(url.to_string(), behavior);
    }

    /// Queue an arbitrary finished-event, as if the engine produced it
    pub fn inject(&self, event: FinishedTransfer) {
        lock(&self.finished).push(event);
    }

    fn behavior_for(&self, url: &str) -> MockBehavior {
        lock(&self.by_url)
            .get(url)
            .cloned()
            .unwrap_or_else(|| lock(&self.default_behavior).clone())
    }

    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn advances(&self) -> usize {
        self.advances.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Registered transfers that have not finished yet
    pub fn active_count(&self) -> usize {
        lock(&self.active).len()
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferEngine for MockEngine {
    type Session = MockSession;

    fn create_session(&self) -> MockSession {
        MockSession::default()
    }

    fn configure_session(&self, session: &mut MockSession, request: &HttpRequest) -> Result<(), MuxError> {
        if !request.url().contains("://") {
            return Err(MuxError::engine(
                TransferCode::URL_MALFORMAT,
                format!("not an absolute URL: {:?}", request.url()),
            ));
        }
        session.request = Some(request.clone());
        Ok(())
    }

    fn register(&self, token: HttpHandle, session: &mut MockSession) -> Result<(), MuxError> {
        let request = session.request.as_ref().ok_or_else(|| {
            MuxError::engine(TransferCode::URL_MALFORMAT, "session registered before configuration")
        })?;

        let transfer = ActiveTransfer {
            behavior: self.behavior_for(request.url()),
            registered_at: Instant::now(),
            timeout: request.timeout(),
        };
        log::debug!("[mock] register {} {} {}", token, request.method(), request.url());

        session.token = Some(token);
        lock(&self.active).insert(token, transfer);
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn advance_all(&self) {
        self.advances.fetch_add(1, Ordering::SeqCst);
        let now = Instant::now();

        let mut active = lock(&self.active);
        let mut finished = lock(&self.finished);
        active.retain(|token, transfer| match transfer.poll(*token, now) {
            Some(event) => {
                finished.push(event);
                false
            }
            None => true,
        });
    }

    fn drain_finished(&self) -> Vec<FinishedTransfer> {
        std::mem::take(&mut *lock(&self.finished))
    }

    fn destroy_session(&self, session: MockSession) {
        if let Some(token) = session.token {
            if lock(&self.active).remove(&token).is_some() {
                log::debug!("[mock] cancelled running transfer {}", token);
            }
        }
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}
