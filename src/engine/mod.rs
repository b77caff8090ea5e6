//! Transfer engines
//!
//! An engine performs the actual network I/O. The multiplexer only needs to
//! register sessions, nudge the engine forward and collect finished
//! transfers.

pub mod http;
pub mod mock;

use std::sync::Arc;

use bytes::Bytes;

use crate::mux::error::MuxError;
use crate::mux::handle::HttpHandle;
use crate::mux::outcome::TransferCode;
use crate::request::HttpRequest;

pub use http::HttpEngine;
pub use mock::{MockBehavior, MockEngine};

/// A transfer the engine has finished with, successfully or not
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedTransfer {
    /// Token the session was registered with
    pub token: HttpHandle,
    pub code: TransferCode,
    pub status: Option<u16>,
    pub body: Bytes,
}

impl FinishedTransfer {
    pub fn ok(token: HttpHandle, status: u16, body: Bytes) -> Self {
        Self { token, code: TransferCode::OK, status: Some(status), body }
    }

    pub fn failed(token: HttpHandle, code: TransferCode) -> Self {
        Self { token, code, status: None, body: Bytes::new() }
    }
}

/// Contract between the multiplexer and the component doing network I/O.
///
/// `create_session`, `configure_session`, `register` and `destroy_session`
/// may be called from any thread. `advance_all` and `drain_finished` are only
/// called by the driver thread and must not block.
pub trait TransferEngine: Send + Sync {
    type Session: Send;

    fn create_session(&self) -> Self::Session;

    /// Apply the request description to a fresh session
    fn configure_session(&self, session: &mut Self::Session, request: &HttpRequest) -> Result<(), MuxError>;

    /// Start the transfer. Its completion is reported under `token`.
    fn register(&self, token: HttpHandle, session: &mut Self::Session) -> Result<(), MuxError>;

    /// Make whatever progress is possible right now
    fn advance_all(&self);

    /// Transfers finished since the previous call. Each is reported once.
    fn drain_finished(&self) -> Vec<FinishedTransfer>;

    /// Tear down a session, cancelling its transfer if still running
    fn destroy_session(&self, session: Self::Session);
}

/// Lets callers keep a handle on the engine the multiplexer drives
impl<E: TransferEngine> TransferEngine for Arc<E> {
    type Session = E::Session;

    fn create_session(&self) -> Self::Session {
        (**self).create_session()
    }

    fn configure_session(&self, session: &mut Self::Session, request: &HttpRequest) -> Result<(), MuxError> {
        (**self).configure_session(session, request)
    }

    fn register(&self, token: HttpHandle, session: &mut Self::Session) -> Result<(), MuxError> {
        (**self).register(token, session)
    }

    fn advance_all(&self) {
        (**self).advance_all()
    }

    fn drain_finished(&self) -> Vec<FinishedTransfer> {
        (**self).drain_finished()
    }

    fn destroy_session(&self, session: Self::Session) {
        (**self).destroy_session(session)
    }
}
