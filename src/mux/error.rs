// Error types for the multiplexer
use std::fmt;

use crate::mux::handle::HttpHandle;
use crate::mux::outcome::TransferCode;

#[derive(Debug, Clone, PartialEq)]
pub enum MuxError {
    /// No transaction is registered under this handle
    HandleNotFound(HttpHandle),

    /// The engine refused to configure or register a session
    Engine { code: TransferCode, reason: String },

    /// Every candidate handle is still owned by a live transaction
    HandleSpaceExhausted,

    /// The engine's I/O runtime could not be started
    RuntimeUnavailable(String),
}

impl MuxError {
    pub fn engine(code: TransferCode, reason: impl Into<String>) -> Self {
        Self::Engine { code, reason: reason.into() }
    }
}

impl fmt::Display for MuxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HandleNotFound(handle) => write!(f, "Transaction {} not found", handle),
            Self::Engine { code, reason } => {
                write!(f, "Transfer engine rejected request: {} ({})", reason, code)
            }
            Self::HandleSpaceExhausted => write!(f, "No free transaction handle available"),
            Self::RuntimeUnavailable(msg) => write!(f, "Transfer runtime unavailable: {}", msg),
        }
    }
}

impl std::error::Error for MuxError {}
