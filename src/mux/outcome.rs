//! Terminal outcomes of a transfer

use std::borrow::Cow;
use std::fmt;

use bytes::Bytes;
use serde::Serialize;

/// Raw result code reported by a transfer engine.
///
/// Numbering follows libcurl's `CURLcode` so codes stay recognisable in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TransferCode(pub i32);

impl TransferCode {
    pub const OK: TransferCode = TransferCode(0);
    pub const UNSUPPORTED_PROTOCOL: TransferCode = TransferCode(1);
    pub const URL_MALFORMAT: TransferCode = TransferCode(3);
    pub const COULDNT_RESOLVE_HOST: TransferCode = TransferCode(6);
    pub const COULDNT_CONNECT: TransferCode = TransferCode(7);
    pub const OPERATION_TIMEDOUT: TransferCode = TransferCode(28);
    pub const TOO_MANY_REDIRECTS: TransferCode = TransferCode(47);
    pub const SEND_ERROR: TransferCode = TransferCode(55);
    pub const RECV_ERROR: TransferCode = TransferCode(56);

    pub fn as_i32(&self) -> i32 {
        self.0
    }

    pub fn describe(&self) -> &'static str {
        match *self {
            Self::OK => "ok",
            Self::UNSUPPORTED_PROTOCOL => "unsupported protocol",
            Self::URL_MALFORMAT => "malformed url",
            Self::COULDNT_RESOLVE_HOST => "could not resolve host",
            Self::COULDNT_CONNECT => "could not connect",
            Self::OPERATION_TIMEDOUT => "operation timed out",
            Self::TOO_MANY_REDIRECTS => "too many redirects",
            Self::SEND_ERROR => "send error",
            Self::RECV_ERROR => "receive error",
            _ => "transport error",
        }
    }
}

impl fmt::Display for TransferCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.describe())
    }
}

/// Final result of a transaction. Once recorded it never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "code", rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    TransportError(TransferCode),
    Timeout,
}

impl Outcome {
    pub fn from_code(code: TransferCode) -> Self {
        match code {
            TransferCode::OK => Outcome::Ok,
            TransferCode::OPERATION_TIMEDOUT => Outcome::Timeout,
            other => Outcome::TransportError(other),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Outcome::Timeout)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ok => f.write_str("ok"),
            Outcome::Timeout => f.write_str("timeout"),
            Outcome::TransportError(code) => write!(f, "transport error {}", code),
        }
    }
}

/// Data received for a finished transfer.
///
/// An HTTP error status still counts as a completed transfer; `status` is
/// `None` when no response head was received at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub status: Option<u16>,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: Option<u16>, body: Bytes) -> Self {
        Self { status, body }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_code() {
        assert_eq!(Outcome::from_code(TransferCode::OK), Outcome::Ok);
        assert_eq!(Outcome::from_code(TransferCode::OPERATION_TIMEDOUT), Outcome::Timeout);
        assert_eq!(
            Outcome::from_code(TransferCode::COULDNT_CONNECT),
            Outcome::TransportError(TransferCode::COULDNT_CONNECT)
        );
        assert_eq!(
            Outcome::from_code(TransferCode(9999)),
            Outcome::TransportError(TransferCode(9999))
        );
    }

    #[test]
    fn test_outcome_predicates() {
        assert!(Outcome::Ok.is_ok());
        assert!(!Outcome::Ok.is_timeout());
        assert!(Outcome::Timeout.is_timeout());
        assert!(!Outcome::TransportError(TransferCode::SEND_ERROR).is_ok());
    }

    #[test]
    fn test_outcome_json() {
        let json = serde_json::to_value(Outcome::TransportError(TransferCode(7))).unwrap();
        assert_eq!(json["outcome"], "transport_error");
        assert_eq!(json["code"], 7);

        let json = serde_json::to_value(Outcome::Timeout).unwrap();
        assert_eq!(json["outcome"], "timeout");
    }

    #[test]
    fn test_response_text() {
        let resp = Response::new(Some(200), Bytes::from_static(b"ok"));
        assert_eq!(resp.text(), "ok");
        assert_eq!(resp.len(), 2);
        assert!(Response::empty().is_empty());
        assert_eq!(TransferCode::COULDNT_CONNECT.to_string(), "7 (could not connect)");
    }
}
