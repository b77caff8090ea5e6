//! Request descriptors
//!
//! Inert value objects describing one outbound request. They are built by the
//! caller, handed to `Multiplexer::add_request` by value and never mutated
//! afterwards.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Patch => "PATCH",
        }
    }

    /// Whether a body attached to the request is sent on the wire
    pub fn allows_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch | Method::Delete)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            "PATCH" => Ok(Method::Patch),
            other => Err(format!("Unsupported method: {}", other)),
        }
    }
}

/// Description of a single request: target, method, optional body and timeout
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    url: String,
    method: Method,
    body: Option<Bytes>,
    timeout: Option<Duration>,
    headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn new(url: impl Into<String>, method: Method) -> Self {
        Self {
            url: url.into(),
            method,
            body: None,
            timeout: None,
            headers: Vec::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url, Method::Get)
    }

    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(url, Method::Post).with_body(body)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// A zero duration means "no timeout"
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Body to send. Always `None` for methods that carry no body.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref().filter(|_| self.method.allows_body())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("POST".parse::<Method>().unwrap(), Method::Post);
        assert!("BREW".parse::<Method>().is_err());
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }

    #[test]
    fn test_body_only_for_body_methods() {
        let get = HttpRequest::get("http://localhost/").with_body("ignored");
        assert!(get.body().is_none());

        let post = HttpRequest::post("http://localhost/", "payload");
        assert_eq!(post.body().map(|b| b.as_ref()), Some(&b"payload"[..]));
    }

    #[test]
    fn test_zero_timeout_is_none() {
        let req = HttpRequest::get("http://localhost/").with_timeout(Duration::ZERO);
        assert_eq!(req.timeout(), None);

        let req = req.with_timeout(Duration::from_secs(1));
        assert_eq!(req.timeout(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_headers_keep_order() {
        let req = HttpRequest::get("http://localhost/")
            .with_header("accept", "text/plain")
            .with_header("x-trace", "1");

        assert_eq!(req.headers()[0], ("accept".to_string(), "text/plain".to_string()));
        assert_eq!(req.headers().len(), 2);
        assert_eq!(req.method(), Method::Get);
        assert_eq!(req.url(), "http://localhost/");
    }
}
