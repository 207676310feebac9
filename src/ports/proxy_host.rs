use std::{fmt, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Uri};
use thiserror::Error;
use uuid::Uuid;

/// Errors a proxy host can surface while the engine drives an exchange
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HostError {
    /// The captured original session can no longer be retrieved
    #[error("Captured session unavailable: {0}")]
    SessionUnavailable(String),

    /// A response head was already committed to this sink
    #[error("Response head already committed")]
    ResponseCommitted,

    /// The host failed while relaying data to or from the caller
    #[error("Exchange error: {0}")]
    Exchange(String),
}

/// Result type alias for proxy host operations
pub type HostResult<T> = Result<T, HostError>;

/// Stable identity a proxy host assigns to one logical client request.
///
/// The id keys all retry state for that request, so it must stay unique for
/// as long as the state is live. Cloning is cheap (shared string).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(Arc<str>);

impl RequestId {
    /// Wrap an identity supplied by the host.
    pub fn new(id: impl Into<String>) -> Self {
        RequestId(Arc::from(id.into()))
    }

    /// Mint a fresh random identity, for hosts without native request ids.
    pub fn generate() -> Self {
        RequestId(Arc::from(Uuid::new_v4().to_string()))
    }

    /// Get the underlying identity as a string reference
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of the original request taken when the host intercepted it.
///
/// Replays are built from this snapshot, never from the state of an aborted
/// in-flight attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedSession {
    /// Original request method
    pub method: Method,
    /// Absolute URL the request was addressed to
    pub url: Uri,
    /// Original request headers
    pub headers: HeaderMap,
    /// Original request body, fully buffered at capture time
    pub body: Bytes,
}

/// InterceptedRequest defines the port for the request half of an exchange
/// the proxy host handed to the engine
#[async_trait]
pub trait InterceptedRequest: Send + Sync {
    /// Stable identity for this logical request
    fn id(&self) -> &RequestId;

    /// Absolute URL of the request
    fn full_url(&self) -> &str;

    /// Request method
    fn method(&self) -> &Method;

    /// Routing-rule value attached to this request, if any.
    ///
    /// When present and parseable as a positive integer it is the configured
    /// timeout in milliseconds; anything else disables retry handling.
    fn rule_value(&self) -> Option<&str>;

    /// Retrieve the session captured at interception time
    ///
    /// # Returns
    /// The original method/URL/headers/body, or an error when the host can
    /// no longer produce it
    async fn captured_session(&self) -> HostResult<CapturedSession>;

    /// Forward the request to its upstream untouched
    ///
    /// # Returns
    /// A future that resolves once the proxied response has been fully
    /// relayed to the caller, or an error if the exchange failed
    async fn pass_through(&self) -> HostResult<()>;

    /// Abort the current in-flight exchange.
    ///
    /// Called when a deadline fires; any response the aborted exchange later
    /// produces must be discarded by the host, not delivered to the caller.
    fn abort(&self);
}

/// ResponseSink defines the port for the response half of an exchange; the
/// engine writes recovered or synthetic responses through it
#[async_trait]
pub trait ResponseSink: Send {
    /// Write the response status and headers
    ///
    /// # Returns
    /// An error when a head was already committed for this exchange
    async fn write_head(&mut self, status: StatusCode, headers: HeaderMap) -> HostResult<()>;

    /// Write one body chunk
    async fn write_chunk(&mut self, chunk: Bytes) -> HostResult<()>;

    /// Complete the response normally
    async fn finish(&mut self) -> HostResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_wraps_host_identity() {
        let id = RequestId::new("req-42");
        assert_eq!(id.as_str(), "req-42");
        assert_eq!(id.to_string(), "req-42");
    }

    #[test]
    fn test_request_id_clones_compare_equal() {
        let id = RequestId::new("req-42");
        let clone = id.clone();
        assert_eq!(id, clone);
    }

    #[test]
    fn test_generated_request_ids_are_unique() {
        let first = RequestId::generate();
        let second = RequestId::generate();
        assert_ne!(first, second);
        assert!(!first.as_str().is_empty());
    }
}
