use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use http::{HeaderMap, StatusCode};
use thiserror::Error;

use super::proxy_host::CapturedSession;

/// Errors that can occur while replaying a request against its upstream
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UpstreamError {
    /// Error when the connection to the upstream fails
    #[error("Connection error: {0}")]
    Connection(String),

    /// Error when the replay request cannot be constructed
    #[error("Invalid replay request: {0}")]
    InvalidRequest(String),

    /// Error while reading the upstream response body
    #[error("Body error: {0}")]
    Body(String),
}

/// Result type alias for upstream operations
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Streaming response body yielded chunk by chunk until the upstream closes it
pub type BodyStream = BoxStream<'static, UpstreamResult<Bytes>>;

/// Response head plus streaming body produced by a replayed request
pub struct UpstreamResponse {
    /// Upstream status code
    pub status: StatusCode,
    /// Upstream response headers
    pub headers: HeaderMap,
    /// Response body stream
    pub body: BodyStream,
}

/// UpstreamClient defines the port for issuing a brand-new outbound request
/// built from a captured session
#[async_trait]
pub trait UpstreamClient: Send + Sync + 'static {
    /// Replay a captured session against its upstream
    ///
    /// The future resolves when the response head arrives; the body is
    /// consumed from the returned stream afterwards. Dropping the future
    /// before it resolves aborts the outbound call, which is how an expired
    /// deadline cancels a stalled replay.
    ///
    /// # Arguments
    /// * `session` - The captured method/URL/headers/body to reissue verbatim
    ///
    /// # Returns
    /// The upstream response head and body stream, or an error
    async fn send(&self, session: &CapturedSession) -> UpstreamResult<UpstreamResponse>;
}
