use async_trait::async_trait;
use bytes::Bytes;
use eyre::Result;
use futures_util::StreamExt;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Uri, Version, header, header::HeaderValue};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;

use crate::ports::{
    proxy_host::CapturedSession,
    upstream::{BodyStream, UpstreamClient, UpstreamError, UpstreamResponse, UpstreamResult},
};

/// Replay client using Hyper with Rustls (HTTP/1.1, plain or TLS).
///
/// Replays go out exactly as captured: the snapshot headers are sent
/// verbatim and a Host header is only synthesized when the capture lacks
/// one. Dropping the `send` future before the response head arrives aborts
/// the outbound call, which is how an expired deadline cancels a stalled
/// replay.
pub struct HyperUpstreamClient {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl HyperUpstreamClient {
    /// Create a new replay client with platform trust roots.
    pub fn new() -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        if !native_certs.certs.is_empty() {
            for cert in native_certs.certs {
                if root_cert_store.add(cert).is_err() {
                    tracing::warn!("Failed to add native certificate to rustls RootCertStore");
                }
            }
            tracing::info!("Loaded {} native root certificates.", root_cert_store.len());
        }

        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client =
            Client::builder(TokioExecutor::new()).build::<_, Full<Bytes>>(https_connector);

        tracing::info!("Created replay client (HTTP/1.1 over plain or TLS connections)");
        Ok(Self { client })
    }
}

/// Build the outbound request for one replay of a captured session.
///
/// The snapshot's method, URL, headers, and body are carried verbatim; the
/// version is pinned to HTTP/1.1 for the pooled connection.
fn build_replay_request(session: &CapturedSession) -> UpstreamResult<Request<Full<Bytes>>> {
    let mut request = Request::builder()
        .method(session.method.clone())
        .uri(session.url.clone())
        .version(Version::HTTP_11)
        .body(Full::new(session.body.clone()))
        .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;

    *request.headers_mut() = session.headers.clone();

    if !request.headers().contains_key(header::HOST) {
        let host_value = host_header_value(&session.url)?;
        request.headers_mut().insert(header::HOST, host_value);
    }

    Ok(request)
}

/// Host header for a replay URL, including a non-default port when present.
fn host_header_value(url: &Uri) -> UpstreamResult<HeaderValue> {
    let host = url
        .host()
        .ok_or_else(|| UpstreamError::InvalidRequest(format!("Replay URL has no host: {url}")))?;

    let value = match url.port() {
        Some(port) => format!("{host}:{}", port.as_u16()),
        None => host.to_string(),
    };

    HeaderValue::from_str(&value)
        .map_err(|e| UpstreamError::InvalidRequest(format!("Invalid host header value: {e}")))
}

/// Adapt a hyper response body into the port's chunk stream.
///
/// Non-data frames (trailers) are skipped; the stream ends when the body
/// does and surfaces read failures as `UpstreamError::Body`.
fn response_body_stream<B>(body: B) -> BodyStream
where
    B: hyper::body::Body<Data = Bytes> + Send + Unpin + 'static,
    B::Error: std::fmt::Display,
{
    futures_util::stream::unfold(body, |mut body| async move {
        loop {
            match body.frame().await {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        return Some((Ok(data), body));
                    }
                }
                Some(Err(err)) => {
                    return Some((Err(UpstreamError::Body(err.to_string())), body));
                }
                None => return None,
            }
        }
    })
    .boxed()
}

#[async_trait]
impl UpstreamClient for HyperUpstreamClient {
    async fn send(&self, session: &CapturedSession) -> UpstreamResult<UpstreamResponse> {
        let span = tracing::info_span!(
            "replay_request",
            http.method = %session.method,
            http.url = %session.url,
            http.status_code = tracing::field::Empty,
        );
        let _enter = span.enter();

        let request = build_replay_request(session)?;

        tracing::debug!("Outgoing replay headers: {:?}", request.headers());

        match self.client.request(request).await {
            Ok(response) => {
                let status = response.status();
                tracing::Span::current().record("http.status_code", status.as_u16());

                let (mut parts, body) = response.into_parts();
                // The body is re-framed while streaming to the caller.
                parts.headers.remove(header::TRANSFER_ENCODING);

                Ok(UpstreamResponse {
                    status,
                    headers: parts.headers,
                    body: response_body_stream(body),
                })
            }
            Err(err) => {
                tracing::Span::current().record("http.status_code", 599u16);
                tracing::error!(
                    "Replay to {} {} failed: {}",
                    session.method,
                    session.url,
                    err
                );
                Err(UpstreamError::Connection(format!(
                    "Replay to {} {} failed: {err}",
                    session.method, session.url
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use hyper::{HeaderMap, Method};

    use super::*;

    fn session(url: &'static str) -> CapturedSession {
        CapturedSession {
            method: Method::POST,
            url: Uri::from_static(url),
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"payload"),
        }
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = HyperUpstreamClient::new();
        assert!(client.is_ok());
    }

    #[test]
    fn test_replay_request_carries_the_snapshot() {
        let mut captured = session("http://example.com/orders");
        captured
            .headers
            .insert("x-trace", HeaderValue::from_static("abc123"));

        let request = build_replay_request(&captured).unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.uri(), &captured.url);
        assert_eq!(request.version(), Version::HTTP_11);
        assert_eq!(
            request.headers().get("x-trace"),
            Some(&HeaderValue::from_static("abc123"))
        );
        assert_eq!(
            request.headers().get(header::HOST),
            Some(&HeaderValue::from_static("example.com"))
        );
    }

    #[test]
    fn test_replay_request_preserves_captured_host() {
        let mut captured = session("http://example.com/orders");
        captured
            .headers
            .insert(header::HOST, HeaderValue::from_static("internal.override"));

        let request = build_replay_request(&captured).unwrap();

        assert_eq!(
            request.headers().get(header::HOST),
            Some(&HeaderValue::from_static("internal.override"))
        );
    }

    #[test]
    fn test_host_header_value_includes_port() {
        let with_port = host_header_value(&Uri::from_static("http://example.com:8080/x")).unwrap();
        assert_eq!(with_port, HeaderValue::from_static("example.com:8080"));

        let without_port = host_header_value(&Uri::from_static("http://example.com/x")).unwrap();
        assert_eq!(without_port, HeaderValue::from_static("example.com"));

        let missing = host_header_value(&Uri::from_static("/relative"));
        assert!(matches!(missing, Err(UpstreamError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_response_body_stream_yields_data_frames() {
        let mut stream = response_body_stream(Full::new(Bytes::from_static(b"hello")));

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, Bytes::from_static(b"hello"));
        assert!(stream.next().await.is_none());
    }
}
