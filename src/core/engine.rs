use std::{sync::Arc, time::Duration};

use futures_util::StreamExt;
use http::{HeaderMap, StatusCode};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{
    store::{RetryAdmission, RetryStateStore},
    timer::{AttemptOutcome, TimerGuard},
};
use crate::ports::{
    proxy_host::{HostError, InterceptedRequest, RequestId, ResponseSink},
    upstream::{UpstreamClient, UpstreamError, UpstreamResponse},
};

/// Default ceiling on replays per request. The original pass-through is not
/// counted, so a fully exhausted request sees `MAX_RETRY_COUNT + 1` outbound
/// attempts in total.
pub const MAX_RETRY_COUNT: u32 = 5;

/// Tunable bound on replays per request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum replays issued per request after the original pass-through
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: MAX_RETRY_COUNT,
        }
    }
}

/// Terminal result of one guarded exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// No usable timeout rule; the request was forwarded untouched
    PassedThrough,
    /// The original pass-through finished inside its deadline
    Completed,
    /// A replay beat the deadline; its response was relayed to the caller
    Recovered {
        /// Replays issued before one succeeded
        retries: u32,
    },
    /// The retry budget ran out; the caller received a synthetic 504
    Exhausted,
}

/// Failures the engine reports back to the host.
///
/// By the time one of these is returned all retry state for the request has
/// already been removed; the error exists for the host's diagnostics.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RetryError {
    /// The transparent pass-through failed for a reason other than a timeout
    #[error("Pass-through failed: {0}")]
    PassThrough(#[source] HostError),

    /// The captured session could not be retrieved for a replay
    #[error("Captured session unavailable for replay: {0}")]
    SessionUnavailable(#[source] HostError),

    /// A replay failed on transport before its deadline
    #[error("Replay failed: {0}")]
    Upstream(#[source] UpstreamError),

    /// Relaying the winning response to the caller failed
    #[error("Response relay failed: {0}")]
    ResponseWrite(#[source] HostError),
}

/// Result type alias for engine operations
pub type RetryResult<T> = Result<T, RetryError>;

/// Parse a routing-rule value as a timeout in milliseconds.
///
/// The whole trimmed string must be a positive base-10 integer; anything
/// else (empty, zero, negative, trailing garbage) yields `None`, which
/// disables retry handling for the request.
pub fn parse_rule_timeout(rule_value: &str) -> Option<Duration> {
    rule_value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|&millis| millis > 0)
        .map(Duration::from_millis)
}

/// Drives timeout-guarded exchanges and bounded replays for a proxy host.
///
/// The engine owns its [`RetryStateStore`], so separate engine instances
/// (one per proxy instance, or per test) never share mutable state. Replays
/// go out through the injected [`UpstreamClient`].
pub struct RetryEngine {
    store: RetryStateStore,
    upstream: Arc<dyn UpstreamClient>,
    policy: RetryPolicy,
}

impl RetryEngine {
    /// Creates an engine with the default retry policy.
    pub fn new(upstream: Arc<dyn UpstreamClient>) -> Self {
        Self::with_policy(upstream, RetryPolicy::default())
    }

    /// Creates an engine with an explicit retry policy.
    pub fn with_policy(upstream: Arc<dyn UpstreamClient>, policy: RetryPolicy) -> Self {
        RetryEngine {
            store: RetryStateStore::new(),
            upstream,
            policy,
        }
    }

    /// Live retry state, mainly for host diagnostics and tests.
    pub fn store(&self) -> &RetryStateStore {
        &self.store
    }

    /// The policy this engine applies.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Handle one intercepted request end to end.
    ///
    /// Requests without a usable timeout rule are forwarded untouched and
    /// leave no state behind. Requests with one get a state record, and
    /// every attempt (pass-through first, replays after) runs under a fresh
    /// [`TimerGuard`]; expiry aborts the attempt and admits the next replay
    /// until one completes or the budget is spent. Whatever path terminates
    /// the request, its state record is removed before this returns.
    ///
    /// A duplicate id for already-live state is host misuse; the request is
    /// forwarded untouched and the live record is left alone.
    pub async fn handle_request<R, S>(&self, request: &R, sink: &mut S) -> RetryResult<ExchangeOutcome>
    where
        R: InterceptedRequest + ?Sized,
        S: ResponseSink + ?Sized,
    {
        let Some(timeout) = request.rule_value().and_then(parse_rule_timeout) else {
            debug!(id = %request.id(), "no usable timeout rule, forwarding untouched");
            return match request.pass_through().await {
                Ok(()) => Ok(ExchangeOutcome::PassedThrough),
                Err(err) => Err(RetryError::PassThrough(err)),
            };
        };

        let id = request.id().clone();
        if !self.store.insert(id.clone(), timeout).await {
            warn!(id = %id, "retry state already live for this id, forwarding untouched");
            return match request.pass_through().await {
                Ok(()) => Ok(ExchangeOutcome::PassedThrough),
                Err(err) => Err(RetryError::PassThrough(err)),
            };
        }

        let guard = TimerGuard::arm(timeout);
        match guard.run(request.pass_through()).await {
            AttemptOutcome::Completed(Ok(())) => {
                guard.disarm();
                self.store.remove(&id).await;
                Ok(ExchangeOutcome::Completed)
            }
            AttemptOutcome::Completed(Err(err)) => {
                guard.disarm();
                self.store.remove(&id).await;
                Err(RetryError::PassThrough(err))
            }
            AttemptOutcome::DeadlineExpired => {
                warn!(
                    id = %id,
                    method = %request.method(),
                    url = request.full_url(),
                    timeout_ms = timeout.as_millis() as u64,
                    "pass-through exceeded its deadline, aborting and replaying"
                );
                request.abort();
                self.replay_until_resolved(request, sink, &id, timeout).await
            }
        }
    }

    /// Bounded replay loop entered once the pass-through timed out.
    ///
    /// One iteration per replay: admit against the budget, then race an
    /// attempt rebuilt from the captured session against a fresh deadline.
    /// Only an expired deadline loops again; every other result is terminal
    /// and removes the state record on its way out.
    async fn replay_until_resolved<R, S>(
        &self,
        request: &R,
        sink: &mut S,
        id: &RequestId,
        timeout: Duration,
    ) -> RetryResult<ExchangeOutcome>
    where
        R: InterceptedRequest + ?Sized,
        S: ResponseSink + ?Sized,
    {
        loop {
            let attempt = match self.store.try_admit_retry(id, self.policy.max_retries).await {
                Some(RetryAdmission::Admitted(attempt)) => attempt,
                Some(RetryAdmission::Exhausted) | None => {
                    warn!(
                        id = %id,
                        url = request.full_url(),
                        max_retries = self.policy.max_retries,
                        "retry budget exhausted, giving up"
                    );
                    self.store.remove(id).await;
                    self.write_failure(sink, StatusCode::GATEWAY_TIMEOUT, id).await;
                    return Ok(ExchangeOutcome::Exhausted);
                }
            };

            let session = match request.captured_session().await {
                Ok(session) => session,
                Err(err) => {
                    warn!(id = %id, error = %err, "captured session unavailable, failing exchange");
                    self.store.remove(id).await;
                    self.write_failure(sink, StatusCode::BAD_GATEWAY, id).await;
                    return Err(RetryError::SessionUnavailable(err));
                }
            };

            info!(
                id = %id,
                attempt,
                method = %session.method,
                url = %session.url,
                "replaying captured request"
            );

            let guard = TimerGuard::arm(timeout);
            match guard.run(self.upstream.send(&session)).await {
                AttemptOutcome::Completed(Ok(response)) => {
                    guard.disarm();
                    self.store.remove(id).await;
                    return self.relay(sink, response, attempt).await;
                }
                AttemptOutcome::Completed(Err(err)) => {
                    guard.disarm();
                    warn!(id = %id, attempt, error = %err, "replay failed before its deadline");
                    self.store.remove(id).await;
                    self.write_failure(sink, StatusCode::BAD_GATEWAY, id).await;
                    return Err(RetryError::Upstream(err));
                }
                AttemptOutcome::DeadlineExpired => {
                    warn!(
                        id = %id,
                        attempt,
                        timeout_ms = timeout.as_millis() as u64,
                        "replay exceeded its deadline, aborting attempt"
                    );
                }
            }
        }
    }

    /// Relay a winning upstream response to the original caller.
    ///
    /// The deadline guard is already released by the time this runs; a slow
    /// body on a successful replay is not re-timed.
    async fn relay<S>(
        &self,
        sink: &mut S,
        response: UpstreamResponse,
        retries: u32,
    ) -> RetryResult<ExchangeOutcome>
    where
        S: ResponseSink + ?Sized,
    {
        let UpstreamResponse {
            status,
            headers,
            mut body,
        } = response;

        sink.write_head(status, headers)
            .await
            .map_err(RetryError::ResponseWrite)?;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(RetryError::Upstream)?;
            sink.write_chunk(chunk).await.map_err(RetryError::ResponseWrite)?;
        }
        sink.finish().await.map_err(RetryError::ResponseWrite)?;

        info!(status = %status, retries, "relayed recovered upstream response");
        Ok(ExchangeOutcome::Recovered { retries })
    }

    /// Best-effort synthetic failure response.
    ///
    /// A sink that already committed a head from an aborted attempt rejects
    /// the write; that is expected and only logged.
    async fn write_failure<S>(&self, sink: &mut S, status: StatusCode, id: &RequestId)
    where
        S: ResponseSink + ?Sized,
    {
        let write = async {
            sink.write_head(status, HeaderMap::new()).await?;
            sink.finish().await
        };
        if let Err(err) = write.await {
            debug!(id = %id, status = %status, error = %err, "skipped synthetic failure response");
        }
    }
}
