//! Volley - request-level timeout-and-retry middleware for intercepting proxies.
//!
//! Volley sits inside a forward or intercepting proxy and enforces an optional
//! per-request response deadline: when the upstream does not complete within the
//! configured window, the in-flight exchange is aborted and the original request
//! is replayed against the upstream from its captured snapshot, up to a bounded
//! number of attempts. The crate follows a **hexagonal architecture**: the proxy
//! host and the outbound transport are ports, the retry state machine is core.
//!
//! # Features
//! - Per-request deadline taken from the host's routing-rule value (milliseconds)
//! - Bounded automatic replays with verbatim method/URL/headers/body fidelity
//! - Exactly-once resolution of the completion/expiry race per attempt
//! - Retry state keyed by request identity, isolated per engine instance
//! - Synthetic 504 on budget exhaustion, 502 on unrecoverable replay failures
//! - Hyper + rustls replay client with platform trust roots
//! - Structured tracing via `tracing` and file-based configuration loading
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use volley::{HyperUpstreamClient, RetryEngine};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let upstream = Arc::new(HyperUpstreamClient::new()?);
//! let engine = RetryEngine::new(upstream);
//! // Wire `engine.handle_request(request, sink)` into your proxy host's
//! // interception callback; see the `ports` module for the two traits the
//! // host implements.
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping the retry logic inside `core`. A proxy host implements
//! [`ports::InterceptedRequest`] and [`ports::ResponseSink`]; replays go out
//! through [`ports::UpstreamClient`], for which [`HyperUpstreamClient`] is the
//! provided implementation.
//!
//! # Error Handling
//! All fallible APIs return a domain specific error type or `eyre::Result<T>`
//! for construction and configuration loading, with context attached using
//! `WrapErr` where it helps debugging.
//!
//! # Concurrency & Data Structures
//! Retry state lives in an `scc::HashMap` keyed by request identity, so
//! per-key updates are atomic without cross-key locking; each attempt races
//! its deadline through a cancellation-token backed guard.
pub mod config;
pub mod ports;
pub mod tracing_setup;

// These modules are implementation details and should not be directly used by users
pub mod adapters;
pub mod core;

// Re-export the types a proxy host needs to embed the middleware
pub use crate::{
    adapters::HyperUpstreamClient,
    core::{
        AttemptOutcome, ExchangeOutcome, MAX_RETRY_COUNT, RetryEngine, RetryError, RetryPolicy,
        RetryStateStore, TimerGuard,
    },
    ports::{
        CapturedSession, HostError, InterceptedRequest, RequestId, ResponseSink, UpstreamClient,
        UpstreamError, UpstreamResponse,
    },
};
