pub mod upstream_client;

/// Re-export commonly used types from adapters
pub use upstream_client::HyperUpstreamClient;
