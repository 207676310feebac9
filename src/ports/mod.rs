pub mod proxy_host;
pub mod upstream;

pub use proxy_host::{
    CapturedSession, HostError, HostResult, InterceptedRequest, RequestId, ResponseSink,
};
pub use upstream::{BodyStream, UpstreamClient, UpstreamError, UpstreamResponse, UpstreamResult};
