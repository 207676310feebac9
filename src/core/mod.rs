pub mod engine;
pub mod store;
pub mod timer;

pub use engine::{
    ExchangeOutcome, MAX_RETRY_COUNT, RetryEngine, RetryError, RetryPolicy, RetryResult,
    parse_rule_timeout,
};
pub use store::{RetryAdmission, RetryState, RetryStateStore};
pub use timer::{AttemptOutcome, TimerGuard};
