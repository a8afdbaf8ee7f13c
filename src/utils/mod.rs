/// Shared helpers for talking to slow, eventually consistent backends
pub mod polling;
pub mod retry;

pub use polling::{Clock, PollResult, PollingConfig, TokioClock};
pub use retry::{retry_with_backoff, RetryConfig};
