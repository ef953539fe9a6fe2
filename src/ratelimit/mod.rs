//! Token bucket rate limiting.

mod backend;
mod buffer;
mod generator;
mod local;
mod options;

pub use backend::Limiter;
pub use buffer::TokenBuffer;
pub use local::{GeneratorState, LocalLimiter};
pub use options::{
    with_max_tokens, with_max_tokens_for, with_target_rate, with_wait_timeout,
    with_wake_interval, LimiterOption, LimiterSettings, DEFAULT_MAX_TOKENS, DEFAULT_TARGET_RATE,
    DEFAULT_WAIT_TIMEOUT, DEFAULT_WAKE_INTERVAL,
};
