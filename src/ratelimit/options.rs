//! Construction options for the local rate limiter.
//!
//! A limiter is assembled from an ordered list of [`LimiterOption`]s. Each
//! option validates its input and mutates a [`LimiterSettings`] value. The
//! options are applied in order and the first failing option aborts the
//! construction.

use std::time::Duration;

use super::buffer::TokenBuffer;
use crate::error::{DroplimitError, Result};

/// Default target rate in tokens per second.
pub const DEFAULT_TARGET_RATE: f64 = 1.0;
/// Default time between two generator iterations.
pub const DEFAULT_WAKE_INTERVAL: Duration = Duration::from_millis(100);
/// Default time a caller waits for a token.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(150);
/// Default maximum number of buffered tokens.
pub const DEFAULT_MAX_TOKENS: usize = 1_000;

/// A single construction step for a limiter.
pub type LimiterOption = Box<dyn FnOnce(&mut LimiterSettings) -> Result<()> + Send>;

/// The validated parameters of a local rate limiter.
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterSettings {
    /// Tokens produced per second
    pub target_rate: f64,
    /// Time between two generator iterations
    pub wake_interval: Duration,
    /// Time a caller waits for a token before giving up
    pub wait_timeout: Duration,
    /// Maximum number of buffered tokens
    pub max_tokens: usize,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            target_rate: DEFAULT_TARGET_RATE,
            wake_interval: DEFAULT_WAKE_INTERVAL,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl LimiterSettings {
    /// Apply the options in order, stopping at the first error.
    pub fn from_options<I>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = LimiterOption>,
    {
        let mut settings = Self::default();
        for option in options {
            option(&mut settings)?;
        }
        Ok(settings)
    }

    /// Check all invariants of the settings.
    ///
    /// Settings built only through options are always valid; this catches
    /// settings assembled by hand.
    pub fn validate(&self) -> Result<()> {
        check_rate(self.target_rate)?;
        check_wake_interval(self.wake_interval)?;
        check_capacity(self.max_tokens)?;
        Ok(())
    }
}

fn check_rate(rate: f64) -> Result<()> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(DroplimitError::InvalidRate(rate))
    }
}

fn check_wake_interval(interval: Duration) -> Result<()> {
    if interval.is_zero() {
        Err(DroplimitError::InvalidWakeInterval(interval))
    } else {
        Ok(())
    }
}

fn check_capacity(capacity: usize) -> Result<()> {
    if capacity == 0 || capacity > TokenBuffer::MAX_CAPACITY {
        Err(DroplimitError::InvalidCapacity {
            requested: capacity,
            max: TokenBuffer::MAX_CAPACITY,
        })
    } else {
        Ok(())
    }
}

/// Set the number of tokens produced per second.
pub fn with_target_rate(rate: f64) -> LimiterOption {
    Box::new(move |settings: &mut LimiterSettings| {
        check_rate(rate)?;
        settings.target_rate = rate;
        Ok(())
    })
}

/// Set the time between two generator iterations.
///
/// Each iteration produces the tokens earned since the previous one and
/// keeps fractional tokens for the next.
pub fn with_wake_interval(interval: Duration) -> LimiterOption {
    Box::new(move |settings: &mut LimiterSettings| {
        check_wake_interval(interval)?;
        settings.wake_interval = interval;
        Ok(())
    })
}

/// Set the time a caller waits for a token. Zero makes every check non-blocking.
pub fn with_wait_timeout(timeout: Duration) -> LimiterOption {
    Box::new(move |settings: &mut LimiterSettings| {
        settings.wait_timeout = timeout;
        Ok(())
    })
}

/// Set the maximum number of buffered tokens.
///
/// Tokens earned while the buffer is full are dropped, which keeps a service
/// from being flooded after a long period without requests.
pub fn with_max_tokens(max_tokens: usize) -> LimiterOption {
    Box::new(move |settings: &mut LimiterSettings| {
        check_capacity(max_tokens)?;
        settings.max_tokens = max_tokens;
        Ok(())
    })
}

/// Size the buffer to hold the tokens needed to sustain the target rate for
/// `duration`, but at least one token.
///
/// The capacity is computed from the target rate in effect when this option
/// is applied. Place it after [`with_target_rate`] in the option list,
/// otherwise the default rate is used.
pub fn with_max_tokens_for(duration: Duration) -> LimiterOption {
    Box::new(move |settings: &mut LimiterSettings| {
        let tokens = (settings.target_rate * duration.as_secs_f64()).floor() as usize;
        let max_tokens = tokens.max(1);
        check_capacity(max_tokens)?;
        settings.max_tokens = max_tokens;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults() {
        let settings = assert_ok!(LimiterSettings::from_options(Vec::new()));

        assert_eq!(settings.target_rate, 1.0);
        assert_eq!(settings.wake_interval, Duration::from_millis(100));
        assert_eq!(settings.wait_timeout, Duration::from_millis(150));
        assert_eq!(settings.max_tokens, 1_000);
        assert_ok!(settings.validate());
    }

    #[test]
    fn test_invalid_rates_rejected() {
        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = LimiterSettings::from_options(vec![with_target_rate(rate)]);
            assert!(
                matches!(result, Err(DroplimitError::InvalidRate(_))),
                "rate {} should be rejected",
                rate
            );
        }

        let settings = assert_ok!(LimiterSettings::from_options(vec![with_target_rate(0.5)]));
        assert_eq!(settings.target_rate, 0.5);
    }

    #[test]
    fn test_wake_interval() {
        for millis in [10, 200, 1400] {
            let interval = Duration::from_millis(millis);
            let settings =
                assert_ok!(LimiterSettings::from_options(vec![with_wake_interval(interval)]));
            assert_eq!(settings.wake_interval, interval);
        }

        let result = LimiterSettings::from_options(vec![with_wake_interval(Duration::ZERO)]);
        assert!(matches!(result, Err(DroplimitError::InvalidWakeInterval(_))));
    }

    #[test]
    fn test_zero_wait_timeout_allowed() {
        let settings =
            assert_ok!(LimiterSettings::from_options(vec![with_wait_timeout(Duration::ZERO)]));
        assert_eq!(settings.wait_timeout, Duration::ZERO);
    }

    #[test]
    fn test_max_tokens_absolute() {
        for want in [23, 42, 123] {
            let settings = assert_ok!(LimiterSettings::from_options(vec![with_max_tokens(want)]));
            assert_eq!(settings.max_tokens, want);
        }

        assert_err!(LimiterSettings::from_options(vec![with_max_tokens(0)]));
        assert_err!(LimiterSettings::from_options(vec![with_max_tokens(usize::MAX)]));
    }

    #[test]
    fn test_max_tokens_for_duration() {
        let cases = [(1_000, 100), (10_000, 1_000), (1_400, 140)];

        for (millis, want) in cases {
            let settings = assert_ok!(LimiterSettings::from_options(vec![
                with_target_rate(100.0),
                with_max_tokens_for(Duration::from_millis(millis)),
            ]));
            assert_eq!(settings.max_tokens, want);
        }
    }

    #[test]
    fn test_max_tokens_for_is_at_least_one() {
        let settings = assert_ok!(LimiterSettings::from_options(vec![
            with_target_rate(0.1),
            with_max_tokens_for(Duration::from_secs(1)),
        ]));
        assert_eq!(settings.max_tokens, 1);
    }

    #[test]
    fn test_max_tokens_for_uses_rate_in_effect() {
        // Applied before the rate, the default of 1 token per second is used.
        let settings = assert_ok!(LimiterSettings::from_options(vec![
            with_max_tokens_for(Duration::from_secs(10)),
            with_target_rate(100.0),
        ]));
        assert_eq!(settings.max_tokens, 10);
    }

    #[test]
    fn test_first_error_aborts() {
        let failing: LimiterOption =
            Box::new(|_: &mut LimiterSettings| {
                Err(DroplimitError::Config("test error".to_string()))
            });

        let result = LimiterSettings::from_options(vec![
            with_target_rate(5.0),
            failing,
            with_target_rate(-1.0),
        ]);

        assert!(matches!(result, Err(DroplimitError::Config(_))));
    }

    #[test]
    fn test_validate_hand_built_settings() {
        let settings = LimiterSettings {
            max_tokens: 0,
            ..LimiterSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(DroplimitError::InvalidCapacity { requested: 0, .. })
        ));
    }
}
