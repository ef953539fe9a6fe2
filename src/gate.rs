//! Admission gate in front of a request handler.
//!
//! The gate asks its [`Limiter`] once per incoming request. Admitted requests
//! are forwarded, all others are answered with `429 Too Many Requests`
//! without reaching the handler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{DroplimitError, Result};
use crate::ratelimit::Limiter;

/// Status code of a forwarded request.
pub const STATUS_OK: u16 = 200;
/// Status code of a throttled request.
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// A single construction step for a gate.
pub type GateOption<L> = Box<dyn FnOnce(&mut GateSettings<L>) -> Result<()> + Send>;

/// Parameters of a gate under construction.
pub struct GateSettings<L: Limiter + ?Sized> {
    limiter: Option<Arc<L>>,
}

/// Set the limiter the gate consults.
pub fn with_limiter<L: Limiter + ?Sized + 'static>(limiter: Arc<L>) -> GateOption<L> {
    Box::new(move |settings: &mut GateSettings<L>| {
        settings.limiter = Some(limiter);
        Ok(())
    })
}

/// Outcome of the admission check for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Hand the request to the next handler
    Forward,
    /// Answer with 429 and drop the request
    Throttle,
}

impl Decision {
    /// Get the HTTP status code that represents this decision.
    pub fn status_code(&self) -> u16 {
        match self {
            Decision::Forward => STATUS_OK,
            Decision::Throttle => STATUS_TOO_MANY_REQUESTS,
        }
    }

    /// Check whether the request may be forwarded.
    pub fn is_forward(&self) -> bool {
        matches!(self, Decision::Forward)
    }
}

/// Snapshot of the decisions a gate has taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateStats {
    /// Requests that were forwarded
    pub forwarded: u64,
    /// Requests that were throttled
    pub throttled: u64,
}

/// Rate limiting gate.
pub struct RateLimitGate<L: Limiter + ?Sized> {
    limiter: Arc<L>,
    forwarded: AtomicU64,
    throttled: AtomicU64,
}

impl<L: Limiter + ?Sized> RateLimitGate<L> {
    /// Create a new gate from an ordered list of options.
    ///
    /// Fails if an option fails or no limiter was supplied.
    pub fn new<I>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = GateOption<L>>,
    {
        let mut settings = GateSettings { limiter: None };
        for option in options {
            option(&mut settings)?;
        }

        let limiter = settings.limiter.ok_or(DroplimitError::MissingLimiter)?;

        Ok(Self {
            limiter,
            forwarded: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
        })
    }

    /// Decide whether the current request may pass.
    pub async fn check(&self) -> Decision {
        if self.limiter.limit().await {
            self.forwarded.fetch_add(1, Ordering::Relaxed);
            trace!("Request forwarded");
            Decision::Forward
        } else {
            self.throttled.fetch_add(1, Ordering::Relaxed);
            debug!(
                status = STATUS_TOO_MANY_REQUESTS,
                "Request throttled by rate limiter"
            );
            Decision::Throttle
        }
    }

    /// Get the limiter behind this gate.
    pub fn limiter(&self) -> &Arc<L> {
        &self.limiter
    }

    /// Get the decisions taken so far.
    pub fn stats(&self) -> GateStats {
        GateStats {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{
        with_target_rate, with_wait_timeout, with_wake_interval, LocalLimiter,
    };
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    struct FixedLimiter(AtomicBool);

    #[async_trait]
    impl Limiter for FixedLimiter {
        async fn limit(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_missing_limiter_rejected() {
        let result = RateLimitGate::<FixedLimiter>::new(Vec::new());
        assert!(matches!(result, Err(DroplimitError::MissingLimiter)));
    }

    #[tokio::test]
    async fn test_option_error_aborts() {
        let failing: GateOption<FixedLimiter> =
            Box::new(|_: &mut GateSettings<FixedLimiter>| {
                Err(DroplimitError::Config("test error".to_string()))
            });
        let limiter = Arc::new(FixedLimiter(AtomicBool::new(true)));

        let result = RateLimitGate::new(vec![with_limiter(limiter), failing]);
        assert!(matches!(result, Err(DroplimitError::Config(_))));
    }

    #[tokio::test]
    async fn test_decision_follows_limiter() {
        let limiter = Arc::new(FixedLimiter(AtomicBool::new(true)));
        let gate = RateLimitGate::new(vec![with_limiter(limiter.clone())]).unwrap();

        assert_eq!(gate.check().await, Decision::Forward);

        limiter.0.store(false, Ordering::SeqCst);
        let decision = gate.check().await;
        assert_eq!(decision, Decision::Throttle);
        assert_eq!(decision.status_code(), 429);
        assert!(!decision.is_forward());

        assert_eq!(
            gate.stats(),
            GateStats {
                forwarded: 1,
                throttled: 1
            }
        );
    }

    #[tokio::test]
    async fn test_trait_object_limiter() {
        let limiter: Arc<dyn Limiter> = Arc::new(FixedLimiter(AtomicBool::new(true)));
        let gate = RateLimitGate::new(vec![with_limiter(limiter)]).unwrap();

        assert!(gate.check().await.is_forward());
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_limiter_behind_gate() {
        let limiter = Arc::new(
            LocalLimiter::new(vec![
                with_target_rate(20.0),
                with_wait_timeout(Duration::from_millis(15)),
                with_wake_interval(Duration::from_millis(100)),
            ])
            .unwrap(),
        );
        let gate = RateLimitGate::new(vec![with_limiter(limiter.clone())]).unwrap();

        let mut forwarded = 0;
        for _ in 0..30 {
            if gate.check().await.status_code() == STATUS_OK {
                forwarded += 1;
            }
        }

        assert!(
            (5..=7).contains(&forwarded),
            "forwarded {} requests, expected about 6",
            forwarded
        );
        assert_eq!(gate.stats().forwarded, forwarded);
        assert_eq!(gate.stats().throttled, 30 - forwarded);

        limiter.shutdown().await;
    }
}
