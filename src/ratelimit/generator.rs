//! Background token generation.

use std::sync::Weak;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use super::buffer::TokenBuffer;
use super::local::Shared;

/// Converts elapsed time into whole tokens.
///
/// Fractional tokens are carried over to the next iteration, so low rates
/// still produce tokens instead of being truncated to zero every time.
#[derive(Debug)]
pub(crate) struct Replenisher {
    /// Tokens per second
    rate: f64,
    /// Earned but not yet materialized fraction of a token
    carry: f64,
}

impl Replenisher {
    pub(crate) fn new(rate: f64) -> Self {
        Self { rate, carry: 0.0 }
    }

    pub(crate) fn carry(&self) -> f64 {
        self.carry
    }

    /// Push the tokens earned during `elapsed` into `buffer`.
    ///
    /// Returns the number of tokens added. When the buffer cannot take all
    /// earned tokens the excess and the carry are discarded.
    pub(crate) fn replenish(&mut self, elapsed: Duration, buffer: &TokenBuffer) -> usize {
        let earned = elapsed.as_secs_f64() * self.rate + self.carry;
        let whole = earned.floor();
        let room = buffer.room();

        let to_add = if whole >= room as f64 { room } else { whole as usize };
        let added = buffer.fill(to_add);

        if added as f64 == whole {
            self.carry = earned - whole;
        } else {
            self.carry = 0.0;
        }

        added
    }
}

/// Generator loop, runs until the limiter is stopped or dropped.
///
/// Only a weak reference to the limiter state is held, so a limiter that is
/// dropped without being stopped does not keep its generator alive.
pub(crate) async fn run(shared: Weak<Shared>, rate: f64, wake_interval: Duration) {
    let mut replenisher = Replenisher::new(rate);
    let mut last_iteration = Instant::now();

    debug!(
        rate = rate,
        wake_interval_ms = wake_interval.as_millis() as u64,
        "Token generator started"
    );

    loop {
        tokio::time::sleep(wake_interval).await;

        let Some(limiter) = shared.upgrade() else {
            debug!("Limiter dropped, token generator exiting");
            return;
        };

        if limiter.is_stopped() {
            debug!("Stop requested, token generator exiting");
            return;
        }

        let now = Instant::now();
        let elapsed = now.duration_since(last_iteration);
        last_iteration = now;

        let added = replenisher.replenish(elapsed, &limiter.buffer);

        trace!(
            elapsed_us = elapsed.as_micros() as u64,
            added = added,
            carry = replenisher.carry(),
            buffered = limiter.buffer.len(),
            "Replenished token buffer"
        );
    }
}
