//! Process-local token bucket rate limiter.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use super::backend::Limiter;
use super::buffer::TokenBuffer;
use super::generator;
use super::options::{LimiterOption, LimiterSettings};
use crate::error::Result;

const UNSTARTED: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// Lifecycle of the background token generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// No call to `limit` happened yet
    Unstarted,
    /// The generator task was spawned
    Running,
    /// A stop was requested
    Stopped,
}

/// State shared between the limiter handle and its generator task.
pub(crate) struct Shared {
    pub(crate) buffer: TokenBuffer,
    state: AtomicU8,
}

impl Shared {
    pub(crate) fn is_stopped(&self) -> bool {
        self.state.load(Ordering::Acquire) == STOPPED
    }
}

/// A process-local rate limiter.
///
/// Tokens are produced at the target rate by a background task that is
/// spawned on the first call to [`LocalLimiter::limit`]. Every admitted call
/// consumes one token. When no token is available a caller waits for at most
/// the configured wait timeout.
///
/// The limiter is thread-safe; share it between tasks with an `Arc`. All
/// admission calls must happen inside a tokio runtime.
pub struct LocalLimiter {
    settings: LimiterSettings,
    shared: Arc<Shared>,
    generator: Mutex<Option<JoinHandle<()>>>,
}

impl LocalLimiter {
    /// Create a new limiter from an ordered list of options.
    ///
    /// The options are applied in order; the first failing option aborts the
    /// construction and its error is returned.
    pub fn new<I>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = LimiterOption>,
    {
        Self::from_settings(LimiterSettings::from_options(options)?)
    }

    /// Create a new limiter from complete settings.
    pub fn from_settings(settings: LimiterSettings) -> Result<Self> {
        settings.validate()?;

        debug!(
            target_rate = settings.target_rate,
            wake_interval_ms = settings.wake_interval.as_millis() as u64,
            wait_timeout_ms = settings.wait_timeout.as_millis() as u64,
            max_tokens = settings.max_tokens,
            "Creating local rate limiter"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                buffer: TokenBuffer::new(settings.max_tokens),
                state: AtomicU8::new(UNSTARTED),
            }),
            settings,
            generator: Mutex::new(None),
        })
    }

    /// Check whether a request may pass.
    ///
    /// Returns `true` if a token was obtained, either immediately or within
    /// the wait timeout, and `false` if the request should be throttled.
    pub async fn limit(&self) -> bool {
        self.limit_or_cancel(std::future::pending::<()>()).await
    }

    /// Like [`LocalLimiter::limit`], but gives up as soon as `cancel`
    /// completes.
    ///
    /// A cancellation that is already complete never consumes a token.
    pub async fn limit_or_cancel<F>(&self, cancel: F) -> bool
    where
        F: Future<Output = ()>,
    {
        self.ensure_started();

        let wait_timeout = self.settings.wait_timeout;
        let buffer = &self.shared.buffer;

        tokio::pin!(cancel);

        let admitted = tokio::select! {
            biased;
            _ = &mut cancel => {
                trace!("Admission canceled by caller");
                false
            }
            admitted = async {
                if buffer.try_take() {
                    return true;
                }
                if wait_timeout.is_zero() {
                    return false;
                }
                tokio::time::timeout(wait_timeout, buffer.take())
                    .await
                    .unwrap_or(false)
            } => admitted,
        };

        trace!(admitted = admitted, buffered = buffer.len(), "Admission decision");
        admitted
    }

    /// Request the generator to stop.
    ///
    /// Does not wait for the generator to exit; it notices the request at its
    /// next wake. Tokens already buffered are still handed out.
    pub fn stop(&self) {
        let previous = self.shared.state.swap(STOPPED, Ordering::AcqRel);
        if previous != STOPPED {
            info!(
                buffered = self.shared.buffer.len(),
                "Local rate limiter stop requested"
            );
        }
    }

    /// Stop the generator and wait for its task to finish.
    pub async fn shutdown(&self) {
        self.stop();

        let handle = self.generator.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                debug!(error = %e, "Token generator task ended abnormally");
            }
        }
    }

    /// Get the current lifecycle state of the generator.
    pub fn state(&self) -> GeneratorState {
        match self.shared.state.load(Ordering::Acquire) {
            UNSTARTED => GeneratorState::Unstarted,
            RUNNING => GeneratorState::Running,
            _ => GeneratorState::Stopped,
        }
    }

    /// Get the settings this limiter was built with.
    pub fn settings(&self) -> &LimiterSettings {
        &self.settings
    }

    /// Get the target rate in tokens per second.
    pub fn target_rate(&self) -> f64 {
        self.settings.target_rate
    }

    /// Get the time between generator iterations.
    pub fn wake_interval(&self) -> Duration {
        self.settings.wake_interval
    }

    /// Get the time a caller waits for a token.
    pub fn wait_timeout(&self) -> Duration {
        self.settings.wait_timeout
    }

    /// Get the maximum number of buffered tokens.
    pub fn max_tokens(&self) -> usize {
        self.settings.max_tokens
    }

    /// Get the number of tokens currently buffered.
    pub fn available(&self) -> usize {
        self.shared.buffer.len()
    }

    /// Spawn the generator on the first call, exactly once.
    fn ensure_started(&self) {
        if self.shared.state.load(Ordering::Acquire) != UNSTARTED {
            return;
        }

        if self
            .shared
            .state
            .compare_exchange(UNSTARTED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let handle = tokio::spawn(generator::run(
            Arc::downgrade(&self.shared),
            self.settings.target_rate,
            self.settings.wake_interval,
        ));
        *self.generator.lock() = Some(handle);

        info!(
            target_rate = self.settings.target_rate,
            max_tokens = self.settings.max_tokens,
            "Local rate limiter generator launched"
        );
    }
}

#[async_trait]
impl Limiter for LocalLimiter {
    async fn limit(&self) -> bool {
        LocalLimiter::limit(self).await
    }
}
