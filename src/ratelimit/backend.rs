//! Limiter trait consumed by admission gates.

use std::sync::Arc;

use async_trait::async_trait;

/// Trait for limiter implementations.
///
/// This is the only operation a consumer of a limiter depends on. A `true`
/// result admits the request, `false` means it should be throttled.
/// Rejection because of the rate is never an error.
#[async_trait]
pub trait Limiter: Send + Sync {
    /// Check whether one more request may pass.
    async fn limit(&self) -> bool;
}

#[async_trait]
impl<L: Limiter + ?Sized> Limiter for Arc<L> {
    async fn limit(&self) -> bool {
        (**self).limit().await
    }
}
