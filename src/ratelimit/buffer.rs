//! Bounded token buffer shared between the generator and the callers.

use tokio::sync::Semaphore;

/// A bounded store of admission tokens.
///
/// Tokens are semaphore permits. The generator is the only producer and
/// never adds more than [`TokenBuffer::room`], so the number of buffered
/// tokens stays within the capacity. Consumers acquire a permit and forget
/// it, which makes every token single-use.
pub struct TokenBuffer {
    /// Available tokens
    permits: Semaphore,
    /// Maximum number of buffered tokens
    capacity: usize,
}

impl TokenBuffer {
    /// Largest capacity the underlying semaphore supports.
    pub const MAX_CAPACITY: usize = Semaphore::MAX_PERMITS;

    /// Create an empty buffer holding at most `capacity` tokens.
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Semaphore::new(0),
            capacity,
        }
    }

    /// Get the capacity of this buffer.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the number of tokens currently buffered.
    pub fn len(&self) -> usize {
        self.permits.available_permits()
    }

    /// Check whether no token is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the number of tokens that still fit into the buffer.
    pub fn room(&self) -> usize {
        self.capacity.saturating_sub(self.len())
    }

    /// Add up to `count` tokens, clamped to the current room.
    ///
    /// Returns the number of tokens actually added.
    pub fn fill(&self, count: usize) -> usize {
        let added = count.min(self.room());
        if added > 0 {
            self.permits.add_permits(added);
        }
        added
    }

    /// Take a token if one is available right now.
    pub fn try_take(&self) -> bool {
        match self.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    /// Wait until a token is available and take it.
    ///
    /// The semaphore is never closed, so this only returns `false` if that
    /// ever changes.
    pub async fn take(&self) -> bool {
        match self.permits.acquire().await {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer_is_empty() {
        let buffer = TokenBuffer::new(10);

        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 10);
        assert_eq!(buffer.room(), 10);
        assert!(!buffer.try_take());
    }

    #[test]
    fn test_fill_is_clamped_to_room() {
        let buffer = TokenBuffer::new(5);

        assert_eq!(buffer.fill(3), 3);
        assert_eq!(buffer.fill(3), 2);
        assert_eq!(buffer.fill(1), 0);
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.room(), 0);
    }

    #[test]
    fn test_tokens_are_single_use() {
        let buffer = TokenBuffer::new(5);
        buffer.fill(2);

        assert!(buffer.try_take());
        assert!(buffer.try_take());
        assert!(!buffer.try_take());
        assert_eq!(buffer.room(), 5);
    }

    #[tokio::test]
    async fn test_take_waits_for_fill() {
        let buffer = std::sync::Arc::new(TokenBuffer::new(1));

        let waiter = {
            let buffer = buffer.clone();
            tokio::spawn(async move { buffer.take().await })
        };

        tokio::task::yield_now().await;
        buffer.fill(1);

        assert!(waiter.await.unwrap());
        assert!(buffer.is_empty());
    }
}
