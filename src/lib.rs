//! Droplimit - Local Token Bucket Rate Limiting
//!
//! This crate implements a process-local rate limiter. A background task
//! produces tokens at a target rate into a bounded buffer, and callers
//! consume one token per admitted request, waiting a bounded time when the
//! buffer is empty.

pub mod config;
pub mod error;
pub mod gate;
pub mod ratelimit;
