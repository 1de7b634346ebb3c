//! Resilience around the remote tier: bounded retry with backoff, and a
//! circuit breaker that fails fast while the shared store is down.

pub mod circuit_breaker;
pub mod retry;
