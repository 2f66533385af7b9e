//! Clock abstraction for the agent poll loop
//!
//! The dialogue session sleeps between run-status polls. Injecting the clock
//! lets tests drive the loop without real delays.

use std::time::{Duration, Instant};

use async_trait::async_trait;

/// Time source and sleep used by the dialogue session
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> Instant;

    /// Sleep for the given duration
    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
