//! Fixed-rate frame pacing

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Sleeps out whatever is left of each fixed-length frame
#[derive(Debug)]
pub struct FramePacer {
    frame_duration: Duration,
    frame_start: Instant,
}

impl FramePacer {
    pub fn new(frame_duration: Duration) -> Self {
        Self {
            frame_duration,
            frame_start: Instant::now(),
        }
    }

    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    /// Marks the start of a new frame
    pub fn begin_frame(&mut self) {
        self.frame_start = Instant::now();
    }

    /// Time left in the current frame, zero if the frame overran
    pub fn remaining(&self) -> Duration {
        self.frame_duration
            .saturating_sub(self.frame_start.elapsed())
    }

    /// Sleeps until the end of the frame unless `shutdown` resolves first
    ///
    /// Returns false if shutdown was requested.
    pub async fn wait<F>(&self, shutdown: &mut F) -> bool
    where
        F: Future + Unpin,
    {
        let remaining = self.remaining();
        if remaining.is_zero() {
            return self.skip(shutdown).await;
        }

        tokio::select! {
            _ = shutdown => false,
            _ = sleep(remaining) => true,
        }
    }

    /// Ends the frame without sleeping, yielding once to the runtime
    ///
    /// Returns false if shutdown was requested.
    pub async fn skip<F>(&self, shutdown: &mut F) -> bool
    where
        F: Future + Unpin,
    {
        tokio::select! {
            biased;
            _ = shutdown => false,
            _ = tokio::task::yield_now() => true,
        }
    }
}
