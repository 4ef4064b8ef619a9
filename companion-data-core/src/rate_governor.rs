//! Per-client request spacing
//!
//! Each upstream client owns one [`RateGovernor`]. Every outbound request
//! reserves the next free slot, which is at least `min_interval` after the
//! previously reserved one, and sleeps until that slot. Concurrent callers
//! therefore start their requests spaced out, but nothing stops slow
//! requests that started earlier from still being in flight.

use crate::error::DataError;
use std::sync::Mutex;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug)]
struct RateState {
    /// Start of the most recently reserved slot
    last_request: Option<Instant>,
}

#[derive(Debug)]
pub struct RateGovernor {
    min_interval: Duration,
    // Blocking mutex: only held to compute the next slot, never across an await
    state: Mutex<RateState>,
}

impl RateGovernor {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            state: Mutex::new(RateState { last_request: None }),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until this instance may issue its next request.
    pub async fn throttle(&self) {
        let slot = self.reserve_slot();
        let now = Instant::now();
        if slot > now {
            trace!(wait_ms = (slot - now).as_millis() as u64, "Rate governor delaying request");
        }
        tokio::time::sleep_until(slot).await;
    }

    /// Like [`RateGovernor::throttle`], but returns early with
    /// [`DataError::Cancelled`] when the token fires. The reserved slot is
    /// not handed back.
    pub async fn throttle_cancellable(&self, cancel: &CancellationToken) -> Result<(), DataError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DataError::Cancelled),
            _ = self.throttle() => Ok(()),
        }
    }

    fn reserve_slot(&self) -> Instant {
        let now = Instant::now();
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let slot = match state.last_request {
            Some(last) => std::cmp::max(now, last + self.min_interval),
            None => now,
        };
        state.last_request = Some(slot);
        slot
    }
}
