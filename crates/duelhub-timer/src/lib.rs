//! Re-armable deadline for duelhub room loops.
//!
//! A room owns at most one outstanding turn deadline (plus, for games with
//! a setup phase, one setup deadline). [`TurnTimer`] models exactly that:
//! arming replaces any previous deadline, cancelling disarms it, and a
//! disarmed timer pends forever.
//!
//! # Integration
//!
//! The timer sits inside a room actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = register_rx.recv() => { /* admit */ }
//!         expiry = turn_timer.expired() => { /* force null moves */ }
//!     }
//! }
//! ```
//!
//! `expired` only mutates the timer after its sleep completes, so losing a
//! `select!` race never drops or corrupts a deadline.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace};

/// Information about a deadline that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    /// Which arming fired. Increments on every [`TurnTimer::arm`].
    pub generation: u64,
    /// How long after the deadline the loop actually observed it.
    pub late_by: Duration,
}

/// A single one-shot deadline that can be re-armed or cancelled.
#[derive(Debug)]
pub struct TurnTimer {
    label: &'static str,
    deadline: Option<Instant>,
    generation: u64,
}

impl TurnTimer {
    /// Creates a disarmed timer. `label` only shows up in logs.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            deadline: None,
            generation: 0,
        }
    }

    /// Arms the timer to fire `after` from now, superseding any earlier
    /// deadline. Returns the new generation.
    pub fn arm(&mut self, after: Duration) -> u64 {
        self.generation += 1;
        self.deadline = Some(Instant::now() + after);
        debug!(
            timer = self.label,
            generation = self.generation,
            after_ms = after.as_millis() as u64,
            "timer armed"
        );
        self.generation
    }

    /// Disarms the timer. Safe to call when already disarmed.
    pub fn cancel(&mut self) {
        if self.deadline.take().is_some() {
            debug!(timer = self.label, generation = self.generation, "timer cancelled");
        }
    }

    /// Whether a deadline is outstanding.
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Time left before the outstanding deadline, if any.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Current generation (0 before the first arm).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Waits for the outstanding deadline, then disarms.
    ///
    /// Pends forever while disarmed, so `select!` keeps serving its other
    /// branches.
    pub async fn expired(&mut self) -> Expiry {
        let Some(deadline) = self.deadline else {
            std::future::pending::<()>().await;
            unreachable!()
        };

        time::sleep_until(deadline).await;

        self.deadline = None;
        let late_by = Instant::now().saturating_duration_since(deadline);
        trace!(timer = self.label, generation = self.generation, "timer fired");

        Expiry {
            generation: self.generation,
            late_by,
        }
    }
}
