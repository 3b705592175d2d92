//! Fixed period polling loop
//!
//! Executables poll their equipment in a single thread. [`PollLoop`] runs a cycle function at a
//! target period until the function breaks out of the loop or returns an error. Cancellation is
//! cooperative: the cycle function decides when to break, the loop never interrupts it.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::warn;
use std::ops::ControlFlow;
use std::thread;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A fixed period polling loop.
#[derive(Debug, Clone)]
pub struct PollLoop {
    period: Duration,

    /// Number of cycles already executed
    pub num_cycles: u64,

    /// Number of consecutive cycle overruns
    pub num_consec_overruns: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PollLoop {
    /// Create a new loop with the given target period in seconds.
    ///
    /// A period of zero polls as fast as the cycle function allows. Negative, non-finite or
    /// out of range periods are replaced by zero.
    pub fn new(period_s: f64) -> Self {
        let period = Duration::try_from_secs_f64(period_s).unwrap_or_else(|_| {
            warn!("Invalid poll period {} s, polling without a period", period_s);
            Duration::ZERO
        });

        Self {
            period,
            num_cycles: 0,
            num_consec_overruns: 0,
        }
    }

    /// Run `cycle` repeatedly until it returns `ControlFlow::Break` or an error.
    ///
    /// The cycle function is given the index of the current cycle.
    pub fn run<T, E, F>(&mut self, mut cycle: F) -> Result<T, E>
    where
        F: FnMut(u64) -> Result<ControlFlow<T>, E>,
    {
        loop {
            let cycle_start_instant = Instant::now();

            if let ControlFlow::Break(t) = cycle(self.num_cycles)? {
                return Ok(t);
            }

            self.num_cycles += 1;

            // ---- CYCLE MANAGEMENT ----

            let cycle_dur = cycle_start_instant.elapsed();

            match self.period.checked_sub(cycle_dur) {
                Some(d) => {
                    self.num_consec_overruns = 0;
                    thread::sleep(d);
                }
                None => {
                    self.num_consec_overruns += 1;

                    // Blocking I/O regularly exceeds very short periods, only report when it
                    // persists
                    if self.num_consec_overruns % 10 == 0 {
                        warn!(
                            "{} consecutive cycle overruns, last by {:.06} s",
                            self.num_consec_overruns,
                            cycle_dur.as_secs_f64() - self.period.as_secs_f64()
                        );
                    }
                }
            }
        }
    }
}
