use crossbeam::utils::Backoff;
use std::thread;
use std::time::Duration;

/// How long a fully escalated idle wait sleeps between polls.
const PARK: Duration = Duration::from_micros(500);

const SPIN_LIMIT: u32 = 64;
const YIELD_LIMIT: u32 = 256;

/// Escalating wait used at the multiplexer idle point of every worker loop
/// and inside the cooperative channel send/recv paths.
///
/// Escalation: busy spin, then cooperative yield, then a short sleep. Call
/// [`reset`](Self::reset) whenever the loop made progress so the next stall
/// starts cheap again.
pub struct IdleWait {
    backoff: Backoff,
    stalls: u32,
}

impl IdleWait {
    pub fn new() -> Self {
        Self {
            backoff: Backoff::new(),
            stalls: 0,
        }
    }

    /// The loop made progress; start the next stall from the cheap end.
    #[inline]
    pub fn reset(&mut self) {
        self.backoff = Backoff::new();
        self.stalls = 0;
    }

    /// Wait a little. Each consecutive call without a `reset` escalates.
    #[inline]
    pub fn wait(&mut self) {
        self.stalls = self.stalls.saturating_add(1);
        if self.stalls < SPIN_LIMIT {
            self.backoff.spin();
        } else if self.stalls < YIELD_LIMIT {
            self.backoff.snooze();
        } else {
            thread::sleep(PARK);
        }
    }
}

impl Default for IdleWait {
    fn default() -> Self {
        Self::new()
    }
}
