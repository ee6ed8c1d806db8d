//! Retry schedules for failed wake cycles.
//!
//! Schedules are small fixed tables rather than formulas so the worst case stays obvious:
//! attempt `n` sleeps `steps[n - 1]`, and anything past the table sleeps the normal interval.

/// Sleep used when the table is exhausted and for an ordinary idle cycle.
pub const NORMAL_INTERVAL_SECS: u32 = 900;
/// Stored key or playlist is unusable; retrying sooner cannot help.
pub const CONFIG_ERROR_SLEEP_SECS: u32 = 300;
/// Image rejected by the format checks.
pub const FORMAT_ERROR_SLEEP_SECS: u32 = 300;
/// Allocation failure or panel fault.
pub const RESOURCE_ERROR_SLEEP_SECS: u32 = 60;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BackoffSchedule {
    steps: &'static [u32],
}

/// Joining the access point failed.
pub const WIFI_BACKOFF: BackoffSchedule = BackoffSchedule::new(&[60, 180, 300]);
/// Manifest or image could not be fetched, decrypted or decoded.
pub const DOWNLOAD_BACKOFF: BackoffSchedule = BackoffSchedule::new(&[15, 30, 60]);

impl BackoffSchedule {
    pub const fn new(steps: &'static [u32]) -> Self {
        Self { steps }
    }

    /// Sleep for the given 1-based attempt. Attempt 0 is treated as 1.
    pub fn delay_secs(&self, attempt: u32, normal_interval_secs: u32) -> u32 {
        let index = attempt.max(1) as usize - 1;
        self.steps
            .get(index)
            .copied()
            .unwrap_or(normal_interval_secs)
    }

    pub fn fastest_step_secs(&self) -> u32 {
        self.steps.iter().copied().min().unwrap_or(0)
    }

    pub fn steps(&self) -> &'static [u32] {
        self.steps
    }
}
