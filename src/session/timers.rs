//! Session Timer Base
//!
//! T.30 runs four logical countdown timers from the audio sample clock:
//! T0/T1 share storage (T0 until the far end is detected, T1 after), and
//! T2/T4 share storage with a discriminator because they never run
//! together. All timers count samples remaining; positive means running.

// =============================================================================
// Timing Constants
// =============================================================================

/// Audio sample rate driving the timers.
pub const SAMPLE_RATE: u32 = 8000;

/// Default T0 (no answer) timeout in milliseconds.
pub const DEFAULT_TIMER_T0_MS: u32 = 60_000;
/// Default T1 (identification) timeout in milliseconds.
pub const DEFAULT_TIMER_T1_MS: u32 = 35_000;
/// Default T2 (command wait) timeout in milliseconds.
pub const DEFAULT_TIMER_T2_MS: u32 = 7_000;
/// Default T3 (operator intervention) timeout in milliseconds.
pub const DEFAULT_TIMER_T3_MS: u32 = 15_000;
/// Default T4 (response wait) timeout in milliseconds.
pub const DEFAULT_TIMER_T4_MS: u32 = 3_450;
/// Default T5 (receiver not ready) timeout in milliseconds.
pub const DEFAULT_TIMER_T5_MS: u32 = 65_000;

/// Convert milliseconds to sample ticks.
#[must_use]
pub const fn ms_to_samples(ms: u32) -> i32 {
    (ms * (SAMPLE_RATE / 1000)) as i32
}

// =============================================================================
// Timer Storage
// =============================================================================

/// Which of the multiplexed T2/T4 timers is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum TimerT2T4 {
    /// Neither is running
    #[default]
    None,
    /// T2 (command synchronization) is running
    T2,
    /// T4 (response wait) is running
    T4,
}

/// Expiries produced by one [`Timers::tick`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct TimerExpiries {
    pub t0: bool,
    pub t1: bool,
    pub t2: bool,
    pub t3: bool,
    pub t4: bool,
    pub t5: bool,
}

impl TimerExpiries {
    pub(crate) fn any(&self) -> bool {
        self.t0 || self.t1 || self.t2 || self.t3 || self.t4 || self.t5
    }
}

/// The four-timer base.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Timers {
    t0_t1: i32,
    t0_t1_is_t1: bool,
    t2_t4: i32,
    t2_t4_is: TimerT2T4,
    t3: i32,
    t5: i32,
}

impl Timers {
    pub(crate) const fn new() -> Self {
        Self {
            t0_t1: 0,
            t0_t1_is_t1: false,
            t2_t4: 0,
            t2_t4_is: TimerT2T4::None,
            t3: 0,
            t5: 0,
        }
    }

    /// Stop everything (call teardown).
    pub(crate) fn cancel_all(&mut self) {
        self.t0_t1 = 0;
        self.t2_t4 = 0;
        self.t2_t4_is = TimerT2T4::None;
        self.t3 = 0;
        self.t5 = 0;
    }

    // =========================================================================
    // T0 / T1
    // =========================================================================

    pub(crate) fn start_t0(&mut self) {
        self.t0_t1 = ms_to_samples(DEFAULT_TIMER_T0_MS);
        self.t0_t1_is_t1 = false;
    }

    pub(crate) fn start_t1(&mut self) {
        self.t0_t1 = ms_to_samples(DEFAULT_TIMER_T1_MS);
        self.t0_t1_is_t1 = true;
    }

    /// Switch the running T0 over to T1 once the far end is heard.
    pub(crate) fn t0_to_t1(&mut self) {
        if self.t0_t1 > 0 && !self.t0_t1_is_t1 {
            self.start_t1();
        }
    }

    pub(crate) fn stop_t0_t1(&mut self) {
        self.t0_t1 = 0;
    }

    pub(crate) fn t0_t1_running(&self) -> bool {
        self.t0_t1 > 0
    }

    // =========================================================================
    // T2 / T4 (shared storage)
    // =========================================================================

    pub(crate) fn start_t2(&mut self) {
        self.t2_t4 = ms_to_samples(DEFAULT_TIMER_T2_MS);
        self.t2_t4_is = TimerT2T4::T2;
    }

    pub(crate) fn start_t4(&mut self) {
        self.t2_t4 = ms_to_samples(DEFAULT_TIMER_T4_MS);
        self.t2_t4_is = TimerT2T4::T4;
    }

    pub(crate) fn stop_t2_t4(&mut self) {
        self.t2_t4 = 0;
        self.t2_t4_is = TimerT2T4::None;
    }

    /// Stop T2 if it is the one loaded; leaves a running T4 alone.
    pub(crate) fn stop_t2(&mut self) {
        if self.t2_t4_is == TimerT2T4::T2 {
            self.stop_t2_t4();
        }
    }

    pub(crate) fn t2_running(&self) -> bool {
        self.t2_t4 > 0 && self.t2_t4_is == TimerT2T4::T2
    }

    pub(crate) fn t4_running(&self) -> bool {
        self.t2_t4 > 0 && self.t2_t4_is == TimerT2T4::T4
    }

    // =========================================================================
    // T3 / T5
    // =========================================================================

    pub(crate) fn start_t3(&mut self) {
        self.t3 = ms_to_samples(DEFAULT_TIMER_T3_MS);
    }

    pub(crate) fn stop_t3(&mut self) {
        self.t3 = 0;
    }

    pub(crate) fn start_t5(&mut self) {
        self.t5 = ms_to_samples(DEFAULT_TIMER_T5_MS);
    }

    pub(crate) fn stop_t5(&mut self) {
        self.t5 = 0;
    }

    pub(crate) fn t5_running(&self) -> bool {
        self.t5 > 0
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Advance all running timers by `samples` ticks and report which
    /// crossed zero.
    pub(crate) fn tick(&mut self, samples: u32) -> TimerExpiries {
        let samples = samples as i32;
        let mut fired = TimerExpiries::default();

        if self.t0_t1 > 0 {
            self.t0_t1 -= samples;
            if self.t0_t1 <= 0 {
                self.t0_t1 = 0;
                if self.t0_t1_is_t1 {
                    fired.t1 = true;
                } else {
                    fired.t0 = true;
                }
            }
        }
        if self.t2_t4 > 0 {
            self.t2_t4 -= samples;
            if self.t2_t4 <= 0 {
                let which = self.t2_t4_is;
                self.stop_t2_t4();
                match which {
                    TimerT2T4::T2 => fired.t2 = true,
                    TimerT2T4::T4 => fired.t4 = true,
                    TimerT2T4::None => {}
                }
            }
        }
        if self.t3 > 0 {
            self.t3 -= samples;
            if self.t3 <= 0 {
                self.t3 = 0;
                fired.t3 = true;
            }
        }
        if self.t5 > 0 {
            self.t5 -= samples;
            if self.t5 <= 0 {
                self.t5 = 0;
                fired.t5 = true;
            }
        }
        fired
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
