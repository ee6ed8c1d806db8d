//! Wake reasons and button press classification.

use log::{info, warn};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ButtonPress {
    ShortPress,
    DoubleClick,
    LongPress,
    SoftResetHold,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WakeReason {
    TimerExpired,
    UserButton(ButtonPress),
    PowerOnReset,
    Undefined,
}

impl WakeReason {
    /// Wakes that were not scheduled by the device itself.
    pub const fn is_interactive(self) -> bool {
        !matches!(self, Self::TimerExpired)
    }
}

/// Hardware wake source as reported by the SoC.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WakeCause {
    Timer,
    Button,
    PowerOn,
    Other,
}

/// Blocking (bounded) read of the press that woke the device.
#[allow(async_fn_in_trait)]
pub trait InputSource {
    type Error: core::fmt::Debug;

    /// Returns `None` when no press could be observed within the read window.
    async fn read_press(&mut self) -> Result<Option<ButtonPress>, Self::Error>;
}

/// Maps the SoC wake cause to a [`WakeReason`], reading the button only for button wakes.
pub async fn resolve_wake_reason<I: InputSource>(cause: WakeCause, input: &mut I) -> WakeReason {
    match cause {
        WakeCause::Timer => WakeReason::TimerExpired,
        WakeCause::PowerOn => WakeReason::PowerOnReset,
        WakeCause::Other => WakeReason::Undefined,
        WakeCause::Button => match input.read_press().await {
            Ok(Some(press)) => {
                info!("input: press={:?}", press);
                WakeReason::UserButton(press)
            }
            Ok(None) => WakeReason::UserButton(ButtonPress::ShortPress),
            Err(err) => {
                warn!("input: read failed err={:?}; treating as short press", err);
                WakeReason::UserButton(ButtonPress::ShortPress)
            }
        },
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PressTimings {
    /// Max release-to-press gap for a second click.
    pub double_click_gap_ms: u64,
    pub long_press_ms: u64,
    pub soft_reset_ms: u64,
    /// Hard cap on classification time.
    pub max_wait_ms: u64,
}

impl Default for PressTimings {
    fn default() -> Self {
        Self {
            double_click_gap_ms: 500,
            long_press_ms: 5_000,
            soft_reset_ms: 15_000,
            max_wait_ms: 20_000,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PressPhase {
    Held { since_ms: u64 },
    Released { at_ms: u64 },
}

/// Classifies debounced button levels sampled after a button wake.
///
/// The press that woke the device is assumed to have started at the first sample.
#[derive(Clone, Copy, Debug)]
pub struct PressClassifier {
    timings: PressTimings,
    started_ms: Option<u64>,
    phase: PressPhase,
}

impl PressClassifier {
    pub const fn new(timings: PressTimings) -> Self {
        Self {
            timings,
            started_ms: None,
            phase: PressPhase::Held { since_ms: 0 },
        }
    }

    /// Feeds one debounced sample; returns the press once it is decided.
    pub fn on_sample(&mut self, now_ms: u64, pressed: bool) -> Option<ButtonPress> {
        let started_ms = match self.started_ms {
            Some(started_ms) => started_ms,
            None => {
                self.started_ms = Some(now_ms);
                self.phase = if pressed {
                    PressPhase::Held { since_ms: now_ms }
                } else {
                    PressPhase::Released { at_ms: now_ms }
                };
                now_ms
            }
        };

        match self.phase {
            PressPhase::Held { since_ms } => {
                let held_ms = now_ms.saturating_sub(since_ms);
                if held_ms >= self.timings.soft_reset_ms {
                    return Some(ButtonPress::SoftResetHold);
                }
                if !pressed {
                    if held_ms >= self.timings.long_press_ms {
                        return Some(ButtonPress::LongPress);
                    }
                    self.phase = PressPhase::Released { at_ms: now_ms };
                }
            }
            PressPhase::Released { at_ms } => {
                if pressed {
                    return Some(ButtonPress::DoubleClick);
                }
                if now_ms.saturating_sub(at_ms) > self.timings.double_click_gap_ms {
                    return Some(ButtonPress::ShortPress);
                }
            }
        }

        if now_ms.saturating_sub(started_ms) >= self.timings.max_wait_ms {
            return Some(match self.phase {
                PressPhase::Held { .. } => ButtonPress::LongPress,
                PressPhase::Released { .. } => ButtonPress::ShortPress,
            });
        }

        None
    }
}
