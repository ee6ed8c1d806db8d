use embassy_time::{Duration, Instant, Timer};
use embedded_hal::digital::InputPin;
use inkwake_core::input::{ButtonPress, InputSource, PressClassifier, PressTimings};

#[derive(Debug, Clone, Copy)]
pub struct ButtonConfig {
    active_low: bool,
    debounce_polls: u8,
    sample_interval_ms: u64,
    timings: PressTimings,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            active_low: true,
            debounce_polls: 3,
            sample_interval_ms: 10,
            timings: PressTimings::default(),
        }
    }
}

impl ButtonConfig {
    pub const fn with_active_low(mut self, active_low: bool) -> Self {
        self.active_low = active_low;
        self
    }

    pub const fn with_debounce_polls(mut self, debounce_polls: u8) -> Self {
        self.debounce_polls = debounce_polls;
        self
    }

    pub const fn with_sample_interval_ms(mut self, sample_interval_ms: u64) -> Self {
        self.sample_interval_ms = sample_interval_ms;
        self
    }

    pub const fn with_timings(mut self, timings: PressTimings) -> Self {
        self.timings = timings;
        self
    }
}

#[derive(Debug)]
pub enum ButtonError<PinErr> {
    Pin(PinErr),
}

/// The single wake button, sampled after a button wake to classify the press.
#[derive(Debug)]
pub struct WakeButton<SW> {
    sw: SW,
    config: ButtonConfig,
    raw: bool,
    stable: bool,
    stable_count: u8,
}

impl<SW> WakeButton<SW>
where
    SW: InputPin,
{
    pub fn new(mut sw: SW, config: ButtonConfig) -> Result<Self, ButtonError<SW::Error>> {
        let high = sw.is_high().map_err(ButtonError::Pin)?;
        let pressed = pressed_from_level(high, config.active_low);

        Ok(Self {
            sw,
            config,
            raw: pressed,
            stable: pressed,
            stable_count: 0,
        })
    }

    pub fn release(self) -> SW {
        self.sw
    }

    /// Samples the pin once and returns the debounced level.
    fn poll(&mut self) -> Result<bool, ButtonError<SW::Error>> {
        let high = self.sw.is_high().map_err(ButtonError::Pin)?;
        let pressed = pressed_from_level(high, self.config.active_low);

        if pressed == self.raw {
            self.stable_count = self.stable_count.saturating_add(1);
        } else {
            self.raw = pressed;
            self.stable_count = 0;
        }

        if self.stable_count >= self.config.debounce_polls.max(1) {
            self.stable = self.raw;
        }

        Ok(self.stable)
    }
}

impl<SW> InputSource for WakeButton<SW>
where
    SW: InputPin,
    SW::Error: core::fmt::Debug,
{
    type Error = ButtonError<SW::Error>;

    async fn read_press(&mut self) -> Result<Option<ButtonPress>, Self::Error> {
        let mut classifier = PressClassifier::new(self.config.timings);
        let interval = Duration::from_millis(self.config.sample_interval_ms.max(1));
        let deadline = Instant::now() + Duration::from_millis(self.config.timings.max_wait_ms);

        loop {
            let pressed = self.poll()?;
            let now = Instant::now();
            if let Some(press) = classifier.on_sample(now.as_millis(), pressed) {
                return Ok(Some(press));
            }
            if now > deadline {
                return Ok(None);
            }
            Timer::after(interval).await;
        }
    }
}

#[inline]
fn pressed_from_level(high: bool, active_low: bool) -> bool {
    if active_low { !high } else { high }
}
