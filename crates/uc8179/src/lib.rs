#![cfg_attr(not(test), no_std)]

//! UC8179 (7.5" 800x480 black/white e-paper) driver primitives.

mod framebuffer;
pub mod protocol;

#[cfg(feature = "embedded-graphics")]
mod graphics;

pub use framebuffer::FrameBuffer;

use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
    spi::SpiDevice,
};

use protocol::Step;

/// Driver configuration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    /// Expected SPI clock in Hz (documented for board glue).
    pub spi_hz: u32,
    /// RST low time.
    pub reset_pulse_ms: u32,
    /// Settle time around the reset pulse.
    pub reset_settle_ms: u32,
    /// Interval between BUSY polls.
    pub busy_poll_ms: u32,
    /// Longest wait for BUSY before giving up. A full refresh takes about 4 s.
    pub busy_timeout_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spi_hz: 4_000_000,
            reset_pulse_ms: 2,
            reset_settle_ms: 20,
            busy_poll_ms: 10,
            busy_timeout_ms: 30_000,
        }
    }
}

impl Config {
    pub const fn with_busy_timeout_ms(mut self, busy_timeout_ms: u32) -> Self {
        self.busy_timeout_ms = busy_timeout_ms;
        self
    }
}

/// Driver errors.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Error<SpiErr, PinErr> {
    /// SPI transaction failed.
    Spi(SpiErr),
    /// DC, RST or BUSY pin operation failed.
    Pin(PinErr),
    /// BUSY never released within [`Config::busy_timeout_ms`].
    BusyTimeout,
}

pub type DriverResult<SpiErr, PinErr> = Result<(), Error<SpiErr, PinErr>>;

/// UC8179 driver. BUSY reads low while the controller is working.
#[derive(Debug)]
pub struct Uc8179<SPI, DC, RST, BUSY, DELAY> {
    spi: SPI,
    dc: DC,
    rst: RST,
    busy: BUSY,
    delay: DELAY,
    config: Config,
}

impl<SPI, DC, RST, BUSY, DELAY> Uc8179<SPI, DC, RST, BUSY, DELAY>
where
    SPI: SpiDevice<u8>,
    DC: OutputPin,
    RST: OutputPin<Error = DC::Error>,
    BUSY: InputPin<Error = DC::Error>,
    DELAY: DelayNs,
{
    pub fn new(spi: SPI, dc: DC, rst: RST, busy: BUSY, delay: DELAY, config: Config) -> Self {
        Self {
            spi,
            dc,
            rst,
            busy,
            delay,
            config,
        }
    }

    pub fn config(&self) -> Config {
        self.config
    }

    /// Releases owned bus, pins and delay.
    pub fn release(self) -> (SPI, DC, RST, BUSY, DELAY) {
        (self.spi, self.dc, self.rst, self.busy, self.delay)
    }

    /// Hardware reset. Also the only way out of deep sleep.
    pub fn reset(&mut self) -> DriverResult<SPI::Error, DC::Error> {
        self.rst.set_high().map_err(Error::Pin)?;
        self.delay.delay_ms(self.config.reset_settle_ms);
        self.rst.set_low().map_err(Error::Pin)?;
        self.delay.delay_ms(self.config.reset_pulse_ms);
        self.rst.set_high().map_err(Error::Pin)?;
        self.delay.delay_ms(self.config.reset_settle_ms);
        Ok(())
    }

    /// Resets the controller and powers it up ready for a frame.
    pub fn init(&mut self) -> DriverResult<SPI::Error, DC::Error> {
        self.reset()?;
        self.run(&protocol::INIT_SEQUENCE)
    }

    /// Streams `frame` and starts a full refresh without waiting for it to finish.
    pub fn start_frame(
        &mut self,
        frame: &[u8; protocol::BUFFER_SIZE],
    ) -> DriverResult<SPI::Error, DC::Error> {
        self.command(protocol::DATA_START_TRANSMISSION_2)?;
        self.data(frame)?;
        self.command(protocol::DISPLAY_REFRESH)?;
        // BUSY is not asserted immediately after the refresh command.
        self.delay.delay_ms(100);
        Ok(())
    }

    /// Streams `frame` and blocks until the panel has finished refreshing.
    pub fn display_frame(
        &mut self,
        frame: &[u8; protocol::BUFFER_SIZE],
    ) -> DriverResult<SPI::Error, DC::Error> {
        self.start_frame(frame)?;
        self.wait_until_idle()
    }

    /// Powers the charge pump down and enters deep sleep.
    pub fn sleep(&mut self) -> DriverResult<SPI::Error, DC::Error> {
        self.run(&protocol::SLEEP_SEQUENCE)
    }

    pub fn is_busy(&mut self) -> Result<bool, Error<SPI::Error, DC::Error>> {
        self.busy.is_low().map_err(Error::Pin)
    }

    /// Polls controller status until BUSY goes high.
    pub fn wait_until_idle(&mut self) -> DriverResult<SPI::Error, DC::Error> {
        let mut waited_ms = 0u32;
        loop {
            self.command(protocol::GET_STATUS)?;
            if !self.is_busy()? {
                return Ok(());
            }
            if waited_ms >= self.config.busy_timeout_ms {
                return Err(Error::BusyTimeout);
            }
            self.delay.delay_ms(self.config.busy_poll_ms);
            waited_ms = waited_ms.saturating_add(self.config.busy_poll_ms);
        }
    }

    fn run(&mut self, steps: &[Step]) -> DriverResult<SPI::Error, DC::Error> {
        for step in steps {
            self.command(step.command)?;
            if !step.data.is_empty() {
                self.data(step.data)?;
            }
            if step.wait_idle {
                self.wait_until_idle()?;
            }
        }
        Ok(())
    }

    fn command(&mut self, command: u8) -> DriverResult<SPI::Error, DC::Error> {
        self.dc.set_low().map_err(Error::Pin)?;
        self.spi.write(&[command]).map_err(Error::Spi)
    }

    fn data(&mut self, bytes: &[u8]) -> DriverResult<SPI::Error, DC::Error> {
        self.dc.set_high().map_err(Error::Pin)?;
        self.spi.write(bytes).map_err(Error::Spi)
    }
}
