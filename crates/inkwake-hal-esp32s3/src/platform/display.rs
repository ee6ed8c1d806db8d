use core::fmt::Write as _;

use embedded_graphics::{
    mono_font::{
        MonoTextStyle,
        ascii::{FONT_6X13, FONT_10X20},
    },
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{Arc, Circle, Line, PrimitiveStyle, Rectangle, Triangle},
    text::{Alignment, Text},
};
use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
    spi::SpiDevice,
};
use heapless::String as HeaplessString;
use inkwake_core::{
    bmp::BmpHeader,
    render::{MessageCode, RenderError, RenderHint, Renderer, StatusContext, StatusIcon},
    sentinel::{ImageKind, classify},
};
use log::{info, warn};
use uc8179::{
    FrameBuffer, Uc8179,
    protocol::{HEIGHT, LINE_BYTES, WIDTH},
};

const TITLE: &str = "inkwake";
const ICON_CENTER: Point = Point::new(WIDTH as i32 / 2, 170);
const MESSAGE_Y: i32 = 300;
const DETAIL_Y: i32 = 335;

pub type PanelError<SPI, DC> = uc8179::Error<
    <SPI as embedded_hal::spi::ErrorType>::Error,
    <DC as embedded_hal::digital::ErrorType>::Error,
>;

/// Renderer for the 7.5" UC8179 panel. Frames are composed in `frame` and pushed whole.
pub struct EpaperRenderer<'d, SPI, DC, RST, BUSY, DELAY> {
    panel: Uc8179<SPI, DC, RST, BUSY, DELAY>,
    frame: &'d mut FrameBuffer,
    awake: bool,
    refresh_in_flight: bool,
}

impl<'d, SPI, DC, RST, BUSY, DELAY> EpaperRenderer<'d, SPI, DC, RST, BUSY, DELAY>
where
    SPI: SpiDevice<u8>,
    DC: OutputPin,
    RST: OutputPin<Error = DC::Error>,
    BUSY: InputPin<Error = DC::Error>,
    DELAY: DelayNs,
{
    pub fn new(panel: Uc8179<SPI, DC, RST, BUSY, DELAY>, frame: &'d mut FrameBuffer) -> Self {
        Self {
            panel,
            frame,
            awake: false,
            refresh_in_flight: false,
        }
    }

    /// Waits out a refresh started with `wait = false`.
    fn settle(&mut self) -> Result<(), PanelError<SPI, DC>> {
        if self.refresh_in_flight {
            self.refresh_in_flight = false;
            self.panel.wait_until_idle()?;
        }
        Ok(())
    }

    fn flush(&mut self, wait: bool) -> Result<(), PanelError<SPI, DC>> {
        self.settle()?;
        if !self.awake {
            self.panel.init()?;
            self.awake = true;
        }

        self.panel.start_frame(self.frame.bytes())?;
        if wait {
            self.panel.wait_until_idle()
        } else {
            self.refresh_in_flight = true;
            Ok(())
        }
    }

    fn draw_text(&mut self, text: &str, y: i32, large: bool) {
        let font = if large { &FONT_10X20 } else { &FONT_6X13 };
        let style = MonoTextStyle::new(font, BinaryColor::On);
        let position = Point::new(WIDTH as i32 / 2, y);
        let _ = Text::with_alignment(text, position, style, Alignment::Center)
            .draw(&mut *self.frame);
    }

    fn draw_icon(&mut self, icon: StatusIcon) {
        let stroke = PrimitiveStyle::with_stroke(BinaryColor::On, 6);
        let fill = PrimitiveStyle::with_fill(BinaryColor::On);
        let c = ICON_CENTER;
        let frame = &mut *self.frame;

        let _ = match icon {
            StatusIcon::Wifi => {
                for diameter in [120u32, 80, 40] {
                    let start = Angle::from_degrees(225.0);
                    let sweep = Angle::from_degrees(90.0);
                    let _ = Arc::with_center(c, diameter, start, sweep)
                        .into_styled(stroke)
                        .draw(frame);
                }
                Circle::with_center(c, 14).into_styled(fill).draw(frame)
            }
            StatusIcon::Download => {
                let _ = Line::new(c - Point::new(0, 60), c + Point::new(0, 10))
                    .into_styled(stroke)
                    .draw(frame);
                let _ = Triangle::new(
                    c + Point::new(-30, 0),
                    c + Point::new(30, 0),
                    c + Point::new(0, 35),
                )
                .into_styled(fill)
                .draw(frame);
                Line::new(c + Point::new(-50, 55), c + Point::new(50, 55))
                    .into_styled(stroke)
                    .draw(frame)
            }
            StatusIcon::Key => {
                let _ = Circle::with_center(c - Point::new(40, 0), 50)
                    .into_styled(stroke)
                    .draw(frame);
                let _ = Line::new(c - Point::new(15, 0), c + Point::new(60, 0))
                    .into_styled(stroke)
                    .draw(frame);
                let _ = Line::new(c + Point::new(45, 0), c + Point::new(45, 20))
                    .into_styled(stroke)
                    .draw(frame);
                Line::new(c + Point::new(60, 0), c + Point::new(60, 25))
                    .into_styled(stroke)
                    .draw(frame)
            }
            StatusIcon::Image => {
                let _ = Rectangle::with_center(c, Size::new(140, 100))
                    .into_styled(stroke)
                    .draw(frame);
                let _ = Triangle::new(
                    c + Point::new(-55, 40),
                    c + Point::new(-10, -15),
                    c + Point::new(35, 40),
                )
                .into_styled(fill)
                .draw(frame);
                Circle::with_center(c + Point::new(35, -20), 22)
                    .into_styled(fill)
                    .draw(frame)
            }
            StatusIcon::Warning => {
                let _ = Triangle::new(
                    c + Point::new(0, -60),
                    c + Point::new(-65, 50),
                    c + Point::new(65, 50),
                )
                .into_styled(stroke)
                .draw(frame);
                let _ = Line::new(c + Point::new(0, -25), c + Point::new(0, 15))
                    .into_styled(stroke)
                    .draw(frame);
                Circle::with_center(c + Point::new(0, 32), 10)
                    .into_styled(fill)
                    .draw(frame)
            }
        };
    }
}

impl<SPI, DC, RST, BUSY, DELAY> Renderer for EpaperRenderer<'_, SPI, DC, RST, BUSY, DELAY>
where
    SPI: SpiDevice<u8>,
    DC: OutputPin,
    RST: OutputPin<Error = DC::Error>,
    BUSY: InputPin<Error = DC::Error>,
    DELAY: DelayNs,
{
    fn show_splash(&mut self, wait: bool) {
        self.frame.clear(false);
        self.draw_text(TITLE, 220, true);
        self.draw_text("Refreshing...", 260, false);
        if let Err(err) = self.flush(wait) {
            warn!("display: splash failed err={:?}", err);
        }
    }

    fn show_status(&mut self, icon: StatusIcon, message: MessageCode, context: &StatusContext) {
        self.frame.clear(false);
        self.draw_icon(icon);
        self.draw_text(message_text(message), MESSAGE_Y, true);

        let mut detail: HeaplessString<64> = HeaplessString::new();
        if let Some(attempt) = context.attempt {
            let _ = write!(detail, "Attempt {} - ", attempt);
        }
        let _ = write_retry(&mut detail, context.retry_in_secs);
        self.draw_text(detail.as_str(), DETAIL_Y, false);

        info!("display: status icon={:?} message={}", icon, message.as_str());
        if let Err(err) = self.flush(true) {
            warn!("display: status failed err={:?}", err);
        }
    }

    fn show_image(
        &mut self,
        bytes: &[u8],
        hint: RenderHint,
        wait: bool,
    ) -> Result<(), RenderError> {
        if classify(bytes) != ImageKind::BitmapContainer {
            return Err(RenderError::Unsupported);
        }
        let header = BmpHeader::parse(bytes).map_err(|_| RenderError::Unsupported)?;
        if header.width != WIDTH as i32
            || header.rows() != HEIGHT
            || header.bits_per_pixel != 1
            || header.pixel_end().is_none_or(|end| bytes.len() < end)
        {
            return Err(RenderError::Unsupported);
        }

        for y in 0..HEIGHT {
            let range = header.row_range(y);
            let source = &bytes[range.start..range.start + LINE_BYTES];
            let Some(row) = self.frame.row_mut(y) else {
                break;
            };
            // Frame bits are set for black; a normal palette maps bit 0 to black.
            for (dst, src) in row.iter_mut().zip(source) {
                *dst = if hint.inverted { *src } else { !*src };
            }
        }

        self.flush(wait).map_err(|err| {
            warn!("display: image refresh failed err={:?}", err);
            RenderError::Panel
        })
    }

    fn enter_low_power_mode(&mut self) {
        if let Err(err) = self.settle() {
            warn!("display: refresh did not settle err={:?}", err);
        }
        if !self.awake {
            return;
        }
        match self.panel.sleep() {
            Ok(()) => info!("display: deep sleep"),
            Err(err) => warn!("display: sleep failed err={:?}", err),
        }
        self.awake = false;
    }
}

fn message_text(message: MessageCode) -> &'static str {
    match message {
        MessageCode::WifiNotConfigured => "Wi-Fi is not set up",
        MessageCode::WifiFailed => "Could not join Wi-Fi",
        MessageCode::ConfigMissing => "Content source not configured",
        MessageCode::KeyInvalid => "Content key is invalid",
        MessageCode::ManifestUnavailable => "Playlist unavailable",
        MessageCode::ManifestInvalid => "Playlist could not be read",
        MessageCode::PlaylistEmpty => "Playlist is empty",
        MessageCode::ImageUnavailable => "Image unavailable",
        MessageCode::ImageInvalid => "Image could not be read",
        MessageCode::FormatUnsupported => "Image format not supported",
        MessageCode::OutOfMemory => "Out of memory",
        MessageCode::DisplayFault => "Display fault",
    }
}

fn write_retry(out: &mut HeaplessString<64>, secs: u32) -> core::fmt::Result {
    match secs {
        s if s >= 3600 && s % 3600 == 0 => write!(out, "retrying in {} h", s / 3600),
        s if s >= 60 && s % 60 == 0 => write!(out, "retrying in {} min", s / 60),
        s => write!(out, "retrying in {} s", s),
    }
}
