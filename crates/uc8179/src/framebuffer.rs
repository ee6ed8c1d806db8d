//! 1bpp frame held in RAM until it is streamed to the controller.

use crate::protocol::{BUFFER_SIZE, HEIGHT, LINE_BYTES, WIDTH};

/// Panel frame, rows top to bottom.
///
/// A set bit is a black pixel; bit 7 is the leftmost pixel of each byte. All zeros is white,
/// which is what the controller expects in `DATA_START_TRANSMISSION_2`.
#[derive(Clone)]
pub struct FrameBuffer {
    bytes: [u8; BUFFER_SIZE],
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    /// Creates a white frame.
    pub const fn new() -> Self {
        Self {
            bytes: [0u8; BUFFER_SIZE],
        }
    }

    pub fn bytes(&self) -> &[u8; BUFFER_SIZE] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8; BUFFER_SIZE] {
        &mut self.bytes
    }

    /// Fills the frame with black (`black = true`) or white.
    pub fn clear(&mut self, black: bool) {
        self.bytes.fill(if black { 0xFF } else { 0x00 });
    }

    /// Returns `false` when the pixel is off-panel.
    pub fn set_pixel(&mut self, x: usize, y: usize, black: bool) -> bool {
        let Some((index, mask)) = locate(x, y) else {
            return false;
        };

        if black {
            self.bytes[index] |= mask;
        } else {
            self.bytes[index] &= !mask;
        }
        true
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<bool> {
        let (index, mask) = locate(x, y)?;
        Some(self.bytes[index] & mask != 0)
    }

    /// Row `y` (0-based from the top).
    pub fn row(&self, y: usize) -> Option<&[u8; LINE_BYTES]> {
        if y >= HEIGHT {
            return None;
        }
        let start = y * LINE_BYTES;
        <&[u8; LINE_BYTES]>::try_from(&self.bytes[start..start + LINE_BYTES]).ok()
    }

    pub fn row_mut(&mut self, y: usize) -> Option<&mut [u8; LINE_BYTES]> {
        if y >= HEIGHT {
            return None;
        }
        let start = y * LINE_BYTES;
        <&mut [u8; LINE_BYTES]>::try_from(&mut self.bytes[start..start + LINE_BYTES]).ok()
    }
}

fn locate(x: usize, y: usize) -> Option<(usize, u8)> {
    if x >= WIDTH || y >= HEIGHT {
        return None;
    }
    Some((y * LINE_BYTES + x / 8, 0x80 >> (x % 8)))
}
