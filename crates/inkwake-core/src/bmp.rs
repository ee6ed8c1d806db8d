//! 1-bit BMP header parsing and validation for the panel geometry.

use crate::sentinel::{HeaderError, HeaderReport, HeaderValidator, PaletteKind};

pub const FILE_HEADER_LEN: usize = 14;
pub const INFO_HEADER_LEN: u32 = 40;
/// File header, BITMAPINFOHEADER and a two-entry palette.
pub const MIN_HEADER_LEN: usize = 62;

const BI_RGB: u32 = 0;
const PALETTE_BLACK: [u8; 4] = [0, 0, 0, 0];
const PALETTE_WHITE: [u8; 4] = [255, 255, 255, 0];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BmpHeader {
    pub data_offset: u32,
    pub info_header_len: u32,
    pub width: i32,
    /// Positive for bottom-up row order, negative for top-down.
    pub height: i32,
    pub planes: u16,
    pub bits_per_pixel: u16,
    pub compression: u32,
    pub image_size: u32,
    pub colours_used: u32,
}

impl BmpHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() < MIN_HEADER_LEN {
            return Err(HeaderError::TooShort);
        }
        if !bytes.starts_with(b"BM") {
            return Err(HeaderError::NotBitmap);
        }

        Ok(Self {
            data_offset: read_u32(bytes, 10),
            info_header_len: read_u32(bytes, 14),
            width: read_u32(bytes, 18) as i32,
            height: read_u32(bytes, 22) as i32,
            planes: read_u16(bytes, 26),
            bits_per_pixel: read_u16(bytes, 28),
            compression: read_u32(bytes, 30),
            image_size: read_u32(bytes, 34),
            colours_used: read_u32(bytes, 46),
        })
    }

    pub fn top_down(&self) -> bool {
        self.height < 0
    }

    pub fn rows(&self) -> usize {
        self.height.unsigned_abs() as usize
    }

    /// Row length in bytes, padded to a 4-byte boundary.
    pub fn row_stride(&self) -> usize {
        let bits = self.width.unsigned_abs() as usize * self.bits_per_pixel as usize;
        bits.div_ceil(32) * 4
    }

    pub fn pixel_bytes(&self) -> usize {
        self.row_stride() * self.rows()
    }

    /// `None` when the info header length does not fit the address space.
    pub fn palette_offset(&self) -> Option<usize> {
        usize::try_from(self.info_header_len)
            .ok()?
            .checked_add(FILE_HEADER_LEN)
    }

    /// End of the pixel data, or `None` if the header points past the address space.
    pub fn pixel_end(&self) -> Option<usize> {
        usize::try_from(self.data_offset)
            .ok()?
            .checked_add(self.pixel_bytes())
    }

    /// Effective palette size; zero in the header means `1 << bpp`.
    pub fn colour_count(&self) -> u32 {
        if self.colours_used == 0 {
            1u32.checked_shl(self.bits_per_pixel as u32).unwrap_or(0)
        } else {
            self.colours_used
        }
    }

    /// Byte range of source row `y` (0 = top of the picture).
    pub fn row_range(&self, y: usize) -> core::ops::Range<usize> {
        let stored_row = if self.top_down() {
            y
        } else {
            self.rows() - 1 - y
        };
        let start = self.data_offset as usize + stored_row * self.row_stride();
        start..start + self.row_stride()
    }
}

/// Accepts uncompressed 1-bit bitmaps of exactly the panel size.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BmpHeaderValidator {
    width: u32,
    height: u32,
}

impl Default for BmpHeaderValidator {
    fn default() -> Self {
        Self::new(800, 480)
    }
}

impl BmpHeaderValidator {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }
}

impl HeaderValidator for BmpHeaderValidator {
    fn validate(&self, bytes: &[u8]) -> Result<HeaderReport, HeaderError> {
        let header = BmpHeader::parse(bytes)?;

        if header.info_header_len < INFO_HEADER_LEN {
            return Err(HeaderError::UnsupportedInfoHeader(header.info_header_len));
        }
        if header.width.unsigned_abs() != self.width
            || header.width < 0
            || header.height.unsigned_abs() != self.height
        {
            return Err(HeaderError::BadDimensions {
                width: header.width,
                height: header.height,
            });
        }
        if header.bits_per_pixel != 1 || header.planes != 1 {
            return Err(HeaderError::UnsupportedDepth(header.bits_per_pixel));
        }
        if header.compression != BI_RGB {
            return Err(HeaderError::Compressed(header.compression));
        }

        let pixel_bytes = header.pixel_bytes();
        if header.image_size != 0 && header.image_size as usize != pixel_bytes {
            return Err(HeaderError::BadImageSize(header.image_size));
        }
        if header.colour_count() != 2 {
            return Err(HeaderError::BadColourCount(header.colours_used));
        }

        let palette_end = header
            .palette_offset()
            .and_then(|at| at.checked_add(8))
            .ok_or(HeaderError::UnsupportedInfoHeader(header.info_header_len))?;
        let palette_at = palette_end - 8;
        let offset = header.data_offset as usize;
        if offset < palette_end || offset > bytes.len() {
            return Err(HeaderError::BadDataOffset(header.data_offset));
        }

        let palette = match (
            &bytes[palette_at..palette_at + 4],
            &bytes[palette_at + 4..palette_end],
        ) {
            (first, second) if first == PALETTE_BLACK && second == PALETTE_WHITE => {
                PaletteKind::Normal
            }
            (first, second) if first == PALETTE_WHITE && second == PALETTE_BLACK => {
                PaletteKind::Inverted
            }
            _ => return Err(HeaderError::UnrecognizedPalette),
        };

        if bytes.len() - offset < pixel_bytes {
            return Err(HeaderError::PixelDataTruncated);
        }

        Ok(HeaderReport {
            dimensions_ok: true,
            depth_ok: true,
            palette,
        })
    }
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
