//! Last gate before the panel: recognise the container and vet bitmap headers.

use log::{info, warn};

use crate::render::RenderHint;

/// Bytes needed to tell the supported containers apart.
pub const MIN_CLASSIFY_BYTES: usize = 4;

const PNG_MAGIC: [u8; 4] = [0x89, b'P', b'N', b'G'];
const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageKind {
    BitmapContainer,
    PngContainer,
    JpegContainer,
    Unknown,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PaletteKind {
    /// Index 0 is black.
    Normal,
    /// Index 0 is white.
    Inverted,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HeaderReport {
    pub dimensions_ok: bool,
    pub depth_ok: bool,
    pub palette: PaletteKind,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum HeaderError {
    TooShort,
    NotBitmap,
    UnsupportedInfoHeader(u32),
    BadDimensions { width: i32, height: i32 },
    UnsupportedDepth(u16),
    Compressed(u32),
    BadImageSize(u32),
    BadColourCount(u32),
    BadDataOffset(u32),
    UnrecognizedPalette,
    PixelDataTruncated,
}

pub trait HeaderValidator {
    fn validate(&self, bytes: &[u8]) -> Result<HeaderReport, HeaderError>;
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SentinelError {
    TooSmall,
    UnsupportedFormat,
    InvalidHeader(HeaderError),
    /// The validator parsed the header but flagged its geometry.
    GeometryMismatch { dimensions_ok: bool, depth_ok: bool },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AcceptedImage {
    pub kind: ImageKind,
    pub hint: RenderHint,
}

pub fn classify(bytes: &[u8]) -> ImageKind {
    if bytes.starts_with(b"BM") {
        ImageKind::BitmapContainer
    } else if bytes.starts_with(&PNG_MAGIC) {
        ImageKind::PngContainer
    } else if bytes.starts_with(&JPEG_MAGIC) {
        ImageKind::JpegContainer
    } else {
        ImageKind::Unknown
    }
}

/// Classifies `bytes` and, for bitmaps, checks the header against the panel.
///
/// PNG and JPEG containers pass untouched with a default hint; whether they can be
/// shown is up to the renderer.
pub fn classify_and_validate<V: HeaderValidator>(
    bytes: &[u8],
    validator: &V,
) -> Result<AcceptedImage, SentinelError> {
    if bytes.len() < MIN_CLASSIFY_BYTES {
        warn!("sentinel: too small len={}", bytes.len());
        return Err(SentinelError::TooSmall);
    }

    let kind = classify(bytes);
    let hint = match kind {
        ImageKind::Unknown => {
            warn!(
                "sentinel: unknown container magic={:02x}{:02x}{:02x}{:02x}",
                bytes[0], bytes[1], bytes[2], bytes[3]
            );
            return Err(SentinelError::UnsupportedFormat);
        }
        ImageKind::PngContainer | ImageKind::JpegContainer => RenderHint::default(),
        ImageKind::BitmapContainer => {
            let report = validator.validate(bytes).map_err(|err| {
                warn!("sentinel: bitmap header rejected err={:?}", err);
                SentinelError::InvalidHeader(err)
            })?;
            if !report.dimensions_ok || !report.depth_ok {
                warn!(
                    "sentinel: geometry mismatch dimensions_ok={} depth_ok={}",
                    report.dimensions_ok, report.depth_ok
                );
                return Err(SentinelError::GeometryMismatch {
                    dimensions_ok: report.dimensions_ok,
                    depth_ok: report.depth_ok,
                });
            }
            RenderHint {
                inverted: report.palette == PaletteKind::Inverted,
            }
        }
    };

    info!(
        "sentinel: accepted kind={:?} len={} inverted={}",
        kind,
        bytes.len(),
        hint.inverted
    );
    Ok(AcceptedImage { kind, hint })
}
