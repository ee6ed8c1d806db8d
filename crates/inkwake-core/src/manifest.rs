//! Playlist manifest decoding.
//!
//! Plaintext is a JSON object:
//! `{"version":1,"refresh_rate":1800,"updated_at":"...","screens":[{"name":"..","filename":"..","size":48062}]}`.

use alloc::string::String;
use core::fmt;

use heapless::Vec;
use log::{info, warn};
use serde::{
    Deserialize, Deserializer,
    de::{IgnoredAny, SeqAccess, Visitor},
};

use crate::config::DEFAULT_REFRESH_SECS;

pub const MAX_SCREENS: usize = 16;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ManifestError {
    ParseError,
    EmptyPlaylist,
    /// No room for the string unescape buffer.
    OutOfMemory,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct ScreenEntry {
    #[serde(rename = "name", default)]
    pub display_name: String,
    #[serde(rename = "filename", default)]
    pub asset_filename: String,
    /// Advisory only; never checked against the download.
    #[serde(rename = "size", default)]
    pub expected_size: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Manifest {
    pub schema_version: i32,
    pub refresh_interval_seconds: i32,
    pub updated_at: String,
    pub screens: Vec<ScreenEntry, MAX_SCREENS>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodedManifest {
    pub manifest: Manifest,
    /// Entries past [`MAX_SCREENS`] that were skipped.
    pub dropped_screens: usize,
}

pub fn decode(bytes: &[u8]) -> Result<DecodedManifest, ManifestError> {
    // An unescaped string is never longer than its escaped form.
    let mut scratch: alloc::vec::Vec<u8> = alloc::vec::Vec::new();
    scratch
        .try_reserve_exact(bytes.len())
        .map_err(|_| ManifestError::OutOfMemory)?;
    scratch.resize(bytes.len(), 0);

    let (wire, _) = serde_json_core::from_slice_escaped::<WireManifest>(bytes, &mut scratch)
        .map_err(|err| {
            warn!("manifest: parse failed err={:?}", err);
            ManifestError::ParseError
        })?;

    let CappedScreens { entries, dropped } = wire.screens;
    if entries.is_empty() {
        warn!("manifest: no screens");
        return Err(ManifestError::EmptyPlaylist);
    }
    if dropped > 0 {
        info!(
            "manifest: truncated at {} screens dropped={}",
            MAX_SCREENS, dropped
        );
    }

    info!(
        "manifest: version={} screens={} refresh={}s updated_at={}",
        wire.version,
        entries.len(),
        wire.refresh_rate,
        wire.updated_at
    );

    Ok(DecodedManifest {
        manifest: Manifest {
            schema_version: wire.version,
            refresh_interval_seconds: wire.refresh_rate,
            updated_at: wire.updated_at,
            screens: entries,
        },
        dropped_screens: dropped,
    })
}

fn default_refresh_rate() -> i32 {
    DEFAULT_REFRESH_SECS
}

#[derive(Deserialize)]
struct WireManifest {
    #[serde(default)]
    version: i32,
    #[serde(default = "default_refresh_rate")]
    refresh_rate: i32,
    #[serde(default)]
    updated_at: String,
    #[serde(default)]
    screens: CappedScreens,
}

#[derive(Default)]
struct CappedScreens {
    entries: Vec<ScreenEntry, MAX_SCREENS>,
    dropped: usize,
}

impl<'de> Deserialize<'de> for CappedScreens {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(CappedScreensVisitor)
    }
}

struct CappedScreensVisitor;

impl<'de> Visitor<'de> for CappedScreensVisitor {
    type Value = CappedScreens;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("an array of screen objects")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut screens = CappedScreens::default();
        while !screens.entries.is_full() {
            match seq.next_element::<ScreenEntry>()? {
                Some(entry) => {
                    let _ = screens.entries.push(entry);
                }
                None => return Ok(screens),
            }
        }

        // Extra entries must still be well formed; they are skipped, not kept.
        while seq.next_element::<IgnoredAny>()?.is_some() {
            screens.dropped += 1;
        }
        Ok(screens)
    }
}
