//! Render collaborator interface and status-screen vocabulary.

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatusIcon {
    Wifi,
    Download,
    Key,
    Image,
    Warning,
}

/// Message shown under the status icon. The renderer owns the wording.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageCode {
    WifiNotConfigured,
    WifiFailed,
    ConfigMissing,
    KeyInvalid,
    ManifestUnavailable,
    ManifestInvalid,
    PlaylistEmpty,
    ImageUnavailable,
    ImageInvalid,
    FormatUnsupported,
    OutOfMemory,
    DisplayFault,
}

impl MessageCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WifiNotConfigured => "wifi_not_configured",
            Self::WifiFailed => "wifi_failed",
            Self::ConfigMissing => "config_missing",
            Self::KeyInvalid => "key_invalid",
            Self::ManifestUnavailable => "manifest_unavailable",
            Self::ManifestInvalid => "manifest_invalid",
            Self::PlaylistEmpty => "playlist_empty",
            Self::ImageUnavailable => "image_unavailable",
            Self::ImageInvalid => "image_invalid",
            Self::FormatUnsupported => "format_unsupported",
            Self::OutOfMemory => "out_of_memory",
            Self::DisplayFault => "display_fault",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StatusContext {
    /// Consecutive-failure count for counter-driven retries.
    pub attempt: Option<u32>,
    pub retry_in_secs: u32,
}

/// How the renderer should interpret accepted image bytes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RenderHint {
    /// Palette index 0 is white instead of black.
    pub inverted: bool,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RenderError {
    /// The panel cannot show this container or geometry.
    Unsupported,
    /// Bus or controller fault.
    Panel,
}

/// E-paper output. Calls with `wait = true` return after the physical refresh finished.
pub trait Renderer {
    fn show_splash(&mut self, wait: bool);
    fn show_status(&mut self, icon: StatusIcon, message: MessageCode, context: &StatusContext);
    fn show_image(&mut self, bytes: &[u8], hint: RenderHint, wait: bool)
    -> Result<(), RenderError>;
    fn enter_low_power_mode(&mut self);
}
