//! Station-mode network link.

use alloc::string::String;

#[derive(Clone, Default, Eq, PartialEq)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

impl WifiCredentials {
    pub fn is_configured(&self) -> bool {
        !self.ssid.is_empty()
    }
}

impl core::fmt::Debug for WifiCredentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WifiCredentials")
            .field("ssid", &self.ssid)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LinkError {
    NotConfigured,
    RadioStart,
    Association,
    DhcpTimeout,
}

/// Joins and leaves the known access point.
#[allow(async_fn_in_trait)]
pub trait NetworkLink {
    /// Returns once the interface has an IPv4 configuration.
    async fn join(&mut self, credentials: &WifiCredentials) -> Result<(), LinkError>;

    /// Drops the association. Must be safe to call when not joined.
    async fn release(&mut self);
}
