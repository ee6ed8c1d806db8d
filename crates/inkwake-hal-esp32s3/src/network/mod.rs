pub mod transport;

use embassy_net::Stack;
use embassy_time::{Duration, Timer, WithTimeout};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController};
use inkwake_core::network::{LinkError, NetworkLink, WifiCredentials};
use log::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    pub dhcp_timeout_secs: u64,
    /// Association attempts within one join before giving up.
    pub connect_attempts: u8,
    pub retry_pause_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            dhcp_timeout_secs: 15,
            connect_attempts: 3,
            retry_pause_ms: 500,
        }
    }
}

impl LinkConfig {
    pub const fn with_dhcp_timeout_secs(mut self, dhcp_timeout_secs: u64) -> Self {
        self.dhcp_timeout_secs = dhcp_timeout_secs;
        self
    }

    pub const fn with_connect_attempts(mut self, connect_attempts: u8) -> Self {
        self.connect_attempts = connect_attempts;
        self
    }
}

/// Station link over the on-chip radio. The stack runner must be polled alongside.
pub struct WifiLink<'d> {
    controller: WifiController<'d>,
    stack: Stack<'d>,
    config: LinkConfig,
}

impl<'d> WifiLink<'d> {
    pub fn new(controller: WifiController<'d>, stack: Stack<'d>, config: LinkConfig) -> Self {
        Self {
            controller,
            stack,
            config,
        }
    }

    pub fn stack(&self) -> Stack<'d> {
        self.stack
    }

    async fn associate(&mut self) -> Result<(), LinkError> {
        let attempts = self.config.connect_attempts.max(1);
        for attempt in 1..=attempts {
            match self.controller.connect_async().await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    info!("wifi: connect failed attempt={} err={:?}", attempt, err);
                    let _ = self.controller.disconnect_async().await;
                    if attempt < attempts {
                        Timer::after_millis(self.config.retry_pause_ms).await;
                    }
                }
            }
        }
        Err(LinkError::Association)
    }
}

impl NetworkLink for WifiLink<'_> {
    async fn join(&mut self, credentials: &WifiCredentials) -> Result<(), LinkError> {
        if !credentials.is_configured() {
            return Err(LinkError::NotConfigured);
        }

        let client_config = ClientConfig::default()
            .with_ssid(credentials.ssid.as_str().into())
            .with_password(credentials.password.as_str().into());
        if let Err(err) = self.controller.set_config(&ModeConfig::Client(client_config)) {
            warn!("wifi: mode config failed err={:?}", err);
            return Err(LinkError::RadioStart);
        }

        if !self.controller.is_started().unwrap_or(false) {
            if let Err(err) = self.controller.start_async().await {
                warn!("wifi: start failed err={:?}", err);
                return Err(LinkError::RadioStart);
            }
        }

        info!("wifi: joining ssid={}", credentials.ssid.as_str());
        self.associate().await?;

        match self
            .stack
            .wait_config_up()
            .with_timeout(Duration::from_secs(self.config.dhcp_timeout_secs))
            .await
        {
            Ok(()) => {
                if let Some(config) = self.stack.config_v4() {
                    info!("wifi: dhcp ready addr={}", config.address);
                }
                Ok(())
            }
            Err(_) => {
                info!("wifi: dhcp timeout");
                let _ = self.controller.disconnect_async().await;
                Err(LinkError::DhcpTimeout)
            }
        }
    }

    async fn release(&mut self) {
        if matches!(self.controller.is_connected(), Ok(true)) {
            let _ = self.controller.disconnect_async().await;
        }
        if self.controller.is_started().unwrap_or(false) {
            if let Err(err) = self.controller.stop_async().await {
                warn!("wifi: stop failed err={:?}", err);
            }
        }
        info!("wifi: released");
    }
}
