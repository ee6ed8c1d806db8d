//! One wake cycle: input, storage, network, manifest, image, render, sleep plan.
//!
//! The cycle never sleeps or restarts the chip itself; it returns a [`WakeReport`] and the
//! board executes the outcome.

use alloc::string::String;

use log::{error, info, warn};

use crate::{
    backoff::{CONFIG_ERROR_SLEEP_SECS, FORMAT_ERROR_SLEEP_SECS, RESOURCE_ERROR_SLEEP_SECS},
    bmp::BmpHeaderValidator,
    config::{
        BuildDefaults, CycleConfig, DeviceConfig, KEY_SLEEP_DURATION, KEY_WIFI_PASSWORD,
        KEY_WIFI_SSID,
    },
    counters::{Counter, CounterStore, KeyValueStore},
    crypto::{self, ContentKey, DecryptError},
    fetch::{FetchError, Fetcher, Pacer, Transport},
    input::{ButtonPress, WakeReason},
    manifest::{self, ManifestError},
    network::{LinkError, NetworkLink},
    render::{MessageCode, RenderError, Renderer, StatusContext, StatusIcon},
    retention::{RetentionState, select_screen},
    sentinel::{self, SentinelError},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum WakeState {
    Waking,
    InputHandled,
    StorageOpen,
    NetworkReady,
    ManifestReady,
    ScreenSelected,
    ImageReady,
    Rendered,
    Sleeping,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureClass {
    TransientNetwork,
    TransientContent,
    Configuration,
    Format,
    Resource,
    FatalLocal,
    UserRequested,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SleepCause {
    /// Screen shown; sleeping for the manifest's refresh interval.
    Refresh,
    Failure(FailureClass),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SleepPlan {
    pub seconds: u32,
    pub cause: SleepCause,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RestartCause {
    StorageUnavailable,
    FactoryReset,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WakeOutcome {
    Sleep(SleepPlan),
    Restart(RestartCause),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WakeReport {
    pub outcome: WakeOutcome,
    /// Value to write back to retained memory before sleeping.
    pub retention: RetentionState,
    /// Last stage completed before the cycle ended.
    pub reached: WakeState,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum RetryPolicy {
    Backoff(Counter),
    Fixed(u32),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Failure {
    class: FailureClass,
    icon: StatusIcon,
    message: MessageCode,
    policy: RetryPolicy,
}

impl Failure {
    const fn backoff(
        class: FailureClass,
        icon: StatusIcon,
        message: MessageCode,
        counter: Counter,
    ) -> Self {
        Self {
            class,
            icon,
            message,
            policy: RetryPolicy::Backoff(counter),
        }
    }

    const fn configuration(icon: StatusIcon, message: MessageCode) -> Self {
        Self {
            class: FailureClass::Configuration,
            icon,
            message,
            policy: RetryPolicy::Fixed(CONFIG_ERROR_SLEEP_SECS),
        }
    }

    const fn format(message: MessageCode) -> Self {
        Self {
            class: FailureClass::Format,
            icon: StatusIcon::Image,
            message,
            policy: RetryPolicy::Fixed(FORMAT_ERROR_SLEEP_SECS),
        }
    }

    const fn resource(message: MessageCode) -> Self {
        Self {
            class: FailureClass::Resource,
            icon: StatusIcon::Warning,
            message,
            policy: RetryPolicy::Fixed(RESOURCE_ERROR_SLEEP_SECS),
        }
    }

    fn from_link(err: LinkError) -> Self {
        let message = match err {
            LinkError::NotConfigured => MessageCode::WifiNotConfigured,
            _ => MessageCode::WifiFailed,
        };
        Self::backoff(
            FailureClass::TransientNetwork,
            StatusIcon::Wifi,
            message,
            Counter::WifiRetry,
        )
    }

    fn from_fetch(err: FetchError, unavailable: MessageCode, invalid: MessageCode) -> Self {
        match err {
            FetchError::OutOfMemory => Self::resource(MessageCode::OutOfMemory),
            FetchError::InvalidUrl => {
                Self::configuration(StatusIcon::Key, MessageCode::ConfigMissing)
            }
            FetchError::Connect(_) | FetchError::Transport(_) | FetchError::Timeout => {
                Self::backoff(
                    FailureClass::TransientNetwork,
                    StatusIcon::Download,
                    unavailable,
                    Counter::ApiRetry,
                )
            }
            FetchError::Status(_)
            | FetchError::SizeUnknown
            | FetchError::TooLarge(_)
            | FetchError::ShortRead { .. }
            | FetchError::MalformedResponse
            | FetchError::HeadTooLarge => Self::backoff(
                FailureClass::TransientContent,
                StatusIcon::Download,
                if matches!(err, FetchError::Status(_)) {
                    unavailable
                } else {
                    invalid
                },
                Counter::ApiRetry,
            ),
        }
    }

    fn from_decrypt(_err: DecryptError, message: MessageCode) -> Self {
        Self::backoff(
            FailureClass::TransientContent,
            StatusIcon::Key,
            message,
            Counter::ApiRetry,
        )
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct PendingActions {
    forget_credentials: bool,
    reset_api_retry: bool,
}

pub struct WakeCycle<S, L, T, P, R> {
    store: S,
    link: L,
    fetcher: Fetcher<T, P>,
    renderer: R,
    validator: BmpHeaderValidator,
    config: CycleConfig,
    defaults: BuildDefaults,
    link_active: bool,
}

impl<S, L, T, P, R> WakeCycle<S, L, T, P, R>
where
    S: KeyValueStore,
    L: NetworkLink,
    T: Transport,
    P: Pacer,
    R: Renderer,
{
    pub fn new(store: S, link: L, fetcher: Fetcher<T, P>, renderer: R) -> Self {
        Self {
            store,
            link,
            fetcher,
            renderer,
            validator: BmpHeaderValidator::default(),
            config: CycleConfig::default(),
            defaults: BuildDefaults::default(),
            link_active: false,
        }
    }

    pub fn with_config(mut self, config: CycleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_defaults(mut self, defaults: BuildDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_validator(mut self, validator: BmpHeaderValidator) -> Self {
        self.validator = validator;
        self
    }

    pub async fn run(&mut self, reason: WakeReason, retention: RetentionState) -> WakeReport {
        let mut retention = retention;
        let mut reached = WakeState::Waking;
        info!(
            "wake: reason={:?} index={} refresh_pending={}",
            reason, retention.playlist_index, retention.refresh_pending
        );

        let mut pending = PendingActions::default();
        match reason {
            WakeReason::UserButton(ButtonPress::SoftResetHold) => {
                warn!("wake: factory reset requested");
                if let Err(err) = self.store.erase_all() {
                    error!("wake: erase failed err={:?}", err);
                }
                return WakeReport {
                    outcome: WakeOutcome::Restart(RestartCause::FactoryReset),
                    retention: RetentionState::first_boot(),
                    reached,
                };
            }
            WakeReason::UserButton(ButtonPress::LongPress) => {
                info!("wake: credential reset queued");
                pending.forget_credentials = true;
            }
            WakeReason::UserButton(ButtonPress::DoubleClick) => {
                retention.playlist_index = retention.playlist_index.wrapping_add(1);
                pending.reset_api_retry = true;
                info!("wake: skip to index={}", retention.playlist_index);
            }
            _ => {}
        }

        if reason.is_interactive() {
            self.renderer.show_splash(true);
            retention.refresh_pending = true;
        }
        reached = WakeState::InputHandled;

        if let Err(err) = self.store.open() {
            error!("storage: open failed err={:?}; restarting", err);
            return WakeReport {
                outcome: WakeOutcome::Restart(RestartCause::StorageUnavailable),
                retention,
                reached,
            };
        }
        self.apply_pending(pending);
        reached = WakeState::StorageOpen;

        let plan = match self.refresh(&mut retention, &mut reached).await {
            Ok(seconds) => SleepPlan {
                seconds,
                cause: SleepCause::Refresh,
            },
            Err(failure) => self.plan_failure(failure),
        };

        self.renderer.enter_low_power_mode();
        if let Err(err) = self.store.put_u32(KEY_SLEEP_DURATION, plan.seconds) {
            warn!("storage: sleep duration write failed err={:?}", err);
        }
        self.release_link().await;

        info!(
            "sleep: seconds={} cause={:?} reached={:?} next_index={}",
            plan.seconds, plan.cause, reached, retention.playlist_index
        );
        WakeReport {
            outcome: WakeOutcome::Sleep(plan),
            retention,
            reached,
        }
    }

    fn apply_pending(&mut self, pending: PendingActions) {
        if pending.forget_credentials {
            for key in [KEY_WIFI_SSID, KEY_WIFI_PASSWORD] {
                if let Err(err) = self.store.remove(key) {
                    warn!("storage: remove failed key={} err={:?}", key, err);
                }
            }
            if let Err(err) = CounterStore::new(&mut self.store).reset(Counter::WifiRetry) {
                warn!("counters: reset failed err={:?}", err);
            }
        }
        if pending.reset_api_retry {
            if let Err(err) = CounterStore::new(&mut self.store).reset(Counter::ApiRetry) {
                warn!("counters: reset failed err={:?}", err);
            }
        }
    }

    /// Runs the network stages and renders one screen. Returns the refresh sleep on success.
    async fn refresh(
        &mut self,
        retention: &mut RetentionState,
        reached: &mut WakeState,
    ) -> Result<u32, Failure> {
        let device = DeviceConfig::load(&mut self.store, &self.defaults);

        self.link_active = true;
        self.link
            .join(&device.credentials)
            .await
            .map_err(|err| {
                warn!("network: join failed err={:?}", err);
                Failure::from_link(err)
            })?;
        self.reset_counter(Counter::WifiRetry);
        *reached = WakeState::NetworkReady;

        if device.manifest_url.is_empty() || device.images_base.is_empty() {
            warn!("config: manifest_url or images_base missing");
            return Err(Failure::configuration(
                StatusIcon::Key,
                MessageCode::ConfigMissing,
            ));
        }
        let key = ContentKey::from_hex(&device.aes_key_hex).map_err(|err| {
            warn!("config: content key rejected err={:?}", err);
            Failure::configuration(StatusIcon::Key, MessageCode::KeyInvalid)
        })?;

        let manifest = {
            let blob = self.fetcher.fetch(&device.manifest_url).await.map_err(|err| {
                Failure::from_fetch(
                    err,
                    MessageCode::ManifestUnavailable,
                    MessageCode::ManifestInvalid,
                )
            })?;
            let plaintext = crypto::decrypt(&key, blob).map_err(|err| {
                warn!("manifest: decrypt failed err={:?}", err);
                Failure::from_decrypt(err, MessageCode::ManifestInvalid)
            })?;
            manifest::decode(&plaintext)
                .map_err(|err| match err {
                    ManifestError::EmptyPlaylist => {
                        Failure::configuration(StatusIcon::Warning, MessageCode::PlaylistEmpty)
                    }
                    ManifestError::ParseError => Failure::backoff(
                        FailureClass::TransientContent,
                        StatusIcon::Download,
                        MessageCode::ManifestInvalid,
                        Counter::ApiRetry,
                    ),
                    ManifestError::OutOfMemory => Failure::resource(MessageCode::OutOfMemory),
                })?
                .manifest
        };
        *reached = WakeState::ManifestReady;

        let selection = select_screen(retention.playlist_index, manifest.screens.len()).ok_or(
            Failure::configuration(StatusIcon::Warning, MessageCode::PlaylistEmpty),
        )?;
        // The next wake moves on even if this entry fails to download or render.
        retention.playlist_index = selection.next;
        let screen = &manifest.screens[selection.selected];
        info!(
            "playlist: selected={} of {} name={} file={}",
            selection.selected,
            manifest.screens.len(),
            screen.display_name,
            screen.asset_filename
        );
        if screen.asset_filename.is_empty() {
            warn!("playlist: entry has no filename");
            return Err(Failure::backoff(
                FailureClass::TransientContent,
                StatusIcon::Download,
                MessageCode::ManifestInvalid,
                Counter::ApiRetry,
            ));
        }
        *reached = WakeState::ScreenSelected;

        let mut image_url =
            String::with_capacity(device.images_base.len() + screen.asset_filename.len());
        image_url.push_str(&device.images_base);
        image_url.push_str(&screen.asset_filename);

        let blob = self.fetcher.fetch(&image_url).await.map_err(|err| {
            Failure::from_fetch(err, MessageCode::ImageUnavailable, MessageCode::ImageInvalid)
        })?;
        self.release_link().await;

        let image = crypto::decrypt(&key, blob).map_err(|err| {
            warn!("image: decrypt failed err={:?}", err);
            Failure::from_decrypt(err, MessageCode::ImageInvalid)
        })?;
        *reached = WakeState::ImageReady;

        let accepted = sentinel::classify_and_validate(&image, &self.validator).map_err(|err| {
            Failure::format(match err {
                SentinelError::TooSmall | SentinelError::UnsupportedFormat => {
                    MessageCode::FormatUnsupported
                }
                SentinelError::InvalidHeader(_) | SentinelError::GeometryMismatch { .. } => {
                    MessageCode::ImageInvalid
                }
            })
        })?;

        self.renderer
            .show_image(&image, accepted.hint, true)
            .map_err(|err| {
                warn!("render: image rejected err={:?}", err);
                match err {
                    RenderError::Unsupported => Failure::format(MessageCode::FormatUnsupported),
                    RenderError::Panel => Failure::resource(MessageCode::DisplayFault),
                }
            })?;
        *reached = WakeState::Rendered;

        self.reset_counter(Counter::ApiRetry);
        retention.refresh_pending = false;

        Ok(self
            .config
            .refresh_sleep_secs(manifest.refresh_interval_seconds))
    }

    fn plan_failure(&mut self, failure: Failure) -> SleepPlan {
        let (seconds, attempt) = match failure.policy {
            RetryPolicy::Backoff(counter) => {
                let mut counters = CounterStore::new(&mut self.store);
                let attempt = counters.get_or_default(counter);
                if let Err(err) = counters.set(counter, attempt.saturating_add(1)) {
                    warn!("counters: write failed key={} err={:?}", counter.key(), err);
                }
                let seconds = counter
                    .schedule()
                    .delay_secs(attempt, self.config.normal_interval_secs);
                (seconds, Some(attempt))
            }
            RetryPolicy::Fixed(seconds) => (seconds, None),
        };

        warn!(
            "wake: failed class={:?} message={} attempt={:?} retry_in={}s",
            failure.class,
            failure.message.as_str(),
            attempt,
            seconds
        );
        self.renderer.show_status(
            failure.icon,
            failure.message,
            &StatusContext {
                attempt,
                retry_in_secs: seconds,
            },
        );

        SleepPlan {
            seconds,
            cause: SleepCause::Failure(failure.class),
        }
    }

    fn reset_counter(&mut self, counter: Counter) {
        if let Err(err) = CounterStore::new(&mut self.store).reset(counter) {
            warn!("counters: reset failed key={} err={:?}", counter.key(), err);
        }
    }

    async fn release_link(&mut self) {
        if self.link_active {
            self.link.release().await;
            self.link_active = false;
        }
    }
}

#[cfg(test)]
mod tests;
