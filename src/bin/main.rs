#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_futures::select::{Either, select};
use embassy_net::StackResources;
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::{
    clock::CpuClock,
    delay::Delay,
    gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull},
    rtc_cntl::{SocResetReason, reset_reason, wakeup_cause},
    spi::master::Spi,
    system::{Cpu, SleepSource},
    time::Rate,
    timer::timg::TimerGroup,
};
use inkwake_core::{
    backoff::RESOURCE_ERROR_SLEEP_SECS,
    fetch::{FetchConfig, Fetcher, TrustPolicy},
    input::{ButtonPress, WakeCause, WakeReason, resolve_wake_reason},
    orchestrator::{WakeCycle, WakeOutcome},
    retention::RetentionState,
};
use inkwake_hal_esp32s3::{
    input::button::{ButtonConfig, WakeButton},
    network::{
        LinkConfig, WifiLink,
        transport::{HwRng, NetTransport, TimerPacer, TransportBuffers, TransportConfig},
    },
    platform::display::EpaperRenderer,
    storage::{flash_store::FlashStore, retention},
};
use log::{LevelFilter, info, warn};
use rand_core::RngCore;
use static_cell::{ConstStaticCell, StaticCell};
use uc8179::{FrameBuffer, Uc8179};

#[path = "main/battery.rs"]
mod battery;
#[path = "main/defaults.rs"]
mod defaults;
#[path = "main/power.rs"]
mod power;

const PANEL_SPI_HZ: u32 = 4_000_000;

static NET_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
static FRAME: ConstStaticCell<FrameBuffer> = ConstStaticCell::new(FrameBuffer::new());
static TRANSPORT_BUFFERS: ConstStaticCell<TransportBuffers> =
    ConstStaticCell::new(TransportBuffers::new());

#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

fn wake_cause(reset: Option<SocResetReason>, source: SleepSource) -> WakeCause {
    match reset {
        Some(SocResetReason::ChipPowerOn) => WakeCause::PowerOn,
        Some(SocResetReason::CoreDeepSleep) => match source {
            SleepSource::Timer => WakeCause::Timer,
            SleepSource::Ext0 | SleepSource::Ext1 | SleepSource::Gpio => WakeCause::Button,
            _ => WakeCause::Other,
        },
        _ => WakeCause::Other,
    }
}

/// Bring-up failed before the wake cycle could run; keep the retained state and retry later.
fn sleep_after_boot_fault(what: &str, retention: RetentionState) -> ! {
    warn!("boot: {} failed; sleeping", what);
    retention::store(retention);
    power::enter_deep_sleep(RESOURCE_ERROR_SLEEP_SECS)
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    esp_println::logger::init_logger(LevelFilter::Info);
    esp_println::println!("boot: inkwake starting");

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);
    let boot_reset_reason = reset_reason(Cpu::ProCpu);
    let boot_wakeup_cause = wakeup_cause();
    info!(
        "boot reset_reason={:?} wakeup_cause={:?}",
        boot_reset_reason, boot_wakeup_cause
    );

    // esp-radio requires an allocator; downloads need room for one sealed image.
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 65536);
    esp_alloc::heap_allocator!(size: 128 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // Battery sense: GPIO1 (ADC1 channel 0).
    battery::log_voltage(peripherals.ADC1, peripherals.GPIO1);

    let cause = wake_cause(boot_reset_reason, boot_wakeup_cause);
    let retention = match cause {
        WakeCause::PowerOn => {
            retention::clear();
            RetentionState::first_boot()
        }
        _ => retention::load().unwrap_or_else(RetentionState::first_boot),
    };

    // Wake button: GPIO12, active low with pull-up.
    let wake_sw = Input::new(peripherals.GPIO12, InputConfig::default().with_pull(Pull::Up));
    let reason = match WakeButton::new(wake_sw, ButtonConfig::default()) {
        Ok(mut button) => resolve_wake_reason(cause, &mut button).await,
        Err(err) => {
            warn!("input: button init failed err={:?}", err);
            match cause {
                WakeCause::Button => WakeReason::UserButton(ButtonPress::ShortPress),
                WakeCause::Timer => WakeReason::TimerExpired,
                WakeCause::PowerOn => WakeReason::PowerOnReset,
                WakeCause::Other => WakeReason::Undefined,
            }
        }
    };

    // Panel wiring: SCK=GPIO13 MOSI=GPIO14 CS=GPIO15 DC=GPIO16 RST=GPIO17 BUSY=GPIO18
    let spi_config = esp_hal::spi::master::Config::default()
        .with_frequency(Rate::from_hz(PANEL_SPI_HZ))
        .with_mode(esp_hal::spi::Mode::_0);
    let spi = match Spi::new(peripherals.SPI2, spi_config) {
        Ok(spi) => spi
            .with_sck(peripherals.GPIO13)
            .with_mosi(peripherals.GPIO14),
        Err(err) => {
            info!("display: spi config failed err={:?}", err);
            sleep_after_boot_fault("display spi", retention)
        }
    };
    let cs = Output::new(peripherals.GPIO15, Level::High, OutputConfig::default());
    let dc = Output::new(peripherals.GPIO16, Level::Low, OutputConfig::default());
    let rst = Output::new(peripherals.GPIO17, Level::High, OutputConfig::default());
    let busy = Input::new(peripherals.GPIO18, InputConfig::default());
    let Ok(spi_device) = ExclusiveDevice::new_no_delay(spi, cs) else {
        sleep_after_boot_fault("display chip select", retention)
    };
    let panel_config = uc8179::Config {
        spi_hz: PANEL_SPI_HZ,
        ..uc8179::Config::default()
    };
    let panel = Uc8179::new(spi_device, dc, rst, busy, Delay::new(), panel_config);
    let renderer = EpaperRenderer::new(panel, FRAME.take());

    let radio = match esp_radio::init() {
        Ok(radio) => radio,
        Err(err) => {
            info!("esp-radio init failed: {:?}", err);
            sleep_after_boot_fault("radio", retention)
        }
    };

    let (wifi_controller, interfaces) =
        match esp_radio::wifi::new(&radio, peripherals.WIFI, esp_radio::wifi::Config::default()) {
            Ok(parts) => parts,
            Err(err) => {
                info!("wifi peripheral init failed: {:?}", err);
                sleep_after_boot_fault("wifi", retention)
            }
        };

    let mut rng = HwRng::new();
    let stack_config = embassy_net::Config::dhcpv4(Default::default());
    let (stack, mut net_runner) = embassy_net::new(
        interfaces.sta,
        stack_config,
        NET_RESOURCES.init(StackResources::<4>::new()),
        rng.next_u64(),
    );

    let transport = NetTransport::new(
        stack,
        TRANSPORT_BUFFERS.take(),
        rng,
        TransportConfig::default(),
    );
    let fetcher = Fetcher::new(
        transport,
        TimerPacer::default(),
        FetchConfig::default().with_trust(TrustPolicy::Relaxed),
    );
    let link = WifiLink::new(wifi_controller, stack, LinkConfig::default());

    let mut cycle = WakeCycle::new(FlashStore::new(), link, fetcher, renderer)
        .with_defaults(defaults::BUILD_DEFAULTS);

    let report = match select(net_runner.run(), cycle.run(reason, retention)).await {
        Either::First(never) => never,
        Either::Second(report) => report,
    };

    info!(
        "wake: done reached={:?} outcome={:?} next_index={}",
        report.reached, report.outcome, report.retention.playlist_index
    );
    retention::store(report.retention);

    match report.outcome {
        WakeOutcome::Sleep(plan) => power::enter_deep_sleep(plan.seconds),
        WakeOutcome::Restart(cause) => {
            info!("wake: restart cause={:?}", cause);
            power::restart()
        }
    }
}
