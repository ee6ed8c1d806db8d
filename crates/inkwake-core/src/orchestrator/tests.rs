use embassy_futures::block_on;

use super::*;
use crate::{
    config::{KEY_AES_KEY_HEX, KEY_API_RETRY, KEY_WIFI_RETRY},
    fetch::FetchConfig,
    render::RenderHint,
    testing::{
        CountingPacer, MemoryStore, RecordingRenderer, RenderEvent, Route, ScriptedLink,
        ScriptedTransport, TEST_KEY_HEX, encrypt_with_iv, sample_bitmap, test_key,
    },
};

type TestCycle =
    WakeCycle<MemoryStore, ScriptedLink, ScriptedTransport, CountingPacer, RecordingRenderer>;

const MANIFEST_PATH: &str = "/manifest.bin";

fn defaults() -> BuildDefaults {
    BuildDefaults {
        manifest_url: "https://cdn.test/manifest.bin",
        images_base: "https://cdn.test/img/",
        aes_key_hex: TEST_KEY_HEX,
        wifi_ssid: "home",
        wifi_password: "hunter22",
    }
}

fn sealed(plaintext: &[u8]) -> Vec<u8> {
    encrypt_with_iv(&test_key(), [7; 16], plaintext)
}

fn manifest_json(refresh_rate: i32, files: &[&str]) -> Vec<u8> {
    let screens: Vec<String> = files
        .iter()
        .map(|file| format!("{{\"name\":\"{file}\",\"filename\":\"{file}\",\"size\":48062}}"))
        .collect();
    format!(
        "{{\"version\":1,\"refresh_rate\":{refresh_rate},\"updated_at\":\"2026-10-01\",\"screens\":[{}]}}",
        screens.join(",")
    )
    .into_bytes()
}

fn site(refresh_rate: i32, files: &[&str]) -> ScriptedTransport {
    let manifest = sealed(&manifest_json(refresh_rate, files));
    let mut transport = ScriptedTransport::new().ok(MANIFEST_PATH, &manifest);
    for file in files {
        transport = transport.ok(&format!("/img/{file}"), &sealed(&sample_bitmap(false)));
    }
    transport
}

fn cycle(store: MemoryStore, link: ScriptedLink, transport: ScriptedTransport) -> TestCycle {
    let fetcher = Fetcher::new(transport, CountingPacer::default(), FetchConfig::default());
    WakeCycle::new(store, link, fetcher, RecordingRenderer::default()).with_defaults(defaults())
}

fn steady() -> RetentionState {
    RetentionState {
        playlist_index: 0,
        refresh_pending: false,
    }
}

fn sleep_secs(report: &WakeReport) -> u32 {
    match report.outcome {
        WakeOutcome::Sleep(plan) => plan.seconds,
        WakeOutcome::Restart(cause) => panic!("expected sleep, got restart {cause:?}"),
    }
}

#[test]
fn three_screen_playlist_shows_last_entry_and_wraps() {
    let mut cycle = cycle(
        MemoryStore::default(),
        ScriptedLink::default(),
        site(1800, &["a.bmp", "b.bmp", "c.bmp"]),
    );
    let retention = RetentionState {
        playlist_index: 2,
        refresh_pending: false,
    };

    let report = block_on(cycle.run(WakeReason::TimerExpired, retention));

    assert_eq!(
        report.outcome,
        WakeOutcome::Sleep(SleepPlan {
            seconds: 1800,
            cause: SleepCause::Refresh
        })
    );
    assert_eq!(
        report.retention,
        RetentionState {
            playlist_index: 0,
            refresh_pending: false
        }
    );
    assert_eq!(report.reached, WakeState::Rendered);

    assert_eq!(
        cycle.fetcher.transport().requests,
        [MANIFEST_PATH, "/img/c.bmp"]
    );
    assert_eq!(
        cycle.renderer.events,
        [
            RenderEvent::Image {
                len: 48_062,
                hint: RenderHint { inverted: false },
                wait: true
            },
            RenderEvent::LowPower
        ]
    );
    assert_eq!(cycle.store.u32_value(KEY_SLEEP_DURATION), Some(1800));
    assert_eq!(cycle.store.u32_value(KEY_API_RETRY), Some(1));
    assert_eq!(cycle.store.u32_value(KEY_WIFI_RETRY), Some(1));
    assert_eq!(cycle.link.releases, 1);
}

#[test]
fn consecutive_wakes_walk_the_playlist() {
    let mut cycle = cycle(
        MemoryStore::default(),
        ScriptedLink::default(),
        site(600, &["a.bmp", "b.bmp"]),
    );

    let mut retention = steady();
    for _ in 0..3 {
        retention = block_on(cycle.run(WakeReason::TimerExpired, retention)).retention;
    }

    assert_eq!(
        cycle.fetcher.transport().requests,
        [
            MANIFEST_PATH,
            "/img/a.bmp",
            MANIFEST_PATH,
            "/img/b.bmp",
            MANIFEST_PATH,
            "/img/a.bmp"
        ]
    );
    assert_eq!(retention.playlist_index, 1);
}

#[test]
fn wifi_failures_back_off_then_reset_on_success() {
    let mut link = ScriptedLink::default();
    link.results = (0..5).map(|_| Err(LinkError::Association)).collect();
    let mut cycle = cycle(MemoryStore::default(), link, site(1800, &["a.bmp"]));

    let sleeps: Vec<u32> = (0..5)
        .map(|_| sleep_secs(&block_on(cycle.run(WakeReason::TimerExpired, steady()))))
        .collect();
    assert_eq!(sleeps, [60, 180, 300, 900, 900]);
    assert!(
        cycle
            .renderer
            .statuses()
            .iter()
            .all(|message| *message == MessageCode::WifiFailed)
    );
    assert_eq!(cycle.link.releases, 5);
    assert!(cycle.fetcher.transport().connects.is_empty());

    let report = block_on(cycle.run(WakeReason::TimerExpired, steady()));
    assert_eq!(sleep_secs(&report), 1800);
    assert_eq!(cycle.store.u32_value(KEY_WIFI_RETRY), Some(1));
}

#[test]
fn wifi_failure_reports_attempt_and_retry_delay() {
    let mut cycle = cycle(
        MemoryStore::default(),
        ScriptedLink::failing(LinkError::DhcpTimeout),
        ScriptedTransport::new(),
    );

    let report = block_on(cycle.run(WakeReason::TimerExpired, steady()));

    assert_eq!(report.reached, WakeState::StorageOpen);
    assert_eq!(
        report.outcome,
        WakeOutcome::Sleep(SleepPlan {
            seconds: 60,
            cause: SleepCause::Failure(FailureClass::TransientNetwork)
        })
    );
    assert_eq!(
        cycle.renderer.events,
        [
            RenderEvent::Status {
                icon: StatusIcon::Wifi,
                message: MessageCode::WifiFailed,
                context: StatusContext {
                    attempt: Some(1),
                    retry_in_secs: 60
                }
            },
            RenderEvent::LowPower
        ]
    );
    assert_eq!(cycle.store.u32_value(KEY_WIFI_RETRY), Some(2));
    assert_eq!(cycle.store.u32_value(KEY_SLEEP_DURATION), Some(60));
}

#[test]
fn unconfigured_wifi_uses_wifi_backoff() {
    let mut cycle = cycle(
        MemoryStore::default(),
        ScriptedLink::default(),
        ScriptedTransport::new(),
    )
    .with_defaults(BuildDefaults {
        wifi_ssid: "",
        ..defaults()
    });

    let report = block_on(cycle.run(WakeReason::TimerExpired, steady()));

    assert_eq!(sleep_secs(&report), 60);
    assert_eq!(cycle.renderer.statuses(), [MessageCode::WifiNotConfigured]);
}

#[test]
fn download_failures_back_off_then_reset_on_success() {
    let unavailable = Route::new(b"HTTP/1.1 503 Service Unavailable\r\n\r\n".to_vec());
    let transport = site(1800, &["a.bmp"]).route(MANIFEST_PATH, unavailable);
    let mut cycle = cycle(MemoryStore::default(), ScriptedLink::default(), transport);

    let sleeps: Vec<u32> = (0..4)
        .map(|_| sleep_secs(&block_on(cycle.run(WakeReason::TimerExpired, steady()))))
        .collect();
    assert_eq!(sleeps, [15, 30, 60, 900]);
    assert_eq!(
        cycle.renderer.statuses(),
        [MessageCode::ManifestUnavailable; 4]
    );
    assert_eq!(cycle.store.u32_value(KEY_API_RETRY), Some(5));
    assert_eq!(cycle.store.u32_value(KEY_WIFI_RETRY), Some(1));

    let healthy = site(1800, &["a.bmp"]);
    cycle.fetcher.transport_mut().routes = healthy.routes;

    let report = block_on(cycle.run(WakeReason::TimerExpired, steady()));
    assert_eq!(sleep_secs(&report), 1800);
    assert_eq!(cycle.store.u32_value(KEY_API_RETRY), Some(1));
}

#[test]
fn tampered_manifest_uses_download_backoff() {
    let mut blob = sealed(&manifest_json(1800, &["a.bmp"]));
    let last = blob.len() - 1;
    blob[last] ^= 0x01;
    let transport = site(1800, &["a.bmp"]).ok(MANIFEST_PATH, &blob[..blob.len() - 3]);
    let mut cycle = cycle(MemoryStore::default(), ScriptedLink::default(), transport);

    let report = block_on(cycle.run(WakeReason::TimerExpired, steady()));

    assert_eq!(sleep_secs(&report), 15);
    assert_eq!(report.reached, WakeState::NetworkReady);
    assert_eq!(cycle.renderer.statuses(), [MessageCode::ManifestInvalid]);
}

#[test]
fn soft_reset_erases_store_and_restarts() {
    let mut store = MemoryStore::opened();
    store.put_string(KEY_WIFI_SSID, "office").unwrap();
    store.opened = false;
    let mut cycle = cycle(store, ScriptedLink::default(), site(1800, &["a.bmp"]));

    let report = block_on(cycle.run(
        WakeReason::UserButton(ButtonPress::SoftResetHold),
        steady(),
    ));

    assert_eq!(
        report.outcome,
        WakeOutcome::Restart(RestartCause::FactoryReset)
    );
    assert_eq!(report.retention, RetentionState::first_boot());
    assert_eq!(cycle.store.erase_count, 1);
    assert!(cycle.store.values.is_empty());
    assert!(cycle.link.joined_ssids.is_empty());
    assert!(cycle.renderer.events.is_empty());
}

#[test]
fn storage_failure_restarts_without_network() {
    let mut store = MemoryStore::default();
    store.fail_open = true;
    let mut cycle = cycle(store, ScriptedLink::default(), site(1800, &["a.bmp"]));

    let report = block_on(cycle.run(WakeReason::TimerExpired, steady()));

    assert_eq!(
        report.outcome,
        WakeOutcome::Restart(RestartCause::StorageUnavailable)
    );
    assert_eq!(report.reached, WakeState::InputHandled);
    assert!(cycle.link.joined_ssids.is_empty());
    assert_eq!(cycle.link.releases, 0);
    assert!(cycle.renderer.events.is_empty());
}

#[test]
fn long_press_forgets_stored_credentials() {
    let mut store = MemoryStore::opened();
    store.put_string(KEY_WIFI_SSID, "office").unwrap();
    store.put_string(KEY_WIFI_PASSWORD, "old").unwrap();
    let mut cycle = cycle(store, ScriptedLink::default(), site(1800, &["a.bmp"]));

    let report = block_on(cycle.run(WakeReason::UserButton(ButtonPress::LongPress), steady()));

    assert_eq!(cycle.link.joined_ssids, ["home"]);
    assert!(!cycle.store.values.contains_key(KEY_WIFI_SSID));
    assert!(!cycle.store.values.contains_key(KEY_WIFI_PASSWORD));
    assert_eq!(cycle.renderer.events[0], RenderEvent::Splash { wait: true });
    assert_eq!(sleep_secs(&report), 1800);
}

#[test]
fn double_click_skips_ahead_and_clears_download_backoff() {
    let mut store = MemoryStore::opened();
    store.put_u32(KEY_API_RETRY, 3).unwrap();
    let mut cycle = cycle(store, ScriptedLink::default(), site(1800, &["a.bmp", "b.bmp", "c.bmp"]));

    let report = block_on(cycle.run(
        WakeReason::UserButton(ButtonPress::DoubleClick),
        steady(),
    ));

    assert_eq!(
        cycle.fetcher.transport().requests,
        [MANIFEST_PATH, "/img/b.bmp"]
    );
    assert_eq!(report.retention.playlist_index, 2);
    assert!(!report.retention.refresh_pending);
    assert_eq!(cycle.store.u32_value(KEY_API_RETRY), Some(1));
}

#[test]
fn double_click_past_last_index_wraps_to_first_screen() {
    let mut cycle = cycle(
        MemoryStore::default(),
        ScriptedLink::default(),
        site(1800, &["a.bmp", "b.bmp"]),
    );
    let retention = RetentionState {
        playlist_index: u8::MAX,
        refresh_pending: false,
    };

    let report = block_on(cycle.run(WakeReason::UserButton(ButtonPress::DoubleClick), retention));

    assert_eq!(
        cycle.fetcher.transport().requests,
        [MANIFEST_PATH, "/img/a.bmp"]
    );
    assert_eq!(report.retention.playlist_index, 1);
}

#[test]
fn interactive_wakes_show_splash_and_timer_wakes_do_not() {
    for (reason, splash) in [
        (WakeReason::TimerExpired, false),
        (WakeReason::PowerOnReset, true),
        (WakeReason::Undefined, true),
        (WakeReason::UserButton(ButtonPress::ShortPress), true),
    ] {
        let mut cycle = cycle(
            MemoryStore::default(),
            ScriptedLink::failing(LinkError::Association),
            ScriptedTransport::new(),
        );

        let report = block_on(cycle.run(reason, steady()));

        assert_eq!(
            cycle.renderer.events.first() == Some(&RenderEvent::Splash { wait: true }),
            splash
        );
        assert_eq!(report.retention.refresh_pending, splash);
    }
}

#[test]
fn invalid_key_sleeps_for_configuration_retry() {
    let mut store = MemoryStore::opened();
    store.put_string(KEY_AES_KEY_HEX, "not-a-key").unwrap();
    let mut cycle = cycle(store, ScriptedLink::default(), site(1800, &["a.bmp"]));

    let report = block_on(cycle.run(WakeReason::TimerExpired, steady()));

    assert_eq!(
        report.outcome,
        WakeOutcome::Sleep(SleepPlan {
            seconds: 300,
            cause: SleepCause::Failure(FailureClass::Configuration)
        })
    );
    assert_eq!(cycle.renderer.statuses(), [MessageCode::KeyInvalid]);
    assert!(cycle.fetcher.transport().requests.is_empty());
    assert_eq!(cycle.store.u32_value(KEY_API_RETRY), None);
}

#[test]
fn missing_manifest_url_is_configuration_error() {
    let mut cycle = cycle(
        MemoryStore::default(),
        ScriptedLink::default(),
        ScriptedTransport::new(),
    )
    .with_defaults(BuildDefaults {
        manifest_url: "",
        ..defaults()
    });

    let report = block_on(cycle.run(WakeReason::TimerExpired, steady()));

    assert_eq!(sleep_secs(&report), 300);
    assert_eq!(cycle.renderer.statuses(), [MessageCode::ConfigMissing]);
}

#[test]
fn empty_playlist_sleeps_for_configuration_retry() {
    let manifest = sealed(br#"{"version":1,"screens":[]}"#);
    let transport = ScriptedTransport::new().ok(MANIFEST_PATH, &manifest);
    let mut cycle = cycle(MemoryStore::default(), ScriptedLink::default(), transport);

    let report = block_on(cycle.run(WakeReason::TimerExpired, steady()));

    assert_eq!(
        report.outcome,
        WakeOutcome::Sleep(SleepPlan {
            seconds: 300,
            cause: SleepCause::Failure(FailureClass::Configuration)
        })
    );
    assert_eq!(report.reached, WakeState::NetworkReady);
    assert_eq!(cycle.renderer.statuses(), [MessageCode::PlaylistEmpty]);
}

#[test]
fn unrecognised_image_is_format_error_after_link_release() {
    let transport = site(1800, &["a.bmp"]).ok("/img/a.bmp", &sealed(b"GIF89a not a bitmap"));
    let mut cycle = cycle(MemoryStore::default(), ScriptedLink::default(), transport);

    let report = block_on(cycle.run(WakeReason::TimerExpired, steady()));

    assert_eq!(
        report.outcome,
        WakeOutcome::Sleep(SleepPlan {
            seconds: 300,
            cause: SleepCause::Failure(FailureClass::Format)
        })
    );
    assert_eq!(report.reached, WakeState::ImageReady);
    assert_eq!(report.retention.playlist_index, 0);
    assert_eq!(cycle.renderer.statuses(), [MessageCode::FormatUnsupported]);
    assert_eq!(cycle.link.releases, 1);
}

#[test]
fn failed_screen_does_not_block_the_rest_of_the_playlist() {
    let transport = site(1800, &["a.bmp", "b.bmp", "c.bmp"]).route(
        "/img/b.bmp",
        Route::new(b"HTTP/1.1 404 Not Found\r\n\r\n".to_vec()),
    );
    let mut cycle = cycle(MemoryStore::default(), ScriptedLink::default(), transport);
    let retention = RetentionState {
        playlist_index: 1,
        refresh_pending: false,
    };

    let report = block_on(cycle.run(WakeReason::TimerExpired, retention));

    assert_eq!(sleep_secs(&report), 15);
    assert_eq!(report.reached, WakeState::ScreenSelected);
    assert_eq!(report.retention.playlist_index, 2);
    assert_eq!(cycle.renderer.statuses(), [MessageCode::ImageUnavailable]);

    let mut retention = report.retention;
    for _ in 0..2 {
        let report = block_on(cycle.run(WakeReason::TimerExpired, retention));
        assert_eq!(report.reached, WakeState::Rendered);
        retention = report.retention;
    }

    assert_eq!(
        cycle.fetcher.transport().requests,
        [
            MANIFEST_PATH,
            "/img/b.bmp",
            MANIFEST_PATH,
            "/img/c.bmp",
            MANIFEST_PATH,
            "/img/a.bmp"
        ]
    );
    assert_eq!(retention.playlist_index, 1);
}

#[test]
fn render_failures_map_to_format_or_resource_retry() {
    for (render_error, seconds, class) in [
        (RenderError::Unsupported, 300, FailureClass::Format),
        (RenderError::Panel, 60, FailureClass::Resource),
    ] {
        let mut cycle = cycle(
            MemoryStore::default(),
            ScriptedLink::default(),
            site(1800, &["a.bmp"]),
        );
        cycle.renderer.image_result = Err(render_error);

        let report = block_on(cycle.run(WakeReason::TimerExpired, steady()));

        assert_eq!(
            report.outcome,
            WakeOutcome::Sleep(SleepPlan {
                seconds,
                cause: SleepCause::Failure(class)
            })
        );
        assert_eq!(report.reached, WakeState::ImageReady);
    }
}

#[test]
fn refresh_interval_is_clamped_to_configured_bounds() {
    let mut cycle = cycle(
        MemoryStore::default(),
        ScriptedLink::default(),
        site(5, &["a.bmp"]),
    );

    let report = block_on(cycle.run(WakeReason::TimerExpired, steady()));

    assert_eq!(sleep_secs(&report), 60);
}
