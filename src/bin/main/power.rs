use core::time::Duration as CoreDuration;

use esp_hal::{
    gpio::{RtcPin, RtcPinWithResistors},
    peripherals::{GPIO12, LPWR},
    rtc_cntl::{
        Rtc,
        sleep::{RtcioWakeupSource, TimerWakeupSource, WakeupLevel},
    },
};
use log::info;

/// Sleeps until the timer fires or the wake button (GPIO12, active low) is pressed.
pub(super) fn enter_deep_sleep(seconds: u32) -> ! {
    info!("power: deep sleep secs={}", seconds);

    let mut rtc = Rtc::new(unsafe { LPWR::steal() });
    let timer = TimerWakeupSource::new(CoreDuration::from_secs(seconds as u64));

    let mut wake_sw = unsafe { GPIO12::steal() };
    wake_sw.rtcio_pullup(true);
    let mut wake_pins: [(&mut dyn RtcPin, WakeupLevel); 1] = [(&mut wake_sw, WakeupLevel::Low)];
    let button = RtcioWakeupSource::new(&mut wake_pins);

    rtc.sleep_deep(&[&timer, &button]);
}

pub(super) fn restart() -> ! {
    info!("power: restart");
    esp_hal::system::software_reset()
}
