use esp_hal::{
    analog::adc::{Adc, AdcCalCurve, AdcConfig, Attenuation},
    peripherals::{ADC1, GPIO1},
};
use log::{info, warn};

/// The sense pin sits behind a 1:2 divider.
const SENSE_DIVIDER: u32 = 2;

/// One calibrated reading of the cell voltage, logged at boot.
pub(super) fn log_voltage(adc1: ADC1<'_>, sense: GPIO1<'_>) {
    let mut config = AdcConfig::new();
    let mut pin =
        config.enable_pin_with_cal::<_, AdcCalCurve<ADC1<'_>>>(sense, Attenuation::_11dB);
    let mut adc = Adc::new(adc1, config);

    match nb::block!(adc.read_oneshot(&mut pin)) {
        Ok(mv) => info!("battery: mv={}", u32::from(mv) * SENSE_DIVIDER),
        Err(err) => warn!("battery: read failed err={:?}", err),
    }
}
