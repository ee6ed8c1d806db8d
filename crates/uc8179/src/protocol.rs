//! Command set and power sequences for the UC8179 controller on the 7.5" 800x480 panel.

/// Panel width in pixels.
pub const WIDTH: usize = 800;
/// Panel height in pixels.
pub const HEIGHT: usize = 480;
/// Number of bytes in one display row.
pub const LINE_BYTES: usize = WIDTH / 8;
/// Total framebuffer size in bytes.
pub const BUFFER_SIZE: usize = LINE_BYTES * HEIGHT;

pub const PANEL_SETTING: u8 = 0x00;
pub const POWER_SETTING: u8 = 0x01;
pub const POWER_OFF: u8 = 0x02;
pub const POWER_ON: u8 = 0x04;
pub const BOOSTER_SOFT_START: u8 = 0x06;
pub const DEEP_SLEEP: u8 = 0x07;
pub const DATA_START_TRANSMISSION_2: u8 = 0x13;
pub const DISPLAY_REFRESH: u8 = 0x12;
pub const DUAL_SPI: u8 = 0x15;
pub const VCOM_DATA_INTERVAL: u8 = 0x50;
pub const TCON_SETTING: u8 = 0x60;
pub const RESOLUTION_SETTING: u8 = 0x61;
pub const GET_STATUS: u8 = 0x71;

/// Check code the controller requires after [`DEEP_SLEEP`].
pub const DEEP_SLEEP_CHECK: u8 = 0xA5;

/// One command with its parameter bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Step {
    pub command: u8,
    pub data: &'static [u8],
    /// Poll BUSY until the controller is idle after sending.
    pub wait_idle: bool,
}

impl Step {
    const fn new(command: u8, data: &'static [u8]) -> Self {
        Self {
            command,
            data,
            wait_idle: false,
        }
    }

    const fn then_wait(mut self) -> Self {
        self.wait_idle = true;
        self
    }
}

const RESOLUTION: [u8; 4] = resolution_bytes(WIDTH as u16, HEIGHT as u16);

/// Power-up sequence run after a hardware reset. Black/white mode, LUT from OTP.
pub const INIT_SEQUENCE: [Step; 8] = [
    Step::new(POWER_SETTING, &[0x07, 0x07, 0x3F, 0x3F]),
    Step::new(BOOSTER_SOFT_START, &[0x17, 0x17, 0x28, 0x17]),
    Step::new(POWER_ON, &[]).then_wait(),
    Step::new(PANEL_SETTING, &[0x1F]),
    Step::new(RESOLUTION_SETTING, &RESOLUTION),
    Step::new(DUAL_SPI, &[0x00]),
    Step::new(VCOM_DATA_INTERVAL, &[0x10, 0x07]),
    Step::new(TCON_SETTING, &[0x22]),
];

/// Border floating, charge pump off, then deep sleep. Only a hardware reset wakes the panel.
pub const SLEEP_SEQUENCE: [Step; 3] = [
    Step::new(VCOM_DATA_INTERVAL, &[0xF7]),
    Step::new(POWER_OFF, &[]).then_wait(),
    Step::new(DEEP_SLEEP, &[DEEP_SLEEP_CHECK]),
];

/// Encodes `RESOLUTION_SETTING` parameters: HRES and VRES, big endian.
pub const fn resolution_bytes(width: u16, height: u16) -> [u8; 4] {
    let [w_hi, w_lo] = width.to_be_bytes();
    let [h_hi, h_lo] = height.to_be_bytes();
    [w_hi, w_lo, h_hi, h_lo]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_matches_panel() {
        assert_eq!(LINE_BYTES, 100);
        assert_eq!(BUFFER_SIZE, 48_000);
    }

    #[test]
    fn resolution_is_big_endian_width_then_height() {
        assert_eq!(resolution_bytes(800, 480), [0x03, 0x20, 0x01, 0xE0]);
    }

    #[test]
    fn init_powers_on_before_panel_setup() {
        let commands: Vec<u8> = INIT_SEQUENCE.iter().map(|step| step.command).collect();
        assert_eq!(
            commands,
            [0x01, 0x06, 0x04, 0x00, 0x61, 0x15, 0x50, 0x60]
        );

        let waits: Vec<u8> = INIT_SEQUENCE
            .iter()
            .filter(|step| step.wait_idle)
            .map(|step| step.command)
            .collect();
        assert_eq!(waits, [POWER_ON]);
    }

    #[test]
    fn sleep_ends_with_check_code() {
        let last = SLEEP_SEQUENCE[SLEEP_SEQUENCE.len() - 1];
        assert_eq!(last.command, DEEP_SLEEP);
        assert_eq!(last.data, &[0xA5]);
        assert!(SLEEP_SEQUENCE[1].wait_idle);
    }
}
