//! Wake-cycle state kept in RTC fast memory across deep sleep.

use inkwake_core::retention::RetentionState;

const RETENTION_MAGIC: u32 = 0x494B_5754; // "IKWT"

#[repr(C)]
struct RetainedCell {
    magic: u32,
    playlist_index: u8,
    refresh_pending: u8,
    /// Bitwise complement of `playlist_index`, catches partial decay.
    index_check: u8,
    _reserved: u8,
}

impl RetainedCell {
    const fn new() -> Self {
        Self {
            magic: 0,
            playlist_index: 0,
            refresh_pending: 0,
            index_check: 0,
            _reserved: 0,
        }
    }

    fn is_valid(&self) -> bool {
        self.magic == RETENTION_MAGIC
            && self.index_check == !self.playlist_index
            && self.refresh_pending <= 1
    }
}

#[esp_hal::ram(unstable(rtc_fast))]
static mut RETAINED: RetainedCell = RetainedCell::new();

/// Reads the retained state. `None` when the cell was never written or did not survive.
pub fn load() -> Option<RetentionState> {
    // Single-threaded access during bring-up and shutdown only.
    let cell = unsafe { &*(&raw const RETAINED) };
    if !cell.is_valid() {
        return None;
    }

    Some(RetentionState {
        playlist_index: cell.playlist_index,
        refresh_pending: cell.refresh_pending != 0,
    })
}

/// Writes the state to be picked up by the next wake.
pub fn store(state: RetentionState) {
    let cell = unsafe { &mut *(&raw mut RETAINED) };
    cell.playlist_index = state.playlist_index;
    cell.index_check = !state.playlist_index;
    cell.refresh_pending = state.refresh_pending as u8;
    cell.magic = RETENTION_MAGIC;
}

/// Invalidates the cell so the next boot starts from [`RetentionState::first_boot`].
pub fn clear() {
    let cell = unsafe { &mut *(&raw mut RETAINED) };
    cell.magic = 0;
}
