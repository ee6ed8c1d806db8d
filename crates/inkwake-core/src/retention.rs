//! State carried across deep sleep in retention memory.

/// Survives deep sleep, lost on power loss.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetentionState {
    /// Playlist entry to show on the next wake. May exceed the playlist length.
    pub playlist_index: u8,
    /// Set when the user asked for a refresh or after a cold boot; cleared on success.
    pub refresh_pending: bool,
}

impl Default for RetentionState {
    fn default() -> Self {
        Self::first_boot()
    }
}

impl RetentionState {
    pub const fn first_boot() -> Self {
        Self {
            playlist_index: 0,
            refresh_pending: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Selection {
    pub selected: usize,
    /// Index to retain for the next wake.
    pub next: u8,
}

/// Picks the playlist entry for this wake.
///
/// A retained index outside `[0, screen_count)` wraps to 0. Returns `None` for an empty list.
pub fn select_screen(stored_index: u8, screen_count: usize) -> Option<Selection> {
    if screen_count == 0 {
        return None;
    }

    let stored = stored_index as usize;
    let selected = if stored < screen_count { stored } else { 0 };
    let next = (selected + 1) % screen_count;

    Some(Selection {
        selected,
        next: next.min(u8::MAX as usize) as u8,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_stored_index_lands_in_range_and_advances_modulo() {
        for screen_count in 1..=16usize {
            for stored in 0..=u8::MAX {
                let selection = select_screen(stored, screen_count).unwrap();

                assert!(selection.selected < screen_count);
                assert_eq!(
                    selection.next as usize,
                    (selection.selected + 1) % screen_count
                );
            }
        }
    }

    #[test]
    fn last_entry_wraps_to_first() {
        assert_eq!(
            select_screen(2, 3),
            Some(Selection {
                selected: 2,
                next: 0
            })
        );
    }

    #[test]
    fn out_of_range_index_restarts_playlist() {
        assert_eq!(
            select_screen(7, 3),
            Some(Selection {
                selected: 0,
                next: 1
            })
        );
    }

    #[test]
    fn single_screen_stays_on_zero() {
        assert_eq!(
            select_screen(0, 1),
            Some(Selection {
                selected: 0,
                next: 0
            })
        );
    }

    #[test]
    fn empty_playlist_has_no_selection() {
        assert_eq!(select_screen(0, 0), None);
    }
}
