//! Transmit power levels supported by the nRF52840 radio.
//!
//! The SoftDevice only accepts these exact values.  Requests in between are
//! rounded *in the direction of the change* so a 1 dB step never gets lost
//! in a coarse region of the table.

use super::ConnHandle;

/// Supported levels (dBm), ascending.
pub const NRF52840_TX_LEVELS: [i8; 14] = [-40, -20, -16, -12, -8, -4, 0, 2, 3, 4, 5, 6, 7, 8];

pub fn min_level() -> i8 {
    NRF52840_TX_LEVELS[0]
}

pub fn max_level() -> i8 {
    NRF52840_TX_LEVELS[NRF52840_TX_LEVELS.len() - 1]
}

pub fn is_supported(dbm: i8) -> bool {
    NRF52840_TX_LEVELS.contains(&dbm)
}

/// Pick the supported level for a request moving from `current` to `requested`.
pub fn quantize(requested: i8, current: i8) -> i8 {
    if requested >= max_level() {
        return max_level();
    }
    if requested <= min_level() {
        return min_level();
    }
    if is_supported(requested) {
        return requested;
    }

    let above = NRF52840_TX_LEVELS
        .iter()
        .copied()
        .find(|&l| l > requested)
        .unwrap_or(max_level());
    let below = NRF52840_TX_LEVELS
        .iter()
        .rev()
        .copied()
        .find(|&l| l < requested)
        .unwrap_or(min_level());

    if requested > current {
        above
    } else if requested < current {
        below
    } else if (above as i16 - requested as i16) < (requested as i16 - below as i16) {
        above
    } else {
        below
    }
}

/// Last level written, for radios that cannot read it back.
///
/// Connection handles are reused across links, so the entry must be
/// dropped with [`LevelTracker::forget`] before the next link comes up;
/// until then a new link reads as `default_dbm`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelTracker {
    default_dbm: i8,
    last: Option<(ConnHandle, i8)>,
}

impl LevelTracker {
    pub const fn new(default_dbm: i8) -> Self {
        Self {
            default_dbm,
            last: None,
        }
    }

    pub fn current(&self, handle: ConnHandle) -> i8 {
        match self.last {
            Some((h, dbm)) if h == handle => dbm,
            _ => self.default_dbm,
        }
    }

    pub fn record(&mut self, handle: ConnHandle, dbm: i8) {
        self.last = Some((handle, dbm));
    }

    pub fn forget(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_reads_default_until_written() {
        let mut t = LevelTracker::new(0);
        assert_eq!(t.current(ConnHandle(0)), 0);
        t.record(ConnHandle(0), -20);
        assert_eq!(t.current(ConnHandle(0)), -20);
        assert_eq!(t.current(ConnHandle(1)), 0);
    }

    #[test]
    fn forgotten_level_does_not_leak_into_reused_handle() {
        let mut t = LevelTracker::new(0);
        t.record(ConnHandle(0), -20);
        t.forget();
        // Next link gets the same handle number.
        assert_eq!(t.current(ConnHandle(0)), 0);
        // Quantisation direction is decided against the fresh level.
        assert_eq!(quantize(-5, t.current(ConnHandle(0))), -8);
    }

    #[test]
    fn supported_levels_pass_through() {
        for level in NRF52840_TX_LEVELS {
            assert_eq!(quantize(level, 0), level);
        }
    }

    #[test]
    fn out_of_range_requests_clamp() {
        assert_eq!(quantize(20, 8), 8);
        assert_eq!(quantize(-46, -40), -40);
        assert_eq!(quantize(i8::MIN, 0), -40);
        assert_eq!(quantize(i8::MAX, 0), 8);
    }

    #[test]
    fn increases_round_up() {
        assert_eq!(quantize(-19, -20), -16);
        assert_eq!(quantize(-39, -40), -20);
        assert_eq!(quantize(1, 0), 2);
    }

    #[test]
    fn decreases_round_down() {
        assert_eq!(quantize(-17, -16), -20);
        assert_eq!(quantize(-21, -20), -40);
        assert_eq!(quantize(-5, -4), -8);
    }

    #[test]
    fn unchanged_request_picks_nearest() {
        assert_eq!(quantize(-18, -18), -20);
        assert_eq!(quantize(-37, -37), -40);
        assert_eq!(quantize(1, 1), 0);
    }

    #[test]
    fn result_is_always_supported() {
        for current in [-40i8, -12, 0, 8] {
            for requested in i8::MIN..=i8::MAX {
                assert!(is_supported(quantize(requested, current)));
            }
        }
    }
}
