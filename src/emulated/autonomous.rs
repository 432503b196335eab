//! Autonomous power control computed on the host side of the radio.
//!
//! RSSI is smoothed with a first-order filter whose weight is the
//! sensitivity coefficient (0 = no smoothing, 15 = heaviest).  While the
//! filtered value sits between the lower and upper limits nothing happens.
//! Outside them, at most once per wait period, local power moves by the
//! distance to the middle of the target band, assuming a reciprocal channel.

use crate::radio::{tx_levels, AutonomousParams};

/// Filter arithmetic is done in 1/16 dB.
const FIXED_ONE: i32 = 16;

#[derive(Debug)]
pub struct AutonomousPowerControl {
    params: AutonomousParams,
    filtered: Option<i32>,
    last_adjust_ms: Option<u64>,
}

impl AutonomousPowerControl {
    pub fn new(params: AutonomousParams) -> Self {
        Self {
            params,
            filtered: None,
            last_adjust_ms: None,
        }
    }

    pub fn params(&self) -> &AutonomousParams {
        &self.params
    }

    /// Filtered RSSI (dBm), once a sample has been seen.
    pub fn filtered_rssi_dbm(&self) -> Option<i16> {
        self.filtered.map(|f| (f / FIXED_ONE) as i16)
    }

    /// Feed one RSSI reading.  Returns the new local level when an
    /// adjustment is due; the caller applies it.
    pub fn on_rssi(&mut self, now_ms: u64, rssi_dbm: i8, current_dbm: i8) -> Option<i8> {
        let weight = self.params.sensitivity.min(15) as i32;
        let sample = rssi_dbm as i32 * FIXED_ONE;
        let filtered = match self.filtered {
            Some(prev) => (prev * weight + sample * (FIXED_ONE - weight)) / FIXED_ONE,
            None => sample,
        };
        self.filtered = Some(filtered);

        if !self.params.auto_enable {
            return None;
        }
        let rssi = (filtered / FIXED_ONE) as i16;
        if rssi >= self.params.lower_limit_dbm as i16 && rssi <= self.params.upper_limit_dbm as i16 {
            return None;
        }
        if let Some(last) = self.last_adjust_ms {
            if now_ms.saturating_sub(last) < self.params.wait_period_ms as u64 {
                return None;
            }
        }

        let target =
            (self.params.lower_target_dbm as i16 + self.params.upper_target_dbm as i16) / 2;
        let requested = (current_dbm as i16 + (target - rssi))
            .clamp(tx_levels::min_level() as i16, tx_levels::max_level() as i16)
            as i8;
        let level = tx_levels::quantize(requested, current_dbm);
        if level == current_dbm {
            return None;
        }
        self.last_adjust_ms = Some(now_ms);
        Some(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    fn apc() -> AutonomousPowerControl {
        AutonomousPowerControl::new(config::autonomous_params())
    }

    #[test]
    fn inside_limits_nothing_happens() {
        let mut c = apc();
        for rssi in [-60i8, -50, -40] {
            assert_eq!(c.on_rssi(0, rssi, 0), None);
        }
    }

    #[test]
    fn weak_link_raises_power() {
        let mut c = apc();
        // Target middle is -50; 12 dB short from 0 dBm asks for +12, capped at 8.
        assert_eq!(c.on_rssi(0, -62, 0), Some(8));
    }

    #[test]
    fn strong_link_lowers_power_to_supported_level() {
        let mut c = apc();
        // -30 is 20 dB too strong: 0 - 20 = -20.
        assert_eq!(c.on_rssi(0, -30, 0), Some(-20));
        let mut c = apc();
        // -35 asks for -15, rounded down to -16.
        assert_eq!(c.on_rssi(0, -35, 0), Some(-16));
    }

    #[test]
    fn wait_period_spaces_adjustments() {
        let mut c = apc();
        assert_eq!(c.on_rssi(0, -30, 0), Some(-20));
        assert_eq!(c.on_rssi(500, -30, -20), None);
        assert_eq!(c.on_rssi(1_000, -30, -20), Some(-40));
    }

    #[test]
    fn disabled_control_only_filters() {
        let mut params = config::autonomous_params();
        params.auto_enable = false;
        let mut c = AutonomousPowerControl::new(params);
        assert_eq!(c.on_rssi(0, -90, 0), None);
        assert_eq!(c.filtered_rssi_dbm(), Some(-90));
    }

    #[test]
    fn sensitivity_smooths_readings() {
        let mut params = config::autonomous_params();
        params.sensitivity = 8;
        let mut c = AutonomousPowerControl::new(params);
        c.on_rssi(0, -50, 0);
        c.on_rssi(0, -70, 0);
        // Half way with weight 8/16.
        assert_eq!(c.filtered_rssi_dbm(), Some(-60));
    }

    #[test]
    fn at_the_rail_no_adjustment_is_reported() {
        let mut c = apc();
        assert_eq!(c.on_rssi(0, -90, 8), None);
    }
}
