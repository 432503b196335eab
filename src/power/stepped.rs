//! Stepped software power control.
//!
//! Each sample yields a link margin, `target - rssi`.  A positive margin
//! means the link is weaker than wanted.  The margin selects one of four
//! bands; the band picks a fine or coarse step that is applied to local
//! power (clamped to the hardware range) and requested from the peer as a
//! signed delta.  Inside `±MARGIN_FINE_DB` nothing changes.
//!
//! ```text
//!  margin:  <= -20  | (-20,-10) | [-10,10] | (10,20) | >= 20
//!  step:       -5   |    -1     |    0     |   +1    |  +5
//! ```

use crate::config;
use crate::error::{Error, Feature};
use crate::radio::{tx_levels, ConnHandle, PowerSide, RadioLink, TxPowerReport};

use super::{PowerAction, PowerStrategy, TelemetrySample};

/// Hard transmit power clamp (dBm).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PowerLimits {
    pub min_dbm: i8,
    pub max_dbm: i8,
}

impl Default for PowerLimits {
    /// Configured limits, narrowed to the levels the radio can actually select.
    fn default() -> Self {
        Self {
            min_dbm: config::TX_POWER_MIN_DBM.max(tx_levels::min_level()),
            max_dbm: config::TX_POWER_MAX_DBM.min(tx_levels::max_level()),
        }
    }
}

impl PowerLimits {
    pub fn clamp(&self, dbm: i16) -> i8 {
        dbm.clamp(self.min_dbm as i16, self.max_dbm as i16) as i8
    }
}

/// Per-link controller state.  Reset on every connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PowerControlState {
    pub local_power_dbm: i8,
    /// Last level the peer reported for itself; observability only.
    pub remote_power_known_dbm: Option<i8>,
}

impl PowerControlState {
    const fn initial() -> Self {
        Self {
            local_power_dbm: config::TX_POWER_INITIAL_DBM,
            remote_power_known_dbm: None,
        }
    }
}

/// `target - rssi`; positive when the link is weaker than the target.
pub fn link_margin(target_dbm: i8, rssi_dbm: i8) -> i16 {
    target_dbm as i16 - rssi_dbm as i16
}

/// Signed step (dB) for `margin` given the current local power.
///
/// Bands are mutually exclusive; the coarse band is tested first so a margin
/// sitting exactly on the coarse border takes the larger step.
pub fn step_for_margin(margin: i16, local_dbm: i8, limits: &PowerLimits) -> i8 {
    let can_raise = local_dbm < limits.max_dbm;
    let can_lower = local_dbm > limits.min_dbm;

    if margin >= config::MARGIN_COARSE_DB && can_raise {
        config::STEP_COARSE_DB
    } else if margin > config::MARGIN_FINE_DB && margin < config::MARGIN_COARSE_DB && can_raise {
        config::STEP_FINE_DB
    } else if margin <= -config::MARGIN_COARSE_DB && can_lower {
        -config::STEP_COARSE_DB
    } else if margin < -config::MARGIN_FINE_DB && margin > -config::MARGIN_COARSE_DB && can_lower {
        -config::STEP_FINE_DB
    } else {
        0
    }
}

#[derive(Debug)]
pub struct SteppedControl {
    target_rssi_dbm: i8,
    limits: PowerLimits,
    state: PowerControlState,
}

impl Default for SteppedControl {
    fn default() -> Self {
        Self::new(config::TARGET_RSSI_DBM, PowerLimits::default())
    }
}

impl SteppedControl {
    pub fn new(target_rssi_dbm: i8, limits: PowerLimits) -> Self {
        Self {
            target_rssi_dbm,
            limits,
            state: PowerControlState::initial(),
        }
    }

    pub fn state(&self) -> &PowerControlState {
        &self.state
    }

    pub fn target_rssi_dbm(&self) -> i8 {
        self.target_rssi_dbm
    }

    pub fn limits(&self) -> &PowerLimits {
        &self.limits
    }
}

impl PowerStrategy for SteppedControl {
    fn on_connect<R: RadioLink>(&mut self, radio: &mut R, handle: ConnHandle) -> Result<(), Error> {
        self.state = PowerControlState::initial();
        let initial = self.limits.clamp(config::TX_POWER_INITIAL_DBM as i16);
        match radio.write_transmit_power(handle, initial) {
            Ok(selected) => {
                self.state.local_power_dbm = selected;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to set initial Tx power: {:?}", e);
                Err(Error::Configuration(Feature::InitialTxPower, e))
            }
        }
    }

    fn on_sample<R: RadioLink>(
        &mut self,
        radio: &mut R,
        handle: ConnHandle,
        sample: &TelemetrySample,
    ) -> PowerAction {
        // The controller may have quantised the last write; trust what it reports.
        self.state.local_power_dbm = sample.tx_power_dbm;

        let margin = link_margin(self.target_rssi_dbm, sample.rssi_dbm);
        let step = step_for_margin(margin, self.state.local_power_dbm, &self.limits);
        if step == 0 {
            trace!("Link margin {} dB - holding Tx {} dBm", margin, sample.tx_power_dbm);
            return PowerAction::Hold;
        }

        let requested = self
            .limits
            .clamp(self.state.local_power_dbm as i16 + step as i16);
        match radio.write_transmit_power(handle, requested) {
            Ok(selected) => self.state.local_power_dbm = selected,
            Err(e) => warn!("Set Tx power err: {:?}", e),
        }

        // Always ask the peer for the full step, even when local power clamped.
        if let Err(e) = radio.request_remote_power_delta(handle, step) {
            debug!("Remote Tx power request ({} dB) not sent: {:?}", step, e);
        }

        debug!(
            "Link margin {} dB: Tx {} -> {} dBm, peer asked for {} dB",
            margin, sample.tx_power_dbm, self.state.local_power_dbm, step
        );
        PowerAction::Adjust {
            step_db: step,
            local_dbm: self.state.local_power_dbm,
        }
    }

    fn on_tx_power_report(&mut self, report: &TxPowerReport) {
        if report.side == PowerSide::Remote {
            self.state.remote_power_known_dbm = Some(report.tx_power_dbm);
        }
    }

    fn on_disconnect(&mut self) {
        self.state = PowerControlState::initial();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RadioError;
    use crate::radio::mock::{MockRadio, RadioCall};

    const H: ConnHandle = ConnHandle(1);

    fn sample(tx: i8, rssi: i8) -> TelemetrySample {
        TelemetrySample {
            tx_power_dbm: tx,
            rssi_dbm: rssi,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn decision_table_matches_bands() {
        let limits = PowerLimits::default();
        let cases: [(i16, i8); 13] = [
            (40, 5),
            (20, 5),
            (19, 1),
            (11, 1),
            (10, 0),
            (5, 0),
            (0, 0),
            (-5, 0),
            (-10, 0),
            (-11, -1),
            (-19, -1),
            (-20, -5),
            (-40, -5),
        ];
        for (margin, expected) in cases {
            assert_eq!(step_for_margin(margin, 0, &limits), expected, "margin {}", margin);
        }
    }

    #[test]
    fn every_margin_maps_to_exactly_one_band() {
        let limits = PowerLimits::default();
        for margin in -300i16..=300 {
            let step = step_for_margin(margin, 0, &limits);
            let bands = [
                margin >= 20,
                margin > 10 && margin < 20,
                margin <= -20,
                margin < -10 && margin > -20,
            ];
            let hits = bands.iter().filter(|b| **b).count();
            assert!(hits <= 1);
            assert_eq!(step != 0, hits == 1, "margin {}", margin);
        }
    }

    #[test]
    fn no_raise_at_max_and_no_lower_at_min() {
        let limits = PowerLimits::default();
        assert_eq!(step_for_margin(30, limits.max_dbm, &limits), 0);
        assert_eq!(step_for_margin(15, limits.max_dbm, &limits), 0);
        assert_eq!(step_for_margin(-30, limits.min_dbm, &limits), 0);
        assert_eq!(step_for_margin(-15, limits.min_dbm, &limits), 0);
        // The opposite direction is still allowed.
        assert_eq!(step_for_margin(-30, limits.max_dbm, &limits), -5);
        assert_eq!(step_for_margin(30, limits.min_dbm, &limits), 5);
    }

    #[test]
    fn writes_never_leave_the_clamp() {
        let limits = PowerLimits::default();
        for tx in i8::MIN..=i8::MAX {
            for rssi in [-127i8, -90, -65, -35, -10, 20] {
                let mut radio = MockRadio::new();
                let mut ctl = SteppedControl::new(-50, limits);
                ctl.on_sample(&mut radio, H, &sample(tx, rssi));
                for dbm in radio.tx_writes() {
                    assert!(dbm >= limits.min_dbm && dbm <= limits.max_dbm, "tx {} rssi {}", tx, rssi);
                }
            }
        }
    }

    #[test]
    fn clamped_local_step_still_requests_full_remote_step() {
        let mut radio = MockRadio::new();
        let mut ctl = SteppedControl::default();
        // 6 dBm + 5 would exceed +8.
        let action = ctl.on_sample(&mut radio, H, &sample(6, -80));
        assert_eq!(
            action,
            PowerAction::Adjust {
                step_db: 5,
                local_dbm: 8
            }
        );
        assert_eq!(radio.tx_writes().as_slice(), &[8]);
        assert_eq!(radio.remote_deltas().as_slice(), &[5]);
    }

    #[test]
    fn weak_link_raises_power_coarsely() {
        let mut radio = MockRadio::new();
        let mut ctl = SteppedControl::default();
        let action = ctl.on_sample(&mut radio, H, &sample(0, -70));
        assert_eq!(
            action,
            PowerAction::Adjust {
                step_db: 5,
                local_dbm: 5
            }
        );
        assert_eq!(ctl.state().local_power_dbm, 5);
        assert_eq!(radio.remote_deltas().as_slice(), &[5]);
    }

    #[test]
    fn strong_link_lowers_power_finely() {
        let mut radio = MockRadio::new();
        let mut ctl = SteppedControl::default();
        let action = ctl.on_sample(&mut radio, H, &sample(0, -35));
        assert_eq!(
            action,
            PowerAction::Adjust {
                step_db: -1,
                local_dbm: -1
            }
        );
        assert_eq!(radio.remote_deltas().as_slice(), &[-1]);
    }

    #[test]
    fn dead_band_issues_no_commands() {
        let mut radio = MockRadio::new();
        let mut ctl = SteppedControl::default();
        assert_eq!(ctl.on_sample(&mut radio, H, &sample(0, -45)), PowerAction::Hold);
        assert!(radio.calls().is_empty());
    }

    #[test]
    fn failed_local_write_keeps_state_and_still_asks_peer() {
        let mut radio = MockRadio::new();
        radio.tx_write_error = Some(RadioError::Timeout);
        let mut ctl = SteppedControl::default();
        ctl.on_sample(&mut radio, H, &sample(0, -75));
        assert_eq!(ctl.state().local_power_dbm, 0);
        assert_eq!(radio.remote_deltas().as_slice(), &[5]);
    }

    #[test]
    fn remote_request_failure_is_not_fatal() {
        let mut radio = MockRadio::new();
        radio.remote_delta_error = Some(RadioError::Unsupported);
        let mut ctl = SteppedControl::default();
        let action = ctl.on_sample(&mut radio, H, &sample(0, -75));
        assert!(matches!(action, PowerAction::Adjust { step_db: 5, .. }));
        assert_eq!(ctl.state().local_power_dbm, 5);
    }

    #[test]
    fn quantised_write_updates_local_value() {
        let mut radio = MockRadio::new();
        radio.quantize_writes = true;
        radio.tx_power_dbm = -20;
        let mut ctl = SteppedControl::default();
        // Margin 12 dB asks for -19 dBm; the radio only offers -16.
        ctl.on_sample(&mut radio, H, &sample(-20, -62));
        assert_eq!(radio.tx_writes().as_slice(), &[-19]);
        assert_eq!(ctl.state().local_power_dbm, -16);
    }

    #[test]
    fn default_limits_match_the_level_table() {
        let limits = PowerLimits::default();
        assert_eq!(limits.min_dbm, tx_levels::min_level());
        assert_eq!(limits.max_dbm, config::TX_POWER_MAX_DBM);
        assert!(tx_levels::is_supported(limits.min_dbm));
        assert!(tx_levels::is_supported(limits.max_dbm));
    }

    #[test]
    fn hardware_floor_holds_without_asking_peer() {
        let mut radio = MockRadio::new();
        radio.quantize_writes = true;
        radio.tx_power_dbm = tx_levels::min_level();
        let mut ctl = SteppedControl::default();
        for _ in 0..3 {
            let action = ctl.on_sample(&mut radio, H, &sample(tx_levels::min_level(), -20));
            assert_eq!(action, PowerAction::Hold);
        }
        assert!(radio.tx_writes().is_empty());
        assert!(radio.remote_deltas().is_empty());
    }

    #[test]
    fn hardware_ceiling_holds_without_asking_peer() {
        let mut radio = MockRadio::new();
        radio.quantize_writes = true;
        radio.tx_power_dbm = tx_levels::max_level();
        let mut ctl = SteppedControl::default();
        for _ in 0..3 {
            let action = ctl.on_sample(&mut radio, H, &sample(tx_levels::max_level(), -95));
            assert_eq!(action, PowerAction::Hold);
        }
        assert!(radio.tx_writes().is_empty());
        assert!(radio.remote_deltas().is_empty());
    }

    #[test]
    fn adjust_reports_the_selected_level() {
        let mut radio = MockRadio::new();
        radio.quantize_writes = true;
        radio.tx_power_dbm = -20;
        let mut ctl = SteppedControl::default();
        // -20 - 5 = -25 lies below the table's -20 step; the radio picks -40.
        let action = ctl.on_sample(&mut radio, H, &sample(-20, -20));
        assert_eq!(
            action,
            PowerAction::Adjust {
                step_db: -5,
                local_dbm: -40
            }
        );
        assert_eq!(radio.tx_writes().as_slice(), &[-25]);

        // Now at the floor: no further writes or peer requests.
        radio.clear_calls();
        assert_eq!(
            ctl.on_sample(&mut radio, H, &sample(-40, -20)),
            PowerAction::Hold
        );
        assert!(radio.calls().is_empty());
    }

    #[test]
    fn failed_write_reports_unchanged_level() {
        let mut radio = MockRadio::new();
        radio.tx_write_error = Some(RadioError::Timeout);
        let mut ctl = SteppedControl::default();
        assert_eq!(
            ctl.on_sample(&mut radio, H, &sample(0, -75)),
            PowerAction::Adjust {
                step_db: 5,
                local_dbm: 0
            }
        );
    }

    #[test]
    fn connect_resets_to_initial_power() {
        let mut radio = MockRadio::new();
        let mut ctl = SteppedControl::default();
        ctl.on_sample(&mut radio, H, &sample(0, -75));
        radio.clear_calls();

        ctl.on_connect(&mut radio, H).unwrap();
        assert_eq!(ctl.state().local_power_dbm, 0);
        assert_eq!(radio.calls(), &[RadioCall::WriteTransmitPower(0)]);
    }

    #[test]
    fn initial_power_failure_is_a_configuration_error() {
        let mut radio = MockRadio::new();
        radio.tx_write_error = Some(RadioError::CommandBuffer);
        let mut ctl = SteppedControl::default();
        assert_eq!(
            ctl.on_connect(&mut radio, H),
            Err(Error::Configuration(
                Feature::InitialTxPower,
                RadioError::CommandBuffer
            ))
        );
    }

    #[test]
    fn remote_reports_are_recorded_but_not_acted_on() {
        let mut ctl = SteppedControl::default();
        ctl.on_tx_power_report(&TxPowerReport {
            side: PowerSide::Remote,
            tx_power_dbm: 3,
            delta: 1,
        });
        assert_eq!(ctl.state().remote_power_known_dbm, Some(3));
        ctl.on_disconnect();
        assert_eq!(ctl.state().remote_power_known_dbm, None);
    }
}
