//! Delegated power control.
//!
//! The controller's autonomous power control is configured once per link
//! and then left alone.  Samples are only logged; the transmit power
//! reports the controller emits are recorded so the current levels stay
//! observable.

use crate::config;
use crate::error::{Error, Feature, RadioError};
use crate::radio::{AutonomousParams, ConnHandle, PowerSide, RadioLink, TxPowerReport};

use super::{PowerAction, PowerStrategy, TelemetrySample};

/// Setup status for the current link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DelegationStatus {
    Unconfigured,
    Active,
    /// The controller refused the request; power stays where it is.
    Failed(RadioError),
}

#[derive(Debug)]
pub struct DelegatedControl {
    params: AutonomousParams,
    status: DelegationStatus,
    last_local_dbm: Option<i8>,
    last_remote_dbm: Option<i8>,
}

impl Default for DelegatedControl {
    fn default() -> Self {
        Self::new(config::autonomous_params())
    }
}

impl DelegatedControl {
    pub fn new(params: AutonomousParams) -> Self {
        Self {
            params,
            status: DelegationStatus::Unconfigured,
            last_local_dbm: None,
            last_remote_dbm: None,
        }
    }

    pub fn params(&self) -> &AutonomousParams {
        &self.params
    }

    pub fn status(&self) -> DelegationStatus {
        self.status
    }

    pub fn last_local_dbm(&self) -> Option<i8> {
        self.last_local_dbm
    }

    pub fn last_remote_dbm(&self) -> Option<i8> {
        self.last_remote_dbm
    }

    fn reset(&mut self) {
        self.status = DelegationStatus::Unconfigured;
        self.last_local_dbm = None;
        self.last_remote_dbm = None;
    }
}

impl PowerStrategy for DelegatedControl {
    fn on_connect<R: RadioLink>(&mut self, radio: &mut R, _handle: ConnHandle) -> Result<(), Error> {
        if self.status == DelegationStatus::Active {
            // Configured for this link already.
            return Ok(());
        }

        let result = if self.params.is_valid() {
            radio.configure_autonomous_power_control(&self.params)
        } else {
            Err(RadioError::InvalidParam)
        };

        match result {
            Ok(()) => {
                self.status = DelegationStatus::Active;
                info!(
                    "Autonomous power control on: RSSI limits {}..{} dBm, target {}..{} dBm",
                    self.params.lower_limit_dbm,
                    self.params.upper_limit_dbm,
                    self.params.lower_target_dbm,
                    self.params.upper_target_dbm
                );
                Ok(())
            }
            Err(e) => {
                self.status = DelegationStatus::Failed(e);
                warn!("Autonomous power control request failed: {:?}", e);
                Err(Error::Configuration(Feature::AutonomousPowerControl, e))
            }
        }
    }

    fn on_sample<R: RadioLink>(
        &mut self,
        _radio: &mut R,
        _handle: ConnHandle,
        sample: &TelemetrySample,
    ) -> PowerAction {
        debug!(
            "Tx {} dBm, RSSI {} dBm (controller-managed)",
            sample.tx_power_dbm, sample.rssi_dbm
        );
        PowerAction::Delegated
    }

    fn on_tx_power_report(&mut self, report: &TxPowerReport) {
        match report.side {
            PowerSide::Local => self.last_local_dbm = Some(report.tx_power_dbm),
            PowerSide::Remote => self.last_remote_dbm = Some(report.tx_power_dbm),
        }
        info!(
            "{} Tx power now {} dBm ({} dB)",
            match report.side {
                PowerSide::Local => "Local",
                PowerSide::Remote => "Remote",
            },
            report.tx_power_dbm,
            report.delta
        );
    }

    fn on_disconnect(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::mock::{MockRadio, RadioCall};

    const H: ConnHandle = ConnHandle(3);

    fn is_configure(c: &RadioCall) -> bool {
        matches!(c, RadioCall::ConfigureAutonomous(_))
    }

    #[test]
    fn connect_configures_once_with_defaults() {
        let mut radio = MockRadio::new();
        let mut ctl = DelegatedControl::default();

        assert_eq!(ctl.on_connect(&mut radio, H), Ok(()));
        assert_eq!(ctl.on_connect(&mut radio, H), Ok(()));

        assert_eq!(radio.count(is_configure), 1);
        assert_eq!(
            radio.calls()[0],
            RadioCall::ConfigureAutonomous(config::autonomous_params())
        );
        assert_eq!(ctl.status(), DelegationStatus::Active);
    }

    #[test]
    fn samples_issue_no_commands() {
        let mut radio = MockRadio::new();
        let mut ctl = DelegatedControl::default();
        ctl.on_connect(&mut radio, H).unwrap();
        radio.clear_calls();

        for rssi in [-90i8, -50, -20] {
            let s = TelemetrySample {
                tx_power_dbm: 0,
                rssi_dbm: rssi,
                timestamp_ms: 0,
            };
            assert_eq!(ctl.on_sample(&mut radio, H, &s), PowerAction::Delegated);
        }
        assert!(radio.calls().is_empty());
    }

    #[test]
    fn controller_rejection_is_a_configuration_error() {
        let mut radio = MockRadio::new();
        radio.autonomous_error = Some(RadioError::Unsupported);
        let mut ctl = DelegatedControl::default();

        assert_eq!(
            ctl.on_connect(&mut radio, H),
            Err(Error::Configuration(
                Feature::AutonomousPowerControl,
                RadioError::Unsupported
            ))
        );
        assert_eq!(ctl.status(), DelegationStatus::Failed(RadioError::Unsupported));
        assert!(radio.tx_writes().is_empty());
    }

    #[test]
    fn invalid_params_never_reach_the_radio() {
        let mut radio = MockRadio::new();
        let mut params = config::autonomous_params();
        params.sensitivity = 16;
        let mut ctl = DelegatedControl::new(params);

        assert_eq!(
            ctl.on_connect(&mut radio, H),
            Err(Error::Configuration(
                Feature::AutonomousPowerControl,
                RadioError::InvalidParam
            ))
        );
        assert_eq!(radio.count(is_configure), 0);
    }

    #[test]
    fn reports_are_recorded_per_side() {
        let mut ctl = DelegatedControl::default();
        ctl.on_tx_power_report(&TxPowerReport {
            side: PowerSide::Local,
            tx_power_dbm: -4,
            delta: -4,
        });
        ctl.on_tx_power_report(&TxPowerReport {
            side: PowerSide::Remote,
            tx_power_dbm: 2,
            delta: 2,
        });
        assert_eq!(ctl.last_local_dbm(), Some(-4));
        assert_eq!(ctl.last_remote_dbm(), Some(2));
    }

    #[test]
    fn disconnect_rearms_configuration() {
        let mut radio = MockRadio::new();
        let mut ctl = DelegatedControl::default();
        ctl.on_connect(&mut radio, H).unwrap();
        ctl.on_disconnect();
        assert_eq!(ctl.status(), DelegationStatus::Unconfigured);
        assert_eq!(ctl.last_local_dbm(), None);

        ctl.on_connect(&mut radio, H).unwrap();
        assert_eq!(radio.count(is_configure), 2);
    }
}
