//! Fixed transmit power with telemetry logging.
//!
//! Used by the peripheral: it pins its own power once per link and leaves
//! adjustment to the central's delta requests.

use crate::config;
use crate::error::{Error, Feature};
use crate::radio::{ConnHandle, RadioLink, TxPowerReport};

use super::{PowerAction, PowerStrategy, TelemetrySample};

#[derive(Debug)]
pub struct MonitorOnly {
    initial_dbm: i8,
    last_sample: Option<TelemetrySample>,
}

impl Default for MonitorOnly {
    fn default() -> Self {
        Self::new(config::TX_POWER_INITIAL_DBM)
    }
}

impl MonitorOnly {
    pub fn new(initial_dbm: i8) -> Self {
        Self {
            initial_dbm,
            last_sample: None,
        }
    }

    pub fn last_sample(&self) -> Option<&TelemetrySample> {
        self.last_sample.as_ref()
    }
}

impl PowerStrategy for MonitorOnly {
    fn on_connect<R: RadioLink>(&mut self, radio: &mut R, handle: ConnHandle) -> Result<(), Error> {
        self.last_sample = None;
        match radio.write_transmit_power(handle, self.initial_dbm) {
            Ok(selected) => {
                info!("Tx power pinned at {} dBm", selected);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to set Tx power: {:?}", e);
                Err(Error::Configuration(Feature::InitialTxPower, e))
            }
        }
    }

    fn on_sample<R: RadioLink>(
        &mut self,
        _radio: &mut R,
        _handle: ConnHandle,
        sample: &TelemetrySample,
    ) -> PowerAction {
        info!(
            "RSSI {} dBm, Tx {} dBm (path loss {} dB)",
            sample.rssi_dbm,
            sample.tx_power_dbm,
            sample.path_loss_db()
        );
        self.last_sample = Some(*sample);
        PowerAction::Hold
    }

    fn on_tx_power_report(&mut self, report: &TxPowerReport) {
        debug!("Tx power report: {:?}", report);
    }

    fn on_disconnect(&mut self) {
        self.last_sample = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RadioError;
    use crate::radio::mock::MockRadio;

    const H: ConnHandle = ConnHandle(7);

    #[test]
    fn connect_pins_initial_power() {
        let mut radio = MockRadio::new();
        radio.tx_power_dbm = 4;
        let mut ctl = MonitorOnly::default();
        ctl.on_connect(&mut radio, H).unwrap();
        assert_eq!(radio.tx_writes().as_slice(), &[0]);
    }

    #[test]
    fn samples_are_kept_but_never_acted_on() {
        let mut radio = MockRadio::new();
        let mut ctl = MonitorOnly::default();
        let s = TelemetrySample {
            tx_power_dbm: 0,
            rssi_dbm: -95,
            timestamp_ms: 2_000,
        };
        assert_eq!(ctl.on_sample(&mut radio, H, &s), PowerAction::Hold);
        assert!(radio.calls().is_empty());
        assert_eq!(ctl.last_sample(), Some(&s));

        ctl.on_disconnect();
        assert_eq!(ctl.last_sample(), None);
    }

    #[test]
    fn write_failure_is_reported() {
        let mut radio = MockRadio::new();
        radio.tx_write_error = Some(RadioError::Timeout);
        let mut ctl = MonitorOnly::default();
        assert_eq!(
            ctl.on_connect(&mut radio, H),
            Err(Error::Configuration(Feature::InitialTxPower, RadioError::Timeout))
        );
    }
}
