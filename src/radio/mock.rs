//! Recording radio double for host tests.
//!
//! Records every command in call order and answers from scriptable state.
//! Transmit power reads reflect the last successful write, like a real
//! controller.

use heapless::Vec;

use super::{
    tx_levels, AutonomousParams, ConnHandle, ConnRef, ConnectParams, PathLossParams, PeerAddress, RadioLink,
    ServiceUuid,
};
use crate::error::RadioError;

/// Calls retained; older entries are dropped first.
pub const MOCK_CALL_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RadioCall {
    StartDiscovery,
    StopDiscovery,
    StartAdvertising,
    Connect(PeerAddress),
    Disconnect(ConnRef),
    ReadSignalStrength,
    ReadTransmitPower,
    WriteTransmitPower(i8),
    RemotePowerDelta(i8),
    ConfigurePathLoss(PathLossParams),
    EnablePathLoss(bool),
    EnableTxPowerReports { local: bool, remote: bool },
    ConfigureAutonomous(AutonomousParams),
}

#[derive(Debug)]
pub struct MockRadio {
    calls: Vec<RadioCall, MOCK_CALL_CAPACITY>,
    /// Next RSSI reading (or error).
    pub rssi: Result<i8, RadioError>,
    /// Current local transmit power.
    pub tx_power_dbm: i8,
    /// When false, every handle resolution fails.
    pub handle_resolvable: bool,
    /// Round writes to the nRF52840 level table like the SoftDevice backend.
    pub quantize_writes: bool,
    pub tx_read_error: Option<RadioError>,
    pub tx_write_error: Option<RadioError>,
    pub remote_delta_error: Option<RadioError>,
    pub discovery_error: Option<RadioError>,
    pub advertising_error: Option<RadioError>,
    pub connect_error: Option<RadioError>,
    pub disconnect_error: Option<RadioError>,
    pub path_loss_error: Option<RadioError>,
    pub tx_reports_error: Option<RadioError>,
    pub autonomous_error: Option<RadioError>,
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRadio {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            rssi: Ok(-50),
            tx_power_dbm: 0,
            handle_resolvable: true,
            quantize_writes: false,
            tx_read_error: None,
            tx_write_error: None,
            remote_delta_error: None,
            discovery_error: None,
            advertising_error: None,
            connect_error: None,
            disconnect_error: None,
            path_loss_error: None,
            tx_reports_error: None,
            autonomous_error: None,
        }
    }

    pub fn calls(&self) -> &[RadioCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&RadioCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    /// Transmit power writes in call order.
    pub fn tx_writes(&self) -> Vec<i8, MOCK_CALL_CAPACITY> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                RadioCall::WriteTransmitPower(dbm) => Some(*dbm),
                _ => None,
            })
            .collect()
    }

    /// Remote power deltas in call order.
    pub fn remote_deltas(&self) -> Vec<i8, MOCK_CALL_CAPACITY> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                RadioCall::RemotePowerDelta(delta) => Some(*delta),
                _ => None,
            })
            .collect()
    }

    fn record(&mut self, call: RadioCall) {
        if self.calls.is_full() {
            self.calls.remove(0);
        }
        let _ = self.calls.push(call);
    }

    fn outcome(error: Option<RadioError>) -> Result<(), RadioError> {
        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl RadioLink for MockRadio {
    fn start_discovery(&mut self, _filter: &ServiceUuid) -> Result<(), RadioError> {
        self.record(RadioCall::StartDiscovery);
        Self::outcome(self.discovery_error)
    }

    fn stop_discovery(&mut self) {
        self.record(RadioCall::StopDiscovery);
    }

    fn start_advertising(&mut self, _service: &ServiceUuid) -> Result<(), RadioError> {
        self.record(RadioCall::StartAdvertising);
        Self::outcome(self.advertising_error)
    }

    fn connect(&mut self, peer: &PeerAddress, _params: &ConnectParams) -> Result<(), RadioError> {
        self.record(RadioCall::Connect(*peer));
        Self::outcome(self.connect_error)
    }

    fn disconnect(&mut self, conn: ConnRef) -> Result<(), RadioError> {
        self.record(RadioCall::Disconnect(conn));
        Self::outcome(self.disconnect_error)
    }

    fn resolve_handle(&self, conn: ConnRef) -> Result<ConnHandle, RadioError> {
        if self.handle_resolvable {
            Ok(ConnHandle(conn.0))
        } else {
            Err(RadioError::NotConnected)
        }
    }

    fn read_signal_strength(&mut self, _handle: ConnHandle) -> Result<i8, RadioError> {
        self.record(RadioCall::ReadSignalStrength);
        self.rssi
    }

    fn read_transmit_power(&mut self, _handle: ConnHandle) -> Result<i8, RadioError> {
        self.record(RadioCall::ReadTransmitPower);
        Self::outcome(self.tx_read_error)?;
        Ok(self.tx_power_dbm)
    }

    fn write_transmit_power(&mut self, _handle: ConnHandle, dbm: i8) -> Result<i8, RadioError> {
        self.record(RadioCall::WriteTransmitPower(dbm));
        Self::outcome(self.tx_write_error)?;
        self.tx_power_dbm = if self.quantize_writes {
            tx_levels::quantize(dbm, self.tx_power_dbm)
        } else {
            dbm
        };
        Ok(self.tx_power_dbm)
    }

    fn request_remote_power_delta(
        &mut self,
        _handle: ConnHandle,
        delta: i8,
    ) -> Result<(), RadioError> {
        self.record(RadioCall::RemotePowerDelta(delta));
        Self::outcome(self.remote_delta_error)
    }

    fn configure_path_loss_reporting(
        &mut self,
        _handle: ConnHandle,
        params: &PathLossParams,
    ) -> Result<(), RadioError> {
        self.record(RadioCall::ConfigurePathLoss(*params));
        Self::outcome(self.path_loss_error)
    }

    fn enable_path_loss_reporting(
        &mut self,
        _handle: ConnHandle,
        enable: bool,
    ) -> Result<(), RadioError> {
        self.record(RadioCall::EnablePathLoss(enable));
        Ok(())
    }

    fn enable_transmit_power_reports(
        &mut self,
        _handle: ConnHandle,
        local: bool,
        remote: bool,
    ) -> Result<(), RadioError> {
        self.record(RadioCall::EnableTxPowerReports { local, remote });
        Self::outcome(self.tx_reports_error)
    }

    fn configure_autonomous_power_control(
        &mut self,
        params: &AutonomousParams,
    ) -> Result<(), RadioError> {
        self.record(RadioCall::ConfigureAutonomous(*params));
        Self::outcome(self.autonomous_error)
    }
}
