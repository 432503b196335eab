//! Transmit power control strategies.
//!
//! Every strategy sees the same two hooks - the link came up, a telemetry
//! sample arrived - plus the asynchronous transmit-power reports.  Which
//! strategy runs is a configuration choice ([`PowerControlMode`]); the link
//! manager and poller are shared.
//!
//! - [`stepped::SteppedControl`] - closed loop in software: bounded steps on
//!   local power plus a matching delta request to the peer.
//! - [`delegated::DelegatedControl`] - one-time setup of the controller's
//!   autonomous power control, then observation only.
//! - [`monitor::MonitorOnly`] - fixed power, telemetry logging (peripheral).

pub mod delegated;
pub mod monitor;
pub mod stepped;

use crate::error::Error;
use crate::radio::{ConnHandle, RadioLink, TxPowerReport};

use delegated::DelegatedControl;
use monitor::MonitorOnly;
use stepped::SteppedControl;

/// One telemetry reading.  Consumed by a single strategy call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TelemetrySample {
    pub tx_power_dbm: i8,
    pub rssi_dbm: i8,
    /// Milliseconds since boot.
    pub timestamp_ms: u64,
}

impl TelemetrySample {
    /// Path loss estimate, `tx - rssi` (dB).
    pub fn path_loss_db(&self) -> i16 {
        self.tx_power_dbm as i16 - self.rssi_dbm as i16
    }
}

/// What a strategy did with a sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerAction {
    /// Inside the dead band or at a limit.
    Hold,
    /// The margin called for a `step_db` change and the peer was asked for
    /// that delta.  `local_dbm` is the level the radio selected after
    /// clamping and quantisation (unchanged if the write failed), so the
    /// applied local change may differ from `step_db`.
    Adjust { step_db: i8, local_dbm: i8 },
    /// Adjustment is left to the controller.
    Delegated,
}

/// Strategy selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerControlMode {
    Stepped,
    Delegated,
    Monitor,
}

pub trait PowerStrategy {
    /// Called once per link, after the handle resolved.
    fn on_connect<R: RadioLink>(&mut self, radio: &mut R, handle: ConnHandle) -> Result<(), Error>;

    fn on_sample<R: RadioLink>(
        &mut self,
        radio: &mut R,
        handle: ConnHandle,
        sample: &TelemetrySample,
    ) -> PowerAction;

    fn on_tx_power_report(&mut self, _report: &TxPowerReport) {}

    fn on_disconnect(&mut self) {}
}

/// Configuration-selected strategy.
#[derive(Debug)]
pub enum PowerControl {
    Stepped(SteppedControl),
    Delegated(DelegatedControl),
    Monitor(MonitorOnly),
}

impl PowerControl {
    /// Build the strategy for `mode` with the compile-time parameters.
    pub fn for_mode(mode: PowerControlMode) -> Self {
        match mode {
            PowerControlMode::Stepped => PowerControl::Stepped(SteppedControl::default()),
            PowerControlMode::Delegated => PowerControl::Delegated(DelegatedControl::default()),
            PowerControlMode::Monitor => PowerControl::Monitor(MonitorOnly::default()),
        }
    }

    pub fn mode(&self) -> PowerControlMode {
        match self {
            PowerControl::Stepped(_) => PowerControlMode::Stepped,
            PowerControl::Delegated(_) => PowerControlMode::Delegated,
            PowerControl::Monitor(_) => PowerControlMode::Monitor,
        }
    }
}

impl PowerStrategy for PowerControl {
    fn on_connect<R: RadioLink>(&mut self, radio: &mut R, handle: ConnHandle) -> Result<(), Error> {
        match self {
            PowerControl::Stepped(s) => s.on_connect(radio, handle),
            PowerControl::Delegated(s) => s.on_connect(radio, handle),
            PowerControl::Monitor(s) => s.on_connect(radio, handle),
        }
    }

    fn on_sample<R: RadioLink>(
        &mut self,
        radio: &mut R,
        handle: ConnHandle,
        sample: &TelemetrySample,
    ) -> PowerAction {
        match self {
            PowerControl::Stepped(s) => s.on_sample(radio, handle, sample),
            PowerControl::Delegated(s) => s.on_sample(radio, handle, sample),
            PowerControl::Monitor(s) => s.on_sample(radio, handle, sample),
        }
    }

    fn on_tx_power_report(&mut self, report: &TxPowerReport) {
        match self {
            PowerControl::Stepped(s) => s.on_tx_power_report(report),
            PowerControl::Delegated(s) => s.on_tx_power_report(report),
            PowerControl::Monitor(s) => s.on_tx_power_report(report),
        }
    }

    fn on_disconnect(&mut self) {
        match self {
            PowerControl::Stepped(s) => s.on_disconnect(),
            PowerControl::Delegated(s) => s.on_disconnect(),
            PowerControl::Monitor(s) => s.on_disconnect(),
        }
    }
}
