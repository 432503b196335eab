//! Link-quality features for controllers that lack them.
//!
//! [`EmulatedRadio`] wraps any [`RadioLink`] and provides path-loss zone
//! reporting, autonomous power control, and local transmit power reports on
//! top of plain RSSI reads and power writes.  The work happens on each RSSI
//! read, i.e. at the telemetry poll cadence; zone counts for `min_dwell` are
//! in samples rather than connection events.  Events are queued and drained
//! by the supervisor with [`EmulatedRadio::pop_event`].
//!
//! The wrapped radio must number its connection references and handles
//! identically, as the SoftDevice does.

pub mod autonomous;
pub mod path_loss;

use heapless::Deque;

use crate::error::RadioError;
use crate::radio::{
    AutonomousParams, ConnHandle, ConnRef, ConnectParams, LinkEvent, PathLossParams, PeerAddress,
    PowerSide, RadioLink, ServiceUuid, TxPowerReport,
};

use autonomous::AutonomousPowerControl;
use path_loss::PathLossMonitor;

pub const EVENT_QUEUE_DEPTH: usize = 8;

pub struct EmulatedRadio<R: RadioLink> {
    inner: R,
    path_loss: Option<PathLossMonitor>,
    path_loss_enabled: bool,
    autonomous: Option<AutonomousPowerControl>,
    local_reports: bool,
    clock_ms: u64,
    events: Deque<LinkEvent, EVENT_QUEUE_DEPTH>,
}

impl<R: RadioLink> EmulatedRadio<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            path_loss: None,
            path_loss_enabled: false,
            autonomous: None,
            local_reports: false,
            clock_ms: 0,
            events: Deque::new(),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Current time, used for the autonomous wait period.
    pub fn set_clock(&mut self, now_ms: u64) {
        self.clock_ms = now_ms;
    }

    pub fn pop_event(&mut self) -> Option<LinkEvent> {
        self.events.pop_front()
    }

    /// Drop per-link emulation state.
    pub fn reset(&mut self) {
        self.path_loss = None;
        self.path_loss_enabled = false;
        self.autonomous = None;
        self.local_reports = false;
        self.events.clear();
    }

    fn push(&mut self, event: LinkEvent) {
        if self.events.is_full() {
            warn!("Emulated event queue full, dropping oldest");
            let _ = self.events.pop_front();
        }
        let _ = self.events.push_back(event);
    }

    fn report_local(&mut self, handle: ConnHandle, previous: i8, now: i8) {
        if self.local_reports && previous != now {
            self.push(LinkEvent::TxPowerReport {
                conn: ConnRef(handle.0),
                report: TxPowerReport {
                    side: PowerSide::Local,
                    tx_power_dbm: now,
                    delta: now.saturating_sub(previous),
                },
            });
        }
    }

    fn run_emulation(&mut self, handle: ConnHandle, rssi: i8) {
        if !self.path_loss_enabled && self.autonomous.is_none() {
            return;
        }
        let tx = match self.inner.read_transmit_power(handle) {
            Ok(tx) => tx,
            Err(e) => {
                debug!("Emulation skipped, Tx read failed: {:?}", e);
                return;
            }
        };

        if self.path_loss_enabled {
            let report = self
                .path_loss
                .as_mut()
                .and_then(|m| m.feed(tx as i16 - rssi as i16));
            if let Some(report) = report {
                self.push(LinkEvent::PathLossThreshold {
                    conn: ConnRef(handle.0),
                    zone: report.zone,
                    path_loss: report.path_loss,
                });
            }
        }

        let now = self.clock_ms;
        let adjust = self
            .autonomous
            .as_mut()
            .and_then(|apc| apc.on_rssi(now, rssi, tx));
        if let Some(level) = adjust {
            match self.inner.write_transmit_power(handle, level) {
                Ok(selected) => {
                    debug!("Autonomous power control: Tx {} -> {} dBm", tx, selected);
                    self.report_local(handle, tx, selected);
                }
                Err(e) => warn!("Autonomous Tx power write failed: {:?}", e),
            }
        }
    }
}

impl<R: RadioLink> RadioLink for EmulatedRadio<R> {
    fn start_discovery(&mut self, filter: &ServiceUuid) -> Result<(), RadioError> {
        self.inner.start_discovery(filter)
    }

    fn stop_discovery(&mut self) {
        self.inner.stop_discovery()
    }

    fn start_advertising(&mut self, service: &ServiceUuid) -> Result<(), RadioError> {
        self.inner.start_advertising(service)
    }

    fn connect(&mut self, peer: &PeerAddress, params: &ConnectParams) -> Result<(), RadioError> {
        self.reset();
        self.inner.connect(peer, params)
    }

    fn disconnect(&mut self, conn: ConnRef) -> Result<(), RadioError> {
        self.reset();
        self.inner.disconnect(conn)
    }

    fn resolve_handle(&self, conn: ConnRef) -> Result<ConnHandle, RadioError> {
        self.inner.resolve_handle(conn)
    }

    fn read_signal_strength(&mut self, handle: ConnHandle) -> Result<i8, RadioError> {
        let rssi = self.inner.read_signal_strength(handle)?;
        self.run_emulation(handle, rssi);
        Ok(rssi)
    }

    fn read_transmit_power(&mut self, handle: ConnHandle) -> Result<i8, RadioError> {
        self.inner.read_transmit_power(handle)
    }

    fn write_transmit_power(&mut self, handle: ConnHandle, dbm: i8) -> Result<i8, RadioError> {
        let previous = self.inner.read_transmit_power(handle).ok();
        let selected = self.inner.write_transmit_power(handle, dbm)?;
        if let Some(previous) = previous {
            self.report_local(handle, previous, selected);
        }
        Ok(selected)
    }

    fn request_remote_power_delta(
        &mut self,
        handle: ConnHandle,
        delta: i8,
    ) -> Result<(), RadioError> {
        self.inner.request_remote_power_delta(handle, delta)
    }

    fn configure_path_loss_reporting(
        &mut self,
        handle: ConnHandle,
        params: &PathLossParams,
    ) -> Result<(), RadioError> {
        match self.inner.configure_path_loss_reporting(handle, params) {
            Err(RadioError::Unsupported) => {}
            other => return other,
        }
        if !params.is_valid() {
            return Err(RadioError::InvalidParam);
        }
        self.path_loss = Some(PathLossMonitor::new(*params));
        self.path_loss_enabled = false;
        Ok(())
    }

    fn enable_path_loss_reporting(
        &mut self,
        handle: ConnHandle,
        enable: bool,
    ) -> Result<(), RadioError> {
        if self.path_loss.is_none() {
            return self.inner.enable_path_loss_reporting(handle, enable);
        }
        if let Some(monitor) = self.path_loss.as_mut() {
            monitor.reset();
        }
        self.path_loss_enabled = enable;
        Ok(())
    }

    fn enable_transmit_power_reports(
        &mut self,
        handle: ConnHandle,
        local: bool,
        remote: bool,
    ) -> Result<(), RadioError> {
        match self.inner.enable_transmit_power_reports(handle, local, remote) {
            Err(RadioError::Unsupported) => {}
            other => return other,
        }
        // Remote levels are never learned without LE Power Control.
        self.local_reports = local;
        Ok(())
    }

    fn configure_autonomous_power_control(
        &mut self,
        params: &AutonomousParams,
    ) -> Result<(), RadioError> {
        match self.inner.configure_autonomous_power_control(params) {
            Err(RadioError::Unsupported) => {}
            other => return other,
        }
        if !params.is_valid() {
            return Err(RadioError::InvalidParam);
        }
        self.autonomous = Some(AutonomousPowerControl::new(*params));
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests
// ═══════════════════════════════════════════════════════════════════════════
