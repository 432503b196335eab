//! Connection lifecycle manager.
//!
//! Owns the single [`Link`], the telemetry poll schedule, the power control
//! strategy, and the path-loss zone classifier.  Every radio event and every
//! poll goes through here, on one execution context, so no state is shared.
//!
//! ```text
//!  Idle -> Discovering -> Connecting -> Connected -> Disconnecting
//!   ^          ^              |            |              |
//!   |          +--- failure --+            |              |
//!   |          +------------- disconnect --+--------------+
//!   +-- discovery could not be restarted (retried by the supervisor)
//! ```
//!
//! A peripheral advertises while `Discovering` and is connected to straight
//! from there; it never passes through `Connecting`.

pub mod poller;

use crate::config::LinkSettings;
use crate::error::{ConnectionError, Error, Feature};
use crate::power::{PowerAction, PowerStrategy, TelemetrySample};
use crate::radio::{
    ConnHandle, ConnRef, ConnectOutcome, LinkEvent, PeerAddress, RadioLink, Role, TxPowerReport,
};
use crate::zone::{PathLossZone, ZoneClassifier, ZoneOutputs};

use poller::TelemetryPoller;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    Idle,
    /// Scanning (central) or advertising (peripheral).
    Discovering,
    Connecting,
    Connected,
    /// Local disconnect requested; waiting for the disconnect event.
    Disconnecting,
}

/// The one logical connection.  Exists only while connected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Link {
    pub peer: PeerAddress,
    pub conn: ConnRef,
    pub role: Role,
}

pub struct LinkManager<R: RadioLink, S: PowerStrategy, O: ZoneOutputs> {
    radio: R,
    strategy: S,
    zones: ZoneClassifier<O>,
    poller: TelemetryPoller,
    settings: LinkSettings,
    state: LinkState,
    link: Option<Link>,
    pending_peer: Option<PeerAddress>,
    /// `start()` was called; discovery must come back after every teardown.
    running: bool,
}

impl<R: RadioLink, S: PowerStrategy, O: ZoneOutputs> LinkManager<R, S, O> {
    pub fn new(radio: R, strategy: S, outputs: O, settings: LinkSettings) -> Self {
        Self {
            radio,
            strategy,
            zones: ZoneClassifier::new(outputs),
            poller: TelemetryPoller::new(settings.poll_interval_ms),
            settings,
            state: LinkState::Idle,
            link: None,
            pending_peer: None,
            running: false,
        }
    }

    /// Begin discovery (central) or advertising (peripheral).
    ///
    /// No-op unless `Idle`.  On failure the manager stays `Idle` and
    /// [`needs_restart`](Self::needs_restart) reports true.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.state != LinkState::Idle {
            debug!("start() ignored in {:?}", self.state);
            return Ok(());
        }
        self.running = true;
        self.begin_discovery()
    }

    /// Stop looking for a peer and drop the link, if any.
    pub fn stop(&mut self) {
        self.running = false;
        match self.state {
            LinkState::Discovering => {
                if self.settings.role == Role::Central {
                    self.radio.stop_discovery();
                }
                self.state = LinkState::Idle;
            }
            LinkState::Connecting => {
                // A connection that still completes is dropped on arrival.
                info!("Connect abandoned");
                self.pending_peer = None;
                self.state = LinkState::Idle;
            }
            LinkState::Connected => {
                if let Err(e) = self.disconnect() {
                    warn!("Disconnect on stop failed: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Request a local disconnect.  Teardown completes on the disconnect event.
    pub fn disconnect(&mut self) -> Result<(), Error> {
        let link = match (self.state, self.link) {
            (LinkState::Connected, Some(link)) => link,
            (state, _) => return Err(Error::InvalidState(state)),
        };
        self.radio.disconnect(link.conn)?;
        info!("Disconnecting");
        self.state = LinkState::Disconnecting;
        Ok(())
    }

    pub fn on_discovery_match(&mut self, peer: PeerAddress) {
        if self.settings.role != Role::Central || self.state != LinkState::Discovering {
            debug!("Discovery match ignored in {:?}", self.state);
            return;
        }
        self.radio.stop_discovery();
        info!("Peer found, connecting");
        match self.radio.connect(&peer, &self.settings.connect) {
            Ok(()) => {
                self.pending_peer = Some(peer);
                self.state = LinkState::Connecting;
            }
            Err(e) => {
                warn!("Connect request failed: {:?}", e);
                self.restart_discovery();
            }
        }
    }

    pub fn on_connected(&mut self, outcome: ConnectOutcome, now_ms: u64) {
        match outcome {
            ConnectOutcome::Failed { code } => {
                if !self.accepts_connection() {
                    debug!("Connection failure ({:#x}) ignored in {:?}", code, self.state);
                    return;
                }
                warn!("Connection failed: {:?}", ConnectionError::Failed(code));
                self.pending_peer = None;
                self.link = None;
                self.restart_discovery();
            }
            ConnectOutcome::Established { peer, conn } => {
                if !self.accepts_connection() {
                    // Single link: anything unexpected is dropped.
                    warn!("Unexpected connection in {:?}, dropping it", self.state);
                    if let Err(e) = self.radio.disconnect(conn) {
                        warn!("Failed to drop connection: {:?}", e);
                    }
                    return;
                }
                self.establish(Link {
                    peer,
                    conn,
                    role: self.settings.role,
                });
                self.poller.arm(now_ms);
            }
        }
    }

    pub fn on_disconnected(&mut self, conn: ConnRef, reason: u8) {
        match self.link {
            Some(link) if link.conn == conn => {}
            _ => {
                debug!("Disconnect for unknown connection ignored");
                return;
            }
        }
        info!("Disconnected (reason {:#x})", reason);
        self.teardown();
        self.restart_discovery();
    }

    pub fn on_path_loss_threshold(&mut self, conn: ConnRef, zone: u8) -> Option<PathLossZone> {
        if !self.owns(conn) {
            debug!("Path loss report for stale connection ignored");
            return None;
        }
        self.zones.on_threshold_report(zone)
    }

    pub fn on_tx_power_report(&mut self, conn: ConnRef, report: &TxPowerReport) {
        if !self.owns(conn) {
            debug!("Tx power report for stale connection ignored");
            return;
        }
        self.strategy.on_tx_power_report(report);
    }

    pub fn handle_event(&mut self, event: LinkEvent, now_ms: u64) {
        match event {
            LinkEvent::DiscoveryMatch(peer) => self.on_discovery_match(peer),
            LinkEvent::Connected(outcome) => self.on_connected(outcome, now_ms),
            LinkEvent::Disconnected { conn, reason } => self.on_disconnected(conn, reason),
            LinkEvent::PathLossThreshold {
                conn,
                zone,
                path_loss,
            } => {
                trace!("Path loss {} dB", path_loss);
                let _ = self.on_path_loss_threshold(conn, zone);
            }
            LinkEvent::TxPowerReport { conn, report } => self.on_tx_power_report(conn, &report),
        }
    }

    /// Take one telemetry sample if the poller is due.
    ///
    /// Checks the link before acting: with no live link the poller is
    /// disarmed and nothing is produced.  A failed read skips this cycle
    /// only.
    pub fn poll(&mut self, now_ms: u64) -> Option<(TelemetrySample, PowerAction)> {
        if !self.poller.is_due(now_ms) {
            return None;
        }
        let handle = match self.live_handle() {
            Some(handle) => handle,
            None => {
                debug!("Link gone, poller stopped");
                self.poller.disarm();
                return None;
            }
        };
        self.poller.reschedule(now_ms);

        let tx_power_dbm = match self.radio.read_transmit_power(handle) {
            Ok(dbm) => dbm,
            Err(e) => {
                warn!("Tx power read failed: {:?}", e);
                return None;
            }
        };
        let rssi_dbm = match self.radio.read_signal_strength(handle) {
            Ok(dbm) => dbm,
            Err(e) => {
                warn!("RSSI read failed: {:?}", e);
                return None;
            }
        };

        let sample = TelemetrySample {
            tx_power_dbm,
            rssi_dbm,
            timestamp_ms: now_ms,
        };
        let action = self.strategy.on_sample(&mut self.radio, handle, &sample);
        Some((sample, action))
    }

    pub fn next_poll_deadline(&self) -> Option<u64> {
        self.poller.next_deadline()
    }

    /// Discovery should be running but could not be (re)started.
    pub fn needs_restart(&self) -> bool {
        self.running && self.state == LinkState::Idle
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    pub fn polling_started(&self) -> bool {
        self.poller.is_armed()
    }

    pub fn link(&self) -> Option<&Link> {
        self.link.as_ref()
    }

    pub fn pending_peer(&self) -> Option<&PeerAddress> {
        self.pending_peer.as_ref()
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn zones(&self) -> &ZoneClassifier<O> {
        &self.zones
    }

    fn accepts_connection(&self) -> bool {
        if !self.running {
            return false;
        }
        match self.settings.role {
            Role::Central => self.state == LinkState::Connecting,
            Role::Peripheral => self.state == LinkState::Discovering,
        }
    }

    fn owns(&self, conn: ConnRef) -> bool {
        matches!(self.link, Some(link) if link.conn == conn)
    }

    fn live_handle(&self) -> Option<ConnHandle> {
        if self.state != LinkState::Connected {
            return None;
        }
        let link = self.link?;
        self.radio.resolve_handle(link.conn).ok()
    }

    fn establish(&mut self, link: Link) {
        self.pending_peer = None;
        self.link = Some(link);
        self.state = LinkState::Connected;
        info!("Connected ({:?})", link.role);

        // Everything below needs a live handle; without one the link stays
        // up unconfigured and the poller stops itself on its first firing.
        let handle = match self.radio.resolve_handle(link.conn) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(
                    "{:?} ({:?}), skipping link configuration",
                    ConnectionError::HandleUnresolved,
                    e
                );
                return;
            }
        };

        if self.settings.tx_power_reports {
            if let Err(e) = self.radio.enable_transmit_power_reports(handle, true, true) {
                warn!(
                    "Tx power reports unavailable: {:?}",
                    Error::Configuration(Feature::TxPowerReports, e)
                );
            }
        }
        if let Some(params) = self.settings.path_loss {
            if let Err(e) = self.zones.configure(&mut self.radio, handle, &params) {
                warn!("Path loss reporting unavailable: {:?}", e);
            }
        }
        if let Err(e) = self.strategy.on_connect(&mut self.radio, handle) {
            warn!("Power control degraded for this link: {:?}", e);
        }
    }

    fn teardown(&mut self) {
        self.poller.disarm();
        self.zones.reset();
        self.strategy.on_disconnect();
        self.link = None;
        self.pending_peer = None;
        self.state = LinkState::Idle;
    }

    fn restart_discovery(&mut self) {
        self.state = LinkState::Idle;
        if !self.running {
            return;
        }
        if let Err(e) = self.begin_discovery() {
            warn!("Restart failed, will retry: {:?}", e);
        }
    }

    fn begin_discovery(&mut self) -> Result<(), Error> {
        let result = match self.settings.role {
            Role::Central => self.radio.start_discovery(&self.settings.service),
            Role::Peripheral => self.radio.start_advertising(&self.settings.service),
        };
        match result {
            Ok(()) => {
                self.state = LinkState::Discovering;
                info!(
                    "{}",
                    match self.settings.role {
                        Role::Central => "Scanning",
                        Role::Peripheral => "Advertising",
                    }
                );
                Ok(())
            }
            Err(e) => {
                self.state = LinkState::Idle;
                Err(ConnectionError::DiscoveryFailed(e).into())
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests
// ═══════════════════════════════════════════════════════════════════════════
