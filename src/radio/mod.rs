//! Radio Link Interface.
//!
//! The link manager never talks to a Bluetooth stack directly.  Everything
//! it needs - discovery, connection establishment, telemetry reads, transmit
//! power writes, and the controller's link-quality features - goes through
//! the [`RadioLink`] trait.  Asynchronous outcomes come back as [`LinkEvent`]s.
//!
//! Implementations:
//! - `softdevice::SoftdeviceRadio` - Nordic S140 (embedded builds).
//! - [`mock::MockRadio`] - recording double for host tests.

pub mod adv_parser;
pub mod mock;
pub mod tx_levels;

use crate::config;
use crate::error::RadioError;

/// Which side of the link this device plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Discovers, initiates, and supervises the link.
    Central,
    /// Advertises and accepts the link.
    Peripheral,
}

/// 128-bit service identifier, stored little-endian (on-air order).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceUuid([u8; 16]);

impl ServiceUuid {
    pub const fn from_le_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn as_le_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

/// BLE device address as seen on air.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerAddress {
    /// Address type (0 = public, 1 = random static, ...).
    pub kind: u8,
    /// Address bytes, little-endian.
    pub bytes: [u8; 6],
}

impl PeerAddress {
    pub const fn new(kind: u8, bytes: [u8; 6]) -> Self {
        Self { kind, bytes }
    }
}

/// Opaque reference to a connection object owned by the stack.
///
/// Only valid while the connection exists; turn it into a [`ConnHandle`]
/// with [`RadioLink::resolve_handle`] before issuing commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnRef(pub u16);

/// Controller connection handle used by telemetry and power commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnHandle(pub u16);

/// Connection establishment parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectParams {
    /// Scan interval while connecting (0.625 ms units).
    pub scan_interval: u16,
    /// Scan window while connecting (0.625 ms units).
    pub scan_window: u16,
    /// Connection interval range (1.25 ms units).
    pub conn_interval_min: u16,
    pub conn_interval_max: u16,
    pub slave_latency: u16,
    /// Supervision timeout (10 ms units).
    pub supervision_timeout: u16,
}

impl ConnectParams {
    /// Fast-scan connection parameters.
    pub const fn fast() -> Self {
        Self {
            scan_interval: config::BLE_SCAN_FAST_INTERVAL,
            scan_window: config::BLE_SCAN_FAST_WINDOW,
            conn_interval_min: config::BLE_CONN_INTERVAL_MIN,
            conn_interval_max: config::BLE_CONN_INTERVAL_MAX,
            slave_latency: config::BLE_SLAVE_LATENCY,
            supervision_timeout: config::BLE_SUP_TIMEOUT,
        }
    }
}

/// Path-loss zone reporting parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PathLossParams {
    /// Border between medium and high path loss (dB).
    pub high_threshold: u8,
    pub high_hysteresis: u8,
    /// Border between low and medium path loss (dB).
    pub low_threshold: u8,
    pub low_hysteresis: u8,
    /// Samples a new zone must persist before it is reported.
    pub min_dwell: u16,
}

impl PathLossParams {
    pub const fn default_zones() -> Self {
        Self {
            high_threshold: config::PATH_LOSS_HIGH_THRESHOLD,
            high_hysteresis: config::PATH_LOSS_HIGH_HYSTERESIS,
            low_threshold: config::PATH_LOSS_LOW_THRESHOLD,
            low_hysteresis: config::PATH_LOSS_LOW_HYSTERESIS,
            min_dwell: config::PATH_LOSS_MIN_DWELL,
        }
    }

    /// Thresholds must leave room for both hysteresis bands.
    pub fn is_valid(&self) -> bool {
        let high_floor = self.high_threshold.saturating_sub(self.high_hysteresis);
        let low_ceiling = self.low_threshold.saturating_add(self.low_hysteresis);
        self.low_threshold < self.high_threshold && low_ceiling <= high_floor
    }
}

/// Parameters for controller-side autonomous power control.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AutonomousParams {
    /// RSSI filter weight, 0 (no filtering) ..= 15 (heaviest).
    pub sensitivity: u8,
    pub auto_enable: bool,
    /// Acceptable RSSI window; adjustment starts outside it (dBm).
    pub lower_limit_dbm: i8,
    pub upper_limit_dbm: i8,
    /// Band adjustment aims for (dBm).
    pub lower_target_dbm: i8,
    pub upper_target_dbm: i8,
    /// Minimum time between two adjustments (ms).
    pub wait_period_ms: u16,
}

impl AutonomousParams {
    pub fn is_valid(&self) -> bool {
        self.sensitivity <= 15
            && self.lower_limit_dbm <= self.lower_target_dbm
            && self.lower_target_dbm <= self.upper_target_dbm
            && self.upper_target_dbm <= self.upper_limit_dbm
    }
}

/// Which transmitter a power report describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerSide {
    Local,
    Remote,
}

/// Asynchronous transmit power report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxPowerReport {
    pub side: PowerSide,
    pub tx_power_dbm: i8,
    /// Change relative to the previous report (dB).
    pub delta: i8,
}

/// Result of a connection attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectOutcome {
    Established { peer: PeerAddress, conn: ConnRef },
    Failed { code: u8 },
}

/// Events the radio delivers to the link manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkEvent {
    /// A peer matching the discovery filter was seen.
    DiscoveryMatch(PeerAddress),
    /// Outcome of a connection attempt (or an accepted connection).
    Connected(ConnectOutcome),
    /// The link went down.
    Disconnected { conn: ConnRef, reason: u8 },
    /// The path-loss zone changed (hysteresis and dwell already applied).
    PathLossThreshold { conn: ConnRef, zone: u8, path_loss: u8 },
    /// A transmitter changed its power level.
    TxPowerReport { conn: ConnRef, report: TxPowerReport },
}

/// HCI status / disconnect reason codes used by the crate.
pub mod hci {
    pub const CONNECTION_TIMEOUT: u8 = 0x08;
    pub const REMOTE_USER_TERMINATED: u8 = 0x13;
    pub const LOCAL_HOST_TERMINATED: u8 = 0x16;
    pub const UNSPECIFIED_ERROR: u8 = 0x1F;
    pub const CONNECTION_FAILED_TO_ESTABLISH: u8 = 0x3E;
}

/// Commands and queries the core issues to the radio.
///
/// Telemetry and power commands are synchronous request/response exchanges
/// bounded by the command layer's timeout.  Discovery, connection, and
/// disconnection only *start* a procedure; the outcome arrives later as a
/// [`LinkEvent`].
pub trait RadioLink {
    /// Start scanning for peers advertising `filter`.
    fn start_discovery(&mut self, filter: &ServiceUuid) -> Result<(), RadioError>;

    fn stop_discovery(&mut self);

    /// Start connectable advertising of `service`.
    fn start_advertising(&mut self, service: &ServiceUuid) -> Result<(), RadioError>;

    fn connect(&mut self, peer: &PeerAddress, params: &ConnectParams) -> Result<(), RadioError>;

    fn disconnect(&mut self, conn: ConnRef) -> Result<(), RadioError>;

    /// Resolve a connection object to its controller handle.
    fn resolve_handle(&self, conn: ConnRef) -> Result<ConnHandle, RadioError>;

    fn read_signal_strength(&mut self, handle: ConnHandle) -> Result<i8, RadioError>;

    fn read_transmit_power(&mut self, handle: ConnHandle) -> Result<i8, RadioError>;

    /// Write the local transmit power; returns the level the controller selected.
    fn write_transmit_power(&mut self, handle: ConnHandle, dbm: i8) -> Result<i8, RadioError>;

    /// Ask the peer to change its transmit power by `delta` dB (best-effort).
    fn request_remote_power_delta(&mut self, handle: ConnHandle, delta: i8)
        -> Result<(), RadioError>;

    fn configure_path_loss_reporting(
        &mut self,
        handle: ConnHandle,
        params: &PathLossParams,
    ) -> Result<(), RadioError>;

    fn enable_path_loss_reporting(
        &mut self,
        handle: ConnHandle,
        enable: bool,
    ) -> Result<(), RadioError>;

    fn enable_transmit_power_reports(
        &mut self,
        handle: ConnHandle,
        local: bool,
        remote: bool,
    ) -> Result<(), RadioError>;

    fn configure_autonomous_power_control(
        &mut self,
        params: &AutonomousParams,
    ) -> Result<(), RadioError>;
}
