//! Application-wide constants and compile-time configuration.
//!
//! Radio parameters, control-loop tuning, and feature toggles live here so
//! they can be tuned in one place.  [`LinkSettings`] bundles the subset the
//! link manager needs so tests can override it at runtime.

use crate::power::PowerControlMode;
use crate::radio::{AutonomousParams, ConnectParams, PathLossParams, Role, ServiceUuid};

// Link identity

/// 128-bit service UUID the central filters on and the peripheral advertises
/// (LED Button Service, `00001523-1212-efde-1523-785feabcd123`).
/// Little-endian, as it appears on air.
pub const LINK_SERVICE_UUID: ServiceUuid = ServiceUuid::from_le_bytes([
    0x23, 0xd1, 0xbc, 0xea, 0x5f, 0x78, 0x23, 0x15, 0xde, 0xef, 0x12, 0x12, 0x23, 0x15, 0x00, 0x00,
]);

/// Complete local name advertised by the peripheral.
pub const DEVICE_NAME: &str = "linkguard";

/// Advertising interval range (0.625 ms units). 800 = 500 ms.
pub const ADV_INTERVAL_MIN: u32 = 800;
pub const ADV_INTERVAL_MAX: u32 = 801;

// Connection establishment

/// Fast scan interval/window used while connecting (0.625 ms units). 0x60 = 60 ms.
pub const BLE_SCAN_FAST_INTERVAL: u16 = 0x0060;
pub const BLE_SCAN_FAST_WINDOW: u16 = 0x0060;

/// Scan window used while discovering (0.625 ms units). 0x30 = 30 ms.
pub const BLE_DISCOVERY_WINDOW: u16 = 0x0030;

/// BLE connection interval range (1.25 ms units). 24 = 30 ms, 40 = 50 ms.
pub const BLE_CONN_INTERVAL_MIN: u16 = 24;
pub const BLE_CONN_INTERVAL_MAX: u16 = 40;

/// BLE slave latency (number of connection events the peripheral can skip).
pub const BLE_SLAVE_LATENCY: u16 = 0;

/// BLE supervision timeout (10 ms units). 400 = 4 s.
pub const BLE_SUP_TIMEOUT: u16 = 400;

/// Delay before retrying discovery when the radio refused to start it.
pub const DISCOVERY_RESTART_BACKOFF_MS: u64 = 1_000;

// Telemetry polling

/// Central telemetry poll interval (ms).
pub const POLLING_INTERVAL_MS: u64 = 500;

/// Peripheral telemetry poll interval (ms).
pub const PERIPHERAL_POLLING_INTERVAL_MS: u64 = 2_000;

// Power control

/// Strategy used by the central image.
pub const POWER_CONTROL_MODE: PowerControlMode = PowerControlMode::Stepped;

/// RSSI the stepped controller converges towards (dBm).
pub const TARGET_RSSI_DBM: i8 = -50;

/// Transmit power clamp (dBm) applied by the stepped controller.
pub const TX_POWER_MIN_DBM: i8 = -46;
pub const TX_POWER_MAX_DBM: i8 = 8;

/// Transmit power every new link starts at (dBm).
pub const TX_POWER_INITIAL_DBM: i8 = 0;

/// Margin bands (dB): beyond `FINE` a fine step is taken, at or beyond
/// `COARSE` a coarse one.
pub const MARGIN_FINE_DB: i16 = 10;
pub const MARGIN_COARSE_DB: i16 = 20;

/// Step sizes (dB).
pub const STEP_FINE_DB: i8 = 1;
pub const STEP_COARSE_DB: i8 = 5;

/// Autonomous power control request parameters.
pub const APC_SENSITIVITY: u8 = 0;
pub const APC_LOWER_LIMIT_RSSI: i8 = -60;
pub const APC_UPPER_LIMIT_RSSI: i8 = -40;
pub const APC_LOWER_TARGET_RSSI: i8 = -55;
pub const APC_UPPER_TARGET_RSSI: i8 = -45;
pub const APC_WAIT_PERIOD_MS: u16 = 1_000;

// Path-loss monitoring

/// Enable path-loss zone reporting on connect.
pub const PATH_LOSS_MONITORING: bool = true;

/// Zone borders and hysteresis (dB), minimum dwell (samples).
pub const PATH_LOSS_HIGH_THRESHOLD: u8 = 60;
pub const PATH_LOSS_HIGH_HYSTERESIS: u8 = 5;
pub const PATH_LOSS_LOW_THRESHOLD: u8 = 40;
pub const PATH_LOSS_LOW_HYSTERESIS: u8 = 5;
pub const PATH_LOSS_MIN_DWELL: u16 = 5;

/// Runtime bundle of the parameters the link manager consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkSettings {
    pub role: Role,
    pub service: ServiceUuid,
    pub connect: ConnectParams,
    pub poll_interval_ms: u64,
    /// Ask the controller for local and remote transmit power reports.
    pub tx_power_reports: bool,
    /// `None` disables path-loss zone reporting.
    pub path_loss: Option<PathLossParams>,
}

impl LinkSettings {
    /// Settings for the central image.
    pub const fn central() -> Self {
        Self {
            role: Role::Central,
            service: LINK_SERVICE_UUID,
            connect: ConnectParams::fast(),
            poll_interval_ms: POLLING_INTERVAL_MS,
            tx_power_reports: true,
            path_loss: if PATH_LOSS_MONITORING {
                Some(PathLossParams::default_zones())
            } else {
                None
            },
        }
    }

    /// Settings for the peripheral image.
    pub const fn peripheral() -> Self {
        Self {
            role: Role::Peripheral,
            service: LINK_SERVICE_UUID,
            connect: ConnectParams::fast(),
            poll_interval_ms: PERIPHERAL_POLLING_INTERVAL_MS,
            tx_power_reports: false,
            path_loss: None,
        }
    }
}

/// Autonomous power control parameters built from the constants above.
pub const fn autonomous_params() -> AutonomousParams {
    AutonomousParams {
        sensitivity: APC_SENSITIVITY,
        auto_enable: true,
        lower_limit_dbm: APC_LOWER_LIMIT_RSSI,
        upper_limit_dbm: APC_UPPER_LIMIT_RSSI,
        lower_target_dbm: APC_LOWER_TARGET_RSSI,
        upper_target_dbm: APC_UPPER_TARGET_RSSI,
        wait_period_ms: APC_WAIT_PERIOD_MS,
    }
}
