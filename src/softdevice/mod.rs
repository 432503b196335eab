//! Nordic SoftDevice S140 backend for the Radio Link Interface.
//!
//! Two halves:
//!
//! 1. [`SoftdeviceRadio`] - the synchronous side owned by the link manager.
//!    Telemetry and power commands go straight to the SoftDevice; procedures
//!    that take time (scan, connect, advertise) are queued as
//!    [`RadioCommand`]s.
//! 2. [`task::radio_task`] - runs those procedures and publishes their
//!    outcomes as [`LinkEvent`]s.
//!
//! S140 has no LE Power Control or LE Path Loss Monitoring; those commands
//! return [`RadioError::Unsupported`] so `emulated::EmulatedRadio` can step
//! in.  Connection references are SoftDevice connection handles.

pub mod lbs;
pub mod task;

use core::mem;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Sender};
use nrf_softdevice::ble::{Address, Connection};
use nrf_softdevice::{raw, Softdevice};

use crate::config;
use crate::error::RadioError;
use crate::radio::tx_levels::{self, LevelTracker};
use crate::radio::{
    AutonomousParams, ConnHandle, ConnRef, ConnectParams, LinkEvent, PathLossParams, PeerAddress,
    RadioLink, ServiceUuid,
};

pub const COMMAND_DEPTH: usize = 4;
pub const EVENT_DEPTH: usize = 8;

pub type CommandChannel = Channel<CriticalSectionRawMutex, RadioCommand, COMMAND_DEPTH>;
pub type EventChannel = Channel<CriticalSectionRawMutex, LinkEvent, EVENT_DEPTH>;

/// Procedures handed to the radio task.
#[derive(Clone, Copy, defmt::Format)]
pub enum RadioCommand {
    StartDiscovery(ServiceUuid),
    StopDiscovery,
    StartAdvertising(ServiceUuid),
    Connect(PeerAddress, ConnectParams),
}

/// Level the SoftDevice uses for a connection nobody has written yet.
const TX_POWER_DEFAULT_DBM: i8 = 0;

pub struct SoftdeviceRadio {
    commands: Sender<'static, CriticalSectionRawMutex, RadioCommand, COMMAND_DEPTH>,
    /// Last level written.  Forgotten whenever a new link may start, since
    /// the SoftDevice reuses connection handles.
    tx_power: LevelTracker,
}

impl SoftdeviceRadio {
    pub fn new(commands: Sender<'static, CriticalSectionRawMutex, RadioCommand, COMMAND_DEPTH>) -> Self {
        Self {
            commands,
            tx_power: LevelTracker::new(TX_POWER_DEFAULT_DBM),
        }
    }

    fn send(&self, cmd: RadioCommand) -> Result<(), RadioError> {
        self.commands.try_send(cmd).map_err(|_| RadioError::Busy)
    }
}

fn check(ret: u32) -> Result<(), RadioError> {
    if ret == raw::NRF_SUCCESS {
        Ok(())
    } else {
        Err(RadioError::Command(ret))
    }
}

pub fn peer_from_address(address: &Address) -> PeerAddress {
    PeerAddress::new(address.address_type() as u8, address.bytes())
}

impl RadioLink for SoftdeviceRadio {
    fn start_discovery(&mut self, filter: &ServiceUuid) -> Result<(), RadioError> {
        self.tx_power.forget();
        self.send(RadioCommand::StartDiscovery(*filter))
    }

    fn stop_discovery(&mut self) {
        // The scan stops by itself on a match; this covers stop().
        let _ = self.send(RadioCommand::StopDiscovery);
    }

    fn start_advertising(&mut self, service: &ServiceUuid) -> Result<(), RadioError> {
        self.tx_power.forget();
        self.send(RadioCommand::StartAdvertising(*service))
    }

    fn connect(&mut self, peer: &PeerAddress, params: &ConnectParams) -> Result<(), RadioError> {
        self.tx_power.forget();
        self.send(RadioCommand::Connect(*peer, *params))
    }

    fn disconnect(&mut self, conn: ConnRef) -> Result<(), RadioError> {
        let connection = Connection::from_handle(conn.0).ok_or(RadioError::NotConnected)?;
        connection.disconnect().map_err(|_| RadioError::NotConnected)
    }

    fn resolve_handle(&self, conn: ConnRef) -> Result<ConnHandle, RadioError> {
        Connection::from_handle(conn.0)
            .and_then(|c| c.handle())
            .map(ConnHandle)
            .ok_or(RadioError::NotConnected)
    }

    fn read_signal_strength(&mut self, handle: ConnHandle) -> Result<i8, RadioError> {
        let mut rssi: i8 = 0;
        let mut channel: u8 = 0;
        let ret = unsafe { raw::sd_ble_gap_rssi_get(handle.0, &mut rssi, &mut channel) };
        if ret == raw::NRF_ERROR_INVALID_STATE {
            // RSSI sampling is off for a fresh connection; start it and retry.
            debug!("Starting RSSI sampling on {}", handle.0);
            check(unsafe {
                raw::sd_ble_gap_rssi_start(handle.0, raw::BLE_GAP_RSSI_THRESHOLD_INVALID as u8, 0)
            })?;
            check(unsafe { raw::sd_ble_gap_rssi_get(handle.0, &mut rssi, &mut channel) })?;
            return Ok(rssi);
        }
        check(ret)?;
        Ok(rssi)
    }

    fn read_transmit_power(&mut self, handle: ConnHandle) -> Result<i8, RadioError> {
        // The SoftDevice has no read-back; the last write is authoritative.
        Ok(self.tx_power.current(handle))
    }

    fn write_transmit_power(&mut self, handle: ConnHandle, dbm: i8) -> Result<i8, RadioError> {
        let level = tx_levels::quantize(dbm, self.tx_power.current(handle));
        check(unsafe {
            raw::sd_ble_gap_tx_power_set(
                raw::BLE_GAP_TX_POWER_ROLES_BLE_GAP_TX_POWER_ROLE_CONN as u8,
                handle.0,
                level,
            )
        })?;
        self.tx_power.record(handle, level);
        Ok(level)
    }

    fn request_remote_power_delta(
        &mut self,
        _handle: ConnHandle,
        _delta: i8,
    ) -> Result<(), RadioError> {
        Err(RadioError::Unsupported)
    }

    fn configure_path_loss_reporting(
        &mut self,
        _handle: ConnHandle,
        _params: &PathLossParams,
    ) -> Result<(), RadioError> {
        Err(RadioError::Unsupported)
    }

    fn enable_path_loss_reporting(
        &mut self,
        _handle: ConnHandle,
        _enable: bool,
    ) -> Result<(), RadioError> {
        Err(RadioError::Unsupported)
    }

    fn enable_transmit_power_reports(
        &mut self,
        _handle: ConnHandle,
        _local: bool,
        _remote: bool,
    ) -> Result<(), RadioError> {
        Err(RadioError::Unsupported)
    }

    fn configure_autonomous_power_control(
        &mut self,
        _params: &AutonomousParams,
    ) -> Result<(), RadioError> {
        Err(RadioError::Unsupported)
    }
}

/// Enable the SoftDevice for one link in either role.
pub fn enable() -> &'static mut Softdevice {
    let config = nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 128 }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 1,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: config::DEVICE_NAME.as_ptr() as _,
            current_len: config::DEVICE_NAME.len() as u16,
            max_len: config::DEVICE_NAME.len() as u16,
            write_perm: unsafe { mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    };
    info!("Enabling SoftDevice");
    Softdevice::enable(&config)
}

#[embassy_executor::task]
pub async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}
