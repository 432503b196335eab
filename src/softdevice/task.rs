//! Radio procedure task.
//!
//! Executes the [`RadioCommand`]s queued by [`super::SoftdeviceRadio`] one
//! at a time and reports each outcome on the event channel.  While a link
//! is up the task waits for it to go down and then reports the disconnect.

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Receiver, Sender};
use embassy_time::{Duration, Timer};
use nrf_softdevice::ble::{central, gatt_client, gatt_server, peripheral, Address, Connection};
use nrf_softdevice::{raw, Softdevice};

use super::lbs::{LbsClient, LinkServer};
use super::{peer_from_address, RadioCommand, COMMAND_DEPTH, EVENT_DEPTH};
use crate::config;
use crate::radio::adv_parser::{
    build_adv_data, build_scan_data, contains_service_uuid128, extract_device_name,
};
use crate::radio::{hci, ConnRef, ConnectOutcome, ConnectParams, LinkEvent, PeerAddress, ServiceUuid};

type Commands = Receiver<'static, CriticalSectionRawMutex, RadioCommand, COMMAND_DEPTH>;
type Events = Sender<'static, CriticalSectionRawMutex, LinkEvent, EVENT_DEPTH>;

/// How often a link without a GATT session is checked for liveness.
const LIVENESS_POLL_MS: u64 = 100;

pub async fn radio_task(
    sd: &'static Softdevice,
    server: Option<&'static LinkServer>,
    commands: Commands,
    events: Events,
) -> ! {
    // Address of the last discovery match, so connect can reuse it as-is.
    let mut last_match: Option<(PeerAddress, Address)> = None;
    let mut pending: Option<RadioCommand> = None;

    loop {
        let cmd = match pending.take() {
            Some(cmd) => cmd,
            None => commands.receive().await,
        };

        match cmd {
            RadioCommand::StartDiscovery(uuid) => {
                match select(discover(sd, &uuid), commands.receive()).await {
                    Either::First(Some(address)) => {
                        let peer = peer_from_address(&address);
                        last_match = Some((peer, address));
                        events.send(LinkEvent::DiscoveryMatch(peer)).await;
                    }
                    Either::First(None) => {
                        warn!("Scan ended without a match, rescanning");
                        pending = Some(RadioCommand::StartDiscovery(uuid));
                        Timer::after(Duration::from_millis(config::DISCOVERY_RESTART_BACKOFF_MS))
                            .await;
                    }
                    // Dropping the scan future stops the scan.
                    Either::Second(next) => pending = Some(next),
                }
            }
            RadioCommand::StopDiscovery => {}
            RadioCommand::Connect(peer, params) => {
                let address = match last_match {
                    Some((p, address)) if p == peer => address,
                    _ => {
                        warn!("Connect to a peer that was never matched");
                        events
                            .send(LinkEvent::Connected(ConnectOutcome::Failed {
                                code: hci::UNSPECIFIED_ERROR,
                            }))
                            .await;
                        continue;
                    }
                };
                match connect(sd, &address, &params).await {
                    Ok(conn) => run_central_link(conn, peer, &events).await,
                    Err(code) => {
                        events
                            .send(LinkEvent::Connected(ConnectOutcome::Failed { code }))
                            .await
                    }
                }
            }
            RadioCommand::StartAdvertising(uuid) => match advertise(sd, &uuid).await {
                Some(conn) => run_peripheral_link(conn, server, &events).await,
                None => {
                    Timer::after(Duration::from_millis(config::DISCOVERY_RESTART_BACKOFF_MS)).await;
                    pending = Some(RadioCommand::StartAdvertising(uuid));
                }
            },
        }
    }
}

/// Scan until a peer advertising `uuid` shows up.
async fn discover(sd: &Softdevice, uuid: &ServiceUuid) -> Option<Address> {
    let scan_config = central::ScanConfig {
        active: true,
        interval: config::BLE_SCAN_FAST_INTERVAL as u32,
        window: config::BLE_DISCOVERY_WINDOW as u32,
        ..Default::default()
    };
    info!("Scanning for link service");
    let result = central::scan(sd, &scan_config, |params| {
        let data =
            unsafe { core::slice::from_raw_parts(params.data.p_data, params.data.len as usize) };
        if contains_service_uuid128(data, uuid) {
            info!(
                "Found {} (RSSI {})",
                extract_device_name(data).as_str(),
                params.rssi
            );
            Some(Address::from_raw(params.peer_addr))
        } else {
            None
        }
    })
    .await;

    match result {
        Ok(address) => Some(address),
        Err(e) => {
            warn!("Scan failed: {:?}", e);
            None
        }
    }
}

async fn connect(
    sd: &Softdevice,
    address: &Address,
    params: &ConnectParams,
) -> Result<Connection, u8> {
    let whitelist = [address];
    let conn_cfg = central::ConnectConfig {
        scan_config: central::ScanConfig {
            whitelist: Some(&whitelist),
            interval: params.scan_interval as u32,
            window: params.scan_window as u32,
            ..Default::default()
        },
        conn_params: raw::ble_gap_conn_params_t {
            min_conn_interval: params.conn_interval_min,
            max_conn_interval: params.conn_interval_max,
            slave_latency: params.slave_latency,
            conn_sup_timeout: params.supervision_timeout,
        },
        ..Default::default()
    };
    central::connect(sd, &conn_cfg).await.map_err(|e| {
        warn!("Connect failed: {:?}", e);
        hci::CONNECTION_FAILED_TO_ESTABLISH
    })
}

async fn advertise(sd: &Softdevice, uuid: &ServiceUuid) -> Option<Connection> {
    let mut adv_data = [0u8; 31];
    let mut scan_data = [0u8; 31];
    let adv_len = build_adv_data(config::DEVICE_NAME, &mut adv_data);
    let scan_len = build_scan_data(uuid, &mut scan_data);

    let adv = peripheral::ConnectableAdvertisement::ScannableUndirected {
        adv_data: &adv_data[..adv_len],
        scan_data: &scan_data[..scan_len],
    };
    let adv_config = peripheral::Config {
        interval: config::ADV_INTERVAL_MIN,
        ..Default::default()
    };
    info!("Advertising as {}", config::DEVICE_NAME);
    match peripheral::advertise_connectable(sd, adv, &adv_config).await {
        Ok(conn) => Some(conn),
        Err(e) => {
            warn!("Advertising failed: {:?}", e);
            None
        }
    }
}

/// Report the connection, then hold it until it drops.
async fn announce(conn: &Connection, peer: PeerAddress, events: &Events) -> Option<ConnRef> {
    let Some(handle) = conn.handle() else {
        events
            .send(LinkEvent::Connected(ConnectOutcome::Failed {
                code: hci::CONNECTION_FAILED_TO_ESTABLISH,
            }))
            .await;
        return None;
    };
    let conn_ref = ConnRef(handle);
    events
        .send(LinkEvent::Connected(ConnectOutcome::Established {
            peer,
            conn: conn_ref,
        }))
        .await;
    Some(conn_ref)
}

async fn run_central_link(conn: Connection, peer: PeerAddress, events: &Events) {
    let Some(conn_ref) = announce(&conn, peer, events).await else {
        return;
    };

    match gatt_client::discover::<LbsClient>(&conn).await {
        Ok(client) => {
            info!("Link service discovered");
            gatt_client::run(&conn, &client, |_| {}).await;
        }
        Err(e) => {
            warn!("Link service discovery failed: {:?}", e);
            wait_disconnected(&conn).await;
        }
    }
    report_disconnect(conn_ref, events).await;
}

async fn run_peripheral_link(conn: Connection, server: Option<&'static LinkServer>, events: &Events) {
    let peer = peer_from_address(&conn.peer_address());
    let Some(conn_ref) = announce(&conn, peer, events).await else {
        return;
    };

    match server {
        Some(server) => {
            let _ = gatt_server::run(&conn, server, |_| {}).await;
        }
        None => wait_disconnected(&conn).await,
    }
    report_disconnect(conn_ref, events).await;
}

async fn wait_disconnected(conn: &Connection) {
    while conn.is_connected() {
        Timer::after(Duration::from_millis(LIVENESS_POLL_MS)).await;
    }
}

async fn report_disconnect(conn: ConnRef, events: &Events) {
    // The SoftDevice wrapper does not surface the HCI reason.
    events
        .send(LinkEvent::Disconnected {
            conn,
            reason: hci::UNSPECIFIED_ERROR,
        })
        .await;
}
