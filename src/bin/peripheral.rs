//! linkguard peripheral firmware.
//!
//! Advertises the link service, accepts one connection, pins its transmit
//! power at 0 dBm, and logs RSSI / transmit power every two seconds.
//! Advertising restarts once the link is torn down.

#![no_std]
#![no_main]

use defmt::{info, unwrap, warn};
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_nrf::interrupt::Priority;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Receiver;
use embassy_time::{Instant, Timer};
use nrf_softdevice::Softdevice;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use linkguard::config::{self, LinkSettings};
use linkguard::link::LinkManager;
use linkguard::power::{PowerControl, PowerControlMode};
use linkguard::radio::LinkEvent;
use linkguard::softdevice::lbs::LinkServer;
use linkguard::softdevice::{
    self, task, CommandChannel, EventChannel, RadioCommand, SoftdeviceRadio, COMMAND_DEPTH,
    EVENT_DEPTH,
};
use linkguard::zone::NoOutputs;

type PeripheralManager = LinkManager<SoftdeviceRadio, PowerControl, NoOutputs>;

static COMMANDS: CommandChannel = CommandChannel::new();
static EVENTS: EventChannel = EventChannel::new();

const IDLE_WAKE_MS: u64 = 1_000;

#[embassy_executor::task]
async fn radio_task(
    sd: &'static Softdevice,
    server: &'static LinkServer,
    commands: Receiver<'static, CriticalSectionRawMutex, RadioCommand, COMMAND_DEPTH>,
) -> ! {
    task::radio_task(sd, Some(server), commands, EVENTS.sender()).await
}

#[embassy_executor::task]
async fn link_task(
    mut manager: PeripheralManager,
    events: Receiver<'static, CriticalSectionRawMutex, LinkEvent, EVENT_DEPTH>,
) -> ! {
    loop {
        if manager.needs_restart() || manager.state() == linkguard::LinkState::Idle {
            if let Err(e) = manager.start() {
                warn!("Advertising start failed: {:?}", e);
                Timer::after_millis(config::DISCOVERY_RESTART_BACKOFF_MS).await;
                continue;
            }
        }

        let now = Instant::now().as_millis();
        let wake = manager.next_poll_deadline().unwrap_or(now + IDLE_WAKE_MS);
        match select(events.receive(), Timer::at(Instant::from_millis(wake))).await {
            Either::First(event) => manager.handle_event(event, Instant::now().as_millis()),
            Either::Second(()) => {
                // The monitor strategy logs the sample itself.
                let _ = manager.poll(Instant::now().as_millis());
            }
        }
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("linkguard peripheral starting");

    let mut nrf_config = embassy_nrf::config::Config::default();
    nrf_config.gpiote_interrupt_priority = Priority::P2;
    nrf_config.time_interrupt_priority = Priority::P2;
    let _p = embassy_nrf::init(nrf_config);

    let sd = softdevice::enable();
    static SERVER: StaticCell<LinkServer> = StaticCell::new();
    let server: &'static LinkServer = SERVER.init(unwrap!(LinkServer::new(sd)));
    let sd: &'static Softdevice = sd;
    unwrap!(spawner.spawn(softdevice::softdevice_task(sd)));

    let manager = LinkManager::new(
        SoftdeviceRadio::new(COMMANDS.sender()),
        PowerControl::for_mode(PowerControlMode::Monitor),
        NoOutputs,
        LinkSettings::peripheral(),
    );

    unwrap!(spawner.spawn(radio_task(sd, server, COMMANDS.receiver())));
    unwrap!(spawner.spawn(link_task(manager, EVENTS.receiver())));
}
