//! linkguard central firmware.
//!
//! Discovers the peer advertising the link service, connects, and keeps the
//! link's transmit power in band while showing the path-loss zone on the DK
//! LEDs.
//!
//! Tasks (all on the thread-mode executor):
//! - `softdevice_task` - SoftDevice event pump.
//! - `radio_task` - scan / connect procedures.
//! - `link_task` - owns the [`LinkManager`]; dispatches radio events and
//!   fires the telemetry poller.

#![no_std]
#![no_main]

use defmt::{info, unwrap, warn};
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_nrf::gpio::{Level, Output, OutputDrive};
use embassy_nrf::interrupt::Priority;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Receiver;
use embassy_time::{Instant, Timer};
use nrf_softdevice::Softdevice;
use {defmt_rtt as _, panic_probe as _};

use linkguard::config::{self, LinkSettings};
use linkguard::emulated::EmulatedRadio;
use linkguard::leds::LedZoneOutputs;
use linkguard::link::LinkManager;
use linkguard::power::{PowerAction, PowerControl};
use linkguard::radio::LinkEvent;
use linkguard::softdevice::{
    self, task, CommandChannel, EventChannel, RadioCommand, SoftdeviceRadio, COMMAND_DEPTH,
    EVENT_DEPTH,
};

type CentralManager =
    LinkManager<EmulatedRadio<SoftdeviceRadio>, PowerControl, LedZoneOutputs<Output<'static>>>;

static COMMANDS: CommandChannel = CommandChannel::new();
static EVENTS: EventChannel = EventChannel::new();

/// Upper bound on a supervisor sleep with nothing scheduled.
const IDLE_WAKE_MS: u64 = 1_000;

#[embassy_executor::task]
async fn radio_task(
    sd: &'static Softdevice,
    commands: Receiver<'static, CriticalSectionRawMutex, RadioCommand, COMMAND_DEPTH>,
) -> ! {
    task::radio_task(sd, None, commands, EVENTS.sender()).await
}

#[embassy_executor::task]
async fn link_task(
    mut manager: CentralManager,
    events: Receiver<'static, CriticalSectionRawMutex, LinkEvent, EVENT_DEPTH>,
) -> ! {
    let mut restart_at: Option<u64> = None;
    if let Err(e) = manager.start() {
        warn!("Initial discovery failed: {:?}", e);
    }

    loop {
        let now = now_ms();
        if manager.needs_restart() && restart_at.is_none() {
            restart_at = Some(now + config::DISCOVERY_RESTART_BACKOFF_MS);
        }
        let wake = [manager.next_poll_deadline(), restart_at]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(now + IDLE_WAKE_MS);

        match select(events.receive(), Timer::at(Instant::from_millis(wake))).await {
            Either::First(event) => manager.handle_event(event, now_ms()),
            Either::Second(()) => {
                let now = now_ms();
                if restart_at.is_some_and(|at| now >= at) {
                    restart_at = None;
                    if let Err(e) = manager.start() {
                        warn!("Discovery restart failed: {:?}", e);
                    }
                }
                manager.radio_mut().set_clock(now);
                if let Some((sample, action)) = manager.poll(now) {
                    log_sample(&sample, &action);
                }
            }
        }

        // Zone and power reports produced by the emulation during the poll.
        while let Some(event) = manager.radio_mut().pop_event() {
            manager.handle_event(event, now_ms());
        }
    }
}

fn log_sample(sample: &linkguard::power::TelemetrySample, action: &PowerAction) {
    match action {
        PowerAction::Adjust { step_db, local_dbm } => info!(
            "RSSI {} dBm, Tx {} dBm: step {} dB -> {} dBm",
            sample.rssi_dbm, sample.tx_power_dbm, step_db, local_dbm
        ),
        _ => info!("RSSI {} dBm, Tx {} dBm", sample.rssi_dbm, sample.tx_power_dbm),
    }
}

fn now_ms() -> u64 {
    Instant::now().as_millis()
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("linkguard central starting");

    // The SoftDevice reserves interrupt priorities 0, 1 and 4.
    let mut nrf_config = embassy_nrf::config::Config::default();
    nrf_config.gpiote_interrupt_priority = Priority::P2;
    nrf_config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(nrf_config);

    // DK LED1..LED3, off (active-low).
    let leds = LedZoneOutputs::new(
        Output::new(p.P0_13, Level::High, OutputDrive::Standard),
        Output::new(p.P0_14, Level::High, OutputDrive::Standard),
        Output::new(p.P0_15, Level::High, OutputDrive::Standard),
    );

    let sd: &'static Softdevice = softdevice::enable();
    unwrap!(spawner.spawn(softdevice::softdevice_task(sd)));

    let radio = EmulatedRadio::new(SoftdeviceRadio::new(COMMANDS.sender()));
    let manager = LinkManager::new(
        radio,
        PowerControl::for_mode(config::POWER_CONTROL_MODE),
        leds,
        LinkSettings::central(),
    );
    info!("Power control: {:?}", manager.strategy().mode());

    unwrap!(spawner.spawn(radio_task(sd, COMMANDS.receiver())));
    unwrap!(spawner.spawn(link_task(manager, EVENTS.receiver())));
}
