//! Zone indicator LEDs.
//!
//! nRF52840-DK LEDs are active-low: driving the pin low lights the LED.
//! LED1 shows low path loss, LED2 medium, LED3 high.

use embedded_hal::digital::OutputPin;

use crate::zone::{ZoneOutputs, ZoneSignals};

pub struct LedZoneOutputs<P: OutputPin> {
    near: P,
    mid: P,
    far: P,
}

impl<P: OutputPin> LedZoneOutputs<P> {
    pub fn new(near: P, mid: P, far: P) -> Self {
        Self { near, mid, far }
    }
}

fn set<P: OutputPin>(pin: &mut P, on: bool) {
    // GPIO writes on the nRF are infallible.
    let _ = if on { pin.set_low() } else { pin.set_high() };
}

impl<P: OutputPin> ZoneOutputs for LedZoneOutputs<P> {
    fn drive(&mut self, signals: ZoneSignals) {
        set(&mut self.near, signals.near);
        set(&mut self.mid, signals.mid);
        set(&mut self.far, signals.far);
    }
}
