//! Path-loss zone classification.
//!
//! The radio reports zone changes with hysteresis and dwell already applied,
//! so the classifier only maps the raw zone index to a [`PathLossZone`] and
//! drives three mutually exclusive outputs.  No zone is known (and no output
//! is active) until the first report after reporting was enabled, and again
//! after [`ZoneClassifier::reset`].

use crate::error::{Error, Feature};
use crate::radio::{ConnHandle, PathLossParams, RadioLink};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PathLossZone {
    /// Low path loss.
    Near,
    Mid,
    /// High path loss.
    Far,
}

impl PathLossZone {
    /// Map a raw zone index (0 = low, 1 = medium, 2 = high path loss).
    pub fn from_raw(zone: u8) -> Option<Self> {
        match zone {
            0 => Some(PathLossZone::Near),
            1 => Some(PathLossZone::Mid),
            2 => Some(PathLossZone::Far),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u8 {
        match self {
            PathLossZone::Near => 0,
            PathLossZone::Mid => 1,
            PathLossZone::Far => 2,
        }
    }
}

/// Levels of the three zone outputs (`true` = active).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ZoneSignals {
    pub near: bool,
    pub mid: bool,
    pub far: bool,
}

impl ZoneSignals {
    pub const NONE: Self = Self {
        near: false,
        mid: false,
        far: false,
    };

    pub fn for_zone(zone: PathLossZone) -> Self {
        Self {
            near: zone == PathLossZone::Near,
            mid: zone == PathLossZone::Mid,
            far: zone == PathLossZone::Far,
        }
    }

    pub fn active_count(&self) -> usize {
        [self.near, self.mid, self.far].iter().filter(|s| **s).count()
    }
}

/// Sink for the zone signals (LEDs on hardware).
pub trait ZoneOutputs {
    fn drive(&mut self, signals: ZoneSignals);
}

/// Outputs that go nowhere (peripheral image, tests).
#[derive(Debug, Default)]
pub struct NoOutputs;

impl ZoneOutputs for NoOutputs {
    fn drive(&mut self, _signals: ZoneSignals) {}
}

#[derive(Debug)]
pub struct ZoneClassifier<O: ZoneOutputs> {
    outputs: O,
    zone: Option<PathLossZone>,
    armed: bool,
}

impl<O: ZoneOutputs> ZoneClassifier<O> {
    /// Outputs are driven inactive immediately.
    pub fn new(mut outputs: O) -> Self {
        outputs.drive(ZoneSignals::NONE);
        Self {
            outputs,
            zone: None,
            armed: false,
        }
    }

    /// Configure the reporting parameters, then enable reporting.
    ///
    /// Reports are accepted only after both steps succeeded.
    pub fn configure<R: RadioLink>(
        &mut self,
        radio: &mut R,
        handle: ConnHandle,
        params: &PathLossParams,
    ) -> Result<(), Error> {
        self.reset();
        radio
            .configure_path_loss_reporting(handle, params)
            .map_err(|e| Error::Configuration(Feature::PathLossReporting, e))?;
        radio
            .enable_path_loss_reporting(handle, true)
            .map_err(|e| Error::Configuration(Feature::PathLossReporting, e))?;
        self.armed = true;
        info!(
            "Path loss reporting on: high {}/{} dB, low {}/{} dB, dwell {}",
            params.high_threshold,
            params.high_hysteresis,
            params.low_threshold,
            params.low_hysteresis,
            params.min_dwell
        );
        Ok(())
    }

    /// Apply a zone report.  Returns the new zone, or `None` if ignored.
    pub fn on_threshold_report(&mut self, raw_zone: u8) -> Option<PathLossZone> {
        if !self.armed {
            debug!("Path loss report (zone {}) before reporting was enabled", raw_zone);
            return None;
        }
        let Some(zone) = PathLossZone::from_raw(raw_zone) else {
            warn!("Ignoring unknown path loss zone {}", raw_zone);
            return None;
        };
        self.zone = Some(zone);
        self.outputs.drive(ZoneSignals::for_zone(zone));
        info!("Path loss zone: {:?}", zone);
        Some(zone)
    }

    /// Forget the zone and drive every output inactive.
    pub fn reset(&mut self) {
        self.zone = None;
        self.armed = false;
        self.outputs.drive(ZoneSignals::NONE);
    }

    pub fn zone(&self) -> Option<PathLossZone> {
        self.zone
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn signals(&self) -> ZoneSignals {
        match self.zone {
            Some(zone) => ZoneSignals::for_zone(zone),
            None => ZoneSignals::NONE,
        }
    }

    pub fn outputs(&self) -> &O {
        &self.outputs
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RadioError;
    use crate::radio::mock::{MockRadio, RadioCall};

    const H: ConnHandle = ConnHandle(2);

    /// Remembers the last signals driven.
    #[derive(Debug, Default)]
    struct Latch {
        last: Option<ZoneSignals>,
        writes: usize,
    }

    impl ZoneOutputs for Latch {
        fn drive(&mut self, signals: ZoneSignals) {
            self.last = Some(signals);
            self.writes += 1;
        }
    }

    fn armed() -> (MockRadio, ZoneClassifier<Latch>) {
        let mut radio = MockRadio::new();
        let mut zones = ZoneClassifier::new(Latch::default());
        zones
            .configure(&mut radio, H, &PathLossParams::default_zones())
            .unwrap();
        (radio, zones)
    }

    #[test]
    fn outputs_start_inactive() {
        let zones = ZoneClassifier::new(Latch::default());
        assert_eq!(zones.outputs().last, Some(ZoneSignals::NONE));
        assert_eq!(zones.zone(), None);
    }

    #[test]
    fn configure_precedes_enable() {
        let (radio, zones) = armed();
        assert_eq!(
            radio.calls(),
            &[
                RadioCall::ConfigurePathLoss(PathLossParams::default_zones()),
                RadioCall::EnablePathLoss(true),
            ]
        );
        assert!(zones.is_armed());
    }

    #[test]
    fn each_zone_drives_exactly_one_output() {
        let (_radio, mut zones) = armed();
        for (raw, zone) in [
            (0, PathLossZone::Near),
            (1, PathLossZone::Mid),
            (2, PathLossZone::Far),
            (1, PathLossZone::Mid),
        ] {
            assert_eq!(zones.on_threshold_report(raw), Some(zone));
            let driven = zones.outputs().last.unwrap();
            assert_eq!(driven.active_count(), 1);
            assert_eq!(driven, ZoneSignals::for_zone(zone));
        }
    }

    #[test]
    fn far_zone_then_reset_clears_outputs() {
        let (_radio, mut zones) = armed();
        zones.on_threshold_report(2);
        assert_eq!(
            zones.signals(),
            ZoneSignals {
                near: false,
                mid: false,
                far: true
            }
        );
        zones.reset();
        assert_eq!(zones.outputs().last, Some(ZoneSignals::NONE));
        assert_eq!(zones.signals().active_count(), 0);
        assert!(!zones.is_armed());
    }

    #[test]
    fn unknown_zone_keeps_previous_output() {
        let (_radio, mut zones) = armed();
        zones.on_threshold_report(0);
        let writes = zones.outputs().writes;
        assert_eq!(zones.on_threshold_report(3), None);
        assert_eq!(zones.on_threshold_report(0xFF), None);
        assert_eq!(zones.zone(), Some(PathLossZone::Near));
        assert_eq!(zones.outputs().writes, writes);
    }

    #[test]
    fn reports_before_configuration_are_ignored() {
        let mut zones = ZoneClassifier::new(Latch::default());
        assert_eq!(zones.on_threshold_report(1), None);
        assert_eq!(zones.signals(), ZoneSignals::NONE);
    }

    #[test]
    fn configure_failure_leaves_classifier_disarmed() {
        let mut radio = MockRadio::new();
        radio.path_loss_error = Some(RadioError::Unsupported);
        let mut zones = ZoneClassifier::new(Latch::default());
        assert_eq!(
            zones.configure(&mut radio, H, &PathLossParams::default_zones()),
            Err(Error::Configuration(
                Feature::PathLossReporting,
                RadioError::Unsupported
            ))
        );
        // Enabling is never attempted after a failed configure.
        assert_eq!(radio.count(|c| matches!(c, RadioCall::EnablePathLoss(_))), 0);
        assert_eq!(zones.on_threshold_report(2), None);
    }

    #[test]
    fn raw_mapping_round_trips() {
        for raw in 0..3u8 {
            assert_eq!(PathLossZone::from_raw(raw).map(PathLossZone::as_raw), Some(raw));
        }
        assert_eq!(PathLossZone::from_raw(3), None);
    }
}
