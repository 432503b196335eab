//! Path-loss zone tracking with hysteresis and dwell.
//!
//! Zones: 0 = low, 1 = medium, 2 = high path loss.  Leaving a zone needs the
//! path loss to cross the border by the hysteresis; the new zone is only
//! reported once it held for `min_dwell` consecutive samples.  The first
//! sample after a reset reports its zone straight away.

use crate::radio::PathLossParams;

/// Zone change ready to be reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ZoneReport {
    pub zone: u8,
    /// Path loss of the sample that completed the dwell (dB, saturated).
    pub path_loss: u8,
}

#[derive(Debug)]
pub struct PathLossMonitor {
    params: PathLossParams,
    zone: Option<u8>,
    /// Candidate zone and how many samples it has held.
    candidate: Option<(u8, u16)>,
}

impl PathLossMonitor {
    pub fn new(params: PathLossParams) -> Self {
        Self {
            params,
            zone: None,
            candidate: None,
        }
    }

    pub fn params(&self) -> &PathLossParams {
        &self.params
    }

    pub fn zone(&self) -> Option<u8> {
        self.zone
    }

    pub fn reset(&mut self) {
        self.zone = None;
        self.candidate = None;
    }

    /// Feed one path loss estimate (dB).
    pub fn feed(&mut self, path_loss_db: i16) -> Option<ZoneReport> {
        let next = self.classify(path_loss_db);
        let report = ZoneReport {
            zone: next,
            path_loss: path_loss_db.clamp(0, u8::MAX as i16) as u8,
        };

        if self.zone.is_none() {
            self.zone = Some(next);
            return Some(report);
        }
        if self.zone == Some(next) {
            self.candidate = None;
            return None;
        }

        let held = match self.candidate {
            Some((zone, count)) if zone == next => count.saturating_add(1),
            _ => 1,
        };
        if held >= self.params.min_dwell.max(1) {
            self.zone = Some(next);
            self.candidate = None;
            Some(report)
        } else {
            self.candidate = Some((next, held));
            None
        }
    }

    fn classify(&self, pl: i16) -> u8 {
        let p = &self.params;
        let high = p.high_threshold as i16;
        let low = p.low_threshold as i16;
        let high_enter = high + p.high_hysteresis as i16;
        let high_exit = high - p.high_hysteresis as i16;
        let low_enter = low - p.low_hysteresis as i16;
        let low_exit = low + p.low_hysteresis as i16;

        match self.zone {
            None => {
                if pl >= high {
                    2
                } else if pl < low {
                    0
                } else {
                    1
                }
            }
            Some(2) => {
                if pl >= high_exit {
                    2
                } else if pl < low_enter {
                    0
                } else {
                    1
                }
            }
            Some(0) => {
                if pl <= low_exit {
                    0
                } else if pl > high_enter {
                    2
                } else {
                    1
                }
            }
            Some(_) => {
                if pl > high_enter {
                    2
                } else if pl < low_enter {
                    0
                } else {
                    1
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(min_dwell: u16) -> PathLossMonitor {
        PathLossMonitor::new(PathLossParams {
            min_dwell,
            ..PathLossParams::default_zones()
        })
    }

    fn feed_n(m: &mut PathLossMonitor, pl: i16, n: usize) -> Option<ZoneReport> {
        let mut last = None;
        for _ in 0..n {
            if let Some(r) = m.feed(pl) {
                last = Some(r);
            }
        }
        last
    }

    #[test]
    fn first_sample_reports_immediately() {
        let mut m = monitor(5);
        assert_eq!(m.feed(50), Some(ZoneReport { zone: 1, path_loss: 50 }));
        assert_eq!(m.feed(50), None);
    }

    #[test]
    fn change_waits_for_dwell() {
        let mut m = monitor(5);
        m.feed(50);
        assert_eq!(feed_n(&mut m, 70, 4), None);
        assert_eq!(m.feed(70), Some(ZoneReport { zone: 2, path_loss: 70 }));
        assert_eq!(m.zone(), Some(2));
    }

    #[test]
    fn interrupted_candidate_starts_over() {
        let mut m = monitor(3);
        m.feed(50);
        m.feed(70);
        m.feed(70);
        m.feed(50);
        assert_eq!(m.feed(70), None);
        assert_eq!(m.feed(70), None);
        assert_eq!(m.feed(70).map(|r| r.zone), Some(2));
    }

    #[test]
    fn hysteresis_holds_high_zone() {
        let mut m = monitor(1);
        m.feed(80);
        // Below the border but inside the hysteresis.
        assert_eq!(m.feed(56), None);
        assert_eq!(m.feed(54).map(|r| r.zone), Some(1));
    }

    #[test]
    fn entering_high_needs_border_plus_hysteresis() {
        let mut m = monitor(1);
        m.feed(50);
        assert_eq!(m.feed(64), None);
        assert_eq!(m.feed(66).map(|r| r.zone), Some(2));
    }

    #[test]
    fn low_zone_edges() {
        let mut m = monitor(1);
        m.feed(50);
        assert_eq!(m.feed(36), None);
        assert_eq!(m.feed(34).map(|r| r.zone), Some(0));
        assert_eq!(m.feed(44), None);
        assert_eq!(m.feed(46).map(|r| r.zone), Some(1));
    }

    #[test]
    fn path_loss_saturates() {
        let mut m = monitor(1);
        assert_eq!(m.feed(-3).map(|r| r.path_loss), Some(0));
        m.reset();
        assert_eq!(m.feed(400).map(|r| r.path_loss), Some(255));
    }

    #[test]
    fn reset_forgets_zone() {
        let mut m = monitor(5);
        m.feed(80);
        m.reset();
        assert_eq!(m.zone(), None);
        assert_eq!(m.feed(20).map(|r| r.zone), Some(0));
    }
}
