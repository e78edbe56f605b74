use crate::common::Real;
use crate::detection::{Detection, Plot};
use crate::error::{config_error, Result};
use crate::track::{State, Track};

use log::{debug, warn};

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Promotion needs `m` confirmed states ...
    pub m: usize,
    /// ... among the last `n`.
    pub n: usize,
    /// Missed updates before a track is deleted.
    pub n_delete: u64,
    /// Realised CPI (s).
    pub cpi: Real,
    /// Largest acceleration hypothesis at initiation (Hz/s).
    pub max_acc_init: Real,
    /// Range per delay bin (m).
    pub range_res: Real,
    /// Carrier wavelength (m).
    pub wavelength: Real,
    /// Upper bound on the store size during initiation.
    pub max_tracks: Option<usize>,
}

/// M-of-N bistatic tracker with a constant acceleration motion model.
///
/// Update runs before initiate so that detections already explaining an
/// existing track do not spawn duplicates.
#[derive(Debug, Clone)]
pub struct Tracker {
    config: TrackerConfig,
    acc_init: Vec<Real>,
    timestamp: u64,
    track: Track,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        if config.n == 0 || config.m == 0 || config.m > config.n {
            return config_error(format!(
                "tracker needs 0 < M <= N, got M = {}, N = {}",
                config.m, config.n
            ));
        }
        if !(config.cpi > 0.0) || !(config.range_res > 0.0) || !(config.wavelength > 0.0) {
            return config_error("tracker cpi, range resolution and wavelength must be positive");
        }
        if !(config.max_acc_init >= 0.0) {
            return config_error("tracker maximum initiation acceleration must not be negative");
        }

        let resolution = 1.0 / (config.cpi * config.cpi);
        let n_acc = (config.max_acc_init / resolution).floor() as i64;
        let acc_init = (-n_acc..=n_acc).map(|i| resolution * i as Real).collect();

        Ok(Self {
            config,
            acc_init,
            timestamp: 0,
            track: Track::new(),
        })
    }

    /// Acceleration hypotheses spawned per unassociated detection.
    pub fn acceleration_hypotheses(&self) -> &[Real] {
        &self.acc_init
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    /// Position after `t` seconds under constant acceleration.
    pub fn predict(&self, current: Plot, acc: Real, t: Real) -> Plot {
        let cfg = &self.config;
        let delay = current.delay
            + (current.doppler * t * cfg.wavelength + 0.5 * acc * t * t) / cfg.range_res;
        let doppler = current.doppler + acc * t;
        Plot::new(delay, doppler, 0.0)
    }

    /// Run one cycle with the detections of the interval at `timestamp` (ms).
    pub fn process(&mut self, detection: &Detection, timestamp: u64) -> Result<&Track> {
        let mut used = vec![false; detection.len()];
        if self.track.is_empty() {
            self.timestamp = timestamp;
        } else {
            self.update(detection, timestamp, &mut used)?;
        }
        self.initiate(detection, &used)?;
        Ok(&self.track)
    }

    /// Index of the gated detection nearest to `prediction`.
    fn associate(&self, prediction: &Plot, detection: &Detection) -> Option<usize> {
        let doppler_gate = 1.0 / self.config.cpi;
        detection
            .iter()
            .enumerate()
            .filter_map(|(j, plot)| {
                let dd = (plot.delay - prediction.delay).abs();
                let df = (plot.doppler - prediction.doppler).abs() / doppler_gate;
                if dd < 1.0 && df < 1.0 {
                    Some((j, dd * dd + df * df))
                } else {
                    None
                }
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(j, _)| j)
    }

    fn update(&mut self, detection: &Detection, current: u64, used: &mut [bool]) -> Result<()> {
        let t = current.saturating_sub(self.timestamp) as Real / 1000.0;
        self.timestamp = current;
        let (m, n) = (self.config.m, self.config.n);

        let mut expired = vec![false; self.track.len()];
        for i in 0..self.track.len() {
            let last = self.track.current(i)?;
            let acc = self.track.acceleration(i)?;
            let prediction = self.predict(last, acc, t);

            if let Some((j, associated)) = self
                .associate(&prediction, detection)
                .and_then(|j| detection.get(j).map(|plot| (j, plot)))
            {
                self.track.set_current(i, associated)?;
                if t > 0.0 {
                    self.track
                        .set_acceleration(i, (associated.doppler - last.doppler) / t)?;
                }
                self.track.set_n_inactive(i, 0)?;
                self.track.set_state(i, State::Associated)?;
                self.track.promote(i, m, n)?;
                used[j] = true;
                continue;
            }

            // dead reckoning
            self.track.set_current(i, prediction)?;
            let demoted = match self.track.state(i)? {
                State::Active => State::Coasting,
                State::Associated => State::Tentative,
                other => other,
            };
            self.track.set_state(i, demoted)?;
            let n_inactive = self.track.n_inactive(i)? + 1;
            self.track.set_n_inactive(i, n_inactive)?;
            expired[i] = n_inactive > self.config.n_delete;
        }

        let removed = self.track.remove_marked(&expired)?;
        if removed > 0 {
            debug!("deleted {} inactive tracks", removed);
        }
        Ok(())
    }

    fn initiate(&mut self, detection: &Detection, used: &[bool]) -> Result<()> {
        let mut capped = false;
        let unused = detection.iter().zip(used).filter(|(_, u)| !**u);
        for (plot, _) in unused {
            for &acc in &self.acc_init {
                if let Some(max) = self.config.max_tracks {
                    if self.track.len() >= max {
                        capped = true;
                        break;
                    }
                }
                let i = self.track.add(plot);
                self.track.set_acceleration(i, acc)?;
            }
        }
        if capped {
            warn!(
                "track store full at {} tracks, initiation skipped",
                self.track.len()
            );
        }
        Ok(())
    }
}
