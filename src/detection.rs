use crate::common::{delay_bin_to_km, Real, Storable};
use crate::error::{Error, Result};

use serde::{Deserialize, Serialize};

use std::iter::FromIterator;

/// A single point detection: delay in bins, Doppler in Hz, SNR in dB.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plot {
    pub delay: Real,
    pub doppler: Real,
    pub snr: Real,
}

impl Plot {
    pub fn new(delay: Real, doppler: Real, snr: Real) -> Self {
        Self {
            delay,
            doppler,
            snr,
        }
    }
}

/// Detections of one interval stored as parallel arrays of equal length.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Detection {
    delay: Vec<Real>,
    doppler: Vec<Real>,
    snr: Vec<Real>,
}

impl Detection {
    pub fn new(delay: Vec<Real>, doppler: Vec<Real>, snr: Vec<Real>) -> Result<Self> {
        if delay.len() != doppler.len() || delay.len() != snr.len() {
            return Err(Error::LengthMismatch {
                delay: delay.len(),
                doppler: doppler.len(),
                snr: snr.len(),
            });
        }
        Ok(Self {
            delay,
            doppler,
            snr,
        })
    }

    pub fn single(plot: Plot) -> Self {
        Self {
            delay: vec![plot.delay],
            doppler: vec![plot.doppler],
            snr: vec![plot.snr],
        }
    }

    pub fn len(&self) -> usize {
        self.delay.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delay.is_empty()
    }

    pub fn delay(&self) -> &[Real] {
        &self.delay
    }

    pub fn doppler(&self) -> &[Real] {
        &self.doppler
    }

    pub fn snr(&self) -> &[Real] {
        &self.snr
    }

    pub fn get(&self, i: usize) -> Option<Plot> {
        Some(Plot::new(
            *self.delay.get(i)?,
            *self.doppler.get(i)?,
            *self.snr.get(i)?,
        ))
    }

    pub fn iter(&self) -> impl Iterator<Item = Plot> + '_ {
        self.delay
            .iter()
            .zip(&self.doppler)
            .zip(&self.snr)
            .map(|((&delay, &doppler), &snr)| Plot::new(delay, doppler, snr))
    }

    pub fn to_frame(&self, timestamp: u64) -> DetectionFrame {
        DetectionFrame {
            timestamp,
            delay: self.delay.clone(),
            doppler: self.doppler.clone(),
            snr: self.snr.clone(),
        }
    }
}

impl FromIterator<Plot> for Detection {
    fn from_iter<I: IntoIterator<Item = Plot>>(iter: I) -> Self {
        let mut detection = Detection::default();
        for plot in iter {
            detection.delay.push(plot.delay);
            detection.doppler.push(plot.doppler);
            detection.snr.push(plot.snr);
        }
        detection
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionFrame {
    pub timestamp: u64,
    pub delay: Vec<Real>,
    pub doppler: Vec<Real>,
    pub snr: Vec<Real>,
}

impl DetectionFrame {
    pub fn in_km(mut self, sample_rate: Real) -> Self {
        self.delay
            .iter_mut()
            .for_each(|d| *d = delay_bin_to_km(*d, sample_rate));
        self
    }
}

impl Storable for DetectionFrame {}
