use crate::common::Real;
use crate::detection::{Detection, Plot};
use crate::error::{config_error, Result};
use crate::map::Map;

use ndarray::Array1;
use num::complex::Complex64;

#[derive(Debug, Clone)]
pub struct CfarConfig {
    /// Probability of false alarm in (0, 1).
    pub pfa: Real,
    /// Single sided guard cells.
    pub n_guard: usize,
    /// Single sided training cells.
    pub n_train: usize,
    /// Smallest delay bin to report.
    pub min_delay: i32,
    /// Smallest absolute Doppler (Hz) to report.
    pub min_doppler: Real,
}

/// Cell averaging CFAR across delay, one Doppler row at a time.
#[derive(Debug, Clone)]
pub struct CfarDetector1D {
    config: CfarConfig,
}

/// Mean of the training cells around `cell`, skipping guard cells and
/// bins off the row, together with the number of cells averaged.
fn training_noise(
    power: &Array1<Real>,
    cell: usize,
    n_guard: usize,
    n_train: usize,
) -> Option<(Real, usize)> {
    let n = power.len();
    let early_end = cell.saturating_sub(n_guard);
    let early_start = cell.saturating_sub(n_guard + n_train);
    let late_start = (cell + n_guard + 1).min(n);
    let late_end = (cell + n_guard + n_train + 1).min(n);

    let cells = (early_start..early_end).chain(late_start..late_end);
    let (sum, count) = cells.fold((0.0, 0), |(sum, count), k| (sum + power[k], count + 1));
    if count == 0 {
        None
    } else {
        Some((sum / count as Real, count))
    }
}

/// Threshold multiplier giving `pfa` for `n_cells` exponential training cells.
#[inline]
pub fn threshold_factor(pfa: Real, n_cells: usize) -> Real {
    let n = n_cells as Real;
    n * (pfa.powf(-1.0 / n) - 1.0)
}

impl CfarDetector1D {
    pub fn new(config: CfarConfig) -> Result<Self> {
        if !(config.pfa > 0.0 && config.pfa < 1.0) {
            return config_error(format!("cfar pfa {} outside (0, 1)", config.pfa));
        }
        if config.n_train == 0 {
            return config_error("cfar needs at least one training cell");
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &CfarConfig {
        &self.config
    }

    fn detect_row(&self, map: &Map<Complex64>, row: usize, out: &mut Vec<Plot>) {
        let cfg = &self.config;
        let doppler = map.doppler()[row];
        let power: Array1<Real> = map.row(row).map(|z| z.norm_sqr());

        for (col, &delay) in map.delay().iter().enumerate() {
            if delay < cfg.min_delay {
                continue;
            }
            if let Some((noise, n_cells)) =
                training_noise(&power, col, cfg.n_guard, cfg.n_train)
            {
                if power[col] > threshold_factor(cfg.pfa, n_cells) * noise {
                    let snr = map.snr_db(row, col);
                    out.push(Plot::new(delay as Real, doppler, snr));
                }
            }
        }
    }

    /// Detections over the map, delay in bins, Doppler in Hz, SNR in dB
    /// above the map noise floor.
    pub fn process(&self, map: &Map<Complex64>) -> Detection {
        let mut plots = Vec::new();
        for (i, &doppler) in map.doppler().iter().enumerate() {
            if doppler.abs() < self.config.min_doppler {
                continue;
            }
            self.detect_row(map, i, &mut plots);
        }
        plots.into_iter().collect()
    }
}
