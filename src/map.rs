use crate::common::{cell_db, delay_bin_to_km, Real, Storable};

use ndarray::{Array2, ArrayView1};
use num::complex::Complex64;
use num::Zero;
use serde::Serialize;

pub type CpxMatrix = Array2<Complex64>;
pub type RealMatrix = Array2<Real>;

/// Range-Doppler grid: rows are Doppler bins, columns are delay bins.
///
/// The axes are fixed when the map is built and never resized.
#[derive(Debug, Clone)]
pub struct Map<T> {
    pub data: Array2<T>,
    delay: Vec<i32>,
    doppler: Vec<Real>,
    pub noise_power: Real,
    pub max_power: Real,
}

impl<T: Clone + Zero> Map<T> {
    pub fn new(delay: Vec<i32>, doppler: Vec<Real>) -> Self {
        Self {
            data: Array2::zeros((doppler.len(), delay.len())),
            delay,
            doppler,
            noise_power: 0.0,
            max_power: 0.0,
        }
    }
}

impl<T> Map<T> {
    pub fn n_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn delay(&self) -> &[i32] {
        &self.delay
    }

    pub fn doppler(&self) -> &[Real] {
        &self.doppler
    }

    pub fn row(&self, i: usize) -> ArrayView1<'_, T> {
        self.data.row(i)
    }

    pub fn col(&self, j: usize) -> ArrayView1<'_, T> {
        self.data.column(j)
    }

    /// Doppler bin spacing in Hz, zero for a single-row map.
    pub fn doppler_resolution(&self) -> Real {
        match self.doppler.as_slice() {
            [first, second, ..] => second - first,
            _ => 0.0,
        }
    }

    /// Row whose Doppler is nearest `hz`, if `hz` lies within half a bin
    /// of the axis.
    pub fn doppler_hz_to_bin(&self, hz: Real) -> Option<usize> {
        let (row, distance) = self
            .doppler
            .iter()
            .map(|f| (f - hz).abs())
            .enumerate()
            .min_by(|(_, a), (_, b)| a.total_cmp(b))?;
        let tolerance = match self.doppler_resolution() {
            res if res > 0.0 => res / 2.0,
            _ => Real::EPSILON,
        };
        if distance <= tolerance {
            Some(row)
        } else {
            None
        }
    }

    /// Column of an integer delay bin.
    pub fn delay_to_col(&self, delay: i32) -> Option<usize> {
        let first = *self.delay.first()?;
        let col = usize::try_from(delay - first).ok()?;
        if col < self.delay.len() {
            Some(col)
        } else {
            None
        }
    }
}

impl Map<Complex64> {
    /// Mean cell level (noise floor) and peak level above it.
    pub fn set_metrics(&mut self) {
        let n = self.data.len().max(1) as Real;
        let (sum, max) = self
            .data
            .iter()
            .map(|&z| cell_db(z))
            .fold((0.0, Real::NEG_INFINITY), |(sum, max), db| {
                (sum + db, max.max(db))
            });
        self.noise_power = sum / n;
        self.max_power = max - self.noise_power;
    }

    /// Level of a cell relative to the noise floor.
    #[inline]
    pub fn snr_db(&self, row: usize, col: usize) -> Real {
        cell_db(self.data[[row, col]]) - self.noise_power
    }

    pub fn to_db(&self) -> Map<Real> {
        Map {
            data: self.data.mapv(cell_db),
            delay: self.delay.clone(),
            doppler: self.doppler.clone(),
            noise_power: self.noise_power,
            max_power: self.max_power,
        }
    }

    pub fn to_frame(&self, timestamp: u64) -> MapFrame {
        MapFrame {
            timestamp,
            n_rows: self.n_rows(),
            n_cols: self.n_cols(),
            noise_power: self.noise_power,
            max_power: self.max_power,
            delay: self.delay.iter().map(|&d| d as Real).collect(),
            doppler: self.doppler.clone(),
            data: self
                .data
                .rows()
                .into_iter()
                .map(|row| row.iter().map(|&z| cell_db(z) - self.noise_power).collect())
                .collect(),
        }
    }
}

/// Serialisable snapshot of a map, cells in dB above the noise floor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapFrame {
    pub timestamp: u64,
    pub n_rows: usize,
    pub n_cols: usize,
    pub noise_power: Real,
    pub max_power: Real,
    pub delay: Vec<Real>,
    pub doppler: Vec<Real>,
    pub data: Vec<Vec<Real>>,
}

impl MapFrame {
    pub fn in_km(mut self, sample_rate: Real) -> Self {
        self.delay
            .iter_mut()
            .for_each(|d| *d = delay_bin_to_km(*d, sample_rate));
        self
    }
}

impl Storable for MapFrame {}
