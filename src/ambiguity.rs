use crate::buffer::IqData;
use crate::common::Real;
use crate::error::{config_error, Error, Result};
use crate::hamming::next_hamming;
use crate::map::Map;

use log::{debug, info};
use num::complex::Complex64;
use num::traits::FloatConst;
use num::Zero;
use rustfft::{Fft, FftPlanner};

use std::sync::Arc;
use std::time::Instant;

/// Batched cross-ambiguity processor.
///
/// Each interval is split into `n_doppler_bins` pulses of `n_corr` samples.
/// Every pulse is range compressed by FFT correlation of surveillance
/// against reference, then an FFT across pulses for every delay bin gives
/// Doppler. FFT plans and working buffers are sized once and reused.
pub struct Ambiguity {
    delay_min: i32,
    delay_max: i32,
    fs: Real,
    doppler_middle: Real,
    n_delay_bins: usize,
    n_doppler_bins: usize,
    n_corr: usize,
    nfft: usize,
    cpi: Real,

    fft_forward: Arc<dyn Fft<Real>>,
    fft_inverse: Arc<dyn Fft<Real>>,
    fft_doppler: Arc<dyn Fft<Real>>,
    data_x: Vec<Complex64>,
    data_y: Vec<Complex64>,
    data_doppler: Vec<Complex64>,
    scratch: Vec<Complex64>,

    map: Map<Complex64>,
}

impl Ambiguity {
    /// `round_hamming` pads the correlation FFT up to a 2-3-5 smooth length.
    pub fn new(
        delay_min: i32,
        delay_max: i32,
        doppler_min: Real,
        doppler_max: Real,
        fs: Real,
        n: usize,
        round_hamming: bool,
    ) -> Result<Self> {
        if delay_min > delay_max {
            return config_error(format!(
                "ambiguity delayMin {} exceeds delayMax {}",
                delay_min, delay_max
            ));
        }
        if doppler_min > doppler_max {
            return config_error(format!(
                "ambiguity dopplerMin {} exceeds dopplerMax {}",
                doppler_min, doppler_max
            ));
        }
        if !(fs > 0.0) || n == 0 {
            return config_error("sample rate and samples per interval must be positive");
        }

        let n_delay_bins = (delay_max - delay_min + 1) as usize;

        // Nominal Doppler spacing, symmetric about the middle.
        let resolution = fs / n as Real;
        let doppler_middle = (doppler_min + doppler_max) / 2.0;
        let mut i = 1;
        while doppler_middle + i as Real * resolution <= doppler_max {
            i += 1;
        }
        let n_doppler_bins = 2 * (i - 1) + 1;

        let n_corr = n / n_doppler_bins;
        if n_corr == 0 {
            return config_error(format!(
                "{} samples cannot fill {} Doppler bins",
                n, n_doppler_bins
            ));
        }
        let max_lag = n_corr as i32 - 1;
        if delay_min < -max_lag || delay_max > max_lag {
            return config_error(format!(
                "delay window [{}, {}] exceeds correlation length {}",
                delay_min, delay_max, n_corr
            ));
        }

        // Axis on the realised CPI rather than the requested one.
        let cpi = (n_corr * n_doppler_bins) as Real / fs;
        let half = (n_doppler_bins / 2) as isize;
        let doppler: Vec<Real> = (0..n_doppler_bins as isize)
            .map(|k| doppler_middle + (k - half) as Real / cpi)
            .collect();
        let delay: Vec<i32> = (delay_min..=delay_max).collect();

        let nfft = if round_hamming {
            next_hamming(2 * n_corr - 1)
        } else {
            2 * n_corr - 1
        };

        let mut planner = FftPlanner::new();
        let fft_forward = planner.plan_fft_forward(nfft);
        let fft_inverse = planner.plan_fft_inverse(nfft);
        let fft_doppler = planner.plan_fft_forward(n_doppler_bins);
        let scratch_len = [&fft_forward, &fft_inverse, &fft_doppler]
            .iter()
            .map(|fft| fft.get_inplace_scratch_len())
            .max()
            .unwrap_or(0);

        info!(
            "ambiguity: {} delay bins, {} Doppler bins of {:.3} Hz, {} samples per pulse, nfft {}, cpi {:.4} s",
            n_delay_bins,
            n_doppler_bins,
            1.0 / cpi,
            n_corr,
            nfft,
            cpi
        );

        Ok(Self {
            delay_min,
            delay_max,
            fs,
            doppler_middle,
            n_delay_bins,
            n_doppler_bins,
            n_corr,
            nfft,
            cpi,
            fft_forward,
            fft_inverse,
            fft_doppler,
            data_x: vec![Complex64::zero(); nfft],
            data_y: vec![Complex64::zero(); nfft],
            data_doppler: vec![Complex64::zero(); n_doppler_bins],
            scratch: vec![Complex64::zero(); scratch_len],
            map: Map::new(delay, doppler),
        })
    }

    pub fn cpi_length_seconds(&self) -> Real {
        self.cpi
    }

    pub fn doppler_middle(&self) -> Real {
        self.doppler_middle
    }

    pub fn corr_samples_per_pulse(&self) -> usize {
        self.n_corr
    }

    pub fn delay_bin_count(&self) -> usize {
        self.n_delay_bins
    }

    pub fn doppler_bin_count(&self) -> usize {
        self.n_doppler_bins
    }

    pub fn fft_bin_count(&self) -> usize {
        self.nfft
    }

    /// Samples read from each channel per call.
    pub fn samples_consumed(&self) -> usize {
        self.n_corr * self.n_doppler_bins
    }

    pub fn delay_window(&self) -> (i32, i32) {
        (self.delay_min, self.delay_max)
    }

    pub fn map(&self) -> &Map<Complex64> {
        &self.map
    }

    /// Range-Doppler map of the oldest `samples_consumed()` samples of each
    /// channel. Consumed samples are popped, any excess is left in place.
    /// The returned map is overwritten by the next call.
    pub fn process(&mut self, x: &mut IqData, y: &mut IqData) -> Result<&Map<Complex64>> {
        let needed = self.samples_consumed();
        let available = x.len().min(y.len());
        if available < needed {
            return Err(Error::InsufficientSamples { needed, available });
        }
        let start = Instant::now();

        if self.doppler_middle != 0.0 {
            let w = 2.0 * Real::PI() * self.doppler_middle / self.fs;
            x.iter_mut()
                .enumerate()
                .for_each(|(i, s)| *s *= Complex64::from_polar(1.0, w * i as Real));
        }

        // range processing, one row per pulse
        let norm = self.nfft as Real;
        for pulse in 0..self.n_doppler_bins {
            for (dx, dy) in self.data_x.iter_mut().zip(self.data_y.iter_mut()) {
                *dx = Complex64::zero();
                *dy = Complex64::zero();
            }
            for (dx, s) in self.data_x.iter_mut().zip(x.drain_front(self.n_corr)) {
                *dx = s;
            }
            for (dy, s) in self.data_y.iter_mut().zip(y.drain_front(self.n_corr)) {
                *dy = s;
            }

            self.fft_forward
                .process_with_scratch(&mut self.data_x, &mut self.scratch);
            self.fft_forward
                .process_with_scratch(&mut self.data_y, &mut self.scratch);

            self.data_y
                .iter_mut()
                .zip(&self.data_x)
                .for_each(|(zy, zx)| *zy = *zy * zx.conj() / norm);

            self.fft_inverse
                .process_with_scratch(&mut self.data_y, &mut self.scratch);

            let nfft = self.nfft as i32;
            let data_y = &self.data_y;
            self.map
                .data
                .row_mut(pulse)
                .iter_mut()
                .zip(self.delay_min..=self.delay_max)
                .for_each(|(cell, lag)| *cell = data_y[lag.rem_euclid(nfft) as usize]);
        }

        // Doppler processing, fftshift so the middle row is doppler_middle
        let n = self.n_doppler_bins;
        let shift = n / 2 + 1;
        for col in 0..self.n_delay_bins {
            self.data_doppler
                .iter_mut()
                .zip(self.map.data.column(col))
                .for_each(|(d, &cell)| *d = cell);

            self.fft_doppler
                .process_with_scratch(&mut self.data_doppler, &mut self.scratch);

            let data_doppler = &self.data_doppler;
            self.map
                .data
                .column_mut(col)
                .iter_mut()
                .enumerate()
                .for_each(|(row, cell)| *cell = data_doppler[(row + shift) % n]);
        }

        self.map.set_metrics();
        debug!("ambiguity processed in {:?}", start.elapsed());

        Ok(&self.map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array1;
    use ndarray_rand::rand::rngs::StdRng;
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    const FS: Real = 2_000_000.0;
    const CPI: Real = 0.5;

    fn reference_geometry(round_hamming: bool) -> Ambiguity {
        let n = (CPI * FS) as usize;
        Ambiguity::new(-10, 300, -300.0, 300.0, FS, n, round_hamming).unwrap()
    }

    fn random_iq(n: usize, rng: &mut StdRng) -> IqData {
        let re = Array1::random_using(n, Uniform::new(-100.0, 100.0), rng);
        let im = Array1::random_using(n, Uniform::new(-100.0, 100.0), rng);
        let mut iq = IqData::new(n).unwrap();
        iq.extend(re.iter().zip(&im).map(|(&re, &im)| Complex64::new(re, im)));
        iq
    }

    #[test]
    fn constructor_geometry() {
        let ambiguity = reference_geometry(false);
        assert_abs_diff_eq!(ambiguity.cpi_length_seconds(), CPI, epsilon = 0.02);
        assert_eq!(ambiguity.doppler_middle(), 0.0);
        assert_eq!(ambiguity.corr_samples_per_pulse(), 3322);
        assert_eq!(ambiguity.delay_bin_count(), 311);
        assert_eq!(ambiguity.doppler_bin_count(), 301);
        assert_eq!(ambiguity.fft_bin_count(), 6643);
    }

    #[test]
    fn rounding_only_changes_fft_length() {
        let plain = reference_geometry(false);
        let rounded = reference_geometry(true);
        assert_eq!(rounded.fft_bin_count(), 6750);
        assert_eq!(
            rounded.corr_samples_per_pulse(),
            plain.corr_samples_per_pulse()
        );
        assert_eq!(rounded.delay_bin_count(), plain.delay_bin_count());
        assert_eq!(rounded.doppler_bin_count(), plain.doppler_bin_count());
        assert_eq!(rounded.cpi_length_seconds(), plain.cpi_length_seconds());
    }

    #[test]
    fn realised_cpi_within_one_doppler_bin() {
        for &(fs, cpi, doppler) in &[(2e6, 0.5, 300.0), (1e5, 0.1, 100.0), (48e3, 0.37, 55.0)] {
            let n = (fs * cpi) as usize;
            let ambiguity = Ambiguity::new(0, 20, -doppler, doppler, fs, n, false).unwrap();
            let bin_seconds = ambiguity.corr_samples_per_pulse() as Real / fs;
            let error = (ambiguity.cpi_length_seconds() - n as Real / fs).abs();
            assert!(error <= bin_seconds);
            assert_eq!(ambiguity.delay_bin_count(), 21);
        }
    }

    #[test]
    fn doppler_axis_is_centred() {
        let ambiguity = Ambiguity::new(0, 10, 100.0, 200.0, 1e5, 10_000, false).unwrap();
        let doppler = ambiguity.map().doppler();
        assert_eq!(ambiguity.doppler_middle(), 150.0);
        assert_eq!(doppler.len(), ambiguity.doppler_bin_count());
        assert_abs_diff_eq!(doppler[doppler.len() / 2], 150.0);
        assert!(doppler.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn invalid_windows_rejected() {
        assert!(matches!(
            Ambiguity::new(10, 5, -100.0, 100.0, 1e5, 10_000, false),
            Err(Error::Config(_))
        ));
        let reversed = Ambiguity::new(0, 5, 100.0, -100.0, 1e5, 10_000, false);
        assert!(reversed.is_err());
        let no_rate = Ambiguity::new(0, 5, -100.0, 100.0, 0.0, 10_000, false);
        assert!(no_rate.is_err());
        // 21 Doppler bins of 476 samples cannot reach delay 500
        let too_far = Ambiguity::new(0, 500, -100.0, 100.0, 1e5, 10_000, false);
        assert!(too_far.is_err());
    }

    #[test]
    fn insufficient_samples_rejected() {
        let mut ambiguity = Ambiguity::new(0, 5, -100.0, 100.0, 1e5, 10_000, false).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let mut x = random_iq(100, &mut rng);
        let mut y = random_iq(100, &mut rng);
        let result = ambiguity.process(&mut x, &mut y);
        assert!(matches!(result, Err(Error::InsufficientSamples { needed: 9996, .. })));
        assert_eq!(x.len(), 100);
    }

    #[test]
    fn process_random_noise() {
        let mut rng = StdRng::seed_from_u64(7);
        for &round in &[true, false] {
            let mut ambiguity = Ambiguity::new(-10, 60, -100.0, 100.0, 1e5, 10_000, round).unwrap();
            let mut x = random_iq(10_000, &mut rng);
            let mut y = random_iq(10_000, &mut rng);

            let map = ambiguity.process(&mut x, &mut y).unwrap();
            assert!(map.max_power >= 0.0);
            assert!(map.noise_power > 0.0 && map.noise_power < 100.0);

            // 21 x 476 samples consumed, the rest is left over
            assert_eq!(x.len(), 10_000 - 9996);
            assert_eq!(y.len(), 4);
        }
    }

    #[test]
    fn delayed_doppler_shifted_copy_peaks_at_its_cell() {
        let (fs, n) = (1e5, 10_000);
        let mut ambiguity = Ambiguity::new(-5, 40, -100.0, 100.0, fs, n, true).unwrap();
        let bin_hz = 1.0 / ambiguity.cpi_length_seconds();
        let (delay, doppler) = (17usize, 3.0 * bin_hz);

        let mut rng = StdRng::seed_from_u64(3);
        let x = random_iq(n, &mut rng);
        let reference = x.snapshot();
        let mut y = IqData::new(n).unwrap();
        y.extend((0..n).map(|i| {
            let echo = if i >= delay { reference[i - delay] } else { Complex64::zero() };
            echo * Complex64::from_polar(1.0, 2.0 * Real::PI() * doppler * i as Real / fs)
        }));

        let mut x = x;
        let map = ambiguity.process(&mut x, &mut y).unwrap();
        let (peak, _) = map
            .data
            .indexed_iter()
            .map(|(ix, z)| (ix, z.norm()))
            .fold(((0, 0), 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });

        assert_eq!(map.delay()[peak.1], delay as i32);
        assert_abs_diff_eq!(map.doppler()[peak.0], doppler, epsilon = 1e-6);
    }

    #[test]
    fn offset_window_rotates_reference() {
        let (fs, n) = (1e5, 10_000);
        let mut ambiguity = Ambiguity::new(0, 30, 200.0, 400.0, fs, n, false).unwrap();
        let target_hz = ambiguity.map().doppler()[13];

        let mut rng = StdRng::seed_from_u64(11);
        let mut x = random_iq(n, &mut rng);
        let reference = x.snapshot();
        let mut y = IqData::new(n).unwrap();
        y.extend((0..n).map(|i| {
            let echo = if i >= 9 { reference[i - 9] } else { Complex64::zero() };
            echo * Complex64::from_polar(1.0, 2.0 * Real::PI() * target_hz * i as Real / fs)
        }));

        let map = ambiguity.process(&mut x, &mut y).unwrap();
        let col = map.delay_to_col(9).unwrap();
        let level = |row: usize| map.data[[row, col]].norm();
        let strongest_row = (0..map.n_rows())
            .max_by(|&a, &b| level(a).total_cmp(&level(b)))
            .unwrap();
        assert_eq!(strongest_row, 13);
    }
}
