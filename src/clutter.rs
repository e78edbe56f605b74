use crate::buffer::IqData;
use crate::common::Real;
use crate::error::{config_error, Error, Result};

use log::debug;
use nalgebra::{Cholesky, DMatrix, DVector};
use num::complex::Complex64;
use num::Zero;
use rustfft::{Fft, FftPlanner};

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Solve the Hermitian positive definite system `a w = b` in place.
/// Only the lower triangle of `a` is read.
fn cholesky_solve(a: DMatrix<Complex64>, b: &mut DVector<Complex64>) -> Result<()> {
    let chol = Cholesky::new(a).ok_or(Error::Cholesky)?;
    // complex square roots of negative pivots succeed, so check the squares
    let l = chol.l_dirty();
    if (0..l.nrows()).any(|j| !((l[(j, j)] * l[(j, j)]).re > 0.0)) {
        return Err(Error::Cholesky);
    }
    chol.solve_mut(b);
    let finite = |w: &Complex64| w.re.is_finite() && w.im.is_finite();
    match b.iter().position(|w| !finite(w)) {
        Some(row) => Err(Error::Solve(row)),
        None => Ok(()),
    }
}

/// Wiener-Hopf clutter filter.
///
/// Estimates an FIR model of the direct path and static clutter from the
/// reference channel and subtracts it from the surveillance channel.
pub struct WienerHopf {
    delay_min: i32,
    n_bins: usize,
    n_samples: usize,
    n_filt: usize,

    fft: Arc<dyn Fft<Real>>,
    ifft: Arc<dyn Fft<Real>>,
    fft_filt: Arc<dyn Fft<Real>>,
    ifft_filt: Arc<dyn Fft<Real>>,
    data_x: Vec<Complex64>,
    spec_x: Vec<Complex64>,
    spec_y: Vec<Complex64>,
    corr: Vec<Complex64>,
    filt_x: Vec<Complex64>,
    filt_w: Vec<Complex64>,
    scratch: Vec<Complex64>,

    w: DVector<Complex64>,
}

impl WienerHopf {
    /// Filter taps span `delay_min..delay_max` (`delay_max - delay_min` taps).
    pub fn new(delay_min: i32, delay_max: i32, n_samples: usize) -> Result<Self> {
        if delay_max <= delay_min {
            return config_error(format!(
                "clutter delayMax {} must exceed delayMin {}",
                delay_max, delay_min
            ));
        }
        let n_bins = (delay_max - delay_min) as usize;
        if n_samples < n_bins {
            return config_error(format!(
                "clutter filter of {} taps needs at least as many samples, got {}",
                n_bins, n_samples
            ));
        }
        let n_filt = n_bins + n_samples + 1;

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n_samples);
        let ifft = planner.plan_fft_inverse(n_samples);
        let fft_filt = planner.plan_fft_forward(n_filt);
        let ifft_filt = planner.plan_fft_inverse(n_filt);
        let scratch_len = [&fft, &ifft, &fft_filt, &ifft_filt]
            .iter()
            .map(|f| f.get_inplace_scratch_len())
            .max()
            .unwrap_or(0);

        Ok(Self {
            delay_min,
            n_bins,
            n_samples,
            n_filt,
            fft,
            ifft,
            fft_filt,
            ifft_filt,
            data_x: vec![Complex64::zero(); n_samples],
            spec_x: vec![Complex64::zero(); n_samples],
            spec_y: vec![Complex64::zero(); n_samples],
            corr: vec![Complex64::zero(); n_samples],
            filt_x: vec![Complex64::zero(); n_filt],
            filt_w: vec![Complex64::zero(); n_filt],
            scratch: vec![Complex64::zero(); scratch_len],
            w: DVector::zeros(n_bins),
        })
    }

    pub fn tap_count(&self) -> usize {
        self.n_bins
    }

    /// Latest filter weights.
    pub fn weights(&self) -> &[Complex64] {
        self.w.as_slice()
    }

    /// Filter the first `n_samples` of `y` in place using reference `x`.
    ///
    /// A numeric failure (`Error::Cholesky`, `Error::Solve`) leaves `y`
    /// untouched; the caller decides what to do with the interval.
    pub fn process(&mut self, x: &IqData, y: &mut IqData) -> Result<()> {
        let n = self.n_samples;
        let available = x.len().min(y.len());
        if available < n {
            return Err(Error::InsufficientSamples {
                needed: n,
                available,
            });
        }
        let start = Instant::now();

        // reference circularly shifted so tap 0 is delay_min
        for (i, dx) in self.data_x.iter_mut().enumerate() {
            let k = (i as i64 - self.delay_min as i64).rem_euclid(n as i64) as usize;
            *dx = x.get(k).unwrap_or_else(Complex64::zero);
        }
        self.spec_x.copy_from_slice(&self.data_x);
        self.fft
            .process_with_scratch(&mut self.spec_x, &mut self.scratch);
        for (sy, s) in self.spec_y.iter_mut().zip(y.iter()) {
            *sy = *s;
        }
        self.fft
            .process_with_scratch(&mut self.spec_y, &mut self.scratch);

        let norm = n as Real;

        // autocorrelation of the reference -> Hermitian Toeplitz A
        for (c, sx) in self.corr.iter_mut().zip(&self.spec_x) {
            *c = *sx * sx.conj();
        }
        self.ifft
            .process_with_scratch(&mut self.corr, &mut self.scratch);
        let nb = self.n_bins;
        let corr = &self.corr;
        let a = DMatrix::from_fn(nb, nb, |i, j| {
            let r = match i.cmp(&j) {
                Ordering::Less => corr[j - i].conj(),
                Ordering::Equal => Complex64::new(corr[0].re, 0.0),
                Ordering::Greater => corr[i - j],
            };
            r / norm
        });

        // cross-correlation of surveillance with reference -> b
        for ((c, sy), sx) in self.corr.iter_mut().zip(&self.spec_y).zip(&self.spec_x) {
            *c = *sy * sx.conj();
        }
        self.ifft
            .process_with_scratch(&mut self.corr, &mut self.scratch);
        for (w, c) in self.w.iter_mut().zip(&self.corr) {
            *w = *c / norm;
        }

        cholesky_solve(a, &mut self.w)?;

        // FIR output via zero padded FFT convolution
        self.filt_x.iter_mut().for_each(|v| *v = Complex64::zero());
        self.filt_w.iter_mut().for_each(|v| *v = Complex64::zero());
        self.filt_x[..n].copy_from_slice(&self.data_x);
        self.filt_w[..nb].copy_from_slice(self.w.as_slice());
        self.fft_filt
            .process_with_scratch(&mut self.filt_x, &mut self.scratch);
        self.fft_filt
            .process_with_scratch(&mut self.filt_w, &mut self.scratch);
        for (fx, fw) in self.filt_x.iter_mut().zip(&self.filt_w) {
            *fx *= *fw;
        }
        self.ifft_filt
            .process_with_scratch(&mut self.filt_x, &mut self.scratch);

        let norm_filt = self.n_filt as Real;
        for (s, f) in y.iter_mut().zip(&self.filt_x).take(n) {
            *s -= *f / norm_filt;
        }

        debug!("clutter filter processed in {:?}", start.elapsed());
        Ok(())
    }
}
