use crate::buffer::IqData;
use crate::common::{Real, Storable};
use crate::error::{config_error, Error, Result};

use num::complex::Complex64;
use num::Zero;
use rustfft::{Fft, FftPlanner};
use serde::Serialize;

use std::sync::Arc;

/// Power spectrum of the leading samples of a channel, reduced to roughly
/// `bandwidth` points by keeping every `decimation`-th shifted bin.
pub struct SpectrumAnalyser {
    nfft: usize,
    decimation: usize,
    fs: Real,
    fc: Real,
    fft: Arc<dyn Fft<Real>>,
    data: Vec<Complex64>,
    scratch: Vec<Complex64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectrumFrame {
    pub timestamp: u64,
    /// Absolute frequency (kHz).
    pub frequency: Vec<Real>,
    /// Bin power (dB).
    pub power: Vec<Real>,
}

impl Storable for SpectrumFrame {}

impl SpectrumAnalyser {
    pub fn new(n: usize, bandwidth: usize, fs: Real, fc: Real) -> Result<Self> {
        if bandwidth == 0 || n < bandwidth {
            return config_error(format!(
                "spectrum bandwidth {} must be in 1..={}",
                bandwidth, n
            ));
        }
        if !(fs > 0.0) {
            return config_error("spectrum sample rate must be positive");
        }
        let decimation = n / bandwidth;
        let nfft = (n / decimation) * decimation;

        let fft = FftPlanner::new().plan_fft_forward(nfft);
        let scratch = vec![Complex64::zero(); fft.get_inplace_scratch_len()];
        Ok(Self {
            nfft,
            decimation,
            fs,
            fc,
            fft,
            data: vec![Complex64::zero(); nfft],
            scratch,
        })
    }

    pub fn fft_bin_count(&self) -> usize {
        self.nfft
    }

    pub fn decimation(&self) -> usize {
        self.decimation
    }

    /// Unshifted FFT bin shown at position `i` of the centred spectrum.
    fn shifted_bin(&self, i: usize) -> usize {
        (i + self.nfft / 2 + 1) % self.nfft
    }

    /// Signed frequency index of FFT bin `k`.
    fn signed_bin(&self, k: usize) -> Real {
        if k <= self.nfft / 2 {
            k as Real
        } else {
            k as Real - self.nfft as Real
        }
    }

    /// Spectrum of the first `nfft` samples of `x`; the buffer is not consumed.
    pub fn process(&mut self, x: &IqData, timestamp: u64) -> Result<SpectrumFrame> {
        if x.len() < self.nfft {
            return Err(Error::InsufficientSamples {
                needed: self.nfft,
                available: x.len(),
            });
        }
        for (d, s) in self.data.iter_mut().zip(x.iter()) {
            *d = *s;
        }
        self.fft
            .process_with_scratch(&mut self.data, &mut self.scratch);

        let bin_hz = self.fs / self.nfft as Real;
        let (frequency, power) = (0..self.nfft)
            .step_by(self.decimation)
            .map(|i| {
                let k = self.shifted_bin(i);
                let f = (self.fc + self.signed_bin(k) * bin_hz) / 1000.0;
                (f, 10.0 * self.data[k].norm_sqr().log10())
            })
            .unzip();

        Ok(SpectrumFrame {
            timestamp,
            frequency,
            power,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use num::traits::FloatConst;

    fn tone(n: usize, f: Real, fs: Real) -> IqData {
        let mut x = IqData::new(n).unwrap();
        let w = 2.0 * Real::PI() * f / fs;
        x.extend((0..n).map(|i| Complex64::from_polar(1.0, w * i as Real)));
        x
    }

    #[test]
    fn decimation_from_bandwidth() {
        let spectrum = SpectrumAnalyser::new(1000, 300, 1e3, 0.0).unwrap();
        assert_eq!(spectrum.decimation(), 3);
        assert_eq!(spectrum.fft_bin_count(), 999);
        assert!(SpectrumAnalyser::new(100, 0, 1e3, 0.0).is_err());
        assert!(SpectrumAnalyser::new(100, 200, 1e3, 0.0).is_err());
    }

    #[test]
    fn frequency_axis_is_centred_on_carrier() {
        let mut spectrum = SpectrumAnalyser::new(64, 64, 64e3, 100e6).unwrap();
        let frame = spectrum.process(&tone(64, 0.0, 64e3), 0).unwrap();
        assert_eq!(frame.frequency.len(), 64);
        // first shifted bin is -31 kHz, last is the Nyquist bin
        assert_abs_diff_eq!(frame.frequency[0], 100e3 - 31.0, epsilon = 1e-9);
        assert_abs_diff_eq!(frame.frequency[63], 100e3 + 32.0, epsilon = 1e-9);
        assert!(frame.frequency.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn tone_peaks_at_its_frequency() {
        let fs = 64e3;
        let mut spectrum = SpectrumAnalyser::new(256, 256, fs, 0.0).unwrap();
        let frame = spectrum.process(&tone(256, 5e3, fs), 7).unwrap();
        let peak = frame
            .power
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_abs_diff_eq!(frame.frequency[peak], 5.0, epsilon = 1e-9);
        assert_eq!(frame.timestamp, 7);
    }

    #[test]
    fn short_buffer_rejected() {
        let mut spectrum = SpectrumAnalyser::new(64, 32, 1e3, 0.0).unwrap();
        assert!(matches!(
            spectrum.process(&tone(10, 1.0, 1e3), 0),
            Err(Error::InsufficientSamples { needed: 64, available: 10 })
        ));
    }
}
