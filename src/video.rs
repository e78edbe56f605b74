use crate::common::{Decibel, Ratio, Real};
use crate::error::{config_error, Result};

use ndarray::{Array1, Zip};
use ndarray_rand::rand::rngs::StdRng;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use num::complex::Complex64;
use num::traits::FloatConst;
use serde::{Deserialize, Serialize};

use std::collections::VecDeque;

/// A point scatterer seen by the surveillance antenna.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Echo {
    /// Bistatic delay (samples).
    pub delay: usize,
    /// Bistatic Doppler (Hz).
    pub doppler: Real,
    /// Power relative to the illuminator.
    pub level: Decibel,
}

impl Echo {
    pub fn new<L>(delay: usize, doppler: Real, level: L) -> Self
    where
        L: Into<Decibel>,
    {
        Self {
            delay,
            doppler,
            level: level.into(),
        }
    }
}

/// What the two receivers see, all levels relative to the illuminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    /// Direct path leaking into the surveillance channel.
    pub direct: Option<Decibel>,
    /// Receiver noise on both channels.
    pub noise: Option<Decibel>,
    #[serde(default)]
    pub echoes: Vec<Echo>,
}

/// Complex white Gaussian noise of the given power.
pub fn noise(len: usize, power: Real, rng: &mut StdRng) -> Array1<Complex64> {
    // Array::random with a complex distribution pulls a second rand_core
    let s = (power / 2.0).sqrt();
    let re = s * Array1::random_using(len, StandardNormal, rng);
    let im = s * Array1::random_using(len, StandardNormal, rng);
    Zip::from(&re)
        .and(&im)
        .map_collect(|&re, &im| Complex64::new(re, im))
}

/// Two-channel IQ generator for a noise-like illuminator.
///
/// Keeps the tail of the illuminator so delayed echoes stay continuous
/// across chunks.
pub struct Simulator {
    fs: Real,
    scene: Scene,
    rng: StdRng,
    history: VecDeque<Complex64>,
    max_delay: usize,
    n_generated: u64,
}

impl Simulator {
    pub fn new(fs: Real, scene: Scene, seed: u64) -> Result<Self> {
        if !(fs > 0.0) {
            return config_error("simulator sample rate must be positive");
        }
        let max_delay = scene.echoes.iter().map(|e| e.delay).max().unwrap_or(0);
        Ok(Self {
            fs,
            scene,
            rng: StdRng::seed_from_u64(seed),
            history: std::iter::repeat(Complex64::new(0.0, 0.0))
                .take(max_delay)
                .collect(),
            max_delay,
            n_generated: 0,
        })
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Next `len` samples of the reference and surveillance channels.
    pub fn next_chunk(&mut self, len: usize) -> (Vec<Complex64>, Vec<Complex64>) {
        let illuminator = noise(len, 1.0, &mut self.rng);
        let extended: Vec<Complex64> = self
            .history
            .iter()
            .copied()
            .chain(illuminator.iter().copied())
            .collect();

        let mut surveillance = match self.scene.noise {
            Some(level) => noise(len, Ratio::from(level).value(), &mut self.rng),
            None => Array1::zeros(len),
        };
        if let Some(direct) = self.scene.direct {
            surveillance.scaled_add(Complex64::new(direct.amplitude(), 0.0), &illuminator);
        }

        let t0 = self.n_generated;
        for echo in &self.scene.echoes {
            let amp = echo.level.amplitude();
            let step = 2.0 * Real::PI() * echo.doppler / self.fs;
            let start = self.max_delay - echo.delay;
            for (t, s) in surveillance.iter_mut().enumerate() {
                let phase = step * (t0 + t as u64) as Real;
                *s += extended[start + t] * Complex64::from_polar(amp, phase);
            }
        }

        let mut reference = illuminator;
        if let Some(level) = self.scene.noise {
            reference += &noise(len, Ratio::from(level).value(), &mut self.rng);
        }

        let keep = extended.len() - self.max_delay;
        self.history = extended[keep..].iter().copied().collect();
        self.n_generated += len as u64;

        (reference.to_vec(), surveillance.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Units;
    use approx::assert_abs_diff_eq;

    fn power(x: &[Complex64]) -> Real {
        x.iter().map(|z| z.norm_sqr()).sum::<Real>() / x.len() as Real
    }

    #[test]
    fn illuminator_has_unit_power() {
        let scene = Scene {
            direct: None,
            noise: None,
            echoes: vec![],
        };
        let mut sim = Simulator::new(1e6, scene, 1).unwrap();
        let (reference, surveillance) = sim.next_chunk(20_000);
        assert_abs_diff_eq!(power(&reference), 1.0, epsilon = 0.05);
        assert!(surveillance.iter().all(|z| z.norm() == 0.0));
    }

    #[test]
    fn same_seed_same_samples() {
        let scene = Scene {
            direct: Some(0.0_f64.db()),
            noise: Some((-20.0_f64).db()),
            echoes: vec![Echo::new(3, 10.0, (-10.0_f64).db())],
        };
        let mut first = Simulator::new(1e3, scene.clone(), 42).unwrap();
        let mut second = Simulator::new(1e3, scene, 42).unwrap();
        assert_eq!(first.next_chunk(100), second.next_chunk(100));
    }

    #[test]
    fn echo_is_delayed_across_chunks() {
        let scene = Scene {
            direct: None,
            noise: None,
            echoes: vec![Echo::new(5, 0.0, (-6.0_f64).db())],
        };
        let amp = (-6.0_f64).db().amplitude();
        let mut sim = Simulator::new(1e3, scene, 7).unwrap();
        let (r1, s1) = sim.next_chunk(8);
        let (r2, s2) = sim.next_chunk(8);

        let reference: Vec<Complex64> = r1.into_iter().chain(r2).collect();
        let surveillance: Vec<Complex64> = s1.into_iter().chain(s2).collect();
        for t in 0..5 {
            assert_eq!(surveillance[t].norm(), 0.0);
        }
        for t in 5..16 {
            let expected = reference[t - 5] * amp;
            assert_abs_diff_eq!(surveillance[t].re, expected.re, epsilon = 1e-12);
            assert_abs_diff_eq!(surveillance[t].im, expected.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn doppler_rotates_echo_phase() {
        let fs = 1e3;
        let scene = Scene {
            direct: None,
            noise: None,
            echoes: vec![Echo::new(0, 50.0, 0.0_f64.db())],
        };
        let mut sim = Simulator::new(fs, scene, 3).unwrap();
        let (reference, surveillance) = sim.next_chunk(32);
        for t in 0..32 {
            let phase = 2.0 * Real::PI() * 50.0 * t as Real / fs;
            let expected = reference[t] * Complex64::from_polar(1.0, phase);
            assert_abs_diff_eq!((surveillance[t] - expected).norm(), 0.0, epsilon = 1e-12);
        }
    }
}
