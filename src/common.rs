use std::fs::{File, OpenOptions};
use std::io::Write;
use std::ops::{Add, Neg, Sub};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use num::complex::Complex64;
use serde::{Deserialize, Serialize};

pub type Real = f64;

pub const SPEED_OF_LIGHT: Real = 299_792_458.0;

#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Decibel(Real);

#[derive(Debug, Copy, Clone, PartialEq, PartialOrd)]
pub struct Ratio(Real);

impl Add for Decibel {
    type Output = Decibel;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Decibel {
    type Output = Decibel;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Decibel {
    type Output = Decibel;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

// Power ratios, so 10 dB per decade.
impl From<Decibel> for Ratio {
    fn from(db: Decibel) -> Self {
        Self(Real::powf(10.0, db.0 / 10.0))
    }
}

impl From<Ratio> for Decibel {
    fn from(ratio: Ratio) -> Self {
        Self(10.0 * Real::log10(ratio.0))
    }
}

impl Decibel {
    #[inline]
    pub fn value(self) -> Real {
        self.0
    }

    /// Amplitude scale factor for this power level.
    #[inline]
    pub fn amplitude(self) -> Real {
        Real::sqrt(Ratio::from(self).0)
    }
}

impl Ratio {
    #[inline]
    pub fn value(self) -> Real {
        self.0
    }
}

pub trait Units {
    fn db(self) -> Decibel;

    fn ratio(self) -> Ratio;
}

impl Units for Real {
    fn db(self) -> Decibel {
        Decibel(self)
    }

    fn ratio(self) -> Ratio {
        Ratio(self)
    }
}

impl Units for i32 {
    fn db(self) -> Decibel {
        Decibel(self as Real)
    }

    fn ratio(self) -> Ratio {
        Ratio(self as Real)
    }
}

/// Level of a map cell on the scale used for noise floor and SNR figures.
#[inline]
pub fn cell_db(value: Complex64) -> Real {
    10.0 * value.norm().log10()
}

/// Bistatic range in km covered by `delay_bin` samples of delay.
#[inline]
pub fn delay_bin_to_km(delay_bin: Real, sample_rate: Real) -> Real {
    delay_bin * (SPEED_OF_LIGHT / sample_rate) / 1000.0
}

/// POSIX time in milliseconds.
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub trait Storable: Serialize {
    fn to_file(&self, path: &Path) -> Result<(), std::io::Error> {
        let mut file = File::create(path)?;
        let s = serde_json::to_string(self)?;
        file.write_all(s.as_bytes())?;
        Ok(())
    }

    /// Append as one line of a JSON-lines file, creating it if needed.
    fn append_to(&self, path: &Path) -> Result<(), std::io::Error> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut s = serde_json::to_string(self)?;
        s.push('\n');
        file.write_all(s.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn decibel_ratio_conversion() {
        assert_abs_diff_eq!(Ratio::from(20.0_f64.db()).value(), 100.0, epsilon = 1e-9);
        let ratio = 1000.0_f64.ratio();
        assert_abs_diff_eq!(Decibel::from(ratio).value(), 30.0, epsilon = 1e-9);
        assert_abs_diff_eq!((-20_i32).db().amplitude(), 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!((3.0_f64.db() - 5.0_f64.db()).value(), -2.0);
    }

    #[test]
    fn delay_to_km() {
        // One bin at 2 MHz is ~150 m of bistatic range.
        assert_abs_diff_eq!(delay_bin_to_km(1.0, 2e6), 0.149_896_229, epsilon = 1e-9);
        assert_abs_diff_eq!(delay_bin_to_km(0.0, 2e6), 0.0);
    }
}
