use crate::common::Real;
use crate::detection::{Detection, Plot};
use crate::map::Map;

use log::debug;
use num::complex::Complex64;

/// Sub-bin peak refinement by 3-point parabolic fit on SNR.
#[derive(Debug, Clone)]
pub struct Interpolate {
    do_delay: bool,
    do_doppler: bool,
}

/// Peak offset in bins and refined level of a parabola through three
/// samples, `None` unless the centre sample is a strict local maximum.
pub fn parabolic_peak(s: [Real; 3]) -> Option<(Real, Real)> {
    if s[0] >= s[1] || s[2] >= s[1] {
        return None;
    }
    let offset = (s[0] - s[2]) / (2.0 * (s[0] - 2.0 * s[1] + s[2]));
    let level = s[1] - (s[0] - s[2]) * offset / 4.0;
    Some((offset, level))
}

impl Interpolate {
    pub fn new(do_delay: bool, do_doppler: bool) -> Self {
        Self { do_delay, do_doppler }
    }

    fn refine(&self, plot: Plot, map: &Map<Complex64>) -> Plot {
        let cells = map
            .doppler_hz_to_bin(plot.doppler)
            .zip(map.delay_to_col(plot.delay.round() as i32));
        let (row, col) = match cells {
            Some(cell) => cell,
            None => return plot,
        };

        let mut refined = plot;
        let mut snr_delay = plot.snr;
        let mut snr_doppler = plot.snr;

        if self.do_delay && col > 0 && col + 1 < map.n_cols() {
            let s = [
                map.snr_db(row, col - 1),
                map.snr_db(row, col),
                map.snr_db(row, col + 1),
            ];
            match parabolic_peak(s) {
                Some((offset, level)) => {
                    refined.delay = plot.delay + offset;
                    snr_delay = level;
                }
                None => debug!(
                    "delay interpolation dropped at ({}, {}), not a peak",
                    plot.delay, plot.doppler
                ),
            }
        }

        if self.do_doppler && row > 0 && row + 1 < map.n_rows() {
            let s = [
                map.snr_db(row - 1, col),
                map.snr_db(row, col),
                map.snr_db(row + 1, col),
            ];
            match parabolic_peak(s) {
                Some((offset, level)) => {
                    refined.doppler = plot.doppler + offset * map.doppler_resolution();
                    snr_doppler = level;
                }
                None => debug!(
                    "doppler interpolation dropped at ({}, {}), not a peak",
                    plot.delay, plot.doppler
                ),
            }
        }

        refined.snr = snr_delay.max(snr_doppler).max(plot.snr);
        refined
    }

    pub fn process(&self, x: &Detection, map: &Map<Complex64>) -> Detection {
        x.iter().map(|plot| self.refine(plot, map)).collect()
    }
}
