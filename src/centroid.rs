use crate::common::Real;
use crate::detection::{Detection, Plot};

/// Keeps only detections that are the SNR maximum of their neighbourhood.
#[derive(Debug, Clone)]
pub struct Centroid {
    n_delay: Real,
    doppler_window: Real,
}

impl Centroid {
    /// Window half widths: `n_delay` bins in delay, `n_doppler` bins of
    /// `resolution_doppler` Hz in Doppler.
    pub fn new(n_delay: u32, n_doppler: u32, resolution_doppler: Real) -> Self {
        Self {
            n_delay: n_delay as Real,
            doppler_window: n_doppler as Real * resolution_doppler,
        }
    }

    fn in_window(&self, a: &Plot, b: &Plot) -> bool {
        (a.delay - b.delay).abs() <= self.n_delay
            && (a.doppler - b.doppler).abs() <= self.doppler_window
    }

    pub fn process(&self, x: &Detection) -> Detection {
        let plots: Vec<Plot> = x.iter().collect();
        plots
            .iter()
            .enumerate()
            .filter(|&(i, plot)| {
                !plots
                    .iter()
                    .enumerate()
                    .any(|(j, other)| {
                        j != i && self.in_window(plot, other) && other.snr > plot.snr
                    })
            })
            .map(|(_, &plot)| plot)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_detections_merge_to_strongest() {
        let detection: Detection = vec![
            Plot::new(10.0, 20.0, 13.0),
            Plot::new(11.0, 20.0, 16.0),
            Plot::new(11.0, 22.0, 14.0),
        ]
        .into_iter()
        .collect();

        let merged = Centroid::new(1, 1, 2.0).process(&detection);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.get(0), Some(Plot::new(11.0, 20.0, 16.0)));
    }

    #[test]
    fn separated_detections_both_survive() {
        let detection: Detection = vec![
            Plot::new(10.0, 20.0, 13.0),
            Plot::new(14.0, 20.0, 16.0),
            Plot::new(10.0, 30.0, 20.0),
        ]
        .into_iter()
        .collect();

        let merged = Centroid::new(2, 2, 2.0).process(&detection);
        assert_eq!(merged, detection);
    }

    #[test]
    fn empty_in_empty_out() {
        let centroid = Centroid::new(2, 2, 1.0);
        assert!(centroid.process(&Detection::default()).is_empty());
    }
}
