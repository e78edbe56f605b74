use crate::ambiguity::Ambiguity;
use crate::buffer::{IqData, SampleBuffer};
use crate::centroid::Centroid;
use crate::cfar::CfarDetector1D;
use crate::clutter::WienerHopf;
use crate::common::{timestamp_ms, Real};
use crate::config::Config;
use crate::detection::Detection;
use crate::error::Result;
use crate::interpolate::Interpolate;
use crate::map::Map;
use crate::spectrum::{SpectrumAnalyser, SpectrumFrame};
use crate::track::Track;
use crate::tracker::{Tracker, TrackerConfig};

use log::{debug, info, warn};
use num::complex::Complex64;

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Products of one processed interval. The references stay valid until the
/// next call to `Pipeline::process`.
pub struct Interval<'a> {
    pub timestamp: u64,
    pub map: &'a Map<Complex64>,
    pub detection: Detection,
    pub track: &'a Track,
    pub spectrum: Option<SpectrumFrame>,
}

/// Per-interval chain: clutter filter, ambiguity, CFAR, centroid,
/// interpolation, tracker.
pub struct Pipeline {
    n_samples: usize,
    x: IqData,
    y: IqData,
    spectrum: Option<SpectrumAnalyser>,
    clutter: Option<WienerHopf>,
    ambiguity: Ambiguity,
    cfar: CfarDetector1D,
    centroid: Centroid,
    interpolate: Interpolate,
    tracker: Tracker,
}

impl Pipeline {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let n = config.n_samples();
        let fs = config.capture.fs;
        let process = &config.process;

        let amb = &process.ambiguity;
        let ambiguity = Ambiguity::new(
            amb.delay_min,
            amb.delay_max,
            amb.doppler_min,
            amb.doppler_max,
            fs,
            n,
            amb.round_hamming,
        )?;
        let cpi = ambiguity.cpi_length_seconds();

        let clutter = if process.clutter.enable {
            Some(WienerHopf::new(
                process.clutter.delay_min,
                process.clutter.delay_max,
                n,
            )?)
        } else {
            None
        };

        let detection = &process.detection;
        let tracker = Tracker::new(TrackerConfig {
            m: process.tracker.initiate.m,
            n: process.tracker.initiate.n,
            n_delete: process.tracker.delete,
            cpi,
            max_acc_init: process.tracker.initiate.max_acc,
            range_res: config.range_resolution(),
            wavelength: config.wavelength(),
            max_tracks: process.tracker.max_tracks,
        })?;

        let spectrum = process
            .spectrum
            .as_ref()
            .map(|s| SpectrumAnalyser::new(n, s.bandwidth, fs, config.capture.fc))
            .transpose()?;

        Ok(Self {
            n_samples: n,
            x: IqData::new(n)?,
            y: IqData::new(n)?,
            spectrum,
            clutter,
            cfar: CfarDetector1D::new(config.cfar())?,
            centroid: Centroid::new(detection.n_centroid, detection.n_centroid, 1.0 / cpi),
            interpolate: Interpolate::new(
                detection.interpolate.delay,
                detection.interpolate.doppler,
            ),
            tracker,
            ambiguity,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn ambiguity(&self) -> &Ambiguity {
        &self.ambiguity
    }

    /// Move one interval out of the shared buffers if both hold enough.
    pub fn drain(&mut self, reference: &SampleBuffer, surveillance: &SampleBuffer) -> bool {
        let n = self.n_samples;
        let mut r = reference.lock();
        let mut s = surveillance.lock();
        if r.len() < n || s.len() < n {
            return false;
        }
        self.x.clear();
        self.y.clear();
        self.x.extend(r.drain_front(n));
        self.y.extend(s.drain_front(n));
        true
    }

    /// Run the chain on the drained interval. `Ok(None)` means the interval
    /// was skipped after a clutter filter failure.
    pub fn process(&mut self, timestamp: u64) -> Result<Option<Interval<'_>>> {
        let start = Instant::now();

        let spectrum = match self.spectrum.as_mut() {
            Some(analyser) => Some(analyser.process(&self.x, timestamp)?),
            None => None,
        };

        if let Some(filter) = self.clutter.as_mut() {
            if let Err(e) = filter.process(&self.x, &mut self.y) {
                if !e.is_recoverable() {
                    return Err(e);
                }
                warn!("interval skipped, clutter filter failed: {}", e);
                self.x.clear();
                self.y.clear();
                return Ok(None);
            }
        }

        let map = self.ambiguity.process(&mut self.x, &mut self.y)?;
        self.x.clear();
        self.y.clear();

        let detection = self.cfar.process(map);
        let n_cfar = detection.len();
        let detection = self.centroid.process(&detection);
        let detection = self.interpolate.process(&detection, map);
        let track = self.tracker.process(&detection, timestamp)?;

        debug!("interval processed in {:?}", start.elapsed());
        info!(
            "noise {:.1} dB, max {:.1} dB, {} detections ({} raw), {} tracks ({} active)",
            map.noise_power,
            map.max_power,
            detection.len(),
            n_cfar,
            track.len(),
            track.n_active()
        );

        Ok(Some(Interval {
            timestamp,
            map,
            detection,
            track,
            spectrum,
        }))
    }

    /// Consumer loop. Hands every processed interval to `sink` and returns
    /// once `running` is cleared and the buffers no longer hold an interval.
    pub fn run<F>(
        &mut self,
        reference: &SampleBuffer,
        surveillance: &SampleBuffer,
        running: &AtomicBool,
        fs: Real,
        mut sink: F,
    ) -> Result<()>
    where
        F: FnMut(&Interval<'_>) -> Result<()>,
    {
        // poll about ten times per interval
        let poll = Duration::from_secs_f64(self.n_samples as Real / fs / 10.0);
        loop {
            if self.drain(reference, surveillance) {
                match self.process(timestamp_ms()) {
                    Ok(Some(interval)) => sink(&interval)?,
                    Ok(None) => {}
                    Err(e) if e.is_recoverable() => warn!("interval dropped: {}", e),
                    Err(e) => return Err(e),
                }
            } else if !running.load(Ordering::Acquire) {
                return Ok(());
            } else {
                thread::sleep(poll);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::read_replay_file;
    use crate::common::Units;
    use crate::error::Error;
    use crate::video::{Echo, Scene, Simulator};

    use approx::assert_abs_diff_eq;
    use std::path::Path;

    const FS: Real = 1e5;

    fn config(clutter: bool) -> Config {
        let yaml = format!(
            r#"
capture:
  fs: {}
  fc: 204640000
  source:
    type: simulator
    scene: {{ direct: 0 }}
process:
  data: {{ cpi: 0.1, buffer: 0.5 }}
  ambiguity: {{ delayMin: -5, delayMax: 40, dopplerMin: -100, dopplerMax: 100 }}
  clutter: {{ enable: {}, delayMin: -2, delayMax: 10 }}
  detection:
    pfa: 0.000001
    nGuard: 2
    nTrain: 8
    minDelay: 5
    minDoppler: 5
    nCentroid: 3
    interpolate: {{ delay: true, doppler: true }}
  tracker:
    initiate: {{ M: 3, N: 5, maxAcc: 0 }}
    delete: 5
  spectrum: {{ bandwidth: 100 }}
"#,
            FS, clutter
        );
        Config::parse(&yaml).unwrap()
    }

    fn target_scene() -> Scene {
        Scene {
            direct: Some(0.0_f64.db()),
            noise: Some((-30.0_f64).db()),
            echoes: vec![Echo::new(20, 30.0, (-20.0_f64).db())],
        }
    }

    fn feed(
        simulator: &mut Simulator,
        reference: &SampleBuffer,
        surveillance: &SampleBuffer,
        n: usize,
    ) {
        let (x, y) = simulator.next_chunk(n);
        reference.lock().extend(x);
        surveillance.lock().extend(y);
    }

    #[test]
    fn drain_needs_a_full_interval_on_both_channels() {
        let mut pipeline = Pipeline::new(&config(false)).unwrap();
        let n = pipeline.n_samples();
        assert_eq!(n, 10_000);
        let reference = SampleBuffer::new(5 * n).unwrap();
        let surveillance = SampleBuffer::new(5 * n).unwrap();

        let mut simulator = Simulator::new(FS, target_scene(), 1).unwrap();
        let (x, y) = simulator.next_chunk(n + 10);
        reference.lock().extend(x);
        surveillance.lock().extend(y.into_iter().take(n - 1));
        assert!(!pipeline.drain(&reference, &surveillance));

        let one = Complex64::new(1.0, 0.0);
        surveillance.lock().extend(vec![one; 5]);
        assert!(pipeline.drain(&reference, &surveillance));
        assert_eq!(reference.lock().len(), 10);
        assert_eq!(surveillance.lock().len(), 4);
    }

    #[test]
    fn noise_only_interval() {
        let mut pipeline = Pipeline::new(&config(true)).unwrap();
        let n = pipeline.n_samples();
        let reference = SampleBuffer::new(n).unwrap();
        let surveillance = SampleBuffer::new(n).unwrap();
        let scene = Scene {
            direct: None,
            noise: Some(0.0_f64.db()),
            echoes: vec![],
        };
        let mut simulator = Simulator::new(FS, scene, 11).unwrap();
        feed(&mut simulator, &reference, &surveillance, n);

        assert!(pipeline.drain(&reference, &surveillance));
        let interval = pipeline.process(1_000).unwrap().unwrap();
        assert_eq!(interval.map.n_cols(), 46);
        assert_eq!(interval.map.n_rows(), 21);
        assert!(interval.map.max_power >= 0.0);
        assert!(interval.map.noise_power.is_finite());
        assert!(interval.detection.len() <= 2);
        let frequencies = interval.spectrum.as_ref().map(|s| s.frequency.len());
        assert_eq!(frequencies, Some(100));
        assert_eq!(interval.track.len(), interval.detection.len());
    }

    #[test]
    fn simulated_target_is_detected_and_tracked() {
        let mut pipeline = Pipeline::new(&config(true)).unwrap();
        let n = pipeline.n_samples();
        let reference = SampleBuffer::new(n).unwrap();
        let surveillance = SampleBuffer::new(n).unwrap();
        let mut simulator = Simulator::new(FS, target_scene(), 4).unwrap();

        for k in 0..5u64 {
            feed(&mut simulator, &reference, &surveillance, n);
            assert!(pipeline.drain(&reference, &surveillance));
            let interval = pipeline.process(k * 100).unwrap().unwrap();

            let strongest = interval
                .detection
                .iter()
                .max_by(|a, b| a.snr.total_cmp(&b.snr))
                .unwrap();
            assert_abs_diff_eq!(strongest.delay, 20.0, epsilon = 1.0);
            assert_abs_diff_eq!(strongest.doppler, 30.0, epsilon = 10.0);
            assert!(strongest.snr > 10.0);
        }

        let track = pipeline.tracker.track();
        let confirmed = (0..track.len())
            .filter(|&i| track.state(i).map(|s| s.is_confirmed()).unwrap_or(false))
            .count();
        assert!(confirmed >= 1);
    }

    #[test]
    fn clutter_filter_removes_direct_path() {
        let scene = Scene {
            direct: Some(0.0_f64.db()),
            noise: Some((-30.0_f64).db()),
            echoes: vec![],
        };
        let mut direct_snr = Vec::new();
        for &clutter in &[false, true] {
            let mut pipeline = Pipeline::new(&config(clutter)).unwrap();
            let n = pipeline.n_samples();
            let reference = SampleBuffer::new(n).unwrap();
            let surveillance = SampleBuffer::new(n).unwrap();
            let mut simulator = Simulator::new(FS, scene.clone(), 8).unwrap();
            feed(&mut simulator, &reference, &surveillance, n);
            assert!(pipeline.drain(&reference, &surveillance));
            let interval = pipeline.process(0).unwrap().unwrap();
            let zero_doppler = interval.map.doppler_hz_to_bin(0.0).unwrap();
            let direct = interval.map.delay_to_col(0).unwrap();
            direct_snr.push(interval.map.snr_db(zero_doppler, direct));
        }
        assert!(direct_snr[1] < direct_snr[0] - 10.0);
    }

    #[test]
    fn singular_reference_skips_interval() {
        let mut pipeline = Pipeline::new(&config(true)).unwrap();
        let n = pipeline.n_samples();
        let reference = SampleBuffer::new(n).unwrap();
        let surveillance = SampleBuffer::new(n).unwrap();
        reference.lock().extend(vec![Complex64::new(0.0, 0.0); n]);
        surveillance.lock().extend(vec![Complex64::new(1.0, 1.0); n]);

        assert!(pipeline.drain(&reference, &surveillance));
        assert!(pipeline.process(0).unwrap().is_none());
    }

    #[test]
    fn run_stops_when_source_stops() {
        let mut pipeline = Pipeline::new(&config(false)).unwrap();
        let n = pipeline.n_samples();
        let reference = SampleBuffer::new(3 * n).unwrap();
        let surveillance = SampleBuffer::new(3 * n).unwrap();
        let mut simulator = Simulator::new(FS, target_scene(), 2).unwrap();
        feed(&mut simulator, &reference, &surveillance, 2 * n + 7);

        let running = AtomicBool::new(false);
        let mut seen = Vec::new();
        pipeline
            .run(&reference, &surveillance, &running, FS, |interval| {
                seen.push(interval.timestamp);
                Ok(())
            })
            .unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(reference.lock().len(), 7);
    }

    #[test]
    fn sink_error_ends_run() {
        let mut pipeline = Pipeline::new(&config(false)).unwrap();
        let n = pipeline.n_samples();
        let reference = SampleBuffer::new(3 * n).unwrap();
        let surveillance = SampleBuffer::new(3 * n).unwrap();
        let mut simulator = Simulator::new(FS, target_scene(), 2).unwrap();
        feed(&mut simulator, &reference, &surveillance, 2 * n + 7);

        // still running, so only the error can end the loop
        let running = AtomicBool::new(true);
        let mut calls = 0;
        let result = pipeline.run(&reference, &surveillance, &running, FS, |_| {
            calls += 1;
            Err(Error::TrackIndex { index: 3, len: 0 })
        });

        assert!(matches!(result, Err(Error::TrackIndex { index: 3, len: 0 })));
        assert_eq!(calls, 1);
        assert_eq!(reference.lock().len(), n + 7);
    }

    #[test]
    fn recorded_file_map_metrics() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("20231214-230611.rspduo");
        if !path.exists() {
            eprintln!("{} not found, skipping", path.display());
            return;
        }
        let fs = 2_000_000.0;
        let n = (0.5 * fs) as usize;
        for &round_hamming in &[true, false] {
            let mut ambiguity =
                Ambiguity::new(-10, 300, -300.0, 300.0, fs, n, round_hamming).unwrap();
            let (mut x, mut y) = read_replay_file(&path, n).unwrap();
            assert_eq!(x.len(), n);

            let map = ambiguity.process(&mut x, &mut y).unwrap();
            assert_abs_diff_eq!(map.max_power, 30.2816, epsilon = 0.001);
            assert_abs_diff_eq!(map.noise_power, 76.918, epsilon = 0.001);
        }
    }
}
