use crate::cfar::CfarConfig;
use crate::common::{Real, SPEED_OF_LIGHT};
use crate::error::{config_error, Result};
use crate::video::Scene;

use serde::Deserialize;

use std::path::{Path, PathBuf};

/// Top level of the YAML configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    pub process: ProcessConfig,
    #[serde(default)]
    pub save: SaveConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Sample rate (Hz).
    pub fs: Real,
    /// Centre frequency (Hz).
    pub fc: Real,
    pub source: SourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SourceConfig {
    Simulator {
        #[serde(default)]
        seed: u64,
        scene: Scene,
    },
    Replay {
        path: PathBuf,
        #[serde(rename = "loop", default)]
        looping: bool,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessConfig {
    pub data: DataConfig,
    pub ambiguity: AmbiguityConfig,
    pub clutter: ClutterConfig,
    pub detection: DetectionConfig,
    pub tracker: TrackerSection,
    #[serde(default)]
    pub spectrum: Option<SpectrumConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Coherent processing interval (s).
    pub cpi: Real,
    /// Capacity of each channel buffer (s).
    pub buffer: Real,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmbiguityConfig {
    pub delay_min: i32,
    pub delay_max: i32,
    pub doppler_min: Real,
    pub doppler_max: Real,
    #[serde(default)]
    pub round_hamming: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClutterConfig {
    pub enable: bool,
    pub delay_min: i32,
    pub delay_max: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionConfig {
    pub pfa: Real,
    pub n_guard: usize,
    pub n_train: usize,
    pub min_delay: i32,
    pub min_doppler: Real,
    pub n_centroid: u32,
    #[serde(default)]
    pub interpolate: InterpolateConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InterpolateConfig {
    #[serde(default)]
    pub delay: bool,
    #[serde(default)]
    pub doppler: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSection {
    pub initiate: InitiateConfig,
    /// Missed updates before deletion.
    pub delete: u64,
    #[serde(default)]
    pub max_tracks: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateConfig {
    #[serde(rename = "M")]
    pub m: usize,
    #[serde(rename = "N")]
    pub n: usize,
    /// Largest acceleration hypothesis (Hz/s).
    pub max_acc: Real,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpectrumConfig {
    /// Number of points kept after decimation.
    pub bandwidth: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    pub path: PathBuf,
    pub map: bool,
    pub detection: bool,
    pub track: bool,
    pub spectrum: bool,
    /// Write delay as bistatic range in km.
    pub km: bool,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("save"),
            map: false,
            detection: false,
            track: false,
            spectrum: false,
            km: false,
        }
    }
}

impl SaveConfig {
    pub fn any(&self) -> bool {
        self.map || self.detection || self.track || self.spectrum
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse and validate a YAML document.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let capture = &self.capture;
        if !(capture.fs > 0.0) || !(capture.fc > 0.0) {
            return config_error("capture fs and fc must be positive");
        }

        let data = &self.process.data;
        if !(data.cpi > 0.0) {
            return config_error(format!("cpi {} must be positive", data.cpi));
        }
        if self.n_samples() == 0 {
            return config_error("cpi is shorter than one sample");
        }
        if self.buffer_samples() < self.n_samples() {
            return config_error(format!(
                "buffer of {} samples cannot hold one interval of {}",
                self.buffer_samples(),
                self.n_samples()
            ));
        }

        let ambiguity = &self.process.ambiguity;
        if ambiguity.delay_min > ambiguity.delay_max {
            return config_error("ambiguity delayMin exceeds delayMax");
        }
        if ambiguity.doppler_min > ambiguity.doppler_max {
            return config_error("ambiguity dopplerMin exceeds dopplerMax");
        }

        let clutter = &self.process.clutter;
        if clutter.enable && clutter.delay_max <= clutter.delay_min {
            return config_error("clutter delayMax must exceed delayMin");
        }

        let detection = &self.process.detection;
        if !(detection.pfa > 0.0 && detection.pfa < 1.0) {
            return config_error(format!("pfa {} outside (0, 1)", detection.pfa));
        }
        if detection.n_train == 0 {
            return config_error("nTrain must be at least 1");
        }

        let initiate = &self.process.tracker.initiate;
        if initiate.n == 0 || initiate.m == 0 || initiate.m > initiate.n {
            return config_error(format!(
                "tracker needs 0 < M <= N, got M = {}, N = {}",
                initiate.m, initiate.n
            ));
        }
        if !(initiate.max_acc >= 0.0) {
            return config_error("tracker maxAcc must not be negative");
        }

        if let Some(spectrum) = &self.process.spectrum {
            if spectrum.bandwidth == 0 || spectrum.bandwidth > self.n_samples() {
                return config_error(format!(
                    "spectrum bandwidth {} must be in 1..={}",
                    spectrum.bandwidth,
                    self.n_samples()
                ));
            }
        }
        Ok(())
    }

    /// Samples per channel in one interval.
    pub fn n_samples(&self) -> usize {
        (self.process.data.cpi * self.capture.fs).floor() as usize
    }

    pub fn buffer_samples(&self) -> usize {
        (self.process.data.buffer * self.capture.fs).floor() as usize
    }

    pub fn wavelength(&self) -> Real {
        SPEED_OF_LIGHT / self.capture.fc
    }

    /// Bistatic range per delay bin (m).
    pub fn range_resolution(&self) -> Real {
        SPEED_OF_LIGHT / self.capture.fs
    }

    pub fn cfar(&self) -> CfarConfig {
        let detection = &self.process.detection;
        CfarConfig {
            pfa: detection.pfa,
            n_guard: detection.n_guard,
            n_train: detection.n_train,
            min_delay: detection.min_delay,
            min_doppler: detection.min_doppler,
        }
    }
}
