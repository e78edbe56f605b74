use crate::common::{Real, Storable};
use crate::config::SaveConfig;
use crate::error::Result;
use crate::pipeline::Interval;

use log::info;

use std::fs;
use std::path::{Path, PathBuf};

/// Appends the enabled per-interval products as JSON lines, one file per
/// product under the save directory.
pub struct Recorder {
    config: SaveConfig,
    fs: Real,
    map: PathBuf,
    detection: PathBuf,
    track: PathBuf,
    spectrum: PathBuf,
}

impl Recorder {
    /// Files are named `<prefix>.<product>.jsonl`.
    pub fn new(config: &SaveConfig, fs: Real, prefix: &str) -> Result<Self> {
        if config.any() {
            fs::create_dir_all(&config.path)?;
            info!("recording to {}", config.path.display());
        }
        let file = |product: &str| config.path.join(format!("{}.{}.jsonl", prefix, product));
        Ok(Self {
            config: config.clone(),
            fs,
            map: file("map"),
            detection: file("detection"),
            track: file("track"),
            spectrum: file("spectrum"),
        })
    }

    pub fn map_path(&self) -> &Path {
        &self.map
    }

    pub fn detection_path(&self) -> &Path {
        &self.detection
    }

    pub fn track_path(&self) -> &Path {
        &self.track
    }

    pub fn spectrum_path(&self) -> &Path {
        &self.spectrum
    }

    pub fn record(&mut self, interval: &Interval<'_>) -> Result<()> {
        let ts = interval.timestamp;
        let km = self.config.km;

        if self.config.map {
            let frame = interval.map.to_frame(ts);
            let frame = if km { frame.in_km(self.fs) } else { frame };
            frame.append_to(&self.map)?;
        }
        if self.config.detection {
            let frame = interval.detection.to_frame(ts);
            let frame = if km { frame.in_km(self.fs) } else { frame };
            frame.append_to(&self.detection)?;
        }
        if self.config.track {
            let frame = interval.track.to_frame(ts);
            let frame = if km { frame.in_km(self.fs) } else { frame };
            frame.append_to(&self.track)?;
        }
        if self.config.spectrum {
            if let Some(frame) = &interval.spectrum {
                frame.append_to(&self.spectrum)?;
            }
        }
        Ok(())
    }
}
