mod ambiguity;
mod buffer;
mod capture;
mod centroid;
mod cfar;
mod clutter;
mod common;
mod config;
mod detection;
mod error;
mod hamming;
mod interpolate;
mod map;
mod output;
mod pipeline;
mod spectrum;
mod track;
mod tracker;
pub mod video;

pub use ambiguity::Ambiguity;
pub use buffer::{IqData, SampleBuffer};
pub use capture::{read_replay_file, ReplayReader, Source};
pub use centroid::Centroid;
pub use cfar::{threshold_factor, CfarConfig, CfarDetector1D};
pub use clutter::WienerHopf;
pub use common::*;
pub use config::{
    AmbiguityConfig, CaptureConfig, ClutterConfig, Config, DataConfig, DetectionConfig,
    InitiateConfig, InterpolateConfig, ProcessConfig, SaveConfig, SourceConfig, SpectrumConfig,
    TrackerSection,
};
pub use detection::{Detection, DetectionFrame, Plot};
pub use error::{Error, Result};
pub use hamming::next_hamming;
pub use interpolate::{parabolic_peak, Interpolate};
pub use map::{CpxMatrix, Map, MapFrame, RealMatrix};
pub use output::Recorder;
pub use pipeline::{Interval, Pipeline};
pub use spectrum::{SpectrumAnalyser, SpectrumFrame};
pub use track::{format_id, State, Track, TrackFrame, TrackSummary};
pub use tracker::{Tracker, TrackerConfig};
