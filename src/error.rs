use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("insufficient samples: needed {needed}, available {available}")]
    InsufficientSamples { needed: usize, available: usize },

    #[error("cholesky factorisation failed: matrix not positive definite")]
    Cholesky,

    #[error("triangular solve failed at row {0}")]
    Solve(usize),

    #[error("track index {index} out of range for {len} tracks")]
    TrackIndex { index: usize, len: usize },

    #[error("parallel detection arrays differ in length ({delay}, {doppler}, {snr})")]
    LengthMismatch {
        delay: usize,
        doppler: usize,
        snr: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Failures that only invalidate the current interval.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Cholesky | Error::Solve(_) | Error::InsufficientSamples { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Shorthand used by constructors to reject a configuration.
pub(crate) fn config_error<T>(msg: impl Into<String>) -> Result<T> {
    Err(Error::Config(msg.into()))
}
