use crate::buffer::{IqData, SampleBuffer};
use crate::common::Real;
use crate::config::{Config, SourceConfig};
use crate::error::Result;
use crate::video::Simulator;

use log::{info, warn};
use num::complex::Complex64;

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Bytes per sample pair: `i1 q1 i2 q2`, little endian `i16`.
const FRAME_BYTES: usize = 8;

/// Chunks pushed per second by the producer loop.
const CHUNKS_PER_SECOND: Real = 100.0;

fn decode_frame(bytes: &[u8]) -> (Complex64, Complex64) {
    let word = |k: usize| i16::from_le_bytes([bytes[2 * k], bytes[2 * k + 1]]) as Real;
    let reference = Complex64::new(word(0), word(1));
    let surveillance = Complex64::new(word(2), word(3));
    (reference, surveillance)
}

/// Two-channel recording of interleaved reference and surveillance samples.
pub struct ReplayReader {
    path: PathBuf,
    reader: BufReader<File>,
    looping: bool,
    n_read: u64,
}

impl ReplayReader {
    pub fn open(path: &Path, looping: bool) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            looping,
            n_read: 0,
        })
    }

    pub fn samples_read(&self) -> u64 {
        self.n_read
    }

    /// Fill `buf` from the file, returning the bytes read. Short only at
    /// end of file.
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(k) => filled += k,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// Up to `n` samples per channel. Fewer are returned only when a
    /// non-looping file runs out; an empty result means the end.
    pub fn read(&mut self, n: usize) -> Result<(Vec<Complex64>, Vec<Complex64>)> {
        let mut reference = Vec::with_capacity(n);
        let mut surveillance = Vec::with_capacity(n);
        let mut buf = vec![0u8; n * FRAME_BYTES];
        let mut rewound = false;

        while reference.len() < n {
            let want = (n - reference.len()) * FRAME_BYTES;
            let got = self.fill(&mut buf[..want])?;
            for frame in buf[..got].chunks_exact(FRAME_BYTES) {
                let (r, s) = decode_frame(frame);
                reference.push(r);
                surveillance.push(s);
            }
            if got == want {
                break;
            }
            // end of file, a trailing partial frame is discarded
            if !self.looping || (rewound && got < FRAME_BYTES) {
                break;
            }
            info!("replay of {} restarting", self.path.display());
            self.reader.seek(SeekFrom::Start(0))?;
            rewound = true;
        }

        self.n_read += reference.len() as u64;
        Ok((reference, surveillance))
    }
}

/// Read up to `capacity` leading sample pairs of a recording into two
/// fresh buffers.
pub fn read_replay_file(path: &Path, capacity: usize) -> Result<(IqData, IqData)> {
    let mut reader = ReplayReader::open(path, false)?;
    let (reference, surveillance) = reader.read(capacity)?;
    let mut x = IqData::new(capacity)?;
    let mut y = IqData::new(capacity)?;
    x.extend(reference);
    y.extend(surveillance);
    Ok((x, y))
}

/// Where the two channels come from.
pub enum Source {
    Simulator(Simulator),
    Replay(ReplayReader),
}

impl Source {
    pub fn from_config(config: &Config) -> Result<Self> {
        match &config.capture.source {
            SourceConfig::Simulator { seed, scene } => Ok(Source::Simulator(Simulator::new(
                config.capture.fs,
                scene.clone(),
                *seed,
            )?)),
            SourceConfig::Replay { path, looping } => {
                Ok(Source::Replay(ReplayReader::open(path, *looping)?))
            }
        }
    }

    /// Next `len` samples per channel, `None` once the source is exhausted.
    pub fn next_chunk(&mut self, len: usize) -> Result<Option<(Vec<Complex64>, Vec<Complex64>)>> {
        match self {
            Source::Simulator(simulator) => Ok(Some(simulator.next_chunk(len))),
            Source::Replay(reader) => {
                let chunk = reader.read(len)?;
                if chunk.0.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(chunk))
                }
            }
        }
    }

    /// Producer loop. Pushes chunks into both buffers at the sample rate
    /// until `running` is cleared or the source ends, then clears `running`.
    pub fn run(
        mut self,
        reference: Arc<SampleBuffer>,
        surveillance: Arc<SampleBuffer>,
        fs: Real,
        running: Arc<AtomicBool>,
    ) -> Result<()> {
        let chunk = ((fs / CHUNKS_PER_SECOND) as usize).max(1);
        let start = Instant::now();
        let mut pushed: u64 = 0;

        while running.load(Ordering::Acquire) {
            let (x, y) = match self.next_chunk(chunk) {
                Ok(Some(samples)) => samples,
                Ok(None) => {
                    warn!("source exhausted after {} samples", pushed);
                    break;
                }
                Err(e) => {
                    running.store(false, Ordering::Release);
                    return Err(e);
                }
            };
            pushed += x.len() as u64;

            let dropped = {
                let mut r = reference.lock();
                let mut s = surveillance.lock();
                r.extend(x) + s.extend(y)
            };
            if dropped > 0 {
                warn!("capture overrun, dropped {} samples", dropped);
            }

            let due = Duration::from_secs_f64(pushed as Real / fs);
            if let Some(wait) = due.checked_sub(start.elapsed()) {
                thread::sleep(wait);
            }
        }

        running.store(false, Ordering::Release);
        Ok(())
    }
}
