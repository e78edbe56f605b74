use crate::common::{delay_bin_to_km, Real, Storable};
use crate::detection::Plot;
use crate::error::{Error, Result};

use serde::Serialize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Tentative,
    Associated,
    Active,
    Coasting,
}

impl State {
    /// States that count towards M-of-N promotion.
    pub fn is_confirmed(self) -> bool {
        matches!(self, State::Active | State::Associated)
    }
}

/// Everything known about one track.
#[derive(Debug, Clone)]
struct Record {
    id: u16,
    state: Vec<State>,
    current: Plot,
    acceleration: Real,
    associated: Vec<Plot>,
    n_inactive: u64,
}

/// Track store. Tracks are addressed by index, which shifts down when an
/// earlier track is removed; removing a track removes all of its fields.
#[derive(Debug, Clone, Default)]
pub struct Track {
    records: Vec<Record>,
    i_next: u16,
}

/// Four digit upper case hex identifier.
pub fn format_id(id: u16) -> String {
    format!("{:04X}", id)
}

impl Track {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, index: usize) -> Result<&Record> {
        let len = self.records.len();
        self.records
            .get(index)
            .ok_or(Error::TrackIndex { index, len })
    }

    fn record_mut(&mut self, index: usize) -> Result<&mut Record> {
        let len = self.records.len();
        self.records
            .get_mut(index)
            .ok_or(Error::TrackIndex { index, len })
    }

    /// New TENTATIVE track at `initial`, returning its index.
    pub fn add(&mut self, initial: Plot) -> usize {
        self.records.push(Record {
            id: self.i_next,
            state: vec![State::Tentative],
            current: initial,
            acceleration: 0.0,
            associated: vec![initial],
            n_inactive: 0,
        });
        self.i_next = self.i_next.wrapping_add(1);
        self.records.len() - 1
    }

    pub fn remove(&mut self, index: usize) -> Result<()> {
        self.record(index)?;
        self.records.remove(index);
        Ok(())
    }

    /// Remove every track whose flag is set, in one pass.
    pub fn remove_marked(&mut self, marked: &[bool]) -> Result<usize> {
        if marked.len() != self.records.len() {
            return Err(Error::TrackIndex {
                index: marked.len(),
                len: self.records.len(),
            });
        }
        let before = self.records.len();
        let mut flags = marked.iter();
        self.records
            .retain(|_| !flags.next().copied().unwrap_or(false));
        Ok(before - self.records.len())
    }

    /// Append to the state history.
    pub fn set_state(&mut self, index: usize, state: State) -> Result<()> {
        self.record_mut(index)?.state.push(state);
        Ok(())
    }

    /// Replace the current position and append it to the associated history.
    pub fn set_current(&mut self, index: usize, current: Plot) -> Result<()> {
        let record = self.record_mut(index)?;
        record.current = current;
        record.associated.push(current);
        Ok(())
    }

    pub fn set_acceleration(&mut self, index: usize, acceleration: Real) -> Result<()> {
        self.record_mut(index)?.acceleration = acceleration;
        Ok(())
    }

    pub fn set_n_inactive(&mut self, index: usize, n: u64) -> Result<()> {
        self.record_mut(index)?.n_inactive = n;
        Ok(())
    }

    /// Mark the latest state ACTIVE if at least `m` of the last `n` states
    /// are ACTIVE or ASSOCIATED.
    pub fn promote(&mut self, index: usize, m: usize, n: usize) -> Result<bool> {
        let record = self.record_mut(index)?;
        let len = record.state.len();
        if n == 0 || len < n {
            return Ok(false);
        }
        let confirmed = record.state[len - n..]
            .iter()
            .filter(|s| s.is_confirmed())
            .count();
        if confirmed >= m {
            record.state[len - 1] = State::Active;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn id(&self, index: usize) -> Result<String> {
        Ok(format_id(self.record(index)?.id))
    }

    pub fn state(&self, index: usize) -> Result<State> {
        let record = self.record(index)?;
        Ok(*record.state.last().unwrap_or(&State::Tentative))
    }

    pub fn state_history(&self, index: usize) -> Result<&[State]> {
        Ok(&self.record(index)?.state)
    }

    pub fn current(&self, index: usize) -> Result<Plot> {
        Ok(self.record(index)?.current)
    }

    pub fn acceleration(&self, index: usize) -> Result<Real> {
        Ok(self.record(index)?.acceleration)
    }

    pub fn associated(&self, index: usize) -> Result<&[Plot]> {
        Ok(&self.record(index)?.associated)
    }

    pub fn n_inactive(&self, index: usize) -> Result<u64> {
        Ok(self.record(index)?.n_inactive)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn count_in(&self, state: State) -> usize {
        self.records
            .iter()
            .filter(|r| r.state.last() == Some(&state))
            .count()
    }

    pub fn n_active(&self) -> usize {
        self.count_in(State::Active)
    }

    pub fn n_tentative(&self) -> usize {
        self.count_in(State::Tentative)
    }

    /// Snapshot of every non-tentative track.
    pub fn to_frame(&self, timestamp: u64) -> TrackFrame {
        let data = self
            .records
            .iter()
            .filter_map(|r| {
                let state = *r.state.last()?;
                if state == State::Tentative {
                    return None;
                }
                Some(TrackSummary {
                    id: format_id(r.id),
                    state,
                    delay: r.current.delay,
                    doppler: r.current.doppler,
                    acceleration: r.acceleration,
                    n_associated: r.associated.len(),
                    associated: r.associated.clone(),
                })
            })
            .collect();

        TrackFrame {
            timestamp,
            n: self.len(),
            n_active: self.n_active(),
            n_tentative: self.n_tentative(),
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSummary {
    pub id: String,
    pub state: State,
    pub delay: Real,
    pub doppler: Real,
    pub acceleration: Real,
    pub n_associated: usize,
    pub associated: Vec<Plot>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackFrame {
    pub timestamp: u64,
    pub n: usize,
    pub n_active: usize,
    pub n_tentative: usize,
    pub data: Vec<TrackSummary>,
}

impl TrackFrame {
    pub fn in_km(mut self, sample_rate: Real) -> Self {
        for summary in self.data.iter_mut() {
            summary.delay = delay_bin_to_km(summary.delay, sample_rate);
            summary
                .associated
                .iter_mut()
                .for_each(|p| p.delay = delay_bin_to_km(p.delay, sample_rate));
        }
        self
    }
}

impl Storable for TrackFrame {}
