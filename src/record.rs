//! Simulation output types.

use crate::state::{Event, State};
use crate::stats::Accumulator;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Record of the simulation at a single save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Number of events simulated so far.
    pub step: u64,

    /// Current simulation time.
    pub time: f64,

    /// Last fired event (`None` before the first event).
    pub event: Option<Event>,

    /// Count of every agent, indexed by agent.
    pub counts: Vec<usize>,

    /// Number of times every process has fired, indexed by process.
    pub fire_counts: Vec<u64>,

    /// Time-weighted statistics of every agent count since time zero, indexed by agent.
    pub occupancy: Vec<Accumulator>,

    /// No process can fire anymore.
    pub fixed_point: bool,
}

impl Record {
    /// Take a snapshot of `state` for a model with `n_agents` agents and `n_procs` processes.
    pub fn new(state: &State, n_agents: usize, n_procs: usize, fixed_point: bool) -> Self {
        let mut counts = state.population().counts().to_vec();
        counts.resize(n_agents, 0);
        let mut fire_counts = state.fire_counts().to_vec();
        fire_counts.resize(n_procs, 0);
        let mut occupancy = state.occupancy().to_vec();
        occupancy.resize_with(n_agents, Accumulator::new);
        Self {
            step: state.n_events(),
            time: state.time(),
            event: state.last_event(),
            counts,
            fire_counts,
            occupancy,
            fixed_point,
        }
    }
}

/// Sink fed after every simulated event.
///
/// A persistence layer implements this to store `(time, process)` and
/// `(time, agent, count)` tuples; batching and transactions are its concern.
pub trait Recorder {
    fn record_event(&mut self, event: Event, state: &State) -> Result<()>;
}

/// In-memory recorder of every event with the counts right after it.
#[derive(Debug, Default)]
pub struct CountLog {
    pub events: Vec<Event>,
    pub counts: Vec<Vec<usize>>,
}

impl CountLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Recorder for CountLog {
    fn record_event(&mut self, event: Event, state: &State) -> Result<()> {
        self.events.push(event);
        self.counts.push(state.population().counts().to_vec());
        Ok(())
    }
}
