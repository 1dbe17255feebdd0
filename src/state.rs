use crate::agent::Agent;
use crate::population::Population;
use crate::stats::Accumulator;
use serde::{Deserialize, Serialize};

/// A fired process and the simulated time at which it fired.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Index of the process in its process set.
    pub process: usize,
    /// Simulated time after the event.
    pub time: f64,
}

/// Current state of a simulation.
///
/// There is one state per simulation; it is updated in place after every
/// event and is the single source of truth for rate computations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    population: Population,
    time: f64,
    last_event: Option<Event>,
    n_events: u64,
    fire_counts: Vec<u64>,
    /// Count of every agent weighted by the time it was held, indexed by agent.
    occupancy: Vec<Accumulator>,
}

impl State {
    /// Create a state at time zero with no events.
    pub fn new(population: Population) -> Self {
        Self {
            population,
            time: 0.0,
            last_event: None,
            n_events: 0,
            fire_counts: Vec::new(),
            occupancy: Vec::new(),
        }
    }

    pub fn count_agent(&self, agent: Agent) -> usize {
        self.population.count(agent)
    }

    /// Sum of the counts of all given agents.
    pub fn count_agents(&self, agents: &[Agent]) -> usize {
        self.population.total(agents)
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn last_event(&self) -> Option<Event> {
        self.last_event
    }

    pub fn n_events(&self) -> u64 {
        self.n_events
    }

    /// Number of times each process has fired, indexed by process.
    pub fn fire_counts(&self) -> &[u64] {
        &self.fire_counts
    }

    /// Time-weighted statistics of every agent count since time zero.
    ///
    /// The counts after the last event are not included until time advances.
    pub fn occupancy(&self) -> &[Accumulator] {
        &self.occupancy
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub(crate) fn population_mut(&mut self) -> &mut Population {
        &mut self.population
    }

    /// Move the clock to `time`, crediting the current counts with the elapsed time.
    pub(crate) fn advance(&mut self, time: f64) {
        let counts = self.population.counts();
        if self.occupancy.len() < counts.len() {
            self.occupancy.resize_with(counts.len(), Accumulator::new);
        }
        let elapsed = time - self.time;
        for (i_agent, acc) in self.occupancy.iter_mut().enumerate() {
            let count = counts.get(i_agent).copied().unwrap_or(0);
            acc.add(count as f64, elapsed);
        }
        self.time = time;
    }

    pub(crate) fn record_event(&mut self, event: Event) {
        self.last_event = Some(event);
        self.n_events += 1;
        if event.process >= self.fire_counts.len() {
            self.fire_counts.resize(event.process + 1, 0);
        }
        self.fire_counts[event.process] += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentRegistry;

    #[test]
    fn recording_events_updates_bookkeeping() {
        let mut reg = AgentRegistry::new();
        let a = reg.register("a").unwrap();
        let b = reg.register("b").unwrap();
        let mut state = State::new(Population::from_counts(vec![3, 4]));
        assert_eq!(state.last_event(), None);
        assert_eq!(state.count_agents(&[a, b]), 7);

        state.advance(0.5);
        state.record_event(Event { process: 2, time: 0.5 });
        state.advance(0.75);
        state.record_event(Event { process: 0, time: 0.75 });
        assert_eq!(state.time(), 0.75);
        assert_eq!(state.n_events(), 2);
        assert_eq!(state.last_event(), Some(Event { process: 0, time: 0.75 }));
        assert_eq!(state.fire_counts(), &[1, 0, 1]);
        assert_eq!(state.count_agent(b), 4);
    }

    #[test]
    fn occupancy_weights_counts_by_holding_time() {
        let mut reg = AgentRegistry::new();
        let a = reg.register("a").unwrap();
        let mut state = State::new(Population::from_counts(vec![2]));

        // 2 held over [0, 1), then 1 over [1, 3).
        state.advance(1.0);
        state.population_mut().remove(a).unwrap();
        state.advance(3.0);
        state.population_mut().remove(a).unwrap();

        let report = state.occupancy()[0].report();
        assert!((report.mean - 4.0 / 3.0).abs() < 1e-12);
        assert!((report.std_dev - (2.0f64 / 9.0).sqrt()).abs() < 1e-12);
        assert_eq!(state.time(), 3.0);
    }
}
