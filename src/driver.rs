//! Kinetic Monte Carlo event loop.

use crate::model::Model;
use crate::population::Population;
use crate::record::Recorder;
use crate::state::{Event, State};
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::{Exp, weighted::WeightedIndex};

/// Stochastic simulation of one model replica.
///
/// Owns its model, state and random number generator, so independent
/// replicas never share anything.
#[derive(Debug)]
pub struct Driver {
    model: Model,
    state: State,
    rng: ChaCha12Rng,
}

impl Driver {
    /// Create a driver at time zero and assign every rate.
    pub fn new(model: Model, population: Population, rng: ChaCha12Rng) -> Result<Self> {
        Self::resume(model, State::new(population), rng)
    }

    /// Create a driver from an existing state and assign every rate.
    pub fn resume(mut model: Model, state: State, rng: ChaCha12Rng) -> Result<Self> {
        model
            .refresh_all(&state)
            .context("failed to assign initial rates")?;
        Ok(Self { model, state, rng })
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn rng(&self) -> &ChaCha12Rng {
        &self.rng
    }

    /// Get the cached rate of every process, indexed by process.
    pub fn rates(&self) -> Result<Vec<f64>> {
        self.model.processes().iter().map(|p| p.rate()).collect()
    }

    /// Get the sum of all process rates.
    ///
    /// # Errors
    /// Returns an error if the total is negative or not finite.
    pub fn total_rate(&self) -> Result<f64> {
        let total = self.rates()?.iter().sum();
        check_total(total)?;
        Ok(total)
    }

    /// Simulate the next event.
    ///
    /// Returns `None` once the total rate is zero: no process can fire anymore.
    pub fn step(&mut self) -> Result<Option<Event>> {
        let rates = self.rates().context("failed to collect rates")?;
        let total: f64 = rates.iter().sum();
        check_total(total)?;
        if total == 0.0 {
            return Ok(None);
        }

        let time_dist = Exp::new(total)?;
        let dt = time_dist.sample(&mut self.rng);

        let proc_dist = WeightedIndex::new(&rates)?;
        let i_proc = proc_dist.sample(&mut self.rng);

        let event = self
            .fire(i_proc, self.state.time() + dt)
            .with_context(|| format!("failed to fire process {i_proc}"))?;
        Ok(Some(event))
    }

    /// Apply one event of `process` at `time` and refresh the affected rates.
    pub fn fire(&mut self, process: usize, time: f64) -> Result<Event> {
        if time < self.state.time() {
            bail!(
                "event time {time} precedes current time {}",
                self.state.time()
            );
        }
        let proc = self
            .model
            .processes()
            .get(process)
            .with_context(|| format!("unknown process {process}"))?;
        self.state.advance(time);
        proc.update_population(self.state.population_mut())?;

        let event = Event { process, time };
        self.state.record_event(event);
        log::debug!("{event:?}");

        self.model
            .refresh_dependents(process, &self.state)
            .context("failed to refresh rates")?;
        Ok(event)
    }

    /// Simulate up to `n_steps` events, feeding each one to `recorder`.
    ///
    /// Returns the number of events simulated, which is smaller than
    /// `n_steps` only if a fixed point was reached.
    pub fn run_with(&mut self, n_steps: u64, recorder: &mut dyn Recorder) -> Result<u64> {
        for i_step in 0..n_steps {
            match self.step()? {
                Some(event) => recorder
                    .record_event(event, &self.state)
                    .context("failed to record event")?,
                None => return Ok(i_step),
            }
        }
        Ok(n_steps)
    }
}

fn check_total(total: f64) -> Result<()> {
    if !total.is_finite() || total < 0.0 {
        bail!("total rate must be non-negative and finite, but is {total}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentRegistry;
    use crate::process::{ProcessKind, ProcessSet};
    use crate::rate::RateConst;
    use crate::record::CountLog;

    const TOL: f64 = 1e-12;

    fn constant(k: f64) -> RateConst {
        RateConst::constant(k).unwrap()
    }

    fn rng() -> ChaCha12Rng {
        ChaCha12Rng::seed_from_u64(42)
    }

    fn birth_death(n_init: usize) -> Driver {
        let mut reg = AgentRegistry::new();
        let a = reg.register("A").unwrap();
        let mut procs = ProcessSet::new();
        procs.register(ProcessKind::birth(a, a, constant(2.0)));
        procs.register(ProcessKind::death(a, constant(0.5)));
        let model = Model::new(reg, procs).unwrap();
        Driver::new(model, Population::from_counts(vec![n_init]), rng()).unwrap()
    }

    #[test]
    fn birth_death_scenario() {
        let mut driver = birth_death(10);
        let rates = driver.rates().unwrap();
        assert!((rates[0] - 20.0).abs() < TOL);
        assert!((rates[1] - 5.0).abs() < TOL);
        assert!((driver.total_rate().unwrap() - 25.0).abs() < TOL);

        let event = driver.fire(0, 0.1).unwrap();
        assert_eq!(event.process, 0);
        assert_eq!(driver.state().population().counts(), &[11]);
        let rates = driver.rates().unwrap();
        assert!((rates[0] - 22.0).abs() < TOL);
        assert!((rates[1] - 5.5).abs() < TOL);
        assert_eq!(driver.state().last_event(), Some(event));
    }

    #[test]
    fn capped_birth_stops_at_capacity() {
        let mut reg = AgentRegistry::new();
        let a = reg.register("A").unwrap();
        let mut procs = ProcessSet::new();
        let base = ProcessKind::birth(a, a, constant(1.0));
        procs.register(ProcessKind::capped(base, vec![a], 5).unwrap());
        let model = Model::new(reg, procs).unwrap();
        let mut driver = Driver::new(model, Population::from_counts(vec![4]), rng()).unwrap();

        assert_eq!(driver.total_rate().unwrap(), 4.0);
        let event = driver.step().unwrap().expect("expected an event");
        assert!(event.time > 0.0);
        assert_eq!(driver.state().count_agent(a), 5);
        assert_eq!(driver.total_rate().unwrap(), 0.0);
        assert_eq!(driver.step().unwrap(), None);
    }

    #[test]
    fn transitions_drain_reactant_then_stop() {
        let mut reg = AgentRegistry::new();
        let a = reg.register("A").unwrap();
        let b = reg.register("B").unwrap();
        let mut procs = ProcessSet::new();
        procs.register(ProcessKind::transition(a, b, constant(0.3)).unwrap());
        let model = Model::new(reg, procs).unwrap();
        let mut driver = Driver::new(model, Population::from_counts(vec![6, 1]), rng()).unwrap();

        let mut log = CountLog::new();
        let n_events = driver.run_with(100, &mut log).unwrap();
        assert_eq!(n_events, 6);
        for counts in &log.counts {
            assert_eq!(counts.iter().sum::<usize>(), 7);
        }
        assert_eq!(driver.state().count_agent(a), 0);
        assert_eq!(driver.state().count_agent(b), 7);
    }

    #[test]
    fn event_times_increase_and_counts_stay_valid() {
        let mut driver = birth_death(3);
        let mut log = CountLog::new();
        driver.run_with(500, &mut log).unwrap();
        let mut last = 0.0;
        for event in &log.events {
            assert!(event.time > last);
            last = event.time;
        }
        assert_eq!(driver.state().n_events(), log.events.len() as u64);
        let fired: u64 = driver.state().fire_counts().iter().sum();
        assert_eq!(fired, log.events.len() as u64);
    }

    #[test]
    fn pure_death_reaches_fixed_point() {
        let mut reg = AgentRegistry::new();
        let a = reg.register("A").unwrap();
        let mut procs = ProcessSet::new();
        procs.register(ProcessKind::death(a, constant(1.0)));
        let model = Model::new(reg, procs).unwrap();
        let mut driver = Driver::new(model, Population::from_counts(vec![20]), rng()).unwrap();

        let mut log = CountLog::new();
        assert_eq!(driver.run_with(1000, &mut log).unwrap(), 20);
        assert_eq!(driver.state().count_agent(a), 0);
        assert_eq!(driver.step().unwrap(), None);
    }

    #[test]
    fn same_seed_gives_same_trajectory() {
        let mut first = birth_death(10);
        let mut second = birth_death(10);
        let mut log_first = CountLog::new();
        let mut log_second = CountLog::new();
        first.run_with(200, &mut log_first).unwrap();
        second.run_with(200, &mut log_second).unwrap();
        assert_eq!(log_first.events, log_second.events);
        assert_eq!(first.state(), second.state());
    }

    #[test]
    fn opaque_rates_are_refreshed_every_event() {
        let mut reg = AgentRegistry::new();
        let a = reg.register("A").unwrap();
        let b = reg.register("B").unwrap();
        let mut procs = ProcessSet::new();
        procs.register(ProcessKind::birth(a, a, constant(1.0)));
        // Reads A through an opaque function while depending on B.
        let k = RateConst::custom(move |state| state.count_agent(a) as f64);
        procs.register(ProcessKind::death(b, k));
        let model = Model::new(reg, procs).unwrap();
        let mut driver = Driver::new(model, Population::from_counts(vec![2, 1]), rng()).unwrap();

        driver.fire(0, 1.0).unwrap();
        assert_eq!(driver.rates().unwrap(), vec![3.0, 3.0]);
    }

    #[test]
    fn negative_state_dependent_rate_aborts() {
        let mut reg = AgentRegistry::new();
        let a = reg.register("A").unwrap();
        let mut procs = ProcessSet::new();
        procs.register(ProcessKind::birth(a, a, constant(1.0)));
        let k = RateConst::custom(move |state| 3.0 - state.count_agent(a) as f64);
        procs.register(ProcessKind::death(a, k));
        let model = Model::new(reg, procs).unwrap();
        let mut driver = Driver::new(model, Population::from_counts(vec![2]), rng()).unwrap();

        assert!(driver.fire(0, 1.0).is_ok());
        assert!(driver.fire(0, 2.0).is_err());
    }

    #[test]
    fn counts_are_weighted_by_time_between_events() {
        let mut driver = birth_death(10);
        driver.fire(0, 0.5).unwrap();
        driver.fire(1, 2.0).unwrap();
        // 10 held for 0.5, then 11 for 1.5.
        let report = driver.state().occupancy()[0].report();
        assert!((report.mean - 10.75).abs() < TOL);
        assert_eq!(driver.state().population().counts(), &[10]);
    }

    #[test]
    fn events_cannot_go_back_in_time() {
        let mut driver = birth_death(1);
        driver.fire(0, 2.0).unwrap();
        assert!(driver.fire(0, 1.0).is_err());
    }
}
