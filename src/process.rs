//! Stochastic processes: birth, death, transition and capacity-limited wrappers.

use crate::agent::Agent;
use crate::ordinal::Ordinal;
use crate::population::Population;
use crate::rate::{RateConst, check_rate};
use crate::state::State;
use anyhow::{Context, Result, bail};

/// Parent agent producing one child per event.
#[derive(Debug, Clone)]
pub struct Birth {
    parent: Agent,
    child: Agent,
    rate_const: RateConst,
}

/// Agent losing one instance per event.
#[derive(Debug, Clone)]
pub struct Death {
    agent: Agent,
    rate_const: RateConst,
}

/// One reactant instance turning into one product instance per event.
#[derive(Debug, Clone)]
pub struct Transition {
    reactant: Agent,
    product: Agent,
    rate_const: RateConst,
}

/// Base process switched off once the capped agents reach a capacity.
#[derive(Debug, Clone)]
pub struct Capped {
    base: Box<ProcessKind>,
    capped: Vec<Agent>,
    capacity: usize,
}

/// Closed set of process types.
#[derive(Debug, Clone)]
pub enum ProcessKind {
    Birth(Birth),
    Death(Death),
    Transition(Transition),
    Capped(Capped),
}

impl ProcessKind {
    /// Birth with rate `rate_const * count(parent)`; firing adds one `child`.
    pub fn birth(parent: Agent, child: Agent, rate_const: RateConst) -> Self {
        Self::Birth(Birth {
            parent,
            child,
            rate_const,
        })
    }

    /// Death with rate `rate_const * count(agent)`; firing removes one `agent`.
    pub fn death(agent: Agent, rate_const: RateConst) -> Self {
        Self::Death(Death { agent, rate_const })
    }

    /// Transition with rate `rate_const * count(reactant)`.
    ///
    /// # Errors
    /// Returns an error if `reactant` and `product` are the same agent.
    pub fn transition(reactant: Agent, product: Agent, rate_const: RateConst) -> Result<Self> {
        if reactant == product {
            bail!("transition reactant and product must differ, but both are {reactant}");
        }
        Ok(Self::Transition(Transition {
            reactant,
            product,
            rate_const,
        }))
    }

    /// Wrap `base` so its rate is zero while `capped` agents total at least `capacity`.
    ///
    /// # Errors
    /// Returns an error if `capacity` is zero.
    pub fn capped(base: ProcessKind, capped: Vec<Agent>, capacity: usize) -> Result<Self> {
        if capacity < 1 {
            bail!("capacity must be at least 1, but is {capacity}");
        }
        Ok(Self::Capped(Capped {
            base: Box::new(base),
            capped,
            capacity,
        }))
    }

    /// Compute the instantaneous rate from the current state.
    pub fn compute_rate(&self, state: &State) -> Result<f64> {
        let rate = match self {
            Self::Birth(p) => p.rate_const.value(state)? * state.count_agent(p.parent) as f64,
            Self::Death(p) => p.rate_const.value(state)? * state.count_agent(p.agent) as f64,
            Self::Transition(p) => {
                p.rate_const.value(state)? * state.count_agent(p.reactant) as f64
            }
            Self::Capped(p) => {
                // Hard ceiling: no throttling below capacity.
                if state.count_agents(&p.capped) >= p.capacity {
                    0.0
                } else {
                    p.base.compute_rate(state)?
                }
            }
        };
        check_rate(rate).context("invalid computed rate")?;
        Ok(rate)
    }

    /// Apply the population change of one event.
    pub fn update_population(&self, population: &mut Population) -> Result<()> {
        match self {
            Self::Birth(p) => population.add(p.child),
            Self::Death(p) => population.remove(p.agent),
            Self::Transition(p) => {
                population.remove(p.reactant)?;
                population.add(p.product)
            }
            Self::Capped(p) => p.base.update_population(population),
        }
    }

    /// Agents whose population this process adds to.
    pub fn affects(&self) -> Vec<Agent> {
        match self {
            Self::Birth(p) => vec![p.child],
            Self::Death(p) => vec![p.agent],
            Self::Transition(p) => vec![p.product],
            Self::Capped(p) => p.base.affects(),
        }
    }

    /// Agents whose counts enter the mass-action term of the rate.
    pub fn depends(&self) -> Vec<Agent> {
        match self {
            Self::Birth(p) => vec![p.parent],
            Self::Death(p) => vec![p.agent],
            Self::Transition(p) => vec![p.reactant],
            Self::Capped(p) => p.base.depends(),
        }
    }

    /// Every agent whose count changes when this process fires.
    pub fn mutates(&self) -> Vec<Agent> {
        match self {
            Self::Birth(p) => vec![p.child],
            Self::Death(p) => vec![p.agent],
            Self::Transition(p) => vec![p.reactant, p.product],
            Self::Capped(p) => p.base.mutates(),
        }
    }

    /// Every agent the rate reads, or `None` if the rate may read anything.
    pub fn rate_inputs(&self) -> Option<Vec<Agent>> {
        let mut inputs = match self {
            Self::Birth(p) => p.rate_const.inputs()?,
            Self::Death(p) => p.rate_const.inputs()?,
            Self::Transition(p) => p.rate_const.inputs()?,
            Self::Capped(p) => {
                let mut inputs = p.base.rate_inputs()?;
                inputs.extend_from_slice(&p.capped);
                inputs
            }
        };
        inputs.extend(self.depends());
        inputs.sort_unstable();
        inputs.dedup();
        Some(inputs)
    }

    /// Every agent referenced in any role, including capped and rate-constant agents.
    pub fn agents(&self) -> Vec<Agent> {
        let mut agents = match self {
            Self::Birth(p) => {
                let mut agents = vec![p.parent, p.child];
                agents.extend(p.rate_const.agents());
                agents
            }
            Self::Death(p) => {
                let mut agents = vec![p.agent];
                agents.extend(p.rate_const.agents());
                agents
            }
            Self::Transition(p) => {
                let mut agents = vec![p.reactant, p.product];
                agents.extend(p.rate_const.agents());
                agents
            }
            Self::Capped(p) => {
                let mut agents = p.base.agents();
                agents.extend_from_slice(&p.capped);
                agents
            }
        };
        agents.sort_unstable();
        agents.dedup();
        agents
    }
}

/// Registered process with its cached rate.
#[derive(Debug, Clone)]
pub struct Process {
    index: usize,
    kind: ProcessKind,
    rate: Option<f64>,
    fixed: bool,
}

impl Process {
    /// Create a process whose rate is computed from the state.
    ///
    /// The rate is unassigned until the first [`Process::update_rate`].
    pub fn new(index: usize, kind: ProcessKind) -> Self {
        Self {
            index,
            kind,
            rate: None,
            fixed: false,
        }
    }

    /// Create a process with a rate fixed at construction.
    ///
    /// # Errors
    /// Returns an error if `rate` is negative or not finite.
    pub fn fixed(index: usize, kind: ProcessKind, rate: f64) -> Result<Self> {
        check_rate(rate).context("invalid fixed rate")?;
        Ok(Self {
            index,
            kind,
            rate: Some(rate),
            fixed: true,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> &ProcessKind {
        &self.kind
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Compute the rate without caching it.
    pub fn compute_rate(&self, state: &State) -> Result<f64> {
        if self.fixed {
            return self.rate();
        }
        self.kind.compute_rate(state)
    }

    /// Recompute and cache the rate; fixed rates are left as they are.
    pub fn update_rate(&mut self, state: &State) -> Result<f64> {
        let rate = self
            .compute_rate(state)
            .with_context(|| format!("failed to compute rate of process {}", self.index))?;
        self.rate = Some(rate);
        Ok(rate)
    }

    /// Get the cached rate.
    ///
    /// # Errors
    /// Returns an error if no rate has been assigned yet.
    pub fn rate(&self) -> Result<f64> {
        self.rate
            .with_context(|| format!("rate of process {} requested before assignment", self.index))
    }

    pub fn update_population(&self, population: &mut Population) -> Result<()> {
        self.kind
            .update_population(population)
            .with_context(|| format!("failed to apply process {}", self.index))
    }

    pub fn affects(&self) -> Vec<Agent> {
        self.kind.affects()
    }

    pub fn depends(&self) -> Vec<Agent> {
        self.kind.depends()
    }
}

/// Ordered set of processes with dense indices.
#[derive(Debug, Default, Clone)]
pub struct ProcessSet {
    ordinal: Ordinal,
    procs: Vec<Process>,
}

impl ProcessSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a process with a state-dependent rate and return its index.
    pub fn register(&mut self, kind: ProcessKind) -> usize {
        let index = self.ordinal.next_index();
        self.procs.push(Process::new(index, kind));
        index
    }

    /// Register a process with a fixed rate and return its index.
    pub fn register_fixed(&mut self, kind: ProcessKind, rate: f64) -> Result<usize> {
        // The index is only taken once the process is known to be valid.
        let proc = Process::fixed(self.ordinal.issued(), kind, rate)?;
        let index = self.ordinal.next_index();
        self.procs.push(proc);
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.procs.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Process> {
        self.procs.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Process> {
        self.procs.get_mut(index)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Process> {
        self.procs.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentRegistry;

    const TOL: f64 = 1e-12;

    fn two_agents() -> (Agent, Agent) {
        let mut reg = AgentRegistry::new();
        (reg.register("a").unwrap(), reg.register("b").unwrap())
    }

    fn state_with(counts: Vec<usize>) -> State {
        State::new(Population::from_counts(counts))
    }

    fn constant(k: f64) -> RateConst {
        RateConst::constant(k).unwrap()
    }

    #[test]
    fn birth_rate_is_linear_in_parent_count() {
        let (a, b) = two_agents();
        let k = 0.37;
        let birth = ProcessKind::birth(a, b, constant(k));
        for n in [0, 1, 5, 1000] {
            let rate = birth.compute_rate(&state_with(vec![n, 3])).unwrap();
            assert!((rate - k * n as f64).abs() < TOL, "n = {n}, rate = {rate}");
        }
        assert_eq!(birth.affects(), vec![b]);
        assert_eq!(birth.depends(), vec![a]);
    }

    #[test]
    fn firing_death_removes_exactly_one() {
        let (a, _) = two_agents();
        let death = ProcessKind::death(a, constant(0.5));
        let mut pop = Population::from_counts(vec![2]);
        death.update_population(&mut pop).unwrap();
        assert_eq!(pop.count(a), 1);
        death.update_population(&mut pop).unwrap();
        assert!(death.update_population(&mut pop).is_err());
        assert_eq!(pop.count(a), 0);
        assert_eq!(death.affects(), death.depends());
    }

    #[test]
    fn transition_conserves_total() {
        let (a, b) = two_agents();
        let trans = ProcessKind::transition(a, b, constant(1.0)).unwrap();
        let mut pop = Population::from_counts(vec![4, 6]);
        trans.update_population(&mut pop).unwrap();
        assert_eq!(pop.count(a), 3);
        assert_eq!(pop.count(b), 7);
        assert_eq!(pop.total(&[a, b]), 10);
        assert_eq!(trans.affects(), vec![b]);
        assert_eq!(trans.depends(), vec![a]);
        assert_eq!(trans.mutates(), vec![a, b]);
    }

    #[test]
    fn self_transition_is_rejected_and_not_registered() {
        let (a, _) = two_agents();
        let mut procs = ProcessSet::new();
        let result = ProcessKind::transition(a, a, constant(1.0)).map(|kind| procs.register(kind));
        assert!(result.is_err());
        assert!(procs.is_empty());
    }

    #[test]
    fn capacity_is_a_hard_ceiling() {
        let (a, b) = two_agents();
        let base = ProcessKind::birth(a, a, constant(2.0));
        let capped = ProcessKind::capped(base.clone(), vec![a, b], 10).unwrap();
        // Totals L-1, L, L+1 with a fixed parent count so the base rate stays nonzero.
        for (count_b, expected) in [(5, 8.0), (6, 0.0), (7, 0.0)] {
            let state = state_with(vec![4, count_b]);
            assert_eq!(base.compute_rate(&state).unwrap(), 8.0);
            assert_eq!(capped.compute_rate(&state).unwrap(), expected);
        }
        assert_eq!(capped.affects(), base.affects());
        assert_eq!(capped.depends(), base.depends());
        assert_eq!(capped.rate_inputs(), Some(vec![a, b]));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let (a, _) = two_agents();
        let base = ProcessKind::death(a, constant(1.0));
        assert!(ProcessKind::capped(base, vec![a], 0).is_err());
    }

    #[test]
    fn capped_birth_scenario() {
        let (a, _) = two_agents();
        let base = ProcessKind::birth(a, a, constant(1.0));
        let mut proc = Process::new(0, ProcessKind::capped(base, vec![a], 5).unwrap());
        let mut state = state_with(vec![4]);
        assert_eq!(proc.update_rate(&state).unwrap(), 4.0);

        proc.update_population(state.population_mut()).unwrap();
        assert_eq!(state.count_agent(a), 5);
        assert_eq!(proc.update_rate(&state).unwrap(), 0.0);
    }

    #[test]
    fn rate_before_assignment_is_an_error() {
        let (a, _) = two_agents();
        let mut proc = Process::new(3, ProcessKind::death(a, constant(1.0)));
        let err = proc.rate().unwrap_err();
        assert!(format!("{err}").contains("before assignment"));
        proc.update_rate(&state_with(vec![2])).unwrap();
        assert_eq!(proc.rate().unwrap(), 2.0);
    }

    #[test]
    fn fixed_rate_is_not_recomputed() {
        let (a, _) = two_agents();
        let mut proc = Process::fixed(0, ProcessKind::death(a, constant(1.0)), 3.5).unwrap();
        assert_eq!(proc.rate().unwrap(), 3.5);
        assert_eq!(proc.update_rate(&state_with(vec![100])).unwrap(), 3.5);
        assert!(Process::fixed(0, ProcessKind::death(a, constant(1.0)), -1.0).is_err());
    }

    #[test]
    fn negative_rate_constant_propagates() {
        let (a, b) = two_agents();
        let birth = ProcessKind::birth(a, b, RateConst::custom(|_| -1.0));
        assert!(birth.compute_rate(&state_with(vec![1])).is_err());
    }

    #[test]
    fn opaque_rate_constant_has_no_known_inputs() {
        let (a, b) = two_agents();
        let birth = ProcessKind::birth(a, b, RateConst::custom(|_| 1.0));
        assert!(birth.rate_inputs().is_none());
        let density = RateConst::density_dependent(1.0, vec![b], 2.0).unwrap();
        let birth = ProcessKind::birth(a, a, density);
        assert_eq!(birth.rate_inputs(), Some(vec![a, b]));
    }

    #[test]
    fn registered_indices_are_dense() {
        let (a, b) = two_agents();
        let mut procs = ProcessSet::new();
        assert_eq!(procs.register(ProcessKind::death(a, constant(1.0))), 0);
        assert_eq!(procs.register(ProcessKind::death(b, constant(1.0))), 1);
        assert_eq!(
            procs
                .register_fixed(ProcessKind::birth(a, b, constant(1.0)), 2.0)
                .unwrap(),
            2
        );
        for (k, proc) in procs.iter().enumerate() {
            assert_eq!(proc.index(), k);
        }
    }

    #[test]
    fn rejected_fixed_rate_takes_no_index() {
        let (a, _) = two_agents();
        let mut procs = ProcessSet::new();
        assert!(
            procs
                .register_fixed(ProcessKind::death(a, constant(1.0)), -1.0)
                .is_err()
        );
        assert!(procs.is_empty());
        assert_eq!(procs.register(ProcessKind::death(a, constant(1.0))), 0);
    }

    #[test]
    fn agents_include_capped_and_rate_agents_of_opaque_bases() {
        let mut reg = AgentRegistry::new();
        let a = reg.register("a").unwrap();
        let b = reg.register("b").unwrap();
        let c = reg.register("c").unwrap();
        let base = ProcessKind::birth(a, a, RateConst::custom(|_| 1.0));
        let capped = ProcessKind::capped(base, vec![b], 1).unwrap();
        assert!(capped.rate_inputs().is_none());
        assert_eq!(capped.agents(), vec![a, b]);

        let density = RateConst::density_dependent(1.0, vec![c], 2.0).unwrap();
        let trans = ProcessKind::transition(a, b, density).unwrap();
        assert_eq!(trans.agents(), vec![a, b, c]);
    }
}
