//! Validated model: agents, processes and their rate dependencies.

use crate::agent::{Agent, AgentRegistry, validate_list};
use crate::config::{ModelConfig, ProcessConfig, RateConfig};
use crate::process::{ProcessKind, ProcessSet};
use crate::rate::RateConst;
use crate::state::State;
use anyhow::{Context, Result, bail};

/// Agents, processes and the dependency graph between processes.
#[derive(Debug, Clone)]
pub struct Model {
    registry: AgentRegistry,
    processes: ProcessSet,
    /// For each process, the processes whose rate must be refreshed after it fires.
    dependents: Vec<Vec<usize>>,
}

impl Model {
    /// Assemble a model.
    ///
    /// # Errors
    /// Returns an error if the agent list is not densely indexed or if a
    /// process references an agent missing from the registry.
    pub fn new(registry: AgentRegistry, processes: ProcessSet) -> Result<Self> {
        validate_list(registry.agents()).context("invalid agent list")?;

        for proc in processes.iter() {
            for agent in proc.kind().agents() {
                if !registry.contains(agent) {
                    bail!("process {} references unregistered {agent}", proc.index());
                }
            }
        }

        let dependents = build_dependents(&processes);

        Ok(Self {
            registry,
            processes,
            dependents,
        })
    }

    /// Build a model from its configuration.
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let mut registry = AgentRegistry::new();
        for name in &cfg.agents {
            registry
                .register(name)
                .with_context(|| format!("failed to register agent {name:?}"))?;
        }

        let mut processes = ProcessSet::new();
        for (i_proc, proc_cfg) in cfg.processes.iter().enumerate() {
            let kind = build_kind(proc_cfg, &registry)
                .with_context(|| format!("failed to build process {i_proc}"))?;
            processes.register(kind);
        }

        Self::new(registry, processes)
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn agents(&self) -> &[Agent] {
        self.registry.agents()
    }

    pub fn processes(&self) -> &ProcessSet {
        &self.processes
    }

    /// Processes whose rate must be refreshed after `process` fires.
    pub fn dependents(&self, process: usize) -> &[usize] {
        self.dependents
            .get(process)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Assign the rate of every process.
    pub(crate) fn refresh_all(&mut self, state: &State) -> Result<()> {
        for proc in self.processes.iter_mut() {
            proc.update_rate(state)?;
        }
        Ok(())
    }

    /// Refresh the rate of every process depending on what `fired` mutates.
    pub(crate) fn refresh_dependents(&mut self, fired: usize, state: &State) -> Result<()> {
        let dependents = self
            .dependents
            .get(fired)
            .with_context(|| format!("unknown process {fired}"))?;
        for &i_proc in dependents {
            let proc = self
                .processes
                .get_mut(i_proc)
                .with_context(|| format!("unknown process {i_proc}"))?;
            proc.update_rate(state)?;
        }
        Ok(())
    }
}

fn build_dependents(processes: &ProcessSet) -> Vec<Vec<usize>> {
    let inputs: Vec<_> = processes.iter().map(|p| p.kind().rate_inputs()).collect();
    processes
        .iter()
        .map(|fired| {
            let mutated = fired.kind().mutates();
            processes
                .iter()
                .filter(|other| !other.is_fixed())
                .filter(|other| match &inputs[other.index()] {
                    None => true,
                    Some(agents) => agents.iter().any(|agt| mutated.contains(agt)),
                })
                .map(|other| other.index())
                .collect()
        })
        .collect()
}

fn build_kind(cfg: &ProcessConfig, registry: &AgentRegistry) -> Result<ProcessKind> {
    let kind = match cfg {
        ProcessConfig::Birth {
            parent,
            child,
            rate,
        } => ProcessKind::birth(
            lookup(parent, registry)?,
            lookup(child, registry)?,
            build_rate(rate, registry)?,
        ),
        ProcessConfig::Death { agent, rate } => {
            ProcessKind::death(lookup(agent, registry)?, build_rate(rate, registry)?)
        }
        ProcessConfig::Transition {
            reactant,
            product,
            rate,
        } => ProcessKind::transition(
            lookup(reactant, registry)?,
            lookup(product, registry)?,
            build_rate(rate, registry)?,
        )?,
        ProcessConfig::Capped {
            base,
            capped,
            capacity,
        } => {
            let base = build_kind(base, registry).context("failed to build base process")?;
            let capped = capped
                .iter()
                .map(|name| lookup(name, registry))
                .collect::<Result<Vec<_>>>()?;
            ProcessKind::capped(base, capped, *capacity)?
        }
    };
    Ok(kind)
}

fn build_rate(cfg: &RateConfig, registry: &AgentRegistry) -> Result<RateConst> {
    match cfg {
        RateConfig::Constant(value) => RateConst::constant(*value),
        RateConfig::DensityDependent {
            base,
            agents,
            half_saturation,
        } => {
            let agents = agents
                .iter()
                .map(|name| lookup(name, registry))
                .collect::<Result<Vec<_>>>()?;
            RateConst::density_dependent(*base, agents, *half_saturation)
        }
    }
}

fn lookup(name: &str, registry: &AgentRegistry) -> Result<Agent> {
    registry
        .find(name)
        .with_context(|| format!("unknown agent {name:?}"))
}
