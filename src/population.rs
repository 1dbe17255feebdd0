//! Per-agent counts.

use crate::agent::Agent;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Multiset of agents.
///
/// Counts are stored densely by agent index and grow on demand, so agents
/// that were never added simply count as zero.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Population {
    counts: Vec<usize>,
}

impl Population {
    /// Create an empty population.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a population from an initial census indexed by agent.
    pub fn from_counts(counts: Vec<usize>) -> Self {
        Self { counts }
    }

    /// Get the number of instances of an agent.
    pub fn count(&self, agent: Agent) -> usize {
        self.counts.get(agent.index()).copied().unwrap_or(0)
    }

    /// Get the total number of instances of a collection of agents.
    pub fn total(&self, agents: &[Agent]) -> usize {
        agents.iter().map(|&agt| self.count(agt)).sum()
    }

    /// Get the dense count vector (trailing never-seen agents are omitted).
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn add(&mut self, agent: Agent) -> Result<()> {
        self.add_n(agent, 1)
    }

    /// Add `n` instances of an agent.
    ///
    /// # Errors
    /// Returns an error if the count would overflow.
    pub fn add_n(&mut self, agent: Agent, n: usize) -> Result<()> {
        let new = self
            .count(agent)
            .checked_add(n)
            .with_context(|| format!("count of {agent} would overflow"))?;
        self.set(agent, new);
        Ok(())
    }

    pub fn remove(&mut self, agent: Agent) -> Result<()> {
        self.remove_n(agent, 1)
    }

    /// Remove `n` instances of an agent.
    ///
    /// # Errors
    /// Returns an error, leaving the count unchanged, if fewer than `n`
    /// instances are present.
    pub fn remove_n(&mut self, agent: Agent, n: usize) -> Result<()> {
        let cur = self.count(agent);
        if cur < n {
            bail!("count must remain non-negative: cannot remove {n} of {agent}, only {cur} present");
        }
        self.set(agent, cur - n);
        Ok(())
    }

    /// Set the number of instances of an agent.
    pub fn set(&mut self, agent: Agent, n: usize) {
        let idx = agent.index();
        if idx >= self.counts.len() {
            if n == 0 {
                return;
            }
            self.counts.resize(idx + 1, 0);
        }
        self.counts[idx] = n;
    }

    /// Add every `(agent, n)` entry, or nothing if any entry would overflow.
    pub fn add_all(&mut self, entries: &[(Agent, usize)]) -> Result<()> {
        let totals = merge_entries(entries).context("failed to merge entries")?;
        let mut new_counts = Vec::with_capacity(totals.len());
        for (agent, n) in totals {
            let new = self
                .count(agent)
                .checked_add(n)
                .with_context(|| format!("count of {agent} would overflow"))?;
            new_counts.push((agent, new));
        }
        for (agent, new) in new_counts {
            self.set(agent, new);
        }
        Ok(())
    }

    /// Remove every `(agent, n)` entry, or nothing if any agent would go
    /// negative.
    ///
    /// Entries for the same agent are summed and checked against the current
    /// count before anything is mutated.
    pub fn remove_all(&mut self, entries: &[(Agent, usize)]) -> Result<()> {
        let totals = merge_entries(entries).context("failed to merge entries")?;
        for (&agent, &n) in &totals {
            let cur = self.count(agent);
            if cur < n {
                bail!("count must remain non-negative: cannot remove {n} of {agent}, only {cur} present");
            }
        }
        for (agent, n) in totals {
            let cur = self.count(agent);
            self.set(agent, cur - n);
        }
        Ok(())
    }
}

fn merge_entries(entries: &[(Agent, usize)]) -> Result<BTreeMap<Agent, usize>> {
    let mut totals = BTreeMap::new();
    for &(agent, n) in entries {
        let sum: &mut usize = totals.entry(agent).or_default();
        *sum = sum
            .checked_add(n)
            .with_context(|| format!("batch total of {agent} would overflow"))?;
    }
    Ok(totals)
}
