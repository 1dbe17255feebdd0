//! Agent identities and their registry.

use crate::ordinal::Ordinal;
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Distinguishable kind of entity tracked by count.
///
/// An agent is only an index into dense population storage; its name lives
/// in the [`AgentRegistry`] that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Agent(usize);

impl Agent {
    /// Get the ordinal index of the agent.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent {}", self.0)
    }
}

/// Registry assigning dense indices to named agents.
#[derive(Debug, Default, Clone)]
pub struct AgentRegistry {
    ordinal: Ordinal,
    agents: Vec<Agent>,
    names: Vec<String>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new agent under a unique name.
    ///
    /// # Errors
    /// Returns an error if the name is empty or already registered.
    pub fn register(&mut self, name: &str) -> Result<Agent> {
        if name.is_empty() {
            bail!("agent name must not be empty");
        }
        if self.find(name).is_some() {
            bail!("agent {name:?} is already registered");
        }
        let agent = Agent(self.ordinal.next_index());
        self.agents.push(agent);
        self.names.push(name.to_owned());
        Ok(agent)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Get all registered agents in index order.
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Get the name of a registered agent.
    pub fn name(&self, agent: Agent) -> Option<&str> {
        self.names.get(agent.index()).map(String::as_str)
    }

    /// Look up an agent by name.
    pub fn find(&self, name: &str) -> Option<Agent> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.agents[idx])
    }

    /// Check whether an agent belongs to this registry.
    pub fn contains(&self, agent: Agent) -> bool {
        agent.index() < self.agents.len()
    }
}

/// Check that `agents[k].index() == k` for every position `k`.
///
/// Every array-backed population relies on this, so it runs once when a
/// model is assembled and never during stepping.
///
/// # Errors
/// Returns an error naming the first position that breaks the invariant.
pub fn validate_list(agents: &[Agent]) -> Result<()> {
    for (k, agent) in agents.iter().enumerate() {
        if agent.index() != k {
            bail!(
                "agent list is not densely indexed: position {k} holds index {}",
                agent.index()
            );
        }
    }
    Ok(())
}
