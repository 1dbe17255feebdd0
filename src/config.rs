use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Model parameters.
    pub model: ModelConfig,
    /// Initial condition parameters.
    pub init: InitConfig,
    /// Output parameters.
    pub output: OutputConfig,
}

/// Agents and the processes acting on them.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Agent names, in index order.
    pub agents: Vec<String>,
    /// Processes, in index order.
    pub processes: Vec<ProcessConfig>,
}

/// Description of one process.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessConfig {
    Birth {
        parent: String,
        child: String,
        rate: RateConfig,
    },
    Death {
        agent: String,
        rate: RateConfig,
    },
    Transition {
        reactant: String,
        product: String,
        rate: RateConfig,
    },
    Capped {
        base: Box<ProcessConfig>,
        capped: Vec<String>,
        capacity: usize,
    },
}

/// Rate constant: either a number or a density-dependent table.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RateConfig {
    Constant(f64),
    DensityDependent {
        base: f64,
        agents: Vec<String>,
        half_saturation: f64,
    },
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct InitConfig {
    /// Initial count per agent name (missing agents start at zero).
    #[serde(default)]
    pub counts: BTreeMap<String, usize>,
    /// Seed of the random number generator (drawn from the OS if absent).
    pub seed: Option<u64>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Number of events between trajectory saves.
    pub steps_per_save: usize,
    /// Number of saves written per trajectory file.
    pub saves_per_file: usize,
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a [`Config`] from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let agents = &self.model.agents;
        check_num(agents.len(), 1..10_000).context("invalid number of agents")?;
        check_num(self.model.processes.len(), 1..100_000)
            .context("invalid number of processes")?;

        for (i_proc, proc) in self.model.processes.iter().enumerate() {
            proc.validate(agents)
                .with_context(|| format!("invalid process {i_proc}"))?;
        }

        for name in self.init.counts.keys() {
            check_name(name, agents).context("invalid initial count")?;
        }

        check_num(self.output.steps_per_save, 1..1_000_000)
            .context("invalid number of steps per save")?;
        check_num(self.output.saves_per_file, 1..1_000_000)
            .context("invalid number of saves per file")?;

        Ok(())
    }
}

impl ProcessConfig {
    fn validate(&self, agents: &[String]) -> Result<()> {
        match self {
            Self::Birth {
                parent,
                child,
                rate,
            } => {
                check_name(parent, agents).context("invalid parent")?;
                check_name(child, agents).context("invalid child")?;
                rate.validate(agents).context("invalid rate")?;
            }
            Self::Death { agent, rate } => {
                check_name(agent, agents).context("invalid agent")?;
                rate.validate(agents).context("invalid rate")?;
            }
            Self::Transition {
                reactant,
                product,
                rate,
            } => {
                check_name(reactant, agents).context("invalid reactant")?;
                check_name(product, agents).context("invalid product")?;
                if reactant == product {
                    bail!("reactant and product must differ, but both are {reactant:?}");
                }
                rate.validate(agents).context("invalid rate")?;
            }
            Self::Capped {
                base,
                capped,
                capacity,
            } => {
                base.validate(agents).context("invalid base process")?;
                for name in capped {
                    check_name(name, agents).context("invalid capped agent")?;
                }
                check_num(*capacity, 1..).context("invalid capacity")?;
            }
        }
        Ok(())
    }
}

impl RateConfig {
    fn validate(&self, agents: &[String]) -> Result<()> {
        match self {
            Self::Constant(value) => {
                check_num(*value, 0.0..f64::INFINITY).context("invalid rate constant")?;
            }
            Self::DensityDependent {
                base,
                agents: rate_agents,
                half_saturation,
            } => {
                check_num(*base, 0.0..f64::INFINITY).context("invalid base rate")?;
                for name in rate_agents {
                    check_name(name, agents).context("invalid density agent")?;
                }
                if !(*half_saturation > 0.0 && half_saturation.is_finite()) {
                    bail!("half saturation must be positive, but is {half_saturation}");
                }
            }
        }
        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_name(name: &str, agents: &[String]) -> Result<()> {
    if !agents.iter().any(|agt| agt == name) {
        bail!("unknown agent {name:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
[model]
agents = ["A", "B"]

[[model.processes]]
kind = "birth"
parent = "A"
child = "A"
rate = 2.0

[[model.processes]]
kind = "transition"
reactant = "A"
product = "B"
rate = { base = 1.0, agents = ["A", "B"], half_saturation = 50.0 }

[[model.processes]]
kind = "capped"
capped = ["A", "B"]
capacity = 100

[model.processes.base]
kind = "death"
agent = "B"
rate = 0.5

[init]
counts = { A = 10 }
seed = 7

[output]
steps_per_save = 16
saves_per_file = 8
"#;

    #[test]
    fn parses_all_process_kinds() {
        let cfg = Config::from_toml(CONFIG).unwrap();
        assert_eq!(cfg.model.agents, vec!["A", "B"]);
        assert_eq!(cfg.model.processes.len(), 3);
        assert!(matches!(
            cfg.model.processes[1],
            ProcessConfig::Transition {
                rate: RateConfig::DensityDependent { .. },
                ..
            }
        ));
        let ProcessConfig::Capped { base, capacity, .. } = &cfg.model.processes[2] else {
            panic!("expected a capped process");
        };
        assert_eq!(*capacity, 100);
        assert!(matches!(**base, ProcessConfig::Death { .. }));
        assert_eq!(cfg.init.counts.get("A"), Some(&10));
        assert_eq!(cfg.init.seed, Some(7));
    }

    #[test]
    fn rejects_invalid_values() {
        let cases = [
            ("rate = 2.0", "rate = -2.0"),
            ("capacity = 100", "capacity = 0"),
            ("product = \"B\"", "product = \"A\""),
            ("child = \"A\"", "child = \"C\""),
            ("counts = { A = 10 }", "counts = { Z = 10 }"),
            ("steps_per_save = 16", "steps_per_save = 0"),
        ];
        for (from, to) in cases {
            let contents = CONFIG.replacen(from, to, 1);
            assert!(Config::from_toml(&contents).is_err(), "accepted {to:?}");
        }
    }
}
