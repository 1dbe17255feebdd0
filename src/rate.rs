//! Rate constants of mass-action processes.

use crate::agent::Agent;
use crate::state::State;
use anyhow::{Result, bail};
use std::{fmt, sync::Arc};

/// Rate function supplied by an embedding application.
pub type RateFn = Arc<dyn Fn(&State) -> f64 + Send + Sync>;

/// Scalar multiplier of a mass-action rate, possibly state dependent.
#[derive(Clone)]
pub enum RateConst {
    /// Fixed value.
    Constant(f64),
    /// `base / (1 + n / half_saturation)`, where `n` is the total count of `agents`.
    DensityDependent {
        base: f64,
        agents: Vec<Agent>,
        half_saturation: f64,
    },
    /// Arbitrary function of the state (including time).
    ///
    /// Its inputs are unknown, so it is recomputed after every event.
    Custom(RateFn),
}

impl RateConst {
    /// Create a constant rate.
    ///
    /// # Errors
    /// Returns an error if `value` is negative or not finite.
    pub fn constant(value: f64) -> Result<Self> {
        check_rate(value)?;
        Ok(Self::Constant(value))
    }

    /// Create a rate that decreases with the density of `agents`.
    ///
    /// # Errors
    /// Returns an error if `base` is negative or not finite, or if
    /// `half_saturation` is not strictly positive.
    pub fn density_dependent(base: f64, agents: Vec<Agent>, half_saturation: f64) -> Result<Self> {
        check_rate(base)?;
        if !(half_saturation.is_finite() && half_saturation > 0.0) {
            bail!("half saturation must be positive and finite, but is {half_saturation}");
        }
        Ok(Self::DensityDependent {
            base,
            agents,
            half_saturation,
        })
    }

    pub fn custom<F>(func: F) -> Self
    where
        F: Fn(&State) -> f64 + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(func))
    }

    /// Evaluate the rate constant for the given state.
    ///
    /// # Errors
    /// Returns an error if the computed value is negative or not finite.
    pub fn value(&self, state: &State) -> Result<f64> {
        let value = match self {
            Self::Constant(value) => *value,
            Self::DensityDependent {
                base,
                agents,
                half_saturation,
            } => base / (1.0 + state.count_agents(agents) as f64 / half_saturation),
            Self::Custom(func) => func(state),
        };
        check_rate(value)?;
        Ok(value)
    }

    /// Agents named by the rate constant itself.
    pub fn agents(&self) -> Vec<Agent> {
        match self {
            Self::DensityDependent { agents, .. } => agents.clone(),
            Self::Constant(_) | Self::Custom(_) => Vec::new(),
        }
    }

    /// Agents whose counts the rate constant reads, or `None` if unknown.
    pub fn inputs(&self) -> Option<Vec<Agent>> {
        match self {
            Self::Constant(_) => Some(Vec::new()),
            Self::DensityDependent { agents, .. } => Some(agents.clone()),
            Self::Custom(_) => None,
        }
    }
}

impl fmt::Debug for RateConst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::DensityDependent {
                base,
                agents,
                half_saturation,
            } => f
                .debug_struct("DensityDependent")
                .field("base", base)
                .field("agents", agents)
                .field("half_saturation", half_saturation)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Check that a rate is a non-negative finite number.
pub fn check_rate(rate: f64) -> Result<()> {
    if !rate.is_finite() {
        bail!("rate must be finite, but is {rate}");
    }
    if rate < 0.0 {
        bail!("rate must be non-negative, but is {rate}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentRegistry;
    use crate::population::Population;

    #[test]
    fn negative_constant_is_rejected() {
        assert!(RateConst::constant(-0.1).is_err());
        assert!(RateConst::constant(f64::NAN).is_err());
        assert!(RateConst::constant(f64::INFINITY).is_err());
        assert!(RateConst::constant(0.0).is_ok());
    }

    #[test]
    fn density_dependent_halves_at_half_saturation() {
        let mut reg = AgentRegistry::new();
        let a = reg.register("a").unwrap();
        let k = RateConst::density_dependent(3.0, vec![a], 10.0).unwrap();
        let state = State::new(Population::from_counts(vec![10]));
        assert!((k.value(&state).unwrap() - 1.5).abs() < 1e-12);
        assert_eq!(k.inputs(), Some(vec![a]));

        assert!(RateConst::density_dependent(1.0, vec![a], 0.0).is_err());
        assert!(RateConst::density_dependent(-1.0, vec![a], 1.0).is_err());
    }

    #[test]
    fn negative_computed_value_is_an_error() {
        let k = RateConst::custom(|state| 1.0 - state.time());
        let state = State::new(Population::new());
        assert_eq!(k.value(&state).unwrap(), 1.0);
        assert!(k.inputs().is_none());

        let k = RateConst::custom(|_| -2.0);
        let err = k.value(&state).unwrap_err();
        assert!(format!("{err}").contains("non-negative"));
    }
}
