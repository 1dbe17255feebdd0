//! Stochastic simulation of agent populations under birth, death and
//! transition processes, using the kinetic Monte Carlo (Gillespie) algorithm.

pub mod agent;
pub mod analysis;
pub mod config;
pub mod driver;
pub mod engine;
pub mod manager;
pub mod model;
pub mod ordinal;
pub mod population;
pub mod process;
pub mod rate;
pub mod record;
pub mod state;
pub mod stats;
