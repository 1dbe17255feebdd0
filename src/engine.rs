use crate::config::Config;
use crate::driver::Driver;
use crate::model::Model;
use crate::population::Population;
use crate::record::Record;
use crate::state::State;
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// Simulation engine.
///
/// Holds the configuration and a driver built from it,
/// and provides methods to initialize, run, save, and load simulations.
pub struct Engine {
    cfg: Config,
    driver: Driver,
}

/// Serialized engine contents. The model is rebuilt from `cfg` on load.
#[derive(Serialize)]
struct CheckpointRef<'a> {
    cfg: &'a Config,
    state: &'a State,
    rng: &'a ChaCha12Rng,
}

#[derive(Deserialize)]
struct Checkpoint {
    cfg: Config,
    state: State,
    rng: ChaCha12Rng,
}

impl Engine {
    /// Create a new `Engine` with the given configuration and its initial census.
    pub fn generate_initial_condition(cfg: Config) -> Result<Self> {
        let rng = match cfg.init.seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng()?,
        };

        let model = Model::from_config(&cfg.model).context("failed to build model")?;

        let mut counts = vec![0; model.agents().len()];
        for (name, &count) in &cfg.init.counts {
            let agent = model
                .registry()
                .find(name)
                .with_context(|| format!("unknown agent {name:?}"))?;
            counts[agent.index()] = count;
        }

        let driver = Driver::new(model, Population::from_counts(counts), rng)
            .context("failed to construct driver")?;

        Ok(Self { cfg, driver })
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    /// Perform the simulation and save the resulting records to a binary file.
    ///
    /// A run that has not fired yet starts its file with a record of the
    /// initial census. Stops early, after writing a final record, if a fixed
    /// point is reached.
    pub fn run_simulation<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);

        let n_agents = self.driver.model().agents().len();
        let n_procs = self.driver.model().processes().len();

        if self.driver.state().n_events() == 0 {
            let record = Record::new(self.driver.state(), n_agents, n_procs, false);
            encode::write(&mut writer, &record).context("failed to serialize record")?;
        }

        for i_save in 0..self.cfg.output.saves_per_file {
            let mut fixed_point = false;
            for _ in 0..self.cfg.output.steps_per_save {
                if self.driver.step().context("failed to perform step")?.is_none() {
                    fixed_point = true;
                    break;
                }
            }

            let record = Record::new(self.driver.state(), n_agents, n_procs, fixed_point);
            encode::write(&mut writer, &record).context("failed to serialize record")?;

            if fixed_point {
                log::warn!("reached a fixed point at time {}", record.time);
                break;
            }

            let progress = 100.0 * (i_save + 1) as f64 / self.cfg.output.saves_per_file as f64;
            log::info!("completed {progress:06.2}%");
        }

        writer.flush().context("failed to flush writer stream")?;

        Ok(())
    }

    /// Save a checkpoint of the entire engine state.
    ///
    /// Can be used to resume the simulation later.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        let checkpoint = CheckpointRef {
            cfg: &self.cfg,
            state: self.driver.state(),
            rng: self.driver.rng(),
        };
        // Named fields keep the tagged process configs decodable.
        encode::write_named(&mut writer, &checkpoint).context("failed to serialize engine")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }

    /// Load a previously saved engine checkpoint.
    pub fn load_checkpoint<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);
        let checkpoint: Checkpoint =
            decode::from_read(&mut reader).context("failed to deserialize engine")?;

        let model = Model::from_config(&checkpoint.cfg.model).context("failed to build model")?;
        let driver = Driver::resume(model, checkpoint.state, checkpoint.rng)
            .context("failed to construct driver")?;

        Ok(Self {
            cfg: checkpoint.cfg,
            driver,
        })
    }
}
