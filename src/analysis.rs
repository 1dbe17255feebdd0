use crate::config::Config;
use crate::record::Record;
use crate::stats::{Accumulator, TimeSeries};
use anyhow::{Context, Result, bail};
use rmp_serde::{decode, encode};
use serde::Serialize;
use serde_value::Value;
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

pub trait Obs {
    fn name(&self) -> &'static str;
    fn update(&mut self, record: &Record) -> Result<()>;
    fn report(&self) -> Result<Value>;
}

/// Time-weighted mean count of every agent.
///
/// Records carry statistics accumulated at every event since time zero,
/// so the latest record describes the whole run.
pub struct MeanCounts {
    names: Vec<String>,
    acc_vec: Vec<Accumulator>,
}

#[derive(Serialize)]
struct AgentReport<'a> {
    agent: &'a str,
    mean: f64,
    std_dev: f64,
}

impl MeanCounts {
    pub fn new(cfg: &Config) -> Self {
        let mut acc_vec = Vec::new();
        acc_vec.resize_with(cfg.model.agents.len(), Accumulator::new);
        Self {
            names: cfg.model.agents.clone(),
            acc_vec,
        }
    }
}

impl Obs for MeanCounts {
    fn name(&self) -> &'static str {
        "mean_counts"
    }

    fn update(&mut self, record: &Record) -> Result<()> {
        if record.occupancy.len() != self.names.len() {
            bail!(
                "record has {} agents but the model has {}",
                record.occupancy.len(),
                self.names.len()
            );
        }
        self.acc_vec.clone_from(&record.occupancy);
        Ok(())
    }

    fn report(&self) -> Result<Value> {
        let reports: Vec<_> = self
            .names
            .iter()
            .zip(&self.acc_vec)
            .map(|(name, acc)| {
                let report = acc.report();
                AgentReport {
                    agent: name,
                    mean: report.mean,
                    std_dev: report.std_dev,
                }
            })
            .collect();
        serde_value::to_value(reports).context("failed to serialize mean counts")
    }
}

/// Fraction of all events fired by every process.
pub struct EventShares {
    fire_counts: Vec<u64>,
}

impl EventShares {
    pub fn new(cfg: &Config) -> Self {
        Self {
            fire_counts: vec![0; cfg.model.processes.len()],
        }
    }
}

impl Obs for EventShares {
    fn name(&self) -> &'static str {
        "event_shares"
    }

    fn update(&mut self, record: &Record) -> Result<()> {
        // Fire counts are cumulative, so the latest record holds the totals.
        self.fire_counts.clone_from(&record.fire_counts);
        Ok(())
    }

    fn report(&self) -> Result<Value> {
        let total: u64 = self.fire_counts.iter().sum();
        let shares: Vec<f64> = self
            .fire_counts
            .iter()
            .map(|&count| {
                if total == 0 {
                    0.0
                } else {
                    count as f64 / total as f64
                }
            })
            .collect();
        serde_value::to_value(shares).context("failed to serialize event shares")
    }
}

/// Time series of the total number of agents.
pub struct TotalCount {
    time_series: TimeSeries,
}

impl TotalCount {
    pub fn new() -> Self {
        Self {
            time_series: TimeSeries::new(),
        }
    }
}

impl Obs for TotalCount {
    fn name(&self) -> &'static str {
        "total_count"
    }

    fn update(&mut self, record: &Record) -> Result<()> {
        let total: usize = record.counts.iter().sum();
        self.time_series.push(total as f64);
        Ok(())
    }

    fn report(&self) -> Result<Value> {
        serde_value::to_value(self.time_series.report())
            .context("failed to serialize total count")
    }
}

pub struct Analyzer {
    obs_ptr_vec: Vec<Box<dyn Obs>>,
    n_records: usize,
}

impl Analyzer {
    pub fn new(cfg: &Config) -> Self {
        let obs_ptr_vec: Vec<Box<dyn Obs>> = vec![
            Box::new(MeanCounts::new(cfg)),
            Box::new(EventShares::new(cfg)),
            Box::new(TotalCount::new()),
        ];
        Self {
            obs_ptr_vec,
            n_records: 0,
        }
    }

    /// Feed every record of a trajectory file to the observables.
    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);

        while !reader.fill_buf().context("failed to read file")?.is_empty() {
            let record: Record = decode::from_read(&mut reader).context("failed to read record")?;
            self.add_record(&record)?;
        }
        Ok(())
    }

    pub fn add_record(&mut self, record: &Record) -> Result<()> {
        for obs in &mut self.obs_ptr_vec {
            obs.update(record)
                .with_context(|| format!("failed to update {}", obs.name()))?;
        }
        self.n_records += 1;
        Ok(())
    }

    pub fn n_records(&self) -> usize {
        self.n_records
    }

    /// Collect the report of every observable.
    pub fn results(&self) -> Result<BTreeMap<&'static str, Value>> {
        self.obs_ptr_vec
            .iter()
            .map(|obs| Ok((obs.name(), obs.report()?)))
            .collect()
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);

        let results = self.results().context("failed to collect results")?;
        encode::write_named(&mut writer, &results).context("failed to serialize results")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }
}
