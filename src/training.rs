//! Parallel self-play: each batch runs isolated headless games on a worker pool,
//! saves one checkpoint per worker and agent, then averages them.

use crate::checkpoint::{load_checkpoint, merge_all, merged_file_name, save_checkpoint, worker_file_name, Checkpoint};
use crate::config::TrainingSettings;
use crate::error::{CheckpointError, GameError};
use crate::game::{Game, Mode, RunSummary};
use crate::types::TankId;
use log::info;
use rayon::prelude::*;
use std::fs;
use std::path::Path;

/// Totals over every worker of every batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainingReport {
    pub batches: usize,
    pub rounds: u32,
    pub iterations: u32,
    pub tanks_destroyed: u32,
    pub bases_destroyed: u32,
    pub timeouts: u32,
}

impl TrainingReport {
    fn absorb(&mut self, summary: &RunSummary) {
        self.rounds += summary.rounds;
        self.iterations += summary.iterations;
        self.tanks_destroyed += summary.tanks_destroyed;
        self.bases_destroyed += summary.bases_destroyed;
        self.timeouts += summary.timeouts;
    }
}

/// RNG seed of one worker in one batch; distinct for every pair.
pub fn worker_seed(base: u64, batch: usize, worker: usize, workers: usize) -> u64 {
    base.wrapping_mul(1_000_003)
        .wrapping_add((batch * workers + worker) as u64)
}

/// Merged checkpoints of both agents, `None` for an agent without one yet.
pub fn load_merged(dir: &Path) -> Result<[Option<Checkpoint>; 2], CheckpointError> {
    Ok([
        load_checkpoint(&dir.join(merged_file_name(TankId::ONE)))?,
        load_checkpoint(&dir.join(merged_file_name(TankId::TWO)))?,
    ])
}

pub fn run_training(settings: &TrainingSettings, descriptor: &str) -> Result<TrainingReport, GameError> {
    fs::create_dir_all(&settings.policy_dir).map_err(CheckpointError::from)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.workers.max(1))
        .build()?;

    let mut report = TrainingReport::default();
    for batch in 0..settings.batches {
        let merged = load_merged(&settings.policy_dir)?;
        info!(
            "Batch {}/{}: {} workers, {} iterations each ({})",
            batch + 1,
            settings.batches,
            settings.workers,
            settings.iterations_per_batch,
            if merged.iter().any(Option::is_some) { "resuming from merged policies" } else { "fresh policies" }
        );

        let run_one = |worker: usize| run_worker(settings, descriptor, batch, worker, &merged);
        let results: Vec<Result<RunSummary, GameError>> =
            pool.install(|| (0..settings.workers).into_par_iter().map(run_one).collect());
        for result in results {
            report.absorb(&result?);
        }

        merge_all(&settings.policy_dir)?;
        report.batches += 1;
    }

    info!(
        "Training finished: {} rounds, {} iterations ({} tanks destroyed, {} bases destroyed, {} timeouts)",
        report.rounds, report.iterations, report.tanks_destroyed, report.bases_destroyed, report.timeouts
    );
    Ok(report)
}

fn run_worker(
    settings: &TrainingSettings,
    descriptor: &str,
    batch: usize,
    worker: usize,
    merged: &[Option<Checkpoint>; 2],
) -> Result<RunSummary, GameError> {
    let seed = worker_seed(settings.seed, batch, worker, settings.workers);
    let mut game = Game::with_fresh_agents(
        descriptor,
        Mode::Headless,
        settings.clone(),
        seed,
        [merged[0].as_ref(), merged[1].as_ref()],
    )?;
    let summary = game.run_headless(settings.iterations_per_batch)?;

    for agent in &game.agents {
        let path = settings.policy_dir.join(worker_file_name(agent.id, worker));
        save_checkpoint(&path, &agent.export())?;
    }
    log::debug!(target: "train", "worker {} finished {} rounds", worker, summary.rounds);
    Ok(summary)
}
