use crate::agent::Agent;
use crate::arena::Arena;
use crate::checkpoint::Checkpoint;
use crate::config::{self, TrainingSettings};
use crate::error::{GameError, PolicyError};
use crate::features::FeatureEncoder;
use crate::policy::{MlpPolicy, PolicyModel};
use crate::snapshot::BattleSnapshot;
use crate::tank::{tank_and_opponent, Impact, Tank};
use crate::types::TankId;
use ::rand::prelude::*;
use log::info;
use std::fmt;

const TANK_IDS: [TankId; 2] = [TankId::ONE, TankId::TWO];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Rendered play: agents act but never record transitions or train.
    Interactive,
    /// Batch self-play: transitions are recorded and agents train periodically.
    Headless,
}

/// Why a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    TankDestroyed(TankId),
    BaseDestroyed(TankId), // The side that lost its base
    Timeout,
    Abandoned, // Ended by the caller before any end condition held
}

impl fmt::Display for RoundOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundOutcome::TankDestroyed(id) => write!(f, "tank {} destroyed", id.side()),
            RoundOutcome::BaseDestroyed(id) => write!(f, "base of side {} destroyed", id.side()),
            RoundOutcome::Timeout => write!(f, "timeout"),
            RoundOutcome::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Tally of a headless run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rounds: u32,
    pub iterations: u32,
    pub tanks_destroyed: u32,
    pub bases_destroyed: u32,
    pub timeouts: u32,
}

impl RunSummary {
    fn record(&mut self, outcome: RoundOutcome) {
        self.rounds += 1;
        match outcome {
            RoundOutcome::TankDestroyed(_) => self.tanks_destroyed += 1,
            RoundOutcome::BaseDestroyed(_) => self.bases_destroyed += 1,
            RoundOutcome::Timeout => self.timeouts += 1,
            RoundOutcome::Abandoned => {}
        }
    }
}

/// Builds both agents with fresh MLP policies sized for `arena`, importing the
/// given checkpoints where present.
pub fn build_agents(
    arena: &Arena,
    settings: &TrainingSettings,
    learning: bool,
    seed: u64,
    checkpoints: [Option<&Checkpoint>; 2],
) -> Result<[Agent; 2], PolicyError> {
    let encoder = FeatureEncoder::new(arena);
    let build = |id: TankId| -> Result<Agent, PolicyError> {
        let mut policy = MlpPolicy::new(
            encoder.input_dim(),
            &settings.hidden_layers,
            settings.action_dim(),
            settings.learning_rates[id.index()],
            settings.model_seed.wrapping_add(id.index() as u64),
        );
        if let Some(checkpoint) = checkpoints[id.index()] {
            policy.import(checkpoint)?;
        }
        let agent_seed = seed.wrapping_mul(2).wrapping_add(id.index() as u64 + 1);
        Ok(Agent::new(id, Box::new(policy), encoder, agent_seed, learning)
            .with_discount(settings.gamma, settings.reward_scale))
    };
    Ok([build(TankId::ONE)?, build(TankId::TWO)?])
}

/// The round controller: owns the arena, both tanks and both agents.
pub struct Game {
    pub arena: Arena,
    pub tanks: [Tank; 2],
    pub agents: [Agent; 2],
    pub mode: Mode,
    pub tick: u64,
    pub round: u32,
    pub training_cycle: u32, // Rounds completed since the last training
    pub iteration: u32,      // Trainings performed
    pub iteration_points: [f32; 2], // Points collected since the last training
    pub summary: RunSummary,
    descriptor: String,
    settings: TrainingSettings,
    rng: StdRng,
    round_ended: bool,
}

impl Game {
    pub fn new(
        descriptor: &str,
        agents: [Agent; 2],
        mode: Mode,
        settings: TrainingSettings,
        seed: u64,
    ) -> Result<Self, GameError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let arena = Arena::load(descriptor, &mut rng)?;
        let tanks = [Tank::spawn(TankId::ONE, &arena), Tank::spawn(TankId::TWO, &arena)];
        info!(
            "Arena loaded: {} bricks, {} steel walls, {} bases ({:?} mode)",
            arena.bricks.len(),
            arena.steel_walls.len(),
            arena.bases.len(),
            mode
        );
        Ok(Game {
            arena,
            tanks,
            agents,
            mode,
            tick: 0,
            round: 1,
            training_cycle: 0,
            iteration: 0,
            iteration_points: [0.0; 2],
            summary: RunSummary::default(),
            descriptor: descriptor.to_string(),
            settings,
            rng,
            round_ended: false,
        })
    }

    /// Loads the arena once to size the policies, then builds a ready-to-run game.
    pub fn with_fresh_agents(
        descriptor: &str,
        mode: Mode,
        settings: TrainingSettings,
        seed: u64,
        checkpoints: [Option<&Checkpoint>; 2],
    ) -> Result<Self, GameError> {
        let mut probe_rng = StdRng::seed_from_u64(seed);
        let probe = Arena::load(descriptor, &mut probe_rng)?;
        let agents = build_agents(&probe, &settings, mode == Mode::Headless, seed, checkpoints)?;
        Game::new(descriptor, agents, mode, settings, seed)
    }

    pub fn elapsed_secs(&self) -> f32 {
        self.tick as f32 / config::TICKS_PER_SECOND as f32
    }

    // Simulated clock used for the shot cooldown
    fn now_ms(&self) -> u64 {
        self.tick * 1000 / config::TICKS_PER_SECOND as u64
    }

    pub fn snapshot(&self) -> BattleSnapshot {
        BattleSnapshot::capture(&self.arena, &self.tanks, self.elapsed_secs())
    }

    /// Advances the simulation by one tick. Returns the outcome when the tick
    /// ended the round; the next round is already set up in that case.
    pub fn update(&mut self) -> Result<Option<RoundOutcome>, GameError> {
        let now_ms = self.now_ms();

        for id in TANK_IDS {
            let (tank, opponent) = tank_and_opponent(&mut self.tanks, id);
            for impact in tank.update_projectiles(&mut self.arena, opponent) {
                crate::debug_tank!(id.side(), @self.tick, "shell stopped: {:?}", impact);
                if let Impact::Base(index) = impact {
                    info!("Side {} destroyed base {}", id.side(), self.arena.bases[index].marker);
                }
            }
            tank.update_decision_cadence(&self.arena);
        }

        // Both agents decide from the same view of this tick
        let snapshot = self.snapshot();
        for id in TANK_IDS {
            let tank = &mut self.tanks[id.index()];
            if tank.awaiting_decision && !tank.destroyed {
                let keys = self.agents[id.index()].decide(&snapshot)?;
                crate::debug_agent!(id.side(), @self.tick, "holding {:?}", keys.command());
                tank.commit(keys);
            }
        }

        for id in TANK_IDS {
            let obstacle = self.tanks[id.opponent().index()].obstacle();
            let tank = &mut self.tanks[id.index()];
            tank.perform_action(tank.active_keys, &self.arena, obstacle, now_ms);
        }

        self.tick += 1;

        if self.check_done() {
            let outcome = self.round_over()?;
            self.reset_round()?;
            return Ok(outcome);
        }
        Ok(None)
    }

    /// A round is over when a tank or an assigned base is destroyed, or time is up.
    pub fn check_done(&self) -> bool {
        self.outcome().is_some()
    }

    pub fn outcome(&self) -> Option<RoundOutcome> {
        if let Some(tank) = self.tanks.iter().find(|t| t.destroyed) {
            return Some(RoundOutcome::TankDestroyed(tank.id));
        }
        let lost_base = self
            .tanks
            .iter()
            .find(|t| self.arena.bases.get(t.base).is_some_and(|b| b.destroyed));
        if let Some(tank) = lost_base {
            return Some(RoundOutcome::BaseDestroyed(tank.id));
        }
        if self.elapsed_secs() >= config::MAX_ROUND_SECS {
            return Some(RoundOutcome::Timeout);
        }
        None
    }

    /// Ends the current round exactly once: closes both trajectories and, in
    /// headless mode, trains every `rounds_per_training` rounds. Further calls
    /// before `reset_round` do nothing.
    pub fn round_over(&mut self) -> Result<Option<RoundOutcome>, GameError> {
        if self.round_ended {
            return Ok(None);
        }
        self.round_ended = true;

        let outcome = self.outcome().unwrap_or(RoundOutcome::Abandoned);
        let snapshot = self.snapshot();
        let points = [
            self.agents[0].finish_round(&snapshot),
            self.agents[1].finish_round(&snapshot),
        ];
        self.summary.record(outcome);
        for (total, round_points) in self.iteration_points.iter_mut().zip(points) {
            *total += round_points;
        }
        info!(
            "Round {} over after {:.2}s: {}, {} bricks left (points {:.3} / {:.3})",
            self.round,
            self.elapsed_secs(),
            outcome,
            self.arena.intact_bricks(),
            points[0],
            points[1]
        );

        if self.mode == Mode::Headless {
            self.training_cycle += 1;
            if self.training_cycle >= self.settings.rounds_per_training {
                self.training_cycle = 0;
                self.train()?;
            }
        }
        Ok(Some(outcome))
    }

    fn train(&mut self) -> Result<(), GameError> {
        for agent in self.agents.iter_mut() {
            agent.train(self.settings.batch_size, self.settings.clip_epsilon, self.settings.epochs)?;
        }
        self.iteration += 1;
        self.summary.iterations = self.iteration;
        let [one, two] = std::mem::take(&mut self.iteration_points);
        info!("Iteration: {}, Agent 1: {:.3}, Agent 2: {:.3}", self.iteration, one, two);
        Ok(())
    }

    /// Reloads the arena (fresh spawns, intact terrain) and respawns both tanks.
    /// Agents keep their models and buffers.
    pub fn reset_round(&mut self) -> Result<(), GameError> {
        self.arena = Arena::load(&self.descriptor, &mut self.rng)?;
        self.tanks = [
            Tank::spawn(TankId::ONE, &self.arena),
            Tank::spawn(TankId::TWO, &self.arena),
        ];
        self.tick = 0;
        self.round += 1;
        self.round_ended = false;
        Ok(())
    }

    /// Plays rounds until `max_iterations` trainings have happened.
    pub fn run_headless(&mut self, max_iterations: u32) -> Result<RunSummary, GameError> {
        while self.iteration < max_iterations {
            self.update()?;
        }
        Ok(self.summary)
    }
}
