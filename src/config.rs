//! Configuration constants for the tank arena simulation.

use std::path::PathBuf;

// Arena geometry
pub const GRID_TILES: usize = 26; // Tiles per row and per column
pub const TILE_SIZE: f32 = 32.0; // Pixels per tile
pub const SCREEN_WIDTH: f32 = GRID_TILES as f32 * TILE_SIZE; // 832
pub const SCREEN_HEIGHT: f32 = GRID_TILES as f32 * TILE_SIZE; // 832
pub const BASE_SIZE: f32 = 64.0; // Eagle collision box (2x2 tiles)

// Tanks
pub const TANK_SIZE: f32 = 52.0;
pub const TANK_STEP: f32 = 4.0; // Pixels per tick while a movement key is held
pub const SHOT_COOLDOWN_MS: u64 = 500;

// Projectiles
pub const PROJECTILE_SIZE: f32 = 10.0;
pub const PROJECTILE_SPEED: f32 = 10.0; // Pixels per tick
pub const DAMAGE_MARGIN: f32 = 12.0; // Sideways reach of the brick damage footprint
pub const DAMAGE_LONG_SIDE: f32 = 32.0;
pub const DAMAGE_SHORT_SIDE: f32 = 16.0;

// Decision cadence
pub const DECISION_POINT_RADIUS: f32 = 2.0;

// Spawn candidates (tank centers), one list per side
pub const SIDE_ONE_SPAWNS: [(f32, f32); 10] = [
    (32.0, 800.0),
    (96.0, 800.0),
    (160.0, 800.0),
    (224.0, 800.0),
    (288.0, 800.0),
    (544.0, 800.0),
    (608.0, 800.0),
    (672.0, 800.0),
    (736.0, 800.0),
    (800.0, 800.0),
];
pub const SIDE_TWO_SPAWNS: [(f32, f32); 10] = [
    (32.0, 32.0),
    (96.0, 32.0),
    (160.0, 32.0),
    (224.0, 32.0),
    (288.0, 32.0),
    (544.0, 32.0),
    (608.0, 32.0),
    (672.0, 32.0),
    (736.0, 32.0),
    (800.0, 32.0),
];

// Timing
pub const TICKS_PER_SECOND: u32 = 60;
pub const MAX_ROUND_SECS: f32 = 12.0;

// Stage
pub const DEFAULT_STAGE: &str = "stage0.txt";

// Feature encoding
pub const MAX_PROJECTILE_SLOTS: usize = 50;
pub const TANK_FEATURES: usize = 11;

// Actions
pub const MOVEMENT_ACTIONS: usize = 4; // UP, DOWN, LEFT, RIGHT
pub const ALL_ACTIONS: usize = 5; // ... plus SHOOT

// Learning
pub const GAMMA: f32 = 0.99;
pub const REWARD_SCALE: f32 = 10.0;
pub const RETURN_EPSILON: f32 = 1e-8;
pub const PROBABILITY_TOLERANCE: f32 = 1e-4;
pub const ROUNDS_PER_TRAINING: u32 = 5;
pub const TRAIN_BATCH_SIZE: usize = 32;
pub const CLIP_EPSILON: f32 = 0.2;
pub const TRAIN_EPOCHS: usize = 20;
pub const AGENT_ONE_LEARNING_RATE: f32 = 0.001;
pub const AGENT_TWO_LEARNING_RATE: f32 = 0.002;
pub const HIDDEN_LAYERS: [usize; 3] = [256, 256, 128];

// Parallel self-play
pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_BATCHES: usize = 60;
pub const ITERATIONS_PER_BATCH: u32 = 5;
pub const POLICY_DIR: &str = "policies";

/// Tunables for a headless training run. Defaults mirror the constants above.
#[derive(Debug, Clone)]
pub struct TrainingSettings {
    pub workers: usize,
    pub batches: usize,
    pub iterations_per_batch: u32,
    pub rounds_per_training: u32,
    pub batch_size: usize,
    pub clip_epsilon: f32,
    pub epochs: usize,
    pub gamma: f32,
    pub reward_scale: f32,
    pub learning_rates: [f32; 2],
    pub hidden_layers: Vec<usize>,
    pub model_seed: u64,
    pub seed: u64,
    pub allow_shoot: bool,
    pub policy_dir: PathBuf,
}

impl TrainingSettings {
    pub fn action_dim(&self) -> usize {
        if self.allow_shoot {
            ALL_ACTIONS
        } else {
            MOVEMENT_ACTIONS
        }
    }
}

impl Default for TrainingSettings {
    fn default() -> Self {
        TrainingSettings {
            workers: DEFAULT_WORKERS,
            batches: DEFAULT_BATCHES,
            iterations_per_batch: ITERATIONS_PER_BATCH,
            rounds_per_training: ROUNDS_PER_TRAINING,
            batch_size: TRAIN_BATCH_SIZE,
            clip_epsilon: CLIP_EPSILON,
            epochs: TRAIN_EPOCHS,
            gamma: GAMMA,
            reward_scale: REWARD_SCALE,
            learning_rates: [AGENT_ONE_LEARNING_RATE, AGENT_TWO_LEARNING_RATE],
            hidden_layers: HIDDEN_LAYERS.to_vec(),
            model_seed: 7,
            seed: 0,
            allow_shoot: false,
            policy_dir: PathBuf::from(POLICY_DIR),
        }
    }
}
