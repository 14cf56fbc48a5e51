pub mod agent;
pub mod arena;
pub mod assets;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod features;
pub mod game;
pub mod logging;
pub mod policy;
pub mod projectile;
pub mod render;
pub mod snapshot;
pub mod tank;
pub mod training;
pub mod types;
pub mod utils;
