use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, error, info};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tankarena::config::{self, TrainingSettings};
use tankarena::error::GameError;
use tankarena::game::{Game, Mode};
use tankarena::{assets, checkpoint, logging, render, training};

// --- Command Line Arguments ---
#[derive(Parser, Debug)]
#[command(author, version, about = "Two-tank arena for self-play reinforcement learning", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Debug filter to specify log topics (e.g., "arena,tank,agent,train,checkpoint")
    #[arg(long, global = true)]
    debug_filter: Option<String>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the two agents play in a window
    Play(PlayArgs),
    /// Run parallel headless self-play and merge the resulting policies
    Train(TrainArgs),
    /// Average leftover worker checkpoints into the merged files
    Merge {
        #[arg(long, default_value = config::POLICY_DIR)]
        policy_dir: PathBuf,
    },
}

#[derive(Args, Debug)]
struct PlayArgs {
    /// Stage descriptor file; the built-in stage is used when omitted
    #[arg(long)]
    stage: Option<PathBuf>,

    /// Directory holding merged policy checkpoints
    #[arg(long, default_value = config::POLICY_DIR)]
    policy_dir: PathBuf,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Adds SHOOT to the action set
    #[arg(long)]
    allow_shoot: bool,
}

#[derive(Args, Debug)]
struct TrainArgs {
    #[arg(long)]
    stage: Option<PathBuf>,

    /// Parallel workers per batch
    #[arg(long, default_value_t = config::DEFAULT_WORKERS)]
    workers: usize,

    /// Number of batches (each ends with a merge)
    #[arg(long, default_value_t = config::DEFAULT_BATCHES)]
    batches: usize,

    /// Training iterations per worker and batch
    #[arg(long, default_value_t = config::ITERATIONS_PER_BATCH)]
    iterations: u32,

    #[arg(long, default_value = config::POLICY_DIR)]
    policy_dir: PathBuf,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    #[arg(long)]
    allow_shoot: bool,
}

fn parse_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn read_stage(stage: Option<&Path>) -> Result<String, GameError> {
    let text = match stage {
        Some(path) => assets::stage_from_file(path)?,
        None => assets::embedded_stage(config::DEFAULT_STAGE)?,
    };
    Ok(text)
}

fn play(args: PlayArgs) -> Result<(), GameError> {
    let descriptor = read_stage(args.stage.as_deref())?;
    let settings = TrainingSettings {
        allow_shoot: args.allow_shoot,
        policy_dir: args.policy_dir,
        seed: args.seed,
        ..TrainingSettings::default()
    };
    let merged = training::load_merged(&settings.policy_dir)?;
    let game = Game::with_fresh_agents(
        &descriptor,
        Mode::Interactive,
        settings,
        args.seed,
        [merged[0].as_ref(), merged[1].as_ref()],
    )?;

    info!("Opening window");
    macroquad::Window::from_config(render::window_conf(), async move {
        if let Err(e) = render::run_interactive(game).await {
            error!("Interactive run failed: {}", e);
            std::process::exit(1);
        }
    });
    Ok(())
}

fn train(args: TrainArgs) -> Result<(), GameError> {
    let descriptor = read_stage(args.stage.as_deref())?;
    let settings = TrainingSettings {
        workers: args.workers,
        batches: args.batches,
        iterations_per_batch: args.iterations,
        allow_shoot: args.allow_shoot,
        policy_dir: args.policy_dir,
        seed: args.seed,
        ..TrainingSettings::default()
    };
    training::run_training(&settings, &descriptor)?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logger(parse_level(&cli.log_level), cli.debug_filter) {
        eprintln!("Warning: Failed to initialize logger: {}", e);
    }

    let result = match cli.command {
        Command::Play(args) => play(args),
        Command::Train(args) => train(args),
        Command::Merge { policy_dir } => checkpoint::merge_all(&policy_dir)
            .map(|_| ())
            .map_err(GameError::from),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
