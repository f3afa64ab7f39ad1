//! SkyBattle command line
//!
//! # Usage
//!
//! ```bash
//! # Idle vs idle, 3v3
//! skybattle simulate --team-size 3
//!
//! # Trained model against an idle team
//! skybattle simulate --red models/final.json
//!
//! # Self-play training (requires the `training` feature)
//! cargo run --release --features training -- train --episodes 5000 --output models
//!
//! # Continue from a checkpoint
//! cargo run --release --features training -- train --resume models/final.json --output models
//! ```

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use skybattle::{
    codec::ModelSignature,
    env::combat::CombatConfig,
    host::{play_match, TeamController},
    inference::PolicyArtifact,
};

#[derive(Parser)]
#[command(name = "skybattle", version, about = "Multi-drone aerial combat simulation and self-play training")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play one match and print the summary
    Simulate {
        /// Combat configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Drones per team, overriding the configuration
        #[arg(long)]
        team_size: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        /// Policy artifact for red; idle when omitted
        #[arg(long)]
        red: Option<PathBuf>,
        /// Policy artifact for blue; idle when omitted
        #[arg(long)]
        blue: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Train a policy with MAPPO self-play
    Train {
        /// Combat configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// MAPPO hyperparameters (TOML)
        #[arg(long)]
        mappo: Option<PathBuf>,
        #[arg(long, default_value = "1000")]
        episodes: usize,
        #[arg(long, default_value = "3")]
        team_size: usize,
        #[arg(long)]
        lr_actor: Option<f64>,
        #[arg(long)]
        lr_critic: Option<f64>,
        /// Directory for checkpoints and the final model
        #[arg(long, default_value = "models")]
        output: PathBuf,
        /// Checkpoint to continue training from
        #[arg(long)]
        resume: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    match Cli::parse().command {
        Command::Simulate { config, team_size, seed, red, blue, json } => {
            simulate(config.as_deref(), team_size, seed, red.as_deref(), blue.as_deref(), json)
        }
        Command::Train { config, mappo, episodes, team_size, lr_actor, lr_critic, output, resume } => train(
            config.as_deref(),
            mappo.as_deref(),
            episodes,
            team_size,
            lr_actor,
            lr_critic,
            output,
            resume,
        ),
    }
}

fn load_combat_config(path: Option<&Path>) -> Result<CombatConfig> {
    match path {
        Some(path) => CombatConfig::load(path),
        None => Ok(CombatConfig::default()),
    }
}

fn controller(path: Option<&Path>, signature: &ModelSignature) -> Result<TeamController> {
    match path {
        Some(path) => Ok(TeamController::Policy(PolicyArtifact::load_checked(path, signature)?.into_snapshot())),
        None => Ok(TeamController::Idle),
    }
}

fn simulate(
    config: Option<&Path>,
    team_size: Option<usize>,
    seed: Option<u64>,
    red: Option<&Path>,
    blue: Option<&Path>,
    json: bool,
) -> Result<()> {
    let mut config = load_combat_config(config)?;
    if let Some(size) = team_size {
        config = config.symmetric(size);
    }
    if let Some(seed) = seed {
        config = config.seed(seed);
    }
    let signature = ModelSignature::for_team_size(config.team_size());
    let red = controller(red, &signature)?;
    let blue = controller(blue, &signature)?;

    let report = play_match(config, red, blue)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Outcome: {:?} after {} ticks", report.outcome, report.steps);
        println!("  Red : {} alive, {} kills, reward {:.2}", report.red_alive, report.red_kills, report.red_reward);
        println!("  Blue: {} alive, {} kills, reward {:.2}", report.blue_alive, report.blue_kills, report.blue_reward);
    }
    Ok(())
}

#[cfg(feature = "training")]
#[allow(clippy::too_many_arguments)]
fn train(
    config: Option<&Path>,
    mappo: Option<&Path>,
    episodes: usize,
    team_size: usize,
    lr_actor: Option<f64>,
    lr_critic: Option<f64>,
    output: PathBuf,
    resume: Option<PathBuf>,
) -> Result<()> {
    use skybattle::{
        multi_agent::{SelfPlayLearner, TrainingEvent, TrainingRequest},
        train::MappoConfig,
    };

    let combat = load_combat_config(config)?;
    let mappo = match mappo {
        Some(path) => MappoConfig::load(path)?,
        None => MappoConfig::default(),
    };

    let mut request = TrainingRequest::new(episodes, team_size);
    request.lr_actor = lr_actor.unwrap_or(mappo.lr_actor);
    request.lr_critic = lr_critic.unwrap_or(mappo.lr_critic);

    let mut learner = SelfPlayLearner::new(combat, mappo).with_output_dir(&output);
    if let Some(path) = resume {
        learner = learner.with_resume(path);
    }
    let run = learner.start(request)?;
    tracing::info!(id = %run.id, output = %output.display(), "training started");

    for event in run.events.iter() {
        match event {
            TrainingEvent::Divergence { update, reason, consecutive } => {
                tracing::warn!(update, consecutive, %reason, "update rolled back");
            }
            TrainingEvent::Finished { episodes, updates, model_path, error } => {
                match model_path {
                    Some(path) => println!("Finished {episodes} episodes, {updates} updates; model at {}", path.display()),
                    None => println!("Finished {episodes} episodes, {updates} updates"),
                }
                if let Some(error) = error {
                    eprintln!("Training failed: {error}");
                }
            }
            _ => {}
        }
    }
    run.join()
}

#[cfg(not(feature = "training"))]
#[allow(clippy::too_many_arguments)]
fn train(
    _config: Option<&Path>,
    _mappo: Option<&Path>,
    _episodes: usize,
    _team_size: usize,
    _lr_actor: Option<f64>,
    _lr_critic: Option<f64>,
    _output: PathBuf,
    _resume: Option<PathBuf>,
) -> Result<()> {
    anyhow::bail!("the train command requires building with `--features training`")
}
