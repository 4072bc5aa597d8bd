//! Train goalies and strikers with self-play MAPPO on the grid pitch.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example train_soccer --release -- --episodes 500 --checkpoint-dir runs/pitch
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use soccer_mappo::{Coach, Pitch, PitchConfig, TrainingConfig};
use tch::Device;

/// Self-play MAPPO on a two-versus-two grid soccer pitch
#[derive(Parser, Debug)]
#[command(name = "train_soccer", version, about)]
struct Args {
    /// Training episodes
    #[arg(long, default_value_t = 200)]
    episodes: usize,

    /// Greedy evaluation episodes run after training
    #[arg(long, default_value_t = 5)]
    eval_episodes: usize,

    /// Steps per episode before the pitch times out
    #[arg(long, default_value_t = 200)]
    max_steps: usize,

    /// Directory for the four checkpoint files
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// Load checkpoints from --checkpoint-dir before training
    #[arg(long, requires = "checkpoint_dir")]
    resume: bool,

    #[arg(long)]
    seed: Option<u64>,

    // --- Hyperparameter overrides ---
    #[arg(long)]
    n_step: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    gamma: Option<f64>,

    #[arg(long)]
    epsilon: Option<f64>,

    #[arg(long)]
    entropy_weight: Option<f64>,

    #[arg(long)]
    gradient_clip: Option<f64>,

    #[arg(long)]
    n_epochs: Option<usize>,

    #[arg(long)]
    goalie_lr: Option<f64>,

    #[arg(long)]
    striker_lr: Option<f64>,
}

impl Args {
    fn training_config(&self) -> TrainingConfig {
        let defaults = TrainingConfig::default();
        TrainingConfig {
            n_step: self.n_step.unwrap_or(defaults.n_step),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            gamma: self.gamma.unwrap_or(defaults.gamma),
            epsilon: self.epsilon.unwrap_or(defaults.epsilon),
            entropy_weight: self.entropy_weight.unwrap_or(defaults.entropy_weight),
            gradient_clip: self.gradient_clip.unwrap_or(defaults.gradient_clip),
            n_epochs: self.n_epochs.unwrap_or(defaults.n_epochs),
            goalie_lr: self.goalie_lr.unwrap_or(defaults.goalie_lr),
            striker_lr: self.striker_lr.unwrap_or(defaults.striker_lr),
            seed: self.seed.or(defaults.seed),
            checkpoint_dir: self.checkpoint_dir.clone(),
            resume: self.resume,
            ..defaults
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.training_config();
    let pitch = Pitch::new(
        PitchConfig {
            max_steps: args.max_steps,
            ..PitchConfig::default()
        },
        config.seed.unwrap_or(0),
    );

    let device = Device::cuda_if_available();
    tracing::info!(?device, episodes = args.episodes, "starting training");

    let mut coach = Coach::new(pitch, config, device).context("failed to set up training")?;
    let summary = coach.train(args.episodes).context("training aborted")?;
    tracing::info!(
        steps = summary.steps,
        updates = summary.updates,
        "training finished"
    );
    for (role, stats) in summary.last_stats.iter() {
        if let Some(stats) = stats {
            tracing::info!(
                %role,
                policy_loss = stats.policy_loss,
                value_loss = stats.value_loss,
                entropy = stats.entropy,
                "last update"
            );
        }
    }

    let report = coach.evaluate(args.eval_episodes).context("evaluation failed")?;
    println!("{report}");
    println!("Goals in the last evaluation episode: {:?}", coach.simulation().score);

    coach.close();
    Ok(())
}
