//! Hyperparameters for a training run.
//!
//! A [`TrainingConfig`] is built once at startup, validated, and handed to
//! every component that needs it. Nothing reads hyperparameters from global
//! state.

use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Role;

/// Training hyperparameters, immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrainingConfig {
    /// Simulation steps collected before each update (N_STEP).
    pub n_step: usize,
    /// Mini-batch size for the update's inner loop (BATCH_SIZE).
    pub batch_size: usize,
    /// Reward discount γ (GAMMA).
    pub gamma: f64,
    /// PPO clip threshold ε (EPSILON).
    pub epsilon: f64,
    /// Entropy bonus coefficient (ENTROPY_WEIGHT).
    pub entropy_weight: f64,
    /// Max gradient norm (GRADIENT_CLIP).
    pub gradient_clip: f64,
    /// Weight of the value regression term in the combined loss.
    pub value_loss_coef: f64,
    /// Passes over the pooled buffer per update call.
    pub n_epochs: usize,
    /// Adam learning rate for the goalie actor and critic.
    pub goalie_lr: f64,
    /// Adam learning rate for the striker actor and critic.
    pub striker_lr: f64,
    /// Hidden layer widths shared by actor and critic MLPs.
    pub hidden_sizes: Vec<i64>,
    /// Seed for torch and mini-batch shuffling. `None` leaves both unseeded.
    pub seed: Option<u64>,
    /// Where checkpoints are written; `None` disables persistence.
    pub checkpoint_dir: Option<PathBuf>,
    /// Load existing checkpoints from `checkpoint_dir` at startup.
    pub resume: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_step: 128,
            batch_size: 32,
            gamma: 0.99,
            epsilon: 0.1,
            entropy_weight: 0.001,
            gradient_clip: 0.5,
            value_loss_coef: 1.0,
            n_epochs: 1,
            goalie_lr: 8e-5,
            striker_lr: 1e-4,
            hidden_sizes: vec![256, 128],
            seed: Some(0),
            checkpoint_dir: None,
            resume: false,
        }
    }
}

fn invalid(field: &'static str, requirement: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        field,
        requirement,
        value: value.to_string(),
    }
}

impl TrainingConfig {
    /// Learning rate of the optimizer for `role`.
    pub fn learning_rate(&self, role: Role) -> f64 {
        match role {
            Role::Goalie => self.goalie_lr,
            Role::Striker => self.striker_lr,
        }
    }

    /// Checkpoint layout, if persistence is enabled.
    pub fn checkpoint_paths(&self) -> Option<CheckpointPaths> {
        self.checkpoint_dir.as_deref().map(CheckpointPaths::new)
    }

    /// Rejects hyperparameters that would only fail (or silently misbehave)
    /// mid-run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_step == 0 {
            return Err(invalid("n_step", "positive", self.n_step));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "positive", self.batch_size));
        }
        if self.batch_size > self.n_step {
            return Err(ConfigError::BatchExceedsRollout {
                batch_size: self.batch_size,
                n_step: self.n_step,
            });
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(invalid("gamma", "in [0, 1]", self.gamma));
        }
        if !(self.epsilon > 0.0 && self.epsilon < 1.0) {
            return Err(invalid("epsilon", "in (0, 1)", self.epsilon));
        }
        if !(self.entropy_weight >= 0.0 && self.entropy_weight.is_finite()) {
            return Err(invalid("entropy_weight", "finite and non-negative", self.entropy_weight));
        }
        if !(self.value_loss_coef >= 0.0 && self.value_loss_coef.is_finite()) {
            return Err(invalid("value_loss_coef", "finite and non-negative", self.value_loss_coef));
        }
        if !(self.gradient_clip > 0.0 && self.gradient_clip.is_finite()) {
            return Err(invalid("gradient_clip", "finite and positive", self.gradient_clip));
        }
        if self.n_epochs == 0 {
            return Err(invalid("n_epochs", "positive", self.n_epochs));
        }
        for (field, lr) in [("goalie_lr", self.goalie_lr), ("striker_lr", self.striker_lr)] {
            if !(lr > 0.0 && lr.is_finite()) {
                return Err(invalid(field, "finite and positive", lr));
            }
        }
        if self.hidden_sizes.is_empty() || self.hidden_sizes.iter().any(|&h| h <= 0) {
            return Err(invalid(
                "hidden_sizes",
                "a non-empty list of positive widths",
                format!("{:?}", self.hidden_sizes),
            ));
        }
        if self.resume && self.checkpoint_dir.is_none() {
            return Err(invalid("checkpoint_dir", "set when resume is enabled", "none"));
        }
        Ok(())
    }

    /// Reads a JSON config file; missing fields take their defaults.
    #[cfg(feature = "serde")]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let unreadable = |reason: String| ConfigError::Unreadable {
            path: path.to_path_buf(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
        let config: Self = serde_json::from_str(&text).map_err(|e| unreadable(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Which network of a role a checkpoint artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
    Actor,
    Critic,
}

impl NetworkKind {
    /// Variable-store prefix under which this network's parameters live.
    pub fn prefix(&self) -> &'static str {
        match self {
            NetworkKind::Actor => "actor",
            NetworkKind::Critic => "critic",
        }
    }
}

/// Fixed checkpoint layout: one artifact per (role, network kind).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPaths {
    dir: PathBuf,
}

impl CheckpointPaths {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// e.g. `<dir>/goalie_actor.ot`.
    pub fn path(&self, role: Role, kind: NetworkKind) -> PathBuf {
        self.dir
            .join(format!("{}_{}.ot", role.file_stem(), kind.prefix()))
    }

    /// True when both artifacts of `role` are present.
    pub fn exists(&self, role: Role) -> bool {
        [NetworkKind::Actor, NetworkKind::Critic]
            .iter()
            .all(|&kind| self.path(role, kind).is_file())
    }
}
