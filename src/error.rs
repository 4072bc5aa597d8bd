use std::path::PathBuf;

use thiserror::Error;

use crate::types::{AgentId, Role};

/// Invalid hyperparameters, rejected before any simulation step runs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be {requirement}, got {value}")]
    Invalid {
        field: &'static str,
        requirement: &'static str,
        value: String,
    },

    #[error("batch_size ({batch_size}) cannot exceed n_step ({n_step})")]
    BatchExceedsRollout { batch_size: usize, n_step: usize },

    #[cfg(feature = "serde")]
    #[error("cannot read config {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
}

/// Failures reported by (or detected at) the simulation boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error("{role} instance {instance} chose action {action}, outside [0, {action_dim})")]
    InvalidAction {
        role: Role,
        instance: usize,
        action: i64,
        action_dim: usize,
    },

    #[error("expected {expected} {role} actions, got {actual}")]
    WrongInstanceCount {
        role: Role,
        expected: usize,
        actual: usize,
    },

    #[error("simulation is closed")]
    Closed,

    #[error("simulation failed: {0}")]
    Failure(String),
}

/// Crate-wide error for the learning machinery.
///
/// Anything touching simulation integrity or numerical correctness ends up
/// here and aborts the run; sizing issues (empty buffers, ragged mini-batches)
/// are handled locally and never surface.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("simulation error at episode {episode}, step {step}: {source}")]
    Simulation {
        episode: usize,
        step: usize,
        #[source]
        source: SimulationError,
    },

    #[error(
        "{role}-{instance} observation has width {actual}, expected {expected} \
         (episode {episode}, step {step})"
    )]
    ObservationShape {
        role: Role,
        instance: usize,
        expected: usize,
        actual: usize,
        episode: usize,
        step: usize,
    },

    #[error("{role} reported {actual} observations or rewards, expected {expected} (episode {episode}, step {step})")]
    InstanceCount {
        role: Role,
        expected: usize,
        actual: usize,
        episode: usize,
        step: usize,
    },

    #[error("{role} policy produced action {action}, outside [0, {action_dim})")]
    ActionOutOfRange {
        role: Role,
        action: i64,
        action_dim: usize,
    },

    #[error("{role} policy produced a malformed action distribution")]
    MalformedDistribution { role: Role },

    #[error("non-finite {quantity} in {role} update")]
    NonFinite { role: Role, quantity: &'static str },

    #[error("{role} update failed at episode {episode}, step {step}: {source}")]
    Update {
        role: Role,
        episode: usize,
        step: usize,
        #[source]
        source: Box<TrainingError>,
    },

    #[error("checkpoint {path}: {reason}")]
    Checkpoint { path: PathBuf, reason: String },

    #[error("{role} network expects input width {expected}, got {actual}")]
    InputWidth {
        role: Role,
        expected: usize,
        actual: usize,
    },

    #[error("{agent} failed to act at episode {episode}, step {step}: {source}")]
    Rollout {
        agent: AgentId,
        episode: usize,
        step: usize,
        #[source]
        source: Box<TrainingError>,
    },

    #[cfg(feature = "nn")]
    #[error(transparent)]
    Tch(#[from] tch::TchError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TrainingError {
    /// Attaches the run position to an error raised inside an update cycle.
    pub fn in_update(self, role: Role, episode: usize, step: usize) -> Self {
        TrainingError::Update {
            role,
            episode,
            step,
            source: Box::new(self),
        }
    }

    /// Attaches the run position to an error raised while an agent acted.
    pub fn in_rollout(self, agent: AgentId, episode: usize, step: usize) -> Self {
        TrainingError::Rollout {
            agent,
            episode,
            step,
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, TrainingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let e = ConfigError::BatchExceedsRollout {
            batch_size: 64,
            n_step: 8,
        };
        assert_eq!(e.to_string(), "batch_size (64) cannot exceed n_step (8)");
    }

    #[test]
    fn update_error_names_role_and_position() {
        let e = TrainingError::NonFinite {
            role: Role::Striker,
            quantity: "loss",
        }
        .in_update(Role::Striker, 3, 120);
        let s = e.to_string();
        assert!(s.contains("striker update failed at episode 3, step 120"));
        assert!(s.contains("non-finite loss"));
    }

    #[test]
    fn simulation_error_display() {
        let e = SimulationError::InvalidAction {
            role: Role::Goalie,
            instance: 1,
            action: 7,
            action_dim: 4,
        };
        assert_eq!(
            e.to_string(),
            "goalie instance 1 chose action 7, outside [0, 4)"
        );
    }
}
