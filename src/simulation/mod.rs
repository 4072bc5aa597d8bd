//! Simulation collaborator interface.
//!
//! The trainer never models physics. It only needs something that accepts one
//! discrete action per agent, advances one tick, and reports per-role
//! observations, per-agent rewards, and a shared termination flag.

pub mod pitch;
pub mod scripted;

pub use pitch::{Pitch, PitchConfig};
pub use scripted::ScriptedSimulation;

use crate::error::SimulationError;
use crate::types::{JointObservation, Role, RoleMap, INSTANCES_PER_ROLE};

/// Result of advancing the simulation by one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Observations after the step, per role then instance.
    pub observations: JointObservation,
    /// Rewards for the step, per role then instance.
    pub rewards: RoleMap<Vec<f32>>,
    /// Whether the episode ended on this step.
    pub done: bool,
}

/// A multi-agent environment stepped synchronously with one joint action.
pub trait Simulation {
    /// Width of each per-agent observation for `role`.
    fn observation_dim(&self, role: Role) -> usize;

    /// Number of discrete actions available to `role`.
    fn action_dim(&self, role: Role) -> usize;

    /// Starts a new episode and returns the initial observations.
    ///
    /// `train_mode` lets an environment randomize start states during
    /// training and keep them fixed for evaluation.
    fn reset(&mut self, train_mode: bool) -> Result<JointObservation, SimulationError>;

    /// Advances one tick given one action per agent, per role.
    fn step(&mut self, actions: &RoleMap<Vec<i64>>) -> Result<StepOutcome, SimulationError>;

    /// Releases the environment.
    fn close(&mut self) {}
}

/// Checks that `actions` holds one in-range action per instance of each role.
pub fn check_actions(
    actions: &RoleMap<Vec<i64>>,
    action_dims: &RoleMap<usize>,
) -> Result<(), SimulationError> {
    for (role, per_role) in actions.iter() {
        if per_role.len() != INSTANCES_PER_ROLE {
            return Err(SimulationError::WrongInstanceCount {
                role,
                expected: INSTANCES_PER_ROLE,
                actual: per_role.len(),
            });
        }
        let action_dim = action_dims[role];
        for (instance, &action) in per_role.iter().enumerate() {
            if action < 0 || action as usize >= action_dim {
                return Err(SimulationError::InvalidAction {
                    role,
                    instance,
                    action,
                    action_dim,
                });
            }
        }
    }
    Ok(())
}
