//! Deterministic stub simulation for tests.

use super::{check_actions, Simulation, StepOutcome};
use crate::error::SimulationError;
use crate::types::{JointObservation, Role, RoleMap, INSTANCES_PER_ROLE};

/// Emits zero reward except on one scripted step, then ends the episode.
///
/// Observations encode episode progress (`t / episode_len`) in every slot,
/// so a critic can tell steps apart. Actions are validated but otherwise
/// ignored.
#[derive(Debug, Clone)]
pub struct ScriptedSimulation {
    observation_dims: RoleMap<usize>,
    action_dims: RoleMap<usize>,
    episode_len: usize,
    reward_step: usize,
    reward: f32,
    t: usize,
    closed: bool,
    /// Steps taken across all episodes.
    pub total_steps: usize,
    /// Episodes started via [`Simulation::reset`].
    pub resets: usize,
}

impl ScriptedSimulation {
    /// Creates a stub that pays `reward` to every agent on step `reward_step`
    /// (1-based) and signals done after `episode_len` steps.
    pub fn new(episode_len: usize, reward_step: usize, reward: f32) -> Self {
        Self {
            observation_dims: RoleMap::new(3, 3),
            action_dims: RoleMap::new(4, 6),
            episode_len,
            reward_step,
            reward,
            t: 0,
            closed: false,
            total_steps: 0,
            resets: 0,
        }
    }

    /// Overrides the per-role observation widths.
    pub fn with_observation_dims(mut self, goalie: usize, striker: usize) -> Self {
        self.observation_dims = RoleMap::new(goalie, striker);
        self
    }

    fn observations(&self) -> JointObservation {
        let progress = self.t as f32 / self.episode_len.max(1) as f32;
        RoleMap::from_fn(|role| {
            (0..INSTANCES_PER_ROLE)
                .map(|i| {
                    let mut obs = vec![progress; self.observation_dims[role]];
                    if let Some(first) = obs.first_mut() {
                        *first = i as f32;
                    }
                    obs
                })
                .collect()
        })
    }
}

impl Simulation for ScriptedSimulation {
    fn observation_dim(&self, role: Role) -> usize {
        self.observation_dims[role]
    }

    fn action_dim(&self, role: Role) -> usize {
        self.action_dims[role]
    }

    fn reset(&mut self, _train_mode: bool) -> Result<JointObservation, SimulationError> {
        if self.closed {
            return Err(SimulationError::Closed);
        }
        self.t = 0;
        self.resets += 1;
        Ok(self.observations())
    }

    fn step(&mut self, actions: &RoleMap<Vec<i64>>) -> Result<StepOutcome, SimulationError> {
        if self.closed {
            return Err(SimulationError::Closed);
        }
        check_actions(actions, &self.action_dims)?;

        self.t += 1;
        self.total_steps += 1;
        let reward = if self.t == self.reward_step {
            self.reward
        } else {
            0.0
        };

        Ok(StepOutcome {
            observations: self.observations(),
            rewards: RoleMap::from_fn(|_| vec![reward; INSTANCES_PER_ROLE]),
            done: self.t >= self.episode_len,
        })
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
