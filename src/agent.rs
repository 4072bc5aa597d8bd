//! Policy agents: one handle per (role, instance).
//!
//! Both instances of a role hold an `Rc` to the same [`RoleModel`], so their
//! actions always come from identical parameters. Each agent owns its own
//! [`TrajectoryBuffer`]; buffers are never shared between instances.

use std::rc::Rc;

use tch::{Kind, Tensor};

use crate::error::{Result, TrainingError};
use crate::network::{PolicyNetwork, RoleModel};
use crate::training::buffer::{TrajectoryBuffer, Transition};
use crate::types::AgentId;

/// How an agent turns its action distribution into an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionMode {
    /// Draw from the distribution (training rollouts).
    Sample,
    /// Take the most likely action (evaluation).
    Greedy,
}

/// An action together with its log-probability and the entropy of the
/// distribution it was drawn from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionSample {
    pub action: i64,
    pub log_prob: f32,
    pub entropy: f32,
}

/// Binds a shared role model to one agent's trajectory buffer.
///
/// Agents never mutate parameters; the role's [`crate::training::PpoEngine`]
/// is the only writer.
pub struct PolicyAgent {
    id: AgentId,
    model: Rc<RoleModel>,
    buffer: TrajectoryBuffer,
}

impl PolicyAgent {
    pub fn new(id: AgentId, model: Rc<RoleModel>) -> Self {
        Self::with_capacity(id, model, 0)
    }

    /// Like [`PolicyAgent::new`], reserving buffer room for `capacity`
    /// transitions.
    pub fn with_capacity(id: AgentId, model: Rc<RoleModel>, capacity: usize) -> Self {
        Self {
            id,
            model,
            buffer: TrajectoryBuffer::with_capacity(capacity),
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    /// The role model this agent acts with.
    pub fn model(&self) -> &Rc<RoleModel> {
        &self.model
    }

    pub fn buffer(&self) -> &TrajectoryBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut TrajectoryBuffer {
        &mut self.buffer
    }

    /// Chooses an action for `observation`.
    ///
    /// The forward pass runs without gradient tracking; the PPO engine
    /// recomputes log-probabilities under current parameters when it updates.
    /// A distribution containing NaN or infinite probabilities is an error.
    pub fn act(&self, observation: &[f32], mode: ActionMode) -> Result<ActionSample> {
        let role = self.id.role;
        let actor = self.model.actor();
        if observation.len() != actor.observation_dim() {
            return Err(TrainingError::InputWidth {
                role,
                expected: actor.observation_dim(),
                actual: observation.len(),
            });
        }

        tch::no_grad(|| -> Result<ActionSample> {
            let obs = Tensor::from_slice(observation)
                .to_device(self.model.device())
                .unsqueeze(0);
            let dist = actor.forward(&obs);
            if !dist.is_finite() {
                return Err(TrainingError::MalformedDistribution { role });
            }

            let action_t = match mode {
                ActionMode::Sample => dist.sample(),
                ActionMode::Greedy => dist.greedy(),
            };
            let action = action_t.int64_value(&[0]);
            if action < 0 || action as usize >= actor.action_dim() {
                return Err(TrainingError::ActionOutOfRange {
                    role,
                    action,
                    action_dim: actor.action_dim(),
                });
            }

            let log_prob = dist.log_prob(&action_t).to_kind(Kind::Float).double_value(&[0]);
            let entropy = dist.entropy().to_kind(Kind::Float).double_value(&[0]);
            Ok(ActionSample {
                action,
                log_prob: log_prob as f32,
                entropy: entropy as f32,
            })
        })
    }

    /// Appends one transition to this agent's buffer.
    pub fn record(
        &mut self,
        actor_observation: Vec<f32>,
        critic_observation: Vec<f32>,
        action: i64,
        log_prob: f32,
        reward: f32,
        done: bool,
    ) {
        self.buffer.push(Transition {
            actor_observation,
            critic_observation,
            action,
            log_prob,
            reward,
            done,
        });
    }

    /// Empties the buffer.
    pub fn reset_buffer(&mut self) {
        self.buffer.clear();
    }
}
