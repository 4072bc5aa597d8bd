//! PPO update engine for one role.
//!
//! The engine owns the role's optimizer and is the only code path that
//! changes the shared [`RoleModel`] parameters. An update consumes the pooled
//! buffers of both instances of the role:
//!
//! 1. N-step returns per buffer, bootstrapped from the critic when a segment
//!    stops mid-episode.
//! 2. Advantages `return - V(critic_observation)` with `V` evaluated once,
//!    without gradients, under the parameters at the start of the call. They
//!    stay fixed for every epoch of that call.
//! 3. Shuffled mini-batches of `batch_size` (last one may be smaller), each
//!    used once per epoch.
//! 4. Clipped surrogate, entropy bonus and value MSE combined into one loss,
//!    backpropagated through both networks, gradient norm clipped, one
//!    optimizer step per mini-batch.

use std::rc::Rc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tch::{nn, nn::OptimizerConfig, Kind, Tensor};

use super::buffer::TrajectoryBuffer;
use super::returns::{discounted_returns, normalize_advantages};
use crate::config::TrainingConfig;
use crate::error::{Result, TrainingError};
use crate::network::{all_finite, PolicyNetwork, RoleModel, ValueNetwork};
use crate::types::Role;

/// Per-sample clipped surrogate loss `-min(r·A, clip(r, 1-ε, 1+ε)·A)`.
///
/// `r = exp(new_log_probs - old_log_probs)`. The caller averages.
pub fn clipped_surrogate(
    new_log_probs: &Tensor,
    old_log_probs: &Tensor,
    advantages: &Tensor,
    epsilon: f64,
) -> Tensor {
    let ratio = (new_log_probs - old_log_probs).exp();
    let unclipped = &ratio * advantages;
    let clipped = ratio.clamp(1.0 - epsilon, 1.0 + epsilon) * advantages;
    -unclipped.min_other(&clipped)
}

/// Diagnostics of one update call, averaged over its mini-batches.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UpdateStats {
    pub policy_loss: f64,
    pub value_loss: f64,
    pub entropy: f64,
    /// Fraction of samples whose ratio left `[1-ε, 1+ε]`.
    pub clip_fraction: f64,
    pub approx_kl: f64,
    /// Gradient norm before clipping.
    pub grad_norm: f64,
    pub minibatches: usize,
    pub samples: usize,
}

/// Pooled transitions of one update, as tensors on the model's device.
struct Batch {
    actor_observations: Tensor,
    critic_observations: Tensor,
    actions: Tensor,
    old_log_probs: Tensor,
    returns: Tensor,
    len: usize,
}

/// Owns one role's optimizer and applies PPO updates to its shared model.
pub struct PpoEngine {
    role: Role,
    model: Rc<RoleModel>,
    optimizer: nn::Optimizer,
    config: TrainingConfig,
    rng: StdRng,
    updates: usize,
}

impl PpoEngine {
    /// Creates an engine with an Adam optimizer at the role's learning rate.
    pub fn new(role: Role, model: Rc<RoleModel>, config: &TrainingConfig) -> Result<Self> {
        config.validate()?;
        let optimizer = nn::Adam::default().build(model.var_store(), config.learning_rate(role))?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(role.index() as u64)),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            role,
            model,
            optimizer,
            config: config.clone(),
            rng,
            updates: 0,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn model(&self) -> &Rc<RoleModel> {
        &self.model
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Number of update calls that changed parameters.
    pub fn updates(&self) -> usize {
        self.updates
    }

    /// Critic estimate for one joint observation.
    pub fn state_value(&self, critic_observation: &[f32]) -> Result<f64> {
        let critic = self.model.critic();
        if critic_observation.len() != critic.state_dim() {
            return Err(TrainingError::InputWidth {
                role: self.role,
                expected: critic.state_dim(),
                actual: critic_observation.len(),
            });
        }
        let value = tch::no_grad(|| {
            let state = Tensor::from_slice(critic_observation)
                .to_device(self.model.device())
                .unsqueeze(0);
            critic.forward(&state).double_value(&[0])
        });
        if !value.is_finite() {
            return Err(TrainingError::NonFinite {
                role: self.role,
                quantity: "state value",
            });
        }
        Ok(value)
    }

    /// Runs one PPO update over the pooled `buffers`.
    ///
    /// Returns `None` without touching parameters when the buffers hold no
    /// transitions. On any error the model is restored to its parameters from
    /// before the call. Buffers are left untouched.
    pub fn update(&mut self, buffers: &[&TrajectoryBuffer]) -> Result<Option<UpdateStats>> {
        let Some(batch) = self.collect(buffers)? else {
            return Ok(None);
        };

        let values: Vec<f64> = tch::no_grad(|| {
            let v = self.model.critic().forward(&batch.critic_observations);
            Vec::<f64>::try_from(&v.to_kind(Kind::Double))
        })?;
        let returns = Vec::<f64>::try_from(&batch.returns.to_kind(Kind::Double))?;
        let mut advantages: Vec<f64> = returns.iter().zip(&values).map(|(r, v)| r - v).collect();
        if advantages.iter().any(|a| !a.is_finite()) {
            return Err(TrainingError::NonFinite {
                role: self.role,
                quantity: "advantages",
            });
        }
        normalize_advantages(&mut advantages);
        let advantages = Tensor::from_slice(&advantages)
            .to_kind(Kind::Float)
            .to_device(self.model.device());

        let snapshot = self.model.snapshot();
        match self.optimize(&batch, &advantages) {
            Ok(stats) => {
                self.updates += 1;
                tracing::debug!(
                    role = %self.role,
                    samples = stats.samples,
                    minibatches = stats.minibatches,
                    policy_loss = stats.policy_loss,
                    value_loss = stats.value_loss,
                    entropy = stats.entropy,
                    clip_fraction = stats.clip_fraction,
                    grad_norm = stats.grad_norm,
                    "ppo update"
                );
                Ok(Some(stats))
            }
            Err(e) => {
                self.model.restore(&snapshot)?;
                Err(e)
            }
        }
    }

    /// Critic mean-squared error against the returns of `buffers`, without
    /// updating. Zero for empty buffers.
    pub fn value_loss(&self, buffers: &[&TrajectoryBuffer]) -> Result<f64> {
        let Some(batch) = self.collect(buffers)? else {
            return Ok(0.0);
        };
        let loss = tch::no_grad(|| {
            let values = self.model.critic().forward(&batch.critic_observations);
            (values - &batch.returns)
                .square()
                .mean(Kind::Float)
                .double_value(&[])
        });
        Ok(loss)
    }

    /// Mini-batch epochs over a prepared batch.
    fn optimize(&mut self, batch: &Batch, advantages: &Tensor) -> Result<UpdateStats> {
        let device = self.model.device();
        let epsilon = self.config.epsilon;
        let mut indices: Vec<i64> = (0..batch.len as i64).collect();

        let mut totals = UpdateStats {
            policy_loss: 0.0,
            value_loss: 0.0,
            entropy: 0.0,
            clip_fraction: 0.0,
            approx_kl: 0.0,
            grad_norm: 0.0,
            minibatches: 0,
            samples: batch.len,
        };

        for _ in 0..self.config.n_epochs {
            indices.shuffle(&mut self.rng);
            for chunk in indices.chunks(self.config.batch_size) {
                let idx = Tensor::from_slice(chunk).to_device(device);
                let obs = batch.actor_observations.index_select(0, &idx);
                let states = batch.critic_observations.index_select(0, &idx);
                let actions = batch.actions.index_select(0, &idx);
                let old_log_probs = batch.old_log_probs.index_select(0, &idx);
                let returns = batch.returns.index_select(0, &idx);
                let adv = advantages.index_select(0, &idx);

                let dist = self.model.actor().forward(&obs);
                let log_probs = dist.log_prob(&actions);
                let policy_loss =
                    clipped_surrogate(&log_probs, &old_log_probs, &adv, epsilon).mean(Kind::Float);
                let entropy = dist.entropy().mean(Kind::Float);
                let values = self.model.critic().forward(&states);
                let value_loss = (&values - &returns).square().mean(Kind::Float);

                let loss = &policy_loss + self.config.value_loss_coef * &value_loss
                    - self.config.entropy_weight * &entropy;
                if !all_finite(&loss) {
                    return Err(TrainingError::NonFinite {
                        role: self.role,
                        quantity: "loss",
                    });
                }

                self.optimizer.zero_grad();
                loss.backward();
                let grad_norm = self.gradient_norm();
                if !grad_norm.is_finite() {
                    return Err(TrainingError::NonFinite {
                        role: self.role,
                        quantity: "gradient norm",
                    });
                }
                self.optimizer.clip_grad_norm(self.config.gradient_clip);
                self.optimizer.step();

                let (clip_fraction, approx_kl) = tch::no_grad(|| {
                    let ratio = (&log_probs - &old_log_probs).exp();
                    let clipped = (ratio - 1.0)
                        .abs()
                        .gt(epsilon)
                        .to_kind(Kind::Float)
                        .mean(Kind::Float)
                        .double_value(&[]);
                    let kl = (&old_log_probs - &log_probs)
                        .mean(Kind::Float)
                        .double_value(&[]);
                    (clipped, kl)
                });

                totals.policy_loss += policy_loss.double_value(&[]);
                totals.value_loss += value_loss.double_value(&[]);
                totals.entropy += entropy.double_value(&[]);
                totals.clip_fraction += clip_fraction;
                totals.approx_kl += approx_kl;
                totals.grad_norm += grad_norm;
                totals.minibatches += 1;
            }
        }

        let n = totals.minibatches.max(1) as f64;
        totals.policy_loss /= n;
        totals.value_loss /= n;
        totals.entropy /= n;
        totals.clip_fraction /= n;
        totals.approx_kl /= n;
        totals.grad_norm /= n;
        Ok(totals)
    }

    /// L2 norm over every parameter gradient currently stored.
    fn gradient_norm(&self) -> f64 {
        let mut sum = 0.0;
        for var in self.model.var_store().trainable_variables() {
            let grad = var.grad();
            if grad.defined() {
                sum += grad.square().sum(Kind::Double).double_value(&[]);
            }
        }
        sum.sqrt()
    }

    /// Pools `buffers` into one batch and computes per-buffer returns.
    fn collect(&self, buffers: &[&TrajectoryBuffer]) -> Result<Option<Batch>> {
        let len: usize = buffers.iter().map(|b| b.len()).sum();
        if len == 0 {
            return Ok(None);
        }

        let dims = self.model.dims();
        let mut actor_obs = Vec::with_capacity(len * dims.observation_dim);
        let mut critic_obs = Vec::with_capacity(len * dims.critic_dim);
        let mut actions = Vec::with_capacity(len);
        let mut old_log_probs = Vec::with_capacity(len);
        let mut returns = Vec::with_capacity(len);

        for buffer in buffers.iter().filter(|b| !b.is_empty()) {
            let bootstrap = match buffer.bootstrap_observation() {
                Some(obs) => self.state_value(obs)?,
                None => 0.0,
            };
            returns.extend(
                discounted_returns(&buffer.rewards(), &buffer.dones(), bootstrap, self.config.gamma)
                    .into_iter()
                    .map(|r| r as f32),
            );

            for t in buffer.transitions() {
                if t.actor_observation.len() != dims.observation_dim {
                    return Err(TrainingError::InputWidth {
                        role: self.role,
                        expected: dims.observation_dim,
                        actual: t.actor_observation.len(),
                    });
                }
                if t.critic_observation.len() != dims.critic_dim {
                    return Err(TrainingError::InputWidth {
                        role: self.role,
                        expected: dims.critic_dim,
                        actual: t.critic_observation.len(),
                    });
                }
                actor_obs.extend_from_slice(&t.actor_observation);
                critic_obs.extend_from_slice(&t.critic_observation);
                actions.push(t.action);
                old_log_probs.push(t.log_prob);
            }
        }

        if returns.iter().any(|r| !r.is_finite()) {
            return Err(TrainingError::NonFinite {
                role: self.role,
                quantity: "returns",
            });
        }

        let device = self.model.device();
        let rows = len as i64;
        Ok(Some(Batch {
            actor_observations: Tensor::from_slice(&actor_obs)
                .view([rows, dims.observation_dim as i64])
                .to_device(device),
            critic_observations: Tensor::from_slice(&critic_obs)
                .view([rows, dims.critic_dim as i64])
                .to_device(device),
            actions: Tensor::from_slice(&actions).to_device(device),
            old_log_probs: Tensor::from_slice(&old_log_probs).to_device(device),
            returns: Tensor::from_slice(&returns).to_device(device),
            len,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ModelDims;
    use crate::training::buffer::Transition;
    use tch::Device;

    fn dims() -> ModelDims {
        ModelDims {
            observation_dim: 3,
            critic_dim: 12,
            action_dim: 4,
        }
    }

    fn engine(config: &TrainingConfig) -> PpoEngine {
        let model = Rc::new(RoleModel::new(Role::Goalie, dims(), &[16], Device::Cpu));
        PpoEngine::new(Role::Goalie, model, config).unwrap()
    }

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            n_step: 8,
            batch_size: 4,
            goalie_lr: 1e-3,
            hidden_sizes: vec![16],
            ..TrainingConfig::default()
        }
    }

    /// Eight steps, reward 1 on the last one, episode ends.
    fn scripted_episode(instance: usize) -> TrajectoryBuffer {
        let mut buffer = TrajectoryBuffer::new();
        for t in 0..8 {
            let progress = t as f32 / 8.0;
            buffer.push(Transition {
                actor_observation: vec![instance as f32, progress, progress],
                critic_observation: vec![progress; 12],
                action: (t % 4) as i64,
                log_prob: (0.25_f32).ln(),
                reward: if t == 7 { 1.0 } else { 0.0 },
                done: t == 7,
            });
        }
        buffer
    }

    fn single(ratio: f32, advantage: f32, eps: f64) -> f64 {
        let new_lp = Tensor::from_slice(&[ratio.ln()]);
        let old_lp = Tensor::from_slice(&[0.0_f32]);
        let adv = Tensor::from_slice(&[advantage]);
        clipped_surrogate(&new_lp, &old_lp, &adv, eps).double_value(&[0])
    }

    #[test]
    fn surrogate_takes_pessimistic_term() {
        // Ratio above 1+ε: positive advantage is capped at the clipped term.
        assert!((single(1.5, 1.0, 0.2) - -1.2).abs() < 1e-5);
        // Ratio above 1+ε, negative advantage: unclipped term is worse.
        assert!((single(1.5, -1.0, 0.2) - 1.5).abs() < 1e-5);
        // Ratio below 1-ε, negative advantage: clipped term is worse.
        assert!((single(0.5, -1.0, 0.2) - 0.8).abs() < 1e-5);
        // Ratio below 1-ε, positive advantage: unclipped term is worse.
        assert!((single(0.5, 1.0, 0.2) - -0.5).abs() < 1e-5);
        // Inside the trust region nothing is clipped.
        assert!((single(1.1, 2.0, 0.2) - -2.2).abs() < 1e-5);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut engine = engine(&small_config());
        let before = engine.model().snapshot();
        let empty = TrajectoryBuffer::new();
        assert_eq!(engine.update(&[&empty, &empty]).unwrap(), None);
        assert_eq!(engine.model().snapshot().max_abs_diff(&before), 0.0);
        assert_eq!(engine.updates(), 0);
    }

    #[test]
    fn update_pools_buffers_into_minibatches() {
        let mut engine = engine(&small_config());
        let a = scripted_episode(0);
        let b = scripted_episode(1);
        let before = engine.model().snapshot();

        let stats = engine.update(&[&a, &b]).unwrap().unwrap();
        assert_eq!(stats.samples, 16);
        assert_eq!(stats.minibatches, 4);
        assert!(stats.entropy > 0.0);
        assert!(engine.model().snapshot().max_abs_diff(&before) > 0.0);
        // Buffers are the caller's to clear.
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn ragged_last_minibatch() {
        let config = TrainingConfig {
            batch_size: 5,
            ..small_config()
        };
        let mut engine = engine(&config);
        let a = scripted_episode(0);
        let stats = engine.update(&[&a]).unwrap().unwrap();
        assert_eq!(stats.minibatches, 2);
    }

    #[test]
    fn epochs_multiply_minibatches() {
        let config = TrainingConfig {
            n_epochs: 3,
            ..small_config()
        };
        let mut engine = engine(&config);
        let a = scripted_episode(0);
        assert_eq!(engine.update(&[&a]).unwrap().unwrap().minibatches, 6);
    }

    #[test]
    fn repeated_updates_reduce_value_loss() {
        let config = TrainingConfig {
            n_epochs: 4,
            ..small_config()
        };
        let mut engine = engine(&config);
        let a = scripted_episode(0);
        let b = scripted_episode(1);

        let before = engine.value_loss(&[&a, &b]).unwrap();
        for _ in 0..5 {
            engine.update(&[&a, &b]).unwrap();
        }
        let after = engine.value_loss(&[&a, &b]).unwrap();
        assert!(after < before, "value loss {before} -> {after}");
    }

    #[test]
    fn non_finite_reward_is_rejected() {
        let mut engine = engine(&small_config());
        let mut a = scripted_episode(0);
        a.push(Transition {
            actor_observation: vec![0.0; 3],
            critic_observation: vec![0.0; 12],
            action: 0,
            log_prob: -1.0,
            reward: f32::NAN,
            done: true,
        });
        assert!(matches!(
            engine.update(&[&a]),
            Err(TrainingError::NonFinite {
                quantity: "returns",
                ..
            })
        ));
    }

    #[test]
    fn failed_update_leaves_parameters_unchanged() {
        let mut engine = engine(&small_config());
        let mut a = scripted_episode(0);
        a.push(Transition {
            actor_observation: vec![f32::NAN; 3],
            critic_observation: vec![0.0; 12],
            action: 0,
            log_prob: -1.0,
            reward: 0.0,
            done: true,
        });
        let before = engine.model().snapshot();
        assert!(matches!(
            engine.update(&[&a]),
            Err(TrainingError::NonFinite { quantity: "loss", .. })
        ));
        assert_eq!(engine.model().snapshot().max_abs_diff(&before), 0.0);
        assert_eq!(engine.updates(), 0);
    }

    #[test]
    fn mid_episode_segment_bootstraps_from_critic() {
        let engine = engine(&small_config());
        let mut buffer = TrajectoryBuffer::new();
        buffer.push(Transition {
            actor_observation: vec![0.0; 3],
            critic_observation: vec![0.0; 12],
            action: 0,
            log_prob: -1.0,
            reward: 0.0,
            done: false,
        });
        buffer.set_bootstrap(vec![0.5; 12]);
        let v = engine.state_value(&[0.5; 12]).unwrap();

        let batch = engine.collect(&[&buffer]).unwrap().unwrap();
        let ret = batch.returns.double_value(&[0]);
        assert!((ret - 0.99 * v).abs() < 1e-5);
    }

    #[test]
    fn rejects_invalid_config() {
        let model = Rc::new(RoleModel::new(Role::Goalie, dims(), &[16], Device::Cpu));
        let bad = TrainingConfig {
            epsilon: 0.0,
            ..TrainingConfig::default()
        };
        assert!(matches!(
            PpoEngine::new(Role::Goalie, model, &bad),
            Err(TrainingError::Config(_))
        ));
    }
}
