//! Actor and critic networks using tch-rs (PyTorch bindings).
//!
//! Both networks of a role live in one [`RoleModel`] variable store, under
//! the `actor` and `critic` prefixes, so a single optimizer can step them
//! together while checkpoints still keep one artifact per network.
//! This module is only available with the `nn` feature.

use std::collections::HashMap;
use std::path::Path;

use tch::{nn, nn::Module, Device, Kind, Tensor};

use crate::config::{CheckpointPaths, NetworkKind};
use crate::error::{Result, TrainingError};
use crate::types::Role;

/// Returns true when every element of `t` is finite.
pub(crate) fn all_finite(t: &Tensor) -> bool {
    t.isfinite().all().to_kind(Kind::Int64).int64_value(&[]) != 0
}

/// Discrete action distribution over the last dimension of a logits tensor.
#[derive(Debug)]
pub struct Categorical {
    log_probs: Tensor,
}

impl Categorical {
    pub fn from_logits(logits: &Tensor) -> Self {
        Self {
            log_probs: logits.log_softmax(-1, Kind::Float),
        }
    }

    /// Log-probabilities of every action, `[batch, action_dim]`.
    pub fn log_probs(&self) -> &Tensor {
        &self.log_probs
    }

    pub fn probs(&self) -> Tensor {
        self.log_probs.exp()
    }

    /// False if any probability is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        all_finite(&self.log_probs)
    }

    /// Samples one action per row.
    pub fn sample(&self) -> Tensor {
        self.probs().multinomial(1, true).squeeze_dim(-1)
    }

    /// Most likely action per row.
    pub fn greedy(&self) -> Tensor {
        self.log_probs.argmax(-1, false)
    }

    /// Log-probabilities of the given actions, `[batch]`.
    pub fn log_prob(&self, actions: &Tensor) -> Tensor {
        self.log_probs
            .gather(-1, &actions.unsqueeze(-1), false)
            .squeeze_dim(-1)
    }

    /// Per-row entropy, `[batch]`.
    pub fn entropy(&self) -> Tensor {
        -(self.probs() * &self.log_probs).sum_dim_intlist([-1].as_slice(), false, Kind::Float)
    }
}

/// Maps actor observations to an action distribution.
pub trait PolicyNetwork {
    fn forward(&self, observations: &Tensor) -> Categorical;

    fn observation_dim(&self) -> usize;

    fn action_dim(&self) -> usize;
}

/// Maps joint critic observations to a scalar value per row.
pub trait ValueNetwork {
    fn forward(&self, states: &Tensor) -> Tensor;

    fn state_dim(&self) -> usize;
}

fn mlp(p: &nn::Path, input: usize, hidden: &[i64], output: usize) -> nn::Sequential {
    let mut net = nn::seq();
    let mut width = input as i64;
    for (i, &h) in hidden.iter().enumerate() {
        net = net
            .add(nn::linear(p / format!("l{}", i + 1), width, h, Default::default()))
            .add_fn(|x| x.relu());
        width = h;
    }
    net.add(nn::linear(
        p / format!("l{}", hidden.len() + 1),
        width,
        output as i64,
        Default::default(),
    ))
}

/// MLP actor with a softmax output over discrete actions.
///
/// Architecture: `obs_dim → hidden… → action_dim` with ReLU activations.
pub struct ActorNetwork {
    net: nn::Sequential,
    observation_dim: usize,
    action_dim: usize,
}

impl ActorNetwork {
    pub fn new(p: &nn::Path, observation_dim: usize, action_dim: usize, hidden: &[i64]) -> Self {
        Self {
            net: mlp(p, observation_dim, hidden, action_dim),
            observation_dim,
            action_dim,
        }
    }
}

impl PolicyNetwork for ActorNetwork {
    fn forward(&self, observations: &Tensor) -> Categorical {
        Categorical::from_logits(&self.net.forward(observations))
    }

    fn observation_dim(&self) -> usize {
        self.observation_dim
    }

    fn action_dim(&self) -> usize {
        self.action_dim
    }
}

/// MLP centralized critic.
///
/// Architecture: `critic_dim → hidden… → 1` with ReLU activations.
pub struct CriticNetwork {
    net: nn::Sequential,
    state_dim: usize,
}

impl CriticNetwork {
    pub fn new(p: &nn::Path, state_dim: usize, hidden: &[i64]) -> Self {
        Self {
            net: mlp(p, state_dim, hidden, 1),
            state_dim,
        }
    }
}

impl ValueNetwork for CriticNetwork {
    fn forward(&self, states: &Tensor) -> Tensor {
        self.net.forward(states).squeeze_dim(-1)
    }

    fn state_dim(&self) -> usize {
        self.state_dim
    }
}

/// Input and output widths of one role's networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDims {
    pub observation_dim: usize,
    pub critic_dim: usize,
    pub action_dim: usize,
}

/// Deep copy of a model's parameters.
#[derive(Debug)]
pub struct ParameterSnapshot {
    tensors: HashMap<String, Tensor>,
}

impl ParameterSnapshot {
    /// Largest absolute element-wise difference to `other`; infinite if the
    /// two snapshots do not hold the same parameter names and shapes.
    pub fn max_abs_diff(&self, other: &ParameterSnapshot) -> f64 {
        if self.tensors.len() != other.tensors.len() {
            return f64::INFINITY;
        }
        let mut max = 0.0_f64;
        for (name, t) in &self.tensors {
            let Some(o) = other.tensors.get(name) else {
                return f64::INFINITY;
            };
            if t.size() != o.size() {
                return f64::INFINITY;
            }
            let diff = (t - o.to_device(t.device()))
                .abs()
                .max()
                .to_kind(Kind::Double)
                .double_value(&[]);
            max = max.max(diff);
        }
        max
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

/// The actor and centralized critic of one role.
///
/// Shared by both instances of the role; only the PPO engine that owns the
/// role's optimizer mutates it.
pub struct RoleModel {
    role: Role,
    vs: nn::VarStore,
    actor: ActorNetwork,
    critic: CriticNetwork,
    dims: ModelDims,
}

impl RoleModel {
    /// Creates freshly initialized networks for `role`.
    pub fn new(role: Role, dims: ModelDims, hidden: &[i64], device: Device) -> Self {
        let vs = nn::VarStore::new(device);
        let root = vs.root();
        let actor = ActorNetwork::new(
            &(&root / NetworkKind::Actor.prefix()),
            dims.observation_dim,
            dims.action_dim,
            hidden,
        );
        let critic = CriticNetwork::new(&(&root / NetworkKind::Critic.prefix()), dims.critic_dim, hidden);

        Self {
            role,
            vs,
            actor,
            critic,
            dims,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn dims(&self) -> ModelDims {
        self.dims
    }

    pub fn device(&self) -> Device {
        self.vs.device()
    }

    pub fn actor(&self) -> &ActorNetwork {
        &self.actor
    }

    pub fn critic(&self) -> &CriticNetwork {
        &self.critic
    }

    /// Variable store holding both networks (for optimizer creation).
    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    /// Parameters of one network, sorted by name.
    fn named_parameters(&self, kind: NetworkKind) -> Vec<(String, Tensor)> {
        let prefix = format!("{}.", kind.prefix());
        let mut named: Vec<_> = self
            .vs
            .variables()
            .into_iter()
            .filter(|(name, _)| name.starts_with(&prefix))
            .collect();
        named.sort_by(|a, b| a.0.cmp(&b.0));
        named
    }

    /// Copies `source` tensors into the variables of the same name.
    fn copy_into<'a>(
        &self,
        source: impl IntoIterator<Item = (&'a str, &'a Tensor)>,
        origin: &Path,
    ) -> Result<()> {
        let mut vars = self.vs.variables();
        let device = self.device();
        tch::no_grad(|| -> Result<()> {
            for (name, value) in source {
                let var = vars.get_mut(name).ok_or_else(|| TrainingError::Checkpoint {
                    path: origin.to_path_buf(),
                    reason: format!("unknown parameter {name}"),
                })?;
                if var.size() != value.size() {
                    return Err(TrainingError::Checkpoint {
                        path: origin.to_path_buf(),
                        reason: format!(
                            "parameter {name} has shape {:?}, expected {:?}",
                            value.size(),
                            var.size()
                        ),
                    });
                }
                var.f_copy_(&value.to_device(device))?;
            }
            Ok(())
        })
    }

    /// Writes `<role>_actor` and `<role>_critic` artifacts, each holding only
    /// that network's trainable parameters.
    pub fn checkpoint(&self, paths: &CheckpointPaths) -> Result<()> {
        std::fs::create_dir_all(paths.dir())?;
        for kind in [NetworkKind::Actor, NetworkKind::Critic] {
            let path = paths.path(self.role, kind);
            let named = self.named_parameters(kind);
            Tensor::save_multi(named.as_slice(), &path)?;
            tracing::debug!(role = %self.role, path = %path.display(), tensors = named.len(), "checkpoint written");
        }
        Ok(())
    }

    /// Loads both artifacts written by [`RoleModel::checkpoint`].
    pub fn load(&self, paths: &CheckpointPaths) -> Result<()> {
        for kind in [NetworkKind::Actor, NetworkKind::Critic] {
            let path = paths.path(self.role, kind);
            let loaded = Tensor::load_multi(&path)?;
            let expected = self.named_parameters(kind).len();
            if loaded.len() != expected {
                return Err(TrainingError::Checkpoint {
                    path,
                    reason: format!("holds {} tensors, expected {expected}", loaded.len()),
                });
            }
            self.copy_into(loaded.iter().map(|(n, t)| (n.as_str(), t)), &path)?;
        }
        Ok(())
    }

    /// Deep copy of every parameter, for rollback and comparisons.
    pub fn snapshot(&self) -> ParameterSnapshot {
        let tensors = self
            .vs
            .variables()
            .into_iter()
            .map(|(name, t)| (name, t.detach().copy()))
            .collect();
        ParameterSnapshot { tensors }
    }

    /// Restores every parameter from `snapshot`.
    pub fn restore(&self, snapshot: &ParameterSnapshot) -> Result<()> {
        self.copy_into(
            snapshot.tensors.iter().map(|(n, t)| (n.as_str(), t)),
            Path::new("<snapshot>"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> ModelDims {
        ModelDims {
            observation_dim: 10,
            critic_dim: 40,
            action_dim: 6,
        }
    }

    #[test]
    fn actor_forward_shape() {
        let model = RoleModel::new(Role::Striker, dims(), &[32, 16], Device::Cpu);
        let obs = Tensor::randn([4, 10], (Kind::Float, Device::Cpu));
        let dist = model.actor().forward(&obs);
        assert_eq!(dist.log_probs().size(), &[4, 6]);
        let total = dist.probs().sum_dim_intlist([-1].as_slice(), false, Kind::Float);
        let total: Vec<f32> = Vec::try_from(&total).unwrap();
        assert!(total.iter().all(|p| (p - 1.0).abs() < 1e-5));
    }

    #[test]
    fn critic_forward_shape() {
        let model = RoleModel::new(Role::Goalie, dims(), &[32], Device::Cpu);
        let state = Tensor::randn([5, 40], (Kind::Float, Device::Cpu));
        assert_eq!(model.critic().forward(&state).size(), &[5]);
    }

    #[test]
    fn categorical_entropy_of_uniform() {
        let dist = Categorical::from_logits(&Tensor::zeros([1, 4], (Kind::Float, Device::Cpu)));
        let h = dist.entropy().double_value(&[0]);
        assert!((h - 4.0_f64.ln()).abs() < 1e-5);
    }

    #[test]
    fn categorical_greedy_picks_max() {
        let logits = Tensor::from_slice(&[0.1_f32, 3.0, -1.0]).view([1, 3]);
        let dist = Categorical::from_logits(&logits);
        assert_eq!(dist.greedy().int64_value(&[0]), 1);
    }

    #[test]
    fn categorical_detects_nan() {
        let logits = Tensor::from_slice(&[f32::NAN, 0.0]).view([1, 2]);
        assert!(!Categorical::from_logits(&logits).is_finite());
    }

    #[test]
    fn variables_split_by_network() {
        let model = RoleModel::new(Role::Goalie, dims(), &[8], Device::Cpu);
        // Two linear layers (weight + bias) per network.
        assert_eq!(model.named_parameters(NetworkKind::Actor).len(), 4);
        assert_eq!(model.named_parameters(NetworkKind::Critic).len(), 4);
        assert_eq!(model.snapshot().len(), 8);
    }

    #[test]
    fn snapshot_restore_round_trip() {
        let model = RoleModel::new(Role::Goalie, dims(), &[8], Device::Cpu);
        let before = model.snapshot();
        tch::no_grad(|| {
            for (_, mut var) in model.var_store().variables() {
                let _ = var.fill_(0.5);
            }
        });
        assert!(model.snapshot().max_abs_diff(&before) > 0.0);
        model.restore(&before).unwrap();
        assert_eq!(model.snapshot().max_abs_diff(&before), 0.0);
    }

    #[test]
    fn checkpoint_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let paths = CheckpointPaths::new(dir.path());
        let saved = RoleModel::new(Role::Striker, dims(), &[8], Device::Cpu);
        saved.checkpoint(&paths).unwrap();
        assert!(paths.exists(Role::Striker));

        let fresh = RoleModel::new(Role::Striker, dims(), &[8], Device::Cpu);
        assert!(fresh.snapshot().max_abs_diff(&saved.snapshot()) > 0.0);
        fresh.load(&paths).unwrap();
        assert_eq!(fresh.snapshot().max_abs_diff(&saved.snapshot()), 0.0);
    }

    #[test]
    fn load_rejects_mismatched_architecture() {
        let dir = tempfile::tempdir().unwrap();
        let paths = CheckpointPaths::new(dir.path());
        RoleModel::new(Role::Goalie, dims(), &[8], Device::Cpu)
            .checkpoint(&paths)
            .unwrap();
        let wider = RoleModel::new(Role::Goalie, dims(), &[16], Device::Cpu);
        assert!(matches!(
            wider.load(&paths),
            Err(TrainingError::Checkpoint { .. })
        ));
    }
}
