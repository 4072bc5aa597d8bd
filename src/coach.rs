//! Self-play training loop.
//!
//! The coach drives one [`Simulation`] with four agents (two goalies, two
//! strikers). Every tick each agent acts on its own observation, the joint
//! action is stepped, and every agent records its transition together with
//! the critic view of the joint state at that tick. Every `n_step` ticks,
//! independent of episode boundaries, both roles are updated from the pooled
//! buffers of their two instances and all buffers are cleared.
//!
//! Phases: `Init → (Rollout ⇄ Update)* → Evaluate → Done`.

use std::rc::Rc;

use tch::Device;

use crate::agent::{ActionMode, ActionSample, PolicyAgent};
use crate::config::TrainingConfig;
use crate::error::{Result, SimulationError, TrainingError};
use crate::metrics::{EpisodeScores, EvaluationReport};
use crate::network::{ModelDims, RoleModel};
use crate::observation::ObservationBuilder;
use crate::simulation::{Simulation, StepOutcome};
use crate::training::{PpoEngine, TrajectoryBuffer, UpdateStats};
use crate::types::{AgentId, JointObservation, Role, RoleMap, INSTANCES_PER_ROLE};

/// Position of the coach in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Models built or loaded, nothing stepped yet.
    Init,
    Rollout,
    Update,
    Evaluate,
    /// Evaluation finished or the simulation was closed.
    Done,
}

/// Outcome of [`Coach::train`].
#[derive(Debug, Clone, Default)]
pub struct TrainingSummary {
    /// Scores of every training episode, in order.
    pub episodes: Vec<EpisodeScores>,
    /// Simulation steps taken by this call.
    pub steps: usize,
    /// Update cycles run by this call, including the final flush.
    pub updates: usize,
    /// Diagnostics of the last update of each role.
    pub last_stats: RoleMap<Option<UpdateStats>>,
}

/// Both instances of one role and the engine that updates their shared model.
struct Squad {
    engine: PpoEngine,
    agents: Vec<PolicyAgent>,
}

/// Runs rollouts, updates and evaluation for both roles.
pub struct Coach<S: Simulation> {
    sim: S,
    config: TrainingConfig,
    squads: RoleMap<Squad>,
    observation_dims: RoleMap<usize>,
    phase: Phase,
    total_steps: usize,
    steps_since_update: usize,
    updates: usize,
    last_stats: RoleMap<Option<UpdateStats>>,
}

impl<S: Simulation> Coach<S> {
    /// Validates `config`, builds one model and engine per role, and binds two
    /// agents to each model.
    ///
    /// With `config.resume`, role models found under the checkpoint directory
    /// are loaded; a role without checkpoint files starts fresh.
    pub fn new(sim: S, config: TrainingConfig, device: Device) -> Result<Self> {
        config.validate()?;
        if let Some(seed) = config.seed {
            tch::manual_seed(seed as i64);
        }

        let observation_dims = RoleMap::from_fn(|role| sim.observation_dim(role));
        let action_dims = RoleMap::from_fn(|role| sim.action_dim(role));
        for role in Role::ALL {
            if observation_dims[role] == 0 || action_dims[role] == 0 {
                return Err(TrainingError::Simulation {
                    episode: 0,
                    step: 0,
                    source: SimulationError::Failure(format!(
                        "{role} declares {} observation features and {} actions",
                        observation_dims[role], action_dims[role]
                    )),
                });
            }
        }
        let critic_dim = ObservationBuilder::critic_dim(&observation_dims);
        let model_dims = action_dims.map(|role, action_dim| ModelDims {
            observation_dim: observation_dims[role],
            critic_dim,
            action_dim,
        });

        let squads = RoleMap::try_from_fn(|role| -> Result<Squad> {
            let model = Rc::new(RoleModel::new(role, model_dims[role], &config.hidden_sizes, device));
            let engine = PpoEngine::new(role, Rc::clone(&model), &config)?;
            let agents = (0..INSTANCES_PER_ROLE)
                .map(|i| PolicyAgent::with_capacity(AgentId::new(role, i), Rc::clone(&model), config.n_step))
                .collect();
            Ok(Squad { engine, agents })
        })?;

        let coach = Self {
            sim,
            config,
            squads,
            observation_dims,
            phase: Phase::Init,
            total_steps: 0,
            steps_since_update: 0,
            updates: 0,
            last_stats: RoleMap::default(),
        };

        if coach.config.resume {
            if let Some(paths) = coach.config.checkpoint_paths() {
                for role in Role::ALL {
                    if paths.exists(role) {
                        coach.model(role).load(&paths)?;
                        tracing::info!(%role, dir = %paths.dir().display(), "resumed from checkpoint");
                    } else {
                        tracing::warn!(%role, dir = %paths.dir().display(), "no checkpoint to resume from, starting fresh");
                    }
                }
            }
        }

        Ok(coach)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn simulation(&self) -> &S {
        &self.sim
    }

    pub fn agent(&self, id: AgentId) -> &PolicyAgent {
        &self.squads[id.role].agents[id.instance]
    }

    pub fn engine(&self, role: Role) -> &PpoEngine {
        &self.squads[role].engine
    }

    /// The model shared by both instances of `role`.
    pub fn model(&self, role: Role) -> &Rc<RoleModel> {
        self.squads[role].engine.model()
    }

    /// Training steps taken over the coach's lifetime.
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Update cycles run over the coach's lifetime.
    pub fn updates(&self) -> usize {
        self.updates
    }

    pub fn last_stats(&self, role: Role) -> Option<&UpdateStats> {
        self.last_stats[role].as_ref()
    }

    /// Trains for `episodes` episodes.
    ///
    /// Transitions still buffered when the last episode ends go through one
    /// final update, and all four checkpoint artifacts are written when a
    /// checkpoint directory is configured. Any simulation or update failure
    /// aborts the run.
    pub fn train(&mut self, episodes: usize) -> Result<TrainingSummary> {
        let updates_before = self.updates;
        let steps_before = self.total_steps;
        let mut summary = TrainingSummary::default();
        let mut position = (0, 0);

        for episode in 0..episodes {
            self.phase = Phase::Rollout;
            let mut obs = self.reset(true, episode)?;
            let mut scores = EpisodeScores::default();
            let mut step = 0;

            loop {
                let critic_obs = ObservationBuilder::build_all(&obs);
                let samples = self.select_actions(&obs, ActionMode::Sample, episode, step)?;
                let outcome = self.advance(&samples, episode, step)?;
                step += 1;
                self.total_steps += 1;
                self.steps_since_update += 1;

                for role in Role::ALL {
                    for (i, agent) in self.squads[role].agents.iter_mut().enumerate() {
                        let sample = samples[role][i];
                        agent.record(
                            obs[role][i].clone(),
                            critic_obs[role][i].clone(),
                            sample.action,
                            sample.log_prob,
                            outcome.rewards[role][i],
                            outcome.done,
                        );
                    }
                }
                scores.add(&outcome.rewards);

                if self.steps_since_update >= self.config.n_step {
                    if !outcome.done {
                        self.set_bootstrap(&outcome.observations);
                    }
                    self.update_all(episode, step)?;
                }

                obs = outcome.observations;
                if outcome.done {
                    break;
                }
            }

            tracing::info!(
                episode,
                steps = scores.steps,
                goalie_return = mean(&scores.scores.goalie),
                striker_return = mean(&scores.scores.striker),
                "training episode finished"
            );
            position = (episode, step);
            summary.episodes.push(scores);
        }

        if self.buffered() > 0 {
            self.update_all(position.0, position.1)?;
        }
        self.checkpoint()?;

        summary.steps = self.total_steps - steps_before;
        summary.updates = self.updates - updates_before;
        summary.last_stats = self.last_stats.clone();
        Ok(summary)
    }

    /// Plays `episodes` episodes with greedy actions and no learning.
    ///
    /// Buffers are cleared first and nothing is recorded. For a simulation
    /// whose evaluation reset is deterministic, repeated calls without an
    /// intervening update return identical reports.
    pub fn evaluate(&mut self, episodes: usize) -> Result<EvaluationReport> {
        self.phase = Phase::Evaluate;
        self.reset_buffers();

        let mut report = EvaluationReport::default();
        for episode in 0..episodes {
            let mut obs = self.reset(false, episode)?;
            let mut scores = EpisodeScores::default();
            let mut step = 0;

            loop {
                let samples = self.select_actions(&obs, ActionMode::Greedy, episode, step)?;
                let outcome = self.advance(&samples, episode, step)?;
                step += 1;
                scores.add(&outcome.rewards);
                obs = outcome.observations;
                if outcome.done {
                    break;
                }
            }

            tracing::info!(
                episode,
                steps = scores.steps,
                goalie = ?scores.scores.goalie,
                striker = ?scores.scores.striker,
                "evaluation episode finished"
            );
            report.push(scores);
        }

        self.phase = Phase::Done;
        Ok(report)
    }

    /// Writes all four checkpoint artifacts. Returns false when no checkpoint
    /// directory is configured.
    pub fn checkpoint(&self) -> Result<bool> {
        let Some(paths) = self.config.checkpoint_paths() else {
            return Ok(false);
        };
        for role in Role::ALL {
            self.model(role).checkpoint(&paths)?;
        }
        tracing::info!(dir = %paths.dir().display(), "checkpoint saved");
        Ok(true)
    }

    /// Closes the simulation.
    pub fn close(&mut self) {
        self.sim.close();
        self.phase = Phase::Done;
    }

    /// Transitions currently held across all agents.
    fn buffered(&self) -> usize {
        self.squads
            .iter()
            .flat_map(|(_, squad)| squad.agents.iter())
            .map(|agent| agent.buffer().len())
            .sum()
    }

    fn reset_buffers(&mut self) {
        for (_, squad) in self.squads.iter_mut() {
            for agent in squad.agents.iter_mut() {
                agent.reset_buffer();
            }
        }
        self.steps_since_update = 0;
    }

    fn reset(&mut self, train_mode: bool, episode: usize) -> Result<JointObservation> {
        let obs = self
            .sim
            .reset(train_mode)
            .map_err(|source| TrainingError::Simulation {
                episode,
                step: 0,
                source,
            })?;
        self.check_observations(&obs, episode, 0)?;
        Ok(obs)
    }

    /// Steps the simulation with the chosen actions and validates the result.
    /// `step` is the index of the tick being taken.
    fn advance(
        &mut self,
        samples: &RoleMap<Vec<ActionSample>>,
        episode: usize,
        step: usize,
    ) -> Result<StepOutcome> {
        let actions = RoleMap::from_fn(|role| samples[role].iter().map(|s| s.action).collect());
        let outcome = self
            .sim
            .step(&actions)
            .map_err(|source| TrainingError::Simulation {
                episode,
                step: step + 1,
                source,
            })?;
        self.check_observations(&outcome.observations, episode, step + 1)?;
        for (role, rewards) in outcome.rewards.iter() {
            if rewards.len() != INSTANCES_PER_ROLE {
                return Err(TrainingError::InstanceCount {
                    role,
                    expected: INSTANCES_PER_ROLE,
                    actual: rewards.len(),
                    episode,
                    step: step + 1,
                });
            }
        }
        Ok(outcome)
    }

    fn check_observations(&self, obs: &JointObservation, episode: usize, step: usize) -> Result<()> {
        for (role, per_role) in obs.iter() {
            if per_role.len() != INSTANCES_PER_ROLE {
                return Err(TrainingError::InstanceCount {
                    role,
                    expected: INSTANCES_PER_ROLE,
                    actual: per_role.len(),
                    episode,
                    step,
                });
            }
            let expected = self.observation_dims[role];
            for (instance, o) in per_role.iter().enumerate() {
                if o.len() != expected {
                    return Err(TrainingError::ObservationShape {
                        role,
                        instance,
                        expected,
                        actual: o.len(),
                        episode,
                        step,
                    });
                }
            }
        }
        Ok(())
    }

    fn select_actions(
        &self,
        obs: &JointObservation,
        mode: ActionMode,
        episode: usize,
        step: usize,
    ) -> Result<RoleMap<Vec<ActionSample>>> {
        RoleMap::try_from_fn(|role| {
            self.squads[role]
                .agents
                .iter()
                .zip(&obs[role])
                .map(|(agent, o)| {
                    agent
                        .act(o, mode)
                        .map_err(|e| e.in_rollout(agent.id(), episode, step))
                })
                .collect()
        })
    }

    /// Stores the joint state following the last recorded step, for
    /// bootstrapping a segment cut mid-episode.
    fn set_bootstrap(&mut self, next_obs: &JointObservation) {
        let next_critic = ObservationBuilder::build_all(next_obs);
        for role in Role::ALL {
            for (agent, state) in self.squads[role].agents.iter_mut().zip(&next_critic[role]) {
                agent.buffer_mut().set_bootstrap(state.clone());
            }
        }
    }

    /// Updates both roles from their pooled buffers, then clears every buffer.
    ///
    /// The cycle is atomic across roles: if either update fails, both models
    /// are restored to their parameters from before the cycle, so a striker
    /// failure also undoes an already applied goalie step. Buffers are kept
    /// on failure.
    fn update_all(&mut self, episode: usize, step: usize) -> Result<()> {
        self.phase = Phase::Update;
        let snapshots = RoleMap::from_fn(|role| self.model(role).snapshot());
        let mut stats: RoleMap<Option<UpdateStats>> = RoleMap::default();
        for role in Role::ALL {
            let squad = &mut self.squads[role];
            let buffers: Vec<&TrajectoryBuffer> = squad.agents.iter().map(|a| a.buffer()).collect();
            match squad.engine.update(&buffers) {
                Ok(s) => stats[role] = s,
                Err(e) => {
                    for (r, snapshot) in snapshots.iter() {
                        self.model(r).restore(snapshot)?;
                    }
                    tracing::warn!(%role, episode, step, "update failed, both roles rolled back");
                    return Err(e.in_update(role, episode, step));
                }
            }
        }
        for (role, s) in stats.iter_mut() {
            if let Some(s) = s.take() {
                self.last_stats[role] = Some(s);
            }
        }
        self.reset_buffers();
        self.updates += 1;
        self.phase = Phase::Rollout;
        Ok(())
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
