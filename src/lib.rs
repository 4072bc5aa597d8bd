//! soccer_mappo - self-play multi-agent PPO for two-versus-two soccer
//!
//! Two goalies and two strikers learn with decentralized actors and
//! centralized critics. Both instances of a role share one actor, one critic
//! and one optimizer; each instance keeps its own trajectory buffer.
//!
//! The learning machinery (networks, agents, update engine and training
//! loop) needs the `nn` feature, which is on by default and links libtorch
//! through `tch`. Data types, configuration, return computation and the
//! simulations build without it.

pub mod config;
pub mod error;
pub mod metrics;
pub mod observation;
pub mod simulation;
pub mod training;
pub mod types;

#[cfg(feature = "nn")]
pub mod agent;
#[cfg(feature = "nn")]
pub mod coach;
#[cfg(feature = "nn")]
pub mod network;

pub use config::{CheckpointPaths, NetworkKind, TrainingConfig};
pub use error::{ConfigError, Result, SimulationError, TrainingError};
pub use metrics::{EpisodeScores, EvaluationReport};
pub use observation::ObservationBuilder;
pub use simulation::{Pitch, PitchConfig, ScriptedSimulation, Simulation, StepOutcome};
pub use training::{TrajectoryBuffer, Transition};
pub use types::{AgentId, JointObservation, Role, RoleMap, INSTANCES_PER_ROLE};

#[cfg(feature = "nn")]
pub use agent::{ActionMode, ActionSample, PolicyAgent};
#[cfg(feature = "nn")]
pub use coach::{Coach, Phase, TrainingSummary};
#[cfg(feature = "nn")]
pub use network::{ActorNetwork, Categorical, CriticNetwork, ModelDims, ParameterSnapshot, PolicyNetwork, RoleModel, ValueNetwork};
#[cfg(feature = "nn")]
pub use training::{PpoEngine, UpdateStats};
