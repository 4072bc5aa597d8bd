//! Learning machinery: trajectory buffers, return computation and the PPO
//! update engine.

pub mod buffer;
pub mod returns;

#[cfg(feature = "nn")]
pub mod ppo;

pub use buffer::{TrajectoryBuffer, Transition};
pub use returns::{discounted_returns, normalize_advantages};

#[cfg(feature = "nn")]
pub use ppo::{clipped_surrogate, PpoEngine, UpdateStats};
