//! Per-agent trajectory buffer.

/// One recorded simulation step of a single agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// The agent's own observation.
    pub actor_observation: Vec<f32>,
    /// Joint state seen by the role's centralized critic at the same step.
    pub critic_observation: Vec<f32>,
    /// Discrete action taken.
    pub action: i64,
    /// log π(action | actor_observation) when the action was sampled.
    pub log_prob: f32,
    /// Reward received for this step.
    pub reward: f32,
    /// Whether the episode ended on this step.
    pub done: bool,
}

/// Ordered store of one agent's transitions since the last reset.
///
/// Owned by a single Policy Agent and read (never drained) by the update
/// engine. Buffers are never shared between agents.
#[derive(Debug, Default, Clone)]
pub struct TrajectoryBuffer {
    transitions: Vec<Transition>,
    /// Joint state after the last recorded step, for bootstrapping a
    /// segment that ends mid-episode.
    bootstrap_observation: Option<Vec<f32>>,
}

impl TrajectoryBuffer {
    /// Creates a new empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with room for `capacity` transitions.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            transitions: Vec::with_capacity(capacity),
            bootstrap_observation: None,
        }
    }

    /// Appends a transition.
    ///
    /// Any previously stored bootstrap observation is dropped: it no longer
    /// follows the last transition.
    pub fn push(&mut self, transition: Transition) {
        self.bootstrap_observation = None;
        self.transitions.push(transition);
    }

    /// Records the critic observation that follows the last transition.
    pub fn set_bootstrap(&mut self, critic_observation: Vec<f32>) {
        self.bootstrap_observation = Some(critic_observation);
    }

    /// Critic observation to bootstrap from, unless the segment ended on a
    /// terminal step.
    pub fn bootstrap_observation(&self) -> Option<&[f32]> {
        match self.transitions.last() {
            Some(last) if !last.done => self.bootstrap_observation.as_deref(),
            _ => None,
        }
    }

    /// Clears all stored data.
    pub fn clear(&mut self) {
        self.transitions.clear();
        self.bootstrap_observation = None;
    }

    /// Returns the number of stored transitions.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Returns true if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn rewards(&self) -> Vec<f64> {
        self.transitions.iter().map(|t| t.reward as f64).collect()
    }

    pub fn dones(&self) -> Vec<bool> {
        self.transitions.iter().map(|t| t.done).collect()
    }
}

impl<'a> IntoIterator for &'a TrajectoryBuffer {
    type Item = &'a Transition;
    type IntoIter = std::slice::Iter<'a, Transition>;

    fn into_iter(self) -> Self::IntoIter {
        self.transitions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(reward: f32, done: bool) -> Transition {
        Transition {
            actor_observation: vec![0.0; 4],
            critic_observation: vec![0.0; 16],
            action: 1,
            log_prob: -0.5,
            reward,
            done,
        }
    }

    #[test]
    fn length_tracks_steps_and_reset() {
        let mut buf = TrajectoryBuffer::new();
        assert!(buf.is_empty());
        for k in 1..=5 {
            buf.push(transition(0.0, false));
            assert_eq!(buf.len(), k);
        }
        buf.clear();
        assert_eq!(buf.len(), 0);
        assert!(buf.bootstrap_observation().is_none());
    }

    #[test]
    fn bootstrap_ignored_after_terminal_step() {
        let mut buf = TrajectoryBuffer::new();
        buf.push(transition(1.0, true));
        buf.set_bootstrap(vec![1.0; 16]);
        assert!(buf.bootstrap_observation().is_none());
    }

    #[test]
    fn bootstrap_invalidated_by_new_transition() {
        let mut buf = TrajectoryBuffer::new();
        buf.push(transition(0.0, false));
        buf.set_bootstrap(vec![2.0; 16]);
        assert_eq!(buf.bootstrap_observation(), Some(&[2.0; 16][..]));
        buf.push(transition(0.0, false));
        assert!(buf.bootstrap_observation().is_none());
    }

    #[test]
    fn capacity_reserved_up_front() {
        let mut buf = TrajectoryBuffer::with_capacity(8);
        assert!(buf.transitions().is_empty());
        buf.push(transition(1.0, false));
        assert_eq!(buf.transitions()[0].reward, 1.0);
        assert!(buf.transitions.capacity() >= 8);
    }

    #[test]
    fn rewards_and_dones_in_order() {
        let mut buf = TrajectoryBuffer::new();
        buf.push(transition(1.0, false));
        buf.push(transition(0.0, false));
        buf.push(transition(2.0, true));
        assert_eq!(buf.rewards(), vec![1.0, 0.0, 2.0]);
        assert_eq!(buf.dones(), vec![false, false, true]);
    }
}
