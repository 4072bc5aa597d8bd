//! A small seeded grid-soccer simulation.
//!
//! Two teams of one goalie and one striker play on a `width × height` grid.
//! Team 0 defends the left goal line (x = 0) and attacks to the right; team 1
//! mirrors it. A player stepping onto the ball pushes it one cell; a striker
//! next to the ball can kick it several cells toward the opponent goal. A
//! goal is scored when the ball leaves the pitch through a goal mouth.
//!
//! This is a test and demo environment, not a physics model.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{check_actions, Simulation, StepOutcome};
use crate::error::SimulationError;
use crate::types::{AgentId, JointObservation, Role, RoleMap, INSTANCES_PER_ROLE};

/// Per-agent observation width: own, ball, teammate, opponent goalie, and
/// opponent striker positions.
pub const OBSERVATION_DIM: usize = 10;

/// Goalie actions: forward, back, up, down.
pub const GOALIE_ACTIONS: usize = 4;

/// Striker actions: stay, forward, back, up, down, kick.
pub const STRIKER_ACTIONS: usize = 6;

/// Geometry and reward shaping of the pitch.
#[derive(Debug, Clone, PartialEq)]
pub struct PitchConfig {
    pub width: i32,
    pub height: i32,
    /// Goal mouth spans `mid ± goal_half_width` rows.
    pub goal_half_width: i32,
    /// Episode horizon in ticks.
    pub max_steps: usize,
    /// Per-tick bonus for goalies and penalty for strikers.
    pub step_reward: f32,
    /// Cells the ball travels on a kick.
    pub kick_distance: i32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            width: 11,
            height: 7,
            goal_half_width: 1,
            max_steps: 200,
            step_reward: 1e-3,
            kick_distance: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cell {
    x: i32,
    y: i32,
}

impl Cell {
    fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    fn chebyshev(&self, other: &Cell) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

/// The grid-soccer environment.
///
/// # Lifecycle
///
/// 1. Call [`Pitch::new`] with configuration and seed.
/// 2. Call [`Simulation::reset`] to start an episode.
/// 3. Call [`Simulation::step`] with one action per agent until `done`.
#[derive(Debug)]
pub struct Pitch {
    pub config: PitchConfig,
    players: RoleMap<[Cell; INSTANCES_PER_ROLE]>,
    ball: Cell,
    /// Current tick within the episode.
    pub t: usize,
    /// Goals scored by each team this episode.
    pub score: [u32; INSTANCES_PER_ROLE],
    rng: StdRng,
    closed: bool,
}

impl Pitch {
    /// Creates a pitch with the given configuration and RNG seed.
    pub fn new(config: PitchConfig, seed: u64) -> Self {
        let mid = config.height / 2;
        Self {
            players: RoleMap::new([Cell::new(0, mid); 2], [Cell::new(0, mid); 2]),
            ball: Cell::new(config.width / 2, mid),
            t: 0,
            score: [0; INSTANCES_PER_ROLE],
            rng: StdRng::seed_from_u64(seed),
            closed: false,
            config,
        }
    }

    /// Direction team `team` attacks along x.
    fn forward(team: usize) -> i32 {
        if team == 0 {
            1
        } else {
            -1
        }
    }

    fn in_goal_mouth(&self, y: i32) -> bool {
        (y - self.config.height / 2).abs() <= self.config.goal_half_width
    }

    /// Moves the ball to `target`, returning the scoring team if it crossed
    /// a goal line inside the mouth. Off-pitch targets are clamped otherwise.
    fn move_ball(&mut self, target: Cell) -> Option<usize> {
        let crossed_left = target.x < 0;
        let crossed_right = target.x >= self.config.width;
        if (crossed_left || crossed_right) && self.in_goal_mouth(target.y) {
            return Some(if crossed_right { 0 } else { 1 });
        }
        self.ball = Cell::new(
            target.x.clamp(0, self.config.width - 1),
            target.y.clamp(0, self.config.height - 1),
        );
        None
    }

    fn delta(agent: AgentId, action: i64) -> (i32, i32) {
        let fwd = Self::forward(agent.instance);
        let movement = match agent.role {
            Role::Goalie => action + 1,
            Role::Striker => action,
        };
        match movement {
            1 => (fwd, 0),
            2 => (-fwd, 0),
            3 => (0, 1),
            4 => (0, -1),
            _ => (0, 0),
        }
    }

    /// Applies one agent's action. Returns the scoring team, if any.
    fn apply(&mut self, agent: AgentId, action: i64) -> Option<usize> {
        let pos = self.players[agent.role][agent.instance];

        if agent.role == Role::Striker && action == 5 {
            if pos.chebyshev(&self.ball) > 1 {
                return None;
            }
            let dx = Self::forward(agent.instance);
            for _ in 0..self.config.kick_distance {
                let next = Cell::new(self.ball.x + dx, self.ball.y);
                if let Some(team) = self.move_ball(next) {
                    return Some(team);
                }
            }
            return None;
        }

        let (dx, dy) = Self::delta(agent, action);
        if dx == 0 && dy == 0 {
            return None;
        }
        let target = Cell::new(
            (pos.x + dx).clamp(0, self.config.width - 1),
            (pos.y + dy).clamp(0, self.config.height - 1),
        );
        self.players[agent.role][agent.instance] = target;
        if target == self.ball {
            return self.move_ball(Cell::new(self.ball.x + dx, self.ball.y + dy));
        }
        None
    }

    /// Team-relative normalized coordinates of `cell` as seen by `team`.
    fn encode(&self, cell: Cell, team: usize) -> [f32; 2] {
        let x = if team == 0 {
            cell.x
        } else {
            self.config.width - 1 - cell.x
        };
        [
            x as f32 / (self.config.width - 1).max(1) as f32,
            cell.y as f32 / (self.config.height - 1).max(1) as f32,
        ]
    }

    fn observe(&self, agent: AgentId) -> Vec<f32> {
        let team = agent.instance;
        let opponent = (team + 1) % INSTANCES_PER_ROLE;
        let cells = [
            self.players[agent.role][team],
            self.ball,
            self.players[agent.role.teammate()][team],
            self.players.goalie[opponent],
            self.players.striker[opponent],
        ];
        cells
            .iter()
            .flat_map(|&c| self.encode(c, team))
            .collect()
    }

    fn observations(&self) -> JointObservation {
        RoleMap::from_fn(|role| {
            (0..INSTANCES_PER_ROLE)
                .map(|i| self.observe(AgentId::new(role, i)))
                .collect()
        })
    }
}

impl Simulation for Pitch {
    fn observation_dim(&self, _role: Role) -> usize {
        OBSERVATION_DIM
    }

    fn action_dim(&self, role: Role) -> usize {
        match role {
            Role::Goalie => GOALIE_ACTIONS,
            Role::Striker => STRIKER_ACTIONS,
        }
    }

    fn reset(&mut self, train_mode: bool) -> Result<JointObservation, SimulationError> {
        if self.closed {
            return Err(SimulationError::Closed);
        }
        let w = self.config.width;
        let h = self.config.height;
        let mid = h / 2;
        self.t = 0;
        self.score = [0; INSTANCES_PER_ROLE];

        let striker_x = (w / 2 - 2).max(0);
        self.players.goalie = [Cell::new(0, mid), Cell::new(w - 1, mid)];
        self.players.striker = [Cell::new(striker_x, mid), Cell::new(w - 1 - striker_x, mid)];
        self.ball = Cell::new(w / 2, mid);

        if train_mode {
            let jx = self.rng.gen_range(-1..=1);
            let jy = self.rng.gen_range(-1..=1);
            self.ball = Cell::new((w / 2 + jx).clamp(0, w - 1), (mid + jy).clamp(0, h - 1));
            for striker in self.players.striker.iter_mut() {
                striker.y = (mid + self.rng.gen_range(-1..=1)).clamp(0, h - 1);
            }
        }

        Ok(self.observations())
    }

    fn step(&mut self, actions: &RoleMap<Vec<i64>>) -> Result<StepOutcome, SimulationError> {
        if self.closed {
            return Err(SimulationError::Closed);
        }
        let action_dims = RoleMap::from_fn(|role| self.action_dim(role));
        check_actions(actions, &action_dims)?;

        let mut scorer = None;
        for agent in AgentId::all() {
            scorer = self.apply(agent, actions[agent.role][agent.instance]);
            if scorer.is_some() {
                break;
            }
        }

        self.t += 1;
        let step_reward = self.config.step_reward;
        let mut rewards = RoleMap::new(
            vec![step_reward; INSTANCES_PER_ROLE],
            vec![-step_reward; INSTANCES_PER_ROLE],
        );
        if let Some(team) = scorer {
            self.score[team] += 1;
            let conceding = (team + 1) % INSTANCES_PER_ROLE;
            for (_, per_role) in rewards.iter_mut() {
                per_role[team] += 1.0;
                per_role[conceding] -= 1.0;
            }
        }

        let done = scorer.is_some() || self.t >= self.config.max_steps;
        Ok(StepOutcome {
            observations: self.observations(),
            rewards,
            done,
        })
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle() -> RoleMap<Vec<i64>> {
        // Goalies step up, strikers stay.
        RoleMap::new(vec![2, 2], vec![0, 0])
    }

    #[test]
    fn reset_returns_observations() {
        let mut pitch = Pitch::new(PitchConfig::default(), 42);
        let obs = pitch.reset(true).unwrap();
        for role in Role::ALL {
            assert_eq!(obs[role].len(), INSTANCES_PER_ROLE);
            for o in &obs[role] {
                assert_eq!(o.len(), pitch.observation_dim(role));
                assert!(o.iter().all(|v| (0.0..=1.0).contains(v)));
            }
        }
    }

    #[test]
    fn observations_are_team_relative() {
        let mut pitch = Pitch::new(PitchConfig::default(), 0);
        let obs = pitch.reset(false).unwrap();
        // Both goalies see themselves on their own goal line.
        assert_eq!(obs.goalie[0][0], 0.0);
        assert_eq!(obs.goalie[1][0], 0.0);
    }

    #[test]
    fn evaluation_reset_is_deterministic() {
        let mut a = Pitch::new(PitchConfig::default(), 1);
        let mut b = Pitch::new(PitchConfig::default(), 2);
        assert_eq!(a.reset(false).unwrap(), b.reset(false).unwrap());
    }

    #[test]
    fn episode_terminates_at_horizon() {
        let config = PitchConfig {
            max_steps: 5,
            ..PitchConfig::default()
        };
        let mut pitch = Pitch::new(config, 7);
        pitch.reset(false).unwrap();
        for t in 1..=5 {
            let out = pitch.step(&idle()).unwrap();
            assert_eq!(out.done, t == 5);
            assert_eq!(out.rewards.goalie, vec![1e-3; 2]);
            assert_eq!(out.rewards.striker, vec![-1e-3; 2]);
        }
    }

    #[test]
    fn repeated_kicks_score_for_team_zero() {
        let mut pitch = Pitch::new(PitchConfig::default(), 3);
        pitch.reset(false).unwrap();
        // Team 0 striker starts two cells behind the ball: walk up, then kick.
        let walk = RoleMap::new(vec![2, 2], vec![1, 0]);
        let kick = RoleMap::new(vec![2, 2], vec![5, 0]);
        pitch.step(&walk).unwrap();

        let mut scored = None;
        for _ in 0..10 {
            let out = pitch.step(&kick).unwrap();
            if out.done {
                scored = Some(out);
                break;
            }
            pitch.step(&walk).unwrap();
            pitch.step(&walk).unwrap();
            pitch.step(&walk).unwrap();
        }
        let out = scored.expect("team 0 should score");
        assert_eq!(pitch.score, [1, 0]);
        assert!(out.rewards.striker[0] > 0.9);
        assert!(out.rewards.goalie[1] < -0.9);
    }

    #[test]
    fn invalid_action_is_rejected() {
        let mut pitch = Pitch::new(PitchConfig::default(), 0);
        pitch.reset(true).unwrap();
        let bad = RoleMap::new(vec![4, 0], vec![0, 0]);
        assert!(matches!(
            pitch.step(&bad),
            Err(SimulationError::InvalidAction { role: Role::Goalie, .. })
        ));
    }
}
