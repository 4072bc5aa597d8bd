//! Evaluation scores.
//!
//! Per-episode cumulative rewards of every agent, aggregated per role and per
//! team over an evaluation pass.

use std::fmt;

use crate::types::{AgentId, Role, RoleMap, INSTANCES_PER_ROLE};

/// Cumulative rewards of every agent over one episode.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EpisodeScores {
    /// Cumulative reward per role, indexed by instance.
    pub scores: RoleMap<[f64; INSTANCES_PER_ROLE]>,
    /// Simulation steps the episode lasted.
    pub steps: usize,
}

impl EpisodeScores {
    /// Adds one step's rewards.
    pub fn add(&mut self, rewards: &RoleMap<Vec<f32>>) {
        for (role, per_role) in rewards.iter() {
            for (slot, &r) in self.scores[role].iter_mut().zip(per_role) {
                *slot += r as f64;
            }
        }
        self.steps += 1;
    }

    pub fn agent(&self, id: AgentId) -> f64 {
        self.scores[id.role][id.instance]
    }

    /// Sum over both roles of team `team`.
    pub fn team(&self, team: usize) -> f64 {
        Role::ALL.iter().map(|&r| self.scores[r][team]).sum()
    }

    /// Index of the team with the higher score, `None` on a draw.
    pub fn winner(&self) -> Option<usize> {
        let (a, b) = (self.team(0), self.team(1));
        if a > b {
            Some(0)
        } else if b > a {
            Some(1)
        } else {
            None
        }
    }
}

/// Scores of every episode of an evaluation pass.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EvaluationReport {
    pub episodes: Vec<EpisodeScores>,
}

impl EvaluationReport {
    pub fn push(&mut self, episode: EpisodeScores) {
        self.episodes.push(episode);
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    /// Mean per-agent score of `role`, over episodes and instances.
    pub fn mean_score(&self, role: Role) -> f64 {
        if self.episodes.is_empty() {
            return 0.0;
        }
        let total: f64 = self.episodes.iter().flat_map(|e| e.scores[role]).sum();
        total / (self.episodes.len() * INSTANCES_PER_ROLE) as f64
    }

    pub fn mean_agent_score(&self, id: AgentId) -> f64 {
        if self.episodes.is_empty() {
            return 0.0;
        }
        self.episodes.iter().map(|e| e.agent(id)).sum::<f64>() / self.episodes.len() as f64
    }

    /// Episodes won by each team.
    pub fn team_wins(&self) -> [usize; INSTANCES_PER_ROLE] {
        let mut wins = [0; INSTANCES_PER_ROLE];
        for team in self.episodes.iter().filter_map(EpisodeScores::winner) {
            wins[team] += 1;
        }
        wins
    }

    pub fn draws(&self) -> usize {
        self.episodes.iter().filter(|e| e.winner().is_none()).count()
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Evaluation ({} episodes) ===", self.episodes.len())?;
        for (i, e) in self.episodes.iter().enumerate() {
            write!(f, "  episode {:>3} ({:>4} steps):", i, e.steps)?;
            for id in AgentId::all() {
                write!(f, "  {}={:+.3}", id, e.agent(id))?;
            }
            writeln!(f)?;
        }
        for role in Role::ALL {
            writeln!(f, "  Mean {:<8} score: {:+.3}", role.to_string(), self.mean_score(role))?;
        }
        let wins = self.team_wins();
        write!(
            f,
            "  Team wins:           {} / {} ({} draws)",
            wins[0],
            wins[1],
            self.draws()
        )
    }
}
