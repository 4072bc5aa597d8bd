//! Joint-state assembly for the centralized critics.
//!
//! Each critic sees all four agents. The concatenation order is fixed by the
//! viewing agent's role and team:
//!
//! ```text
//! [own] ++ [teammate] ++ [opponent, same role] ++ [opponent, other role]
//! ```
//!
//! so the goalie critic reads `goalie_i, striker_i, goalie_j, striker_j` and
//! the striker critic reads `striker_i, goalie_i, striker_j, goalie_j`.

use crate::types::{AgentId, JointObservation, Role, RoleMap, INSTANCES_PER_ROLE};

/// Builds critic observations from per-agent observations.
pub struct ObservationBuilder;

impl ObservationBuilder {
    /// Critic observation for one agent.
    ///
    /// # Arguments
    ///
    /// * `agent` - The agent whose critic input is requested
    /// * `joint` - Observations of every agent at the same simulation step
    pub fn critic_observation(agent: AgentId, joint: &JointObservation) -> Vec<f32> {
        let own_role = agent.role;
        let mate_role = own_role.teammate();
        let opponent = (agent.instance + 1) % INSTANCES_PER_ROLE;

        let parts = [
            &joint[own_role][agent.instance],
            &joint[mate_role][agent.instance],
            &joint[own_role][opponent],
            &joint[mate_role][opponent],
        ];

        let mut state = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
        for part in parts {
            state.extend_from_slice(part);
        }
        state
    }

    /// Critic observations for every instance of every role.
    pub fn build_all(joint: &JointObservation) -> RoleMap<Vec<Vec<f32>>> {
        RoleMap::from_fn(|role| {
            (0..INSTANCES_PER_ROLE)
                .map(|instance| Self::critic_observation(AgentId::new(role, instance), joint))
                .collect()
        })
    }

    /// Width of a critic observation given per-role actor observation widths.
    pub fn critic_dim(observation_dims: &RoleMap<usize>) -> usize {
        INSTANCES_PER_ROLE * Role::ALL.iter().map(|&r| observation_dims[r]).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joint() -> JointObservation {
        RoleMap::new(
            vec![vec![1.0, 1.0], vec![2.0, 2.0]],
            vec![vec![3.0], vec![4.0]],
        )
    }

    #[test]
    fn goalie_order() {
        let state = ObservationBuilder::critic_observation(AgentId::new(Role::Goalie, 0), &joint());
        assert_eq!(state, vec![1.0, 1.0, 3.0, 2.0, 2.0, 4.0]);
    }

    #[test]
    fn striker_order_from_second_team() {
        let state =
            ObservationBuilder::critic_observation(AgentId::new(Role::Striker, 1), &joint());
        assert_eq!(state, vec![4.0, 2.0, 2.0, 3.0, 1.0, 1.0]);
    }

    #[test]
    fn all_critic_observations_share_width() {
        let dims = RoleMap::new(2, 1);
        let all = ObservationBuilder::build_all(&joint());
        for (_, per_role) in all.iter() {
            for state in per_role {
                assert_eq!(state.len(), ObservationBuilder::critic_dim(&dims));
            }
        }
    }
}
