//! Core types shared by every part of the trainer.
//!
//! Defines the two playing roles, per-role containers, and agent identifiers
//! used by the buffers, networks, and the training loop.

use std::fmt;
use std::ops::{Index, IndexMut};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of agent instances playing each role (one per team).
pub const INSTANCES_PER_ROLE: usize = 2;

/// Playing role. Both instances of a role share one policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Role {
    Goalie,
    Striker,
}

impl Role {
    /// All roles in their fixed iteration order.
    pub const ALL: [Role; 2] = [Role::Goalie, Role::Striker];

    /// Returns the index of this role (0=Goalie, 1=Striker).
    pub fn index(&self) -> usize {
        match self {
            Role::Goalie => 0,
            Role::Striker => 1,
        }
    }

    /// The other role on the same team.
    pub fn teammate(&self) -> Role {
        match self {
            Role::Goalie => Role::Striker,
            Role::Striker => Role::Goalie,
        }
    }

    /// File stem used for this role's checkpoint artifacts.
    pub fn file_stem(&self) -> &'static str {
        match self {
            Role::Goalie => "goalie",
            Role::Striker => "striker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

/// One value per role.
///
/// Iteration always yields the goalie entry first, then the striker entry.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RoleMap<T> {
    pub goalie: T,
    pub striker: T,
}

impl<T> RoleMap<T> {
    /// Creates a map from explicit per-role values.
    pub fn new(goalie: T, striker: T) -> Self {
        Self { goalie, striker }
    }

    /// Builds a map by calling `f` once per role, goalie first.
    pub fn from_fn(mut f: impl FnMut(Role) -> T) -> Self {
        let goalie = f(Role::Goalie);
        let striker = f(Role::Striker);
        Self { goalie, striker }
    }

    /// Like [`RoleMap::from_fn`], stopping at the first error.
    pub fn try_from_fn<E>(mut f: impl FnMut(Role) -> Result<T, E>) -> Result<Self, E> {
        let goalie = f(Role::Goalie)?;
        let striker = f(Role::Striker)?;
        Ok(Self { goalie, striker })
    }

    pub fn map<U>(self, mut f: impl FnMut(Role, T) -> U) -> RoleMap<U> {
        RoleMap {
            goalie: f(Role::Goalie, self.goalie),
            striker: f(Role::Striker, self.striker),
        }
    }

    /// Iterates `(role, value)` pairs in fixed order.
    pub fn iter(&self) -> impl Iterator<Item = (Role, &T)> {
        [(Role::Goalie, &self.goalie), (Role::Striker, &self.striker)].into_iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Role, &mut T)> {
        [
            (Role::Goalie, &mut self.goalie),
            (Role::Striker, &mut self.striker),
        ]
        .into_iter()
    }
}

impl<T> Index<Role> for RoleMap<T> {
    type Output = T;

    fn index(&self, role: Role) -> &T {
        match role {
            Role::Goalie => &self.goalie,
            Role::Striker => &self.striker,
        }
    }
}

impl<T> IndexMut<Role> for RoleMap<T> {
    fn index_mut(&mut self, role: Role) -> &mut T {
        match role {
            Role::Goalie => &mut self.goalie,
            Role::Striker => &mut self.striker,
        }
    }
}

/// Identifies one acting agent: a role plus its instance (team) index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgentId {
    pub role: Role,
    pub instance: usize,
}

impl AgentId {
    pub fn new(role: Role, instance: usize) -> Self {
        Self { role, instance }
    }

    /// All four agents in fixed order: goalie-0, goalie-1, striker-0, striker-1.
    pub fn all() -> impl Iterator<Item = AgentId> {
        Role::ALL
            .into_iter()
            .flat_map(|role| (0..INSTANCES_PER_ROLE).map(move |i| AgentId::new(role, i)))
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.role, self.instance)
    }
}

/// Observations for every agent, indexed by role then instance.
pub type JointObservation = RoleMap<Vec<Vec<f32>>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_display_and_stem() {
        assert_eq!(Role::Goalie.to_string(), "goalie");
        assert_eq!(Role::Striker.file_stem(), "striker");
        assert_eq!(Role::Goalie.teammate(), Role::Striker);
    }

    #[test]
    fn role_map_indexing() {
        let mut m = RoleMap::new(1, 2);
        assert_eq!(m[Role::Goalie], 1);
        m[Role::Striker] = 5;
        assert_eq!(m.striker, 5);
    }

    #[test]
    fn role_map_iterates_goalie_first() {
        let m = RoleMap::from_fn(|r| r.index());
        let roles: Vec<_> = m.iter().map(|(r, _)| r).collect();
        assert_eq!(roles, vec![Role::Goalie, Role::Striker]);
    }

    #[test]
    fn agent_ids_in_fixed_order() {
        let ids: Vec<String> = AgentId::all().map(|a| a.to_string()).collect();
        assert_eq!(ids, vec!["goalie-0", "goalie-1", "striker-0", "striker-1"]);
    }
}
