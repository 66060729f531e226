//! Map roles and role sets.
//!
//! Every membership holds exactly one [`MapRole`]. Authorization checks take a
//! [`RoleSet`] naming the roles allowed to perform an operation.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role a user holds on a single map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MapRole {
    /// Sole holder of the map; may transfer ownership and delete the map
    Owner,
    /// Dungeon master; may edit the map and administer players
    Dm,
    /// Regular participant
    Player,
}

impl MapRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapRole::Owner => "OWNER",
            MapRole::Dm => "DM",
            MapRole::Player => "PLAYER",
        }
    }

    /// The singleton set containing this role.
    pub fn as_set(&self) -> RoleSet {
        match self {
            MapRole::Owner => RoleSet::OWNER,
            MapRole::Dm => RoleSet::DM,
            MapRole::Player => RoleSet::PLAYER,
        }
    }
}

impl fmt::Display for MapRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored or submitted role string is not recognised.
#[derive(Debug, Clone, Error)]
#[error("unknown map role: {0}")]
pub struct RoleParseError(pub String);

impl FromStr for MapRole {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OWNER" => Ok(MapRole::Owner),
            "DM" => Ok(MapRole::Dm),
            "PLAYER" => Ok(MapRole::Player),
            other => Err(RoleParseError(other.to_string())),
        }
    }
}

bitflags! {
    /// A set of map roles, used as the `allowed` argument of role checks.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct RoleSet: u8 {
        const OWNER = 0b001;
        const DM = 0b010;
        const PLAYER = 0b100;
    }
}

impl RoleSet {
    /// Any membership at all.
    pub const ANY: RoleSet = RoleSet::OWNER.union(RoleSet::DM).union(RoleSet::PLAYER);

    /// Roles that may administer membership and edit the map.
    pub const ADMINS: RoleSet = RoleSet::OWNER.union(RoleSet::DM);

    #[inline]
    pub fn allows(&self, role: MapRole) -> bool {
        self.contains(role.as_set())
    }
}

impl From<MapRole> for RoleSet {
    fn from(role: MapRole) -> Self {
        role.as_set()
    }
}
