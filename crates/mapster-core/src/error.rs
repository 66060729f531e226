//! Error types for mapster-core

use thiserror::Error;

use crate::model::{MapId, UserId};
use crate::role::MapRole;

/// Result type alias for map operations
pub type Result<T> = std::result::Result<T, MapsterError>;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Main error type for map operations
#[derive(Error, Debug)]
pub enum MapsterError {
    /// The map, membership, cell or join code does not exist, or the
    /// requester is not a member of the addressed map
    #[error("Not found: {0}")]
    NotFound(Missing),

    /// The requester is a member but their role does not permit the operation
    #[error("Forbidden: {role} may not {operation}")]
    Forbidden { operation: Operation, role: MapRole },

    /// A role or membership-count precondition failed; nothing was written
    #[error("Invariant violation: {0}")]
    InvariantViolation(#[from] TransitionError),

    /// Persistence failure; the unit of work was rolled back
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl MapsterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, MapsterError::NotFound(_))
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, MapsterError::Forbidden { .. })
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, MapsterError::InvariantViolation(_))
    }
}

/// What could not be found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Map(MapId),
    JoinCode,
    Membership { map_id: MapId, user_id: UserId },
    Cell { map_id: MapId, row: i32, col: i32 },
}

impl std::fmt::Display for Missing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Missing::Map(id) => write!(f, "map {}", id),
            // Never echo the code back
            Missing::JoinCode => write!(f, "join code"),
            Missing::Membership { map_id, user_id } => {
                write!(f, "membership of user {} on map {}", user_id, map_id)
            }
            Missing::Cell { map_id, row, col } => {
                write!(f, "cell ({}, {}) on map {}", row, col, map_id)
            }
        }
    }
}

/// Role-gated operations, named in Forbidden errors and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    UpdateMap,
    DeleteMap,
    PromoteMember,
    DemoteMember,
    TransferOwnership,
    RemoveMember,
    EditCell,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operation::UpdateMap => "update the map",
            Operation::DeleteMap => "delete the map",
            Operation::PromoteMember => "promote members",
            Operation::DemoteMember => "demote members",
            Operation::TransferOwnership => "transfer ownership",
            Operation::RemoveMember => "remove other members",
            Operation::EditCell => "edit grid cells",
        };
        f.write_str(s)
    }
}

/// Preconditions of a role transition that did not hold
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// Join attempted by an existing member
    #[error("user {user_id} is already a member of map {map_id}")]
    AlreadyMember { map_id: MapId, user_id: UserId },

    /// Target role did not match the role the transition starts from
    #[error("user {user_id} is {actual}, expected {expected}")]
    UnexpectedRole {
        user_id: UserId,
        expected: MapRole,
        actual: MapRole,
    },

    /// The owner can only leave by transferring ownership first
    #[error("the owner cannot be removed from map {0}")]
    OwnerRemoval(MapId),

    /// Deletion would orphan other members
    #[error("map {map_id} still has {count} members")]
    MembersRemain { map_id: MapId, count: u64 },
}

/// Errors from the map and membership stores
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database or connection failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Uniqueness constraint violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Stored data could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, ref msg)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            rusqlite::Error::FromSqlConversionFailure(..) => StoreError::Corrupt(err.to_string()),
            _ => StoreError::Storage(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for MapsterError {
    fn from(err: rusqlite::Error) -> Self {
        MapsterError::Storage(StoreError::from(err))
    }
}
