//! Mapster Core - Shared map ownership, membership and access control
//!
//! This crate decides who may do what to a shared dungeon map:
//!
//! - **Model**: Maps, memberships, grid cells and their typed identifiers
//! - **Role**: The OWNER / DM / PLAYER roles and bitflag role sets
//! - **Access**: The `has_role` predicate every gated operation goes through
//! - **Lifecycle**: Create, join, promote, demote, transfer, remove and delete
//! - **Cells**: Grid cell annotations, readable by members and writable by admins
//! - **Join codes**: CSPRNG-drawn 16 character invitation codes
//! - **Store**: Storage traits and atomic units of work
//! - **Persistence**: SQLite-backed storage (feature `sqlite`)
//! - **Config**: Join code and storage settings
//!
//! # Invariants
//!
//! Every map has exactly one OWNER membership and its `owner_user_id` names
//! that member. A user holds at most one membership per map. Each operation
//! either commits all of its writes or none of them.
//!
//! ```text
//! create ──► OWNER
//! join   ──► PLAYER ⇄ DM ──transfer──► OWNER (previous OWNER ► DM)
//! ```

pub mod access;
pub mod cells;
pub mod config;
pub mod error;
pub mod join_code;
pub mod lifecycle;
pub mod model;
#[cfg(feature = "sqlite")]
pub mod persistence;
pub mod role;
pub mod store;

pub use cells::CellService;
pub use config::{ConfigError, JoinCodeConfig, MapsterConfig, StorageConfig};
pub use error::{
    MapsterError, Missing, Operation, Result, StoreError, StoreResult, TransitionError,
};
pub use join_code::{JoinCodeGenerator, JOIN_CODE_ALPHABET};
pub use lifecycle::MapService;
pub use model::{
    CellId, DungeonMap, GridCell, GridLayout, MapDraft, MapId, MapMembership, MembershipId,
    UserId,
};
#[cfg(feature = "sqlite")]
pub use persistence::{Schema, SqliteStorage, SCHEMA_VERSION};
pub use role::{MapRole, RoleParseError, RoleSet};
pub use store::{CellStore, MapStore, MembershipStore, Storage, UnitOfWork};
