use chrono::{DateTime, Utc};

use crate::error::{Result, StoreResult};
use crate::model::{DungeonMap, GridCell, MapDraft, MapId, MapMembership, MembershipId, UserId};
use crate::role::MapRole;

/// Durable map records. Join codes are unique across all maps.
pub trait MapStore {
    /// Insert a new map. Returns the stored record.
    fn insert_map(
        &mut self,
        draft: &MapDraft,
        owner: UserId,
        join_code: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<DungeonMap>;

    fn map_by_id(&self, id: MapId) -> StoreResult<Option<DungeonMap>>;

    /// Exact-match lookup.
    fn map_by_join_code(&self, code: &str) -> StoreResult<Option<DungeonMap>>;

    /// Replace the client-editable fields of a map.
    fn update_map_details(
        &mut self,
        id: MapId,
        draft: &MapDraft,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Point the denormalized owner field at a new user.
    fn set_map_owner(&mut self, id: MapId, owner: UserId, now: DateTime<Utc>) -> StoreResult<()>;

    fn delete_map(&mut self, id: MapId) -> StoreResult<()>;
}

/// Durable (map, user, role) records. At most one per (map, user).
pub trait MembershipStore {
    fn membership(&self, map_id: MapId, user_id: UserId) -> StoreResult<Option<MapMembership>>;

    /// Members of a map, ordered by membership id.
    fn memberships_for_map(&self, map_id: MapId) -> StoreResult<Vec<MapMembership>>;

    /// Memberships held by a user, ordered by map id.
    fn memberships_for_user(&self, user_id: UserId) -> StoreResult<Vec<MapMembership>>;

    fn count_members(&self, map_id: MapId) -> StoreResult<u64>;

    fn insert_membership(
        &mut self,
        map_id: MapId,
        user_id: UserId,
        role: MapRole,
    ) -> StoreResult<MapMembership>;

    fn set_role(&mut self, id: MembershipId, role: MapRole) -> StoreResult<()>;

    fn delete_membership(&mut self, id: MembershipId) -> StoreResult<()>;
}

/// Grid cell annotations keyed by (map, row, column).
pub trait CellStore {
    fn cell(&self, map_id: MapId, row: i32, col: i32) -> StoreResult<Option<GridCell>>;

    /// Insert or overwrite the annotation for a cell.
    fn upsert_cell(
        &mut self,
        map_id: MapId,
        row: i32,
        col: i32,
        name: Option<&str>,
    ) -> StoreResult<GridCell>;

    fn delete_cells_for_map(&mut self, map_id: MapId) -> StoreResult<()>;
}

/// Everything a single atomic unit of work can read and write.
pub trait UnitOfWork: MapStore + MembershipStore + CellStore {}

impl<T: MapStore + MembershipStore + CellStore> UnitOfWork for T {}

/// A storage backend that runs units of work atomically.
///
/// `atomically` evaluates `work` against one consistent snapshot. Its writes
/// commit only when it returns `Ok`; any `Err` rolls every write back.
/// Concurrent units of work touching the same map are serialized.
pub trait Storage: Send + Sync {
    fn atomically<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T>;
}

impl<S: Storage> Storage for std::sync::Arc<S> {
    fn atomically<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T>,
    {
        (**self).atomically(work)
    }
}
