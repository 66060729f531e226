//! Grid cell annotations, gated by map role.

use crate::access;
use crate::error::{MapsterError, Missing, Operation, Result};
use crate::model::{GridCell, MapId, UserId};
use crate::role::RoleSet;
use crate::store::Storage;

/// Reads and writes per-cell annotations on a map's grid.
///
/// Any member may read. Only the OWNER or a DM may write.
pub struct CellService<S> {
    storage: S,
}

impl<S: Storage> CellService<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn get_cell(&self, map_id: MapId, user_id: UserId, row: i32, col: i32) -> Result<GridCell> {
        self.storage.atomically(|uow| {
            access::require_member(&*uow, map_id, user_id)?;
            uow.cell(map_id, row, col)?
                .ok_or(MapsterError::NotFound(Missing::Cell { map_id, row, col }))
        })
    }

    /// Insert or overwrite the annotation at (row, col).
    pub fn save_cell(
        &self,
        map_id: MapId,
        user_id: UserId,
        row: i32,
        col: i32,
        name: Option<&str>,
    ) -> Result<GridCell> {
        let cell = self.storage.atomically(|uow| {
            access::require_role(&*uow, map_id, user_id, RoleSet::ADMINS, Operation::EditCell)?;
            Ok(uow.upsert_cell(map_id, row, col, name)?)
        })?;
        tracing::debug!(map_id = %map_id, row, col, "Saved cell");
        Ok(cell)
    }
}
