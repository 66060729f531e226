//! SQLite-backed map, membership and cell storage

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use super::schema::{Schema, SCHEMA_VERSION};
use crate::config::StorageConfig;
use crate::error::{Result, StoreError, StoreResult};
use crate::model::{
    CellId, DungeonMap, GridCell, GridLayout, MapDraft, MapId, MapMembership, MembershipId, UserId,
};
use crate::role::MapRole;
use crate::store::{CellStore, MapStore, MembershipStore, Storage, UnitOfWork};

const MAP_COLUMNS: &str =
    "id, name, image_url, layout, owner_user_id, join_code, created_at, updated_at";
const MEMBERSHIP_COLUMNS: &str = "id, map_id, user_id, role";
const CELL_COLUMNS: &str = "id, map_id, row_index, col_index, name";

/// SQLite implementation of [`Storage`].
///
/// Every unit of work runs inside an `IMMEDIATE` transaction, so the write
/// lock is held from the first read to commit.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) a database at the given path.
    pub fn open(path: impl AsRef<Path>, config: &StorageConfig) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::init_with_connection(conn, config)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory(config: &StorageConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_with_connection(conn, config)
    }

    fn init_with_connection(conn: Connection, config: &StorageConfig) -> Result<Self> {
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Initialize the database schema
    fn initialize(conn: &Connection) -> Result<()> {
        conn.execute_batch(Schema::create_tables())?;

        let current: Option<u32> =
            conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })?;

        match current {
            None => {
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    [SCHEMA_VERSION],
                )?;
                tracing::debug!(version = SCHEMA_VERSION, "Initialized map schema");
            }
            Some(version) if version > SCHEMA_VERSION => {
                return Err(StoreError::Storage(format!(
                    "database schema version {} is newer than supported version {}",
                    version, SCHEMA_VERSION
                ))
                .into());
            }
            Some(_) => {}
        }

        Ok(())
    }
}

impl Storage for SqliteStorage {
    fn atomically<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T>,
    {
        // A panic inside `work` drops the transaction, which rolls back, so
        // the connection behind a poisoned lock is still consistent.
        let mut conn = self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let value = work(&mut SqliteUnitOfWork { conn: &*tx })?;

        tx.commit()?;
        Ok(value)
    }
}

/// Reads and writes of a single open transaction.
struct SqliteUnitOfWork<'c> {
    conn: &'c Connection,
}

fn conversion_error(
    column: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn timestamp(row: &Row<'_>, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e))
}

fn row_to_map(row: &Row<'_>) -> rusqlite::Result<DungeonMap> {
    let layout_json: String = row.get(3)?;
    let layout: GridLayout =
        serde_json::from_str(&layout_json).map_err(|e| conversion_error(3, e))?;

    Ok(DungeonMap {
        id: MapId(row.get(0)?),
        name: row.get(1)?,
        image_url: row.get(2)?,
        layout,
        owner_user_id: UserId(row.get(4)?),
        join_code: row.get(5)?,
        created_at: timestamp(row, 6)?,
        updated_at: timestamp(row, 7)?,
    })
}

fn row_to_membership(row: &Row<'_>) -> rusqlite::Result<MapMembership> {
    let role: String = row.get(3)?;
    Ok(MapMembership {
        id: MembershipId(row.get(0)?),
        map_id: MapId(row.get(1)?),
        user_id: UserId(row.get(2)?),
        role: role.parse().map_err(|e| conversion_error(3, e))?,
    })
}

fn row_to_cell(row: &Row<'_>) -> rusqlite::Result<GridCell> {
    Ok(GridCell {
        id: CellId(row.get(0)?),
        map_id: MapId(row.get(1)?),
        row_index: row.get(2)?,
        col_index: row.get(3)?,
        name: row.get(4)?,
    })
}

impl MapStore for SqliteUnitOfWork<'_> {
    fn insert_map(
        &mut self,
        draft: &MapDraft,
        owner: UserId,
        join_code: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<DungeonMap> {
        let layout_json = serde_json::to_string(&draft.layout)?;
        let stamp = now.to_rfc3339();

        self.conn.execute(
            "INSERT INTO maps
                 (name, image_url, layout, owner_user_id, join_code, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![draft.name, draft.image_url, layout_json, owner.0, join_code, stamp],
        )?;

        Ok(DungeonMap {
            id: MapId(self.conn.last_insert_rowid()),
            name: draft.name.clone(),
            image_url: draft.image_url.clone(),
            layout: draft.layout.clone(),
            owner_user_id: owner,
            join_code: join_code.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    fn map_by_id(&self, id: MapId) -> StoreResult<Option<DungeonMap>> {
        let sql = format!("SELECT {} FROM maps WHERE id = ?1", MAP_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, [id.0], row_to_map)
            .optional()?)
    }

    fn map_by_join_code(&self, code: &str) -> StoreResult<Option<DungeonMap>> {
        let sql = format!("SELECT {} FROM maps WHERE join_code = ?1", MAP_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, [code], row_to_map)
            .optional()?)
    }

    fn update_map_details(
        &mut self,
        id: MapId,
        draft: &MapDraft,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let layout_json = serde_json::to_string(&draft.layout)?;
        self.conn.execute(
            "UPDATE maps SET name = ?1, image_url = ?2, layout = ?3, updated_at = ?4 WHERE id = ?5",
            params![draft.name, draft.image_url, layout_json, now.to_rfc3339(), id.0],
        )?;
        Ok(())
    }

    fn set_map_owner(&mut self, id: MapId, owner: UserId, now: DateTime<Utc>) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE maps SET owner_user_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![owner.0, now.to_rfc3339(), id.0],
        )?;
        Ok(())
    }

    fn delete_map(&mut self, id: MapId) -> StoreResult<()> {
        self.conn.execute("DELETE FROM maps WHERE id = ?1", [id.0])?;
        Ok(())
    }
}

impl MembershipStore for SqliteUnitOfWork<'_> {
    fn membership(&self, map_id: MapId, user_id: UserId) -> StoreResult<Option<MapMembership>> {
        let sql = format!(
            "SELECT {} FROM map_memberships WHERE map_id = ?1 AND user_id = ?2",
            MEMBERSHIP_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, [map_id.0, user_id.0], row_to_membership)
            .optional()?)
    }

    fn memberships_for_map(&self, map_id: MapId) -> StoreResult<Vec<MapMembership>> {
        let sql = format!(
            "SELECT {} FROM map_memberships WHERE map_id = ?1 ORDER BY id",
            MEMBERSHIP_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let members = stmt
            .query_map([map_id.0], row_to_membership)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(members)
    }

    fn memberships_for_user(&self, user_id: UserId) -> StoreResult<Vec<MapMembership>> {
        let sql = format!(
            "SELECT {} FROM map_memberships WHERE user_id = ?1 ORDER BY map_id",
            MEMBERSHIP_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let members = stmt
            .query_map([user_id.0], row_to_membership)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(members)
    }

    fn count_members(&self, map_id: MapId) -> StoreResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM map_memberships WHERE map_id = ?1",
            [map_id.0],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn insert_membership(
        &mut self,
        map_id: MapId,
        user_id: UserId,
        role: MapRole,
    ) -> StoreResult<MapMembership> {
        self.conn.execute(
            "INSERT INTO map_memberships (map_id, user_id, role) VALUES (?1, ?2, ?3)",
            params![map_id.0, user_id.0, role.as_str()],
        )?;
        Ok(MapMembership {
            id: MembershipId(self.conn.last_insert_rowid()),
            map_id,
            user_id,
            role,
        })
    }

    fn set_role(&mut self, id: MembershipId, role: MapRole) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE map_memberships SET role = ?1 WHERE id = ?2",
            params![role.as_str(), id.0],
        )?;
        Ok(())
    }

    fn delete_membership(&mut self, id: MembershipId) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM map_memberships WHERE id = ?1", [id.0])?;
        Ok(())
    }
}

impl CellStore for SqliteUnitOfWork<'_> {
    fn cell(&self, map_id: MapId, row: i32, col: i32) -> StoreResult<Option<GridCell>> {
        let sql = format!(
            "SELECT {} FROM grid_cells WHERE map_id = ?1 AND row_index = ?2 AND col_index = ?3",
            CELL_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![map_id.0, row, col], row_to_cell)
            .optional()?)
    }

    fn upsert_cell(
        &mut self,
        map_id: MapId,
        row: i32,
        col: i32,
        name: Option<&str>,
    ) -> StoreResult<GridCell> {
        self.conn.execute(
            "INSERT INTO grid_cells (map_id, row_index, col_index, name) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (map_id, row_index, col_index) DO UPDATE SET name = excluded.name",
            params![map_id.0, row, col, name],
        )?;
        self.cell(map_id, row, col)?.ok_or_else(|| {
            StoreError::Storage(format!(
                "cell ({}, {}) on map {} vanished after upsert",
                row, col, map_id
            ))
        })
    }

    fn delete_cells_for_map(&mut self, map_id: MapId) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM grid_cells WHERE map_id = ?1", [map_id.0])?;
        Ok(())
    }
}
