//! SQLite schema for map storage

/// Schema version for migrations
pub const SCHEMA_VERSION: u32 = 1;

/// SQLite schema definition
pub struct Schema;

impl Schema {
    /// Get the complete schema SQL
    pub fn create_tables() -> &'static str {
        r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Shared maps
CREATE TABLE IF NOT EXISTS maps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    image_url TEXT,
    layout TEXT NOT NULL DEFAULT '{}',
    owner_user_id INTEGER NOT NULL,
    join_code TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Memberships, one per (map, user)
CREATE TABLE IF NOT EXISTS map_memberships (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    map_id INTEGER NOT NULL REFERENCES maps(id),
    user_id INTEGER NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('OWNER', 'DM', 'PLAYER')),
    UNIQUE (map_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_memberships_user ON map_memberships(user_id);

-- At most one OWNER row per map
CREATE UNIQUE INDEX IF NOT EXISTS idx_memberships_owner
    ON map_memberships(map_id) WHERE role = 'OWNER';

-- Grid cell annotations
CREATE TABLE IF NOT EXISTS grid_cells (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    map_id INTEGER NOT NULL REFERENCES maps(id) ON DELETE CASCADE,
    row_index INTEGER NOT NULL,
    col_index INTEGER NOT NULL,
    name TEXT,
    UNIQUE (map_id, row_index, col_index)
);
"#
    }
}
