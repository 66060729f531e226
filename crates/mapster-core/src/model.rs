//! Maps, memberships and grid cells.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::role::MapRole;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

row_id!(
    /// Identifier of a shared map
    MapId
);
row_id!(
    /// Authenticated user identifier supplied by the identity provider
    UserId
);
row_id!(
    /// Identifier of a membership row
    MembershipId
);
row_id!(
    /// Identifier of a grid cell annotation
    CellId
);

/// Presentation attributes of a map. Opaque to access control.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridLayout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_offset_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_offset_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_rotation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex_orientation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_offset_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_offset_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_scale: Option<f64>,
}

/// The client-editable part of a map.
///
/// Server-owned fields (id, owner, join code, timestamps) are never read from
/// a draft.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapDraft {
    pub name: String,
    /// Opaque reference into the external asset store
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(flatten)]
    pub layout: GridLayout,
}

impl MapDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    pub fn with_layout(mut self, layout: GridLayout) -> Self {
        self.layout = layout;
        self
    }
}

/// A shared map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DungeonMap {
    pub id: MapId,
    pub name: String,
    pub image_url: Option<String>,
    #[serde(flatten)]
    pub layout: GridLayout,
    /// Always the user holding this map's OWNER membership
    pub owner_user_id: UserId,
    /// Immutable after creation
    pub join_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Binds a user to a map with a role. Unique per (map, user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapMembership {
    pub id: MembershipId,
    pub map_id: MapId,
    pub user_id: UserId,
    pub role: MapRole,
}

/// Annotation on one cell of a map grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridCell {
    pub id: CellId,
    pub map_id: MapId,
    pub row_index: i32,
    pub col_index: i32,
    pub name: Option<String>,
}
