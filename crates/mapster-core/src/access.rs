//! Role-based access decisions.
//!
//! Every gated operation goes through [`has_role`] or one of the `require_*`
//! helpers built on the same membership lookup. A missing membership is never
//! an error here, only "no access"; the helpers turn it into `NotFound` so a
//! non-member cannot tell an existing map from a missing one.

use crate::error::{MapsterError, Missing, Operation, Result, StoreResult};
use crate::model::{MapId, MapMembership, UserId};
use crate::role::{MapRole, RoleSet};
use crate::store::MembershipStore;

/// The role `user_id` holds on `map_id`, if any.
pub fn role_of<S>(store: &S, map_id: MapId, user_id: UserId) -> StoreResult<Option<MapRole>>
where
    S: MembershipStore + ?Sized,
{
    Ok(store.membership(map_id, user_id)?.map(|m| m.role))
}

/// True iff `user_id` has a membership on `map_id` whose role is in `allowed`.
pub fn has_role<S>(store: &S, map_id: MapId, user_id: UserId, allowed: RoleSet) -> StoreResult<bool>
where
    S: MembershipStore + ?Sized,
{
    Ok(role_of(store, map_id, user_id)?.is_some_and(|role| allowed.allows(role)))
}

/// The requester's membership, or `NotFound` for the map.
pub fn require_member<S>(store: &S, map_id: MapId, user_id: UserId) -> Result<MapMembership>
where
    S: MembershipStore + ?Sized,
{
    store
        .membership(map_id, user_id)?
        .ok_or(MapsterError::NotFound(Missing::Map(map_id)))
}

/// The requester's membership if its role is in `allowed`.
///
/// Non-members get `NotFound`; members with the wrong role get `Forbidden`.
pub fn require_role<S>(
    store: &S,
    map_id: MapId,
    user_id: UserId,
    allowed: RoleSet,
    operation: Operation,
) -> Result<MapMembership>
where
    S: MembershipStore + ?Sized,
{
    let membership = require_member(store, map_id, user_id)?;
    if allowed.allows(membership.role) {
        Ok(membership)
    } else {
        tracing::debug!(
            map_id = %map_id,
            user_id = %user_id,
            role = %membership.role,
            ?operation,
            "Denied by role"
        );
        Err(MapsterError::Forbidden {
            operation,
            role: membership.role,
        })
    }
}
