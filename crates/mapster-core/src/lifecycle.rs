//! Map and membership lifecycle.
//!
//! [`MapService`] runs every operation as one unit of work against a
//! [`Storage`]: the role checks and all resulting writes see the same snapshot
//! and commit together or not at all.
//!
//! Role state machine for a single membership:
//!
//! ```text
//! PLAYER ⇄ DM        promote / demote, requester OWNER or DM
//! DM → OWNER         transfer only; the previous OWNER becomes DM in the same unit
//! OWNER → (gone)     delete_map only, and only as the last member
//! ```

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{CryptoRng, RngCore};

use crate::access;
use crate::config::{ConfigError, MapsterConfig};
use crate::error::{MapsterError, Missing, Operation, Result, StoreError, TransitionError};
use crate::join_code::{self, JoinCodeGenerator};
use crate::model::{DungeonMap, MapDraft, MapId, MapMembership, UserId};
use crate::role::{MapRole, RoleSet};
use crate::store::{MapStore, Storage};

/// Orchestrates map creation, membership changes and deletion.
pub struct MapService<S, R = StdRng> {
    storage: S,
    join_codes: JoinCodeGenerator<R>,
}

impl<S: Storage> MapService<S, StdRng> {
    /// Service drawing join codes from an OS-seeded generator.
    ///
    /// Fails when the join code settings are out of range.
    pub fn with_os_rng(
        storage: S,
        config: &MapsterConfig,
    ) -> std::result::Result<Self, ConfigError> {
        let join_codes = JoinCodeGenerator::from_os_rng(&config.join_code)?;
        Ok(Self::new(storage, join_codes))
    }
}

impl<S: Storage, R: RngCore + CryptoRng> MapService<S, R> {
    pub fn new(storage: S, join_codes: JoinCodeGenerator<R>) -> Self {
        Self {
            storage,
            join_codes,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Whether `user_id` holds one of `allowed` on `map_id`.
    pub fn has_role(&self, map_id: MapId, user_id: UserId, allowed: RoleSet) -> Result<bool> {
        self.storage
            .atomically(|uow| Ok(access::has_role(&*uow, map_id, user_id, allowed)?))
    }

    /// Every map the user belongs to, ordered by map id.
    pub fn list_maps(&self, user_id: UserId) -> Result<Vec<DungeonMap>> {
        self.storage.atomically(|uow| {
            let memberships = uow.memberships_for_user(user_id)?;
            let mut maps = Vec::with_capacity(memberships.len());
            for membership in memberships {
                if let Some(map) = uow.map_by_id(membership.map_id)? {
                    maps.push(map);
                }
            }
            Ok(maps)
        })
    }

    /// A map visible to `user_id`. Non-members get `NotFound`.
    pub fn get_map(&self, map_id: MapId, user_id: UserId) -> Result<DungeonMap> {
        self.storage.atomically(|uow| {
            access::require_member(&*uow, map_id, user_id)?;
            uow.map_by_id(map_id)?
                .ok_or(MapsterError::NotFound(Missing::Map(map_id)))
        })
    }

    /// Exact join code lookup. Requires no membership.
    pub fn get_map_by_join_code(&self, code: &str) -> Result<DungeonMap> {
        if !join_code::is_well_formed(code) {
            return Err(MapsterError::NotFound(Missing::JoinCode));
        }
        self.storage.atomically(|uow| {
            uow.map_by_join_code(code)?
                .ok_or(MapsterError::NotFound(Missing::JoinCode))
        })
    }

    /// Create a map owned by `owner` together with its OWNER membership.
    pub fn create_map(&self, draft: &MapDraft, owner: UserId) -> Result<DungeonMap> {
        let map = self.storage.atomically(|uow| {
            let code = self.unused_join_code(&*uow)?;
            let map = uow.insert_map(draft, owner, &code, Utc::now())?;
            uow.insert_membership(map.id, owner, MapRole::Owner)?;
            Ok(map)
        })?;
        tracing::info!(map_id = %map.id, owner = %owner, "Created map");
        Ok(map)
    }

    /// Replace the editable fields of a map. Requires OWNER or DM.
    ///
    /// Owner, join code and creation time are preserved.
    pub fn update_map(
        &self,
        map_id: MapId,
        user_id: UserId,
        draft: &MapDraft,
    ) -> Result<DungeonMap> {
        self.storage.atomically(|uow| {
            access::require_role(&*uow, map_id, user_id, RoleSet::ADMINS, Operation::UpdateMap)?;
            uow.update_map_details(map_id, draft, Utc::now())?;
            uow.map_by_id(map_id)?
                .ok_or(MapsterError::NotFound(Missing::Map(map_id)))
        })
    }

    /// Delete a map. Only its OWNER may, and only as the last member.
    pub fn delete_map(&self, map_id: MapId, requester: UserId) -> Result<()> {
        self.storage.atomically(|uow| {
            let owner = access::require_role(
                &*uow,
                map_id,
                requester,
                RoleSet::OWNER,
                Operation::DeleteMap,
            )?;

            let count = uow.count_members(map_id)?;
            if count != 1 {
                tracing::debug!(map_id = %map_id, count, "Refusing to delete shared map");
                return Err(TransitionError::MembersRemain { map_id, count }.into());
            }

            uow.delete_membership(owner.id)?;
            uow.delete_cells_for_map(map_id)?;
            uow.delete_map(map_id)?;
            Ok(())
        })?;
        tracing::info!(map_id = %map_id, owner = %requester, "Deleted map");
        Ok(())
    }

    /// Join the map behind `code` as a PLAYER.
    pub fn join_map(&self, code: &str, user_id: UserId) -> Result<DungeonMap> {
        if !join_code::is_well_formed(code) {
            return Err(MapsterError::NotFound(Missing::JoinCode));
        }
        let map = self.storage.atomically(|uow| {
            let map = uow
                .map_by_join_code(code)?
                .ok_or(MapsterError::NotFound(Missing::JoinCode))?;

            if uow.membership(map.id, user_id)?.is_some() {
                tracing::debug!(map_id = %map.id, user_id = %user_id, "Already a member");
                return Err(TransitionError::AlreadyMember {
                    map_id: map.id,
                    user_id,
                }
                .into());
            }

            uow.insert_membership(map.id, user_id, MapRole::Player)?;
            Ok(map)
        })?;
        tracing::info!(map_id = %map.id, user_id = %user_id, "Joined map");
        Ok(map)
    }

    /// Memberships of a map. Visible to any member.
    pub fn members(&self, map_id: MapId, user_id: UserId) -> Result<Vec<MapMembership>> {
        self.storage.atomically(|uow| {
            access::require_member(&*uow, map_id, user_id)?;
            Ok(uow.memberships_for_map(map_id)?)
        })
    }

    /// PLAYER → DM. Requester must be OWNER or DM.
    pub fn promote_to_dm(
        &self,
        map_id: MapId,
        requester: UserId,
        target: UserId,
    ) -> Result<MapMembership> {
        self.change_role(
            map_id,
            requester,
            target,
            MapRole::Player,
            MapRole::Dm,
            Operation::PromoteMember,
        )
    }

    /// DM → PLAYER. Requester must be OWNER or DM.
    pub fn demote_to_player(
        &self,
        map_id: MapId,
        requester: UserId,
        target: UserId,
    ) -> Result<MapMembership> {
        self.change_role(
            map_id,
            requester,
            target,
            MapRole::Dm,
            MapRole::Player,
            Operation::DemoteMember,
        )
    }

    fn change_role(
        &self,
        map_id: MapId,
        requester: UserId,
        target: UserId,
        from: MapRole,
        to: MapRole,
        operation: Operation,
    ) -> Result<MapMembership> {
        let membership = self.storage.atomically(|uow| {
            access::require_role(&*uow, map_id, requester, RoleSet::ADMINS, operation)?;

            let mut membership = uow.membership(map_id, target)?.ok_or(
                MapsterError::NotFound(Missing::Membership {
                    map_id,
                    user_id: target,
                }),
            )?;
            expect_role(&membership, from)?;

            uow.set_role(membership.id, to)?;
            membership.role = to;
            Ok(membership)
        })?;
        tracing::info!(
            map_id = %map_id,
            requester = %requester,
            target = %target,
            from = %from,
            to = %to,
            "Changed member role"
        );
        Ok(membership)
    }

    /// Hand ownership to a DM. The current owner becomes a DM.
    ///
    /// Returns the new owner's membership.
    pub fn transfer_ownership(
        &self,
        map_id: MapId,
        owner: UserId,
        target: UserId,
    ) -> Result<MapMembership> {
        let membership = self.storage.atomically(|uow| {
            let current = access::require_role(
                &*uow,
                map_id,
                owner,
                RoleSet::OWNER,
                Operation::TransferOwnership,
            )?;

            let mut successor = uow.membership(map_id, target)?.ok_or(
                MapsterError::NotFound(Missing::Membership {
                    map_id,
                    user_id: target,
                }),
            )?;
            expect_role(&successor, MapRole::Dm)?;

            // Demote first: the store admits at most one OWNER row per map.
            uow.set_role(current.id, MapRole::Dm)?;
            uow.set_role(successor.id, MapRole::Owner)?;
            uow.set_map_owner(map_id, target, Utc::now())?;

            successor.role = MapRole::Owner;
            Ok(successor)
        })?;
        tracing::info!(map_id = %map_id, from = %owner, to = %target, "Transferred ownership");
        Ok(membership)
    }

    /// Remove a membership.
    ///
    /// Anyone but the OWNER may remove themselves. Only the OWNER may remove
    /// someone else. The OWNER is never removable here.
    pub fn remove_member(&self, map_id: MapId, requester: UserId, target: UserId) -> Result<()> {
        self.storage.atomically(|uow| {
            let requesting = access::require_member(&*uow, map_id, requester)?;

            let removed = if requester == target {
                requesting.clone()
            } else {
                uow.membership(map_id, target)?
                    .ok_or(MapsterError::NotFound(Missing::Membership {
                        map_id,
                        user_id: target,
                    }))?
            };

            if removed.role == MapRole::Owner {
                return Err(TransitionError::OwnerRemoval(map_id).into());
            }
            if requester != target && requesting.role != MapRole::Owner {
                tracing::debug!(
                    map_id = %map_id,
                    requester = %requester,
                    "Only the owner removes others"
                );
                return Err(MapsterError::Forbidden {
                    operation: Operation::RemoveMember,
                    role: requesting.role,
                });
            }

            uow.delete_membership(removed.id)?;
            Ok(())
        })?;
        tracing::info!(
            map_id = %map_id,
            requester = %requester,
            target = %target,
            "Removed member"
        );
        Ok(())
    }

    /// Draw join codes until one is not in use.
    fn unused_join_code<M: MapStore + ?Sized>(&self, store: &M) -> Result<String> {
        let attempts = self.join_codes.max_attempts();
        for attempt in 1..=attempts {
            let code = self.join_codes.generate()?;
            if store.map_by_join_code(&code)?.is_none() {
                return Ok(code);
            }
            tracing::warn!(attempt, "Join code collision, drawing again");
        }
        Err(StoreError::Conflict(format!("no unused join code after {} attempts", attempts)).into())
    }
}

fn expect_role(membership: &MapMembership, expected: MapRole) -> Result<()> {
    if membership.role == expected {
        Ok(())
    } else {
        Err(TransitionError::UnexpectedRole {
            user_id: membership.user_id,
            expected,
            actual: membership.role,
        }
        .into())
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use rand::SeedableRng;

    use super::*;
    use crate::config::{JoinCodeConfig, StorageConfig};
    use crate::model::GridLayout;
    use crate::persistence::SqliteStorage;

    const A: UserId = UserId(1);
    const B: UserId = UserId(2);
    const C: UserId = UserId(3);
    const D: UserId = UserId(4);

    fn storage() -> SqliteStorage {
        SqliteStorage::open_in_memory(&StorageConfig::default()).unwrap()
    }

    fn service_on<S: Storage>(storage: S, seed: u64) -> MapService<S> {
        MapService::new(
            storage,
            JoinCodeGenerator::new(StdRng::seed_from_u64(seed), &JoinCodeConfig::default())
                .unwrap(),
        )
    }

    fn service() -> MapService<SqliteStorage> {
        service_on(storage(), 42)
    }

    fn role(service: &MapService<impl Storage>, map_id: MapId, user: UserId) -> Option<MapRole> {
        service
            .storage()
            .atomically(|uow| Ok(access::role_of(&*uow, map_id, user)?))
            .unwrap()
    }

    fn member_count(service: &MapService<impl Storage>, map_id: MapId) -> u64 {
        service
            .storage()
            .atomically(|uow| Ok(uow.count_members(map_id)?))
            .unwrap()
    }

    /// Exactly one OWNER, matching the map's owner field, and unique users.
    fn assert_invariants(service: &MapService<impl Storage>, map_id: MapId) {
        let (map, members) = service
            .storage()
            .atomically(|uow| Ok((uow.map_by_id(map_id)?, uow.memberships_for_map(map_id)?)))
            .unwrap();
        let map = map.expect("map exists");
        assert!(!members.is_empty());

        let owners: Vec<_> = members.iter().filter(|m| m.role == MapRole::Owner).collect();
        assert_eq!(owners.len(), 1, "members: {:?}", members);
        assert_eq!(owners[0].user_id, map.owner_user_id);

        let mut users: Vec<_> = members.iter().map(|m| m.user_id).collect();
        users.sort();
        users.dedup();
        assert_eq!(users.len(), members.len());
    }

    /// A owns a map; B is DM, C is PLAYER.
    fn party(service: &MapService<SqliteStorage>) -> DungeonMap {
        let map = service.create_map(&MapDraft::new("Sunken Temple"), A).unwrap();
        service.join_map(&map.join_code, B).unwrap();
        service.join_map(&map.join_code, C).unwrap();
        service.promote_to_dm(map.id, A, B).unwrap();
        map
    }

    #[test]
    fn test_create_assigns_owner() {
        let service = service();
        let map = service.create_map(&MapDraft::new("Cave"), A).unwrap();

        assert_eq!(map.owner_user_id, A);
        assert_eq!(map.join_code.len(), 16);
        assert!(service.has_role(map.id, A, RoleSet::OWNER).unwrap());
        assert!(!service.has_role(map.id, A, RoleSet::DM).unwrap());
        assert_invariants(&service, map.id);
    }

    #[test]
    fn test_join_codes_unique() {
        let service = service();
        let codes: std::collections::HashSet<String> = (0..20)
            .map(|i| {
                let draft = MapDraft::new(format!("Map {}", i));
                service.create_map(&draft, A).unwrap().join_code
            })
            .collect();
        assert_eq!(codes.len(), 20);
    }

    #[test]
    fn test_join_code_collision_redraws() {
        let shared = Arc::new(storage());
        let first = service_on(Arc::clone(&shared), 9);
        let second = service_on(Arc::clone(&shared), 9);

        let a = first.create_map(&MapDraft::new("One"), A).unwrap();
        let b = second.create_map(&MapDraft::new("Two"), B).unwrap();
        assert_ne!(a.join_code, b.join_code);
    }

    #[test]
    fn test_join_code_attempts_exhausted() {
        let shared = Arc::new(storage());
        let config = JoinCodeConfig {
            length: 16,
            max_attempts: 1,
        };
        let first = MapService::new(
            Arc::clone(&shared),
            JoinCodeGenerator::new(StdRng::seed_from_u64(5), &config).unwrap(),
        );
        let second = MapService::new(
            Arc::clone(&shared),
            JoinCodeGenerator::new(StdRng::seed_from_u64(5), &config).unwrap(),
        );

        first.create_map(&MapDraft::new("One"), A).unwrap();
        let err = second.create_map(&MapDraft::new("Two"), B).unwrap_err();
        assert!(matches!(err, MapsterError::Storage(StoreError::Conflict(_))));
        assert!(second.list_maps(B).unwrap().is_empty());
    }

    #[test]
    fn test_out_of_range_join_codes_rejected() {
        for length in [0, 65] {
            let mut config = MapsterConfig::default();
            config.join_code.length = length;
            assert!(
                MapService::with_os_rng(storage(), &config).is_err(),
                "length {} accepted",
                length
            );
        }

        let service = MapService::with_os_rng(storage(), &MapsterConfig::default()).unwrap();
        let map = service.create_map(&MapDraft::new("Lair"), A).unwrap();
        assert_eq!(service.join_map(&map.join_code, B).unwrap().id, map.id);
    }

    #[test]
    fn test_join_then_rejoin() {
        let service = service();
        let map = service.create_map(&MapDraft::new("Inn"), A).unwrap();

        let joined = service.join_map(&map.join_code, B).unwrap();
        assert_eq!(joined.id, map.id);
        assert_eq!(role(&service, map.id, B), Some(MapRole::Player));
        assert_eq!(member_count(&service, map.id), 2);

        let again = service.join_map(&map.join_code, B).unwrap_err();
        assert!(matches!(
            again,
            MapsterError::InvariantViolation(TransitionError::AlreadyMember { .. })
        ));
        assert_eq!(member_count(&service, map.id), 2);

        // The owner is a member too
        assert!(service.join_map(&map.join_code, A).is_err());
        assert_invariants(&service, map.id);
    }

    #[test]
    fn test_join_unknown_code() {
        let service = service();
        service.create_map(&MapDraft::new("Inn"), A).unwrap();
        let err = service.join_map("NoSuchCode000000", B).unwrap_err();
        assert!(matches!(err, MapsterError::NotFound(Missing::JoinCode)));
        let err = service.join_map("", B).unwrap_err();
        assert!(err.is_not_found());
        assert!(service.list_maps(B).unwrap().is_empty());
    }

    #[test]
    fn test_get_by_join_code_needs_no_membership() {
        let service = service();
        let map = service.create_map(&MapDraft::new("Tower"), A).unwrap();
        assert_eq!(service.get_map_by_join_code(&map.join_code).unwrap().id, map.id);

        let lower = map.join_code.to_lowercase();
        if lower != map.join_code {
            assert!(service.get_map_by_join_code(&lower).unwrap_err().is_not_found());
        }
        assert!(service.get_map_by_join_code("x; DROP TABLE maps").unwrap_err().is_not_found());
    }

    #[test]
    fn test_get_map_hides_from_non_members() {
        let service = service();
        let map = service.create_map(&MapDraft::new("Crypt"), A).unwrap();

        assert_eq!(service.get_map(map.id, A).unwrap().name, "Crypt");
        assert!(service.get_map(map.id, D).unwrap_err().is_not_found());
        assert!(service.get_map(MapId(9999), D).unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_maps() {
        let service = service();
        let first = service.create_map(&MapDraft::new("First"), A).unwrap();
        let second = service.create_map(&MapDraft::new("Second"), B).unwrap();
        service.join_map(&second.join_code, A).unwrap();
        service.create_map(&MapDraft::new("Third"), C).unwrap();

        let ids: Vec<MapId> = service.list_maps(A).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
        assert!(service.list_maps(D).unwrap().is_empty());
    }

    #[test]
    fn test_update_map() {
        let service = service();
        let map = party(&service);

        let draft = MapDraft::new("Flooded Temple")
            .with_image("temple.png")
            .with_layout(GridLayout {
                grid_type: Some("hex".into()),
                grid_size: Some(48),
                ..Default::default()
            });
        let updated = service.update_map(map.id, B, &draft).unwrap();
        assert_eq!(updated.name, "Flooded Temple");
        assert_eq!(updated.layout.grid_size, Some(48));
        assert_eq!(updated.owner_user_id, A);
        assert_eq!(updated.join_code, map.join_code);
        assert_eq!(updated.created_at, map.created_at);
        assert!(updated.updated_at >= map.updated_at);

        assert!(service.update_map(map.id, C, &draft).unwrap_err().is_forbidden());
        assert!(service.update_map(map.id, D, &draft).unwrap_err().is_not_found());
    }

    #[test]
    fn test_members_visible_to_members_only() {
        let service = service();
        let map = party(&service);

        let members = service.members(map.id, C).unwrap();
        let roles: Vec<(UserId, MapRole)> = members.iter().map(|m| (m.user_id, m.role)).collect();
        assert_eq!(
            roles,
            vec![(A, MapRole::Owner), (B, MapRole::Dm), (C, MapRole::Player)]
        );
        assert!(service.members(map.id, D).unwrap_err().is_not_found());
    }

    #[test]
    fn test_promote_rules() {
        let service = service();
        let map = party(&service);
        service.join_map(&map.join_code, D).unwrap();

        // Players cannot promote
        assert!(service.promote_to_dm(map.id, C, D).unwrap_err().is_forbidden());
        assert_eq!(role(&service, map.id, D), Some(MapRole::Player));

        // Target must currently be a PLAYER
        assert!(service.promote_to_dm(map.id, A, B).unwrap_err().is_invariant_violation());
        assert!(service.promote_to_dm(map.id, B, A).unwrap_err().is_invariant_violation());
        assert_eq!(role(&service, map.id, A), Some(MapRole::Owner));

        // Target must be a member
        assert!(service.promote_to_dm(map.id, A, UserId(77)).unwrap_err().is_not_found());

        // A DM may promote
        let promoted = service.promote_to_dm(map.id, B, D).unwrap();
        assert_eq!(promoted.role, MapRole::Dm);
        assert_eq!(role(&service, map.id, D), Some(MapRole::Dm));
        assert_invariants(&service, map.id);
    }

    #[test]
    fn test_demote_rules() {
        let service = service();
        let map = party(&service);

        assert!(service.demote_to_player(map.id, C, B).unwrap_err().is_forbidden());
        assert!(service.demote_to_player(map.id, A, C).unwrap_err().is_invariant_violation());
        assert!(service.demote_to_player(map.id, B, A).unwrap_err().is_invariant_violation());
        assert_eq!(role(&service, map.id, A), Some(MapRole::Owner));

        let demoted = service.demote_to_player(map.id, A, B).unwrap();
        assert_eq!(demoted.role, MapRole::Player);
        assert_eq!(role(&service, map.id, B), Some(MapRole::Player));
        assert_invariants(&service, map.id);
    }

    #[test]
    fn test_transfer_ownership() {
        let service = service();
        let map = party(&service);

        let new_owner = service.transfer_ownership(map.id, A, B).unwrap();
        assert_eq!(new_owner.user_id, B);
        assert_eq!(new_owner.role, MapRole::Owner);
        assert_eq!(role(&service, map.id, A), Some(MapRole::Dm));
        assert_eq!(role(&service, map.id, B), Some(MapRole::Owner));
        assert_eq!(service.get_map(map.id, C).unwrap().owner_user_id, B);
        assert_invariants(&service, map.id);
    }

    #[test]
    fn test_transfer_preconditions() {
        let service = service();
        let map = party(&service);
        service.promote_to_dm(map.id, A, C).unwrap();

        // A DM cannot transfer
        assert!(service.transfer_ownership(map.id, B, C).unwrap_err().is_forbidden());
        // Target must be a DM
        service.demote_to_player(map.id, A, C).unwrap();
        assert!(service.transfer_ownership(map.id, A, C).unwrap_err().is_invariant_violation());
        // Target must be a member
        assert!(service.transfer_ownership(map.id, A, D).unwrap_err().is_not_found());
        // Non-members learn nothing
        assert!(service.transfer_ownership(map.id, D, B).unwrap_err().is_not_found());

        assert_eq!(role(&service, map.id, A), Some(MapRole::Owner));
        assert_eq!(service.get_map(map.id, A).unwrap().owner_user_id, A);
        assert_invariants(&service, map.id);
    }

    #[test]
    fn test_remove_member_rules() {
        let service = service();
        let map = party(&service);
        service.join_map(&map.join_code, D).unwrap();

        // The owner can never be removed
        assert!(service.remove_member(map.id, A, A).unwrap_err().is_invariant_violation());
        assert!(service.remove_member(map.id, B, A).unwrap_err().is_invariant_violation());

        // A DM cannot remove others
        assert!(service.remove_member(map.id, B, C).unwrap_err().is_forbidden());

        // Missing target
        assert!(service.remove_member(map.id, A, UserId(77)).unwrap_err().is_not_found());

        // Self-removal
        service.remove_member(map.id, C, C).unwrap();
        assert_eq!(role(&service, map.id, C), None);

        // Owner removes someone else
        service.remove_member(map.id, A, D).unwrap();
        assert_eq!(role(&service, map.id, D), None);

        assert_eq!(member_count(&service, map.id), 2);
        assert_invariants(&service, map.id);
    }

    #[test]
    fn test_delete_requires_sole_owner() {
        let service = service();
        let map = party(&service);

        // A DM may not delete
        assert!(service.delete_map(map.id, B).unwrap_err().is_forbidden());
        // The owner may not while others remain
        let err = service.delete_map(map.id, A).unwrap_err();
        assert!(matches!(
            err,
            MapsterError::InvariantViolation(TransitionError::MembersRemain { count: 3, .. })
        ));
        assert_eq!(member_count(&service, map.id), 3);
        assert_eq!(service.get_map(map.id, C).unwrap().id, map.id);
    }

    #[test]
    fn test_full_handover_then_delete() {
        let service = service();
        let map = service.create_map(&MapDraft::new("Ruins"), A).unwrap();
        service.join_map(&map.join_code, B).unwrap();
        service.promote_to_dm(map.id, A, B).unwrap();
        service.transfer_ownership(map.id, A, B).unwrap();
        assert_eq!(role(&service, map.id, A), Some(MapRole::Dm));

        // A is a DM now and not the sole member
        assert!(service.delete_map(map.id, A).unwrap_err().is_forbidden());
        assert_eq!(member_count(&service, map.id), 2);

        service.remove_member(map.id, A, A).unwrap();
        service.delete_map(map.id, B).unwrap();

        assert!(service.get_map(map.id, B).unwrap_err().is_not_found());
        assert!(service.get_map_by_join_code(&map.join_code).unwrap_err().is_not_found());
        assert_eq!(member_count(&service, map.id), 0);
        assert!(service.list_maps(B).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_joins_insert_once() {
        let service = Arc::new(service());
        let map = service.create_map(&MapDraft::new("Arena"), A).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                let code = map.join_code.clone();
                thread::spawn(move || service.join_map(&code, B).is_ok())
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(member_count(&service, map.id), 2);
        assert_invariants(&service, map.id);
    }

    #[test]
    fn test_concurrent_transfers_pick_one_owner() {
        let service = Arc::new(service());
        let map_id = party(&service).id;
        service.promote_to_dm(map_id, A, C).unwrap();

        let handles: Vec<_> = [B, C]
            .into_iter()
            .map(|target| {
                let service = Arc::clone(&service);
                thread::spawn(move || service.transfer_ownership(map_id, A, target).is_ok())
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(role(&service, map_id, A), Some(MapRole::Dm));
        assert_invariants(&service, map_id);
    }

    #[test]
    fn test_concurrent_remove_and_promote() {
        let service = Arc::new(service());
        let map_id = party(&service).id;

        let remover = {
            let service = Arc::clone(&service);
            thread::spawn(move || service.remove_member(map_id, A, C).is_ok())
        };
        let promoter = {
            let service = Arc::clone(&service);
            thread::spawn(move || service.promote_to_dm(map_id, B, C))
        };
        assert!(remover.join().unwrap());
        // The promotion may land before or after the removal
        let _ = promoter.join().unwrap();

        assert_eq!(role(&service, map_id, C), None);
        assert_invariants(&service, map_id);
    }
}
