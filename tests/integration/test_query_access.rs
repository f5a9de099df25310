//! Equivalence between compiled query conditions and entity access checks.
//!
//! The core contract of the query-access handlers: for every stored row, the
//! compiled condition tree must match exactly when the corresponding access
//! check would allow the operation. The tests build a site with mixed
//! audiences, published states, ownerships and memberships, then compare the
//! two paths over the full matrix.

use std::sync::Arc;

use palisade::{
    AccessChecker, ChainPermissionCalculator, Group, GroupContent, GroupQueryAccessHandler,
    GroupContentQueryAccessHandler, GroupRole, GroupStorage, GroupType, GroupRoleSynchronizer,
    MemoryGroupStorage, Operation, Principal, SiteRole, BYPASS_GROUP_ACCESS,
};

struct World {
    storage: Arc<MemoryGroupStorage>,
    chain: Arc<ChainPermissionCalculator>,
}

impl World {
    fn checker(&self) -> AccessChecker {
        AccessChecker::new(self.chain.clone(), self.storage.clone())
    }

    fn group_handler(&self) -> GroupQueryAccessHandler {
        GroupQueryAccessHandler::new(self.chain.clone(), self.storage.clone())
    }

    fn content_handler(&self) -> GroupContentQueryAccessHandler {
        GroupContentQueryAccessHandler::new(self.chain.clone(), self.storage.clone())
    }
}

/// Build a site with two group types, mixed grants and several memberships.
///
/// - `department` gives anonymous and outsiders "view group", outsiders
///   additionally own-unpublished viewing and own-content updates; members
///   get viewing plus any-content access.
/// - `club` gives outsiders nothing; members administer the group.
/// - `department-manager` is an assignable role granting full control,
///   held by user 4 in group 2.
async fn build_world() -> World {
    let storage = Arc::new(MemoryGroupStorage::new());
    let synchronizer = GroupRoleSynchronizer::new(storage.clone() as Arc<dyn GroupStorage>);

    let mut department = GroupType::new("department", "Department");
    department.plugins.insert("group_node".to_string());
    synchronizer.install_group_type(department).await.unwrap();

    let mut club = GroupType::new("club", "Club");
    club.plugins.insert("group_node".to_string());
    synchronizer.install_group_type(club).await.unwrap();

    let grants: &[(&str, &[&str])] = &[
        ("department-anonymous", &["view group"]),
        (
            "department-outsider",
            &[
                "view group",
                "view own unpublished group",
                "view any group_node entity",
                "update own group_node entity",
            ],
        ),
        (
            "department-member",
            &["view group", "view any group_node entity"],
        ),
        ("club-member", &["administer group"]),
    ];
    for (role_id, permissions) in grants {
        let mut role = storage.group_role(role_id).await.unwrap().unwrap();
        role.permissions.extend(permissions.iter().map(|p| p.to_string()));
        storage.save_group_role(role).await.unwrap();
    }

    let manager = GroupRole::new("department-manager", "department", "Manager")
        .grant(["administer group", "administer group_node"]);
    storage.save_group_role(manager).await.unwrap();

    let mut administrator = SiteRole::new("administrator", "Administrator");
    administrator.permissions.insert(BYPASS_GROUP_ACCESS.to_string());
    storage.save_site_role(administrator).await.unwrap();

    for group in [
        Group::new(1, "department", 2),
        Group::unpublished(2, "department", 5),
        Group::unpublished(3, "department", 3),
        Group::new(4, "club", 2),
        Group::unpublished(5, "club", 6),
    ] {
        storage.save_group(group).await.unwrap();
    }

    for membership in [
        GroupContent::membership(10, 1, 6),
        GroupContent::membership(11, 5, 6),
        GroupContent::membership(12, 4, 5),
        GroupContent::membership(13, 2, 4)
            .with_roles(["department-manager".to_string()]),
    ] {
        storage.save_group_content(membership).await.unwrap();
    }

    for content in [
        GroupContent::new(20, 1, "group_node", "node-a", 6),
        GroupContent::new(21, 1, "group_node", "node-b", 3),
        GroupContent::new(22, 2, "group_node", "node-c", 5),
        GroupContent::new(23, 4, "group_node", "node-d", 2),
        GroupContent::new(24, 5, "group_node", "node-e", 6),
    ] {
        storage.save_group_content(content).await.unwrap();
    }

    let chain = Arc::new(ChainPermissionCalculator::new(
        storage.clone() as Arc<dyn GroupStorage>
    ));
    World { storage, chain }
}

fn principals() -> Vec<Principal> {
    vec![
        Principal::anonymous(),
        Principal::authenticated(3, vec![]),
        Principal::authenticated(4, vec![]),
        Principal::authenticated(5, vec![]),
        Principal::authenticated(6, vec![]),
        Principal::authenticated(9, vec!["administrator".to_string()]),
    ]
}

#[tokio::test]
async fn test_group_conditions_agree_with_access_checks() {
    let world = build_world().await;
    let checker = world.checker();
    let handler = world.group_handler();
    let groups = world.storage.groups().await.unwrap();

    for principal in principals() {
        for operation in [Operation::View, Operation::Update, Operation::Delete] {
            let conditions = handler.get_conditions(operation, &principal).await.unwrap();
            for group in &groups {
                let allowed = checker
                    .group_access(&principal, operation, group)
                    .await
                    .unwrap();
                let row = GroupQueryAccessHandler::row_for_group(group);
                assert_eq!(
                    conditions.matches(&row),
                    allowed,
                    "user {} / {operation} / group {}",
                    principal.id,
                    group.id
                );
            }
        }
    }
}

#[tokio::test]
async fn test_content_conditions_agree_with_access_checks() {
    let world = build_world().await;
    let checker = world.checker();
    let handler = world.content_handler();
    let groups = world.storage.groups().await.unwrap();

    for principal in principals() {
        for operation in [Operation::View, Operation::Update, Operation::Delete] {
            let conditions = handler.get_conditions(operation, &principal).await.unwrap();
            for group in &groups {
                for content in world.storage.content_of_group(group.id).await.unwrap() {
                    let allowed = checker
                        .content_access(&principal, operation, &content)
                        .await
                        .unwrap();
                    let row = GroupContentQueryAccessHandler::row_for_content(&content, group);
                    assert_eq!(
                        conditions.matches(&row),
                        allowed,
                        "user {} / {operation} / content {}",
                        principal.id,
                        content.id
                    );
                }
            }
        }
    }
}

#[tokio::test]
async fn test_spot_checks_on_the_matrix() {
    let world = build_world().await;
    let checker = world.checker();

    let groups = world.storage.groups().await.unwrap();
    let group = |id| groups.iter().find(|g| g.id == id).unwrap();

    // Anonymous sees published departments, nothing of clubs.
    let anonymous = Principal::anonymous();
    assert!(checker
        .group_access(&anonymous, Operation::View, group(1))
        .await
        .unwrap());
    assert!(!checker
        .group_access(&anonymous, Operation::View, group(4))
        .await
        .unwrap());

    // User 5 owns the unpublished department group 2 and may view it as an
    // outsider; their club membership grants full control over group 4, but
    // nothing reaches the club group they are not a member of.
    let user5 = Principal::authenticated(5, vec![]);
    assert!(checker
        .group_access(&user5, Operation::View, group(2))
        .await
        .unwrap());
    assert!(checker
        .group_access(&user5, Operation::Delete, group(4))
        .await
        .unwrap());
    assert!(!checker
        .group_access(&user5, Operation::View, group(5))
        .await
        .unwrap());

    // User 6 administers club 5 through the member role.
    let user6 = Principal::authenticated(6, vec![]);
    assert!(checker
        .group_access(&user6, Operation::Delete, group(5))
        .await
        .unwrap());

    // User 4 holds the manager role in group 2 only.
    let user4 = Principal::authenticated(4, vec![]);
    assert!(checker
        .group_access(&user4, Operation::Update, group(2))
        .await
        .unwrap());
    assert!(!checker
        .group_access(&user4, Operation::Update, group(1))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_bypass_principal_matches_everything() {
    let world = build_world().await;
    let handler = world.group_handler();

    let admin = Principal::authenticated(9, vec!["administrator".to_string()]);
    let conditions = handler.get_conditions(Operation::Delete, &admin).await.unwrap();
    assert!(conditions.is_unrestricted());

    for group in world.storage.groups().await.unwrap() {
        assert!(conditions.matches(&GroupQueryAccessHandler::row_for_group(&group)));
    }
}
