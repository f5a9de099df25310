//! Site lifecycle: config seeding, role synchronization, membership changes.

use std::sync::Arc;

use palisade::{
    AccessChecker, ChainPermissionCalculator, Config, Group, GroupContent, GroupStorage,
    GroupType, GroupRoleSynchronizer, MemoryGroupStorage, Operation, Principal, Scope, SiteRole,
};

const SEED: &str = r#"
[access]
bypass_permission = "bypass group access"

[[site_roles]]
id = "editor"
label = "Editor"

[[group_types]]
id = "department"
label = "Department"
plugins = ["group_node"]
anonymous = ["view group"]
outsider = ["view group", "join group"]
member = ["view group", "leave group"]
"#;

async fn install_seed() -> Arc<MemoryGroupStorage> {
    let storage = Arc::new(MemoryGroupStorage::new());
    let config = Config::from_str(SEED).unwrap();
    config
        .install(storage.clone() as Arc<dyn GroupStorage>)
        .await
        .unwrap();
    storage
}

#[tokio::test]
async fn test_seeded_site_grants_audience_permissions() {
    let storage = install_seed().await;
    let chain = Arc::new(ChainPermissionCalculator::new(
        storage.clone() as Arc<dyn GroupStorage>
    ));

    let anonymous = chain.calculate_permissions(&Principal::anonymous()).await.unwrap();
    let scope = Scope::group_type("department");
    let granted: Vec<&str> = anonymous
        .permissions_for(&scope)
        .unwrap()
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(granted, vec!["view group"]);

    let outsider = chain
        .calculate_permissions(&Principal::authenticated(7, vec![]))
        .await
        .unwrap();
    assert!(outsider.has_permission(&scope, "join group"));
    assert!(!outsider.has_permission(&scope, "leave group"));
}

#[tokio::test]
async fn test_joining_and_leaving_a_group() {
    let storage = install_seed().await;
    let chain = Arc::new(ChainPermissionCalculator::new(
        storage.clone() as Arc<dyn GroupStorage>
    ));
    let checker = AccessChecker::new(chain.clone(), storage.clone());

    let group = Group::new(1, "department", 2);
    storage.save_group(group.clone()).await.unwrap();

    let user = Principal::authenticated(7, vec![]);
    assert!(checker.group_access(&user, Operation::View, &group).await.unwrap());

    // Joining switches the governing scope to the member role.
    let membership = GroupContent::membership(10, 1, 7);
    storage.save_group_content(membership.clone()).await.unwrap();
    chain.invalidate();

    let calculated = chain.calculate_permissions(&user).await.unwrap();
    assert!(calculated.has_permission(&Scope::group(1), "leave group"));
    assert!(!calculated.has_permission(&Scope::group(1), "join group"));
    assert!(checker.group_access(&user, Operation::View, &group).await.unwrap());

    // Leaving restores the outsider scope.
    storage.delete_group_content(membership.id).await.unwrap();
    chain.invalidate();

    let calculated = chain.calculate_permissions(&user).await.unwrap();
    assert!(calculated.permissions_for(&Scope::group(1)).is_none());
    assert!(checker.group_access(&user, Operation::View, &group).await.unwrap());
}

#[tokio::test]
async fn test_synchronized_role_grants_flow_to_outsiders() {
    let storage = install_seed().await;
    let synchronizer = GroupRoleSynchronizer::new(storage.clone() as Arc<dyn GroupStorage>);

    // The seeded "editor" site role was mirrored at install time; grant the
    // mirror a permission and give a user the site role.
    let synced_id = synchronizer.group_role_id("department", "editor");
    let mut synced = storage.group_role(&synced_id).await.unwrap().unwrap();
    synced.permissions.insert("edit group".to_string());
    storage.save_group_role(synced).await.unwrap();

    let chain = Arc::new(ChainPermissionCalculator::new(
        storage.clone() as Arc<dyn GroupStorage>
    ));

    let editor = Principal::authenticated(7, vec!["editor".to_string()]);
    let calculated = chain.calculate_permissions(&editor).await.unwrap();
    assert!(calculated.has_permission(&Scope::group_type("department"), "edit group"));

    // A user without the site role gets nothing from the mirror.
    let plain = Principal::authenticated(8, vec![]);
    let calculated = chain.calculate_permissions(&plain).await.unwrap();
    assert!(!calculated.has_permission(&Scope::group_type("department"), "edit group"));
}

#[tokio::test]
async fn test_new_site_role_mirrors_into_seeded_types() {
    let storage = install_seed().await;
    let synchronizer = GroupRoleSynchronizer::new(storage.clone() as Arc<dyn GroupStorage>);

    let reviewer = SiteRole::new("reviewer", "Reviewer");
    storage.save_site_role(reviewer.clone()).await.unwrap();
    synchronizer.site_role_created(&reviewer).await.unwrap();

    let mirrors = storage.synchronized_roles("reviewer").await.unwrap();
    assert_eq!(mirrors.len(), 1);
    assert_eq!(mirrors[0].group_type, "department");
}

#[tokio::test]
async fn test_removing_a_group_type_revokes_its_audience() {
    let storage = install_seed().await;
    let synchronizer = GroupRoleSynchronizer::new(storage.clone() as Arc<dyn GroupStorage>);
    let chain = Arc::new(ChainPermissionCalculator::new(
        storage.clone() as Arc<dyn GroupStorage>
    ));

    let user = Principal::authenticated(7, vec![]);
    let before = chain.calculate_permissions(&user).await.unwrap();
    assert!(before.permissions_for(&Scope::group_type("department")).is_some());

    synchronizer.remove_group_type("department").await.unwrap();
    chain.invalidate();

    let after = chain.calculate_permissions(&user).await.unwrap();
    assert!(after.permissions_for(&Scope::group_type("department")).is_none());

    // The second seeded type never existed, so the set is now empty.
    assert_eq!(after.scopes().count(), 0);
}

#[tokio::test]
async fn test_second_install_group_type_is_additive() {
    let storage = install_seed().await;
    let synchronizer = GroupRoleSynchronizer::new(storage.clone() as Arc<dyn GroupStorage>);

    synchronizer
        .install_group_type(GroupType::new("club", "Club"))
        .await
        .unwrap();

    let chain = Arc::new(ChainPermissionCalculator::new(
        storage.clone() as Arc<dyn GroupStorage>
    ));
    let calculated = chain
        .calculate_permissions(&Principal::authenticated(7, vec![]))
        .await
        .unwrap();

    // One scope per installed type, even where nothing is granted.
    assert_eq!(calculated.scopes().count(), 2);
    assert!(calculated
        .permissions_for(&Scope::group_type("club"))
        .unwrap()
        .is_empty());

    // The new type's editor mirror was created from the existing site role.
    let synced_id = synchronizer.group_role_id("club", "editor");
    assert!(storage.group_role(&synced_id).await.unwrap().is_some());
}
