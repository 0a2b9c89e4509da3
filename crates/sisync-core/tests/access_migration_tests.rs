//! Group and user migration between two fake environments.

mod common;

use serde_json::json;

use common::environments;
use sisync_core::endpoints;
use sisync_core::{MigrationStatus, Migrator};

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_one_missing_group_does_not_abort_run() {
    let (source, target, src, tgt) = environments();
    for (id, name) in [("g1", "Finance"), ("g2", "Ops"), ("g3", "Legal"), ("g4", "HR")] {
        source.respond(
            "GET",
            endpoints::group_by_name(name),
            200,
            json!([{"_id": id, "name": name}]),
        );
    }
    target.respond(
        "GET",
        endpoints::group_by_name("Finance"),
        200,
        json!([{"_id": "tg-1", "name": "Finance"}]),
    );
    target.respond("POST", endpoints::GROUPS, 201, json!({"_id": "tg-new"}));

    let summary = Migrator::new(src, tgt)
        .migrate_groups(&names(&["Finance", "Ops", "Ghosts", "Legal", "HR"]))
        .await;

    assert_eq!(summary.total(), 5);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.skipped(), 1);
    assert_eq!(summary.migrated(), 3);
    assert_eq!(summary.results[2].status, MigrationStatus::Failed);
    assert_eq!(summary.results[2].error_kind.as_deref(), Some("not_found"));
    assert_eq!(summary.results[2].detail, "group 'Ghosts' not found");
    assert_eq!(target.calls_to("POST", endpoints::GROUPS).len(), 3);
}

#[tokio::test]
async fn test_all_groups_skips_builtins() {
    let (source, target, src, tgt) = environments();
    source.respond(
        "GET",
        endpoints::GROUPS,
        200,
        json!([
            {"_id": "g-adm", "name": "Admins"},
            {"_id": "g-all", "name": "Everyone"},
            {"_id": "g-fin", "name": "Finance"}
        ]),
    );
    source.respond(
        "GET",
        endpoints::group_by_id("g-fin"),
        200,
        json!({"_id": "g-fin", "name": "Finance"}),
    );
    target.respond("POST", endpoints::GROUPS, 201, json!({"_id": "tg-fin"}));

    let summary = Migrator::new(src, tgt).migrate_all_groups().await.unwrap();

    assert_eq!(summary.total(), 1);
    assert_eq!(summary.results[0].entity.label(), "Finance");
    assert_eq!(summary.results[0].target_id.as_deref(), Some("tg-fin"));
    assert_eq!(
        target.calls_to("POST", endpoints::GROUPS)[0].body,
        json!({"name": "Finance"})
    );
}

#[tokio::test]
async fn test_user_created_with_target_role_and_groups() {
    let (source, target, src, tgt) = environments();
    source.respond(
        "GET",
        endpoints::user_by_name("jane@corp"),
        200,
        json!([{
            "_id": "su-1",
            "userName": "jane@corp",
            "email": "jane@corp",
            "firstName": "Jane",
            "lastName": "Doe",
            "role": {"_id": "sr-1", "name": "dataDesigner"},
            "groups": [{"_id": "sg-1", "name": "Sales Team"}, {"_id": "sg-2", "name": "Legacy"}]
        }]),
    );
    target.respond(
        "GET",
        endpoints::ROLES,
        200,
        json!([{"_id": "tr-1", "name": "dataDesigner"}, {"_id": "tr-2", "name": "viewer"}]),
    );
    target.respond(
        "GET",
        endpoints::group_by_name("Sales Team"),
        200,
        json!([{"_id": "tg-1", "name": "Sales Team"}]),
    );
    target.respond("POST", endpoints::USERS, 201, json!({"_id": "tu-9"}));

    let summary = Migrator::new(src, tgt)
        .migrate_users(&names(&["jane@corp"]))
        .await;

    assert_eq!(summary.results[0].status, MigrationStatus::Migrated, "{:?}", summary.results[0]);
    assert_eq!(summary.results[0].target_id.as_deref(), Some("tu-9"));
    let body = &target.calls_to("POST", endpoints::USERS)[0].body;
    assert_eq!(body["roleId"], "tr-1");
    assert_eq!(body["groups"], json!(["tg-1"]));
    assert_eq!(body["firstName"], "Jane");
    assert!(body.get("_id").is_none());
}

#[tokio::test]
async fn test_existing_user_is_skipped() {
    let (source, target, src, tgt) = environments();
    let jane = json!([{"_id": "x", "userName": "jane@corp"}]);
    source.respond("GET", endpoints::user_by_name("jane@corp"), 200, jane.clone());
    target.respond("GET", endpoints::user_by_name("jane@corp"), 200, jane);

    let summary = Migrator::new(src, tgt)
        .migrate_users(&names(&["jane@corp"]))
        .await;

    assert_eq!(summary.skipped(), 1);
    assert!(target.writes().is_empty());
}

#[tokio::test]
async fn test_unknown_target_role_fails_user() {
    let (source, target, src, tgt) = environments();
    source.respond(
        "GET",
        endpoints::user_by_name("bob@corp"),
        200,
        json!([{"_id": "su-2", "userName": "bob@corp", "role": {"name": "auditor"}, "groups": []}]),
    );
    target.respond("GET", endpoints::ROLES, 200, json!([{"_id": "tr-2", "name": "viewer"}]));

    let summary = Migrator::new(src, tgt)
        .migrate_users(&names(&["bob@corp"]))
        .await;

    assert!(summary.results[0].is_failed());
    assert_eq!(summary.results[0].detail, "role 'auditor' not found");
    assert!(target.writes().is_empty());
}
