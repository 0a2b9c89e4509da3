//! Ownership swap behavior observed through dashboard script writes.

mod common;

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use common::{ok, FakeRemote};
use sisync_core::endpoints;
use sisync_core::{Dashboards, Environment, RemoteResponse, ScriptPayload, SisyncError};

const DASH: &str = "d1";

#[derive(Debug, Clone)]
struct DashboardState {
    owner: String,
    shares: Value,
    owner_during_put: Option<String>,
}

fn original_shares() -> Value {
    json!([
        {"shareId": "u-owner", "type": "user", "rule": "edit", "subscribe": false},
        {"shareId": "g-sales", "type": "group", "rule": "view", "subscribe": true},
        {"shareId": "u-jane", "type": "user", "rule": "view", "subscribe": false}
    ])
}

/// A dashboard owned by `u-owner` with three shares, plus the acting user.
fn platform() -> (Arc<FakeRemote>, Arc<Mutex<DashboardState>>) {
    let fake = FakeRemote::new("bi");
    let state = Arc::new(Mutex::new(DashboardState {
        owner: "u-owner".into(),
        shares: original_shares(),
        owner_during_put: None,
    }));

    let s = state.clone();
    fake.on("GET", endpoints::dashboard_by_id(DASH), move |_| {
        let owner = s.lock().unwrap().owner.clone();
        ok(json!([{"oid": DASH, "title": "Sales", "owner": owner}]))
    });
    let s = state.clone();
    fake.on("GET", endpoints::dashboard_shares(DASH), move |_| {
        ok(json!({"sharesTo": s.lock().unwrap().shares.clone()}))
    });
    let s = state.clone();
    fake.on("POST", endpoints::dashboard_shares(DASH), move |body| {
        s.lock().unwrap().shares = body["sharesTo"].clone();
        ok(json!({}))
    });
    let s = state.clone();
    fake.on("POST", endpoints::dashboard_change_owner(DASH), move |body| {
        s.lock().unwrap().owner = body["ownerId"].as_str().unwrap().to_string();
        ok(json!({}))
    });
    let s = state.clone();
    fake.on("PUT", endpoints::dashboard_script(DASH), move |_| {
        let mut state = s.lock().unwrap();
        state.owner_during_put = Some(state.owner.clone());
        ok(json!({}))
    });
    fake.respond(
        "GET",
        endpoints::user_by_name("api@corp"),
        200,
        json!([{"_id": "u-api", "userName": "api@corp"}]),
    );
    (fake, state)
}

fn script() -> ScriptPayload {
    ScriptPayload::RawBody("widget.on('ready', () => {});".into())
}

#[tokio::test]
async fn test_successful_swap_restores_owner_and_shares_exactly() {
    let (fake, state) = platform();
    let env = Environment::target(fake.clone());

    Dashboards::new(&env)
        .add_dashboard_script(DASH, script(), Some("api@corp"))
        .await
        .unwrap();

    let state = state.lock().unwrap().clone();
    assert_eq!(state.owner_during_put.as_deref(), Some("u-api"));
    assert_eq!(state.owner, "u-owner");
    assert_eq!(state.shares, original_shares());

    let put = &fake.calls_to("PUT", &endpoints::dashboard_script(DASH))[0];
    assert_eq!(put.body, json!({"script": "widget.on('ready', () => {});"}));
}

#[tokio::test]
async fn test_mutation_failure_still_restores() {
    let (fake, state) = platform();
    fake.respond(
        "PUT",
        endpoints::dashboard_script(DASH),
        500,
        json!({"message": "script rejected"}),
    );
    let env = Environment::target(fake.clone());

    let err = Dashboards::new(&env)
        .add_dashboard_script(DASH, script(), Some("api@corp"))
        .await
        .unwrap_err();

    assert!(matches!(err, SisyncError::Api { status: 500, .. }));
    let state = state.lock().unwrap().clone();
    assert_eq!(state.owner, "u-owner");
    assert_eq!(state.shares, original_shares());
    assert_eq!(
        fake.calls_to("POST", &endpoints::dashboard_shares(DASH)).len(),
        1
    );
}

#[tokio::test]
async fn test_failed_ownership_change_still_attempts_restore() {
    let (fake, state) = platform();
    let s = state.clone();
    fake.on("POST", endpoints::dashboard_change_owner(DASH), move |body| {
        if body["ownerId"] == "u-api" {
            return Ok(RemoteResponse::new(403, json!({"message": "forbidden"})));
        }
        s.lock().unwrap().owner = body["ownerId"].as_str().unwrap().to_string();
        ok(json!({}))
    });
    let env = Environment::target(fake.clone());

    let err = Dashboards::new(&env)
        .add_dashboard_script(DASH, script(), Some("api@corp"))
        .await
        .unwrap_err();

    assert!(matches!(err, SisyncError::Unauthorized { status: 403, .. }));
    assert!(fake
        .calls_to("PUT", &endpoints::dashboard_script(DASH))
        .is_empty());
    let owner_calls = fake.calls_to("POST", &endpoints::dashboard_change_owner(DASH));
    assert_eq!(owner_calls.len(), 2);
    assert_eq!(owner_calls[1].body["ownerId"], "u-owner");
    assert_eq!(state.lock().unwrap().owner, "u-owner");
}

#[tokio::test]
async fn test_restore_failure_reports_inconsistent_state() {
    let (fake, state) = platform();
    fake.respond(
        "POST",
        endpoints::dashboard_shares(DASH),
        500,
        json!({"message": "share service down"}),
    );
    let env = Environment::target(fake.clone());

    let err = Dashboards::new(&env)
        .add_dashboard_script(DASH, script(), Some("api@corp"))
        .await
        .unwrap_err();

    match err {
        SisyncError::InconsistentState {
            entity_id,
            phase,
            message,
        } => {
            assert_eq!(entity_id, DASH);
            assert_eq!(phase, "restore");
            assert!(message.contains("owner=u-owner"));
            assert!(message.contains("g-sales"));
        }
        other => panic!("expected InconsistentState, got {other:?}"),
    }
    // Owner restore runs even though the share write failed.
    assert_eq!(state.lock().unwrap().owner, "u-owner");
}

#[tokio::test]
async fn test_capture_failure_mutates_nothing() {
    let fake = FakeRemote::new("bi");
    fake.respond("GET", endpoints::dashboard_by_id(DASH), 200, json!([]));
    let env = Environment::target(fake.clone());

    let err = Dashboards::new(&env)
        .add_dashboard_script(DASH, script(), Some("api@corp"))
        .await
        .unwrap_err();

    assert!(matches!(err, SisyncError::NotFound { .. }));
    assert!(fake.writes().is_empty());
}

#[tokio::test]
async fn test_unknown_acting_user_mutates_nothing() {
    let (fake, _) = platform();
    let env = Environment::target(fake.clone());

    let err = Dashboards::new(&env)
        .add_dashboard_script(DASH, script(), Some("ghost@corp"))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "user 'ghost@corp' not found");
    assert!(fake.writes().is_empty());
}

#[tokio::test]
async fn test_without_acting_user_no_swap_happens() {
    let (fake, state) = platform();
    let env = Environment::target(fake.clone());

    Dashboards::new(&env)
        .add_dashboard_script(DASH, script(), None)
        .await
        .unwrap();

    assert_eq!(
        state.lock().unwrap().owner_during_put.as_deref(),
        Some("u-owner")
    );
    assert_eq!(fake.writes().len(), 1);
}

#[tokio::test]
async fn test_malformed_payload_is_rejected_before_any_call() {
    let (fake, _) = platform();
    let env = Environment::target(fake.clone());

    let payload = ScriptPayload::structured_from_str(r#"{"code": "x"}"#).unwrap();
    let err = Dashboards::new(&env)
        .add_dashboard_script(DASH, payload, Some("api@corp"))
        .await
        .unwrap_err();

    assert!(matches!(err, SisyncError::Validation { .. }));
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn test_widget_script_goes_through_swap() {
    let (fake, state) = platform();
    let s = state.clone();
    fake.on("PUT", endpoints::widget_script(DASH, "w1"), move |_| {
        let mut state = s.lock().unwrap();
        state.owner_during_put = Some(state.owner.clone());
        ok(json!({}))
    });
    let env = Environment::target(fake.clone());

    Dashboards::new(&env)
        .add_widget_script(
            DASH,
            "w1",
            ScriptPayload::from_input(r#"{"script": "widget.style = {};"}"#).unwrap(),
            Some("api@corp"),
        )
        .await
        .unwrap();

    let state = state.lock().unwrap().clone();
    assert_eq!(state.owner_during_put.as_deref(), Some("u-api"));
    assert_eq!(state.owner, "u-owner");
}

#[tokio::test]
async fn test_irregular_share_rows_survive_the_swap_verbatim() {
    let (fake, state) = platform();
    let irregular = json!([
        {"shareId": "u-owner", "type": "user", "rule": "edit", "subscribe": null},
        {"shareId": "u-jane", "type": "User", "rule": "view", "subscribe": false},
        {"shareId": "g-sales", "type": "group", "rule": "view", "subscribe": true, "shareType": "guest"}
    ]);
    state.lock().unwrap().shares = irregular.clone();
    let env = Environment::target(fake.clone());

    Dashboards::new(&env)
        .add_dashboard_script(DASH, script(), Some("api@corp"))
        .await
        .unwrap();

    let state = state.lock().unwrap().clone();
    assert_eq!(state.owner, "u-owner");
    assert_eq!(state.shares, irregular);
}

#[tokio::test]
async fn test_unreadable_share_list_is_an_api_error_and_writes_nothing() {
    let (fake, _) = platform();
    fake.respond("GET", endpoints::dashboard_shares(DASH), 404, Value::Null);
    let env = Environment::target(fake.clone());

    let err = Dashboards::new(&env)
        .add_dashboard_script(DASH, script(), Some("api@corp"))
        .await
        .unwrap_err();

    match err {
        SisyncError::Api { status, message } => {
            assert_eq!(status, 404);
            assert!(message.contains("retrieve shares of dashboard d1"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert!(fake.writes().is_empty());
}

#[tokio::test]
async fn test_add_shares_keeps_existing_rows_and_appends_new_principals() {
    let (fake, state) = platform();
    let existing = json!([
        {"shareId": "u-api", "type": "User", "rule": "edit", "subscribe": null}
    ]);
    state.lock().unwrap().shares = existing.clone();
    fake.respond(
        "GET",
        endpoints::group_by_name("Finance"),
        200,
        json!([{"_id": "g-fin", "name": "Finance"}]),
    );
    let env = Environment::target(fake.clone());

    let added = Dashboards::new(&env)
        .add_dashboard_shares(DASH, &["api@corp".into()], &["Finance".into()], "view")
        .await
        .unwrap();

    assert_eq!(added, 1);
    let shares = state.lock().unwrap().shares.clone();
    assert_eq!(
        shares,
        json!([
            existing[0].clone(),
            {"shareId": "g-fin", "type": "group", "rule": "view", "subscribe": false}
        ])
    );
}

/// Serve and store the dashboard script alongside the ownership state.
fn with_dashboard_script(
    fake: &FakeRemote,
    state: &Arc<Mutex<DashboardState>>,
    initial: Option<&str>,
) -> Arc<Mutex<Option<String>>> {
    let stored = Arc::new(Mutex::new(initial.map(str::to_string)));
    let current = stored.clone();
    fake.on("GET", endpoints::dashboard_script(DASH), move |_| {
        let script = current.lock().unwrap().clone();
        ok(json!({"oid": DASH, "title": "Sales", "script": script}))
    });
    let (current, s) = (stored.clone(), state.clone());
    fake.on("PUT", endpoints::dashboard_script(DASH), move |body| {
        let mut state = s.lock().unwrap();
        state.owner_during_put = Some(state.owner.clone());
        *current.lock().unwrap() = body["script"].as_str().map(str::to_string);
        ok(json!({}))
    });
    stored
}

#[tokio::test]
async fn test_replace_dashboard_script_rewrites_every_match_under_swap() {
    let (fake, state) = platform();
    let stored = with_dashboard_script(
        &fake,
        &state,
        Some("const api = 'dev.example.com'; fetch(api + '/dev.example.com');"),
    );
    let env = Environment::target(fake.clone());

    let replaced = Dashboards::new(&env)
        .replace_dashboard_script(DASH, "dev.example.com", "bi.example.com", Some("api@corp"))
        .await
        .unwrap();

    assert_eq!(replaced, 2);
    assert_eq!(
        stored.lock().unwrap().as_deref(),
        Some("const api = 'bi.example.com'; fetch(api + '/bi.example.com');")
    );
    let state = state.lock().unwrap().clone();
    assert_eq!(state.owner_during_put.as_deref(), Some("u-api"));
    assert_eq!(state.owner, "u-owner");
    assert_eq!(state.shares, original_shares());
}

#[tokio::test]
async fn test_replace_without_match_changes_nothing() {
    let (fake, state) = platform();
    with_dashboard_script(&fake, &state, Some("widget.on('ready', () => {});"));
    let env = Environment::target(fake.clone());

    let err = Dashboards::new(&env)
        .replace_dashboard_script(DASH, "dev.example.com", "bi.example.com", Some("api@corp"))
        .await
        .unwrap_err();

    assert!(matches!(err, SisyncError::Validation { .. }));
    assert!(err.to_string().contains("does not occur"));
    assert!(fake.writes().is_empty());
}

#[tokio::test]
async fn test_update_needs_an_existing_script() {
    let (fake, state) = platform();
    let stored = with_dashboard_script(&fake, &state, None);
    let env = Environment::target(fake.clone());
    let dashboards = Dashboards::new(&env);

    let err = dashboards
        .update_dashboard_script(DASH, script(), Some("api@corp"))
        .await
        .unwrap_err();
    assert!(matches!(err, SisyncError::Validation { .. }));
    assert!(fake.writes().is_empty());

    *stored.lock().unwrap() = Some("old();".into());
    dashboards
        .update_dashboard_script(DASH, script(), Some("api@corp"))
        .await
        .unwrap();
    assert_eq!(
        dashboards.get_dashboard_script(DASH).await.unwrap().as_deref(),
        Some("widget.on('ready', () => {});")
    );
    assert_eq!(state.lock().unwrap().owner, "u-owner");
}

#[tokio::test]
async fn test_replace_widget_script_targets_the_widget() {
    let (fake, state) = platform();
    fake.respond(
        "GET",
        endpoints::widget_script(DASH, "w1"),
        200,
        json!({"oid": "w1", "script": "widget.title = 'Old';"}),
    );
    let s = state.clone();
    fake.on("PUT", endpoints::widget_script(DASH, "w1"), move |_| {
        let mut state = s.lock().unwrap();
        state.owner_during_put = Some(state.owner.clone());
        ok(json!({}))
    });
    let env = Environment::target(fake.clone());

    let replaced = Dashboards::new(&env)
        .replace_widget_script(DASH, "w1", "'Old'", "'New'", Some("api@corp"))
        .await
        .unwrap();

    assert_eq!(replaced, 1);
    let put = &fake.calls_to("PUT", &endpoints::widget_script(DASH, "w1"))[0];
    assert_eq!(put.body, json!({"script": "widget.title = 'New';"}));
    assert_eq!(state.lock().unwrap().owner_during_put.as_deref(), Some("u-api"));
}

#[tokio::test]
async fn test_dashboard_columns_from_widgets_and_filters() {
    let fake = FakeRemote::new("bi");
    fake.respond(
        "GET",
        endpoints::dashboard_export(DASH),
        200,
        json!({
            "oid": DASH,
            "title": "Sales",
            "widgets": [
                {"metadata": {"panels": [
                    {"name": "categories", "items": [
                        {"jaql": {"table": "Orders", "column": "Region", "dim": "[Orders.Region]"}}
                    ]},
                    {"name": "values", "items": [
                        {"jaql": {"formula": "SUM([a])", "context": {
                            "[a]": {"table": "Orders", "column": "Amount"}
                        }}}
                    ]}
                ]}},
                {"metadata": {"panels": [
                    {"name": "rows", "items": [
                        {"jaql": {"dim": "[Orders.Region]"}},
                        {"jaql": {"dim": "[Customers.Signup Date (Calendar)]", "level": "months"}}
                    ]}
                ]}}
            ],
            "filters": [
                {"jaql": {"table": "Customers", "column": "Country"}},
                {"levels": [{"dim": "[Geo.State]"}, {"dim": "[Geo.City]"}]}
            ]
        }),
    );
    let env = Environment::target(fake.clone());

    let columns = Dashboards::new(&env)
        .get_dashboard_columns(DASH)
        .await
        .unwrap();

    let names: Vec<String> = columns
        .iter()
        .map(|c| format!("{}.{}", c.table, c.column))
        .collect();
    assert_eq!(
        names,
        vec![
            "Customers.Country",
            "Customers.Signup Date",
            "Geo.City",
            "Geo.State",
            "Orders.Amount",
            "Orders.Region"
        ]
    );
}

#[tokio::test]
async fn test_dashboard_columns_of_missing_dashboard() {
    let fake = FakeRemote::new("bi");
    let env = Environment::target(fake.clone());

    let err = Dashboards::new(&env)
        .get_dashboard_columns("nope")
        .await
        .unwrap_err();

    assert!(matches!(err, SisyncError::NotFound { .. }));
}
