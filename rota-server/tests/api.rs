use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
    response::Response,
};
use serde_json::{Value, json};
use tower::ServiceExt;

use rota_core::store::DIRECTORY_KEY;
use rota_core::{AllocationEngine, Directory, EngineConfig, EngineStores, SystemClock};
use rota_model::{OwnerGroup, RequesterId};
use rota_server::{
    AppState, create_app,
    infra::config::{AuthConfig, Config},
    transport::LogNotifier,
};

const TOKEN: &str = "front-end-secret";

async fn app_with(owners: Vec<OwnerGroup>, admins: Vec<i64>) -> Router {
    build_app(owners, admins, AuthConfig::with_token(TOKEN)).await
}

async fn build_app(owners: Vec<OwnerGroup>, admins: Vec<i64>, auth: AuthConfig) -> Router {
    let mut engine_config = EngineConfig::default();
    engine_config.quota.window_limit_per_requester = None;

    let stores = EngineStores::in_memory();
    let directory = Directory::new(owners).encode().unwrap();
    stores.blobs.save_blob(DIRECTORY_KEY, &directory).await.unwrap();

    let notifier = Arc::new(LogNotifier);
    let engine = AllocationEngine::load(
        stores,
        notifier.clone(),
        Arc::new(SystemClock),
        engine_config.clone(),
    )
    .await
    .unwrap();

    let mut config = Config::default();
    config.engine = engine_config;
    config.commands.admins = admins.into_iter().map(RequesterId).collect();
    config.auth = auth;

    create_app(AppState::new(engine, notifier, config))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {TOKEN}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_authed(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn owners() -> Vec<OwnerGroup> {
    vec![
        OwnerGroup::new("anna").with_aliases(["anna-1"]).with_numbers(["100"]),
        OwnerGroup::new("boris").with_aliases(["boris-1"]).with_numbers(["200"]),
    ]
}

#[tokio::test]
async fn health_is_public() {
    let app = app_with(vec![], vec![]).await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn allocation_rotates_between_owners() {
    let app = app_with(owners(), vec![]).await;

    let first = app
        .clone()
        .oneshot(post_json("/api/v1/allocate/alias", json!({"requester_id": 1, "chat_id": 10})))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(json_body(first).await["owner"], "anna");

    let second = app
        .oneshot(post_json("/api/v1/allocate/alias", json!({"requester_id": 2, "chat_id": 10})))
        .await
        .unwrap();
    assert_eq!(json_body(second).await["value"], "boris-1");
}

#[tokio::test]
async fn exhausted_pool_is_a_conflict() {
    let app = app_with(vec![], vec![]).await;
    let response = app
        .oneshot(post_json("/api/v1/allocate/number", json!({"requester_id": 1, "chat_id": 10})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_kind_is_a_bad_request() {
    let app = app_with(owners(), vec![]).await;
    let response = app
        .oneshot(post_json("/api/v1/allocate/fax", json!({"requester_id": 1, "chat_id": 10})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn banned_requesters_are_refused_with_a_reason() {
    let app = app_with(owners(), vec![]).await;
    let ban = app
        .clone()
        .oneshot(post_json("/api/v1/bans/5", json!({})))
        .await
        .unwrap();
    assert_eq!(ban.status(), StatusCode::OK);

    let response = app
        .oneshot(post_json("/api/v1/allocate/alias", json!({"requester_id": 5, "chat_id": 10})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["error"]["reason"], "permanently_banned");
}

#[tokio::test]
async fn clearing_an_unknown_value_is_not_found() {
    let app = app_with(owners(), vec![]).await;
    let response = app
        .oneshot(post_json(
            "/api/v1/obligations/clear",
            json!({"requester_id": 1, "kind": "number", "value": "999"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn directory_edits_rebuild_the_pools() {
    let app = app_with(owners(), vec![]).await;
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/directory/edits",
            json!({"op": "set_owner_disabled", "name": "anna", "disabled": true}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["alias_owners"], 1);

    let duplicate = app
        .oneshot(post_json(
            "/api/v1/directory/edits",
            json!({"op": "add_owner", "name": "@Boris"}),
        ))
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn priority_routes_validate_owner_and_count() {
    let app = app_with(owners(), vec![]).await;
    let put = |uri: &str, body: Value| {
        Request::builder()
            .method("PUT")
            .uri(uri)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {TOKEN}"))
            .body(Body::from(body.to_string()))
            .unwrap()
    };

    let ok = app
        .clone()
        .oneshot(put("/api/v1/priority/boris", json!({"remaining": 2})))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::NO_CONTENT);

    let zero = app
        .clone()
        .oneshot(put("/api/v1/priority/boris", json!({"remaining": 0})))
        .await
        .unwrap();
    assert_eq!(zero.status(), StatusCode::BAD_REQUEST);

    let unknown = app
        .clone()
        .oneshot(put("/api/v1/priority/zed", json!({"remaining": 1})))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let removed = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/v1/priority/boris")
                .header("authorization", format!("Bearer {TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(json_body(removed).await["remaining"], 2);
}

#[tokio::test]
async fn chat_commands_run_through_the_grammar() {
    let app = app_with(owners(), vec![99]).await;
    let command = |text: &str, requester: i64| {
        post_json(
            "/api/v1/command",
            json!({"text": text, "requester_id": requester, "chat_id": 10}),
        )
    };

    let reply = json_body(app.clone().oneshot(command("next alias", 1)).await.unwrap()).await;
    assert_eq!(reply["matched"], true);
    assert_eq!(reply["reply"], "Your alias: anna-1");

    let denied = json_body(app.clone().oneshot(command("disable boris", 1)).await.unwrap()).await;
    assert_eq!(denied["reply"], "This command is for admins only.");

    let fuzzy = json_body(app.clone().oneshot(command("disable bors", 99)).await.unwrap()).await;
    assert_eq!(fuzzy["reply"], "boris disabled.");

    let unmatched = json_body(app.oneshot(command("hello there", 1)).await.unwrap()).await;
    assert_eq!(unmatched["matched"], false);
}

#[tokio::test]
async fn admin_routes_need_the_bearer_token() {
    let app = app_with(owners(), vec![99]).await;

    let anonymous = app
        .clone()
        .oneshot(Request::builder().uri("/api/v1/bans").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let wrong = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/command")
                .header("content-type", "application/json")
                .header("authorization", "Bearer guess")
                .body(Body::from(
                    json!({"text": "disable boris", "requester_id": 99, "chat_id": 10})
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let authed = app.oneshot(get_authed("/api/v1/bans")).await.unwrap();
    assert_eq!(authed.status(), StatusCode::OK);
}

#[tokio::test]
async fn without_a_token_only_requester_routes_are_open() {
    let app = build_app(owners(), vec![99], AuthConfig::default()).await;

    let allocate = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/allocate/alias")
                .header("content-type", "application/json")
                .body(Body::from(json!({"requester_id": 1, "chat_id": 10}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(allocate.status(), StatusCode::OK);

    // Claiming to be an admin in the body is not enough.
    let command = app
        .oneshot(post_json(
            "/api/v1/command",
            json!({"text": "disable boris", "requester_id": 99, "chat_id": 10}),
        ))
        .await
        .unwrap();
    assert_eq!(command.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn configured_token_also_guards_allocation() {
    let app = app_with(owners(), vec![]).await;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/allocate/alias")
                .header("content-type", "application/json")
                .body(Body::from(json!({"requester_id": 1, "chat_id": 10}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn owner_lookup_and_requester_activity() {
    let app = app_with(owners(), vec![]).await;

    let found = app
        .clone()
        .oneshot(get_authed("/api/v1/owners/lookup?value=%40BORIS-1"))
        .await
        .unwrap();
    assert_eq!(found.status(), StatusCode::OK);
    let body = json_body(found).await;
    assert_eq!(body["owner"], "boris");
    assert_eq!(body["kind"], "alias");

    let missing = app
        .clone()
        .oneshot(get_authed("/api/v1/owners/lookup?value=999"))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    app.clone()
        .oneshot(post_json("/api/v1/allocate/number", json!({"requester_id": 7, "chat_id": 10})))
        .await
        .unwrap();
    let activity = json_body(
        app.clone()
            .oneshot(get_authed("/api/v1/requesters/7/activity"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(activity["numbers"], 1);
    assert_eq!(activity["aliases"], 0);

    let command = |text: &str| {
        post_json(
            "/api/v1/command",
            json!({"text": text, "requester_id": 7, "chat_id": 10}),
        )
    };
    let who = json_body(app.clone().oneshot(command("who 200")).await.unwrap()).await;
    assert_eq!(who["reply"], "number 200 belongs to boris.");
    let mine = json_body(app.oneshot(command("my stats")).await.unwrap()).await;
    assert!(mine["reply"].as_str().unwrap().contains("1 number requests"));
}
