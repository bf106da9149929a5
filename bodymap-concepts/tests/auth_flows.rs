//! End-to-end tests for the bundled authentication syncs

use bodymap_concepts::{auth_syncs, App, Served};
use bodymap_types::{record, Record};
use serde_json::json;
use tock::{EngineConfig, SyncId};

fn app() -> App {
    App::with_auth_syncs(EngineConfig::default()).unwrap()
}

fn fired(served: &Served) -> Vec<String> {
    served
        .report
        .fired_syncs()
        .into_iter()
        .map(SyncId::to_string)
        .collect()
}

fn response(served: &Served) -> &Record {
    served.response.as_ref().expect("request was answered")
}

async fn register(app: &App, username: &str, password: &str) -> Served {
    app.request(record([
        ("path", json!("/auth/register")),
        ("username", json!(username)),
        ("password", json!(password)),
    ]))
    .await
    .unwrap()
}

async fn login(app: &App, username: &str, password: &str) -> Served {
    app.request(record([
        ("path", json!("/auth/login")),
        ("username", json!(username)),
        ("password", json!(password)),
    ]))
    .await
    .unwrap()
}

async fn with_session(app: &App, path: &str, session: &serde_json::Value) -> Served {
    app.request(record([("path", json!(path)), ("session", session.clone())]))
        .await
        .unwrap()
}

#[test]
fn test_bundled_table_parses() {
    let table = auth_syncs().unwrap();
    assert_eq!(table.len(), 12);
}

#[tokio::test]
async fn test_register_success_and_error() {
    let app = app();

    let ok = register(&app, "a", "b").await;
    assert_eq!(ok.request, "r1");
    assert_eq!(ok.report.len(), 3);
    assert_eq!(response(&ok)["user"], json!("u1"));
    assert_eq!(fired(&ok), vec!["Register", "RegisterResponse"]);

    let taken = register(&app, "a", "c").await;
    assert_eq!(taken.report.len(), 3);
    assert_eq!(response(&taken)["error"], json!("username taken"));
    assert_eq!(fired(&taken), vec!["Register", "RegisterErrorResponse"]);
}

#[tokio::test]
async fn test_login_whoami_logout() {
    let app = app();
    register(&app, "alice", "pw").await;

    let logged_in = login(&app, "alice", "pw").await;
    assert_eq!(
        fired(&logged_in),
        vec!["Login", "LoginStartSession", "LoginResponse"]
    );
    let session = response(&logged_in)["session"].clone();
    assert_eq!(response(&logged_in)["user"], json!("u1"));

    let me = with_session(&app, "/auth/whoami", &session).await;
    assert_eq!(response(&me)["username"], json!("alice"));
    assert_eq!(fired(&me), vec!["WhoAmIResponse"]);

    let out = with_session(&app, "/auth/logout", &session).await;
    assert_eq!(response(&out)["status"], json!("logged out"));

    let again = with_session(&app, "/auth/logout", &session).await;
    assert_eq!(response(&again)["error"], json!("session already ended"));

    let anon = with_session(&app, "/auth/whoami", &session).await;
    assert_eq!(response(&anon)["error"], json!("not logged in"));
    assert_eq!(fired(&anon), vec!["WhoAmIErrorResponse"]);
}

#[tokio::test]
async fn test_login_with_wrong_password() {
    let app = app();
    register(&app, "alice", "pw").await;

    let denied = login(&app, "alice", "nope").await;
    assert_eq!(fired(&denied), vec!["Login", "LoginErrorResponse"]);
    assert_eq!(
        response(&denied)["error"],
        json!("invalid username or password")
    );
}

#[tokio::test]
async fn test_whoami_with_unknown_session() {
    let app = app();
    let anon = with_session(&app, "/auth/whoami", &json!("s42")).await;
    assert_eq!(response(&anon)["error"], json!("not logged in"));
}

#[tokio::test]
async fn test_unrouted_request_gets_no_response() {
    let app = app();
    let served = app
        .request(record([("path", json!("/maps/new"))]))
        .await
        .unwrap();
    assert!(served.response.is_none());
    assert_eq!(app.requesting.pending(), vec![served.request]);
}

#[tokio::test]
async fn test_trace_shows_cascade() {
    let app = app();
    register(&app, "alice", "pw").await;
    let served = login(&app, "alice", "pw").await;

    let trace = served.report.render_trace();
    assert!(trace.contains("LoginStartSession"));
    assert!(trace.contains("Sessioning.start"));
    assert!(trace.contains("Requesting.respond"));
}
