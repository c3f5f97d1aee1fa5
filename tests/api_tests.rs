use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tower::ServiceExt;
use uibutler::{
    config::{AuthConfig, BillingConfig, Config, DatabaseConfig, QueueConfig, ServerConfig},
    database,
    execution::WorkerHandle,
    server::{build_state, create_router},
    tasks::{TaskContext, TaskHandler, TaskOutcome},
    TaskRegistry, TaskType,
};

/// Stands in for the browser runtime: pages are JSON documents titled by their URL
struct FakeBrowser;

#[async_trait]
impl TaskHandler for FakeBrowser {
    async fn run(&self, ctx: TaskContext) -> anyhow::Result<TaskOutcome> {
        let url = match ctx.task_type {
            TaskType::LaunchBrowser => ctx.input_str("Website Url")?,
            _ => ctx.inputs.get("Web page").and_then(|page| page["url"].as_str()).unwrap_or_default().to_string(),
        };
        Ok(TaskOutcome::Completed(HashMap::from([
            ("Web page".to_string(), json!({ "url": url })),
            ("Html".to_string(), json!(json!({ "title": url }).to_string())),
        ])))
    }
}

fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        },
        auth: AuthConfig {
            access_token_secret: "test-access".to_string(),
            access_token_ttl_secs: 900,
            refresh_token_secret: "test-refresh".to_string(),
            refresh_token_ttl_secs: 3600,
            secure_cookies: false,
            password_rounds: 1_000,
        },
        queue: QueueConfig {
            concurrency: 2,
            capacity: 16,
        },
        billing: BillingConfig { initial_credits: 100 },
    }
}

/// Helper to build a fresh application on a private in-memory database
async fn test_app() -> (Router, WorkerHandle) {
    let pool = database::connect_in_memory().await.expect("in-memory database");
    let tasks = Arc::new(TaskRegistry::with_builtin_handlers(reqwest::Client::new()));
    tasks.register_handler(TaskType::LaunchBrowser, Arc::new(FakeBrowser));
    tasks.register_handler(TaskType::PageToHtml, Arc::new(FakeBrowser));

    let (state, workers) = build_state(test_config(), pool, tasks).await.expect("state");
    (create_router(state), workers)
}

struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

async fn send(app: &Router, method: Method, uri: &str, cookies: Option<&str>, body: Option<Value>) -> Response {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(cookies) = cookies {
        request = request.header(header::COOKIE, cookies);
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };

    Response { status, headers, body }
}

/// `Cookie` header value echoing every cookie the response set
fn cookies_from(headers: &HeaderMap) -> String {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

async fn register(app: &Router, email: &str) -> String {
    let response = send(
        app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "email": email, "name": "Tester", "password": "correct horse" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    cookies_from(&response.headers)
}

async fn create_workflow(app: &Router, cookies: &str, name: &str, definition: Value) -> String {
    let response = send(app, Method::POST, "/workflows", Some(cookies), Some(json!({ "name": name }))).await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    let id = response.body["id"].as_str().unwrap().to_string();

    let response = send(
        app,
        Method::PUT,
        &format!("/workflows/{id}"),
        Some(cookies),
        Some(json!({ "definition": definition })),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    id
}

/// launch -> html -> read "title", optionally followed by an approval gate
fn scrape_definition(with_gate: bool) -> Value {
    let mut nodes = vec![
        json!({ "id": "launch", "type": "LAUNCH_BROWSER", "inputs": { "Website Url": "https://butler.dev" } }),
        json!({ "id": "html", "type": "PAGE_TO_HTML", "inputs": {} }),
        json!({ "id": "title", "type": "READ_PROPERTY_FROM_JSON", "inputs": { "Property name": "title" } }),
    ];
    let mut edges = vec![
        json!({ "source": "launch", "sourceHandle": "Web page", "target": "html", "targetHandle": "Web page" }),
        json!({ "source": "html", "sourceHandle": "Html", "target": "title", "targetHandle": "JSON" }),
    ];
    if with_gate {
        nodes.push(json!({ "id": "gate", "type": "APPROVAL_GATE", "inputs": { "Message": "Check the title" } }));
        edges.push(json!({ "source": "title", "sourceHandle": "Property value", "target": "gate", "targetHandle": "Message" }));
    }
    json!({ "nodes": nodes, "edges": edges })
}

/// Poll an execution until it reaches `expected`
async fn wait_for_status(app: &Router, cookies: &str, execution_id: &str, expected: &str) -> Value {
    let mut last = Value::Null;
    for _ in 0..100 {
        let response = send(app, Method::GET, &format!("/executions/{execution_id}"), Some(cookies), None).await;
        assert_eq!(response.status, StatusCode::OK);
        if response.body["status"] == expected {
            return response.body;
        }
        last = response.body;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("execution never reached {expected}: {last}");
}

async fn run(app: &Router, cookies: &str, workflow_id: &str) -> String {
    let response = send(app, Method::POST, &format!("/workflows/{workflow_id}/run"), Some(cookies), None).await;
    assert_eq!(response.status, StatusCode::ACCEPTED, "{}", response.body);
    response.body["execution_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_check_is_public() {
    let (app, _workers) = test_app().await;
    let response = send(&app, Method::GET, "/healthz", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!("ok"));
}

#[tokio::test]
async fn protected_routes_reject_anonymous_requests() {
    let (app, _workers) = test_app().await;

    let response = send(&app, Method::GET, "/workflows", None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["statusCode"], 401);
    assert_eq!(response.body["error"], "UNAUTHENTICATED");

    let response = send(&app, Method::GET, "/users/me", Some("Authentication=garbage"), None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_sets_cookies_and_opens_a_balance() {
    let (app, _workers) = test_app().await;

    let response = send(
        &app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "email": "Ada@Example.com", "name": "Ada", "password": "correct horse" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["email"], "ada@example.com");
    assert!(response.body.get("password_hash").is_none());

    let set_cookies: Vec<&str> = response
        .headers
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap())
        .collect();
    assert_eq!(set_cookies.len(), 2);
    assert!(set_cookies.iter().any(|c| c.starts_with("Authentication=") && c.contains("HttpOnly")));
    assert!(set_cookies.iter().any(|c| c.starts_with("Refresh=")));

    let cookies = cookies_from(&response.headers);
    let me = send(&app, Method::GET, "/users/me", Some(&cookies), None).await;
    assert_eq!(me.body["name"], "Ada");

    let credits = send(&app, Method::GET, "/billing/credits", Some(&cookies), None).await;
    assert_eq!(credits.body, json!({ "credits": 100 }));

    let duplicate = send(
        &app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "email": "ada@example.com", "name": "Ada", "password": "another one" })),
    )
    .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
    assert_eq!(duplicate.body["error"], "ALREADY_EXISTS");
}

#[tokio::test]
async fn login_refresh_and_logout() {
    let (app, _workers) = test_app().await;
    register(&app, "bob@example.com").await;

    let wrong = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "bob@example.com", "password": "wrong password" })),
    )
    .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    let login = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "bob@example.com", "password": "correct horse" })),
    )
    .await;
    assert_eq!(login.status, StatusCode::OK);
    let cookies = cookies_from(&login.headers);

    let padded = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": " BOB@Example.com ", "password": "correct horse" })),
    )
    .await;
    assert_eq!(padded.status, StatusCode::OK, "{}", padded.body);
    assert_eq!(padded.body["email"], "bob@example.com");

    let refreshed = send(&app, Method::POST, "/auth/refresh", Some(&cookies), None).await;
    assert_eq!(refreshed.status, StatusCode::OK);
    let cookies = cookies_from(&refreshed.headers);

    let logout = send(&app, Method::POST, "/auth/logout", Some(&cookies), None).await;
    assert_eq!(logout.status, StatusCode::NO_CONTENT);
    assert!(cookies_from(&logout.headers).contains("Authentication="));

    // The stored refresh digest is gone, so the old refresh cookie is revoked
    let revoked = send(&app, Method::POST, "/auth/refresh", Some(&cookies), None).await;
    assert_eq!(revoked.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn published_workflow_runs_to_completion_and_charges_credits() {
    let (app, workers) = test_app().await;
    let cookies = register(&app, "carol@example.com").await;
    let id = create_workflow(&app, &cookies, "scraper", scrape_definition(false)).await;

    let cost = send(&app, Method::GET, &format!("/workflows/{id}/cost"), Some(&cookies), None).await;
    assert_eq!(cost.body, json!({ "credits": 8 }));

    let published = send(&app, Method::POST, &format!("/workflows/{id}/publish"), Some(&cookies), None).await;
    assert_eq!(published.status, StatusCode::OK);
    assert_eq!(published.body["status"], "PUBLISHED");
    assert_eq!(published.body["credits_cost"], 8);
    assert_eq!(published.body["execution_plan"].as_array().unwrap().len(), 3);

    let edit = send(
        &app,
        Method::PUT,
        &format!("/workflows/{id}"),
        Some(&cookies),
        Some(json!({ "definition": scrape_definition(true) })),
    )
    .await;
    assert_eq!(edit.status, StatusCode::BAD_REQUEST);
    assert_eq!(edit.body["error"], "FAILED_PRECONDITION");

    let execution_id = run(&app, &cookies, &id).await;
    let execution = wait_for_status(&app, &cookies, &execution_id, "COMPLETED").await;
    assert_eq!(execution["credits_consumed"], 8);
    let phases = execution["phases"].as_array().unwrap();
    assert_eq!(phases.len(), 3);
    assert_eq!(phases[2]["outputs"]["Property value"], "https://butler.dev");

    let credits = send(&app, Method::GET, "/billing/credits", Some(&cookies), None).await;
    assert_eq!(credits.body["credits"], 92);

    // The last-run summary is written just after the execution row; let the worker finish
    workers.shutdown().await;
    let workflows = send(&app, Method::GET, "/workflows", Some(&cookies), None).await;
    assert_eq!(workflows.body[0]["last_run_status"], "COMPLETED");

    let executions = send(&app, Method::GET, &format!("/workflows/{id}/executions"), Some(&cookies), None).await;
    assert_eq!(executions.body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_definitions_are_rejected_on_publish() {
    let (app, _workers) = test_app().await;
    let cookies = register(&app, "dave@example.com").await;

    let no_entry = create_workflow(
        &app,
        &cookies,
        "no entry",
        json!({ "nodes": [{ "id": "a", "type": "PAGE_TO_HTML", "inputs": {} }], "edges": [] }),
    )
    .await;
    let response = send(&app, Method::POST, &format!("/workflows/{no_entry}/publish"), Some(&cookies), None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "INVALID_ARGUMENT");

    let missing_inputs = create_workflow(
        &app,
        &cookies,
        "missing inputs",
        json!({ "nodes": [{ "id": "launch", "type": "LAUNCH_BROWSER", "inputs": {} }], "edges": [] }),
    )
    .await;
    let response = send(&app, Method::POST, &format!("/workflows/{missing_inputs}/publish"), Some(&cookies), None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["invalidInputs"][0]["node_id"], "launch");

    let unknown_task = send(
        &app,
        Method::PUT,
        &format!("/workflows/{no_entry}"),
        Some(&cookies),
        Some(json!({ "definition": { "nodes": [{ "id": "x", "type": "TELEPORT", "inputs": {} }], "edges": [] } })),
    )
    .await;
    assert!(unknown_task.status.is_client_error());
}

#[tokio::test]
async fn runs_beyond_the_balance_are_refused() {
    let (app, _workers) = test_app().await;
    let cookies = register(&app, "erin@example.com").await;

    let nodes: Vec<Value> = (0..21)
        .map(|i| json!({ "id": format!("launch-{i}"), "type": "LAUNCH_BROWSER", "inputs": { "Website Url": "https://a.b" } }))
        .collect();
    let id = create_workflow(&app, &cookies, "expensive", json!({ "nodes": nodes, "edges": [] })).await;

    let response = send(&app, Method::POST, &format!("/workflows/{id}/run"), Some(&cookies), None).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.body["error"], "RESOURCE_EXHAUSTED");

    let purchase = send(&app, Method::POST, "/billing/purchase", Some(&cookies), Some(json!({ "bundle": "SMALL" }))).await;
    assert_eq!(purchase.status, StatusCode::CREATED);
    assert_eq!(purchase.body["credits"], 1_100);

    let execution_id = run(&app, &cookies, &id).await;
    wait_for_status(&app, &cookies, &execution_id, "COMPLETED").await;

    let credits = send(&app, Method::GET, "/billing/credits", Some(&cookies), None).await;
    assert_eq!(credits.body["credits"], 1_100 - 105);

    let purchases = send(&app, Method::GET, "/billing/purchases", Some(&cookies), None).await;
    assert_eq!(purchases.body[0]["bundle"], "SMALL");
}

#[tokio::test]
async fn approval_gate_waits_for_approve() {
    let (app, _workers) = test_app().await;
    let cookies = register(&app, "frank@example.com").await;
    let id = create_workflow(&app, &cookies, "gated", scrape_definition(true)).await;

    let execution_id = run(&app, &cookies, &id).await;
    wait_for_status(&app, &cookies, &execution_id, "WAITING_FOR_APPROVAL").await;

    let approved = send(&app, Method::POST, &format!("/executions/{execution_id}/approve"), Some(&cookies), None).await;
    assert_eq!(approved.status, StatusCode::OK);
    assert_eq!(approved.body["status"], "PENDING");

    let execution = wait_for_status(&app, &cookies, &execution_id, "COMPLETED").await;
    assert_eq!(execution["credits_consumed"], 8);

    // Finished executions can be neither paused nor approved again
    let pause = send(&app, Method::POST, &format!("/executions/{execution_id}/pause"), Some(&cookies), None).await;
    assert_eq!(pause.status, StatusCode::BAD_REQUEST);
    assert_eq!(pause.body["error"], "FAILED_PRECONDITION");
    let approve = send(&app, Method::POST, &format!("/executions/{execution_id}/approve"), Some(&cookies), None).await;
    assert_eq!(approve.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn users_cannot_see_each_others_workflows() {
    let (app, _workers) = test_app().await;
    let owner = register(&app, "grace@example.com").await;
    let other = register(&app, "heidi@example.com").await;
    let id = create_workflow(&app, &owner, "private", scrape_definition(false)).await;

    let response = send(&app, Method::GET, &format!("/workflows/{id}"), Some(&other), None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["statusCode"], 404);

    let response = send(&app, Method::DELETE, &format!("/workflows/{id}"), Some(&owner), None).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn analytics_report_the_current_month() {
    let (app, _workers) = test_app().await;
    let cookies = register(&app, "ivan@example.com").await;
    let id = create_workflow(&app, &cookies, "stats", scrape_definition(false)).await;

    let periods = send(&app, Method::GET, "/analytics/periods", Some(&cookies), None).await;
    assert_eq!(periods.body, json!([]));

    let execution_id = run(&app, &cookies, &id).await;
    wait_for_status(&app, &cookies, &execution_id, "COMPLETED").await;

    let stats = send(&app, Method::GET, "/analytics/stats", Some(&cookies), None).await;
    assert_eq!(
        stats.body,
        json!({ "workflow_executions": 1, "phase_executions": 3, "credits_consumed": 8 })
    );

    let periods = send(&app, Method::GET, "/analytics/periods", Some(&cookies), None).await;
    assert_eq!(periods.body.as_array().unwrap().len(), 1);

    let bad = send(&app, Method::GET, "/analytics/stats?year=2024&month=13", Some(&cookies), None).await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);

    let far = send(&app, Method::GET, "/analytics/stats?year=2147483647&month=12", Some(&cookies), None).await;
    assert_eq!(far.status, StatusCode::BAD_REQUEST);
    assert_eq!(far.body["error"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn task_catalogue_lists_every_task() {
    let (app, _workers) = test_app().await;
    let response = send(&app, Method::GET, "/tasks", None, None).await;
    let tasks = response.body.as_array().unwrap();
    assert_eq!(tasks.len(), 13);

    let launch = tasks.iter().find(|t| t["type"] == "LAUNCH_BROWSER").unwrap();
    assert_eq!(launch["credits"], 5);
    assert_eq!(launch["runnable"], true);

    let ai = tasks.iter().find(|t| t["type"] == "EXTRACT_DATA_WITH_AI").unwrap();
    assert_eq!(ai["runnable"], false);
}
