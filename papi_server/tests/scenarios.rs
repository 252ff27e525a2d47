//! Black-box HTTP scenarios S1-S6 from spec.md §8, driven through the real
//! actix `App` (the same `routes::configure` wiring `main.rs` uses) against
//! a `Server` backed by `mockito` stand-ins for the Scheduler, Registry and
//! catalog git host.

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use actix_web::{http::StatusCode, test, web, App};
use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use papi_definitions::{Config, LlmCatalog};
use papi_server::auth::{Claims, ClaimsVerifier};
use papi_server::state::Server;
use papi_server::templates::TemplateStore;

/// Hands back a fixed `Claims` for whatever bearer token names it, so tests
/// don't need a real JWKS endpoint to exercise the route layer.
struct TestVerifier(BTreeMap<String, Claims>);

#[async_trait]
impl ClaimsVerifier for TestVerifier {
    async fn verify(&self, bearer_token: &str) -> papi_definitions::Result<Claims> {
        self.0
            .get(bearer_token)
            .cloned()
            .ok_or_else(|| papi_definitions::ErrorKind::AuthFailed("no such test token".into()).into())
    }
}

fn claims(subject: &str, email: &str) -> Claims {
    Claims {
        subject: subject.to_string(),
        email: email.to_string(),
        name: subject.to_string(),
        vos: vec!["vo.a".to_string()],
        entitlements: vec![],
    }
}

fn test_verifier() -> Arc<dyn ClaimsVerifier> {
    let mut m = BTreeMap::new();
    m.insert("alice-token".to_string(), claims("alice", "alice@x.example"));
    m.insert("bob-token".to_string(), claims("bob", "bob@x.example"));
    Arc::new(TestVerifier(m))
}

/// A config wired so every outbound HTTP collaborator (Scheduler, Registry,
/// Secret Store, LLM gateway, catalog git host) points at the same mockito
/// server; tests register only the mocks the scenario actually exercises.
fn test_config(addr: &str) -> Config {
    let yaml = format!(
        r#"
self:
  domain: deploy.example
auth:
  OP: ["https://issuer.example"]
  VO: ["vo.a"]
  CORS_origins: []
vo:
  vo.a:
    namespace: vo-a
    domain: a.deploy.example
    inference_endpoint: "{addr}"
    mlflow_uri: "{addr}"
    secret_root: "secret/papi"
catalog_sources:
  - kind: module
    git_url: "{addr}"
    branch: main
  - kind: try-me
    git_url: "{addr}"
    branch: main
image_allow_list:
  prefixes: ["allowed/"]
caps:
  gpu_per_user: 1
  default_per_user: {{ cpu: 8, gpu: 1, ram_mb: 16000, disk_mb: 20000, deployments: 5 }}
  default_per_vo: {{ cpu: 64, gpu: 8, ram_mb: 256000, disk_mb: 500000, deployments: 50 }}
  tryme_per_user: 1
  tryme_per_vo: 20
  tryme_max_seconds: 600
  snapshot_quota_bytes: 16106127360
  snapshot_max_container_bytes: 10737418240
backends:
  scheduler_addr: "{addr}"
  registry_addr: "{addr}"
  secret_store_addr: "{addr}"
  llm_gateway_addr: "{addr}"
stats_history_path: /tmp/papi-scenarios-stats
templates_path: /tmp/papi-scenarios-templates
"#,
        addr = addr
    );
    Config::from_template_str(&yaml).expect("test config parses and validates")
}

/// Writes a template per `WorkloadKind` plus the snapshot batch template to
/// a fresh scratch directory and loads them, the same way `main.rs` does at
/// startup against the configured `templates_path`.
fn test_templates() -> TemplateStore {
    let dir = std::env::temp_dir().join(format!("papi-scenarios-{}", Uuid::new_v4()));
    fs::create_dir_all(&dir).unwrap();
    let job_body = r#"{"job_uuid":"${JOB_UUID}","owner":"${OWNER}","title":"${TITLE}","docker_image":"${DOCKER_IMAGE}"}"#;
    for kind in ["module", "tool", "try-me", "batch-inference", "snapshot", "function-service"] {
        fs::write(dir.join(format!("{}.tmpl", kind)), job_body).unwrap();
    }
    fs::write(dir.join("snapshot_batch.tmpl"), r#"{"source":"${SOURCE_JOB_ID}"}"#).unwrap();
    TemplateStore::load(&dir).expect("scratch templates load")
}

/// Registers the minimal catalog index + metadata documents `GitCatalog`
/// needs to resolve `demo-app` under both the `module` and `try-me`
/// catalog sources configured in `test_config` (spec.md §4.1).
async fn mock_catalog(server: &mut mockito::ServerGuard) {
    let addr = server.url();
    server
        .mock("GET", "/raw/main/index")
        .with_status(200)
        .with_body(format!("demo-app {}/catalog/demo-app", addr))
        .create_async()
        .await;
    server
        .mock("GET", "/catalog/demo-app/raw/main/metadata.json")
        .with_status(200)
        .with_body(
            r#"{"title":"Demo App","docker_image":"allowed/demo-app","docker_tags":["latest"],"schema_version":1}"#,
        )
        .create_async()
        .await;
}

fn module_body(title: &str) -> serde_json::Value {
    json!({
        "vo": "vo.a",
        "name": "demo-app",
        "general": {
            "title": title,
            "docker_image": "allowed/demo-app",
            "docker_tag": "latest",
            "service": "jupyter",
            "jupyter_password": "password1",
        },
        "hardware": { "cpu_num": 4, "gpu_num": 0, "ram": 8000, "disk": 10000 },
    })
}

#[actix_web::test]
async fn s1_successful_module_deployment() {
    let mut sched = mockito::Server::new_async().await;
    mock_catalog(&mut sched).await;
    sched
        .mock("GET", mockito::Matcher::Regex("^/v1/jobs\\?".into()))
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;
    sched
        .mock("POST", "/v1/jobs")
        .with_status(200)
        .with_body(r#"{"job_id":"sched-job-1"}"#)
        .create_async()
        .await;
    sched
        .mock("GET", mockito::Matcher::Regex(r"^/v1/jobs/[0-9a-f-]+$".into()))
        .with_status(200)
        .with_body(
            r#"{"job_id":"x","owner":"alice","namespace":"vo-a","state":"running",
                "has_allocation":true,"allocation_placing":false,"user_initiated_stop":false,
                "placement_failed":false,"resources":{"cpu":4,"ram_mb":8000,"disk_mb":10000,"gpu":0},
                "allocations":[{"task_name":"main","node_id":"n1","healthy":true,
                "exit_code":null,"failure_message":null}],"node_id":"n1",
                "kind":"module","workload_name":"demo-app"}"#,
        )
        .create_async()
        .await;

    let addr = sched.url();
    let server = web::Data::new(Server::new(test_config(&addr), LlmCatalog::new(vec![]), test_verifier(), test_templates()));
    let app = test::init_service(App::new().app_data(server.clone()).configure(papi_server::routes::configure)).await;

    let req = test::TestRequest::post()
        .uri("/v1/deployments/module")
        .insert_header(("Authorization", "Bearer alice-token"))
        .set_json(module_body("t1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: serde_json::Value = test::read_body_json(resp).await;
    let uuid = body["uuid"].as_str().expect("uuid present").to_string();
    assert!(!uuid.is_empty());
    assert!(body["endpoints"]["api"].as_str().unwrap().starts_with("https://api-"));
    assert!(body["endpoints"]["ide"].as_str().unwrap().starts_with("https://ide-"));

    let get_req = test::TestRequest::get()
        .uri(&format!("/v1/deployments/module/{}?vo=vo.a", uuid))
        .insert_header(("Authorization", "Bearer alice-token"))
        .to_request();
    let get_resp = test::call_service(&app, get_req).await;
    assert_eq!(get_resp.status(), StatusCode::OK);
    let deployment: serde_json::Value = test::read_body_json(get_resp).await;
    let status = deployment["status"].as_str().unwrap();
    assert!(["queued", "starting", "running"].contains(&status), "unexpected status {}", status);
}

#[actix_web::test]
async fn s2_quota_overflow() {
    let mut sched = mockito::Server::new_async().await;
    mock_catalog(&mut sched).await;
    // Alice already has one deployment using the full 1-GPU per-user cap.
    sched
        .mock("GET", mockito::Matcher::Regex("^/v1/jobs\\?".into()))
        .with_status(200)
        .with_body(
            r#"[{"job_id":"existing","owner":"alice","namespace":"vo-a","state":"running",
                "has_allocation":true,"allocation_placing":false,"user_initiated_stop":false,
                "placement_failed":false,"resources":{"cpu":1,"ram_mb":1000,"disk_mb":1000,"gpu":1},
                "allocations":[],"node_id":"n1","kind":"module","workload_name":"other"}]"#,
        )
        .create_async()
        .await;
    let submit_mock = sched.mock("POST", "/v1/jobs").expect(0).create_async().await;

    let addr = sched.url();
    let server = web::Data::new(Server::new(test_config(&addr), LlmCatalog::new(vec![]), test_verifier(), test_templates()));
    let app = test::init_service(App::new().app_data(server.clone()).configure(papi_server::routes::configure)).await;

    let mut body = module_body("t2");
    body["hardware"]["gpu_num"] = json!(1);
    let req = test::TestRequest::post()
        .uri("/v1/deployments/module")
        .insert_header(("Authorization", "Bearer alice-token"))
        .set_json(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let parsed: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(parsed["resource"], "GPU");
    assert_eq!(parsed["limit"], 1);
    assert_eq!(parsed["current"], 1);
    submit_mock.assert_async().await;
}

#[actix_web::test]
async fn s3_cross_user_delete_forbidden() {
    let mut sched = mockito::Server::new_async().await;
    sched
        .mock("GET", mockito::Matcher::Regex(r"^/v1/jobs/".into()))
        .with_status(200)
        .with_body(
            r#"{"job_id":"alice-job","owner":"alice","namespace":"vo-a","state":"running",
                "has_allocation":true,"allocation_placing":false,"user_initiated_stop":false,
                "placement_failed":false,"resources":{"cpu":0,"ram_mb":0,"disk_mb":0,"gpu":0},
                "allocations":[],"node_id":"n1"}"#,
        )
        .create_async()
        .await;
    let purge_mock = sched
        .mock("DELETE", mockito::Matcher::Regex(r"^/v1/jobs/".into()))
        .expect(0)
        .create_async()
        .await;

    let addr = sched.url();
    let server = web::Data::new(Server::new(test_config(&addr), LlmCatalog::new(vec![]), test_verifier(), test_templates()));
    let app = test::init_service(App::new().app_data(server.clone()).configure(papi_server::routes::configure)).await;

    let alice_uuid = Uuid::new_v4();
    let req = test::TestRequest::delete()
        .uri(&format!("/v1/deployments/module/{}", alice_uuid))
        .insert_header(("Authorization", "Bearer bob-token"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    purge_mock.assert_async().await;
}

#[actix_web::test]
async fn s4_placeholder_injection_preserved() {
    let literal = "${OWNER_EMAIL}";
    assert_eq!(literal.chars().count(), 14);

    let mut sched = mockito::Server::new_async().await;
    mock_catalog(&mut sched).await;
    sched
        .mock("GET", mockito::Matcher::Regex("^/v1/jobs\\?".into()))
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;
    // Only matches if the rendered job body still carries the literal
    // placeholder text in the `title` field rather than Alice's real email.
    let submit_mock = sched
        .mock(
            "POST",
            mockito::Matcher::AllOf(vec![
                mockito::Matcher::Exact("/v1/jobs".into()),
                mockito::Matcher::Regex(r#""title":"\$\{OWNER_EMAIL\}""#.into()),
            ]),
        )
        .with_status(200)
        .with_body(r#"{"job_id":"sched-job-2"}"#)
        .create_async()
        .await;

    let addr = sched.url();
    let server = web::Data::new(Server::new(test_config(&addr), LlmCatalog::new(vec![]), test_verifier(), test_templates()));
    let app = test::init_service(App::new().app_data(server.clone()).configure(papi_server::routes::configure)).await;

    let req = test::TestRequest::post()
        .uri("/v1/deployments/module")
        .insert_header(("Authorization", "Bearer alice-token"))
        .set_json(module_body(literal))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    submit_mock.assert_async().await;
}

#[actix_web::test]
async fn s5_tryme_limit() {
    let mut sched = mockito::Server::new_async().await;
    mock_catalog(&mut sched).await;
    // Alice is already at the per-user try-me concurrency cap (1).
    sched
        .mock("GET", mockito::Matcher::Regex("^/v1/jobs\\?".into()))
        .with_status(200)
        .with_body(
            r#"[{"job_id":"existing-tryme","owner":"alice","namespace":"vo-a","state":"running",
                "has_allocation":true,"allocation_placing":false,"user_initiated_stop":false,
                "placement_failed":false,"resources":{"cpu":0,"ram_mb":0,"disk_mb":0,"gpu":0},
                "allocations":[],"node_id":"n1","kind":"try-me","workload_name":"other"}]"#,
        )
        .create_async()
        .await;
    let submit_mock = sched.mock("POST", "/v1/jobs").expect(0).create_async().await;

    let addr = sched.url();
    let server = web::Data::new(Server::new(test_config(&addr), LlmCatalog::new(vec![]), test_verifier(), test_templates()));
    let app = test::init_service(App::new().app_data(server.clone()).configure(papi_server::routes::configure)).await;

    let req = test::TestRequest::post()
        .uri("/v1/try_me/try-me")
        .insert_header(("Authorization", "Bearer alice-token"))
        .set_json(module_body("tryme-1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let parsed: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(parsed["resource"], "tryme-concurrency");
    submit_mock.assert_async().await;
}

#[actix_web::test]
async fn s6_snapshot_oversize() {
    let mut sched = mockito::Server::new_async().await;
    sched
        .mock("GET", mockito::Matcher::Regex(r"^/v1/jobs/".into()))
        .with_status(200)
        .with_body(
            r#"{"job_id":"big-job","owner":"alice","namespace":"vo-a","state":"running",
                "has_allocation":true,"allocation_placing":false,"user_initiated_stop":false,
                "placement_failed":false,"resources":{"cpu":4,"ram_mb":8000,"disk_mb":12288,"gpu":0},
                "allocations":[],"node_id":"n1"}"#,
        )
        .create_async()
        .await;

    let addr = sched.url();
    let server = web::Data::new(Server::new(test_config(&addr), LlmCatalog::new(vec![]), test_verifier(), test_templates()));
    let app = test::init_service(App::new().app_data(server.clone()).configure(papi_server::routes::configure)).await;

    let req = test::TestRequest::post()
        .uri("/v1/snapshots")
        .insert_header(("Authorization", "Bearer alice-token"))
        .set_json(json!({
            "vo": "vo.a",
            "deployment_uuid": Uuid::new_v4(),
            "title": "t",
            "description": "d",
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let parsed: serde_json::Value = test::read_body_json(resp).await;
    assert!(parsed["message"].as_str().unwrap().contains("too-large"));
}
