/// Agent Engine クライアントの統合テスト
///
/// wiremock で Cloud Storage と Agent Engine の REST API を模倣し、
/// デプロイ・セッション操作・ストリーミング問い合わせ・削除の一連の流れを検証します。
use agent::{
    AgentEngineClient, AgentError, DeploySpec, PartKind, corp_brand_agent, parse_event_content,
};
use futures::StreamExt;
use serde_json::json;
use std::time::Duration;
use storage::{Bucket, GcsClient};
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BUCKET: &str = "ae-demo-us-central1-bucket";
const ENGINE: &str = "projects/demo/locations/us-central1/reasoningEngines/42";

fn engine_client(server: &MockServer) -> AgentEngineClient {
    AgentEngineClient::new("demo", "us-central1", "test_token")
        .with_base_url(server.uri())
        .with_poll_interval(Duration::from_millis(1))
}

fn engine_resource() -> serde_json::Value {
    json!({
        "name": ENGINE,
        "displayName": "agent_corp_brand",
        "createTime": "2025-04-03T12:00:00Z"
    })
}

async fn mount_engine_lookup(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/{}", ENGINE)))
        .and(header("Authorization", "Bearer test_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(engine_resource()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_deploy_uploads_artifacts_and_waits_for_operation() {
    let server = MockServer::start().await;

    for object in ["agent_engine/agent_engine.json", "agent_engine/requirements.txt"] {
        Mock::given(method("POST"))
            .and(path(format!("/upload/storage/v1/b/{}/o", BUCKET)))
            .and(query_param("name", object))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "bucket": BUCKET,
                "name": object
            })))
            .expect(1)
            .mount(&server)
            .await;
    }

    Mock::given(method("POST"))
        .and(path("/projects/demo/locations/us-central1/reasoningEngines"))
        .and(body_partial_json(json!({
            "displayName": "agent_corp_brand",
            "spec": {
                "agentFramework": "google-adk",
                "packageSpec": {
                    "pickleObjectGcsUri": format!("gs://{}/agent_engine/agent_engine.json", BUCKET),
                    "requirementsGcsUri": format!("gs://{}/agent_engine/requirements.txt", BUCKET)
                }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": format!("{}/operations/7", ENGINE),
            "done": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/{}/operations/7", ENGINE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": format!("{}/operations/7", ENGINE),
            "done": true,
            "response": {
                "@type": "type.googleapis.com/google.cloud.aiplatform.v1.ReasoningEngine",
                "name": ENGINE,
                "displayName": "agent_corp_brand"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let staging = GcsClient::new(Some("demo".to_string()), "test_token").with_base_url(server.uri());
    let bucket = Bucket {
        name: BUCKET.to_string(),
        location: Some("US-CENTRAL1".to_string()),
        storage_class: None,
        time_created: None,
        project_number: None,
    };

    let deployed = engine_client(&server)
        .create(
            &corp_brand_agent("gemini-2.5-flash"),
            &DeploySpec::new("agent_corp_brand"),
            &staging,
            &bucket,
        )
        .await
        .expect("デプロイに成功すること");

    assert_eq!(deployed.resource_name(), ENGINE);
    assert_eq!(deployed.display_name(), "agent_corp_brand");
}

#[tokio::test]
async fn test_failed_operation_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/upload/storage/v1/b/{}/o", BUCKET)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bucket": BUCKET,
            "name": "agent_engine/object"
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/projects/demo/locations/us-central1/reasoningEngines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": format!("{}/operations/8", ENGINE),
            "done": true,
            "error": {"code": 3, "message": "Build failed"}
        })))
        .mount(&server)
        .await;

    let staging = GcsClient::new(Some("demo".to_string()), "test_token").with_base_url(server.uri());
    let bucket = Bucket {
        name: BUCKET.to_string(),
        location: None,
        storage_class: None,
        time_created: None,
        project_number: None,
    };

    let result = engine_client(&server)
        .create(
            &corp_brand_agent("gemini-2.5-flash"),
            &DeploySpec::new("agent_corp_brand"),
            &staging,
            &bucket,
        )
        .await;

    match result {
        Err(AgentError::DeploymentError(msg)) => assert!(msg.contains("Build failed")),
        other => panic!("DeploymentError が返されるべき: {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_session_operations() {
    let server = MockServer::start().await;
    mount_engine_lookup(&server).await;

    let session = json!({
        "id": "s-1",
        "userId": "user",
        "appName": "42",
        "state": {},
        "events": [],
        "lastUpdateTime": 1743683353.0
    });

    Mock::given(method("POST"))
        .and(path(format!("/{}:query", ENGINE)))
        .and(body_json(json!({"classMethod": "create_session", "input": {"user_id": "user"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"output": session.clone()})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/{}:query", ENGINE)))
        .and(body_json(json!({"classMethod": "list_sessions", "input": {"user_id": "user"}})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"output": {"sessions": [session.clone()]}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/{}:query", ENGINE)))
        .and(body_json(json!({
            "classMethod": "get_session",
            "input": {"user_id": "user", "session_id": "s-1"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"output": session})))
        .expect(1)
        .mount(&server)
        .await;

    let deployed = engine_client(&server).get("42").await.unwrap();

    let created = deployed.create_session("user").await.unwrap();
    assert_eq!(created.id, "s-1");

    let sessions = deployed.list_sessions("user").await.unwrap();
    assert_eq!(sessions.len(), 1);

    let fetched = deployed.get_session("user", &created.id).await.unwrap();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_stream_query_yields_events_in_order() {
    let server = MockServer::start().await;
    mount_engine_lookup(&server).await;

    let body = [
        json!({"author": "agent_news", "content": {"parts": [
            {"function_call": {"name": "google_search", "args": {"query": "noticias Perú"}}}
        ]}}),
        json!({"author": "agent_news", "content": {"parts": [
            {"function_response": {"name": "google_search", "response": {"result": "ok"}}}
        ]}}),
        json!({"author": "agent_news", "actions": {"state_delta": {}}}),
        json!({"author": "agent_news", "content": {"parts": [{"text": "¡Hola! Estas son las noticias."}]}}),
    ]
    .iter()
    .map(|event| event.to_string())
    .collect::<Vec<_>>()
    .join("\n");

    Mock::given(method("POST"))
        .and(path(format!("/{}:streamQuery", ENGINE)))
        .and(query_param("alt", "sse"))
        .and(body_json(json!({
            "classMethod": "stream_query",
            "input": {"user_id": "user", "session_id": "s-1", "message": "Hola"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let deployed = engine_client(&server).get(ENGINE).await.unwrap();
    let mut events = deployed
        .stream_query("user", Some("s-1"), "Hola")
        .await
        .unwrap();

    let mut out = Vec::new();
    let mut kinds = Vec::new();
    let mut count = 0;
    while let Some(event) = events.next().await {
        let event = event.unwrap();
        count += 1;
        kinds.extend(parse_event_content(&event, &mut out).into_iter().map(|i| i.kind));
    }

    assert_eq!(count, 4);
    assert_eq!(
        kinds,
        vec![PartKind::FunctionCall, PartKind::FunctionResponse, PartKind::Text]
    );
    let printed = String::from_utf8(out).unwrap();
    assert!(printed.contains("Call Function: google_search"));
    assert!(printed.contains("¡Hola! Estas son las noticias."));
}

#[tokio::test]
async fn test_stream_query_error_status() {
    let server = MockServer::start().await;
    mount_engine_lookup(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("/{}:streamQuery", ENGINE)))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "Session not found"}
        })))
        .mount(&server)
        .await;

    let deployed = engine_client(&server).get("42").await.unwrap();
    let result = deployed.stream_query("user", Some("missing"), "Hola").await;

    match result {
        Err(AgentError::ApiError { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "Session not found");
        }
        Err(other) => panic!("ApiError が返されるべき: {:?}", other),
        Ok(_) => panic!("エラーになるべき"),
    }
}

#[tokio::test]
async fn test_delete_is_explicit() {
    let server = MockServer::start().await;
    mount_engine_lookup(&server).await;

    Mock::given(method("DELETE"))
        .and(path(format!("/{}", ENGINE)))
        .and(query_param("force", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": format!("{}/operations/9", ENGINE)
        })))
        .expect(1)
        .mount(&server)
        .await;

    let deployed = engine_client(&server).get("42").await.unwrap();
    deployed.delete(true).await.unwrap();
}
