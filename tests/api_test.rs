use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use guard_gateway::adapters::{ChatCompletionBackend, ChatProtocol};
use guard_gateway::server::{router, HEALTH_MESSAGE};
use guard_gateway::{
    Analyzer, BackendAdapter, BackendError, BatchCoordinator, ModerationOptions, ScoreTable,
};
use http_body_util::BodyExt;
use httpmock::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn app_for(server: &MockServer) -> axum::Router {
    let options = ModerationOptions {
        endpoint: Some(server.base_url()),
        ..ModerationOptions::default()
    };
    let backend = ChatCompletionBackend::new(
        reqwest::Client::new(),
        ChatProtocol::Ollama,
        &options,
        None,
    );
    let analyzer = Analyzer::new(Arc::new(backend), options, ScoreTable::default());
    router(Arc::new(BatchCoordinator::new(Arc::new(analyzer), 4)))
}

fn ollama_reply(content: &str) -> serde_json::Value {
    serde_json::json!({
        "model": "llama-guard3:1b",
        "message": {"role": "assistant", "content": content},
        "done": true
    })
}

fn analyze_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/analyze")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_analyze_batch_drops_failed_messages() {
    let server = MockServer::start();
    let threat_mock = server.mock(|when, then| {
        when.method(POST).path("/api/chat").body_contains("meet me outside");
        then.status(200).json_body(ollama_reply("unsafe\nS1"));
    });
    let spam_mock = server.mock(|when, then| {
        when.method(POST).path("/api/chat").body_contains("cheap pills");
        then.status(200).json_body(ollama_reply("unsafe\nS2,S8"));
    });
    let broken_mock = server.mock(|when, then| {
        when.method(POST).path("/api/chat").body_contains("crash the model");
        then.status(500).body("internal error");
    });
    let safe_mock = server.mock(|when, then| {
        when.method(POST).path("/api/chat").body_contains("good morning");
        then.status(200).json_body(ollama_reply("safe"));
    });

    let app = app_for(&server);
    let response = app
        .oneshot(analyze_request(
            r#"{"messages": ["meet me outside", "crash the model", "cheap pills here", "good morning"]}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );

    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(
        body,
        serde_json::json!([
            {
                "content": "meet me outside",
                "scores": {"threat_of_harm": 1.0, "commercial_solicitation": 0.0},
                "is_safe": false
            },
            {
                "content": "cheap pills here",
                "scores": {"threat_of_harm": 0.0, "commercial_solicitation": 1.0},
                "is_safe": false
            },
            {
                "content": "good morning",
                "scores": {"threat_of_harm": 0.0, "commercial_solicitation": 0.0},
                "is_safe": true
            }
        ])
    );

    threat_mock.assert();
    spam_mock.assert();
    broken_mock.assert();
    safe_mock.assert();
}

#[tokio::test]
async fn test_all_failures_return_empty_array() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/chat");
        then.status(503).body("overloaded");
    });

    let response = app_for(&server)
        .oneshot(analyze_request(r#"{"messages": ["one", "two"]}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "[]");
}

#[tokio::test]
async fn test_empty_messages_rejected_before_backend_call() {
    let server = MockServer::start();
    let backend_mock = server.mock(|when, then| {
        when.method(POST).path("/api/chat");
        then.status(200).json_body(ollama_reply("safe"));
    });

    let response = app_for(&server)
        .oneshot(analyze_request(r#"{"messages": []}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response)
        .await
        .contains("Messages array cannot be empty"));
    backend_mock.assert_hits(0);
}

#[tokio::test]
async fn test_missing_messages_field_is_empty_batch() {
    let server = MockServer::start();
    let backend_mock = server.mock(|when, then| {
        when.method(POST).path("/api/chat");
        then.status(200).json_body(ollama_reply("safe"));
    });

    let response = app_for(&server)
        .oneshot(analyze_request("{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response)
        .await
        .contains("Messages array cannot be empty"));
    backend_mock.assert_hits(0);
}

#[tokio::test]
async fn test_malformed_body_rejected() {
    let server = MockServer::start();

    for body in ["not json", r#"{"messages": "hello"}"#, "42"] {
        let response = app_for(&server)
            .oneshot(analyze_request(body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {}", body);
        assert!(body_string(response).await.contains("Invalid request body"));
    }
}

#[tokio::test]
async fn test_wrong_method_rejected() {
    let server = MockServer::start();

    let response = app_for(&server)
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/analyze")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_preflight_short_circuits() {
    let server = MockServer::start();

    let response = app_for(&server)
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/analyze")
                .header("origin", "https://chat.example")
                .header("access-control-request-method", "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
    assert_eq!(
        headers.get("access-control-allow-methods").unwrap(),
        "POST, OPTIONS"
    );
    assert_eq!(
        headers.get("access-control-allow-headers").unwrap(),
        "Content-Type"
    );
    assert!(body_string(response).await.is_empty());
}

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start();

    let response = app_for(&server)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, HEALTH_MESSAGE);
}

/// 在獨立 task 中執行真正的後端呼叫，handler 被丟棄後仍能回報呼叫的結局
struct DetachedBackend {
    inner: Arc<ChatCompletionBackend>,
    outcomes: mpsc::UnboundedSender<bool>,
}

#[async_trait]
impl BackendAdapter for DetachedBackend {
    fn name(&self) -> &str {
        "detached"
    }

    async fn analyze(
        &self,
        ctx: &CancellationToken,
        user_message: &str,
        system_instruction: &str,
    ) -> Result<String, BackendError> {
        let inner = self.inner.clone();
        let outcomes = self.outcomes.clone();
        let ctx = ctx.clone();
        let user_message = user_message.to_string();
        let system_instruction = system_instruction.to_string();

        tokio::spawn(async move {
            let result = inner.analyze(&ctx, &user_message, &system_instruction).await;
            let _ = outcomes.send(matches!(result, Err(BackendError::Cancelled)));
            result
        })
        .await
        .map_err(|e| BackendError::RequestBuild {
            message: e.to_string(),
        })?
    }
}

#[tokio::test]
async fn test_client_disconnect_cancels_backend_call() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/chat");
        then.status(200)
            .delay(Duration::from_secs(5))
            .json_body(ollama_reply("safe"));
    });

    let options = ModerationOptions {
        endpoint: Some(server.base_url()),
        ..ModerationOptions::default()
    };
    let (tx, mut rx) = mpsc::unbounded_channel();
    let backend = DetachedBackend {
        inner: Arc::new(ChatCompletionBackend::new(
            reqwest::Client::new(),
            ChatProtocol::Ollama,
            &options,
            None,
        )),
        outcomes: tx,
    };
    let analyzer = Analyzer::new(Arc::new(backend), options, ScoreTable::default());
    let app = router(Arc::new(BatchCoordinator::new(Arc::new(analyzer), 4)));

    // 客戶端在後端回應前就放棄，整個 handler future 隨之被丟棄
    let abandoned = tokio::time::timeout(
        Duration::from_millis(300),
        app.oneshot(analyze_request(r#"{"messages": ["hello"]}"#)),
    )
    .await;
    assert!(abandoned.is_err());

    let was_cancelled = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("backend call should end well before the slow reply")
        .expect("backend task should report its outcome");

    assert!(was_cancelled);
}
