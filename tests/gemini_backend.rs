mod common;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::{jpeg, test_config};
use defect_checker::core_modules::prompt::DEFECT_PROMPT;
use defect_checker::{
    BatchOrchestrator, ClassifierConfig, Credential, DefectClassificationClient, Error, GeminiBackend, ImageUpload,
    InferenceError,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Captured {
    path: String,
    api_key: Option<String>,
    body: Value,
}

#[derive(Clone, Default)]
struct FakeGemini {
    requests: Arc<Mutex<Vec<Captured>>>,
    flaky_failures: Arc<AtomicUsize>,
}

impl FakeGemini {
    fn requests(&self) -> Vec<Captured> {
        self.requests.lock().unwrap().clone()
    }
}

fn answer(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    })
}

async fn generate_content(
    State(state): State<FakeGemini>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let api_key = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.requests.lock().unwrap().push(Captured {
        path: uri.path().to_string(),
        api_key: api_key.clone(),
        body,
    });

    match api_key.as_deref() {
        Some("BAD") => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": {
                    "code": 400,
                    "message": "API key not valid. Please pass a valid API key.",
                    "status": "INVALID_ARGUMENT",
                    "details": [{ "@type": "type.googleapis.com/google.rpc.ErrorInfo", "reason": "API_KEY_INVALID" }]
                }
            })),
        ),
        Some("FLAKY") if state.flaky_failures.fetch_add(1, Ordering::SeqCst) < 2 => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": { "code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE" } })),
        ),
        Some("SLOW") => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            (StatusCode::OK, Json(answer("NO")))
        }
        _ => (StatusCode::OK, Json(answer("NO"))),
    }
}

async fn spawn_fake() -> (SocketAddr, FakeGemini) {
    let state = FakeGemini::default();
    let app = Router::new().fallback(generate_content).with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn config_for(addr: SocketAddr) -> ClassifierConfig {
    ClassifierConfig {
        base_url: format!("http://{addr}"),
        ..test_config()
    }
}

#[tokio::test]
async fn batch_against_fake_endpoint_sends_key_prompt_and_resized_png() {
    let (addr, fake) = spawn_fake().await;
    let orchestrator = BatchOrchestrator::with_gemini(config_for(addr)).unwrap();

    let report = orchestrator
        .run_batch(Credential::new("VALID"), vec![ImageUpload::new("slab1.jpg", jpeg(512, 256))])
        .await;

    assert_eq!(report.pairs(), vec![("slab1.jpg".to_string(), "NO".to_string())]);

    let requests = fake.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.path, "/v1beta/models/gemini-1.5-flash:generateContent");
    assert_eq!(request.api_key.as_deref(), Some("VALID"));

    let parts = &request.body["contents"][0]["parts"];
    assert_eq!(parts[0]["text"], DEFECT_PROMPT);
    assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
    let png = STANDARD.decode(parts[1]["inlineData"]["data"].as_str().unwrap()).unwrap();
    let submitted = image::load_from_memory(&png).unwrap();
    assert_eq!((submitted.width(), submitted.height()), (256, 128));
}

#[tokio::test]
async fn rejected_key_is_reported_without_retrying() {
    let (addr, fake) = spawn_fake().await;
    let config = config_for(addr);
    let backend = Arc::new(GeminiBackend::new(&config).unwrap());
    let client = DefectClassificationClient::new(Credential::new("BAD"), backend, &config);

    let image = image::load_from_memory(&jpeg(20, 20)).unwrap();
    let result = client.classify(image).await;

    assert_eq!(
        result,
        Err(Error::Inference(InferenceError::CredentialRejected(
            "API key not valid. Please pass a valid API key.".into()
        )))
    );
    assert_eq!(fake.requests().len(), 1);
}

#[tokio::test]
async fn overloaded_service_is_retried_with_backoff() {
    let (addr, fake) = spawn_fake().await;
    let config = ClassifierConfig {
        max_retries: 2,
        ..config_for(addr)
    };
    let backend = Arc::new(GeminiBackend::new(&config).unwrap());
    let client = DefectClassificationClient::new(Credential::new("FLAKY"), backend, &config);

    let image = image::load_from_memory(&jpeg(20, 20)).unwrap();
    let verdict = client.classify(image).await.unwrap();

    assert_eq!(verdict.text(), "NO");
    assert_eq!(fake.requests().len(), 3);
}

#[tokio::test]
async fn slow_responses_hit_the_request_timeout() {
    let (addr, _fake) = spawn_fake().await;
    let config = ClassifierConfig {
        request_timeout: Duration::from_millis(200),
        max_retries: 0,
        ..config_for(addr)
    };
    let backend = Arc::new(GeminiBackend::new(&config).unwrap());
    let client = DefectClassificationClient::new(Credential::new("SLOW"), backend, &config);

    let image = image::load_from_memory(&jpeg(20, 20)).unwrap();
    assert_eq!(client.classify(image).await, Err(Error::Inference(InferenceError::Timeout)));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ClassifierConfig {
        max_retries: 0,
        ..config_for(addr)
    };
    let backend = Arc::new(GeminiBackend::new(&config).unwrap());
    let client = DefectClassificationClient::new(Credential::new("VALID"), backend, &config);

    let image = image::load_from_memory(&jpeg(20, 20)).unwrap();
    assert!(matches!(
        client.classify(image).await,
        Err(Error::Inference(InferenceError::Transport(_)))
    ));
}
