use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{header::CONTENT_TYPE, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::error::AppError;
use crate::extract::extract_post;
use crate::gateway::{ModelGateway, ModelRequest};
use crate::image_cache::ImageCache;
use crate::images::ImageResolver;
use crate::models::{ProcessRequest, ProcessResponse, RefreshResponse};
use crate::normalize::Normalizer;
use crate::prompt::ANALYSIS_PROMPT;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ImageCache>,
    pub images: Arc<ImageResolver>,
    pub gateway: Arc<dyn ModelGateway>,
    pub normalizer: Normalizer,
    pub invalid_json_status: StatusCode,
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health))
        .route("/refresh_images", post(refresh_images))
        .route("/process_json", post(process_json))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn refresh_images(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<RefreshResponse>, AppError> {
    let Json(body) = payload?;
    let saved = state.cache.refresh(body.get("image_urls"))?;
    tracing::info!(total = saved.len(), "image cache refreshed");

    Ok(Json(RefreshResponse {
        message: "Image cache refreshed successfully".to_string(),
        total_images: saved.len(),
        saved_image: saved,
    }))
}

async fn process_json(
    State(state): State<AppState>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let started = Instant::now();
    let Json(request) = payload?;
    let posts = request.items.unwrap_or_default();
    if posts.is_empty() {
        return Err(AppError::InvalidInput(
            "No posts found in 'items'".to_string(),
        ));
    }
    tracing::info!(posts = posts.len(), "analysis request received");

    let mut all_titles = Vec::with_capacity(posts.len());
    let mut all_texts = Vec::with_capacity(posts.len());
    let mut source_images = Vec::new();
    for post in &posts {
        let extracted = extract_post(post);
        tracing::debug!(
            id = ?post.id,
            images = extracted.image_refs.len(),
            "post extracted"
        );
        all_titles.push(extracted.title);
        all_texts.push(extracted.plain_text);
        source_images.extend(extracted.image_refs);
    }

    // Images registered by the last refresh take precedence over the ones
    // found in this request's markup.
    let cached = state.cache.list_all();
    let to_resolve = if cached.is_empty() {
        source_images.as_slice()
    } else {
        cached.as_slice()
    };
    let resolved = state.images.resolve_all(to_resolve).await;
    let images_base64 = resolved.base64_data();

    let model_request = ModelRequest {
        prompt: ANALYSIS_PROMPT,
        titles: all_titles.clone(),
        texts: all_texts.clone(),
        source_images: source_images.clone(),
        images: resolved.encoded,
    };
    let raw_reply = state.gateway.send(&model_request).await?;
    let normalized = state.normalizer.normalize(&raw_reply);

    let status = if normalized.is_failed() {
        state.invalid_json_status
    } else {
        StatusCode::OK
    };
    let body = ProcessResponse {
        response: normalized,
        execution_time: format!("{:.2}s", started.elapsed().as_secs_f64()),
        all_titles,
        all_texts,
        source_images,
        images_base64,
        failed_base64_images: resolved.failed,
    };
    Ok((status, Json(body)).into_response())
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    AppError::Unhandled(format!("handler panicked: {}", detail)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::UpstreamError;
    use crate::normalize::FencePolicy;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Mutex;
    use std::time::Duration;
    use tower::ServiceExt;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    enum Reply {
        Text(&'static str),
        Fail,
        Panic,
    }

    struct StubGateway {
        reply: Reply,
        seen: Mutex<Vec<ModelRequest>>,
    }

    #[async_trait]
    impl ModelGateway for StubGateway {
        async fn send(&self, request: &ModelRequest) -> Result<String, UpstreamError> {
            self.seen.lock().unwrap().push(request.clone());
            match self.reply {
                Reply::Text(text) => Ok(text.to_string()),
                Reply::Fail => Err(UpstreamError::Status {
                    status: 503,
                    body: "overloaded".into(),
                }),
                Reply::Panic => panic!("gateway exploded"),
            }
        }
    }

    struct Harness {
        state: AppState,
        gateway: Arc<StubGateway>,
    }

    impl Harness {
        fn new(reply: Reply) -> Self {
            let gateway = Arc::new(StubGateway {
                reply,
                seen: Mutex::new(Vec::new()),
            });
            let state = AppState {
                cache: Arc::new(ImageCache::new()),
                images: Arc::new(ImageResolver::new(Duration::from_secs(2)).unwrap()),
                gateway: gateway.clone(),
                normalizer: Normalizer::new(FencePolicy::Fixed, false),
                invalid_json_status: StatusCode::OK,
            };
            Self { state, gateway }
        }

        fn calls(&self) -> usize {
            self.gateway.seen.lock().unwrap().len()
        }

        async fn post(&self, uri: &str, body: impl Into<Body>) -> (StatusCode, Value) {
            let app = router(self.state.clone(), 1024 * 1024);
            let request = Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(body.into())
                .unwrap();
            let response = app.oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            (status, serde_json::from_slice(&bytes).unwrap())
        }

        async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            self.post(uri, body.to_string()).await
        }
    }

    const ONE_FINDING: &str = r#"[{"id":"1.1","question":"What is the blog author's name?","answer":"Unknown","evidence":"No name appears.","source_texts":[],"source_images":[]}]"#;

    #[tokio::test]
    async fn clean_reply_round_trips_to_client() {
        let harness = Harness::new(Reply::Text(ONE_FINDING));
        let (status, body) = harness
            .post_json(
                "/process_json",
                json!({"items": [{"id": "p1", "title": "Walk", "content": "<p>Sunny <i>day</i></p>"}]}),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        let expected: Value = serde_json::from_str(ONE_FINDING).unwrap();
        assert_eq!(body["response"], expected);
        assert_eq!(body["failed_base64_images"], json!([]));
        assert_eq!(body["images_base64"], json!([]));
        assert_eq!(body["all_titles"], json!(["Walk"]));
        assert_eq!(body["all_texts"], json!(["Sunny day"]));
        assert_eq!(body["source_images"], json!([]));
        assert!(body["execution_time"].as_str().unwrap().ends_with('s'));

        let seen = harness.gateway.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].prompt, ANALYSIS_PROMPT);
        assert_eq!(seen[0].texts, vec!["Sunny day"]);
    }

    #[tokio::test]
    async fn missing_title_gets_placeholder() {
        let harness = Harness::new(Reply::Text("[]"));
        let (status, body) = harness
            .post_json("/process_json", json!({"items": [{"content": "hi"}]}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["all_titles"], json!([crate::models::DEFAULT_TITLE]));
        assert_eq!(body["response"], json!([]));
    }

    #[tokio::test]
    async fn null_title_gets_placeholder() {
        let harness = Harness::new(Reply::Text("[]"));
        let (status, body) = harness
            .post_json(
                "/process_json",
                json!({"items": [{"id": 3, "title": null, "content": "<p>hi</p>"}]}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["all_titles"], json!([crate::models::DEFAULT_TITLE]));
        assert_eq!(body["all_texts"], json!(["hi"]));
    }

    #[tokio::test]
    async fn oversized_body_is_payload_too_large() {
        let harness = Harness::new(Reply::Text("[]"));
        let app = router(harness.state.clone(), 64);
        let body = json!({"items": [{"title": "t", "content": "x".repeat(256)}]}).to_string();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/process_json")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].is_string());
        assert_eq!(harness.calls(), 0);
    }

    #[tokio::test]
    async fn structural_problems_are_rejected_before_any_call() {
        let harness = Harness::new(Reply::Text(ONE_FINDING));
        for body in [
            json!({}),
            json!({"items": []}),
            json!({"items": "not a list"}),
            json!({"items": [{"content": 5}]}),
        ] {
            let (status, response) = harness.post_json("/process_json", body.clone()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
            assert!(response["error"].is_string(), "{body}");
        }

        let (status, _) = harness.post("/process_json", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(harness.calls(), 0);
    }

    #[tokio::test]
    async fn unparseable_reply_is_embedded_as_diagnostic() {
        let harness = Harness::new(Reply::Text("Sorry, I can't help.\n"));
        let (status, body) = harness
            .post_json("/process_json", json!({"items": [{"content": "x"}]}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["response"],
            json!({"error": "Invalid JSON format", "raw_response": "[Sorry, I can't help.]"})
        );
    }

    #[tokio::test]
    async fn diagnostic_status_is_configurable() {
        let mut harness = Harness::new(Reply::Text("nope"));
        harness.state.invalid_json_status = StatusCode::BAD_GATEWAY;
        let (status, body) = harness
            .post_json("/process_json", json!({"items": [{"content": "x"}]}))
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["response"]["raw_response"], "[nope]");
    }

    #[tokio::test]
    async fn gateway_failure_is_a_server_error() {
        let harness = Harness::new(Reply::Fail);
        let (status, body) = harness
            .post_json("/process_json", json!({"items": [{"content": "x"}]}))
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], crate::error::PROCESSING_ERROR);
        assert!(body["details"].as_str().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn panic_is_caught_as_server_error() {
        let harness = Harness::new(Reply::Panic);
        let (status, body) = harness
            .post_json("/process_json", json!({"items": [{"content": "x"}]}))
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["details"], "handler panicked: gateway exploded");
    }

    #[tokio::test]
    async fn refresh_replaces_cache_and_echoes_urls() {
        let harness = Harness::new(Reply::Text("[]"));
        let (status, body) = harness
            .post_json("/refresh_images", json!({"image_urls": ["a", "b"]}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_images"], 2);

        let (_, body) = harness
            .post_json("/refresh_images", json!({"image_urls": ["c"]}))
            .await;
        assert_eq!(body["total_images"], 1);
        assert_eq!(body["saved_image"], json!(["c"]));
        assert_eq!(*harness.state.cache.list_all(), vec!["c"]);
    }

    #[tokio::test]
    async fn refresh_rejects_invalid_input() {
        let harness = Harness::new(Reply::Text("[]"));
        for body in [json!({}), json!({"image_urls": "a.jpg"}), json!([1, 2])] {
            let (status, response) = harness.post_json("/refresh_images", body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(response["error"], "Invalid or missing image_urls");
        }
    }

    #[tokio::test]
    async fn cached_images_are_resolved_and_failures_listed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"img".to_vec())
                    .insert_header("Content-Type", "image/jpeg"),
            )
            .mount(&server)
            .await;
        let ok = format!("{}/ok.jpg", server.uri());
        let missing = format!("{}/missing.jpg", server.uri());

        let harness = Harness::new(Reply::Text(ONE_FINDING));
        harness.state.cache.replace(vec![missing.clone(), ok.clone()]);

        let (status, body) = harness
            .post_json(
                "/process_json",
                json!({"items": [{"title": "t", "content": "<img src='https://blog.example/own.jpg'>"}]}),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source_images"], json!(["https://blog.example/own.jpg"]));
        assert_eq!(body["images_base64"], json!(["aW1n"]));
        assert_eq!(body["failed_base64_images"], json!([missing]));

        let seen = harness.gateway.seen.lock().unwrap();
        assert_eq!(seen[0].images.len(), 1);
        assert_eq!(seen[0].images[0].original_url, ok);
    }

    #[tokio::test]
    async fn extracted_images_are_used_when_cache_is_empty() {
        let harness = Harness::new(Reply::Text("[]"));
        let (_, body) = harness
            .post_json(
                "/process_json",
                json!({"items": [{"content": "<img src=\"/relative.jpg\">"}]}),
            )
            .await;
        assert_eq!(body["failed_base64_images"], json!(["/relative.jpg"]));
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let harness = Harness::new(Reply::Text("[]"));
        let app = router(harness.state.clone(), 1024);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
