mod cache;
mod classifier;
mod config;
mod error;
mod labels;
mod notify;
mod rpc;
mod types;
mod worker;
mod zero_shot;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use clap::Parser;
use metrics::{counter, gauge};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use cache::ResultCache;
use classifier::RawClassification;
use config::{CacheSettings, Config, WorkerSettings};
use error::ServiceError;
use labels::CategoryMap;
use notify::Notifier;
use rpc::RpcForwarder;
use types::{ClassificationResult, ClassifyImageRequest, ClassifyRequest, NotifyRequest};
use worker::{ClassifierHandle, ClassifierPool, ClassifyError};
use zero_shot::{ZeroShotClient, ZeroShotSettings};

const SERVICE_NAME: &str = "grievai";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,grievai=debug".into()),
        )
        .init();

    let config = Config::parse();
    tracing::info!(
        host = %config.host,
        port = config.port,
        text_model = %config.text_model,
        image_model = %config.image_model,
        cache_ttl_secs = config.cache_ttl_secs,
        cache_capacity = config.cache_capacity,
        classify_timeout_secs = config.classify_timeout_secs,
        "Starting grievance classifier"
    );

    let categories = Arc::new(CategoryMap::civic_defaults(&config.default_category));

    let text_client: Arc<dyn classifier::Classifier> = Arc::new(ZeroShotClient::new(ZeroShotSettings {
        base_url: config.inference_url.clone(),
        model: config.text_model.clone(),
        api_token: config.hf_api_token.clone(),
        candidate_labels: categories.candidate_labels().to_vec(),
    })?);
    let image_client: Arc<dyn classifier::Classifier> = Arc::new(ZeroShotClient::new(ZeroShotSettings {
        base_url: config.inference_url.clone(),
        model: config.image_model.clone(),
        api_token: config.hf_api_token.clone(),
        candidate_labels: categories.candidate_labels().to_vec(),
    })?);

    let worker_settings = WorkerSettings::from(&config);
    let (text_handle, text_pool) = ClassifierPool::new(worker_settings.clone(), text_client);
    let (image_handle, image_pool) = ClassifierPool::new(worker_settings, image_client);

    let shutdown = CancellationToken::new();
    tokio::spawn(text_pool.run_until_cancelled(shutdown.clone()));
    tokio::spawn(image_pool.run_until_cancelled(shutdown.clone()));

    let state = AppState {
        text_classifier: text_handle,
        image_classifier: image_handle,
        cache: Arc::new(ResultCache::new(CacheSettings::from(&config))),
        categories,
        notifier: Arc::new(Notifier::from_config(&config)),
        rpc: Arc::new(RpcForwarder::new(
            config.rpc_upstream_url.clone(),
            config.rpc_timeout(),
        )),
    };

    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    let app = router(state)
        .route("/metrics", get(|| async move { metric_handle.render() }))
        .layer(prometheus_layer)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer());

    let listener = TcpListener::bind(&config.server_address()).await?;
    tracing::info!("Server running on http://{}", config.server_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;
    shutdown.cancel();
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
    cancel.cancel();
}

#[derive(Clone)]
struct AppState {
    text_classifier: ClassifierHandle,
    image_classifier: ClassifierHandle,
    cache: Arc<ResultCache>,
    categories: Arc<CategoryMap>,
    notifier: Arc<Notifier>,
    rpc: Arc<RpcForwarder>,
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/classify", post(classify_handler))
        .route("/classify_image", post(classify_image_handler))
        .route("/health", get(health_handler))
        .route("/categories", get(categories_handler))
        .route("/notify", post(notify_handler))
        .route("/rpc", post(rpc_handler))
        .with_state(state)
}

// Browser access is for local development frontends only.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list([
            HeaderValue::from_static("http://localhost:5173"),
            HeaderValue::from_static("http://127.0.0.1:5173"),
            HeaderValue::from_static("http://localhost:3000"),
        ]))
        .allow_methods(Any)
        .allow_headers(Any)
}

#[tracing::instrument(skip(state, request), fields(request_id = %uuid::Uuid::new_v4().simple()))]
async fn classify_handler(
    State(state): State<AppState>,
    Json(request): Json<ClassifyRequest>,
) -> Result<Json<ClassificationResult>, ServiceError> {
    counter!("classification_requests_total").increment(1);

    let text = request.text.trim();
    if text.is_empty() {
        return Err(ServiceError::InvalidInput("Text cannot be empty".into()));
    }

    // Content-addressed: the same grievance worded with different casing or
    // padding resolves to the same entry.
    let key = ResultCache::key_for(&text.to_lowercase());
    if let Some(result) = state.cache.get(&key) {
        counter!("classification_cache_hits_total").increment(1);
        tracing::debug!("cache hit");
        return Ok(Json(result));
    }
    counter!("classification_cache_misses_total").increment(1);

    let raw = state
        .text_classifier
        .classify(text)
        .await
        .inspect_err(count_timeout)?;
    Ok(Json(store_normalized(&state, key, raw)?))
}

#[tracing::instrument(skip(state, request), fields(request_id = %uuid::Uuid::new_v4().simple()))]
async fn classify_image_handler(
    State(state): State<AppState>,
    Json(request): Json<ClassifyImageRequest>,
) -> Result<Json<ClassificationResult>, ServiceError> {
    counter!("image_classification_requests_total").increment(1);

    if request.image_url.is_empty() {
        return Err(ServiceError::InvalidInput("Image URL cannot be empty".into()));
    }

    // Locators are hashed as given; what they point at is opaque here.
    let key = ResultCache::key_for(&request.image_url);
    if let Some(result) = state.cache.get(&key) {
        counter!("classification_cache_hits_total").increment(1);
        return Ok(Json(result));
    }
    counter!("classification_cache_misses_total").increment(1);

    let raw = state
        .image_classifier
        .classify(&request.image_url)
        .await
        .inspect_err(count_timeout)?;
    Ok(Json(store_normalized(&state, key, raw)?))
}

fn count_timeout(err: &ClassifyError) {
    if matches!(err, ClassifyError::TimedOut) {
        counter!("classification_timeouts_total").increment(1);
    }
}

fn store_normalized(
    state: &AppState,
    key: String,
    raw: RawClassification,
) -> Result<ClassificationResult, ServiceError> {
    let Some((original_label, score)) = raw.top() else {
        return Err(ServiceError::Classification(anyhow::anyhow!(
            "classifier returned an empty ranking"
        )));
    };

    let result = ClassificationResult {
        label: state.categories.normalize(original_label).to_owned(),
        score,
        original_label: original_label.to_owned(),
    };
    state.cache.put(key, result.clone());
    gauge!("classification_cache_size").set(state.cache.len() as f64);
    Ok(result)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy", "service": SERVICE_NAME }))
}

async fn categories_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "categories": state.categories.canonical_categories() }))
}

#[tracing::instrument(skip(state, request))]
async fn notify_handler(
    State(state): State<AppState>,
    Json(request): Json<NotifyRequest>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let message = request.message.as_deref().map(str::trim).unwrap_or("");
    if message.is_empty() {
        return Err(ServiceError::InvalidInput("Message is required".into()));
    }
    let subject = request.subject.as_deref().unwrap_or("Grievance notification");

    state.notifier.notify(subject, message).await;
    Ok(Json(serde_json::json!({ "status": "sent" })))
}

async fn rpc_handler(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<serde_json::Value>), ServiceError> {
    let (status, body) = state.rpc.forward(payload).await?;
    Ok((status, Json(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classifier;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    struct ScriptedClassifier {
        labels: Vec<String>,
        scores: Vec<f64>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedClassifier {
        fn ranked(labels: &[&str], scores: &[f64]) -> Arc<Self> {
            Arc::new(Self {
                labels: labels.iter().map(|s| (*s).to_owned()).collect(),
                scores: scores.to_vec(),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                labels: vec!["Road".to_owned()],
                scores: vec![0.9],
                delay,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Classifier for ScriptedClassifier {
        async fn classify(&self, _input: &str) -> anyhow::Result<RawClassification> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(RawClassification {
                labels: self.labels.clone(),
                scores: self.scores.clone(),
            })
        }
    }

    struct TestService {
        state: AppState,
        _cancel: tokio_util::sync::DropGuard,
    }

    impl TestService {
        fn app(&self) -> Router {
            router(self.state.clone())
        }

        fn cache(&self) -> &ResultCache {
            &self.state.cache
        }
    }

    fn service(classifier: Arc<ScriptedClassifier>, ttl: Duration, timeout: Duration) -> TestService {
        let settings = WorkerSettings {
            workers: 2,
            classify_timeout: timeout,
        };
        let text_classifier: Arc<dyn Classifier> = classifier.clone();
        let image_classifier: Arc<dyn Classifier> = classifier;
        let (text_handle, text_pool) = ClassifierPool::new(settings.clone(), text_classifier);
        let (image_handle, image_pool) = ClassifierPool::new(settings, image_classifier);

        let cancel = CancellationToken::new();
        tokio::spawn(text_pool.run_until_cancelled(cancel.clone()));
        tokio::spawn(image_pool.run_until_cancelled(cancel.clone()));

        let state = AppState {
            text_classifier: text_handle,
            image_classifier: image_handle,
            cache: Arc::new(ResultCache::new(CacheSettings { ttl, capacity: 64 })),
            categories: Arc::new(CategoryMap::civic_defaults("Other")),
            notifier: Arc::new(Notifier::disabled()),
            rpc: Arc::new(RpcForwarder::new(None, Duration::from_secs(30))),
        };

        TestService {
            state,
            _cancel: cancel.drop_guard(),
        }
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        read_response(response).await
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        read_response(response).await
    }

    async fn read_response(response: axum::response::Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn classify_normalizes_and_caches() {
        let classifier = ScriptedClassifier::ranked(&["Road", "Water", "Spam"], &[0.9, 0.05, 0.05]);
        let svc = service(classifier.clone(), Duration::from_secs(3600), Duration::from_secs(5));

        let (status, body) = post_json(
            svc.app(),
            "/classify",
            json!({ "text": "There is a huge pothole on main street." }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["label"], "Road");
        assert_eq!(body["original_label"], "Road");
        assert!((body["score"].as_f64().unwrap() - 0.9).abs() < 1e-9);

        // Same grievance, different padding and casing: served from cache.
        let (status, second) = post_json(
            svc.app(),
            "/classify",
            json!({ "text": "  There is a huge pothole on MAIN street.  " }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second, body);
        assert_eq!(classifier.calls(), 1);
    }

    #[tokio::test]
    async fn distinct_texts_classify_independently() {
        let classifier = ScriptedClassifier::ranked(&["Water"], &[0.7]);
        let svc = service(classifier.clone(), Duration::from_secs(3600), Duration::from_secs(5));

        let (status, _) = post_json(svc.app(), "/classify", json!({ "text": "The water is brown." })).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = post_json(svc.app(), "/classify", json!({ "text": "No water since monday." })).await;
        assert_eq!(status, StatusCode::OK);

        assert_eq!(classifier.calls(), 2);
        assert_eq!(svc.cache().len(), 2);
    }

    #[tokio::test]
    async fn empty_text_is_rejected_without_invoking_the_classifier() {
        let classifier = ScriptedClassifier::ranked(&["Road"], &[0.9]);
        let svc = service(classifier.clone(), Duration::from_secs(3600), Duration::from_secs(5));

        for text in ["", "   "] {
            let (status, body) = post_json(svc.app(), "/classify", json!({ "text": text })).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(body["detail"].as_str().unwrap().contains("empty"));
        }
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_raw_label_normalizes_to_default_category() {
        let classifier = ScriptedClassifier::ranked(&["Graffiti"], &[0.6]);
        let svc = service(classifier, Duration::from_secs(3600), Duration::from_secs(5));

        let (status, body) =
            post_json(svc.app(), "/classify", json!({ "text": "Graffiti on the town hall." })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["label"], "Other");
        assert_eq!(body["original_label"], "Graffiti");
    }

    #[tokio::test(start_paused = true)]
    async fn expired_cache_entry_triggers_reclassification() {
        let classifier = ScriptedClassifier::ranked(&["Road"], &[0.9]);
        let svc = service(classifier.clone(), Duration::from_secs(2), Duration::from_secs(5));
        let body = json!({ "text": "There is a huge pothole on main street." });

        let (status, _) = post_json(svc.app(), "/classify", body.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(classifier.calls(), 1);

        tokio::time::advance(Duration::from_secs(3)).await;

        let (status, _) = post_json(svc.app(), "/classify", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(classifier.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn classification_timeout_maps_to_503_and_leaves_no_cache_entry() {
        let classifier = ScriptedClassifier::slow(Duration::from_secs(60));
        let svc = service(classifier.clone(), Duration::from_secs(3600), Duration::from_secs(1));

        let (status, body) =
            post_json(svc.app(), "/classify", json!({ "text": "Streetlight out on 5th." })).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["detail"].as_str().unwrap().contains("timed out"));
        assert_eq!(classifier.calls(), 1);
        assert!(svc.cache().is_empty());
    }

    #[tokio::test]
    async fn classify_image_round_trip_and_cache() {
        let classifier = ScriptedClassifier::ranked(&["Garbage", "Road"], &[0.8, 0.2]);
        let svc = service(classifier.clone(), Duration::from_secs(3600), Duration::from_secs(5));
        let body = json!({ "image_url": "https://cdn.example.org/complaints/42.jpg" });

        let (status, first) = post_json(svc.app(), "/classify_image", body.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["label"], "Sanitation");
        assert_eq!(first["original_label"], "Garbage");

        let (_, second) = post_json(svc.app(), "/classify_image", body).await;
        assert_eq!(second, first);
        assert_eq!(classifier.calls(), 1);
    }

    #[tokio::test]
    async fn empty_image_url_is_rejected() {
        let classifier = ScriptedClassifier::ranked(&["Road"], &[0.9]);
        let svc = service(classifier.clone(), Duration::from_secs(3600), Duration::from_secs(5));

        let (status, _) = post_json(svc.app(), "/classify_image", json!({ "image_url": "" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn health_reports_service_name() {
        let classifier = ScriptedClassifier::ranked(&["Road"], &[0.9]);
        let svc = service(classifier, Duration::from_secs(3600), Duration::from_secs(5));

        let (status, body) = get_json(svc.app(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "healthy", "service": "grievai" }));
    }

    #[tokio::test]
    async fn categories_lists_the_canonical_set() {
        let classifier = ScriptedClassifier::ranked(&["Road"], &[0.9]);
        let svc = service(classifier, Duration::from_secs(3600), Duration::from_secs(5));

        let (status, body) = get_json(svc.app(), "/categories").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["categories"],
            json!(["Health", "Power", "Road", "Sanitation", "Spam", "Water"])
        );
    }

    #[tokio::test]
    async fn notify_requires_a_message() {
        let classifier = ScriptedClassifier::ranked(&["Road"], &[0.9]);
        let svc = service(classifier, Duration::from_secs(3600), Duration::from_secs(5));

        let (status, _) = post_json(svc.app(), "/notify", json!({ "subject": "hello" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) =
            post_json(svc.app(), "/notify", json!({ "message": "new grievance filed" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "sent" }));
    }

    #[tokio::test]
    async fn rpc_without_upstream_is_unavailable() {
        let classifier = ScriptedClassifier::ranked(&["Road"], &[0.9]);
        let svc = service(classifier, Duration::from_secs(3600), Duration::from_secs(5));

        let (status, body) = post_json(
            svc.app(),
            "/rpc",
            json!({ "jsonrpc": "2.0", "method": "eth_blockNumber", "id": 1 }),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["detail"].as_str().unwrap().contains("not configured"));
    }
}
