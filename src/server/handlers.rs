use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde_json::{Value, json};
use tracing::info;

use super::{ApiError, SharedState};
use crate::entities::report::SearchReport;
use crate::pipeline::SearchRequest;
use crate::pipeline::aggregate::{KNOWN_MOLECULES, timestamp_now};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// GET / - service description
pub async fn root() -> Json<Value> {
    Json(json!({
        "service": "pharmyrus",
        "version": VERSION,
        "endpoints": {
            "search": "POST /api/v5/search",
            "health": "GET /health",
            "status": "GET /api/v5/status",
            "molecules": "GET /api/v5/molecules",
        },
    }))
}

/// GET /health - liveness only; upstream checks live in `pharmyrus health`
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "pharmyrus",
        "version": VERSION,
        "timestamp": timestamp_now(),
    }))
}

/// GET /api/v5/status
pub async fn status(State(state): State<SharedState>) -> Json<Value> {
    let config = state.pipeline.config();
    Json(json!({
        "status": "operational",
        "version": VERSION,
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "total_searches": state.total_searches.load(Ordering::Relaxed),
        "backends": state.pipeline.backend_names(),
        "limits": {
            "call_timeout_ms": config.call_budget.timeout.as_millis() as u64,
            "call_attempts": config.call_budget.attempts,
            "call_worst_case_ms": config.call_budget.worst_case().as_millis() as u64,
            "request_timeout_ms": config.request_timeout.as_millis() as u64,
            "max_concurrency": config.max_concurrency,
            "max_candidates": config.max_candidates,
        },
        "timestamp": timestamp_now(),
    }))
}

/// GET /api/v5/molecules
pub async fn molecules() -> Json<Value> {
    Json(json!({ "molecules": KNOWN_MOLECULES }))
}

/// POST /api/v5/search
pub async fn search(
    State(state): State<SharedState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchReport>, ApiError> {
    let Json(request) = payload?;
    state.total_searches.fetch_add(1, Ordering::Relaxed);
    info!(
        molecule = %request.molecule_name,
        mode = request.search_mode.as_str(),
        "search requested"
    );
    let report = state.pipeline.search(&request).await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::config::PipelineConfig;
    use crate::error::PharmyrusError;
    use crate::pipeline::Pipeline;
    use crate::pipeline::backends::{Backends, ChemicalRegistry, RegistryRecord};
    use crate::server::{AppState, build_router};

    struct Registry;

    #[async_trait]
    impl ChemicalRegistry for Registry {
        fn name(&self) -> &'static str {
            "fake-registry"
        }

        async fn lookup(&self, name: &str) -> Result<Option<RegistryRecord>, PharmyrusError> {
            match name.to_ascii_lowercase().as_str() {
                "olaparib" => Ok(Some(RegistryRecord {
                    canonical_name: Some("olaparib".into()),
                    synonyms: vec!["AZD2281".into(), "KU-0059436".into()],
                    ..RegistryRecord::default()
                })),
                "outage" => Err(PharmyrusError::Api {
                    api: "fake-registry".into(),
                    message: "HTTP 503".into(),
                }),
                _ => Ok(None),
            }
        }
    }

    async fn spawn_server() -> String {
        let pipeline = Arc::new(Pipeline::new(
            Backends::new(Arc::new(Registry)),
            PipelineConfig::default(),
        ));
        let app = build_router(AppState::new(pipeline));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn search_returns_report_and_counts_requests() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/api/v5/search"))
            .json(&serde_json::json!({
                "molecule_name": "Olaparib",
                "target_countries": ["br"],
                "search_mode": "quick"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let report: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(report["molecule"]["name"], "olaparib");
        assert_eq!(report["jurisdictions"][0], "BR");
        assert_eq!(report["search_mode"], "fast");
        assert_eq!(report["comparison"]["expected"], 12);

        let status: serde_json::Value = client
            .get(format!("{base}/api/v5/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["total_searches"], 1);
        assert_eq!(status["backends"][0], "fake-registry");
        assert_eq!(status["limits"]["call_worst_case_ms"], 45_000);
    }

    #[tokio::test]
    async fn search_errors_map_to_status_codes() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        for (body, expected) in [
            (serde_json::json!({"molecule_name": "unobtainium"}), 404),
            (serde_json::json!({"molecule_name": "   "}), 400),
            (
                serde_json::json!({"molecule_name": "olaparib", "target_jurisdictions": ["BRA"]}),
                400,
            ),
            (serde_json::json!({"molecule_name": "outage"}), 502),
        ] {
            let resp = client
                .post(format!("{base}/api/v5/search"))
                .json(&body)
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), expected, "body: {body}");
            let err: serde_json::Value = resp.json().await.unwrap();
            assert!(err["error"].as_str().is_some_and(|e| !e.is_empty()));
            assert!(err["timestamp"].is_string());
        }
    }

    #[tokio::test]
    async fn unreadable_bodies_use_the_error_shape() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        for (content_type, body) in [
            ("application/json", "{\"molecule_name\": "),
            ("application/json", "{\"brand_name\": \"Nubeqa\"}"),
            ("application/json", "{\"molecule_name\": \"x\", \"search_mode\": 7}"),
            ("text/plain", "{\"molecule_name\": \"olaparib\"}"),
        ] {
            let resp = client
                .post(format!("{base}/api/v5/search"))
                .header("content-type", content_type)
                .body(body)
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 400, "body: {body}");
            let err: serde_json::Value = resp.json().await.unwrap();
            let message = err["error"].as_str().unwrap_or_default();
            assert!(message.contains("invalid request body"), "{message}");
            assert!(err["timestamp"].is_string());
        }

        let status: serde_json::Value = client
            .get(format!("{base}/api/v5/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["total_searches"], 0);
    }

    #[tokio::test]
    async fn info_endpoints_respond() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let health: serde_json::Value = client
            .get(format!("{base}/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "healthy");

        let molecules: serde_json::Value = client
            .get(format!("{base}/api/v5/molecules"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(molecules["molecules"].as_array().map(Vec::len), Some(3));

        let root: serde_json::Value = client
            .get(format!("{base}/"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(root["service"], "pharmyrus");
    }
}
