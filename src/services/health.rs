//! HTTP front door
//!
//! Liveness check plus manual triggers for the scheduled jobs. The triggers
//! run the same job bodies as the schedules and answer once they finish.

use async_trait::async_trait;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Result, SwapdError};

/// Job bodies reachable from the front door
#[async_trait]
pub trait ManualTriggers: Send + Sync {
    /// Refit every predictor on the persisted history
    async fn retrain(&self) -> Result<()>;

    /// Run one decision cycle per pair without executing exchanges
    async fn predict(&self) -> Result<serde_json::Value>;

    /// Refresh every configured series, returning the candles added
    async fn save_history(&self) -> Result<usize>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    /// Server local time, `yyyy-MM-dd HH:mm:ss`
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl TriggerResponse {
    fn new(message: &str, result: Option<serde_json::Value>) -> Self {
        Self {
            message: message.to_string(),
            result,
        }
    }
}

type Triggers = Arc<dyn ManualTriggers>;

pub fn router(triggers: Triggers) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/learn", post(learn_handler))
        .route("/api/v1/predict", post(predict_handler))
        .route("/api/v1/save/history", post(save_history_handler))
        .with_state(triggers)
}

pub struct ApiServer {
    triggers: Triggers,
    port: u16,
}

impl ApiServer {
    pub fn new(triggers: Triggers, port: u16) -> Self {
        Self { triggers, port }
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting API server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router(self.triggers))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| SwapdError::Internal(format!("API server error: {}", e)))?;

        info!("API server stopped");
        Ok(())
    }
}

fn failure(job: &str, err: SwapdError) -> (StatusCode, Json<TriggerResponse>) {
    warn!("Manual {} failed: {}", job, err);
    let status = if err.is_transient() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(TriggerResponse::new(&err.to_string(), None)))
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        date: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    })
}

async fn learn_handler(State(triggers): State<Triggers>) -> impl IntoResponse {
    let started = Utc::now();
    match triggers.retrain().await {
        Ok(()) => {
            let elapsed = (Utc::now() - started).num_milliseconds();
            (
                StatusCode::OK,
                Json(TriggerResponse::new(
                    "Model training finished",
                    Some(serde_json::json!({ "elapsedMs": elapsed })),
                )),
            )
        }
        Err(e) => failure("retrain", e),
    }
}

async fn predict_handler(State(triggers): State<Triggers>) -> impl IntoResponse {
    match triggers.predict().await {
        Ok(result) => (
            StatusCode::OK,
            Json(TriggerResponse::new("Prediction", Some(result))),
        ),
        Err(e) => failure("prediction", e),
    }
}

async fn save_history_handler(State(triggers): State<Triggers>) -> impl IntoResponse {
    match triggers.save_history().await {
        Ok(added) => (
            StatusCode::OK,
            Json(TriggerResponse::new(
                "Trading history saved",
                Some(serde_json::json!({ "added": added })),
            )),
        ),
        Err(e) => failure("history save", e),
    }
}
