//! HTTP gateway (Axum) in front of the triage engine.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::metrics::MetricsSnapshot;
use crate::models::{Priority, RiskSummary, RiskTier};
use crate::triage::TriageEngine;

#[derive(Clone)]
struct AppState {
    engine: Arc<TriageEngine>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub user_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub user_id: String,
    pub priority: Priority,
    pub response: String,
    pub confidence: f64,
}

#[derive(Debug, Serialize)]
struct RiskResponse {
    user_id: String,
    tier: Option<RiskTier>,
    mean_score: Option<f64>,
    flagged_pct: Option<f64>,
    records: usize,
    summary: String,
}

pub fn router(engine: Arc<TriageEngine>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/analyze", post(analyze))
        .route("/users/{user_id}/risk", get(user_risk))
        .route("/users/{user_id}/flagged", get(user_flagged))
        .route("/metrics", get(metrics))
        .with_state(AppState { engine })
}

pub async fn serve(engine: Arc<TriageEngine>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "triage gateway listening");

    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server failed")?;

    info!("triage gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}

async fn root() -> Json<Value> {
    Json(json!({ "status": "triage gateway running" }))
}

async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Json<AnalyzeResponse> {
    let result = state.engine.classify(&req.message, &req.user_id).await;
    Json(AnalyzeResponse {
        user_id: req.user_id,
        priority: result.priority,
        response: result.response,
        confidence: result.confidence,
    })
}

async fn user_risk(State(state): State<AppState>, Path(user_id): Path<String>) -> Json<RiskResponse> {
    let summary = state.engine.aggregator().summarize(&user_id);
    let (mean_score, flagged_pct, records) = match &summary {
        RiskSummary::NoData => (None, None, 0),
        RiskSummary::Profile {
            mean_score,
            flagged_pct,
            record_count,
            ..
        } => (Some(*mean_score), Some(*flagged_pct), *record_count),
    };

    Json(RiskResponse {
        tier: summary.tier(),
        summary: summary.to_string(),
        mean_score,
        flagged_pct,
        records,
        user_id,
    })
}

async fn user_flagged(State(state): State<AppState>, Path(user_id): Path<String>) -> Json<Value> {
    let view = state.engine.aggregator().flagged_transactions(&user_id);
    let rows: Vec<Vec<String>> = view.rows.iter().map(|row| view.record(row)).collect();

    Json(json!({ "user_id": user_id, "columns": view.header(), "rows": rows }))
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.engine.metrics().snapshot())
}
