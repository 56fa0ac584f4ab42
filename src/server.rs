//! HTTP ingress: webhook deliveries plus the admin surface.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::agent::{InboundEvent, agent_type_for_collection};
use crate::context::ServiceContext;
use crate::error::RouteError;

pub fn build_router(ctx: Arc<ServiceContext>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .route("/trigger/{agent_type}", post(trigger))
        .route("/approval", post(approval))
        .route("/agents/status", get(agents_status))
        .route("/agents/disable-all", post(disable_all))
        .route("/agents/enable-all", post(enable_all))
        .route("/agents/{agent_type}/enable", post(enable_agent))
        .route("/agents/{agent_type}/disable", post(disable_agent))
        .route("/agents/{agent_type}/toggle", post(toggle_agent))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}/end", post(end_session))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

async fn health(State(ctx): State<Arc<ServiceContext>>) -> Json<Value> {
    let availability = ctx.availability.snapshot().await;
    let enabled = availability.values().filter(|v| **v).count();
    Json(json!({
        "status": "ok",
        "active_sessions": ctx.sessions.active_count().await,
        "agents_enabled": enabled,
        "agents_total": availability.len(),
    }))
}

#[derive(Debug, Deserialize)]
struct WebhookDelivery {
    event: String,
    collection: String,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    keys: Option<Vec<String>>,
    #[serde(default)]
    payload: Value,
}

impl WebhookDelivery {
    fn record_keys(&self) -> Vec<String> {
        match (&self.key, &self.keys) {
            (Some(key), _) => vec![key.clone()],
            (None, Some(keys)) => keys.clone(),
            (None, None) => Vec::new(),
        }
    }
}

async fn webhook(
    State(ctx): State<Arc<ServiceContext>>,
    headers: HeaderMap,
    Json(delivery): Json<WebhookDelivery>,
) -> Response {
    if let Some(expected) = &ctx.config.server.webhook_secret {
        let provided = headers
            .get("x-webhook-secret")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if provided != expected.expose_secret() {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad webhook secret"})))
                .into_response();
        }
    }

    if agent_type_for_collection(&delivery.collection).is_none() {
        tracing::debug!(collection = %delivery.collection, "Webhook for unmapped collection ignored");
        return Json(json!({"status": "ignored", "collection": delivery.collection}))
            .into_response();
    }

    let keys = delivery.record_keys();
    if keys.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "webhook delivery carried no record key"})),
        )
            .into_response();
    }

    for key in &keys {
        let ctx = ctx.clone();
        let event = InboundEvent {
            event: delivery.event.clone(),
            collection: delivery.collection.clone(),
            key: key.clone(),
            payload: delivery.payload.clone(),
        };
        tokio::spawn(async move {
            match ctx.dispatcher.dispatch(event, None).await {
                Ok(report) => tracing::info!(?report, "Webhook task complete"),
                Err(err) => tracing::error!("Webhook task failed: {err}"),
            }
        });
    }

    (
        StatusCode::ACCEPTED,
        Json(json!({"status": "accepted", "tasks": keys.len()})),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct TriggerRequest {
    #[serde(default = "default_trigger_event")]
    event: String,
    collection: String,
    key: String,
    #[serde(default)]
    payload: Value,
}

fn default_trigger_event() -> String {
    "manual_trigger".to_string()
}

/// Manual dispatch, run synchronously so the caller sees the report.
async fn trigger(
    State(ctx): State<Arc<ServiceContext>>,
    Path(agent_type): Path<String>,
    Json(req): Json<TriggerRequest>,
) -> Response {
    let event = InboundEvent {
        event: req.event,
        collection: req.collection,
        key: req.key,
        payload: req.payload,
    };

    match ctx.dispatcher.dispatch(event, Some(agent_type.as_str())).await {
        Ok(report) => Json(report).into_response(),
        Err(err) => route_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct ApprovalRequest {
    prompt_id: String,
    response: String,
    #[serde(default)]
    context: Value,
}

async fn approval(
    State(ctx): State<Arc<ServiceContext>>,
    Json(req): Json<ApprovalRequest>,
) -> Json<Value> {
    Json(
        ctx.dispatcher
            .handle_approval(&req.prompt_id, &req.response, &req.context)
            .await,
    )
}

async fn agents_status(State(ctx): State<Arc<ServiceContext>>) -> Json<Value> {
    Json(json!({"agents": ctx.availability.snapshot().await}))
}

async fn enable_agent(
    State(ctx): State<Arc<ServiceContext>>,
    Path(agent_type): Path<String>,
) -> Response {
    availability_response(&agent_type, ctx.availability.set_enabled(&agent_type, true).await)
}

async fn disable_agent(
    State(ctx): State<Arc<ServiceContext>>,
    Path(agent_type): Path<String>,
) -> Response {
    availability_response(&agent_type, ctx.availability.set_enabled(&agent_type, false).await)
}

async fn toggle_agent(
    State(ctx): State<Arc<ServiceContext>>,
    Path(agent_type): Path<String>,
) -> Response {
    availability_response(&agent_type, ctx.availability.toggle(&agent_type).await)
}

fn availability_response(agent_type: &str, result: Option<bool>) -> Response {
    match result {
        Some(enabled) => Json(json!({"agent_type": agent_type, "enabled": enabled})).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("unknown agent type '{agent_type}'")})),
        )
            .into_response(),
    }
}

async fn disable_all(State(ctx): State<Arc<ServiceContext>>) -> Json<Value> {
    ctx.availability.set_all(false).await;
    Json(json!({"agents": ctx.availability.snapshot().await}))
}

async fn enable_all(State(ctx): State<Arc<ServiceContext>>) -> Json<Value> {
    ctx.availability.set_all(true).await;
    Json(json!({"agents": ctx.availability.snapshot().await}))
}

async fn list_sessions(State(ctx): State<Arc<ServiceContext>>) -> Json<Value> {
    Json(json!({"sessions": ctx.sessions.snapshot().await}))
}

/// Force-end a session, e.g. one orphaned by a hung task.
async fn end_session(
    State(ctx): State<Arc<ServiceContext>>,
    Path(id): Path<Uuid>,
) -> Response {
    match ctx.sessions.end_session(id).await {
        Ok(summary) => Json(json!({"ended": summary})).into_response(),
        Err(err) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": err.to_string()})),
        )
            .into_response(),
    }
}

fn route_error_response(err: RouteError) -> Response {
    let status = match &err {
        RouteError::AgentDisabled(_) => StatusCode::SERVICE_UNAVAILABLE,
        RouteError::NoAgentForDepartment(_) | RouteError::MissingRecordId => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({"error": err.to_string()}))).into_response()
}
