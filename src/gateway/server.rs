//! HTTP routes.
//!
//! - `POST /` runs one triage session and answers with its outcome
//! - `POST /notifications` queues an email for the background worker
//! - `GET /health` liveness check

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::{SessionReport, TriageAgent};
use crate::bus::{NewMailEvent, NotificationBus};
use crate::config::Config;
use crate::email::{derive_email_id, InboundEmail};
use crate::error::{Result, SessionFailure};

use super::idempotency::{Claim, IdempotencyStore};

/// Incoming email, either raw text or with headers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EmailPayload {
    Raw {
        email: String,
        #[serde(default)]
        id: Option<String>,
    },
    Structured {
        #[serde(default)]
        sender: Option<String>,
        #[serde(default)]
        subject: Option<String>,
        body: String,
        #[serde(default)]
        id: Option<String>,
    },
}

impl EmailPayload {
    /// Convert to an [`InboundEmail`], rejecting an empty body.
    pub fn into_email(self) -> std::result::Result<InboundEmail, String> {
        let email = match self {
            EmailPayload::Raw { email, id } => InboundEmail::from_text(email).with_id(id),
            EmailPayload::Structured {
                sender,
                subject,
                body,
                id,
            } => {
                let sender = sender.filter(|s| !s.trim().is_empty());
                let subject = subject.filter(|s| !s.trim().is_empty());
                InboundEmail {
                    id: derive_email_id(sender.as_deref(), subject.as_deref(), &body),
                    sender,
                    subject,
                    body,
                }
                .with_id(id)
            }
        };
        if email.body.trim().is_empty() {
            return Err("email body is empty".to_string());
        }
        Ok(email)
    }
}

/// A finished response, replayed to duplicates of the same email.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl CachedResponse {
    pub fn from_report(report: &SessionReport) -> Self {
        match (&report.output, report.detail()) {
            (Some(output), _) if report.is_done() => Self {
                status: StatusCode::OK,
                body: json!({ "output": output }),
            },
            (_, detail) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: json!({ "detail": detail.unwrap_or_else(|| "session failed".into()) }),
            },
        }
    }
}

impl IntoResponse for CachedResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Shared state behind every route.
pub struct GatewayState {
    pub agent: Arc<TriageAgent>,
    pub bus: Arc<NotificationBus>,
    pub dedup: Arc<IdempotencyStore<CachedResponse>>,
    pub new_mail_topic: String,
}

impl GatewayState {
    pub fn new(agent: Arc<TriageAgent>, bus: Arc<NotificationBus>, config: &Config) -> Self {
        Self {
            agent,
            bus,
            dedup: Arc::new(IdempotencyStore::new(
                Duration::from_secs(config.gateway.dedup_ttl_secs),
                config.gateway.dedup_max_entries,
            )),
            new_mail_topic: config
                .notifications
                .qualified(&config.notifications.new_mail_topic),
        }
    }
}

/// Whether a finished session should be replayed to duplicates. A session
/// cancelled before running any tool left no trace and may run again.
pub(crate) fn should_cache(report: &SessionReport) -> bool {
    !(report.failure == Some(SessionFailure::Cancelled) && report.tool_calls.is_empty())
}

/// Signals cancellation when the request future is dropped.
struct CancelOnDrop(watch::Sender<bool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        let _ = self.0.send(true);
    }
}

fn error_response(status: StatusCode, detail: impl Into<String>) -> Response {
    (status, Json(json!({ "detail": detail.into() }))).into_response()
}

fn parse_email(
    payload: std::result::Result<Json<EmailPayload>, JsonRejection>,
) -> std::result::Result<InboundEmail, Response> {
    let Json(payload) = payload.map_err(|e| {
        // Oversized bodies keep their 413; every other rejection is a bad request.
        let status = match e.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        error_response(status, e.body_text())
    })?;
    payload
        .into_email()
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e))
}

async fn triage_handler(
    State(state): State<Arc<GatewayState>>,
    payload: std::result::Result<Json<EmailPayload>, JsonRejection>,
) -> Response {
    let email = match parse_email(payload) {
        Ok(email) => email,
        Err(response) => return response,
    };
    let email_id = email.id.clone();

    match state.dedup.claim(&email_id) {
        Claim::New => {}
        Claim::InFlight => {
            info!(email_id = %email_id, "Duplicate email still in flight");
            return error_response(
                StatusCode::ACCEPTED,
                format!("email {} is already being processed", email_id),
            );
        }
        Claim::Completed(cached) => {
            info!(email_id = %email_id, "Duplicate email, replaying response");
            return cached.into_response();
        }
    }

    // The session runs in its own task so it can record its outcome even if
    // the client goes away; dropping the guard cancels it.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let _guard = CancelOnDrop(cancel_tx);
    let task_state = Arc::clone(&state);
    let handle = tokio::spawn(async move {
        let report = task_state.agent.triage(email, cancel_rx).await;
        let response = CachedResponse::from_report(&report);
        if should_cache(&report) {
            task_state.dedup.complete(&report.email_id, response.clone());
        } else {
            task_state.dedup.forget(&report.email_id);
        }
        response
    });

    match handle.await {
        Ok(response) => response.into_response(),
        Err(e) => {
            warn!(email_id = %email_id, error = %e, "Triage task aborted");
            state.dedup.forget(&email_id);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "triage task aborted")
        }
    }
}

async fn notification_handler(
    State(state): State<Arc<GatewayState>>,
    payload: std::result::Result<Json<EmailPayload>, JsonRejection>,
) -> Response {
    let email = match parse_email(payload) {
        Ok(email) => email,
        Err(response) => return response,
    };
    let email_id = email.id.clone();

    let event = match serde_json::to_value(NewMailEvent { email }) {
        Ok(event) => event,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    match state.bus.publish(&state.new_mail_topic, event) {
        Ok(0) => error_response(StatusCode::SERVICE_UNAVAILABLE, "no triage worker is listening"),
        Ok(_) => (
            StatusCode::ACCEPTED,
            Json(json!({ "email_id": email_id, "status": "queued" })),
        )
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Build the gateway router.
pub fn router(state: Arc<GatewayState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", post(triage_handler))
        .route("/notifications", post(notification_handler))
        .route("/health", get(health_handler))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `router` on `addr` until `shutdown` resolves.
pub async fn serve<F>(router: Router, addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Gateway listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
