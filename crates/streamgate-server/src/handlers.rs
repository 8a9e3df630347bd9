use axum::{
    extract::{Form, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{
    authz::{authorize_publish, Decision},
    store::LedgerError,
    AppState,
};

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Keys ──────────────────────────────────────────────────────────────────────

pub async fn list_keys(State(state): State<AppState>) -> Response {
    match state.ledger.load() {
        Ok(keys) => {
            info!(count = keys.len(), "audit: key.list");
            Json(json!({ "keys": keys })).into_response()
        }
        Err(e) => ledger_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpsertRequest {
    pub name: String,
    pub key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpsertResponse {
    pub name: String,
    pub key: String,
    pub generated: bool,
}

pub async fn upsert_key(
    State(state): State<AppState>,
    Json(body): Json<UpsertRequest>,
) -> Response {
    match state.ledger.upsert(&body.name, body.key.as_deref()) {
        Ok((key, generated)) => {
            let name = body.name.trim().to_owned();
            // The key value itself never goes to the log.
            info!(name = %name, generated, "audit: key.upsert");
            Json(UpsertResponse {
                name,
                key,
                generated,
            })
            .into_response()
        }
        Err(e) => ledger_error(e),
    }
}

pub async fn delete_key(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.ledger.delete(&name) {
        Ok(existed) => {
            info!(name = %name, existed, "audit: key.delete");
            Json(json!({"ok": true})).into_response()
        }
        Err(e) => ledger_error(e),
    }
}

// ── Ingest callbacks ──────────────────────────────────────────────────────────

/// Form payload the ingest server posts on publish/play callbacks. The
/// stream key arrives as `name`; some encoder setups deliver it via `args`
/// instead.
#[derive(Debug, Deserialize)]
pub struct IngestNotify {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub args: String,
    #[serde(default)]
    pub app: String,
}

pub async fn on_publish(
    State(state): State<AppState>,
    Form(notify): Form<IngestNotify>,
) -> Response {
    let candidate = if notify.name.is_empty() {
        notify.args.as_str()
    } else {
        notify.name.as_str()
    };

    match authorize_publish(&state.ledger, candidate) {
        Decision::Allowed => {
            info!(app = %notify.app, "audit: publish.allow");
            (StatusCode::OK, "OK").into_response()
        }
        Decision::Denied => {
            info!(app = %notify.app, "audit: publish.deny");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// Play attempts are always accepted; viewers are gated upstream, not here.
pub async fn on_play() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

// ── Feeds ─────────────────────────────────────────────────────────────────────

pub async fn list_feeds(State(state): State<AppState>) -> Response {
    let (feeds, error) = state.feeds.list_active(&state.ledger).await;
    info!(count = feeds.len(), degraded = error.is_some(), "audit: feed.list");
    Json(json!({ "feeds": feeds, "error": error })).into_response()
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn ledger_error(e: LedgerError) -> Response {
    match e {
        LedgerError::EmptyName => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
        LedgerError::Io { .. } | LedgerError::Corrupt { .. } | LedgerError::KeyGeneration { .. } => {
            tracing::error!(error = %e, "key ledger failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal server error"})),
            )
                .into_response()
        }
    }
}
