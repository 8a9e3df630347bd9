use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    auth::require_admin_key,
    handlers::{delete_key, health, list_feeds, list_keys, on_play, on_publish, upsert_key},
    ingest::{FeedWatcher, DEFAULT_STAT_URL},
    store::KeyLedger,
    AppState,
};

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub admin_key: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub stat_url: String,
    pub cors_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("STREAMGATE_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("STREAMGATE_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            admin_key: std::env::var("STREAMGATE_ADMIN_KEY").ok(),
            data_dir: std::env::var("STREAMGATE_DATA_DIR").ok().map(PathBuf::from),
            stat_url: std::env::var("STREAMGATE_STAT_URL")
                .unwrap_or_else(|_| DEFAULT_STAT_URL.into()),
            cors_origins: std::env::var("STREAMGATE_CORS_ORIGINS").ok(),
        }
    }
}

/// Assemble the full route tree around `state`.
///
/// `/on_publish` and `/on_play` must stay outside the admin gate: the
/// ingest server calls them and carries no credentials of its own.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/on_publish", post(on_publish))
        .route("/on_play", post(on_play));

    let protected = Router::new()
        .route("/keys", get(list_keys))
        .route("/keys", post(upsert_key))
        .route("/keys/{name}", delete(delete_key))
        .route("/feeds", get(list_feeds))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_key,
        ));

    Router::new().merge(public).merge(protected).with_state(state)
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    // Resolve data directory.
    let data_dir = crate::dirs::resolve_data_dir(cfg.data_dir.as_ref())?;
    info!(data_dir = %data_dir.display(), "using data directory");

    // Open the key ledger; a missing file is created, a corrupt or
    // unwritable one aborts startup.
    let ledger_path = data_dir.join("keys.json");
    let ledger = KeyLedger::open(&ledger_path).with_context(|| {
        format!(
            "open key ledger {} — fix permissions on the host, for example: \
             `sudo chown -R $(id -u):$(id -g) {}`",
            ledger_path.display(),
            data_dir.display()
        )
    })?;

    if cfg.admin_key.is_none() {
        warn!("STREAMGATE_ADMIN_KEY not set; key management endpoints are unauthenticated");
    }

    let state = AppState {
        ledger,
        admin_key: cfg.admin_key,
        feeds: FeedWatcher::new(cfg.stat_url),
    };

    let cors = build_cors(cfg.cors_origins.as_deref());
    let app = router(state).layer(cors).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "streamgate listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app).await.context("server error")
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::DELETE,
            http::Method::OPTIONS,
        ])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<_> = o
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum_test::TestServer;

    fn state_with(admin_key: Option<&str>) -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = KeyLedger::open(dir.path().join("keys.json")).unwrap();
        let state = AppState {
            ledger,
            admin_key: admin_key.map(Into::into),
            // Port 9 is the discard service; nothing answers there.
            feeds: FeedWatcher::new("http://127.0.0.1:9/stat"),
        };
        (dir, state)
    }

    #[tokio::test]
    async fn admin_routes_require_the_bearer_key_when_configured() {
        let (_dir, state) = state_with(Some("adminsecret"));
        let server = TestServer::new(router(state)).unwrap();

        server.get("/keys").await.assert_status(StatusCode::UNAUTHORIZED);
        server
            .get("/keys")
            .authorization_bearer("wrong")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .get("/keys")
            .authorization_bearer("adminsecret")
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn admin_routes_are_open_when_no_key_is_configured() {
        let (_dir, state) = state_with(None);
        let server = TestServer::new(router(state)).unwrap();
        server.get("/keys").await.assert_status_ok();
    }

    #[tokio::test]
    async fn publish_callback_skips_the_admin_gate() {
        let (_dir, state) = state_with(Some("adminsecret"));
        let ledger = state.ledger.clone();
        ledger.upsert("alice", Some("abc123")).unwrap();
        let server = TestServer::new(router(state)).unwrap();

        server
            .post("/on_publish")
            .form(&[("name", "abc123"), ("app", "live")])
            .await
            .assert_status_ok();

        server
            .post("/on_publish")
            .form(&[("name", "wrong"), ("app", "live")])
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn publish_key_may_arrive_via_args() {
        let (_dir, state) = state_with(None);
        let ledger = state.ledger.clone();
        ledger.upsert("alice", Some("abc123")).unwrap();
        let server = TestServer::new(router(state)).unwrap();

        server
            .post("/on_publish")
            .form(&[("args", "abc123"), ("app", "live")])
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn key_lifecycle_over_http() {
        let (_dir, state) = state_with(None);
        let server = TestServer::new(router(state)).unwrap();

        let created = server
            .post("/keys")
            .json(&serde_json::json!({"name": "alice"}))
            .await;
        created.assert_status_ok();
        let body: serde_json::Value = created.json();
        assert_eq!(body["name"], "alice");
        assert_eq!(body["generated"], true);
        let key = body["key"].as_str().unwrap().to_owned();

        // A freshly issued key authorizes immediately.
        server
            .post("/on_publish")
            .form(&[("name", key.as_str())])
            .await
            .assert_status_ok();

        // Delete is idempotent.
        server.delete("/keys/alice").await.assert_status_ok();
        server.delete("/keys/alice").await.assert_status_ok();

        // And revocation takes effect on the next attempt.
        server
            .post("/on_publish")
            .form(&[("name", key.as_str())])
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn blank_names_are_a_client_error() {
        let (_dir, state) = state_with(None);
        let server = TestServer::new(router(state)).unwrap();

        server
            .post("/keys")
            .json(&serde_json::json!({"name": "   "}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn play_callback_always_accepts() {
        let (_dir, state) = state_with(None);
        let server = TestServer::new(router(state)).unwrap();
        server.post("/on_play").await.assert_status_ok();
    }

    #[tokio::test]
    async fn feeds_degrade_when_the_ingest_server_is_down() {
        let (_dir, state) = state_with(None);
        let server = TestServer::new(router(state)).unwrap();

        let resp = server.get("/feeds").await;
        resp.assert_status_ok();
        let body: serde_json::Value = resp.json();
        assert!(body["feeds"].as_array().unwrap().is_empty());
        assert!(!body["error"].as_str().unwrap().is_empty());
    }
}
