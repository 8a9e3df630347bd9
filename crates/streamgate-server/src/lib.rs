pub mod auth;
pub mod authz;
pub mod dirs;
pub mod handlers;
pub mod ingest;
pub mod server;
pub mod store;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub ledger: store::KeyLedger,
    /// Optional bearer key gating the key-management and feed routes.
    pub admin_key: Option<String>,
    /// Watcher for the ingest server's live status document.
    pub feeds: ingest::FeedWatcher,
}

pub use server::{router, run, ServerConfig};
