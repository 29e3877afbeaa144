//! HTTP surface: one webhook endpoint per provider plus a health check

pub mod handlers;
pub mod webhook;

use axum::{Router, extract::DefaultBodyLimit, routing};

use crate::SharedState;

pub use handlers::root;
pub use webhook::{HookResponse, gitea_webhook, github_webhook, gitlab_webhook, handle_webhook};

/// Largest payload the providers deliver (GitHub caps webhooks at 25 MB).
/// Axum's 2 MiB default would reject large pushes.
pub const MAX_BODY_SIZE: usize = 25 * 1024 * 1024;

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/", routing::get(root))
        .route("/webhook/gitea", routing::post(gitea_webhook))
        .route("/webhook/github", routing::post(github_webhook))
        .route("/webhook/gitlab", routing::post(gitlab_webhook))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}
