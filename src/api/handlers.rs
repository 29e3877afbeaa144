//! Core HTTP handlers outside the webhook pipeline

/// Root health check endpoint
pub async fn root() -> &'static str {
    "git_deploy_hooks - healthy"
}
