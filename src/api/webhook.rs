//! Webhook handler for Gitea, GitHub and GitLab push events
//!
//! Every provider runs the same pipeline: authenticate, gate the event, decode
//! the payload, look the repository up in the project list and launch a deploy
//! per match. The first failing stage ends the request with its status and
//! message. The response body is plain text, one progress line per stage.

use axum::{
    body::Bytes,
    extract::Query,
    extract::State as AxumState,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::SharedState;
use crate::deploy::DeployInvocation;
use crate::error::HookError;
use crate::payload;
use crate::provider::{EventKind, Provider, WebhookRequest};
use crate::registry;

const DONE_LINE: &str = "All done.";

/// Plain-text response: the progress lines followed by a terminal line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookResponse {
    pub status: StatusCode,
    pub lines: Vec<String>,
}

impl HookResponse {
    pub fn body(&self) -> String {
        let mut body = self.lines.join("\n");
        body.push('\n');
        body
    }
}

impl IntoResponse for HookResponse {
    fn into_response(self) -> Response {
        let body = self.body();
        (
            self.status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response()
    }
}

enum PipelineOutcome {
    /// Valid request that needs no action, answered with a message.
    Ignored(&'static str),
    Completed { dispatch_failed: bool },
}

pub async fn gitea_webhook(
    AxumState(state): AxumState<SharedState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> HookResponse {
    handle_webhook(Provider::Gitea, state, params, headers, body).await
}

pub async fn github_webhook(
    AxumState(state): AxumState<SharedState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> HookResponse {
    handle_webhook(Provider::Github, state, params, headers, body).await
}

pub async fn gitlab_webhook(
    AxumState(state): AxumState<SharedState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> HookResponse {
    handle_webhook(Provider::Gitlab, state, params, headers, body).await
}

/// Runs one webhook delivery through the pipeline and renders the result.
pub async fn handle_webhook(
    provider: Provider,
    state: SharedState,
    query: HashMap<String, String>,
    headers: HeaderMap,
    body: Bytes,
) -> HookResponse {
    let delivery = Uuid::now_v7();
    let span = info_span!("webhook", provider = %provider, delivery = %delivery);
    let request = WebhookRequest::new(provider, headers, query, body);
    let mut lines = Vec::new();

    let result = run_pipeline(&state, &request, &mut lines)
        .instrument(span.clone())
        .await;

    match result {
        Ok(PipelineOutcome::Ignored(message)) => {
            lines.push(message.to_string());
            HookResponse {
                status: StatusCode::OK,
                lines,
            }
        }
        Ok(PipelineOutcome::Completed { dispatch_failed }) => {
            lines.push(DONE_LINE.to_string());
            let status = if dispatch_failed {
                StatusCode::INTERNAL_SERVER_ERROR
            } else {
                StatusCode::OK
            };
            HookResponse { status, lines }
        }
        Err(e) => {
            span.in_scope(|| log_rejection(&e));
            lines.push(e.to_string());
            HookResponse {
                status: e.status_code(),
                lines,
            }
        }
    }
}

async fn run_pipeline(
    state: &SharedState,
    request: &WebhookRequest,
    lines: &mut Vec<String>,
) -> Result<PipelineOutcome, HookError> {
    // One snapshot per request; a reload in between is picked up by the next one.
    let config = state.config_snapshot();
    let adapter = request.provider.adapter();

    let secret = adapter.secret(&config)?;
    adapter.verify_signature(request, secret)?;

    match adapter.parse_event(request)? {
        EventKind::Ping => {
            info!("Ping received, nothing to do");
            return Ok(PipelineOutcome::Ignored("Received ping event, ignoring."));
        }
        EventKind::Push => lines.push("Received push event.".to_string()),
    }

    let body = adapter.read_body(request)?;
    if let Some(line) = body.encoding.progress_line() {
        lines.push(line.to_string());
    }

    let push = payload::parse_push(&body.data, adapter.clone_url_pointer())?;
    info!(
        "Push of {} to branch '{}' of {}",
        push.commit_hash, push.branch, push.clone_url
    );
    lines.push(format!(
        "Received commit hash \"{}\" for repository URL \"{}\" (branch \"{}\").",
        push.commit_hash, push.clone_url, push.branch
    ));

    let projects_file = registry::resolve_projects_file(config.projects_file.as_deref())?;
    let matches = {
        let push = push.clone();
        tokio::task::spawn_blocking(move || registry::scan_registry(&projects_file, &push))
            .await
            .map_err(|e| {
                error!("Project scan did not complete: {}", e);
                HookError::RegistryUnavailable("project scan was interrupted".to_string())
            })??
    };

    if matches.is_empty() {
        info!(
            "No registered project tracks {} on branch '{}', skipping.",
            push.clone_url, push.branch
        );
    }

    let mut dispatch_failed = false;
    for project in matches {
        lines.push(format!(
            "Found project at {}, running deploy script.",
            project.path.display()
        ));

        let invocation = DeployInvocation::new(project.path, push.commit_hash.clone());
        match state.dispatcher.launch(&invocation, &config) {
            Ok(()) => info!(
                "Dispatched deploy of {} at {}",
                invocation.project_path.display(),
                invocation.commit_hash
            ),
            Err(e) => {
                error!(
                    "Deploy of {} was not started: {}",
                    invocation.project_path.display(),
                    e
                );
                lines.push("Something didn't work.".to_string());
                dispatch_failed = true;
            }
        }
    }

    Ok(PipelineOutcome::Completed { dispatch_failed })
}

fn log_rejection(err: &HookError) {
    match err {
        HookError::Misconfigured(_) | HookError::RegistryUnavailable(_) => {
            error!("Request failed: {}", err)
        }
        HookError::Unauthenticated(_) | HookError::Forbidden(_) => {
            warn!("Rejected unauthenticated request: {}", err)
        }
        _ => info!("Rejected request: {}", err),
    }
}
