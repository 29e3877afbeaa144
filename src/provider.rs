//! Provider adapters
//!
//! Gitea, GitHub and GitLab run the same pipeline and differ only in how the
//! shared secret travels, which events they announce and where the clone URL
//! sits in the payload. Each provider gets a [`ProviderAdapter`], selected by
//! route.

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use std::collections::HashMap;
use std::fmt;

use crate::HookConfig;
use crate::error::HookError;
use crate::payload::{self, BodyEncoding, PayloadBody};
use crate::signature::{verify_gitea_signature, verify_github_signature, verify_token};

pub const GITEA_EVENT_HEADER: &str = "X-Gitea-Event";
pub const GITEA_SIGNATURE_HEADER: &str = "X-Gitea-Signature";
pub const GITHUB_EVENT_HEADER: &str = "X-GitHub-Event";
pub const GITHUB_SIGNATURE_HEADER: &str = "X-Hub-Signature";
pub const GITLAB_TOKEN_PARAM: &str = "token";
pub const GITLAB_TOKEN_HEADER: &str = "X-Gitlab-Token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Gitea,
    Github,
    Gitlab,
}

impl Provider {
    pub fn adapter(self) -> &'static dyn ProviderAdapter {
        match self {
            Provider::Gitea => &GiteaAdapter,
            Provider::Github => &GithubAdapter,
            Provider::Gitlab => &GitlabAdapter,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Gitea => "gitea",
            Provider::Github => "github",
            Provider::Gitlab => "gitlab",
        }
    }

    /// Name as the provider spells it, for operator messages.
    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Gitea => "Gitea",
            Provider::Github => "GitHub",
            Provider::Gitlab => "GitLab",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inbound webhook call, alive for the duration of one request.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub provider: Provider,
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    pub body: Bytes,
}

impl WebhookRequest {
    pub fn new(
        provider: Provider,
        headers: HeaderMap,
        query: HashMap<String, String>,
        body: Bytes,
    ) -> Self {
        Self {
            provider,
            headers,
            query,
            body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Push,
    /// Connectivity check sent when a hook is created. Acknowledged, nothing else.
    Ping,
}

pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Checks the request's credential against `secret`.
    /// Missing credential is `Unauthenticated`, a wrong one `Forbidden`.
    fn verify_signature(&self, request: &WebhookRequest, secret: &str) -> Result<(), HookError>;

    fn parse_event(&self, request: &WebhookRequest) -> Result<EventKind, HookError>;

    /// JSON pointer to the clone URL in the push payload.
    fn clone_url_pointer(&self) -> &'static str {
        "/repository/clone_url"
    }

    /// The JSON payload carried by the request, never empty.
    fn read_body(&self, request: &WebhookRequest) -> Result<PayloadBody, HookError> {
        let body = payload::negotiate_body(request.content_type(), &request.body)?;
        if body.is_empty() {
            return Err(HookError::EmptyBody {
                message: "No POST body sent.",
                status: StatusCode::BAD_REQUEST,
            });
        }
        Ok(body)
    }

    fn secret<'a>(&self, config: &'a HookConfig) -> Result<&'a str, HookError> {
        let provider = self.provider();
        config.secret_for(provider).ok_or_else(|| {
            HookError::Misconfigured(format!(
                "No secret has been set for the {} endpoint. This endpoint won't work without one.",
                provider.display_name()
            ))
        })
    }
}

/// A credential header as text. Absent gives `None`; a value that is not
/// visible ASCII cannot match any secret and fails with `Forbidden(wrong)`.
fn credential_header<'a>(
    request: &'a WebhookRequest,
    name: &str,
    wrong: &str,
) -> Result<Option<&'a str>, HookError> {
    match request.headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| HookError::Forbidden(wrong.to_string())),
    }
}

/// Event gate for providers that announce the event in a header.
fn event_from_header(
    request: &WebhookRequest,
    header: &'static str,
    accepts_ping: bool,
) -> Result<EventKind, HookError> {
    let event = request
        .header(header)
        .ok_or(HookError::MissingEventHeader { header })?;
    match event {
        "push" => Ok(EventKind::Push),
        "ping" if accepts_ping => Ok(EventKind::Ping),
        other => Err(HookError::UnsupportedEvent {
            event: other.to_string(),
        }),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GiteaAdapter;

impl ProviderAdapter for GiteaAdapter {
    fn provider(&self) -> Provider {
        Provider::Gitea
    }

    fn verify_signature(&self, request: &WebhookRequest, secret: &str) -> Result<(), HookError> {
        const WRONG: &str =
            "Secret (X-Gitea-Signature header) is wrong or does not match request body.";
        let signature = credential_header(request, GITEA_SIGNATURE_HEADER, WRONG)?
            .ok_or_else(|| {
                HookError::Unauthenticated(
                    "Secret (X-Gitea-Signature header) is missing from request. Have you set a secret in Gitea's project settings?"
                        .to_string(),
                )
            })?;
        if !verify_gitea_signature(secret, &request.body, signature) {
            return Err(HookError::Forbidden(WRONG.to_string()));
        }
        Ok(())
    }

    fn parse_event(&self, request: &WebhookRequest) -> Result<EventKind, HookError> {
        event_from_header(request, GITEA_EVENT_HEADER, false)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GithubAdapter;

impl ProviderAdapter for GithubAdapter {
    fn provider(&self) -> Provider {
        Provider::Github
    }

    fn verify_signature(&self, request: &WebhookRequest, secret: &str) -> Result<(), HookError> {
        const WRONG: &str =
            "Secret (X-Hub-Signature header) is wrong or does not match request body.";
        let signature = credential_header(request, GITHUB_SIGNATURE_HEADER, WRONG)?
            .ok_or_else(|| {
                HookError::Unauthenticated(
                    "Secret (X-Hub-Signature header) is missing from request. Have you set a secret in GitHub's project settings?"
                        .to_string(),
                )
            })?;
        if !verify_github_signature(secret, &request.body, signature) {
            return Err(HookError::Forbidden(WRONG.to_string()));
        }
        Ok(())
    }

    fn parse_event(&self, request: &WebhookRequest) -> Result<EventKind, HookError> {
        event_from_header(request, GITHUB_EVENT_HEADER, true)
    }
}

/// GitLab passes a plain token (`?token=` or `X-Gitlab-Token`) and always
/// posts raw JSON push payloads.
#[derive(Debug, Clone, Copy)]
pub struct GitlabAdapter;

impl ProviderAdapter for GitlabAdapter {
    fn provider(&self) -> Provider {
        Provider::Gitlab
    }

    fn verify_signature(&self, request: &WebhookRequest, secret: &str) -> Result<(), HookError> {
        const INVALID: &str = "Invalid authentication.";
        let token = match request.query.get(GITLAB_TOKEN_PARAM) {
            Some(token) => token.as_str(),
            None => credential_header(request, GITLAB_TOKEN_HEADER, INVALID)?
                .ok_or_else(|| HookError::Unauthenticated(INVALID.to_string()))?,
        };
        if !verify_token(secret, token) {
            return Err(HookError::Forbidden(INVALID.to_string()));
        }
        Ok(())
    }

    fn parse_event(&self, _request: &WebhookRequest) -> Result<EventKind, HookError> {
        Ok(EventKind::Push)
    }

    fn clone_url_pointer(&self) -> &'static str {
        "/repository/url"
    }

    fn read_body(&self, request: &WebhookRequest) -> Result<PayloadBody, HookError> {
        if request.body.is_empty() {
            return Err(HookError::EmptyBody {
                message: "Authenticated, but no POST body sent.",
                status: StatusCode::METHOD_NOT_ALLOWED,
            });
        }
        Ok(PayloadBody {
            encoding: BodyEncoding::Raw,
            data: request.body.to_vec(),
        })
    }
}
