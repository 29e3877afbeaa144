//! Shared fixtures for router-level tests

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use git_deploy_hooks::api::create_router;
use git_deploy_hooks::deploy::{DeployInvocation, Dispatcher};
use git_deploy_hooks::error::HookError;
use git_deploy_hooks::signature::{hmac_sha1_hex, hmac_sha256_hex};
use git_deploy_hooks::{AppState, HookConfig, SharedState, parse_config};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt; // For `oneshot`

pub const GITEA_SECRET: &str = "gitea-shared-secret";
pub const GITHUB_SECRET: &str = "github-shared-secret";
pub const GITLAB_TOKEN: &str = "gitlab-token";

pub const CLONE_URL: &str = "https://git.example.com/a/b.git";

/// Dispatcher that records invocations instead of starting processes.
#[derive(Default)]
pub struct RecordingDispatcher {
    invocations: Mutex<Vec<DeployInvocation>>,
    failing: Mutex<Vec<PathBuf>>,
}

impl RecordingDispatcher {
    pub fn fail_for(&self, project: &Path) {
        self.failing.lock().unwrap().push(project.to_path_buf());
    }

    pub fn invocations(&self) -> Vec<(PathBuf, String)> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|i| (i.project_path.clone(), i.commit_hash.clone()))
            .collect()
    }
}

impl Dispatcher for RecordingDispatcher {
    fn launch(&self, invocation: &DeployInvocation, _config: &HookConfig) -> Result<(), HookError> {
        if self.failing.lock().unwrap().contains(&invocation.project_path) {
            return Err(HookError::DispatchFailure("simulated".to_string()));
        }
        self.invocations.lock().unwrap().push(invocation.clone());
        Ok(())
    }
}

pub struct TestHarness {
    pub dir: TempDir,
    pub projects_file: PathBuf,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub state: SharedState,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_secrets(GITEA_SECRET, GITHUB_SECRET, GITLAB_TOKEN)
    }

    pub fn with_secrets(gitea: &str, github: &str, gitlab: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let projects_file = dir.path().join("projects");
        fs::write(&projects_file, "").unwrap();

        let config = parse_config(&format!(
            r#"
            toolkit_path = '{toolkit}'
            projects_file = '{projects}'

            [gitea]
            secret = '{gitea}'

            [github]
            secret = '{github}'

            [gitlab]
            token = '{gitlab}'
            "#,
            toolkit = dir.path().join("bin").display(),
            projects = projects_file.display(),
        ))
        .unwrap();

        let dispatcher = Arc::new(RecordingDispatcher::default());
        let state = Arc::new(AppState::new(
            config,
            dir.path().join("hooks_config.toml"),
            dispatcher.clone(),
        ));

        Self {
            dir,
            projects_file,
            dispatcher,
            state,
        }
    }

    /// Creates a project directory with the given markers and lists it.
    pub fn add_project(&self, name: &str, origin: Option<&str>, branch: Option<&str>) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::create_dir_all(&path).unwrap();
        if let Some(origin) = origin {
            fs::write(path.join(".origin"), format!("{}\n", origin)).unwrap();
        }
        if let Some(branch) = branch {
            fs::write(path.join(".branch"), format!("{}\n", branch)).unwrap();
        }

        let mut list = fs::OpenOptions::new()
            .append(true)
            .open(&self.projects_file)
            .unwrap();
        writeln!(list, "{}", path.display()).unwrap();
        writeln!(list).unwrap();
        path
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }
}

pub fn push_body(clone_field: &str, url: &str, commit: &str, git_ref: &str) -> String {
    serde_json::json!({
        "repository": { clone_field: url },
        "after": commit,
        "ref": git_ref,
    })
    .to_string()
}

pub fn gitea_push(body: &str) -> Request<Body> {
    gitea_request("push", body, &hmac_sha256_hex(GITEA_SECRET, body.as_bytes()).unwrap())
}

pub fn gitea_request(event: &str, body: &str, signature: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook/gitea")
        .header("content-type", "application/json")
        .header("x-gitea-event", event)
        .header("x-gitea-signature", signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn github_request(event: &str, content_type: &str, body: &str) -> Request<Body> {
    let signature = format!("sha1={}", hmac_sha1_hex(GITHUB_SECRET, body.as_bytes()).unwrap());
    Request::builder()
        .method("POST")
        .uri("/webhook/github")
        .header("content-type", content_type)
        .header("x-github-event", event)
        .header("x-hub-signature", signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn gitlab_request(token: Option<&str>, body: &str) -> Request<Body> {
    let uri = match token {
        Some(token) => format!("/webhook/gitlab?token={}", token),
        None => "/webhook/gitlab".to_string(),
    };
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
