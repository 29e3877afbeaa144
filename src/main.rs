use git_deploy_hooks::api::create_router;
use git_deploy_hooks::deploy::CommandDispatcher;
use git_deploy_hooks::logging::{FileLogger, setup_logging};
use git_deploy_hooks::{AppState, SharedState, load_config};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8888";
const DEFAULT_CONFIG_PATH: &str = "hooks_config.toml";

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let bind_address =
        std::env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string());
    let config_path = PathBuf::from(
        std::env::var("HOOKS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
    );
    let file_logger = std::env::var("HOOKS_LOG_DIR")
        .ok()
        .map(|dir| FileLogger::new(PathBuf::from(dir)));

    // Held until exit so buffered file logs get flushed.
    let _log_guard = match setup_logging(file_logger.as_ref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Logging setup error: {}", e);
            std::process::exit(1);
        }
    };

    let config = match load_config(&config_path).await {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let state: SharedState = Arc::new(AppState::new(
        config,
        config_path.clone(),
        Arc::new(CommandDispatcher),
    ));

    #[cfg(unix)]
    spawn_reload_on_hangup(state.clone());

    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", bind_address, e);
            std::process::exit(1);
        }
    };

    info!("Listening on {}", bind_address);
    info!("Using config at {:?}", config_path);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
    info!("Server stopped");
}

/// Re-reads the config file on SIGHUP. A broken file keeps the old config.
#[cfg(unix)]
fn spawn_reload_on_hangup(state: SharedState) {
    use tokio::signal::unix::{SignalKind, signal};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(e) => {
                error!("Cannot listen for SIGHUP, config reload disabled: {}", e);
                return;
            }
        };

        while hangup.recv().await.is_some() {
            match load_config(&state.config_path).await {
                Ok(new_config) => {
                    state.replace_config(new_config);
                    info!("Configuration reloaded from {:?}", state.config_path);
                }
                Err(e) => error!("Failed to reload config, keeping the previous one: {}", e),
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
