//! HTTP control endpoint.
//!
//! `POST` on any path runs a backup of every target and answers once it is
//! done; `GET /metrics` serves Prometheus metrics and any other `GET` answers
//! with a fixed liveness body. Backups never overlap: concurrent triggers and
//! the shutdown backup queue on the same lock.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::routing::get;
use axum::Router;
use tokio::sync::Mutex;
use tracing::{error, info};
use volsnap_core::observability::render_metrics;
use volsnap_core::{failure_count, BackupEngine, Config, RestoreEngine, TargetOutcome};

/// Shared state of the control endpoint
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    backup_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            backup_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Back up every target, waiting for any backup already running
    pub async fn backup(&self) -> anyhow::Result<Vec<TargetOutcome>> {
        let _guard = self.backup_lock.lock().await;
        let config = Arc::clone(&self.config);

        let outcomes = tokio::task::spawn_blocking(move || {
            BackupEngine::new(&config.tmp).run_all(&config.backups)
        })
        .await??;

        log_outcomes("Backup", &outcomes);
        Ok(outcomes)
    }

    /// Restore every target from its newest snapshot
    pub async fn restore(&self) -> anyhow::Result<Vec<TargetOutcome>> {
        let config = Arc::clone(&self.config);

        let outcomes = tokio::task::spawn_blocking(move || {
            RestoreEngine::new(&config.tmp).run_all(&config.backups)
        })
        .await??;

        log_outcomes("Restore", &outcomes);
        Ok(outcomes)
    }
}

fn log_outcomes(run: &str, outcomes: &[TargetOutcome]) {
    for outcome in outcomes {
        info!("{run}: {outcome}");
    }
    let failures = failure_count(outcomes);
    if failures > 0 {
        error!(failures, targets = outcomes.len(), "{run} finished with failed targets");
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics).post(trigger_backup))
        .fallback(any_path)
        .with_state(state)
}

async fn any_path(method: Method, State(state): State<AppState>) -> (StatusCode, String) {
    match method {
        Method::POST => trigger_backup(State(state)).await,
        Method::GET | Method::HEAD => (StatusCode::OK, "GET\n".to_string()),
        _ => (StatusCode::METHOD_NOT_ALLOWED, String::new()),
    }
}

async fn trigger_backup(State(state): State<AppState>) -> (StatusCode, String) {
    info!("Backup requested");
    match state.backup().await {
        Ok(outcomes) => {
            let mut body = String::from("BACKUP DONE\n");
            for outcome in &outcomes {
                body.push_str(&outcome.to_string());
                body.push('\n');
            }
            (StatusCode::OK, body)
        }
        Err(e) => {
            error!(error = %e, "Backup request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("BACKUP FAILED: {e}\n"))
        }
    }
}

async fn metrics() -> (StatusCode, String) {
    match render_metrics() {
        Some(Ok(text)) => (StatusCode::OK, text),
        Some(Err(e)) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        None => (StatusCode::NOT_FOUND, "metrics disabled\n".to_string()),
    }
}
