//! HTTP surface of the agent runner.
//!
//! Submit / query / cancel / health endpoints over the shared
//! [`RunnerContext`]. Task submission returns 202 immediately and runs the
//! pipeline in a background worker; clients poll for status.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;

use super::auth;
use super::types::{ErrorResponse, HealthResponse, TaskRequest, TaskResponse};
use crate::services::executor::{execute_task, RunnerContext};
use crate::services::watchdog::TaskWatchdog;
use crate::domain::models::TaskStatus;

/// Build the router with all endpoints and the auth middleware.
pub fn build_router(ctx: RunnerContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tasks", post(submit_task))
        .route("/tasks/{task_id}", get(get_task))
        .route("/tasks/{task_id}/cancel", post(cancel_task))
        .layer(middleware::from_fn(auth::require_bearer))
        .with_state(ctx)
}

/// Bind and serve until ctrl-c, then shut down cleanly: stop the watchdog,
/// signal cancellation to running workers, and clear in-memory state.
pub async fn serve(host: &str, port: u16, ctx: RunnerContext) -> anyhow::Result<()> {
    use anyhow::Context;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "runner.startup");

    let watchdog = Arc::new(TaskWatchdog::new(ctx.store.clone(), ctx.audit.clone()));
    watchdog.start().await;

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "runner.listening");

    axum::serve(listener, build_router(ctx.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    watchdog.stop().await;

    for (task_id, state) in ctx.store.snapshot().await {
        let mut guard = state.write().await;
        if matches!(guard.status, TaskStatus::Running | TaskStatus::Committing) {
            tracing::warn!(task_id = %task_id, "runner.shutdown.orphan");
            guard.cancel.cancel();
            if let Some(worker) = guard.worker.take() {
                worker.abort();
            }
        }
    }
    ctx.store.clear().await;
    ctx.audit.clear().await;
    ctx.breakers.reset().await;

    tracing::info!("runner.shutdown");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn health(State(ctx): State<RunnerContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_tasks: ctx.store.count_active().await,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Submit a new agent task for execution.
///
/// Returns 202 Accepted immediately; the task runs in the background and
/// is polled via `GET /tasks/{task_id}`.
async fn submit_task(State(ctx): State<RunnerContext>, Json(request): Json<TaskRequest>) -> Response {
    let (task, github_token) = request.into_task();

    if let Err(err) = task.validate() {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, err.to_string());
    }

    let Some(state) = ctx.store.create_if_absent(task.clone()).await else {
        return error_response(
            StatusCode::CONFLICT,
            format!("Task {} already exists", task.task_id),
        );
    };

    ctx.audit
        .record_with(
            "task.submitted",
            &task.task_id,
            [("engine".to_string(), json!(task.engine))].into_iter().collect(),
        )
        .await;

    // Fire and forget; the handle is kept for cancellation and the watchdog.
    let worker = tokio::spawn(execute_task(ctx.clone(), state.clone(), github_token));
    state.write().await.worker = Some(worker);

    (
        StatusCode::ACCEPTED,
        Json(TaskResponse::pending(&task.task_id)),
    )
        .into_response()
}

/// Current status of a task, including the result once terminal.
async fn get_task(State(ctx): State<RunnerContext>, Path(task_id): Path<String>) -> Response {
    let Some(state) = ctx.store.get(&task_id).await else {
        return error_response(StatusCode::NOT_FOUND, format!("Task {task_id} not found"));
    };

    let guard = state.read().await;
    let response = match &guard.result {
        Some(result) => TaskResponse::with_result(&task_id, guard.status, result),
        None => TaskResponse::bare(&task_id, guard.status),
    };
    Json(response).into_response()
}

/// Signal cancellation for a pending or running task.
async fn cancel_task(State(ctx): State<RunnerContext>, Path(task_id): Path<String>) -> Response {
    let Some(state) = ctx.store.get(&task_id).await else {
        return error_response(StatusCode::NOT_FOUND, format!("Task {task_id} not found"));
    };

    {
        let guard = state.read().await;
        if !matches!(guard.status, TaskStatus::Pending | TaskStatus::Running) {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Task {task_id} is {}, cannot cancel", guard.status.as_str()),
            );
        }
        guard.cancel.cancel();
    }

    ctx.audit.record("task.cancel_requested", &task_id).await;
    (
        StatusCode::OK,
        Json(json!({"task_id": task_id, "status": "cancelled"})),
    )
        .into_response()
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(ErrorResponse { error: message })).into_response()
}
