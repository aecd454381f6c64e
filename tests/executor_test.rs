//! End-to-end executor pipeline scenarios against local git remotes and the
//! mock engine. Each case pins the workspace root to a fresh tempdir via
//! `temp-env`, which also serialises env-sensitive tests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use lailatov_runner::domain::models::{ResultStatus, TaskStatus};
use lailatov_runner::infrastructure::engines::{MockEngine, MockEngineResponse};
use lailatov_runner::services::circuit_breaker::DEFAULT_FAILURE_THRESHOLD;
use lailatov_runner::services::executor::execute_task;
use lailatov_runner::services::watchdog::TaskWatchdog;
use lailatov_runner::RunnerContext;

use common::{remote_branch_exists, seeded_origin, task, wait_for_terminal};

fn workspace_env(root: &tempfile::TempDir) -> [(&'static str, Option<String>); 2] {
    [
        (
            "LAILATOV_WORKSPACE_ROOT",
            Some(root.path().join("ws").display().to_string()),
        ),
        ("LAILATOV_KEEP_WORKSPACES", None),
    ]
}

#[tokio::test]
async fn happy_path_commits_and_pushes() {
    let dir = tempfile::tempdir().unwrap();
    temp_env::async_with_vars(workspace_env(&dir), async {
        let (repo_url, bare) = seeded_origin(dir.path()).await;

        let ctx = RunnerContext::new();
        let mock = MockEngine::with_response(
            "mock",
            MockEngineResponse {
                cost_usd: 0.02,
                num_turns: 3,
                write_file: Some((
                    "math_utils.py".to_string(),
                    "def add(a, b):\n    return a + b\n".to_string(),
                )),
                ..Default::default()
            },
        );
        ctx.engines.insert(mock).await;

        let state = ctx
            .store
            .create_if_absent(task("s1", &repo_url, "b1"))
            .await
            .unwrap();
        execute_task(ctx.clone(), state.clone(), None).await;

        let guard = state.read().await;
        assert_eq!(guard.status, TaskStatus::Complete);
        let result = guard.result.as_ref().unwrap();
        assert_eq!(result.status, ResultStatus::Success);
        assert_eq!(result.files_changed, vec!["math_utils.py"]);
        let sha = result.commit_sha.as_deref().unwrap();
        assert_eq!(sha.len(), 40);
        assert!(sha.chars().all(|c| c.is_ascii_hexdigit()));
        assert!((result.cost_usd - 0.02).abs() < 1e-9);
        assert_eq!(result.num_turns, 3);
        drop(guard);

        assert!(remote_branch_exists(&bare, "b1").await);

        let actions: Vec<String> = ctx
            .audit
            .events_for("s1")
            .await
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert!(actions.contains(&"task.started".to_string()));
        assert!(actions.contains(&"task.engine_selected".to_string()));
        assert_eq!(
            actions.iter().filter(|a| *a == "task.completed").count(),
            1
        );
    })
    .await;
}

#[tokio::test]
async fn no_change_run_is_still_success() {
    let dir = tempfile::tempdir().unwrap();
    temp_env::async_with_vars(workspace_env(&dir), async {
        let (repo_url, bare) = seeded_origin(dir.path()).await;

        let ctx = RunnerContext::new();
        ctx.engines
            .insert(MockEngine::with_response("mock", MockEngineResponse::success()))
            .await;

        let state = ctx
            .store
            .create_if_absent(task("s2", &repo_url, "b2"))
            .await
            .unwrap();
        execute_task(ctx.clone(), state.clone(), None).await;

        let guard = state.read().await;
        assert_eq!(guard.status, TaskStatus::Complete);
        let result = guard.result.as_ref().unwrap();
        assert!(result.files_changed.is_empty());
        assert!(result.commit_sha.is_none());
        drop(guard);

        assert!(!remote_branch_exists(&bare, "b2").await);
    })
    .await;
}

#[tokio::test]
async fn budget_ceiling_fails_the_task() {
    let dir = tempfile::tempdir().unwrap();
    temp_env::async_with_vars(workspace_env(&dir), async {
        let (repo_url, bare) = seeded_origin(dir.path()).await;

        let ctx = RunnerContext::new();
        ctx.engines
            .insert(MockEngine::with_response(
                "mock",
                MockEngineResponse {
                    cost_usd: 0.05,
                    ..Default::default()
                },
            ))
            .await;

        let mut t = task("s3", &repo_url, "b3");
        t.max_cost_usd = 0.001;
        let state = ctx.store.create_if_absent(t).await.unwrap();
        execute_task(ctx.clone(), state.clone(), None).await;

        let guard = state.read().await;
        assert_eq!(guard.status, TaskStatus::Failed);
        let result = guard.result.as_ref().unwrap();
        assert!(result.error_message.as_deref().unwrap().contains("budget"));
        drop(guard);

        // Budget is enforced after the engine ran but before any commit.
        assert!(!remote_branch_exists(&bare, "b3").await);

        let actions: Vec<String> = ctx
            .audit
            .events_for("s3")
            .await
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert!(actions.contains(&"task.budget_exceeded".to_string()));
        assert_eq!(actions.iter().filter(|a| *a == "task.failed").count(), 1);
    })
    .await;
}

#[tokio::test]
async fn open_circuit_rejects_without_running_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    temp_env::async_with_vars(workspace_env(&dir), async {
        let (repo_url, _) = seeded_origin(dir.path()).await;

        let ctx = RunnerContext::new();
        let mock = MockEngine::with_response("mock", MockEngineResponse::success());
        ctx.engines.insert(mock.clone()).await;

        for _ in 0..DEFAULT_FAILURE_THRESHOLD {
            ctx.breakers.record_failure("mock").await;
        }

        let state = ctx
            .store
            .create_if_absent(task("s4", &repo_url, "b4"))
            .await
            .unwrap();
        execute_task(ctx.clone(), state.clone(), None).await;

        let guard = state.read().await;
        assert_eq!(guard.status, TaskStatus::Failed);
        let result = guard.result.as_ref().unwrap();
        assert!(result
            .error_message
            .as_deref()
            .unwrap()
            .contains("Circuit open"));
        drop(guard);

        // The adapter was never invoked.
        assert!(mock.calls().await.is_empty());

        let actions: Vec<String> = ctx
            .audit
            .events_for("s4")
            .await
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert!(actions.contains(&"task.circuit_open".to_string()));
    })
    .await;
}

#[tokio::test]
async fn cancellation_mid_engine_run() {
    let dir = tempfile::tempdir().unwrap();
    temp_env::async_with_vars(workspace_env(&dir), async {
        let (repo_url, bare) = seeded_origin(dir.path()).await;

        let ctx = RunnerContext::new();
        ctx.engines
            .insert(MockEngine::with_response(
                "mock",
                MockEngineResponse {
                    delay: Duration::from_secs(60),
                    ..Default::default()
                },
            ))
            .await;

        let mut t = task("s5", &repo_url, "b5");
        t.timeout_seconds = 90;
        let state = ctx.store.create_if_absent(t).await.unwrap();

        let worker = tokio::spawn(execute_task(ctx.clone(), state.clone(), None));
        state.write().await.worker = Some(worker);

        // Let the pipeline reach the engine, then cancel.
        tokio::time::sleep(Duration::from_millis(500)).await;
        state.read().await.cancel.cancel();

        let status = wait_for_terminal(&state, Duration::from_secs(10)).await;
        assert_eq!(status, TaskStatus::Cancelled);

        let guard = state.read().await;
        let result = guard.result.as_ref().unwrap();
        assert_eq!(result.status, ResultStatus::Cancelled);
        assert!(result.commit_sha.is_none());
        drop(guard);

        assert!(!remote_branch_exists(&bare, "b5").await);

        let actions: Vec<String> = ctx
            .audit
            .events_for("s5")
            .await
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions.iter().filter(|a| *a == "task.cancelled").count(), 1);
    })
    .await;
}

#[tokio::test]
async fn watchdog_force_kills_a_hung_worker() {
    let dir = tempfile::tempdir().unwrap();
    temp_env::async_with_vars(workspace_env(&dir), async {
        let (repo_url, _) = seeded_origin(dir.path()).await;

        let ctx = RunnerContext::new();
        // An engine that ignores cancellation and its soft timeout.
        ctx.engines
            .insert(MockEngine::with_response(
                "mock",
                MockEngineResponse {
                    delay: Duration::from_secs(120),
                    heed_cancel: false,
                    ..Default::default()
                },
            ))
            .await;

        let mut t = task("s6", &repo_url, "b6");
        t.timeout_seconds = 1;
        let state = ctx.store.create_if_absent(t).await.unwrap();

        let worker = tokio::spawn(execute_task(ctx.clone(), state.clone(), None));
        state.write().await.worker = Some(worker);

        let watchdog = Arc::new(TaskWatchdog::with_interval(
            ctx.store.clone(),
            ctx.audit.clone(),
            Duration::from_millis(200),
        ));
        watchdog.start().await;

        // Hard limit is 2s; the watchdog should fire within ~4s.
        let status = wait_for_terminal(&state, Duration::from_secs(8)).await;
        assert_eq!(status, TaskStatus::Failed);

        let guard = state.read().await;
        let result = guard.result.as_ref().unwrap();
        assert!(result.error_message.as_deref().unwrap().contains("watchdog"));
        drop(guard);

        let events = ctx.audit.events_for("s6").await;
        let kill = events
            .iter()
            .find(|e| e.action == "watchdog.force_kill")
            .expect("force kill audited");
        let elapsed = kill
            .metadata
            .get("elapsed_seconds")
            .and_then(serde_json::Value::as_f64)
            .unwrap();
        assert!(elapsed >= 2.0);

        watchdog.stop().await;
    })
    .await;
}

#[tokio::test]
async fn terminal_callback_is_posted() {
    let dir = tempfile::tempdir().unwrap();
    temp_env::async_with_vars(workspace_env(&dir), async {
        let (repo_url, _) = seeded_origin(dir.path()).await;

        let mut server = mockito::Server::new_async().await;
        let callback = server
            .mock("POST", "/callbacks/agent")
            .match_header("content-type", "application/json")
            .with_status(200)
            .create_async()
            .await;

        let ctx = RunnerContext::new();
        ctx.engines
            .insert(MockEngine::with_response("mock", MockEngineResponse::success()))
            .await;

        let mut t = task("s7", &repo_url, "b7");
        t.callback_url = Some(format!("{}/callbacks/agent", server.url()));
        let state = ctx.store.create_if_absent(t).await.unwrap();
        execute_task(ctx.clone(), state.clone(), None).await;

        assert_eq!(state.read().await.status, TaskStatus::Complete);
        callback.assert_async().await;
    })
    .await;
}

#[tokio::test]
async fn engine_failure_feeds_the_breaker() {
    let dir = tempfile::tempdir().unwrap();
    temp_env::async_with_vars(workspace_env(&dir), async {
        let (repo_url, _) = seeded_origin(dir.path()).await;

        let ctx = RunnerContext::new();
        ctx.engines
            .insert(MockEngine::with_response(
                "mock",
                MockEngineResponse::failure("engine blew up"),
            ))
            .await;

        let state = ctx
            .store
            .create_if_absent(task("s8", &repo_url, "b8"))
            .await
            .unwrap();
        execute_task(ctx.clone(), state.clone(), None).await;

        let guard = state.read().await;
        assert_eq!(guard.status, TaskStatus::Failed);
        assert_eq!(
            guard.result.as_ref().unwrap().error_message.as_deref(),
            Some("engine blew up")
        );
    })
    .await;
}
