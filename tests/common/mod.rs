//! Shared fixtures for integration tests: local git remotes, task builders,
//! and status polling.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

use lailatov_runner::domain::models::{
    Complexity, RiskTier, RunnerTask, TaskStatus, DEFAULT_SANDBOX_IMAGE,
};
use lailatov_runner::services::task_store::SharedTaskState;

/// Run a git command in `cwd`, asserting success.
pub async fn git(args: &[&str], cwd: &Path) {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .await
        .expect("git is installed");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Create a bare origin repo under `dir`, seeded with one commit on `main`
/// containing `math_utils.py`. Returns (clone URL, bare repo path).
pub async fn seeded_origin(dir: &Path) -> (String, PathBuf) {
    let bare = dir.join("origin.git");
    std::fs::create_dir_all(&bare).unwrap();
    git(&["init", "--bare", "--initial-branch=main", "."], &bare).await;

    let seed = dir.join("seed");
    std::fs::create_dir_all(&seed).unwrap();
    git(&["init", "--initial-branch=main", "."], &seed).await;
    git(&["config", "user.name", "Seed"], &seed).await;
    git(&["config", "user.email", "seed@example.com"], &seed).await;
    std::fs::write(
        seed.join("math_utils.py"),
        "def add(a, b):\n    return a - b\n",
    )
    .unwrap();
    git(&["add", "-A"], &seed).await;
    git(&["commit", "-m", "seed"], &seed).await;
    git(&["remote", "add", "origin", bare.to_str().unwrap()], &seed).await;
    git(&["push", "origin", "main"], &seed).await;

    (format!("file://{}", bare.display()), bare)
}

/// True when the bare origin has a branch of the given name.
pub async fn remote_branch_exists(bare: &Path, branch: &str) -> bool {
    Command::new("git")
        .args([
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/heads/{branch}"),
        ])
        .current_dir(bare)
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

/// A task pointed at a local origin, with sensible test defaults.
pub fn task(id: &str, repo_url: &str, branch: &str) -> RunnerTask {
    RunnerTask {
        task_id: id.to_string(),
        repo_url: repo_url.to_string(),
        branch: branch.to_string(),
        base_branch: "main".to_string(),
        title: "fix add".to_string(),
        description: "fix add() to return a+b".to_string(),
        risk_tier: RiskTier::default(),
        complexity: Complexity::default(),
        engine: Some("mock".to_string()),
        model: None,
        max_turns: 40,
        timeout_seconds: 3600,
        env_vars: HashMap::new(),
        constitution: String::new(),
        callback_url: None,
        max_cost_usd: 0.0,
        sandbox_mode: false,
        sandbox_image: DEFAULT_SANDBOX_IMAGE.to_string(),
        workspace_path: None,
    }
}

/// Poll until the task reaches a terminal status or the deadline passes.
pub async fn wait_for_terminal(state: &SharedTaskState, deadline: Duration) -> TaskStatus {
    let start = std::time::Instant::now();
    loop {
        let status = state.read().await.status;
        if status.is_terminal() {
            return status;
        }
        assert!(
            start.elapsed() < deadline,
            "task did not reach a terminal status within {deadline:?} (last: {status:?})"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
