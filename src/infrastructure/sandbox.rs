//! Docker sandbox configuration for isolated agent execution.
//!
//! Wraps engine commands in a container with network isolation, resource
//! limits, a read-only root filesystem, and the workspace bind-mounted at
//! a fixed guest path. Environment variables are forwarded via explicit
//! `-e` flags, never by inheritance.

use std::collections::HashMap;

/// Hosts a network-enabled sandbox may reach.
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &[
    "pypi.org",
    "files.pythonhosted.org",
    "registry.npmjs.org",
    "github.com",
    "api.github.com",
];

/// Configuration for a docker sandbox.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub image: String,
    pub workspace_mount: String,
    pub network_mode: String,
    pub memory_limit: String,
    pub cpu_limit: String,
    pub read_only_root: bool,
    pub allowed_hosts: Vec<String>,
}

impl SandboxConfig {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            workspace_mount: "/workspace".to_string(),
            network_mode: "none".to_string(),
            memory_limit: "4g".to_string(),
            cpu_limit: "2.0".to_string(),
            read_only_root: true,
            allowed_hosts: Vec::new(),
        }
    }

    /// Sandbox with bridge networking and an allow-list of hosts.
    pub fn with_network(image: impl Into<String>, allowed_hosts: Option<Vec<String>>) -> Self {
        let mut config = Self::new(image);
        config.network_mode = "bridge".to_string();
        config.allowed_hosts = allowed_hosts.unwrap_or_else(|| {
            DEFAULT_ALLOWED_HOSTS.iter().map(|h| (*h).to_string()).collect()
        });
        config
    }
}

/// Build a `docker run` command wrapping `inner_cmd`.
///
/// The wrapped inner command is appended last, after the image name.
pub fn build_docker_cmd(
    config: &SandboxConfig,
    inner_cmd: &[String],
    workspace_path: &str,
    env_vars: &HashMap<String, String>,
) -> Vec<String> {
    let mut cmd = vec![
        "docker".to_string(),
        "run".to_string(),
        "--rm".to_string(),
        format!("--network={}", config.network_mode),
        format!("--memory={}", config.memory_limit),
        format!("--cpus={}", config.cpu_limit),
        "-v".to_string(),
        format!("{workspace_path}:{}", config.workspace_mount),
        "-w".to_string(),
        config.workspace_mount.clone(),
    ];

    if config.read_only_root {
        cmd.push("--read-only".to_string());
        cmd.push("--tmpfs".to_string());
        cmd.push("/tmp:rw,noexec,nosuid,size=1g".to_string());
    }

    let mut keys: Vec<&String> = env_vars.keys().collect();
    keys.sort();
    for key in keys {
        cmd.push("-e".to_string());
        cmd.push(format!("{key}={}", env_vars[key]));
    }

    cmd.push(config.image.clone());
    cmd.extend(inner_cmd.iter().cloned());

    tracing::info!(
        image = %config.image,
        network = %config.network_mode,
        memory = %config.memory_limit,
        "sandbox.cmd"
    );

    cmd
}
