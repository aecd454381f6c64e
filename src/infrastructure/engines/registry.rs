//! Engine registry — maps engine names to adapter instances and selects
//! the best engine for a given model.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{AiderAdapter, ClaudeCodeAdapter, CodexAdapter, GeminiCliAdapter, PiAdapter};
use crate::domain::error::RunnerError;
use crate::domain::ports::AgentEngine;

/// Ordered (model-prefix, engine-name) affinity pairs; first match wins.
pub const MODEL_AFFINITY: &[(&str, &str)] = &[
    ("claude", "claude-code"),
    ("gpt-", "codex"),
    ("o1", "codex"),
    ("o3", "codex"),
    ("gemini", "gemini-cli"),
];

/// Engine used when neither an override nor an affinity match applies.
const FALLBACK_ENGINE: &str = "aider";

/// Registry of engine adapters.
///
/// Built lazily on first use by the HTTP layer; [`EngineRegistry::reset`]
/// restores the default adapter set for test isolation, and
/// [`EngineRegistry::insert`] lets tests register mock engines.
pub struct EngineRegistry {
    engines: RwLock<HashMap<String, Arc<dyn AgentEngine>>>,
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self {
            engines: RwLock::new(Self::default_engines()),
        }
    }

    fn default_engines() -> HashMap<String, Arc<dyn AgentEngine>> {
        let adapters: Vec<Arc<dyn AgentEngine>> = vec![
            Arc::new(ClaudeCodeAdapter),
            Arc::new(CodexAdapter),
            Arc::new(GeminiCliAdapter),
            Arc::new(AiderAdapter),
            Arc::new(PiAdapter),
        ];
        adapters
            .into_iter()
            .map(|a| (a.name().to_string(), a))
            .collect()
    }

    /// Look an engine up by name.
    pub async fn get(&self, engine_name: &str) -> Result<Arc<dyn AgentEngine>, RunnerError> {
        let engines = self.engines.read().await;
        engines
            .get(engine_name)
            .cloned()
            .ok_or_else(|| RunnerError::UnknownEngine(engine_name.to_string()))
    }

    /// Pick the best engine for a task.
    ///
    /// Priority:
    /// 1. Explicit override (`preferred_engine` or `LAILATOV_ENGINE`).
    /// 2. Model affinity from [`MODEL_AFFINITY`].
    /// 3. The universal fallback (`aider`).
    pub async fn select(
        &self,
        model: Option<&str>,
        preferred_engine: Option<&str>,
    ) -> Result<Arc<dyn AgentEngine>, RunnerError> {
        let env_override = std::env::var("LAILATOV_ENGINE").unwrap_or_default();
        let override_name = preferred_engine
            .filter(|name| !name.is_empty())
            .map(ToString::to_string)
            .or_else(|| (!env_override.is_empty()).then(|| env_override.clone()));

        if let Some(name) = override_name {
            tracing::info!(engine = %name, "engine.select.override");
            return self.get(&name).await;
        }

        if let Some(model) = model {
            let lower = model.to_lowercase();
            for (prefix, engine_name) in MODEL_AFFINITY {
                if lower.starts_with(prefix) {
                    tracing::info!(engine = engine_name, model, "engine.select.affinity");
                    return self.get(engine_name).await;
                }
            }
        }

        tracing::info!(engine = FALLBACK_ENGINE, ?model, "engine.select.fallback");
        self.get(FALLBACK_ENGINE).await
    }

    /// Register (or replace) an adapter. Used by tests.
    pub async fn insert(&self, engine: Arc<dyn AgentEngine>) {
        let mut engines = self.engines.write().await;
        engines.insert(engine.name().to_string(), engine);
    }

    /// Restore the default adapter set.
    pub async fn reset(&self) {
        let mut engines = self.engines.write().await;
        *engines = Self::default_engines();
    }

    /// Names of all registered engines, sorted.
    pub async fn available(&self) -> Vec<String> {
        let engines = self.engines.read().await;
        let mut names: Vec<String> = engines.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Infer the provider name from a model name string.
///
/// Names carrying a `provider/` segment route through the openrouter
/// gateway; bare names map to the native provider by prefix, with
/// bedrock/vertex taking precedence when their env toggles are set.
pub fn derive_provider_from_model(model_name: &str) -> &'static str {
    if model_name.contains('/') {
        return "openrouter";
    }
    if std::env::var("CLAUDE_CODE_USE_BEDROCK").as_deref() == Ok("1") {
        return "bedrock";
    }
    if std::env::var("CLAUDE_CODE_USE_VERTEX").as_deref() == Ok("1") {
        return "vertex";
    }

    let lower = model_name.to_lowercase();
    if lower.starts_with("gpt-") || lower.starts_with("o1") || lower.starts_with("o3") {
        "openai"
    } else if lower.starts_with("gemini") {
        "google"
    } else if lower.starts_with("deepseek") {
        "deepseek"
    } else {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_registry_contents() {
        let registry = EngineRegistry::new();
        let names = registry.available().await;
        assert_eq!(
            names,
            vec!["aider", "claude-code", "codex", "gemini-cli", "oh-my-pi"]
        );
    }

    #[tokio::test]
    async fn test_get_unknown_engine() {
        let registry = EngineRegistry::new();
        let err = registry.get("nope").await.unwrap_err();
        assert_eq!(err, RunnerError::UnknownEngine("nope".to_string()));
    }

    #[tokio::test]
    async fn test_select_explicit_override() {
        temp_env::async_with_vars([("LAILATOV_ENGINE", None::<&str>)], async {
            let registry = EngineRegistry::new();
            let engine = registry.select(Some("gpt-4.1"), Some("aider")).await.unwrap();
            assert_eq!(engine.name(), "aider");
        })
        .await;
    }

    #[tokio::test]
    async fn test_select_env_override() {
        temp_env::async_with_vars([("LAILATOV_ENGINE", Some("codex"))], async {
            let registry = EngineRegistry::new();
            let engine = registry.select(Some("claude-sonnet-4-6"), None).await.unwrap();
            assert_eq!(engine.name(), "codex");
        })
        .await;
    }

    #[tokio::test]
    async fn test_select_model_affinity() {
        temp_env::async_with_vars([("LAILATOV_ENGINE", None::<&str>)], async {
            let registry = EngineRegistry::new();
            let claude = registry.select(Some("claude-opus-4-6"), None).await.unwrap();
            assert_eq!(claude.name(), "claude-code");
            let codex = registry.select(Some("o3-mini"), None).await.unwrap();
            assert_eq!(codex.name(), "codex");
            let gemini = registry.select(Some("gemini-2.5-pro"), None).await.unwrap();
            assert_eq!(gemini.name(), "gemini-cli");
        })
        .await;
    }

    #[tokio::test]
    async fn test_select_fallback() {
        temp_env::async_with_vars([("LAILATOV_ENGINE", None::<&str>)], async {
            let registry = EngineRegistry::new();
            let engine = registry.select(Some("kimi-k2"), None).await.unwrap();
            assert_eq!(engine.name(), "aider");
            let engine = registry.select(None, None).await.unwrap();
            assert_eq!(engine.name(), "aider");
        })
        .await;
    }

    #[test]
    fn test_derive_provider_gateway() {
        temp_env::with_vars(
            [
                ("CLAUDE_CODE_USE_BEDROCK", None::<&str>),
                ("CLAUDE_CODE_USE_VERTEX", None::<&str>),
            ],
            || {
                assert_eq!(
                    derive_provider_from_model("anthropic/claude-sonnet-4-6"),
                    "openrouter"
                );
                assert_eq!(derive_provider_from_model("deepseek/deepseek-chat"), "openrouter");
            },
        );
    }

    #[test]
    fn test_derive_provider_native_prefixes() {
        temp_env::with_vars(
            [
                ("CLAUDE_CODE_USE_BEDROCK", None::<&str>),
                ("CLAUDE_CODE_USE_VERTEX", None::<&str>),
            ],
            || {
                assert_eq!(derive_provider_from_model("claude-sonnet-4-6"), "anthropic");
                assert_eq!(derive_provider_from_model("gpt-4.1"), "openai");
                assert_eq!(derive_provider_from_model("o3-mini"), "openai");
                assert_eq!(derive_provider_from_model("gemini-2.5-pro"), "google");
                assert_eq!(derive_provider_from_model("deepseek-chat"), "deepseek");
            },
        );
    }

    #[test]
    fn test_derive_provider_env_toggles() {
        temp_env::with_vars(
            [
                ("CLAUDE_CODE_USE_BEDROCK", Some("1")),
                ("CLAUDE_CODE_USE_VERTEX", None::<&str>),
            ],
            || {
                assert_eq!(derive_provider_from_model("claude-sonnet-4-6"), "bedrock");
            },
        );
    }
}
