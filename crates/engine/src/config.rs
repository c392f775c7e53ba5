//! Process-wide engine configuration, resolved once at startup. The engine
//! holds no mutable singletons; callers construct one `EngineConfig` and
//! pass it (and the services it parameterizes) through the orchestrator
//! call frame.

use std::env;
use std::time::Duration;

/// LLM provider selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Remote,
    LocalOllama,
}

impl std::str::FromStr for LlmProvider {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remote" => Ok(LlmProvider::Remote),
            "local_ollama" | "local" => Ok(LlmProvider::LocalOllama),
            other => Err(anyhow::anyhow!("invalid LLM provider: {other}")),
        }
    }
}

/// Per-tier model identifiers, resolved at startup: a remote provider binds
/// every tier to its mini model, while a local provider routes mapping to
/// a smaller local model and reduction/validation to a larger one.
#[derive(Debug, Clone)]
pub struct ModelTiers {
    pub map_model: String,
    pub reduce_model: String,
    pub validation_model: String,
}

impl ModelTiers {
    pub fn resolve(
        provider: LlmProvider,
        remote_mini_model: &str,
        local_mini_model: &str,
        local_full_model: &str,
    ) -> Self {
        match provider {
            LlmProvider::Remote => ModelTiers {
                map_model: remote_mini_model.to_string(),
                reduce_model: remote_mini_model.to_string(),
                validation_model: remote_mini_model.to_string(),
            },
            LlmProvider::LocalOllama => ModelTiers {
                map_model: local_mini_model.to_string(),
                reduce_model: local_full_model.to_string(),
                validation_model: local_full_model.to_string(),
            },
        }
    }
}

/// Engine-level configuration assembled from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_path: String,
    pub working_dir_root: String,
    pub llm_provider: LlmProvider,
    pub remote_api_key: Option<String>,
    pub remote_base_url: String,
    pub model_tiers: ModelTiers,
    pub local_base_url: String,
    pub media_duration_cap_secs: u64,
    pub chunk_cap: usize,
    pub upload_byte_cap: u64,
    pub llm_timeout: Duration,
}

impl EngineConfig {
    /// Load configuration from the process environment, matching the
    /// `env::var(...).unwrap_or_else(...)` idiom used throughout the
    /// server crate's `main.rs`.
    pub fn from_env() -> anyhow::Result<Self> {
        let llm_provider: LlmProvider = env::var("LLM_PROVIDER")
            .unwrap_or_else(|_| "remote".to_string())
            .parse()?;

        let remote_mini_model =
            env::var("LLM_MINI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let local_mini_model =
            env::var("LOCAL_LLM_MINI_MODEL").unwrap_or_else(|_| "llama3.2:3b".to_string());
        let local_full_model =
            env::var("LOCAL_LLM_MODEL").unwrap_or_else(|_| "llama3.1:70b".to_string());

        let model_tiers = ModelTiers::resolve(
            llm_provider,
            &remote_mini_model,
            &local_mini_model,
            &local_full_model,
        );

        Ok(EngineConfig {
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "pipeline.db".to_string()),
            working_dir_root: env::var("WORKING_DIR_ROOT")
                .unwrap_or_else(|_| "/tmp/pipeline-jobs".to_string()),
            llm_provider,
            remote_api_key: env::var("LLM_API_KEY").ok(),
            remote_base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            model_tiers,
            local_base_url: env::var("LOCAL_LLM_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434/v1".to_string()),
            media_duration_cap_secs: env::var("DMAX")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(crate::DMAX),
            chunk_cap: env::var("CMAX")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(crate::CMAX),
            upload_byte_cap: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10 * 1024 * 1024),
            llm_timeout: Duration::from_secs(
                env::var("LLM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(120),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_provider_binds_all_tiers_to_mini_model() {
        let tiers = ModelTiers::resolve(LlmProvider::Remote, "gpt-4o-mini", "llama-mini", "llama-full");
        assert_eq!(tiers.map_model, "gpt-4o-mini");
        assert_eq!(tiers.reduce_model, "gpt-4o-mini");
        assert_eq!(tiers.validation_model, "gpt-4o-mini");
    }

    #[test]
    fn local_provider_uses_full_model_for_reduce_and_validation_only() {
        let tiers =
            ModelTiers::resolve(LlmProvider::LocalOllama, "gpt-4o-mini", "llama-mini", "llama-full");
        assert_eq!(tiers.map_model, "llama-mini");
        assert_eq!(tiers.reduce_model, "llama-full");
        assert_eq!(tiers.validation_model, "llama-full");
    }
}
