use std::collections::HashSet;
use std::env;
use std::time::Duration;

use crate::models::ModelId;

pub const DEFAULT_BASE_URL: &str = "http://localhost:1337";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Decides whether a failed sized request gets one more attempt without
/// the size parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPolicy {
    pub enabled: bool,
    pub strict_models: HashSet<ModelId>,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        FallbackPolicy {
            enabled: true,
            strict_models: HashSet::from([ModelId::DallE3]),
        }
    }
}

impl FallbackPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disabled() -> Self {
        FallbackPolicy {
            enabled: false,
            strict_models: HashSet::new(),
        }
    }

    pub fn with_strict_model(mut self, model: ModelId) -> Self {
        self.strict_models.insert(model);
        self
    }

    pub fn without_strict_model(mut self, model: ModelId) -> Self {
        self.strict_models.remove(&model);
        self
    }

    pub fn allows(&self, model: ModelId) -> bool {
        self.enabled && !self.strict_models.contains(&model)
    }

    pub fn from_env() -> Self {
        let enabled = env::var("IMGEN_SIZE_FALLBACK")
            .ok()
            .map_or(true, |val| val.trim() != "false");

        let strict_models = match env::var("IMGEN_STRICT_MODELS") {
            Ok(list) => list
                .split(',')
                .filter(|name| !name.trim().is_empty())
                .filter_map(|name| match name.parse::<ModelId>() {
                    Ok(model) => Some(model),
                    Err(_) => {
                        log::warn!("Ignoring unknown model in IMGEN_STRICT_MODELS: {}", name);
                        None
                    }
                })
                .collect(),
            Err(_) => FallbackPolicy::default().strict_models,
        };

        FallbackPolicy {
            enabled,
            strict_models,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub fetch_timeout: Duration,
    pub fallback: FallbackPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            fallback: FallbackPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let base_url = env::var("IMGEN_BASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let api_key = env::var("IMGEN_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        let request_timeout = secs_from_env("IMGEN_REQUEST_TIMEOUT_SECS")
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let fetch_timeout =
            secs_from_env("IMGEN_FETCH_TIMEOUT_SECS").unwrap_or(DEFAULT_FETCH_TIMEOUT);

        ClientConfig {
            base_url,
            api_key,
            request_timeout,
            fetch_timeout,
            fallback: FallbackPolicy::from_env(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_fallback(mut self, policy: FallbackPolicy) -> Self {
        self.fallback = policy;
        self
    }

    /// Full URL of the generation route.
    pub fn generations_url(&self) -> String {
        format!(
            "{}/v1/images/generations",
            self.base_url.trim_end_matches('/')
        )
    }
}

fn secs_from_env(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
        assert!(config.api_key.is_none());
        assert!(config.fallback.allows(ModelId::Flux));
        assert!(!config.fallback.allows(ModelId::DallE3));
    }

    #[test]
    fn test_generations_url_trims_slash() {
        let config = ClientConfig::new().with_base_url("http://127.0.0.1:8080/");
        assert_eq!(
            config.generations_url(),
            "http://127.0.0.1:8080/v1/images/generations"
        );
    }

    #[test]
    fn test_fallback_policy_builders() {
        let policy = FallbackPolicy::new()
            .with_strict_model(ModelId::Midjourney)
            .without_strict_model(ModelId::DallE3);
        assert!(policy.allows(ModelId::DallE3));
        assert!(!policy.allows(ModelId::Midjourney));
        assert!(!FallbackPolicy::disabled().allows(ModelId::Flux));
    }
}
