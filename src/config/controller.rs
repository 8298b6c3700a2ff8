//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::{
    ARCH_LABEL, DEFAULT_API_TIMEOUT_SECS, DEFAULT_LOG_LIMIT_BYTES, DEFAULT_MAX_OWNER_HOPS,
    DEFAULT_MAX_RETRIES, DEFAULT_METRICS_PORT, DEFAULT_QUEUE_BASE_DELAY_MS,
    DEFAULT_QUEUE_MAX_DELAY_SECS, DEFAULT_WORKERS, EXEC_FORMAT_ERROR_SIGNATURE,
    LEGACY_ARCH_LABEL,
};
use crate::controller::kinds::{KindMappingSpec, KindRegistry};
use crate::controller::queue::QueueConfig;
use crate::runtime::error_policy::RetryPolicy;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("EXTRA_KIND_MAPPINGS is not a valid JSON list of kind mappings: {0}")]
    InvalidKindMappings(#[source] serde_json::Error),
}

/// Controller-level configuration
///
/// All settings have defaults and can be overridden via environment variables,
/// and a few of them again via command line flags.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of concurrent reconciliation workers
    pub workers: usize,
    /// First retry delay for a failing key (milliseconds)
    pub queue_base_delay_ms: u64,
    /// Ceiling for the per-key retry delay (seconds)
    pub queue_max_delay_secs: u64,
    /// Requeues allowed per key before it is abandoned; 0 retries forever
    pub max_retries: u32,
    /// Maximum owner reference hops followed from a Pod
    pub max_owner_hops: usize,
    /// Node label carrying the CPU architecture
    pub arch_label_key: String,
    /// Exact container log output that identifies an architecture mismatch
    pub failure_signature: String,
    /// Cap on log bytes read per container
    pub log_limit_bytes: i64,
    /// Timeout for each Kubernetes API call (seconds)
    pub api_timeout_secs: u64,
    /// Restrict the Pod watch to one namespace; `None` watches all namespaces
    pub watch_namespace: Option<String>,
    /// Port of the metrics and probe server
    pub metrics_port: u16,
    /// Workload kinds registered on top of the built-in ones
    pub extra_kind_mappings: Vec<KindMappingSpec>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_base_delay_ms: DEFAULT_QUEUE_BASE_DELAY_MS,
            queue_max_delay_secs: DEFAULT_QUEUE_MAX_DELAY_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            max_owner_hops: DEFAULT_MAX_OWNER_HOPS,
            arch_label_key: ARCH_LABEL.to_string(),
            failure_signature: EXEC_FORMAT_ERROR_SIGNATURE.to_string(),
            log_limit_bytes: DEFAULT_LOG_LIMIT_BYTES,
            api_timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            watch_namespace: None,
            metrics_port: DEFAULT_METRICS_PORT,
            extra_kind_mappings: Vec::new(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    ///
    /// # Errors
    ///
    /// Fails when `EXTRA_KIND_MAPPINGS` is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    ///
    /// Unparseable numeric values fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Fails when `EXTRA_KIND_MAPPINGS` is set but cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let extra_kind_mappings = match non_empty(&lookup, "EXTRA_KIND_MAPPINGS") {
            Some(json) => {
                KindMappingSpec::parse_list(&json).map_err(ConfigError::InvalidKindMappings)?
            }
            None => Vec::new(),
        };

        Ok(Self {
            workers: var_or_default(&lookup, "WORKERS", DEFAULT_WORKERS),
            queue_base_delay_ms: var_or_default(
                &lookup,
                "QUEUE_BASE_DELAY_MS",
                DEFAULT_QUEUE_BASE_DELAY_MS,
            ),
            queue_max_delay_secs: var_or_default(
                &lookup,
                "QUEUE_MAX_DELAY_SECS",
                DEFAULT_QUEUE_MAX_DELAY_SECS,
            ),
            max_retries: var_or_default(&lookup, "MAX_RETRIES", DEFAULT_MAX_RETRIES),
            max_owner_hops: var_or_default(&lookup, "MAX_OWNER_HOPS", DEFAULT_MAX_OWNER_HOPS),
            arch_label_key: non_empty(&lookup, "ARCH_LABEL_KEY")
                .unwrap_or_else(|| ARCH_LABEL.to_string()),
            failure_signature: non_empty(&lookup, "FAILURE_SIGNATURE")
                .unwrap_or_else(|| EXEC_FORMAT_ERROR_SIGNATURE.to_string()),
            log_limit_bytes: var_or_default(&lookup, "LOG_LIMIT_BYTES", DEFAULT_LOG_LIMIT_BYTES),
            api_timeout_secs: var_or_default(&lookup, "API_TIMEOUT_SECS", DEFAULT_API_TIMEOUT_SECS),
            watch_namespace: non_empty(&lookup, "WATCH_NAMESPACE"),
            metrics_port: var_or_default(&lookup, "METRICS_PORT", DEFAULT_METRICS_PORT),
            extra_kind_mappings,
        })
    }

    /// Queue backoff settings
    ///
    /// The base delay is at least 1ms and the ceiling never below it, so a key
    /// retried forever still waits between attempts.
    #[must_use]
    pub fn queue_config(&self) -> QueueConfig {
        let base_delay = Duration::from_millis(self.queue_base_delay_ms.max(1));
        QueueConfig {
            base_delay,
            max_delay: Duration::from_secs(self.queue_max_delay_secs).max(base_delay),
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_max_retries(self.max_retries)
    }

    #[must_use]
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Label keys tried in order when reading a node's architecture
    #[must_use]
    pub fn arch_label_keys(&self) -> Vec<String> {
        let mut keys = vec![self.arch_label_key.clone()];
        if self.arch_label_key != LEGACY_ARCH_LABEL {
            keys.push(LEGACY_ARCH_LABEL.to_string());
        }
        keys
    }

    /// Built-in workload kinds plus the configured extras
    #[must_use]
    pub fn kind_registry(&self) -> KindRegistry {
        let mut registry = KindRegistry::builtin();
        for spec in &self.extra_kind_mappings {
            registry.register(spec.clone());
        }
        registry
    }
}

/// Read a variable and parse it, or return the default
fn var_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ControllerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ControllerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.workers, 1);
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.retry_policy().max_retries, None);
        assert_eq!(config.queue_config().base_delay, Duration::from_millis(5));
        assert_eq!(config.queue_config().max_delay, Duration::from_secs(1000));
        assert_eq!(config.metrics_port, 5000);
        assert_eq!(config.watch_namespace, None);
        assert_eq!(config.failure_signature, EXEC_FORMAT_ERROR_SIGNATURE);
        assert_eq!(
            config.arch_label_keys(),
            ["kubernetes.io/arch", "beta.kubernetes.io/arch"]
        );
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("WORKERS", "4"),
            ("MAX_RETRIES", "5"),
            ("QUEUE_BASE_DELAY_MS", "100"),
            ("WATCH_NAMESPACE", "team-a"),
            ("ARCH_LABEL_KEY", "beta.kubernetes.io/arch"),
        ])
        .unwrap();

        assert_eq!(config.workers, 4);
        assert_eq!(config.retry_policy().max_retries, Some(5));
        assert_eq!(config.queue_config().base_delay, Duration::from_millis(100));
        assert_eq!(config.watch_namespace.as_deref(), Some("team-a"));
        assert_eq!(config.arch_label_keys(), ["beta.kubernetes.io/arch"]);
    }

    #[test]
    fn test_unparseable_number_falls_back_to_default() {
        let config = load(&[("WORKERS", "many"), ("METRICS_PORT", "99999")]).unwrap();
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.metrics_port, DEFAULT_METRICS_PORT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_queue_delays_are_clamped() {
        let config = load(&[("QUEUE_BASE_DELAY_MS", "0"), ("QUEUE_MAX_DELAY_SECS", "0")]).unwrap();
        let queue_config = config.queue_config();
        assert_eq!(queue_config.base_delay, Duration::from_millis(1));
        assert_eq!(queue_config.max_delay, Duration::from_millis(1));

        // A failing key is not handed straight back to the worker
        let queue = crate::controller::queue::WorkQueue::new(queue_config);
        assert_eq!(
            queue.add_rate_limited("ns/a".to_string()),
            Duration::from_millis(1)
        );
        assert!(queue.is_empty());
        assert_eq!(queue.get().await.as_deref(), Some("ns/a"));
    }

    #[test]
    fn test_extra_kind_mappings() {
        let config = load(&[(
            "EXTRA_KIND_MAPPINGS",
            r#"[{"kind":"Rollout","group":"argoproj.io","version":"v1alpha1","plural":"rollouts"}]"#,
        )])
        .unwrap();

        let registry = config.kind_registry();
        assert!(registry.lookup("Rollout").is_some());
        assert!(registry.lookup("Deployment").is_some());
    }

    #[test]
    fn test_invalid_kind_mappings_rejected() {
        let result = load(&[("EXTRA_KIND_MAPPINGS", "{not json")]);
        assert!(matches!(result, Err(ConfigError::InvalidKindMappings(_))));
    }
}
