use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use crate::poll::PollSettings;

/// Low-rank adaptation parameters sent with every customization job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoraConfig {
    pub adapter_dim: u32,
    pub adapter_dropout: f64,
}

impl Default for LoraConfig {
    fn default() -> Self {
        Self {
            adapter_dim: 32,
            adapter_dropout: 0.1,
        }
    }
}

/// Training hyperparameters. Serializes to the `hyperparameters` object the
/// customization service expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub training_type: String,
    pub finetuning_type: String,
    pub epochs: u32,
    pub batch_size: u32,
    pub learning_rate: f64,
    pub lora: LoraConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            training_type: "sft".to_string(),
            finetuning_type: "lora".to_string(),
            epochs: 2,
            batch_size: 16,
            learning_rate: 0.0001,
            lora: LoraConfig::default(),
        }
    }
}

/// Interval/timeout pair for one of the wait loops, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            timeout_secs: 3600,
        }
    }
}

/// Everything the orchestrator needs to talk to the customization platform.
///
/// Built once at startup and handed to each component; nothing reads
/// configuration from global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Base URL of the customizer / entity store API.
    pub nemo_base_url: String,
    /// Base URL of the NIM deployment registry used for model sync checks.
    pub nim_base_url: String,
    /// Namespace for datasets and customized output models.
    pub namespace: String,
    pub customization: PollConfig,
    pub model_sync: PollConfig,
    /// Upper bound on how long an interruptible sleep goes without
    /// re-checking the cancellation store.
    pub cancel_check_slice_ms: u64,
    /// Per-request timeout for calls to the remote services.
    pub request_timeout_secs: u64,
    /// Default hyperparameters for new jobs.
    pub training: TrainingConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            nemo_base_url: "http://nemo.test".to_string(),
            nim_base_url: "http://nim.test".to_string(),
            namespace: "dfwbp".to_string(),
            customization: PollConfig::default(),
            model_sync: PollConfig::default(),
            cancel_check_slice_ms: 1000,
            request_timeout_secs: 60,
            training: TrainingConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from the resolved config file, or fall back to
    /// defaults when no file is present.
    pub fn load() -> anyhow::Result<Self> {
        let config = match resolve_config_path() {
            Some(path) => {
                tracing::info!("Loading orchestrator config from {}", path.display());
                Self::from_file(&path)?
            }
            None => {
                tracing::info!("No orchestrator config file found, using defaults");
                Self::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config file, expanding `${VAR}` references in string values.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config `{}`: {}", path.display(), e))?;
        let cfg: OrchestratorConfig = serde_json::from_str(&raw)?;
        Ok(expand_config(cfg))
    }

    /// Check URLs and polling values before any component is built from them.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (field, value) in [
            ("nemo_base_url", &self.nemo_base_url),
            ("nim_base_url", &self.nim_base_url),
        ] {
            let parsed = url::Url::parse(value)
                .map_err(|e| anyhow::anyhow!("`{}` is not a valid URL ({}): {}", field, value, e))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(anyhow::anyhow!(
                    "`{}` must use http or https, got `{}`",
                    field,
                    parsed.scheme()
                ));
            }
        }

        if self.namespace.trim().is_empty() {
            return Err(anyhow::anyhow!("`namespace` must not be empty"));
        }

        for (field, poll) in [
            ("customization", &self.customization),
            ("model_sync", &self.model_sync),
        ] {
            if poll.interval_secs == 0 || poll.timeout_secs == 0 {
                return Err(anyhow::anyhow!(
                    "`{}` interval and timeout must be greater than zero",
                    field
                ));
            }
        }

        if self.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("`request_timeout_secs` must be greater than zero"));
        }

        if self.cancel_check_slice_ms == 0 {
            return Err(anyhow::anyhow!("`cancel_check_slice_ms` must be greater than zero"));
        }

        Ok(())
    }

    /// Customizer base URL without a trailing slash.
    pub fn nemo_url(&self) -> &str {
        self.nemo_base_url.trim_end_matches('/')
    }

    /// NIM base URL without a trailing slash.
    pub fn nim_url(&self) -> &str {
        self.nim_base_url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn customization_settings(&self) -> PollSettings {
        self.poll_settings(self.customization)
    }

    pub fn model_sync_settings(&self) -> PollSettings {
        self.poll_settings(self.model_sync)
    }

    fn poll_settings(&self, poll: PollConfig) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(poll.interval_secs),
            timeout: Duration::from_secs(poll.timeout_secs),
            cancel_check_slice: Duration::from_millis(self.cancel_check_slice_ms),
        }
    }
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(p) = env::var("ORCHESTRATOR_CONFIG") {
        return Some(PathBuf::from(p));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg)
            .join("customizer")
            .join("orchestrator.json");
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let candidate = PathBuf::from("orchestrator.json");
    if candidate.exists() {
        return Some(candidate);
    }

    None
}

fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            if let Ok(val) = env::var(&name) {
                out.push_str(&val);
            } else {
                out.push_str("${");
                out.push_str(&name);
                out.push('}');
            }
        } else {
            out.push(ch);
        }
    }

    out
}

fn expand_config(cfg: OrchestratorConfig) -> OrchestratorConfig {
    let mut cfg = cfg;

    cfg.nemo_base_url = expand_env_vars(&cfg.nemo_base_url);
    cfg.nim_base_url = expand_env_vars(&cfg.nim_base_url);
    cfg.namespace = expand_env_vars(&cfg.namespace);

    cfg
}
