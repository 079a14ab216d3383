//! Configuration loading for carebot.
//! Reads carebot.toml (or a .yaml file) from the path in CAREBOT_CONFIG,
//! then applies environment overrides for endpoints and secrets.

use serde::{Deserialize, Deserializer};
use secrecy::SecretString;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("Invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatbotConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub generative: GenerativeConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_max_question_chars")]
    pub max_question_chars: usize,
}

fn default_bind_addr()          -> String { "127.0.0.1:3001".to_string() }
fn default_max_question_chars() -> usize  { 2000 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: default_bind_addr(), max_question_chars: default_max_question_chars() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_classifier_url")]
    pub base_url: String,
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
    #[serde(default = "default_classify_timeout_ms")]
    pub classify_timeout_ms: u64,
}

fn default_classifier_url()      -> String { "http://localhost:8081".to_string() }
fn default_health_timeout_ms()   -> u64    { 2_500 }
fn default_classify_timeout_ms() -> u64    { 15_000 }

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: default_classifier_url(),
            health_timeout_ms: default_health_timeout_ms(),
            classify_timeout_ms: default_classify_timeout_ms(),
        }
    }
}

impl ClassifierConfig {
    pub fn health_timeout(&self) -> Duration { Duration::from_millis(self.health_timeout_ms) }
    pub fn classify_timeout(&self) -> Duration { Duration::from_millis(self.classify_timeout_ms) }
}

#[derive(Debug, Deserialize)]
pub struct GenerativeConfig {
    #[serde(default = "default_generative_url")]
    pub api_url: String,
    #[serde(default = "default_generative_model")]
    pub model: String,
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub api_key: Option<SecretString>,
    #[serde(default = "default_generative_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_safety_threshold")]
    pub safety_threshold: String,
}

fn default_generative_url()        -> String { "https://generativelanguage.googleapis.com/v1beta/models".to_string() }
fn default_generative_model()      -> String { "gemini-1.5-flash-latest".to_string() }
fn default_generative_timeout_ms() -> u64    { 30_000 }
fn default_temperature()           -> f32    { 0.7 }
fn default_top_k()                 -> u32    { 40 }
fn default_top_p()                 -> f32    { 0.95 }
fn default_max_output_tokens()     -> u32    { 1024 }
fn default_safety_threshold()      -> String { "BLOCK_MEDIUM_AND_ABOVE".to_string() }

impl Default for GenerativeConfig {
    fn default() -> Self {
        Self {
            api_url: default_generative_url(),
            model: default_generative_model(),
            api_key: None,
            timeout_ms: default_generative_timeout_ms(),
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            max_output_tokens: default_max_output_tokens(),
            safety_threshold: default_safety_threshold(),
        }
    }
}

impl GenerativeConfig {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.trim().is_empty()).map(SecretString::from))
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "bool_true")]
    pub enable_pii_detection: bool,
    #[serde(default = "bool_true")]
    pub enable_safety_gate: bool,
    #[serde(default = "bool_true")]
    pub enable_audit_logging: bool,
    #[serde(default = "default_max_context_length")]
    pub max_context_length: usize,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Overrides the built-in emergency keyword list when set.
    #[serde(default)]
    pub emergency_keywords: Option<Vec<String>>,
}

fn bool_true()                  -> bool  { true }
fn default_max_context_length() -> usize { 4_000 }
fn default_request_timeout_ms() -> u64   { 60_000 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enable_pii_detection: true,
            enable_safety_gate: true,
            enable_audit_logging: true,
            max_context_length: default_max_context_length(),
            request_timeout_ms: default_request_timeout_ms(),
            emergency_keywords: None,
        }
    }
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Duration { Duration::from_millis(self.request_timeout_ms) }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_high_risk_limit")]
    pub high_risk_limit: usize,
    #[serde(default = "default_anonymize_after")]
    pub anonymize_after_days: u32,
    #[serde(default = "default_retention")]
    pub retention_days: u32,
}

fn default_high_risk_limit() -> usize { 100 }
fn default_anonymize_after() -> u32   { 30 }
fn default_retention()       -> u32   { 365 }

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            high_risk_limit: default_high_risk_limit(),
            anonymize_after_days: default_anonymize_after(),
            retention_days: default_retention(),
        }
    }
}

/// Development stand-in for the external token verifier.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// bearer token → user id
    #[serde(default)]
    pub tokens: HashMap<String, String>,
    /// User ids allowed to use the audit tooling routes.
    #[serde(default)]
    pub admin_users: Vec<String>,
}

impl ChatbotConfig {
    /// Load configuration.
    /// Reads `.env` if present, then the file named by CAREBOT_CONFIG
    /// (default `carebot.toml`); a missing file means defaults.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env");
        }

        let path = std::env::var("CAREBOT_CONFIG")
            .unwrap_or_else(|_| "carebot.toml".to_string());

        let mut config = Self::from_path_or_default(Path::new(&path))?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_path_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply environment overrides through `lookup` so tests need not
    /// touch the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CLASSIFIER_URL").or_else(|| lookup("QWEN_API_URL")) {
            self.classifier.base_url = url;
        }
        if let Some(key) = lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.generative.api_key = Some(SecretString::from(key));
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            self.generative.model = model;
        }
        if let Some(addr) = lookup("CAREBOT_BIND_ADDR") {
            self.server.bind_addr = addr;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.classifier.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "classifier.base_url".into(),
                message: "must not be empty".into(),
            });
        }
        if !(0.0..=2.0).contains(&self.generative.temperature) {
            return Err(ConfigError::Invalid {
                key: "generative.temperature".into(),
                message: format!("{} is outside [0, 2]", self.generative.temperature),
            });
        }
        if self.pipeline.max_context_length == 0 {
            return Err(ConfigError::Invalid {
                key: "pipeline.max_context_length".into(),
                message: "must be positive".into(),
            });
        }
        Ok(())
    }
}
