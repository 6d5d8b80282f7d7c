use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Default upper bound on reference text embedded in the prompt.
pub const DEFAULT_MAX_REFERENCE_CHARS: usize = 30_000;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MemodiConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    pub model: String,
    pub base_url: String,
    /// Takes precedence over `GOOGLE_API_KEY`.
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "gemini-pro-latest".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
            timeout_seconds: 120,
        }
    }
}

impl ModelConfig {
    /// Resolve the model API key: configured value, then `GOOGLE_API_KEY`,
    /// then whatever the user typed in.
    pub fn resolve_api_key(&self, entered: Option<&str>) -> Option<String> {
        non_blank(self.api_key.as_deref())
            .or_else(|| non_blank(std::env::var("GOOGLE_API_KEY").ok().as_deref()))
            .or_else(|| non_blank(entered))
    }

    /// True when a key is available without interactive entry.
    pub fn has_stored_key(&self) -> bool {
        self.resolve_api_key(None).is_some()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PromptConfig {
    pub max_reference_chars: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_reference_chars: DEFAULT_MAX_REFERENCE_CHARS,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScoringConfig {
    pub enabled: bool,
    /// Name of the pre-existing spreadsheet that receives score rows.
    pub document_name: String,
    /// Service-account key file. Falls back to `GOOGLE_APPLICATION_CREDENTIALS`.
    pub credentials_path: Option<String>,
    pub sheets_base_url: String,
    pub drive_base_url: String,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            document_name: "Simulador Medico - Calificaciones".to_string(),
            credentials_path: None,
            sheets_base_url: "https://sheets.googleapis.com/v4".to_string(),
            drive_base_url: "https://www.googleapis.com/drive/v3".to_string(),
            max_retries: 2,
            retry_delay_ms: 500,
        }
    }
}

impl ScoringConfig {
    pub fn credentials_path(&self) -> Option<PathBuf> {
        let raw = non_blank(self.credentials_path.as_deref()).or_else(|| {
            non_blank(std::env::var("GOOGLE_APPLICATION_CREDENTIALS").ok().as_deref())
        })?;
        Some(PathBuf::from(shellexpand::tilde(&raw).into_owned()))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

impl MemodiConfig {
    /// Load from a TOML file (optional) overlaid with `MEMODI__SECTION__KEY`
    /// environment variables.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("MEMODI").separator("__"))
            .build()?;
        s.try_deserialize()
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
