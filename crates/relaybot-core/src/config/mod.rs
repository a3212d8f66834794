use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Root configuration for relaybot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[derive(Default)]
pub struct Config {
    pub agent: AgentConfig,
    pub dingtalk: DingTalkConfig,
    pub gateway: GatewayConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// API key for the chat-completion endpoint, if configured.
    pub fn get_api_key(&self) -> Option<&str> {
        let key = self.agent.api_key.trim();
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    }

    /// Reject settings the gateway cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_tokens == 0 {
            return Err(ConfigError::Invalid("agent.maxTokens must be positive".to_string()));
        }
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return Err(ConfigError::Invalid(format!(
                "agent.temperature {} is outside 0.0..=2.0",
                self.agent.temperature
            )));
        }
        if self.gateway.stuck_after_secs == 0 {
            return Err(ConfigError::Invalid("gateway.stuckAfterSecs must be positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    pub api_key: String,
    pub api_base: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Conversation turns kept in memory (system prompt excluded).
    pub max_history: usize,
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: None,
            model: "deepseek-chat".to_string(),
            max_tokens: 2048,
            temperature: 0.3,
            max_history: 10,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DingTalkConfig {
    pub access_token: String,
    pub secret: String,
    pub api_base: String,
    /// Trigger word that prefixes group commands, e.g. `Test1 LLM ...`.
    pub keyword: String,
    /// Prepended to every reply posted back to the group.
    pub reply_prefix: String,
}

impl DingTalkConfig {
    pub fn is_configured(&self) -> bool {
        !self.access_token.is_empty() && !self.secret.is_empty()
    }
}

impl Default for DingTalkConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            secret: String::new(),
            api_base: "https://oapi.dingtalk.com".to_string(),
            keyword: String::new(),
            reply_prefix: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Age after which an in-flight task is reported as stuck.
    pub stuck_after_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            stuck_after_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[derive(Default)]
pub struct ToolsConfig {
    pub weather: WeatherConfig,
    pub email: EmailConfig,
    pub google: GoogleConfig,
    pub report: ReportConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeatherConfig {
    pub api_base: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_base: "https://wttr.in".to_string(),
        }
    }
}

/// Brevo transactional e-mail settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailConfig {
    pub api_key: String,
    pub sender_email: String,
    pub sender_name: String,
    pub api_base: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            sender_email: "noreply@brevo.com".to_string(),
            sender_name: "relaybot".to_string(),
            api_base: "https://api.brevo.com/v3".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub token_url: String,
    pub api_base: String,
    pub calendar_id: String,
    pub task_list: String,
    /// IANA zone sent with naive event times.
    pub time_zone: String,
    /// On-disk access token cache; empty disables it.
    pub token_cache: String,
}

impl GoogleConfig {
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty() && !self.refresh_token.is_empty()
    }

    /// Expanded token cache path, if caching is enabled.
    pub fn token_cache_path(&self) -> Option<PathBuf> {
        if self.token_cache.is_empty() {
            None
        } else {
            Some(expand_home(&self.token_cache))
        }
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            api_base: "https://www.googleapis.com".to_string(),
            calendar_id: "primary".to_string(),
            task_list: "@default".to_string(),
            time_zone: "Asia/Shanghai".to_string(),
            token_cache: "~/.relaybot/google_token.json".to_string(),
        }
    }
}

/// HTML-to-PDF renderer (a headless-Chromium HTTP service).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportConfig {
    pub renderer_url: String,
}

/// Qiniu object storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub domain: String,
    pub upload_url: String,
    pub token_ttl_secs: u64,
}

impl StorageConfig {
    pub fn is_configured(&self) -> bool {
        !self.access_key.is_empty()
            && !self.secret_key.is_empty()
            && !self.bucket.is_empty()
            && !self.domain.is_empty()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            secret_key: String::new(),
            bucket: String::new(),
            domain: String::new(),
            upload_url: "https://up.qiniup.com".to_string(),
            token_ttl_secs: 3600,
        }
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path.starts_with("~/") || path.starts_with("~\\") {
        if let Some(home) = dirs::home_dir() {
            return home.join(&path[2..]);
        }
    }
    PathBuf::from(path)
}

// ====== Config loading/saving ======

/// First non-empty value among the given environment variables.
fn env_value(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Load configuration from environment variables.
///
/// Priority:
/// 1. `RELAYBOT_CONFIG` env var: full JSON config
/// 2. Config file (or defaults) with individual env vars merged on top
pub fn load_config_from_env() -> Config {
    if let Ok(json) = std::env::var("RELAYBOT_CONFIG") {
        match serde_json::from_str::<Config>(&json) {
            Ok(config) => return config,
            Err(e) => {
                tracing::warn!("Failed to parse RELAYBOT_CONFIG: {}", e);
            }
        }
    }

    let mut cfg = load_config(None);
    apply_env_overrides(&mut cfg);
    cfg
}

/// Overlay individual environment variables on an existing config.
pub fn apply_env_overrides(cfg: &mut Config) {
    // Chat completion endpoint
    if let Some(v) = env_value(&["ARK_API_KEY"]) {
        cfg.agent.api_key = v;
    }
    if let Some(v) = env_value(&["ARK_API_BASE"]) {
        cfg.agent.api_base = Some(v);
    }
    if let Some(v) = env_value(&["ARK_MODEL", "RELAYBOT_MODEL"]) {
        cfg.agent.model = v;
    }

    // DingTalk robot
    if let Some(v) = env_value(&["ROBOT_ACCESS_TOKEN"]) {
        cfg.dingtalk.access_token = v;
    }
    if let Some(v) = env_value(&["ROBOT_SECRET"]) {
        cfg.dingtalk.secret = v;
    }
    if let Some(v) = env_value(&["RELAYBOT_KEYWORD"]) {
        cfg.dingtalk.keyword = v;
    }

    // Gateway
    if let Some(v) = env_value(&["DINGTALK_PORT", "PORT"]) {
        match v.parse() {
            Ok(port) => cfg.gateway.port = port,
            Err(e) => tracing::warn!("Ignoring invalid port {:?}: {}", v, e),
        }
    }

    // E-mail
    if let Some(v) = env_value(&["BREVO_API_KEY"]) {
        cfg.tools.email.api_key = v;
    }
    if let Some(v) = env_value(&["BREVO_SENDER_EMAIL"]) {
        cfg.tools.email.sender_email = v;
    }
    if let Some(v) = env_value(&["BREVO_SENDER_NAME"]) {
        cfg.tools.email.sender_name = v;
    }

    // Google Calendar / Tasks
    if let Some(v) = env_value(&["GOOGLE_CLIENT_ID"]) {
        cfg.tools.google.client_id = v;
    }
    if let Some(v) = env_value(&["GOOGLE_CLIENT_SECRET"]) {
        cfg.tools.google.client_secret = v;
    }
    if let Some(v) = env_value(&["GOOGLE_REFRESH_TOKEN"]) {
        cfg.tools.google.refresh_token = v;
    }
    if let Some(v) = env_value(&["GOOGLE_TOKEN_CACHE"]) {
        cfg.tools.google.token_cache = v;
    }
    if let Some(v) = env_value(&["GOOGLE_TIME_ZONE"]) {
        cfg.tools.google.time_zone = v;
    }

    // Report renderer
    if let Some(v) = env_value(&["REPORT_RENDERER_URL"]) {
        cfg.tools.report.renderer_url = v;
    }

    // Object storage
    if let Some(v) = env_value(&["QINIU_ACCESS_KEY", "Qiniu_ACCESS_KEY"]) {
        cfg.tools.storage.access_key = v;
    }
    if let Some(v) = env_value(&["QINIU_SECRET_KEY", "Qiniu_SECRET_KEY"]) {
        cfg.tools.storage.secret_key = v;
    }
    if let Some(v) = env_value(&["QINIU_BUCKET_NAME", "Qiniu_BUCKET_NAME"]) {
        cfg.tools.storage.bucket = v;
    }
    if let Some(v) = env_value(&["QINIU_DOMAIN", "Qiniu_DOMAIN"]) {
        cfg.tools.storage.domain = v;
    }
}

/// Get the default configuration file path.
pub fn get_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".relaybot")
        .join("config.json")
}

/// Load configuration from file or create default.
pub fn load_config(config_path: Option<&Path>) -> Config {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if path.exists() {
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Config>(&content) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to parse config from {}: {}", path.display(), e);
                    tracing::warn!("Using default configuration.");
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config from {}: {}", path.display(), e);
                tracing::warn!("Using default configuration.");
            }
        }
    }

    Config::default()
}

/// Save configuration to file.
pub fn save_config(config: &Config, config_path: Option<&Path>) -> std::result::Result<(), ConfigError> {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    Ok(())
}
