use chrono::{NaiveDate, NaiveDateTime};
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::GoogleConfig;
use crate::error::ToolError;
use crate::util::http;

const TIMEOUT: Duration = Duration::from_secs(15);
/// Refresh this many seconds before the token actually expires.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedToken {
    access_token: String,
    /// Unix seconds.
    expires_at: i64,
}

impl CachedToken {
    fn is_fresh(&self, now: i64) -> bool {
        !self.access_token.is_empty() && now + EXPIRY_MARGIN_SECS < self.expires_at
    }
}

/// Authenticated access to Google Calendar and Tasks, shared by their tools.
pub struct GoogleClient {
    config: GoogleConfig,
    token: Mutex<Option<CachedToken>>,
}

impl GoogleClient {
    pub fn new(config: GoogleConfig) -> Self {
        Self {
            config,
            token: Mutex::new(None),
        }
    }

    pub fn time_zone(&self) -> &str {
        &self.config.time_zone
    }

    pub fn calendar_events_url(&self) -> String {
        format!(
            "{}/calendar/v3/calendars/{}/events",
            self.api_base(),
            urlencoding::encode(&self.config.calendar_id)
        )
    }

    pub fn tasks_url(&self) -> String {
        format!(
            "{}/tasks/v1/lists/{}/tasks",
            self.api_base(),
            urlencoding::encode(&self.config.task_list)
        )
    }

    fn api_base(&self) -> &str {
        self.config.api_base.trim_end_matches('/')
    }

    /// Current access token, refreshed through the refresh-token grant
    /// when the cached one is missing or about to expire.
    pub async fn access_token(&self) -> Result<String, ToolError> {
        if !self.config.is_configured() {
            return Err(ToolError::NotConfigured(
                "Google API (GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET, GOOGLE_REFRESH_TOKEN)".to_string(),
            ));
        }

        let now = chrono::Utc::now().timestamp();
        let mut guard = self.token.lock().await;

        if guard.is_none() {
            *guard = self.config.token_cache_path().and_then(|p| read_cache(&p));
        }
        if let Some(token) = guard.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.access_token.clone());
        }

        let token = self.refresh(now).await?;
        if let Some(path) = self.config.token_cache_path() {
            write_cache(&path, &token);
        }
        let access = token.access_token.clone();
        *guard = Some(token);
        Ok(access)
    }

    async fn refresh(&self, now: i64) -> Result<CachedToken, ToolError> {
        debug!("Refreshing Google access token");
        let resp = http::client()
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", self.config.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .timeout(TIMEOUT)
            .send()
            .await?;

        let status = resp.status();
        let data: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let message = data
                .get("error_description")
                .or_else(|| data.get("error"))
                .and_then(|v| v.as_str())
                .unwrap_or("token refresh failed")
                .to_string();
            return Err(ToolError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let access_token = data
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Parse("no access_token in token response".to_string()))?
            .to_string();
        let expires_in = data.get("expires_in").and_then(|v| v.as_i64()).unwrap_or(3600);

        info!("Google access token refreshed (expires in {}s)", expires_in);
        Ok(CachedToken {
            access_token,
            expires_at: now + expires_in,
        })
    }

    pub async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Value, ToolError> {
        let req = http::client().get(url).query(query);
        let resp = self.send(req).await?;
        resp.json()
            .await
            .map_err(|e| ToolError::Parse(e.to_string()))
    }

    pub async fn post(&self, url: &str, body: &Value) -> Result<Value, ToolError> {
        let req = http::client().post(url).json(body);
        let resp = self.send(req).await?;
        resp.json()
            .await
            .map_err(|e| ToolError::Parse(e.to_string()))
    }

    pub async fn delete(&self, url: &str) -> Result<(), ToolError> {
        self.send(http::client().delete(url)).await?;
        Ok(())
    }

    async fn send(&self, req: RequestBuilder) -> Result<reqwest::Response, ToolError> {
        let token = self.access_token().await?;
        let resp = req.bearer_auth(token).timeout(TIMEOUT).send().await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let data: Value = resp.json().await.unwrap_or(Value::Null);
        let message = data
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .unwrap_or("request failed")
            .to_string();
        Err(ToolError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn read_cache(path: &Path) -> Option<CachedToken> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(token) => Some(token),
        Err(e) => {
            warn!("Ignoring unreadable token cache {}: {}", path.display(), e);
            None
        }
    }
}

fn write_cache(path: &Path, token: &CachedToken) {
    let result = (|| -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(token)?;
        std::fs::write(path, content)
    })();
    if let Err(e) = result {
        warn!("Failed to write token cache {}: {}", path.display(), e);
    }
}

/// Google date/time object for a user-supplied time.
///
/// RFC 3339 values are passed through; naive `YYYY-MM-DD HH:MM[:SS]`
/// (space or `T`) is tagged with `time_zone`; a bare date becomes an all-day value.
pub fn event_time(input: &str, time_zone: &str) -> Option<Value> {
    let input = input.trim();
    if chrono::DateTime::parse_from_rfc3339(input).is_ok() {
        return Some(json!({"dateTime": input}));
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ];
    if let Some(dt) = NAIVE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(input, f).ok())
    {
        return Some(json!({
            "dateTime": dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
            "timeZone": time_zone,
        }));
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .map(|d| json!({"date": d.format("%Y-%m-%d").to_string()}))
}
