use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use sha1::Sha1;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::StorageConfig;
use crate::error::ToolError;
use crate::util::{http, safe_filename};

use super::{param_str, Action, Params, Tool, ToolOutcome};

const TIMEOUT: Duration = Duration::from_secs(60);

type HmacSha1 = Hmac<Sha1>;

/// Qiniu object storage form uploads.
pub struct QiniuStorage {
    config: StorageConfig,
}

impl QiniuStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    /// Upload token `access_key:sign:policy` scoped to one key.
    pub fn upload_token(&self, key: &str, now_secs: i64) -> Result<String, ToolError> {
        let policy = json!({
            "scope": format!("{}:{}", self.config.bucket, key),
            "deadline": now_secs + self.config.token_ttl_secs as i64,
        });
        let encoded_policy = URL_SAFE.encode(policy.to_string());

        let Ok(mut mac) = HmacSha1::new_from_slice(self.config.secret_key.as_bytes()) else {
            return Err(ToolError::InvalidParams("unusable storage secret key".to_string()));
        };
        mac.update(encoded_policy.as_bytes());
        let sign = URL_SAFE.encode(mac.finalize().into_bytes());

        Ok(format!("{}:{}:{}", self.config.access_key, sign, encoded_policy))
    }

    /// Public URL of an uploaded key.
    pub fn public_url(&self, key: &str) -> String {
        let domain = self.config.domain.trim_end_matches('/');
        if domain.starts_with("http://") || domain.starts_with("https://") {
            format!("{domain}/{key}")
        } else {
            format!("http://{domain}/{key}")
        }
    }

    /// Upload bytes under `key` and return the public URL.
    pub async fn upload(&self, key: &str, data: Vec<u8>, mime: &str) -> Result<String, ToolError> {
        if !self.is_configured() {
            return Err(ToolError::NotConfigured(
                "object storage (QINIU_ACCESS_KEY, QINIU_SECRET_KEY, QINIU_BUCKET_NAME, QINIU_DOMAIN)".to_string(),
            ));
        }

        let token = self.upload_token(key, chrono::Utc::now().timestamp())?;
        let file_name = key.rsplit('/').next().unwrap_or(key).to_string();
        let part = Part::bytes(data).file_name(file_name).mime_str(mime)?;
        let form = Form::new()
            .text("token", token)
            .text("key", key.to_string())
            .part("file", part);

        let resp = http::client()
            .post(&self.config.upload_url)
            .multipart(form)
            .timeout(TIMEOUT)
            .send()
            .await?;

        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let message = body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("upload failed")
                .to_string();
            return Err(ToolError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let stored_key = body.get("key").and_then(|v| v.as_str()).unwrap_or(key);
        let url = self.public_url(stored_key);
        info!("Uploaded {} to object storage", stored_key);
        Ok(url)
    }
}

/// Object key for a user file: `relaybot/<date>/<time>_<name>`.
pub fn object_key(file_name: &str) -> String {
    let now = chrono::Local::now();
    format!(
        "relaybot/{}/{}_{}",
        now.format("%Y%m%d"),
        now.format("%H%M%S"),
        safe_filename(file_name).replace(' ', "_")
    )
}

/// Upload text content as a file and return its link.
pub struct UploadFileTool {
    storage: Arc<QiniuStorage>,
}

impl UploadFileTool {
    pub fn new(storage: Arc<QiniuStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Tool for UploadFileTool {
    fn action(&self) -> Action {
        Action::UploadFile
    }

    fn description(&self) -> &str {
        "Save text content as a file in cloud storage and return a download link"
    }

    fn parameters(&self) -> Value {
        json!({"file_name": "notes.txt", "content": "Meeting notes ..."})
    }

    async fn execute(&self, params: &Params) -> ToolOutcome {
        let file_name = param_str(params, "file_name");
        let content = param_str(params, "content");
        if file_name.is_empty() || content.is_empty() {
            return ToolOutcome::error("file_name and content are required");
        }

        let key = object_key(&file_name);
        match self
            .storage
            .upload(&key, content.into_bytes(), "text/plain; charset=utf-8")
            .await
        {
            Ok(url) => ToolOutcome::Text(format!("File uploaded: {url}")),
            Err(e) => ToolOutcome::error(format!("failed to upload {file_name}: {e}")),
        }
    }
}
