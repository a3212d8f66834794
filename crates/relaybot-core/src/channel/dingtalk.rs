use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::channel::Channel;
use crate::config::DingTalkConfig;
use crate::error::ChannelError;
use crate::types::{InboundMessage, OutboundMessage};
use crate::util::{self, http::client};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

type HmacSha256 = Hmac<Sha256>;

static AT_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<at id=".*?">@.*?</at>"#).expect("valid at-tag pattern")
});

/// Signature for a robot request: URL-escaped base64 of
/// HMAC-SHA256(secret, "{timestamp}\n{secret}").
pub fn sign(timestamp: i64, secret: &str) -> Result<String, ChannelError> {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return Err(ChannelError::NotConfigured("unusable robot secret".to_string()));
    };
    mac.update(format!("{timestamp}\n{secret}").as_bytes());
    let encoded = STANDARD.encode(mac.finalize().into_bytes());
    Ok(urlencoding::encode(&encoded).into_owned())
}

fn at_block(at_user_ids: &[String], at_mobiles: &[String], is_at_all: bool) -> Value {
    json!({
        "isAtAll": is_at_all,
        "atUserIds": at_user_ids,
        "atMobiles": at_mobiles,
    })
}

/// Request body for a text message.
pub fn text_body(msg: &OutboundMessage) -> Value {
    json!({
        "at": at_block(&msg.at_user_ids, &msg.at_mobiles, msg.is_at_all),
        "text": {"content": msg.content},
        "msgtype": "text",
    })
}

/// Request body for a file message.
pub fn file_body(media_id: &str, at_user_ids: &[String]) -> Value {
    json!({
        "at": at_block(at_user_ids, &[], false),
        "file": {"media_id": media_id},
        "msgtype": "file",
    })
}

/// DingTalk custom group robot (signed webhook).
pub struct DingTalkChannel {
    config: DingTalkConfig,
}

impl DingTalkChannel {
    pub fn new(config: DingTalkConfig) -> Self {
        Self { config }
    }

    fn signed_url(&self, endpoint: &str) -> Result<String, ChannelError> {
        if !self.config.is_configured() {
            return Err(ChannelError::NotConfigured(
                "DingTalk robot (ROBOT_ACCESS_TOKEN, ROBOT_SECRET)".to_string(),
            ));
        }
        let timestamp = util::timestamp_millis();
        let sign = sign(timestamp, &self.config.secret)?;
        Ok(format!(
            "{}/robot/{}?access_token={}&timestamp={}&sign={}",
            self.config.api_base.trim_end_matches('/'),
            endpoint,
            urlencoding::encode(&self.config.access_token),
            timestamp,
            sign
        ))
    }

    async fn check(resp: reqwest::Response) -> Result<Value, ChannelError> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!("DingTalk API error: {} {}", status, text);
            return Err(ChannelError::Api {
                code: i64::from(status.as_u16()),
                message: text,
            });
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Parse(e.to_string()))?;
        let code = data.get("errcode").and_then(|v| v.as_i64()).unwrap_or(-1);
        if code != 0 {
            let message = data
                .get("errmsg")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error")
                .to_string();
            error!("DingTalk robot rejected request: {} {}", code, message);
            return Err(ChannelError::Api { code, message });
        }
        Ok(data)
    }

    async fn post(&self, body: &Value) -> Result<(), ChannelError> {
        let url = self.signed_url("send")?;
        let resp = client()
            .post(&url)
            .timeout(SEND_TIMEOUT)
            .json(body)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Upload a file for use in a file message; returns its `media_id`.
    pub async fn upload_media(&self, file_name: &str, data: Vec<u8>) -> Result<String, ChannelError> {
        let url = self.signed_url("upload")?;
        let part = Part::bytes(data).file_name(file_name.to_string());
        let form = Form::new().text("type", "file").part("media", part);

        let resp = client()
            .post(&url)
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form)
            .send()
            .await?;
        let data = Self::check(resp).await?;

        data.get("media_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ChannelError::Parse("no media_id in upload response".to_string()))
    }
}

#[async_trait]
impl Channel for DingTalkChannel {
    fn name(&self) -> &str {
        "dingtalk"
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        self.post(&text_body(msg)).await?;
        debug!("DingTalk message sent ({} chars)", msg.content.chars().count());
        Ok(())
    }

    async fn send_file(
        &self,
        file_name: &str,
        data: Vec<u8>,
        at_user_ids: &[String],
    ) -> Result<(), ChannelError> {
        let media_id = self.upload_media(file_name, data).await?;
        self.post(&file_body(&media_id, at_user_ids)).await?;
        info!("DingTalk file {} sent", file_name);
        Ok(())
    }
}

// ====== DingTalk Webhook Types ======

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DingTalkWebhook {
    pub msgtype: Option<String>,
    pub text: Option<DingTalkText>,
    pub at_users: Vec<DingTalkAtUser>,
    pub conversation_id: Option<String>,
    pub sender_id: Option<String>,
    pub sender_nick: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DingTalkText {
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DingTalkAtUser {
    pub dingtalk_id: Option<String>,
    pub staff_id: Option<String>,
}

/// Remove `<at id="...">@name</at>` mention tags.
pub fn strip_at_tags(content: &str) -> String {
    AT_TAG.replace_all(content, "").trim().to_string()
}

impl DingTalkWebhook {
    /// Convert a text callback into an inbound message.
    /// Payloads without `text.content` yield `None`.
    pub fn into_inbound(self) -> Option<InboundMessage> {
        let text = self.text?;
        let content = strip_at_tags(&text.content);

        let mut msg = InboundMessage::new(
            "dingtalk",
            self.conversation_id.unwrap_or_else(|| "unknown".to_string()),
            content,
        );
        msg.sender_id = self.sender_id.unwrap_or_default();
        msg.at_user_ids = self
            .at_users
            .into_iter()
            .filter_map(|u| u.dingtalk_id)
            .collect();
        Some(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(api_base: &str) -> DingTalkChannel {
        DingTalkChannel::new(DingTalkConfig {
            access_token: "tok".to_string(),
            secret: "SEC123".to_string(),
            api_base: api_base.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_sign_is_deterministic_and_escaped() {
        let a = sign(1_700_000_000_000, "SECabc").unwrap();
        assert_eq!(a, sign(1_700_000_000_000, "SECabc").unwrap());
        assert_ne!(a, sign(1_700_000_000_001, "SECabc").unwrap());
        assert!(!a.contains('+') && !a.contains('/') && !a.contains('='));

        let decoded = urlencoding::decode(&a).unwrap();
        assert_eq!(STANDARD.decode(decoded.as_bytes()).unwrap().len(), 32);
    }

    #[test]
    fn test_text_body_shape() {
        let mut msg = OutboundMessage::reply("hello", &["u1".to_string()]);
        msg.at_mobiles = vec!["13800000000".to_string()];
        let body = text_body(&msg);
        assert_eq!(body["msgtype"], "text");
        assert_eq!(body["text"]["content"], "hello");
        assert_eq!(body["at"]["atUserIds"], json!(["u1"]));
        assert_eq!(body["at"]["atMobiles"], json!(["13800000000"]));
        assert_eq!(body["at"]["isAtAll"], false);
    }

    #[test]
    fn test_file_body_shape() {
        let body = file_body("@lAz", &[]);
        assert_eq!(body["msgtype"], "file");
        assert_eq!(body["file"]["media_id"], "@lAz");
    }

    #[test]
    fn test_parse_webhook_strips_at_tags() {
        let body = r#"{
            "msgtype": "text",
            "text": {"content": "<at id=\"abc\">@bot</at> Test1 LLM weather in Beijing "},
            "atUsers": [{"dingtalkId": "$:LWCP_v1:$abc"}, {"staffId": "only-staff"}],
            "conversationId": "cid42",
            "senderId": "s1"
        }"#;
        let hook: DingTalkWebhook = serde_json::from_str(body).unwrap();
        let msg = hook.into_inbound().unwrap();
        assert_eq!(msg.content, "Test1 LLM weather in Beijing");
        assert_eq!(msg.conversation_id, "cid42");
        assert_eq!(msg.sender_id, "s1");
        assert_eq!(msg.at_user_ids, vec!["$:LWCP_v1:$abc"]);
    }

    #[test]
    fn test_parse_webhook_defaults() {
        let hook: DingTalkWebhook = serde_json::from_str(r#"{"text": {"content": "hi"}}"#).unwrap();
        let msg = hook.into_inbound().unwrap();
        assert_eq!(msg.conversation_id, "unknown");
        assert!(msg.at_user_ids.is_empty());

        let hook: DingTalkWebhook = serde_json::from_str(r#"{"msgtype": "picture"}"#).unwrap();
        assert!(hook.into_inbound().is_none());
    }

    #[tokio::test]
    async fn test_send_requires_credentials() {
        let channel = DingTalkChannel::new(DingTalkConfig::default());
        let err = channel.send(&OutboundMessage::new("x")).await.unwrap_err();
        assert!(matches!(err, ChannelError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_send_signed_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/robot/send")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("access_token".into(), "tok".into()),
                mockito::Matcher::Regex("timestamp=\\d+".into()),
                mockito::Matcher::Regex("sign=".into()),
            ]))
            .match_body(mockito::Matcher::PartialJson(json!({"text": {"content": "hi"}})))
            .with_status(200)
            .with_body(r#"{"errcode":0,"errmsg":"ok"}"#)
            .create_async()
            .await;

        configured(&server.url())
            .send(&OutboundMessage::new("hi"))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_errcode_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/robot/send")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"errcode":310000,"errmsg":"sign not match"}"#)
            .create_async()
            .await;

        let err = configured(&server.url())
            .send(&OutboundMessage::new("hi"))
            .await
            .unwrap_err();
        match err {
            ChannelError::Api { code, message } => {
                assert_eq!(code, 310000);
                assert_eq!(message, "sign not match");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_send_file_uploads_then_posts() {
        let mut server = mockito::Server::new_async().await;
        let upload = server
            .mock("POST", "/robot/upload")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"errcode":0,"media_id":"@media1"}"#)
            .create_async()
            .await;
        let send = server
            .mock("POST", "/robot/send")
            .match_query(mockito::Matcher::Any)
            .match_body(mockito::Matcher::PartialJson(json!({"file": {"media_id": "@media1"}})))
            .with_status(200)
            .with_body(r#"{"errcode":0}"#)
            .create_async()
            .await;

        configured(&server.url())
            .send_file("r.pdf", b"%PDF-1.4".to_vec(), &[])
            .await
            .unwrap();
        upload.assert_async().await;
        send.assert_async().await;
    }
}
