use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::util::truncate_string;

use super::google::{event_time, GoogleClient};
use super::{param_str, param_u64, Action, Params, Tool, ToolOutcome};

/// Create a Google Calendar event.
pub struct CreateEventTool {
    google: Arc<GoogleClient>,
}

impl CreateEventTool {
    pub fn new(google: Arc<GoogleClient>) -> Self {
        Self { google }
    }
}

#[async_trait]
impl Tool for CreateEventTool {
    fn action(&self) -> Action {
        Action::CreateEvent
    }

    fn description(&self) -> &str {
        "Create a calendar event (times as YYYY-MM-DD HH:MM or RFC 3339)"
    }

    fn parameters(&self) -> Value {
        json!({
            "summary": "Team sync",
            "start": "2025-03-01 10:00",
            "end": "2025-03-01 11:00",
            "description": "Weekly status",
            "location": "Room 301"
        })
    }

    async fn execute(&self, params: &Params) -> ToolOutcome {
        let summary = param_str(params, "summary");
        let start = param_str(params, "start");
        let end = param_str(params, "end");
        if summary.is_empty() || start.is_empty() || end.is_empty() {
            return ToolOutcome::error("summary, start and end are required to create an event");
        }

        let tz = self.google.time_zone();
        let (Some(start_time), Some(end_time)) = (event_time(&start, tz), event_time(&end, tz)) else {
            return ToolOutcome::error(format!(
                "could not understand the event time '{start}' - '{end}', use YYYY-MM-DD HH:MM"
            ));
        };

        let mut body = json!({
            "summary": summary,
            "start": start_time,
            "end": end_time,
        });
        for key in ["description", "location"] {
            let value = param_str(params, key);
            if !value.is_empty() {
                body[key] = Value::String(value);
            }
        }

        match self.google.post(&self.google.calendar_events_url(), &body).await {
            Ok(data) => {
                let id = data.get("id").and_then(|v| v.as_str()).unwrap_or("?");
                let link = data.get("htmlLink").and_then(|v| v.as_str()).unwrap_or("");
                ToolOutcome::Text(format!("Event created: '{summary}' ({start} - {end})\nID: {id}\nLink: {link}"))
            }
            Err(e) => ToolOutcome::error(format!("failed to create event: {e}")),
        }
    }
}

/// List upcoming Google Calendar events.
pub struct QueryEventsTool {
    google: Arc<GoogleClient>,
}

impl QueryEventsTool {
    pub fn new(google: Arc<GoogleClient>) -> Self {
        Self { google }
    }
}

#[async_trait]
impl Tool for QueryEventsTool {
    fn action(&self) -> Action {
        Action::QueryEvents
    }

    fn description(&self) -> &str {
        "List upcoming calendar events"
    }

    fn parameters(&self) -> Value {
        json!({"days": 7, "max_results": 10})
    }

    async fn execute(&self, params: &Params) -> ToolOutcome {
        let days = param_u64(params, "days", 7).clamp(1, 365);
        let max_results = param_u64(params, "max_results", 10).clamp(1, 250);

        let now = chrono::Utc::now();
        let until = now + chrono::Duration::days(days as i64);
        let query = [
            ("timeMin", now.to_rfc3339()),
            ("timeMax", until.to_rfc3339()),
            ("maxResults", max_results.to_string()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];

        match self.google.get(&self.google.calendar_events_url(), &query).await {
            Ok(data) => ToolOutcome::Text(format_events(&data, days)),
            Err(e) => ToolOutcome::error(format!("failed to query events: {e}")),
        }
    }
}

fn format_events(data: &Value, days: u64) -> String {
    let items = match data.get("items").and_then(|v| v.as_array()) {
        Some(items) if !items.is_empty() => items,
        _ => return format!("No events in the next {days} days."),
    };

    let mut result = format!("{} event(s) in the next {} days:\n", items.len(), days);
    for (i, item) in items.iter().enumerate() {
        let summary = item.get("summary").and_then(|v| v.as_str()).unwrap_or("(no title)");
        let when = |key: &str| {
            item.get(key)
                .and_then(|s| s.get("dateTime").or_else(|| s.get("date")))
                .and_then(|v| v.as_str())
                .unwrap_or("?")
                .to_string()
        };
        let id = item.get("id").and_then(|v| v.as_str()).unwrap_or("?");
        result.push_str(&format!("{}. {} | {} → {} [id: {}]\n", i + 1, summary, when("start"), when("end"), id));
        if let Some(desc) = item.get("description").and_then(|v| v.as_str()) {
            result.push_str(&format!("   {}\n", truncate_string(desc, 100, "...")));
        }
    }
    result.trim_end().to_string()
}

/// Delete a Google Calendar event by id.
pub struct DeleteEventTool {
    google: Arc<GoogleClient>,
}

impl DeleteEventTool {
    pub fn new(google: Arc<GoogleClient>) -> Self {
        Self { google }
    }
}

#[async_trait]
impl Tool for DeleteEventTool {
    fn action(&self) -> Action {
        Action::DeleteEvent
    }

    fn description(&self) -> &str {
        "Delete a calendar event by id (ids are shown by query_events)"
    }

    fn parameters(&self) -> Value {
        json!({"event_id": "abc123def456"})
    }

    async fn execute(&self, params: &Params) -> ToolOutcome {
        let event_id = param_str(params, "event_id");
        if event_id.is_empty() {
            return ToolOutcome::error("event_id is required");
        }

        let url = format!(
            "{}/{}",
            self.google.calendar_events_url(),
            urlencoding::encode(&event_id)
        );
        match self.google.delete(&url).await {
            Ok(()) => ToolOutcome::Text(format!("Event {event_id} deleted.")),
            Err(e) => ToolOutcome::error(format!("failed to delete event {event_id}: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GoogleConfig;
    use mockito::Matcher;

    async fn mock_google(server: &mut mockito::ServerGuard) -> (Arc<GoogleClient>, mockito::Mock) {
        let token = server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token":"tok","expires_in":3600}"#)
            .create_async()
            .await;
        let client = Arc::new(GoogleClient::new(GoogleConfig {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "refresh".to_string(),
            token_url: format!("{}/token", server.url()),
            api_base: server.url(),
            token_cache: String::new(),
            ..Default::default()
        }));
        (client, token)
    }

    fn params(v: Value) -> Params {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_format_events() {
        let data = json!({"items": [
            {"id": "e1", "summary": "Standup", "start": {"dateTime": "2025-03-01T09:00:00+08:00"}, "end": {"dateTime": "2025-03-01T09:15:00+08:00"}},
            {"id": "e2", "start": {"date": "2025-03-02"}, "end": {"date": "2025-03-03"}, "description": "All day"}
        ]});
        let text = format_events(&data, 7);
        assert!(text.starts_with("2 event(s) in the next 7 days:"));
        assert!(text.contains("1. Standup | 2025-03-01T09:00:00+08:00"));
        assert!(text.contains("[id: e1]"));
        assert!(text.contains("2. (no title) | 2025-03-02 → 2025-03-03"));
        assert!(text.contains("All day"));
        assert_eq!(format_events(&json!({"items": []}), 3), "No events in the next 3 days.");
    }

    #[tokio::test]
    async fn test_create_requires_fields() {
        let tool = CreateEventTool::new(Arc::new(GoogleClient::new(GoogleConfig::default())));
        let out = tool.execute(&params(json!({"summary": "x", "start": "2025-03-01 10:00"}))).await;
        assert_eq!(out.text(), "Error: summary, start and end are required to create an event");

        let out = tool
            .execute(&params(json!({"summary": "x", "start": "soon", "end": "later"})))
            .await;
        assert!(out.text().starts_with("Error: could not understand the event time"));
    }

    #[tokio::test]
    async fn test_create_event_posts_zone_tagged_times() {
        let mut server = mockito::Server::new_async().await;
        let (google, _token) = mock_google(&mut server).await;
        let insert = server
            .mock("POST", "/calendar/v3/calendars/primary/events")
            .match_header("authorization", "Bearer tok")
            .match_body(Matcher::PartialJson(json!({
                "summary": "Review",
                "start": {"dateTime": "2025-03-01T10:00:00", "timeZone": "Asia/Shanghai"},
                "location": "Room 1"
            })))
            .with_status(200)
            .with_body(r#"{"id":"ev42","htmlLink":"https://calendar.google.com/ev42"}"#)
            .create_async()
            .await;

        let out = CreateEventTool::new(google)
            .execute(&params(json!({
                "summary": "Review",
                "start": "2025-03-01 10:00",
                "end": "2025-03-01 11:00",
                "location": "Room 1"
            })))
            .await;
        assert!(!out.is_error(), "{}", out.text());
        assert!(out.text().contains("ID: ev42"));
        insert.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_event_api_error() {
        let mut server = mockito::Server::new_async().await;
        let (google, _token) = mock_google(&mut server).await;
        let _delete = server
            .mock("DELETE", "/calendar/v3/calendars/primary/events/missing")
            .with_status(404)
            .with_body(r#"{"error":{"code":404,"message":"Not Found"}}"#)
            .create_async()
            .await;

        let out = DeleteEventTool::new(google)
            .execute(&params(json!({"event_id": "missing"})))
            .await;
        assert!(out.is_error());
        assert!(out.text().contains("Not Found"));
    }
}
