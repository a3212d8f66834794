pub mod extract;
pub mod calculator;
pub mod weather;
pub mod email;
pub mod google;
pub mod calendar;
pub mod tasks;
pub mod report;
pub mod storage;
pub mod group_message;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::channel::Channel;
use crate::config::ToolsConfig;

pub use extract::extract_tool_call;

/// Untyped tool parameters as they arrive from the model.
pub type Params = HashMap<String, Value>;

/// Prefix of every failure result produced by a handler.
pub const ERROR_PREFIX: &str = "Error: ";

/// A validated tool instruction embedded in a model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub action: String,
    pub parameters: Params,
}

/// The closed set of actions the dispatcher knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    GetWeather,
    Calculator,
    SendEmail,
    CreateEvent,
    QueryEvents,
    DeleteEvent,
    CreateTask,
    QueryTasks,
    DeleteTask,
    GenerateReport,
    SendGroupMessage,
    UploadFile,
}

impl Action {
    /// Every action, in the order they are presented to the model.
    pub const ALL: [Action; 12] = [
        Action::GetWeather,
        Action::Calculator,
        Action::SendEmail,
        Action::CreateEvent,
        Action::QueryEvents,
        Action::DeleteEvent,
        Action::CreateTask,
        Action::QueryTasks,
        Action::DeleteTask,
        Action::GenerateReport,
        Action::SendGroupMessage,
        Action::UploadFile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::GetWeather => "get_weather",
            Action::Calculator => "calculator",
            Action::SendEmail => "send_email",
            Action::CreateEvent => "create_event",
            Action::QueryEvents => "query_events",
            Action::DeleteEvent => "delete_event",
            Action::CreateTask => "create_task",
            Action::QueryTasks => "query_tasks",
            Action::DeleteTask => "delete_task",
            Action::GenerateReport => "generate_report",
            Action::SendGroupMessage => "send_group_message",
            Action::UploadFile => "upload_file",
        }
    }

    /// Comma-separated list of every wire name.
    pub fn names() -> String {
        Self::ALL
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an action name is not one of [`Action::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tool '{0}'")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// Record returned by binary-producing tools.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOutput {
    pub success: bool,
    pub message: String,
    pub file_name: String,
    pub payload: Option<Vec<u8>>,
}

impl BinaryOutput {
    pub fn ok(message: impl Into<String>, file_name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            success: true,
            message: message.into(),
            file_name: file_name.into(),
            payload: Some(payload),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            file_name: String::new(),
            payload: None,
        }
    }
}

/// Result of dispatching one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Text(String),
    Binary(BinaryOutput),
}

impl ToolOutcome {
    pub fn error(message: impl fmt::Display) -> Self {
        ToolOutcome::Text(format!("{ERROR_PREFIX}{message}"))
    }

    /// Human-readable summary of the outcome.
    pub fn text(&self) -> &str {
        match self {
            ToolOutcome::Text(s) => s,
            ToolOutcome::Binary(b) => &b.message,
        }
    }

    pub fn is_error(&self) -> bool {
        match self {
            ToolOutcome::Text(s) => s.starts_with(ERROR_PREFIX),
            ToolOutcome::Binary(b) => !b.success,
        }
    }
}

impl From<String> for ToolOutcome {
    fn from(s: String) -> Self {
        ToolOutcome::Text(s)
    }
}

/// Trait for tool handlers.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Action this handler serves.
    fn action(&self) -> Action;

    /// Description shown to the model.
    fn description(&self) -> &str;

    /// Example `parameters` object shown to the model.
    fn parameters(&self) -> Value;

    /// Execute the tool. Failures are reported in the outcome, never raised.
    async fn execute(&self, params: &Params) -> ToolOutcome;
}

/// String view of a parameter. Numbers and booleans are stringified,
/// anything missing or structured becomes the empty string.
pub fn param_str(params: &Params, key: &str) -> String {
    match params.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Unsigned integer parameter, accepting numeric strings.
pub fn param_u64(params: &Params, key: &str, default: u64) -> u64 {
    match params.get(key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

/// Boolean parameter, accepting `"true"`/`"false"`/`"1"`/`"0"`.
pub fn param_bool(params: &Params, key: &str, default: bool) -> bool {
    match params.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().map(|v| v != 0).unwrap_or(default),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => true,
            "false" | "no" | "0" => false,
            _ => default,
        },
        _ => default,
    }
}

/// List parameter given either as an array or a comma-separated string.
pub fn param_list(params: &Params, key: &str) -> Vec<String> {
    match params.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Routes an action to exactly one handler.
pub struct Dispatcher {
    weather: weather::WeatherTool,
    calculator: calculator::CalculatorTool,
    email: email::SendEmailTool,
    create_event: calendar::CreateEventTool,
    query_events: calendar::QueryEventsTool,
    delete_event: calendar::DeleteEventTool,
    create_task: tasks::CreateTaskTool,
    query_tasks: tasks::QueryTasksTool,
    delete_task: tasks::DeleteTaskTool,
    report: report::GenerateReportTool,
    group_message: group_message::SendGroupMessageTool,
    upload: storage::UploadFileTool,
}

impl Dispatcher {
    /// Build every handler from the tools config. Group messages go out
    /// through `channel`.
    pub fn new(config: &ToolsConfig, channel: Arc<dyn Channel>) -> Self {
        let google = Arc::new(google::GoogleClient::new(config.google.clone()));
        let storage = Arc::new(storage::QiniuStorage::new(config.storage.clone()));

        Self {
            weather: weather::WeatherTool::new(&config.weather.api_base),
            calculator: calculator::CalculatorTool,
            email: email::SendEmailTool::new(config.email.clone()),
            create_event: calendar::CreateEventTool::new(google.clone()),
            query_events: calendar::QueryEventsTool::new(google.clone()),
            delete_event: calendar::DeleteEventTool::new(google.clone()),
            create_task: tasks::CreateTaskTool::new(google.clone()),
            query_tasks: tasks::QueryTasksTool::new(google.clone()),
            delete_task: tasks::DeleteTaskTool::new(google),
            report: report::GenerateReportTool::new(&config.report.renderer_url),
            group_message: group_message::SendGroupMessageTool::new(channel),
            upload: storage::UploadFileTool::new(storage),
        }
    }

    /// Handler serving `action`.
    pub fn handler(&self, action: Action) -> &dyn Tool {
        match action {
            Action::GetWeather => &self.weather,
            Action::Calculator => &self.calculator,
            Action::SendEmail => &self.email,
            Action::CreateEvent => &self.create_event,
            Action::QueryEvents => &self.query_events,
            Action::DeleteEvent => &self.delete_event,
            Action::CreateTask => &self.create_task,
            Action::QueryTasks => &self.query_tasks,
            Action::DeleteTask => &self.delete_task,
            Action::GenerateReport => &self.report,
            Action::SendGroupMessage => &self.group_message,
            Action::UploadFile => &self.upload,
        }
    }

    /// All handlers in prompt order.
    pub fn tools(&self) -> impl Iterator<Item = &dyn Tool> + '_ {
        Action::ALL.iter().map(move |a| self.handler(*a))
    }

    /// Dispatch an action by wire name. Unknown names produce an error outcome.
    pub async fn dispatch(&self, action: &str, params: &Params) -> ToolOutcome {
        let action = match action.parse::<Action>() {
            Ok(a) => a,
            Err(e) => {
                warn!("Dispatch rejected: {}", e);
                return ToolOutcome::error(format!("{e} (available: {})", Action::names()));
            }
        };

        debug!("Executing tool: {} with {} params", action, params.len());
        let outcome = self.handler(action).execute(params).await;
        if outcome.is_error() {
            warn!("Tool {} failed: {}", action, outcome.text());
        }
        outcome
    }

    pub async fn dispatch_invocation(&self, invocation: &ToolInvocation) -> ToolOutcome {
        self.dispatch(&invocation.action, &invocation.parameters).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(v: Value) -> Params {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_action_round_trip_names() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert!("Get_Weather".parse::<Action>().is_err());
        assert_eq!(
            "nope".parse::<Action>().unwrap_err().to_string(),
            "unknown tool 'nope'"
        );
    }

    #[test]
    fn test_param_str_coerces_primitives() {
        let p = params(json!({"a": " x ", "n": 42, "f": 1.5, "b": true, "o": {"k": 1}}));
        assert_eq!(param_str(&p, "a"), "x");
        assert_eq!(param_str(&p, "n"), "42");
        assert_eq!(param_str(&p, "f"), "1.5");
        assert_eq!(param_str(&p, "b"), "true");
        assert_eq!(param_str(&p, "o"), "");
        assert_eq!(param_str(&p, "missing"), "");
    }

    #[test]
    fn test_param_numbers_and_bools() {
        let p = params(json!({"days": "3", "max": 5, "neg": -2, "done": "yes", "flag": 0}));
        assert_eq!(param_u64(&p, "days", 7), 3);
        assert_eq!(param_u64(&p, "max", 10), 5);
        assert_eq!(param_u64(&p, "neg", 10), 10);
        assert_eq!(param_u64(&p, "missing", 7), 7);
        assert!(param_bool(&p, "done", false));
        assert!(!param_bool(&p, "flag", true));
        assert!(param_bool(&p, "missing", true));
    }

    #[test]
    fn test_param_list_array_or_csv() {
        let p = params(json!({"ids": ["u1", " u2 ", ""], "csv": "a, b,,c", "n": 1}));
        assert_eq!(param_list(&p, "ids"), vec!["u1", "u2"]);
        assert_eq!(param_list(&p, "csv"), vec!["a", "b", "c"]);
        assert!(param_list(&p, "n").is_empty());
    }

    #[test]
    fn test_outcome_error_marker() {
        let o = ToolOutcome::error("boom");
        assert_eq!(o.text(), "Error: boom");
        assert!(o.is_error());
        assert!(!ToolOutcome::Text("fine".into()).is_error());
        assert!(ToolOutcome::Binary(BinaryOutput::failed("no renderer")).is_error());
    }
}
