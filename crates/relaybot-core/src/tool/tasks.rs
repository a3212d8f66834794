use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::sync::Arc;

use super::google::GoogleClient;
use super::{param_bool, param_str, param_u64, Action, Params, Tool, ToolOutcome};

/// Create a Google Tasks item.
pub struct CreateTaskTool {
    google: Arc<GoogleClient>,
}

impl CreateTaskTool {
    pub fn new(google: Arc<GoogleClient>) -> Self {
        Self { google }
    }
}

#[async_trait]
impl Tool for CreateTaskTool {
    fn action(&self) -> Action {
        Action::CreateTask
    }

    fn description(&self) -> &str {
        "Create a to-do task (due date as YYYY-MM-DD)"
    }

    fn parameters(&self) -> Value {
        json!({"title": "Submit expense report", "notes": "Include receipts", "due": "2025-03-05"})
    }

    async fn execute(&self, params: &Params) -> ToolOutcome {
        let title = param_str(params, "title");
        if title.is_empty() {
            return ToolOutcome::error("title is required to create a task");
        }

        let mut body = json!({"title": title});
        let notes = param_str(params, "notes");
        if !notes.is_empty() {
            body["notes"] = Value::String(notes);
        }

        let due = param_str(params, "due");
        if !due.is_empty() {
            // Tasks only keeps the date part of `due`
            let date_part = due.get(..10).unwrap_or(due.as_str());
            match NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
                Ok(d) => body["due"] = Value::String(format!("{}T00:00:00.000Z", d.format("%Y-%m-%d"))),
                Err(_) => return ToolOutcome::error(format!("invalid due date '{due}', use YYYY-MM-DD")),
            }
        }

        match self.google.post(&self.google.tasks_url(), &body).await {
            Ok(data) => {
                let id = data.get("id").and_then(|v| v.as_str()).unwrap_or("?");
                let mut msg = format!("Task created: '{title}'\nID: {id}");
                if !due.is_empty() {
                    msg.push_str(&format!("\nDue: {due}"));
                }
                ToolOutcome::Text(msg)
            }
            Err(e) => ToolOutcome::error(format!("failed to create task: {e}")),
        }
    }
}

/// List Google Tasks items.
pub struct QueryTasksTool {
    google: Arc<GoogleClient>,
}

impl QueryTasksTool {
    pub fn new(google: Arc<GoogleClient>) -> Self {
        Self { google }
    }
}

#[async_trait]
impl Tool for QueryTasksTool {
    fn action(&self) -> Action {
        Action::QueryTasks
    }

    fn description(&self) -> &str {
        "List to-do tasks"
    }

    fn parameters(&self) -> Value {
        json!({"max_results": 20, "show_completed": false})
    }

    async fn execute(&self, params: &Params) -> ToolOutcome {
        let max_results = param_u64(params, "max_results", 20).clamp(1, 100);
        let show_completed = param_bool(params, "show_completed", false);

        let query = [
            ("maxResults", max_results.to_string()),
            ("showCompleted", show_completed.to_string()),
            ("showHidden", show_completed.to_string()),
        ];

        match self.google.get(&self.google.tasks_url(), &query).await {
            Ok(data) => ToolOutcome::Text(format_tasks(&data)),
            Err(e) => ToolOutcome::error(format!("failed to query tasks: {e}")),
        }
    }
}

fn format_tasks(data: &Value) -> String {
    let items = match data.get("items").and_then(|v| v.as_array()) {
        Some(items) if !items.is_empty() => items,
        _ => return "No tasks found.".to_string(),
    };

    let mut lines = vec![format!("{} task(s):", items.len())];
    for (i, item) in items.iter().enumerate() {
        let title = item.get("title").and_then(|v| v.as_str()).unwrap_or("(untitled)");
        let id = item.get("id").and_then(|v| v.as_str()).unwrap_or("?");
        let done = item.get("status").and_then(|v| v.as_str()) == Some("completed");
        let mut line = format!("{}. [{}] {}", i + 1, if done { "x" } else { " " }, title);
        if let Some(due) = item.get("due").and_then(|v| v.as_str()) {
            line.push_str(&format!(" (due {})", due.get(..10).unwrap_or(due)));
        }
        line.push_str(&format!(" [id: {id}]"));
        lines.push(line);
        if let Some(notes) = item.get("notes").and_then(|v| v.as_str()) {
            lines.push(format!("   {notes}"));
        }
    }
    lines.join("\n")
}

/// Delete a Google Tasks item by id.
pub struct DeleteTaskTool {
    google: Arc<GoogleClient>,
}

impl DeleteTaskTool {
    pub fn new(google: Arc<GoogleClient>) -> Self {
        Self { google }
    }
}

#[async_trait]
impl Tool for DeleteTaskTool {
    fn action(&self) -> Action {
        Action::DeleteTask
    }

    fn description(&self) -> &str {
        "Delete a to-do task by id (ids are shown by query_tasks)"
    }

    fn parameters(&self) -> Value {
        json!({"task_id": "MTIzNDU2Nzg5"})
    }

    async fn execute(&self, params: &Params) -> ToolOutcome {
        let task_id = param_str(params, "task_id");
        if task_id.is_empty() {
            return ToolOutcome::error("task_id is required");
        }

        let url = format!("{}/{}", self.google.tasks_url(), urlencoding::encode(&task_id));
        match self.google.delete(&url).await {
            Ok(()) => ToolOutcome::Text(format!("Task {task_id} deleted.")),
            Err(e) => ToolOutcome::error(format!("failed to delete task {task_id}: {e}")),
        }
    }
}
