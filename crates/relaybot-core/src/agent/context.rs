use serde_json::json;

use crate::tool::Tool;

/// Builds the system prompt that teaches the model the tool-call format.
pub struct ContextBuilder<'a> {
    tools: Vec<&'a dyn Tool>,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(tools: impl IntoIterator<Item = &'a dyn Tool>) -> Self {
        Self {
            tools: tools.into_iter().collect(),
        }
    }

    pub fn build_system_prompt(&self) -> String {
        let mut parts = Vec::new();

        let now = chrono::Local::now().format("%Y-%m-%d %H:%M (%A)").to_string();
        parts.push(format!(
            "You are relaybot, a helpful assistant in a group chat that can call tools.\n\
             Current time: {now}"
        ));

        let mut tools = String::from("# Tools\n");
        for (i, tool) in self.tools.iter().enumerate() {
            let example = json!({
                "action": tool.action().as_str(),
                "parameters": tool.parameters(),
            });
            tools.push_str(&format!("{}. {}: {}\n", i + 1, tool.description(), example));
        }
        parts.push(tools.trim_end().to_string());

        parts.push(
            "# Rules\n\
             1. To call a tool, reply with only the JSON instruction wrapped in ```json and ```.\n\
             2. Call at most one tool per reply.\n\
             3. If a required parameter is missing, ask the user for it instead of guessing.\n\
             4. When no tool is needed, answer directly in plain text.\n\
             5. Keep answers short and clear, in the user's language."
                .to_string(),
        );

        parts.join("\n\n")
    }
}
