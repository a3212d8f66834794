use crate::util::local_time;

/// What an inbound group message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Nothing but the keyword: show usage.
    Help,
    /// Current local time.
    Time,
    /// Forward the prompt to the model in the background.
    Llm(String),
    /// Anything else, with whitespace removed.
    Unsupported(String),
}

/// Routes cleaned message text by the robot's trigger keyword.
#[derive(Debug, Clone)]
pub struct CommandRouter {
    keyword: String,
}

impl CommandRouter {
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.trim().to_string(),
        }
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    /// `<keyword> LLM <prompt>` is a model request; everything else is a
    /// local command with the keyword and all whitespace removed.
    pub fn route(&self, content: &str) -> Command {
        let content = content.trim();

        if let Some(prompt) = self.llm_prompt(content) {
            return if prompt.is_empty() {
                Command::Help
            } else {
                Command::Llm(prompt.to_string())
            };
        }

        let without_keyword = if self.keyword.is_empty() {
            content.to_string()
        } else {
            content.replace(&self.keyword, "")
        };
        let command: String = without_keyword.chars().filter(|c| !c.is_whitespace()).collect();

        match command.as_str() {
            "" => Command::Help,
            "时间" => Command::Time,
            c if c.eq_ignore_ascii_case("time") => Command::Time,
            _ => Command::Unsupported(command),
        }
    }

    /// `LLM` must stand alone: followed by whitespace or nothing.
    fn llm_prompt<'a>(&self, content: &'a str) -> Option<&'a str> {
        let rest = content.strip_prefix(self.keyword.as_str())?.trim_start();
        let rest = rest.strip_prefix("LLM")?;
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return None;
        }
        Some(rest.trim())
    }

    /// Immediate reply for a non-LLM command.
    pub fn reply(&self, command: &Command) -> String {
        match command {
            Command::Help | Command::Llm(_) => self.help_text(),
            Command::Time => format!("Current time: {}", local_time()),
            Command::Unsupported(c) => format!(
                "Unsupported command '{c}'. Send \"{}\" on its own to see what I can do.",
                self.keyword
            ),
        }
    }

    pub fn help_text(&self) -> String {
        let kw = if self.keyword.is_empty() {
            String::new()
        } else {
            format!("{} ", self.keyword)
        };
        format!(
            "Please send a command. Supported commands:\n\
             - {kw}LLM <question>: ask the assistant (weather, maths, e-mail, calendar, tasks, reports)\n\
             - {kw}time: current server time"
        )
    }
}
