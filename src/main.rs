use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use relaybot_core::agent::{Agent, AgentReply, ConversationMemory};
use relaybot_core::config::{self, Config};
use relaybot_core::error::{ProviderError, RelaybotError};
use relaybot_core::service::http::{serve, AppState};
use relaybot_core::tool::{Action, ToolOutcome};

#[derive(Parser)]
#[command(
    name = "relaybot",
    about = "Group-chat agent that turns model replies into tool calls",
    version = relaybot_core::VERSION,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init,
    /// Start the webhook gateway
    Serve {
        /// Bind address (default from config)
        #[arg(long)]
        host: Option<String>,
        /// Port (default from config / DINGTALK_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Talk to the agent directly
    Agent {
        /// Message to send (omit for interactive mode)
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Show which integrations are configured
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("relaybot=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => cmd_init()?,
        Commands::Serve { host, port } => cmd_serve(host, port).await?,
        Commands::Agent { message } => cmd_agent(message).await?,
        Commands::Status => cmd_status(),
    }

    Ok(())
}

// ====== Commands ======

fn cmd_init() -> Result<()> {
    let config_path = config::get_config_path();
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        println!("Delete it first to start over.");
        return Ok(());
    }

    config::save_config(&Config::default(), None)?;
    println!("Created config at {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Set agent.apiKey (or ARK_API_KEY) and the dingtalk robot credentials");
    println!("  2. Try it: relaybot agent -m \"what is 2+2?\"");
    Ok(())
}

fn build_state(cfg: Config) -> AppState {
    match AppState::from_config(cfg) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Error: {}", e);
            if matches!(e, RelaybotError::Provider(ProviderError::NoApiKey)) {
                eprintln!("Set ARK_API_KEY (or agent.apiKey in ~/.relaybot/config.json)");
            }
            std::process::exit(1);
        }
    }
}

async fn cmd_serve(host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut cfg = config::load_config_from_env();
    if let Some(host) = host {
        cfg.gateway.host = host;
    }
    if let Some(port) = port {
        cfg.gateway.port = port;
    }

    let addr = format!("{}:{}", cfg.gateway.host, cfg.gateway.port);
    let state = Arc::new(build_state(cfg));
    if !state.channel.is_configured() {
        tracing::warn!(
            "{} channel has no credentials (ROBOT_ACCESS_TOKEN / ROBOT_SECRET); replies will not be delivered",
            state.channel.name()
        );
    }
    println!(
        "Starting relaybot {} (model {}) on {}...",
        relaybot_core::VERSION,
        state.agent.model(),
        addr
    );

    serve(&addr, state).await
}

async fn cmd_agent(message: Option<String>) -> Result<()> {
    let cfg = config::load_config_from_env();
    let agent = build_state(cfg).agent;
    let mut memory = agent.new_memory();

    if let Some(msg) = message {
        let reply = ask(&agent, &mut memory, &msg).await;
        println!("{}", reply);
        return Ok(());
    }

    println!("relaybot interactive mode (model {})", agent.model());
    println!("Type /clear to reset the conversation, /exit or Ctrl+C to quit.\n");

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();
        match input {
            "" => continue,
            "/exit" | "/quit" => break,
            "/clear" => {
                memory.clear();
                println!("Conversation cleared.\n");
                continue;
            }
            _ => {}
        }

        let reply = ask(&agent, &mut memory, input).await;
        println!("\nrelaybot: {}\n", reply);
    }

    Ok(())
}

/// Run one turn with a spinner and render the reply for the terminal.
async fn ask(agent: &Agent, memory: &mut ConversationMemory, input: &str) -> String {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message("Thinking...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = agent.respond(memory, input).await;
    spinner.finish_and_clear();

    match result {
        Ok(AgentReply::Tool {
            outcome: ToolOutcome::Binary(output),
            ..
        }) => match (output.success, output.payload) {
            (true, Some(data)) => match std::fs::write(&output.file_name, data) {
                Ok(()) => format!("{} Saved to {}", output.message, output.file_name),
                Err(e) => format!("Error: could not save {}: {}", output.file_name, e),
            },
            _ => output.message,
        },
        Ok(reply) => reply.text().to_string(),
        Err(e) => format!("Error: {}", e),
    }
}

fn cmd_status() {
    let config_path = config::get_config_path();
    let cfg = config::load_config_from_env();
    let mark = |ok: bool| if ok { "✓" } else { "not set" };

    println!("relaybot {} ({})\n", relaybot_core::VERSION, relaybot_core::GIT_HASH);
    println!(
        "Config: {} {}",
        config_path.display(),
        if config_path.exists() { "✓" } else { "✗" }
    );
    println!("Model: {}", cfg.agent.model);
    println!("Chat API key: {}", mark(cfg.get_api_key().is_some()));
    println!("DingTalk robot: {}", mark(cfg.dingtalk.is_configured()));
    println!(
        "Keyword: {}",
        if cfg.dingtalk.keyword.is_empty() {
            "(none)"
        } else {
            cfg.dingtalk.keyword.as_str()
        }
    );
    println!("Gateway: {}:{}", cfg.gateway.host, cfg.gateway.port);

    println!("\nTools:");
    let email = !cfg.tools.email.api_key.is_empty();
    let google = cfg.tools.google.is_configured();
    for action in Action::ALL {
        let ready = match action {
            Action::SendEmail => email,
            Action::CreateEvent
            | Action::QueryEvents
            | Action::DeleteEvent
            | Action::CreateTask
            | Action::QueryTasks
            | Action::DeleteTask => google,
            Action::GenerateReport => !cfg.tools.report.renderer_url.is_empty(),
            Action::SendGroupMessage => cfg.dingtalk.is_configured(),
            Action::UploadFile => cfg.tools.storage.is_configured(),
            Action::GetWeather | Action::Calculator => true,
        };
        println!("  {:<24} {}", action.as_str(), mark(ready));
    }
}
