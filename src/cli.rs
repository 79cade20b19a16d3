//! CLI module — command parsing and the interactive chat loop
//!
//! `main.rs` calls [`run`]. The default command is an interactive REPL
//! against the configured persona; `check-config` validates a config file
//! and exits.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use doppel::config::Config;
use doppel::controller::ChatController;
use doppel::history::Message;
use doppel::llm::{HttpLanguageModel, PromptFormatter};
use doppel::utils::init_logging;

#[derive(Parser)]
#[command(name = "doppel")]
#[command(version)]
#[command(about = "Persona chatbot core", long_about = None)]
struct Cli {
    /// Path to the configuration file (default: ~/.doppel/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep only the most recent message per turn (isolated QA evaluation)
    #[arg(long)]
    qa_mode: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive chat REPL (default)
    Chat,
    /// Validate the configuration file and exit
    CheckConfig,
}

/// CLI entry point.
pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(Config::path);
    let mut config =
        Config::load_from_path(&config_path).context("failed to load configuration")?;
    if cli.qa_mode {
        config.history.qa_mode = true;
    }

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::CheckConfig => {
            println!("configuration ok: {}", config_path.display());
            Ok(())
        }
        Commands::Chat => chat(config).await,
    }
}

async fn chat(config: Config) -> Result<()> {
    init_logging(&config.logging);

    let mut model = HttpLanguageModel::new(
        &config.llm.api_base,
        &config.llm.api_key,
        &config.llm.model,
        config.llm.prompt_params.clone(),
    );
    if let Some(path) = &config.llm.prompt_template_path {
        model = model.with_formatter(PromptFormatter::from_path(std::path::Path::new(path))?);
    }

    let mut controller = ChatController::new(&config, std::sync::Arc::new(model));
    controller.initialize().await?;

    let user = config.default_user_name.clone();
    let conversation = "cli";
    println!("Chatting with {}. /clear resets, /quit exits.", config.name);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let Some(line) = lines.next_line().await? else {
            break; // EOF
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if line == "/clear" {
            controller.clear(conversation).await;
            println!("[history cleared]");
            continue;
        }

        let message = Message::new(conversation, &user, "cli", &line);
        controller.update_history(message.clone()).await;
        match controller.make_response(&message).await {
            Ok(output) => {
                debug!(prompt = %output.prompt, "Turn prompt");
                for reply in &output.messages {
                    println!("{}: {}", config.name, reply.content);
                }
                if output.messages.is_empty() {
                    println!("[no response]");
                }
            }
            Err(e) => eprintln!("error: {}", e),
        }
    }

    controller.emergency_save().await;
    Ok(())
}
