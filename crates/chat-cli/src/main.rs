mod session;

use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;

use chat_client::ApiClient;
use chat_core::{Config, MessageStatus, Role};
use session::ChatSession;

#[derive(Parser)]
#[command(name = "streamchat")]
#[command(about = "Terminal client for the streaming chat API")]
#[command(version)]
struct Cli {
    /// Base URL of the API, e.g. http://localhost:8080/api
    #[arg(long)]
    api_base: Option<String>,

    #[arg(long)]
    provider: Option<String>,

    #[arg(long)]
    model: Option<String>,

    /// Read config from this file instead of the default locations
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep the partial reply instead of replacing it with a failure notice
    #[arg(long, default_value = "false")]
    keep_partial: bool,

    /// Enable debug mode
    #[arg(long, short, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive chat
    Chat {
        /// Wait for the whole reply instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },
    /// Send a single message
    Send {
        /// Message content
        message: String,
        /// Wait for the whole reply instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },
    /// List available providers and models
    Models,
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::from_file(path).map_err(anyhow::Error::msg)?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config
        }
        None => Config::new(),
    };

    if let Some(api_base) = &cli.api_base {
        config.api_base = api_base.clone();
    }
    if let Some(provider) = &cli.provider {
        config.provider = Some(provider.clone());
    }
    if let Some(model) = &cli.model {
        config.model = Some(model.clone());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let mut config = load_config(&cli)?;
    log::debug!("Server URL: {}", config.api_base());

    match cli.command {
        Commands::Chat { no_stream } => {
            config.stream &= !no_stream;
            run_interactive_chat(&config, cli.keep_partial).await
        }
        Commands::Send { ref message, no_stream } => {
            config.stream &= !no_stream;
            let mut session = ChatSession::connect(&config, cli.keep_partial).await?;
            session.send(message).await
        }
        Commands::Models => list_models(&config).await,
    }
}

async fn run_interactive_chat(config: &Config, keep_partial: bool) -> anyhow::Result<()> {
    let mut session = ChatSession::connect(config, keep_partial).await?;

    println!("{}", "Streaming Chat".cyan().bold());
    println!(
        "{}",
        format!(
            "Model: {}/{} ({})",
            session.selection().provider,
            session.selection().model,
            if config.stream { "streaming" } else { "non-streaming" }
        )
        .dimmed()
    );
    println!(
        "{}",
        "Type 'exit' or 'quit' to leave, '/history' to show the conversation, Ctrl-C cancels a reply"
            .dimmed()
    );
    println!();

    loop {
        print!("{} ", "You:".cyan().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("{}", "Goodbye!".cyan());
            break;
        }

        if input.is_empty() {
            continue;
        }

        if input == "/history" {
            print_history(&session);
            continue;
        }

        println!("{}", "Assistant:".green().bold());
        if let Err(e) = session.send(input).await {
            println!("{}", format!("Error: {}", e).red());
        }
        println!();
    }

    Ok(())
}

fn print_history(session: &ChatSession) {
    for message in session.state().messages() {
        let label = match message.role {
            Role::User => "you".cyan(),
            Role::Assistant => "assistant".green(),
            Role::System => "system".yellow(),
        };
        let marker = match message.status {
            MessageStatus::Failed => " (failed)",
            MessageStatus::Cancelled => " (cancelled)",
            MessageStatus::Streaming => " (streaming)",
            MessageStatus::Done => "",
        };
        println!("{}{}: {}", label, marker.dimmed(), message.content);
    }
}

async fn list_models(config: &Config) -> anyhow::Result<()> {
    let api = ApiClient::from_config(config)?;
    let models = api.list_models().await?;

    if models.models.is_empty() {
        println!("{}", "No models available".yellow());
        return Ok(());
    }

    for provider in models.providers() {
        println!("{}", provider.cyan().bold());
        for model in models.models_for(provider) {
            println!("  {} {}", model.id, format!("({})", model.name).dimmed());
        }
    }
    Ok(())
}
