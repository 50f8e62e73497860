use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use parley::config::Config;
use parley::controller::ConversationController;
use parley::events::TuiEvent;
use parley::llm::{ClientSettings, GeminiClient, GenerativeModel};
use parley::tui;
use parley::ui::conversation::{ConversationAction, ConversationManager};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "parley")]
#[command(version)]
#[command(about = "Chat with a generative-language model from your terminal", long_about = None)]
struct Cli {
    /// Model identifier (default from config, then gemini-1.5-flash)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// API key for the model service
    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Stream answers as they are generated
    #[arg(long, global = true)]
    stream: bool,

    /// Config file (default ~/.parley/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one prompt and print the answer
    Ask { prompt: Vec<String> },
    /// Show the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let mut config = Config::load(&config_path)?.with_api_key_override(cli.api_key.clone());
    if let Some(model) = cli.model.clone() {
        config.model = model;
    }
    if cli.stream {
        config.stream = true;
    }

    match cli.command {
        None => {
            init_file_logging(cli.verbose)?;
            run_chat(config).await
        }
        Some(Commands::Ask { prompt }) => {
            init_stderr_logging(cli.verbose);
            ask(config, &prompt.join(" ")).await
        }
        Some(Commands::Config) => {
            init_stderr_logging(cli.verbose);
            show_config(&config, &config_path);
            Ok(())
        }
    }
}

fn env_filter(verbose: bool) -> EnvFilter {
    let default = if verbose { "parley=debug" } else { "parley=info" };
    EnvFilter::try_from_env("PARLEY_LOG").unwrap_or_else(|_| EnvFilter::new(default))
}

fn init_stderr_logging(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// The chat screen owns the terminal, so its logs go to ~/.parley/parley.log
fn init_file_logging(verbose: bool) -> Result<()> {
    let dir = Config::home_dir()?;
    std::fs::create_dir_all(&dir).context("Failed to create ~/.parley")?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("parley.log"))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn build_controller(config: &Config) -> Result<ConversationController> {
    let client = GeminiClient::new(ClientSettings::from(config))
        .context("Failed to create HTTP client")?;
    let model: Arc<dyn GenerativeModel> = Arc::new(client);

    Ok(ConversationController::new(model, config.texts.clone())
        .with_greeting(Some(config.greeting.clone()))
        .with_streaming(config.stream))
}

async fn run_chat(config: Config) -> Result<()> {
    let controller = build_controller(&config)?;
    let mut manager = ConversationManager::new(
        controller,
        config.texts.input_placeholder.clone(),
        config.has_api_key(),
    );
    info!(model = %config.model, stream = config.stream, "starting chat");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new(Duration::from_millis(150));

    let result = async {
        loop {
            terminal.draw(|frame| frame.render_widget(&manager, frame.size()))?;

            let Some(event) = events.next().await else {
                break;
            };
            match event {
                TuiEvent::Key(key) => {
                    if manager.handle_key(key) == ConversationAction::Exit {
                        break;
                    }
                }
                TuiEvent::Paste(text) => manager.handle_paste(&text),
                TuiEvent::Resize(_, _) => {}
                TuiEvent::Tick => manager.tick(),
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    info!("chat closed");
    result
}

async fn ask(config: Config, prompt: &str) -> Result<()> {
    let mut controller = build_controller(&config)?;

    if controller.submit(prompt).is_none() {
        bail!("Nothing to ask: the prompt is empty");
    }
    controller.next_completion().await;

    if let Some(answer) = controller.messages().last() {
        println!("{}", answer.text);
    }
    Ok(())
}

fn show_config(config: &Config, path: &std::path::Path) {
    let source = if path.exists() { "" } else { " (not present, defaults)" };
    println!("Config file: {}{}", path.display(), source);
    println!("Model:       {}", config.model);
    println!("Endpoint:    {}", config.base_url);
    println!("Streaming:   {}", config.stream);
    println!("API key:     {}", config.masked_api_key());
}
