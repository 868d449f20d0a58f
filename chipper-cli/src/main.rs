use anyhow::{Context, Result};
use chipper_core::{
    Config, EventStatus, Message, RagQueryPipeline, ReadinessEvent, StreamingCallback,
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chipper")]
#[command(about = "Ask questions against an Elasticsearch knowledge base", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Show current configuration")]
    Show,

    #[command(about = "Check that the configured models are available")]
    Check {
        #[arg(long, help = "Pull missing models even if the config forbids it")]
        allow_pull: bool,
    },

    #[command(about = "Answer a single question")]
    Query {
        question: String,

        #[arg(long, help = "Skip the model readiness check")]
        no_check: bool,

        #[arg(long, help = "Pull missing models even if the config forbids it")]
        allow_pull: bool,
    },

    #[command(about = "Start an interactive chat session")]
    Chat {
        #[arg(long, help = "Skip the model readiness check")]
        no_check: bool,

        #[arg(long, help = "Pull missing models even if the config forbids it")]
        allow_pull: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chipper_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Show => show_config(&cli.config),
        Commands::Check { allow_pull } => {
            let pipeline = build_pipeline(&cli.config, allow_pull, None)?;
            check_models(&pipeline).await
        }
        Commands::Query {
            question,
            no_check,
            allow_pull,
        } => run_query(&cli.config, &question, no_check, allow_pull).await,
        Commands::Chat { no_check, allow_pull } => run_chat(&cli.config, no_check, allow_pull).await,
    }
}

fn load_config(config_path: &Path, allow_pull: bool) -> Result<Config> {
    let mut config = Config::load(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if allow_pull {
        config.allow_model_pull = true;
    }
    Ok(config)
}

fn build_pipeline(
    config_path: &Path,
    allow_pull: bool,
    streaming_callback: Option<StreamingCallback>,
) -> Result<RagQueryPipeline> {
    let config = load_config(config_path, allow_pull)?;
    RagQueryPipeline::with_streaming_callback(config, streaming_callback)
        .context("Failed to initialize query pipeline")
}

fn stdout_streamer() -> StreamingCallback {
    Arc::new(|chunk: &str| {
        print!("{}", chunk);
        let _ = std::io::stdout().flush();
    })
}

fn show_config(config_path: &Path) -> Result<()> {
    let mut config = load_config(config_path, false)?;
    if config.storage.password.is_some() {
        config.storage.password = Some("********".to_string());
    }
    if config.llm.huggingface_api_key.is_some() {
        config.llm.huggingface_api_key = Some("********".to_string());
    }

    let rendered = serde_yaml::to_string(&config).context("Failed to serialize config")?;

    println!("{}", "Current Configuration:".bold().green());
    println!();
    println!("{}", rendered);
    Ok(())
}

fn print_event(event: &ReadinessEvent) {
    let text = event
        .message
        .as_deref()
        .or(event.error.as_deref())
        .unwrap_or_default();
    match event.status {
        EventStatus::Success => println!("{} {}", "✓".green().bold(), text),
        EventStatus::InProgress => println!("{} {}", "→".blue(), text),
        EventStatus::Error => println!("{} {}", "✗".red().bold(), text.red()),
    }
}

async fn check_models(pipeline: &RagQueryPipeline) -> Result<()> {
    let mut events = pipeline
        .initialize_and_check_models()
        .context("Model readiness check could not start")?;

    while let Some(event) = events.next().await {
        let event = event.context("Model readiness check failed")?;
        print_event(&event);
    }
    Ok(())
}

async fn run_query(config_path: &Path, question: &str, no_check: bool, allow_pull: bool) -> Result<()> {
    let mut pipeline = build_pipeline(config_path, allow_pull, Some(stdout_streamer()))?;
    if !no_check {
        check_models(&pipeline).await?;
    }

    let answer = pipeline
        .run_query(question, &[], false)
        .await
        .context("Query failed")?;
    println!();

    if answer.is_none() {
        println!("{}", "No answer was produced.".yellow());
    }
    Ok(())
}

async fn run_chat(config_path: &Path, no_check: bool, allow_pull: bool) -> Result<()> {
    let mut pipeline = build_pipeline(config_path, allow_pull, Some(stdout_streamer()))?;
    if !no_check {
        check_models(&pipeline).await?;
    }

    println!("{}", "Chat started. Type 'exit' or press Ctrl-D to quit.".bold().green());

    let mut history: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{} ", ">".cyan().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" || question == "quit" {
            break;
        }

        match pipeline.run_query(question, &history, false).await {
            Ok(Some(answer)) => {
                println!();
                history.push(Message::user(question));
                history.push(Message::assistant(answer));
            }
            Ok(None) => println!("{}", "No answer was produced.".yellow()),
            Err(e) => println!("{} {}", "Error:".red().bold(), e),
        }
    }

    Ok(())
}
