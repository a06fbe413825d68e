use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use parley::voice::{MicEngine, SpeechLifecycle};
use parley::{Config, Conversation, HttpSpeechBackend, MessageStore, Role, SqliteStore};

/// Parley - converse with an AI assistant by voice or text
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Speech backend endpoint URL
    #[arg(long, env = "PARLEY_ENDPOINT")]
    endpoint: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chat with the assistant by typing
    Chat,
    /// Chat with the assistant by voice
    Talk,
    /// Delete the persisted conversation
    Clear,
    /// Print the persisted transcript
    Export,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,parley=info",
        1 => "info,parley=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = Some(endpoint);
    }

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(SqliteStore::open(config.db_path())?);

    match cli.command {
        Command::Chat => chat(&config, store).await,
        Command::Talk => talk(&config, store).await,
        Command::Clear => {
            store.clear().await?;
            println!("conversation cleared");
            Ok(())
        }
        Command::Export => export(&store).await,
    }
}

/// Interactive text REPL
async fn chat(config: &Config, store: Arc<SqliteStore>) -> anyhow::Result<()> {
    let backend = Arc::new(HttpSpeechBackend::from_config(config)?);
    let mut conversation = Conversation::load(backend, store).await;

    if !conversation.messages().is_empty() {
        println!("({} messages restored)", conversation.messages().len());
    }
    println!("type a message; /retry, /clear, /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        match input {
            "" => {}
            "/quit" | "/exit" => break,
            "/clear" => {
                conversation.clear().await;
                println!("conversation cleared");
            }
            "/retry" => {
                conversation.retry_last().await;
                report(&conversation);
            }
            _ => {
                conversation.submit_text(input).await;
                report(&conversation);
            }
        }
    }

    Ok(())
}

/// Voice loop: pump the capture lifecycle, dispatch utterances
#[allow(clippy::future_not_send)]
async fn talk(config: &Config, store: Arc<SqliteStore>) -> anyhow::Result<()> {
    let backend = Arc::new(HttpSpeechBackend::from_config(config)?);
    let mut conversation = Conversation::load(backend, store).await;

    let mut lifecycle = SpeechLifecycle::with_engine(Arc::new(MicEngine::new()), config.voice.clone());
    lifecycle.start().await?;
    println!("listening (Ctrl-C to stop)");

    let mut tick = tokio::time::interval(Duration::from_millis(50));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tick.tick() => {
                let Some(utterance) = lifecycle.pump() else {
                    continue;
                };

                // The session tore itself down on delivery, so no second
                // utterance can arrive while this turn is in flight.
                conversation.submit_audio(utterance).await;
                report(&conversation);

                // Re-arm for the next utterance; open failures are
                // retryable on the next pass
                if let Err(e) = lifecycle.start().await {
                    tracing::warn!(error = %e, "re-arming capture failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    lifecycle.pause();
    Ok(())
}

/// Print the persisted transcript, oldest first
async fn export(store: &SqliteStore) -> anyhow::Result<()> {
    let mut messages = store.get_all().await?;
    messages.retain(|m| !m.id.is_empty());
    messages.sort_by_key(|m| m.timestamp);

    for msg in messages {
        println!("{}: {}", msg.role.as_str(), msg.content);
    }
    Ok(())
}

fn report(conversation: &Conversation) {
    if let Some(err) = conversation.error() {
        eprintln!("error: {err} (/retry to try again)");
    } else if let Some(msg) = conversation
        .messages()
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
    {
        println!("assistant: {}", msg.content);
    }
}
