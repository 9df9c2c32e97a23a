use std::path::PathBuf;

use anyhow::{Context, Result};
use camwatch::{CamwatchConfig, PersistentQueue};
use clap::{Parser, Subcommand};
use tracing::info;

/// Inspect or extend the durable alert queue.
///
/// The running service keeps its own copy of the queue in memory and rewrites
/// the artifact on every change, so `push` is only safe while it is stopped.
#[derive(Parser, Debug)]
#[command(name = "queuetool")]
#[command(about = "Inspect and edit the camwatch pending-alert queue")]
struct Args {
    /// Path to camwatch configuration file (for queue.path)
    #[arg(short = 'c', long, default_value = "camwatch.toml")]
    config: PathBuf,

    /// Queue artifact to use instead of the configured one
    #[arg(short, long)]
    queue: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print pending messages in delivery order
    List,
    /// Print the number of pending messages
    Count,
    /// Append a message to the queue
    Push {
        /// Message text, sent verbatim
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let queue_path = match args.queue {
        Some(path) => path,
        None => {
            let config = CamwatchConfig::load_from_file(&args.config)
                .with_context(|| format!("Failed to load {}", args.config.display()))?;
            PathBuf::from(config.queue.path)
        }
    };

    let queue = PersistentQueue::load(&queue_path).await;

    match args.command {
        Command::List => {
            for (position, message) in queue.snapshot().await.iter().enumerate() {
                println!("[{}] {}", position + 1, message.replace('\n', "\n    "));
            }
        }
        Command::Count => println!("{}", queue.len().await),
        Command::Push { text } => {
            queue
                .enqueue(text)
                .await
                .with_context(|| format!("Failed to persist {}", queue_path.display()))?;
            info!("Queued message in {}", queue_path.display());
            println!("{} message(s) pending", queue.len().await);
        }
    }

    Ok(())
}
