use std::{path::PathBuf, sync::Arc};

use clap::{Args, Parser, Subcommand};
use evm_trigger::{
    BlockFetcher, FileStateStore, Poller, ScannerMessage, Trigger, TriggerConfig, TriggerItem,
};
use tokio_stream::StreamExt;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Polls on a timer, printing every emitted item as a JSON line.
    Run(TriggerArgs),
    /// Runs a single poll cycle and exits.
    PollOnce(TriggerArgs),
}

#[derive(Args)]
struct TriggerArgs {
    /// Trigger configuration file (YAML, JSON or TOML).
    #[arg(short, long)]
    config: PathBuf,

    /// JSON file holding the stream cursors between runs.
    #[arg(short, long, default_value = "evm-trigger-state.json")]
    state: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).try_init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::PollOnce(args) => poll_once(args).await,
    }
}

async fn build_trigger(args: &TriggerArgs) -> anyhow::Result<(TriggerConfig, Trigger)> {
    debug!(path = %args.config.display(), "Loading trigger configuration");
    let config = TriggerConfig::load(&args.config)?;

    let fetcher = BlockFetcher::new(config.rpc.connect().await?);
    let store = FileStateStore::new(&args.state);
    let trigger = Trigger::from_config(&config, Arc::new(fetcher), Arc::new(store))?;
    info!(stream = %trigger.stream(), state = %args.state.display(), "Trigger ready");

    Ok((config, trigger))
}

fn print_items(items: &[TriggerItem]) -> anyhow::Result<()> {
    for item in items {
        println!("{}", serde_json::to_string(item)?);
    }
    Ok(())
}

async fn run(args: TriggerArgs) -> anyhow::Result<()> {
    let (config, trigger) = build_trigger(&args).await?;

    let client = Poller::new(trigger).with_polling_interval(config.polling_interval()).run();
    let mut stream = client.stream().await?;

    loop {
        tokio::select! {
            message = stream.next() => {
                match message {
                    Some(ScannerMessage::Data(items)) => print_items(&items)?,
                    Some(ScannerMessage::Status(status)) => info!(?status, "Poll status"),
                    Some(ScannerMessage::Error(e)) => {
                        error!(report = %serde_json::to_string(&e.report())?, "Poll failed");
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping poller");
                client.shutdown().await?;
                break;
            }
        }
    }

    Ok(())
}

async fn poll_once(args: TriggerArgs) -> anyhow::Result<()> {
    let (_, trigger) = build_trigger(&args).await?;

    let outcome = trigger.poll().await?;
    info!(status = ?outcome.status(), emitted = outcome.items().len(), "Poll complete");
    print_items(outcome.items())
}
