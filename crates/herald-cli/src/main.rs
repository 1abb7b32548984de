//! Herald CLI (`herald`)
//!
//! Reads, watches and posts the shared value of a message-board contract.
//!
//! ```text
//! herald --config herald.toml read
//! herald --config herald.toml watch
//! herald --config herald.toml post "Hello"
//! ```

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use herald_core::{LedgerClient, Sequence, SyncState};
use herald_rpc::{parse_selector, RpcConfig, RpcLedger};
use herald_runtime::{init_logging, HeraldConfig, LogFormat, SyncController};

#[derive(Parser, Debug)]
#[command(name = "herald", version, about = "Shared ledger value reader and writer")]
struct Args {
    /// Configuration file
    #[arg(long, short, default_value = "herald.toml")]
    config: PathBuf,

    /// Log output format (text or json)
    #[arg(long, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current value once
    Read,
    /// Follow the value until Ctrl+C
    Watch,
    /// Write a new value and wait until it is observed
    Post {
        /// New value
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "warn",
        1 => "info,herald=debug",
        _ => "trace",
    };
    init_logging(args.log_format, level);

    let config = HeraldConfig::load(&args.config)?;
    let ledger = Arc::new(RpcLedger::new(rpc_config(&config)?)?);
    tracing::info!(endpoint = %config.ledger.endpoint, contract = %config.ledger.contract, "using ledger");

    match args.command {
        Command::Read => {
            let text = ledger.read().await?;
            println!("{text}");
        }
        Command::Watch => {
            let controller = SyncController::spawn(ledger, config.sync_config()?);
            watch(&controller).await;
            controller.shutdown().await;
        }
        Command::Post { text } => {
            let controller = SyncController::spawn(ledger, config.sync_config()?);
            let result = post(&controller, text).await;
            controller.shutdown().await;
            result?;
        }
    }

    Ok(())
}

fn rpc_config(config: &HeraldConfig) -> Result<RpcConfig, Box<dyn Error>> {
    let ledger = &config.ledger;
    let mut rpc = RpcConfig::new(&ledger.endpoint, &ledger.contract);
    rpc.from = ledger.from.clone();

    if let Some(selector) = &ledger.read_selector {
        rpc.read_selector = parse_selector(selector)?;
    }
    if let Some(selector) = &ledger.write_selector {
        rpc.write_selector = parse_selector(selector)?;
    }
    if let Some(timeout) = config.request_timeout()? {
        rpc.request_timeout = timeout;
    }
    Ok(rpc)
}

async fn watch(controller: &SyncController) {
    let mut rx = controller.watch();
    let mut shown: Option<(Sequence, bool)> = None;

    loop {
        let state = rx.borrow_and_update().clone();
        let key = (state.latest.sequence(), state.is_stale());
        if state.latest.sequence() > Sequence::ZERO && shown != Some(key) {
            print_state(&state);
            shown = Some(key);
        }

        tokio::select! {
            changed = rx.changed() => if changed.is_err() {
                break;
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
}

fn print_state(state: &SyncState) {
    match &state.staleness {
        Some(err) => println!("{} (stale: {})", state.latest, err),
        None => println!("{}", state.latest),
    }
}

async fn post(controller: &SyncController, text: String) -> Result<(), Box<dyn Error>> {
    let mut rx = controller.watch();

    // Compare against the ledger, not the empty initial value
    let first = rx
        .wait_for(|s| s.latest.sequence() > Sequence::ZERO || s.is_stale())
        .await?
        .clone();
    if let Some(err) = first.staleness {
        return Err(format!("ledger unreachable: {err}").into());
    }

    let id = controller.submit(text).await?;
    tracing::info!(tx = %id, "submitted");

    let done = rx
        .wait_for(|s| s.draft.is_none() || s.last_error.is_some())
        .await?
        .clone();
    if let Some(err) = done.last_error {
        return Err(err.into());
    }

    println!("{}", done.latest);
    Ok(())
}
