//! # cloudchat
//!
//! Terminal chat client for rooms stored on the cloud-variable service.
//!
//! Messages of the current room are polled and printed as they appear;
//! lines typed at the prompt are sent, or run as `/commands` (see `/help`).

mod commands;
mod config;
mod error;
mod render;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cloudchat_client::{event_channel, AppState, ChatUser};
use cloudchat_net::{MemoryCloud, StoreConnector, Transport, WebSocketTransport};
use cloudchat_store::{KvStore, MemoryStore, SqliteStore};

use crate::commands::{Command, HELP};
use crate::config::CliConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never interleave with chat output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,cloudchat=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting cloudchat v{}", env!("CARGO_PKG_VERSION"));

    let config = CliConfig::from_env();
    info!(?config, "Loaded configuration");

    let store = open_store(&config)?;
    let transport: Arc<dyn Transport> = if config.uses_memory_cloud() {
        info!("Using the in-process cloud service");
        Arc::new(MemoryCloud::new())
    } else {
        Arc::new(WebSocketTransport::new(config.endpoint.clone()))
    };
    let connector = StoreConnector::new(transport, config.store_config());

    let user = if config.admin {
        ChatUser::admin(config.username.clone())
    } else {
        ChatUser::new(config.username.clone())
    };
    let (events_tx, events_rx) = event_channel();
    let mut state = AppState::new(connector, store, user, config.reconciler_config(), events_tx)?;

    let renderer = tokio::spawn(render::run(events_rx));
    println!("{HELP}\n");
    print_rooms(&state);
    state.start();

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };
    run_prompt(&mut state, BufReader::new(tokio::io::stdin()), shutdown).await?;

    state.reconciler.close();
    drop(state);
    renderer.abort();
    Ok(())
}

/// Handle input lines until end of input, `/quit` or `shutdown`.
///
/// `shutdown` also interrupts a command that is still waiting on the
/// network.
async fn run_prompt<R>(
    state: &mut AppState,
    input: R,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    tokio::pin!(shutdown);
    let mut lines = input.lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = &mut shutdown => return Ok(()),
        };
        let Some(line) = line else {
            return Ok(());
        };
        let keep_going = tokio::select! {
            keep_going = handle_line(state, &line) => keep_going,
            _ = &mut shutdown => return Ok(()),
        };
        if !keep_going {
            return Ok(());
        }
    }
}

fn open_store(config: &CliConfig) -> anyhow::Result<Arc<dyn KvStore>> {
    if config.ephemeral {
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = match &config.data_dir {
        Some(dir) => open_store_in(dir)?,
        None => SqliteStore::open()?,
    };
    Ok(Arc::new(store))
}

fn open_store_in(dir: &Path) -> anyhow::Result<SqliteStore> {
    std::fs::create_dir_all(dir)?;
    Ok(SqliteStore::open_at(&dir.join("cloudchat.db"))?)
}

/// Run one input line.  Returns `false` when the user asked to quit.
///
/// Most actions report their outcome through the event stream, so their
/// errors are only logged here.
async fn handle_line(state: &mut AppState, line: &str) -> bool {
    let command = match Command::parse(line) {
        Ok(Some(command)) => command,
        Ok(None) => return true,
        Err(e) => {
            println!("✗ {e}");
            return true;
        }
    };

    let result = match command {
        Command::Say(text) => state.send(&text, None).await.map(drop),
        Command::Quote(time, text) => state.send(&text, Some(time)).await.map(drop),
        Command::Share(file) => state.share(&file).await.map(drop),
        Command::Recall(time) => state.recall(time).await,
        Command::Create(title) => state.create_room(&title).await.map(drop),
        Command::Join(id) => state.join_room(&id).await.map(drop),
        Command::Rename(id, title) => state.rename_room(id, &title).await.map(drop),
        Command::Switch(id) => print_failure(state.switch_room(id)),
        Command::Leave(id) => print_failure(state.delete_room(id).map(drop)),
        Command::Refresh => print_failure(state.reconciler.refresh().await.map(drop)),
        Command::Rooms => {
            print_rooms(state);
            Ok(())
        }
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Quit => return false,
    };

    if let Err(e) = result {
        warn!(error = %e, "Command failed");
    }
    true
}

/// Report failures of actions that do not emit a notice of their own.
fn print_failure(result: cloudchat_client::Result<()>) -> cloudchat_client::Result<()> {
    if let Err(e) = &result {
        println!("✗ {e}");
    }
    Ok(())
}

fn print_rooms(state: &AppState) {
    let current = state.directory.current();
    for room in state.directory.rooms() {
        let marker = if room.id == current { "*" } else { " " };
        println!("{marker} {:>10}  {}", room.id, room.title);
    }
}
