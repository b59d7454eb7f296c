//! groupchat command-line client.
//!
//! # Usage
//!
//! ```text
//! groupchat [--config <FILE>] [--member <NAME>] [chat]
//! groupchat probe [-addr <IP>] [-port <PORT>] [-timeout <MS>] [KEY ...]
//! ```
//!
//! `chat` (the default) joins the configured cluster as soon as a usable
//! network appears and keeps the membership alive across network changes.
//! Each stdin line is sent to the group; `/quit` or Ctrl-C leaves.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()
//!  └─ spawn_link_poller()      -- route probe thread, emits snapshots
//!  └─ NetworkWatcher::run()    -- settle delay, then RefreshOnTransition
//!       └─ ChannelManager::connect_or_refresh()
//!  └─ select loop
//!       ├─ stdin line        -> ChannelManager::send (spawn_blocking)
//!       ├─ status stream     -> "[System] <status>"
//!       └─ message stream    -> "<sender>: <text>"
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use groupchat_client::application::{
    channel_manager::{ChannelManager, RefreshOnTransition},
    events::event_streams,
    hot_swap::HotSwap,
    network_watcher::NetworkWatcher,
};
use groupchat_client::infrastructure::{
    diagnostics::run_probe,
    link_monitor::{spawn_link_poller, RouteProbeSource},
    storage::config::{load_config, load_config_from, AppConfig},
    transport::{address::LocalAddressResolver, udp::UdpTransportFactory},
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Multicast group chat that survives network changes.
#[derive(Debug, Parser)]
#[command(name = "groupchat", version)]
struct Cli {
    /// Configuration file; defaults to the platform config directory.
    #[arg(long, env = "GROUPCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Member name, overriding `chat.member_name`.
    #[arg(long, env = "GROUPCHAT_MEMBER")]
    member: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Join the group and chat on stdin/stdout.
    Chat,
    /// Query running members over the diagnostics group.
    Probe {
        /// Options (`-addr`, `-port`, `-timeout`) and keys.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        query: Vec<String>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => load_config().context("loading config")?,
    };

    // Logs go to stderr so stdout carries only the conversation.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Command::Chat) {
        Command::Probe { query } => probe(query.join(" ")).await,
        Command::Chat => {
            let member = cli.member.unwrap_or_else(|| config.chat.member_name.clone());
            chat(config, member).await
        }
    }
}

async fn probe(query: String) -> anyhow::Result<()> {
    let (count, output) = tokio::task::spawn_blocking(move || {
        let mut output = Vec::new();
        run_probe(&query, &mut output).map(|count| (count, output))
    })
    .await
    .context("probe task")?
    .context("Probe Error")?;

    let mut stdout = std::io::stdout().lock();
    if count == 0 {
        writeln!(stdout, "No responses received.")?;
    } else {
        stdout.write_all(&output)?;
    }
    Ok(())
}

async fn chat(config: AppConfig, member: String) -> anyhow::Result<()> {
    info!("groupchat starting as {member:?} in cluster {:?}", config.chat.cluster_name);

    let group = config.transport.group_addr();
    let (events, mut streams) = event_streams(config.chat.event_capacity);

    let resolver = Arc::new(LocalAddressResolver::new(group, config.transport.bind_address));
    let factory = Arc::new(UdpTransportFactory::new(
        config.transport.udp_config(),
        Arc::clone(&resolver),
    ));
    let manager = Arc::new(ChannelManager::new(
        config.chat.channel_settings(),
        factory,
        HotSwap::new(resolver),
    ));

    // ── Link monitor and watcher ──────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let notifications =
        spawn_link_poller(group, config.watcher.poll_interval(), Arc::clone(&running))
            .context("starting link monitor")?;
    let watcher = Arc::new(NetworkWatcher::new(
        config.watcher.settle_delay(),
        Arc::new(RouteProbeSource::new(group)),
        Arc::new(RefreshOnTransition::new(Arc::clone(&manager), member, events)),
    ));
    let watcher_task = {
        let watcher = Arc::clone(&watcher);
        tokio::spawn(async move { watcher.run(notifications).await })
    };

    println!("Waiting for network...");

    // ── Conversation loop ─────────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else { break };
                let text = line.trim().to_string();
                if text == "/quit" {
                    break;
                }
                if text.is_empty() {
                    continue;
                }
                let sender = Arc::clone(&manager);
                let outgoing = text.clone();
                if tokio::task::spawn_blocking(move || sender.send(&outgoing)).await? {
                    println!("Me: {text}");
                } else {
                    println!("[System] not connected; message not sent");
                }
            }
            Some(status) = streams.status.recv() => println!("[System] {status}"),
            Some(message) = streams.messages.recv() => println!("{message}"),
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────
    running.store(false, Ordering::Relaxed);
    watcher_task.abort();
    watcher.cancel_pending();
    if let Err(e) = tokio::task::spawn_blocking(move || manager.close()).await {
        warn!("closing channel: {e}");
    }
    info!("groupchat stopped");
    Ok(())
}
