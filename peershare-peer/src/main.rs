// PeerShare peer: publishes local files, downloads from other peers, serves transfers.

mod config;
mod console;
mod controller;
mod error;
mod index_client;
mod transfer;

use std::net::SocketAddr;

use anyhow::Context;
use peershare_core::Name;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::controller::Controller;
use crate::index_client::IndexClient;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("peershare-peer {}", VERSION);
        return Ok(());
    }
    if args.len() > 2 {
        anyhow::bail!("Usage: peershare-peer [index-host] [index-port]");
    }

    // Logs go to stderr; stdout belongs to the console.
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut cfg = config::load();
    if let Some(host) = args.first() {
        cfg.index_host = host.clone();
    }
    if let Some(port) = args.get(1) {
        cfg.index_port = port
            .parse()
            .with_context(|| format!("invalid port {:?}", port))?;
    }
    std::fs::create_dir_all(&cfg.download_dir).with_context(|| {
        format!(
            "can't create download directory {}",
            cfg.download_dir.display()
        )
    })?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let index_addr = resolve_index(&cfg.index_host, cfg.index_port).await?;
        let mut console_rx = console::spawn_stdin_reader();

        print!("Enter peer name (max 10 characters): ");
        std::io::Write::flush(&mut std::io::stdout())?;
        let line = console_rx
            .recv()
            .await
            .context("no peer name given")?;
        let peer = parse_peer_name(&line)?;

        let index = IndexClient::connect(index_addr, cfg.request_timeout())
            .await
            .with_context(|| format!("can't open socket to index at {}", index_addr))?;
        let mut controller = Controller::new(peer, index, cfg.download_dir.clone());
        info!(
            "peer '{}' using index at {}",
            controller.peer(),
            index_addr
        );
        println!("Peer '{}' ready.", controller.peer());
        println!("{}", console::HELP);
        controller.run(console_rx, shutdown_signal()).await;
        Ok::<(), anyhow::Error>(())
    })
}

/// Peer name as typed: surrounding whitespace is dropped, inner spaces are kept.
fn parse_peer_name(line: &str) -> anyhow::Result<Name> {
    Name::new(line.trim()).context("Invalid peer name")
}

/// First IPv4 address of the index host; PDUs only carry IPv4.
async fn resolve_index(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("can't resolve index host {:?}", host))?
        .find(SocketAddr::is_ipv4)
        .with_context(|| format!("index host {:?} has no IPv4 address", host))
}

/// Resolves on Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
