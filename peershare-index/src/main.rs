// PeerShare index service: UDP content registry daemon.

mod config;
mod server;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    let mut port_arg = None;
    let mut args = std::env::args().skip(1);
    if let Some(arg) = args.next() {
        if arg == "--version" || arg == "-V" {
            println!("peershare-index {}", VERSION);
            return Ok(());
        }
        port_arg = Some(arg);
    }
    if args.next().is_some() {
        anyhow::bail!("Usage: peershare-index [port]");
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut cfg = config::load();
    if let Some(p) = port_arg {
        cfg.port = p
            .parse()
            .with_context(|| format!("invalid port {:?}", p))?;
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let socket = tokio::net::UdpSocket::bind(("0.0.0.0", cfg.port))
            .await
            .with_context(|| format!("can't bind to port {}", cfg.port))?;
        server::run_index(socket, shutdown_signal()).await;
        Ok::<(), anyhow::Error>(())
    })
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
