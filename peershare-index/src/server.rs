//! UDP receive loop: one datagram in, one reply out, to whichever address sent it.

use std::future::Future;

use peershare_core::{IndexService, MAX_PDU_LEN};
use tokio::net::UdpSocket;
use tracing::{info, warn};

/// Serve requests on `socket` until `shutdown` resolves. The registry lives in this
/// task only; requests are handled one at a time.
pub async fn run_index(socket: UdpSocket, shutdown: impl Future<Output = ()>) -> IndexService {
    let mut service = IndexService::new();
    let mut buf = vec![0u8; MAX_PDU_LEN];
    tokio::pin!(shutdown);
    if let Ok(addr) = socket.local_addr() {
        info!("Index server started on {}", addr);
    }
    loop {
        tokio::select! {
            res = socket.recv_from(&mut buf) => {
                let (n, from) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("recv_from error: {}", e);
                        continue;
                    }
                };
                let reply = service.handle_datagram(&buf[..n], from);
                if let Err(e) = socket.send_to(&reply.encode(), from).await {
                    warn!("reply to {} failed: {}", from, e);
                }
            }
            _ = &mut shutdown => {
                info!("Index server shutting down ({} entries dropped)", service.registry().len());
                return service;
            }
        }
    }
}
