//! Index client: one synchronous request/reply exchange at a time over a connected UDP socket.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use peershare_core::{Pdu, MAX_PDU_LEN};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

use crate::error::PeerError;

pub struct IndexClient {
    socket: UdpSocket,
    index_addr: SocketAddr,
    reply_timeout: Option<Duration>,
}

impl IndexClient {
    /// Connect a UDP socket to the index. `reply_timeout` of `None` waits indefinitely.
    pub async fn connect(
        index_addr: SocketAddr,
        reply_timeout: Option<Duration>,
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        socket.connect(index_addr).await?;
        Ok(Self {
            socket,
            index_addr,
            reply_timeout,
        })
    }

    /// This node's address as seen on the route to the index. Never the wildcard.
    pub fn local_ip(&self) -> Result<Ipv4Addr, PeerError> {
        match self.socket.local_addr()?.ip() {
            IpAddr::V4(ip) if !ip.is_unspecified() => Ok(ip),
            _ => Err(PeerError::NoLocalAddress),
        }
    }

    /// Send one request and wait for one reply. Datagrams already queued before the
    /// request is sent are stale and get discarded.
    pub async fn request(&self, pdu: &Pdu) -> Result<Pdu, PeerError> {
        let mut buf = [0u8; MAX_PDU_LEN];
        while let Ok(n) = self.socket.try_recv(&mut buf) {
            debug!("discarding stale {}-byte datagram from index", n);
        }
        debug!("sending {:?} request to {}", pdu.kind, self.index_addr);
        self.socket.send(&pdu.encode()).await?;
        let n = match self.reply_timeout {
            Some(limit) => timeout(limit, self.socket.recv(&mut buf))
                .await
                .map_err(|_| PeerError::Timeout)??,
            None => self.socket.recv(&mut buf).await?,
        };
        Ok(Pdu::decode(&buf[..n])?)
    }

    /// Wait for a datagram nobody asked for (e.g. a reply that arrived after its
    /// request timed out) and discard it. Cancel safe.
    pub async fn drain_unsolicited(&self) {
        let mut buf = [0u8; MAX_PDU_LEN];
        match self.socket.recv(&mut buf).await {
            Ok(n) => debug!("discarding unsolicited {}-byte datagram from index", n),
            Err(e) => debug!("index socket error while idle: {}", e),
        }
    }
}
