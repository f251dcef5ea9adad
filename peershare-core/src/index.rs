//! Host-driven index service: the host passes each received datagram, the service
//! mutates or queries its registry and returns the reply PDU. No I/O here.

use std::net::SocketAddr;

use tracing::{debug, info};

use crate::protocol::{DeregisterRequest, RegisterRequest, SearchReply, SearchRequest};
use crate::registry::{Registry, RegistryError};
use crate::wire::{Pdu, PduType};

pub const MSG_REGISTERED: &str = "Registration successful";
pub const MSG_DEREGISTERED: &str = "Deregistration successful";
pub const MSG_INVALID_REGISTRATION: &str = "Invalid registration format";
pub const MSG_DUPLICATE: &str = "Peer name and content already registered";
pub const MSG_INVALID_SEARCH: &str = "Invalid search format";
pub const MSG_NOT_FOUND: &str = "Content not found";
pub const MSG_INVALID_DEREGISTRATION: &str = "Invalid deregistration format";
pub const MSG_NOT_FOUND_DEREGISTRATION: &str = "Content not found for deregistration";
pub const MSG_UNKNOWN_TYPE: &str = "Unknown PDU type";

/// Index service state: the registry, owned by whoever drives the receive loop.
#[derive(Debug, Default)]
pub struct IndexService {
    registry: Registry,
}

impl IndexService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Handle one request datagram from `from` and return the reply to send back there.
    /// Malformed input always yields an `E` reply; it never fails.
    pub fn handle_datagram(&mut self, datagram: &[u8], from: SocketAddr) -> Pdu {
        let pdu = match Pdu::decode(datagram) {
            Ok(pdu) => pdu,
            Err(e) => {
                debug!("undecodable datagram from {}: {}", from, e);
                return Pdu::error(MSG_UNKNOWN_TYPE);
            }
        };
        match pdu.kind {
            PduType::Register => self.on_register(&pdu.payload),
            PduType::Search => self.on_search(&pdu.payload),
            PduType::Deregister => self.on_deregister(&pdu.payload),
            PduType::List => {
                info!("List request from {}", from);
                Pdu::text(PduType::List, &self.registry.list())
            }
            other => {
                debug!("unknown PDU type {:?} from {}", other, from);
                Pdu::error(MSG_UNKNOWN_TYPE)
            }
        }
    }

    fn on_register(&mut self, payload: &[u8]) -> Pdu {
        let req = match RegisterRequest::decode(payload) {
            Ok(req) => req,
            Err(e) => {
                debug!("bad registration: {}", e);
                return Pdu::error(MSG_INVALID_REGISTRATION);
            }
        };
        let RegisterRequest {
            peer,
            content,
            addr,
        } = req;
        match self.registry.add(peer.clone(), content.clone(), addr) {
            Ok(()) => {
                info!(
                    "Registered: peer='{}' content='{}' address={}",
                    peer, content, addr
                );
                Pdu::ack(MSG_REGISTERED)
            }
            Err(RegistryError::Duplicate { .. }) => Pdu::error(MSG_DUPLICATE),
        }
    }

    fn on_search(&mut self, payload: &[u8]) -> Pdu {
        let req = match SearchRequest::decode(payload) {
            Ok(req) => req,
            Err(e) => {
                debug!("bad search: {}", e);
                return Pdu::error(MSG_INVALID_SEARCH);
            }
        };
        let (peer, addr) = match self.registry.find_least_used(&req.content) {
            Some(entry) => (entry.peer.clone(), entry.addr),
            None => return Pdu::error(MSG_NOT_FOUND),
        };
        self.registry.increment_usage(&peer, &req.content);
        info!(
            "Search: content='{}' -> peer='{}' address={}",
            req.content, peer, addr
        );
        SearchReply { addr }.encode()
    }

    fn on_deregister(&mut self, payload: &[u8]) -> Pdu {
        let req = match DeregisterRequest::decode(payload) {
            Ok(req) => req,
            Err(e) => {
                debug!("bad deregistration: {}", e);
                return Pdu::error(MSG_INVALID_DEREGISTRATION);
            }
        };
        if self.registry.remove(&req.peer, &req.content) {
            info!("Deregistered: peer='{}' content='{}'", req.peer, req.content);
            Pdu::ack(MSG_DEREGISTERED)
        } else {
            Pdu::error(MSG_NOT_FOUND_DEREGISTRATION)
        }
    }
}
