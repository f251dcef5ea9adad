//! PeerShare protocol core.
//! Host-driven: no sockets; hosts pass received bytes and send what comes back.
//! The only file access is config loading for the daemons.

pub mod chunk;
pub mod config;
pub mod index;
pub mod protocol;
pub mod registry;
pub mod wire;

pub use index::IndexService;
pub use protocol::{Name, NameError, NAME_LEN};
pub use registry::{Entry, Registry, RegistryError};
pub use wire::{Pdu, PduError, PduType, MAX_PAYLOAD, MAX_PDU_LEN};
