//! PeerShare payload layouts: bounded name fields and the R/S/T/D field codecs.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use bytes::{Buf, BufMut, BytesMut};

use crate::wire::{Pdu, PduType};

/// Width of a peer-name or content-name field on the wire.
pub const NAME_LEN: usize = 10;

/// IPv4 (4 bytes) + port (2 bytes), both network order.
pub const ADDR_LEN: usize = 6;

/// Minimum payload of a registration request.
pub const REGISTER_LEN: usize = NAME_LEN + NAME_LEN + ADDR_LEN;

/// Minimum payload of a deregistration request.
pub const DEREGISTER_LEN: usize = NAME_LEN + NAME_LEN;

/// Peer or content name. Names built locally are 1 to 10 bytes without NUL; names
/// decoded from the wire are whatever the field held, minus its padding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(String);

impl Name {
    pub fn new(s: &str) -> Result<Self, NameError> {
        if s.is_empty() {
            return Err(NameError::Empty);
        }
        if s.len() > NAME_LEN {
            return Err(NameError::TooLong(s.len()));
        }
        if s.bytes().any(|b| b == 0) {
            return Err(NameError::InvalidCharacter);
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Write the name into a fixed 10-byte field, NUL padded.
    pub fn encode_field(&self, buf: &mut BytesMut) {
        let bytes = &self.0.as_bytes()[..self.0.len().min(NAME_LEN)];
        buf.put_slice(bytes);
        buf.put_bytes(0, NAME_LEN - bytes.len());
    }

    /// Read a 10-byte field. The name ends at the first NUL and trailing blanks are
    /// stripped. Any other content is accepted, decoded as lossy UTF-8.
    pub fn decode_field(field: &[u8]) -> Result<Self, FieldError> {
        if field.len() < NAME_LEN {
            return Err(FieldError::Short {
                needed: NAME_LEN,
                got: field.len(),
            });
        }
        let field = &field[..NAME_LEN];
        let end = field.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        let text = String::from_utf8_lossy(&field[..end]);
        Ok(Self(text.trim_end_matches(' ').to_string()))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Name::new(s)
    }
}

/// Name failed validation.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum NameError {
    #[error("name is empty")]
    Empty,
    #[error("name too long: {0} bytes (max 10)")]
    TooLong(usize),
    #[error("name contains a NUL byte")]
    InvalidCharacter,
}

/// Payload did not carry the fields its type requires.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("payload too short: need {needed} bytes, got {got}")]
    Short { needed: usize, got: usize },
    #[error("unexpected PDU type {0:?}")]
    UnexpectedType(PduType),
}

fn encode_addr(addr: SocketAddrV4, buf: &mut BytesMut) {
    buf.put_slice(&addr.ip().octets());
    buf.put_u16(addr.port());
}

fn decode_addr(mut data: &[u8]) -> Result<SocketAddrV4, FieldError> {
    if data.len() < ADDR_LEN {
        return Err(FieldError::Short {
            needed: ADDR_LEN,
            got: data.len(),
        });
    }
    let ip = Ipv4Addr::from(data.get_u32());
    let port = data.get_u16();
    Ok(SocketAddrV4::new(ip, port))
}

fn expect_kind(pdu: &Pdu, kind: PduType) -> Result<(), FieldError> {
    if pdu.kind != kind {
        return Err(FieldError::UnexpectedType(pdu.kind));
    }
    Ok(())
}

/// `R`: peer-name ‖ content-name ‖ IPv4 ‖ port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    pub peer: Name,
    pub content: Name,
    pub addr: SocketAddrV4,
}

impl RegisterRequest {
    pub fn encode(&self) -> Pdu {
        let mut buf = BytesMut::with_capacity(REGISTER_LEN);
        self.peer.encode_field(&mut buf);
        self.content.encode_field(&mut buf);
        encode_addr(self.addr, &mut buf);
        Pdu {
            kind: PduType::Register,
            payload: buf.freeze(),
        }
    }

    pub fn decode(payload: &[u8]) -> Result<Self, FieldError> {
        if payload.len() < REGISTER_LEN {
            return Err(FieldError::Short {
                needed: REGISTER_LEN,
                got: payload.len(),
            });
        }
        Ok(Self {
            peer: Name::decode_field(&payload[..NAME_LEN])?,
            content: Name::decode_field(&payload[NAME_LEN..2 * NAME_LEN])?,
            addr: decode_addr(&payload[2 * NAME_LEN..])?,
        })
    }
}

/// `S` request: content-name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub content: Name,
}

impl SearchRequest {
    pub fn encode(&self) -> Pdu {
        let mut buf = BytesMut::with_capacity(NAME_LEN);
        self.content.encode_field(&mut buf);
        Pdu {
            kind: PduType::Search,
            payload: buf.freeze(),
        }
    }

    pub fn decode(payload: &[u8]) -> Result<Self, FieldError> {
        Ok(Self {
            content: Name::decode_field(payload)?,
        })
    }
}

/// `S` reply: address of the selected transfer server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchReply {
    pub addr: SocketAddrV4,
}

impl SearchReply {
    pub fn encode(&self) -> Pdu {
        let mut buf = BytesMut::with_capacity(ADDR_LEN);
        encode_addr(self.addr, &mut buf);
        Pdu {
            kind: PduType::Search,
            payload: buf.freeze(),
        }
    }

    pub fn decode(pdu: &Pdu) -> Result<Self, FieldError> {
        expect_kind(pdu, PduType::Search)?;
        Ok(Self {
            addr: decode_addr(&pdu.payload)?,
        })
    }
}

/// `T`: peer-name ‖ content-name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeregisterRequest {
    pub peer: Name,
    pub content: Name,
}

impl DeregisterRequest {
    pub fn encode(&self) -> Pdu {
        let mut buf = BytesMut::with_capacity(DEREGISTER_LEN);
        self.peer.encode_field(&mut buf);
        self.content.encode_field(&mut buf);
        Pdu {
            kind: PduType::Deregister,
            payload: buf.freeze(),
        }
    }

    pub fn decode(payload: &[u8]) -> Result<Self, FieldError> {
        if payload.len() < DEREGISTER_LEN {
            return Err(FieldError::Short {
                needed: DEREGISTER_LEN,
                got: payload.len(),
            });
        }
        Ok(Self {
            peer: Name::decode_field(&payload[..NAME_LEN])?,
            content: Name::decode_field(&payload[NAME_LEN..])?,
        })
    }
}

/// `D`: content-name, sent peer to peer as the first PDU of a transfer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub content: Name,
}

impl DownloadRequest {
    pub fn encode(&self) -> Pdu {
        let mut buf = BytesMut::with_capacity(NAME_LEN);
        self.content.encode_field(&mut buf);
        Pdu {
            kind: PduType::Download,
            payload: buf.freeze(),
        }
    }

    pub fn decode(pdu: &Pdu) -> Result<Self, FieldError> {
        expect_kind(pdu, PduType::Download)?;
        Ok(Self {
            content: Name::decode_field(&pdu.payload)?,
        })
    }
}
