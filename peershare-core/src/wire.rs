//! Framing: 1-byte type tag + up to 100 bytes of payload. No length field; the
//! transport byte count says how much of the payload is meaningful.

use bytes::{BufMut, Bytes, BytesMut};

/// Payload capacity of a single PDU.
pub const MAX_PAYLOAD: usize = 100;

/// Largest possible encoded PDU (tag + full payload).
pub const MAX_PDU_LEN: usize = 1 + MAX_PAYLOAD;

/// PDU type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PduType {
    /// `R`: peer registers content with the index.
    Register,
    /// `S`: search request (peer -> index) and its address reply.
    Search,
    /// `T`: peer withdraws a registration.
    Deregister,
    /// `O`: list request and its text reply.
    List,
    /// `A`: acknowledgement.
    Ack,
    /// `E`: error with a NUL-terminated message.
    Error,
    /// `D`: download request, peer -> peer.
    Download,
    /// `C`: full chunk of file data, more follows.
    Content,
    /// `F`: final (possibly empty) chunk of file data.
    Final,
    /// Any tag this protocol does not define.
    Unknown(u8),
}

impl PduType {
    pub fn tag(self) -> u8 {
        match self {
            PduType::Register => b'R',
            PduType::Search => b'S',
            PduType::Deregister => b'T',
            PduType::List => b'O',
            PduType::Ack => b'A',
            PduType::Error => b'E',
            PduType::Download => b'D',
            PduType::Content => b'C',
            PduType::Final => b'F',
            PduType::Unknown(tag) => tag,
        }
    }

    pub fn from_tag(tag: u8) -> Self {
        match tag {
            b'R' => PduType::Register,
            b'S' => PduType::Search,
            b'T' => PduType::Deregister,
            b'O' => PduType::List,
            b'A' => PduType::Ack,
            b'E' => PduType::Error,
            b'D' => PduType::Download,
            b'C' => PduType::Content,
            b'F' => PduType::Final,
            other => PduType::Unknown(other),
        }
    }
}

/// One protocol data unit. `payload` holds only the bytes that were sent or received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub kind: PduType,
    pub payload: Bytes,
}

impl Pdu {
    /// Build a PDU. Fails if the payload does not fit the fixed capacity.
    pub fn new(kind: PduType, payload: impl Into<Bytes>) -> Result<Self, PduError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD {
            return Err(PduError::PayloadTooLarge(payload.len()));
        }
        Ok(Self { kind, payload })
    }

    /// PDU with no payload (list request, empty final chunk).
    pub fn empty(kind: PduType) -> Self {
        Self {
            kind,
            payload: Bytes::new(),
        }
    }

    /// Text PDU: message bytes followed by one NUL, truncated to fit the payload.
    pub fn text(kind: PduType, message: &str) -> Self {
        let bytes = message.as_bytes();
        let take = bytes.len().min(MAX_PAYLOAD - 1);
        let mut buf = BytesMut::with_capacity(take + 1);
        buf.put_slice(&bytes[..take]);
        buf.put_u8(0);
        Self {
            kind,
            payload: buf.freeze(),
        }
    }

    pub fn error(message: &str) -> Self {
        Self::text(PduType::Error, message)
    }

    pub fn ack(message: &str) -> Self {
        Self::text(PduType::Ack, message)
    }

    /// Read the payload as text: up to the first NUL (or the end), lossy UTF-8.
    pub fn text_payload(&self) -> String {
        let end = self
            .payload
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.payload.len());
        String::from_utf8_lossy(&self.payload[..end]).into_owned()
    }

    /// Tag followed by exactly the payload bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + self.payload.len());
        buf.put_u8(self.kind.tag());
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Decode a received datagram (or an assembled stream frame). Bytes past the
    /// payload capacity are ignored, never read into the PDU.
    pub fn decode(raw: &[u8]) -> Result<Self, PduError> {
        let (&tag, rest) = raw.split_first().ok_or(PduError::Truncated)?;
        let take = rest.len().min(MAX_PAYLOAD);
        Ok(Self {
            kind: PduType::from_tag(tag),
            payload: Bytes::copy_from_slice(&rest[..take]),
        })
    }
}

/// Error building or decoding a PDU.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PduError {
    #[error("payload too large: {0} bytes (max 100)")]
    PayloadTooLarge(usize),
    #[error("truncated PDU: no type tag")]
    Truncated,
}

/// How many payload bytes follow the tag on a byte stream (TCP), where message
/// boundaries are not preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFraming {
    /// Exactly this many bytes.
    Exact(usize),
    /// Up to this many bytes, ending when the sender closes the session.
    UntilClose(usize),
}

/// Stream framing for each PDU type that may appear on a transfer session.
/// `None` for types never sent over TCP.
pub fn stream_framing(kind: PduType) -> Option<StreamFraming> {
    match kind {
        PduType::Download => Some(StreamFraming::Exact(crate::protocol::NAME_LEN)),
        PduType::Content => Some(StreamFraming::Exact(MAX_PAYLOAD)),
        PduType::Final | PduType::Error => Some(StreamFraming::UntilClose(MAX_PAYLOAD)),
        _ => None,
    }
}
