//! Transfer chunking: split a content byte stream into C/F PDUs; classify received ones.

use bytes::Bytes;

use crate::wire::{Pdu, PduType, MAX_PAYLOAD};

/// Transfer chunk size. A chunk this size means more data follows.
pub const CHUNK_SIZE: usize = MAX_PAYLOAD;

/// PDU type for a chunk of `len` bytes read from the source: full chunks are `C`,
/// anything shorter (including zero bytes at EOF) is the final `F`.
pub fn chunk_kind(len: usize) -> PduType {
    if len == CHUNK_SIZE {
        PduType::Content
    } else {
        PduType::Final
    }
}

/// Wrap one chunk read from the source. `data` must not exceed `CHUNK_SIZE`.
pub fn chunk_pdu(data: &[u8]) -> Pdu {
    debug_assert!(data.len() <= CHUNK_SIZE);
    Pdu {
        kind: chunk_kind(data.len()),
        payload: Bytes::copy_from_slice(data),
    }
}

/// Exact PDU sequence sent for an in-memory content: C* followed by one F.
pub fn split_chunks(data: &[u8]) -> Vec<Pdu> {
    let mut out: Vec<Pdu> = data.chunks(CHUNK_SIZE).map(chunk_pdu).collect();
    if out.last().map_or(true, |p| p.kind == PduType::Content) {
        out.push(Pdu::empty(PduType::Final));
    }
    out
}

/// What a received PDU means to the downloading side of a transfer.
#[derive(Debug, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// `C`: store the payload, more follows.
    More,
    /// `F`: store the payload, transfer complete.
    Last,
    /// `E`: sender aborted with this message.
    Aborted(String),
    /// PDU type not valid during a transfer.
    Unexpected(PduType),
}

pub fn classify(pdu: &Pdu) -> ChunkOutcome {
    match pdu.kind {
        PduType::Content => ChunkOutcome::More,
        PduType::Final => ChunkOutcome::Last,
        PduType::Error => ChunkOutcome::Aborted(pdu.text_payload()),
        other => ChunkOutcome::Unexpected(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn shape(pdus: &[Pdu]) -> Vec<(PduType, usize)> {
        pdus.iter().map(|p| (p.kind, p.payload.len())).collect()
    }

    #[test]
    fn partial_last_chunk() {
        let data = vec![1u8; 250];
        assert_eq!(
            shape(&split_chunks(&data)),
            vec![
                (PduType::Content, 100),
                (PduType::Content, 100),
                (PduType::Final, 50)
            ]
        );
    }

    #[test]
    fn exact_multiple_ends_with_empty_final() {
        let data = vec![1u8; 300];
        assert_eq!(
            shape(&split_chunks(&data)),
            vec![
                (PduType::Content, 100),
                (PduType::Content, 100),
                (PduType::Content, 100),
                (PduType::Final, 0)
            ]
        );
    }

    #[test]
    fn empty_content_is_single_empty_final() {
        assert_eq!(shape(&split_chunks(&[])), vec![(PduType::Final, 0)]);
    }

    #[test]
    fn chunks_reassemble_in_order() {
        let data: Vec<u8> = (0..250u32).map(|i| i as u8).collect();
        let mut out = BytesMut::new();
        let mut done = false;
        for pdu in split_chunks(&data) {
            assert!(!done);
            match classify(&pdu) {
                ChunkOutcome::More => {}
                ChunkOutcome::Last => done = true,
                other => panic!("unexpected {:?}", other),
            }
            out.extend_from_slice(&pdu.payload);
        }
        assert!(done);
        assert_eq!(out.as_ref(), data.as_slice());
    }

    #[test]
    fn error_and_foreign_types() {
        assert_eq!(
            classify(&Pdu::error("Read error")),
            ChunkOutcome::Aborted("Read error".to_string())
        );
        assert_eq!(
            classify(&Pdu::empty(PduType::Ack)),
            ChunkOutcome::Unexpected(PduType::Ack)
        );
    }
}
