use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::{ProtocolError, WorkerMessage};
use crate::request::ContentType;

/// Slice an encoded payload into pieces of at most `chunk_size` bytes.
///
/// Base64 is ASCII, so any byte offset is a valid split point.
pub fn split_payload(encoded: &str, chunk_size: usize) -> Vec<&str> {
    let chunk_size = chunk_size.max(1);
    let mut pieces = Vec::with_capacity(encoded.len().div_ceil(chunk_size));
    let mut offset = 0;
    while offset < encoded.len() {
        let end = (offset + chunk_size).min(encoded.len());
        pieces.push(&encoded[offset..end]);
        offset = end;
    }
    pieces
}

/// Build the response frames for a finished render.
///
/// Payloads whose base64 form fits in `chunk_size` go out as one `result`;
/// larger ones as a `chunks` header followed by indexed `chunk` frames.
pub fn payload_messages(
    id: &str,
    content_type: ContentType,
    bytes: &[u8],
    chunk_size: usize,
) -> Vec<WorkerMessage> {
    let encoded = STANDARD.encode(bytes);
    if encoded.len() <= chunk_size {
        return vec![WorkerMessage::Result {
            id: id.to_string(),
            content_type,
            data: encoded,
        }];
    }

    let pieces = split_payload(&encoded, chunk_size);
    let mut messages = Vec::with_capacity(pieces.len() + 1);
    messages.push(WorkerMessage::Chunks {
        id: id.to_string(),
        content_type,
        total: pieces.len(),
        size: encoded.len(),
    });
    messages.extend(
        pieces
            .into_iter()
            .enumerate()
            .map(|(index, data)| WorkerMessage::Chunk {
                id: id.to_string(),
                index,
                data: data.to_string(),
            }),
    );
    messages
}

/// Collects indexed chunks and decodes them once all have arrived.
#[derive(Debug)]
pub struct ChunkAssembler {
    parts: Vec<Option<String>>,
    received: usize,
    size: usize,
}

impl ChunkAssembler {
    pub fn new(total: usize, size: usize) -> Self {
        Self {
            parts: vec![None; total],
            received: 0,
            size,
        }
    }

    pub fn insert(&mut self, index: usize, data: String) -> Result<(), ProtocolError> {
        let total = self.parts.len();
        let slot = self
            .parts
            .get_mut(index)
            .ok_or(ProtocolError::ChunkOutOfRange { index, total })?;
        if slot.is_some() {
            return Err(ProtocolError::DuplicateChunk(index));
        }
        *slot = Some(data);
        self.received += 1;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.parts.len()
    }

    /// Concatenate in index order, check the announced size, and decode.
    pub fn finish(self) -> Result<Vec<u8>, ProtocolError> {
        if !self.is_complete() {
            return Err(ProtocolError::IncompleteChunks {
                received: self.received,
                total: self.parts.len(),
            });
        }

        let mut encoded = String::with_capacity(self.size);
        for part in self.parts.into_iter().flatten() {
            encoded.push_str(&part);
        }
        if encoded.len() != self.size {
            return Err(ProtocolError::SizeMismatch {
                expected: self.size,
                actual: encoded.len(),
            });
        }
        Ok(STANDARD.decode(encoded)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHUNK_SIZE: usize = 512 * 1024;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    /// Feed frames through an assembler the way the dispatcher does.
    fn reassemble(messages: Vec<WorkerMessage>) -> Vec<u8> {
        let mut iter = messages.into_iter();
        match iter.next().unwrap() {
            WorkerMessage::Result { data, .. } => STANDARD.decode(data).unwrap(),
            WorkerMessage::Chunks { total, size, .. } => {
                let mut assembler = ChunkAssembler::new(total, size);
                for msg in iter {
                    let WorkerMessage::Chunk { index, data, .. } = msg else {
                        panic!("unexpected frame {msg:?}");
                    };
                    assembler.insert(index, data).unwrap();
                }
                assembler.finish().unwrap()
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn test_chunk_roundtrip_boundary_sizes() {
        for len in [
            0,
            1,
            CHUNK_SIZE - 1,
            CHUNK_SIZE,
            CHUNK_SIZE + 1,
            10 * CHUNK_SIZE + 37,
        ] {
            let bytes = sample(len);
            let messages = payload_messages("r", ContentType::Png, &bytes, CHUNK_SIZE);
            assert_eq!(reassemble(messages), bytes, "length {len}");
        }
    }

    #[test]
    fn test_split_then_assemble_out_of_order() {
        let bytes = sample(1000);
        let encoded = STANDARD.encode(&bytes);
        let pieces = split_payload(&encoded, 64);
        assert!(pieces.iter().all(|p| p.len() <= 64));

        let mut assembler = ChunkAssembler::new(pieces.len(), encoded.len());
        for (index, piece) in pieces.iter().enumerate().rev() {
            assembler.insert(index, piece.to_string()).unwrap();
        }
        assert_eq!(assembler.finish().unwrap(), bytes);
    }

    #[test]
    fn test_small_payload_is_single_result() {
        let messages = payload_messages("r", ContentType::Gif, b"tiny", CHUNK_SIZE);
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], WorkerMessage::Result { .. }));
    }

    #[test]
    fn test_large_payload_announces_counts() {
        let bytes = sample(300);
        let messages = payload_messages("r", ContentType::Png, &bytes, 100);
        let WorkerMessage::Chunks { total, size, .. } = &messages[0] else {
            panic!("expected chunks header");
        };
        assert_eq!(*size, STANDARD.encode(&bytes).len());
        assert_eq!(*total, messages.len() - 1);
    }

    #[test]
    fn test_missing_chunk_is_an_error() {
        let mut assembler = ChunkAssembler::new(3, 9);
        assembler.insert(0, "AAA".to_string()).unwrap();
        assembler.insert(2, "AAA".to_string()).unwrap();
        assert!(matches!(
            assembler.finish(),
            Err(ProtocolError::IncompleteChunks {
                received: 2,
                total: 3
            })
        ));
    }

    #[test]
    fn test_duplicate_and_out_of_range_chunks() {
        let mut assembler = ChunkAssembler::new(2, 8);
        assembler.insert(0, "AAAA".to_string()).unwrap();
        assert!(matches!(
            assembler.insert(0, "AAAA".to_string()),
            Err(ProtocolError::DuplicateChunk(0))
        ));
        assert!(matches!(
            assembler.insert(5, "AAAA".to_string()),
            Err(ProtocolError::ChunkOutOfRange { index: 5, total: 2 })
        ));
    }

    #[test]
    fn test_size_mismatch_is_detected() {
        let mut assembler = ChunkAssembler::new(1, 8);
        assembler.insert(0, "AAAA".to_string()).unwrap();
        assert!(matches!(
            assembler.finish(),
            Err(ProtocolError::SizeMismatch {
                expected: 8,
                actual: 4
            })
        ));
    }
}
