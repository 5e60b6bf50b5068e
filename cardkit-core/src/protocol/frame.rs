use std::collections::VecDeque;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::ProtocolError;

/// Marker terminating every frame.
pub const FRAME_DELIMITER: &str = "\n<<CARDKIT_END>>\n";

/// Serialize a message and append the delimiter.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.extend_from_slice(FRAME_DELIMITER.as_bytes());
    Ok(bytes)
}

/// Splits a byte stream into delimiter-terminated frames.
///
/// Complete frames are queued as soon as they arrive; only the trailing
/// partial frame stays in the buffer, and its size is bounded by
/// `max_buffered`.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    /// Offset from which the next delimiter search starts
    scan_from: usize,
    frames: VecDeque<Vec<u8>>,
    max_buffered: usize,
}

impl FrameDecoder {
    pub fn new(max_buffered: usize) -> Self {
        Self {
            buf: Vec::new(),
            scan_from: 0,
            frames: VecDeque::new(),
            max_buffered,
        }
    }

    /// Append raw input.
    ///
    /// Fails with [`ProtocolError::TooLarge`] when the unterminated tail grows
    /// past the limit. Frames completed before the overflow remain readable.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.buf.extend_from_slice(bytes);
        self.split_complete();

        if self.buf.len() > self.max_buffered {
            return Err(ProtocolError::TooLarge {
                buffered: self.buf.len(),
                limit: self.max_buffered,
            });
        }
        Ok(())
    }

    /// Pop the next complete frame as raw bytes (delimiter stripped).
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        self.frames.pop_front()
    }

    /// Pop and parse the next complete frame.
    ///
    /// A frame that fails to parse yields `Some(Err(_))` once; frames behind
    /// it are unaffected.
    pub fn next_message<T: DeserializeOwned>(&mut self) -> Option<Result<T, ProtocolError>> {
        self.next_frame()
            .map(|frame| serde_json::from_slice(&frame).map_err(ProtocolError::from))
    }

    /// Bytes of the current unterminated frame.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Number of complete frames waiting to be read.
    pub fn queued(&self) -> usize {
        self.frames.len()
    }

    fn split_complete(&mut self) {
        let delim = FRAME_DELIMITER.as_bytes();
        let mut start = 0;

        while let Some(pos) = find(&self.buf[self.scan_from..], delim) {
            let end = self.scan_from + pos;
            self.frames.push_back(self.buf[start..end].to_vec());
            start = end + delim.len();
            self.scan_from = start;
        }

        if start > 0 {
            self.buf.drain(..start);
        }
        // A delimiter may straddle the next push.
        self.scan_from = self.buf.len().saturating_sub(delim.len() - 1);
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ErrorKind, HostMessage, WorkerMessage};

    fn ready() -> WorkerMessage {
        WorkerMessage::Ready {
            pid: 7,
            version: "test".to_string(),
        }
    }

    #[test]
    fn test_single_frame_roundtrip() {
        let mut decoder = FrameDecoder::new(1024);
        decoder.push(&encode_frame(&ready()).unwrap()).unwrap();

        let msg: WorkerMessage = decoder.next_message().unwrap().unwrap();
        assert_eq!(msg, ready());
        assert!(decoder.next_frame().is_none());
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_partial_input_is_retained() {
        let bytes = encode_frame(&HostMessage::Shutdown).unwrap();
        let (head, tail) = bytes.split_at(bytes.len() - 5);

        let mut decoder = FrameDecoder::new(1024);
        decoder.push(head).unwrap();
        assert!(decoder.next_frame().is_none());
        assert_eq!(decoder.pending_len(), head.len());

        decoder.push(tail).unwrap();
        let msg: HostMessage = decoder.next_message().unwrap().unwrap();
        assert_eq!(msg, HostMessage::Shutdown);
    }

    #[test]
    fn test_byte_at_a_time_delivery() {
        let mut stream = encode_frame(&ready()).unwrap();
        stream.extend(encode_frame(&HostMessage::Shutdown).unwrap());

        let mut decoder = FrameDecoder::new(1024);
        for byte in &stream {
            decoder.push(std::slice::from_ref(byte)).unwrap();
        }
        assert_eq!(decoder.queued(), 2);
    }

    #[test]
    fn test_multiple_frames_in_one_push_keep_trailing_partial() {
        let mut stream = encode_frame(&ready()).unwrap();
        stream.extend(encode_frame(&ready()).unwrap());
        stream.extend_from_slice(b"{\"type\":\"rea");

        let mut decoder = FrameDecoder::new(1024);
        decoder.push(&stream).unwrap();
        assert_eq!(decoder.queued(), 2);
        assert_eq!(decoder.pending_len(), "{\"type\":\"rea".len());
    }

    #[test]
    fn test_malformed_frame_does_not_drop_followers() {
        let mut stream = b"{not json".to_vec();
        stream.extend_from_slice(FRAME_DELIMITER.as_bytes());
        stream.extend(encode_frame(&ready()).unwrap());

        let mut decoder = FrameDecoder::new(1024);
        decoder.push(&stream).unwrap();

        let first: Option<Result<WorkerMessage, _>> = decoder.next_message();
        assert!(matches!(first, Some(Err(ProtocolError::Malformed(_)))));
        let second: WorkerMessage = decoder.next_message().unwrap().unwrap();
        assert_eq!(second, ready());
    }

    #[test]
    fn test_embedded_newlines_survive() {
        let msg = WorkerMessage::Error {
            id: Some("r".to_string()),
            kind: ErrorKind::Render,
            message: "line one\nline two".to_string(),
            stack: Some("at a\nat b".to_string()),
        };
        let mut decoder = FrameDecoder::new(1024);
        decoder.push(&encode_frame(&msg).unwrap()).unwrap();
        let decoded: WorkerMessage = decoder.next_message().unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_oversized_partial_is_rejected() {
        let mut decoder = FrameDecoder::new(16);
        let err = decoder.push(&[b'x'; 17]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::TooLarge {
                buffered: 17,
                limit: 16
            }
        ));
    }

    #[test]
    fn test_complete_frames_do_not_count_against_limit() {
        let frame = encode_frame(&ready()).unwrap();
        let mut decoder = FrameDecoder::new(frame.len());
        let mut stream = frame.clone();
        stream.extend(frame.clone());
        stream.extend(frame);
        decoder.push(&stream).unwrap();
        assert_eq!(decoder.queued(), 3);
    }
}
