use crate::{Error, Result};
use crate::protocol::{MessageHeader, RtmpMessage};
use std::collections::HashMap;

/// Assembly state for one chunk stream.
///
/// Header and timestamp memory persists across messages; the body buffer
/// lives only while a message is in flight.
#[derive(Debug, Clone, Default)]
pub struct ChunkStreamState {
    /// Last resolved header on this chunk stream
    prev_header: Option<MessageHeader>,

    /// Header of the message currently being assembled
    current: Option<MessageHeader>,

    /// Last timestamp delta, reused by repeated type 3 headers
    timestamp_delta: u32,

    /// Whether the last wire header carried the 4-byte extended timestamp
    extended: bool,

    /// Partial message body
    buffer: Vec<u8>,

    /// Bytes still owed for the current message
    bytes_remaining: usize,
}

impl ChunkStreamState {
    pub fn prev_header(&self) -> Option<&MessageHeader> {
        self.prev_header.as_ref()
    }

    pub fn timestamp_delta(&self) -> u32 {
        self.timestamp_delta
    }

    pub fn uses_extended(&self) -> bool {
        self.extended
    }

    pub fn bytes_remaining(&self) -> usize {
        self.bytes_remaining
    }

    /// Check if a message is currently being assembled
    pub fn is_assembling(&self) -> bool {
        self.current.is_some()
    }

    /// Start a new message from a resolved header. Rejects the header if the
    /// previous message on this chunk stream never finished.
    pub fn apply_header(&mut self, header: MessageHeader, delta: u32, extended: bool) -> Result<()> {
        if let Some(current) = &self.current {
            return Err(Error::protocol(format!(
                "chunk stream {}: new message header while {} of {} body bytes are still outstanding",
                header.chunk_stream_id, self.bytes_remaining, current.body_length
            )));
        }

        self.prev_header = Some(header);
        self.current = Some(header);
        self.timestamp_delta = delta;
        self.extended = extended;
        self.buffer.clear();
        self.buffer.reserve(header.body_length as usize);
        self.bytes_remaining = header.body_length as usize;
        Ok(())
    }

    /// Append one chunk's payload to the message body
    pub fn append_payload(&mut self, data: &[u8]) -> Result<()> {
        let current = self
            .current
            .as_ref()
            .ok_or_else(|| Error::protocol("payload bytes outside any message"))?;

        if data.len() > self.bytes_remaining {
            return Err(Error::OverLength {
                chunk_stream_id: current.chunk_stream_id,
                buffered: self.buffer.len(),
                incoming: data.len(),
                declared: current.body_length as usize,
            });
        }

        self.buffer.extend_from_slice(data);
        self.bytes_remaining -= data.len();
        Ok(())
    }

    /// Hand out the completed message once the full body has arrived. Header
    /// and timestamp memory stays behind for later compressed headers.
    pub fn take_completed(&mut self) -> Option<RtmpMessage> {
        if self.bytes_remaining > 0 {
            return None;
        }
        let header = self.current.take()?;
        let body = std::mem::take(&mut self.buffer);
        Some(RtmpMessage::new(header, body))
    }

    /// Discard the in-progress message without touching header memory
    pub fn abort(&mut self) {
        self.current = None;
        self.buffer.clear();
        self.bytes_remaining = 0;
    }
}

/// Per-chunk-stream state for one direction of one connection, keyed by
/// chunk stream ID.
#[derive(Debug, Default)]
pub struct ChunkStreamTable {
    streams: HashMap<u32, ChunkStreamState>,
}

impl ChunkStreamTable {
    pub fn new() -> Self {
        ChunkStreamTable {
            streams: HashMap::new(),
        }
    }

    /// Get the state for a chunk stream, creating a fresh entry on first use
    pub fn get(&mut self, chunk_stream_id: u32) -> &mut ChunkStreamState {
        self.streams.entry(chunk_stream_id).or_default()
    }

    /// Look up a chunk stream without creating it
    pub fn lookup(&self, chunk_stream_id: u32) -> Option<&ChunkStreamState> {
        self.streams.get(&chunk_stream_id)
    }

    /// Discard the in-progress message on a chunk stream, if any
    pub fn abort(&mut self, chunk_stream_id: u32) {
        if let Some(state) = self.streams.get_mut(&chunk_stream_id) {
            state.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MSG_TYPE_AUDIO;

    fn header(body_length: u32) -> MessageHeader {
        MessageHeader::new(100, body_length, MSG_TYPE_AUDIO, 1, 4)
    }

    #[test]
    fn test_fresh_entry_is_zeroed() {
        let mut table = ChunkStreamTable::new();
        let state = table.get(4);
        assert!(state.prev_header().is_none());
        assert!(!state.is_assembling());
        assert_eq!(state.timestamp_delta(), 0);
        assert!(table.lookup(5).is_none());
    }

    #[test]
    fn test_assembly_lifecycle() {
        let mut state = ChunkStreamState::default();
        state.apply_header(header(5), 0, false).unwrap();
        assert!(state.is_assembling());
        assert_eq!(state.bytes_remaining(), 5);

        state.append_payload(&[1, 2, 3]).unwrap();
        assert!(state.take_completed().is_none());

        state.append_payload(&[4, 5]).unwrap();
        let message = state.take_completed().unwrap();
        assert_eq!(message.body, vec![1, 2, 3, 4, 5]);

        // Header memory survives completion
        assert!(!state.is_assembling());
        assert_eq!(state.prev_header().unwrap().body_length, 5);
        assert!(state.take_completed().is_none());
    }

    #[test]
    fn test_over_length_append_rejected() {
        let mut state = ChunkStreamState::default();
        state.apply_header(header(4), 0, false).unwrap();
        state.append_payload(&[1, 2, 3]).unwrap();

        match state.append_payload(&[4, 5]) {
            Err(Error::OverLength { buffered, incoming, declared, .. }) => {
                assert_eq!(buffered, 3);
                assert_eq!(incoming, 2);
                assert_eq!(declared, 4);
            }
            other => panic!("Expected OverLength, got {:?}", other),
        }
    }

    #[test]
    fn test_header_mid_message_rejected() {
        let mut state = ChunkStreamState::default();
        state.apply_header(header(10), 0, false).unwrap();
        state.append_payload(&[0; 6]).unwrap();

        assert!(matches!(
            state.apply_header(header(10), 0, false),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_abort_clears_buffer_only() {
        let mut table = ChunkStreamTable::new();
        table.get(4).apply_header(header(10), 7, false).unwrap();
        table.get(4).append_payload(&[0; 6]).unwrap();

        table.abort(4);
        let state = table.get(4);
        assert!(!state.is_assembling());
        assert_eq!(state.timestamp_delta(), 7);
        assert!(state.prev_header().is_some());

        // A fresh message may start immediately after the abort
        state.apply_header(header(3), 0, false).unwrap();

        // Aborting an unknown stream is a no-op
        table.abort(999);
    }

    #[test]
    fn test_zero_length_message_completes_at_once() {
        let mut state = ChunkStreamState::default();
        state.apply_header(header(0), 0, false).unwrap();
        let message = state.take_completed().unwrap();
        assert!(message.body.is_empty());
    }
}
