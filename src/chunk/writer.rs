use crate::{Error, Result};
use crate::protocol::{DEFAULT_CHUNK_SIZE, MAX_BODY_LENGTH, MessageHeader, RtmpMessage};
use crate::chunk::basic::{BasicHeader, ChunkType};
use crate::chunk::header::WireHeader;
use log::trace;
use std::collections::HashMap;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Last header sent on a chunk stream, kept for header compression.
#[derive(Debug, Clone, Copy)]
struct LastSent {
    header: MessageHeader,
    delta: u32,
    extended: bool,
}

/// Multiplexes messages onto the wire as header-compressed chunk sequences.
///
/// Output is deterministic: the same message against the same prior state
/// and chunk size always yields the same bytes.
pub struct ChunkWriter {
    /// Previous headers for each chunk stream
    last_sent: HashMap<u32, LastSent>,

    /// Current chunk size for writing
    chunk_size_out: usize,
}

impl ChunkWriter {
    /// Create new chunk writer
    pub fn new() -> Self {
        ChunkWriter {
            last_sent: HashMap::new(),
            chunk_size_out: DEFAULT_CHUNK_SIZE as usize,
        }
    }

    /// Current outgoing chunk size
    pub fn chunk_size(&self) -> usize {
        self.chunk_size_out
    }

    /// Set outgoing chunk size
    pub fn set_chunk_size(&mut self, size: usize) {
        self.chunk_size_out = size;
    }

    /// Write a message to the transport as chunks
    pub async fn write_message<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut W,
        message: &RtmpMessage,
    ) -> Result<()> {
        let chunks = self.create_chunks(message)?;
        writer.write_all(&chunks).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Split a message into a header-compressed chunk sequence.
    ///
    /// All validation happens before the first byte is produced; on error
    /// nothing has been emitted and the compression state is untouched.
    pub fn create_chunks(&mut self, message: &RtmpMessage) -> Result<Vec<u8>> {
        let header = &message.header;
        let cs_id = header.chunk_stream_id;

        if message.body.len() > MAX_BODY_LENGTH as usize {
            return Err(Error::encode(format!(
                "message body of {} bytes exceeds the 24-bit length field",
                message.body.len()
            )));
        }
        if header.body_length as usize != message.body.len() {
            return Err(Error::encode(format!(
                "declared body length {} does not match body of {} bytes",
                header.body_length,
                message.body.len()
            )));
        }

        let (wire, delta, extended) = self.select_header(header);
        let basic = BasicHeader::new(wire.chunk_type(), cs_id);

        let mut out = Vec::with_capacity(message.body.len() + 20);
        out.extend_from_slice(&basic.encode()?);
        out.extend_from_slice(&wire.encode()?);

        let first_chunk_size = message.body.len().min(self.chunk_size_out);
        out.extend_from_slice(&message.body[..first_chunk_size]);

        // Continuation chunks repeat the basic header and echo the extended
        // timestamp when the message header carried one
        let continuation_bytes = if first_chunk_size < message.body.len() {
            let basic = BasicHeader::new(ChunkType::Continuation, cs_id).encode()?;
            let echo = WireHeader::Continuation { extended: wire.extended_value() }.encode()?;
            [basic, echo].concat()
        } else {
            Vec::new()
        };

        let mut offset = first_chunk_size;
        while offset < message.body.len() {
            out.extend_from_slice(&continuation_bytes);
            let chunk_end = (offset + self.chunk_size_out).min(message.body.len());
            out.extend_from_slice(&message.body[offset..chunk_end]);
            offset = chunk_end;
        }

        trace!(
            "chunk stream {}: sent type {} header, {} body bytes in {} chunks",
            cs_id,
            wire.chunk_type().as_u8(),
            message.body.len(),
            message.body.len().div_ceil(self.chunk_size_out).max(1)
        );

        self.last_sent.insert(cs_id, LastSent { header: *header, delta, extended });
        Ok(out)
    }

    /// Pick the most compact header the prior state on this chunk stream
    /// allows. Returns the wire header, the delta it implies, and whether
    /// the extended timestamp field is in play afterwards.
    fn select_header(&self, header: &MessageHeader) -> (WireHeader, u32, bool) {
        let full = || WireHeader::Full {
            timestamp: header.timestamp,
            body_length: header.body_length,
            type_id: header.type_id,
            message_stream_id: header.message_stream_id,
        };

        let prev = match self.last_sent.get(&header.chunk_stream_id) {
            Some(prev) => prev,
            None => {
                let wire = full();
                return (wire, 0, wire.uses_extended());
            }
        };

        // A different message stream, or a timestamp that moved backwards,
        // re-anchors the chunk stream with an absolute header
        if header.message_stream_id != prev.header.message_stream_id
            || header.timestamp < prev.header.timestamp
        {
            let wire = full();
            return (wire, 0, wire.uses_extended());
        }

        let delta = header.timestamp - prev.header.timestamp;

        if header.type_id == prev.header.type_id && header.body_length == prev.header.body_length {
            if delta == prev.delta {
                // The receiver reads the echoed field whenever the previous
                // header used one, so it must be present even for small deltas
                let extended = prev.extended.then_some(delta);
                return (WireHeader::Continuation { extended }, delta, prev.extended);
            }
            let wire = WireHeader::DeltaOnly { delta };
            return (wire, delta, wire.uses_extended());
        }

        let wire = WireHeader::SameStream {
            delta,
            body_length: header.body_length,
            type_id: header.type_id,
        };
        (wire, delta, wire.uses_extended())
    }
}
