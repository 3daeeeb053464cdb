use crate::{ByteBuffer, Error, Result};
use crate::protocol::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, RtmpMessage};
use crate::message::{ControlType, MessageType};
use crate::chunk::basic::{BasicHeader, ChunkType};
use crate::chunk::header::WireHeader;
use crate::chunk::table::ChunkStreamTable;
use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Demultiplexes one direction of a connection: consumes chunks from the
/// transport and reassembles them into complete messages.
///
/// One reader per connection, driven strictly sequentially. Set Chunk Size
/// and Abort are applied internally as messages complete; everything else is
/// handed to the caller untouched.
pub struct ChunkReader {
    /// Per-chunk-stream assembly state
    table: ChunkStreamTable,

    /// Current chunk size for reading
    chunk_size_in: usize,
}

impl ChunkReader {
    /// Create new chunk reader
    pub fn new() -> Self {
        ChunkReader {
            table: ChunkStreamTable::new(),
            chunk_size_in: DEFAULT_CHUNK_SIZE as usize,
        }
    }

    /// Current incoming chunk size
    pub fn chunk_size(&self) -> usize {
        self.chunk_size_in
    }

    /// Set incoming chunk size
    pub fn set_chunk_size(&mut self, size: usize) {
        self.chunk_size_in = size;
    }

    /// Read chunks until a message completes
    pub async fn read_message<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut R,
    ) -> Result<RtmpMessage> {
        loop {
            if let Some(message) = self.read_chunk(reader).await? {
                return Ok(message);
            }
        }
    }

    /// Read one chunk from the transport. Returns the completed message once
    /// the chunk delivers the last of its body, `None` while more chunks are
    /// still owed.
    pub async fn read_chunk<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut R,
    ) -> Result<Option<RtmpMessage>> {
        let basic = BasicHeader::read(reader).await?;
        let cs_id = basic.chunk_stream_id;

        let (prev_header, prev_delta, prev_extended, assembling) = {
            let state = self.table.get(cs_id);
            (
                state.prev_header().copied(),
                state.timestamp_delta(),
                state.uses_extended(),
                state.is_assembling(),
            )
        };

        if assembling {
            // An unfinished message owns this chunk stream; only a bare
            // continuation may follow until the body is complete.
            if basic.chunk_type != ChunkType::Continuation {
                return Err(Error::protocol(format!(
                    "chunk stream {}: type {} header while a message is still in progress",
                    cs_id,
                    basic.chunk_type.as_u8()
                )));
            }
            // Consume the echoed extended timestamp; the message's own
            // timestamp was fixed when it started.
            WireHeader::read(reader, ChunkType::Continuation, prev_extended).await?;
        } else {
            let wire = WireHeader::read(reader, basic.chunk_type, prev_extended).await?;
            let (header, delta) = wire.resolve(cs_id, prev_header.as_ref(), prev_delta)?;
            let extended = match wire {
                WireHeader::Continuation { .. } => prev_extended,
                _ => wire.uses_extended(),
            };
            trace!(
                "chunk stream {}: type {} header, message type {} length {} timestamp {}",
                cs_id,
                basic.chunk_type.as_u8(),
                header.type_id,
                header.body_length,
                header.timestamp
            );
            self.table.get(cs_id).apply_header(header, delta, extended)?;
        }

        let remaining = self.table.get(cs_id).bytes_remaining();
        let payload_size = remaining.min(self.chunk_size_in);
        let mut payload = vec![0u8; payload_size];
        reader
            .read_exact(&mut payload)
            .await
            .map_err(|e| Error::from_read("chunk payload", e))?;

        let state = self.table.get(cs_id);
        state.append_payload(&payload)?;
        trace!(
            "chunk stream {}: buffered {} bytes, {} remaining",
            cs_id,
            payload_size,
            state.bytes_remaining()
        );

        match state.take_completed() {
            Some(message) => {
                debug!(
                    "chunk stream {}: message complete, type {} length {}",
                    cs_id,
                    message.type_id(),
                    message.body.len()
                );
                self.apply_control(&message)?;
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }

    /// Apply the protocol control messages this layer owns. The message that
    /// carried them is still emitted to the caller afterwards.
    fn apply_control(&mut self, message: &RtmpMessage) -> Result<()> {
        match MessageType::from_id(message.type_id()) {
            MessageType::Control(ControlType::SetChunkSize) => {
                let size = read_control_u32(message)?;
                if size == 0 || size > MAX_CHUNK_SIZE {
                    return Err(Error::protocol(format!("unusable chunk size {}", size)));
                }
                debug!("incoming chunk size {} -> {}", self.chunk_size_in, size);
                self.chunk_size_in = size as usize;
            }
            MessageType::Control(ControlType::Abort) => {
                let target = read_control_u32(message)?;
                debug!("abort received for chunk stream {}", target);
                self.table.abort(target);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Both Set Chunk Size and Abort carry a single big-endian u32 body
fn read_control_u32(message: &RtmpMessage) -> Result<u32> {
    let mut body = ByteBuffer::new(message.body.clone());
    body.read_u32_be().map_err(|_| {
        Error::protocol(format!(
            "control message type {} with a {}-byte body",
            message.type_id(),
            message.body.len()
        ))
    })
}
