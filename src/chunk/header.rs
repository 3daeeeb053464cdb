use crate::{ByteBuffer, Error, Result};
use crate::protocol::{EXTENDED_TIMESTAMP, MAX_BODY_LENGTH, MessageHeader};
use crate::chunk::basic::ChunkType;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Message header as it appears on the wire: each chunk type carries only
/// its own fields, before resolution against the chunk stream's prior state.
///
/// Timestamp and delta values are already widened here; whether the 24-bit
/// field held the value directly or the `0xFFFFFF` sentinel plus a 4-byte
/// extension is recovered from the value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireHeader {
    /// Type 0: absolute timestamp, length, type, message stream ID
    Full {
        timestamp: u32,
        body_length: u32,
        type_id: u8,
        message_stream_id: u32,
    },

    /// Type 1: delta, length, type; stream ID inherited
    SameStream {
        delta: u32,
        body_length: u32,
        type_id: u8,
    },

    /// Type 2: delta only
    DeltaOnly { delta: u32 },

    /// Type 3: nothing, apart from the echoed extended timestamp when the
    /// previous header on this chunk stream carried one
    Continuation { extended: Option<u32> },
}

impl WireHeader {
    /// Decode the message header for one chunk. `prev_extended` tells a
    /// type 3 chunk whether to expect the echoed 4-byte extended field;
    /// types 0-2 signal it themselves via the sentinel.
    pub async fn read<R: AsyncRead + Unpin>(
        reader: &mut R,
        chunk_type: ChunkType,
        prev_extended: bool,
    ) -> Result<WireHeader> {
        match chunk_type {
            ChunkType::Full => {
                let mut raw = [0u8; 11];
                reader
                    .read_exact(&mut raw)
                    .await
                    .map_err(|e| Error::from_read("type 0 message header", e))?;

                let mut bytes = ByteBuffer::new(raw.to_vec());
                let timestamp = bytes.read_u24_be()?;
                let body_length = bytes.read_u24_be()?;
                let type_id = bytes.read_u8()?;
                let message_stream_id = bytes.read_u32_le()?;

                let timestamp = if timestamp == EXTENDED_TIMESTAMP {
                    read_extended(reader).await?
                } else {
                    timestamp
                };

                Ok(WireHeader::Full { timestamp, body_length, type_id, message_stream_id })
            }
            ChunkType::SameStream => {
                let mut raw = [0u8; 7];
                reader
                    .read_exact(&mut raw)
                    .await
                    .map_err(|e| Error::from_read("type 1 message header", e))?;

                let mut bytes = ByteBuffer::new(raw.to_vec());
                let delta = bytes.read_u24_be()?;
                let body_length = bytes.read_u24_be()?;
                let type_id = bytes.read_u8()?;

                let delta = if delta == EXTENDED_TIMESTAMP {
                    read_extended(reader).await?
                } else {
                    delta
                };

                Ok(WireHeader::SameStream { delta, body_length, type_id })
            }
            ChunkType::DeltaOnly => {
                let mut raw = [0u8; 3];
                reader
                    .read_exact(&mut raw)
                    .await
                    .map_err(|e| Error::from_read("type 2 message header", e))?;

                let delta = u32::from_be_bytes([0, raw[0], raw[1], raw[2]]);
                let delta = if delta == EXTENDED_TIMESTAMP {
                    read_extended(reader).await?
                } else {
                    delta
                };

                Ok(WireHeader::DeltaOnly { delta })
            }
            ChunkType::Continuation => {
                // Presence of the extended field is not re-signaled; it is
                // carried over from the previous header on this chunk stream.
                let extended = if prev_extended {
                    Some(read_extended(reader).await?)
                } else {
                    None
                };
                Ok(WireHeader::Continuation { extended })
            }
        }
    }

    /// Encode to wire bytes, appending the 4-byte extended timestamp where
    /// the 24-bit field cannot hold the value.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = ByteBuffer::with_capacity(15);
        match *self {
            WireHeader::Full { timestamp, body_length, type_id, message_stream_id } => {
                if body_length > MAX_BODY_LENGTH {
                    return Err(Error::encode(format!(
                        "body length {} exceeds the 24-bit field", body_length
                    )));
                }
                write_timestamp_field(&mut buf, timestamp)?;
                buf.write_u24_be(body_length)?;
                buf.write_u8(type_id)?;
                buf.write_u32_le(message_stream_id)?;
                write_extended_field(&mut buf, timestamp)?;
            }
            WireHeader::SameStream { delta, body_length, type_id } => {
                if body_length > MAX_BODY_LENGTH {
                    return Err(Error::encode(format!(
                        "body length {} exceeds the 24-bit field", body_length
                    )));
                }
                write_timestamp_field(&mut buf, delta)?;
                buf.write_u24_be(body_length)?;
                buf.write_u8(type_id)?;
                write_extended_field(&mut buf, delta)?;
            }
            WireHeader::DeltaOnly { delta } => {
                write_timestamp_field(&mut buf, delta)?;
                write_extended_field(&mut buf, delta)?;
            }
            WireHeader::Continuation { extended } => {
                if let Some(value) = extended {
                    buf.write_u32_be(value)?;
                }
            }
        }
        Ok(buf.to_vec())
    }

    /// The chunk type whose wire layout this variant has
    pub fn chunk_type(&self) -> ChunkType {
        match self {
            WireHeader::Full { .. } => ChunkType::Full,
            WireHeader::SameStream { .. } => ChunkType::SameStream,
            WireHeader::DeltaOnly { .. } => ChunkType::DeltaOnly,
            WireHeader::Continuation { .. } => ChunkType::Continuation,
        }
    }

    /// Whether this header occupies the extended timestamp field
    pub fn uses_extended(&self) -> bool {
        self.extended_value().is_some()
    }

    /// The value the 4-byte extended field carries, when present
    pub fn extended_value(&self) -> Option<u32> {
        match *self {
            WireHeader::Full { timestamp, .. } => {
                (timestamp >= EXTENDED_TIMESTAMP).then_some(timestamp)
            }
            WireHeader::SameStream { delta, .. } | WireHeader::DeltaOnly { delta } => {
                (delta >= EXTENDED_TIMESTAMP).then_some(delta)
            }
            WireHeader::Continuation { extended } => extended,
        }
    }

    /// Resolve this wire header into a complete message header for a new
    /// message, inheriting the missing fields from the chunk stream's prior
    /// state. Returns the resolved header and the timestamp delta to carry
    /// forward.
    ///
    /// A type 3 header here means "repeat": a new message reusing the prior
    /// header in full, its timestamp advanced by the previous delta (or by
    /// the echoed extended value). Pure mid-message continuations never
    /// reach this point.
    pub fn resolve(
        &self,
        chunk_stream_id: u32,
        prev: Option<&MessageHeader>,
        prev_delta: u32,
    ) -> Result<(MessageHeader, u32)> {
        match *self {
            WireHeader::Full { timestamp, body_length, type_id, message_stream_id } => {
                let header = MessageHeader::new(
                    timestamp,
                    body_length,
                    type_id,
                    message_stream_id,
                    chunk_stream_id,
                );
                Ok((header, 0))
            }
            WireHeader::SameStream { delta, body_length, type_id } => {
                let prev = prev.ok_or(Error::NoPriorState(chunk_stream_id))?;
                let header = MessageHeader::new(
                    prev.timestamp.wrapping_add(delta),
                    body_length,
                    type_id,
                    prev.message_stream_id,
                    chunk_stream_id,
                );
                Ok((header, delta))
            }
            WireHeader::DeltaOnly { delta } => {
                let prev = prev.ok_or(Error::NoPriorState(chunk_stream_id))?;
                let header = MessageHeader::new(
                    prev.timestamp.wrapping_add(delta),
                    prev.body_length,
                    prev.type_id,
                    prev.message_stream_id,
                    chunk_stream_id,
                );
                Ok((header, delta))
            }
            WireHeader::Continuation { extended } => {
                let prev = prev.ok_or(Error::NoPriorState(chunk_stream_id))?;
                let delta = extended.unwrap_or(prev_delta);
                let header = MessageHeader::new(
                    prev.timestamp.wrapping_add(delta),
                    prev.body_length,
                    prev.type_id,
                    prev.message_stream_id,
                    chunk_stream_id,
                );
                Ok((header, delta))
            }
        }
    }
}

/// Write the 24-bit timestamp field, or the sentinel when the value needs
/// the extended form.
fn write_timestamp_field(buf: &mut ByteBuffer, value: u32) -> Result<()> {
    if value >= EXTENDED_TIMESTAMP {
        buf.write_u24_be(EXTENDED_TIMESTAMP)?;
    } else {
        buf.write_u24_be(value)?;
    }
    Ok(())
}

fn write_extended_field(buf: &mut ByteBuffer, value: u32) -> Result<()> {
    if value >= EXTENDED_TIMESTAMP {
        buf.write_u32_be(value)?;
    }
    Ok(())
}

async fn read_extended<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u32> {
    let mut raw = [0u8; 4];
    reader
        .read_exact(&mut raw)
        .await
        .map_err(|e| Error::from_read("extended timestamp", e))?;
    Ok(u32::from_be_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MSG_TYPE_VIDEO;

    async fn round_trip(header: WireHeader, prev_extended: bool) -> WireHeader {
        let bytes = header.encode().unwrap();
        let mut src = &bytes[..];
        let decoded = WireHeader::read(&mut src, header.chunk_type(), prev_extended)
            .await
            .unwrap();
        assert!(src.is_empty(), "decoder left {} bytes behind", src.len());
        decoded
    }

    #[tokio::test]
    async fn test_full_header_round_trip() {
        let header = WireHeader::Full {
            timestamp: 0x123456,
            body_length: 300,
            type_id: MSG_TYPE_VIDEO,
            message_stream_id: 1,
        };
        assert_eq!(header.encode().unwrap().len(), 11);
        assert_eq!(round_trip(header, false).await, header);
    }

    #[tokio::test]
    async fn test_extended_timestamp_sentinel() {
        let header = WireHeader::Full {
            timestamp: 0x0100_0000,
            body_length: 10,
            type_id: MSG_TYPE_VIDEO,
            message_stream_id: 1,
        };
        let bytes = header.encode().unwrap();
        assert_eq!(bytes.len(), 15);
        assert_eq!(&bytes[0..3], &[0xFF, 0xFF, 0xFF]);
        assert_eq!(&bytes[11..15], &0x0100_0000u32.to_be_bytes());
        assert_eq!(round_trip(header, false).await, header);

        // A delta exactly at the sentinel still takes the extended form
        let edge = WireHeader::DeltaOnly { delta: EXTENDED_TIMESTAMP };
        assert_eq!(edge.encode().unwrap().len(), 7);
        assert_eq!(round_trip(edge, false).await, edge);

        // One below never does
        let below = WireHeader::DeltaOnly { delta: EXTENDED_TIMESTAMP - 1 };
        assert_eq!(below.encode().unwrap().len(), 3);
        assert!(!below.uses_extended());
    }

    #[tokio::test]
    async fn test_continuation_echoes_extended() {
        let header = WireHeader::Continuation { extended: Some(0x0100_0000) };
        assert_eq!(header.encode().unwrap().len(), 4);
        assert_eq!(round_trip(header, true).await, header);

        let bare = WireHeader::Continuation { extended: None };
        assert!(bare.encode().unwrap().is_empty());
        assert_eq!(round_trip(bare, false).await, bare);
    }

    #[test]
    fn test_resolution_inherits_prior_fields() {
        let prev = MessageHeader::new(1000, 300, MSG_TYPE_VIDEO, 1, 6);

        let (resolved, delta) = WireHeader::SameStream { delta: 40, body_length: 200, type_id: MSG_TYPE_VIDEO }
            .resolve(6, Some(&prev), 0)
            .unwrap();
        assert_eq!(resolved.timestamp, 1040);
        assert_eq!(resolved.body_length, 200);
        assert_eq!(resolved.message_stream_id, 1);
        assert_eq!(delta, 40);

        let (resolved, delta) = WireHeader::DeltaOnly { delta: 25 }
            .resolve(6, Some(&prev), 0)
            .unwrap();
        assert_eq!(resolved.timestamp, 1025);
        assert_eq!(resolved.body_length, 300);
        assert_eq!(delta, 25);

        // Repeat semantics: advance by the previous delta
        let (resolved, delta) = WireHeader::Continuation { extended: None }
            .resolve(6, Some(&prev), 25)
            .unwrap();
        assert_eq!(resolved.timestamp, 1025);
        assert_eq!(delta, 25);

        // An echoed extended value overrides the stored delta
        let (resolved, _) = WireHeader::Continuation { extended: Some(50) }
            .resolve(6, Some(&prev), 25)
            .unwrap();
        assert_eq!(resolved.timestamp, 1050);
    }

    #[test]
    fn test_resolution_without_prior_state() {
        for header in [
            WireHeader::SameStream { delta: 1, body_length: 2, type_id: MSG_TYPE_VIDEO },
            WireHeader::DeltaOnly { delta: 1 },
            WireHeader::Continuation { extended: None },
        ] {
            assert!(matches!(
                header.resolve(9, None, 0),
                Err(Error::NoPriorState(9))
            ));
        }
    }

    #[test]
    fn test_oversized_body_length_rejected() {
        let header = WireHeader::Full {
            timestamp: 0,
            body_length: MAX_BODY_LENGTH + 1,
            type_id: MSG_TYPE_VIDEO,
            message_stream_id: 1,
        };
        assert!(matches!(header.encode(), Err(Error::Encode(_))));
    }
}
