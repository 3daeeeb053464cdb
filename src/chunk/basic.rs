use crate::{Error, Result};
use crate::protocol::{MAX_CHUNK_STREAM_ID, MIN_CHUNK_STREAM_ID};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Chunk header format, carried in the top two bits of the basic header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    /// Full 11-byte message header with absolute timestamp
    Full,

    /// 7-byte header, message stream ID inherited
    SameStream,

    /// 3-byte header, timestamp delta only
    DeltaOnly,

    /// No message header, everything inherited
    Continuation,
}

impl ChunkType {
    /// Decode from the masked format bits. Two bits cover exactly the four
    /// formats, so this is total.
    pub fn from_bits(bits: u8) -> ChunkType {
        match bits & 0x03 {
            0 => ChunkType::Full,
            1 => ChunkType::SameStream,
            2 => ChunkType::DeltaOnly,
            _ => ChunkType::Continuation,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ChunkType::Full => 0,
            ChunkType::SameStream => 1,
            ChunkType::DeltaOnly => 2,
            ChunkType::Continuation => 3,
        }
    }
}

/// The 1-3 byte basic header: chunk type plus chunk stream ID.
///
/// IDs 2-63 fit the first byte; 64-319 use the 2-byte form (second byte is
/// ID - 64); 64-65599 fit the 3-byte form (ID - 64 as little-endian u16).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicHeader {
    pub chunk_type: ChunkType,
    pub chunk_stream_id: u32,
}

impl BasicHeader {
    pub fn new(chunk_type: ChunkType, chunk_stream_id: u32) -> Self {
        BasicHeader { chunk_type, chunk_stream_id }
    }

    /// Decode from a byte slice, returning the header and bytes consumed.
    pub fn parse(bytes: &[u8]) -> Result<(BasicHeader, usize)> {
        let first = *bytes
            .first()
            .ok_or_else(|| Error::truncated("empty basic header"))?;

        let chunk_type = ChunkType::from_bits(first >> 6);
        let (chunk_stream_id, consumed) = match first & 0x3F {
            0 => {
                let b = *bytes
                    .get(1)
                    .ok_or_else(|| Error::truncated("basic header ends inside 2-byte form"))?;
                (b as u32 + 64, 2)
            }
            1 => {
                if bytes.len() < 3 {
                    return Err(Error::truncated("basic header ends inside 3-byte form"));
                }
                let id = u16::from_le_bytes([bytes[1], bytes[2]]) as u32;
                (id + 64, 3)
            }
            n => (n as u32, 1),
        };

        Ok((BasicHeader { chunk_type, chunk_stream_id }, consumed))
    }

    /// Decode from the transport.
    pub async fn read<R: AsyncRead + Unpin>(reader: &mut R) -> Result<BasicHeader> {
        let mut first = [0u8; 1];
        reader
            .read_exact(&mut first)
            .await
            .map_err(|e| Error::from_read("basic header", e))?;

        let chunk_type = ChunkType::from_bits(first[0] >> 6);
        let chunk_stream_id = match first[0] & 0x3F {
            0 => {
                let mut id_byte = [0u8; 1];
                reader
                    .read_exact(&mut id_byte)
                    .await
                    .map_err(|e| Error::from_read("basic header chunk stream id", e))?;
                id_byte[0] as u32 + 64
            }
            1 => {
                let mut id_bytes = [0u8; 2];
                reader
                    .read_exact(&mut id_bytes)
                    .await
                    .map_err(|e| Error::from_read("basic header chunk stream id", e))?;
                u16::from_le_bytes(id_bytes) as u32 + 64
            }
            n => n as u32,
        };

        Ok(BasicHeader { chunk_type, chunk_stream_id })
    }

    /// Encode to wire bytes, picking the shortest form that fits the ID.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let cs_id = self.chunk_stream_id;
        if !(MIN_CHUNK_STREAM_ID..=MAX_CHUNK_STREAM_ID).contains(&cs_id) {
            return Err(Error::encode(format!(
                "chunk stream id {} outside {}..={}",
                cs_id, MIN_CHUNK_STREAM_ID, MAX_CHUNK_STREAM_ID
            )));
        }

        let fmt = self.chunk_type.as_u8();
        let mut result = Vec::with_capacity(3);
        if cs_id <= 63 {
            result.push((fmt << 6) | (cs_id as u8));
        } else if cs_id <= 319 {
            result.push(fmt << 6);
            result.push((cs_id - 64) as u8);
        } else {
            result.push((fmt << 6) | 1);
            let id = cs_id - 64;
            result.push((id & 0xFF) as u8);
            result.push((id >> 8) as u8);
        }

        Ok(result)
    }
}
