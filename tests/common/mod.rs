// Shared helpers for the chunk engine integration tests

use rand::{Rng, rng};
use rtmp_chunk::{ChunkReader, Result, RtmpMessage};

/// Initialize test logging once; later calls are no-ops
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Drive a reader over a complete byte sequence, collecting every message
/// it emits
pub async fn read_all(reader: &mut ChunkReader, bytes: &[u8]) -> Result<Vec<RtmpMessage>> {
    let mut src = bytes;
    let mut messages = Vec::new();
    while !src.is_empty() {
        if let Some(message) = reader.read_chunk(&mut src).await? {
            messages.push(message);
        }
    }
    Ok(messages)
}

/// A payload with enough structure to catch reordered or dropped chunks
pub fn pattern_body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// A payload with no structure at all
pub fn random_body(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rng().fill_bytes(&mut bytes);
    bytes
}
