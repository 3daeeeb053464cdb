use crate::protocol::constants::*;

/// A complete logical message, reassembled from one or more chunks on its
/// chunk stream. The body is opaque at this layer; command and data payloads
/// are decoded upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtmpMessage {
    pub header: MessageHeader,
    pub body: Vec<u8>,
}

impl RtmpMessage {
    /// Create new message
    pub fn new(header: MessageHeader, body: Vec<u8>) -> Self {
        RtmpMessage { header, body }
    }

    /// Get message type ID
    pub fn type_id(&self) -> u8 {
        self.header.type_id
    }

    /// Get message stream ID
    pub fn message_stream_id(&self) -> u32 {
        self.header.message_stream_id
    }

    /// Get timestamp
    pub fn timestamp(&self) -> u32 {
        self.header.timestamp
    }

    /// Check if this is an audio message
    pub fn is_audio(&self) -> bool {
        self.header.type_id == MSG_TYPE_AUDIO
    }

    /// Check if this is a video message
    pub fn is_video(&self) -> bool {
        self.header.type_id == MSG_TYPE_VIDEO
    }

    /// Check if this is a command message
    pub fn is_command(&self) -> bool {
        self.header.type_id == MSG_TYPE_COMMAND_AMF0 ||
            self.header.type_id == MSG_TYPE_COMMAND_AMF3
    }

    /// Check if this is a data message
    pub fn is_data(&self) -> bool {
        self.header.type_id == MSG_TYPE_DATA_AMF0 ||
            self.header.type_id == MSG_TYPE_DATA_AMF3
    }

    /// Check if this is a protocol control message
    pub fn is_control(&self) -> bool {
        matches!(self.header.type_id,
            MSG_TYPE_SET_CHUNK_SIZE |
            MSG_TYPE_ABORT |
            MSG_TYPE_ACK |
            MSG_TYPE_WINDOW_ACK |
            MSG_TYPE_SET_PEER_BW)
    }
}

/// Resolved message header: every field present, independent of which chunk
/// type carried it on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub timestamp: u32,
    pub body_length: u32,
    pub type_id: u8,
    pub message_stream_id: u32,
    pub chunk_stream_id: u32,
}

impl MessageHeader {
    /// Create new header
    pub fn new(
        timestamp: u32,
        body_length: u32,
        type_id: u8,
        message_stream_id: u32,
        chunk_stream_id: u32,
    ) -> Self {
        MessageHeader {
            timestamp,
            body_length,
            type_id,
            message_stream_id,
            chunk_stream_id,
        }
    }

    /// Create header for an audio message
    pub fn audio(timestamp: u32, length: u32, stream_id: u32) -> Self {
        MessageHeader::new(timestamp, length, MSG_TYPE_AUDIO, stream_id, CHUNK_STREAM_AUDIO)
    }

    /// Create header for a video message
    pub fn video(timestamp: u32, length: u32, stream_id: u32) -> Self {
        MessageHeader::new(timestamp, length, MSG_TYPE_VIDEO, stream_id, CHUNK_STREAM_VIDEO)
    }

    /// Create header for a command message
    pub fn command(timestamp: u32, length: u32, stream_id: u32) -> Self {
        MessageHeader::new(timestamp, length, MSG_TYPE_COMMAND_AMF0, stream_id, CHUNK_STREAM_COMMAND)
    }

    /// Create header for a data message
    pub fn data(timestamp: u32, length: u32, stream_id: u32) -> Self {
        MessageHeader::new(timestamp, length, MSG_TYPE_DATA_AMF0, stream_id, CHUNK_STREAM_DATA)
    }

    /// Check if the timestamp needs the 4-byte extended field
    pub fn has_extended_timestamp(&self) -> bool {
        self.timestamp >= EXTENDED_TIMESTAMP
    }

    /// Timestamp field value as it appears in a full header on the wire
    pub fn wire_timestamp(&self) -> u32 {
        if self.has_extended_timestamp() {
            EXTENDED_TIMESTAMP
        } else {
            self.timestamp
        }
    }
}

pub fn make_audio_message(data: Vec<u8>, timestamp: u32, stream_id: u32) -> RtmpMessage {
    let header = MessageHeader::audio(timestamp, data.len() as u32, stream_id);
    RtmpMessage::new(header, data)
}

pub fn make_video_message(data: Vec<u8>, timestamp: u32, stream_id: u32) -> RtmpMessage {
    let header = MessageHeader::video(timestamp, data.len() as u32, stream_id);
    RtmpMessage::new(header, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let header = MessageHeader {
            timestamp: 1000,
            body_length: 3,
            type_id: MSG_TYPE_AUDIO,
            message_stream_id: 1,
            chunk_stream_id: 4,
        };

        let body = vec![0x01, 0x02, 0x03];
        let message = RtmpMessage::new(header, body);

        assert!(message.is_audio());
        assert!(!message.is_video());
        assert_eq!(message.timestamp(), 1000);
        assert_eq!(message.message_stream_id(), 1);
    }

    #[test]
    fn test_extended_timestamp_threshold() {
        let below = MessageHeader::video(0xFF_FFFE, 10, 1);
        assert!(!below.has_extended_timestamp());
        assert_eq!(below.wire_timestamp(), 0xFF_FFFE);

        let at = MessageHeader::video(0xFF_FFFF, 10, 1);
        assert!(at.has_extended_timestamp());
        assert_eq!(at.wire_timestamp(), EXTENDED_TIMESTAMP);

        let above = MessageHeader::video(0x0100_0000, 10, 1);
        assert!(above.has_extended_timestamp());
        assert_eq!(above.wire_timestamp(), EXTENDED_TIMESTAMP);
    }

    #[test]
    fn test_media_helpers_pick_conventional_lanes() {
        let audio = make_audio_message(vec![0u8; 8], 40, 1);
        assert!(audio.is_audio());
        assert_eq!(audio.header.chunk_stream_id, CHUNK_STREAM_AUDIO);
        assert_eq!(audio.header.body_length, 8);

        let video = make_video_message(vec![0u8; 16], 40, 1);
        assert!(video.is_video());
        assert_eq!(video.header.chunk_stream_id, CHUNK_STREAM_VIDEO);
    }
}
