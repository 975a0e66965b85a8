//! Media units flowing from a publisher to its viewers
//!
//! A [`Packet`] is an opaque, immutable media unit. The [`StreamHeader`] is the
//! codec/stream description a viewer needs before the first packet: metadata
//! plus the decoder configuration records.

use bytes::Bytes;

use super::flv::{FlvTag, FlvTagType};

/// Type of media packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Video frame
    Video,
    /// Audio frame
    Audio,
    /// Script data (onMetaData, cue points)
    Metadata,
}

/// A media unit
///
/// Cheap to clone: the payload is reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Type of packet
    pub kind: PacketKind,
    /// Timestamp in milliseconds
    pub timestamp: u32,
    /// Payload, including the codec byte(s)
    pub data: Bytes,
    /// Whether a new reader can start decoding here
    pub is_sync: bool,
}

impl Packet {
    /// Create a video packet
    pub fn video(timestamp: u32, data: Bytes, is_keyframe: bool) -> Self {
        Self {
            kind: PacketKind::Video,
            timestamp,
            data,
            is_sync: is_keyframe,
        }
    }

    /// Create an audio packet
    pub fn audio(timestamp: u32, data: Bytes, is_sync: bool) -> Self {
        Self {
            kind: PacketKind::Audio,
            timestamp,
            data,
            is_sync,
        }
    }

    /// Create a metadata packet
    pub fn metadata(timestamp: u32, data: Bytes) -> Self {
        Self {
            kind: PacketKind::Metadata,
            timestamp,
            data,
            is_sync: false,
        }
    }

    /// Convert from an FLV tag
    ///
    /// `audio_only` makes every audio packet a sync point, since there is no
    /// video keyframe to anchor on.
    pub fn from_flv_tag(tag: &FlvTag, audio_only: bool) -> Self {
        match tag.tag_type {
            FlvTagType::Video => Self::video(tag.timestamp, tag.data.clone(), tag.is_keyframe()),
            FlvTagType::Audio => Self::audio(tag.timestamp, tag.data.clone(), audio_only),
            FlvTagType::Script => Self::metadata(tag.timestamp, tag.data.clone()),
        }
    }

    /// Convert into an FLV tag
    pub fn to_flv_tag(&self) -> FlvTag {
        let tag_type = match self.kind {
            PacketKind::Video => FlvTagType::Video,
            PacketKind::Audio => FlvTagType::Audio,
            PacketKind::Metadata => FlvTagType::Script,
        };
        FlvTag {
            tag_type,
            timestamp: self.timestamp,
            data: self.data.clone(),
        }
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Negotiated stream format, written once per channel before any packet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamHeader {
    /// Stream carries audio
    pub has_audio: bool,
    /// Stream carries video
    pub has_video: bool,
    /// onMetaData script payload
    pub metadata: Option<Bytes>,
    /// Video decoder configuration (e.g. AVC sequence header)
    pub video_config: Option<Packet>,
    /// Audio decoder configuration (e.g. AAC sequence header)
    pub audio_config: Option<Packet>,
}

impl StreamHeader {
    /// Create an empty header for the given tracks
    pub fn new(has_audio: bool, has_video: bool) -> Self {
        Self {
            has_audio,
            has_video,
            ..Default::default()
        }
    }

    /// Whether every declared track has its decoder configuration
    pub fn is_complete(&self) -> bool {
        (!self.has_video || self.video_config.is_some())
            && (!self.has_audio || self.audio_config.is_some())
    }

    /// Whether audio packets act as sync points for this stream
    pub fn audio_only(&self) -> bool {
        self.has_audio && !self.has_video
    }

    /// Packets a viewer must receive before live data, in delivery order:
    /// metadata first, then video and audio configuration.
    pub fn packets(&self) -> Vec<Packet> {
        let mut packets = Vec::with_capacity(3);

        if let Some(ref meta) = self.metadata {
            packets.push(Packet::metadata(0, meta.clone()));
        }
        if let Some(ref video) = self.video_config {
            packets.push(video.clone());
        }
        if let Some(ref audio) = self.audio_config {
            packets.push(audio.clone());
        }

        packets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flv_tag_sync_points() {
        let key = FlvTag::video(0, Bytes::from_static(&[0x17, 0x01]));
        let inter = FlvTag::video(33, Bytes::from_static(&[0x27, 0x01]));
        let audio = FlvTag::audio(40, Bytes::from_static(&[0xAF, 0x01]));

        assert!(Packet::from_flv_tag(&key, false).is_sync);
        assert!(!Packet::from_flv_tag(&inter, false).is_sync);
        assert!(!Packet::from_flv_tag(&audio, false).is_sync);
        assert!(Packet::from_flv_tag(&audio, true).is_sync);
    }

    #[test]
    fn test_script_tag_never_sync() {
        let tag = FlvTag::script(0, Bytes::from_static(b"meta"));
        let packet = Packet::from_flv_tag(&tag, true);
        assert_eq!(packet.kind, PacketKind::Metadata);
        assert!(!packet.is_sync);
    }

    #[test]
    fn test_to_flv_tag_keeps_payload() {
        let packet = Packet::audio(1200, Bytes::from_static(&[0xAF, 0x01, 0x21]), false);
        let tag = packet.to_flv_tag();
        assert_eq!(tag.tag_type, FlvTagType::Audio);
        assert_eq!(tag.timestamp, 1200);
        assert_eq!(tag.data, packet.data);
    }

    #[test]
    fn test_header_completeness() {
        let mut header = StreamHeader::new(true, true);
        assert!(!header.is_complete());

        header.video_config = Some(Packet::video(0, Bytes::from_static(&[0x17, 0x00]), true));
        assert!(!header.is_complete());

        header.audio_config = Some(Packet::audio(0, Bytes::from_static(&[0xAF, 0x00]), false));
        assert!(header.is_complete());
        assert!(!header.audio_only());
    }

    #[test]
    fn test_header_packet_order() {
        let mut header = StreamHeader::new(true, true);
        header.audio_config = Some(Packet::audio(0, Bytes::from_static(&[0xAF, 0x00]), false));
        header.video_config = Some(Packet::video(0, Bytes::from_static(&[0x17, 0x00]), true));
        header.metadata = Some(Bytes::from_static(b"onMetaData"));

        let packets = header.packets();
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].kind, PacketKind::Metadata);
        assert_eq!(packets[1].kind, PacketKind::Video);
        assert_eq!(packets[2].kind, PacketKind::Audio);
    }
}
