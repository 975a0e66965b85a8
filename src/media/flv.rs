//! FLV container
//!
//! Viewers receive an FLV byte stream and HTTP publishers push one, so this
//! module covers both directions: [`FlvReader`] demuxes tags from any
//! `AsyncRead`, [`FlvMuxer`] serializes the file header and tags.
//!
//! FLV layout:
//! ```text
//! +-----------+-----------------+------------+-----------------+-----+
//! | Header(9) | PrevTagSize0(4) | Tag 1      | PrevTagSize1(4) | ... |
//! +-----------+-----------------+------------+-----------------+-----+
//!
//! Tag:
//! +--------+-------------+-----------+-------------+---------+
//! | Type(1)| DataSize(3) | TS(3+1)   | StreamID(3) | Data(N) |
//! +--------+-------------+-----------+-------------+---------+
//! ```
//!
//! Video data starts with `FrameType(4 bits) | CodecID(4 bits)`, audio data
//! with `SoundFormat(4) | SoundRate(2) | SoundSize(1) | SoundType(1)`.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Size of the FLV file header
pub const FLV_HEADER_SIZE: usize = 9;

/// Largest header data offset accepted from a publisher
pub const MAX_DATA_OFFSET: u32 = 4096;

/// Size of an FLV tag header
pub const TAG_HEADER_SIZE: usize = 11;

const TAG_TYPE_AUDIO: u8 = 8;
const TAG_TYPE_VIDEO: u8 = 9;
const TAG_TYPE_SCRIPT: u8 = 18;

const FLAG_AUDIO: u8 = 0x04;
const FLAG_VIDEO: u8 = 0x01;

/// Errors raised while demuxing an FLV stream
#[derive(Debug, Error)]
pub enum FlvError {
    /// Stream does not start with `FLV`
    #[error("not an FLV stream")]
    BadSignature,

    /// Header data offset points inside the header or too far past it
    #[error("invalid FLV data offset {0}")]
    BadDataOffset(u32),

    /// Stream ended in the middle of a tag
    #[error("truncated FLV tag")]
    Truncated,

    /// Underlying reader failed
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// FLV tag type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlvTagType {
    Audio,
    Video,
    Script,
}

impl FlvTagType {
    fn from_byte(b: u8) -> Option<Self> {
        // Upper bits carry the filter/encryption flag
        match b & 0x1F {
            TAG_TYPE_AUDIO => Some(FlvTagType::Audio),
            TAG_TYPE_VIDEO => Some(FlvTagType::Video),
            TAG_TYPE_SCRIPT => Some(FlvTagType::Script),
            _ => None,
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            FlvTagType::Audio => TAG_TYPE_AUDIO,
            FlvTagType::Video => TAG_TYPE_VIDEO,
            FlvTagType::Script => TAG_TYPE_SCRIPT,
        }
    }
}

/// Parsed FLV tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlvTag {
    /// Tag type
    pub tag_type: FlvTagType,
    /// Timestamp in milliseconds
    pub timestamp: u32,
    /// Raw tag data (including codec headers)
    pub data: Bytes,
}

/// Video frame type (upper 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    Keyframe = 1,
    InterFrame = 2,
    DisposableInterFrame = 3,
    GeneratedKeyframe = 4,
    VideoInfoFrame = 5,
}

impl VideoFrameType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            1 => Some(VideoFrameType::Keyframe),
            2 => Some(VideoFrameType::InterFrame),
            3 => Some(VideoFrameType::DisposableInterFrame),
            4 => Some(VideoFrameType::GeneratedKeyframe),
            5 => Some(VideoFrameType::VideoInfoFrame),
            _ => None,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(
            self,
            VideoFrameType::Keyframe | VideoFrameType::GeneratedKeyframe
        )
    }
}

/// Video codec ID (lower 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    SorensonH263 = 2,
    ScreenVideo = 3,
    Vp6 = 4,
    Vp6Alpha = 5,
    ScreenVideoV2 = 6,
    /// AVC (H.264)
    Avc = 7,
    /// HEVC (H.265), enhanced FLV
    Hevc = 12,
    /// AV1, enhanced FLV
    Av1 = 13,
}

impl VideoCodec {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x0F {
            2 => Some(VideoCodec::SorensonH263),
            3 => Some(VideoCodec::ScreenVideo),
            4 => Some(VideoCodec::Vp6),
            5 => Some(VideoCodec::Vp6Alpha),
            6 => Some(VideoCodec::ScreenVideoV2),
            7 => Some(VideoCodec::Avc),
            12 => Some(VideoCodec::Hevc),
            13 => Some(VideoCodec::Av1),
            _ => None,
        }
    }

    /// Codecs that carry a decoder configuration record (packet type 0)
    pub fn has_config_record(&self) -> bool {
        matches!(self, VideoCodec::Avc | VideoCodec::Hevc | VideoCodec::Av1)
    }
}

/// Audio format (upper 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    LinearPcmPlatform = 0,
    Adpcm = 1,
    Mp3 = 2,
    LinearPcmLe = 3,
    Nellymoser16kMono = 4,
    Nellymoser8kMono = 5,
    Nellymoser = 6,
    G711ALaw = 7,
    G711MuLaw = 8,
    Aac = 10,
    Speex = 11,
    Mp38k = 14,
    DeviceSpecific = 15,
}

impl AudioFormat {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            0 => Some(AudioFormat::LinearPcmPlatform),
            1 => Some(AudioFormat::Adpcm),
            2 => Some(AudioFormat::Mp3),
            3 => Some(AudioFormat::LinearPcmLe),
            4 => Some(AudioFormat::Nellymoser16kMono),
            5 => Some(AudioFormat::Nellymoser8kMono),
            6 => Some(AudioFormat::Nellymoser),
            7 => Some(AudioFormat::G711ALaw),
            8 => Some(AudioFormat::G711MuLaw),
            10 => Some(AudioFormat::Aac),
            11 => Some(AudioFormat::Speex),
            14 => Some(AudioFormat::Mp38k),
            15 => Some(AudioFormat::DeviceSpecific),
            _ => None,
        }
    }
}

impl FlvTag {
    /// Create a new video tag
    pub fn video(timestamp: u32, data: Bytes) -> Self {
        Self {
            tag_type: FlvTagType::Video,
            timestamp,
            data,
        }
    }

    /// Create a new audio tag
    pub fn audio(timestamp: u32, data: Bytes) -> Self {
        Self {
            tag_type: FlvTagType::Audio,
            timestamp,
            data,
        }
    }

    /// Create a new script data tag
    pub fn script(timestamp: u32, data: Bytes) -> Self {
        Self {
            tag_type: FlvTagType::Script,
            timestamp,
            data,
        }
    }

    pub fn is_video(&self) -> bool {
        self.tag_type == FlvTagType::Video
    }

    pub fn is_audio(&self) -> bool {
        self.tag_type == FlvTagType::Audio
    }

    pub fn is_script(&self) -> bool {
        self.tag_type == FlvTagType::Script
    }

    /// For video tags, get the frame type
    pub fn video_frame_type(&self) -> Option<VideoFrameType> {
        if self.is_video() && !self.data.is_empty() {
            VideoFrameType::from_byte(self.data[0])
        } else {
            None
        }
    }

    /// For video tags, get the codec
    pub fn video_codec(&self) -> Option<VideoCodec> {
        if self.is_video() && !self.data.is_empty() {
            VideoCodec::from_byte(self.data[0])
        } else {
            None
        }
    }

    /// For audio tags, get the format
    pub fn audio_format(&self) -> Option<AudioFormat> {
        if self.is_audio() && !self.data.is_empty() {
            AudioFormat::from_byte(self.data[0])
        } else {
            None
        }
    }

    pub fn is_keyframe(&self) -> bool {
        self.video_frame_type()
            .map(|ft| ft.is_keyframe())
            .unwrap_or(false)
    }

    /// Video decoder configuration record (AVC/HEVC/AV1 packet type 0)
    pub fn is_video_config(&self) -> bool {
        self.video_codec()
            .map(|codec| codec.has_config_record() && self.data.len() >= 2 && self.data[1] == 0)
            .unwrap_or(false)
    }

    /// AAC AudioSpecificConfig
    pub fn is_aac_sequence_header(&self) -> bool {
        self.audio_format() == Some(AudioFormat::Aac) && self.data.len() >= 2 && self.data[1] == 0
    }

    /// Size of the tag data
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Track flags from the FLV file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlvHeader {
    pub has_audio: bool,
    pub has_video: bool,
}

/// Serializes FLV headers and tags
#[derive(Debug, Default, Clone, Copy)]
pub struct FlvMuxer;

impl FlvMuxer {
    /// File header followed by the zero `PreviousTagSize0`
    pub fn header(header: FlvHeader) -> Bytes {
        let mut buf = BytesMut::with_capacity(FLV_HEADER_SIZE + 4);
        buf.put_slice(b"FLV");
        buf.put_u8(1);

        let mut flags = 0;
        if header.has_audio {
            flags |= FLAG_AUDIO;
        }
        if header.has_video {
            flags |= FLAG_VIDEO;
        }
        buf.put_u8(flags);
        buf.put_u32(FLV_HEADER_SIZE as u32);
        buf.put_u32(0);
        buf.freeze()
    }

    /// One tag followed by its `PreviousTagSize`
    pub fn tag(tag: &FlvTag) -> Bytes {
        let data_size = tag.data.len();
        let mut buf = BytesMut::with_capacity(TAG_HEADER_SIZE + data_size + 4);

        buf.put_u8(tag.tag_type.as_byte());
        put_u24(&mut buf, data_size as u32);
        put_u24(&mut buf, tag.timestamp & 0x00FF_FFFF);
        buf.put_u8((tag.timestamp >> 24) as u8);
        put_u24(&mut buf, 0);
        buf.put_slice(&tag.data);
        buf.put_u32((TAG_HEADER_SIZE + data_size) as u32);
        buf.freeze()
    }
}

fn put_u24(buf: &mut BytesMut, v: u32) {
    buf.put_u8((v >> 16) as u8);
    buf.put_u8((v >> 8) as u8);
    buf.put_u8(v as u8);
}

fn read_u24(b: &[u8]) -> u32 {
    ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32
}

/// Incremental FLV demuxer over an async byte stream
pub struct FlvReader<R> {
    reader: R,
    header: Option<FlvHeader>,
}

impl<R: AsyncRead + Unpin> FlvReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            header: None,
        }
    }

    /// Read the file header (idempotent)
    pub async fn read_header(&mut self) -> Result<FlvHeader, FlvError> {
        if let Some(header) = self.header {
            return Ok(header);
        }

        let mut buf = [0u8; FLV_HEADER_SIZE];
        self.read_exact(&mut buf).await?;

        if &buf[0..3] != b"FLV" {
            return Err(FlvError::BadSignature);
        }

        let data_offset = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]);
        if (data_offset as usize) < FLV_HEADER_SIZE || data_offset > MAX_DATA_OFFSET {
            return Err(FlvError::BadDataOffset(data_offset));
        }

        // Skip any extension bytes, then PreviousTagSize0
        let skip = data_offset as usize - FLV_HEADER_SIZE + 4;
        let mut discard = vec![0u8; skip];
        self.read_exact(&mut discard).await?;

        let header = FlvHeader {
            has_audio: buf[4] & FLAG_AUDIO != 0,
            has_video: buf[4] & FLAG_VIDEO != 0,
        };
        self.header = Some(header);
        Ok(header)
    }

    /// Read the next audio, video or script tag
    ///
    /// Returns `Ok(None)` on a clean end of stream at a tag boundary. Tags of
    /// unknown type are skipped.
    pub async fn read_tag(&mut self) -> Result<Option<FlvTag>, FlvError> {
        self.read_header().await?;

        loop {
            let mut head = [0u8; TAG_HEADER_SIZE];
            let first = self.reader.read(&mut head[..1]).await?;
            if first == 0 {
                return Ok(None);
            }
            self.read_exact(&mut head[1..]).await?;

            let data_size = read_u24(&head[1..4]) as usize;
            let timestamp = read_u24(&head[4..7]) | ((head[7] as u32) << 24);

            let mut data = BytesMut::zeroed(data_size);
            self.read_exact(&mut data).await?;

            let mut trailer = [0u8; 4];
            self.read_exact(&mut trailer).await?;

            match FlvTagType::from_byte(head[0]) {
                Some(tag_type) => {
                    return Ok(Some(FlvTag {
                        tag_type,
                        timestamp,
                        data: data.freeze(),
                    }))
                }
                None => {
                    tracing::trace!(tag_type = head[0], size = data_size, "Skipping unknown FLV tag");
                }
            }
        }
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), FlvError> {
        match self.reader.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(FlvError::Truncated),
            Err(e) => Err(FlvError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_stream(tags: &[FlvTag]) -> Vec<u8> {
        let mut out = FlvMuxer::header(FlvHeader {
            has_audio: true,
            has_video: true,
        })
        .to_vec();
        for tag in tags {
            out.extend_from_slice(&FlvMuxer::tag(tag));
        }
        out
    }

    #[test]
    fn test_video_frame_type() {
        assert_eq!(
            VideoFrameType::from_byte(0x17),
            Some(VideoFrameType::Keyframe)
        );
        assert_eq!(
            VideoFrameType::from_byte(0x27),
            Some(VideoFrameType::InterFrame)
        );
        assert_eq!(VideoFrameType::from_byte(0x00), None);
        assert!(VideoFrameType::GeneratedKeyframe.is_keyframe());
        assert!(!VideoFrameType::DisposableInterFrame.is_keyframe());
    }

    #[test]
    fn test_video_config_detection() {
        let avc = FlvTag::video(0, Bytes::from_static(&[0x17, 0x00, 0x00, 0x00, 0x00]));
        assert!(avc.is_video_config());
        assert!(avc.is_keyframe());

        let nalu = FlvTag::video(0, Bytes::from_static(&[0x17, 0x01, 0x00, 0x00, 0x00]));
        assert!(!nalu.is_video_config());

        let hevc = FlvTag::video(0, Bytes::from_static(&[0x1C, 0x00]));
        assert!(hevc.is_video_config());

        // VP6 has no configuration record
        let vp6 = FlvTag::video(0, Bytes::from_static(&[0x14, 0x00]));
        assert!(!vp6.is_video_config());
    }

    #[test]
    fn test_aac_sequence_header() {
        let header = FlvTag::audio(0, Bytes::from_static(&[0xAF, 0x00, 0x12, 0x10]));
        assert!(header.is_aac_sequence_header());

        let frame = FlvTag::audio(0, Bytes::from_static(&[0xAF, 0x01, 0x21, 0x00]));
        assert!(!frame.is_aac_sequence_header());

        let mp3 = FlvTag::audio(0, Bytes::from_static(&[0x2F, 0x00]));
        assert!(!mp3.is_aac_sequence_header());
    }

    #[test]
    fn test_short_data() {
        let tag = FlvTag::video(0, Bytes::from_static(&[0x17]));
        assert!(tag.is_keyframe());
        assert!(!tag.is_video_config());

        let empty = FlvTag::audio(0, Bytes::new());
        assert!(empty.audio_format().is_none());
    }

    #[test]
    fn test_muxer_header_layout() {
        let bytes = FlvMuxer::header(FlvHeader {
            has_audio: true,
            has_video: false,
        });
        assert_eq!(&bytes[..], &[b'F', b'L', b'V', 1, 0x04, 0, 0, 0, 9, 0, 0, 0, 0]);
    }

    #[test]
    fn test_muxer_tag_layout() {
        let tag = FlvTag::video(0x0102_0304, Bytes::from_static(&[0x17, 0x01, 0xAA]));
        let bytes = FlvMuxer::tag(&tag);

        assert_eq!(bytes.len(), TAG_HEADER_SIZE + 3 + 4);
        assert_eq!(bytes[0], 9);
        assert_eq!(&bytes[1..4], &[0, 0, 3]);
        // Lower 24 bits then the extended byte
        assert_eq!(&bytes[4..8], &[0x02, 0x03, 0x04, 0x01]);
        assert_eq!(&bytes[11..14], &[0x17, 0x01, 0xAA]);
        assert_eq!(&bytes[14..], &[0, 0, 0, 14]);
    }

    #[tokio::test]
    async fn test_reader_parses_muxer_output() {
        let tags = vec![
            FlvTag::script(0, Bytes::from_static(b"onMetaData")),
            FlvTag::video(0, Bytes::from_static(&[0x17, 0x00, 0x01])),
            FlvTag::audio(0x0100_0000, Bytes::from_static(&[0xAF, 0x01])),
        ];
        let stream = sample_stream(&tags);
        let mut reader = FlvReader::new(&stream[..]);

        let header = reader.read_header().await.unwrap();
        assert!(header.has_audio && header.has_video);

        for expected in &tags {
            let tag = reader.read_tag().await.unwrap().unwrap();
            assert_eq!(&tag, expected);
        }
        assert!(reader.read_tag().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_skips_unknown_tags() {
        let mut stream = sample_stream(&[]);
        // Tag type 15 with a 1-byte body
        stream.extend_from_slice(&[15, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0xFF, 0, 0, 0, 12]);
        stream.extend_from_slice(&FlvMuxer::tag(&FlvTag::audio(5, Bytes::from_static(&[0x2F]))));

        let mut reader = FlvReader::new(&stream[..]);
        let tag = reader.read_tag().await.unwrap().unwrap();
        assert!(tag.is_audio());
        assert_eq!(tag.timestamp, 5);
    }

    #[tokio::test]
    async fn test_reader_rejects_bad_signature() {
        let data = b"RIFF\x01\x05\x00\x00\x00\x09\x00\x00\x00\x00";
        let mut reader = FlvReader::new(&data[..]);
        assert!(matches!(
            reader.read_header().await,
            Err(FlvError::BadSignature)
        ));
    }

    #[tokio::test]
    async fn test_reader_rejects_oversized_data_offset() {
        let mut stream = sample_stream(&[]);
        stream[5..9].copy_from_slice(&u32::MAX.to_be_bytes());

        let mut reader = FlvReader::new(&stream[..]);
        assert!(matches!(
            reader.read_header().await,
            Err(FlvError::BadDataOffset(u32::MAX))
        ));
    }

    #[tokio::test]
    async fn test_reader_skips_header_extension() {
        let mut stream = sample_stream(&[]);
        stream[5..9].copy_from_slice(&13u32.to_be_bytes());
        // Four extension bytes between the header and PreviousTagSize0
        stream.splice(9..9, [0xAA; 4]);
        stream.extend_from_slice(&FlvMuxer::tag(&FlvTag::video(
            40,
            Bytes::from_static(&[0x27, 0x01]),
        )));

        let mut reader = FlvReader::new(&stream[..]);
        reader.read_header().await.unwrap();
        let tag = reader.read_tag().await.unwrap().unwrap();
        assert_eq!(tag.timestamp, 40);
    }

    #[tokio::test]
    async fn test_reader_truncated_tag() {
        let mut stream = sample_stream(&[]);
        let tag = FlvMuxer::tag(&FlvTag::video(0, Bytes::from_static(&[0x17, 0x01, 0x02])));
        stream.extend_from_slice(&tag[..8]);

        let mut reader = FlvReader::new(&stream[..]);
        assert!(matches!(reader.read_tag().await, Err(FlvError::Truncated)));
    }
}
