//! Packet source and sink seams
//!
//! A publishing session reads from a [`PacketSource`] and a viewing session
//! writes to a [`PacketSink`]. The FLV implementations here carry HTTP-FLV
//! push ingest and HTTP-FLV playback.

use std::collections::VecDeque;
use std::future::Future;

use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::media::flv::AudioFormat;
use crate::media::{FlvHeader, FlvMuxer, FlvReader, FlvTag, Packet, StreamHeader};

/// Tags inspected while looking for decoder configuration
pub const MAX_PROBE_TAGS: usize = 64;

/// Publisher side of a session
pub trait PacketSource: Send {
    /// Negotiate the stream format. Called once, before any `read_packet`.
    fn stream_header(&mut self) -> impl Future<Output = Result<StreamHeader>> + Send;

    /// Next packet, or `Ok(None)` when the publisher ended the stream
    fn read_packet(&mut self) -> impl Future<Output = Result<Option<Packet>>> + Send;
}

/// Viewer side of a session
pub trait PacketSink: Send + Sync {
    fn write_header(&mut self, header: &StreamHeader) -> impl Future<Output = Result<()>> + Send;

    fn write_packet(&mut self, packet: &Packet) -> impl Future<Output = Result<()>> + Send;

    /// Resolves once the viewer has gone away
    fn closed(&self) -> impl Future<Output = ()> + Send;
}

/// [`PacketSource`] over an FLV byte stream
///
/// The header is probed from the leading tags: script data becomes the
/// metadata, sequence headers become decoder configuration. Media tags seen
/// while probing are kept and returned by the first reads.
pub struct FlvSource<R> {
    reader: FlvReader<R>,
    pending: VecDeque<Packet>,
    audio_only: bool,
}

impl<R: AsyncRead + Unpin + Send> FlvSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: FlvReader::new(reader),
            pending: VecDeque::new(),
            audio_only: false,
        }
    }

    async fn next_tag(&mut self) -> Result<Option<FlvTag>> {
        Ok(self.reader.read_tag().await?)
    }
}

impl<R: AsyncRead + Unpin + Send> PacketSource for FlvSource<R> {
    async fn stream_header(&mut self) -> Result<StreamHeader> {
        let flags = self.reader.read_header().await?;
        let mut header = StreamHeader::new(flags.has_audio, flags.has_video);
        self.audio_only = header.audio_only();

        let mut video_ready = !header.has_video;
        let mut audio_ready = !header.has_audio;

        for _ in 0..MAX_PROBE_TAGS {
            if video_ready && audio_ready {
                break;
            }

            let tag = self
                .next_tag()
                .await?
                .ok_or_else(|| Error::SourceFailure("stream ended before header".into()))?;

            if tag.is_script() && header.metadata.is_none() {
                header.metadata = Some(tag.data);
            } else if tag.is_video_config() && header.video_config.is_none() {
                header.video_config = Some(Packet::from_flv_tag(&tag, self.audio_only));
                video_ready = true;
            } else if tag.is_aac_sequence_header() && header.audio_config.is_none() {
                header.audio_config = Some(Packet::from_flv_tag(&tag, self.audio_only));
                audio_ready = true;
            } else {
                // Codecs without a configuration record are ready on first sight
                if tag.is_video() && !tag.video_codec().is_some_and(|c| c.has_config_record()) {
                    video_ready = true;
                }
                if tag.is_audio() && tag.audio_format().is_some_and(|f| f != AudioFormat::Aac) {
                    audio_ready = true;
                }
                self.pending
                    .push_back(Packet::from_flv_tag(&tag, self.audio_only));
            }
        }

        if !(video_ready && audio_ready) {
            tracing::warn!(
                video_ready,
                audio_ready,
                buffered = self.pending.len(),
                "Decoder configuration not found while probing, continuing without it"
            );
        }

        Ok(header)
    }

    async fn read_packet(&mut self) -> Result<Option<Packet>> {
        if let Some(packet) = self.pending.pop_front() {
            return Ok(Some(packet));
        }

        Ok(self
            .next_tag()
            .await?
            .map(|tag| Packet::from_flv_tag(&tag, self.audio_only)))
    }
}

/// [`PacketSink`] producing an FLV byte stream into a channel
///
/// Timestamps are rebased so the first live packet a viewer receives is at
/// zero; configuration tags are always at zero.
pub struct FlvSink {
    tx: mpsc::Sender<Bytes>,
    base: Option<u32>,
}

impl FlvSink {
    /// Create a sink and the receiver that yields its FLV chunks
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, base: None }, rx)
    }

    async fn send(&self, chunk: Bytes) -> Result<()> {
        self.tx
            .send(chunk)
            .await
            .map_err(|_| Error::SinkFailure("viewer disconnected".into()))
    }
}

impl PacketSink for FlvSink {
    async fn write_header(&mut self, header: &StreamHeader) -> Result<()> {
        self.send(FlvMuxer::header(FlvHeader {
            has_audio: header.has_audio,
            has_video: header.has_video,
        }))
        .await?;

        for packet in header.packets() {
            let mut tag = packet.to_flv_tag();
            tag.timestamp = 0;
            self.send(FlvMuxer::tag(&tag)).await?;
        }
        Ok(())
    }

    async fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let base = *self.base.get_or_insert(packet.timestamp);
        let mut tag = packet.to_flv_tag();
        tag.timestamp = packet.timestamp.saturating_sub(base);
        self.send(FlvMuxer::tag(&tag)).await
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::FlvTagType;

    fn avc_config() -> FlvTag {
        FlvTag::video(0, Bytes::from_static(&[0x17, 0x00, 0, 0, 0, 0x01]))
    }

    fn avc_frame(ts: u32, key: bool) -> FlvTag {
        let first = if key { 0x17 } else { 0x27 };
        FlvTag::video(ts, Bytes::from(vec![first, 0x01, 0, 0, 0, 0xAA]))
    }

    fn aac_config() -> FlvTag {
        FlvTag::audio(0, Bytes::from_static(&[0xAF, 0x00, 0x12, 0x10]))
    }

    fn aac_frame(ts: u32) -> FlvTag {
        FlvTag::audio(ts, Bytes::from_static(&[0xAF, 0x01, 0x21]))
    }

    fn flv_bytes(has_audio: bool, has_video: bool, tags: &[FlvTag]) -> Vec<u8> {
        let mut out = FlvMuxer::header(FlvHeader {
            has_audio,
            has_video,
        })
        .to_vec();
        for tag in tags {
            out.extend_from_slice(&FlvMuxer::tag(tag));
        }
        out
    }

    #[tokio::test]
    async fn test_source_probes_header_and_keeps_media() {
        let bytes = flv_bytes(
            true,
            true,
            &[
                FlvTag::script(0, Bytes::from_static(b"meta")),
                avc_config(),
                avc_frame(0, true),
                aac_config(),
                aac_frame(10),
                avc_frame(33, false),
            ],
        );
        let mut source = FlvSource::new(&bytes[..]);

        let header = source.stream_header().await.unwrap();
        assert!(header.is_complete());
        assert_eq!(header.metadata, Some(Bytes::from_static(b"meta")));
        assert_eq!(header.video_config.as_ref().unwrap().data, avc_config().data);
        assert_eq!(header.audio_config.as_ref().unwrap().data, aac_config().data);

        // The keyframe seen while probing comes out first
        let first = source.read_packet().await.unwrap().unwrap();
        assert_eq!(first.timestamp, 0);
        assert!(first.is_sync);

        let second = source.read_packet().await.unwrap().unwrap();
        assert_eq!(second.timestamp, 10);
        assert!(!second.is_sync);

        let third = source.read_packet().await.unwrap().unwrap();
        assert_eq!(third.timestamp, 33);

        assert!(source.read_packet().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_source_audio_only_packets_are_sync_points() {
        let bytes = flv_bytes(true, false, &[aac_config(), aac_frame(0), aac_frame(23)]);
        let mut source = FlvSource::new(&bytes[..]);

        let header = source.stream_header().await.unwrap();
        assert!(header.audio_only());

        while let Some(packet) = source.read_packet().await.unwrap() {
            assert!(packet.is_sync);
        }
    }

    #[tokio::test]
    async fn test_source_ends_before_header() {
        let bytes = flv_bytes(true, true, &[avc_config()]);
        let mut source = FlvSource::new(&bytes[..]);

        assert!(matches!(
            source.stream_header().await,
            Err(Error::SourceFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_source_rejects_garbage() {
        let mut source = FlvSource::new(&b"not an flv stream"[..]);
        assert!(matches!(
            source.stream_header().await,
            Err(Error::SourceFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_sink_writes_header_then_rebased_packets() {
        let (mut sink, mut rx) = FlvSink::channel(16);

        let mut header = StreamHeader::new(false, true);
        header.video_config = Some(Packet::from_flv_tag(&avc_config(), false));
        sink.write_header(&header).await.unwrap();

        sink.write_packet(&Packet::from_flv_tag(&avc_frame(5000, true), false))
            .await
            .unwrap();
        sink.write_packet(&Packet::from_flv_tag(&avc_frame(5040, false), false))
            .await
            .unwrap();
        drop(sink);

        let mut stream = Vec::new();
        while let Some(chunk) = rx.recv().await {
            stream.extend_from_slice(&chunk);
        }

        let mut reader = FlvReader::new(&stream[..]);
        let flags = reader.read_header().await.unwrap();
        assert!(flags.has_video);
        assert!(!flags.has_audio);

        let config = reader.read_tag().await.unwrap().unwrap();
        assert!(config.is_video_config());

        let key = reader.read_tag().await.unwrap().unwrap();
        assert_eq!(key.tag_type, FlvTagType::Video);
        assert_eq!(key.timestamp, 0);

        let inter = reader.read_tag().await.unwrap().unwrap();
        assert_eq!(inter.timestamp, 40);

        assert!(reader.read_tag().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sink_fails_after_viewer_leaves() {
        let (mut sink, rx) = FlvSink::channel(1);
        drop(rx);

        sink.closed().await;
        let result = sink
            .write_packet(&Packet::from_flv_tag(&avc_frame(0, true), false))
            .await;
        assert!(matches!(result, Err(Error::SinkFailure(_))));
    }
}
