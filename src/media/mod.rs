//! Media handling
//!
//! This module provides:
//! - The opaque [`Packet`] and the per-stream [`StreamHeader`]
//! - FLV demuxing (ingest) and muxing (playback)

pub mod flv;
pub mod packet;

pub use flv::{FlvHeader, FlvMuxer, FlvReader, FlvTag, FlvTagType};
pub use packet::{Packet, PacketKind, StreamHeader};
