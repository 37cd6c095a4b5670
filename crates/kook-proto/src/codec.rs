//! Frame codec.
//!
//! Text frames carry a JSON signal directly. Binary frames carry the same JSON
//! compressed with zlib-wrapped deflate when the client asked the gateway for
//! compression. Every failure here is scoped to the one frame being decoded.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::ProtoError;
use crate::signal::{Signal, SignalKind};

/// Default upper bound on a single frame, compressed or inflated.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Decoder for inbound gateway frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    compression: bool,
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(true, DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameCodec {
    /// Create a codec.
    #[must_use]
    pub const fn new(compression: bool, max_frame_size: usize) -> Self {
        Self {
            compression,
            max_frame_size,
        }
    }

    /// Whether binary frames are expected to be compressed.
    #[must_use]
    pub const fn compression(&self) -> bool {
        self.compression
    }

    /// Maximum accepted frame size in bytes.
    #[must_use]
    pub const fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is oversized or not a signal envelope.
    pub fn decode_text(&self, text: &str) -> Result<Signal, ProtoError> {
        self.check_size(text.len())?;
        Signal::from_json(text)
    }

    /// Decode a binary frame, inflating it first when compression is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if inflation fails, the frame is oversized, or the
    /// resulting text is not a signal envelope.
    pub fn decode_binary(&self, bytes: &[u8]) -> Result<Signal, ProtoError> {
        self.check_size(bytes.len())?;

        if !self.compression {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| ProtoError::Decoding(format!("invalid utf-8: {e}")))?;
            return Signal::from_json(text);
        }

        let inflated = self.inflate(bytes)?;
        let text = String::from_utf8(inflated)
            .map_err(|e| ProtoError::Decoding(format!("invalid utf-8 after inflate: {e}")))?;
        Signal::from_json(&text)
    }

    fn inflate(&self, bytes: &[u8]) -> Result<Vec<u8>, ProtoError> {
        let limit = self.max_frame_size as u64;
        let mut out = Vec::with_capacity(bytes.len().saturating_mul(4));
        ZlibDecoder::new(bytes)
            .take(limit + 1)
            .read_to_end(&mut out)
            .map_err(|e| ProtoError::Decompression(e.to_string()))?;
        self.check_size(out.len())?;
        Ok(out)
    }

    fn check_size(&self, size: usize) -> Result<(), ProtoError> {
        if size > self.max_frame_size {
            return Err(ProtoError::FrameTooLarge {
                size,
                limit: self.max_frame_size,
            });
        }
        Ok(())
    }
}

/// Encode the heartbeat ping: `{"s":2,"sn":<sequence>}`.
#[must_use]
pub fn encode_ping(sequence: u64) -> String {
    format!(r#"{{"s":{},"sn":{sequence}}}"#, SignalKind::Ping.code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    fn compress(text: &str) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).expect("write");
        encoder.finish().expect("finish")
    }

    #[test]
    fn test_encode_ping_is_bit_exact() {
        assert_eq!(encode_ping(0), r#"{"s":2,"sn":0}"#);
        assert_eq!(encode_ping(42), r#"{"s":2,"sn":42}"#);
    }

    #[test]
    fn test_encode_ping_matches_signal_encoding() {
        let via_signal = Signal::new(SignalKind::Ping)
            .with_sequence(7)
            .to_json()
            .expect("encode");
        assert_eq!(encode_ping(7), via_signal);
    }

    #[test]
    fn test_decode_text_frame() {
        let codec = FrameCodec::default();
        let signal = codec
            .decode_text(r#"{"s":1,"d":{"code":0,"session_id":"abc"}}"#)
            .expect("hello");
        assert_eq!(signal.kind, SignalKind::Hello);
    }

    #[test]
    fn test_decode_compressed_binary_frame() {
        let codec = FrameCodec::default();
        let frame = compress(r#"{"s":0,"sn":3,"d":{"type":9}}"#);
        let signal = codec.decode_binary(&frame).expect("event");
        assert_eq!(signal.kind, SignalKind::Event);
        assert_eq!(signal.sequence, Some(3));
    }

    #[test]
    fn test_corrupt_binary_frame_is_decompression_error() {
        let codec = FrameCodec::default();
        let err = codec
            .decode_binary(b"definitely not zlib")
            .expect_err("corrupt frame");
        assert!(matches!(err, ProtoError::Decompression(_)));
        assert!(err.is_frame_local());
    }

    #[test]
    fn test_inflated_garbage_is_decoding_error() {
        let codec = FrameCodec::default();
        let err = codec
            .decode_binary(&compress("not json"))
            .expect_err("garbage");
        assert!(matches!(err, ProtoError::Decoding(_)));
    }

    #[test]
    fn test_uncompressed_binary_frame() {
        let codec = FrameCodec::new(false, DEFAULT_MAX_FRAME_SIZE);
        let signal = codec.decode_binary(br#"{"s":3}"#).expect("pong");
        assert_eq!(signal.kind, SignalKind::Pong);
    }

    #[test]
    fn test_oversized_text_frame_rejected() {
        let codec = FrameCodec::new(true, 8);
        let err = codec.decode_text(r#"{"s":3,"d":{}}"#).expect_err("too big");
        assert!(matches!(err, ProtoError::FrameTooLarge { limit: 8, .. }));
    }

    #[test]
    fn test_inflation_bomb_rejected() {
        let codec = FrameCodec::new(true, 128);
        let padding = " ".repeat(8192);
        let frame = compress(&format!(r#"{{"s":3,"d":{{}}{padding}}}"#));
        assert!(frame.len() < 128);
        let err = codec.decode_binary(&frame).expect_err("inflates past limit");
        assert!(matches!(err, ProtoError::FrameTooLarge { .. }));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn ping_decodes_back(sn in any::<u64>()) {
                let codec = FrameCodec::default();
                let signal = codec.decode_text(&encode_ping(sn)).unwrap();
                prop_assert_eq!(signal.kind, SignalKind::Ping);
                prop_assert_eq!(signal.sequence, Some(sn));
            }

            #[test]
            fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
                let codec = FrameCodec::default();
                let _ = codec.decode_binary(&bytes);
            }
        }
    }
}
