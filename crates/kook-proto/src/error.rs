//! Error types for the kook-proto crate.

use thiserror::Error;

/// Errors that can occur while encoding or decoding gateway frames.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Failed to encode a message.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Failed to decode a message.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// A compressed binary frame could not be inflated.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Frame exceeded the configured size limit.
    #[error("frame too large: {size} bytes (limit {limit})")]
    FrameTooLarge {
        /// Observed size in bytes.
        size: usize,
        /// Configured limit in bytes.
        limit: usize,
    },

    /// Missing required field.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

impl ProtoError {
    /// Whether this error only affects the frame being decoded.
    ///
    /// Every codec error is scoped to a single frame; the connection that
    /// carried it stays usable.
    #[must_use]
    pub const fn is_frame_local(&self) -> bool {
        matches!(
            self,
            Self::Decoding(_)
                | Self::Decompression(_)
                | Self::FrameTooLarge { .. }
                | Self::MissingField(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_too_large_display() {
        let err = ProtoError::FrameTooLarge {
            size: 2048,
            limit: 1024,
        };
        assert_eq!(err.to_string(), "frame too large: 2048 bytes (limit 1024)");
    }

    #[test]
    fn test_decode_errors_are_frame_local() {
        assert!(ProtoError::Decompression("bad header".into()).is_frame_local());
        assert!(ProtoError::Decoding("eof".into()).is_frame_local());
        assert!(!ProtoError::Encoding("nope".into()).is_frame_local());
    }
}
