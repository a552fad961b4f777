//! Core types for texenc

use serde::{Deserialize, Serialize};

use crate::config::Codec;

/// Column-major 4x4 matrix as uploaded to GL
pub type Mat4 = [f32; 16];

/// Identity transform
pub const IDENTITY: Mat4 = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0, //
];

/// Encode session lifecycle
///
/// Transitions only move forward; a destroyed session cannot be resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Created, `init` has not completed
    Uninitialized,
    /// Encoder, context and muxer are live
    Running,
    /// Released (terminal)
    Destroyed,
}

impl SessionState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Running => 1,
            Self::Destroyed => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Running,
            _ => Self::Destroyed,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Running => write!(f, "running"),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Texture binding target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TextureKind {
    /// Conventional `GL_TEXTURE_2D`
    #[default]
    Texture2D,
    /// External/streaming image (`GL_TEXTURE_EXTERNAL_OES`), e.g. camera frames
    External,
}

/// A GPU texture name plus the target it was created for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Texture {
    pub id: u32,
    pub kind: TextureKind,
}

impl Texture {
    /// A `GL_TEXTURE_2D` texture
    pub fn two_d(id: u32) -> Self {
        Self {
            id,
            kind: TextureKind::Texture2D,
        }
    }

    /// A `GL_TEXTURE_EXTERNAL_OES` texture
    pub fn external(id: u32) -> Self {
        Self {
            id,
            kind: TextureKind::External,
        }
    }
}

/// Flag bits attached to an encoded buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferFlags(u32);

impl BufferFlags {
    pub const NONE: Self = Self(0);
    /// Key (sync) frame
    pub const KEY_FRAME: Self = Self(1);
    /// Codec-specific data, not a media sample
    pub const CODEC_CONFIG: Self = Self(2);
    /// Last buffer the encoder will produce
    pub const END_OF_STREAM: Self = Self(4);

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn is_key_frame(&self) -> bool {
        self.contains(Self::KEY_FRAME)
    }

    pub fn is_codec_config(&self) -> bool {
        self.contains(Self::CODEC_CONFIG)
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.contains(Self::END_OF_STREAM)
    }
}

impl std::ops::BitOr for BufferFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for BufferFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Metadata for one dequeued output buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodedBufferInfo {
    /// Offset of the payload inside the buffer
    pub offset: usize,
    /// Payload size in bytes
    pub size: usize,
    /// Presentation timestamp in microseconds
    pub presentation_time_us: i64,
    pub flags: BufferFlags,
}

impl EncodedBufferInfo {
    /// Byte range holding the payload; `None` if it overflows
    pub fn range(&self) -> Option<std::ops::Range<usize>> {
        let end = self.offset.checked_add(self.size)?;
        Some(self.offset..end)
    }
}

/// Output format reported by an encoder once it has produced data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFormat {
    pub codec: Codec,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub bit_rate: u32,
    /// Codec-specific data (SPS/PPS, sequence header) for the container
    pub extradata: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_flags() {
        let flags = BufferFlags::KEY_FRAME | BufferFlags::END_OF_STREAM;
        assert!(flags.is_key_frame());
        assert!(flags.is_end_of_stream());
        assert!(!flags.is_codec_config());
        assert!(!BufferFlags::NONE.contains(BufferFlags::NONE));
    }

    #[test]
    fn test_buffer_range() {
        let info = EncodedBufferInfo {
            offset: 4,
            size: 10,
            ..Default::default()
        };
        assert_eq!(info.range(), Some(4..14));
    }

    #[test]
    fn test_buffer_range_overflow() {
        let info = EncodedBufferInfo {
            offset: usize::MAX - 2,
            size: 10,
            ..Default::default()
        };
        assert_eq!(info.range(), None);
    }

    #[test]
    fn test_state_roundtrip_through_u8() {
        for state in [
            SessionState::Uninitialized,
            SessionState::Running,
            SessionState::Destroyed,
        ] {
            assert_eq!(SessionState::from_u8(state.as_u8()), state);
        }
    }
}
