//! Error types for texenc

use thiserror::Error;

/// Result type alias using EncodeError
pub type Result<T> = std::result::Result<T, EncodeError>;

/// Shader pipeline stage, used to tag compile failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vertex => write!(f, "vertex"),
            Self::Fragment => write!(f, "fragment"),
        }
    }
}

/// Main error type for texenc operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Driver, codec or file-system setup failure during session init
    #[error("Initialization failed: {0}")]
    Init(String),

    /// Make-current, detach or swap failure
    #[error("Rendering context error: {0}")]
    Context(String),

    /// Shader failed to compile
    #[error("{stage} shader compile failed: {log}")]
    Compile { stage: ShaderStage, log: String },

    /// Program failed to link
    #[error("Shader program link failed: {0}")]
    Link(String),

    /// Encoder produced no output within the bounded wait
    #[error("Encoder produced no output within {timeout_ms} ms")]
    DrainStall { timeout_ms: u64 },

    /// Hardware encoder error
    #[error("Encoder error: {0}")]
    Encoder(String),

    /// Container muxer error
    #[error("Muxer error: {0}")]
    Muxer(String),

    /// Frame parameters rejected before rendering
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The session worker is gone or the session was released
    #[error("Encode session is closed")]
    SessionClosed,

    /// Unsupported operation
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<EncodeError>,
    },
}

impl EncodeError {
    /// Create an init error
    pub fn init(msg: impl Into<String>) -> Self {
        Self::Init(msg.into())
    }

    /// Create a rendering context error
    pub fn context_error(msg: impl Into<String>) -> Self {
        Self::Context(msg.into())
    }

    /// Create an encoder error
    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }

    /// Create a muxer error
    pub fn muxer(msg: impl Into<String>) -> Self {
        Self::Muxer(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping context wrappers
    pub fn root(&self) -> &EncodeError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this error leaves the session unusable
    ///
    /// Per-frame failures (context, drain, encoder, muxer) are reported but the
    /// session keeps running; setup failures are not recoverable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.root(),
            Self::Init(_)
                | Self::Compile { .. }
                | Self::Link(_)
                | Self::Config(_)
                | Self::SessionClosed
        )
    }

    /// Short remediation hint for user-facing output
    pub fn user_hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::Init(_) => Some(
                "Check that libEGL is installed and that the build enables the `ffmpeg` feature",
            ),
            Self::Context(_) => Some("The GPU driver rejected the EGL surface; try a fresh session"),
            Self::Compile { .. } | Self::Link(_) => {
                Some("The GPU driver must support OpenGL ES 3.0 shaders")
            }
            Self::DrainStall { .. } => {
                Some("The encoder is saturated; lower the resolution or frame rate")
            }
            Self::Config(_) => Some("Check ~/.config/texenc/config.toml and command-line values"),
            Self::SessionClosed => Some("Create a new encode session; released sessions cannot be reused"),
            _ => None,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Error> for EncodeError {
    fn from(err: ffmpeg_next::Error) -> Self {
        Self::Encoder(err.to_string())
    }
}

impl From<toml::de::Error> for EncodeError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_skips_context() {
        let err = EncodeError::Link("bad varying".into())
            .with_context("compiling shader")
            .with_context("init");
        assert!(matches!(err.root(), EncodeError::Link(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_per_frame_errors_are_not_fatal() {
        assert!(!EncodeError::DrainStall { timeout_ms: 1000 }.is_fatal());
        assert!(!EncodeError::context_error("swap").is_fatal());
        assert!(!EncodeError::muxer("write").is_fatal());
    }

    #[test]
    fn test_compile_error_display() {
        let err = EncodeError::Compile {
            stage: ShaderStage::Fragment,
            log: "0:3: syntax error".into(),
        };
        assert_eq!(err.to_string(), "fragment shader compile failed: 0:3: syntax error");
    }
}
