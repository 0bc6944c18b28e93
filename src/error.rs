use thiserror::Error;

/// Main error type for the Headline-Compositor library
#[derive(Error, Debug)]
pub enum CompositorError {
    #[error("Asset load error: {0}")]
    AssetLoad(#[from] AssetError),

    #[error("Audio decode error: {0}")]
    AudioDecode(#[from] AudioError),

    #[error("Timeline has no assets to play")]
    EmptyTimeline,

    #[error("Invalid duration: {details}")]
    InvalidDuration { details: String },

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("Encoder produced no output")]
    EmptyOutput,

    #[error("Render pass cancelled")]
    Cancelled,

    #[error("A render pass is already active on this compositor")]
    Busy,

    #[error("Cannot {action} while the render pass is {state}")]
    InvalidState { state: String, action: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Asset-specific errors
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Failed to load asset {id}: {reason}")]
    LoadFailed { id: String, reason: String },

    #[error("Probing asset {id} failed: {reason}")]
    ProbeFailed { id: String, reason: String },

    #[error("Loading asset {id} timed out after {seconds}s")]
    Timeout { id: String, seconds: u64 },
}

/// Audio-specific errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to decode audio from {source_name}")]
    DecodeFailed { source_name: String },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Invalid audio parameters: {details}")]
    InvalidParameters { details: String },
}

/// Encoder-specific errors
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Failed to start encoder: {reason}")]
    StartFailed { reason: String },

    #[error("Failed to submit {stream} data: {reason}")]
    SubmitFailed { stream: String, reason: String },

    #[error("Encoding failed: {reason}")]
    EncodingFailed { reason: String },

    #[error("Encoder is already finished")]
    Finished,
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using CompositorError
pub type Result<T> = std::result::Result<T, CompositorError>;

impl CompositorError {
    /// Create an invalid-duration error with a custom message
    pub fn invalid_duration<S: Into<String>>(details: S) -> Self {
        Self::InvalidDuration { details: details.into() }
    }

    /// Check if this error is recoverable (the whole render pass can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Busy => true,
            // Network-backed or slow sources might load on retry
            Self::AssetLoad(AssetError::Timeout { .. }) => true,
            Self::AssetLoad(AssetError::LoadFailed { .. }) => true,
            Self::Encoder(EncoderError::EncodingFailed { .. }) => true,
            _ => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::AssetLoad(AssetError::LoadFailed { id, .. }) => {
                format!("Could not load asset '{}'. Please check it exists and is a supported image or video.", id)
            }
            Self::AssetLoad(AssetError::Timeout { id, seconds }) => {
                format!("Asset '{}' did not finish loading within {}s.", id, seconds)
            }
            Self::AudioDecode(AudioError::DecodeFailed { source_name }) => {
                format!("Could not decode narration audio '{}'. Supported formats: wav, mp3, flac, ogg, m4a, aac", source_name)
            }
            Self::EmptyTimeline => "No images or clips were supplied for the video.".to_string(),
            Self::Busy => "Another render is still running. Try again once it finishes.".to_string(),
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}
