//! Error types for the chord-to-MIDI system

use std::fmt;

/// Custom error type for chord recognition and MIDI rendering
#[derive(Debug, Clone, PartialEq)]
pub enum ChordError {
    /// E001: Audio could not be decoded (missing, corrupt, unsupported or empty)
    Decode(String),
    /// E002: Neither recognition strategy produced a chord sequence
    Recognition(String),
    /// E003: MIDI serialization or artifact write failed
    Encode(String),
    /// E004: Configuration validation failed
    ConfigValidation(String),
    /// E005: Input validation error
    InputValidation(String),
    /// E006: Chord model could not be loaded
    ModelLoad(String),
}

impl ChordError {
    /// Stable error kind reported to callers alongside the detail text
    pub fn kind(&self) -> &'static str {
        match self {
            ChordError::Decode(_) => "DecodeError",
            ChordError::Recognition(_) => "RecognitionError",
            ChordError::Encode(_) => "EncodeError",
            ChordError::ConfigValidation(_) => "ConfigError",
            ChordError::InputValidation(_) => "InputError",
            ChordError::ModelLoad(_) => "ModelLoadError",
        }
    }

    /// Free-text detail without the code prefix
    pub fn detail(&self) -> &str {
        match self {
            ChordError::Decode(msg)
            | ChordError::Recognition(msg)
            | ChordError::Encode(msg)
            | ChordError::ConfigValidation(msg)
            | ChordError::InputValidation(msg)
            | ChordError::ModelLoad(msg) => msg,
        }
    }
}

impl fmt::Display for ChordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChordError::Decode(msg) => write!(f, "E001: Audio decode error - {}", msg),
            ChordError::Recognition(msg) => write!(f, "E002: Chord recognition failed - {}", msg),
            ChordError::Encode(msg) => write!(f, "E003: MIDI export error - {}", msg),
            ChordError::ConfigValidation(msg) => {
                write!(f, "E004: Configuration validation failed - {}", msg)
            }
            ChordError::InputValidation(msg) => {
                write!(f, "E005: Input validation error - {}", msg)
            }
            ChordError::ModelLoad(msg) => write!(f, "E006: Chord model load error - {}", msg),
        }
    }
}

impl std::error::Error for ChordError {}

impl From<serde_json::Error> for ChordError {
    fn from(err: serde_json::Error) -> Self {
        ChordError::ConfigValidation(format!("JSON error: {}", err))
    }
}

/// Result type alias for chord-to-MIDI operations
pub type Result<T> = std::result::Result<T, ChordError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_stable() {
        assert_eq!(ChordError::Decode("x".into()).kind(), "DecodeError");
        assert_eq!(ChordError::Recognition("x".into()).kind(), "RecognitionError");
        assert_eq!(ChordError::Encode("x".into()).kind(), "EncodeError");
    }

    #[test]
    fn test_display_carries_code_and_detail() {
        let err = ChordError::Decode("zero-length file".into());
        assert_eq!(err.to_string(), "E001: Audio decode error - zero-length file");
        assert_eq!(err.detail(), "zero-length file");
    }
}
