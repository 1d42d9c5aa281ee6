//! Error handling for the MVR audio subsystem
//!
//! Playback faults are handled inside the component that owns them. Only
//! file loaders (config, playlist, preferences) hand errors back to callers.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for MVR audio operations
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Main error type for the audio subsystem
#[derive(Error, Debug)]
pub enum PlayerError {
    // Playback Errors
    #[error("Could not load audio from '{uri}': {reason}")]
    LoadError { uri: String, reason: String },

    #[error("Playback blocked until the visitor interacts with the page")]
    PlayBlocked,

    #[error("Playback failed: {reason}")]
    PlayFailed { reason: String },

    #[error("Background effect is not available yet")]
    EffectUnavailable,

    // Configuration Errors
    #[error("Playlist contains no tracks")]
    EmptyPlaylist,

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // File Errors
    #[error("Failed to read file: {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}: {source}")]
    FileWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory creation failed: {path}: {source}")]
    DirectoryCreateError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Serialization Errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PlayerError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            PlayerError::LoadError { .. } => "LOAD_ERROR",
            PlayerError::PlayBlocked => "PLAY_BLOCKED",
            PlayerError::PlayFailed { .. } => "PLAY_FAILED",
            PlayerError::EffectUnavailable => "EFFECT_UNAVAILABLE",
            PlayerError::EmptyPlaylist => "EMPTY_PLAYLIST",
            PlayerError::InvalidConfig { .. } => "INVALID_CONFIG",
            PlayerError::FileReadError { .. } => "FILE_READ_ERROR",
            PlayerError::FileWriteError { .. } => "FILE_WRITE_ERROR",
            PlayerError::DirectoryCreateError { .. } => "DIRECTORY_CREATE_ERROR",
            PlayerError::Json(_) => "JSON_ERROR",
        }
    }

    /// Check if playback can continue after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PlayerError::LoadError { .. }
                | PlayerError::PlayBlocked
                | PlayerError::EffectUnavailable
                | PlayerError::FileWriteError { .. }
        )
    }

    /// Returns a user-facing recovery suggestion.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            PlayerError::LoadError { .. } => Some("Skip to the next track or try again later."),
            PlayerError::PlayBlocked => Some("Tap anywhere to enable audio."),
            PlayerError::PlayFailed { .. } => Some("Press play to try again."),
            PlayerError::EmptyPlaylist => Some("Add at least one track to the playlist file."),
            PlayerError::InvalidConfig { .. } => Some("Check the configuration values and retry."),
            PlayerError::FileWriteError { .. } => {
                Some("Preferences could not be saved; they will reset next visit.")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = PlayerError::LoadError {
            uri: "/audio/split-theory.mp3".to_string(),
            reason: "404".to_string(),
        };
        assert_eq!(err.error_code(), "LOAD_ERROR");
        assert_eq!(PlayerError::PlayBlocked.error_code(), "PLAY_BLOCKED");
    }

    #[test]
    fn test_recoverable_playback_faults() {
        assert!(PlayerError::PlayBlocked.is_recoverable());
        assert!(PlayerError::EffectUnavailable.is_recoverable());
        assert!(!PlayerError::EmptyPlaylist.is_recoverable());
        assert!(!PlayerError::PlayFailed {
            reason: "decode".to_string()
        }
        .is_recoverable());
    }

    #[test]
    fn test_recovery_suggestions() {
        assert_eq!(
            PlayerError::PlayBlocked.recovery_suggestion(),
            Some("Tap anywhere to enable audio.")
        );
        assert!(PlayerError::EffectUnavailable.recovery_suggestion().is_none());
    }

    #[test]
    fn test_display_includes_uri() {
        let err = PlayerError::LoadError {
            uri: "/audio/a.mp3".to_string(),
            reason: "decode error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Could not load audio from '/audio/a.mp3': decode error"
        );
    }
}
