//! # Error Types
//!
//! This module defines all error types for the chime engine.
//!
//! Playback itself never hands these to the caller: a bad note becomes a silent
//! rest, a refused audio start leaves the session uninitialized, an unknown
//! preset falls back to `default`. The errors surface from the fallible edges
//! instead (strict pitch parsing, configuration loading, signal decoding) and
//! from the audio back end seam, where the session logs them and degrades.
//!
//! ## Error Types
//! - `InvalidNote` - A token that is neither a rest nor a valid pitch
//! - `AudioStartDenied` - The platform refused to start audio (no user gesture yet)
//! - `Synth` - The back end failed to construct a synthesizer
//! - `ConfigError` - Invalid YAML engine configuration
//! - `SignalError` - Malformed signal payload on the bridge
//!
//! ## Usage
//! ```rust
//! use chime::{parse_pitch, EngineError};
//!
//! match parse_pitch("H2") {
//!     Ok(pitch) => println!("pitch {}", pitch),
//!     Err(EngineError::InvalidNote { token, message }) => {
//!         eprintln!("bad note '{}': {}", token, message);
//!     }
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A note token that could not be normalized.
    ///
    /// # Example
    /// ```
    /// # use chime::EngineError;
    /// let err = EngineError::InvalidNote {
    ///     token: "X9".to_string(),
    ///     message: "expected a pitch letter A-G".to_string(),
    /// };
    /// assert_eq!(err.to_string(), "Invalid note 'X9': expected a pitch letter A-G");
    /// ```
    #[error("Invalid note '{token}': {message}")]
    InvalidNote { token: String, message: String },

    /// The audio platform refused to start.
    ///
    /// Browsers and mobile hosts only unlock audio after a user gesture; until
    /// then every start attempt fails with this error and may be retried.
    #[error("Audio start denied: {0}")]
    AudioStartDenied(String),

    /// The back end could not build a synthesizer for a preset.
    #[error("Synthesizer error: {0}")]
    Synth(String),

    /// Invalid engine configuration.
    ///
    /// # Example
    /// ```
    /// # use chime::EngineError;
    /// let err = EngineError::ConfigError("volume must be between 0 and 1".to_string());
    /// assert_eq!(err.to_string(), "Invalid configuration: volume must be between 0 and 1");
    /// ```
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Malformed payload on the signal bridge.
    #[error("Invalid signal: {0}")]
    SignalError(String),
}
