//! # Engine Configuration
//!
//! Sessions are configured from a small YAML document. Everything is optional;
//! missing keys take the defaults shown here.
//!
//! ```yaml
//! instrument: default        # default | piano | bell
//! volume: 0.7                # master volume, 0..1
//! tempo: 150                 # BPM of a quarter note, or:
//! quarter-note: 0.4          # seconds per quarter note (wins over tempo)
//! velocity: 0.7              # default note velocity, 0..1
//! legacy-prefixes: [pitch_, sound_]
//! melodies:
//!   happy-birthday:
//!     quarter-note-ms: 600
//!     notes: [C4, C4, D4:h, C4:h]
//! ```
//!
//! An unknown instrument name is kept as written; the session falls back to
//! `default` when it applies it, like any other runtime instrument switch.
//!
//! ## Example
//! ```rust
//! use chime::EngineConfig;
//!
//! let config = EngineConfig::from_yaml("tempo: 120\ninstrument: bell").unwrap();
//! assert_eq!(config.quarter_note_seconds, 0.5);
//! assert_eq!(config.instrument, "bell");
//! ```

use std::collections::HashMap;

use serde::Deserialize;

use crate::adapter::{Melody, MelodyLibrary};
use crate::error::EngineError;
use crate::note::{NormalizeOptions, DEFAULT_VELOCITY, LEGACY_PREFIXES};

/// Seconds per quarter note when nothing else is configured
pub const DEFAULT_QUARTER_NOTE_SECONDS: f64 = 0.4;

/// Master volume when nothing else is configured
pub const DEFAULT_VOLUME: f32 = 0.7;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawConfig {
    instrument: Option<String>,
    volume: Option<f32>,
    tempo: Option<f64>,
    quarter_note: Option<f64>,
    velocity: Option<f32>,
    legacy_prefixes: Option<Vec<String>>,
    melodies: Option<HashMap<String, RawMelody>>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawMelody {
    quarter_note_ms: Option<u64>,
    #[serde(default)]
    notes: Vec<String>,
}

/// Validated engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub instrument: String,
    pub volume: f32,
    pub quarter_note_seconds: f64,
    pub velocity: f32,
    pub legacy_prefixes: Vec<String>,
    pub melodies: MelodyLibrary,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instrument: "default".to_string(),
            volume: DEFAULT_VOLUME,
            quarter_note_seconds: DEFAULT_QUARTER_NOTE_SECONDS,
            velocity: DEFAULT_VELOCITY,
            legacy_prefixes: LEGACY_PREFIXES.iter().map(|p| p.to_string()).collect(),
            melodies: MelodyLibrary::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a YAML configuration document.
    ///
    /// # Errors
    /// Returns [`EngineError::ConfigError`] for malformed YAML, unknown keys,
    /// non-positive tempo or quarter-note length, volume or velocity outside
    /// `0..=1`, or an empty legacy prefix.
    pub fn from_yaml(source: &str) -> Result<Self, EngineError> {
        // An empty document deserializes to unit, not to an empty map
        if source.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: RawConfig =
            serde_yaml::from_str(source).map_err(|e| EngineError::ConfigError(e.to_string()))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, EngineError> {
        let mut config = Self::default();

        if let Some(instrument) = raw.instrument {
            config.instrument = instrument;
        }

        if let Some(volume) = raw.volume {
            config.volume = unit_range("volume", volume)?;
        }

        if let Some(velocity) = raw.velocity {
            config.velocity = unit_range("velocity", velocity)?;
        }

        if let Some(bpm) = raw.tempo {
            config.quarter_note_seconds = quarter_note_from_bpm(bpm).ok_or_else(|| {
                EngineError::ConfigError(format!("tempo must be positive, got {}", bpm))
            })?;
        }

        if let Some(seconds) = raw.quarter_note {
            if !(seconds.is_finite() && seconds > 0.0) {
                return Err(EngineError::ConfigError(format!(
                    "quarter-note must be a positive number of seconds, got {}",
                    seconds
                )));
            }
            config.quarter_note_seconds = seconds;
        }

        if let Some(prefixes) = raw.legacy_prefixes {
            if prefixes.iter().any(|p| p.is_empty()) {
                return Err(EngineError::ConfigError(
                    "legacy-prefixes must not contain empty strings".to_string(),
                ));
            }
            config.legacy_prefixes = prefixes;
        }

        if let Some(melodies) = raw.melodies {
            for (id, melody) in melodies {
                if melody.quarter_note_ms == Some(0) {
                    return Err(EngineError::ConfigError(format!(
                        "melody '{}': quarter-note-ms must be positive",
                        id
                    )));
                }
                config.melodies.insert(
                    id,
                    Melody {
                        quarter_note_ms: melody.quarter_note_ms,
                        notes: melody.notes,
                    },
                );
            }
        }

        Ok(config)
    }

    /// Normalizer settings for a given base duration
    pub fn normalize_options(&self, base_duration_seconds: f64) -> NormalizeOptions {
        NormalizeOptions {
            base_duration_seconds,
            velocity: self.velocity,
            legacy_prefixes: self.legacy_prefixes.clone(),
        }
    }
}

/// Seconds per quarter note at `bpm`, or `None` for a non-positive tempo
pub fn quarter_note_from_bpm(bpm: f64) -> Option<f64> {
    if bpm.is_finite() && bpm > 0.0 {
        Some(60.0 / bpm)
    } else {
        None
    }
}

fn unit_range(key: &str, value: f32) -> Result<f32, EngineError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(EngineError::ConfigError(format!(
            "{} must be between 0 and 1, got {}",
            key, value
        )))
    }
}
