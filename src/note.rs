//! # Note Parser / Normalizer
//!
//! Turns caller-supplied note tokens into canonical [`NoteDescriptor`]s.
//!
//! ## Token Forms
//! ```text
//! "C4"        pitch with octave
//! "C"         pitch without octave (octave 4)
//! "F#5" "Bb3" pitch with accidental
//! "C4:h"      pitch with duration modifier
//! "r" "rest"  rest (case-insensitive, also "r:h", "r2", ...)
//! "pitch_c4"  legacy-prefixed pitch (prefix stripped before validation)
//! ```
//!
//! ## Duration Modifiers
//! | Modifier | Multiplier | Meaning        |
//! |----------|------------|----------------|
//! | (none)   | 1.0        | quarter note   |
//! | `h`      | 2.0        | half note      |
//! | `w`      | 4.0        | whole note     |
//! | `8`      | 0.5        | eighth note    |
//! | `16`     | 0.25       | sixteenth note |
//!
//! ## Failure Mode
//! A token that still fails validation after prefix stripping yields a
//! descriptor of kind [`NoteKind::Invalid`]. It keeps its slot and duration in
//! the timeline but makes no sound, so one bad note never cancels a melody.
//!
//! ## Example
//! ```rust
//! use chime::note::normalize;
//!
//! let half = normalize("C4:h", 0.4);
//! assert_eq!(half.pitch().map(|p| p.to_string()), Some("C4".to_string()));
//! assert!((half.duration_seconds - 0.8).abs() < 1e-9);
//!
//! let bare = normalize("C", 0.4);
//! assert_eq!(bare.pitch().map(|p| p.to_string()), Some("C4".to_string()));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::warn;

use crate::error::EngineError;

/// Octave used when a token names only a pitch class.
pub const DEFAULT_OCTAVE: u8 = 4;

/// Velocity used when neither the caller nor the config sets one.
pub const DEFAULT_VELOCITY: f32 = 0.7;

/// Prefixes that calling code historically put in front of note names.
pub const LEGACY_PREFIXES: [&str; 2] = ["pitch_", "sound_"];

/// Pitch letter (A-G)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Letter {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Letter {
    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'C' => Some(Letter::C),
            'D' => Some(Letter::D),
            'E' => Some(Letter::E),
            'F' => Some(Letter::F),
            'G' => Some(Letter::G),
            'A' => Some(Letter::A),
            'B' => Some(Letter::B),
            _ => None,
        }
    }

    /// Semitones above C
    pub fn semitone(self) -> i32 {
        match self {
            Letter::C => 0,
            Letter::D => 2,
            Letter::E => 4,
            Letter::F => 5,
            Letter::G => 7,
            Letter::A => 9,
            Letter::B => 11,
        }
    }

    fn as_char(self) -> char {
        match self {
            Letter::C => 'C',
            Letter::D => 'D',
            Letter::E => 'E',
            Letter::F => 'F',
            Letter::G => 'G',
            Letter::A => 'A',
            Letter::B => 'B',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Accidental {
    Natural,
    Sharp,
    Flat,
}

impl Accidental {
    fn offset(self) -> i32 {
        match self {
            Accidental::Natural => 0,
            Accidental::Sharp => 1,
            Accidental::Flat => -1,
        }
    }
}

/// A concrete pitch: letter, accidental and octave (scientific pitch notation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pitch {
    pub letter: Letter,
    pub accidental: Accidental,
    pub octave: u8,
}

impl Pitch {
    pub fn new(letter: Letter, accidental: Accidental, octave: u8) -> Self {
        Self {
            letter,
            accidental,
            octave,
        }
    }

    /// MIDI note number (C4 = 60).
    ///
    /// Cb0 has no MIDI number and saturates at 0.
    pub fn midi_note(&self) -> u8 {
        let n = (self.octave as i32 + 1) * 12 + self.letter.semitone() + self.accidental.offset();
        n.clamp(0, 127) as u8
    }

    /// Equal-tempered frequency in Hz (A4 = 440).
    pub fn frequency(&self) -> f64 {
        440.0 * 2f64.powf((self.midi_note() as f64 - 69.0) / 12.0)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let acc = match self.accidental {
            Accidental::Natural => "",
            Accidental::Sharp => "#",
            Accidental::Flat => "b",
        };
        write!(f, "{}{}{}", self.letter.as_char(), acc, self.octave)
    }
}

impl Serialize for Pitch {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for Pitch {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_pitch(s)
    }
}

/// Strictly parse a pitch name such as `C4`, `f#`, `Bb3`.
///
/// Legacy prefixes are not stripped here; see [`normalize_with`] for the
/// tolerant path. A missing octave defaults to 4.
pub fn parse_pitch(s: &str) -> Result<Pitch, EngineError> {
    let invalid = |message: &str| EngineError::InvalidNote {
        token: s.to_string(),
        message: message.to_string(),
    };

    let mut chars = s.chars().peekable();
    let letter = chars
        .next()
        .and_then(Letter::from_char)
        .ok_or_else(|| invalid("expected a pitch letter A-G"))?;

    let accidental = match chars.peek() {
        Some('#') => {
            chars.next();
            Accidental::Sharp
        }
        Some('b') | Some('B') => {
            chars.next();
            Accidental::Flat
        }
        _ => Accidental::Natural,
    };

    let octave = match chars.next() {
        None => DEFAULT_OCTAVE,
        Some(c) => match c.to_digit(10) {
            Some(d) if d <= 8 => d as u8,
            _ => return Err(invalid("octave must be a single digit 0-8")),
        },
    };

    if chars.next().is_some() {
        return Err(invalid("unexpected characters after octave"));
    }

    Ok(Pitch::new(letter, accidental, octave))
}

/// Duration modifier suffix (`C4:h`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationModifier {
    Quarter,
    Half,
    Whole,
    Eighth,
    Sixteenth,
}

impl DurationModifier {
    pub fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "" => Some(DurationModifier::Quarter),
            "h" => Some(DurationModifier::Half),
            "w" => Some(DurationModifier::Whole),
            "8" => Some(DurationModifier::Eighth),
            "16" => Some(DurationModifier::Sixteenth),
            _ => None,
        }
    }

    /// Multiplier applied to the base (quarter note) duration
    pub fn multiplier(self) -> f64 {
        match self {
            DurationModifier::Quarter => 1.0,
            DurationModifier::Half => 2.0,
            DurationModifier::Whole => 4.0,
            DurationModifier::Eighth => 0.5,
            DurationModifier::Sixteenth => 0.25,
        }
    }
}

/// What a descriptor sounds like.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "pitch")]
pub enum NoteKind {
    Pitched(Pitch),
    Rest,
    /// Token failed validation; behaves as a silent rest.
    Invalid,
}

/// Canonical, engine-owned form of one token.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDescriptor {
    pub original_token: String,
    pub kind: NoteKind,
    pub duration_seconds: f64,
    pub velocity: f32,
}

impl NoteDescriptor {
    pub fn pitch(&self) -> Option<&Pitch> {
        match &self.kind {
            NoteKind::Pitched(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_rest(&self) -> bool {
        !matches!(self.kind, NoteKind::Pitched(_))
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self.kind, NoteKind::Invalid)
    }
}

/// Knobs for [`normalize_with`].
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub base_duration_seconds: f64,
    pub velocity: f32,
    pub legacy_prefixes: Vec<String>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            base_duration_seconds: 0.4,
            velocity: DEFAULT_VELOCITY,
            legacy_prefixes: LEGACY_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl NormalizeOptions {
    pub fn with_base(base_duration_seconds: f64) -> Self {
        Self {
            base_duration_seconds,
            ..Default::default()
        }
    }
}

/// Normalize a token with the default prefixes and velocity.
pub fn normalize(token: &str, base_duration_seconds: f64) -> NoteDescriptor {
    normalize_with(token, &NormalizeOptions::with_base(base_duration_seconds))
}

/// Normalize a token into a descriptor. Never fails; see the module docs.
pub fn normalize_with(token: &str, opts: &NormalizeOptions) -> NoteDescriptor {
    let trimmed = token.trim();
    let (head, modifier) = match trimmed.split_once(':') {
        Some((head, modifier)) => (head, modifier),
        None => (trimmed, ""),
    };

    let multiplier = match DurationModifier::from_suffix(modifier) {
        Some(m) => m.multiplier(),
        None => {
            warn!(token, modifier, "unknown duration modifier, using a quarter note");
            1.0
        }
    };

    let head = strip_legacy_prefix(head, &opts.legacy_prefixes);

    let kind = if is_rest_marker(head) {
        NoteKind::Rest
    } else {
        match parse_pitch(head) {
            Ok(pitch) => NoteKind::Pitched(pitch),
            Err(e) => {
                warn!(token, error = %e, "invalid note, treating it as a silent rest");
                NoteKind::Invalid
            }
        }
    };

    let velocity = if opts.velocity.is_finite() {
        opts.velocity.clamp(0.0, 1.0)
    } else {
        warn!(token, velocity = opts.velocity, "invalid velocity, using the default");
        DEFAULT_VELOCITY
    };

    NoteDescriptor {
        original_token: token.to_string(),
        kind,
        duration_seconds: opts.base_duration_seconds * multiplier,
        velocity,
    }
}

fn strip_legacy_prefix<'a>(head: &'a str, prefixes: &[String]) -> &'a str {
    for prefix in prefixes {
        if let Some(rest) = head.strip_prefix(prefix.as_str()) {
            return rest;
        }
    }
    head
}

/// `r`, `rest`, or `r` followed by a non-alphabetic character.
fn is_rest_marker(head: &str) -> bool {
    let lower = head.to_ascii_lowercase();
    if lower == "r" || lower == "rest" {
        return true;
    }
    let mut chars = lower.chars();
    chars.next() == Some('r') && chars.next().is_some_and(|c| !c.is_alphabetic())
}
