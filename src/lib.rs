//! Cancellable note sequencing for music-education activities.
//!
//! Turn note tokens such as `"C4"`, `"pitch_f#3"` or `"E4:h"` into timed
//! synthesizer triggers with per-note and completion callbacks, and stop any
//! sequence at any time.
//!
//! ```rust
//! use chime::note::normalize;
//!
//! let d = normalize("pitch_c4:h", 0.5);
//! assert_eq!(d.pitch().unwrap().to_string(), "C4");
//! assert_eq!(d.duration_seconds, 1.0);
//! ```

pub mod adapter;
pub mod bridge;
pub mod clock;
pub mod config;
pub mod error;
pub mod instrument;
pub mod note;
pub mod sequencer;
pub mod synth;
pub mod timeline;

pub use adapter::{play_audio_sequence, play_melody_sequence, AdapterHandle, AudioOptions, PlaybackStatus};
pub use bridge::{channel, Signal, SignalPort, SignalReceiver, SignalSender};
pub use clock::{Clock, SystemClock, VirtualClock};
pub use config::EngineConfig;
pub use error::*;
pub use instrument::InstrumentPreset;
pub use note::{normalize, parse_pitch, NoteDescriptor, Pitch};
pub use sequencer::{InitState, PlayOptions, SequenceHandle, SequenceId, SequenceState, Session};
pub use synth::{AudioBackend, BackendEvent, RecordingBackend, RecordingLog, Synthesizer};
