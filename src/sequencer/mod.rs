//! # Sequencer Module
//!
//! Realize note sequences as timed synthesizer triggers and lifecycle callbacks.
//!
//! ## Purpose
//! Callers hand over a melody as note tokens. The sequencer:
//! 1. **Normalizes** every token into a descriptor (pitch, duration, velocity)
//! 2. **Schedules** a trigger, a start and an end callback per descriptor, plus
//!    one completion callback, on the session's timeline
//! 3. **Tracks** the sequence in the session registry until it completes or is
//!    stopped
//!
//! ## Sub-modules
//! - `types` - SequenceId, SequenceState, PlayOptions, SequenceHandle
//! - `engine` - Session: initialization, instruments, volume, scheduling, dispatch
//!
//! ## Key Types
//! - [`Session`] - The engine: one audio resource, one instrument, many sequences
//! - [`PlayOptions`] - Tempo, velocity, callbacks and token transform for one sequence
//! - [`SequenceHandle`] - Opaque handle with `stop()` and a read-only state
//!
//! ## Example
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use chime::{PlayOptions, RecordingBackend, Session, VirtualClock};
//!
//! let clock = VirtualClock::new();
//! let mut session = Session::new(RecordingBackend::new(), clock.clone());
//!
//! let started = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&started);
//! let handle = session.play_sequence(
//!     &["C4", "r", "E4"],
//!     PlayOptions::new()
//!         .quarter_note(0.3)
//!         .on_note_start(move |token, _| sink.borrow_mut().push(token.to_string())),
//! );
//!
//! clock.advance(0.35);
//! session.tick();
//! handle.stop();
//! session.run_until_idle(&clock);
//!
//! assert_eq!(*started.borrow(), vec!["C4", "r"]);
//! ```
//!
//! ## Timing
//!
//! Time is whatever the session's [`Clock`](crate::Clock) says, in seconds.
//! Entries are only dispatched by [`Session::tick`]; with a
//! [`VirtualClock`](crate::VirtualClock) tests decide exactly when that
//! happens, with a [`SystemClock`](crate::SystemClock) the host loop ticks as
//! real time passes.
//!
//! ## Related Modules
//! - `note` - Token normalization
//! - `timeline` - The priority queue entries live in
//! - `synth` - The back end seam triggers go through

mod engine;
mod types;


pub use engine::Session;
pub use types::{InitState, PlayOptions, SequenceHandle, SequenceId, SequenceState};
