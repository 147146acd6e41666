//! Sequencer type definitions

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::Serialize;

use super::engine::Core;

/// Unique id of one `play_sequence` submission within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SequenceId(pub u64);

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq-{}", self.0)
    }
}

/// Lifecycle of a sequence
///
/// `Scheduled` until its first event fires, then `Playing`. It ends either
/// `Completed` (natural end) or `Stopped` (cancelled); both are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceState {
    Scheduled,
    Playing,
    Completed,
    Stopped,
}

impl SequenceState {
    pub fn is_finished(self) -> bool {
        matches!(self, SequenceState::Completed | SequenceState::Stopped)
    }
}

/// Session initialization state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InitState {
    Uninitialized,
    Initializing,
    Ready,
}

pub(crate) type NoteCallback = Box<dyn FnMut(&str, usize)>;
pub(crate) type CompleteCallback = Box<dyn FnMut()>;
pub(crate) type NoteTransform = Box<dyn Fn(&str) -> String>;

/// Options for [`Session::play_sequence`](super::Session::play_sequence)
///
/// # Example
/// ```rust
/// use chime::PlayOptions;
///
/// let options = PlayOptions::new()
///     .quarter_note(0.5)
///     .on_note_start(|token, index| println!("{} #{}", token, index))
///     .on_complete(|| println!("done"));
/// ```
#[derive(Default)]
pub struct PlayOptions {
    pub(crate) quarter_note_seconds: Option<f64>,
    pub(crate) bpm: Option<f64>,
    pub(crate) velocity: Option<f32>,
    pub(crate) on_note_start: Option<NoteCallback>,
    pub(crate) on_note_end: Option<NoteCallback>,
    pub(crate) on_complete: Option<CompleteCallback>,
    pub(crate) note_transform: Option<NoteTransform>,
}

impl PlayOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds per quarter note. Takes precedence over [`bpm`](Self::bpm).
    pub fn quarter_note(mut self, seconds: f64) -> Self {
        self.quarter_note_seconds = Some(seconds);
        self
    }

    /// Quarter-note tempo; base duration becomes `60 / bpm` seconds.
    pub fn bpm(mut self, bpm: f64) -> Self {
        self.bpm = Some(bpm);
        self
    }

    pub fn velocity(mut self, velocity: f32) -> Self {
        self.velocity = Some(velocity);
        self
    }

    /// Called with `(original_token, index)` when each token starts, rests included.
    pub fn on_note_start(mut self, f: impl FnMut(&str, usize) + 'static) -> Self {
        self.on_note_start = Some(Box::new(f));
        self
    }

    /// Called with `(original_token, index)` when each token ends, rests included.
    pub fn on_note_end(mut self, f: impl FnMut(&str, usize) + 'static) -> Self {
        self.on_note_end = Some(Box::new(f));
        self
    }

    /// Called once after the last token ends.
    pub fn on_complete(mut self, f: impl FnMut() + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Rewrites each token before normalization.
    pub fn note_transform(mut self, f: impl Fn(&str) -> String + 'static) -> Self {
        self.note_transform = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for PlayOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayOptions")
            .field("quarter_note_seconds", &self.quarter_note_seconds)
            .field("bpm", &self.bpm)
            .field("velocity", &self.velocity)
            .field("on_note_start", &self.on_note_start.is_some())
            .field("on_note_end", &self.on_note_end.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("note_transform", &self.note_transform.is_some())
            .finish()
    }
}

/// Lifecycle callbacks of one sequence, kept apart from the registry so they
/// can run without any session borrow held.
#[derive(Default)]
pub(crate) struct Callbacks {
    pub on_note_start: Option<NoteCallback>,
    pub on_note_end: Option<NoteCallback>,
    pub on_complete: Option<CompleteCallback>,
}

/// Caller's view of a submitted sequence
///
/// Dropping the handle does not stop playback. An inert handle (returned for
/// an empty token list) has no id and its `stop()` does nothing.
#[derive(Debug, Clone)]
pub struct SequenceHandle {
    id: Option<SequenceId>,
    core: Weak<RefCell<Core>>,
    state: Rc<Cell<SequenceState>>,
}

impl SequenceHandle {
    pub(crate) fn new(id: SequenceId, core: Weak<RefCell<Core>>, state: Rc<Cell<SequenceState>>) -> Self {
        Self {
            id: Some(id),
            core,
            state,
        }
    }

    pub(crate) fn inert() -> Self {
        Self {
            id: None,
            core: Weak::new(),
            state: Rc::new(Cell::new(SequenceState::Completed)),
        }
    }

    pub fn id(&self) -> Option<SequenceId> {
        self.id
    }

    pub fn state(&self) -> SequenceState {
        self.state.get()
    }

    pub fn is_inert(&self) -> bool {
        self.id.is_none()
    }

    /// Cancel everything this sequence has not fired yet.
    ///
    /// Idempotent, a no-op after completion, and safe to call from inside
    /// this or any other sequence's callbacks.
    pub fn stop(&self) {
        let (Some(id), Some(core)) = (self.id, self.core.upgrade()) else {
            return;
        };
        core.borrow_mut().cancel(id);
    }
}
