//! # Melody Adapter
//!
//! The call shape activity code uses: quarter notes given in milliseconds, a
//! context label for logging, and a shared [`PlaybackStatus`] that the UI reads
//! to show whether something is playing and which key to highlight.
//!
//! ## Entry Points
//! - [`play_audio_sequence()`] - play tokens with millisecond timing and status upkeep
//! - [`play_melody_sequence()`] - same, with the quarter-note length looked up
//!   per melody in a [`MelodyLibrary`]
//!
//! ## Example
//! ```rust
//! use chime::adapter::{play_audio_sequence, AudioOptions, PlaybackStatus};
//! use chime::{RecordingBackend, Session, VirtualClock};
//!
//! let clock = VirtualClock::new();
//! let mut session = Session::new(RecordingBackend::new(), clock.clone());
//! let status = PlaybackStatus::new();
//!
//! play_audio_sequence(&mut session, &status, &["C4", "E4"], "match", AudioOptions::default());
//! assert!(status.is_playing());
//!
//! session.run_until_idle(&clock);
//! assert!(!status.is_playing());
//! assert_eq!(status.highlighted_note(), None);
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{info, warn};

use crate::sequencer::{PlayOptions, SequenceHandle, Session};

/// Quarter-note length used by activities unless a melody says otherwise
pub const DEFAULT_QUARTER_NOTE_MS: u64 = 700;

#[derive(Debug, Default)]
struct StatusInner {
    is_playing: bool,
    highlighted: Option<String>,
}

/// Playback state shared with the UI. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct PlaybackStatus {
    inner: Rc<RefCell<StatusInner>>,
}

impl PlaybackStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.inner.borrow().is_playing
    }

    /// Token of the note currently highlighted on the keyboard
    pub fn highlighted_note(&self) -> Option<String> {
        self.inner.borrow().highlighted.clone()
    }

    fn set_playing(&self, playing: bool) {
        self.inner.borrow_mut().is_playing = playing;
    }

    fn highlight(&self, note: Option<&str>) {
        self.inner.borrow_mut().highlighted = note.map(str::to_string);
    }

    fn reset(&self, clear_highlight: bool) {
        let mut inner = self.inner.borrow_mut();
        inner.is_playing = false;
        if clear_highlight {
            inner.highlighted = None;
        }
    }
}

type NoteHook = Box<dyn FnMut(&str, usize)>;
type DoneHook = Box<dyn FnMut()>;

/// Options for [`play_audio_sequence`]
pub struct AudioOptions {
    pub quarter_note_ms: u64,
    pub highlight_keys: bool,
    pub on_note_start: Option<NoteHook>,
    pub on_note_end: Option<NoteHook>,
    pub on_complete: Option<DoneHook>,
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            quarter_note_ms: DEFAULT_QUARTER_NOTE_MS,
            highlight_keys: true,
            on_note_start: None,
            on_note_end: None,
            on_complete: None,
        }
    }
}

impl AudioOptions {
    pub fn quarter_note_ms(mut self, ms: u64) -> Self {
        self.quarter_note_ms = ms;
        self
    }

    pub fn highlight_keys(mut self, highlight: bool) -> Self {
        self.highlight_keys = highlight;
        self
    }

    pub fn on_note_start(mut self, f: impl FnMut(&str, usize) + 'static) -> Self {
        self.on_note_start = Some(Box::new(f));
        self
    }

    pub fn on_note_end(mut self, f: impl FnMut(&str, usize) + 'static) -> Self {
        self.on_note_end = Some(Box::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl FnMut() + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }
}

/// Handle returned by the adapter
#[derive(Debug, Clone)]
pub struct AdapterHandle {
    sequence: SequenceHandle,
    status: Option<PlaybackStatus>,
    context: String,
    clear_highlight: bool,
}

impl AdapterHandle {
    fn inert() -> Self {
        Self {
            sequence: SequenceHandle::inert(),
            status: None,
            context: String::new(),
            clear_highlight: false,
        }
    }

    pub fn sequence(&self) -> &SequenceHandle {
        &self.sequence
    }

    /// Stop the sequence and reset the status. Does nothing once the sequence
    /// has finished, so a newer playback sharing the status is left alone.
    pub fn stop(&self) {
        let Some(status) = &self.status else {
            return;
        };
        if self.sequence.state().is_finished() {
            return;
        }
        self.sequence.stop();
        status.reset(self.clear_highlight);
        info!(context = %self.context, "sequence aborted");
    }
}

/// Play `notes` with activity conventions.
///
/// Marks `status` as playing, highlights each note as it starts (unless
/// disabled), and clears both when the melody completes. An empty melody logs
/// a warning and returns an inert handle without touching `status`.
pub fn play_audio_sequence<S: AsRef<str>>(
    session: &mut Session,
    status: &PlaybackStatus,
    notes: &[S],
    context: &str,
    options: AudioOptions,
) -> AdapterHandle {
    if notes.is_empty() {
        warn!(context, "tried to play an empty note list");
        return AdapterHandle::inert();
    }

    let AudioOptions {
        quarter_note_ms,
        highlight_keys,
        mut on_note_start,
        on_note_end,
        mut on_complete,
    } = options;

    status.set_playing(true);
    info!(
        context,
        notes = notes.len(),
        quarter_note_ms,
        "playing sequence"
    );

    let start_status = status.clone();
    let done_status = status.clone();
    let done_context = context.to_string();

    let mut play = PlayOptions::new()
        .quarter_note(quarter_note_ms as f64 / 1000.0)
        .on_note_start(move |token, index| {
            if highlight_keys {
                start_status.highlight(Some(token));
            }
            if let Some(f) = on_note_start.as_mut() {
                f(token, index);
            }
        })
        .on_complete(move || {
            done_status.reset(highlight_keys);
            if let Some(f) = on_complete.as_mut() {
                f();
            }
            info!(context = %done_context, "sequence finished");
        });
    if let Some(mut f) = on_note_end {
        play = play.on_note_end(move |token, index| f(token, index));
    }

    let sequence = session.play_sequence(notes, play);
    AdapterHandle {
        sequence,
        status: Some(status.clone()),
        context: context.to_string(),
        clear_highlight: highlight_keys,
    }
}

/// A named melody known to the activities
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Melody {
    pub quarter_note_ms: Option<u64>,
    pub notes: Vec<String>,
}

/// Melodies by id
#[derive(Debug, Clone, Default)]
pub struct MelodyLibrary {
    melodies: HashMap<String, Melody>,
}

impl MelodyLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, melody: Melody) {
        self.melodies.insert(id.into(), melody);
    }

    pub fn get(&self, id: &str) -> Option<&Melody> {
        self.melodies.get(id)
    }

    pub fn len(&self) -> usize {
        self.melodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.melodies.is_empty()
    }

    /// Quarter-note length for `id`, or the activity default
    pub fn quarter_note_ms(&self, id: Option<&str>) -> u64 {
        id.and_then(|id| self.get(id))
            .and_then(|m| m.quarter_note_ms)
            .unwrap_or(DEFAULT_QUARTER_NOTE_MS)
    }
}

/// Play a melody at its own tempo.
///
/// The quarter-note length comes from `library` when `melody_id` names a
/// melody that defines one, otherwise [`DEFAULT_QUARTER_NOTE_MS`].
pub fn play_melody_sequence<S: AsRef<str>>(
    session: &mut Session,
    status: &PlaybackStatus,
    notes: &[S],
    context: &str,
    melody_id: Option<&str>,
    library: &MelodyLibrary,
) -> AdapterHandle {
    if notes.is_empty() {
        warn!(context, "tried to play an empty melody");
        return AdapterHandle::inert();
    }

    let quarter_note_ms = library.quarter_note_ms(melody_id);
    if let Some(id) = melody_id {
        info!(context, melody = id, quarter_note_ms, "playing melody");
    }

    play_audio_sequence(
        session,
        status,
        notes,
        context,
        AudioOptions::default().quarter_note_ms(quarter_note_ms),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, VirtualClock};
    use crate::sequencer::SequenceState;
    use crate::synth::RecordingBackend;

    fn setup() -> (Session, VirtualClock) {
        let clock = VirtualClock::new();
        (Session::new(RecordingBackend::new(), clock.clone()), clock)
    }

    #[test]
    fn test_status_follows_playback() {
        let (mut session, clock) = setup();
        let status = PlaybackStatus::new();
        let starts = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&starts);

        let options = AudioOptions::default()
            .quarter_note_ms(500)
            .on_note_start(move |token, index| sink.borrow_mut().push((token.to_string(), index)));
        play_audio_sequence(&mut session, &status, &["C4", "E4"], "draw", options);
        assert!(status.is_playing());
        assert_eq!(status.highlighted_note(), None);

        clock.set(0.6);
        session.tick();
        assert_eq!(status.highlighted_note(), Some("E4".to_string()));

        session.run_until_idle(&clock);
        assert!(!status.is_playing());
        assert_eq!(status.highlighted_note(), None);
        assert_eq!(clock.now(), 1.0);
        assert_eq!(
            *starts.borrow(),
            vec![("C4".to_string(), 0), ("E4".to_string(), 1)]
        );
    }

    #[test]
    fn test_stop_resets_status() {
        let (mut session, clock) = setup();
        let status = PlaybackStatus::new();
        let completed = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&completed);

        let handle = play_audio_sequence(
            &mut session,
            &status,
            &["C4", "E4", "G4"],
            "match",
            AudioOptions::default().on_complete(move || *flag.borrow_mut() = true),
        );
        clock.set(0.1);
        session.tick();
        assert_eq!(status.highlighted_note(), Some("C4".to_string()));

        handle.stop();
        assert!(!status.is_playing());
        assert_eq!(status.highlighted_note(), None);
        assert_eq!(handle.sequence().state(), SequenceState::Stopped);

        session.run_until_idle(&clock);
        assert!(!*completed.borrow());
    }

    #[test]
    fn test_stale_handle_leaves_newer_playback_alone() {
        let (mut session, clock) = setup();
        let status = PlaybackStatus::new();

        let first = play_audio_sequence(&mut session, &status, &["C4"], "match", AudioOptions::default());
        session.run_until_idle(&clock);
        assert_eq!(first.sequence().state(), SequenceState::Completed);

        let second = play_audio_sequence(&mut session, &status, &["E4", "G4"], "match", AudioOptions::default());
        clock.advance(0.1);
        session.tick();
        first.stop();
        assert!(status.is_playing());
        assert_eq!(status.highlighted_note(), Some("E4".to_string()));
        assert_eq!(second.sequence().state(), SequenceState::Playing);
    }

    #[test]
    fn test_without_highlighting() {
        let (mut session, clock) = setup();
        let status = PlaybackStatus::new();
        play_audio_sequence(
            &mut session,
            &status,
            &["C4"],
            "memory",
            AudioOptions::default().highlight_keys(false),
        );
        clock.set(0.1);
        session.tick();
        assert_eq!(status.highlighted_note(), None);
    }

    #[test]
    fn test_empty_input_is_inert() {
        let (mut session, _clock) = setup();
        let status = PlaybackStatus::new();
        let handle = play_audio_sequence::<&str>(&mut session, &status, &[], "draw", AudioOptions::default());
        handle.stop();
        assert!(handle.sequence().is_inert());
        assert!(!status.is_playing());

        let library = MelodyLibrary::new();
        let handle = play_melody_sequence::<&str>(&mut session, &status, &[], "judgment", None, &library);
        assert!(handle.sequence().is_inert());
    }

    #[test]
    fn test_melody_tempo_lookup() {
        let (mut session, clock) = setup();
        let status = PlaybackStatus::new();
        let mut library = MelodyLibrary::new();
        library.insert(
            "happy-birthday",
            Melody {
                quarter_note_ms: Some(600),
                notes: vec!["C4".to_string(), "C4".to_string(), "D4:h".to_string()],
            },
        );
        library.insert("no-tempo", Melody::default());

        assert_eq!(library.quarter_note_ms(Some("happy-birthday")), 600);
        assert_eq!(library.quarter_note_ms(Some("no-tempo")), DEFAULT_QUARTER_NOTE_MS);
        assert_eq!(library.quarter_note_ms(Some("missing")), DEFAULT_QUARTER_NOTE_MS);
        assert_eq!(library.quarter_note_ms(None), DEFAULT_QUARTER_NOTE_MS);

        let notes = library.get("happy-birthday").unwrap().notes.clone();
        play_melody_sequence(&mut session, &status, notes.as_slice(), "judgment", Some("happy-birthday"), &library);
        session.run_until_idle(&clock);
        // 600 + 600 + 1200 ms
        assert!((clock.now() - 2.4).abs() < 1e-9);
        assert!(!status.is_playing());
    }
}
