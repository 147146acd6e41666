//! Session and sequence scheduling engine
//!
//! A [`Session`] owns the audio back end, the active synthesizer, the clock
//! and a registry of in-flight sequences. Submitting a sequence normalizes
//! every token up front, lays the descriptors end to end on the timeline and
//! returns a [`SequenceHandle`]. Nothing fires until [`Session::tick`] is
//! called; each tick dispatches every entry that is due on the clock.
//!
//! ## Timeline Layout
//! For each descriptor `i` starting at offset `t` with duration `d`, entries
//! are added in this order:
//! 1. `Trigger(i)` at `t` (non-rests only)
//! 2. `NoteStart(i)` at `t`
//! 3. `NoteEnd(i)` at `t + d`
//!
//! and a single `Complete` after the last descriptor. Equal-time entries fire
//! in insertion order, so `NoteEnd(i)` always precedes `NoteStart(i + 1)`.
//!
//! ## Borrowing
//! The registry lives in an `Rc<RefCell<Core>>` shared with every handle.
//! Dispatch pops one entry at a time and releases the borrow before running a
//! user callback, which is what lets callbacks call `stop()` on any handle.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, error, info, warn};

use super::types::{
    Callbacks, InitState, PlayOptions, SequenceHandle, SequenceId, SequenceState,
};
use crate::clock::{Clock, VirtualClock};
use crate::config::{quarter_note_from_bpm, EngineConfig};
use crate::instrument::InstrumentPreset;
use crate::note::{normalize_with, NoteDescriptor};
use crate::synth::{gain_to_db, AudioBackend, Synthesizer};
use crate::timeline::{Action, Timeline};

/// One registered sequence
struct Sequence {
    descriptors: Vec<NoteDescriptor>,
    start_time: f64,
    state: Rc<Cell<SequenceState>>,
    callbacks: Rc<RefCell<Callbacks>>,
}

/// A callback to run once the core borrow is released
enum Fired {
    Silent,
    NoteStart(Rc<RefCell<Callbacks>>, String, usize),
    NoteEnd(Rc<RefCell<Callbacks>>, String, usize),
    Complete(Rc<RefCell<Callbacks>>),
}

impl Fired {
    fn run(self) {
        match self {
            Fired::Silent => {}
            Fired::NoteStart(callbacks, token, index) => {
                if let Some(f) = callbacks.borrow_mut().on_note_start.as_mut() {
                    f(&token, index);
                }
            }
            Fired::NoteEnd(callbacks, token, index) => {
                if let Some(f) = callbacks.borrow_mut().on_note_end.as_mut() {
                    f(&token, index);
                }
            }
            Fired::Complete(callbacks) => {
                if let Some(f) = callbacks.borrow_mut().on_complete.as_mut() {
                    f();
                }
            }
        }
    }
}

/// State shared between a session and its handles
#[derive(Default)]
pub(crate) struct Core {
    timeline: Timeline,
    sequences: HashMap<SequenceId, Sequence>,
    synth: Option<Box<dyn Synthesizer>>,
}

impl Core {
    /// Stop one sequence. Returns false if it was not registered.
    pub(crate) fn cancel(&mut self, id: SequenceId) -> bool {
        let Some(sequence) = self.sequences.remove(&id) else {
            return false;
        };
        let dropped = self.timeline.cancel(id);
        sequence.state.set(SequenceState::Stopped);
        info!(sequence = %id, dropped, "sequence stopped");
        true
    }

    fn cancel_all(&mut self) -> usize {
        let count = self.sequences.len();
        for (id, sequence) in self.sequences.drain() {
            sequence.state.set(SequenceState::Stopped);
            debug!(sequence = %id, "sequence stopped");
        }
        // Every entry belongs to a registered sequence
        self.timeline.clear();
        count
    }

    /// Pop the next due entry, performing synth work in place
    fn next_due(&mut self, now: f64) -> Option<Fired> {
        let entry = self.timeline.pop_due(now)?;
        let Some(sequence) = self.sequences.get(&entry.sequence) else {
            return Some(Fired::Silent);
        };
        if sequence.state.get() == SequenceState::Scheduled {
            sequence.state.set(SequenceState::Playing);
        }

        let fired = match entry.action {
            Action::Trigger { index } => {
                let descriptor = &sequence.descriptors[index];
                if let Some(pitch) = descriptor.pitch() {
                    match self.synth.as_mut() {
                        Some(synth) => {
                            synth.trigger_attack_release(
                                pitch,
                                descriptor.duration_seconds,
                                entry.at,
                                descriptor.velocity,
                            );
                            debug!(
                                sequence = %entry.sequence,
                                position = index + 1,
                                of = sequence.descriptors.len(),
                                pitch = %pitch,
                                "note"
                            );
                        }
                        None => debug!(sequence = %entry.sequence, pitch = %pitch, "no synth, note is silent"),
                    }
                }
                Fired::Silent
            }
            Action::NoteStart { index } => {
                let descriptor = &sequence.descriptors[index];
                if descriptor.is_rest() {
                    debug!(sequence = %entry.sequence, position = index + 1, "rest");
                }
                Fired::NoteStart(
                    Rc::clone(&sequence.callbacks),
                    descriptor.original_token.clone(),
                    index,
                )
            }
            Action::NoteEnd { index } => Fired::NoteEnd(
                Rc::clone(&sequence.callbacks),
                sequence.descriptors[index].original_token.clone(),
                index,
            ),
            Action::Complete => {
                // Leave the registry in the same step that reports completion
                let Some(sequence) = self.sequences.remove(&entry.sequence) else {
                    return Some(Fired::Silent);
                };
                sequence.state.set(SequenceState::Completed);
                info!(
                    sequence = %entry.sequence,
                    elapsed = entry.at - sequence.start_time,
                    "sequence completed"
                );
                Fired::Complete(sequence.callbacks)
            }
        };
        Some(fired)
    }
}

/// The engine session: one audio resource, one active instrument, many sequences
///
/// # Example
/// ```rust
/// use chime::{Clock, PlayOptions, RecordingBackend, Session, VirtualClock};
///
/// let backend = RecordingBackend::new();
/// let log = backend.log();
/// let clock = VirtualClock::new();
/// let mut session = Session::new(backend, clock.clone());
///
/// session.play_sequence(&["C4", "E4", "G4"], PlayOptions::new().quarter_note(0.5));
/// session.run_until_idle(&clock);
///
/// assert_eq!(log.borrow().triggers().len(), 3);
/// assert_eq!(clock.now(), 1.5);
/// ```
pub struct Session {
    backend: Box<dyn AudioBackend>,
    clock: Box<dyn Clock>,
    config: EngineConfig,
    init: InitState,
    instrument: InstrumentPreset,
    volume: f32,
    core: Rc<RefCell<Core>>,
    next_id: u64,
}

impl Session {
    pub fn new(backend: impl AudioBackend + 'static, clock: impl Clock + 'static) -> Self {
        Self::with_config(backend, clock, EngineConfig::default())
    }

    pub fn with_config(
        backend: impl AudioBackend + 'static,
        clock: impl Clock + 'static,
        config: EngineConfig,
    ) -> Self {
        let instrument = InstrumentPreset::resolve(&config.instrument);
        let volume = config.volume.clamp(0.0, 1.0);
        Self {
            backend: Box::new(backend),
            clock: Box::new(clock),
            config,
            init: InitState::Uninitialized,
            instrument,
            volume,
            core: Rc::new(RefCell::new(Core::default())),
            next_id: 1,
        }
    }

    /// Start audio and build the active instrument's synth.
    ///
    /// Idempotent: a ready (or initializing) session does nothing. If the
    /// platform refuses to start audio the error is logged and the session
    /// stays uninitialized, so a later call can retry. Returns whether the
    /// session is ready.
    pub fn initialize(&mut self) -> bool {
        match self.init {
            InitState::Ready => return true,
            InitState::Initializing => return false,
            InitState::Uninitialized => {}
        }

        self.init = InitState::Initializing;
        if let Err(e) = self.backend.start() {
            error!(error = %e, "audio start failed, session stays uninitialized");
            self.init = InitState::Uninitialized;
            return false;
        }
        info!("audio started");

        self.build_synth();
        self.init = InitState::Ready;
        info!(instrument = %self.instrument, "session initialized");
        true
    }

    pub fn state(&self) -> InitState {
        self.init
    }

    pub fn is_ready(&self) -> bool {
        self.init == InitState::Ready
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn instrument(&self) -> InstrumentPreset {
        self.instrument
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Current clock time in seconds
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Switch the active preset. Unknown names fall back to `default`.
    ///
    /// All sequences are stopped before the old synth is disposed, so no
    /// pending trigger can reach a disposed synth. Before initialization the
    /// preset is only recorded and gets built by [`initialize`](Self::initialize).
    pub fn set_instrument(&mut self, name: &str) -> InstrumentPreset {
        let preset = InstrumentPreset::resolve(name);
        let stopped = self.stop_all_sequences();
        if stopped > 0 {
            debug!(stopped, "stopped sequences before instrument switch");
        }
        self.instrument = preset;
        if self.is_ready() {
            self.build_synth();
        }
        info!(instrument = %preset, "instrument set");
        preset
    }

    /// Set master volume, clamped to `0..=1`, applied immediately.
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        let db = gain_to_db(self.volume as f64);
        if let Some(synth) = self.core.borrow_mut().synth.as_mut() {
            synth.set_volume_db(db);
        }
        info!(volume = self.volume, "volume set");
    }

    /// Play one note right now, initializing first if needed.
    ///
    /// Returns whether a note was triggered. Rests, invalid tokens and a
    /// refused audio start all end in silence, never in an error.
    pub fn play_note(&mut self, token: &str, duration_seconds: f64, velocity: f32) -> bool {
        if !self.is_ready() && !self.initialize() {
            warn!(token, "audio unavailable, note dropped");
            return false;
        }

        let duration = if duration_seconds.is_finite() && duration_seconds > 0.0 {
            duration_seconds
        } else {
            warn!(token, duration_seconds, "invalid note duration, using a quarter note");
            self.config.quarter_note_seconds
        };
        let mut opts = self.config.normalize_options(duration);
        opts.velocity = velocity;
        let descriptor = normalize_with(token, &opts);

        let Some(pitch) = descriptor.pitch() else {
            if !descriptor.is_invalid() {
                debug!(token, "rest requested, nothing to play");
            }
            return false;
        };

        let now = self.clock.now();
        let mut core = self.core.borrow_mut();
        let Some(synth) = core.synth.as_mut() else {
            warn!(token, "no synth available, note dropped");
            return false;
        };
        synth.trigger_attack_release(pitch, descriptor.duration_seconds, now, descriptor.velocity);
        info!(pitch = %pitch, token, duration = descriptor.duration_seconds, "note played");
        true
    }

    /// Schedule a melody and return its handle.
    ///
    /// An empty token list returns an inert handle and schedules nothing.
    /// Otherwise every token is normalized now, and the sequence's triggers and
    /// callbacks are placed on the timeline relative to the current clock time.
    pub fn play_sequence<S: AsRef<str>>(&mut self, tokens: &[S], options: PlayOptions) -> SequenceHandle {
        if tokens.is_empty() {
            warn!("empty note sequence, nothing to play");
            return SequenceHandle::inert();
        }

        if !self.is_ready() {
            self.initialize();
        }

        let base = self.base_duration(&options);
        let mut opts = self.config.normalize_options(base);
        if let Some(velocity) = options.velocity {
            opts.velocity = velocity;
        }

        let descriptors: Vec<NoteDescriptor> = tokens
            .iter()
            .map(|token| {
                let token = token.as_ref();
                match &options.note_transform {
                    Some(transform) => {
                        let mut d = normalize_with(&transform(token), &opts);
                        d.original_token = token.to_string();
                        d
                    }
                    None => normalize_with(token, &opts),
                }
            })
            .collect();

        let id = SequenceId(self.next_id);
        self.next_id += 1;

        let start_time = self.clock.now();
        let state = Rc::new(Cell::new(SequenceState::Scheduled));
        let callbacks = Callbacks {
            on_note_start: options.on_note_start,
            on_note_end: options.on_note_end,
            on_complete: options.on_complete,
        };

        let mut core = self.core.borrow_mut();
        let mut offset = 0.0;
        for (index, descriptor) in descriptors.iter().enumerate() {
            let at = start_time + offset;
            if !descriptor.is_rest() {
                core.timeline.schedule(at, id, Action::Trigger { index });
            }
            core.timeline.schedule(at, id, Action::NoteStart { index });
            offset += descriptor.duration_seconds;
            core.timeline.schedule(start_time + offset, id, Action::NoteEnd { index });
        }
        core.timeline.schedule(start_time + offset, id, Action::Complete);

        info!(
            sequence = %id,
            notes = descriptors.len(),
            rests = descriptors.iter().filter(|d| d.is_rest()).count(),
            duration = offset,
            "sequence started"
        );

        core.sequences.insert(
            id,
            Sequence {
                descriptors,
                start_time,
                state: Rc::clone(&state),
                callbacks: Rc::new(RefCell::new(callbacks)),
            },
        );

        SequenceHandle::new(id, Rc::downgrade(&self.core), state)
    }

    /// Stop one sequence by id. Same semantics as [`SequenceHandle::stop`].
    pub fn stop(&mut self, id: SequenceId) -> bool {
        self.core.borrow_mut().cancel(id)
    }

    /// Stop every registered sequence and clear the registry.
    ///
    /// Returns how many sequences were stopped.
    pub fn stop_all_sequences(&mut self) -> usize {
        let count = self.core.borrow_mut().cancel_all();
        info!(count, "all sequences stopped");
        count
    }

    /// Dispatch every timeline entry due at the current clock time.
    ///
    /// Returns the number of entries dispatched.
    pub fn tick(&mut self) -> usize {
        let now = self.clock.now();
        let mut dispatched = 0;
        loop {
            // The borrow ends with this statement, before any callback runs
            let fired = self.core.borrow_mut().next_due(now);
            match fired {
                Some(fired) => {
                    dispatched += 1;
                    fired.run();
                }
                None => break,
            }
        }
        dispatched
    }

    /// Time of the next pending timeline entry
    pub fn next_deadline(&self) -> Option<f64> {
        self.core.borrow().timeline.next_deadline()
    }

    /// Drive a session built on `clock` until its timeline is empty, jumping
    /// straight to each deadline. Returns the number of entries dispatched.
    ///
    /// `clock` must be the clock this session was constructed with. Given any
    /// other clock the session's time cannot move, so this logs a warning and
    /// returns with the timeline still pending.
    pub fn run_until_idle(&mut self, clock: &VirtualClock) -> usize {
        let mut dispatched = 0;
        while let Some(deadline) = self.next_deadline() {
            clock.set(deadline);
            if self.clock.now() < deadline {
                warn!(
                    deadline,
                    now = self.clock.now(),
                    "clock does not drive this session, cannot run to idle"
                );
                break;
            }
            dispatched += self.tick();
        }
        dispatched
    }

    /// Ids of all registered sequences, oldest first
    pub fn active_sequences(&self) -> Vec<SequenceId> {
        let mut ids: Vec<SequenceId> = self.core.borrow().sequences.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn is_active(&self, id: SequenceId) -> bool {
        self.core.borrow().sequences.contains_key(&id)
    }

    fn base_duration(&self, options: &PlayOptions) -> f64 {
        if let Some(seconds) = options.quarter_note_seconds {
            if seconds.is_finite() && seconds > 0.0 {
                return seconds;
            }
            warn!(seconds, "invalid quarter-note duration, ignoring");
        }
        if let Some(bpm) = options.bpm {
            match quarter_note_from_bpm(bpm) {
                Some(seconds) => return seconds,
                None => warn!(bpm, "invalid tempo, ignoring"),
            }
        }
        self.config.quarter_note_seconds
    }

    /// Dispose the current synth (if any) and build one for the active preset.
    fn build_synth(&mut self) {
        let mut core = self.core.borrow_mut();
        if let Some(mut old) = core.synth.take() {
            old.dispose();
        }

        let settings = self.instrument.settings();
        match self.backend.create_synth(self.instrument, &settings) {
            Ok(mut synth) => {
                synth.set_volume_db(gain_to_db(self.volume as f64));
                core.synth = Some(synth);
            }
            Err(e) => error!(error = %e, instrument = %self.instrument, "could not build synth"),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let mut core = self.core.borrow_mut();
        core.cancel_all();
        if let Some(mut synth) = core.synth.take() {
            synth.dispose();
        }
    }
}
