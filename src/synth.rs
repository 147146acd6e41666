//! Synthesizer back end seam
//!
//! The engine never produces samples itself. It talks to an audio library
//! through two traits:
//! - [`AudioBackend`] - one-time audio start and synth construction
//! - [`Synthesizer`] - the active polyphonic synth that notes are triggered on
//!
//! [`RecordingBackend`] is the in-memory implementation used by the CLI and the
//! tests. It records everything the engine asks of it into a shared
//! [`RecordingLog`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::Serialize;

use crate::error::EngineError;
use crate::instrument::{InstrumentPreset, InstrumentSettings};
use crate::note::Pitch;

/// The audio platform
pub trait AudioBackend {
    /// Start (unlock) audio output. May be refused until a user gesture.
    fn start(&mut self) -> Result<(), EngineError>;

    /// Build a synthesizer for the given preset.
    fn create_synth(
        &mut self,
        preset: InstrumentPreset,
        settings: &InstrumentSettings,
    ) -> Result<Box<dyn Synthesizer>, EngineError>;
}

/// A polyphonic synthesizer owned by the session
pub trait Synthesizer {
    /// Play `pitch` for `duration` seconds starting at clock time `time`.
    fn trigger_attack_release(&mut self, pitch: &Pitch, duration: f64, time: f64, velocity: f32);

    /// Set output volume in decibels.
    fn set_volume_db(&mut self, db: f64);

    /// Release native resources. The synth is never used afterwards.
    fn dispose(&mut self);
}

/// Convert a linear gain in [0,1] to decibels. Zero gain is `-inf`.
pub fn gain_to_db(gain: f64) -> f64 {
    if gain <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * gain.log10()
    }
}

/// One call the engine made on a [`RecordingBackend`] or one of its synths
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "event")]
pub enum BackendEvent {
    Started,
    StartDenied,
    SynthCreated {
        instrument: InstrumentPreset,
        synth: usize,
        settings: InstrumentSettings,
    },
    SynthFailed {
        instrument: InstrumentPreset,
    },
    Triggered {
        synth: usize,
        pitch: String,
        duration: f64,
        time: f64,
        velocity: f32,
    },
    VolumeSet {
        synth: usize,
        db: f64,
    },
    Disposed {
        synth: usize,
    },
}

/// Shared log written by a [`RecordingBackend`] and its synths
#[derive(Debug, Default)]
pub struct RecordingLog {
    pub events: Vec<BackendEvent>,
}

impl RecordingLog {
    pub fn start_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, BackendEvent::Started))
            .count()
    }

    pub fn synths_created(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, BackendEvent::SynthCreated { .. }))
            .count()
    }

    pub fn disposals(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, BackendEvent::Disposed { .. }))
            .count()
    }

    /// (pitch, time) of every trigger, in call order
    pub fn triggers(&self) -> Vec<(String, f64)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                BackendEvent::Triggered { pitch, time, .. } => Some((pitch.clone(), *time)),
                _ => None,
            })
            .collect()
    }
}

/// In-memory back end that records every call
///
/// `deny_start` models a platform that has not seen a user gesture yet.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    log: Rc<RefCell<RecordingLog>>,
    deny_start: Rc<Cell<bool>>,
    fail_synth: Rc<Cell<bool>>,
    next_synth: usize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the shared log
    pub fn log(&self) -> Rc<RefCell<RecordingLog>> {
        Rc::clone(&self.log)
    }

    /// Refuse (or allow again) subsequent audio starts. Shared by clones.
    pub fn set_deny_start(&self, deny: bool) {
        self.deny_start.set(deny);
    }

    /// Make subsequent synth construction fail (or succeed again). Shared by clones.
    pub fn set_fail_synth(&self, fail: bool) {
        self.fail_synth.set(fail);
    }
}

impl AudioBackend for RecordingBackend {
    fn start(&mut self) -> Result<(), EngineError> {
        if self.deny_start.get() {
            self.log.borrow_mut().events.push(BackendEvent::StartDenied);
            return Err(EngineError::AudioStartDenied(
                "audio requires a user gesture".to_string(),
            ));
        }
        self.log.borrow_mut().events.push(BackendEvent::Started);
        Ok(())
    }

    fn create_synth(
        &mut self,
        preset: InstrumentPreset,
        settings: &InstrumentSettings,
    ) -> Result<Box<dyn Synthesizer>, EngineError> {
        if self.fail_synth.get() {
            self.log
                .borrow_mut()
                .events
                .push(BackendEvent::SynthFailed { instrument: preset });
            return Err(EngineError::Synth(format!(
                "could not allocate voices for '{}'",
                preset
            )));
        }
        let id = self.next_synth;
        self.next_synth += 1;
        self.log.borrow_mut().events.push(BackendEvent::SynthCreated {
            instrument: preset,
            synth: id,
            settings: settings.clone(),
        });
        Ok(Box::new(RecordingSynth {
            id,
            log: Rc::clone(&self.log),
            disposed: false,
        }))
    }
}

struct RecordingSynth {
    id: usize,
    log: Rc<RefCell<RecordingLog>>,
    disposed: bool,
}

impl Synthesizer for RecordingSynth {
    fn trigger_attack_release(&mut self, pitch: &Pitch, duration: f64, time: f64, velocity: f32) {
        debug_assert!(!self.disposed, "trigger on a disposed synth");
        self.log.borrow_mut().events.push(BackendEvent::Triggered {
            synth: self.id,
            pitch: pitch.to_string(),
            duration,
            time,
            velocity,
        });
    }

    fn set_volume_db(&mut self, db: f64) {
        self.log
            .borrow_mut()
            .events
            .push(BackendEvent::VolumeSet { synth: self.id, db });
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.log
            .borrow_mut()
            .events
            .push(BackendEvent::Disposed { synth: self.id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::parse_pitch;

    #[test]
    fn test_gain_to_db() {
        assert_eq!(gain_to_db(1.0), 0.0);
        assert!((gain_to_db(0.5) + 6.0206).abs() < 1e-3);
        assert_eq!(gain_to_db(0.0), f64::NEG_INFINITY);
    }

    #[test]
    fn test_recording_backend_logs_calls() {
        let mut backend = RecordingBackend::new();
        let log = backend.log();

        backend.set_deny_start(true);
        assert!(matches!(backend.start(), Err(EngineError::AudioStartDenied(_))));
        backend.set_deny_start(false);
        assert!(backend.start().is_ok());

        let preset = InstrumentPreset::Piano;
        let mut synth = backend.create_synth(preset, &preset.settings()).unwrap();
        synth.trigger_attack_release(&parse_pitch("E4").unwrap(), 0.5, 1.0, 0.7);
        synth.dispose();
        synth.dispose();

        let log = log.borrow();
        assert_eq!(log.start_count(), 1);
        assert_eq!(log.synths_created(), 1);
        assert_eq!(log.disposals(), 1);
        assert_eq!(log.triggers(), vec![("E4".to_string(), 1.0)]);
        assert_eq!(log.events[0], BackendEvent::StartDenied);
    }

    #[test]
    fn test_created_synth_carries_preset_settings() {
        let mut backend = RecordingBackend::new();
        let log = backend.log();
        let preset = InstrumentPreset::Bell;
        backend.create_synth(preset, &preset.settings()).unwrap();

        let settings = log.borrow().events.iter().find_map(|e| match e {
            BackendEvent::SynthCreated { settings, .. } => Some(settings.clone()),
            _ => None,
        });
        let settings = settings.unwrap();
        assert_eq!(settings, InstrumentPreset::Bell.settings());
        assert!(settings.fm.is_some());
    }

    #[test]
    fn test_failing_synth_construction() {
        let mut backend = RecordingBackend::new();
        let log = backend.log();
        backend.set_fail_synth(true);

        let preset = InstrumentPreset::Piano;
        assert!(matches!(
            backend.create_synth(preset, &preset.settings()),
            Err(EngineError::Synth(_))
        ));
        assert_eq!(log.borrow().synths_created(), 0);

        backend.set_fail_synth(false);
        assert!(backend.create_synth(preset, &preset.settings()).is_ok());
        assert_eq!(log.borrow().synths_created(), 1);
    }
}
