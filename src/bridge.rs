//! Signal bridge
//!
//! Lets code without a session reference drive the engine through two
//! signals: play one note, and stop everything. The UI side holds a
//! [`SignalSender`] (cheap to clone, `Send`), the engine side drains the
//! matching [`SignalReceiver`] with [`Session::pump`].
//!
//! Signals also have a JSON form for hosts that forward them as messages:
//! ```json
//! {"signal": "play-note", "note": "C4"}
//! {"signal": "stop-all-sounds"}
//! ```

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::note::DEFAULT_VELOCITY;
use crate::sequencer::Session;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "kebab-case")]
pub enum Signal {
    PlayNote {
        #[serde(default)]
        note: Option<String>,
    },
    StopAllSounds,
}

impl Signal {
    pub fn play_note(note: impl Into<String>) -> Self {
        Signal::PlayNote {
            note: Some(note.into()),
        }
    }

    pub fn from_json(payload: &str) -> Result<Self, EngineError> {
        serde_json::from_str(payload).map_err(|e| EngineError::SignalError(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        // A tagged enum of strings always serializes
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// The narrow port the UI layer talks to
pub trait SignalPort {
    fn handle_signal(&mut self, signal: Signal);
}

impl SignalPort for Session {
    fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::PlayNote { note: Some(note) } if !note.trim().is_empty() => {
                let duration = self.config().quarter_note_seconds;
                self.play_note(&note, duration, DEFAULT_VELOCITY);
                debug!(note = %note, "play-note signal handled");
            }
            Signal::PlayNote { .. } => {
                warn!("play-note signal without a note, ignored");
            }
            Signal::StopAllSounds => {
                self.stop_all_sequences();
                debug!("stop-all-sounds signal handled");
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: Sender<Signal>,
}

impl SignalSender {
    /// Queue a signal. Returns false once the engine side is gone.
    pub fn send(&self, signal: Signal) -> bool {
        self.tx.send(signal).is_ok()
    }

    /// Decode a JSON signal and queue it.
    pub fn send_json(&self, payload: &str) -> Result<bool, EngineError> {
        Ok(self.send(Signal::from_json(payload)?))
    }
}

#[derive(Debug)]
pub struct SignalReceiver {
    rx: Receiver<Signal>,
}

impl SignalReceiver {
    fn try_next(&self) -> Option<Signal> {
        match self.rx.try_recv() {
            Ok(signal) => Some(signal),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

pub fn channel() -> (SignalSender, SignalReceiver) {
    let (tx, rx) = mpsc::channel();
    (SignalSender { tx }, SignalReceiver { rx })
}

impl Session {
    /// Handle every signal currently queued on `receiver`.
    ///
    /// Returns how many signals were handled.
    pub fn pump(&mut self, receiver: &SignalReceiver) -> usize {
        let mut handled = 0;
        while let Some(signal) = receiver.try_next() {
            self.handle_signal(signal);
            handled += 1;
        }
        handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::sequencer::{PlayOptions, SequenceState};
    use crate::synth::RecordingBackend;

    #[test]
    fn test_json_forms() {
        assert_eq!(
            Signal::from_json(r#"{"signal":"play-note","note":"C4"}"#).unwrap(),
            Signal::play_note("C4")
        );
        assert_eq!(
            Signal::from_json(r#"{"signal":"stop-all-sounds"}"#).unwrap(),
            Signal::StopAllSounds
        );
        assert_eq!(
            Signal::from_json(r#"{"signal":"play-note"}"#).unwrap(),
            Signal::PlayNote { note: None }
        );
        assert!(matches!(
            Signal::from_json(r#"{"signal":"explode"}"#),
            Err(EngineError::SignalError(_))
        ));
        assert_eq!(Signal::StopAllSounds.to_json(), r#"{"signal":"stop-all-sounds"}"#);
    }

    #[test]
    fn test_pump_forwards_signals() {
        let backend = RecordingBackend::new();
        let log = backend.log();
        let clock = VirtualClock::new();
        let mut session = Session::new(backend, clock);
        let (tx, rx) = channel();

        let handle = session.play_sequence(&["C4", "D4"], PlayOptions::new());

        assert!(tx.send(Signal::play_note("sound_e4")));
        assert!(tx.send(Signal::PlayNote { note: Some("  ".to_string()) }));
        assert!(tx.send_json(r#"{"signal":"stop-all-sounds"}"#).unwrap());
        assert_eq!(session.pump(&rx), 3);
        assert_eq!(session.pump(&rx), 0);

        assert_eq!(handle.state(), SequenceState::Stopped);
        assert_eq!(log.borrow().triggers(), vec![("E4".to_string(), 0.0)]);
    }

    #[test]
    fn test_sender_works_across_threads() {
        let (tx, rx) = channel();
        let worker = std::thread::spawn(move || tx.send(Signal::StopAllSounds));
        assert!(worker.join().unwrap());

        let mut session = Session::new(RecordingBackend::new(), VirtualClock::new());
        assert_eq!(session.pump(&rx), 1);
    }
}
