//! Integration tests for the chime engine
//!
//! Drives full sessions through the public API: config, playback, stopping,
//! the signal bridge and the melody adapter.

use std::cell::RefCell;
use std::rc::Rc;

use chime::adapter::play_melody_sequence;
use chime::{
    channel, BackendEvent, Clock, EngineConfig, InstrumentPreset, PlayOptions, PlaybackStatus,
    RecordingBackend, SequenceState, Session, Signal, VirtualClock,
};

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_configured_session_plays_melody() {
    let config = EngineConfig::from_yaml(
        r#"
instrument: piano
volume: 0.5
tempo: 120
"#,
    )
    .unwrap();
    let backend = RecordingBackend::new();
    let log = backend.log();
    let clock = VirtualClock::new();
    let mut session = Session::with_config(backend, clock.clone(), config);
    assert_eq!(session.instrument(), InstrumentPreset::Piano);

    let completed = Rc::new(RefCell::new(0));
    let count = Rc::clone(&completed);
    let handle = session.play_sequence(
        &["pitch_c4", "r", "G4:h"],
        PlayOptions::new().on_complete(move || *count.borrow_mut() += 1),
    );
    session.run_until_idle(&clock);

    assert_eq!(handle.state(), SequenceState::Completed);
    assert_eq!(*completed.borrow(), 1);
    assert!(approx(clock.now(), 2.0), "0.5 + 0.5 + 1.0 seconds");
    assert_eq!(
        log.borrow().triggers(),
        vec![("C4".to_string(), 0.0), ("G4".to_string(), 1.0)]
    );
    let created = log
        .borrow()
        .events
        .iter()
        .find_map(|e| match e {
            BackendEvent::SynthCreated { instrument, .. } => Some(*instrument),
            _ => None,
        });
    assert_eq!(created, Some(InstrumentPreset::Piano));
}

#[test]
fn test_invalid_tokens_keep_their_slot() {
    let backend = RecordingBackend::new();
    let log = backend.log();
    let clock = VirtualClock::new();
    let mut session = Session::new(backend, clock.clone());

    let ended = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&ended);
    session.play_sequence(
        &["C4", "Z9", "E4"],
        PlayOptions::new()
            .quarter_note(0.25)
            .on_note_end(move |token, _| sink.borrow_mut().push(token.to_string())),
    );
    session.run_until_idle(&clock);

    assert_eq!(*ended.borrow(), vec!["C4", "Z9", "E4"]);
    assert_eq!(
        log.borrow().triggers(),
        vec![("C4".to_string(), 0.0), ("E4".to_string(), 0.5)]
    );
}

#[test]
fn test_stop_silences_remaining_notes() {
    let backend = RecordingBackend::new();
    let log = backend.log();
    let clock = VirtualClock::new();
    let mut session = Session::new(backend, clock.clone());

    let handle = session.play_sequence(&["C4", "D4", "E4", "F4"], PlayOptions::new().quarter_note(0.5));
    clock.advance(0.6);
    session.tick();
    handle.stop();
    handle.stop();
    session.run_until_idle(&clock);

    assert_eq!(handle.state(), SequenceState::Stopped);
    assert_eq!(log.borrow().triggers().len(), 2);
    assert!(session.active_sequences().is_empty());
}

#[test]
fn test_signals_drive_session() {
    let backend = RecordingBackend::new();
    let log = backend.log();
    let clock = VirtualClock::new();
    let mut session = Session::new(backend, clock.clone());
    let (tx, rx) = channel();

    let first = session.play_sequence(&["C4", "D4"], PlayOptions::new());
    let second = session.play_sequence(&["E4", "F4"], PlayOptions::new());
    tx.send(Signal::StopAllSounds);
    tx.send_json(r#"{"signal":"play-note","note":"pitch_a4"}"#).unwrap();
    assert_eq!(session.pump(&rx), 2);
    session.run_until_idle(&clock);

    assert_eq!(first.state(), SequenceState::Stopped);
    assert_eq!(second.state(), SequenceState::Stopped);
    assert_eq!(log.borrow().triggers(), vec![("A4".to_string(), 0.0)]);
}

#[test]
fn test_melody_from_config_plays_at_its_tempo() {
    let config = EngineConfig::from_yaml(
        r#"
melodies:
  frere-jacques:
    quarter-note-ms: 500
    notes: [C4, D4, E4, C4]
"#,
    )
    .unwrap();
    let melodies = config.melodies.clone();
    let clock = VirtualClock::new();
    let mut session = Session::with_config(RecordingBackend::new(), clock.clone(), config);
    let status = PlaybackStatus::new();

    let notes = melodies.get("frere-jacques").unwrap().notes.clone();
    play_melody_sequence(
        &mut session,
        &status,
        notes.as_slice(),
        "judgment",
        Some("frere-jacques"),
        &melodies,
    );
    assert!(status.is_playing());

    session.run_until_idle(&clock);
    assert!(approx(clock.now(), 2.0));
    assert!(!status.is_playing());
}

#[test]
fn test_instrument_switch_stops_playback_first() {
    let backend = RecordingBackend::new();
    let log = backend.log();
    let clock = VirtualClock::new();
    let mut session = Session::new(backend, clock.clone());

    let handle = session.play_sequence(&["C4", "D4"], PlayOptions::new());
    assert_eq!(session.set_instrument("bell"), InstrumentPreset::Bell);
    assert_eq!(handle.state(), SequenceState::Stopped);
    assert_eq!(session.set_instrument("kazoo"), InstrumentPreset::Default);

    session.run_until_idle(&clock);
    let log = log.borrow();
    assert_eq!(log.synths_created(), 3);
    assert_eq!(log.disposals(), 2);
    assert!(log.triggers().is_empty());
}
