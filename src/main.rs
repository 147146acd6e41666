use std::cell::RefCell;
use std::env;
use std::fs;
use std::process;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::error;

use chime::{
    BackendEvent, Clock, EngineConfig, PlayOptions, RecordingBackend, Session, SystemClock,
    VirtualClock,
};

const USAGE: &str = "Usage: chime [--config FILE] [--instrument NAME] [--bpm N | --quarter SECONDS]
             [--volume V] [--json] [--realtime] <token>...";

#[derive(Debug, Default)]
struct Args {
    config: Option<String>,
    instrument: Option<String>,
    bpm: Option<f64>,
    quarter: Option<f64>,
    volume: Option<f32>,
    json: bool,
    realtime: bool,
    tokens: Vec<String>,
}

/// What the command line asked for
#[derive(Debug)]
enum Command {
    Play(Args),
    Help,
}

/// One line of the realized timeline
#[derive(Debug, Clone, Serialize)]
struct Event {
    time: f64,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
}

fn main() {
    // Logs go to stderr so stdout carries only the timeline
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args = match parse_args(env::args().skip(1).collect()) {
        Ok(Command::Play(args)) => args,
        Ok(Command::Help) => {
            println!("{}", USAGE);
            return;
        }
        Err(message) => {
            eprintln!("{}", message);
            eprintln!("{}", USAGE);
            process::exit(1);
        }
    };

    let mut config = match &args.config {
        Some(path) => {
            let source = match fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    eprintln!("Error reading file '{}': {}", path, e);
                    process::exit(1);
                }
            };
            match EngineConfig::from_yaml(&source) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("{}", e);
                    process::exit(1);
                }
            }
        }
        None => EngineConfig::default(),
    };
    if let Some(instrument) = &args.instrument {
        config.instrument = instrument.clone();
    }

    let events = if args.realtime {
        play(&args, config, SystemClock::new(), |session| {
            while let Some(deadline) = session.next_deadline() {
                match wait_duration(deadline - session.now()) {
                    Some(wait) => thread::sleep(wait),
                    None => {
                        error!(deadline, "next deadline is out of range, stopping playback");
                        break;
                    }
                }
                session.tick();
            }
        })
    } else {
        let clock = VirtualClock::new();
        play(&args, config, clock.clone(), move |session| {
            session.run_until_idle(&clock);
        })
    };

    if args.json {
        match serde_json::to_string_pretty(&events) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error encoding timeline: {}", e);
                process::exit(1);
            }
        }
    } else {
        for event in &events {
            let mut line = format!("{:>8.3}s  {:<8}", event.time, event.kind);
            if let Some(token) = &event.token {
                line.push_str(&format!(" {}", token));
            }
            if let Some(index) = event.index {
                line.push_str(&format!(" (#{})", index));
            }
            println!("{}", line.trim_end());
        }
    }
}

fn parse_args(raw: Vec<String>) -> Result<Command, String> {
    let mut args = Args::default();
    let mut iter = raw.into_iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = Some(value(&mut iter, "--config")?),
            "--instrument" => args.instrument = Some(value(&mut iter, "--instrument")?),
            "--bpm" => args.bpm = Some(number(&mut iter, "--bpm")?),
            "--quarter" => args.quarter = Some(number(&mut iter, "--quarter")?),
            "--volume" => args.volume = Some(number(&mut iter, "--volume")? as f32),
            "--json" => args.json = true,
            "--realtime" => args.realtime = true,
            "-h" | "--help" => return Ok(Command::Help),
            flag if flag.starts_with("--") => return Err(format!("Unknown option '{}'", flag)),
            _ => args.tokens.push(arg),
        }
    }

    if args.bpm.is_some() && args.quarter.is_some() {
        return Err("--bpm and --quarter are mutually exclusive".to_string());
    }
    if args.tokens.is_empty() {
        return Err("No note tokens given".to_string());
    }
    Ok(Command::Play(args))
}

fn value(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    iter.next().ok_or_else(|| format!("{} needs a value", flag))
}

fn number(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<f64, String> {
    let raw = value(iter, flag)?;
    raw.parse()
        .map_err(|_| format!("{} expects a number, got '{}'", flag, raw))
}

/// How long to sleep until a deadline `seconds` away, `None` if it cannot be
/// represented
fn wait_duration(seconds: f64) -> Option<Duration> {
    if seconds > 0.0 {
        Duration::try_from_secs_f64(seconds).ok()
    } else {
        Some(Duration::ZERO)
    }
}

/// Play the tokens on a fresh session over `clock`, let `drive` run it to the
/// end, and return every event ordered by time.
fn play<C: Clock + Clone + 'static>(
    args: &Args,
    config: EngineConfig,
    clock: C,
    drive: impl FnOnce(&mut Session),
) -> Vec<Event> {
    let backend = RecordingBackend::new();
    let log = backend.log();
    let mut session = Session::with_config(backend, clock.clone(), config);
    if let Some(volume) = args.volume {
        session.set_volume(volume);
    }

    let events = Rc::new(RefCell::new(Vec::new()));
    let mut options = PlayOptions::new();
    if let Some(bpm) = args.bpm {
        options = options.bpm(bpm);
    }
    if let Some(quarter) = args.quarter {
        options = options.quarter_note(quarter);
    }

    let (sink, at) = (Rc::clone(&events), clock.clone());
    options = options.on_note_start(move |token, index| {
        sink.borrow_mut().push(callback_event(at.now(), "start", token, index));
    });
    let (sink, at) = (Rc::clone(&events), clock.clone());
    options = options.on_note_end(move |token, index| {
        sink.borrow_mut().push(callback_event(at.now(), "end", token, index));
    });
    let (sink, at) = (Rc::clone(&events), clock);
    options = options.on_complete(move || {
        sink.borrow_mut().push(Event {
            time: at.now(),
            kind: "complete",
            token: None,
            index: None,
        });
    });

    session.play_sequence(args.tokens.as_slice(), options);
    drive(&mut session);
    drop(session);

    let mut timeline: Vec<Event> = log
        .borrow()
        .events
        .iter()
        .filter_map(|e| match e {
            BackendEvent::Triggered { pitch, time, .. } => Some(Event {
                time: *time,
                kind: "trigger",
                token: Some(pitch.clone()),
                index: None,
            }),
            _ => None,
        })
        .collect();
    timeline.extend(events.borrow().iter().cloned());
    // Stable: at equal times triggers stay ahead of their start callback
    timeline.sort_by(|a, b| a.time.total_cmp(&b.time));
    timeline
}

fn callback_event(time: f64, kind: &'static str, token: &str, index: usize) -> Event {
    Event {
        time,
        kind,
        token: Some(token.to_string()),
        index: Some(index),
    }
}
