//! Instrument presets
//!
//! Each preset names a synthesizer topology plus its envelope and oscillator
//! parameters. The session keeps exactly one preset active at a time.

use std::fmt;

use serde::Serialize;
use tracing::warn;

/// How voices are built inside the polyphonic synth
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topology {
    /// Polyphonic bank of single-oscillator subtractive voices
    PolySynth,
    /// Polyphonic bank of two-operator FM voices
    PolyFmSynth,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Triangle,
    Square,
    Sawtooth,
}

/// ADSR envelope, times in seconds, sustain as level in [0,1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Envelope {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

/// Frequency-modulation parameters for [`Topology::PolyFmSynth`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FmParams {
    pub harmonicity: f64,
    pub modulation_index: f64,
}

/// Everything a back end needs to build a synth for a preset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentSettings {
    pub topology: Topology,
    pub envelope: Envelope,
    pub oscillator: Waveform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fm: Option<FmParams>,
}

/// Named instrument preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentPreset {
    #[default]
    Default,
    Piano,
    Bell,
}

impl InstrumentPreset {
    pub const ALL: [InstrumentPreset; 3] = [
        InstrumentPreset::Default,
        InstrumentPreset::Piano,
        InstrumentPreset::Bell,
    ];

    /// Look up a preset by name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "default" => Some(InstrumentPreset::Default),
            "piano" => Some(InstrumentPreset::Piano),
            "bell" => Some(InstrumentPreset::Bell),
            _ => None,
        }
    }

    /// Like [`from_name`](Self::from_name), but unknown names fall back to
    /// `Default` with a warning.
    pub fn resolve(name: &str) -> Self {
        Self::from_name(name).unwrap_or_else(|| {
            warn!(instrument = name, "unknown instrument, using 'default'");
            InstrumentPreset::Default
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            InstrumentPreset::Default => "default",
            InstrumentPreset::Piano => "piano",
            InstrumentPreset::Bell => "bell",
        }
    }

    pub fn settings(self) -> InstrumentSettings {
        match self {
            InstrumentPreset::Default => InstrumentSettings {
                topology: Topology::PolySynth,
                envelope: Envelope {
                    attack: 0.01,
                    decay: 0.1,
                    sustain: 0.3,
                    release: 0.5,
                },
                oscillator: Waveform::Triangle,
                fm: None,
            },
            InstrumentPreset::Piano => InstrumentSettings {
                topology: Topology::PolySynth,
                envelope: Envelope {
                    attack: 0.02,
                    decay: 0.1,
                    sustain: 0.2,
                    release: 1.0,
                },
                oscillator: Waveform::Triangle,
                fm: None,
            },
            InstrumentPreset::Bell => InstrumentSettings {
                topology: Topology::PolyFmSynth,
                envelope: Envelope {
                    attack: 0.002,
                    decay: 0.5,
                    sustain: 0.1,
                    release: 1.2,
                },
                oscillator: Waveform::Triangle,
                fm: Some(FmParams {
                    harmonicity: 3.01,
                    modulation_index: 14.0,
                }),
            },
        }
    }
}

impl fmt::Display for InstrumentPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
