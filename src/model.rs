//! Data model for a parsed MusicXML score.
//!
//! This is a thin typed view over the XML: measure children are kept in
//! document order so that `<backup>` and `<forward>` can be replayed when
//! beats are computed.

use serde::{Deserialize, Serialize};

/// A complete musical score parsed from MusicXML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Score {
    /// Title of the piece
    pub title: Option<String>,
    /// Composer name
    pub composer: Option<String>,
    /// MusicXML version (e.g., "3.1", "4.0")
    pub version: Option<String>,
    /// Musical parts (instruments)
    pub parts: Vec<Part>,
}

/// A musical part (one instrument or voice).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Part {
    /// Part identifier (e.g., "P1")
    pub id: String,
    /// Part name (e.g., "Piano")
    pub name: String,
    /// Abbreviated name (e.g., "Pno.")
    pub abbreviation: Option<String>,
    /// Ordered list of measures
    pub measures: Vec<Measure>,
}

/// A single measure (bar) of music.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Measure {
    /// The `number` attribute as written (may be non-numeric, e.g. "12a")
    pub number: Option<String>,
    /// Whether this is an implicit measure (e.g., pickup/anacrusis)
    pub implicit: bool,
    /// Width in tenths, when the encoder supplied one
    pub width: Option<f64>,
    /// Children in document order
    pub entries: Vec<MeasureEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MeasureEntry {
    Attributes(Attributes),
    Note(Note),
    Backup { duration: i32 },
    Forward { duration: i32, voice: Option<String>, staff: Option<i32> },
    Direction(Direction),
    Barline(Barline),
}

/// Musical attributes that may change anywhere inside a measure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Attributes {
    /// Divisions per quarter note
    pub divisions: Option<i32>,
    pub keys: Vec<Key>,
    pub times: Vec<TimeSignature>,
    pub clefs: Vec<Clef>,
    /// Number of staves in this part (e.g. 2 for a piano grand staff)
    pub staves: Option<i32>,
    pub staff_details: Vec<StaffDetails>,
    pub measure_styles: Vec<MeasureStyle>,
}

/// Key signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Key {
    /// Staff this key applies to; `None` means every staff of the part
    pub number: Option<i32>,
    /// Number of sharps (positive) or flats (negative)
    pub fifths: i32,
    pub mode: Option<String>,
}

/// Time signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSignature {
    pub number: Option<i32>,
    /// `(beats, beat-type)` pairs; `beats` may itself be additive ("3+2")
    pub components: Vec<(String, i32)>,
    /// `common`, `cut`, `single-number`, ...
    pub symbol: Option<String>,
    /// `print-object="no"`
    pub hidden: bool,
    /// `<senza-misura>`
    pub senza_misura: bool,
}

/// Clef definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clef {
    /// Staff number this clef belongs to (1-based; defaults to 1)
    pub number: i32,
    /// Clef sign: "G", "F", "C", "percussion", "TAB", "none"
    pub sign: String,
    pub line: Option<i32>,
    pub octave_change: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffDetails {
    pub number: i32,
    pub staff_lines: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureStyle {
    pub number: Option<i32>,
    pub multiple_rest: Option<i32>,
}

/// A single note or rest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Note {
    /// Pitch (None for rests and unpitched notes)
    pub pitch: Option<Pitch>,
    /// Duration in divisions
    pub duration: i32,
    /// Voice label as written
    pub voice: Option<String>,
    /// Note type: "whole", "half", "quarter", "eighth", "16th", ...
    pub note_type: Option<String>,
    /// Stem direction: "up", "down", "none", "double"
    pub stem: Option<String>,
    /// Notehead style, e.g. "x", "diamond", "slash"
    pub notehead: Option<String>,
    pub beams: Vec<Beam>,
    pub rest: Option<Rest>,
    /// Whether this note is part of a chord with the previous note
    pub chord: bool,
    pub grace: bool,
    /// `<grace slash="yes"/>`
    pub grace_slash: bool,
    pub dots: u32,
    /// Accidental: "sharp", "flat", "natural", "double-sharp", "flat-flat", ...
    pub accidental: Option<String>,
    /// Staff number (1-based; for multi-staff parts like piano)
    pub staff: Option<i32>,
    pub time_modification: Option<TimeModification>,
    pub notations: Notations,
    pub lyrics: Vec<Lyric>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rest {
    /// `measure="yes"`
    pub measure: bool,
    pub display_step: Option<String>,
    pub display_octave: Option<i32>,
}

/// Pitch of a note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pitch {
    /// Note name: A, B, C, D, E, F, G
    pub step: String,
    /// Octave number (middle C = C4)
    pub octave: i32,
    /// Chromatic alteration: -1.0 = flat, 1.0 = sharp
    pub alter: Option<f64>,
}

/// Beam grouping information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Beam {
    /// Beam level (1 = eighth-note beam, 2 = sixteenth-note beam, etc.)
    pub number: i32,
    /// "begin", "continue", "end", "forward hook", "backward hook"
    pub beam_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeModification {
    pub actual_notes: i32,
    pub normal_notes: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Notations {
    pub slurs: Vec<SlurEvent>,
    pub ties: Vec<String>,
    pub tuplets: Vec<TupletEvent>,
    pub articulations: Vec<ArticulationMark>,
}

/// One child of `<articulations>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticulationMark {
    /// Element name: "accent", "strong-accent", "staccato", "tenuto", ...
    pub name: String,
    pub placement: Option<String>,
}

/// A `<slur>` start/stop on a note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlurEvent {
    /// "start", "stop", "continue"
    pub slur_type: String,
    pub number: i32,
    pub placement: Option<String>,
    pub orientation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TupletEvent {
    /// "start" or "stop"
    pub tuplet_type: String,
    pub placement: Option<String>,
    pub show_number: Option<String>,
    pub bracket: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lyric {
    pub number: i32,
    pub text: String,
}

/// A `<direction>` with the parts this crate lays out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Direction {
    pub placement: Option<String>,
    pub staff: Option<i32>,
    pub voice: Option<String>,
    pub metronome: Option<MetronomeMark>,
    pub sound_tempo: Option<f64>,
    pub words: Vec<String>,
    pub wedges: Vec<WedgeEvent>,
    pub pedals: Vec<PedalEvent>,
}

/// Metronome marking (e.g., ♩ = 120).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetronomeMark {
    pub beat_unit: String,
    pub per_minute: f64,
    pub dotted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WedgeEvent {
    /// "crescendo", "diminuendo", "stop", "continue"
    pub wedge_type: String,
    pub number: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PedalEvent {
    /// "start", "stop", "change", "continue", "sostenuto", "resume"
    pub pedal_type: String,
    pub line: Option<bool>,
    pub sign: Option<bool>,
}

/// A barline (may include repeat signs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Barline {
    /// Location: "left", "right", "middle"
    pub location: String,
    /// "regular", "light-light", "light-heavy", "heavy-light", "none", ...
    pub bar_style: Option<String>,
    /// "forward" or "backward"
    pub repeat: Option<String>,
}

impl Score {
    /// Number of measures, taken from the longest part.
    pub fn measure_count(&self) -> usize {
        self.parts.iter().map(|p| p.measures.len()).max().unwrap_or(0)
    }
}
