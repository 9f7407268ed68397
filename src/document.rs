//! The immutable document tree handed to layout.
//!
//! `Score → System → Measure → (Fragment | Gap) → Part → Stave → Voice →
//! Entry`, plus score-level curves, wedges and pedals. Nodes are addressed
//! with key paths; a key that does not resolve is a bug and panics.
//! Nothing here is mutated after construction: [`Document::reflow`] and
//! [`Document::insert_gap`] return new documents.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fraction::Fraction;
use crate::signature::{Signature, StaveSignature};
use crate::spanners::{Beam, Curve, Pedal, PedalMark, Placement, Tuplet, Wedge};

// ═══════════════════════════════════════════════════════════════════════
// Notation values
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pitch {
    /// `C`..`B`
    pub step: char,
    pub octave: i32,
}

impl Pitch {
    pub fn new(step: char, octave: i32) -> Self {
        Self { step, octave }
    }

    pub fn from_musicxml(step: &str, octave: i32) -> Self {
        let step = step.chars().next().map(|c| c.to_ascii_uppercase()).unwrap_or('C');
        Self::new(step, octave)
    }

    /// `octave * 7 + step`, counting C as 0.
    pub fn diatonic_position(&self) -> i32 {
        let step = match self.step {
            'C' => 0,
            'D' => 1,
            'E' => 2,
            'F' => 3,
            'G' => 4,
            'A' => 5,
            'B' => 6,
            _ => 0,
        };
        self.octave * 7 + step
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Notehead {
    #[default]
    Normal,
    X,
    Diamond,
    Square,
    Triangle,
    Slash,
    CircleX,
    None,
}

impl Notehead {
    pub fn from_musicxml(value: Option<&str>) -> Self {
        match value {
            Some("x") | Some("cross") => Self::X,
            Some("diamond") => Self::Diamond,
            Some("square") => Self::Square,
            Some("triangle") => Self::Triangle,
            Some("slash") => Self::Slash,
            Some("circle-x") => Self::CircleX,
            Some("none") => Self::None,
            _ => Self::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StemDirection {
    #[default]
    Auto,
    Up,
    Down,
    None,
}

impl StemDirection {
    pub fn from_musicxml(value: Option<&str>) -> Self {
        match value {
            Some("up") => Self::Up,
            Some("down") => Self::Down,
            Some("none") => Self::None,
            _ => Self::Auto,
        }
    }
}

/// Written note value, a power of two of the whole note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DurationType {
    Breve,
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
    SixtyFourth,
    OneHundredTwentyEighth,
    TwoHundredFiftySixth,
    FiveHundredTwelfth,
    OneThousandTwentyFourth,
}

impl DurationType {
    const ALL: [DurationType; 12] = [
        Self::Breve,
        Self::Whole,
        Self::Half,
        Self::Quarter,
        Self::Eighth,
        Self::Sixteenth,
        Self::ThirtySecond,
        Self::SixtyFourth,
        Self::OneHundredTwentyEighth,
        Self::TwoHundredFiftySixth,
        Self::FiveHundredTwelfth,
        Self::OneThousandTwentyFourth,
    ];

    pub fn from_musicxml(value: &str) -> Option<Self> {
        Some(match value {
            "breve" => Self::Breve,
            "whole" => Self::Whole,
            "half" => Self::Half,
            "quarter" => Self::Quarter,
            "eighth" => Self::Eighth,
            "16th" => Self::Sixteenth,
            "32nd" => Self::ThirtySecond,
            "64th" => Self::SixtyFourth,
            "128th" => Self::OneHundredTwentyEighth,
            "256th" => Self::TwoHundredFiftySixth,
            "512th" => Self::FiveHundredTwelfth,
            "1024th" => Self::OneThousandTwentyFourth,
            _ => return None,
        })
    }

    /// Undotted length in whole notes: breve = 2, whole = 1, half = 1/2, ...
    pub fn fraction(&self) -> Fraction {
        match self {
            Self::Breve => Fraction::new(2, 1),
            other => Fraction::new(1, 1i64 << (*other as i64 - 1)),
        }
    }

    /// Dotted length in whole notes.
    pub fn dotted_fraction(&self, dots: u32) -> Fraction {
        let base = self.fraction();
        let mut total = base;
        let mut addition = base;
        for _ in 0..dots {
            addition = addition.multiply(&Fraction::new(1, 2));
            total = total.add(&addition);
        }
        total
    }

    /// The longest `(type, dots)` whose length equals `duration`, falling
    /// back to the longest type not exceeding it.
    pub fn from_fraction(duration: &Fraction) -> (Self, u32) {
        for kind in Self::ALL {
            for dots in 0..=3 {
                if kind.dotted_fraction(dots) == *duration {
                    return (kind, dots);
                }
            }
        }
        let kind = Self::ALL
            .into_iter()
            .find(|k| k.fraction().is_less_than_or_equal_to(duration))
            .unwrap_or(Self::OneThousandTwentyFourth);
        (kind, 0)
    }

    pub fn has_stem(&self) -> bool {
        !matches!(self, Self::Breve | Self::Whole)
    }

    pub fn is_filled(&self) -> bool {
        !matches!(self, Self::Breve | Self::Whole | Self::Half)
    }

    pub fn flag_count(&self) -> u32 {
        (*self as u32).saturating_sub(Self::Quarter as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccidentalCode {
    Sharp,
    DoubleSharp,
    Flat,
    DoubleFlat,
    Natural,
    QuarterSharp,
    ThreeQuarterSharp,
    QuarterFlat,
    ThreeQuarterFlat,
}

impl AccidentalCode {
    pub fn from_musicxml(value: &str) -> Option<Self> {
        Some(match value {
            "sharp" => Self::Sharp,
            "double-sharp" | "sharp-sharp" => Self::DoubleSharp,
            "flat" => Self::Flat,
            "flat-flat" | "double-flat" => Self::DoubleFlat,
            "natural" => Self::Natural,
            "quarter-sharp" => Self::QuarterSharp,
            "three-quarters-sharp" => Self::ThreeQuarterSharp,
            "quarter-flat" => Self::QuarterFlat,
            "three-quarters-flat" => Self::ThreeQuarterFlat,
            _ => return None,
        })
    }

    pub fn from_alter(alter: f64) -> Option<Self> {
        match (alter * 2.0).round() as i32 {
            4 => Some(Self::DoubleSharp),
            3 => Some(Self::ThreeQuarterSharp),
            2 => Some(Self::Sharp),
            1 => Some(Self::QuarterSharp),
            -1 => Some(Self::QuarterFlat),
            -2 => Some(Self::Flat),
            -3 => Some(Self::ThreeQuarterFlat),
            -4 => Some(Self::DoubleFlat),
            _ => None,
        }
    }

    /// Short code as used by engraving fonts: `#`, `##`, `b`, `bb`, `n`, ...
    pub fn code(&self) -> &'static str {
        match self {
            Self::Sharp => "#",
            Self::DoubleSharp => "##",
            Self::Flat => "b",
            Self::DoubleFlat => "bb",
            Self::Natural => "n",
            Self::QuarterSharp => "+",
            Self::ThreeQuarterSharp => "++",
            Self::QuarterFlat => "d",
            Self::ThreeQuarterFlat => "db",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accidental {
    pub code: AccidentalCode,
    pub cautionary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub text: String,
    pub placement: Placement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArticulationKind {
    Accent,
    StrongAccent,
    Staccato,
    Tenuto,
}

impl ArticulationKind {
    pub fn from_musicxml(name: &str) -> Option<Self> {
        match name {
            "accent" => Some(Self::Accent),
            "strong-accent" => Some(Self::StrongAccent),
            "staccato" => Some(Self::Staccato),
            "tenuto" => Some(Self::Tenuto),
            _ => None,
        }
    }
}

/// An articulation mark. `Auto` placement goes above the note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Articulation {
    pub kind: ArticulationKind,
    pub placement: Placement,
}

/// A small note leading into the entry that carries it. Grace notes take
/// no beat; they are drawn left of their entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraceNote {
    pub pitch: Pitch,
    pub accidental: Option<Accidental>,
    pub duration_type: DurationType,
    /// Acciaccatura stroke through the stem.
    pub slash: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarlineStyle {
    Single,
    Double,
    End,
    RepeatStart,
    RepeatEnd,
    RepeatBoth,
    None,
}

impl BarlineStyle {
    pub fn from_musicxml(bar_style: Option<&str>, repeat: Option<&str>) -> Self {
        match (repeat, bar_style) {
            (Some("forward"), _) => Self::RepeatStart,
            (Some("backward"), _) => Self::RepeatEnd,
            (_, Some("light-light")) => Self::Double,
            (_, Some("light-heavy")) | (_, Some("heavy")) => Self::End,
            (_, Some("none")) => Self::None,
            _ => Self::Single,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tree
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Score {
    pub title: Option<String>,
    pub part_labels: Vec<String>,
    pub systems: Vec<System>,
    pub curves: Vec<Curve>,
    pub wedges: Vec<Wedge>,
    pub pedals: Vec<Pedal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct System {
    pub measures: Vec<Measure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measure {
    /// Displayed measure number; `None` for implicit measures.
    pub label: Option<u32>,
    pub start_barline: Option<BarlineStyle>,
    pub end_barline: Option<BarlineStyle>,
    pub entries: Vec<MeasureEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MeasureEntry {
    Fragment(Fragment),
    Gap(Gap),
}

impl MeasureEntry {
    pub fn signature(&self) -> &Arc<Signature> {
        match self {
            MeasureEntry::Fragment(f) => &f.signature,
            MeasureEntry::Gap(g) => &g.signature,
        }
    }

    pub fn width(&self) -> Option<f64> {
        match self {
            MeasureEntry::Fragment(f) => f.width,
            MeasureEntry::Gap(g) => g.width,
        }
    }

    fn set_width(&mut self, width: Option<f64>) {
        match self {
            MeasureEntry::Fragment(f) => f.width = width,
            MeasureEntry::Gap(g) => {
                if width.is_some() {
                    g.width = width;
                }
            }
        }
    }
}

/// A stretch of a measure with one unchanging signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub signature: Arc<Signature>,
    pub start_beat: Fraction,
    pub end_beat: Fraction,
    pub parts: Vec<Part>,
    /// `None` until the line breaker assigns a width.
    pub width: Option<f64>,
}

impl Fragment {
    pub fn multi_rest_count(&self) -> u32 {
        self.parts
            .iter()
            .flat_map(|p| &p.staves)
            .map(|s| s.multi_rest_count)
            .max()
            .unwrap_or(0)
    }
}

/// A non-musical spacer between fragments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gap {
    /// Signature of the staves drawn underneath the gap.
    pub signature: Arc<Signature>,
    pub text: Option<String>,
    pub width: Option<f64>,
    pub duration_ms: f64,
}

/// Parameters for [`Document::insert_gap`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GapSpec {
    pub text: Option<String>,
    pub width: Option<f64>,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub stave_count: usize,
    pub staves: Vec<Stave>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stave {
    pub signature: StaveSignature,
    pub voices: Vec<Voice>,
    pub multi_rest_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub entries: Vec<VoiceEntry>,
    pub beams: Vec<Beam>,
    pub tuplets: Vec<Tuplet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VoiceEntry {
    Note(Note),
    Rest(Rest),
    Chord(Chord),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub pitch: Pitch,
    pub head: Notehead,
    pub stem_direction: StemDirection,
    pub duration: Fraction,
    pub duration_type: DurationType,
    pub dot_count: u32,
    pub measure_beat: Fraction,
    pub accidental: Option<Accidental>,
    pub annotations: Vec<Annotation>,
    pub articulations: Vec<Articulation>,
    pub grace_notes: Vec<GraceNote>,
    pub curve_ids: Vec<String>,
    pub beam_id: Option<String>,
    pub tuplet_id: Option<String>,
    pub wedge_id: Option<String>,
    pub pedal_mark: Option<PedalMark>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChordHead {
    pub pitch: Pitch,
    pub head: Notehead,
    pub accidental: Option<Accidental>,
    pub curve_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chord {
    pub heads: Vec<ChordHead>,
    pub stem_direction: StemDirection,
    pub duration: Fraction,
    pub duration_type: DurationType,
    pub dot_count: u32,
    pub measure_beat: Fraction,
    pub annotations: Vec<Annotation>,
    pub articulations: Vec<Articulation>,
    pub grace_notes: Vec<GraceNote>,
    pub beam_id: Option<String>,
    pub tuplet_id: Option<String>,
    pub wedge_id: Option<String>,
    pub pedal_mark: Option<PedalMark>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rest {
    pub measure_beat: Fraction,
    pub duration: Fraction,
    pub duration_type: DurationType,
    pub dot_count: u32,
    pub display_pitch: Option<Pitch>,
    pub beam_id: Option<String>,
    pub tuplet_id: Option<String>,
    /// `<rest measure="yes">`
    pub whole_measure: bool,
}

impl VoiceEntry {
    pub fn measure_beat(&self) -> Fraction {
        match self {
            VoiceEntry::Note(n) => n.measure_beat,
            VoiceEntry::Rest(r) => r.measure_beat,
            VoiceEntry::Chord(c) => c.measure_beat,
        }
    }

    pub fn duration(&self) -> Fraction {
        match self {
            VoiceEntry::Note(n) => n.duration,
            VoiceEntry::Rest(r) => r.duration,
            VoiceEntry::Chord(c) => c.duration,
        }
    }

    pub fn duration_type(&self) -> DurationType {
        match self {
            VoiceEntry::Note(n) => n.duration_type,
            VoiceEntry::Rest(r) => r.duration_type,
            VoiceEntry::Chord(c) => c.duration_type,
        }
    }

    pub fn beam_id(&self) -> Option<&str> {
        match self {
            VoiceEntry::Note(n) => n.beam_id.as_deref(),
            VoiceEntry::Rest(r) => r.beam_id.as_deref(),
            VoiceEntry::Chord(c) => c.beam_id.as_deref(),
        }
    }

    pub fn tuplet_id(&self) -> Option<&str> {
        match self {
            VoiceEntry::Note(n) => n.tuplet_id.as_deref(),
            VoiceEntry::Rest(r) => r.tuplet_id.as_deref(),
            VoiceEntry::Chord(c) => c.tuplet_id.as_deref(),
        }
    }

    pub fn curve_ids(&self) -> Vec<&str> {
        match self {
            VoiceEntry::Note(n) => n.curve_ids.iter().map(String::as_str).collect(),
            VoiceEntry::Rest(_) => Vec::new(),
            VoiceEntry::Chord(c) => {
                let mut ids: Vec<&str> = Vec::new();
                for id in c.heads.iter().flat_map(|h| &h.curve_ids) {
                    if !ids.contains(&id.as_str()) {
                        ids.push(id);
                    }
                }
                ids
            }
        }
    }

    pub fn wedge_id(&self) -> Option<&str> {
        match self {
            VoiceEntry::Note(n) => n.wedge_id.as_deref(),
            VoiceEntry::Rest(_) => None,
            VoiceEntry::Chord(c) => c.wedge_id.as_deref(),
        }
    }

    pub fn grace_notes(&self) -> &[GraceNote] {
        match self {
            VoiceEntry::Note(n) => &n.grace_notes,
            VoiceEntry::Rest(_) => &[],
            VoiceEntry::Chord(c) => &c.grace_notes,
        }
    }

    pub fn pedal_mark(&self) -> Option<&PedalMark> {
        match self {
            VoiceEntry::Note(n) => n.pedal_mark.as_ref(),
            VoiceEntry::Rest(_) => None,
            VoiceEntry::Chord(c) => c.pedal_mark.as_ref(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Keys
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SystemKey {
    pub system_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MeasureKey {
    pub system_index: usize,
    /// Index within the system.
    pub measure_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MeasureEntryKey {
    pub system_index: usize,
    pub measure_index: usize,
    pub measure_entry_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartKey {
    pub system_index: usize,
    pub measure_index: usize,
    pub measure_entry_index: usize,
    pub part_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StaveKey {
    pub system_index: usize,
    pub measure_index: usize,
    pub measure_entry_index: usize,
    pub part_index: usize,
    pub stave_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoiceKey {
    pub system_index: usize,
    pub measure_index: usize,
    pub measure_entry_index: usize,
    pub part_index: usize,
    pub stave_index: usize,
    pub voice_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoiceEntryKey {
    pub system_index: usize,
    pub measure_index: usize,
    pub measure_entry_index: usize,
    pub part_index: usize,
    pub stave_index: usize,
    pub voice_index: usize,
    pub voice_entry_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeamKey {
    pub voice: VoiceKey,
    pub beam_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupletKey {
    pub voice: VoiceKey,
    pub tuplet_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurveKey {
    pub curve_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WedgeKey {
    pub wedge_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PedalKey {
    pub pedal_index: usize,
}

impl SystemKey {
    pub fn measure(self, measure_index: usize) -> MeasureKey {
        MeasureKey { system_index: self.system_index, measure_index }
    }
}

impl MeasureKey {
    pub fn system(self) -> SystemKey {
        SystemKey { system_index: self.system_index }
    }

    pub fn entry(self, measure_entry_index: usize) -> MeasureEntryKey {
        MeasureEntryKey {
            system_index: self.system_index,
            measure_index: self.measure_index,
            measure_entry_index,
        }
    }
}

impl MeasureEntryKey {
    pub fn measure(self) -> MeasureKey {
        MeasureKey { system_index: self.system_index, measure_index: self.measure_index }
    }

    pub fn part(self, part_index: usize) -> PartKey {
        PartKey {
            system_index: self.system_index,
            measure_index: self.measure_index,
            measure_entry_index: self.measure_entry_index,
            part_index,
        }
    }
}

impl PartKey {
    pub fn measure_entry(self) -> MeasureEntryKey {
        self.measure_key().entry(self.measure_entry_index)
    }

    fn measure_key(self) -> MeasureKey {
        MeasureKey { system_index: self.system_index, measure_index: self.measure_index }
    }

    pub fn stave(self, stave_index: usize) -> StaveKey {
        StaveKey {
            system_index: self.system_index,
            measure_index: self.measure_index,
            measure_entry_index: self.measure_entry_index,
            part_index: self.part_index,
            stave_index,
        }
    }
}

impl StaveKey {
    pub fn part(self) -> PartKey {
        self.measure_entry().part(self.part_index)
    }

    pub fn measure_entry(self) -> MeasureEntryKey {
        MeasureKey { system_index: self.system_index, measure_index: self.measure_index }
            .entry(self.measure_entry_index)
    }

    pub fn voice(self, voice_index: usize) -> VoiceKey {
        VoiceKey {
            system_index: self.system_index,
            measure_index: self.measure_index,
            measure_entry_index: self.measure_entry_index,
            part_index: self.part_index,
            stave_index: self.stave_index,
            voice_index,
        }
    }
}

impl VoiceKey {
    pub fn stave(self) -> StaveKey {
        self.measure_entry().part(self.part_index).stave(self.stave_index)
    }

    pub fn measure_entry(self) -> MeasureEntryKey {
        MeasureKey { system_index: self.system_index, measure_index: self.measure_index }
            .entry(self.measure_entry_index)
    }

    pub fn entry(self, voice_entry_index: usize) -> VoiceEntryKey {
        VoiceEntryKey {
            system_index: self.system_index,
            measure_index: self.measure_index,
            measure_entry_index: self.measure_entry_index,
            part_index: self.part_index,
            stave_index: self.stave_index,
            voice_index: self.voice_index,
            voice_entry_index,
        }
    }
}

impl VoiceEntryKey {
    pub fn voice(self) -> VoiceKey {
        VoiceKey {
            system_index: self.system_index,
            measure_index: self.measure_index,
            measure_entry_index: self.measure_entry_index,
            part_index: self.part_index,
            stave_index: self.stave_index,
            voice_index: self.voice_index,
        }
    }

    pub fn stave(self) -> StaveKey {
        self.voice().stave()
    }

    pub fn system(self) -> SystemKey {
        SystemKey { system_index: self.system_index }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Document
// ═══════════════════════════════════════════════════════════════════════

/// How the line breaker regroups measures: absolute measure indexes per
/// system plus a width per measure entry (`None` keeps the current one).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemArrangement {
    pub measure_indexes: Vec<usize>,
    pub entry_widths: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    score: Score,
}

fn at<'a, T>(items: &'a [T], index: usize, what: &str) -> &'a T {
    items
        .get(index)
        .unwrap_or_else(|| panic!("{what} {index} not found (have {})", items.len()))
}

impl Document {
    pub fn new(score: Score) -> Self {
        Self { score }
    }

    pub fn score(&self) -> &Score {
        &self.score
    }

    pub fn title(&self) -> Option<&str> {
        self.score.title.as_deref()
    }

    pub fn part_labels(&self) -> &[String] {
        &self.score.part_labels
    }

    pub fn part_count(&self) -> usize {
        self.score.part_labels.len()
    }

    pub fn systems(&self) -> &[System] {
        &self.score.systems
    }

    pub fn system_count(&self) -> usize {
        self.score.systems.len()
    }

    pub fn system(&self, key: SystemKey) -> &System {
        at(&self.score.systems, key.system_index, "system")
    }

    pub fn measure(&self, key: MeasureKey) -> &Measure {
        at(&self.system(key.system()).measures, key.measure_index, "measure")
    }

    pub fn measure_count(&self, key: SystemKey) -> usize {
        self.system(key).measures.len()
    }

    /// Total measures across every system.
    pub fn absolute_measure_count(&self) -> usize {
        self.score.systems.iter().map(|s| s.measures.len()).sum()
    }

    pub fn absolute_measure_index(&self, key: MeasureKey) -> usize {
        let before: usize = self.score.systems[..key.system_index]
            .iter()
            .map(|s| s.measures.len())
            .sum();
        before + key.measure_index
    }

    pub fn measures(&self) -> impl Iterator<Item = &Measure> {
        self.score.systems.iter().flat_map(|s| &s.measures)
    }

    pub fn measure_entry(&self, key: MeasureEntryKey) -> &MeasureEntry {
        at(&self.measure(key.measure()).entries, key.measure_entry_index, "measure entry")
    }

    pub fn fragment(&self, key: MeasureEntryKey) -> &Fragment {
        match self.measure_entry(key) {
            MeasureEntry::Fragment(fragment) => fragment,
            MeasureEntry::Gap(_) => panic!("measure entry {key:?} is a gap, not a fragment"),
        }
    }

    pub fn part(&self, key: PartKey) -> &Part {
        at(&self.fragment(key.measure_entry()).parts, key.part_index, "part")
    }

    pub fn stave(&self, key: StaveKey) -> &Stave {
        at(&self.part(key.part()).staves, key.stave_index, "stave")
    }

    pub fn voice(&self, key: VoiceKey) -> &Voice {
        at(&self.stave(key.stave()).voices, key.voice_index, "voice")
    }

    pub fn voice_entry(&self, key: VoiceEntryKey) -> &VoiceEntry {
        at(&self.voice(key.voice()).entries, key.voice_entry_index, "voice entry")
    }

    pub fn beam(&self, key: BeamKey) -> &Beam {
        at(&self.voice(key.voice).beams, key.beam_index, "beam")
    }

    pub fn tuplet(&self, key: TupletKey) -> &Tuplet {
        at(&self.voice(key.voice).tuplets, key.tuplet_index, "tuplet")
    }

    pub fn curves(&self) -> &[Curve] {
        &self.score.curves
    }

    pub fn curve(&self, key: CurveKey) -> &Curve {
        at(&self.score.curves, key.curve_index, "curve")
    }

    pub fn wedges(&self) -> &[Wedge] {
        &self.score.wedges
    }

    pub fn pedals(&self) -> &[Pedal] {
        &self.score.pedals
    }

    pub fn is_first_system(&self, key: SystemKey) -> bool {
        key.system_index == 0
    }

    pub fn is_last_system(&self, key: SystemKey) -> bool {
        key.system_index + 1 == self.system_count()
    }

    pub fn is_first_measure(&self, key: MeasureKey) -> bool {
        key.measure_index == 0
    }

    pub fn is_last_measure(&self, key: MeasureKey) -> bool {
        key.measure_index + 1 == self.measure_count(key.system())
    }

    pub fn is_first_measure_entry(&self, key: MeasureEntryKey) -> bool {
        key.measure_entry_index == 0
    }

    pub fn is_last_measure_entry(&self, key: MeasureEntryKey) -> bool {
        key.measure_entry_index + 1 == self.measure(key.measure()).entries.len()
    }

    /// The measure entry drawn immediately before `key`, across measure and
    /// system boundaries.
    pub fn previous_measure_entry(&self, key: MeasureEntryKey) -> Option<&MeasureEntry> {
        if key.measure_entry_index > 0 {
            return self.measure(key.measure()).entries.get(key.measure_entry_index - 1);
        }
        let mut system_index = key.system_index;
        let mut measure_index = key.measure_index;
        loop {
            if measure_index > 0 {
                measure_index -= 1;
            } else if system_index > 0 {
                system_index -= 1;
                measure_index = self.score.systems[system_index].measures.len().checked_sub(1)?;
            } else {
                return None;
            }
            let measure = &self.score.systems[system_index].measures[measure_index];
            if let Some(entry) = measure.entries.last() {
                return Some(entry);
            }
        }
    }

    /// Regroup every measure into the systems described by `arrangements`.
    pub fn reflow(&self, arrangements: &[SystemArrangement]) -> Document {
        let measures: Vec<&Measure> = self.measures().collect();
        let mut systems = Vec::with_capacity(arrangements.len());
        for arrangement in arrangements {
            let mut system = System::default();
            for (position, &index) in arrangement.measure_indexes.iter().enumerate() {
                let mut measure = (*at(&measures, index, "measure")).clone();
                if let Some(widths) = arrangement.entry_widths.get(position) {
                    for (entry, width) in measure.entries.iter_mut().zip(widths) {
                        entry.set_width(*width);
                    }
                }
                system.measures.push(measure);
            }
            systems.push(system);
        }
        Document::new(Score { systems, ..self.score.clone_without_systems() })
    }

    /// Insert a gap before entry `entry_index` of the measure with absolute
    /// index `measure_index`. The gap draws staves using the signature in
    /// force at that point.
    pub fn insert_gap(&self, measure_index: usize, entry_index: usize, spec: GapSpec) -> Document {
        let mut score = self.score.clone();
        let mut remaining = measure_index;
        let mut target = None;
        for system in score.systems.iter_mut() {
            if remaining < system.measures.len() {
                target = Some(&mut system.measures[remaining]);
                break;
            }
            remaining -= system.measures.len();
        }
        let measure = target.unwrap_or_else(|| panic!("measure {measure_index} not found"));
        assert!(entry_index <= measure.entries.len(), "gap index {entry_index} out of range");

        let neighbour = measure
            .entries
            .get(entry_index)
            .or_else(|| measure.entries.get(entry_index.wrapping_sub(1)))
            .unwrap_or_else(|| panic!("measure {measure_index} has no entries"));
        let gap = Gap {
            signature: Arc::clone(neighbour.signature()),
            text: spec.text,
            width: spec.width,
            duration_ms: spec.duration_ms,
        };
        measure.entries.insert(entry_index, MeasureEntry::Gap(gap));
        Document::new(score)
    }

    /// Check the structural invariants layout relies on.
    pub fn check_invariants(&self) -> Result<()> {
        let part_count = self.part_count();
        let fail = |message: String| Err(Error::Invariant(message));

        for (measure_index, measure) in self.measures().enumerate() {
            if measure.entries.is_empty() {
                return fail(format!("measure {measure_index} has no entries"));
            }
            let mut expected_start = Fraction::zero();
            for entry in &measure.entries {
                let MeasureEntry::Fragment(fragment) = entry else { continue };
                let signature = &fragment.signature;
                if !signature.is_consistent() {
                    return fail(format!("measure {measure_index}: inconsistent signature"));
                }
                if fragment.parts.len() != part_count || signature.part_count() != part_count {
                    return fail(format!("measure {measure_index}: expected {part_count} part(s)"));
                }
                if fragment.start_beat != expected_start {
                    return fail(format!(
                        "measure {measure_index}: fragment starts at {} instead of {expected_start}",
                        fragment.start_beat
                    ));
                }
                if !expected_start.is_less_than(&fragment.end_beat) {
                    return fail(format!("measure {measure_index}: empty fragment"));
                }
                expected_start = fragment.end_beat;

                for (part_index, part) in fragment.parts.iter().enumerate() {
                    let declared = signature.part(part_index).stave_count;
                    if part.staves.len() != declared || part.stave_count != declared {
                        return fail(format!(
                            "measure {measure_index}, part {part_index}: {} stave(s) but {declared} declared",
                            part.staves.len()
                        ));
                    }
                    for voice in part.staves.iter().flat_map(|s| &s.voices) {
                        self.check_voice(measure_index, voice)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn check_voice(&self, measure_index: usize, voice: &Voice) -> Result<()> {
        let unique = |ids: Vec<&str>| ids.iter().collect::<HashSet<_>>().len() == ids.len();
        let beam_ids: Vec<&str> = voice.beams.iter().map(|b| b.id.as_str()).collect();
        let tuplet_ids: Vec<&str> = voice.tuplets.iter().map(|t| t.id.as_str()).collect();
        if !unique(beam_ids.clone()) || !unique(tuplet_ids.clone()) {
            return Err(Error::Invariant(format!(
                "measure {measure_index}, voice {}: duplicate beam or tuplet declaration",
                voice.id
            )));
        }

        for entry in &voice.entries {
            let dangling = entry.beam_id().filter(|id| !beam_ids.contains(id))
                .or_else(|| entry.tuplet_id().filter(|id| !tuplet_ids.contains(id)))
                .or_else(|| {
                    entry.curve_ids().into_iter().find(|id| !self.score.curves.iter().any(|c| c.id == *id))
                })
                .or_else(|| entry.wedge_id().filter(|id| !self.score.wedges.iter().any(|w| w.id == *id)))
                .or_else(|| {
                    entry
                        .pedal_mark()
                        .map(|m| m.pedal_id.as_str())
                        .filter(|id| !self.score.pedals.iter().any(|p| p.id == *id))
                });
            if let Some(id) = dangling {
                return Err(Error::Invariant(format!(
                    "measure {measure_index}, voice {}: '{id}' has no declaration",
                    voice.id
                )));
            }
        }
        Ok(())
    }
}

impl Score {
    fn clone_without_systems(&self) -> Score {
        Score {
            title: self.title.clone(),
            part_labels: self.part_labels.clone(),
            systems: Vec::new(),
            curves: self.curves.clone(),
            wedges: self.wedges.clone(),
            pedals: self.pedals.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn duration_types_cover_dotted_values() {
        assert_eq!(DurationType::from_fraction(&Fraction::new(1, 4)), (DurationType::Quarter, 0));
        assert_eq!(DurationType::from_fraction(&Fraction::new(3, 8)), (DurationType::Quarter, 1));
        assert_eq!(DurationType::from_fraction(&Fraction::new(7, 16)), (DurationType::Quarter, 2));
        assert_eq!(DurationType::from_fraction(&Fraction::new(2, 1)), (DurationType::Breve, 0));
        assert_eq!(DurationType::Sixteenth.flag_count(), 2);
        assert!(!DurationType::Whole.has_stem());
    }

    #[test]
    fn keys_walk_up_and_down() {
        let entry = SystemKey { system_index: 1 }.measure(2).entry(0).part(1).stave(0).voice(3).entry(4);
        assert_eq!(entry.voice().stave().part().part_index, 1);
        assert_eq!(entry.voice().measure_entry().measure().measure_index, 2);
        assert_eq!(entry.system().system_index, 1);
    }

    #[test]
    fn accidentals_map_to_engraving_codes() {
        assert_eq!(AccidentalCode::from_musicxml("flat-flat").map(|a| a.code()), Some("bb"));
        assert_eq!(AccidentalCode::from_alter(1.0), Some(AccidentalCode::Sharp));
        assert_eq!(AccidentalCode::from_alter(0.0), None);
    }
}
