//! The render tree: every node of a laid-out score with its geometry.
//!
//! Rects are absolute, in SVG user units, with `y` growing downwards.
//! The native objects own the detailed geometry the SVG writer needs.

use serde::{Deserialize, Serialize};

use super::engrave::{
    LineSegment, NativeBeam, NativeMultiRest, NativeStave, NativeTickable, NativeTuplet, PlacedText,
};
use super::spatial::{Point, Rect};
use crate::document::{
    BeamKey, CurveKey, MeasureEntryKey, MeasureKey, PartKey, PedalKey, StaveKey, SystemKey, TupletKey,
    VoiceEntryKey, VoiceKey, WedgeKey,
};
use crate::fraction::Fraction;
use crate::spanners::{CurveKind, PedalKind, WedgeKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRender {
    pub rect: Rect,
    pub title: Option<PlacedText>,
    pub systems: Vec<SystemRender>,
    pub curves: Vec<CurveRender>,
    pub wedges: Vec<WedgeRender>,
    pub pedals: Vec<PedalRender>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemRender {
    pub key: SystemKey,
    pub rect: Rect,
    pub measures: Vec<MeasureRender>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureRender {
    pub key: MeasureKey,
    pub rect: Rect,
    pub absolute_index: usize,
    /// Measure number shown at the start of a system.
    pub label: Option<PlacedText>,
    pub entries: Vec<MeasureEntryRender>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MeasureEntryRender {
    Fragment(FragmentRender),
    Gap(GapRender),
}

impl MeasureEntryRender {
    pub fn rect(&self) -> Rect {
        match self {
            MeasureEntryRender::Fragment(f) => f.rect,
            MeasureEntryRender::Gap(g) => g.rect,
        }
    }

    pub fn key(&self) -> MeasureEntryKey {
        match self {
            MeasureEntryRender::Fragment(f) => f.key,
            MeasureEntryRender::Gap(g) => g.key,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentRender {
    pub key: MeasureEntryKey,
    pub rect: Rect,
    /// Horizontal room the fragment takes in its system.
    pub layout_width: f64,
    /// How far content pokes above the fragment's top stave.
    pub excess_height: f64,
    pub parts: Vec<PartRender>,
    pub connectors: Vec<ConnectorRender>,
    pub part_labels: Vec<PlacedText>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapRender {
    pub key: MeasureEntryKey,
    pub rect: Rect,
    pub text: Option<PlacedText>,
    pub staves: Vec<NativeStave>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartRender {
    pub key: PartKey,
    pub rect: Rect,
    pub staves: Vec<StaveRender>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaveRender {
    pub key: StaveKey,
    pub rect: Rect,
    pub native: NativeStave,
    pub voices: Vec<VoiceRender>,
    pub multi_rest: Option<NativeMultiRest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceRender {
    pub key: VoiceKey,
    pub rect: Rect,
    pub entries: Vec<VoiceEntryRender>,
    pub beams: Vec<BeamRender>,
    pub tuplets: Vec<TupletRender>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceEntryRender {
    pub key: VoiceEntryKey,
    pub rect: Rect,
    pub measure_beat: Fraction,
    pub native: NativeTickable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeamRender {
    pub key: BeamKey,
    pub id: String,
    pub rect: Rect,
    pub entry_keys: Vec<VoiceEntryKey>,
    pub native: NativeBeam,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TupletRender {
    pub key: TupletKey,
    pub id: String,
    pub rect: Rect,
    pub entry_keys: Vec<VoiceEntryKey>,
    pub native: NativeTuplet,
}

/// A bezier arc, one per system a slur or tie crosses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveSegment {
    pub system_index: usize,
    pub start: Point,
    pub end: Point,
    pub control1: Point,
    pub control2: Point,
    /// The inner edge; the arc is filled between both edges.
    pub inner_start: Point,
    pub inner_end: Point,
    pub inner1: Point,
    pub inner2: Point,
    pub rect: Rect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveRender {
    pub key: CurveKey,
    pub id: String,
    pub kind: CurveKind,
    pub rect: Rect,
    pub entry_keys: Vec<VoiceEntryKey>,
    pub segments: Vec<CurveSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WedgeSegment {
    pub system_index: usize,
    pub lines: Vec<LineSegment>,
    pub rect: Rect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WedgeRender {
    pub key: WedgeKey,
    pub id: String,
    pub kind: WedgeKind,
    pub rect: Rect,
    pub entry_keys: Vec<VoiceEntryKey>,
    pub segments: Vec<WedgeSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PedalSegment {
    pub system_index: usize,
    pub lines: Vec<LineSegment>,
    pub texts: Vec<PlacedText>,
    pub rect: Rect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PedalRender {
    pub key: PedalKey,
    pub id: String,
    pub kind: PedalKind,
    pub rect: Rect,
    pub entry_keys: Vec<VoiceEntryKey>,
    pub segments: Vec<PedalSegment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectorKind {
    SingleLeft,
    SingleRight,
    Double,
    BoldDoubleRight,
    RepeatStart,
    RepeatEnd,
    Brace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorRender {
    pub kind: ConnectorKind,
    pub rect: Rect,
    /// Repeat dots, two per stave.
    pub dots: Vec<Point>,
}
