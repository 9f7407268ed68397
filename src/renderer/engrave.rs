//! Glyph metrics, the drawing capability, and the native objects layout
//! positions.
//!
//! Native objects only know their bounding box once they have been drawn:
//! layout draws them into a [`NoopRenderContext`], reads the boxes, then
//! resets the rendered flag so the real draw still paints them.

use serde::{Deserialize, Serialize};

use super::constants::*;
use super::spatial::{Point, Rect, Size};
use crate::document::{
    AccidentalCode, Annotation, Articulation, ArticulationKind, DurationType, Notehead, Pitch, StemDirection,
};
use crate::signature::{Clef, ClefSign, Key, Time};
use crate::spanners::{Placement, Tuplet};

// ═══════════════════════════════════════════════════════════════════════
// Glyphs and the engraver
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Glyph {
    Clef(ClefSign),
    Accidental(AccidentalCode),
    Notehead { head: Notehead, duration_type: DurationType },
    Rest(DurationType),
    Flag { count: u32, stem_up: bool },
    GraceFlag { count: u32, stem_up: bool },
    Articulation(ArticulationKind),
    /// One stacked time signature component such as `3+2/8` or `C`.
    TimeSignature(String),
}

/// Reports how much room a glyph or a run of text takes.
pub trait Engraver: Send + Sync {
    fn glyph_size(&self, glyph: &Glyph) -> Size;
    fn text_width(&self, text: &str, font_size: f64) -> f64;
}

/// Fixed metrics matching the SVG output.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricEngraver;

impl Engraver for MetricEngraver {
    fn glyph_size(&self, glyph: &Glyph) -> Size {
        match glyph {
            Glyph::Clef(ClefSign::None) => Size::new(0.0, 0.0),
            Glyph::Clef(ClefSign::Percussion | ClefSign::Tab) => Size::new(12.0, 40.0),
            Glyph::Clef(_) => Size::new(CLEF_GLYPH_WIDTH, CLEF_GLYPH_HEIGHT),
            Glyph::Accidental(code) => match code {
                AccidentalCode::Sharp | AccidentalCode::QuarterSharp | AccidentalCode::ThreeQuarterSharp => {
                    Size::new(KEY_SIG_SHARP_SPACE - 2.0, 24.0)
                }
                AccidentalCode::Flat | AccidentalCode::QuarterFlat | AccidentalCode::ThreeQuarterFlat => {
                    Size::new(KEY_SIG_FLAT_SPACE - 2.0, 22.0)
                }
                AccidentalCode::Natural => Size::new(KEY_SIG_NATURAL_SPACE - 2.0, 24.0),
                AccidentalCode::DoubleSharp => Size::new(8.0, 8.0),
                AccidentalCode::DoubleFlat => Size::new(12.0, 22.0),
            },
            Glyph::Notehead { duration_type: DurationType::Whole | DurationType::Breve, .. } => {
                Size::new(WHOLE_NOTEHEAD_RX * 2.0, NOTEHEAD_RY * 2.0)
            }
            Glyph::Notehead { .. } => Size::new(NOTEHEAD_RX * 2.0, NOTEHEAD_RY * 2.0),
            Glyph::Rest(DurationType::Breve | DurationType::Whole | DurationType::Half) => {
                Size::new(BLOCK_REST_WIDTH, BLOCK_REST_HEIGHT)
            }
            Glyph::Rest(DurationType::Quarter) => Size::new(REST_GLYPH_WIDTH, 28.0),
            Glyph::Rest(other) => {
                Size::new(REST_GLYPH_WIDTH, 20.0 + FLAG_SPACING * other.flag_count().saturating_sub(1) as f64)
            }
            Glyph::Flag { count, .. } => {
                Size::new(FLAG_WIDTH, 20.0 + FLAG_SPACING * count.saturating_sub(1) as f64)
            }
            Glyph::GraceFlag { count, stem_up } => {
                self.glyph_size(&Glyph::Flag { count: *count, stem_up: *stem_up }).scale(GRACE_SCALE)
            }
            Glyph::Articulation(kind) => match kind {
                ArticulationKind::Accent => Size::new(10.0, 7.0),
                ArticulationKind::StrongAccent => Size::new(8.0, 9.0),
                ArticulationKind::Staccato => Size::new(DOT_RADIUS * 2.0, DOT_RADIUS * 2.0),
                ArticulationKind::Tenuto => Size::new(11.0, 1.5),
            },
            Glyph::TimeSignature(spec) => {
                let digits = spec.split('/').map(|s| s.chars().count()).max().unwrap_or(1);
                Size::new(digits as f64 * TIME_SIG_DIGIT_WIDTH, 40.0)
            }
        }
    }

    fn text_width(&self, text: &str, font_size: f64) -> f64 {
        text.chars().count() as f64 * font_size * TEXT_CHAR_WIDTH_FACTOR
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Render context
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextAnchor {
    Start,
    Middle,
    End,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedGlyph {
    pub glyph: Glyph,
    /// Center of the glyph.
    pub at: Point,
    pub rect: Rect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedText {
    pub text: String,
    /// Baseline anchor point.
    pub at: Point,
    pub size: f64,
    pub anchor: TextAnchor,
    pub rect: Rect,
}

impl PlacedText {
    pub fn new(text: &str, at: Point, size: f64, anchor: TextAnchor, width: f64) -> Self {
        let left = match anchor {
            TextAnchor::Start => at.x,
            TextAnchor::Middle => at.x - width / 2.0,
            TextAnchor::End => at.x - width,
        };
        Self {
            text: text.to_string(),
            at,
            size,
            anchor,
            rect: Rect::new(left, at.y - size, width, size),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub from: Point,
    pub to: Point,
    pub width: f64,
}

impl LineSegment {
    pub fn new(from: Point, to: Point, width: f64) -> Self {
        Self { from, to, width }
    }

    pub fn rect(&self) -> Rect {
        let half = self.width / 2.0;
        Rect::from_corners(
            self.from.x.min(self.to.x) - half,
            self.from.y.min(self.to.y) - half,
            self.from.x.max(self.to.x) + half,
            self.from.y.max(self.to.y) + half,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedHead {
    pub center: Point,
    pub head: Notehead,
    pub duration_type: DurationType,
    pub rect: Rect,
}

/// What a drawing backend has to provide.
pub trait RenderContext {
    fn line(&mut self, segment: &LineSegment, color: &str);
    fn rect(&mut self, rect: &Rect, fill: &str);
    fn circle(&mut self, center: Point, radius: f64, fill: &str);
    fn path(&mut self, d: &str, fill: &str, stroke: &str, stroke_width: f64);
    fn text(&mut self, text: &PlacedText, fill: &str);
    fn notehead(&mut self, head: &PlacedHead);
    fn glyph(&mut self, glyph: &PlacedGlyph);
}

/// Swallows every call; used for the measuring pass.
#[derive(Debug, Default)]
pub struct NoopRenderContext;

impl RenderContext for NoopRenderContext {
    fn line(&mut self, _: &LineSegment, _: &str) {}
    fn rect(&mut self, _: &Rect, _: &str) {}
    fn circle(&mut self, _: Point, _: f64, _: &str) {}
    fn path(&mut self, _: &str, _: &str, _: &str, _: f64) {}
    fn text(&mut self, _: &PlacedText, _: &str) {}
    fn notehead(&mut self, _: &PlacedHead) {}
    fn glyph(&mut self, _: &PlacedGlyph) {}
}

// ═══════════════════════════════════════════════════════════════════════
// Stave positions
// ═══════════════════════════════════════════════════════════════════════

/// Half-spaces below the top stave line (negative above it).
pub(super) fn pitch_half_space(pitch: &Pitch, clef: &Clef, line_count: u32) -> i32 {
    let (reference, reference_half) = clef.reference(line_count);
    reference_half + (reference - pitch.diatonic_position())
}

pub(super) fn half_space_y(stave_top: f64, line_spacing: f64, half: i32) -> f64 {
    stave_top + half as f64 * line_spacing / 2.0
}

pub(super) fn middle_half_space(line_count: u32) -> i32 {
    line_count.saturating_sub(1) as i32
}

/// Ledger line positions a head at `half` needs, nearest the stave first.
fn ledger_halves(half: i32, bottom_line: i32) -> Vec<i32> {
    if half <= -2 {
        (half..=-2).rev().filter(|h| h % 2 == 0).collect()
    } else if half >= bottom_line + 2 {
        (bottom_line + 2..=half).filter(|h| h % 2 == 0).collect()
    } else {
        Vec::new()
    }
}

/// Offset of a clef's key signature layout from the treble layout.
fn key_offset(clef: &Clef) -> i32 {
    match clef.sign {
        ClefSign::F => 2,
        ClefSign::C => 1 + (3 - clef.line) * 2,
        _ => 0,
    }
}

/// Cancellation naturals followed by the key's own accidentals, each as
/// `(glyph, half-space, advance)`.
pub(super) fn key_signature_glyphs(key: &Key, clef: &Clef) -> Vec<(AccidentalCode, i32, f64)> {
    const SHARPS: [i32; 7] = [0, 3, -1, 2, 5, 1, 4];
    const FLATS: [i32; 7] = [4, 1, 5, 2, 6, 3, 7];
    let offset = key_offset(clef);
    let positions = |fifths: i32| if fifths > 0 { SHARPS } else { FLATS };

    let mut glyphs = Vec::new();
    let cancelled = key.cancellation_natural_count() as usize;
    if let Some(old) = key.previous_fifths.filter(|_| cancelled > 0) {
        let end = (old.unsigned_abs() as usize).min(7);
        let first = end.saturating_sub(cancelled);
        for half in &positions(old)[first..end] {
            glyphs.push((AccidentalCode::Natural, half + offset, KEY_SIG_NATURAL_SPACE));
        }
    }
    let count = key.fifths.unsigned_abs().min(7) as usize;
    let (code, advance) = if key.fifths > 0 {
        (AccidentalCode::Sharp, KEY_SIG_SHARP_SPACE)
    } else {
        (AccidentalCode::Flat, KEY_SIG_FLAT_SPACE)
    };
    for half in &positions(key.fifths)[..count] {
        glyphs.push((code, half + offset, advance));
    }
    glyphs
}

pub(super) fn key_signature_width(key: &Key, clef: &Clef) -> f64 {
    let glyphs = key_signature_glyphs(key, clef);
    if glyphs.is_empty() {
        return 0.0;
    }
    glyphs.iter().map(|(_, _, advance)| advance).sum::<f64>() + KEY_SIGNATURE_PADDING
}

pub(super) fn clef_width(clef: &Clef, engraver: &dyn Engraver) -> f64 {
    match clef.sign {
        ClefSign::None => 0.0,
        sign => engraver.glyph_size(&Glyph::Clef(sign)).w + ADDITIONAL_CLEF_WIDTH,
    }
}

pub(super) fn time_signature_width(time: &Time, engraver: &dyn Engraver) -> f64 {
    let specs = time.to_specs();
    if specs.is_empty() {
        return 0.0;
    }
    let glyphs: f64 = specs
        .iter()
        .map(|spec| engraver.glyph_size(&Glyph::TimeSignature(spec.clone())).w)
        .sum();
    glyphs
        + ADDITIONAL_COMPLEX_TIME_SIGNATURE_COMPONENT_WIDTH * (specs.len() - 1) as f64
        + TIME_SIGNATURE_PADDING
}

// ═══════════════════════════════════════════════════════════════════════
// NativeStave
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaveGeometry {
    pub rect: Rect,
    pub lines: Vec<LineSegment>,
    pub glyphs: Vec<PlacedGlyph>,
    pub texts: Vec<PlacedText>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeStave {
    x: f64,
    top: f64,
    width: f64,
    line_count: u32,
    line_spacing: f64,
    clef: Clef,
    shown_clef: Option<(f64, Size)>,
    shown_key: Option<(Key, f64)>,
    shown_time: Option<(Vec<(String, f64)>, f64)>,
    geometry: Option<StaveGeometry>,
    rendered: bool,
}

impl NativeStave {
    pub fn new(x: f64, top: f64, width: f64, line_count: u32, line_spacing: f64, clef: Clef) -> Self {
        Self {
            x,
            top,
            width,
            line_count,
            line_spacing,
            clef,
            shown_clef: None,
            shown_key: None,
            shown_time: None,
            geometry: None,
            rendered: false,
        }
    }

    pub fn show_clef(&mut self, x: f64, engraver: &dyn Engraver) {
        if self.clef.sign != ClefSign::None {
            self.shown_clef = Some((x, engraver.glyph_size(&Glyph::Clef(self.clef.sign))));
            self.geometry = None;
        }
    }

    pub fn show_key(&mut self, key: Key, x: f64) {
        self.shown_key = Some((key, x));
        self.geometry = None;
    }

    pub fn show_time(&mut self, time: &Time, x: f64, engraver: &dyn Engraver) {
        let specs = time
            .to_specs()
            .into_iter()
            .map(|spec| {
                let width = engraver.glyph_size(&Glyph::TimeSignature(spec.clone())).w;
                (spec, width)
            })
            .collect();
        self.shown_time = Some((specs, x));
        self.geometry = None;
    }

    pub fn top(&self) -> f64 {
        self.top
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height()
    }

    pub fn height(&self) -> f64 {
        self.line_count.saturating_sub(1) as f64 * self.line_spacing
    }

    pub fn line_count(&self) -> u32 {
        self.line_count
    }

    pub fn line_spacing(&self) -> f64 {
        self.line_spacing
    }

    pub fn clef(&self) -> &Clef {
        &self.clef
    }

    fn compute(&self) -> StaveGeometry {
        let x2 = self.x + self.width;
        let lines: Vec<LineSegment> = (0..self.line_count)
            .map(|i| {
                let y = self.top + i as f64 * self.line_spacing;
                LineSegment::new(Point::new(self.x, y), Point::new(x2, y), STAFF_LINE_WIDTH)
            })
            .collect();

        let mut glyphs = Vec::new();
        if let Some((x, size)) = self.shown_clef {
            let line_y = self.top + (self.line_count as i32 - self.clef.line).max(0) as f64 * self.line_spacing;
            let at = Point::new(x + size.w / 2.0, line_y);
            glyphs.push(PlacedGlyph { glyph: Glyph::Clef(self.clef.sign), at, rect: Rect::centered(at, size) });
        }
        if let Some((key, x)) = &self.shown_key {
            let mut cursor = *x;
            for (code, half, advance) in key_signature_glyphs(key, &self.clef) {
                let at = Point::new(cursor + (advance - 2.0) / 2.0, half_space_y(self.top, self.line_spacing, half));
                let size = Size::new(advance - 2.0, self.line_spacing * 2.4);
                glyphs.push(PlacedGlyph { glyph: Glyph::Accidental(code), at, rect: Rect::centered(at, size) });
                cursor += advance;
            }
        }

        let mut texts = Vec::new();
        if let Some((specs, x)) = &self.shown_time {
            let mut cursor = *x;
            let middle = self.top + self.height() / 2.0;
            for (spec, width) in specs {
                let center = cursor + width / 2.0;
                let size = TIME_SIG_FONT_SIZE;
                match spec.split_once('/') {
                    Some((top, bottom)) => {
                        let upper = Point::new(center, middle - 2.0);
                        let lower = Point::new(center, middle + size - 2.0);
                        texts.push(PlacedText::new(top, upper, size, TextAnchor::Middle, *width));
                        texts.push(PlacedText::new(bottom, lower, size, TextAnchor::Middle, *width));
                    }
                    None => {
                        let at = Point::new(center, middle + size / 2.0 - 2.0);
                        texts.push(PlacedText::new(spec, at, size, TextAnchor::Middle, *width));
                    }
                }
                cursor += width + ADDITIONAL_COMPLEX_TIME_SIGNATURE_COMPONENT_WIDTH;
            }
        }

        let body = Rect::new(self.x, self.top, self.width, self.height());
        let rect = Rect::merge_all(
            std::iter::once(&body)
                .chain(glyphs.iter().map(|g| &g.rect))
                .chain(texts.iter().map(|t| &t.rect)),
        )
        .unwrap_or(body);
        StaveGeometry { rect, lines, glyphs, texts }
    }

    pub fn draw(&mut self, ctx: &mut dyn RenderContext) {
        if self.rendered {
            return;
        }
        if self.geometry.is_none() {
            self.geometry = Some(self.compute());
        }
        let geometry = self.geometry();
        for line in &geometry.lines {
            ctx.line(line, STAFF_COLOR);
        }
        for glyph in &geometry.glyphs {
            ctx.glyph(glyph);
        }
        for text in &geometry.texts {
            ctx.text(text, NOTE_COLOR);
        }
        self.rendered = true;
    }

    pub fn bounding_box(&self) -> Rect {
        self.geometry().rect
    }

    pub fn geometry(&self) -> &StaveGeometry {
        self.geometry
            .as_ref()
            .unwrap_or_else(|| panic!("stave measured before it was drawn"))
    }

    pub fn set_rendered(&mut self, rendered: bool) {
        self.rendered = rendered;
    }
}

// ═══════════════════════════════════════════════════════════════════════
// NativeTickable
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadSpec {
    /// Half-spaces below the top stave line.
    pub half: i32,
    pub head: Notehead,
    pub accidental: Option<AccidentalCode>,
}

/// A grace note in front of a tickable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraceSpec {
    pub half: i32,
    pub accidental: Option<AccidentalCode>,
    pub duration_type: DurationType,
    pub slash: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct GraceMetrics {
    head: Size,
    accidental: Option<Size>,
    flag: Size,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct BeamedStem {
    stem_up: bool,
    tip_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickableGeometry {
    pub rect: Rect,
    pub heads: Vec<PlacedHead>,
    pub glyphs: Vec<PlacedGlyph>,
    pub lines: Vec<LineSegment>,
    pub stem: Option<LineSegment>,
    pub stem_up: Option<bool>,
    pub dots: Vec<Point>,
    pub annotations: Vec<PlacedText>,
    pub grace_heads: Vec<PlacedHead>,
    /// Grace stems and slashes.
    pub grace_lines: Vec<LineSegment>,
    pub articulations: Vec<PlacedGlyph>,
}

/// A note, chord or rest placed on a stave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeTickable {
    duration_type: DurationType,
    dot_count: u32,
    stem_direction: StemDirection,
    heads: Vec<HeadSpec>,
    rest_half: Option<i32>,
    annotations: Vec<(Annotation, f64)>,
    graces: Vec<(GraceSpec, GraceMetrics)>,
    articulations: Vec<(Articulation, Size)>,
    head_size: Size,
    accidental_sizes: Vec<Option<Size>>,
    rest_size: Size,
    flag_size: Size,
    x: f64,
    stave_top: f64,
    line_spacing: f64,
    line_count: u32,
    beam: Option<BeamedStem>,
    geometry: Option<TickableGeometry>,
    rendered: bool,
}

impl NativeTickable {
    pub fn note(
        mut heads: Vec<HeadSpec>,
        duration_type: DurationType,
        dot_count: u32,
        stem_direction: StemDirection,
        annotations: &[Annotation],
        engraver: &dyn Engraver,
    ) -> Self {
        assert!(!heads.is_empty(), "a note needs at least one head");
        heads.sort_by_key(|h| h.half);
        let head = heads[0].head;
        let accidental_sizes = heads
            .iter()
            .map(|h| h.accidental.map(|code| engraver.glyph_size(&Glyph::Accidental(code))))
            .collect();
        Self {
            head_size: engraver.glyph_size(&Glyph::Notehead { head, duration_type }),
            accidental_sizes,
            flag_size: engraver.glyph_size(&Glyph::Flag { count: duration_type.flag_count(), stem_up: true }),
            annotations: annotations
                .iter()
                .map(|a| (a.clone(), engraver.text_width(&a.text, ANNOTATION_FONT_SIZE)))
                .collect(),
            heads,
            ..Self::blank(duration_type, dot_count, stem_direction, engraver)
        }
    }

    pub fn rest(half: i32, duration_type: DurationType, dot_count: u32, engraver: &dyn Engraver) -> Self {
        Self {
            rest_half: Some(half),
            ..Self::blank(duration_type, dot_count, StemDirection::None, engraver)
        }
    }

    fn blank(duration_type: DurationType, dot_count: u32, stem_direction: StemDirection, engraver: &dyn Engraver) -> Self {
        Self {
            duration_type,
            dot_count,
            stem_direction,
            heads: Vec::new(),
            rest_half: None,
            annotations: Vec::new(),
            graces: Vec::new(),
            articulations: Vec::new(),
            head_size: Size::default(),
            accidental_sizes: Vec::new(),
            rest_size: engraver.glyph_size(&Glyph::Rest(duration_type)),
            flag_size: Size::default(),
            x: 0.0,
            stave_top: 0.0,
            line_spacing: 10.0,
            line_count: 5,
            beam: None,
            geometry: None,
            rendered: false,
        }
    }

    /// Grace notes drawn small, left of the note, in written order.
    pub fn with_graces(mut self, graces: Vec<GraceSpec>, engraver: &dyn Engraver) -> Self {
        self.graces = graces
            .into_iter()
            .map(|grace| {
                let head = Glyph::Notehead { head: Notehead::Normal, duration_type: DurationType::Quarter };
                let flag = Glyph::GraceFlag { count: grace.duration_type.flag_count().max(1), stem_up: true };
                let metrics = GraceMetrics {
                    head: engraver.glyph_size(&head).scale(GRACE_SCALE),
                    accidental: grace
                        .accidental
                        .map(|code| engraver.glyph_size(&Glyph::Accidental(code)).scale(GRACE_SCALE)),
                    flag: engraver.glyph_size(&flag),
                };
                (grace, metrics)
            })
            .collect();
        self.geometry = None;
        self
    }

    pub fn with_articulations(mut self, articulations: &[Articulation], engraver: &dyn Engraver) -> Self {
        self.articulations = articulations
            .iter()
            .map(|a| (a.clone(), engraver.glyph_size(&Glyph::Articulation(a.kind))))
            .collect();
        self.geometry = None;
        self
    }

    pub fn set_stave(&mut self, top: f64, line_spacing: f64, line_count: u32) {
        self.stave_top = top;
        self.line_spacing = line_spacing;
        self.line_count = line_count;
        self.geometry = None;
    }

    pub fn set_x(&mut self, x: f64) {
        self.x = x;
        self.geometry = None;
    }

    pub fn set_beam(&mut self, stem_up: bool, tip_y: f64) {
        self.beam = Some(BeamedStem { stem_up, tip_y });
        self.geometry = None;
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn is_rest(&self) -> bool {
        self.rest_half.is_some()
    }

    pub fn flag_count(&self) -> u32 {
        self.duration_type.flag_count()
    }

    pub fn has_stem(&self) -> bool {
        !self.is_rest() && self.duration_type.has_stem() && self.stem_direction != StemDirection::None
    }

    /// Room needed left of `x` (accidentals and grace notes).
    pub fn left_px(&self) -> f64 {
        self.grace_offsets().1
    }

    fn accidental_px(&self) -> f64 {
        self.accidental_sizes
            .iter()
            .flatten()
            .map(|s| s.w + ACCIDENTAL_GAP)
            .fold(0.0, f64::max)
    }

    /// Grace stems point up from the middle line down.
    fn grace_stem_up(&self, grace: &GraceSpec) -> bool {
        grace.half >= middle_half_space(self.line_count)
    }

    /// What a grace note draws left of its head: a slash across a down
    /// stem, or ledger lines.
    fn grace_pad(&self, grace: &GraceSpec) -> f64 {
        let slash = if grace.slash && !self.grace_stem_up(grace) { GRACE_SLASH_LENGTH * 0.5 } else { 0.0 };
        let bottom_line = 2 * middle_half_space(self.line_count);
        let ledger = if ledger_halves(grace.half, bottom_line).is_empty() {
            0.0
        } else {
            LEDGER_LINE_EXTEND * GRACE_SCALE
        };
        slash.max(ledger)
    }

    /// Distance from `x` back to each grace head's left edge, and the
    /// total room taken left of `x`.
    fn grace_offsets(&self) -> (Vec<f64>, f64) {
        let mut edge = self.accidental_px();
        if self.graces.is_empty() {
            return (Vec::new(), edge);
        }
        edge += GRACE_GAP;
        let mut offsets = vec![0.0; self.graces.len()];
        for (j, (grace, metrics)) in self.graces.iter().enumerate().rev() {
            edge += GRACE_NOTE_WIDTH;
            offsets[j] = edge;
            edge += self.grace_pad(grace);
            if let Some(size) = metrics.accidental {
                edge += size.w + ACCIDENTAL_GAP * GRACE_SCALE;
            }
        }
        (offsets, edge)
    }

    /// Room needed from `x` rightwards.
    pub fn width(&self) -> f64 {
        let body = if self.is_rest() { self.rest_size.w } else { self.head_size.w };
        let flags = if self.has_stem() && self.flag_count() > 0 { self.flag_size.w } else { 0.0 };
        body + self.dot_count as f64 * DOT_SPACE + flags
    }

    fn body_width(&self) -> f64 {
        if self.is_rest() { self.rest_size.w } else { self.head_size.w }
    }

    /// Stem direction ignoring beams: explicit, else away from the note
    /// farthest from the middle line.
    pub fn natural_stem_up(&self) -> bool {
        match self.stem_direction {
            StemDirection::Up => return true,
            StemDirection::Down => return false,
            _ => {}
        }
        let middle = middle_half_space(self.line_count);
        let lowest = self.heads.iter().map(|h| h.half).max().unwrap_or(middle);
        let highest = self.heads.iter().map(|h| h.half).min().unwrap_or(middle);
        lowest - middle >= middle - highest
    }

    pub fn explicit_stem(&self) -> Option<bool> {
        match self.stem_direction {
            StemDirection::Up => Some(true),
            StemDirection::Down => Some(false),
            _ => None,
        }
    }

    /// Signed distance of the heads from the middle line, positive below.
    pub fn head_balance(&self) -> i32 {
        let middle = middle_half_space(self.line_count);
        self.heads.iter().map(|h| h.half - middle).sum()
    }

    pub fn stem_up(&self) -> bool {
        self.beam.map_or_else(|| self.natural_stem_up(), |b| b.stem_up)
    }

    pub fn stem_x(&self, stem_up: bool) -> f64 {
        if stem_up {
            self.x + self.head_size.w - STEM_WIDTH / 2.0
        } else {
            self.x + STEM_WIDTH / 2.0
        }
    }

    /// Where an unbeamed stem in this direction would end.
    pub fn natural_tip_y(&self, stem_up: bool) -> f64 {
        let y = |half| half_space_y(self.stave_top, self.line_spacing, half);
        let top = self.heads.first().map_or(self.stave_top, |h| y(h.half));
        let bottom = self.heads.last().map_or(self.stave_top, |h| y(h.half));
        if stem_up {
            top - STEM_LENGTH
        } else {
            bottom + STEM_LENGTH
        }
    }

    fn compute(&self) -> TickableGeometry {
        let y_of = |half: i32| half_space_y(self.stave_top, self.line_spacing, half);
        let stave_bottom = self.stave_top + self.line_count.saturating_sub(1) as f64 * self.line_spacing;
        let mut heads = Vec::new();
        let mut glyphs = Vec::new();
        let mut lines = Vec::new();
        let mut dots = Vec::new();
        let mut stem = None;
        let mut stem_up = None;

        let dot_x = |i: u32| self.x + self.body_width() + DOT_SPACE * (i as f64 + 0.5);
        let dot_y = |half: i32| if half % 2 == 0 { y_of(half) - self.line_spacing / 2.0 } else { y_of(half) };

        if let Some(half) = self.rest_half {
            // Whole rests hang from their line, half rests sit on it.
            let drop = match self.duration_type {
                DurationType::Breve | DurationType::Whole => self.rest_size.h / 2.0,
                DurationType::Half => -self.rest_size.h / 2.0,
                _ => 0.0,
            };
            let at = Point::new(self.x + self.rest_size.w / 2.0, y_of(half) + drop);
            glyphs.push(PlacedGlyph {
                glyph: Glyph::Rest(self.duration_type),
                at,
                rect: Rect::centered(at, self.rest_size),
            });
            dots.extend((0..self.dot_count).map(|i| Point::new(dot_x(i), dot_y(half | 1))));
        }

        let center_x = self.x + self.head_size.w / 2.0;
        let bottom_line = 2 * middle_half_space(self.line_count);
        for (spec, accidental) in self.heads.iter().zip(&self.accidental_sizes) {
            let center = Point::new(center_x, y_of(spec.half));
            heads.push(PlacedHead {
                center,
                head: spec.head,
                duration_type: self.duration_type,
                rect: Rect::centered(center, self.head_size),
            });
            if let (Some(code), Some(size)) = (spec.accidental, accidental) {
                let at = Point::new(self.x - ACCIDENTAL_GAP - size.w / 2.0, center.y);
                glyphs.push(PlacedGlyph { glyph: Glyph::Accidental(code), at, rect: Rect::centered(at, *size) });
            }
            lines.extend(ledger_halves(spec.half, bottom_line).into_iter().map(|half| {
                let y = y_of(half);
                LineSegment::new(
                    Point::new(self.x - LEDGER_LINE_EXTEND, y),
                    Point::new(self.x + self.head_size.w + LEDGER_LINE_EXTEND, y),
                    LEDGER_LINE_WIDTH,
                )
            }));
            dots.extend((0..self.dot_count).map(|i| Point::new(dot_x(i), dot_y(spec.half))));
        }

        let mut grace_heads = Vec::new();
        let mut grace_lines = Vec::new();
        for ((grace, metrics), offset) in self.graces.iter().zip(self.grace_offsets().0) {
            let left = self.x - offset;
            let center = Point::new(left + metrics.head.w / 2.0, y_of(grace.half));
            grace_heads.push(PlacedHead {
                center,
                head: Notehead::Normal,
                duration_type: grace.duration_type,
                rect: Rect::centered(center, metrics.head),
            });
            if let (Some(code), Some(size)) = (grace.accidental, metrics.accidental) {
                let at = Point::new(left - self.grace_pad(grace) - ACCIDENTAL_GAP * GRACE_SCALE - size.w / 2.0, center.y);
                glyphs.push(PlacedGlyph { glyph: Glyph::Accidental(code), at, rect: Rect::centered(at, size) });
            }
            let extend = LEDGER_LINE_EXTEND * GRACE_SCALE;
            lines.extend(ledger_halves(grace.half, bottom_line).into_iter().map(|half| {
                let y = y_of(half);
                LineSegment::new(
                    Point::new(left - extend, y),
                    Point::new(left + metrics.head.w + extend, y),
                    LEDGER_LINE_WIDTH,
                )
            }));

            let up = self.grace_stem_up(grace);
            let flags = grace.duration_type.flag_count();
            let length = GRACE_STEM_LENGTH + 3.0 * flags.saturating_sub(1) as f64;
            let (x, tip) = if up {
                (left + metrics.head.w - GRACE_STEM_WIDTH / 2.0, center.y - length)
            } else {
                (left + GRACE_STEM_WIDTH / 2.0, center.y + length)
            };
            grace_lines.push(LineSegment::new(Point::new(x, center.y), Point::new(x, tip), GRACE_STEM_WIDTH));
            if flags > 0 {
                let size = metrics.flag;
                let rect = if up { Rect::new(x, tip, size.w, size.h) } else { Rect::new(x, tip - size.h, size.w, size.h) };
                glyphs.push(PlacedGlyph { glyph: Glyph::GraceFlag { count: flags, stem_up: up }, at: Point::new(x, tip), rect });
            }
            if grace.slash {
                let direction = if up { -1.0 } else { 1.0 };
                let mid = Point::new(x, center.y + direction * length * 0.4);
                let (dx, dy) = (GRACE_SLASH_LENGTH * 0.5, GRACE_SLASH_LENGTH * 0.4);
                grace_lines.push(LineSegment::new(
                    Point::new(mid.x - dx, mid.y + dy),
                    Point::new(mid.x + dx, mid.y - dy),
                    1.0,
                ));
            }
        }

        if self.has_stem() {
            let up = self.stem_up();
            let x = self.stem_x(up);
            let head_y = if up {
                self.heads.last().map_or(self.stave_top, |h| y_of(h.half))
            } else {
                self.heads.first().map_or(self.stave_top, |h| y_of(h.half))
            };
            let tip = self.beam.map_or_else(|| self.natural_tip_y(up), |b| b.tip_y);
            stem = Some(LineSegment::new(Point::new(x, head_y), Point::new(x, tip), STEM_WIDTH));
            stem_up = Some(up);

            if self.beam.is_none() && self.flag_count() > 0 {
                let size = self.flag_size;
                let rect = if up {
                    Rect::new(x, tip, size.w, size.h)
                } else {
                    Rect::new(x, tip - size.h, size.w, size.h)
                };
                glyphs.push(PlacedGlyph {
                    glyph: Glyph::Flag { count: self.flag_count(), stem_up: up },
                    at: Point::new(x, tip),
                    rect,
                });
            }
        }

        // Articulations stack outwards from the principal heads and stem.
        let mut articulations = Vec::new();
        let principal_parts: Vec<Rect> =
            heads.iter().map(|h| h.rect).chain(stem.iter().map(LineSegment::rect)).collect();
        if let Some(principal) = Rect::merge_all(&principal_parts) {
            let center_x = self.x + self.head_size.w / 2.0;
            let (mut above, mut below) = (principal.y, principal.bottom());
            for (articulation, size) in &self.articulations {
                let y = if articulation.placement == Placement::Below {
                    below += ARTICULATION_GAP + size.h;
                    below - size.h / 2.0
                } else {
                    above -= ARTICULATION_GAP + size.h;
                    above + size.h / 2.0
                };
                let at = Point::new(center_x, y);
                articulations.push(PlacedGlyph {
                    glyph: Glyph::Articulation(articulation.kind),
                    at,
                    rect: Rect::centered(at, *size),
                });
            }
        }

        let mut parts: Vec<Rect> = heads.iter().map(|h| h.rect).collect();
        parts.extend(glyphs.iter().map(|g| g.rect));
        parts.extend(lines.iter().map(LineSegment::rect));
        parts.extend(stem.iter().map(LineSegment::rect));
        parts.extend(dots.iter().map(|d| Rect::centered(*d, Size::new(DOT_RADIUS * 2.0, DOT_RADIUS * 2.0))));
        parts.extend(grace_heads.iter().map(|h| h.rect));
        parts.extend(grace_lines.iter().map(LineSegment::rect));
        parts.extend(articulations.iter().map(|a| a.rect));
        let content = Rect::merge_all(&parts).unwrap_or_else(|| Rect::empty(self.x, self.stave_top));

        let mut annotations = Vec::new();
        let mut above_y = content.y.min(self.stave_top) - ANNOTATION_OFFSET;
        let mut below_y = content.bottom().max(stave_bottom) + ANNOTATION_OFFSET + ANNOTATION_FONT_SIZE;
        for (annotation, width) in &self.annotations {
            let y = if annotation.placement == Placement::Below {
                let y = below_y;
                below_y += ANNOTATION_FONT_SIZE + 2.0;
                y
            } else {
                let y = above_y;
                above_y -= ANNOTATION_FONT_SIZE + 2.0;
                y
            };
            annotations.push(PlacedText::new(
                &annotation.text,
                Point::new(self.x, y),
                ANNOTATION_FONT_SIZE,
                TextAnchor::Start,
                *width,
            ));
        }

        let rect = annotations.iter().fold(content, |acc, a| acc.merge(&a.rect));
        TickableGeometry {
            rect,
            heads,
            glyphs,
            lines,
            stem,
            stem_up,
            dots,
            annotations,
            grace_heads,
            grace_lines,
            articulations,
        }
    }

    pub fn draw(&mut self, ctx: &mut dyn RenderContext) {
        if self.rendered {
            return;
        }
        if self.geometry.is_none() {
            self.geometry = Some(self.compute());
        }
        let geometry = self.geometry();
        for line in &geometry.lines {
            ctx.line(line, STAFF_COLOR);
        }
        for head in geometry.heads.iter().chain(&geometry.grace_heads) {
            ctx.notehead(head);
        }
        for line in geometry.stem.iter().chain(&geometry.grace_lines) {
            ctx.line(line, NOTE_COLOR);
        }
        for glyph in geometry.glyphs.iter().chain(&geometry.articulations) {
            ctx.glyph(glyph);
        }
        for dot in &geometry.dots {
            ctx.circle(*dot, DOT_RADIUS, NOTE_COLOR);
        }
        for text in &geometry.annotations {
            ctx.text(text, TEXT_COLOR);
        }
        self.rendered = true;
    }

    pub fn bounding_box(&self) -> Rect {
        self.geometry().rect
    }

    pub fn geometry(&self) -> &TickableGeometry {
        self.geometry
            .as_ref()
            .unwrap_or_else(|| panic!("tickable measured before it was drawn"))
    }

    pub fn set_rendered(&mut self, rendered: bool) {
        self.rendered = rendered;
    }
}

// ═══════════════════════════════════════════════════════════════════════
// NativeBeam
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeBeam {
    pub segments: Vec<LineSegment>,
    pub rect: Rect,
    rendered: bool,
}

impl NativeBeam {
    /// Put the stems of `tickables` on one beam line. Returns `None` when
    /// fewer than two of them carry a stem.
    pub fn resolve(tickables: &mut [&mut NativeTickable]) -> Option<NativeBeam> {
        let stemmed: Vec<usize> = (0..tickables.len()).filter(|&i| tickables[i].has_stem()).collect();
        if stemmed.len() < 2 {
            return None;
        }

        let stem_up = stemmed
            .iter()
            .find_map(|&i| tickables[i].explicit_stem())
            .unwrap_or_else(|| stemmed.iter().map(|&i| tickables[i].head_balance()).sum::<i32>() >= 0);

        let xs: Vec<f64> = stemmed.iter().map(|&i| tickables[i].stem_x(stem_up)).collect();
        let tips: Vec<f64> = stemmed.iter().map(|&i| tickables[i].natural_tip_y(stem_up)).collect();
        let last = stemmed.len() - 1;
        let dx = (xs[last] - xs[0]).max(1.0);
        let slope = ((tips[last] - tips[0]) / dx).clamp(-BEAM_MAX_SLOPE, BEAM_MAX_SLOPE);
        let line = |x: f64| tips[0] + slope * (x - xs[0]);

        // Every stem keeps at least its natural length.
        let shift = xs
            .iter()
            .zip(&tips)
            .map(|(&x, &tip)| if stem_up { line(x) - tip } else { tip - line(x) })
            .fold(0.0, f64::max);
        let beam_y = |x: f64| if stem_up { line(x) - shift } else { line(x) + shift };

        for (&i, &x) in stemmed.iter().zip(&xs) {
            tickables[i].set_beam(stem_up, beam_y(x));
        }

        let toward_heads = if stem_up { 1.0 } else { -1.0 };
        let mut segments = vec![LineSegment::new(
            Point::new(xs[0], beam_y(xs[0])),
            Point::new(xs[last], beam_y(xs[last])),
            BEAM_THICKNESS,
        )];

        let levels: Vec<u32> = stemmed.iter().map(|&i| tickables[i].flag_count()).collect();
        let deepest = levels.iter().copied().max().unwrap_or(1);
        for level in 2..=deepest {
            let offset = (level - 1) as f64 * BEAM_SPACING * toward_heads;
            let mut run_start: Option<usize> = None;
            for k in 0..=levels.len() {
                let inside = k < levels.len() && levels[k] >= level;
                match (inside, run_start) {
                    (true, None) => run_start = Some(k),
                    (false, Some(start)) => {
                        let end = k - 1;
                        let (x1, x2) = if start < end {
                            (xs[start], xs[end])
                        } else if start == 0 {
                            (xs[start], xs[start] + BEAM_HOOK_LENGTH)
                        } else {
                            (xs[start] - BEAM_HOOK_LENGTH, xs[start])
                        };
                        segments.push(LineSegment::new(
                            Point::new(x1, beam_y(x1) + offset),
                            Point::new(x2, beam_y(x2) + offset),
                            BEAM_THICKNESS,
                        ));
                        run_start = None;
                    }
                    _ => {}
                }
            }
        }

        let rect = Rect::merge_all(&segments.iter().map(LineSegment::rect).collect::<Vec<_>>())?;
        Some(NativeBeam { segments, rect, rendered: false })
    }

    pub fn draw(&mut self, ctx: &mut dyn RenderContext) {
        if self.rendered {
            return;
        }
        for segment in &self.segments {
            ctx.line(segment, NOTE_COLOR);
        }
        self.rendered = true;
    }

    pub fn set_rendered(&mut self, rendered: bool) {
        self.rendered = rendered;
    }
}

// ═══════════════════════════════════════════════════════════════════════
// NativeTuplet
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeTuplet {
    pub lines: Vec<LineSegment>,
    pub label: Option<PlacedText>,
    pub rect: Rect,
    rendered: bool,
}

impl NativeTuplet {
    /// Bracket over (or under) the measured `boxes` of the tuplet's entries.
    pub fn new(
        tuplet: &Tuplet,
        boxes: &[Rect],
        stem_up: Option<bool>,
        stave: (f64, f64),
        engraver: &dyn Engraver,
    ) -> Self {
        let above = match tuplet.placement {
            Placement::Above => true,
            Placement::Below => false,
            Placement::Auto => stem_up != Some(false),
        };
        let (stave_top, stave_bottom) = stave;
        let x1 = boxes.iter().map(|r| r.x).fold(f64::MAX, f64::min);
        let x2 = boxes.iter().map(|r| r.right()).fold(f64::MIN, f64::max);
        let (y, hook) = if above {
            let top = boxes.iter().map(|r| r.y).fold(stave_top, f64::min);
            (top - TUPLET_OFFSET, TUPLET_HOOK)
        } else {
            let bottom = boxes.iter().map(|r| r.bottom()).fold(stave_bottom, f64::max);
            (bottom + TUPLET_OFFSET, -TUPLET_HOOK)
        };

        let number = tuplet
            .ratio
            .map(|(actual, _)| actual.to_string())
            .unwrap_or_else(|| boxes.len().to_string());
        let middle = (x1 + x2) / 2.0;
        let label = tuplet.show_number.then(|| {
            let width = engraver.text_width(&number, TUPLET_FONT_SIZE);
            PlacedText::new(
                &number,
                Point::new(middle, y + TUPLET_FONT_SIZE / 2.0 - 1.0),
                TUPLET_FONT_SIZE,
                TextAnchor::Middle,
                width,
            )
        });
        let gap = label.as_ref().map_or(0.0, |l| l.rect.w / 2.0 + 3.0);

        let w = BARLINE_WIDTH;
        let lines = vec![
            LineSegment::new(Point::new(x1, y + hook), Point::new(x1, y), w),
            LineSegment::new(Point::new(x1, y), Point::new(middle - gap, y), w),
            LineSegment::new(Point::new(middle + gap, y), Point::new(x2, y), w),
            LineSegment::new(Point::new(x2, y), Point::new(x2, y + hook), w),
        ];
        let rect = lines
            .iter()
            .map(LineSegment::rect)
            .chain(label.iter().map(|l| l.rect))
            .reduce(|a, b| a.merge(&b))
            .unwrap_or_else(|| Rect::empty(x1, y));
        Self { lines, label, rect, rendered: false }
    }

    pub fn draw(&mut self, ctx: &mut dyn RenderContext) {
        if self.rendered {
            return;
        }
        for line in &self.lines {
            ctx.line(line, NOTE_COLOR);
        }
        if let Some(label) = &self.label {
            ctx.text(label, NOTE_COLOR);
        }
        self.rendered = true;
    }

    pub fn set_rendered(&mut self, rendered: bool) {
        self.rendered = rendered;
    }
}

// ═══════════════════════════════════════════════════════════════════════
// NativeMultiRest
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeMultiRest {
    pub bar: Rect,
    pub ticks: Vec<LineSegment>,
    pub label: PlacedText,
    pub rect: Rect,
    rendered: bool,
}

impl NativeMultiRest {
    pub fn new(count: u32, x1: f64, x2: f64, stave: &NativeStave, engraver: &dyn Engraver) -> Self {
        let middle = stave.top() + stave.height() / 2.0;
        let left = x1 + MULTI_REST_INSET;
        let right = (x2 - MULTI_REST_INSET).max(left);
        let bar = Rect::new(left, middle - MULTI_REST_HEIGHT / 2.0, right - left, MULTI_REST_HEIGHT);
        let tick = stave.line_spacing();
        let ticks = vec![
            LineSegment::new(Point::new(left, middle - tick), Point::new(left, middle + tick), BARLINE_WIDTH),
            LineSegment::new(Point::new(right, middle - tick), Point::new(right, middle + tick), BARLINE_WIDTH),
        ];
        let text = count.to_string();
        let label = PlacedText::new(
            &text,
            Point::new((left + right) / 2.0, stave.top() - 6.0),
            MULTI_REST_FONT_SIZE,
            TextAnchor::Middle,
            engraver.text_width(&text, MULTI_REST_FONT_SIZE),
        );
        let rect = ticks
            .iter()
            .map(LineSegment::rect)
            .fold(bar.merge(&label.rect), |acc, r| acc.merge(&r));
        Self { bar, ticks, label, rect, rendered: false }
    }

    pub fn draw(&mut self, ctx: &mut dyn RenderContext) {
        if self.rendered {
            return;
        }
        ctx.rect(&self.bar, NOTE_COLOR);
        for tick in &self.ticks {
            ctx.line(tick, NOTE_COLOR);
        }
        ctx.text(&self.label, NOTE_COLOR);
        self.rendered = true;
    }

    pub fn set_rendered(&mut self, rendered: bool) {
        self.rendered = rendered;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::KeyMode;
    use pretty_assertions::assert_eq;

    fn quarter(half: i32) -> NativeTickable {
        let head = HeadSpec { half, head: Notehead::Normal, accidental: None };
        let mut tickable = NativeTickable::note(
            vec![head],
            DurationType::Eighth,
            0,
            StemDirection::Auto,
            &[],
            &MetricEngraver,
        );
        tickable.set_stave(0.0, 10.0, 5);
        tickable
    }

    #[test]
    fn treble_positions_follow_the_clef() {
        let clef = Clef::treble();
        assert_eq!(pitch_half_space(&Pitch::new('F', 5), &clef, 5), 0);
        assert_eq!(pitch_half_space(&Pitch::new('B', 4), &clef, 5), 4);
        assert_eq!(pitch_half_space(&Pitch::new('D', 3), &Clef::bass(), 5), 4);
    }

    #[test]
    fn bounding_box_requires_a_draw() {
        let mut tickable = quarter(4);
        tickable.set_x(100.0);
        tickable.draw(&mut NoopRenderContext);
        let rect = tickable.bounding_box();
        assert!(rect.x <= 100.0 && rect.right() > 100.0);
        assert_eq!(tickable.geometry().stem_up, Some(true));
    }

    #[test]
    #[should_panic(expected = "measured before it was drawn")]
    fn undrawn_tickable_has_no_box() {
        quarter(4).bounding_box();
    }

    #[test]
    fn beam_aligns_stem_tips() {
        let mut a = quarter(6);
        let mut b = quarter(2);
        a.set_x(0.0);
        b.set_x(40.0);
        let beam = NativeBeam::resolve(&mut [&mut a, &mut b]).unwrap();
        assert_eq!(beam.segments.len(), 1);
        a.draw(&mut NoopRenderContext);
        b.draw(&mut NoopRenderContext);
        let tip = |t: &NativeTickable| t.geometry().stem.map(|s| s.to).unwrap();
        let (ta, tb) = (tip(&a), tip(&b));
        let slope = (tb.y - ta.y) / (tb.x - ta.x);
        assert!(slope.abs() <= BEAM_MAX_SLOPE + 1e-9);
        assert_eq!(beam.segments[0].from, ta);
    }

    #[test]
    fn key_change_lists_naturals_first() {
        let key = Key { previous_fifths: Some(3), ..Key::new(1, KeyMode::Major) };
        let glyphs = key_signature_glyphs(&key, &Clef::treble());
        let codes: Vec<AccidentalCode> = glyphs.iter().map(|g| g.0).collect();
        assert_eq!(
            codes,
            vec![AccidentalCode::Natural, AccidentalCode::Natural, AccidentalCode::Sharp]
        );
    }

    #[test]
    fn oversized_keys_cancel_within_seven_positions() {
        let key = Key { previous_fifths: Some(9), ..Key::new(8, KeyMode::Major) };
        let glyphs = key_signature_glyphs(&key, &Clef::treble());
        let naturals = glyphs.iter().filter(|g| g.0 == AccidentalCode::Natural).count();
        assert_eq!(naturals, 1);
        assert_eq!(glyphs.len(), 8);

        let key = Key { previous_fifths: Some(-10), ..Key::new(2, KeyMode::Major) };
        let glyphs = key_signature_glyphs(&key, &Clef::treble());
        let naturals = glyphs.iter().filter(|g| g.0 == AccidentalCode::Natural).count();
        assert_eq!(naturals, 7);
    }

    #[test]
    fn grace_notes_sit_small_and_left_of_the_note() {
        let grace = |half, slash| GraceSpec { half, accidental: None, duration_type: DurationType::Eighth, slash };
        let mut plain = quarter(4);
        let mut tickable = quarter(4).with_graces(vec![grace(3, true), grace(2, false)], &MetricEngraver);
        assert!(tickable.left_px() >= 2.0 * GRACE_NOTE_WIDTH);
        assert_eq!(plain.left_px(), 0.0);

        plain.set_x(100.0);
        tickable.set_x(100.0);
        plain.draw(&mut NoopRenderContext);
        tickable.draw(&mut NoopRenderContext);
        let geometry = tickable.geometry();
        assert_eq!(geometry.grace_heads.len(), 2);
        let xs: Vec<f64> = geometry.grace_heads.iter().map(|h| h.center.x).collect();
        assert!(xs[0] < xs[1] && xs[1] < 100.0, "grace heads at {xs:?}");
        assert!(geometry.grace_heads[0].rect.w < geometry.heads[0].rect.w);
        // Two stems plus one slash.
        assert_eq!(geometry.grace_lines.len(), 3);
        assert!(tickable.bounding_box().x < plain.bounding_box().x);
        assert!(tickable.bounding_box().x >= 100.0 - tickable.left_px() - 1e-9);
    }

    #[test]
    fn articulations_stack_away_from_the_head() {
        let staccato = Articulation { kind: ArticulationKind::Staccato, placement: Placement::Below };
        let tenuto = Articulation { kind: ArticulationKind::Tenuto, placement: Placement::Below };
        let accent = Articulation { kind: ArticulationKind::Accent, placement: Placement::Auto };
        let mut plain = quarter(4);
        let mut marked = quarter(4).with_articulations(&[staccato, tenuto, accent], &MetricEngraver);
        plain.draw(&mut NoopRenderContext);
        marked.draw(&mut NoopRenderContext);

        let placed = &marked.geometry().articulations;
        assert_eq!(placed.len(), 3);
        let head = marked.geometry().heads[0].rect;
        assert!(placed[0].rect.y >= head.bottom());
        assert!(placed[1].rect.y >= placed[0].rect.bottom());
        assert!(placed[2].rect.bottom() <= marked.geometry().stem.map(|s| s.rect().y).unwrap_or(head.y));
        assert!(marked.bounding_box().bottom() > plain.bounding_box().bottom());
        assert!(marked.bounding_box().y < plain.bounding_box().y);
    }

    #[test]
    fn ledger_lines_fill_towards_the_stave() {
        assert_eq!(ledger_halves(-5, 8), vec![-2, -4]);
        assert_eq!(ledger_halves(12, 8), vec![10, 12]);
        assert!(ledger_halves(4, 8).is_empty());
    }
}
