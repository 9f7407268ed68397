//! Score-level spanners: slurs, ties, wedges and pedals.
//!
//! These are drawn once every system is in place, from the rendered
//! entries that reference them. A spanner crossing a line break gets one
//! segment per system it touches.

use std::collections::{BTreeMap, HashMap};

use super::constants::*;
use super::engrave::{Engraver, LineSegment, NativeStave, PlacedText, TextAnchor};
use super::spatial::{Point, Rect};
use super::types::{
    BeamRender, CurveRender, CurveSegment, MeasureEntryRender, PedalRender, PedalSegment, ScoreRender,
    SystemRender, TupletRender, VoiceEntryRender, WedgeRender, WedgeSegment,
};
use crate::document::{CurveKey, Document, PedalKey, VoiceEntryKey, WedgeKey};
use crate::spanners::{CurveOpening, PedalKind, PedalMarkKind, Placement, WedgeKind};

/// A rendered entry together with the stave it sits on.
#[derive(Clone, Copy)]
struct Anchor<'r> {
    entry: &'r VoiceEntryRender,
    stave: &'r NativeStave,
}

impl Anchor<'_> {
    fn system_index(&self) -> usize {
        self.entry.key.system_index
    }

    fn above(&self) -> f64 {
        self.stave.top().min(self.entry.rect.y)
    }

    fn below(&self) -> f64 {
        self.stave.bottom().max(self.entry.rect.bottom())
    }
}

fn anchors(systems: &[SystemRender]) -> Vec<Anchor<'_>> {
    systems
        .iter()
        .flat_map(|system| &system.measures)
        .flat_map(|measure| &measure.entries)
        .filter_map(|entry| match entry {
            MeasureEntryRender::Fragment(fragment) => Some(fragment),
            MeasureEntryRender::Gap(_) => None,
        })
        .flat_map(|fragment| &fragment.parts)
        .flat_map(|part| &part.staves)
        .flat_map(|stave| {
            stave
                .voices
                .iter()
                .flat_map(|voice| &voice.entries)
                .map(move |entry| Anchor { entry, stave: &stave.native })
        })
        .collect()
}

/// Left and right edge of every system.
fn edges(systems: &[SystemRender]) -> HashMap<usize, (f64, f64)> {
    systems
        .iter()
        .map(|system| (system.key.system_index, (system.rect.x, system.rect.right())))
        .collect()
}

/// Split a spanner's anchors into per-system runs, left to right.
fn by_system<'r, T: Copy>(items: &[T], anchor: impl Fn(&T) -> Anchor<'r>) -> Vec<(usize, Vec<T>)> {
    let mut groups: BTreeMap<usize, Vec<T>> = BTreeMap::new();
    for item in items {
        groups.entry(anchor(item).system_index()).or_default().push(*item);
    }
    groups
        .into_iter()
        .map(|(system_index, mut group)| {
            group.sort_by(|a, b| anchor(a).entry.rect.x.total_cmp(&anchor(b).entry.rect.x));
            (system_index, group)
        })
        .collect()
}

fn points_rect(points: &[Point]) -> Rect {
    let (mut left, mut top) = (f64::MAX, f64::MAX);
    let (mut right, mut bottom) = (f64::MIN, f64::MIN);
    for p in points {
        left = left.min(p.x);
        right = right.max(p.x);
        top = top.min(p.y);
        bottom = bottom.max(p.y);
    }
    Rect::from_corners(left, top, right, bottom)
}

fn segments_rect<'a>(rects: impl IntoIterator<Item = &'a Rect>) -> Rect {
    Rect::merge_all(rects).unwrap_or_default()
}

// ═══════════════════════════════════════════════════════════════════════
// Curves
// ═══════════════════════════════════════════════════════════════════════

pub(super) fn render_curves(document: &Document, systems: &[SystemRender]) -> Vec<CurveRender> {
    let mut registry: HashMap<&str, Vec<Anchor>> = HashMap::new();
    for anchor in anchors(systems) {
        let mut ids = document.voice_entry(anchor.entry.key).curve_ids();
        ids.dedup();
        for id in ids {
            registry.entry(id).or_default().push(anchor);
        }
    }
    let edges = edges(systems);

    let mut renders = Vec::new();
    for (curve_index, curve) in document.curves().iter().enumerate() {
        let Some(anchors) = registry.get(curve.id.as_str()) else {
            log::trace!("curve {} has no rendered entry, dropped", curve.id);
            continue;
        };
        let above = match (curve.placement, curve.opening) {
            (Placement::Above, _) => true,
            (Placement::Below, _) => false,
            (Placement::Auto, CurveOpening::Down) => true,
            (Placement::Auto, CurveOpening::Up) => false,
            (Placement::Auto, CurveOpening::Auto) => !anchors[0].entry.native.stem_up(),
        };

        let groups = by_system(anchors, |a| *a);
        let single = anchors.len() == 1;
        let segments: Vec<CurveSegment> = groups
            .iter()
            .enumerate()
            .map(|(position, (system_index, group))| {
                let (left, right) = edges.get(system_index).copied().unwrap_or_default();
                let first = curve_point(&group[0], above);
                let last = curve_point(&group[group.len() - 1], above);
                let start = if position == 0 { first } else { Point::new(left, last.y) };
                let end = if position + 1 < groups.len() {
                    Point::new(right, first.y)
                } else if single {
                    Point::new(first.x + CURVE_STUB_WIDTH, first.y)
                } else {
                    last
                };
                arc(*system_index, start, end, above)
            })
            .collect();

        renders.push(CurveRender {
            key: CurveKey { curve_index },
            id: curve.id.clone(),
            kind: curve.kind,
            rect: segments_rect(segments.iter().map(|s| &s.rect)),
            entry_keys: anchors.iter().map(|a| a.entry.key).collect(),
            segments,
        });
    }
    renders
}

/// Where a curve leaves a note: just outside the outermost head.
fn curve_point(anchor: &Anchor, above: bool) -> Point {
    let geometry = anchor.entry.native.geometry();
    let heads = geometry.heads.iter();
    let head = if above {
        heads.min_by(|a, b| a.center.y.total_cmp(&b.center.y))
    } else {
        heads.max_by(|a, b| a.center.y.total_cmp(&b.center.y))
    };
    let direction = if above { -1.0 } else { 1.0 };
    match head {
        Some(head) => Point::new(head.center.x, head.center.y + direction * SLUR_NOTEHEAD_Y_OFFSET),
        None => {
            let rect = anchor.entry.rect;
            Point::new(rect.center().x, if above { rect.y } else { rect.bottom() })
        }
    }
}

/// A filled double-bezier arc between two points.
fn arc(system_index: usize, start: Point, end: Point, above: bool) -> CurveSegment {
    let direction = if above { -1.0 } else { 1.0 };
    let dx = (end.x - start.x).abs().max(1.0);
    let height = (dx * SLUR_HEIGHT_FACTOR).clamp(SLUR_MIN_HEIGHT, SLUR_MAX_HEIGHT);
    let mid_y = (start.y + end.y) / 2.0;

    let control1 = Point::new(start.x + dx * 0.25, mid_y + direction * height);
    let control2 = Point::new(start.x + dx * 0.75, mid_y + direction * height);
    let shift = |p: Point, by: f64| Point::new(p.x, p.y + direction * by);
    let inner_start = shift(start, SLUR_ENDPOINT_THICKNESS);
    let inner_end = shift(end, SLUR_ENDPOINT_THICKNESS);
    let inner1 = shift(control1, SLUR_MID_THICKNESS);
    let inner2 = shift(control2, SLUR_MID_THICKNESS);

    // The control polygon contains the bezier.
    let rect = points_rect(&[start, end, control1, control2, inner1, inner2]);
    CurveSegment { system_index, start, end, control1, control2, inner_start, inner_end, inner1, inner2, rect }
}

// ═══════════════════════════════════════════════════════════════════════
// Wedges
// ═══════════════════════════════════════════════════════════════════════

pub(super) fn render_wedges(document: &Document, systems: &[SystemRender]) -> Vec<WedgeRender> {
    let mut registry: HashMap<&str, Vec<Anchor>> = HashMap::new();
    for anchor in anchors(systems) {
        if let Some(id) = document.voice_entry(anchor.entry.key).wedge_id() {
            registry.entry(id).or_default().push(anchor);
        }
    }
    let edges = edges(systems);

    let mut renders = Vec::new();
    for (wedge_index, wedge) in document.wedges().iter().enumerate() {
        let Some(anchors) = registry.get(wedge.id.as_str()) else {
            log::trace!("wedge {} has no rendered entry, dropped", wedge.id);
            continue;
        };
        let above = wedge.placement == Placement::Above;
        let groups = by_system(anchors, |a| *a);
        let half = WEDGE_OPENING / 2.0;

        let segments: Vec<WedgeSegment> = groups
            .iter()
            .enumerate()
            .map(|(position, (system_index, group))| {
                let (left, right) = edges.get(system_index).copied().unwrap_or_default();
                let is_first = position == 0;
                let is_last = position + 1 == groups.len();
                let x1 = if is_first { group[0].entry.rect.x } else { left };
                let x2 = if is_last { group[group.len() - 1].entry.rect.right() } else { right };
                let y = if above {
                    group.iter().map(Anchor::above).fold(f64::MAX, f64::min) - WEDGE_OFFSET
                } else {
                    group.iter().map(Anchor::below).fold(f64::MIN, f64::max) + WEDGE_OFFSET
                };

                // A segment continuing over a line break stays half open there.
                let closed_end = if is_first { 0.0 } else { half / 2.0 };
                let open_end = if is_last { half } else { half / 2.0 };
                let (start, end) = match wedge.kind {
                    WedgeKind::Crescendo => (closed_end, open_end),
                    WedgeKind::Diminuendo => (
                        if is_first { half } else { half / 2.0 },
                        if is_last { 0.0 } else { half / 2.0 },
                    ),
                };
                let lines = vec![
                    LineSegment::new(Point::new(x1, y - start), Point::new(x2, y - end), SPANNER_LINE_WIDTH),
                    LineSegment::new(Point::new(x1, y + start), Point::new(x2, y + end), SPANNER_LINE_WIDTH),
                ];
                let rect = segments_rect(&lines.iter().map(LineSegment::rect).collect::<Vec<_>>());
                WedgeSegment { system_index: *system_index, lines, rect }
            })
            .collect();

        renders.push(WedgeRender {
            key: WedgeKey { wedge_index },
            id: wedge.id.clone(),
            kind: wedge.kind,
            rect: segments_rect(segments.iter().map(|s| &s.rect)),
            entry_keys: anchors.iter().map(|a| a.entry.key).collect(),
            segments,
        });
    }
    renders
}

// ═══════════════════════════════════════════════════════════════════════
// Pedals
// ═══════════════════════════════════════════════════════════════════════

pub(super) fn render_pedals(
    document: &Document,
    systems: &[SystemRender],
    engraver: &dyn Engraver,
) -> Vec<PedalRender> {
    let mut registry: HashMap<&str, Vec<(Anchor, PedalMarkKind)>> = HashMap::new();
    for anchor in anchors(systems) {
        if let Some(mark) = document.voice_entry(anchor.entry.key).pedal_mark() {
            registry.entry(mark.pedal_id.as_str()).or_default().push((anchor, mark.kind));
        }
    }
    let edges = edges(systems);

    let mut renders = Vec::new();
    for (pedal_index, pedal) in document.pedals().iter().enumerate() {
        let Some(marks) = registry.get(pedal.id.as_str()) else {
            log::trace!("pedal {} has no rendered entry, dropped", pedal.id);
            continue;
        };
        let groups = by_system(marks, |(a, _)| *a);
        let segments: Vec<PedalSegment> = groups
            .iter()
            .enumerate()
            .map(|(position, (system_index, group))| {
                let edge = edges.get(system_index).copied().unwrap_or_default();
                pedal_segment(
                    pedal.kind,
                    *system_index,
                    group,
                    edge,
                    (position == 0, position + 1 == groups.len()),
                    engraver,
                )
            })
            .collect();

        renders.push(PedalRender {
            key: PedalKey { pedal_index },
            id: pedal.id.clone(),
            kind: pedal.kind,
            rect: segments_rect(segments.iter().map(|s| &s.rect)),
            entry_keys: marks.iter().map(|(a, _)| a.entry.key).collect(),
            segments,
        });
    }
    renders
}

fn pedal_segment(
    kind: PedalKind,
    system_index: usize,
    group: &[(Anchor, PedalMarkKind)],
    (left, right): (f64, f64),
    (is_first, is_last): (bool, bool),
    engraver: &dyn Engraver,
) -> PedalSegment {
    let y = group.iter().map(|(a, _)| a.below()).fold(f64::MIN, f64::max) + PEDAL_OFFSET;
    let text = |s: &str, x: f64| {
        PlacedText::new(s, Point::new(x, y), PEDAL_FONT_SIZE, TextAnchor::Start, engraver.text_width(s, PEDAL_FONT_SIZE))
    };
    let bracket = matches!(kind, PedalKind::Bracket | PedalKind::Mixed);
    let marks_text = matches!(kind, PedalKind::Text | PedalKind::Mixed);

    let mut texts = Vec::new();
    let mut lines = Vec::new();

    let (first, first_kind) = group[0];
    let (last, last_kind) = group[group.len() - 1];
    let starts_here = is_first && first_kind == PedalMarkKind::Start;
    let ends_here = is_last && last_kind == PedalMarkKind::End;

    let mut x1 = if is_first { first.entry.rect.x } else { left };
    let x2 = match (is_last, ends_here) {
        (false, _) => right,
        (true, true) => last.entry.rect.x,
        (true, false) => last.entry.rect.right(),
    };

    if starts_here && marks_text {
        let label = text("Ped.", x1);
        if kind == PedalKind::Mixed {
            x1 = label.rect.right() + PEDAL_NOTCH_WIDTH;
        }
        texts.push(label);
    }

    if bracket {
        let top = y - PEDAL_BRACKET_HEIGHT;
        if starts_here && kind == PedalKind::Bracket {
            lines.push(LineSegment::new(Point::new(x1, top), Point::new(x1, y), SPANNER_LINE_WIDTH));
        }
        let mut cursor = x1;
        for (anchor, mark) in group {
            if *mark != PedalMarkKind::Change {
                continue;
            }
            let x = anchor.entry.rect.x;
            if x - PEDAL_NOTCH_WIDTH <= cursor {
                continue;
            }
            lines.push(LineSegment::new(Point::new(cursor, y), Point::new(x - PEDAL_NOTCH_WIDTH, y), SPANNER_LINE_WIDTH));
            lines.push(LineSegment::new(Point::new(x - PEDAL_NOTCH_WIDTH, y), Point::new(x, top), SPANNER_LINE_WIDTH));
            lines.push(LineSegment::new(Point::new(x, top), Point::new(x + PEDAL_NOTCH_WIDTH, y), SPANNER_LINE_WIDTH));
            cursor = x + PEDAL_NOTCH_WIDTH;
        }
        if x2 > cursor {
            lines.push(LineSegment::new(Point::new(cursor, y), Point::new(x2, y), SPANNER_LINE_WIDTH));
        }
        if ends_here {
            lines.push(LineSegment::new(Point::new(x2, top), Point::new(x2, y), SPANNER_LINE_WIDTH));
        }
    } else {
        for (anchor, mark) in group {
            let x = anchor.entry.rect.x;
            match mark {
                PedalMarkKind::Change => texts.push(text("*Ped.", x)),
                PedalMarkKind::End => texts.push(text("*", x)),
                PedalMarkKind::Start | PedalMarkKind::Continue => {}
            }
        }
    }

    let rect = segments_rect(
        &lines
            .iter()
            .map(LineSegment::rect)
            .chain(texts.iter().map(|t| t.rect))
            .collect::<Vec<_>>(),
    );
    PedalSegment { system_index, lines, texts, rect }
}

// ═══════════════════════════════════════════════════════════════════════
// Index
// ═══════════════════════════════════════════════════════════════════════

/// A spanner render found through [`RenderIndex`].
#[derive(Debug, Clone, Copy)]
pub enum IndexedRender<'a> {
    Beam(&'a BeamRender),
    Tuplet(&'a TupletRender),
    Curve(&'a CurveRender),
    Wedge(&'a WedgeRender),
    Pedal(&'a PedalRender),
}

/// Constant-time lookups over a finished render tree: spanner id to its
/// render, and entry key to the ids of every spanner touching it.
#[derive(Debug, Default)]
pub struct RenderIndex<'a> {
    by_id: HashMap<&'a str, IndexedRender<'a>>,
    by_entry: HashMap<VoiceEntryKey, Vec<&'a str>>,
}

impl<'a> RenderIndex<'a> {
    pub fn new(score: &'a ScoreRender) -> Self {
        let mut index = Self::default();
        let voices = score
            .systems
            .iter()
            .flat_map(|s| &s.measures)
            .flat_map(|m| &m.entries)
            .filter_map(|e| match e {
                MeasureEntryRender::Fragment(f) => Some(f),
                MeasureEntryRender::Gap(_) => None,
            })
            .flat_map(|f| &f.parts)
            .flat_map(|p| &p.staves)
            .flat_map(|s| &s.voices);
        for voice in voices {
            for beam in &voice.beams {
                index.insert(&beam.id, IndexedRender::Beam(beam), &beam.entry_keys);
            }
            for tuplet in &voice.tuplets {
                index.insert(&tuplet.id, IndexedRender::Tuplet(tuplet), &tuplet.entry_keys);
            }
        }
        for curve in &score.curves {
            index.insert(&curve.id, IndexedRender::Curve(curve), &curve.entry_keys);
        }
        for wedge in &score.wedges {
            index.insert(&wedge.id, IndexedRender::Wedge(wedge), &wedge.entry_keys);
        }
        for pedal in &score.pedals {
            index.insert(&pedal.id, IndexedRender::Pedal(pedal), &pedal.entry_keys);
        }
        index
    }

    fn insert(&mut self, id: &'a str, render: IndexedRender<'a>, entries: &[VoiceEntryKey]) {
        self.by_id.insert(id, render);
        for key in entries {
            let ids = self.by_entry.entry(*key).or_default();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<IndexedRender<'a>> {
        self.by_id.get(id).copied()
    }

    pub fn beam(&self, id: &str) -> Option<&'a BeamRender> {
        match self.get(id)? {
            IndexedRender::Beam(beam) => Some(beam),
            _ => None,
        }
    }

    pub fn tuplet(&self, id: &str) -> Option<&'a TupletRender> {
        match self.get(id)? {
            IndexedRender::Tuplet(tuplet) => Some(tuplet),
            _ => None,
        }
    }

    pub fn curve(&self, id: &str) -> Option<&'a CurveRender> {
        match self.get(id)? {
            IndexedRender::Curve(curve) => Some(curve),
            _ => None,
        }
    }

    pub fn wedge(&self, id: &str) -> Option<&'a WedgeRender> {
        match self.get(id)? {
            IndexedRender::Wedge(wedge) => Some(wedge),
            _ => None,
        }
    }

    pub fn pedal(&self, id: &str) -> Option<&'a PedalRender> {
        match self.get(id)? {
            IndexedRender::Pedal(pedal) => Some(pedal),
            _ => None,
        }
    }

    /// Ids of every spanner that includes the entry.
    pub fn ids_at(&self, key: VoiceEntryKey) -> &[&'a str] {
        self.by_entry.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arc_bends_away_from_the_notes() {
        let above = arc(0, Point::new(0.0, 50.0), Point::new(100.0, 50.0), true);
        assert!(above.control1.y < 50.0);
        assert!(above.rect.y < 50.0);
        assert!(above.rect.bottom() <= 50.0 + 1e-9);

        let below = arc(0, Point::new(0.0, 50.0), Point::new(100.0, 50.0), false);
        assert!(below.control1.y > 50.0);
        assert!(below.inner1.y > below.control1.y);
    }

    #[test]
    fn arc_height_is_clamped() {
        let short = arc(0, Point::new(0.0, 0.0), Point::new(4.0, 0.0), true);
        assert_eq!(short.control1.y, -SLUR_MIN_HEIGHT);
        let long = arc(0, Point::new(0.0, 0.0), Point::new(1000.0, 0.0), true);
        assert_eq!(long.control1.y, -SLUR_MAX_HEIGHT);
    }
}
