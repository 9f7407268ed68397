//! Per-fragment layout.
//!
//! An [`Ensemble`] positions everything inside one measure fragment
//! (staves, clef/key/time modifiers, voices, notes and rests) across all
//! parts at once, so that notes sounding together line up. It measures
//! the result and hands back an immutable [`FragmentRender`].

use std::sync::Arc;

use once_cell::unsync::OnceCell;

use super::constants::*;
use super::engrave::{
    clef_width, key_signature_width, pitch_half_space, Engraver, GraceSpec, HeadSpec, NativeBeam,
    NativeMultiRest, NativeStave, NativeTickable, NativeTuplet, NoopRenderContext, PlacedText,
    TextAnchor,
};
use super::formatter::{x_at, Formatter, Tick};
use super::spatial::{Pen, Point, Rect};
use super::types::{
    BeamRender, ConnectorKind, ConnectorRender, FragmentRender, GapRender, PartRender, StaveRender,
    TupletRender, VoiceEntryRender, VoiceRender,
};
use crate::config::Config;
use crate::document::{
    BarlineStyle, BeamKey, Document, DurationType, Gap, MeasureEntryKey, Pitch, Rest, StaveKey,
    TupletKey, VoiceEntry, VoiceEntryKey, VoiceKey,
};
use crate::fraction::Fraction;
use crate::signature::{Key, Signature, StaveSignature};

pub(super) struct Ensemble<'a> {
    document: &'a Document,
    key: MeasureEntryKey,
    position: Point,
    width: Option<f64>,
    config: &'a Config,
    engraver: &'a dyn Engraver,
    render: OnceCell<FragmentRender>,
}

/// One stave of the fragment before formatting.
struct StaveSlot {
    key: StaveKey,
    signature: StaveSignature,
    top: f64,
    show_clef: bool,
    show_key: Option<Key>,
    show_time: bool,
    voices: Vec<VoiceSlot>,
}

struct VoiceSlot {
    key: VoiceKey,
    entries: Vec<EntrySlot>,
    /// A lone whole or half rest sits in the middle of the measure.
    centered: bool,
}

struct EntrySlot {
    key: VoiceEntryKey,
    beat: Fraction,
    duration: Fraction,
    beam_id: Option<String>,
    tuplet_id: Option<String>,
    native: NativeTickable,
}

impl<'a> Ensemble<'a> {
    pub fn new(
        document: &'a Document,
        key: MeasureEntryKey,
        position: Point,
        config: &'a Config,
        engraver: &'a dyn Engraver,
    ) -> Self {
        let width = document.fragment(key).width;
        Self { document, key, position, width, config, engraver, render: OnceCell::new() }
    }

    /// Horizontal room the fragment takes, padding included. Equals the
    /// fragment's assigned width when it has one.
    pub fn layout_width(&self) -> f64 {
        self.render().layout_width
    }

    pub fn render(&self) -> &FragmentRender {
        self.render.get_or_init(|| self.build())
    }

    pub fn into_render(mut self) -> FragmentRender {
        match self.render.take() {
            Some(render) => render,
            None => self.build(),
        }
    }

    fn build(&self) -> FragmentRender {
        let document = self.document;
        let config = self.config;
        let key = self.key;
        let fragment = document.fragment(key);
        let measure_key = key.measure();
        let system_key = measure_key.system();

        let is_first_measure = document.is_first_measure(measure_key);
        let is_first_entry = document.is_first_measure_entry(key);
        let is_system_start = is_first_measure && is_first_entry;
        let is_score_start = document.is_first_system(system_key) && is_system_start;
        let is_last_entry = document.is_last_measure_entry(key);
        let is_score_end =
            document.is_last_system(system_key) && document.is_last_measure(measure_key) && is_last_entry;
        let has_brace = fragment.parts.iter().any(|p| p.staves.len() > 1);
        let previous = document.previous_measure_entry(key).map(|e| Arc::clone(e.signature()));

        // ── Left padding ────────────────────────────────────────────
        let labels: Vec<(String, f64)> = if is_score_start {
            document
                .part_labels()
                .iter()
                .map(|l| (l.clone(), self.engraver.text_width(l, config.part_label_font_size)))
                .collect()
        } else {
            Vec::new()
        };
        let label_width = match labels.iter().map(|(_, w)| *w).fold(0.0, f64::max) {
            w if w > 0.0 => w + config.part_label_padding_right,
            _ => 0.0,
        };
        let mut left_padding = label_width;
        if is_first_measure {
            left_padding += MEASURE_NUMBER_PADDING_LEFT;
        }
        if is_system_start && has_brace {
            left_padding += BRACE_CONNECTOR_PADDING_LEFT;
        }
        let stave_x = self.position.x + left_padding;

        // ── Skeleton ────────────────────────────────────────────────
        let mut pen = Pen::new(stave_x, self.position.y);
        let mut parts: Vec<Vec<StaveSlot>> = Vec::with_capacity(fragment.parts.len());
        for (part_index, part) in fragment.parts.iter().enumerate() {
            let mut staves = Vec::with_capacity(part.staves.len());
            for (stave_index, stave) in part.staves.iter().enumerate() {
                let stave_key = key.part(part_index).stave(stave_index);
                let signature = stave.signature.clone();
                let before = previous.as_deref().and_then(|s| stave_signature(s, part_index, stave_index));

                let show_clef = is_system_start || before.as_ref().map_or(true, |b| b.clef != signature.clef);
                let key_changed = before.as_ref().filter(|b| !b.key.same_key(&signature.key));
                let show_key = match key_changed {
                    Some(b) => Some(Key { previous_fifths: Some(b.key.fifths), ..signature.key.clone() }),
                    None if is_system_start => Some(Key { previous_fifths: None, ..signature.key.clone() }),
                    None => None,
                };
                let show_time = is_score_start || before.as_ref().map_or(true, |b| b.time != signature.time);

                let voices = if fragment.multi_rest_count() > 1 {
                    Vec::new()
                } else {
                    (0..stave.voices.len())
                        .map(|voice_index| self.voice_slot(stave_key.voice(voice_index), &signature))
                        .collect()
                };

                let top = pen.y();
                let height = signature.line_count.saturating_sub(1) as f64 * config.stave_line_spacing;
                pen.move_by(0.0, height + config.stave_margin_bottom);
                staves.push(StaveSlot { key: stave_key, signature, top, show_clef, show_key, show_time, voices });
            }
            parts.push(staves);
        }
        let slots = || parts.iter().flatten();

        // ── Widths ──────────────────────────────────────────────────
        let clef_column = slots()
            .filter(|s| s.show_clef)
            .map(|s| clef_width(&s.signature.clef, self.engraver))
            .fold(0.0, f64::max);
        let key_column = slots()
            .filter_map(|s| s.show_key.as_ref().map(|k| key_signature_width(k, &s.signature.clef)))
            .fold(0.0, f64::max);
        let time_column = slots()
            .filter(|s| s.show_time)
            .map(|s| super::engrave::time_signature_width(&s.signature.time, self.engraver))
            .fold(0.0, f64::max);
        let non_voice_width = config.stave_padding_left + clef_column + key_column + time_column;

        let formatter = Formatter::new(slots().flat_map(|s| &s.voices).flat_map(|v| &v.entries).map(|e| Tick {
            beat: e.beat,
            duration: e.duration,
            left: e.native.left_px(),
            width: e.native.width(),
        }));

        let multi_rest_count = fragment.multi_rest_count();
        let barline_padding = if is_score_end { BARLINE_PADDING_RIGHT } else { 0.0 };
        let stave_width = match self.width {
            Some(width) => width - left_padding - barline_padding,
            None if multi_rest_count > 1 => config.base_multi_rest_measure_width + non_voice_width,
            None => config.base_voice_width + formatter.minimum_width() + non_voice_width,
        };
        let layout_width = left_padding + stave_width + barline_padding;

        // ── Format ──────────────────────────────────────────────────
        let voice_x = stave_x + non_voice_width;
        let voice_width = (stave_width - non_voice_width).max(0.0);
        let columns = formatter.format(voice_width);
        let clef_x = stave_x + config.stave_padding_left;
        let key_x = clef_x + clef_column;
        let time_x = key_x + key_column;

        let mut part_renders = Vec::with_capacity(parts.len());
        let mut connectors = Vec::new();
        let mut excess_height: f64 = 0.0;
        let mut noop = NoopRenderContext;

        for (part_index, staves) in parts.into_iter().enumerate() {
            let part_key = key.part(part_index);
            let mut stave_renders = Vec::with_capacity(staves.len());
            for slot in staves {
                let spacing = config.stave_line_spacing;
                let line_count = slot.signature.line_count;
                let mut native = NativeStave::new(
                    stave_x,
                    slot.top,
                    stave_width,
                    line_count,
                    spacing,
                    slot.signature.clef.clone(),
                );
                if slot.show_clef {
                    native.show_clef(clef_x, self.engraver);
                }
                if let Some(key) = slot.show_key.clone() {
                    native.show_key(key, key_x);
                }
                if slot.show_time {
                    native.show_time(&slot.signature.time, time_x, self.engraver);
                }
                native.draw(&mut noop);
                native.set_rendered(false);

                let mut multi_rest = (multi_rest_count > 1).then(|| {
                    NativeMultiRest::new(multi_rest_count, voice_x, stave_x + stave_width, &native, self.engraver)
                });
                if let Some(rest) = multi_rest.as_mut() {
                    rest.draw(&mut noop);
                    rest.set_rendered(false);
                }

                let voices: Vec<VoiceRender> = slot
                    .voices
                    .into_iter()
                    .map(|voice| {
                        self.format_voice(voice, &columns, (voice_x, voice_width), &native)
                    })
                    .collect();

                let content_top = voices
                    .iter()
                    .filter(|v| !v.entries.is_empty())
                    .map(|v| v.rect.y)
                    .chain(multi_rest.iter().map(|r| r.rect.y))
                    .fold(f64::MAX, f64::min);
                if content_top < f64::MAX {
                    excess_height = excess_height.max(native.top() - content_top);
                }

                let body = Rect::new(self.position.x, native.top(), layout_width, native.height());
                let rect = voices
                    .iter()
                    .map(|v| v.rect)
                    .chain(multi_rest.iter().map(|r| r.rect))
                    .fold(body.merge(&native.bounding_box()), |acc, r| acc.merge(&r));
                stave_renders.push(StaveRender { key: slot.key, rect, native, voices, multi_rest });
            }

            if is_system_start && stave_renders.len() > 1 {
                let top = stave_renders[0].native.top();
                let bottom = stave_renders[stave_renders.len() - 1].native.bottom();
                let x = stave_x - BRACE_WIDTH - 2.0;
                connectors.push(ConnectorRender {
                    kind: ConnectorKind::Brace,
                    rect: Rect::new(x, top, BRACE_WIDTH, bottom - top),
                    dots: Vec::new(),
                });
            }

            let rect = Rect::merge_all(stave_renders.iter().map(|s| &s.rect))
                .unwrap_or_else(|| Rect::empty(self.position.x, self.position.y));
            part_renders.push(PartRender { key: part_key, rect, staves: stave_renders });
        }

        // ── Barlines ────────────────────────────────────────────────
        let natives: Vec<&NativeStave> =
            part_renders.iter().flat_map(|p| &p.staves).map(|s| &s.native).collect();
        let measure = document.measure(measure_key);
        if is_first_entry {
            let kind = match measure.start_barline {
                Some(BarlineStyle::RepeatStart | BarlineStyle::RepeatBoth) => Some(ConnectorKind::RepeatStart),
                Some(BarlineStyle::Double) => Some(ConnectorKind::Double),
                _ if !is_first_measure => Some(ConnectorKind::SingleLeft),
                _ => None,
            };
            if let Some(kind) = kind {
                connectors.extend(barline(kind, stave_x, &natives, false));
            }
        }
        if is_last_entry {
            let kind = match measure.end_barline {
                Some(BarlineStyle::RepeatEnd | BarlineStyle::RepeatBoth) => Some(ConnectorKind::RepeatEnd),
                Some(BarlineStyle::End) => Some(ConnectorKind::BoldDoubleRight),
                Some(BarlineStyle::Double) => Some(ConnectorKind::Double),
                Some(BarlineStyle::None) => None,
                _ if is_score_end => Some(ConnectorKind::BoldDoubleRight),
                _ => Some(ConnectorKind::SingleRight),
            };
            if let Some(kind) = kind {
                connectors.extend(barline(kind, stave_x + stave_width, &natives, true));
            }
        }

        // ── Part labels ─────────────────────────────────────────────
        let part_labels: Vec<PlacedText> = labels
            .iter()
            .zip(&part_renders)
            .filter(|((text, _), _)| !text.is_empty())
            .filter_map(|((text, width), part)| {
                let first = part.staves.first()?;
                let last = part.staves.last()?;
                let middle = (first.native.top() + last.native.bottom()) / 2.0;
                let x = self.position.x + label_width - config.part_label_padding_right;
                let y = middle + config.part_label_font_size / 3.0;
                Some(PlacedText::new(text, Point::new(x, y), config.part_label_font_size, TextAnchor::End, *width))
            })
            .collect();

        let rect = Rect::merge_all(
            part_renders
                .iter()
                .map(|p| &p.rect)
                .chain(connectors.iter().map(|c| &c.rect))
                .chain(part_labels.iter().map(|l| &l.rect)),
        )
        .unwrap_or_else(|| Rect::new(self.position.x, self.position.y, layout_width, 0.0));

        log::trace!(
            "fragment {:?}: width {layout_width:.1}, non-voice {non_voice_width:.1}, excess {excess_height:.1}",
            key
        );

        FragmentRender {
            key,
            rect,
            layout_width,
            excess_height: excess_height.max(0.0),
            parts: part_renders,
            connectors,
            part_labels,
        }
    }

    fn voice_slot(&self, key: VoiceKey, signature: &StaveSignature) -> VoiceSlot {
        let voice = self.document.voice(key);
        let clef = &signature.clef;
        let lines = signature.line_count;
        let entries: Vec<EntrySlot> = voice
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let native = match entry {
                    VoiceEntry::Note(note) => NativeTickable::note(
                        vec![HeadSpec {
                            half: pitch_half_space(&note.pitch, clef, lines),
                            head: note.head,
                            accidental: note.accidental.as_ref().map(|a| a.code),
                        }],
                        note.duration_type,
                        note.dot_count,
                        note.stem_direction,
                        &note.annotations,
                        self.engraver,
                    )
                    .with_articulations(&note.articulations, self.engraver),
                    VoiceEntry::Chord(chord) => NativeTickable::note(
                        chord
                            .heads
                            .iter()
                            .map(|h| HeadSpec {
                                half: pitch_half_space(&h.pitch, clef, lines),
                                head: h.head,
                                accidental: h.accidental.as_ref().map(|a| a.code),
                            })
                            .collect(),
                        chord.duration_type,
                        chord.dot_count,
                        chord.stem_direction,
                        &chord.annotations,
                        self.engraver,
                    )
                    .with_articulations(&chord.articulations, self.engraver),
                    VoiceEntry::Rest(rest) => NativeTickable::rest(
                        rest_half_space(rest, signature),
                        rest.duration_type,
                        rest.dot_count,
                        self.engraver,
                    ),
                };
                let graces: Vec<GraceSpec> = entry
                    .grace_notes()
                    .iter()
                    .map(|g| GraceSpec {
                        half: pitch_half_space(&g.pitch, clef, lines),
                        accidental: g.accidental.as_ref().map(|a| a.code),
                        duration_type: g.duration_type,
                        slash: g.slash,
                    })
                    .collect();
                let native = native.with_graces(graces, self.engraver);
                EntrySlot {
                    key: key.entry(index),
                    beat: entry.measure_beat(),
                    duration: entry.duration(),
                    beam_id: entry.beam_id().map(str::to_string),
                    tuplet_id: entry.tuplet_id().map(str::to_string),
                    native,
                }
            })
            .collect();

        let centered = matches!(
            voice.entries.as_slice(),
            [VoiceEntry::Rest(rest)] if matches!(rest.duration_type, DurationType::Whole | DurationType::Half)
        );
        VoiceSlot { key, entries, centered }
    }

    fn format_voice(
        &self,
        voice: VoiceSlot,
        columns: &[(Fraction, f64)],
        (voice_x, voice_width): (f64, f64),
        stave: &NativeStave,
    ) -> VoiceRender {
        let VoiceSlot { key, mut entries, centered } = voice;
        let mut noop = NoopRenderContext;

        for entry in entries.iter_mut() {
            entry.native.set_stave(stave.top(), stave.line_spacing(), stave.line_count());
            let x = if centered {
                voice_x + (voice_width - entry.native.width()) / 2.0
            } else {
                voice_x + x_at(columns, entry.beat)
            };
            entry.native.set_x(x);
        }

        let voice = self.document.voice(key);
        let mut beams = Vec::new();
        for (beam_index, beam) in voice.beams.iter().enumerate() {
            let members: Vec<usize> =
                (0..entries.len()).filter(|&i| entries[i].beam_id.as_deref() == Some(beam.id.as_str())).collect();
            if members.len() < 2 {
                log::trace!("beam {} has {} entry, not drawn", beam.id, members.len());
                continue;
            }
            let entry_keys: Vec<VoiceEntryKey> = members.iter().map(|&i| entries[i].key).collect();
            let mut natives: Vec<&mut NativeTickable> = entries
                .iter_mut()
                .enumerate()
                .filter(|(i, _)| members.contains(i))
                .map(|(_, e)| &mut e.native)
                .collect();
            if let Some(mut native) = NativeBeam::resolve(&mut natives) {
                native.draw(&mut noop);
                native.set_rendered(false);
                beams.push(BeamRender {
                    key: BeamKey { voice: key, beam_index },
                    id: beam.id.clone(),
                    rect: native.rect,
                    entry_keys,
                    native,
                });
            }
        }

        for entry in entries.iter_mut() {
            entry.native.draw(&mut noop);
            entry.native.set_rendered(false);
        }

        let mut tuplets = Vec::new();
        for (tuplet_index, tuplet) in voice.tuplets.iter().enumerate() {
            let members: Vec<&EntrySlot> =
                entries.iter().filter(|e| e.tuplet_id.as_deref() == Some(tuplet.id.as_str())).collect();
            if members.len() < 2 {
                log::trace!("tuplet {} has {} entry, not drawn", tuplet.id, members.len());
                continue;
            }
            let boxes: Vec<Rect> = members.iter().map(|e| e.native.bounding_box()).collect();
            let stem_up = members.iter().find_map(|e| e.native.geometry().stem_up);
            let mut native =
                NativeTuplet::new(tuplet, &boxes, stem_up, (stave.top(), stave.bottom()), self.engraver);
            native.draw(&mut noop);
            native.set_rendered(false);
            tuplets.push(TupletRender {
                key: TupletKey { voice: key, tuplet_index },
                id: tuplet.id.clone(),
                rect: native.rect,
                entry_keys: members.iter().map(|e| e.key).collect(),
                native,
            });
        }

        let entry_renders: Vec<VoiceEntryRender> = entries
            .into_iter()
            .map(|e| VoiceEntryRender { key: e.key, rect: e.native.bounding_box(), measure_beat: e.beat, native: e.native })
            .collect();
        let rect = Rect::merge_all(
            entry_renders
                .iter()
                .map(|e| &e.rect)
                .chain(beams.iter().map(|b| &b.rect))
                .chain(tuplets.iter().map(|t| &t.rect)),
        )
        .unwrap_or_else(|| Rect::empty(voice_x, stave.top()));

        VoiceRender { key, rect, entries: entry_renders, beams, tuplets }
    }
}

fn stave_signature(signature: &Signature, part_index: usize, stave_index: usize) -> Option<StaveSignature> {
    if part_index < signature.part_count() && stave_index < signature.part(part_index).stave_count {
        Some(signature.stave(part_index, stave_index))
    } else {
        None
    }
}

fn rest_half_space(rest: &Rest, signature: &StaveSignature) -> i32 {
    let pitch = match &rest.display_pitch {
        Some(pitch) => pitch.clone(),
        None if signature.clef.is_bass() => Pitch::new('D', 3),
        None if rest.duration_type == DurationType::Whole => Pitch::new('D', 5),
        None => Pitch::new('B', 4),
    };
    pitch_half_space(&pitch, &signature.clef, signature.line_count)
}

/// One barline connector spanning every stave, drawn left of `x` when it
/// closes the fragment.
fn barline(kind: ConnectorKind, x: f64, staves: &[&NativeStave], closing: bool) -> Option<ConnectorRender> {
    let first = staves.first()?;
    let last = staves.last()?;
    let (top, bottom) = (first.top(), last.bottom());
    let width = match kind {
        ConnectorKind::SingleLeft | ConnectorKind::SingleRight => BARLINE_WIDTH,
        ConnectorKind::Double => BARLINE_WIDTH * 2.0 + DOUBLE_BARLINE_GAP,
        ConnectorKind::BoldDoubleRight => BARLINE_WIDTH + DOUBLE_BARLINE_GAP + BOLD_BARLINE_WIDTH,
        ConnectorKind::RepeatStart | ConnectorKind::RepeatEnd => {
            BARLINE_WIDTH + DOUBLE_BARLINE_GAP + BOLD_BARLINE_WIDTH + DOUBLE_BARLINE_GAP + REPEAT_DOT_RADIUS * 2.0
        }
        ConnectorKind::Brace => BRACE_WIDTH,
    };
    let left = if closing { x - width } else { x };
    let dots = match kind {
        ConnectorKind::RepeatStart | ConnectorKind::RepeatEnd => {
            let dot_x = if kind == ConnectorKind::RepeatStart {
                left + width - REPEAT_DOT_RADIUS
            } else {
                left + REPEAT_DOT_RADIUS
            };
            staves
                .iter()
                .flat_map(|stave| {
                    let middle = stave.top() + stave.height() / 2.0;
                    let offset = stave.line_spacing() / 2.0;
                    [Point::new(dot_x, middle - offset), Point::new(dot_x, middle + offset)]
                })
                .collect()
        }
        _ => Vec::new(),
    };
    Some(ConnectorRender { kind, rect: Rect::new(left, top, width, bottom - top), dots })
}

/// Lay out a gap entry: empty staves under an optional centered label.
pub(super) fn layout_gap(
    gap: &Gap,
    key: MeasureEntryKey,
    position: Point,
    config: &Config,
    engraver: &dyn Engraver,
) -> GapRender {
    let width = gap.width.unwrap_or(config.gap_width);
    let signature = &gap.signature;
    let mut noop = NoopRenderContext;
    let mut pen = Pen::new(position.x, position.y);
    let mut staves = Vec::new();
    for part_index in 0..signature.part_count() {
        for stave_index in 0..signature.part(part_index).stave_count {
            let stave = signature.stave(part_index, stave_index);
            let mut native = NativeStave::new(
                pen.x(),
                pen.y(),
                width,
                stave.line_count,
                config.stave_line_spacing,
                stave.clef,
            );
            native.draw(&mut noop);
            native.set_rendered(false);
            pen.move_by(0.0, native.height() + config.stave_margin_bottom);
            staves.push(native);
        }
    }

    let body = Rect::merge_all(staves.iter().map(|s| s.bounding_box()).collect::<Vec<_>>().iter())
        .unwrap_or_else(|| Rect::new(position.x, position.y, width, 0.0));
    let text = gap.text.as_deref().map(|text| {
        let at = Point::new(position.x + width / 2.0, position.y - 6.0);
        PlacedText::new(text, at, GAP_FONT_SIZE, TextAnchor::Middle, engraver.text_width(text, GAP_FONT_SIZE))
    });
    let rect = text.iter().fold(body, |acc, t| acc.merge(&t.rect));
    GapRender { key, rect, text, staves }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_document;
    use crate::parser::parse_musicxml;
    use crate::renderer::engrave::MetricEngraver;

    const ONE_MEASURE: &str = r#"<?xml version="1.0"?>
<score-partwise>
  <part-list><score-part id="P1"><part-name>Piano</part-name></score-part></part-list>
  <part id="P1">
    <measure number="1">
      <attributes><divisions>1</divisions><time><beats>4</beats><beat-type>4</beat-type></time></attributes>
      <note><pitch><step>C</step><octave>5</octave></pitch><duration>1</duration><type>quarter</type></note>
      <note><pitch><step>D</step><octave>5</octave></pitch><duration>1</duration><type>quarter</type></note>
      <note><pitch><step>E</step><octave>5</octave></pitch><duration>1</duration><type>quarter</type></note>
      <note><pitch><step>A</step><octave>5</octave></pitch><duration>1</duration><type>quarter</type></note>
    </measure>
  </part>
</score-partwise>"#;

    fn first_entry() -> MeasureEntryKey {
        MeasureEntryKey { system_index: 0, measure_index: 0, measure_entry_index: 0 }
    }

    #[test]
    fn explicit_width_is_honoured() {
        let score = parse_musicxml(ONE_MEASURE).unwrap();
        let document = build_document(&score);
        let config = Config::default();
        let natural = Ensemble::new(&document, first_entry(), Point::new(0.0, 0.0), &config, &MetricEngraver)
            .layout_width();
        assert!(natural > config.base_voice_width);

        let arrangement = crate::document::SystemArrangement {
            measure_indexes: vec![0],
            entry_widths: vec![vec![Some(natural + 100.0)]],
        };
        let widened = document.reflow(&[arrangement]);
        let ensemble = Ensemble::new(&widened, first_entry(), Point::new(0.0, 0.0), &config, &MetricEngraver);
        assert!((ensemble.layout_width() - (natural + 100.0)).abs() < 1e-9);
    }

    #[test]
    fn notes_advance_left_to_right() {
        let score = parse_musicxml(ONE_MEASURE).unwrap();
        let document = build_document(&score);
        let config = Config::default();
        let render = Ensemble::new(&document, first_entry(), Point::new(0.0, 50.0), &config, &MetricEngraver)
            .into_render();
        let entries = &render.parts[0].staves[0].voices[0].entries;
        assert_eq!(entries.len(), 4);
        let xs: Vec<f64> = entries.iter().map(|e| e.rect.x).collect();
        assert!(xs.windows(2).all(|w| w[0] < w[1]));
        // A5 sits above the top line.
        assert!(render.excess_height > 0.0);
        assert!(render.connectors.iter().any(|c| c.kind == ConnectorKind::BoldDoubleRight));
    }
}
