//! Builds a [`Document`] from a parsed MusicXML score.
//!
//! Events are extracted per part, merged per measure to find where the
//! signature changes, and regrouped into fragments → parts → staves →
//! voices. Everything starts in one system; line breaking happens later.

use std::sync::Arc;

use crate::document::{
    Articulation, BarlineStyle, Chord, ChordHead, Document, Fragment, Measure, MeasureEntry, Note, Part, Rest,
    Score, Stave, System, Voice, VoiceEntry,
};
use crate::events::{extract_part_events, MeasureEvent, MeasureEventKind, NoteEvent, PartEvents, RestEvent};
use crate::model;
use crate::segment::{segment, signature_ranges, FragmentEvents};
use crate::signature::Signature;
use crate::spanners::{Beam, IdAllocator, Placement, Tuplet};

pub fn build_document(score: &model::Score) -> Document {
    let mut ids = IdAllocator::new();
    let part_events: Vec<PartEvents> = score
        .parts
        .iter()
        .enumerate()
        .map(|(index, part)| extract_part_events(index, part, &mut ids))
        .collect();

    let part_count = score.parts.len();
    let mut signature = Signature::initial(part_count);
    let mut measures = Vec::new();
    let mut skip = 0u32;

    for measure_index in 0..score.measure_count() {
        let events = measure_events(&part_events, measure_index);
        let ranges = signature_ranges(&signature, &events);
        if let Some(last) = ranges.last() {
            signature = Arc::clone(&last.signature);
        }

        // Measures swallowed by a preceding multi-measure rest still carry
        // signature changes forward.
        if skip > 0 {
            skip -= 1;
            continue;
        }

        let multi_rest = part_events
            .iter()
            .filter_map(|p| p.multi_rests.get(&measure_index).copied())
            .max()
            .unwrap_or(0);
        if multi_rest > 1 {
            skip = multi_rest - 1;
        }

        let entries: Vec<MeasureEntry> = segment(&events, &ranges)
            .into_iter()
            .map(|f| MeasureEntry::Fragment(build_fragment(f, &part_events, part_count, multi_rest)))
            .collect();
        log::trace!("measure {measure_index}: {} fragment(s)", entries.len());

        let source = score.parts.first().and_then(|p| p.measures.get(measure_index));
        measures.push(Measure {
            label: source.and_then(measure_label),
            start_barline: source.and_then(|m| barline(m, "left")),
            end_barline: source.and_then(|m| barline(m, "right")),
            entries,
        });
    }

    let mut curves = Vec::new();
    let mut wedges = Vec::new();
    let mut pedals = Vec::new();
    for events in part_events {
        curves.extend(events.curves);
        wedges.extend(events.wedges);
        pedals.extend(events.pedals);
    }

    log::debug!("built document: {} part(s), {} measure(s)", part_count, measures.len());
    Document::new(Score {
        title: score.title.clone(),
        part_labels: score.parts.iter().map(|p| p.name.clone()).collect(),
        systems: vec![System { measures }],
        curves,
        wedges,
        pedals,
    })
}

/// Every part's events for one measure, stable-sorted by beat.
fn measure_events(part_events: &[PartEvents], measure_index: usize) -> Vec<MeasureEvent> {
    let mut events: Vec<MeasureEvent> = part_events
        .iter()
        .flat_map(|p| p.events.iter().filter(move |e| e.measure_index == measure_index))
        .cloned()
        .collect();
    events.sort_by(|a, b| a.measure_beat.cmp(&b.measure_beat));
    events
}

fn measure_label(measure: &model::Measure) -> Option<u32> {
    if measure.implicit {
        return None;
    }
    measure.number.as_deref().and_then(|n| n.trim().parse().ok())
}

fn barline(measure: &model::Measure, location: &str) -> Option<BarlineStyle> {
    measure.entries.iter().find_map(|entry| match entry {
        model::MeasureEntry::Barline(b) if b.location == location => {
            Some(BarlineStyle::from_musicxml(b.bar_style.as_deref(), b.repeat.as_deref()))
        }
        _ => None,
    })
}

fn build_fragment(
    fragment: FragmentEvents<'_>,
    part_events: &[PartEvents],
    part_count: usize,
    multi_rest: u32,
) -> Fragment {
    let signature = fragment.signature;
    let parts = (0..part_count)
        .map(|part_index| {
            let stave_count = signature.part(part_index).stave_count;
            let staves = (0..stave_count)
                .map(|stave_index| Stave {
                    signature: signature.stave(part_index, stave_index),
                    voices: build_voices(&fragment.events, part_index, stave_index, &part_events[part_index]),
                    multi_rest_count: if multi_rest > 1 { multi_rest } else { 0 },
                })
                .collect();

            let dropped = fragment
                .events
                .iter()
                .filter(|e| e.part_index == part_index && e.stave().is_some_and(|s| s >= stave_count))
                .count();
            if dropped > 0 {
                log::warn!("part {part_index}: {dropped} event(s) on undeclared staves dropped");
            }

            Part { stave_count, staves }
        })
        .collect();

    Fragment {
        signature,
        start_beat: fragment.start,
        end_beat: fragment.end,
        parts,
        width: None,
    }
}

/// Group a stave's notes and rests by voice, in order of first appearance.
fn build_voices(events: &[&MeasureEvent], part_index: usize, stave_index: usize, source: &PartEvents) -> Vec<Voice> {
    let mut voices: Vec<Voice> = Vec::new();

    for event in events.iter().filter(|e| e.part_index == part_index) {
        let (voice_id, stave) = match &event.kind {
            MeasureEventKind::Note(n) => (&n.voice, n.stave),
            MeasureEventKind::Rest(r) => (&r.voice, r.stave),
            _ => continue,
        };
        if stave != stave_index {
            continue;
        }
        let position = match voices.iter().position(|v| v.id == *voice_id) {
            Some(position) => position,
            None => {
                voices.push(Voice { id: voice_id.clone(), entries: Vec::new(), beams: Vec::new(), tuplets: Vec::new() });
                voices.len() - 1
            }
        };
        let voice = &mut voices[position];

        match &event.kind {
            MeasureEventKind::Note(note) if note.chord => add_chord_head(&mut voice.entries, event, note),
            MeasureEventKind::Note(note) => voice.entries.push(VoiceEntry::Note(to_note(event, note))),
            MeasureEventKind::Rest(rest) => voice.entries.push(VoiceEntry::Rest(to_rest(event, rest))),
            _ => {}
        }
    }

    for voice in &mut voices {
        declare_spanners(voice, source);
    }
    voices
}

fn to_note(event: &MeasureEvent, note: &NoteEvent) -> Note {
    Note {
        pitch: note.pitch.clone(),
        head: note.head,
        stem_direction: note.stem,
        duration: note.duration,
        duration_type: note.duration_type,
        dot_count: note.dot_count,
        measure_beat: event.measure_beat,
        accidental: note.accidental.clone(),
        annotations: note.annotations.clone(),
        articulations: note.articulations.clone(),
        grace_notes: note.grace_notes.clone(),
        curve_ids: note.curve_ids.clone(),
        beam_id: note.beam_id.clone(),
        tuplet_id: note.tuplet_id.clone(),
        wedge_id: note.wedge_id.clone(),
        pedal_mark: note.pedal_mark.clone(),
    }
}

fn to_rest(event: &MeasureEvent, rest: &RestEvent) -> Rest {
    Rest {
        measure_beat: event.measure_beat,
        duration: rest.duration,
        duration_type: rest.duration_type,
        dot_count: rest.dot_count,
        display_pitch: rest.display_pitch.clone(),
        beam_id: rest.beam_id.clone(),
        tuplet_id: rest.tuplet_id.clone(),
        whole_measure: rest.whole_measure,
    }
}

fn head(note: &NoteEvent) -> ChordHead {
    ChordHead {
        pitch: note.pitch.clone(),
        head: note.head,
        accidental: note.accidental.clone(),
        curve_ids: note.curve_ids.clone(),
    }
}

/// Attach a `<chord/>` note to the entry it sounds with.
fn add_chord_head(entries: &mut Vec<VoiceEntry>, event: &MeasureEvent, note: &NoteEvent) {
    match entries.last_mut().filter(|e| e.measure_beat() == event.measure_beat) {
        Some(VoiceEntry::Chord(chord)) => {
            chord.heads.push(head(note));
            merge_articulations(&mut chord.articulations, note);
        }
        Some(last @ VoiceEntry::Note(_)) => {
            if let VoiceEntry::Note(root) = &*last {
                let chord = chord_from(root, note);
                *last = VoiceEntry::Chord(chord);
            }
        }
        _ => {
            log::debug!("chord note at beat {} has nothing to attach to", event.measure_beat);
            entries.push(VoiceEntry::Note(to_note(event, note)));
        }
    }
}

/// Chord members share one set of articulations.
fn merge_articulations(articulations: &mut Vec<Articulation>, note: &NoteEvent) {
    for articulation in &note.articulations {
        if !articulations.iter().any(|a| a.kind == articulation.kind) {
            articulations.push(articulation.clone());
        }
    }
}

fn chord_from(root: &Note, note: &NoteEvent) -> Chord {
    let mut articulations = root.articulations.clone();
    merge_articulations(&mut articulations, note);
    Chord {
        heads: vec![
            ChordHead {
                pitch: root.pitch.clone(),
                head: root.head,
                accidental: root.accidental.clone(),
                curve_ids: root.curve_ids.clone(),
            },
            head(note),
        ],
        stem_direction: root.stem_direction,
        duration: root.duration,
        duration_type: root.duration_type,
        dot_count: root.dot_count,
        measure_beat: root.measure_beat,
        annotations: root.annotations.clone(),
        articulations,
        grace_notes: root.grace_notes.clone(),
        beam_id: root.beam_id.clone(),
        tuplet_id: root.tuplet_id.clone(),
        wedge_id: root.wedge_id.clone(),
        pedal_mark: root.pedal_mark.clone(),
    }
}

/// Declare every beam and tuplet the voice's entries reference, once each.
fn declare_spanners(voice: &mut Voice, source: &PartEvents) {
    for entry in &voice.entries {
        if let Some(id) = entry.beam_id() {
            if !voice.beams.iter().any(|b| b.id == id) {
                voice.beams.push(Beam { id: id.to_string() });
            }
        }
        if let Some(id) = entry.tuplet_id() {
            if !voice.tuplets.iter().any(|t| t.id == id) {
                let tuplet = source.tuplets.get(id).cloned().unwrap_or_else(|| Tuplet {
                    id: id.to_string(),
                    placement: Placement::Auto,
                    show_number: true,
                    ratio: None,
                });
                voice.tuplets.push(tuplet);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ArticulationKind;
    use crate::fraction::Fraction;
    use crate::parser::parse_musicxml;
    use crate::signature::Clef;
    use pretty_assertions::assert_eq;

    fn document(parts: &str) -> Document {
        let xml = format!(
            r#"<score-partwise>
                 <part-list>
                   <score-part id="P1"><part-name>Piano</part-name></score-part>
                 </part-list>
                 {parts}
               </score-partwise>"#
        );
        build_document(&parse_musicxml(&xml).unwrap())
    }

    #[test]
    fn chord_notes_merge_into_one_entry() {
        let doc = document(
            r#"<part id="P1"><measure number="1">
                 <attributes><divisions>1</divisions></attributes>
                 <note><pitch><step>C</step><octave>4</octave></pitch><duration>4</duration><type>whole</type></note>
                 <note><chord/><pitch><step>E</step><octave>4</octave></pitch><duration>4</duration><type>whole</type></note>
                 <note><chord/><pitch><step>G</step><octave>4</octave></pitch><duration>4</duration><type>whole</type></note>
               </measure></part>"#,
        );
        let voice = &doc.systems()[0].measures[0].entries[0];
        let MeasureEntry::Fragment(fragment) = voice else { panic!("expected a fragment") };
        let entries = &fragment.parts[0].staves[0].voices[0].entries;
        assert_eq!(entries.len(), 1);
        let VoiceEntry::Chord(chord) = &entries[0] else { panic!("expected a chord") };
        assert_eq!(chord.heads.len(), 3);
        doc.check_invariants().unwrap();
    }

    #[test]
    fn grace_notes_and_articulations_reach_the_chord() {
        let doc = document(
            r#"<part id="P1"><measure number="1">
                 <attributes><divisions>1</divisions></attributes>
                 <note><grace/><pitch><step>B</step><octave>4</octave></pitch><type>eighth</type></note>
                 <note><pitch><step>C</step><octave>5</octave></pitch><duration>4</duration><type>whole</type>
                   <notations><articulations><accent/></articulations></notations></note>
                 <note><chord/><pitch><step>E</step><octave>5</octave></pitch><duration>4</duration><type>whole</type>
                   <notations><articulations><accent/><tenuto/></articulations></notations></note>
               </measure></part>"#,
        );
        let MeasureEntry::Fragment(fragment) = &doc.systems()[0].measures[0].entries[0] else {
            panic!("expected a fragment")
        };
        let entries = &fragment.parts[0].staves[0].voices[0].entries;
        assert_eq!(entries.len(), 1);
        let VoiceEntry::Chord(chord) = &entries[0] else { panic!("expected a chord") };
        assert_eq!(chord.grace_notes.len(), 1);
        assert_eq!(entries[0].grace_notes()[0].pitch.step, 'B');
        let kinds: Vec<ArticulationKind> = chord.articulations.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ArticulationKind::Accent, ArticulationKind::Tenuto]);
        doc.check_invariants().unwrap();
    }

    #[test]
    fn clef_change_splits_the_measure() {
        let doc = document(
            r#"<part id="P1"><measure number="1">
                 <attributes><divisions>1</divisions></attributes>
                 <note><pitch><step>C</step><octave>5</octave></pitch><duration>2</duration><type>half</type></note>
                 <attributes><clef><sign>F</sign><line>4</line></clef></attributes>
                 <note><pitch><step>C</step><octave>3</octave></pitch><duration>2</duration><type>half</type></note>
               </measure></part>"#,
        );
        let measure = &doc.systems()[0].measures[0];
        assert_eq!(measure.entries.len(), 2);
        let MeasureEntry::Fragment(second) = &measure.entries[1] else { panic!("expected a fragment") };
        assert_eq!(second.start_beat, Fraction::new(1, 2));
        assert_eq!(second.parts[0].staves[0].signature.clef, Clef::bass());
        doc.check_invariants().unwrap();
    }

    #[test]
    fn multi_rest_swallows_following_measures() {
        let doc = document(
            r#"<part id="P1">
                 <measure number="1">
                   <attributes><divisions>1</divisions><measure-style><multiple-rest>3</multiple-rest></measure-style></attributes>
                   <note><rest measure="yes"/><duration>4</duration></note>
                 </measure>
                 <measure number="2"><note><rest measure="yes"/><duration>4</duration></note></measure>
                 <measure number="3"><note><rest measure="yes"/><duration>4</duration></note></measure>
                 <measure number="4"><note><rest measure="yes"/><duration>4</duration></note></measure>
               </part>"#,
        );
        let labels: Vec<Option<u32>> = doc.measures().map(|m| m.label).collect();
        assert_eq!(labels, vec![Some(1), Some(4)]);
        let MeasureEntry::Fragment(fragment) = &doc.systems()[0].measures[0].entries[0] else {
            panic!("expected a fragment")
        };
        assert_eq!(fragment.multi_rest_count(), 3);
    }
}
