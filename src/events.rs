//! Flattens a part's measures into beat-tagged events.
//!
//! Each measure is replayed in document order: `<backup>`/`<forward>` move
//! the beat cursor, chord members share the beat of the note they attach
//! to, attributes become signature events at the cursor. Beams and tuplets
//! are grouped per voice and measure; curves, wedges and pedals get
//! document-wide ids here.

use std::collections::{BTreeMap, HashMap};

use crate::document::{
    Accidental, AccidentalCode, Annotation, Articulation, ArticulationKind, DurationType, GraceNote, Notehead, Pitch,
    StemDirection,
};
use crate::fraction::Fraction;
use crate::model;
use crate::signature::{Clef, Key, KeyMode, Metronome, Time};
use crate::spanners::{
    BeamAccumulator, BeamValue, Curve, CurveKind, CurveOpening, IdAllocator, Pedal, PedalKind,
    PedalMark, PedalMarkKind, Placement, Tuplet, TupletAccumulator, TupletValue, Wedge, WedgeKind,
};

#[derive(Debug, Clone, PartialEq)]
pub struct MeasureEvent {
    pub part_index: usize,
    pub measure_index: usize,
    pub measure_beat: Fraction,
    pub kind: MeasureEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MeasureEventKind {
    Note(NoteEvent),
    Rest(RestEvent),
    /// Stave indexes are 0-based.
    Clef { stave: usize, clef: Clef },
    /// `None` applies to every stave of the part.
    Key { stave: Option<usize>, key: Key },
    Time { stave: Option<usize>, time: Time },
    StaveCount(usize),
    StaveLineCount { stave: usize, line_count: u32 },
    Metronome(Metronome),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoteEvent {
    pub stave: usize,
    pub voice: String,
    pub pitch: Pitch,
    pub head: Notehead,
    pub stem: StemDirection,
    pub duration: Fraction,
    pub duration_type: DurationType,
    pub dot_count: u32,
    pub accidental: Option<Accidental>,
    pub annotations: Vec<Annotation>,
    pub articulations: Vec<Articulation>,
    /// Grace notes written before this note in its voice.
    pub grace_notes: Vec<GraceNote>,
    pub curve_ids: Vec<String>,
    pub beam_id: Option<String>,
    pub tuplet_id: Option<String>,
    pub wedge_id: Option<String>,
    pub pedal_mark: Option<PedalMark>,
    /// Sounds together with the preceding note of the same voice.
    pub chord: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestEvent {
    pub stave: usize,
    pub voice: String,
    pub duration: Fraction,
    pub duration_type: DurationType,
    pub dot_count: u32,
    pub display_pitch: Option<Pitch>,
    pub beam_id: Option<String>,
    pub tuplet_id: Option<String>,
    pub whole_measure: bool,
}

impl MeasureEvent {
    pub fn stave(&self) -> Option<usize> {
        match &self.kind {
            MeasureEventKind::Note(n) => Some(n.stave),
            MeasureEventKind::Rest(r) => Some(r.stave),
            MeasureEventKind::Clef { stave, .. } => Some(*stave),
            MeasureEventKind::StaveLineCount { stave, .. } => Some(*stave),
            MeasureEventKind::Key { stave, .. } | MeasureEventKind::Time { stave, .. } => *stave,
            MeasureEventKind::StaveCount(_) | MeasureEventKind::Metronome(_) => None,
        }
    }
}

/// Everything extracted from one part.
#[derive(Debug, Default)]
pub struct PartEvents {
    pub events: Vec<MeasureEvent>,
    /// Measure index → multi-measure rest count starting there.
    pub multi_rests: BTreeMap<usize, u32>,
    pub tuplets: HashMap<String, Tuplet>,
    pub curves: Vec<Curve>,
    pub wedges: Vec<Wedge>,
    pub pedals: Vec<Pedal>,
}

// ═══════════════════════════════════════════════════════════════════════
// Extraction
// ═══════════════════════════════════════════════════════════════════════

pub fn extract_part_events(part_index: usize, part: &model::Part, ids: &mut IdAllocator) -> PartEvents {
    let mut extractor = Extractor {
        part_index,
        ids,
        out: PartEvents::default(),
        divisions: 1,
        open_slurs: HashMap::new(),
        open_ties: HashMap::new(),
        open_wedges: Vec::new(),
        open_pedal: None,
        pending_words: HashMap::new(),
        pending_graces: HashMap::new(),
    };
    for (measure_index, measure) in part.measures.iter().enumerate() {
        extractor.measure(measure_index, measure);
    }

    let mut out = extractor.out;
    // Stable: events at the same beat keep their document order.
    out.events.sort_by(|a, b| {
        a.measure_index
            .cmp(&b.measure_index)
            .then_with(|| a.measure_beat.cmp(&b.measure_beat))
    });
    out
}

struct OpenPedal {
    id: String,
    next_mark: PedalMarkKind,
    last_event: Option<usize>,
}

struct Extractor<'a> {
    part_index: usize,
    ids: &'a mut IdAllocator,
    out: PartEvents,
    divisions: i32,
    open_slurs: HashMap<i32, String>,
    open_ties: HashMap<(usize, char, i32), String>,
    /// `(number, stave, id)`
    open_wedges: Vec<(i32, usize, String)>,
    open_pedal: Option<OpenPedal>,
    /// Direction words waiting for the next note on a stave.
    pending_words: HashMap<usize, Vec<Annotation>>,
    /// Grace notes waiting for the next note of a `(stave, voice)`.
    pending_graces: HashMap<(usize, String), Vec<GraceNote>>,
}

impl<'a> Extractor<'a> {
    fn measure(&mut self, measure_index: usize, measure: &model::Measure) {
        let mut cursor = Fraction::zero();
        let mut last_note_beat = Fraction::zero();
        let mut beams: HashMap<String, BeamAccumulator<()>> = HashMap::new();
        let mut tuplets: HashMap<String, TupletAccumulator<()>> = HashMap::new();

        for entry in &measure.entries {
            match entry {
                model::MeasureEntry::Attributes(attrs) => {
                    if let Some(divisions) = attrs.divisions.filter(|d| *d > 0) {
                        self.divisions = divisions;
                    }
                    self.attributes(measure_index, cursor, attrs);
                }
                model::MeasureEntry::Backup { duration } => {
                    cursor = cursor.subtract(&self.beats(*duration));
                    if cursor.is_less_than(&Fraction::zero()) {
                        cursor = Fraction::zero();
                    }
                }
                model::MeasureEntry::Forward { duration, .. } => {
                    cursor = cursor.add(&self.beats(*duration));
                }
                model::MeasureEntry::Direction(direction) => {
                    self.direction(measure_index, cursor, direction);
                }
                model::MeasureEntry::Note(note) => {
                    if note.grace {
                        self.grace(measure_index, note);
                        continue;
                    }
                    let beat = if note.chord { last_note_beat } else { cursor };
                    self.note(measure_index, beat, note, &mut beams, &mut tuplets);
                    if !note.chord {
                        last_note_beat = cursor;
                        cursor = cursor.add(&self.note_duration(note));
                    }
                }
                model::MeasureEntry::Barline(_) => {}
            }
        }

        let trailing: usize = self.pending_graces.drain().map(|(_, graces)| graces.len()).sum();
        if trailing > 0 {
            log::debug!("measure {measure_index}: {trailing} grace notes with no following note dropped");
        }
    }

    fn beats(&self, divisions: i32) -> Fraction {
        Fraction::new(divisions.max(0) as i64, self.divisions as i64 * 4)
    }

    fn note_duration(&self, note: &model::Note) -> Fraction {
        if note.duration > 0 {
            return self.beats(note.duration);
        }
        note.note_type
            .as_deref()
            .and_then(DurationType::from_musicxml)
            .map(|t| t.dotted_fraction(note.dots))
            .unwrap_or_else(Fraction::zero)
    }

    fn push(&mut self, measure_index: usize, measure_beat: Fraction, kind: MeasureEventKind) -> usize {
        self.out.events.push(MeasureEvent {
            part_index: self.part_index,
            measure_index,
            measure_beat,
            kind,
        });
        self.out.events.len() - 1
    }

    // ─── Attributes ──────────────────────────────────────────────────

    fn attributes(&mut self, measure_index: usize, beat: Fraction, attrs: &model::Attributes) {
        if let Some(staves) = attrs.staves.filter(|s| *s > 0) {
            self.push(measure_index, beat, MeasureEventKind::StaveCount(staves as usize));
        }
        for clef in &attrs.clefs {
            let kind = MeasureEventKind::Clef {
                stave: stave_index(Some(clef.number)),
                clef: Clef::from_musicxml(&clef.sign, clef.line, clef.octave_change),
            };
            self.push(measure_index, beat, kind);
        }
        for key in &attrs.keys {
            let kind = MeasureEventKind::Key {
                stave: key.number.map(|n| stave_index(Some(n))),
                key: Key::new(key.fifths, KeyMode::from_musicxml(key.mode.as_deref())),
            };
            self.push(measure_index, beat, kind);
        }
        for time in &attrs.times {
            let hidden = time.hidden || time.senza_misura;
            match Time::from_musicxml(&time.components, time.symbol.as_deref(), hidden) {
                Some(parsed) => {
                    let kind = MeasureEventKind::Time {
                        stave: time.number.map(|n| stave_index(Some(n))),
                        time: parsed,
                    };
                    self.push(measure_index, beat, kind);
                }
                None => log::warn!("measure {measure_index}: unreadable time signature ignored"),
            }
        }
        for details in &attrs.staff_details {
            if let Some(lines) = details.staff_lines.filter(|l| *l >= 0) {
                let kind = MeasureEventKind::StaveLineCount {
                    stave: stave_index(Some(details.number)),
                    line_count: lines as u32,
                };
                self.push(measure_index, beat, kind);
            }
        }
        for style in &attrs.measure_styles {
            if let Some(count) = style.multiple_rest.filter(|c| *c > 1) {
                self.out.multi_rests.insert(measure_index, count as u32);
            }
        }
    }

    // ─── Directions ──────────────────────────────────────────────────

    fn direction(&mut self, measure_index: usize, beat: Fraction, direction: &model::Direction) {
        let stave = stave_index(direction.staff);

        if let Some(mark) = &direction.metronome {
            let metronome = Metronome {
                beat_unit: mark.beat_unit.clone(),
                dots: u32::from(mark.dotted),
                bpm: mark.per_minute,
            };
            self.push(measure_index, beat, MeasureEventKind::Metronome(metronome));
        } else if let Some(tempo) = direction.sound_tempo {
            let metronome = Metronome { bpm: tempo, ..Metronome::default() };
            self.push(measure_index, beat, MeasureEventKind::Metronome(metronome));
        }

        let placement = Placement::from_musicxml(direction.placement.as_deref());
        for words in &direction.words {
            self.pending_words.entry(stave).or_default().push(Annotation {
                text: words.clone(),
                placement: if placement == Placement::Auto { Placement::Above } else { placement },
            });
        }

        for wedge in &direction.wedges {
            match wedge.wedge_type.as_str() {
                kind @ ("crescendo" | "diminuendo") => {
                    let id = self.ids.next("wedge");
                    self.out.wedges.push(Wedge {
                        id: id.clone(),
                        kind: if kind == "crescendo" { WedgeKind::Crescendo } else { WedgeKind::Diminuendo },
                        placement,
                    });
                    self.open_wedges.retain(|(n, s, _)| !(*n == wedge.number && *s == stave));
                    self.open_wedges.push((wedge.number, stave, id));
                }
                "stop" => self.open_wedges.retain(|(n, s, _)| !(*n == wedge.number && *s == stave)),
                _ => {}
            }
        }

        for pedal in &direction.pedals {
            match pedal.pedal_type.as_str() {
                "start" => {
                    self.close_pedal();
                    let line = pedal.line.unwrap_or(false);
                    let kind = match (line, pedal.sign.unwrap_or(!line)) {
                        (true, true) => PedalKind::Mixed,
                        (true, false) => PedalKind::Bracket,
                        (false, _) => PedalKind::Text,
                    };
                    let id = self.ids.next("pedal");
                    self.out.pedals.push(Pedal { id: id.clone(), kind });
                    self.open_pedal = Some(OpenPedal { id, next_mark: PedalMarkKind::Start, last_event: None });
                }
                "change" => {
                    if let Some(open) = self.open_pedal.as_mut() {
                        open.next_mark = PedalMarkKind::Change;
                    }
                }
                "stop" => self.close_pedal(),
                _ => {}
            }
        }
    }

    /// Mark the last pedalled note as the end of the pedal.
    fn close_pedal(&mut self) {
        let Some(open) = self.open_pedal.take() else { return };
        let Some(index) = open.last_event else { return };
        if let MeasureEventKind::Note(note) = &mut self.out.events[index].kind {
            if let Some(mark) = note.pedal_mark.as_mut().filter(|m| m.kind != PedalMarkKind::Start) {
                mark.kind = PedalMarkKind::End;
            }
        }
    }

    // ─── Notes ───────────────────────────────────────────────────────

    fn note(
        &mut self,
        measure_index: usize,
        beat: Fraction,
        note: &model::Note,
        beams: &mut HashMap<String, BeamAccumulator<()>>,
        tuplets: &mut HashMap<String, TupletAccumulator<()>>,
    ) {
        let stave = stave_index(note.staff);
        let voice = note.voice.clone().unwrap_or_else(|| "1".to_string());
        let duration = self.note_duration(note);
        let (duration_type, dot_count) = match note.note_type.as_deref().and_then(DurationType::from_musicxml) {
            Some(kind) => (kind, note.dots),
            None => DurationType::from_fraction(&duration),
        };

        // Chord members inherit grouping from the note they attach to.
        let (beam_id, tuplet_id) = if note.chord {
            (None, None)
        } else {
            let beam_id = note
                .beams
                .iter()
                .find(|b| b.number == 1)
                .and_then(|b| BeamValue::from_musicxml(&b.beam_type))
                .and_then(|value| beams.entry(voice.clone()).or_default().push(value, (), self.ids));
            let tuplet_id = self.tuplet(note, &voice, tuplets);
            (beam_id, tuplet_id)
        };

        if let Some(rest) = &note.rest {
            let (duration_type, dot_count) = if rest.measure && note.note_type.is_none() {
                (DurationType::Whole, 0)
            } else {
                (duration_type, dot_count)
            };
            let display_pitch = rest
                .display_step
                .as_deref()
                .map(|step| Pitch::from_musicxml(step, rest.display_octave.unwrap_or(4)));
            let kind = MeasureEventKind::Rest(RestEvent {
                stave,
                voice,
                duration,
                duration_type,
                dot_count,
                display_pitch,
                beam_id,
                tuplet_id,
                whole_measure: rest.measure,
            });
            self.push(measure_index, beat, kind);
            return;
        }

        let pitch = note
            .pitch
            .as_ref()
            .map(|p| Pitch::from_musicxml(&p.step, p.octave))
            .unwrap_or_else(|| Pitch::new('B', 4));
        let accidental = note
            .accidental
            .as_deref()
            .and_then(AccidentalCode::from_musicxml)
            .map(|code| Accidental { code, cautionary: false });

        let curve_ids = self.curves(stave, &pitch, note);
        let wedge_id = self
            .open_wedges
            .iter()
            .find(|(_, s, _)| *s == stave)
            .map(|(_, _, id)| id.clone());
        let pedal_mark = if note.chord {
            None
        } else {
            self.open_pedal.as_mut().map(|open| {
                let kind = open.next_mark;
                open.next_mark = PedalMarkKind::Continue;
                PedalMark { pedal_id: open.id.clone(), kind }
            })
        };

        let mut annotations = if note.chord {
            Vec::new()
        } else {
            self.pending_words.remove(&stave).unwrap_or_default()
        };
        annotations.extend(note.lyrics.iter().map(|lyric| Annotation {
            text: lyric.text.clone(),
            placement: Placement::Below,
        }));

        let articulations = note
            .notations
            .articulations
            .iter()
            .filter_map(|mark| {
                let kind = ArticulationKind::from_musicxml(&mark.name)?;
                Some(Articulation { kind, placement: Placement::from_musicxml(mark.placement.as_deref()) })
            })
            .collect();
        let grace_notes = if note.chord {
            Vec::new()
        } else {
            self.pending_graces.remove(&(stave, voice.clone())).unwrap_or_default()
        };

        let has_pedal = pedal_mark.is_some();
        let kind = MeasureEventKind::Note(NoteEvent {
            stave,
            voice,
            pitch,
            head: Notehead::from_musicxml(note.notehead.as_deref()),
            stem: StemDirection::from_musicxml(note.stem.as_deref()),
            duration,
            duration_type,
            dot_count,
            accidental,
            annotations,
            articulations,
            grace_notes,
            curve_ids,
            beam_id,
            tuplet_id,
            wedge_id,
            pedal_mark,
            chord: note.chord,
        });
        let index = self.push(measure_index, beat, kind);
        if has_pedal {
            if let Some(open) = self.open_pedal.as_mut() {
                open.last_event = Some(index);
            }
        }
    }

    /// Queue a grace note for the next note of its voice. Grace chords keep
    /// their first pitch only.
    fn grace(&mut self, measure_index: usize, note: &model::Note) {
        let Some(pitch) = note.pitch.as_ref() else {
            log::debug!("measure {measure_index}: unpitched grace note skipped");
            return;
        };
        let voice = note.voice.clone().unwrap_or_else(|| "1".to_string());
        let queue = self.pending_graces.entry((stave_index(note.staff), voice)).or_default();
        if note.chord && !queue.is_empty() {
            return;
        }
        queue.push(GraceNote {
            pitch: Pitch::from_musicxml(&pitch.step, pitch.octave),
            accidental: note
                .accidental
                .as_deref()
                .and_then(AccidentalCode::from_musicxml)
                .map(|code| Accidental { code, cautionary: false }),
            duration_type: note
                .note_type
                .as_deref()
                .and_then(DurationType::from_musicxml)
                .unwrap_or(DurationType::Eighth),
            slash: note.grace_slash,
        });
    }

    /// Only the first `<tuplet>` notation of a note counts.
    fn tuplet(
        &mut self,
        note: &model::Note,
        voice: &str,
        tuplets: &mut HashMap<String, TupletAccumulator<()>>,
    ) -> Option<String> {
        let notation = note.notations.tuplets.first();
        let value = match notation.map(|t| t.tuplet_type.as_str()) {
            Some("start") => TupletValue::Start,
            Some("stop") => TupletValue::Stop,
            _ if note.time_modification.is_some() => TupletValue::Unspecified,
            _ => return None,
        };
        let id = tuplets.entry(voice.to_string()).or_default().push(value, (), self.ids)?;
        if value == TupletValue::Start {
            let notation = notation?;
            self.out.tuplets.insert(
                id.clone(),
                Tuplet {
                    id: id.clone(),
                    placement: Placement::from_musicxml(notation.placement.as_deref()),
                    show_number: notation.show_number.as_deref() != Some("none"),
                    ratio: note.time_modification.as_ref().map(|m| (m.actual_notes, m.normal_notes)),
                },
            );
        }
        Some(id)
    }

    /// Slurs (keyed by number) and ties (keyed by stave and pitch). Stops
    /// are handled before starts so a note can end one slur and begin
    /// another.
    fn curves(&mut self, stave: usize, pitch: &Pitch, note: &model::Note) -> Vec<String> {
        let mut ids = Vec::new();

        let mut slurs: Vec<&model::SlurEvent> = note.notations.slurs.iter().collect();
        slurs.sort_by_key(|s| if s.slur_type == "stop" { 0 } else { 1 });
        for slur in slurs {
            match slur.slur_type.as_str() {
                "start" => {
                    let id = self.ids.next("curve");
                    self.out.curves.push(Curve {
                        id: id.clone(),
                        kind: CurveKind::Slur,
                        placement: Placement::from_musicxml(slur.placement.as_deref()),
                        opening: match slur.orientation.as_deref() {
                            Some("over") => CurveOpening::Down,
                            Some("under") => CurveOpening::Up,
                            _ => CurveOpening::Auto,
                        },
                    });
                    self.open_slurs.insert(slur.number, id.clone());
                    ids.push(id);
                }
                "continue" => {
                    if let Some(id) = self.open_slurs.get(&slur.number) {
                        ids.push(id.clone());
                    }
                }
                "stop" => {
                    if let Some(id) = self.open_slurs.remove(&slur.number) {
                        ids.push(id);
                    }
                }
                _ => {}
            }
        }

        let tie_key = (stave, pitch.step, pitch.octave);
        if note.notations.ties.iter().any(|t| t == "stop") {
            if let Some(id) = self.open_ties.remove(&tie_key) {
                ids.push(id);
            }
        }
        if note.notations.ties.iter().any(|t| t == "start") {
            let id = self.ids.next("curve");
            self.out.curves.push(Curve {
                id: id.clone(),
                kind: CurveKind::Tie,
                placement: Placement::Auto,
                opening: CurveOpening::Auto,
            });
            self.open_ties.insert(tie_key, id.clone());
            ids.push(id);
        }

        ids
    }
}

fn stave_index(number: Option<i32>) -> usize {
    number.map_or(0, |n| (n.max(1) - 1) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_musicxml;
    use pretty_assertions::assert_eq;

    fn single_part(measures: &str) -> model::Part {
        let xml = format!(
            r#"<score-partwise><part-list><score-part id="P1"><part-name>P</part-name></score-part></part-list>
               <part id="P1">{measures}</part></score-partwise>"#
        );
        parse_musicxml(&xml).unwrap().parts.remove(0)
    }

    fn beats(events: &[MeasureEvent]) -> Vec<Fraction> {
        events.iter().map(|e| e.measure_beat).collect()
    }

    #[test]
    fn backup_and_chords_share_beats() {
        let part = single_part(
            r#"<measure number="1">
                 <attributes><divisions>2</divisions></attributes>
                 <note><pitch><step>C</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice><type>quarter</type></note>
                 <note><chord/><pitch><step>E</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice><type>quarter</type></note>
                 <note><pitch><step>D</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice><type>quarter</type></note>
                 <backup><duration>4</duration></backup>
                 <note><rest/><duration>4</duration><voice>2</voice><type>half</type></note>
               </measure>"#,
        );
        let out = extract_part_events(0, &part, &mut IdAllocator::new());
        let notes: Vec<&MeasureEvent> = out
            .events
            .iter()
            .filter(|e| matches!(e.kind, MeasureEventKind::Note(_) | MeasureEventKind::Rest(_)))
            .collect();
        let got: Vec<Fraction> = notes.iter().map(|e| e.measure_beat).collect();
        // Sorted by beat, document order within a beat.
        assert_eq!(
            got,
            vec![Fraction::zero(), Fraction::zero(), Fraction::zero(), Fraction::new(1, 4)]
        );
        assert!(matches!(&notes[1].kind, MeasureEventKind::Note(n) if n.chord));
        assert!(matches!(&notes[2].kind, MeasureEventKind::Rest(r) if r.voice == "2"));
    }

    #[test]
    fn mid_measure_clef_lands_on_its_beat() {
        let part = single_part(
            r#"<measure number="1">
                 <attributes><divisions>1</divisions><clef><sign>G</sign><line>2</line></clef></attributes>
                 <note><pitch><step>C</step><octave>5</octave></pitch><duration>2</duration><type>half</type></note>
                 <attributes><clef><sign>F</sign><line>4</line></clef></attributes>
                 <note><pitch><step>C</step><octave>3</octave></pitch><duration>2</duration><type>half</type></note>
               </measure>"#,
        );
        let out = extract_part_events(0, &part, &mut IdAllocator::new());
        let clefs: Vec<&MeasureEvent> = out
            .events
            .iter()
            .filter(|e| matches!(e.kind, MeasureEventKind::Clef { .. }))
            .collect();
        assert_eq!(beats(&clefs.into_iter().cloned().collect::<Vec<_>>()), vec![Fraction::zero(), Fraction::new(1, 2)]);
    }

    #[test]
    fn beams_slurs_and_ties_get_ids() {
        let part = single_part(
            r#"<measure number="1">
                 <attributes><divisions>2</divisions></attributes>
                 <note><pitch><step>C</step><octave>5</octave></pitch><duration>1</duration><type>eighth</type>
                   <beam number="1">begin</beam><notations><slur type="start" number="1"/><tied type="start"/></notations></note>
                 <note><pitch><step>C</step><octave>5</octave></pitch><duration>1</duration><type>eighth</type>
                   <beam number="1">end</beam><notations><slur type="stop" number="1"/><tied type="stop"/></notations></note>
               </measure>"#,
        );
        let out = extract_part_events(0, &part, &mut IdAllocator::new());
        let notes: Vec<&NoteEvent> = out
            .events
            .iter()
            .filter_map(|e| match &e.kind {
                MeasureEventKind::Note(n) => Some(n),
                _ => None,
            })
            .collect();
        assert_eq!(notes[0].beam_id, notes[1].beam_id);
        assert!(notes[0].beam_id.is_some());
        assert_eq!(out.curves.len(), 2);
        assert_eq!(notes[0].curve_ids, notes[1].curve_ids);
    }

    #[test]
    fn pedal_marks_start_and_end() {
        let part = single_part(
            r#"<measure number="1">
                 <attributes><divisions>1</divisions></attributes>
                 <direction><direction-type><pedal type="start" line="yes"/></direction-type></direction>
                 <note><pitch><step>C</step><octave>4</octave></pitch><duration>1</duration><type>quarter</type></note>
                 <note><pitch><step>D</step><octave>4</octave></pitch><duration>1</duration><type>quarter</type></note>
                 <note><pitch><step>E</step><octave>4</octave></pitch><duration>1</duration><type>quarter</type></note>
                 <direction><direction-type><pedal type="stop" line="yes"/></direction-type></direction>
                 <note><pitch><step>F</step><octave>4</octave></pitch><duration>1</duration><type>quarter</type></note>
               </measure>"#,
        );
        let out = extract_part_events(0, &part, &mut IdAllocator::new());
        let marks: Vec<Option<PedalMarkKind>> = out
            .events
            .iter()
            .filter_map(|e| match &e.kind {
                MeasureEventKind::Note(n) => Some(n.pedal_mark.as_ref().map(|m| m.kind)),
                _ => None,
            })
            .collect();
        assert_eq!(
            marks,
            vec![
                Some(PedalMarkKind::Start),
                Some(PedalMarkKind::Continue),
                Some(PedalMarkKind::End),
                None
            ]
        );
        assert_eq!(out.pedals[0].kind, PedalKind::Bracket);
    }

    #[test]
    fn grace_notes_ride_on_the_following_note() {
        let part = single_part(
            r#"<measure number="1">
                 <attributes><divisions>1</divisions></attributes>
                 <note><grace slash="yes"/><pitch><step>D</step><octave>5</octave></pitch><voice>1</voice><type>eighth</type></note>
                 <note><grace/><pitch><step>E</step><octave>5</octave></pitch><voice>1</voice><type>16th</type></note>
                 <note><pitch><step>C</step><octave>5</octave></pitch><duration>2</duration><voice>1</voice><type>half</type>
                   <notations><articulations><tenuto/><staccato placement="below"/><fermata/></articulations></notations></note>
                 <note><pitch><step>G</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice><type>half</type></note>
               </measure>"#,
        );
        let out = extract_part_events(0, &part, &mut IdAllocator::new());
        let notes: Vec<(&MeasureEvent, &NoteEvent)> = out
            .events
            .iter()
            .filter_map(|e| match &e.kind {
                MeasureEventKind::Note(n) => Some((e, n)),
                _ => None,
            })
            .collect();
        assert_eq!(notes.len(), 2);
        assert_eq!(beats(&[notes[0].0.clone(), notes[1].0.clone()]), vec![Fraction::zero(), Fraction::new(1, 2)]);

        let graces = &notes[0].1.grace_notes;
        let pitches: Vec<Pitch> = graces.iter().map(|g| g.pitch.clone()).collect();
        assert_eq!(pitches, vec![Pitch::new('D', 5), Pitch::new('E', 5)]);
        assert!(graces[0].slash && !graces[1].slash);
        assert_eq!(graces[1].duration_type, DurationType::Sixteenth);
        assert!(notes[1].1.grace_notes.is_empty());

        let kinds: Vec<(ArticulationKind, Placement)> =
            notes[0].1.articulations.iter().map(|a| (a.kind, a.placement)).collect();
        assert_eq!(
            kinds,
            vec![(ArticulationKind::Tenuto, Placement::Auto), (ArticulationKind::Staccato, Placement::Below)]
        );
    }
}
