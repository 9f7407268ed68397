//! MusicXML parser: converts MusicXML text into the [`Score`] model.

use roxmltree::{Document, Node};

use crate::error::{Error, Result};
use crate::model::*;

/// Parse a MusicXML XML string into a Score.
pub fn parse_musicxml(xml: &str) -> Result<Score> {
    // MusicXML files include a DOCTYPE declaration, so we must allow DTDs
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = Document::parse_with_options(xml, options)?;
    let root = doc.root_element();

    if root.tag_name().name() != "score-partwise" {
        return Err(Error::UnsupportedRoot(root.tag_name().name().to_string()));
    }

    let mut score = Score {
        version: root.attribute("version").map(String::from),
        ..Score::default()
    };

    for child in root.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "work" => parse_work(&child, &mut score),
            "movement-title" => {
                if score.title.is_none() {
                    score.title = trimmed_text(&child);
                }
            }
            "identification" => parse_identification(&child, &mut score),
            "credit" => parse_credit(&child, &mut score),
            "part-list" => parse_part_list(&child, &mut score),
            "part" => parse_part(&child, &mut score),
            _ => {}
        }
    }

    log::debug!(
        "parsed score with {} part(s), {} measure(s)",
        score.parts.len(),
        score.measure_count()
    );
    Ok(score)
}

// ─── Header ──────────────────────────────────────────────────────────

fn parse_work(node: &Node, score: &mut Score) {
    for child in node.children().filter(|n| n.is_element()) {
        // <credit type="title"> takes priority over <work-title>.
        if child.tag_name().name() == "work-title" && score.title.is_none() {
            score.title = trimmed_text(&child);
        }
    }
}

fn parse_identification(node: &Node, score: &mut Score) {
    for child in node.children().filter(|n| n.is_element()) {
        if child.tag_name().name() == "creator"
            && child.attribute("type") == Some("composer")
            && score.composer.is_none()
        {
            score.composer = trimmed_text(&child);
        }
    }
}

fn parse_credit(node: &Node, score: &mut Score) {
    let mut credit_type = String::new();
    let mut credit_text = String::new();

    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "credit-type" => {
                credit_type = child.text().unwrap_or("").trim().to_string();
            }
            "credit-words" => {
                let text = child.text().unwrap_or("").trim();
                if !text.is_empty() {
                    if !credit_text.is_empty() {
                        credit_text.push('\n');
                    }
                    credit_text.push_str(text);
                }
            }
            _ => {}
        }
    }

    if credit_text.is_empty() {
        return;
    }
    match credit_type.as_str() {
        "title" => score.title = Some(credit_text),
        "composer" => score.composer = Some(credit_text),
        _ => {}
    }
}

// ─── Part List ───────────────────────────────────────────────────────

fn parse_part_list(node: &Node, score: &mut Score) {
    for child in node.children().filter(|n| n.is_element()) {
        if child.tag_name().name() != "score-part" {
            continue;
        }
        let mut part = Part {
            id: child.attribute("id").unwrap_or("").to_string(),
            ..Part::default()
        };
        for sp_child in child.children().filter(|n| n.is_element()) {
            match sp_child.tag_name().name() {
                "part-name" => part.name = sp_child.text().unwrap_or("").trim().to_string(),
                "part-abbreviation" => part.abbreviation = trimmed_text(&sp_child),
                _ => {}
            }
        }
        score.parts.push(part);
    }
}

fn parse_part(node: &Node, score: &mut Score) {
    let part_id = node.attribute("id").unwrap_or("");

    // Parts missing from the part-list are ignored.
    let Some(part) = score.parts.iter_mut().find(|p| p.id == part_id) else {
        log::warn!("part '{part_id}' is not declared in the part-list, skipping it");
        return;
    };

    for child in node.children().filter(|n| n.is_element()) {
        if child.tag_name().name() == "measure" {
            part.measures.push(parse_measure(&child));
        }
    }
}

// ─── Measure ─────────────────────────────────────────────────────────

fn parse_measure(node: &Node) -> Measure {
    let mut measure = Measure {
        number: node.attribute("number").map(String::from),
        implicit: node.attribute("implicit") == Some("yes"),
        width: node.attribute("width").and_then(|w| w.parse::<f64>().ok()),
        entries: Vec::new(),
    };

    for child in node.children().filter(|n| n.is_element()) {
        let entry = match child.tag_name().name() {
            "attributes" => MeasureEntry::Attributes(parse_attributes(&child)),
            "note" => MeasureEntry::Note(parse_note(&child)),
            "backup" => MeasureEntry::Backup {
                duration: child_i32(&child, "duration").unwrap_or(0),
            },
            "forward" => MeasureEntry::Forward {
                duration: child_i32(&child, "duration").unwrap_or(0),
                voice: child_text(&child, "voice"),
                staff: child_i32(&child, "staff"),
            },
            "direction" => MeasureEntry::Direction(parse_direction(&child)),
            "sound" => {
                // <sound> can appear directly in <measure> (not inside <direction>)
                match child.attribute("tempo").and_then(|t| t.parse::<f64>().ok()) {
                    Some(tempo) => MeasureEntry::Direction(Direction {
                        sound_tempo: Some(tempo),
                        ..Direction::default()
                    }),
                    None => continue,
                }
            }
            "barline" => MeasureEntry::Barline(parse_barline(&child)),
            _ => continue,
        };
        measure.entries.push(entry);
    }

    measure
}

// ─── Attributes ──────────────────────────────────────────────────────

fn parse_attributes(node: &Node) -> Attributes {
    let mut attrs = Attributes::default();

    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "divisions" => attrs.divisions = parse_i32(&child),
            "key" => attrs.keys.push(parse_key(&child)),
            "time" => attrs.times.push(parse_time(&child)),
            "staves" => attrs.staves = parse_i32(&child),
            "clef" => attrs.clefs.push(parse_clef(&child)),
            "staff-details" => attrs.staff_details.push(StaffDetails {
                number: number_attribute(&child).unwrap_or(1),
                staff_lines: child_i32(&child, "staff-lines"),
            }),
            "measure-style" => attrs.measure_styles.push(MeasureStyle {
                number: number_attribute(&child),
                multiple_rest: child_i32(&child, "multiple-rest"),
            }),
            _ => {}
        }
    }

    attrs
}

fn parse_key(node: &Node) -> Key {
    Key {
        number: number_attribute(node),
        fifths: child_i32(node, "fifths").unwrap_or(0),
        mode: child_text(node, "mode"),
    }
}

fn parse_time(node: &Node) -> TimeSignature {
    let mut ts = TimeSignature {
        number: number_attribute(node),
        components: Vec::new(),
        symbol: node.attribute("symbol").map(String::from),
        hidden: node.attribute("print-object") == Some("no"),
        senza_misura: false,
    };
    // <beats> and <beat-type> alternate; each pair is one component.
    let mut pending_beats: Option<String> = None;
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "beats" => pending_beats = trimmed_text(&child),
            "beat-type" => {
                if let (Some(beats), Some(beat_type)) = (pending_beats.take(), parse_i32(&child)) {
                    ts.components.push((beats, beat_type));
                }
            }
            "senza-misura" => ts.senza_misura = true,
            _ => {}
        }
    }
    ts
}

fn parse_clef(node: &Node) -> Clef {
    Clef {
        number: number_attribute(node).unwrap_or(1),
        sign: child_text(node, "sign").unwrap_or_else(|| "G".to_string()),
        line: child_i32(node, "line"),
        octave_change: child_i32(node, "clef-octave-change"),
    }
}

// ─── Note ────────────────────────────────────────────────────────────

fn parse_note(node: &Node) -> Note {
    let mut note = Note::default();

    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "pitch" => note.pitch = Some(parse_pitch(&child)),
            "duration" => note.duration = parse_i32(&child).unwrap_or(0),
            "voice" => note.voice = trimmed_text(&child),
            "staff" => note.staff = parse_i32(&child),
            "type" => note.note_type = trimmed_text(&child),
            "stem" => note.stem = trimmed_text(&child),
            "notehead" => note.notehead = trimmed_text(&child),
            "beam" => note.beams.push(Beam {
                number: number_attribute(&child).unwrap_or(1),
                beam_type: child.text().unwrap_or("").trim().to_string(),
            }),
            "rest" => {
                note.rest = Some(Rest {
                    measure: child.attribute("measure") == Some("yes"),
                    display_step: child_text(&child, "display-step"),
                    display_octave: child_i32(&child, "display-octave"),
                })
            }
            "grace" => {
                note.grace = true;
                note.grace_slash = child.attribute("slash") == Some("yes");
            }
            "chord" => note.chord = true,
            "dot" => note.dots += 1,
            "accidental" => note.accidental = trimmed_text(&child),
            "time-modification" => {
                note.time_modification = Some(TimeModification {
                    actual_notes: child_i32(&child, "actual-notes").unwrap_or(1),
                    normal_notes: child_i32(&child, "normal-notes").unwrap_or(1),
                })
            }
            "notations" => parse_notations(&child, &mut note.notations),
            "lyric" => {
                let text = child_text(&child, "text").unwrap_or_default();
                if !text.is_empty() {
                    note.lyrics.push(Lyric {
                        number: number_attribute(&child).unwrap_or(1),
                        text,
                    });
                }
            }
            _ => {}
        }
    }

    note
}

fn parse_notations(node: &Node, notations: &mut Notations) {
    for nc in node.children().filter(|n| n.is_element()) {
        match nc.tag_name().name() {
            "slur" => notations.slurs.push(SlurEvent {
                slur_type: nc.attribute("type").unwrap_or("").to_string(),
                number: number_attribute(&nc).unwrap_or(1),
                placement: nc.attribute("placement").map(String::from),
                orientation: nc.attribute("orientation").map(String::from),
            }),
            "tied" => {
                if let Some(tie_type) = nc.attribute("type") {
                    notations.ties.push(tie_type.to_string());
                }
            }
            "tuplet" => notations.tuplets.push(TupletEvent {
                tuplet_type: nc.attribute("type").unwrap_or("").to_string(),
                placement: nc.attribute("placement").map(String::from),
                show_number: nc.attribute("show-number").map(String::from),
                bracket: nc.attribute("bracket").map(|b| b == "yes"),
            }),
            "articulations" => {
                for mark in nc.children().filter(|n| n.is_element()) {
                    notations.articulations.push(ArticulationMark {
                        name: mark.tag_name().name().to_string(),
                        placement: mark.attribute("placement").map(String::from),
                    });
                }
            }
            _ => {}
        }
    }
}

fn parse_pitch(node: &Node) -> Pitch {
    Pitch {
        step: child_text(node, "step").unwrap_or_else(|| "C".to_string()),
        octave: child_i32(node, "octave").unwrap_or(4),
        alter: node
            .children()
            .find(|n| n.has_tag_name("alter"))
            .and_then(|n| parse_f64(&n)),
    }
}

// ─── Barline ─────────────────────────────────────────────────────────

fn parse_barline(node: &Node) -> Barline {
    Barline {
        location: node.attribute("location").unwrap_or("right").to_string(),
        bar_style: child_text(node, "bar-style"),
        repeat: node
            .children()
            .find(|n| n.has_tag_name("repeat"))
            .map(|r| r.attribute("direction").unwrap_or("forward").to_string()),
    }
}

// ─── Direction ───────────────────────────────────────────────────────

fn parse_direction(node: &Node) -> Direction {
    let mut direction = Direction {
        placement: node.attribute("placement").map(String::from),
        ..Direction::default()
    };

    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "direction-type" => {
                for dt_child in child.children().filter(|n| n.is_element()) {
                    match dt_child.tag_name().name() {
                        "metronome" => direction.metronome = Some(parse_metronome(&dt_child)),
                        "words" => {
                            if let Some(words) = trimmed_text(&dt_child) {
                                direction.words.push(words);
                            }
                        }
                        "wedge" => direction.wedges.push(WedgeEvent {
                            wedge_type: dt_child.attribute("type").unwrap_or("").to_string(),
                            number: number_attribute(&dt_child).unwrap_or(1),
                        }),
                        "pedal" => direction.pedals.push(PedalEvent {
                            pedal_type: dt_child.attribute("type").unwrap_or("").to_string(),
                            line: dt_child.attribute("line").map(|v| v == "yes"),
                            sign: dt_child.attribute("sign").map(|v| v == "yes"),
                        }),
                        _ => {}
                    }
                }
            }
            "staff" => direction.staff = parse_i32(&child),
            "voice" => direction.voice = trimmed_text(&child),
            "sound" => {
                direction.sound_tempo = child.attribute("tempo").and_then(|t| t.parse::<f64>().ok());
            }
            _ => {}
        }
    }

    direction
}

fn parse_metronome(node: &Node) -> MetronomeMark {
    let mut mark = MetronomeMark {
        beat_unit: "quarter".to_string(),
        per_minute: 120.0,
        dotted: false,
    };

    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "beat-unit" => {
                mark.beat_unit = child.text().unwrap_or("quarter").trim().to_string();
            }
            "beat-unit-dot" => mark.dotted = true,
            "per-minute" => {
                if let Some(bpm) = parse_f64(&child) {
                    mark.per_minute = bpm;
                }
            }
            _ => {}
        }
    }

    mark
}

// ─── Helpers ─────────────────────────────────────────────────────────

fn parse_i32(node: &Node) -> Option<i32> {
    node.text()?.trim().parse().ok()
}

fn parse_f64(node: &Node) -> Option<f64> {
    node.text()?.trim().parse().ok()
}

fn trimmed_text(node: &Node) -> Option<String> {
    node.text().map(|t| t.trim().to_string())
}

fn child_text(node: &Node, name: &str) -> Option<String> {
    node.children().find(|n| n.has_tag_name(name)).and_then(|n| trimmed_text(&n))
}

fn child_i32(node: &Node, name: &str) -> Option<i32> {
    node.children().find(|n| n.has_tag_name(name)).and_then(|n| parse_i32(&n))
}

fn number_attribute(node: &Node) -> Option<i32> {
    node.attribute("number").and_then(|n| n.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn keeps_measure_children_in_document_order() {
        let xml = r#"<score-partwise version="4.0">
          <part-list><score-part id="P1"><part-name>Flute</part-name></score-part></part-list>
          <part id="P1"><measure number="1">
            <attributes><divisions>1</divisions><time><beats>3+2</beats><beat-type>8</beat-type></time></attributes>
            <note><pitch><step>C</step><octave>5</octave></pitch><duration>1</duration></note>
            <backup><duration>1</duration></backup>
            <note><rest/><duration>1</duration><voice>2</voice></note>
          </measure></part>
        </score-partwise>"#;

        let score = parse_musicxml(xml).unwrap();
        let entries = &score.parts[0].measures[0].entries;
        let kinds: Vec<&str> = entries
            .iter()
            .map(|e| match e {
                MeasureEntry::Attributes(_) => "attributes",
                MeasureEntry::Note(_) => "note",
                MeasureEntry::Backup { .. } => "backup",
                MeasureEntry::Forward { .. } => "forward",
                MeasureEntry::Direction(_) => "direction",
                MeasureEntry::Barline(_) => "barline",
            })
            .collect();
        assert_eq!(kinds, vec!["attributes", "note", "backup", "note"]);

        let MeasureEntry::Attributes(attrs) = &entries[0] else { panic!("expected attributes") };
        assert_eq!(attrs.times[0].components, vec![("3+2".to_string(), 8)]);
    }

    #[test]
    fn rejects_timewise_scores() {
        let err = parse_musicxml("<score-timewise/>").unwrap_err();
        assert!(matches!(err, Error::UnsupportedRoot(ref name) if name == "score-timewise"));
    }

    #[test]
    fn reads_grace_slashes_and_articulations() {
        let xml = r#"<score-partwise version="4.0">
          <part-list><score-part id="P1"><part-name>Oboe</part-name></score-part></part-list>
          <part id="P1"><measure number="1">
            <note><grace slash="yes"/><pitch><step>D</step><octave>5</octave></pitch><type>eighth</type></note>
            <note><pitch><step>C</step><octave>5</octave></pitch><duration>4</duration><type>whole</type>
              <notations><articulations><staccato placement="below"/><accent/></articulations></notations></note>
          </measure></part>
        </score-partwise>"#;

        let score = parse_musicxml(xml).unwrap();
        let notes: Vec<&Note> = score.parts[0].measures[0]
            .entries
            .iter()
            .filter_map(|e| match e {
                MeasureEntry::Note(n) => Some(n),
                _ => None,
            })
            .collect();
        assert!(notes[0].grace && notes[0].grace_slash);
        assert!(!notes[1].grace);
        let marks: Vec<(&str, Option<&str>)> = notes[1]
            .notations
            .articulations
            .iter()
            .map(|a| (a.name.as_str(), a.placement.as_deref()))
            .collect();
        assert_eq!(marks, vec![("staccato", Some("below")), ("accent", None)]);
    }
}
