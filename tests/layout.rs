//! End-to-end layout tests over small inline MusicXML scores.

use pretty_assertions::assert_eq;
use scorelayout::document::{Document, GapSpec, MeasureEntry};
use scorelayout::renderer::{
    FragmentRender, MeasureEntryRender, RenderIndex, Renderer, ScoreRender, StaveRender, VoiceRender,
};
use scorelayout::spanners::CurveKind;
use scorelayout::{build_document, parse_musicxml, render_to_json, Config};

fn score(parts: &[(&str, &str)]) -> String {
    let list: String = parts
        .iter()
        .enumerate()
        .map(|(i, (name, _))| format!(r#"<score-part id="P{}"><part-name>{name}</part-name></score-part>"#, i + 1))
        .collect();
    let bodies: String = parts
        .iter()
        .enumerate()
        .map(|(i, (_, measures))| format!(r#"<part id="P{}">{measures}</part>"#, i + 1))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="4.0">
  <work><work-title>Study</work-title></work>
  <part-list>{list}</part-list>
  {bodies}
</score-partwise>"#
    )
}

fn note(step: &str, octave: i32, duration: i32, kind: &str, extra: &str) -> String {
    format!(
        r#"<note><pitch><step>{step}</step><octave>{octave}</octave></pitch><duration>{duration}</duration><type>{kind}</type>{extra}</note>"#
    )
}

fn quarters(steps: &[&str]) -> String {
    steps.iter().map(|s| note(s, 5, 1, "quarter", "")).collect()
}

const ATTRIBUTES: &str =
    "<attributes><divisions>1</divisions><key><fifths>0</fifths></key><time><beats>4</beats><beat-type>4</beat-type></time><clef><sign>G</sign><line>2</line></clef></attributes>";

fn two_measures() -> String {
    let measures = format!(
        r#"<measure number="1">{ATTRIBUTES}{}</measure><measure number="2">{}</measure>"#,
        quarters(&["C", "D", "E", "F"]),
        quarters(&["G", "F", "E", "D"])
    );
    score(&[("Flute", &measures)])
}

fn document(xml: &str) -> Document {
    build_document(&parse_musicxml(xml).expect("score parses"))
}

fn layout(document: &Document, width: f64) -> ScoreRender {
    Renderer::new(Config::default()).layout(document, Some(width))
}

fn fragments(score: &ScoreRender) -> impl Iterator<Item = &FragmentRender> {
    score.systems.iter().flat_map(|s| &s.measures).flat_map(|m| &m.entries).filter_map(|e| match e {
        MeasureEntryRender::Fragment(f) => Some(f),
        MeasureEntryRender::Gap(_) => None,
    })
}

fn staves(score: &ScoreRender) -> impl Iterator<Item = &StaveRender> {
    fragments(score).flat_map(|f| &f.parts).flat_map(|p| &p.staves)
}

fn voices(score: &ScoreRender) -> impl Iterator<Item = &VoiceRender> {
    staves(score).flat_map(|s| &s.voices)
}

#[test]
fn wide_target_fits_on_one_system() {
    let measures = format!(
        r#"<measure number="1">{ATTRIBUTES}{}</measure><measure number="2">{}</measure>"#,
        quarters(&["C", "D"]),
        quarters(&["E", "F"])
    );
    let document = document(&score(&[("Flute", &measures)]));
    let render = layout(&document, 1000.0);

    assert_eq!(render.systems.len(), 1);
    assert_eq!(render.systems[0].measures.len(), 2);
    let widths: f64 = fragments(&render).map(|f| f.layout_width).sum();
    assert!(widths <= 1000.0 + 1e-6, "fragments take {widths}");
    for voice in voices(&render) {
        let beats: Vec<_> = voice.entries.iter().map(|e| e.measure_beat).collect();
        assert_eq!(beats, vec![scorelayout::Fraction::new(0, 1), scorelayout::Fraction::new(1, 4)]);
        let xs: Vec<f64> = voice.entries.iter().map(|e| e.rect.x).collect();
        assert!(xs[0] < xs[1], "x increases: {xs:?}");
    }
    let measures = &render.systems[0].measures;
    assert!(measures[0].rect.x < measures[1].rect.x);
}

#[test]
fn narrow_target_breaks_every_measure() {
    let document = document(&two_measures());
    let render = layout(&document, 50.0);

    assert_eq!(render.systems.len(), 2);
    let indexes: Vec<usize> = render.systems.iter().map(|s| s.measures[0].absolute_index).collect();
    assert_eq!(indexes, vec![0, 1]);
    assert!(render.systems[0].rect.bottom() <= render.systems[1].rect.y);
    // Each system restates its clef.
    for system in &render.systems {
        let MeasureEntryRender::Fragment(fragment) = &system.measures[0].entries[0] else {
            panic!("expected a fragment");
        };
        assert!(!fragment.parts[0].staves[0].native.geometry().glyphs.is_empty());
    }
}

#[test]
fn measure_numbers_label_each_system() {
    let document = document(&two_measures());
    let render = layout(&document, 50.0);
    let labels: Vec<String> = render
        .systems
        .iter()
        .map(|s| s.measures[0].label.as_ref().map(|l| l.text.clone()).unwrap_or_default())
        .collect();
    assert_eq!(labels, vec!["1".to_string(), "2".to_string()]);
}

#[test]
fn staves_of_one_fragment_share_their_width() {
    let first = format!(r#"<measure number="1">{ATTRIBUTES}{}</measure>"#, quarters(&["C", "D", "E", "F"]));
    let second = format!(
        r#"<measure number="1">{ATTRIBUTES}{}{}</measure>"#,
        note("C", 4, 2, "half", ""),
        note("G", 4, 2, "half", "")
    );
    let document = document(&score(&[("Violin", &first), ("Cello", &second)]));
    let render = layout(&document, 900.0);

    let fragment = fragments(&render).next().expect("one fragment");
    let extents: Vec<(f64, f64)> = fragment
        .parts
        .iter()
        .flat_map(|p| &p.staves)
        .map(|s| {
            let line = s.native.geometry().lines[0];
            (line.from.x, line.to.x)
        })
        .collect();
    assert_eq!(extents.len(), 2);
    assert_eq!(extents[0], extents[1]);
    assert_eq!(fragment.part_labels.len(), 2);

    // Simultaneous notes line up across parts.
    let x_of = |part: usize, entry: usize| fragment.parts[part].staves[0].voices[0].entries[entry].native.x();
    assert_eq!(x_of(0, 0), x_of(1, 0));
    assert_eq!(x_of(0, 2), x_of(1, 1));
}

#[test]
fn beamed_eighths_share_one_beam() {
    let beamed: String = ["begin", "continue", "continue", "end"]
        .iter()
        .zip(["C", "D", "E", "F"])
        .map(|(beam, step)| note(step, 5, 1, "eighth", &format!(r#"<beam number="1">{beam}</beam>"#)))
        .collect();
    let measure = format!(
        r#"<measure number="1"><attributes><divisions>2</divisions><time><beats>4</beats><beat-type>4</beat-type></time></attributes>{beamed}{}{}</measure>"#,
        note("G", 4, 2, "quarter", ""),
        note("A", 4, 2, "quarter", "")
    );
    let document = document(&score(&[("Oboe", &measure)]));
    let render = layout(&document, 900.0);

    let voice = voices(&render).next().expect("one voice");
    assert_eq!(voice.beams.len(), 1);
    let beam = &voice.beams[0];
    assert_eq!(beam.entry_keys.len(), 4);

    let stems: Vec<bool> = voice.entries[..4].iter().map(|e| e.native.geometry().stem_up.unwrap_or(true)).collect();
    assert!(stems.iter().all(|s| *s == stems[0]), "one stem direction under a beam");
    // Beamed notes draw no flags.
    assert!(voice.entries[..4].iter().all(|e| e.native.geometry().glyphs.is_empty()));

    let index = RenderIndex::new(&render);
    assert!(index.beam(&beam.id).is_some());
    assert_eq!(index.ids_at(beam.entry_keys[1]), &[beam.id.as_str()]);
    assert!(index.ids_at(voice.entries[4].key).is_empty());
}

#[test]
fn triplet_gets_a_bracket_and_number() {
    let triplet: String = ["start", "", "stop"]
        .iter()
        .zip(["C", "D", "E"])
        .map(|(kind, step)| {
            let notation =
                if kind.is_empty() { String::new() } else { format!(r#"<notations><tuplet type="{kind}"/></notations>"#) };
            note(
                step,
                5,
                1,
                "eighth",
                &format!("<time-modification><actual-notes>3</actual-notes><normal-notes>2</normal-notes></time-modification>{notation}"),
            )
        })
        .collect();
    let measure = format!(
        r#"<measure number="1"><attributes><divisions>3</divisions><time><beats>4</beats><beat-type>4</beat-type></time></attributes>{triplet}{}{}{}</measure>"#,
        note("G", 4, 3, "quarter", ""),
        note("A", 4, 3, "quarter", ""),
        note("B", 4, 3, "quarter", "")
    );
    let document = document(&score(&[("Clarinet", &measure)]));
    let render = layout(&document, 900.0);

    let voice = voices(&render).next().expect("one voice");
    assert_eq!(voice.tuplets.len(), 1);
    let tuplet = &voice.tuplets[0];
    assert_eq!(tuplet.entry_keys.len(), 3);
    assert_eq!(tuplet.native.label.as_ref().map(|l| l.text.as_str()), Some("3"));

    let beats: Vec<_> = voice.entries.iter().map(|e| e.measure_beat).collect();
    assert_eq!(beats[3], scorelayout::Fraction::new(1, 4));
}

#[test]
fn grace_note_is_drawn_before_its_principal() {
    let measure = format!(
        r#"<measure number="1">{ATTRIBUTES}<note><grace slash="yes"/><pitch><step>D</step><octave>5</octave></pitch><type>eighth</type></note>{}</measure>"#,
        note("C", 5, 4, "whole", r#"<notations><articulations><staccato placement="below"/></articulations></notations>"#)
    );
    let document = document(&score(&[("Flute", &measure)]));
    let render = layout(&document, 900.0);

    let voice = voices(&render).next().expect("one voice");
    assert_eq!(voice.entries.len(), 1);
    let geometry = voice.entries[0].native.geometry();
    assert_eq!(geometry.grace_heads.len(), 1);
    let principal = geometry.heads[0].rect;
    assert!(geometry.grace_heads[0].rect.right() < principal.x);
    assert!(geometry.grace_heads[0].rect.w < principal.w);
    assert!(voice.entries[0].native.bounding_box().x <= geometry.grace_heads[0].rect.x);

    assert_eq!(geometry.articulations.len(), 1);
    assert!(geometry.articulations[0].rect.y > principal.bottom());
    assert!(voice.entries[0].native.bounding_box().bottom() >= geometry.articulations[0].rect.bottom());

    // The grace note stays right of the clef.
    let stave = staves(&render).next().expect("one stave");
    let clef = &stave.native.geometry().glyphs[0];
    assert!(geometry.grace_heads[0].rect.x > clef.rect.right());
}

#[test]
fn slur_across_a_line_break_has_two_segments() {
    let measures = format!(
        r#"<measure number="1">{ATTRIBUTES}{}{}{}{}</measure><measure number="2">{}{}{}{}</measure>"#,
        note("C", 5, 1, "quarter", ""),
        note("D", 5, 1, "quarter", ""),
        note("E", 5, 1, "quarter", ""),
        note("F", 5, 1, "quarter", r#"<notations><slur type="start" number="1"/></notations>"#),
        note("G", 5, 1, "quarter", r#"<notations><slur type="stop" number="1"/></notations>"#),
        note("F", 5, 1, "quarter", ""),
        note("E", 5, 1, "quarter", ""),
        note("D", 5, 1, "quarter", "")
    );
    let document = document(&score(&[("Horn", &measures)]));

    let wide = layout(&document, 1000.0);
    assert_eq!(wide.curves.len(), 1);
    assert_eq!(wide.curves[0].segments.len(), 1);
    assert_eq!(wide.curves[0].kind, CurveKind::Slur);

    let narrow = layout(&document, 50.0);
    assert_eq!(narrow.systems.len(), 2);
    let curve = &narrow.curves[0];
    let systems: Vec<usize> = curve.segments.iter().map(|s| s.system_index).collect();
    assert_eq!(systems, vec![0, 1]);
    assert!((curve.segments[0].end.x - narrow.systems[0].rect.right()).abs() < 1e-6);
    assert!((curve.segments[1].start.x - narrow.systems[1].rect.x).abs() < 1e-6);
}

#[test]
fn unterminated_slur_draws_a_stub() {
    let measure = format!(
        r#"<measure number="1">{ATTRIBUTES}{}{}</measure>"#,
        note("C", 5, 2, "half", r#"<notations><slur type="start" number="1"/></notations>"#),
        note("D", 5, 2, "half", "")
    );
    let document = document(&score(&[("Horn", &measure)]));
    let render = layout(&document, 900.0);

    assert_eq!(render.curves.len(), 1);
    let segment = &render.curves[0].segments[0];
    assert!((segment.end.x - segment.start.x - 20.0).abs() < 1e-6);
    assert_eq!(render.curves[0].entry_keys.len(), 1);
}

#[test]
fn tie_joins_equal_pitches() {
    let measure = format!(
        r#"<measure number="1">{ATTRIBUTES}{}{}</measure>"#,
        note("A", 4, 2, "half", r#"<notations><tied type="start"/></notations>"#),
        note("A", 4, 2, "half", r#"<notations><tied type="stop"/></notations>"#)
    );
    let document = document(&score(&[("Cello", &measure)]));
    let render = layout(&document, 900.0);

    assert_eq!(render.curves.len(), 1);
    assert_eq!(render.curves[0].kind, CurveKind::Tie);
    assert_eq!(render.curves[0].entry_keys.len(), 2);
    let index = RenderIndex::new(&render);
    assert!(index.curve(&render.curves[0].id).is_some());
}

#[test]
fn crescendo_opens_towards_its_end() {
    let measure = format!(
        r#"<measure number="1">{ATTRIBUTES}<direction placement="below"><direction-type><wedge type="crescendo"/></direction-type></direction>{}{}<direction><direction-type><wedge type="stop"/></direction-type></direction>{}{}</measure>"#,
        note("C", 5, 1, "quarter", ""),
        note("D", 5, 1, "quarter", ""),
        note("E", 5, 1, "quarter", ""),
        note("F", 5, 1, "quarter", "")
    );
    let document = document(&score(&[("Viola", &measure)]));
    let render = layout(&document, 900.0);

    assert_eq!(render.wedges.len(), 1);
    let wedge = &render.wedges[0];
    assert_eq!(wedge.entry_keys.len(), 2);
    let lines = &wedge.segments[0].lines;
    assert_eq!(lines.len(), 2);
    let start_gap = (lines[1].from.y - lines[0].from.y).abs();
    let end_gap = (lines[1].to.y - lines[0].to.y).abs();
    assert!(start_gap < end_gap);
    let stave_bottom = staves(&render).next().map(|s| s.native.bottom()).unwrap_or_default();
    assert!(wedge.rect.y > stave_bottom);
}

#[test]
fn pedal_bracket_spans_its_notes() {
    let measure = format!(
        r#"<measure number="1">{ATTRIBUTES}<direction><direction-type><pedal type="start" line="yes"/></direction-type></direction>{}{}{}<direction><direction-type><pedal type="stop" line="yes"/></direction-type></direction>{}</measure>"#,
        note("C", 4, 1, "quarter", ""),
        note("D", 4, 1, "quarter", ""),
        note("E", 4, 1, "quarter", ""),
        note("F", 4, 1, "quarter", "")
    );
    let document = document(&score(&[("Piano", &measure)]));
    let render = layout(&document, 900.0);

    assert_eq!(render.pedals.len(), 1);
    let segment = &render.pedals[0].segments[0];
    assert!(!segment.lines.is_empty());
    assert!(segment.texts.is_empty());
}

#[test]
fn multi_measure_rest_collapses_following_measures() {
    let rest = r#"<note><rest measure="yes"/><duration>4</duration></note>"#;
    let measures = format!(
        r#"<measure number="1"><attributes><divisions>1</divisions><time><beats>4</beats><beat-type>4</beat-type></time><measure-style><multiple-rest>3</multiple-rest></measure-style></attributes>{rest}</measure><measure number="2">{rest}</measure><measure number="3">{rest}</measure><measure number="4">{}</measure>"#,
        quarters(&["C", "D", "E", "F"])
    );
    let document = document(&score(&[("Bassoon", &measures)]));
    assert_eq!(document.absolute_measure_count(), 2);

    let render = layout(&document, 1000.0);
    let first = staves(&render).next().expect("a stave");
    assert!(first.voices.is_empty());
    let multi_rest = first.multi_rest.as_ref().expect("multi-rest drawn");
    assert_eq!(multi_rest.label.text, "3");
}

#[test]
fn slur_swallowed_by_a_multi_measure_rest_is_not_drawn() {
    let rest = r#"<note><rest measure="yes"/><duration>4</duration></note>"#;
    let measures = format!(
        r#"<measure number="1"><attributes><divisions>1</divisions><time><beats>4</beats><beat-type>4</beat-type></time><measure-style><multiple-rest>3</multiple-rest></measure-style></attributes>{rest}</measure><measure number="2">{}{}{}{}</measure><measure number="3">{rest}</measure><measure number="4">{}</measure>"#,
        note("C", 5, 1, "quarter", r#"<notations><slur type="start" number="1"/></notations>"#),
        note("D", 5, 1, "quarter", r#"<notations><slur type="stop" number="1"/></notations>"#),
        note("E", 5, 1, "quarter", ""),
        note("F", 5, 1, "quarter", ""),
        quarters(&["G", "A", "B", "C"])
    );
    let document = document(&score(&[("Bassoon", &measures)]));
    assert_eq!(document.curves().len(), 1);

    let render = layout(&document, 1000.0);
    assert!(render.curves.is_empty());
    assert!(RenderIndex::new(&render).curve(&document.curves()[0].id).is_none());
}

#[test]
fn oversized_key_change_lays_out() {
    let measures = format!(
        r#"<measure number="1"><attributes><divisions>1</divisions><key><fifths>9</fifths></key><time><beats>4</beats><beat-type>4</beat-type></time><clef><sign>G</sign><line>2</line></clef></attributes>{}</measure><measure number="2"><attributes><key><fifths>8</fifths></key></attributes>{}</measure>"#,
        quarters(&["C", "D", "E", "F"]),
        quarters(&["G", "F", "E", "D"])
    );
    let document = document(&score(&[("Flute", &measures)]));
    let render = layout(&document, 1000.0);

    let second = staves(&render).nth(1).expect("second measure stave");
    // One cancelled sharp, then seven sharps.
    assert_eq!(second.native.geometry().glyphs.len(), 8);
}

#[test]
fn gaps_keep_their_width() {
    let document = document(&two_measures()).insert_gap(
        1,
        0,
        GapSpec { text: Some("Solo".to_string()), width: None, duration_ms: 0.0 },
    );
    assert!(matches!(document.measures().nth(1).map(|m| &m.entries[0]), Some(MeasureEntry::Gap(_))));

    let render = layout(&document, 1000.0);
    let gap = render
        .systems
        .iter()
        .flat_map(|s| &s.measures)
        .flat_map(|m| &m.entries)
        .find_map(|e| match e {
            MeasureEntryRender::Gap(g) => Some(g),
            MeasureEntryRender::Fragment(_) => None,
        })
        .expect("gap rendered");
    assert_eq!(gap.staves.len(), 1);
    assert_eq!(gap.text.as_ref().map(|t| t.text.as_str()), Some("Solo"));
    assert!(gap.rect.w >= Config::default().gap_width - 1e-6);
}

#[test]
fn systems_never_overlap() {
    let measures: String = (1..=8)
        .map(|n| {
            let attributes = if n == 1 { ATTRIBUTES } else { "" };
            format!(r#"<measure number="{n}">{attributes}{}</measure>"#, quarters(&["A", "G", "F", "E"]))
        })
        .collect();
    let document = document(&score(&[("Flute", &measures)]));
    document.check_invariants().expect("document is consistent");

    let render = layout(&document, 400.0);
    assert!(render.systems.len() > 1);
    for pair in render.systems.windows(2) {
        assert!(pair[0].rect.bottom() <= pair[1].rect.y + 1e-6);
    }
    let total: usize = render.systems.iter().map(|s| s.measures.len()).sum();
    assert_eq!(total, 8);
    assert!(render.rect.h >= render.systems.last().map(|s| s.rect.bottom()).unwrap_or_default());
}

#[test]
fn render_tree_serializes() {
    let document = document(&two_measures());
    let render = layout(&document, 1000.0);
    let json = render_to_json(&render).expect("serializes");
    assert!(json.contains("\"systems\""));
    assert!(scorelayout::document_to_json(&document).expect("serializes").contains("Flute"));
}
