//! Splits a measure at the beats where its signature changes.

use std::sync::Arc;

use crate::events::{MeasureEvent, MeasureEventKind};
use crate::fraction::Fraction;
use crate::signature::{Signature, SignatureBuilder};

/// A stretch `[start, end)` of a measure under one signature.
#[derive(Debug, Clone)]
pub struct SignatureRange {
    pub signature: Arc<Signature>,
    pub start: Fraction,
    pub end: Fraction,
}

/// The events of one fragment-to-be.
#[derive(Debug, Clone)]
pub struct FragmentEvents<'a> {
    pub signature: Arc<Signature>,
    pub start: Fraction,
    pub end: Fraction,
    pub events: Vec<&'a MeasureEvent>,
}

/// Fold a measure's events (sorted by beat, stable) into signature ranges,
/// starting from the signature in force when the measure begins.
///
/// All events at one beat go through a single builder, so simultaneous
/// changes produce one boundary. The last range ends one whole beat past
/// the last event.
pub fn signature_ranges(previous: &Arc<Signature>, events: &[MeasureEvent]) -> Vec<SignatureRange> {
    let mut ranges = Vec::new();
    let mut current = Arc::clone(previous);
    let mut start = Fraction::zero();
    let mut last_beat = Fraction::zero();

    let mut index = 0;
    while index < events.len() {
        let beat = events[index].measure_beat;
        let mut builder = Signature::builder(&current);
        while index < events.len() && events[index].measure_beat == beat {
            apply(&mut builder, &events[index]);
            index += 1;
        }
        if builder.has_changes() {
            if start.is_less_than(&beat) {
                ranges.push(SignatureRange { signature: current, start, end: beat });
            }
            current = builder.build();
            start = beat;
        }
        last_beat = last_beat.max(beat);
    }

    ranges.push(SignatureRange {
        signature: current,
        start,
        end: last_beat.add(&Fraction::from_integer(1)),
    });
    ranges
}

fn apply(builder: &mut SignatureBuilder, event: &MeasureEvent) {
    let part = event.part_index;
    match &event.kind {
        MeasureEventKind::Clef { stave, clef } => {
            builder.set_clef(part, *stave, clef.clone());
        }
        MeasureEventKind::Key { stave, key } => {
            builder.set_key(part, *stave, key.clone());
        }
        MeasureEventKind::Time { stave, time } => {
            builder.set_time(part, *stave, time.clone());
        }
        MeasureEventKind::StaveCount(count) => {
            builder.set_stave_count(part, *count);
        }
        MeasureEventKind::StaveLineCount { stave, line_count } => {
            builder.set_stave_line_count(part, *stave, *line_count);
        }
        MeasureEventKind::Metronome(metronome) => {
            builder.set_metronome(metronome.clone());
        }
        MeasureEventKind::Note(_) | MeasureEventKind::Rest(_) => {}
    }
}

/// Distribute events over `ranges`; an event exactly on a boundary goes to
/// the range starting there. Always yields at least one fragment.
pub fn segment<'a>(events: &'a [MeasureEvent], ranges: &[SignatureRange]) -> Vec<FragmentEvents<'a>> {
    assert!(!ranges.is_empty(), "segmentation needs at least one signature range");

    let mut fragments: Vec<FragmentEvents<'a>> = ranges
        .iter()
        .map(|range| FragmentEvents {
            signature: Arc::clone(&range.signature),
            start: range.start,
            end: range.end,
            events: Vec::new(),
        })
        .collect();

    for event in events {
        let beat = event.measure_beat;
        let slot = fragments
            .iter()
            .rposition(|f| f.start.is_less_than_or_equal_to(&beat))
            .unwrap_or(0);
        if !beat.is_less_than(&fragments[slot].end) {
            log::warn!("event at beat {beat} lies past the last signature range");
        }
        fragments[slot].events.push(event);
    }

    log::trace!("segmented measure into {} fragment(s)", fragments.len());
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{Clef, Time};
    use pretty_assertions::assert_eq;

    fn event(beat: Fraction, kind: MeasureEventKind) -> MeasureEvent {
        MeasureEvent { part_index: 0, measure_index: 0, measure_beat: beat, kind }
    }

    fn clef(beat: Fraction, clef: Clef) -> MeasureEvent {
        event(beat, MeasureEventKind::Clef { stave: 0, clef })
    }

    fn bounds(ranges: &[SignatureRange]) -> Vec<(Fraction, Fraction)> {
        ranges.iter().map(|r| (r.start, r.end)).collect()
    }

    #[test]
    fn empty_measure_keeps_the_inherited_signature() {
        let initial = Signature::initial(1);
        let ranges = signature_ranges(&initial, &[]);
        assert_eq!(bounds(&ranges), vec![(Fraction::zero(), Fraction::from_integer(1))]);
        assert!(Arc::ptr_eq(&ranges[0].signature, &initial));

        let fragments = segment(&[], &ranges);
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].events.is_empty());
    }

    #[test]
    fn restating_the_signature_is_not_a_change() {
        let initial = Signature::initial(1);
        let events = vec![clef(Fraction::zero(), Clef::treble())];
        let ranges = signature_ranges(&initial, &events);
        assert_eq!(ranges.len(), 1);
        assert!(Arc::ptr_eq(&ranges[0].signature, &initial));
    }

    #[test]
    fn simultaneous_changes_make_one_boundary() {
        let initial = Signature::initial(1);
        let half = Fraction::new(1, 2);
        let events = vec![
            clef(half, Clef::bass()),
            event(half, MeasureEventKind::Time { stave: None, time: Time::simple(3, 4) }),
        ];
        let ranges = signature_ranges(&initial, &events);
        assert_eq!(
            bounds(&ranges),
            vec![(Fraction::zero(), half), (half, Fraction::new(3, 2))]
        );
        let stave = ranges[1].signature.stave(0, 0);
        assert_eq!(stave.clef, Clef::bass());
        assert_eq!(stave.time, Time::simple(3, 4));
    }

    #[test]
    fn change_at_the_downbeat_replaces_the_first_range() {
        let initial = Signature::initial(1);
        let events = vec![clef(Fraction::zero(), Clef::bass())];
        let ranges = signature_ranges(&initial, &events);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].signature.stave(0, 0).clef, Clef::bass());
    }

    #[test]
    fn boundary_events_belong_to_the_later_fragment() {
        let initial = Signature::initial(1);
        let quarter = Fraction::new(1, 4);
        let half = Fraction::new(1, 2);
        let events = vec![
            event(Fraction::zero(), MeasureEventKind::StaveCount(1)),
            event(quarter, MeasureEventKind::StaveCount(1)),
            clef(half, Clef::bass()),
            event(half, MeasureEventKind::StaveCount(1)),
            event(Fraction::new(3, 4), MeasureEventKind::StaveCount(1)),
        ];
        let ranges = signature_ranges(&initial, &events);
        let fragments = segment(&events, &ranges);
        let beats: Vec<Vec<Fraction>> = fragments
            .iter()
            .map(|f| f.events.iter().map(|e| e.measure_beat).collect())
            .collect();
        assert_eq!(
            beats,
            vec![vec![Fraction::zero(), quarter], vec![half, half, Fraction::new(3, 4)]]
        );

        // Partition: every event lands in exactly one fragment.
        let total: usize = fragments.iter().map(|f| f.events.len()).sum();
        assert_eq!(total, events.len());
        assert_eq!(fragments[0].end, fragments[1].start);
    }
}
