//! Cross-cutting declarations (beams, tuplets, curves, wedges, pedals) and
//! the state machines that group note fragments into them.
//!
//! Entries never own a spanner; they carry its id, and the declaration is
//! registered once at voice scope (beams, tuplets) or score scope (curves,
//! wedges, pedals). Malformed fragment sequences are dropped, not reported.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════
// Declarations
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Placement {
    #[default]
    Auto,
    Above,
    Below,
}

impl Placement {
    pub fn from_musicxml(placement: Option<&str>) -> Self {
        match placement {
            Some("above") => Self::Above,
            Some("below") => Self::Below,
            _ => Self::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beam {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuplet {
    pub id: String,
    pub placement: Placement,
    pub show_number: bool,
    /// `(actual, normal)`, e.g. `(3, 2)` for a triplet.
    pub ratio: Option<(i32, i32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveKind {
    Slur,
    Tie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveOpening {
    Auto,
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub id: String,
    pub kind: CurveKind,
    pub placement: Placement,
    pub opening: CurveOpening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WedgeKind {
    Crescendo,
    Diminuendo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wedge {
    pub id: String,
    pub kind: WedgeKind,
    pub placement: Placement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PedalKind {
    /// A bracket line under the notes.
    Bracket,
    /// "Ped." / "*" text marks.
    Text,
    /// Text at the start, bracket afterwards.
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pedal {
    pub id: String,
    pub kind: PedalKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PedalMarkKind {
    Start,
    Continue,
    Change,
    End,
}

/// A note's participation in a pedal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PedalMark {
    pub pedal_id: String,
    pub kind: PedalMarkKind,
}

// ═══════════════════════════════════════════════════════════════════════
// Ids
// ═══════════════════════════════════════════════════════════════════════

/// Hands out document-wide ids such as `beam-3` or `curve-12`.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, prefix: &str) -> String {
        self.next += 1;
        format!("{prefix}-{}", self.next)
    }
}

/// One grouping produced by an accumulator.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanner<T> {
    pub id: String,
    pub fragments: Vec<T>,
}

// ═══════════════════════════════════════════════════════════════════════
// Beam state machine
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BeamValue {
    Begin,
    Continue,
    ForwardHook,
    BackwardHook,
    End,
}

impl BeamValue {
    pub fn from_musicxml(value: &str) -> Option<Self> {
        match value {
            "begin" => Some(Self::Begin),
            "continue" => Some(Self::Continue),
            "forward hook" => Some(Self::ForwardHook),
            "backward hook" => Some(Self::BackwardHook),
            "end" => Some(Self::End),
            _ => None,
        }
    }

    /// Values that may follow `last` within the beam currently being built.
    /// `None` (nothing open) and `End` (closed) only accept a new `Begin`.
    fn allowed_after(last: Option<BeamValue>) -> &'static [BeamValue] {
        match last {
            None | Some(Self::End) => &[Self::Begin],
            Some(Self::Begin | Self::Continue | Self::ForwardHook | Self::BackwardHook) => {
                &[Self::Continue, Self::BackwardHook, Self::ForwardHook, Self::End]
            }
        }
    }
}

/// Groups beam fragments of one voice in one measure.
#[derive(Debug)]
pub struct BeamAccumulator<T> {
    last: Option<BeamValue>,
    beams: Vec<Spanner<T>>,
}

impl<T> Default for BeamAccumulator<T> {
    fn default() -> Self {
        Self { last: None, beams: Vec::new() }
    }
}

impl<T> BeamAccumulator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment; returns the id of the beam it joined, if any.
    pub fn push(&mut self, value: BeamValue, payload: T, ids: &mut IdAllocator) -> Option<String> {
        if !BeamValue::allowed_after(self.last).contains(&value) {
            log::trace!("dropping beam value {value:?} after {:?}", self.last);
            return None;
        }
        if value == BeamValue::Begin {
            self.beams.push(Spanner { id: ids.next("beam"), fragments: Vec::new() });
        }
        let beam = self.beams.last_mut()?;
        beam.fragments.push(payload);
        self.last = Some(value);
        Some(beam.id.clone())
    }

    pub fn finish(self) -> Vec<Spanner<T>> {
        self.beams
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tuplet state machine
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TupletValue {
    Start,
    Unspecified,
    Stop,
}

impl TupletValue {
    fn allowed_after(last: Option<TupletValue>) -> &'static [TupletValue] {
        match last {
            Some(Self::Start | Self::Unspecified) => &[Self::Unspecified, Self::Stop],
            None | Some(Self::Stop) => &[],
        }
    }
}

/// Groups tuplet fragments of one voice in one measure.
#[derive(Debug)]
pub struct TupletAccumulator<T> {
    last: Option<TupletValue>,
    tuplets: Vec<Spanner<T>>,
}

impl<T> Default for TupletAccumulator<T> {
    fn default() -> Self {
        Self { last: None, tuplets: Vec::new() }
    }
}

impl<T> TupletAccumulator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Start` always opens a new tuplet; anything else must be allowed by
    /// the previous value or it is ignored.
    pub fn push(&mut self, value: TupletValue, payload: T, ids: &mut IdAllocator) -> Option<String> {
        if value == TupletValue::Start {
            self.tuplets.push(Spanner { id: ids.next("tuplet"), fragments: Vec::new() });
        } else if !TupletValue::allowed_after(self.last).contains(&value) {
            log::trace!("dropping tuplet value {value:?} after {:?}", self.last);
            return None;
        }
        let tuplet = self.tuplets.last_mut()?;
        tuplet.fragments.push(payload);
        self.last = Some(value);
        Some(tuplet.id.clone())
    }

    pub fn finish(self) -> Vec<Spanner<T>> {
        self.tuplets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn beams(values: &[BeamValue]) -> Vec<Spanner<usize>> {
        let mut ids = IdAllocator::new();
        let mut acc = BeamAccumulator::new();
        for (i, v) in values.iter().enumerate() {
            acc.push(*v, i, &mut ids);
        }
        acc.finish()
    }

    fn tuplets(values: &[TupletValue]) -> Vec<Spanner<usize>> {
        let mut ids = IdAllocator::new();
        let mut acc = TupletAccumulator::new();
        for (i, v) in values.iter().enumerate() {
            acc.push(*v, i, &mut ids);
        }
        acc.finish()
    }

    #[test]
    fn begin_continue_end_forms_one_beam() {
        use BeamValue::*;
        let result = beams(&[Begin, Continue, End]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].fragments, vec![0, 1, 2]);
    }

    #[test]
    fn leading_end_is_dropped() {
        use BeamValue::*;
        let result = beams(&[End, Begin]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].fragments, vec![1]);
    }

    #[test]
    fn nothing_joins_a_closed_beam() {
        use BeamValue::*;
        let result = beams(&[Begin, End, Continue, Begin, ForwardHook, End]);
        let groups: Vec<Vec<usize>> = result.into_iter().map(|b| b.fragments).collect();
        assert_eq!(groups, vec![vec![0, 1], vec![3, 4, 5]]);
    }

    #[test]
    fn hooks_continue_an_open_beam() {
        use BeamValue::*;
        let result = beams(&[Begin, BackwardHook, ForwardHook, End]);
        assert_eq!(result[0].fragments.len(), 4);
    }

    #[test]
    fn start_stop_forms_one_tuplet() {
        use TupletValue::*;
        let result = tuplets(&[Start, Stop]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].fragments, vec![0, 1]);
    }

    #[test]
    fn leading_stop_is_dropped() {
        use TupletValue::*;
        let result = tuplets(&[Stop, Start]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].fragments, vec![1]);
    }

    #[test]
    fn fragments_after_stop_are_ignored() {
        use TupletValue::*;
        let result = tuplets(&[Start, Unspecified, Stop, Unspecified, Stop]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].fragments, vec![0, 1, 2]);
    }

    #[test]
    fn ids_are_unique_across_kinds() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.next("beam"), "beam-1");
        assert_eq!(ids.next("curve"), "curve-2");
    }
}
