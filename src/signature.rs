//! Notational context: clefs, keys, times, stave counts and tempo.
//!
//! A [`Signature`] is an immutable snapshot shared through `Arc` by every
//! fragment that uses it. Changes go through a [`SignatureBuilder`] seeded
//! from the previous snapshot; when nothing actually changed, `build`
//! hands back the very same `Arc`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::fraction::Fraction;

pub const DEFAULT_STAVE_LINE_COUNT: u32 = 5;

// ═══════════════════════════════════════════════════════════════════════
// Clef / Key / Time / Metronome
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClefSign {
    G,
    F,
    C,
    Percussion,
    Tab,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clef {
    pub sign: ClefSign,
    /// Stave line the clef sits on, counted from the bottom (1-based).
    pub line: i32,
    pub octave_change: Option<i32>,
}

impl Clef {
    pub fn treble() -> Self {
        Self { sign: ClefSign::G, line: 2, octave_change: None }
    }

    pub fn bass() -> Self {
        Self { sign: ClefSign::F, line: 4, octave_change: None }
    }

    pub fn from_musicxml(sign: &str, line: Option<i32>, octave_change: Option<i32>) -> Self {
        let sign = match sign {
            "G" => ClefSign::G,
            "F" => ClefSign::F,
            "C" => ClefSign::C,
            "percussion" => ClefSign::Percussion,
            "TAB" => ClefSign::Tab,
            _ => ClefSign::None,
        };
        let default_line = match sign {
            ClefSign::G => 2,
            ClefSign::F => 4,
            _ => 3,
        };
        Self {
            sign,
            line: line.unwrap_or(default_line),
            octave_change: octave_change.filter(|o| *o != 0),
        }
    }

    pub fn is_bass(&self) -> bool {
        self.sign == ClefSign::F
    }

    /// Diatonic position (octave * 7 + step) of the pitch on the clef's line
    /// and that line's offset from the top stave line in half-spaces.
    pub(crate) fn reference(&self, line_count: u32) -> (i32, i32) {
        let position = match self.sign {
            ClefSign::F => 3 * 7 + 3, // F3
            ClefSign::C => 4 * 7,     // C4
            _ => 4 * 7 + 4,           // G4
        };
        let line = match self.sign {
            ClefSign::G | ClefSign::F | ClefSign::C => self.line,
            _ => 3,
        };
        let octave_shift = self.octave_change.unwrap_or(0) * 7;
        (position + octave_shift, (line_count as i32 - line) * 2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyMode {
    None,
    Major,
    Minor,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Aeolian,
    Ionian,
    Locrian,
}

impl KeyMode {
    pub fn from_musicxml(mode: Option<&str>) -> Self {
        match mode {
            Some("major") => Self::Major,
            Some("minor") => Self::Minor,
            Some("dorian") => Self::Dorian,
            Some("phrygian") => Self::Phrygian,
            Some("lydian") => Self::Lydian,
            Some("mixolydian") => Self::Mixolydian,
            Some("aeolian") => Self::Aeolian,
            Some("ionian") => Self::Ionian,
            Some("locrian") => Self::Locrian,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    /// Sharps (positive) or flats (negative).
    pub fifths: i32,
    pub mode: KeyMode,
    /// Fifths of the key this one replaced, for cancellation naturals.
    pub previous_fifths: Option<i32>,
}

impl Key {
    pub fn new(fifths: i32, mode: KeyMode) -> Self {
        Self { fifths, mode, previous_fifths: None }
    }

    pub fn c_major() -> Self {
        Self::new(0, KeyMode::Major)
    }

    /// Same fifths and mode, ignoring what the key replaced.
    pub fn same_key(&self, other: &Key) -> bool {
        self.fifths == other.fifths && self.mode == other.mode
    }

    /// Naturals needed to cancel the previous key before drawing this one.
    pub fn cancellation_natural_count(&self) -> u32 {
        let Some(old) = self.previous_fifths else { return 0 };
        if old == 0 {
            return 0;
        }
        let same_direction = (old > 0 && self.fifths > 0) || (old < 0 && self.fifths < 0);
        if same_direction {
            old.unsigned_abs().saturating_sub(self.fifths.unsigned_abs())
        } else {
            old.unsigned_abs()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeSymbol {
    Common,
    Cut,
    SingleNumber,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Time {
    /// One fraction per `beats/beat-type` component, terms as written.
    pub components: Vec<Fraction>,
    pub symbol: Option<TimeSymbol>,
    pub hidden: bool,
}

impl PartialEq for Time {
    fn eq(&self, other: &Self) -> bool {
        // 6/8 and 3/4 are different meters: compare written terms.
        let terms = |t: &Time| -> Vec<(i64, i64)> {
            t.components.iter().map(|c| (c.numerator, c.denominator)).collect()
        };
        terms(self) == terms(other) && self.symbol == other.symbol && self.hidden == other.hidden
    }
}

impl Time {
    pub fn common() -> Self {
        Self::simple(4, 4)
    }

    pub fn simple(beats: i64, beat_type: i64) -> Self {
        Self {
            components: vec![Fraction::new(beats, beat_type)],
            symbol: None,
            hidden: false,
        }
    }

    /// Build from MusicXML `(beats, beat-type)` pairs where `beats` may be
    /// additive ("3+2"). Returns `None` when no component is usable.
    pub fn from_musicxml(components: &[(String, i32)], symbol: Option<&str>, hidden: bool) -> Option<Self> {
        let mut fractions = Vec::new();
        for (beats, beat_type) in components {
            if *beat_type <= 0 {
                continue;
            }
            for part in beats.split('+') {
                if let Ok(n) = part.trim().parse::<i64>() {
                    fractions.push(Fraction::new(n, *beat_type as i64));
                }
            }
        }
        if fractions.is_empty() {
            return None;
        }
        let symbol = match symbol {
            Some("common") => Some(TimeSymbol::Common),
            Some("cut") => Some(TimeSymbol::Cut),
            Some("single-number") => Some(TimeSymbol::SingleNumber),
            _ => None,
        };
        Some(Self { components: fractions, symbol, hidden })
    }

    /// Total measure duration in whole notes.
    pub fn duration(&self) -> Fraction {
        self.components
            .iter()
            .fold(Fraction::zero(), |acc, c| acc.add(c))
    }

    /// Text specs as drawn on the stave, e.g. `["C"]`, `["7"]`, `["3+2/8", "1/4"]`.
    pub fn to_specs(&self) -> Vec<String> {
        if self.hidden {
            return Vec::new();
        }
        match self.symbol {
            Some(TimeSymbol::Common) => return vec!["C".to_string()],
            Some(TimeSymbol::Cut) => return vec!["C|".to_string()],
            Some(TimeSymbol::SingleNumber) => {
                let beats: i64 = self.components.iter().map(|c| c.numerator).sum();
                return vec![beats.to_string()];
            }
            None => {}
        }

        // Adjacent components sharing a denominator read as one additive group.
        let mut groups: Vec<(Vec<i64>, i64)> = Vec::new();
        for c in &self.components {
            match groups.last_mut() {
                Some((numerators, denominator)) if *denominator == c.denominator => {
                    numerators.push(c.numerator)
                }
                _ => groups.push((vec![c.numerator], c.denominator)),
            }
        }
        groups
            .into_iter()
            .map(|(numerators, denominator)| {
                let joined: Vec<String> = numerators.iter().map(|n| n.to_string()).collect();
                format!("{}/{}", joined.join("+"), denominator)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metronome {
    pub beat_unit: String,
    pub dots: u32,
    pub bpm: f64,
}

impl Default for Metronome {
    fn default() -> Self {
        Self { beat_unit: "quarter".to_string(), dots: 0, bpm: 120.0 }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Signature
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartSignature {
    pub stave_count: usize,
    pub stave_line_counts: Vec<u32>,
    pub clefs: Vec<Clef>,
    pub keys: Vec<Key>,
    pub times: Vec<Time>,
}

impl PartSignature {
    fn single_stave() -> Self {
        Self {
            stave_count: 1,
            stave_line_counts: vec![DEFAULT_STAVE_LINE_COUNT],
            clefs: vec![Clef::treble()],
            keys: vec![Key::c_major()],
            times: vec![Time::common()],
        }
    }

    fn resize(&mut self, stave_count: usize) {
        let stave_count = stave_count.max(1);
        let key = self.keys[0].clone();
        let time = self.times[0].clone();
        self.stave_line_counts.resize(stave_count, DEFAULT_STAVE_LINE_COUNT);
        self.clefs.resize(stave_count, Clef::treble());
        self.keys.resize(stave_count, key);
        self.times.resize(stave_count, time);
        self.stave_count = stave_count;
    }
}

/// Everything a single stave needs from its signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaveSignature {
    pub line_count: u32,
    pub clef: Clef,
    pub key: Key,
    pub time: Time,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    metronome: Metronome,
    parts: Vec<PartSignature>,
}

impl Signature {
    /// The context in force before any attributes are read.
    pub fn initial(part_count: usize) -> Arc<Self> {
        Arc::new(Self {
            metronome: Metronome::default(),
            parts: vec![PartSignature::single_stave(); part_count.max(1)],
        })
    }

    pub fn builder(previous: &Arc<Signature>) -> SignatureBuilder {
        SignatureBuilder::new(previous)
    }

    pub fn metronome(&self) -> &Metronome {
        &self.metronome
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    pub fn part(&self, part_index: usize) -> &PartSignature {
        self.parts
            .get(part_index)
            .unwrap_or_else(|| panic!("signature has no part {part_index}"))
    }

    pub fn stave(&self, part_index: usize, stave_index: usize) -> StaveSignature {
        let part = self.part(part_index);
        assert!(
            stave_index < part.stave_count,
            "part {part_index} has {} stave(s), not {}",
            part.stave_count,
            stave_index + 1
        );
        StaveSignature {
            line_count: part.stave_line_counts[stave_index],
            clef: part.clefs[stave_index].clone(),
            key: part.keys[stave_index].clone(),
            time: part.times[stave_index].clone(),
        }
    }

    /// Clef/key/time/line-count present for every declared stave.
    pub fn is_consistent(&self) -> bool {
        self.parts.iter().all(|p| {
            p.stave_count >= 1
                && p.stave_line_counts.len() == p.stave_count
                && p.clefs.len() == p.stave_count
                && p.keys.len() == p.stave_count
                && p.times.len() == p.stave_count
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Builder
// ═══════════════════════════════════════════════════════════════════════

/// Partial overrides on top of a previous signature.
///
/// Stave indexes are 0-based. Keys and times without a stave apply to
/// every stave of the part. Stave-count changes are applied before any
/// per-stave override, regardless of call order.
pub struct SignatureBuilder {
    previous: Arc<Signature>,
    metronome: Option<Metronome>,
    stave_counts: BTreeMap<usize, usize>,
    line_counts: BTreeMap<(usize, usize), u32>,
    clefs: BTreeMap<(usize, usize), Clef>,
    keys: Vec<(usize, Option<usize>, Key)>,
    times: Vec<(usize, Option<usize>, Time)>,
}

impl SignatureBuilder {
    pub fn new(previous: &Arc<Signature>) -> Self {
        Self {
            previous: Arc::clone(previous),
            metronome: None,
            stave_counts: BTreeMap::new(),
            line_counts: BTreeMap::new(),
            clefs: BTreeMap::new(),
            keys: Vec::new(),
            times: Vec::new(),
        }
    }

    pub fn set_metronome(&mut self, metronome: Metronome) -> &mut Self {
        self.metronome = Some(metronome);
        self
    }

    pub fn set_stave_count(&mut self, part: usize, count: usize) -> &mut Self {
        self.stave_counts.insert(part, count);
        self
    }

    pub fn set_stave_line_count(&mut self, part: usize, stave: usize, count: u32) -> &mut Self {
        self.line_counts.insert((part, stave), count);
        self
    }

    pub fn set_clef(&mut self, part: usize, stave: usize, clef: Clef) -> &mut Self {
        self.clefs.insert((part, stave), clef);
        self
    }

    pub fn set_key(&mut self, part: usize, stave: Option<usize>, key: Key) -> &mut Self {
        self.keys.push((part, stave, key));
        self
    }

    pub fn set_time(&mut self, part: usize, stave: Option<usize>, time: Time) -> &mut Self {
        self.times.push((part, stave, time));
        self
    }

    pub fn has_changes(&self) -> bool {
        self.resolve() != *self.previous
    }

    pub fn build(self) -> Arc<Signature> {
        let resolved = self.resolve();
        if resolved == *self.previous {
            self.previous
        } else {
            Arc::new(resolved)
        }
    }

    fn resolve(&self) -> Signature {
        let mut next = (*self.previous).clone();
        if let Some(metronome) = &self.metronome {
            next.metronome = metronome.clone();
        }

        for (&part, &count) in &self.stave_counts {
            match next.parts.get_mut(part) {
                Some(p) => p.resize(count),
                None => log::warn!("stave count for unknown part {part} ignored"),
            }
        }

        for (&(part, stave), &count) in &self.line_counts {
            if let Some(slot) = stave_slot(&mut next, part, stave, |p| &mut p.stave_line_counts) {
                *slot = count;
            }
        }

        for (&(part, stave), clef) in &self.clefs {
            if let Some(slot) = stave_slot(&mut next, part, stave, |p| &mut p.clefs) {
                *slot = clef.clone();
            }
        }

        for (part, stave, key) in &self.keys {
            for slot in stave_slots(&mut next, *part, *stave, |p| &mut p.keys) {
                if !slot.same_key(key) {
                    *slot = Key {
                        previous_fifths: Some(slot.fifths),
                        ..key.clone()
                    };
                }
            }
        }

        for (part, stave, time) in &self.times {
            for slot in stave_slots(&mut next, *part, *stave, |p| &mut p.times) {
                *slot = time.clone();
            }
        }

        next
    }
}

fn stave_slot<'a, T>(
    signature: &'a mut Signature,
    part: usize,
    stave: usize,
    field: impl FnOnce(&mut PartSignature) -> &mut Vec<T>,
) -> Option<&'a mut T> {
    let slot = signature.parts.get_mut(part).map(field).and_then(|v| v.get_mut(stave));
    if slot.is_none() {
        log::warn!("override for undeclared stave {} of part {part} ignored", stave + 1);
    }
    slot
}

fn stave_slots<'a, T>(
    signature: &'a mut Signature,
    part: usize,
    stave: Option<usize>,
    field: impl FnOnce(&mut PartSignature) -> &mut Vec<T>,
) -> Vec<&'a mut T> {
    match stave {
        Some(stave) => stave_slot(signature, part, stave, field).into_iter().collect(),
        None => signature
            .parts
            .get_mut(part)
            .map(|p| field(p).iter_mut().collect())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unchanged_builder_returns_the_same_snapshot() {
        let initial = Signature::initial(1);
        let mut builder = Signature::builder(&initial);
        builder.set_clef(0, 0, Clef::treble()).set_time(0, None, Time::common());
        assert!(!builder.has_changes());
        assert!(Arc::ptr_eq(&builder.build(), &initial));
    }

    #[test]
    fn stave_count_applies_before_per_stave_overrides() {
        let initial = Signature::initial(1);
        let mut builder = Signature::builder(&initial);
        builder.set_clef(0, 1, Clef::bass()).set_stave_count(0, 2);
        let next = builder.build();
        assert_eq!(next.part(0).stave_count, 2);
        assert_eq!(next.stave(0, 1).clef, Clef::bass());
        assert!(next.is_consistent());
    }

    #[test]
    fn key_change_remembers_the_cancelled_key() {
        let initial = Signature::initial(1);
        let mut builder = Signature::builder(&initial);
        builder.set_key(0, None, Key::new(3, KeyMode::Major));
        let a_major = builder.build();

        let mut builder = Signature::builder(&a_major);
        builder.set_key(0, None, Key::new(-1, KeyMode::Major));
        let f_major = builder.build();
        let key = f_major.stave(0, 0).key;
        assert_eq!(key.previous_fifths, Some(3));
        assert_eq!(key.cancellation_natural_count(), 3);
    }

    #[test]
    fn six_eight_differs_from_three_four() {
        assert_ne!(Time::simple(6, 8), Time::simple(3, 4));
        assert_eq!(Time::simple(6, 8).duration(), Time::simple(3, 4).duration());
    }

    #[test]
    fn time_specs_follow_symbols_and_groups() {
        let common = Time { symbol: Some(TimeSymbol::Common), ..Time::common() };
        assert_eq!(common.to_specs(), vec!["C"]);

        let additive = Time::from_musicxml(&[("3+2".to_string(), 8), ("1".to_string(), 4)], None, false).unwrap();
        assert_eq!(additive.to_specs(), vec!["3+2/8", "1/4"]);

        let single = Time { symbol: Some(TimeSymbol::SingleNumber), ..additive.clone() };
        assert_eq!(single.to_specs(), vec!["6"]);

        let hidden = Time { hidden: true, ..Time::common() };
        assert!(hidden.to_specs().is_empty());
    }
}
