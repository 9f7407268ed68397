//! Horizontal spacing of every tickable in one fragment.
//!
//! All voices of all staves share one column per distinct beat, so notes
//! sounding together line up vertically. Columns are spaced in proportion
//! to the beat distance between them, but never closer than the glyphs on
//! either side allow.

use std::collections::BTreeMap;

use super::constants::TICK_PADDING;
use crate::fraction::Fraction;

/// One positioned note, chord or rest as the formatter sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub beat: Fraction,
    pub duration: Fraction,
    /// Room needed left of the tick's anchor.
    pub left: f64,
    /// Room needed from the anchor rightwards.
    pub width: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Column {
    beat: Fraction,
    left: f64,
    width: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Formatter {
    columns: Vec<Column>,
    span: f64,
}

impl Formatter {
    pub fn new(ticks: impl IntoIterator<Item = Tick>) -> Self {
        let mut by_beat: BTreeMap<Fraction, Column> = BTreeMap::new();
        let mut end: Option<Fraction> = None;
        for tick in ticks {
            let column = by_beat
                .entry(tick.beat)
                .or_insert(Column { beat: tick.beat, left: 0.0, width: 0.0 });
            column.left = column.left.max(tick.left);
            column.width = column.width.max(tick.width);
            let tick_end = tick.beat.add(&tick.duration);
            end = Some(end.map_or(tick_end, |e| e.max(tick_end)));
        }
        let columns: Vec<Column> = by_beat.into_values().collect();
        let span = match (columns.first(), end) {
            (Some(first), Some(end)) => end.subtract(&first.beat).to_f64(),
            _ => 0.0,
        };
        Self { columns, span }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Smallest gap allowed after each column; the last one covers the
    /// trailing glyph.
    fn minimum_gaps(&self) -> Vec<f64> {
        let mut gaps: Vec<f64> = self
            .columns
            .windows(2)
            .map(|pair| pair[0].width + pair[1].left + TICK_PADDING)
            .collect();
        if let Some(last) = self.columns.last() {
            gaps.push(last.width);
        }
        gaps
    }

    /// Width needed to set every column without collisions.
    pub fn minimum_width(&self) -> f64 {
        match self.columns.first() {
            Some(first) => first.left + self.minimum_gaps().iter().sum::<f64>(),
            None => 0.0,
        }
    }

    /// Place each column inside `width` and return `(beat, x)` pairs with
    /// `x` measured from the start of the voice area.
    ///
    /// Space is shared out by beat distance; a column whose share falls
    /// below its minimum is pinned at the minimum and the rest is shared
    /// again among the others.
    pub fn format(&self, width: f64) -> Vec<(Fraction, f64)> {
        let Some(first) = self.columns.first() else { return Vec::new() };
        let usable = (width - first.left).max(0.0);
        let minimums = self.minimum_gaps();

        let offset = |c: &Column| c.beat.subtract(&first.beat).to_f64();
        let durations: Vec<f64> = (0..self.columns.len())
            .map(|i| {
                let next = self.columns.get(i + 1).map_or(self.span, offset);
                (next - offset(&self.columns[i])).max(0.0)
            })
            .collect();
        let (durations, minimums) = (&durations, &minimums);

        let mut pinned = vec![false; durations.len()];
        let share = |pinned: &[bool]| {
            let pinned_width: f64 = (0..durations.len()).filter(|&i| pinned[i]).map(|i| minimums[i]).sum();
            let free_span: f64 = (0..durations.len()).filter(|&i| !pinned[i]).map(|i| durations[i]).sum();
            let free_width = (usable - pinned_width).max(0.0);
            move |i: usize| if free_span > 0.0 { durations[i] / free_span * free_width } else { 0.0 }
        };
        loop {
            let proportional = share(&pinned);
            let mut changed = false;
            for i in 0..durations.len() {
                if !pinned[i] && proportional(i) < minimums[i] {
                    pinned[i] = true;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let proportional = share(&pinned);
        let mut x = first.left;
        let mut placed = Vec::with_capacity(self.columns.len());
        for (i, column) in self.columns.iter().enumerate() {
            placed.push((column.beat, x));
            x += if pinned[i] { minimums[i] } else { proportional(i) };
        }
        placed
    }
}

/// Look up the x of `beat` in a formatted column list.
pub fn x_at(columns: &[(Fraction, f64)], beat: Fraction) -> f64 {
    columns
        .binary_search_by(|(b, _)| b.cmp(&beat))
        .map(|i| columns[i].1)
        .unwrap_or_else(|i| columns.get(i.saturating_sub(1)).map_or(0.0, |c| c.1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tick(beat: Fraction, duration: Fraction, width: f64) -> Tick {
        Tick { beat, duration, left: 0.0, width }
    }

    fn quarters(count: i64) -> Vec<Tick> {
        (0..count)
            .map(|i| tick(Fraction::new(i, 4), Fraction::new(1, 4), 10.0))
            .collect()
    }

    #[test]
    fn minimum_width_sums_glyphs_and_padding() {
        let formatter = Formatter::new(quarters(4));
        assert_eq!(formatter.minimum_width(), 3.0 * (10.0 + TICK_PADDING) + 10.0);
    }

    #[test]
    fn even_durations_are_spaced_evenly() {
        let formatter = Formatter::new(quarters(4));
        let xs: Vec<f64> = formatter.format(400.0).into_iter().map(|(_, x)| x).collect();
        assert_eq!(xs, vec![0.0, 100.0, 200.0, 300.0]);
    }

    #[test]
    fn simultaneous_ticks_share_a_column() {
        let mut ticks = quarters(2);
        ticks.push(Tick { beat: Fraction::zero(), duration: Fraction::new(1, 2), left: 8.0, width: 12.0 });
        let formatter = Formatter::new(ticks);
        let columns = formatter.format(200.0);
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].1, 8.0);
        assert_eq!(x_at(&columns, Fraction::new(1, 4)), columns[1].1);
    }

    #[test]
    fn narrow_width_never_overlaps_glyphs() {
        let ticks = vec![
            tick(Fraction::zero(), Fraction::new(1, 16), 30.0),
            tick(Fraction::new(1, 16), Fraction::new(15, 16), 10.0),
        ];
        let formatter = Formatter::new(ticks);
        let width = formatter.minimum_width();
        let columns = formatter.format(width);
        assert!(columns[1].1 - columns[0].1 >= 30.0 + TICK_PADDING - 1e-9);
    }
}
