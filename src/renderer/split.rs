//! Line breaking: packs measures into systems of a target width.

use crate::document::SystemArrangement;

/// Minimum widths of one measure's entries, measured twice: once as the
/// first measure of a system (with clef, key and measure number) and once
/// continuing a system.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureWidths {
    pub leading: Vec<f64>,
    pub continuing: Vec<f64>,
    /// Whether each entry may grow; gaps keep their width.
    pub stretchable: Vec<bool>,
}

impl MeasureWidths {
    fn total(&self, leading: bool) -> f64 {
        self.entries(leading).iter().sum()
    }

    fn entries(&self, leading: bool) -> &[f64] {
        if leading {
            &self.leading
        } else {
            &self.continuing
        }
    }
}

/// Greedy first-fit over `measures`. A measure that does not fit closes
/// the current system; a measure wider than `target` sits alone in an
/// over-wide system. Positive slack is spread over the stretchable
/// entries in proportion to their minimum width, except on the last
/// system when the slack is at least `last_threshold` of the target.
pub fn split(measures: &[MeasureWidths], target: f64, last_threshold: f64) -> Vec<SystemArrangement> {
    let mut systems = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut remaining = target;

    for (index, measure) in measures.iter().enumerate() {
        let width = measure.total(current.is_empty());
        if !current.is_empty() && width > remaining {
            systems.push(close(measures, &current, target, false, last_threshold));
            current.clear();
            remaining = target;
        }
        remaining -= measure.total(current.is_empty());
        current.push(index);
    }
    if !current.is_empty() {
        systems.push(close(measures, &current, target, true, last_threshold));
    }

    log::debug!("split {} measure(s) into {} system(s)", measures.len(), systems.len());
    systems
}

fn close(
    measures: &[MeasureWidths],
    indexes: &[usize],
    target: f64,
    is_last: bool,
    last_threshold: f64,
) -> SystemArrangement {
    let rows: Vec<(&[f64], &[bool])> = indexes
        .iter()
        .enumerate()
        .map(|(position, &i)| (measures[i].entries(position == 0), measures[i].stretchable.as_slice()))
        .collect();

    let total: f64 = rows.iter().flat_map(|(widths, _)| widths.iter()).sum();
    let stretchable: f64 = rows
        .iter()
        .flat_map(|(widths, flags)| widths.iter().zip(flags.iter()))
        .filter(|(_, flag)| **flag)
        .map(|(w, _)| w)
        .sum();
    let slack = target - total;
    let stretch = slack > 0.0 && stretchable > 0.0 && (!is_last || slack / target < last_threshold);
    let factor = if stretch { 1.0 + slack / stretchable } else { 1.0 };

    let entry_widths = rows
        .iter()
        .map(|(widths, flags)| {
            widths
                .iter()
                .enumerate()
                .map(|(i, &w)| {
                    let grows = flags.get(i).copied().unwrap_or(false);
                    Some(if grows { w * factor } else { w })
                })
                .collect()
        })
        .collect();

    SystemArrangement { measure_indexes: indexes.to_vec(), entry_widths }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn measure(leading: f64, continuing: f64) -> MeasureWidths {
        MeasureWidths { leading: vec![leading], continuing: vec![continuing], stretchable: vec![true] }
    }

    fn sum(arrangement: &SystemArrangement) -> f64 {
        arrangement.entry_widths.iter().flatten().flatten().sum()
    }

    #[test]
    fn measures_fill_systems_greedily() {
        let measures = vec![measure(120.0, 100.0); 5];
        let systems = split(&measures, 330.0, 0.25);
        let groups: Vec<Vec<usize>> = systems.iter().map(|s| s.measure_indexes.clone()).collect();
        assert_eq!(groups, vec![vec![0, 1, 2], vec![3, 4]]);
        assert_eq!(sum(&systems[0]), 330.0);
    }

    #[test]
    fn exact_fit_stays_on_the_system() {
        let measures = vec![measure(100.0, 100.0), measure(100.0, 100.0)];
        let systems = split(&measures, 200.0, 0.25);
        assert_eq!(systems.len(), 1);
    }

    #[test]
    fn oversized_measure_gets_its_own_system() {
        let measures = vec![measure(50.0, 40.0), measure(500.0, 480.0), measure(50.0, 40.0)];
        let systems = split(&measures, 200.0, 0.25);
        let groups: Vec<Vec<usize>> = systems.iter().map(|s| s.measure_indexes.clone()).collect();
        assert_eq!(groups, vec![vec![0], vec![1], vec![2]]);
        assert_eq!(systems[1].entry_widths, vec![vec![Some(500.0)]]);
    }

    #[test]
    fn loose_last_system_is_left_ragged() {
        let measures = vec![measure(100.0, 90.0), measure(100.0, 90.0), measure(100.0, 90.0)];
        let systems = split(&measures, 200.0, 0.25);
        assert_eq!(systems.len(), 2);
        assert_eq!(systems[1].entry_widths, vec![vec![Some(100.0)]]);

        let nearly_full = split(&measures[..2], 200.0, 0.25);
        assert!((sum(&nearly_full[0]) - 200.0).abs() < 1e-9);
    }

    #[test]
    fn gaps_keep_their_width() {
        let measures = vec![MeasureWidths {
            leading: vec![80.0, 40.0],
            continuing: vec![70.0, 40.0],
            stretchable: vec![true, false],
        }];
        let systems = split(&measures, 130.0, 0.25);
        assert_eq!(systems[0].entry_widths, vec![vec![Some(90.0), Some(40.0)]]);
    }
}
