//! Score renderer: lays a [`Document`] out into systems and produces a
//! render tree, then optionally paints it as SVG.
//!
//! Layout runs in three passes. Every measure is first measured twice
//! (as the first measure of a system and as a continuation), then the
//! line breaker packs measures into systems and fixes every fragment's
//! width, and finally each system is laid out for real.

mod constants;
mod draw;
mod engrave;
mod ensemble;
mod formatter;
mod spanners;
mod spatial;
mod split;
mod svg_builder;
mod types;

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::document::{Document, MeasureEntry, MeasureEntryKey, SystemArrangement, SystemKey};
use constants::*;
use ensemble::{layout_gap, Ensemble};
use split::MeasureWidths;

pub use draw::draw;
pub use engrave::{
    Engraver, Glyph, GraceSpec, HeadSpec, LineSegment, MetricEngraver, NativeBeam, NativeMultiRest, NativeStave,
    NativeTickable, NativeTuplet, NoopRenderContext, PlacedGlyph, PlacedHead, PlacedText, RenderContext,
    StaveGeometry, TextAnchor, TickableGeometry,
};
pub use formatter::{Formatter, Tick};
pub use spanners::{IndexedRender, RenderIndex};
pub use spatial::{Pen, Point, Rect, Size};
pub use split::split;
pub use svg_builder::{empty_svg, SvgBuilder};
pub use types::*;

/// Lays documents out with one configuration and one set of glyph metrics.
#[derive(Clone)]
pub struct Renderer {
    config: Config,
    engraver: Arc<dyn Engraver>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Renderer {
    pub fn new(config: Config) -> Self {
        Self { config, engraver: Arc::new(MetricEngraver) }
    }

    pub fn with_engraver(mut self, engraver: Arc<dyn Engraver>) -> Self {
        self.engraver = engraver;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Lay `document` out into systems no wider than `width` (or the
    /// configured width).
    pub fn layout(&self, document: &Document, width: Option<f64>) -> ScoreRender {
        layout(document, width, &self.config, self.engraver.as_ref())
    }

    /// Lay out and paint as a standalone SVG document.
    pub fn render_svg(&self, document: &Document, width: Option<f64>) -> String {
        let mut score = self.layout(document, width);
        if score.systems.is_empty() && score.title.is_none() {
            return empty_svg("No measures in score");
        }
        let stopwatch = Stopwatch::start();
        let mut svg = SvgBuilder::new(score.rect.w, score.rect.h);
        svg.rect(&Rect::new(0.0, 0.0, score.rect.w, score.rect.h), "white");
        draw(&mut score, &mut svg);
        stopwatch.check(self.config.slow_warning_threshold_ms, "svg drawing");
        svg.build()
    }
}

/// Lay `document` out into systems no wider than `width` (or the
/// configured width). A measure that cannot fit gets an over-wide system
/// of its own.
pub fn layout(document: &Document, width: Option<f64>, config: &Config, engraver: &dyn Engraver) -> ScoreRender {
    let stopwatch = Stopwatch::start();
    if let Some(height) = config.height {
        log::warn!("paged layout is not supported, ignoring height {height}");
    }
    let target = width.unwrap_or(config.width);
    let pass = Layout { config, engraver };

    let widths = pass.measure(document);
    let arrangements = split(&widths, target, config.last_system_slack_threshold);
    let document = document.reflow(&arrangements);
    let score = pass.render_score(&document, target);

    stopwatch.check(
        config.slow_warning_threshold_ms,
        &format!("layout of {} measure(s) into {} system(s)", widths.len(), score.systems.len()),
    );
    score
}

struct Layout<'a> {
    config: &'a Config,
    engraver: &'a dyn Engraver,
}

impl Layout<'_> {
    /// Minimum widths of every measure in both of its possible positions.
    fn measure(&self, document: &Document) -> Vec<MeasureWidths> {
        let measures: Vec<_> = document.measures().collect();
        if measures.is_empty() {
            return Vec::new();
        }
        let unset = |index: usize| vec![None; measures[index].entries.len()];
        let continuing = document.reflow(&[SystemArrangement {
            measure_indexes: (0..measures.len()).collect(),
            entry_widths: (0..measures.len()).map(unset).collect(),
        }]);
        let leading = document.reflow(
            &(0..measures.len())
                .map(|index| SystemArrangement { measure_indexes: vec![index], entry_widths: vec![unset(index)] })
                .collect::<Vec<_>>(),
        );

        let origin = Point::new(0.0, 0.0);
        let trial_width = |document: &Document, key: MeasureEntryKey| match document.measure_entry(key) {
            MeasureEntry::Fragment(_) => {
                Ensemble::new(document, key, origin, self.config, self.engraver).layout_width()
            }
            MeasureEntry::Gap(gap) => gap.width.unwrap_or(self.config.gap_width),
        };

        measures
            .iter()
            .enumerate()
            .map(|(index, measure)| {
                let entries = 0..measure.entries.len();
                let leading_key = SystemKey { system_index: index }.measure(0);
                let continuing_key = SystemKey { system_index: 0 }.measure(index);
                MeasureWidths {
                    leading: entries.clone().map(|i| trial_width(&leading, leading_key.entry(i))).collect(),
                    continuing: entries.clone().map(|i| trial_width(&continuing, continuing_key.entry(i))).collect(),
                    stretchable: measure.entries.iter().map(|e| matches!(e, MeasureEntry::Fragment(_))).collect(),
                }
            })
            .collect()
    }

    fn render_score(&self, document: &Document, target: f64) -> ScoreRender {
        let config = self.config;
        let mut pen = Pen::new(0.0, config.score_padding_top);

        let title = document.title().filter(|t| !t.is_empty()).map(|text| {
            let width = self.engraver.text_width(text, config.title_font_size);
            let at = Point::new(target / 2.0, pen.y() + config.title_font_size);
            pen.move_by(0.0, config.title_font_size + config.title_padding_bottom);
            PlacedText::new(text, at, config.title_font_size, TextAnchor::Middle, width)
        });

        let mut systems = Vec::with_capacity(document.system_count());
        for system_index in 0..document.system_count() {
            let key = SystemKey { system_index };
            let mut system = self.render_system(document, key, pen.y());
            let excess = system_excess(&system);
            if excess > 0.0 {
                log::trace!("system {system_index} shifted down by {excess:.1}");
                system = self.render_system(document, key, pen.y() + excess);
            }
            pen.move_to(0.0, system.rect.bottom() + config.system_margin_bottom);
            systems.push(system);
        }

        let curves = spanners::render_curves(document, &systems);
        let wedges = spanners::render_wedges(document, &systems);
        let pedals = spanners::render_pedals(document, &systems, self.engraver);

        let content = Rect::merge_all(
            systems
                .iter()
                .map(|s| &s.rect)
                .chain(title.iter().map(|t| &t.rect))
                .chain(curves.iter().map(|c| &c.rect))
                .chain(wedges.iter().map(|w| &w.rect))
                .chain(pedals.iter().map(|p| &p.rect)),
        );
        let width = content.map_or(target, |r| r.right().max(target));
        let bottom = match systems.last() {
            Some(last) => content.map_or(last.rect.bottom(), |r| r.bottom()),
            None => pen.y(),
        };
        let rect = Rect::new(0.0, 0.0, width, bottom + config.score_padding_bottom);

        ScoreRender { rect, title, systems, curves, wedges, pedals }
    }

    fn render_system(&self, document: &Document, key: SystemKey, y: f64) -> SystemRender {
        let config = self.config;
        let engraver = self.engraver;
        let mut pen = Pen::new(0.0, y);
        let mut measures = Vec::new();

        for (measure_index, measure) in document.system(key).measures.iter().enumerate() {
            let measure_key = key.measure(measure_index);
            let start_x = pen.x();
            let mut entries = Vec::with_capacity(measure.entries.len());
            for (entry_index, entry) in measure.entries.iter().enumerate() {
                let entry_key = measure_key.entry(entry_index);
                match entry {
                    MeasureEntry::Fragment(_) => {
                        let render = Ensemble::new(document, entry_key, pen.position(), config, engraver).into_render();
                        pen.move_by(render.layout_width, 0.0);
                        entries.push(MeasureEntryRender::Fragment(render));
                    }
                    MeasureEntry::Gap(gap) => {
                        let render = layout_gap(gap, entry_key, pen.position(), config, engraver);
                        pen.move_by(gap.width.unwrap_or(config.gap_width), 0.0);
                        entries.push(MeasureEntryRender::Gap(render));
                    }
                }
            }

            let absolute_index = document.absolute_measure_index(measure_key);
            let label = document.is_first_measure(measure_key).then(|| {
                let number = measure.label.unwrap_or(absolute_index as u32 + 1);
                let text = number.to_string();
                let x = entries.iter().find_map(first_stave_x).unwrap_or(start_x);
                let width = engraver.text_width(&text, MEASURE_NUMBER_FONT_SIZE);
                PlacedText::new(&text, Point::new(x, y - 6.0), MEASURE_NUMBER_FONT_SIZE, TextAnchor::Start, width)
            });

            let rect = Rect::merge_all(
                entries.iter().map(MeasureEntryRender::rect).chain(label.iter().map(|l| l.rect)).collect::<Vec<_>>().iter(),
            )
            .unwrap_or_else(|| Rect::new(start_x, y, pen.x() - start_x, 0.0));
            measures.push(MeasureRender { key: measure_key, rect, absolute_index, label, entries });
        }

        let rect = Rect::merge_all(measures.iter().map(|m| &m.rect)).unwrap_or_else(|| Rect::empty(0.0, y));
        SystemRender { key, rect, measures }
    }
}

/// Height by which the tallest fragment pokes above the system's top.
fn system_excess(system: &SystemRender) -> f64 {
    system
        .measures
        .iter()
        .flat_map(|m| &m.entries)
        .filter_map(|e| match e {
            MeasureEntryRender::Fragment(f) => Some(f.excess_height),
            MeasureEntryRender::Gap(_) => None,
        })
        .fold(0.0, f64::max)
}

fn first_stave_x(entry: &MeasureEntryRender) -> Option<f64> {
    match entry {
        MeasureEntryRender::Fragment(f) => {
            f.parts.first()?.staves.first().map(|s| s.native.bounding_box().x)
        }
        MeasureEntryRender::Gap(g) => g.staves.first().map(|s| s.bounding_box().x),
    }
}

/// Times one pass and complains when it is slow.
struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    fn start() -> Self {
        Self { started: Instant::now() }
    }

    fn check(&self, threshold_ms: u64, what: &str) {
        let elapsed = self.started.elapsed();
        if elapsed.as_millis() > u128::from(threshold_ms) {
            log::warn!("{what} took {}ms (threshold {threshold_ms}ms)", elapsed.as_millis());
        } else {
            log::debug!("{what} took {:.2}ms", elapsed.as_secs_f64() * 1000.0);
        }
    }
}
