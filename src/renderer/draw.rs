//! Paints a laid-out score. Nothing here measures or moves anything; it
//! replays geometry computed during layout into a [`RenderContext`].

use super::constants::*;
use super::engrave::{LineSegment, RenderContext};
use super::spatial::{Point, Rect};
use super::types::{
    ConnectorKind, ConnectorRender, CurveSegment, FragmentRender, GapRender, MeasureEntryRender, ScoreRender,
};

pub fn draw(score: &mut ScoreRender, ctx: &mut dyn RenderContext) {
    if let Some(title) = &score.title {
        ctx.text(title, TEXT_COLOR);
    }
    for system in &mut score.systems {
        for measure in &mut system.measures {
            if let Some(label) = &measure.label {
                ctx.text(label, MEASURE_NUMBER_COLOR);
            }
            for entry in &mut measure.entries {
                match entry {
                    MeasureEntryRender::Fragment(fragment) => draw_fragment(fragment, ctx),
                    MeasureEntryRender::Gap(gap) => draw_gap(gap, ctx),
                }
            }
        }
    }
    for curve in &score.curves {
        for segment in &curve.segments {
            draw_curve(segment, ctx);
        }
    }
    for wedge in &score.wedges {
        for line in wedge.segments.iter().flat_map(|s| &s.lines) {
            ctx.line(line, NOTE_COLOR);
        }
    }
    for pedal in &score.pedals {
        for segment in &pedal.segments {
            for line in &segment.lines {
                ctx.line(line, NOTE_COLOR);
            }
            for text in &segment.texts {
                ctx.text(text, TEXT_COLOR);
            }
        }
    }
}

fn draw_fragment(fragment: &mut FragmentRender, ctx: &mut dyn RenderContext) {
    for label in &fragment.part_labels {
        ctx.text(label, TEXT_COLOR);
    }
    for stave in fragment.parts.iter_mut().flat_map(|p| &mut p.staves) {
        stave.native.draw(ctx);
        if let Some(rest) = stave.multi_rest.as_mut() {
            rest.draw(ctx);
        }
        for voice in &mut stave.voices {
            for entry in &mut voice.entries {
                entry.native.draw(ctx);
            }
            for beam in &mut voice.beams {
                beam.native.draw(ctx);
            }
            for tuplet in &mut voice.tuplets {
                tuplet.native.draw(ctx);
            }
        }
    }
    for connector in &fragment.connectors {
        draw_connector(connector, ctx);
    }
}

fn draw_gap(gap: &mut GapRender, ctx: &mut dyn RenderContext) {
    for stave in &mut gap.staves {
        stave.draw(ctx);
    }
    if let Some(text) = &gap.text {
        ctx.text(text, TEXT_COLOR);
    }
}

fn draw_connector(connector: &ConnectorRender, ctx: &mut dyn RenderContext) {
    let rect = connector.rect;
    let thin = |x: f64| LineSegment::new(Point::new(x, rect.y), Point::new(x, rect.bottom()), BARLINE_WIDTH);
    let bold = |x: f64| Rect::new(x, rect.y, BOLD_BARLINE_WIDTH, rect.h);
    let half = BARLINE_WIDTH / 2.0;

    match connector.kind {
        ConnectorKind::SingleLeft | ConnectorKind::SingleRight => ctx.line(&thin(rect.x + half), BARLINE_COLOR),
        ConnectorKind::Double => {
            ctx.line(&thin(rect.x + half), BARLINE_COLOR);
            ctx.line(&thin(rect.right() - half), BARLINE_COLOR);
        }
        ConnectorKind::BoldDoubleRight => {
            ctx.line(&thin(rect.x + half), BARLINE_COLOR);
            ctx.rect(&bold(rect.right() - BOLD_BARLINE_WIDTH), BARLINE_COLOR);
        }
        ConnectorKind::RepeatStart => {
            ctx.rect(&bold(rect.x), BARLINE_COLOR);
            ctx.line(&thin(rect.x + BOLD_BARLINE_WIDTH + DOUBLE_BARLINE_GAP + half), BARLINE_COLOR);
        }
        ConnectorKind::RepeatEnd => {
            ctx.line(&thin(rect.right() - BOLD_BARLINE_WIDTH - DOUBLE_BARLINE_GAP - half), BARLINE_COLOR);
            ctx.rect(&bold(rect.right() - BOLD_BARLINE_WIDTH), BARLINE_COLOR);
        }
        ConnectorKind::Brace => {
            let (x, y, w, h) = (rect.x, rect.y, rect.w, rect.h);
            let mid = y + h / 2.0;
            let d = format!(
                "M{:.1},{:.1} C{:.1},{:.1} {:.1},{:.1} {:.1},{:.1} C{:.1},{:.1} {:.1},{:.1} {:.1},{:.1} \
                 C{:.1},{:.1} {:.1},{:.1} {:.1},{:.1} C{:.1},{:.1} {:.1},{:.1} {:.1},{:.1} Z",
                x + w, y,
                x, y + h * 0.1, x + w, mid - h * 0.1, x, mid,
                x + w, mid + h * 0.1, x, y + h * 0.9, x + w, y + h,
                x + w * 0.4, y + h * 0.9, x + w * 1.2, mid + h * 0.1, x + w * 0.3, mid,
                x + w * 1.2, mid - h * 0.1, x + w * 0.4, y + h * 0.1, x + w, y,
            );
            ctx.path(&d, NOTE_COLOR, "none", 0.0);
        }
    }
    for dot in &connector.dots {
        ctx.circle(*dot, REPEAT_DOT_RADIUS, BARLINE_COLOR);
    }
}

fn draw_curve(segment: &CurveSegment, ctx: &mut dyn RenderContext) {
    let CurveSegment { start, end, control1, control2, inner_start, inner_end, inner1, inner2, .. } = segment;
    let d = format!(
        "M{:.1},{:.1} C{:.1},{:.1} {:.1},{:.1} {:.1},{:.1} L{:.1},{:.1} C{:.1},{:.1} {:.1},{:.1} {:.1},{:.1} Z",
        start.x, start.y,
        control1.x, control1.y,
        control2.x, control2.y,
        end.x, end.y,
        inner_end.x, inner_end.y,
        inner2.x, inner2.y,
        inner1.x, inner1.y,
        inner_start.x, inner_start.y,
    );
    ctx.path(&d, NOTE_COLOR, "none", 0.0);
}
