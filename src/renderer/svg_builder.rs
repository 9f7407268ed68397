//! SVG builder: a [`RenderContext`] that accumulates SVG elements and
//! produces the final document string.

use super::constants::*;
use super::engrave::{Glyph, LineSegment, PlacedGlyph, PlacedHead, PlacedText, RenderContext, TextAnchor};
use super::spatial::{Point, Rect};
use crate::document::{AccidentalCode, ArticulationKind, DurationType, Notehead};
use crate::signature::ClefSign;

pub struct SvgBuilder {
    elements: Vec<String>,
    width: f64,
    height: f64,
}

impl SvgBuilder {
    pub fn new(width: f64, height: f64) -> Self {
        Self { elements: Vec::new(), width, height }
    }

    pub fn build(self) -> String {
        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {:.1} {:.1}" width="{:.1}" height="{:.1}" style="font-family: 'Georgia', 'Times New Roman', serif;">"#,
            self.width, self.height, self.width, self.height
        );
        svg.push('\n');
        for el in &self.elements {
            svg.push_str("  ");
            svg.push_str(el);
            svg.push('\n');
        }
        svg.push_str("</svg>\n");
        svg
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    fn music_text(&mut self, at: Point, content: &str, size: f64, anchor: &str) {
        self.elements.push(format!(
            r#"<text x="{:.1}" y="{:.1}" font-size="{:.0}" fill="{}" text-anchor="{}" dominant-baseline="central">{}</text>"#,
            at.x,
            at.y,
            size,
            NOTE_COLOR,
            anchor,
            escape(content)
        ));
    }

    fn flag(&mut self, tip: Point, count: u32, stem_up: bool, scale: f64) {
        // Flags hang from an up stem and rise from a down stem.
        let direction = if stem_up { scale } else { -scale };
        let width = FLAG_WIDTH * scale;
        for i in 0..count {
            let y = tip.y + direction * FLAG_SPACING * i as f64;
            let path = format!(
                "M{:.1},{:.1} C{:.1},{:.1} {:.1},{:.1} {:.1},{:.1} C{:.1},{:.1} {:.1},{:.1} {:.1},{:.1} Z",
                tip.x,
                y,
                tip.x + 2.0 * scale,
                y + direction * 8.0,
                tip.x + width + 2.0 * scale,
                y + direction * 10.0,
                tip.x + width - scale,
                y + direction * 20.0,
                tip.x + width - 2.0 * scale,
                y + direction * 13.0,
                tip.x + 2.0 * scale,
                y + direction * 10.0,
                tip.x,
                y + direction * 6.0,
            );
            self.path(&path, NOTE_COLOR, "none", 0.0);
        }
    }

    fn articulation(&mut self, rect: &Rect, kind: ArticulationKind) {
        let (left, right, top, bottom) = (rect.x, rect.right(), rect.y, rect.bottom());
        let middle = rect.center();
        match kind {
            ArticulationKind::Accent => {
                let d = format!(
                    "M{:.1},{:.1} L{:.1},{:.1} L{:.1},{:.1}",
                    left, top, right, middle.y, left, bottom
                );
                self.path(&d, "none", NOTE_COLOR, 1.2);
            }
            ArticulationKind::StrongAccent => {
                let d = format!(
                    "M{:.1},{:.1} L{:.1},{:.1} L{:.1},{:.1}",
                    left, bottom, middle.x, top, right, bottom
                );
                self.path(&d, "none", NOTE_COLOR, 1.6);
            }
            ArticulationKind::Staccato => self.circle(middle, rect.w / 2.0, NOTE_COLOR),
            ArticulationKind::Tenuto => self.rect(rect, NOTE_COLOR),
        }
    }

    fn time_signature(&mut self, rect: &Rect, spec: &str) {
        let x = rect.center().x;
        match spec.split_once('/') {
            Some((top, bottom)) => {
                let middle = rect.center().y;
                self.music_text(Point::new(x, middle - rect.h / 4.0), top, TIME_SIG_FONT_SIZE, "middle");
                self.music_text(Point::new(x, middle + rect.h / 4.0), bottom, TIME_SIG_FONT_SIZE, "middle");
            }
            None => self.music_text(rect.center(), spec, TIME_SIG_FONT_SIZE, "middle"),
        }
    }
}

impl RenderContext for SvgBuilder {
    fn line(&mut self, segment: &LineSegment, color: &str) {
        let LineSegment { from, to, width } = segment;
        self.elements.push(format!(
            r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="{}" stroke-width="{:.1}" stroke-linecap="butt"/>"#,
            from.x, from.y, to.x, to.y, color, width
        ));
    }

    fn rect(&mut self, rect: &Rect, fill: &str) {
        self.elements.push(format!(
            r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}"/>"#,
            rect.x, rect.y, rect.w, rect.h, fill
        ));
    }

    fn circle(&mut self, center: Point, radius: f64, fill: &str) {
        self.elements.push(format!(
            r#"<circle cx="{:.1}" cy="{:.1}" r="{:.1}" fill="{}"/>"#,
            center.x, center.y, radius, fill
        ));
    }

    fn path(&mut self, d: &str, fill: &str, stroke: &str, stroke_width: f64) {
        self.elements.push(format!(
            r#"<path d="{}" fill="{}" stroke="{}" stroke-width="{:.1}" stroke-linecap="round"/>"#,
            d, fill, stroke, stroke_width
        ));
    }

    fn text(&mut self, text: &PlacedText, fill: &str) {
        let anchor = match text.anchor {
            TextAnchor::Start => "start",
            TextAnchor::Middle => "middle",
            TextAnchor::End => "end",
        };
        self.elements.push(format!(
            r#"<text x="{:.1}" y="{:.1}" font-size="{:.0}" fill="{}" text-anchor="{}">{}</text>"#,
            text.at.x,
            text.at.y,
            text.size,
            fill,
            anchor,
            escape(&text.text)
        ));
    }

    fn notehead(&mut self, head: &PlacedHead) {
        let Point { x: cx, y: cy } = head.center;
        let rx = head.rect.w / 2.0;
        let ry = head.rect.h / 2.0;
        match head.head {
            Notehead::None => {}
            Notehead::X | Notehead::CircleX => {
                let d = format!(
                    "M{:.1},{:.1} L{:.1},{:.1} M{:.1},{:.1} L{:.1},{:.1}",
                    cx - rx, cy - ry, cx + rx, cy + ry, cx - rx, cy + ry, cx + rx, cy - ry
                );
                self.path(&d, "none", NOTE_COLOR, 1.5);
                if head.head == Notehead::CircleX {
                    self.elements.push(format!(
                        r#"<circle cx="{:.1}" cy="{:.1}" r="{:.1}" fill="none" stroke="{}" stroke-width="1.2"/>"#,
                        cx, cy, rx, NOTE_COLOR
                    ));
                }
            }
            Notehead::Diamond => {
                let d = format!(
                    "M{:.1},{:.1} L{:.1},{:.1} L{:.1},{:.1} L{:.1},{:.1} Z",
                    cx - rx, cy, cx, cy - ry, cx + rx, cy, cx, cy + ry
                );
                let fill = if head.duration_type.is_filled() { NOTE_COLOR } else { "none" };
                self.path(&d, fill, NOTE_COLOR, 1.2);
            }
            Notehead::Square => {
                let fill = if head.duration_type.is_filled() { NOTE_COLOR } else { "none" };
                self.elements.push(format!(
                    r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}" stroke="{}" stroke-width="1.2"/>"#,
                    head.rect.x, head.rect.y, head.rect.w, head.rect.h, fill, NOTE_COLOR
                ));
            }
            Notehead::Triangle => {
                let d = format!(
                    "M{:.1},{:.1} L{:.1},{:.1} L{:.1},{:.1} Z",
                    cx - rx, cy + ry, cx, cy - ry, cx + rx, cy + ry
                );
                let fill = if head.duration_type.is_filled() { NOTE_COLOR } else { "none" };
                self.path(&d, fill, NOTE_COLOR, 1.2);
            }
            Notehead::Slash => {
                let d = format!("M{:.1},{:.1} L{:.1},{:.1}", cx - rx, cy + ry, cx + rx, cy - ry);
                self.path(&d, "none", NOTE_COLOR, 3.0);
            }
            Notehead::Normal if head.duration_type.is_filled() => {
                self.elements.push(format!(
                    r#"<ellipse cx="{:.1}" cy="{:.1}" rx="{:.1}" ry="{:.1}" fill="{}" stroke="none" transform="rotate(-15,{:.1},{:.1})"/>"#,
                    cx, cy, rx, ry, NOTE_COLOR, cx, cy
                ));
            }
            Notehead::Normal => {
                let sw = 2.0;
                let tilt = if matches!(head.duration_type, DurationType::Whole | DurationType::Breve) { 0.0 } else { -15.0 };
                self.elements.push(format!(
                    r#"<ellipse cx="{:.1}" cy="{:.1}" rx="{:.1}" ry="{:.1}" fill="none" stroke="{}" stroke-width="{:.1}" transform="rotate({:.0},{:.1},{:.1})"/>"#,
                    cx, cy, rx - sw / 2.0, ry - sw / 2.0, NOTE_COLOR, sw, tilt, cx, cy
                ));
            }
        }
    }

    fn glyph(&mut self, glyph: &PlacedGlyph) {
        let rect = &glyph.rect;
        match &glyph.glyph {
            Glyph::Clef(sign) => {
                let symbol = match sign {
                    ClefSign::G => "𝄞",
                    ClefSign::F => "𝄢",
                    ClefSign::C => "𝄡",
                    ClefSign::Percussion => "𝄥",
                    ClefSign::Tab => "TAB",
                    ClefSign::None => return,
                };
                self.music_text(glyph.at, symbol, rect.h * 0.75, "middle");
            }
            Glyph::Accidental(code) => {
                let symbol = match code {
                    AccidentalCode::Sharp => "♯",
                    AccidentalCode::DoubleSharp => "𝄪",
                    AccidentalCode::Flat => "♭",
                    AccidentalCode::DoubleFlat => "𝄫",
                    AccidentalCode::Natural => "♮",
                    AccidentalCode::QuarterSharp => "𝄲",
                    AccidentalCode::ThreeQuarterSharp => "𝄰",
                    AccidentalCode::QuarterFlat => "𝄳",
                    AccidentalCode::ThreeQuarterFlat => "𝄭",
                };
                self.music_text(glyph.at, symbol, rect.h * 0.8, "middle");
            }
            Glyph::Notehead { .. } => {}
            Glyph::Rest(DurationType::Breve | DurationType::Whole | DurationType::Half) => {
                self.rect(rect, NOTE_COLOR);
            }
            Glyph::Rest(duration_type) => {
                let symbol = match duration_type {
                    DurationType::Quarter => "𝄽",
                    DurationType::Eighth => "𝄾",
                    DurationType::Sixteenth => "𝄿",
                    DurationType::ThirtySecond => "𝅀",
                    DurationType::SixtyFourth => "𝅁",
                    _ => "𝅂",
                };
                self.music_text(glyph.at, symbol, rect.h, "middle");
            }
            Glyph::Flag { count, stem_up } => self.flag(glyph.at, *count, *stem_up, 1.0),
            Glyph::GraceFlag { count, stem_up } => self.flag(glyph.at, *count, *stem_up, GRACE_SCALE),
            Glyph::Articulation(kind) => self.articulation(rect, *kind),
            Glyph::TimeSignature(spec) => self.time_signature(rect, spec),
        }
    }
}

fn escape(content: &str) -> String {
    content.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// A placeholder document carrying a message, for inputs with nothing to draw.
pub fn empty_svg(message: &str) -> String {
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 400 100\">\
         <text x=\"200\" y=\"50\" text-anchor=\"middle\" font-size=\"14\" fill=\"gray\">{}</text>\
         </svg>",
        escape(message)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_escaped() {
        let mut svg = SvgBuilder::new(100.0, 50.0);
        let text = PlacedText::new("Tom & Jerry <3", Point::new(0.0, 20.0), 12.0, TextAnchor::Start, 40.0);
        svg.text(&text, TEXT_COLOR);
        let out = svg.build();
        assert!(out.contains("Tom &amp; Jerry &lt;3"));
        assert!(out.starts_with("<svg"));
        assert!(out.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn block_rests_are_rectangles() {
        let mut svg = SvgBuilder::new(100.0, 50.0);
        svg.glyph(&PlacedGlyph {
            glyph: Glyph::Rest(DurationType::Whole),
            at: Point::new(10.0, 10.0),
            rect: Rect::new(3.0, 8.0, 14.0, 5.0),
        });
        assert_eq!(svg.element_count(), 1);
        assert!(svg.build().contains("<rect"));
    }

    #[test]
    fn staccato_is_a_dot_and_accent_a_wedge() {
        let mut svg = SvgBuilder::new(100.0, 50.0);
        svg.glyph(&PlacedGlyph {
            glyph: Glyph::Articulation(ArticulationKind::Staccato),
            at: Point::new(10.0, 10.0),
            rect: Rect::centered(Point::new(10.0, 10.0), crate::renderer::Size::new(3.2, 3.2)),
        });
        svg.glyph(&PlacedGlyph {
            glyph: Glyph::Articulation(ArticulationKind::Accent),
            at: Point::new(30.0, 10.0),
            rect: Rect::new(25.0, 6.5, 10.0, 7.0),
        });
        let out = svg.build();
        assert!(out.contains("<circle"));
        assert!(out.contains("M25.0,6.5 L35.0,10.0 L25.0,13.5"));
    }
}
