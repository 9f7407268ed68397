//! Shared constants for layout and drawing (all in SVG user units).
//!
//! Glyph metrics assume a stave line spacing of 10.

// ── Fragment padding ────────────────────────────────────────────────
pub(crate) const BARLINE_PADDING_RIGHT: f64 = 6.0;
pub(crate) const MEASURE_NUMBER_PADDING_LEFT: f64 = 6.0;
pub(crate) const BRACE_CONNECTOR_PADDING_LEFT: f64 = 8.0;
pub(crate) const ADDITIONAL_CLEF_WIDTH: f64 = 10.0;
pub(crate) const ADDITIONAL_COMPLEX_TIME_SIGNATURE_COMPONENT_WIDTH: f64 = 12.0;
pub(super) const TIME_SIGNATURE_PADDING: f64 = 12.0;
pub(super) const KEY_SIGNATURE_PADDING: f64 = 4.0;

// ── Stave ───────────────────────────────────────────────────────────
pub(super) const STAFF_LINE_WIDTH: f64 = 0.8;
pub(super) const LEDGER_LINE_WIDTH: f64 = 0.8;
pub(super) const LEDGER_LINE_EXTEND: f64 = 5.0;
pub(super) const BARLINE_WIDTH: f64 = 1.0;
pub(super) const BOLD_BARLINE_WIDTH: f64 = 3.0;
pub(super) const DOUBLE_BARLINE_GAP: f64 = 3.0;
pub(super) const REPEAT_DOT_RADIUS: f64 = 2.0;
pub(super) const BRACE_WIDTH: f64 = 10.0;

// ── Prefix glyphs ───────────────────────────────────────────────────
pub(super) const CLEF_GLYPH_WIDTH: f64 = 22.0;
pub(super) const CLEF_GLYPH_HEIGHT: f64 = 64.0;
pub(super) const KEY_SIG_SHARP_SPACE: f64 = 10.0;
pub(super) const KEY_SIG_FLAT_SPACE: f64 = 8.0;
pub(super) const KEY_SIG_NATURAL_SPACE: f64 = 8.0;
pub(super) const TIME_SIG_DIGIT_WIDTH: f64 = 12.0;
pub(super) const TIME_SIG_FONT_SIZE: f64 = 22.0;

// ── Notes ───────────────────────────────────────────────────────────
pub(super) const NOTEHEAD_RX: f64 = 5.5;
pub(super) const NOTEHEAD_RY: f64 = 4.0;
pub(super) const WHOLE_NOTEHEAD_RX: f64 = 7.0;
pub(super) const STEM_LENGTH: f64 = 30.0;
pub(super) const STEM_WIDTH: f64 = 1.2;
pub(super) const FLAG_WIDTH: f64 = 8.0;
pub(super) const FLAG_SPACING: f64 = 7.0;
pub(super) const BEAM_THICKNESS: f64 = 4.0;
pub(super) const BEAM_SPACING: f64 = 7.0;
pub(super) const BEAM_MAX_SLOPE: f64 = 0.25;
pub(super) const BEAM_HOOK_LENGTH: f64 = 8.0;
pub(super) const DOT_RADIUS: f64 = 1.6;
pub(super) const DOT_SPACE: f64 = 5.0;
pub(super) const ACCIDENTAL_GAP: f64 = 2.0;
pub(super) const TICK_PADDING: f64 = 6.0;

// ── Grace notes and articulations ───────────────────────────────────
pub(super) const GRACE_SCALE: f64 = 0.66;
/// Horizontal advance per grace note.
pub(super) const GRACE_NOTE_WIDTH: f64 = 13.0;
/// Space between the last grace note and its principal note.
pub(super) const GRACE_GAP: f64 = 3.0;
pub(super) const GRACE_STEM_LENGTH: f64 = STEM_LENGTH * GRACE_SCALE;
pub(super) const GRACE_STEM_WIDTH: f64 = STEM_WIDTH * 0.85;
pub(super) const GRACE_SLASH_LENGTH: f64 = 7.0;
pub(super) const ARTICULATION_GAP: f64 = 3.0;

// ── Rests ───────────────────────────────────────────────────────────
pub(super) const BLOCK_REST_WIDTH: f64 = 14.0;
pub(super) const BLOCK_REST_HEIGHT: f64 = 5.0;
pub(super) const REST_GLYPH_WIDTH: f64 = 10.0;
pub(super) const MULTI_REST_HEIGHT: f64 = 10.0;
pub(super) const MULTI_REST_INSET: f64 = 12.0;

// ── Spanners ────────────────────────────────────────────────────────
pub(super) const TUPLET_OFFSET: f64 = 10.0;
pub(super) const TUPLET_HOOK: f64 = 5.0;
pub(super) const TUPLET_FONT_SIZE: f64 = 11.0;
pub(super) const SLUR_NOTEHEAD_Y_OFFSET: f64 = 5.0;
pub(super) const SLUR_ENDPOINT_THICKNESS: f64 = 0.5;
pub(super) const SLUR_MID_THICKNESS: f64 = 1.5;
pub(super) const SLUR_HEIGHT_FACTOR: f64 = 0.15;
pub(super) const SLUR_MIN_HEIGHT: f64 = 5.0;
pub(super) const SLUR_MAX_HEIGHT: f64 = 25.0;
pub(super) const WEDGE_OFFSET: f64 = 18.0;
pub(super) const WEDGE_OPENING: f64 = 10.0;
pub(super) const PEDAL_OFFSET: f64 = 30.0;
pub(super) const PEDAL_BRACKET_HEIGHT: f64 = 8.0;
pub(super) const PEDAL_FONT_SIZE: f64 = 13.0;
pub(super) const PEDAL_NOTCH_WIDTH: f64 = 4.0;
pub(super) const CURVE_STUB_WIDTH: f64 = 20.0;
pub(super) const SPANNER_LINE_WIDTH: f64 = 1.0;

// ── Text ────────────────────────────────────────────────────────────
pub(super) const TEXT_CHAR_WIDTH_FACTOR: f64 = 0.55;
pub(super) const MEASURE_NUMBER_FONT_SIZE: f64 = 11.0;
pub(super) const ANNOTATION_FONT_SIZE: f64 = 12.0;
pub(super) const ANNOTATION_OFFSET: f64 = 12.0;
pub(super) const MULTI_REST_FONT_SIZE: f64 = 16.0;
pub(super) const GAP_FONT_SIZE: f64 = 13.0;

// ── Colors ──────────────────────────────────────────────────────────
pub(super) const NOTE_COLOR: &str = "#1a1a1a";
pub(super) const STAFF_COLOR: &str = "#555555";
pub(super) const BARLINE_COLOR: &str = "#333333";
pub(super) const TEXT_COLOR: &str = "#1a1a1a";
pub(super) const MEASURE_NUMBER_COLOR: &str = "#555555";
