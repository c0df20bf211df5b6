//! Text reconstruction: from an unordered word list to readable text.
//!
//! The service emits words grouped by its own layout analysis, but the
//! emission order does not always match visual reading order, and callers
//! need line and paragraph structure the flat list does not carry. Three
//! modes trade robustness against fidelity:
//!
//! * **Sequential** — server-emission order, each word joined by its own
//!   separator. Deterministic for any input; the fallback whenever geometry
//!   is missing or unusable, and the better choice for heavily rotated text.
//! * **Smart** — words grouped into visual lines by vertical proximity of
//!   their centers, lines ordered top-to-bottom, words within a line
//!   left-to-right. Proximity is evaluated axis-aligned, so accuracy
//!   degrades as rotation grows; the angle tolerance keeps words of
//!   different orientations out of the same line.
//! * **Blocks** — smart lines clustered into paragraphs by bounding-box
//!   proximity and horizontal overlap, for multi-region sources such as
//!   panelled images.
//!
//! Every mode maps empty input to empty output; nothing here returns an
//! error.

use crate::annotation::{
    join_words, BlockAnnotation, Geometry, LineAnnotation, WordAnnotation,
};
use crate::config::ReconstructionMode;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Two words share a line when their vertical center distance is below this
/// fraction of the smaller word's height.
const LINE_MERGE_FACTOR: f64 = 0.6;

/// Maximum rotation difference, in radians, for two words to share a line
/// (about 10 degrees).
const ANGLE_TOLERANCE_RAD: f64 = 0.175;

/// A line joins a block when the vertical gap to the block's lower edge is
/// below this multiple of the block's mean line height.
const BLOCK_GAP_FACTOR: f64 = 1.4;

/// Minimum horizontal overlap ratio (of the narrower box) for a line to
/// join a block.
const MIN_HORIZONTAL_OVERLAP: f64 = 0.25;

/// The complete product of one reconstruction pass.
#[derive(Debug, Clone, Default)]
pub struct Reconstruction {
    pub full_text: String,
    pub lines: Vec<LineAnnotation>,
    pub blocks: Vec<BlockAnnotation>,
}

/// Run the configured mode over the flat word list.
///
/// Smart and Blocks degrade to sequential text (with empty line/block lists)
/// when any word lacks usable geometry — degraded output over failure.
pub fn reconstruct(
    words: &[WordAnnotation],
    mode: ReconstructionMode,
    preserve_line_breaks: bool,
) -> Reconstruction {
    if words.is_empty() {
        return Reconstruction::default();
    }

    match mode {
        ReconstructionMode::Sequential => Reconstruction {
            full_text: sequential(words),
            ..Default::default()
        },
        ReconstructionMode::Smart => match smart_lines(words) {
            Some(lines) => Reconstruction {
                full_text: render_lines(&lines, preserve_line_breaks),
                lines,
                blocks: Vec::new(),
            },
            None => degrade(words),
        },
        ReconstructionMode::Blocks => match smart_lines(words) {
            Some(lines) => {
                let blocks = cluster_blocks(&lines);
                Reconstruction {
                    full_text: render_blocks(&blocks, preserve_line_breaks),
                    lines,
                    blocks,
                }
            }
            None => degrade(words),
        },
    }
}

fn degrade(words: &[WordAnnotation]) -> Reconstruction {
    warn!("Word geometry missing or malformed, degrading to sequential order");
    Reconstruction {
        full_text: sequential(words),
        ..Default::default()
    }
}

// ── Sequential ────────────────────────────────────────────────────────────

static RE_SPACE_BEFORE_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+([,.!?;:])").expect("static regex"));
static RE_SPACE_AFTER_OPEN_QUOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([«“"'(\[])\s+"#).expect("static regex"));
static RE_SPACE_BEFORE_CLOSE_QUOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\s+([»”)\]])"#).expect("static regex"));

/// Concatenate words in server-emission order using each word's separator.
///
/// Word order is preserved exactly; the cleanup passes only tighten
/// whitespace around punctuation and quotes that separator-joining tends to
/// leave behind.
pub fn sequential(words: &[WordAnnotation]) -> String {
    let joined = join_words(words);
    let s = RE_SPACE_BEFORE_PUNCT.replace_all(&joined, "$1");
    let s = RE_SPACE_AFTER_OPEN_QUOTE.replace_all(&s, "$1");
    let s = RE_SPACE_BEFORE_CLOSE_QUOTE.replace_all(&s, "$1");
    s.trim().to_string()
}

// ── Smart line reconstruction ─────────────────────────────────────────────

struct LineBuilder {
    words: Vec<(WordAnnotation, Geometry)>,
    sum_center_y: f64,
    sum_rotation: f64,
    min_height: f64,
}

impl LineBuilder {
    fn seed(word: &WordAnnotation, g: Geometry) -> Self {
        Self {
            words: vec![(word.clone(), g)],
            sum_center_y: g.center_y,
            sum_rotation: g.rotation,
            min_height: g.height,
        }
    }

    fn mean_center_y(&self) -> f64 {
        self.sum_center_y / self.words.len() as f64
    }

    fn mean_rotation(&self) -> f64 {
        self.sum_rotation / self.words.len() as f64
    }

    /// Vertical distance from this line's running mean, when the word is
    /// admissible; `None` when it is not.
    fn admission_distance(&self, g: Geometry) -> Option<f64> {
        let dy = (g.center_y - self.mean_center_y()).abs();
        let threshold = LINE_MERGE_FACTOR * g.height.min(self.min_height);
        let angle_ok = (g.rotation - self.mean_rotation()).abs() <= ANGLE_TOLERANCE_RAD;
        (dy < threshold && angle_ok).then_some(dy)
    }

    fn push(&mut self, word: &WordAnnotation, g: Geometry) {
        self.sum_center_y += g.center_y;
        self.sum_rotation += g.rotation;
        self.min_height = self.min_height.min(g.height);
        self.words.push((word.clone(), g));
    }

    fn finish(mut self) -> LineAnnotation {
        self.words.sort_by(|(_, a), (_, b)| {
            a.center_x.partial_cmp(&b.center_x).expect("finite center_x")
        });
        let geometry = aggregate(self.words.iter().map(|(_, g)| *g));
        LineAnnotation {
            words: self.words.into_iter().map(|(w, _)| w).collect(),
            geometry,
        }
    }
}

/// Group words into visual lines by vertical proximity.
///
/// Returns `None` when any word lacks finite geometry, in which case the
/// caller degrades to sequential order. The grouping compares only
/// *relative* vertical distances, so the result is invariant under a
/// uniform vertical translation of every word.
pub fn smart_lines(words: &[WordAnnotation]) -> Option<Vec<LineAnnotation>> {
    if words.is_empty() {
        return Some(Vec::new());
    }

    let geometries: Option<Vec<Geometry>> = words
        .iter()
        .map(|w| w.geometry.filter(Geometry::is_well_formed))
        .collect();
    let geometries = geometries?;

    let mut builders: Vec<LineBuilder> = Vec::new();
    for (word, &g) in words.iter().zip(&geometries) {
        // Best (closest) admissible line wins, not the first one scanned.
        let best = builders
            .iter_mut()
            .filter_map(|b| b.admission_distance(g).map(|d| (d, b)))
            .min_by(|(a, _), (b, _)| a.partial_cmp(b).expect("finite distance"));
        match best {
            Some((_, builder)) => builder.push(word, g),
            None => builders.push(LineBuilder::seed(word, g)),
        }
    }

    let mut keyed: Vec<(f64, LineAnnotation)> = builders
        .into_iter()
        .map(|b| (b.mean_center_y(), b.finish()))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| a.partial_cmp(b).expect("finite center_y"));
    Some(keyed.into_iter().map(|(_, line)| line).collect())
}

// ── Block clustering ──────────────────────────────────────────────────────

struct BlockBuilder {
    lines: Vec<LineAnnotation>,
    sum_line_height: f64,
}

impl BlockBuilder {
    fn seed(line: &LineAnnotation) -> Self {
        Self {
            sum_line_height: line.geometry.height,
            lines: vec![line.clone()],
        }
    }

    fn mean_line_height(&self) -> f64 {
        self.sum_line_height / self.lines.len() as f64
    }

    fn bottom(&self) -> f64 {
        let g = self.lines.last().expect("block has lines").geometry;
        g.center_y + g.height / 2.0
    }

    fn admits(&self, line: &LineAnnotation) -> bool {
        let g = line.geometry;
        let gap = (g.center_y - g.height / 2.0) - self.bottom();
        if gap >= BLOCK_GAP_FACTOR * self.mean_line_height() {
            return false;
        }
        let last = self.lines.last().expect("block has lines").geometry;
        horizontal_overlap(last, g) >= MIN_HORIZONTAL_OVERLAP
    }

    fn push(&mut self, line: &LineAnnotation) {
        self.sum_line_height += line.geometry.height;
        self.lines.push(line.clone());
    }

    fn finish(self) -> BlockAnnotation {
        let geometry = aggregate(self.lines.iter().map(|l| l.geometry));
        BlockAnnotation {
            lines: self.lines,
            geometry,
        }
    }
}

/// Cluster already-ordered lines into paragraph blocks.
///
/// Lines must arrive top-to-bottom (as [`smart_lines`] produces them); each
/// line joins the first open block it is adjacent to, otherwise opens a new
/// one. Blocks come out ordered by their aggregate vertical center.
pub fn cluster_blocks(lines: &[LineAnnotation]) -> Vec<BlockAnnotation> {
    let mut builders: Vec<BlockBuilder> = Vec::new();
    for line in lines {
        match builders.iter_mut().find(|b| b.admits(line)) {
            Some(builder) => builder.push(line),
            None => builders.push(BlockBuilder::seed(line)),
        }
    }

    let mut blocks: Vec<BlockAnnotation> = builders.into_iter().map(BlockBuilder::finish).collect();
    blocks.sort_by(|a, b| {
        a.geometry
            .center_y
            .partial_cmp(&b.geometry.center_y)
            .expect("finite center_y")
    });
    blocks
}

// ── Rendering ─────────────────────────────────────────────────────────────

/// Render lines as text, either one per visual line or collapsed into a
/// single separator-joined string.
pub fn render_lines(lines: &[LineAnnotation], preserve_line_breaks: bool) -> String {
    if preserve_line_breaks {
        lines
            .iter()
            .map(LineAnnotation::text)
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        let words: Vec<WordAnnotation> = lines
            .iter()
            .flat_map(|l| l.words.iter().cloned())
            .collect();
        sequential(&words)
    }
}

/// Render blocks as text: blank line between blocks when line breaks are
/// preserved, otherwise a single separator-joined string in block order.
pub fn render_blocks(blocks: &[BlockAnnotation], preserve_line_breaks: bool) -> String {
    if preserve_line_breaks {
        blocks
            .iter()
            .map(BlockAnnotation::text)
            .collect::<Vec<_>>()
            .join("\n\n")
    } else {
        let words: Vec<WordAnnotation> = blocks
            .iter()
            .flat_map(|b| &b.lines)
            .flat_map(|l| l.words.iter().cloned())
            .collect();
        sequential(&words)
    }
}

/// Axis-aligned union of the given geometries, with mean rotation.
fn aggregate(geometries: impl Iterator<Item = Geometry>) -> Geometry {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    let mut sum_rotation = 0.0;
    let mut count = 0usize;

    for g in geometries {
        min_x = min_x.min(g.center_x - g.width / 2.0);
        max_x = max_x.max(g.center_x + g.width / 2.0);
        min_y = min_y.min(g.center_y - g.height / 2.0);
        max_y = max_y.max(g.center_y + g.height / 2.0);
        sum_rotation += g.rotation;
        count += 1;
    }

    if count == 0 {
        return Geometry {
            center_x: 0.0,
            center_y: 0.0,
            width: 0.0,
            height: 0.0,
            rotation: 0.0,
            confidence: None,
        };
    }

    Geometry {
        center_x: (min_x + max_x) / 2.0,
        center_y: (min_y + max_y) / 2.0,
        width: max_x - min_x,
        height: max_y - min_y,
        rotation: sum_rotation / count as f64,
        confidence: None,
    }
}

fn horizontal_overlap(a: Geometry, b: Geometry) -> f64 {
    let a_left = a.center_x - a.width / 2.0;
    let a_right = a.center_x + a.width / 2.0;
    let b_left = b.center_x - b.width / 2.0;
    let b_right = b.center_x + b.width / 2.0;
    let overlap = a_right.min(b_right) - a_left.max(b_left);
    let narrower = a.width.min(b.width);
    if narrower <= 0.0 {
        return 0.0;
    }
    (overlap / narrower).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_at(text: &str, x: f64, y: f64, angle: f64) -> WordAnnotation {
        WordAnnotation {
            text: text.to_string(),
            separator: Some(" ".to_string()),
            geometry: Some(Geometry {
                center_x: x,
                center_y: y,
                width: 0.08,
                height: 0.05,
                rotation: angle,
                confidence: None,
            }),
        }
    }

    fn shift_y(words: &[WordAnnotation], dy: f64) -> Vec<WordAnnotation> {
        words
            .iter()
            .map(|w| {
                let mut w = w.clone();
                if let Some(ref mut g) = w.geometry {
                    g.center_y += dy;
                }
                w
            })
            .collect()
    }

    #[test]
    fn sequential_preserves_emission_order_exactly() {
        // Geometry says "World" comes first; sequential must not care.
        let words = vec![word_at("Hello", 0.9, 0.9, 0.0), word_at("World", 0.1, 0.1, 0.0)];
        assert_eq!(sequential(&words), "Hello World");
    }

    #[test]
    fn sequential_tightens_punctuation() {
        let words = vec![
            word_at("Hello", 0.1, 0.1, 0.0),
            word_at(",", 0.2, 0.1, 0.0),
            word_at("world", 0.3, 0.1, 0.0),
            word_at("!", 0.4, 0.1, 0.0),
        ];
        assert_eq!(sequential(&words), "Hello, world!");
    }

    #[test]
    fn two_words_on_one_visual_line() {
        let words = vec![word_at("Hello", 0.10, 0.10, 0.0), word_at("World", 0.30, 0.10, 0.0)];
        let lines = smart_lines(&words).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text(), "Hello World");
    }

    #[test]
    fn vertically_separated_words_form_ordered_lines() {
        // Emitted bottom line first; smart must reorder top-to-bottom.
        let words = vec![word_at("below", 0.10, 0.50, 0.0), word_at("above", 0.10, 0.10, 0.0)];
        let lines = smart_lines(&words).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text(), "above");
        assert_eq!(lines[1].text(), "below");
    }

    #[test]
    fn words_within_a_line_sort_left_to_right() {
        let words = vec![
            word_at("World", 0.30, 0.101, 0.0),
            word_at("Hello", 0.10, 0.099, 0.0),
        ];
        let lines = smart_lines(&words).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text(), "Hello World");
    }

    #[test]
    fn rotation_difference_splits_lines() {
        // Same vertical band, one word rotated 45 degrees.
        let words = vec![
            word_at("flat", 0.10, 0.10, 0.0),
            word_at("tilted", 0.30, 0.10, std::f64::consts::FRAC_PI_4),
        ];
        let lines = smart_lines(&words).unwrap();
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn smart_is_invariant_under_vertical_translation() {
        let words = vec![
            word_at("a", 0.10, 0.10, 0.0),
            word_at("b", 0.25, 0.11, 0.0),
            word_at("c", 0.10, 0.30, 0.0),
            word_at("d", 0.40, 0.52, 0.0),
        ];
        let original = reconstruct(&words, ReconstructionMode::Smart, true);
        let shifted = reconstruct(&shift_y(&words, 0.37), ReconstructionMode::Smart, true);
        assert_eq!(original.full_text, shifted.full_text);
        assert_eq!(original.lines.len(), shifted.lines.len());
    }

    #[test]
    fn missing_geometry_degrades_to_sequential() {
        let mut words = vec![word_at("first", 0.9, 0.9, 0.0), word_at("second", 0.1, 0.1, 0.0)];
        words[1].geometry = None;
        let r = reconstruct(&words, ReconstructionMode::Smart, true);
        assert_eq!(r.full_text, "first second");
        assert!(r.lines.is_empty());
    }

    #[test]
    fn non_finite_geometry_degrades_to_sequential() {
        let mut words = vec![word_at("a", 0.1, 0.1, 0.0)];
        words[0].geometry.as_mut().unwrap().center_y = f64::NAN;
        let r = reconstruct(&words, ReconstructionMode::Smart, true);
        assert_eq!(r.full_text, "a");
    }

    #[test]
    fn empty_input_is_empty_output_in_all_modes() {
        for mode in [
            ReconstructionMode::Sequential,
            ReconstructionMode::Smart,
            ReconstructionMode::Blocks,
        ] {
            let r = reconstruct(&[], mode, true);
            assert_eq!(r.full_text, "");
            assert!(r.lines.is_empty());
            assert!(r.blocks.is_empty());
        }
    }

    #[test]
    fn adjacent_overlapping_lines_share_a_block() {
        // Two columns: left column has two adjacent lines, right column one
        // line far to the side.
        let words = vec![
            word_at("left1", 0.15, 0.10, 0.0),
            word_at("left2", 0.15, 0.16, 0.0),
            word_at("right", 0.80, 0.10, 0.0),
        ];
        let r = reconstruct(&words, ReconstructionMode::Blocks, true);
        assert_eq!(r.blocks.len(), 2);
        let texts: Vec<String> = r.blocks.iter().map(BlockAnnotation::text).collect();
        assert!(texts.contains(&"left1\nleft2".to_string()), "got {texts:?}");
        assert!(texts.contains(&"right".to_string()));
    }

    #[test]
    fn distant_lines_split_into_blocks() {
        let words = vec![word_at("top", 0.10, 0.10, 0.0), word_at("bottom", 0.10, 0.70, 0.0)];
        let r = reconstruct(&words, ReconstructionMode::Blocks, true);
        assert_eq!(r.blocks.len(), 2);
        assert_eq!(r.full_text, "top\n\nbottom");
    }

    #[test]
    fn block_geometry_aggregates_member_lines() {
        let words = vec![
            word_at("a", 0.10, 0.10, 0.0),
            word_at("b", 0.30, 0.10, 0.0),
            word_at("c", 0.10, 0.16, 0.0),
        ];
        let r = reconstruct(&words, ReconstructionMode::Blocks, true);
        assert_eq!(r.blocks.len(), 1);
        let g = r.blocks[0].geometry;
        // Union spans x 0.06..0.34 and y 0.075..0.185.
        assert!((g.width - 0.28).abs() < 1e-9, "width {}", g.width);
        assert!((g.height - 0.11).abs() < 1e-9, "height {}", g.height);
    }

    #[test]
    fn collapsed_rendering_joins_in_reading_order() {
        let words = vec![
            word_at("below", 0.10, 0.50, 0.0),
            word_at("above", 0.10, 0.10, 0.0),
        ];
        let r = reconstruct(&words, ReconstructionMode::Smart, false);
        assert_eq!(r.full_text, "above below");
    }
}
