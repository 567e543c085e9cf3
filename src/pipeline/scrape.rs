//! Response scraping: pull annotation candidates out of the model's free text.
//!
//! The reply contract is loose by design. The directive asks for lines of the
//! shape `bbox: (x0, y0, x1, y1) comment: <note>` but nothing enforces it,
//! so this module treats the reply as untrusted prose and extracts what it
//! can:
//!
//! - A line is a candidate iff it contains the substring `bbox`.
//! - The text between the `bbox:` marker and the next `comment` token must
//!   tokenize as exactly four comma-separated numeric literals, with optional
//!   surrounding parentheses. Nothing else is accepted: no arithmetic, no
//!   identifiers, no extra values. The coordinates are never evaluated, only
//!   matched.
//! - The text after the `comment:` marker, trimmed, is the note.
//! - Any failure (missing marker, wrong arity, malformed number, degenerate
//!   rectangle) skips the line with one [`ParseWarning`] and scanning
//!   continues. A bad line never blocks later lines.
//!
//! One pass, line order preserved, candidates per page unbounded.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Marker that promotes a line to candidate status.
const BBOX_SUBSTRING: &str = "bbox";
/// Marker that opens the coordinate group.
const BBOX_MARKER: &str = "bbox:";
/// Token that closes the coordinate group.
const COMMENT_TOKEN: &str = "comment";
/// Marker that opens the note text.
const COMMENT_MARKER: &str = "comment:";

/// Exactly four comma-separated numeric literals, optional parentheses.
///
/// Anchored on both ends so trailing garbage inside the group (units, stray
/// operators, a fifth number) fails the match instead of being ignored.
static RE_COORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)^\s*\(?\s*
          ([-+]?(?:\d+\.?\d*|\.\d+))\s*,\s*
          ([-+]?(?:\d+\.?\d*|\.\d+))\s*,\s*
          ([-+]?(?:\d+\.?\d*|\.\d+))\s*,\s*
          ([-+]?(?:\d+\.?\d*|\.\d+))\s*
          \)?\s*$",
    )
    .expect("coordinate regex is valid")
});

/// An axis-aligned rectangle in page points, top-left origin.
///
/// Construction enforces the usability invariant `x0 < x1 && y0 < y1`; a
/// rectangle that exists is always drawable. Whether it lies inside the page
/// is deliberately NOT checked here (see
/// [`crate::config::BoundsPolicy`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    /// Build a rectangle, rejecting degenerate or inverted coordinates.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Option<Self> {
        if x0 < x1 && y0 < y1 && [x0, y0, x1, y1].iter().all(|v| v.is_finite()) {
            Some(Self { x0, y0, x1, y1 })
        } else {
            None
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// Clamp to a `width × height` page box, preserving the invariant.
    ///
    /// Returns `None` when the rectangle lies entirely off-page, since
    /// clamping would collapse it to a zero-area sliver.
    pub fn clamped_to(&self, width: f64, height: f64) -> Option<Self> {
        Rect::new(
            self.x0.clamp(0.0, width),
            self.y0.clamp(0.0, height),
            self.x1.clamp(0.0, width),
            self.y1.clamp(0.0, height),
        )
    }
}

/// One extracted (rectangle, comment) pair, ready for the markup writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationCandidate {
    pub rect: Rect,
    pub comment: String,
}

/// Why a candidate line was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseFailure {
    /// The line mentions `bbox` but carries no `bbox:` marker.
    MissingBboxMarker,
    /// No `comment:` marker follows the coordinates.
    MissingCommentMarker,
    /// The coordinate group is not four comma-separated numeric literals.
    BadCoordinates,
    /// Four numbers parsed but `x0 < x1 && y0 < y1` does not hold.
    DegenerateRect,
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            ParseFailure::MissingBboxMarker => "no 'bbox:' marker",
            ParseFailure::MissingCommentMarker => "no 'comment:' marker",
            ParseFailure::BadCoordinates => "expected four comma-separated numbers",
            ParseFailure::DegenerateRect => "rectangle has zero or negative extent",
        };
        f.write_str(msg)
    }
}

/// A skipped candidate line, kept verbatim for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseWarning {
    /// The offending line, untrimmed.
    pub line: String,
    pub reason: ParseFailure,
}

/// The result of scraping one page's reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapeOutcome {
    /// Candidates in line order.
    pub candidates: Vec<AnnotationCandidate>,
    /// Skipped lines, in line order.
    pub warnings: Vec<ParseWarning>,
}

/// Scan a model reply for annotation candidates.
///
/// Lines without the `bbox` substring are ignored silently — prose like
/// "no issues found" yields neither candidates nor warnings.
pub fn scrape_response(page_num: usize, response: &str) -> ScrapeOutcome {
    let mut outcome = ScrapeOutcome::default();

    for line in response.lines() {
        if !line.contains(BBOX_SUBSTRING) {
            continue;
        }
        match parse_candidate_line(line) {
            Ok(candidate) => outcome.candidates.push(candidate),
            Err(reason) => {
                warn!("Page {}: could not parse line ({}): {}", page_num, reason, line);
                outcome.warnings.push(ParseWarning {
                    line: line.to_string(),
                    reason,
                });
            }
        }
    }

    outcome
}

/// Parse one candidate line into a candidate, or say why it failed.
fn parse_candidate_line(line: &str) -> Result<AnnotationCandidate, ParseFailure> {
    let bbox_at = line.find(BBOX_MARKER).ok_or(ParseFailure::MissingBboxMarker)?;
    let after_bbox = &line[bbox_at + BBOX_MARKER.len()..];

    // The coordinate group runs up to the next `comment` token; the note
    // itself starts after `comment:`. Searching the whole line for the note
    // marker tolerates models that write `comments:` or similar around the
    // coordinate group.
    let group = match after_bbox.find(COMMENT_TOKEN) {
        Some(i) => &after_bbox[..i],
        None => after_bbox,
    };

    let comment_at = line
        .find(COMMENT_MARKER)
        .ok_or(ParseFailure::MissingCommentMarker)?;
    let comment = line[comment_at + COMMENT_MARKER.len()..].trim();

    let caps = RE_COORDS
        .captures(group)
        .ok_or(ParseFailure::BadCoordinates)?;

    let mut nums = [0f64; 4];
    for (slot, cap) in nums.iter_mut().zip(caps.iter().skip(1)) {
        let text = cap.ok_or(ParseFailure::BadCoordinates)?.as_str();
        *slot = text.parse().map_err(|_| ParseFailure::BadCoordinates)?;
    }

    let rect =
        Rect::new(nums[0], nums[1], nums[2], nums[3]).ok_or(ParseFailure::DegenerateRect)?;

    Ok(AnnotationCandidate {
        rect,
        comment: comment.to_string(),
    })
}

// ── Tests ────────────────────────────────────────────────────────────────────
