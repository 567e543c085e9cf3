//! System directive and user-message text for the markup requests.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing the reply shape the model is
//!    asked for (marker tokens, coordinate order) requires editing exactly
//!    one place, and the scraper's markers in
//!    [`crate::pipeline::scrape`] stay visibly in sync with it.
//!
//! 2. **Testability** — unit tests can import and inspect prompts directly
//!    without spinning up a real VLM.
//!
//! Callers can override the directive via
//! [`crate::config::MarkupConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

/// Default system directive for a page markup request.
///
/// The reply contract is free text by design: one line per suggested
/// annotation, carrying a `bbox:` marker with four coordinates and a
/// `comment:` marker with the note. The scraper tolerates anything else the
/// model says around those lines.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a document analyst skilled in markups. You are shown one page of a PDF as an image, together with the user's markup instruction.

Respond with one line per area to annotate, in exactly this shape:

bbox: (x0, y0, x1, y1) comment: <short note>

Coordinates are in page points with the origin at the top-left of the page, x0 < x1 and y0 < y1. Write nothing on a line except the bbox and the comment. If nothing on the page matches the instruction, say so in plain text without using the word bbox."#;

/// Build the user-message text that accompanies the page image.
///
/// The instruction is the entire user-supplied content; the image rides
/// alongside it as an attachment, so no extra framing is needed beyond a
/// plain restatement.
pub fn user_message(instruction: &str) -> String {
    instruction.trim().to_string()
}
