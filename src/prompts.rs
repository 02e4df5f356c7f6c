//! Prompts sent to the vision model.
//!
//! The instruction is fixed; only the trailer naming the submission kind
//! and mime type changes per call.

/// Transcription instruction.
pub const VISION_PROMPT: &str = "Transcribe the exact visible text as Markdown.
- Verbatim OCR: do not summarize or invent structure.
- No placeholders, no fabrications, no disclaimers.
- Preserve line breaks; omit decorative headers/footers.";

/// Closing line asking for readable text only.
const TRAILER: &str =
    "If the content is an image or a scanned PDF page, return only the text you can read.";

/// Full prompt for one submission.
pub fn vision_prompt(kind: &str, mime_type: &str) -> String {
    let kind = if kind.is_empty() { "unknown" } else { kind };
    let mime_type = if mime_type.is_empty() { "n/a" } else { mime_type };
    format!("{VISION_PROMPT}\n\nInput kind: {kind}; mime: {mime_type}.\n{TRAILER}")
}
