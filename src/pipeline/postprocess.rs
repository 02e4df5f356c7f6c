//! Post-processing of the model's raw answer.
//!
//! Models sometimes wrap the whole transcription in a code fence despite the
//! prompt. Only that outer fence is removed; everything else is the model's
//! text and passes through untouched.

/// Remove one outer code fence.
///
/// Applies when the trimmed text starts and ends with ```` ``` ````, spans at
/// least three lines, and its last line is exactly ```` ``` ````. The opening
/// line (with any info string such as `markdown`) and the closing line are
/// dropped and the inner text is trimmed. Anything else is returned as given.
pub fn unwrap_fenced(raw: &str) -> String {
    let text = raw.trim();
    if text.starts_with("```") && text.ends_with("```") {
        let lines: Vec<&str> = text.lines().collect();
        if lines.len() >= 3 && lines[lines.len() - 1].trim() == "```" {
            return lines[1..lines.len() - 1].join("\n").trim().to_string();
        }
    }
    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fence() {
        let raw = "```markdown\n# Title\n\nBody text\n```";
        assert_eq!(unwrap_fenced(raw), "# Title\n\nBody text");
    }

    #[test]
    fn strips_bare_fence_with_padding() {
        let raw = "\n  ```\n  x = 1  \n```\n";
        assert_eq!(unwrap_fenced(raw), "x = 1");
    }

    #[test]
    fn unfenced_passes_through_unchanged() {
        let raw = "  # Title\n\nno fence here \n";
        assert_eq!(unwrap_fenced(raw), raw);
    }

    #[test]
    fn two_line_fence_is_not_unwrapped() {
        assert_eq!(unwrap_fenced("```\n```"), "```\n```");
    }

    #[test]
    fn inline_closing_fence_is_not_unwrapped() {
        let raw = "```\ncode\nmore```";
        assert_eq!(unwrap_fenced(raw), raw);
    }

    #[test]
    fn empty_fence_yields_empty_text() {
        assert_eq!(unwrap_fenced("```\n   \n```"), "");
    }
}
