//! Submission snapshots handed to the pipeline, and their merged view.
//!
//! A [`SubmissionRef`] is what the platform stored; a [`JobPayload`] is what
//! the job queue carried. [`ResolvedSubmission::merge`] folds the two once
//! per invocation: every present, non-blank payload field wins.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Submission kind as stored by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionKind {
    Text,
    Image,
    Pdf,
    /// Generic upload; the mime type decides how it is handled.
    #[default]
    #[serde(other)]
    File,
}

impl SubmissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionKind::Text => "text",
            SubmissionKind::Image => "image",
            SubmissionKind::Pdf => "pdf",
            SubmissionKind::File => "file",
        }
    }
}

/// The mime types that can be sent to a vision model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportedMime {
    Jpeg,
    Png,
    Pdf,
}

impl SupportedMime {
    /// Exact (case-insensitive) match; parameters such as `; charset=` are
    /// not accepted.
    pub fn parse(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" => Some(SupportedMime::Jpeg),
            "image/png" => Some(SupportedMime::Png),
            "application/pdf" => Some(SupportedMime::Pdf),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SupportedMime::Jpeg => "image/jpeg",
            SupportedMime::Png => "image/png",
            SupportedMime::Pdf => "application/pdf",
        }
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self, SupportedMime::Pdf)
    }
}

/// Immutable snapshot of a stored submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRef {
    pub id: String,
    #[serde(default)]
    pub course_id: String,
    #[serde(default)]
    pub task_id: String,
    #[serde(default, alias = "student_sub")]
    pub student_id: String,
    #[serde(default)]
    pub kind: SubmissionKind,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub storage_key: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub text_body: Option<String>,
    /// Opaque platform metadata; may hold an ordered `page_keys` list.
    #[serde(default)]
    pub internal_metadata: Option<Map<String, Value>>,
}

/// Transport-level overrides carried by the job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub storage_key: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub text_body: Option<String>,
    #[serde(default)]
    pub text_md: Option<String>,
}

/// Merge of [`SubmissionRef`] and [`JobPayload`], computed once.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSubmission {
    pub id: String,
    pub course_id: String,
    pub task_id: String,
    pub student_id: String,
    pub kind: SubmissionKind,
    pub mime_type: String,
    pub storage_key: Option<String>,
    pub size_bytes: Option<u64>,
    pub sha256: Option<String>,
    pub text: Option<String>,
    pub page_keys: Vec<String>,
}

impl ResolvedSubmission {
    pub fn merge(submission: &SubmissionRef, payload: &JobPayload) -> Self {
        let text = first_filled([
            payload.text_md.as_deref(),
            payload.text_body.as_deref(),
            submission.text_body.as_deref(),
        ]);
        Self {
            id: submission.id.trim().to_string(),
            course_id: submission.course_id.trim().to_string(),
            task_id: submission.task_id.trim().to_string(),
            student_id: submission.student_id.trim().to_string(),
            kind: submission.kind,
            mime_type: first_filled([
                payload.mime_type.as_deref(),
                submission.mime_type.as_deref(),
            ])
            .unwrap_or_default(),
            storage_key: first_filled([
                payload.storage_key.as_deref(),
                submission.storage_key.as_deref(),
            ]),
            size_bytes: payload.size_bytes.or(submission.size_bytes),
            sha256: first_filled([payload.sha256.as_deref(), submission.sha256.as_deref()]),
            text,
            page_keys: page_keys(submission.internal_metadata.as_ref()),
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind == SubmissionKind::Text
    }

    /// All four identifiers needed for the deterministic derived layout.
    pub fn has_layout_ids(&self) -> bool {
        [&self.id, &self.course_id, &self.task_id, &self.student_id]
            .iter()
            .all(|s| !s.is_empty())
    }
}

fn first_filled<const N: usize>(candidates: [Option<&str>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Ordered, non-blank string entries of `internal_metadata.page_keys`.
fn page_keys(metadata: Option<&Map<String, Value>>) -> Vec<String> {
    metadata
        .and_then(|m| m.get("page_keys"))
        .and_then(Value::as_array)
        .map(|keys| {
            keys.iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn submission() -> SubmissionRef {
        serde_json::from_value(json!({
            "id": "sub-1",
            "course_id": "c1",
            "task_id": "t1",
            "student_sub": "stud-9",
            "kind": "pdf",
            "mime_type": "application/pdf",
            "storage_key": "submissions/c1/t1/stud-9/scan.pdf",
            "size_bytes": 42,
            "internal_metadata": {"page_keys": ["a/page_0001.png", " ", 7, "a/page_0002.png"]}
        }))
        .unwrap()
    }

    #[test]
    fn deserialises_with_alias() {
        let s = submission();
        assert_eq!(s.student_id, "stud-9");
        assert_eq!(s.kind, SubmissionKind::Pdf);
    }

    #[test]
    fn unknown_kind_is_file() {
        let s: SubmissionRef = serde_json::from_value(json!({"id": "x", "kind": "audio"})).unwrap();
        assert_eq!(s.kind, SubmissionKind::File);
    }

    #[test]
    fn payload_overrides_present_fields_only() {
        let payload = JobPayload {
            mime_type: Some("image/png".into()),
            storage_key: Some("   ".into()),
            ..Default::default()
        };
        let r = ResolvedSubmission::merge(&submission(), &payload);
        assert_eq!(r.mime_type, "image/png");
        assert_eq!(r.storage_key.as_deref(), Some("submissions/c1/t1/stud-9/scan.pdf"));
        assert_eq!(r.size_bytes, Some(42));
    }

    #[test]
    fn text_prefers_payload_markdown() {
        let mut s = submission();
        s.text_body = Some("stored".into());
        let payload = JobPayload {
            text_md: Some("  # from job ".into()),
            ..Default::default()
        };
        let r = ResolvedSubmission::merge(&s, &payload);
        assert_eq!(r.text.as_deref(), Some("# from job"));
    }

    #[test]
    fn page_keys_keep_order_and_drop_junk() {
        let r = ResolvedSubmission::merge(&submission(), &JobPayload::default());
        assert_eq!(r.page_keys, vec!["a/page_0001.png", "a/page_0002.png"]);
        assert!(r.has_layout_ids());
    }

    #[test]
    fn mime_parsing() {
        assert_eq!(SupportedMime::parse(" IMAGE/PNG "), Some(SupportedMime::Png));
        assert_eq!(SupportedMime::parse("application/pdf"), Some(SupportedMime::Pdf));
        assert_eq!(SupportedMime::parse("image/gif"), None);
        assert_eq!(SupportedMime::parse(""), None);
    }
}
