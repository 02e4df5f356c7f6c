//! Derived PDF cache: produce one stitched composite per PDF submission.
//!
//! ## Tiers
//!
//! ```text
//!  CachedStitched ──miss──► PageKeys ──miss──► PageDirectory ──miss──► RenderOriginal ──miss──► pdf_images_unavailable
//!       │                      │                    │                       │
//!       ▼                      ▼                    ▼                       ▼
//!    return             stitch + persist     stitch + persist      render + stitch + persist
//! ```
//!
//! The first tier that yields a non-empty composite wins, and every producing
//! tier persists `stitched.png` so the next call for the same submission is a
//! [`CacheTier::CachedStitched`] hit with no fetch and no render.
//!
//! Tiers are best-effort: unreadable files, failed stitches and failed renders
//! degrade to the next tier. Only an escaping storage key or an original
//! whose size/hash contradicts the submission aborts, and that is permanent.
//!
//! ## Layout
//!
//! ```text
//! <root>/<bucket>/<course>/<task>/<student>/derived/<submission>/stitched.png
//! <root>/<bucket>/<course>/<task>/<student>/derived/<submission>/page_0001.png …
//! <root>/<course>/<task>/<student>/derived/<submission>/…          (bucket-less)
//! <root>/**/derived/<submission>/…                                  (legacy, bounded scan)
//! ```
//!
//! Log lines carry the submission id, action and counts. Paths are never
//! logged because they embed student identifiers.

use crate::config::{LegacyScanLimits, VisionConfig};
use crate::error::VisionError;
use crate::pipeline::render::{PdfRenderer, RenderedPage};
use crate::pipeline::source::{Acquisition, ArtifactSourceResolver};
use crate::pipeline::stitch::PageStitcher;
use crate::security::guard_path;
use crate::storage::local::read_file_optional;
use crate::submission::ResolvedSubmission;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;
use std::ffi::OsStr;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Composite file name inside a derived directory.
pub const STITCHED_FILE: &str = "stitched.png";

/// PDF signature every original must start with before it is rendered.
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

static RE_PAGE_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^page_(\d{1,9})\.png$").unwrap());

/// The cache tiers, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTier {
    CachedStitched,
    PageKeys,
    PageDirectory,
    RenderOriginal,
}

impl CacheTier {
    pub const ORDER: [CacheTier; 4] = [
        CacheTier::CachedStitched,
        CacheTier::PageKeys,
        CacheTier::PageDirectory,
        CacheTier::RenderOriginal,
    ];

    /// `action` value logged when this tier produces the composite.
    pub fn action(&self) -> &'static str {
        match self {
            CacheTier::CachedStitched => "cached_stitched",
            CacheTier::PageKeys => "stitch_from_page_keys",
            CacheTier::PageDirectory => "stitch_from_page_dir",
            CacheTier::RenderOriginal => "render_from_original",
        }
    }

    /// Whether a composite from this tier is written back.
    pub fn persists(&self) -> bool {
        !matches!(self, CacheTier::CachedStitched)
    }
}

/// A composite and the tier that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composite {
    pub png: Vec<u8>,
    pub tier: CacheTier,
}

/// Guarded derived directories for one submission, primary first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedLocation {
    primary: PathBuf,
    fallbacks: Vec<PathBuf>,
}

impl DerivedLocation {
    /// `None` when an identifier is missing or no candidate passes the guard.
    pub fn resolve(root: &Path, bucket: &str, sub: &ResolvedSubmission) -> Option<Self> {
        if !sub.has_layout_ids() {
            return None;
        }
        let tail = format!(
            "{}/{}/{}/derived/{}",
            sub.course_id, sub.task_id, sub.student_id, sub.id
        );
        let mut dirs = [format!("{bucket}/{tail}"), tail]
            .into_iter()
            .filter_map(|rel| guard_path(root, &rel).ok());
        let primary = dirs.next()?;
        Some(Self {
            primary,
            fallbacks: dirs.collect(),
        })
    }

    pub fn primary(&self) -> &Path {
        &self.primary
    }

    pub fn stitched_path(&self) -> PathBuf {
        self.primary.join(STITCHED_FILE)
    }

    pub fn dirs(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.primary.as_path()).chain(self.fallbacks.iter().map(PathBuf::as_path))
    }
}

/// Tiered producer of stitched composites.
#[derive(Clone)]
pub struct DerivedPdfCache {
    bucket: String,
    legacy: LegacyScanLimits,
    max_local_bytes: u64,
    renderer: Arc<dyn PdfRenderer>,
    stitcher: Arc<dyn PageStitcher>,
}

impl DerivedPdfCache {
    pub fn new(
        config: &VisionConfig,
        renderer: Arc<dyn PdfRenderer>,
        stitcher: Arc<dyn PageStitcher>,
    ) -> Self {
        Self {
            bucket: config.bucket.clone(),
            legacy: config.legacy_scan,
            max_local_bytes: config.max_local_bytes,
            renderer,
            stitcher,
        }
    }

    /// Walk the tiers until one yields a composite.
    pub async fn ensure_composite(
        &self,
        sub: &ResolvedSubmission,
        sources: &ArtifactSourceResolver,
    ) -> Result<Composite, VisionError> {
        let root = sources.reader().map(|r| r.root().to_path_buf());
        let location = root
            .as_deref()
            .and_then(|root| DerivedLocation::resolve(root, &self.bucket, sub));
        if root.is_some() && location.is_none() {
            debug!(action = "missing_derived_dir", submission_id = %sub.id, "no deterministic derived location");
        }

        for tier in CacheTier::ORDER {
            let produced = match tier {
                CacheTier::CachedStitched => location
                    .as_ref()
                    .and_then(|loc| read_file_optional(&loc.stitched_path(), self.max_local_bytes)),
                CacheTier::PageKeys => match root.as_deref() {
                    Some(root) => self.from_page_keys(root, sub).await,
                    None => None,
                },
                CacheTier::PageDirectory => match root.as_deref() {
                    Some(root) => self.from_page_dirs(root, location.as_ref(), sub).await,
                    None => None,
                },
                CacheTier::RenderOriginal => self.from_original(sub, sources).await?,
            };
            let Some(png) = produced.filter(|png| !png.is_empty()) else {
                continue;
            };
            if tier.persists() {
                persist(location.as_ref(), &png, &sub.id);
            }
            info!(action = tier.action(), submission_id = %sub.id, bytes = png.len(), "pdf composite ready");
            return Ok(Composite { png, tier });
        }

        warn!(action = "pdf_images_unavailable", submission_id = %sub.id, "no composite could be produced");
        Err(VisionError::PdfImagesUnavailable)
    }

    async fn from_page_keys(&self, root: &Path, sub: &ResolvedSubmission) -> Option<Vec<u8>> {
        if sub.page_keys.is_empty() {
            return None;
        }
        let mut pages = Vec::with_capacity(sub.page_keys.len());
        let mut skipped = 0usize;
        for key in &sub.page_keys {
            match guard_path(root, key).ok().and_then(|p| read_file_optional(&p, self.max_local_bytes)) {
                Some(bytes) => pages.push(bytes),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(action = "read_page_failed", submission_id = %sub.id, skipped, "page keys unreadable");
        }
        self.stitch_or_none(pages, &sub.id).await
    }

    async fn from_page_dirs(
        &self,
        root: &Path,
        location: Option<&DerivedLocation>,
        sub: &ResolvedSubmission,
    ) -> Option<Vec<u8>> {
        let mut tried: Vec<PathBuf> = Vec::new();
        if let Some(location) = location {
            for dir in location.dirs() {
                tried.push(dir.to_path_buf());
                if let Some(png) = self.stitch_dir(dir, &sub.id).await {
                    return Some(png);
                }
            }
        }
        if sub.id.is_empty() {
            return None;
        }

        let root = root.canonicalize().ok()?;
        let scan_root = root.clone();
        let id = sub.id.clone();
        let limits = self.legacy;
        let legacy = tokio::task::spawn_blocking(move || find_legacy_dirs(&scan_root, &id, &limits))
            .await
            .unwrap_or_default();
        for dir in legacy.iter().filter(|d| !tried.contains(d)) {
            if let Some(png) = self.stitch_dir(dir, &sub.id).await {
                return Some(png);
            }
        }
        if tried.is_empty() && legacy.is_empty() {
            debug!(action = "no_page_files", submission_id = %sub.id, "no derived pages found");
        }
        None
    }

    async fn stitch_dir(&self, dir: &Path, submission_id: &str) -> Option<Vec<u8>> {
        let files = list_page_files(dir);
        if files.is_empty() {
            return None;
        }
        let pages: Vec<Vec<u8>> = files
            .iter()
            .filter_map(|p| read_file_optional(p, self.max_local_bytes))
            .collect();
        debug!(submission_id = %submission_id, pages = pages.len(), "derived pages read");
        self.stitch_or_none(pages, submission_id).await
    }

    /// Original bytes → signature check → render → stitch.
    async fn from_original(
        &self,
        sub: &ResolvedSubmission,
        sources: &ArtifactSourceResolver,
    ) -> Result<Option<Vec<u8>>, VisionError> {
        let data = match sources.acquire(sub).await? {
            Acquisition::Bytes { data, .. } => data,
            Acquisition::FetchFailed(_) | Acquisition::Unavailable => return Ok(None),
        };
        if !data.starts_with(PDF_SIGNATURE) {
            warn!(
                action = "wrong_content_pre_render",
                submission_id = %sub.id,
                bytes = data.len(),
                "original is not a PDF"
            );
            return Ok(None);
        }

        let renderer = Arc::clone(&self.renderer);
        let rendered = tokio::task::spawn_blocking(move || renderer.render(&data)).await;
        let pages: Vec<RenderedPage> = match rendered {
            Ok(Ok(pages)) => pages,
            Ok(Err(e)) => {
                warn!(action = "render_error", kind = e.kind(), submission_id = %sub.id, "render failed");
                return Ok(None);
            }
            Err(_) => {
                warn!(action = "render_error", kind = "panic", submission_id = %sub.id, "render task aborted");
                return Ok(None);
            }
        };

        let pages: Vec<Vec<u8>> = pages
            .into_iter()
            .map(|p| p.png)
            .filter(|png| !png.is_empty())
            .collect();
        if pages.is_empty() {
            warn!(action = "render_no_pages", submission_id = %sub.id, "renderer returned no pages");
            return Ok(None);
        }
        Ok(self.stitch_or_none(pages, &sub.id).await)
    }

    async fn stitch_or_none(&self, pages: Vec<Vec<u8>>, submission_id: &str) -> Option<Vec<u8>> {
        if pages.is_empty() {
            return None;
        }
        let count = pages.len();
        let stitcher = Arc::clone(&self.stitcher);
        match tokio::task::spawn_blocking(move || stitcher.stitch(&pages)).await {
            Ok(Ok(png)) if !png.is_empty() => Some(png),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                warn!(action = "stitch_failed", submission_id = %submission_id, pages = count, error = %e, "stitch failed");
                None
            }
            Err(_) => {
                warn!(action = "stitch_failed", submission_id = %submission_id, pages = count, "stitch task aborted");
                None
            }
        }
    }
}

/// Write the composite into the primary derived directory.
fn persist(location: Option<&DerivedLocation>, png: &[u8], submission_id: &str) {
    let Some(location) = location else {
        debug!(action = "persist_skipped", submission_id = %submission_id, "no derived location");
        return;
    };
    match write_atomically(&location.stitched_path(), png) {
        Ok(()) => info!(action = "persist_derived", submission_id = %submission_id, bytes = png.len(), "composite persisted"),
        Err(e) => warn!(action = "persist_failed", submission_id = %submission_id, error_kind = ?e.kind(), "composite not persisted"),
    }
}

/// Temp file in the target directory, then rename over the target.
fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no parent directory"))?;
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// `page_<n>.png` files of `dir`, in numeric page order.
pub fn list_page_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut pages: Vec<(u64, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let index = RE_PAGE_FILE
                .captures(name.to_str()?)?
                .get(1)?
                .as_str()
                .parse::<u64>()
                .ok()?;
            entry
                .file_type()
                .ok()?
                .is_file()
                .then(|| (index, entry.path()))
        })
        .collect();
    pages.sort();
    pages.into_iter().map(|(_, path)| path).collect()
}

/// Breadth-first search for `**/derived/<submission_id>` under `root`.
///
/// Symlinked directories are not followed. Stops at `max_depth` levels,
/// after `max_entries` inspected entries, or once `max_matches` directories
/// have been found.
pub fn find_legacy_dirs(root: &Path, submission_id: &str, limits: &LegacyScanLimits) -> Vec<PathBuf> {
    let mut found = Vec::new();
    if submission_id.is_empty() || limits.max_matches == 0 {
        return found;
    }
    let target = OsStr::new(submission_id);
    let mut visited = 0usize;
    let mut queue = VecDeque::from([(root.to_path_buf(), 0usize)]);

    while let Some((dir, depth)) = queue.pop_front() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        let mut children: Vec<_> = entries.flatten().collect();
        children.sort_by_key(|e| e.file_name());
        let in_derived = dir.file_name() == Some(OsStr::new("derived"));

        for entry in children {
            visited += 1;
            if visited > limits.max_entries {
                debug!(visited, "legacy scan entry cap reached");
                return found;
            }
            if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            let path = entry.path();
            if in_derived && entry.file_name() == target {
                found.push(path);
                if found.len() >= limits.max_matches {
                    return found;
                }
                continue;
            }
            if depth + 1 < limits.max_depth {
                queue.push_back((path, depth + 1));
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::{JobPayload, SubmissionKind, SubmissionRef};
    use tempfile::TempDir;

    fn sub() -> ResolvedSubmission {
        ResolvedSubmission::merge(
            &SubmissionRef {
                id: "sub-1".into(),
                course_id: "c1".into(),
                task_id: "t1".into(),
                student_id: "stud".into(),
                kind: SubmissionKind::Pdf,
                ..Default::default()
            },
            &JobPayload::default(),
        )
    }

    fn touch(path: &Path, body: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn tier_order_and_actions() {
        let actions: Vec<_> = CacheTier::ORDER.iter().map(CacheTier::action).collect();
        assert_eq!(
            actions,
            ["cached_stitched", "stitch_from_page_keys", "stitch_from_page_dir", "render_from_original"]
        );
        assert!(!CacheTier::CachedStitched.persists());
        assert!(CacheTier::RenderOriginal.persists());
    }

    #[test]
    fn location_prefers_bucket_layout() {
        let root = TempDir::new().unwrap();
        let loc = DerivedLocation::resolve(root.path(), "submissions", &sub()).unwrap();
        assert!(loc
            .primary()
            .ends_with("submissions/c1/t1/stud/derived/sub-1"));
        assert_eq!(loc.dirs().count(), 2);
        assert!(loc.stitched_path().ends_with("derived/sub-1/stitched.png"));
    }

    #[test]
    fn location_needs_all_ids() {
        let root = TempDir::new().unwrap();
        let mut s = sub();
        s.student_id.clear();
        assert!(DerivedLocation::resolve(root.path(), "submissions", &s).is_none());
    }

    #[test]
    fn location_drops_escaping_ids() {
        let root = TempDir::new().unwrap();
        let mut s = sub();
        s.id = "../../../../escape".into();
        assert!(DerivedLocation::resolve(root.path(), "submissions", &s).is_none());
    }

    #[test]
    fn page_files_sorted_numerically_case_insensitive() {
        let dir = TempDir::new().unwrap();
        for name in ["page_10.png", "PAGE_2.PNG", "page_0001.png", "page_x.png", "notes.txt", "stitched.png"] {
            touch(&dir.path().join(name), b"p");
        }
        fs::create_dir(dir.path().join("page_3.png")).unwrap();
        let names: Vec<String> = list_page_files(dir.path())
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["page_0001.png", "PAGE_2.PNG", "page_10.png"]);
    }

    #[test]
    fn legacy_scan_finds_nested_layout() {
        let root = TempDir::new().unwrap();
        touch(&root.path().join("old/bucket/x/y/derived/sub-1/page_1.png"), b"p");
        touch(&root.path().join("other/derived/sub-2/page_1.png"), b"p");
        let found = find_legacy_dirs(root.path(), "sub-1", &LegacyScanLimits::default());
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("derived/sub-1"));
    }

    #[test]
    fn legacy_scan_respects_depth_cap() {
        let root = TempDir::new().unwrap();
        touch(&root.path().join("a/b/c/d/derived/sub-1/page_1.png"), b"p");
        let shallow = LegacyScanLimits {
            max_depth: 3,
            ..LegacyScanLimits::default()
        };
        assert!(find_legacy_dirs(root.path(), "sub-1", &shallow).is_empty());
        assert_eq!(find_legacy_dirs(root.path(), "sub-1", &LegacyScanLimits::default()).len(), 1);
    }

    #[test]
    fn legacy_scan_respects_entry_and_match_caps() {
        let root = TempDir::new().unwrap();
        for i in 0..6 {
            touch(&root.path().join(format!("l{i}/derived/sub-1/page_1.png")), b"p");
        }
        let found = find_legacy_dirs(root.path(), "sub-1", &LegacyScanLimits::default());
        assert_eq!(found.len(), 4);

        let tiny = LegacyScanLimits {
            max_entries: 3,
            ..LegacyScanLimits::default()
        };
        assert!(find_legacy_dirs(root.path(), "sub-1", &tiny).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn legacy_scan_ignores_symlinked_dirs() {
        let root = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        touch(&outside.path().join("derived/sub-1/page_1.png"), b"p");
        std::os::unix::fs::symlink(outside.path(), root.path().join("link")).unwrap();
        assert!(find_legacy_dirs(root.path(), "sub-1", &LegacyScanLimits::default()).is_empty());
    }

    #[test]
    fn atomic_write_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested/stitched.png");
        write_atomically(&target, b"one").unwrap();
        write_atomically(&target, b"two").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"two");
        let leftovers = fs::read_dir(target.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
