//! Media intake: screens candidate files before they become items.
//! Rejected files are excluded silently (a logged diagnostic, never an
//! error); the caller only raises a warning when nothing survives.

use std::fmt;
use std::path::{Path, PathBuf};

/// Known video extensions and the MIME type sent to the generation
/// endpoint for each.
const VIDEO_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mov", "video/quicktime"),
    ("mkv", "video/x-matroska"),
    ("webm", "video/webm"),
    ("avi", "video/x-msvideo"),
    ("mpg", "video/mpeg"),
    ("mpeg", "video/mpeg"),
    ("wmv", "video/x-ms-wmv"),
    ("3gp", "video/3gpp"),
];

/// Extension list for the native file picker filter
pub fn picker_extensions() -> Vec<&'static str> {
    VIDEO_TYPES.iter().map(|(ext, _)| *ext).collect()
}

/// Classify a path as video by extension; returns the wire MIME type.
pub fn video_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    VIDEO_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
}

/// A file that passed intake screening
#[derive(Debug, Clone)]
pub struct FileCandidate {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub mime_type: &'static str,
}

impl FileCandidate {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Why a file was excluded
#[derive(Debug)]
pub enum RejectReason {
    NotVideo,
    TooLarge { size_bytes: u64, max_bytes: u64 },
    Unreadable(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NotVideo => write!(f, "not a recognized video type"),
            RejectReason::TooLarge {
                size_bytes,
                max_bytes,
            } => write!(
                f,
                "{:.1} MB exceeds the {:.0} MB limit",
                *size_bytes as f64 / 1_048_576.0,
                *max_bytes as f64 / 1_048_576.0
            ),
            RejectReason::Unreadable(e) => write!(f, "could not be read: {}", e),
        }
    }
}

/// A file excluded at intake, with its discardable diagnostic
#[derive(Debug)]
pub struct RejectedFile {
    pub path: PathBuf,
    pub reason: RejectReason,
}

/// Outcome of screening one batch of candidate files
#[derive(Debug, Default)]
pub struct IntakeReport {
    /// Accepted files, input order preserved
    pub accepted: Vec<FileCandidate>,
    pub rejected: Vec<RejectedFile>,
}

impl IntakeReport {
    /// True when the batch was non-empty but nothing passed; the caller
    /// should surface a user-facing warning in that case.
    pub fn nothing_accepted(&self) -> bool {
        self.accepted.is_empty() && !self.rejected.is_empty()
    }
}

/// Screen pre-sized candidates. Each file is judged independently:
/// video type by extension, size within the configured maximum.
pub fn screen_files(candidates: Vec<(PathBuf, u64)>, max_bytes: u64) -> IntakeReport {
    let mut report = IntakeReport::default();

    for (path, size_bytes) in candidates {
        let Some(mime_type) = video_mime_type(&path) else {
            report.rejected.push(RejectedFile {
                path,
                reason: RejectReason::NotVideo,
            });
            continue;
        };

        if size_bytes > max_bytes {
            report.rejected.push(RejectedFile {
                path,
                reason: RejectReason::TooLarge {
                    size_bytes,
                    max_bytes,
                },
            });
            continue;
        }

        report.accepted.push(FileCandidate {
            path,
            size_bytes,
            mime_type,
        });
    }

    report
}

/// Stat the given paths and screen them. Rejections are logged at warn
/// and otherwise dropped.
pub fn gather(paths: Vec<PathBuf>, max_bytes: u64) -> IntakeReport {
    let mut sized = Vec::with_capacity(paths.len());
    let mut unreadable = Vec::new();

    for path in paths {
        match std::fs::metadata(&path) {
            Ok(meta) => sized.push((path, meta.len())),
            Err(e) => unreadable.push(RejectedFile {
                path,
                reason: RejectReason::Unreadable(e.to_string()),
            }),
        }
    }

    let mut report = screen_files(sized, max_bytes);
    report.rejected.extend(unreadable);

    for rejected in &report.rejected {
        log::warn!(
            "Intake rejected {}: {}",
            rejected.path.display(),
            rejected.reason
        );
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    fn batch(files: &[(&str, u64)]) -> Vec<(PathBuf, u64)> {
        files
            .iter()
            .map(|(name, size)| (PathBuf::from(name), *size))
            .collect()
    }

    #[test]
    fn test_video_classification() {
        assert_eq!(video_mime_type(Path::new("a.mp4")), Some("video/mp4"));
        assert_eq!(video_mime_type(Path::new("B.MOV")), Some("video/quicktime"));
        assert_eq!(video_mime_type(Path::new("clip.webm")), Some("video/webm"));
        assert_eq!(video_mime_type(Path::new("notes.txt")), None);
        assert_eq!(video_mime_type(Path::new("noext")), None);
    }

    #[test]
    fn test_oversized_file_is_excluded_without_warning() {
        // One 10 MB video and one 600 MB video against a 500 MB limit:
        // exactly one survives, and the batch does not warrant a warning.
        let report = screen_files(
            batch(&[("small.mp4", 10 * MB), ("large.mp4", 600 * MB)]),
            500 * MB,
        );
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.accepted[0].file_name(), "small.mp4");
        assert!(!report.nothing_accepted());
        assert!(matches!(
            report.rejected[0].reason,
            RejectReason::TooLarge { .. }
        ));
    }

    #[test]
    fn test_all_rejected_warrants_warning() {
        let report = screen_files(
            batch(&[("doc.pdf", MB), ("huge.mp4", 900 * MB)]),
            500 * MB,
        );
        assert!(report.accepted.is_empty());
        assert_eq!(report.rejected.len(), 2);
        assert!(report.nothing_accepted());
    }

    #[test]
    fn test_empty_batch_is_not_a_warning() {
        let report = screen_files(Vec::new(), 500 * MB);
        assert!(report.accepted.is_empty());
        assert!(!report.nothing_accepted());
    }

    #[test]
    fn test_accepted_preserves_input_order_and_is_subset() {
        let input = batch(&[
            ("a.mp4", MB),
            ("skip.txt", MB),
            ("b.mov", 2 * MB),
            ("c.webm", 3 * MB),
        ]);
        let input_paths: Vec<PathBuf> = input.iter().map(|(p, _)| p.clone()).collect();

        let report = screen_files(input, 500 * MB);
        let accepted: Vec<&PathBuf> = report.accepted.iter().map(|c| &c.path).collect();

        assert_eq!(accepted.len(), 3);
        assert_eq!(accepted[0], &input_paths[0]);
        assert_eq!(accepted[1], &input_paths[2]);
        assert_eq!(accepted[2], &input_paths[3]);
        assert!(accepted.iter().all(|p| input_paths.contains(p)));
    }

    #[test]
    fn test_boundary_size_is_accepted() {
        let report = screen_files(batch(&[("edge.mp4", 500 * MB)]), 500 * MB);
        assert_eq!(report.accepted.len(), 1);
    }
}
