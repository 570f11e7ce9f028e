//! In-memory lifecycle store for upload items.
//!
//! Background tasks address items by id; every mutation primitive checks
//! existence first and silently does nothing for an absent id. That
//! no-op is the system's only cancellation mechanism: removing an item
//! simply detaches it, and whatever its in-flight tasks write later
//! lands nowhere.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::intake::FileCandidate;
use crate::types::{CaptionStatus, ItemId, ProcessingStatus, SubtitleRemovalConfig};

/// Locally resolvable reference to an item's payload, used to render or
/// open the clip. Must be released exactly once when the item leaves
/// the store; nothing releases it implicitly.
#[derive(Debug)]
pub struct PreviewHandle {
    path: PathBuf,
    released: bool,
}

impl PreviewHandle {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    /// The referenced location while the handle is live
    pub fn path(&self) -> Option<&Path> {
        if self.released {
            None
        } else {
            Some(&self.path)
        }
    }

    /// Release the handle. True the first time only; a repeat release
    /// is refused and logged.
    pub fn release(&mut self) -> bool {
        if self.released {
            log::warn!(
                "Preview handle for {} released more than once",
                self.path.display()
            );
            return false;
        }
        self.released = true;
        log::debug!("Released preview handle for {}", self.path.display());
        true
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

/// One user-submitted video and its derived state. The two status
/// tracks transition independently; neither blocks the other.
#[derive(Debug)]
pub struct UploadItem {
    pub id: ItemId,
    pub source_path: PathBuf,
    pub size_bytes: u64,
    pub mime_type: &'static str,
    pub preview: PreviewHandle,
    pub caption_status: CaptionStatus,
    /// Grows monotonically while the stream runs; emptied on retry
    pub caption_text: String,
    /// Present only in the Error state
    pub caption_error: Option<String>,
    pub processing_status: ProcessingStatus,
    /// Set only when the processing track completes
    pub processed_media: Option<PathBuf>,
    /// Frozen copy of the global defaults at creation time
    pub subtitle_config: SubtitleRemovalConfig,
}

impl UploadItem {
    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source_path.display().to_string())
    }
}

/// Process-wide collection of upload items, newest first
pub struct ItemStore {
    items: Vec<UploadItem>,
    next_id: ItemId,
}

/// Handle shared between the event loop and background tasks
pub type SharedStore = Arc<Mutex<ItemStore>>;

/// Create an empty store behind its shared handle
pub fn shared() -> SharedStore {
    Arc::new(Mutex::new(ItemStore::new()))
}

impl ItemStore {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            next_id: 1,
        }
    }

    pub fn items(&self) -> &[UploadItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: ItemId) -> Option<&UploadItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.get(id).is_some()
    }

    fn get_mut(&mut self, id: ItemId) -> Option<&mut UploadItem> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    /// Insert accepted files as new items in `Preparing` state, with the
    /// given subtitle configuration frozen onto each. New items land at
    /// the front of the list, keeping the batch's own order. Returns
    /// only after the items exist; scheduling their work is the
    /// caller's business.
    pub fn create_items(
        &mut self,
        accepted: &[FileCandidate],
        snapshot: SubtitleRemovalConfig,
    ) -> Vec<ItemId> {
        let mut ids = Vec::with_capacity(accepted.len());

        for (offset, candidate) in accepted.iter().enumerate() {
            let id = self.next_id;
            self.next_id += 1;

            let item = UploadItem {
                id,
                source_path: candidate.path.clone(),
                size_bytes: candidate.size_bytes,
                mime_type: candidate.mime_type,
                preview: PreviewHandle::new(candidate.path.clone()),
                caption_status: CaptionStatus::Preparing,
                caption_text: String::new(),
                caption_error: None,
                processing_status: ProcessingStatus::Idle,
                processed_media: None,
                subtitle_config: snapshot,
            };

            self.items.insert(offset, item);
            ids.push(id);
        }

        ids
    }

    /// Detach the item and release its preview handle. Tasks still in
    /// flight for this id keep running; their writes become no-ops.
    pub fn remove(&mut self, id: ItemId) -> bool {
        let Some(pos) = self.items.iter().position(|item| item.id == id) else {
            return false;
        };
        let mut item = self.items.remove(pos);
        item.preview.release();
        true
    }

    /// Reset the caption track for a re-run: back to `Preparing`, error
    /// cleared, text emptied. Returns what a new generation task needs,
    /// or None when the id is gone. The processing track is untouched.
    pub fn retry_reset(&mut self, id: ItemId) -> Option<(PathBuf, &'static str)> {
        let item = self.get_mut(id)?;
        item.caption_status = CaptionStatus::Preparing;
        item.caption_error = None;
        item.caption_text.clear();
        Some((item.source_path.clone(), item.mime_type))
    }

    // Mutation primitives used by the async tasks. Each returns whether
    // the item still existed.

    pub fn set_caption_status(&mut self, id: ItemId, status: CaptionStatus) -> bool {
        match self.get_mut(id) {
            Some(item) => {
                item.caption_status = status;
                true
            }
            None => false,
        }
    }

    /// Replace the caption text with the full accumulated value from the
    /// stream. Callers always hand over the complete-so-far text, so
    /// the stored string only ever grows between retries.
    pub fn set_caption_text(&mut self, id: ItemId, text: &str) -> bool {
        match self.get_mut(id) {
            Some(item) => {
                item.caption_text.clear();
                item.caption_text.push_str(text);
                true
            }
            None => false,
        }
    }

    /// Record a generation failure: status to `Error` with the mapped
    /// message attached.
    pub fn set_caption_error(&mut self, id: ItemId, message: impl Into<String>) -> bool {
        match self.get_mut(id) {
            Some(item) => {
                item.caption_status = CaptionStatus::Error;
                item.caption_error = Some(message.into());
                true
            }
            None => false,
        }
    }

    pub fn set_processing_status(&mut self, id: ItemId, status: ProcessingStatus) -> bool {
        match self.get_mut(id) {
            Some(item) => {
                item.processing_status = status;
                true
            }
            None => false,
        }
    }

    pub fn set_processed_media(&mut self, id: ItemId, path: PathBuf) -> bool {
        match self.get_mut(id) {
            Some(item) => {
                item.processed_media = Some(path);
                true
            }
            None => false,
        }
    }
}

impl Default for ItemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SubtitleArea, SubtitleMode};

    fn candidates(names: &[&str]) -> Vec<FileCandidate> {
        names
            .iter()
            .map(|name| FileCandidate {
                path: PathBuf::from(format!("{}.mp4", name)),
                size_bytes: 1024,
                mime_type: "video/mp4",
            })
            .collect()
    }

    fn enabled_config() -> SubtitleRemovalConfig {
        SubtitleRemovalConfig {
            enabled: true,
            mode: SubtitleMode::Aggressive,
            area: SubtitleArea::Full,
        }
    }

    #[test]
    fn test_create_assigns_distinct_ids_in_preparing() {
        let mut store = ItemStore::new();
        let ids = store.create_items(&candidates(&["a", "b", "c"]), Default::default());

        assert_eq!(ids.len(), 3);
        let mut unique = ids.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 3);

        for id in &ids {
            let item = store.get(*id).unwrap();
            assert_eq!(item.caption_status, CaptionStatus::Preparing);
            assert_eq!(item.processing_status, ProcessingStatus::Idle);
            assert!(item.caption_text.is_empty());
            assert!(item.caption_error.is_none());
        }
    }

    #[test]
    fn test_new_items_land_first_keeping_batch_order() {
        let mut store = ItemStore::new();
        store.create_items(&candidates(&["old"]), Default::default());
        store.create_items(&candidates(&["a", "b"]), Default::default());

        let names: Vec<String> = store.items().iter().map(|i| i.file_name()).collect();
        assert_eq!(names, vec!["a.mp4", "b.mp4", "old.mp4"]);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut store = ItemStore::new();
        let first = store.create_items(&candidates(&["a"]), Default::default())[0];
        assert!(store.remove(first));

        let second = store.create_items(&candidates(&["b"]), Default::default())[0];
        assert_ne!(first, second);
        assert!(second > first);
    }

    #[test]
    fn test_remove_is_idempotent_and_releases_preview() {
        let mut store = ItemStore::new();
        let id = store.create_items(&candidates(&["a"]), Default::default())[0];

        assert!(store.remove(id));
        assert!(!store.remove(id));
        assert!(store.is_empty());
    }

    #[test]
    fn test_preview_handle_releases_exactly_once() {
        let mut handle = PreviewHandle::new(PathBuf::from("clip.mp4"));
        assert!(handle.path().is_some());
        assert!(handle.release());
        assert!(!handle.release());
        assert!(handle.is_released());
        assert!(handle.path().is_none());
    }

    #[test]
    fn test_writes_to_removed_id_are_noops() {
        let mut store = ItemStore::new();
        let id = store.create_items(&candidates(&["a"]), Default::default())[0];
        store.remove(id);

        assert!(!store.set_caption_status(id, CaptionStatus::Analyzing));
        assert!(!store.set_caption_text(id, "late chunk"));
        assert!(!store.set_caption_error(id, "late failure"));
        assert!(!store.set_processing_status(id, ProcessingStatus::Completed));
        assert!(!store.set_processed_media(id, PathBuf::from("a.mp4")));

        // A late write must not resurrect the item either.
        assert!(store.is_empty());
        assert!(store.retry_reset(id).is_none());
    }

    #[test]
    fn test_retry_resets_the_caption_track_only() {
        let mut store = ItemStore::new();
        let id = store.create_items(&candidates(&["a"]), enabled_config())[0];

        store.set_caption_status(id, CaptionStatus::Analyzing);
        store.set_caption_text(id, "partial caption");
        store.set_caption_error(id, "network request failed");
        store.set_processing_status(id, ProcessingStatus::Processing);

        let (path, mime) = store.retry_reset(id).unwrap();
        assert_eq!(path, PathBuf::from("a.mp4"));
        assert_eq!(mime, "video/mp4");

        let item = store.get(id).unwrap();
        assert_eq!(item.caption_status, CaptionStatus::Preparing);
        assert!(item.caption_text.is_empty());
        assert!(item.caption_error.is_none());
        // Independent track is untouched.
        assert_eq!(item.processing_status, ProcessingStatus::Processing);
    }

    #[test]
    fn test_retry_after_completion_matches_retry_from_error() {
        let mut store = ItemStore::new();
        let id = store.create_items(&candidates(&["a"]), Default::default())[0];

        // First run fails, retry, second run completes, retry again.
        store.set_caption_error(id, "analysis failed");
        store.retry_reset(id).unwrap();
        store.set_caption_status(id, CaptionStatus::Completed);
        store.set_caption_text(id, "final caption");
        store.retry_reset(id).unwrap();

        let item = store.get(id).unwrap();
        assert_eq!(item.caption_status, CaptionStatus::Preparing);
        assert!(item.caption_text.is_empty());
        assert!(item.caption_error.is_none());
    }

    #[test]
    fn test_subtitle_config_is_frozen_at_creation() {
        let mut store = ItemStore::new();
        let mut global = enabled_config();
        let id = store.create_items(&candidates(&["a"]), global)[0];

        // The user flips the global defaults afterwards.
        global.enabled = false;
        global.mode = SubtitleMode::Standard;

        let item = store.get(id).unwrap();
        assert!(item.subtitle_config.enabled);
        assert_eq!(item.subtitle_config.mode, SubtitleMode::Aggressive);
        assert_eq!(item.subtitle_config.area, SubtitleArea::Full);

        // And the frozen track still progresses to completion.
        assert!(store.set_processing_status(id, ProcessingStatus::Processing));
        assert!(store.set_processing_status(id, ProcessingStatus::Completed));
        assert_eq!(
            store.get(id).unwrap().processing_status,
            ProcessingStatus::Completed
        );
    }
}
