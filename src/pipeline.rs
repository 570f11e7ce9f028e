//! Per-item background tasks: caption generation and the simulated
//! subtitle removal job. Both report through the store's id-addressed
//! primitives, so work whose item was removed mid-flight lands nowhere.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::gemini::GeminiClient;
use crate::store::SharedStore;
use crate::tui::{AppMessage, LogLevel, TuiSender};
use crate::types::{CaptionStatus, ItemId, ProcessingStatus, SubtitleMode, SubtitleRemovalConfig};

/// Spawn the caption generation task for one item. The item is expected
/// to be in `Preparing` (fresh creation or retry reset); it flips to
/// `Analyzing` right before the streaming call and ends in `Completed`
/// or `Error`. One item's failure never touches any other item.
pub fn spawn_caption_generation(
    store: SharedStore,
    client: Arc<GeminiClient>,
    tx: TuiSender,
    id: ItemId,
    source: PathBuf,
    mime_type: &'static str,
    style_prompt: String,
    notify: bool,
) {
    tokio::spawn(async move {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());

        if !store
            .lock()
            .unwrap()
            .set_caption_status(id, CaptionStatus::Analyzing)
        {
            // Removed before the task even started.
            return;
        }

        let partial_store = store.clone();
        let result = client
            .generate_caption(&source, mime_type, &style_prompt, |full_text| {
                // Full-so-far text; a no-op once the item is removed.
                partial_store
                    .lock()
                    .unwrap()
                    .set_caption_text(id, full_text);
            })
            .await;

        match result {
            Ok(full_text) => {
                let still_present = {
                    let mut guard = store.lock().unwrap();
                    guard.set_caption_text(id, &full_text);
                    guard.set_caption_status(id, CaptionStatus::Completed)
                };

                if still_present {
                    log::info!("Caption completed for {} ({} chars)", name, full_text.len());
                    let _ = tx.send(AppMessage::Log(
                        LogLevel::Success,
                        format!("Caption ready for {}", name),
                    ));
                    if notify {
                        send_completion_notification(&name);
                    }
                }
            }
            Err(e) => {
                let message = e.to_string();
                let still_present = store.lock().unwrap().set_caption_error(id, &message);

                if still_present {
                    let _ = tx.send(AppMessage::Log(
                        LogLevel::Error,
                        format!("{}: {}", name, message),
                    ));
                } else {
                    log::debug!("Discarding failure for removed item {}: {}", id, message);
                }
            }
        }
    });
}

fn send_completion_notification(name: &str) {
    use notify_rust::Notification;

    if let Err(e) = Notification::new()
        .appname(crate::types::APP_NAME)
        .summary("Caption ready")
        .body(&format!("{} has a generated caption", name))
        .show()
    {
        log::debug!("Desktop notification failed: {}", e);
    }
}

/// Base delay of the simulated removal pass. Aggressive always outlasts
/// Standard.
fn base_removal_delay(mode: SubtitleMode) -> Duration {
    match mode {
        SubtitleMode::Standard => Duration::from_millis(3_000),
        SubtitleMode::Aggressive => Duration::from_millis(8_000),
    }
}

const MAX_JITTER_MS: u64 = 2_000;

/// Schedule the simulated subtitle removal job for one item: marks it
/// `Processing` immediately, and after `base(mode) + jitter` marks it
/// `Completed` with the unmodified preview reference attached as the
/// "processed" output.
///
/// This is a stand-in for a real removal job — no frame is touched. A
/// real runner can replace the sleep without changing the store or the
/// presentation contract: the schedule/complete interface stays.
pub fn schedule_subtitle_removal(
    store: SharedStore,
    tx: TuiSender,
    id: ItemId,
    preview: PathBuf,
    config: SubtitleRemovalConfig,
) {
    if !store
        .lock()
        .unwrap()
        .set_processing_status(id, ProcessingStatus::Processing)
    {
        return;
    }

    let jitter = Duration::from_millis(rand::rng().random_range(0..=MAX_JITTER_MS));
    let delay = base_removal_delay(config.mode) + jitter;
    log::debug!(
        "Simulated subtitle removal for item {} in {:?} ({} mode)",
        id,
        delay,
        config.mode.label()
    );

    tokio::spawn(async move {
        tokio::time::sleep(delay).await;

        let (completed, name) = {
            let mut guard = store.lock().unwrap();
            let completed = guard.set_processing_status(id, ProcessingStatus::Completed)
                && guard.set_processed_media(id, preview);
            let name = guard.get(id).map(|item| item.file_name());
            (completed, name)
        };

        // If the item was removed while the timer ran, the writes above
        // missed and there is nothing to report.
        if completed {
            if let Some(name) = name {
                let _ = tx.send(AppMessage::Log(
                    LogLevel::Success,
                    format!("Subtitle removal finished for {}", name),
                ));
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::FileCandidate;
    use crate::store::{self, ItemStore};
    use crate::tui::create_channel;
    use crate::types::SubtitleArea;

    fn one_item(store: &SharedStore, enabled: bool) -> ItemId {
        let candidate = FileCandidate {
            path: PathBuf::from("clip.mp4"),
            size_bytes: 4096,
            mime_type: "video/mp4",
        };
        let config = SubtitleRemovalConfig {
            enabled,
            mode: SubtitleMode::Aggressive,
            area: SubtitleArea::Full,
        };
        store.lock().unwrap().create_items(&[candidate], config)[0]
    }

    async fn wait_for(shared: &SharedStore, what: &str, cond: impl Fn(&ItemStore) -> bool) {
        for _ in 0..60 {
            if cond(&shared.lock().unwrap()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        panic!("timed out waiting for: {}", what);
    }

    #[test]
    fn test_simulated_403_lands_as_the_region_message_on_the_item() {
        // The provider failure string is classified at the task
        // boundary and recorded onto the item verbatim.
        let mut items = ItemStore::new();
        let candidate = FileCandidate {
            path: PathBuf::from("clip.mp4"),
            size_bytes: 4096,
            mime_type: "video/mp4",
        };
        let id = items.create_items(&[candidate], SubtitleRemovalConfig::default())[0];

        let failure = crate::gemini::classify_failure(
            "Gemini API error: code 403, status PERMISSION_DENIED for this consumer",
        );
        items.set_caption_error(id, failure.to_string());

        let item = items.get(id).unwrap();
        assert_eq!(item.caption_status, CaptionStatus::Error);
        assert_eq!(
            item.caption_error.as_deref(),
            Some(
                "The generation service is not available in this region (403); \
                 check your network or proxy settings"
            )
        );
    }

    #[test]
    fn test_aggressive_base_delay_outlasts_standard() {
        assert!(
            base_removal_delay(SubtitleMode::Aggressive)
                > base_removal_delay(SubtitleMode::Standard)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_removal_marks_processing_then_completes() {
        let shared = store::shared();
        let (tx, _rx) = create_channel();
        let id = one_item(&shared, true);

        schedule_subtitle_removal(
            shared.clone(),
            tx,
            id,
            PathBuf::from("clip.mp4"),
            SubtitleRemovalConfig {
                enabled: true,
                mode: SubtitleMode::Standard,
                area: SubtitleArea::Bottom,
            },
        );

        // Processing is marked synchronously, before any delay elapses.
        assert_eq!(
            shared.lock().unwrap().get(id).unwrap().processing_status,
            ProcessingStatus::Processing
        );

        wait_for(&shared, "simulated removal completion", |s| {
            s.get(id)
                .map(|i| i.processing_status == ProcessingStatus::Completed)
                .unwrap_or(false)
        })
        .await;

        let guard = shared.lock().unwrap();
        let item = guard.get(id).unwrap();
        // The "processed" output is the unmodified preview reference.
        assert_eq!(item.processed_media.as_deref(), Some(PathBuf::from("clip.mp4").as_path()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_removal_completion_is_noop_after_remove() {
        let shared = store::shared();
        let (tx, _rx) = create_channel();
        let id = one_item(&shared, true);

        schedule_subtitle_removal(
            shared.clone(),
            tx,
            id,
            PathBuf::from("clip.mp4"),
            SubtitleRemovalConfig::default(),
        );
        assert!(shared.lock().unwrap().remove(id));

        // Let the timer fire well past base + max jitter.
        tokio::time::sleep(Duration::from_secs(30)).await;

        let guard = shared.lock().unwrap();
        assert!(guard.is_empty());
        assert!(!guard.contains(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_caption_failure_lands_on_the_item_only() {
        let shared = store::shared();
        let (tx, _rx) = create_channel();
        let id = one_item(&shared, false);
        let other = one_item(&shared, false);

        // A client without credentials fails every call up front.
        let client = Arc::new(GeminiClient::new(Vec::new(), "gemini-2.5-flash".to_string()));
        spawn_caption_generation(
            shared.clone(),
            client,
            tx,
            id,
            PathBuf::from("clip.mp4"),
            "video/mp4",
            String::new(),
            false,
        );

        wait_for(&shared, "caption task failure", |s| {
            s.get(id)
                .map(|i| i.caption_status == CaptionStatus::Error)
                .unwrap_or(false)
        })
        .await;

        let guard = shared.lock().unwrap();
        let item = guard.get(id).unwrap();
        let message = item.caption_error.as_deref().unwrap();
        assert!(message.contains("GEMINI_API_KEY"), "got: {}", message);

        // The sibling item is untouched.
        assert_eq!(
            guard.get(other).unwrap().caption_status,
            CaptionStatus::Preparing
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_caption_task_for_removed_item_does_nothing() {
        let shared = store::shared();
        let (tx, _rx) = create_channel();
        let id = one_item(&shared, false);
        shared.lock().unwrap().remove(id);

        let client = Arc::new(GeminiClient::new(Vec::new(), "gemini-2.5-flash".to_string()));
        spawn_caption_generation(
            shared.clone(),
            client,
            tx,
            id,
            PathBuf::from("clip.mp4"),
            "video/mp4",
            String::new(),
            false,
        );

        tokio::time::sleep(Duration::from_secs(5)).await;

        let guard = shared.lock().unwrap();
        assert!(guard.is_empty());
        assert!(!guard.contains(id));
    }
}
