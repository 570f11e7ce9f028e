//! Google Gemini streaming client for Clip Captioner
//! Sends a video inline (base64) with a prompt and forwards the
//! incrementally generated caption text to a callback as it arrives.

use base64::{engine::general_purpose, Engine as _};
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::AppConfig;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Prompt used when the user leaves the style prompt empty
pub const DEFAULT_STYLE_PROMPT: &str = "\
Analyze this video visually.
1. Briefly describe what happens in the video.
2. Based on the visual content, write a creative, attention-grabbing \
social media caption (fit for TikTok, Reels or similar feeds).
3. Add relevant trending hashtags.
Keep the tone natural and lively.";

/// Fallback when the provider fails without a usable message
const GENERIC_FAILURE_MESSAGE: &str = "Video analysis failed, please retry";

/// Stable failure taxonomy for generation calls. The mapping from
/// provider failure strings to these classes is part of the user-facing
/// contract; see `classify_failure`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("No Gemini API key configured; set GEMINI_API_KEY or add gemini_api_keys to settings.json")]
    MissingCredential,

    #[error("The generation service is not available in this region (403); check your network or proxy settings")]
    AccessRestricted,

    #[error("Network request failed; the file may be too large (try compressing it) or the connection is unstable")]
    Transfer,

    /// Provider message passed through verbatim
    #[error("{0}")]
    Provider(String),
}

/// Map a provider/transport failure description onto the stable error
/// classes. Region and permission denials win over generic status
/// codes; anything unrecognized passes through verbatim.
pub fn classify_failure(detail: &str) -> GenerationError {
    if detail.contains("403")
        || detail.contains("PERMISSION_DENIED")
        || detail.contains("Region not supported")
        || detail.contains("User location is not supported")
    {
        return GenerationError::AccessRestricted;
    }

    if detail.contains("400")
        || detail.contains("413")
        || detail.contains("500")
        || detail.contains("503")
        || detail.contains("timed out")
        || detail.contains("connection")
        || detail.contains("error sending request")
    {
        return GenerationError::Transfer;
    }

    let trimmed = detail.trim();
    if trimmed.is_empty() {
        GenerationError::Provider(GENERIC_FAILURE_MESSAGE.to_string())
    } else {
        GenerationError::Provider(trimmed.to_string())
    }
}

fn map_transport_error(e: reqwest::Error) -> GenerationError {
    if e.is_connect() || e.is_timeout() || e.is_body() || e.is_request() {
        return GenerationError::Transfer;
    }
    classify_failure(&e.to_string())
}

/// Effective prompt: the user's style prompt when non-empty after
/// trimming, the built-in analysis prompt otherwise.
pub fn resolve_prompt(style_prompt: &str) -> String {
    let trimmed = style_prompt.trim();
    if trimmed.is_empty() {
        DEFAULT_STYLE_PROMPT.to_string()
    } else {
        trimmed.to_string()
    }
}

// Request body for streamGenerateContent

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<ContentRequest>,
}

#[derive(Debug, Serialize)]
struct ContentRequest {
    parts: Vec<PartRequest>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum PartRequest {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    /// Base64-encoded video bytes
    data: String,
}

// One SSE chunk of the streamed response

#[derive(Debug, Deserialize)]
struct StreamChunk {
    candidates: Option<Vec<Candidate>>,
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    parts: Option<Vec<ContentPart>>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    message: String,
    code: Option<i32>,
    status: Option<String>,
}

/// Extract the incremental text carried by one SSE line. `Ok(None)`
/// for non-data lines (comments, event names, blanks).
fn parse_stream_line(line: &str) -> Result<Option<String>, GenerationError> {
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(None);
    }

    let chunk: StreamChunk = serde_json::from_str(payload).map_err(|e| {
        log::debug!("Unparseable stream chunk ({}): {}", e, payload);
        GenerationError::Transfer
    })?;

    if let Some(error) = chunk.error {
        let detail = format!(
            "{} {} {}",
            error.code.map(|c| c.to_string()).unwrap_or_default(),
            error.status.unwrap_or_default(),
            error.message
        );
        return Err(classify_failure(&detail));
    }

    let text = chunk
        .candidates
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.content)
        .and_then(|c| c.parts)
        .map(|parts| {
            parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        });

    Ok(text)
}

/// Incremental SSE consumer. Buffers raw bytes, cuts complete lines,
/// accumulates generated text and reports the full-so-far value after
/// every chunk that carried text — callers receive a string that only
/// ever extends the previous one.
struct SseTextStream {
    pending: Vec<u8>,
    text: String,
}

impl SseTextStream {
    fn new() -> Self {
        Self {
            pending: Vec::new(),
            text: String::new(),
        }
    }

    fn push<F: FnMut(&str)>(
        &mut self,
        bytes: &[u8],
        on_partial: &mut F,
    ) -> Result<(), GenerationError> {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            self.consume_line(line.trim_end(), on_partial)?;
        }
        Ok(())
    }

    fn finish<F: FnMut(&str)>(&mut self, on_partial: &mut F) -> Result<String, GenerationError> {
        if !self.pending.is_empty() {
            let raw = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&raw);
            self.consume_line(line.trim_end(), on_partial)?;
        }
        Ok(std::mem::take(&mut self.text))
    }

    fn consume_line<F: FnMut(&str)>(
        &mut self,
        line: &str,
        on_partial: &mut F,
    ) -> Result<(), GenerationError> {
        if let Some(delta) = parse_stream_line(line)? {
            if !delta.is_empty() {
                self.text.push_str(&delta);
                on_partial(&self.text);
            }
        }
        Ok(())
    }
}

/// Gemini API client with a rotating key pool
pub struct GeminiClient {
    client: Client,
    api_keys: Vec<String>,
    current_key_index: AtomicUsize,
    model: String,
}

impl GeminiClient {
    /// Create a new client. Blank keys are discarded up front.
    pub fn new(api_keys: Vec<String>, model: String) -> Self {
        let api_keys = api_keys
            .into_iter()
            .filter(|k| !k.trim().is_empty())
            .collect();
        Self {
            client: Client::new(),
            api_keys,
            current_key_index: AtomicUsize::new(0),
            model,
        }
    }

    /// Client configured from settings, with the environment credential
    /// taking priority over stored keys
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.api_keys_with_env(), config.model.clone())
    }

    /// Get the current key and rotate for the next call. The missing
    /// credential is a hard precondition failure for every call.
    fn active_key(&self) -> Result<&str, GenerationError> {
        if self.api_keys.is_empty() {
            return Err(GenerationError::MissingCredential);
        }
        let index = self.current_key_index.fetch_add(1, Ordering::SeqCst);
        Ok(&self.api_keys[index % self.api_keys.len()])
    }

    /// Generate a caption for the video at `path`, streaming text as it
    /// arrives. `on_partial` receives the complete-so-far caption (not
    /// the delta) once per text-bearing chunk; the final accumulated
    /// text is returned when the stream closes. Every failure maps to
    /// exactly one `GenerationError`, never a partial success.
    pub async fn generate_caption<F>(
        &self,
        path: &Path,
        mime_type: &str,
        style_prompt: &str,
        mut on_partial: F,
    ) -> Result<String, GenerationError>
    where
        F: FnMut(&str) + Send,
    {
        let key = self.active_key()?.to_string();
        let prompt = resolve_prompt(style_prompt);

        let payload = tokio::fs::read(path)
            .await
            .map_err(|e| GenerationError::Provider(format!("Failed to read video file: {}", e)))?;
        let encoded = general_purpose::STANDARD.encode(&payload);

        let request = GenerateContentRequest {
            contents: vec![ContentRequest {
                parts: vec![
                    PartRequest::InlineData {
                        inline_data: InlineData {
                            mime_type: mime_type.to_string(),
                            data: encoded,
                        },
                    },
                    PartRequest::Text { text: prompt },
                ],
            }],
        };

        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            API_BASE, self.model, key
        );

        log::debug!(
            "Streaming caption request for {} ({} bytes, {})",
            path.display(),
            payload.len(),
            mime_type
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("Generation request failed ({}): {}", status, body);
            return Err(classify_failure(&format!("{} {}", status, body)));
        }

        let mut stream = response.bytes_stream();
        let mut sse = SseTextStream::new();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(map_transport_error)?;
            sse.push(&bytes, &mut on_partial)?;
        }

        sse.finish(&mut on_partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_maps_to_access_restricted() {
        let e = classify_failure(
            "Request failed with status 403 and status PERMISSION_DENIED for this project",
        );
        assert_eq!(e, GenerationError::AccessRestricted);

        let e = classify_failure("Region not supported for the API");
        assert_eq!(e, GenerationError::AccessRestricted);
    }

    #[test]
    fn test_status_and_transport_failures_map_to_transfer() {
        assert_eq!(
            classify_failure("500 Internal Server Error"),
            GenerationError::Transfer
        );
        assert_eq!(
            classify_failure("400 Bad Request: payload exceeds limit"),
            GenerationError::Transfer
        );
        assert_eq!(
            classify_failure("connection closed before message completed"),
            GenerationError::Transfer
        );
    }

    #[test]
    fn test_region_denial_wins_over_status_code() {
        // A 4xx that is really a region denial must keep its class.
        assert_eq!(
            classify_failure("HTTP 403: User location is not supported (400 fallback)"),
            GenerationError::AccessRestricted
        );
    }

    #[test]
    fn test_unknown_failures_pass_through_with_fallback() {
        assert_eq!(
            classify_failure("  the model is overloaded right now  "),
            GenerationError::Provider("the model is overloaded right now".to_string())
        );
        assert_eq!(
            classify_failure("   "),
            GenerationError::Provider(GENERIC_FAILURE_MESSAGE.to_string())
        );
    }

    #[test]
    fn test_resolve_prompt() {
        assert_eq!(resolve_prompt("  "), DEFAULT_STYLE_PROMPT);
        assert_eq!(resolve_prompt(""), DEFAULT_STYLE_PROMPT);
        assert_eq!(resolve_prompt(" witty, short "), "witty, short");
    }

    #[test]
    fn test_parse_stream_line_extracts_text() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"Hello"}]}}]}"#;
        assert_eq!(parse_stream_line(line).unwrap(), Some("Hello".to_string()));

        assert_eq!(parse_stream_line("").unwrap(), None);
        assert_eq!(parse_stream_line("event: ping").unwrap(), None);
        assert_eq!(parse_stream_line("data:").unwrap(), None);
    }

    #[test]
    fn test_parse_stream_line_surfaces_provider_errors() {
        let line = r#"data: {"error":{"code":403,"status":"PERMISSION_DENIED","message":"denied"}}"#;
        assert_eq!(
            parse_stream_line(line).unwrap_err(),
            GenerationError::AccessRestricted
        );

        assert_eq!(
            parse_stream_line("data: {not json").unwrap_err(),
            GenerationError::Transfer
        );
    }

    #[test]
    fn test_stream_callback_values_are_prefix_extensions() {
        let mut sse = SseTextStream::new();
        let mut seen: Vec<String> = Vec::new();
        let mut on_partial = |s: &str| seen.push(s.to_string());

        let feed = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"A sunny \"}]}}]}\n",
            "\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"beach day\"}]}}]}\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" #summer\"}]}}]}\n",
        );

        // Split mid-line to exercise the chunk-boundary buffering.
        let bytes = feed.as_bytes();
        sse.push(&bytes[..20], &mut on_partial).unwrap();
        sse.push(&bytes[20..], &mut on_partial).unwrap();
        let final_text = sse.finish(&mut on_partial).unwrap();

        assert_eq!(final_text, "A sunny beach day #summer");
        assert_eq!(seen.len(), 3);
        for pair in seen.windows(2) {
            assert!(
                pair[1].starts_with(&pair[0]),
                "{:?} does not extend {:?}",
                pair[1],
                pair[0]
            );
        }
        assert_eq!(seen.last().unwrap(), "A sunny beach day #summer");
    }

    #[test]
    fn test_chunks_without_text_do_not_fire_the_callback() {
        let mut sse = SseTextStream::new();
        let mut calls = 0usize;
        let mut on_partial = |_: &str| calls += 1;

        let feed = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"hi\"}]}}]}\n",
            "data: {\"candidates\":[{\"finishReason\":\"STOP\"}]}\n",
        );
        sse.push(feed.as_bytes(), &mut on_partial).unwrap();
        let text = sse.finish(&mut on_partial).unwrap();

        assert_eq!(text, "hi");
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_any_work() {
        let client = GeminiClient::new(vec!["   ".to_string()], "gemini-2.5-flash".to_string());
        let result = client
            .generate_caption(Path::new("does-not-exist.mp4"), "video/mp4", "", |_| {})
            .await;
        assert_eq!(result.unwrap_err(), GenerationError::MissingCredential);
    }
}
