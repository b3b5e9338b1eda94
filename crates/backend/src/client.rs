use std::pin::Pin;

use {
    futures::StreamExt,
    secrecy::{ExposeSecret, Secret},
    tokio_stream::Stream,
    tracing::{debug, trace, warn},
};

use gemrelay_sessions::Turn;

use crate::wire;

pub(crate) const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const MAX_OUTPUT_TOKENS: u32 = 8192;

/// One consumption step of a streaming generation call.
///
/// Every fault kind a chunk can carry is a variant here, so the relay
/// dispatches with a single exhaustive match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStep {
    /// Incremental answer text.
    Chunk(String),
    /// The backend rejected the *input* on policy grounds.
    Blocked,
    /// The backend aborted *output* generation (safety, recitation, ...).
    Stopped,
    /// Connectivity failure; no further steps will arrive.
    Transport(String),
    /// A malformed event that could not be decoded; stream continues.
    Decode(String),
    /// Stream exhausted normally.
    Done,
}

/// Client for the Gemini generative-language REST API.
pub struct GeminiClient {
    api_key: Secret<String>,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiClient {
    #[must_use]
    pub fn new(api_key: Secret<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    #[must_use]
    pub fn with_base_url(api_key: Secret<String>, base_url: String) -> Self {
        Self {
            api_key,
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub(crate) fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// Issue one streaming generation request for the given turn history.
    ///
    /// The returned stream is finite and not restartable. It yields
    /// [`StreamStep::Done`] exactly once on normal exhaustion; after a
    /// [`StreamStep::Transport`] no further steps arrive.
    pub fn stream_generate(
        &self,
        model: &str,
        turns: &[Turn],
    ) -> Pin<Box<dyn Stream<Item = StreamStep> + Send + '_>> {
        let body = serde_json::json!({
            "contents": wire::to_contents(turns),
            "generationConfig": {
                "maxOutputTokens": MAX_OUTPUT_TOKENS,
            },
        });
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        );
        debug!(model, turns = turns.len(), "gemini stream request");
        trace!(body = %body, "gemini request body");

        Box::pin(async_stream::stream! {
            let resp = match self
                .client
                .post(&url)
                .header("x-goog-api-key", self.api_key.expose_secret())
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(r) => {
                    if r.status().is_success() {
                        r
                    } else {
                        let status = r.status();
                        let body_text = r.text().await.unwrap_or_default();
                        warn!(status = %status, body = %body_text, "gemini API error");
                        yield StreamStep::Transport(format!("HTTP {status}: {body_text}"));
                        return;
                    }
                },
                Err(e) => {
                    yield StreamStep::Transport(e.to_string());
                    return;
                },
            };

            let mut byte_stream = resp.bytes_stream();
            let mut buf = String::new();
            let mut stream_open = true;

            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield StreamStep::Transport(e.to_string());
                        return;
                    },
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));

                // Process complete SSE events (data: {...}\n\n).
                while let Some(pos) = buf.find("\n\n") {
                    let block = buf[..pos].to_string();
                    buf = buf[pos + 2..].to_string();

                    for line in block.lines() {
                        let Some(data) = line.strip_prefix("data: ") else {
                            continue;
                        };
                        let event = match serde_json::from_str::<serde_json::Value>(data) {
                            Ok(v) => v,
                            Err(e) => {
                                yield StreamStep::Decode(e.to_string());
                                continue;
                            },
                        };
                        for step in classify_event(&event) {
                            if step == StreamStep::Done {
                                stream_open = false;
                            }
                            yield step;
                        }
                        if !stream_open {
                            return;
                        }
                    }
                }
            }

            // Stream ended without an explicit finish reason; still done.
            yield StreamStep::Done;
        })
    }
}

/// Map one decoded SSE event to the steps it implies, in order.
fn classify_event(event: &serde_json::Value) -> Vec<StreamStep> {
    let mut steps = Vec::new();

    // Input rejected by policy — reported in promptFeedback, before any
    // candidate content.
    if event["promptFeedback"]["blockReason"].as_str().is_some() {
        steps.push(StreamStep::Blocked);
        return steps;
    }

    let candidate = &event["candidates"][0];
    if let Some(parts) = candidate["content"]["parts"].as_array() {
        for part in parts {
            if let Some(text) = part["text"].as_str() {
                if !text.is_empty() {
                    steps.push(StreamStep::Chunk(text.to_string()));
                }
            }
        }
    }

    if let Some(finish) = candidate["finishReason"].as_str() {
        match finish {
            "STOP" | "MAX_TOKENS" => steps.push(StreamStep::Done),
            other => {
                debug!(finish_reason = other, "generation stopped by backend");
                steps.push(StreamStep::Stopped);
            },
        }
    }

    steps
}
