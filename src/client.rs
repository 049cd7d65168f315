//! HTTP client for the chat, transcription and speech endpoints

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};

use crate::chat::{ChatBackend, FragmentStream, HistoryEntry, Utf8Decoder};
use crate::config::ApiConfig;
use crate::voice::{AudioClip, AudioFormat, SpeechBackend};
use crate::{Error, Result};

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [HistoryEntry],
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
}

/// Client for the portfolio backend
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    config: ApiConfig,
}

impl ApiClient {
    /// Create a client for the configured endpoints
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub const fn config(&self) -> &ApiConfig {
        &self.config
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn stream_reply(&self, history: Vec<HistoryEntry>) -> Result<FragmentStream> {
        let url = self.config.chat_url();
        tracing::debug!(url = %url, messages = history.len(), "sending chat request");

        let response = self
            .client
            .post(&url)
            .json(&ChatRequest { messages: &history })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "chat request failed");
                Error::Chat(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat endpoint error");
            return Err(Error::Chat(format!("chat endpoint returned {status}")));
        }

        Ok(decode_body(response.bytes_stream().boxed()))
    }
}

/// Turn a byte stream into UTF-8 text fragments
///
/// Multi-byte sequences split across chunks are carried over to the next
/// chunk; whatever remains at end of stream is flushed as a final fragment.
fn decode_body<B, E>(body: BoxStream<'static, std::result::Result<B, E>>) -> FragmentStream
where
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    enum State<B, E> {
        Reading(BoxStream<'static, std::result::Result<B, E>>, Utf8Decoder),
        Done,
    }

    stream::unfold(State::Reading(body, Utf8Decoder::default()), |state| async move {
        let State::Reading(mut body, mut decoder) = state else {
            return None;
        };

        match body.next().await {
            Some(Ok(chunk)) => {
                let text = decoder.decode(chunk.as_ref());
                Some((Ok(text), State::Reading(body, decoder)))
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "chat stream read failed");
                Some((Err(Error::Chat(e.to_string())), State::Done))
            }
            None => {
                let rest = decoder.finish();
                if rest.is_empty() {
                    None
                } else {
                    Some((Ok(rest), State::Done))
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl SpeechBackend for ApiClient {
    async fn transcribe(&self, clip: &AudioClip) -> Result<String> {
        let url = self.config.transcribe_url();
        tracing::debug!(url = %url, audio_bytes = clip.data.len(), "starting transcription");

        let part = reqwest::multipart::Part::bytes(clip.data.clone())
            .file_name(clip.format.file_name())
            .mime_str(clip.format.mime_type())
            .map_err(|e| Error::Transcription(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Transcription(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription endpoint error");
            return Err(Error::Transcription(format!(
                "transcription endpoint returned {status}"
            )));
        }

        let result: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(e.to_string()))?;

        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }

    async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        let url = self.config.speak_url();
        tracing::debug!(url = %url, chars = text.chars().count(), "starting synthesis");

        let response = self
            .client
            .post(&url)
            .json(&SpeakRequest { text })
            .send()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "speech endpoint error");
            return Err(Error::Synthesis(format!("speech endpoint returned {status}")));
        }

        let format = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(AudioFormat::from_mime)
            .unwrap_or(AudioFormat::Mp3);

        let data = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;

        tracing::debug!(audio_bytes = data.len(), ?format, "synthesis complete");
        Ok(AudioClip::new(data.to_vec(), format))
    }
}
