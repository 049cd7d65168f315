//! Streaming reply consumption
//!
//! The chat endpoint answers with a plain-text body delivered in pieces.
//! [`consume_fragments`] drains such a stream in arrival order, handing each
//! non-empty fragment to the caller as soon as it arrives.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;

use super::message::HistoryEntry;
use crate::Result;

/// A reply body decoded into text fragments
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Chat completion endpoint
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send the conversation and start streaming the assistant reply
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the endpoint answers non-2xx
    async fn stream_reply(&self, history: Vec<HistoryEntry>) -> Result<FragmentStream>;
}

/// Totals for a fully consumed stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub fragments: usize,
    pub bytes: usize,
}

/// Apply every fragment of `stream` in order
///
/// Empty fragments are skipped. Stops at the first read error, after the
/// fragments received before it have been applied.
///
/// # Errors
///
/// Returns the stream's read error
pub async fn consume_fragments<F>(mut stream: FragmentStream, mut apply: F) -> Result<StreamSummary>
where
    F: FnMut(&str) + Send,
{
    let mut summary = StreamSummary::default();

    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        if fragment.is_empty() {
            continue;
        }

        summary.fragments += 1;
        summary.bytes += fragment.len();
        apply(&fragment);
    }

    tracing::debug!(
        fragments = summary.fragments,
        bytes = summary.bytes,
        "reply stream finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use futures::stream;

    fn fragments(items: Vec<Result<String>>) -> FragmentStream {
        stream::iter(items).boxed()
    }

    #[tokio::test]
    async fn test_fragments_applied_in_order() {
        let mut seen = Vec::new();
        let summary = consume_fragments(
            fragments(vec![Ok("Hel".into()), Ok(String::new()), Ok("lo".into())]),
            |f| seen.push(f.to_string()),
        )
        .await
        .unwrap();

        assert_eq!(seen, vec!["Hel", "lo"]);
        assert_eq!(summary, StreamSummary { fragments: 2, bytes: 5 });
    }

    #[tokio::test]
    async fn test_error_stops_after_applied_fragments() {
        let mut seen = String::new();
        let result = consume_fragments(
            fragments(vec![
                Ok("par".into()),
                Err(Error::Chat("connection reset".into())),
                Ok("never".into()),
            ]),
            |f| seen.push_str(f),
        )
        .await;

        assert!(matches!(result, Err(Error::Chat(_))));
        assert_eq!(seen, "par");
    }
}
