use async_trait::async_trait;
use elt_core::model::ConfiguredCatalog;
use elt_protocol::Message;
use futures_util::stream::BoxStream;
use std::time::Duration;

/// Default subprocess wall-clock timeout (§4.2, §5): one hour.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// A connector's RECORD/STATE/LOG/... message stream, yielded one message
/// at a time so the orchestrator never has to buffer a whole run (§4.2
/// "Streaming read").
pub type MessageStream = BoxStream<'static, anyhow::Result<Message>>;

/// The four operations every connector — in-process or subprocess —
/// exposes, keyed by connector identifier (§4.2 "Contract", §9
/// "Plugin-style connectors": a tagged capability table, not runtime class
/// dispatch).
#[async_trait]
pub trait Connector: Send + Sync {
    fn connector_id(&self) -> &str;

    async fn spec(&self) -> anyhow::Result<Message>;

    async fn check(&self, config: &serde_json::Value) -> anyhow::Result<Message>;

    async fn discover(&self, config: &serde_json::Value) -> anyhow::Result<Message>;

    /// Stream messages for `configured_catalog`, resuming from
    /// `prior_state` when present.
    async fn read(
        &self,
        config: &serde_json::Value,
        configured_catalog: &ConfiguredCatalog,
        prior_state: Option<&serde_json::Value>,
    ) -> anyhow::Result<MessageStream>;
}

/// The outcome of running a connector operation to completion (§4.2: both
/// backends return this same shape).
#[derive(Debug, Default)]
pub struct ExecutionResult {
    pub success: bool,
    pub messages: Vec<Message>,
    pub record_count: usize,
    pub duration: Duration,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
}

/// Drain a message stream to completion, honoring `timeout`. On timeout,
/// whatever was already yielded is preserved in the result (§4.2 "On
/// timeout": preserve partial records already consumed).
pub async fn collect_with_timeout(
    mut stream: MessageStream,
    timeout: Duration,
) -> ExecutionResult {
    use tokio_stream::StreamExt;

    let started = std::time::Instant::now();
    let mut messages = Vec::new();
    let mut record_count = 0usize;
    let mut error = None;

    let outcome = tokio::time::timeout(timeout, async {
        while let Some(item) = stream.next().await {
            match item {
                Ok(msg) => {
                    if msg.as_record().is_some() {
                        record_count += 1;
                    }
                    messages.push(msg);
                }
                Err(err) => {
                    error = Some(err.to_string());
                    break;
                }
            }
        }
    })
    .await;

    let mut success = outcome.is_ok() && error.is_none();
    if outcome.is_err() {
        error = Some(format!("execution exceeded timeout of {timeout:?}"));
        success = false;
    }

    ExecutionResult {
        success,
        messages,
        record_count,
        duration: started.elapsed(),
        error,
        exit_code: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elt_protocol::{LogLevel, LogPayload};
    use tokio_stream::StreamExt as _;

    fn log_msg(text: &str) -> anyhow::Result<Message> {
        Ok(Message::Log(LogPayload {
            level: LogLevel::Info,
            message: text.to_string(),
        }))
    }

    #[tokio::test]
    async fn collects_all_messages_within_timeout() {
        let stream: MessageStream =
            Box::pin(tokio_stream::iter(vec![log_msg("a"), log_msg("b")]));
        let result = collect_with_timeout(stream, Duration::from_secs(5)).await;
        assert!(result.success);
        assert_eq!(result.messages.len(), 2);
    }

    #[tokio::test]
    async fn timeout_preserves_partial_results() {
        let stream: MessageStream = Box::pin(
            tokio_stream::iter(vec![log_msg("a"), log_msg("b")]).then(|item| async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                item
            }),
        );
        let result = collect_with_timeout(stream, Duration::from_millis(45)).await;
        assert!(!result.success);
        assert!(result.error.is_some());
        assert_eq!(result.messages.len(), 1);
    }
}
