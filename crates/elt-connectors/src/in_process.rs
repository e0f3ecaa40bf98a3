use crate::executor::{Connector, MessageStream};
use async_trait::async_trait;
use elt_core::model::ConfiguredCatalog;
use elt_protocol::Message;

/// A source connector compiled directly into this address space (§4.2
/// "In-process"): operations are plain function calls, no subprocess, no
/// file-based config handoff.
pub trait LibrarySource: Send + Sync {
    fn connector_id(&self) -> &str;
    fn spec(&self) -> Message;
    fn check(&self, config: &serde_json::Value) -> Message;
    fn discover(&self, config: &serde_json::Value) -> Message;
    fn read(
        &self,
        config: &serde_json::Value,
        configured_catalog: &ConfiguredCatalog,
        prior_state: Option<&serde_json::Value>,
    ) -> MessageStream;
}

/// Adapts a [`LibrarySource`] to the uniform [`Connector`] contract so the
/// executor never has to know whether it is talking to a library or a
/// subprocess (§9 "Plugin-style connectors").
pub struct InProcessConnector<S: LibrarySource> {
    source: S,
}

impl<S: LibrarySource> InProcessConnector<S> {
    pub fn new(source: S) -> Self {
        InProcessConnector { source }
    }
}

#[async_trait]
impl<S: LibrarySource> Connector for InProcessConnector<S> {
    fn connector_id(&self) -> &str {
        self.source.connector_id()
    }

    async fn spec(&self) -> anyhow::Result<Message> {
        Ok(self.source.spec())
    }

    async fn check(&self, config: &serde_json::Value) -> anyhow::Result<Message> {
        Ok(self.source.check(config))
    }

    async fn discover(&self, config: &serde_json::Value) -> anyhow::Result<Message> {
        Ok(self.source.discover(config))
    }

    async fn read(
        &self,
        config: &serde_json::Value,
        configured_catalog: &ConfiguredCatalog,
        prior_state: Option<&serde_json::Value>,
    ) -> anyhow::Result<MessageStream> {
        Ok(self.source.read(config, configured_catalog, prior_state))
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod testing {
    use super::*;
    use elt_protocol::{ConnectionCheckStatus, ConnectionStatusPayload};

    /// Deterministic in-process source that replays a fixed script of
    /// messages, for orchestrator/scheduler tests (mirrors a provider test
    /// double that returns configured bars rather than hitting a network).
    pub struct ScriptedSource {
        pub id: String,
        pub messages: Vec<Message>,
    }

    impl LibrarySource for ScriptedSource {
        fn connector_id(&self) -> &str {
            &self.id
        }

        fn spec(&self) -> Message {
            Message::ConnectionStatus(ConnectionStatusPayload {
                status: ConnectionCheckStatus::Succeeded,
                message: None,
            })
        }

        fn check(&self, _config: &serde_json::Value) -> Message {
            Message::ConnectionStatus(ConnectionStatusPayload {
                status: ConnectionCheckStatus::Succeeded,
                message: None,
            })
        }

        fn discover(&self, _config: &serde_json::Value) -> Message {
            Message::ConnectionStatus(ConnectionStatusPayload {
                status: ConnectionCheckStatus::Succeeded,
                message: None,
            })
        }

        fn read(
            &self,
            _config: &serde_json::Value,
            _configured_catalog: &ConfiguredCatalog,
            _prior_state: Option<&serde_json::Value>,
        ) -> MessageStream {
            let items: Vec<anyhow::Result<Message>> =
                self.messages.iter().cloned().map(Ok).collect();
            Box::pin(tokio_stream::iter(items))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedSource;
    use super::*;
    use elt_core::model::ConfiguredCatalog;
    use elt_protocol::{LogLevel, LogPayload};
    use tokio_stream::StreamExt as _;

    #[tokio::test]
    async fn in_process_connector_replays_scripted_messages() {
        let source = ScriptedSource {
            id: "scripted".into(),
            messages: vec![Message::Log(LogPayload {
                level: LogLevel::Info,
                message: "hi".into(),
            })],
        };
        let connector = InProcessConnector::new(source);
        assert_eq!(connector.connector_id(), "scripted");

        let catalog = ConfiguredCatalog::default();
        let mut stream = connector.read(&serde_json::json!({}), &catalog, None).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert!(matches!(first, Message::Log(_)));
    }
}
