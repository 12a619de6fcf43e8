//! In-process providers
//!
//! [`ScriptedProvider`] replays a fixed list of chunks, optionally failing at
//! the end. [`ChannelProvider`] hands every opened stream to the caller so a
//! test can decide exactly when each event arrives.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::traits::{BackendConfig, CompletionProvider, CompletionRequest, ProviderEvent};

/// Provider that replays a fixed script
#[derive(Clone, Debug, Default)]
pub struct ScriptedProvider {
    chunks: Vec<String>,
    fail_with: Option<String>,
    refuse_with: Option<String>,
    delay: Option<Duration>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    /// Provider that emits `chunks` then `Done`
    pub fn new<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Create from `BackendConfig`, `None` for other backend kinds
    #[must_use]
    pub fn from_config(config: &BackendConfig) -> Option<Self> {
        match config {
            BackendConfig::Scripted { chunks, fail_with } => {
                let mut provider = Self::new(chunks.clone());
                provider.fail_with.clone_from(fail_with);
                Some(provider)
            }
            _ => None,
        }
    }

    /// Emit `Error(message)` after the chunks instead of `Done`
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    /// Fail to open the stream at all
    #[must_use]
    pub fn refusing(mut self, message: impl Into<String>) -> Self {
        self.refuse_with = Some(message.into());
        self
    }

    /// Wait this long before each event
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every request received so far
    #[must_use]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn health_check(&self) -> bool {
        self.refuse_with.is_none()
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
    ) -> anyhow::Result<mpsc::Receiver<ProviderEvent>> {
        self.requests.lock().push(request.clone());

        if let Some(ref message) = self.refuse_with {
            anyhow::bail!("{message}");
        }

        let (tx, rx) = mpsc::channel(self.chunks.len() + 1);
        let mut events: Vec<ProviderEvent> = self
            .chunks
            .iter()
            .cloned()
            .map(ProviderEvent::Chunk)
            .collect();
        events.push(match self.fail_with {
            Some(ref message) => ProviderEvent::Error(message.clone()),
            None => ProviderEvent::Done,
        });
        let delay = self.delay;

        tokio::spawn(async move {
            for event in events {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }
}

/// One stream opened through a [`ChannelProvider`]
#[derive(Debug)]
pub struct OpenedStream {
    /// The request that opened it
    pub request: CompletionRequest,
    /// Sender feeding the stream; dropping it closes the stream
    pub events: mpsc::Sender<ProviderEvent>,
}

impl OpenedStream {
    /// Send a chunk, ignoring a closed receiver
    pub async fn chunk(&self, text: impl Into<String>) {
        let _ = self.events.send(ProviderEvent::Chunk(text.into())).await;
    }

    /// Send `Done`
    pub async fn done(&self) {
        let _ = self.events.send(ProviderEvent::Done).await;
    }

    /// Send `Error(message)`
    pub async fn error(&self, message: impl Into<String>) {
        let _ = self.events.send(ProviderEvent::Error(message.into())).await;
    }
}

/// Provider whose streams are driven by the caller
#[derive(Clone)]
pub struct ChannelProvider {
    opened: mpsc::UnboundedSender<OpenedStream>,
    capacity: usize,
}

/// Receiving side of a [`ChannelProvider`]
#[derive(Debug)]
pub struct ChannelHandle {
    opened: mpsc::UnboundedReceiver<OpenedStream>,
}

impl ChannelProvider {
    /// Create a provider and the handle that receives its streams
    #[must_use]
    pub fn new() -> (Self, ChannelHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                opened: tx,
                capacity: 64,
            },
            ChannelHandle { opened: rx },
        )
    }
}

impl ChannelHandle {
    /// Wait for the next `stream()` call
    pub async fn next_stream(&mut self) -> Option<OpenedStream> {
        self.opened.recv().await
    }
}

#[async_trait]
impl CompletionProvider for ChannelProvider {
    fn name(&self) -> &str {
        "Channel"
    }

    async fn health_check(&self) -> bool {
        !self.opened.is_closed()
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
    ) -> anyhow::Result<mpsc::Receiver<ProviderEvent>> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.opened
            .send(OpenedStream {
                request: request.clone(),
                events: tx,
            })
            .map_err(|_| anyhow::anyhow!("channel provider handle dropped"))?;
        Ok(rx)
    }
}
