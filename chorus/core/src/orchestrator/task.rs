//! Provider Task
//!
//! Drives one provider's event stream into the orchestrator. One task runs per
//! enabled provider per dispatch; a retry aborts the old task and spawns a new
//! one under a higher generation.

use std::sync::Arc;

use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use super::turn::{Ticket, TurnOrchestrator};
use crate::provider::{CompletionProvider, CompletionRequest, ProviderEvent};
use crate::store::TranscriptStore;

/// Reported when a provider channel closes without `Done` or `Error`
pub(crate) const DISCONNECTED: &str = "stream disconnected unexpectedly";

pub(crate) struct ProviderTask<S> {
    orchestrator: TurnOrchestrator<S>,
    ticket: Ticket,
    provider: Arc<dyn CompletionProvider>,
    request: CompletionRequest,
}

impl<S: TranscriptStore> ProviderTask<S> {
    pub(crate) fn new(
        orchestrator: TurnOrchestrator<S>,
        ticket: Ticket,
        provider: Arc<dyn CompletionProvider>,
        request: CompletionRequest,
    ) -> Self {
        Self {
            orchestrator,
            ticket,
            provider,
            request,
        }
    }

    pub(crate) async fn run(self) {
        let rx = match self.provider.stream(&self.request).await {
            Ok(rx) => rx,
            Err(e) => {
                self.fail(format!("{e:#}")).await;
                return;
            }
        };

        let mut events = ReceiverStream::new(rx);
        while let Some(event) = events.next().await {
            match event {
                ProviderEvent::Chunk(text) => {
                    if !self.orchestrator.chunk_for(&self.ticket, &text) {
                        // superseded by a newer dispatch
                        return;
                    }
                }
                ProviderEvent::Done => {
                    if let Err(e) = self.orchestrator.done_for(&self.ticket).await {
                        tracing::debug!(provider = %self.ticket.provider, error = %e, "Commit after done failed");
                    }
                    return;
                }
                ProviderEvent::Error(message) => {
                    self.fail(message).await;
                    return;
                }
            }
        }

        self.fail(DISCONNECTED.to_string()).await;
    }

    async fn fail(&self, message: String) {
        if let Err(e) = self.orchestrator.error_for(&self.ticket, message).await {
            tracing::debug!(provider = %self.ticket.provider, error = %e, "Commit after error failed");
        }
    }
}
