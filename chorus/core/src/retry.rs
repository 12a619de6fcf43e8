//! Retry and Edit
//!
//! Policy layer over [`TurnOrchestrator`]:
//!
//! - [`RetryCoordinator::retry`] re-runs one provider against the most recent
//!   committed turn. Sibling answers are carried over untouched and the retried
//!   answer keeps its message ID, so committing updates the stored turn in place.
//! - [`RetryCoordinator::edit_question`] drops an older question and everything
//!   after it (in memory and in the store), then asks the edited question as a
//!   new turn.

use std::collections::{HashMap, HashSet};

use crate::messages::{Message, MessageId, ProviderId};
use crate::orchestrator::{OrchestratorError, TurnOrchestrator};
use crate::store::TranscriptStore;

/// What a retry restores and replaces, computed from the in-memory transcript
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RetryPlan {
    /// Question re-held with its original ID
    pub(crate) question: Message,
    /// Sibling answers to carry over, by provider
    pub(crate) restored: HashMap<ProviderId, Message>,
    /// Message ID the retried answer keeps, if the target answered before
    pub(crate) target_answer_id: Option<MessageId>,
    /// Messages removed from the in-memory transcript until recommitted
    pub(crate) drop_ids: HashSet<MessageId>,
}

/// Plan a retry of `target` against the last committed turn
///
/// Returns `None` when the transcript holds no question.
pub(crate) fn plan_retry(
    history: &[Message],
    enabled: &[ProviderId],
    target: &ProviderId,
) -> Option<RetryPlan> {
    let start = history.iter().rposition(Message::is_question)?;
    let question = history[start].clone();
    let answers = &history[start + 1..];

    let answer_of = |provider: &ProviderId| {
        answers
            .iter()
            .find(|m| m.provider.as_ref() == Some(provider))
    };

    let restored = enabled
        .iter()
        .filter(|id| *id != target)
        .filter_map(|id| answer_of(id).map(|m| (id.clone(), m.clone())))
        .collect();

    Some(RetryPlan {
        target_answer_id: answer_of(target).map(|m| m.id.clone()),
        drop_ids: history[start..].iter().map(|m| m.id.clone()).collect(),
        question,
        restored,
    })
}

/// Releases an edit reservation unless the edit went through
///
/// Covers both a failed truncation and a caller dropping the future mid-await.
struct EditReservation<'a, S: TranscriptStore> {
    orchestrator: &'a TurnOrchestrator<S>,
    held: bool,
}

impl<S: TranscriptStore> Drop for EditReservation<'_, S> {
    fn drop(&mut self) {
        if self.held {
            self.orchestrator.cancel_edit();
        }
    }
}

/// Restarts single providers and re-asks edited questions
pub struct RetryCoordinator<S> {
    orchestrator: TurnOrchestrator<S>,
}

impl<S: TranscriptStore> RetryCoordinator<S> {
    /// Wrap an orchestrator
    #[must_use]
    pub fn new(orchestrator: TurnOrchestrator<S>) -> Self {
        Self { orchestrator }
    }

    /// The wrapped orchestrator
    #[must_use]
    pub fn orchestrator(&self) -> &TurnOrchestrator<S> {
        &self.orchestrator
    }

    /// Re-run `provider` for the most recent committed turn
    ///
    /// Returns `false` if a turn is in progress, the provider is unknown or
    /// nothing has been committed yet.
    pub fn retry(&self, provider: &ProviderId) -> bool {
        self.orchestrator.restart_provider(provider)
    }

    /// Replace the question `older` and everything after it with a new question
    ///
    /// The orchestrator is reserved before the store is truncated, so no other
    /// turn can start in between. A failed or abandoned truncation releases the
    /// reservation and leaves the in-memory transcript untouched. Returns `Ok(false)`
    /// when the content is blank, a turn is in progress, or `older` is not a
    /// committed question.
    ///
    /// # Errors
    ///
    /// Returns an error if the store could not be truncated.
    pub async fn edit_question(
        &self,
        older: &MessageId,
        content: &str,
    ) -> Result<bool, OrchestratorError> {
        if content.trim().is_empty() {
            tracing::debug!("Rejecting blank edited question");
            return Ok(false);
        }
        if !self.orchestrator.begin_edit(older) {
            return Ok(false);
        }
        let mut reservation = EditReservation {
            orchestrator: &self.orchestrator,
            held: true,
        };

        let removed = self.orchestrator.store().truncate_from(older).await?;
        reservation.held = false;
        tracing::info!(message_id = %older, removed, "Truncated transcript for edit");
        Ok(self.orchestrator.resubmit_from(older, content))
    }
}
