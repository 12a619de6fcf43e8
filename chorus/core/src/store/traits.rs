//! Transcript store trait and shared helpers

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::messages::{Message, MessageId, Turn, TurnId};

/// Errors raised by transcript stores
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to read or write the backing file
    #[error("Transcript I/O failed at {path}: {source}")]
    Io {
        /// File that was accessed
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Stored data could not be encoded or decoded
    #[error("Transcript serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No stored message has the requested ID
    #[error("Message not found: {0}")]
    NotFound(MessageId),

    /// The request itself was malformed
    #[error("Invalid store input: {0}")]
    Invalid(String),

    /// The store refused the operation
    #[error("Transcript store unavailable: {0}")]
    Unavailable(String),
}

/// Persistent transcript of committed turns
#[async_trait]
pub trait TranscriptStore: Send + Sync + 'static {
    /// Persist a turn, updating in place when the question ID is already stored
    ///
    /// Answers are matched by message ID, so re-persisting a retried answer
    /// replaces it instead of adding a second one.
    async fn persist(&self, question: &Message, answers: &[Message]) -> Result<TurnId, StoreError>;

    /// The `limit` most recent turns, oldest first
    async fn load_recent(&self, limit: usize) -> Result<Vec<Turn>, StoreError>;

    /// Replace the content of one stored answer
    async fn update_answer(&self, id: &MessageId, content: &str) -> Result<(), StoreError>;

    /// Remove the turn containing `id` and every later turn
    ///
    /// Returns the number of turns removed (0 when `id` is unknown).
    async fn truncate_from(&self, id: &MessageId) -> Result<usize, StoreError>;

    /// Title of the conversation, if one was set
    async fn title(&self) -> Result<Option<String>, StoreError>;

    /// Rename the conversation; a blank title clears it
    async fn set_title(&self, title: &str) -> Result<(), StoreError>;
}

/// Upsert a turn into an ordered list, returning its turn ID
pub(crate) fn upsert_turn(turns: &mut Vec<Turn>, question: &Message, answers: &[Message]) -> TurnId {
    if let Some(turn) = turns.iter_mut().find(|t| t.question.id == question.id) {
        turn.question = question.clone();
        for answer in answers {
            match turn.answers.iter_mut().find(|a| a.id == answer.id) {
                Some(existing) => *existing = answer.clone(),
                None => turn.answers.push(answer.clone()),
            }
        }
        return turn.id.clone();
    }

    let turn = Turn {
        id: TurnId::new(),
        question: question.clone(),
        answers: answers.to_vec(),
    };
    let id = turn.id.clone();
    turns.push(turn);
    id
}

/// Last `limit` turns, oldest first
pub(crate) fn recent_turns(turns: &[Turn], limit: usize) -> Vec<Turn> {
    let start = turns.len().saturating_sub(limit);
    turns[start..].to_vec()
}

/// Replace one answer's content in place
pub(crate) fn update_answer_in(
    turns: &mut [Turn],
    id: &MessageId,
    content: &str,
) -> Result<(), StoreError> {
    let answer = turns
        .iter_mut()
        .flat_map(|t| t.answers.iter_mut())
        .find(|a| a.id == *id)
        .ok_or_else(|| StoreError::NotFound(id.clone()))?;
    answer.content = content.to_string();
    Ok(())
}

/// Drop the turn containing `id` and everything after it
pub(crate) fn truncate_turns(turns: &mut Vec<Turn>, id: &MessageId) -> usize {
    match turns.iter().position(|t| t.contains(id)) {
        Some(index) => {
            let removed = turns.len() - index;
            turns.truncate(index);
            removed
        }
        None => 0,
    }
}
