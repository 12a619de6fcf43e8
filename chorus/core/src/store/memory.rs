//! In-memory transcript store

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::traits::{
    recent_turns, truncate_turns, update_answer_in, upsert_turn, StoreError, TranscriptStore,
};
use crate::messages::{Message, MessageId, Turn, TurnId};

/// Transcript kept in process memory
///
/// Useful for tests and for sessions that should not touch the disk.
/// [`set_failing`](Self::set_failing) makes every write fail, to exercise
/// persistence error paths.
#[derive(Debug, Default)]
pub struct MemoryTranscriptStore {
    turns: RwLock<Vec<Turn>>,
    title: RwLock<Option<String>>,
    failing: AtomicBool,
}

impl MemoryTranscriptStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of every stored turn, oldest first
    #[must_use]
    pub fn turns(&self) -> Vec<Turn> {
        self.turns.read().clone()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TranscriptStore for MemoryTranscriptStore {
    async fn persist(&self, question: &Message, answers: &[Message]) -> Result<TurnId, StoreError> {
        self.check_writable()?;
        Ok(upsert_turn(&mut self.turns.write(), question, answers))
    }

    async fn load_recent(&self, limit: usize) -> Result<Vec<Turn>, StoreError> {
        Ok(recent_turns(&self.turns.read(), limit))
    }

    async fn update_answer(&self, id: &MessageId, content: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        update_answer_in(&mut self.turns.write(), id, content)
    }

    async fn truncate_from(&self, id: &MessageId) -> Result<usize, StoreError> {
        self.check_writable()?;
        Ok(truncate_turns(&mut self.turns.write(), id))
    }

    async fn title(&self) -> Result<Option<String>, StoreError> {
        Ok(self.title.read().clone())
    }

    async fn set_title(&self, title: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        *self.title.write() = Some(title.trim().to_string()).filter(|t| !t.is_empty());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ProviderId;

    #[tokio::test]
    async fn test_persist_and_load() {
        let store = MemoryTranscriptStore::new();
        let question = Message::question("hello");
        let mut answer = Message::answer(ProviderId::from("ollama"));
        answer.content = "hi".to_string();

        store.persist(&question, &[answer.clone()]).await.unwrap();
        let turns = store.load_recent(10).await.unwrap();

        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].question, question);
        assert_eq!(turns[0].answers, vec![answer]);
    }

    #[tokio::test]
    async fn test_failing_store_rejects_writes() {
        let store = MemoryTranscriptStore::new();
        store.set_failing(true);

        let err = store
            .persist(&Message::question("q"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(store.turns().is_empty());

        store.set_failing(false);
        assert!(store.persist(&Message::question("q"), &[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_answer() {
        let store = MemoryTranscriptStore::new();
        let answer = Message::answer(ProviderId::from("groq"));
        store
            .persist(&Message::question("q"), &[answer.clone()])
            .await
            .unwrap();

        store.update_answer(&answer.id, "edited").await.unwrap();
        assert_eq!(store.turns()[0].answers[0].content, "edited");
    }

    #[tokio::test]
    async fn test_title() {
        let store = MemoryTranscriptStore::new();
        assert_eq!(store.title().await.unwrap(), None);

        store.set_title("Weekend plans").await.unwrap();
        assert_eq!(store.title().await.unwrap().as_deref(), Some("Weekend plans"));

        store.set_failing(true);
        assert!(store.set_title("other").await.is_err());
        assert_eq!(store.title().await.unwrap().as_deref(), Some("Weekend plans"));
    }
}
