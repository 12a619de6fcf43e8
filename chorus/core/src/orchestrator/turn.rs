//! Turn orchestration and the commit barrier

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::AbortHandle;

use super::state::{
    CommitEvent, EnabledProvider, OrchestratorConfig, OrchestratorError, ProviderSnapshot,
    ProviderState,
};
use super::task::ProviderTask;
use crate::blocks::StreamAccumulator;
use crate::messages::{now_secs, Message, MessageId, ProviderId, TurnId};
use crate::provider::{CompletionProvider, CompletionRequest, HistoryMessage};
use crate::retry::plan_retry;
use crate::store::{Mask, TranscriptStore};

/// Capacity of the commit event broadcast
const COMMIT_EVENT_CAPACITY: usize = 16;

/// Identifies one dispatch of one provider
///
/// Events carrying an older generation belong to a cancelled task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Ticket {
    pub(crate) provider: ProviderId,
    pub(crate) generation: u64,
}

/// How a provider stream ended
enum Outcome {
    Done,
    Error(String),
}

/// Per-provider bookkeeping for the active turn
struct ProviderSlot {
    id: ProviderId,
    model: String,
    provider: Arc<dyn CompletionProvider>,
    state: ProviderState,
    answer: Message,
    accumulator: StreamAccumulator,
    generation: u64,
    /// Whether this provider's answer belongs to the held turn
    in_turn: bool,
    task: Option<AbortHandle>,
    snapshot_tx: watch::Sender<ProviderSnapshot>,
}

impl ProviderSlot {
    fn new(enabled: EnabledProvider) -> Self {
        let (snapshot_tx, _) = watch::channel(ProviderSnapshot::default());
        Self {
            answer: Message::answer(enabled.id.clone()),
            id: enabled.id,
            model: enabled.model,
            provider: enabled.provider,
            state: ProviderState::Idle,
            accumulator: StreamAccumulator::new(),
            generation: 0,
            in_turn: false,
            task: None,
            snapshot_tx,
        }
    }

    fn accepts(&self, generation: u64) -> bool {
        self.state == ProviderState::Loading && self.generation == generation
    }

    fn snapshot(&self) -> ProviderSnapshot {
        let answer_text = if self.accumulator.is_empty() {
            self.answer.content.clone()
        } else {
            self.accumulator.raw_text().to_string()
        };
        ProviderSnapshot {
            answer_text,
            blocks: self.accumulator.blocks().to_vec(),
            state: self.state,
        }
    }

    fn publish(&self, publishing: bool) {
        if publishing {
            self.snapshot_tx.send_replace(self.snapshot());
        }
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Clear the answer for a new turn
    fn clear(&mut self) {
        self.answer = Message::answer(self.id.clone());
        self.accumulator.reset();
        self.in_turn = false;
    }

    /// Put back an answer carried over from an earlier commit
    fn restore(&mut self, answer: Message) {
        self.accumulator.reset();
        self.accumulator.append(&answer.content);
        self.accumulator.finish();
        self.answer = answer;
        self.in_turn = true;
    }
}

/// A completed turn on its way to the store
struct PendingCommit {
    question: Message,
    answers: Vec<Message>,
}

impl PendingCommit {
    fn ids(&self) -> HashSet<MessageId> {
        std::iter::once(&self.question)
            .chain(self.answers.iter())
            .map(|m| m.id.clone())
            .collect()
    }
}

struct TurnState {
    /// Held question; blank when no turn is in progress
    question: Message,
    slots: Vec<ProviderSlot>,
    /// Set while a fired barrier is being persisted
    committing: bool,
    /// Set while an edit truncates the store
    editing: bool,
    /// Committed messages, oldest first
    history: Vec<Message>,
    publishing: bool,
    /// System prompt for the next dispatch
    system_prompt: Option<String>,
}

impl TurnState {
    fn all_idle(&self) -> bool {
        self.slots.iter().all(|s| s.state == ProviderState::Idle)
    }

    fn is_ready(&self) -> bool {
        self.all_idle() && !self.committing && !self.editing && self.question.is_blank()
    }

    fn slot(&self, id: &ProviderId) -> Option<&ProviderSlot> {
        self.slots.iter().find(|s| s.id == *id)
    }

    fn slot_mut(&mut self, id: &ProviderId) -> Option<&mut ProviderSlot> {
        self.slots.iter_mut().find(|s| s.id == *id)
    }

    /// Fire the barrier if the held turn just became complete
    fn take_commit(&mut self) -> Option<PendingCommit> {
        if self.committing || self.question.is_blank() || !self.all_idle() {
            return None;
        }
        self.committing = true;
        Some(PendingCommit {
            question: self.question.clone(),
            answers: self
                .slots
                .iter()
                .filter(|s| s.in_turn)
                .map(|s| s.answer.clone())
                .collect(),
        })
    }

    fn finish_commit(&mut self, pending: PendingCommit) {
        let ids = pending.ids();
        self.history.retain(|m| !ids.contains(&m.id));
        self.history.push(pending.question);
        self.history.extend(pending.answers);

        self.committing = false;
        self.question = Message::question(String::new());
        let publishing = self.publishing;
        for slot in &mut self.slots {
            slot.clear();
            slot.publish(publishing);
        }
    }

    /// Conversation replayed to one provider: questions plus its own answers
    fn history_for(&self, provider: &ProviderId) -> Vec<HistoryMessage> {
        self.history
            .iter()
            .filter(|m| m.is_question() || m.provider.as_ref() == Some(provider))
            .filter(|m| !m.is_blank())
            .map(|m| HistoryMessage {
                role: m.role(),
                content: m.content.clone(),
            })
            .collect()
    }
}

struct Inner<S> {
    store: Arc<S>,
    config: OrchestratorConfig,
    state: Mutex<TurnState>,
    idle_tx: watch::Sender<bool>,
    commit_tx: broadcast::Sender<CommitEvent>,
}

/// Fans one question out to every enabled provider and commits the turn once
///
/// All bookkeeping sits behind a single lock that is never held across an
/// `.await`. The commit barrier is decided in the same critical section as
/// the `Loading -> Idle` transition that completes the turn, so it fires at
/// most once per submitted question.
pub struct TurnOrchestrator<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for TurnOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: TranscriptStore> TurnOrchestrator<S> {
    /// Create an orchestrator over the enabled providers, in declaration order
    ///
    /// # Errors
    ///
    /// Returns an error if `providers` is empty or contains a duplicate ID.
    pub fn new(
        providers: Vec<EnabledProvider>,
        store: Arc<S>,
        config: OrchestratorConfig,
    ) -> Result<Self, OrchestratorError> {
        if providers.is_empty() {
            return Err(OrchestratorError::NoProviders);
        }
        let mut seen = HashSet::new();
        for enabled in &providers {
            if !seen.insert(enabled.id.clone()) {
                return Err(OrchestratorError::DuplicateProvider(enabled.id.clone()));
            }
        }

        let (idle_tx, _) = watch::channel(true);
        let (commit_tx, _) = broadcast::channel(COMMIT_EVENT_CAPACITY);
        let state = TurnState {
            question: Message::question(String::new()),
            slots: providers.into_iter().map(ProviderSlot::new).collect(),
            committing: false,
            editing: false,
            history: Vec::new(),
            publishing: true,
            system_prompt: config.system_prompt.clone(),
        };

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                config,
                state: Mutex::new(state),
                idle_tx,
                commit_tx,
            }),
        })
    }

    /// The transcript store commits go to
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    /// Enabled provider IDs in declaration order
    #[must_use]
    pub fn providers(&self) -> Vec<ProviderId> {
        self.inner.state.lock().slots.iter().map(|s| s.id.clone()).collect()
    }

    /// Whether every provider is idle
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.inner.state.lock().all_idle()
    }

    /// Whether a new question would be accepted right now
    #[must_use]
    pub fn can_submit(&self) -> bool {
        self.inner.state.lock().is_ready()
    }

    /// Lifecycle state of one provider
    #[must_use]
    pub fn provider_state(&self, provider: &ProviderId) -> Option<ProviderState> {
        self.inner.state.lock().slot(provider).map(|s| s.state)
    }

    /// The question currently held, if any
    #[must_use]
    pub fn pending_question(&self) -> Option<Message> {
        let state = self.inner.state.lock();
        (!state.question.is_blank()).then(|| state.question.clone())
    }

    /// Current answer message of one provider
    #[must_use]
    pub fn answer(&self, provider: &ProviderId) -> Option<Message> {
        self.inner.state.lock().slot(provider).map(|s| s.answer.clone())
    }

    /// Committed messages known to this orchestrator, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<Message> {
        self.inner.state.lock().history.clone()
    }

    /// Watch one provider's snapshots
    #[must_use]
    pub fn subscribe(&self, provider: &ProviderId) -> Option<watch::Receiver<ProviderSnapshot>> {
        self.inner
            .state
            .lock()
            .slot(provider)
            .map(|s| s.snapshot_tx.subscribe())
    }

    /// Watch whether a new question would be accepted
    ///
    /// The flag turns `true` only after every provider is idle and the
    /// completed turn has been persisted, so it always agrees with
    /// [`can_submit`](Self::can_submit).
    #[must_use]
    pub fn subscribe_idle(&self) -> watch::Receiver<bool> {
        self.inner.idle_tx.subscribe()
    }

    /// Receive commit outcomes
    #[must_use]
    pub fn subscribe_commits(&self) -> broadcast::Receiver<CommitEvent> {
        self.inner.commit_tx.subscribe()
    }

    /// System prompt sent with the next dispatched request
    #[must_use]
    pub fn system_prompt(&self) -> Option<String> {
        self.inner.state.lock().system_prompt.clone()
    }

    /// Replace the system prompt for subsequent turns and retries
    ///
    /// Streams already running keep the prompt they were started with.
    pub fn set_system_prompt(&self, system_prompt: Option<String>) {
        let system_prompt = system_prompt.filter(|p| !p.trim().is_empty());
        tracing::debug!(has_prompt = system_prompt.is_some(), "System prompt changed");
        self.inner.state.lock().system_prompt = system_prompt;
    }

    /// Use a mask's system prompt for subsequent turns
    pub fn apply_mask(&self, mask: &Mask) {
        tracing::info!(mask_id = mask.id, name = %mask.name, "Applying mask");
        self.set_system_prompt(Some(mask.system_prompt.clone()));
    }

    /// Pause or resume snapshot publication
    ///
    /// Streams keep running while paused; resuming republishes every
    /// provider's current snapshot.
    pub fn set_publishing(&self, publishing: bool) {
        let mut state = self.inner.state.lock();
        state.publishing = publishing;
        for slot in &state.slots {
            slot.publish(publishing);
        }
        tracing::debug!(publishing, "Snapshot publication toggled");
    }

    /// Replace the in-memory transcript with the `turns` most recent stored turns
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn load_history(&self, turns: usize) -> Result<usize, OrchestratorError> {
        let loaded = self.inner.store.load_recent(turns).await?;
        let messages: Vec<Message> = loaded
            .iter()
            .flat_map(|t| t.messages().cloned())
            .collect();
        let count = loaded.len();

        self.inner.state.lock().history = messages;
        tracing::info!(turns = count, "Loaded transcript history");
        Ok(count)
    }

    /// Submit a question to every enabled provider
    ///
    /// Returns `false` without side effects when the question is blank or a
    /// turn is still streaming, committing or held after a failed commit.
    pub fn submit(&self, question: &str) -> bool {
        if question.trim().is_empty() {
            tracing::debug!("Rejecting blank question");
            return false;
        }

        let mut state = self.inner.state.lock();
        if !state.is_ready() {
            tracing::debug!("Rejecting submit while a turn is in progress");
            return false;
        }
        self.start_turn(&mut state, Message::question(question));
        true
    }

    /// Feed a chunk to a provider's current stream
    ///
    /// Returns `false` if the provider is unknown or not streaming.
    pub fn on_chunk(&self, provider: &ProviderId, text: &str) -> bool {
        match self.current_ticket(provider) {
            Some(ticket) => self.chunk_for(&ticket, text),
            None => false,
        }
    }

    /// Mark a provider's current stream as finished
    ///
    /// # Errors
    ///
    /// Returns an error if this completed the turn and persisting it failed.
    pub async fn on_done(&self, provider: &ProviderId) -> Result<Option<TurnId>, OrchestratorError> {
        match self.current_ticket(provider) {
            Some(ticket) => self.done_for(&ticket).await,
            None => Ok(None),
        }
    }

    /// Mark a provider's current stream as failed
    ///
    /// # Errors
    ///
    /// Returns an error if this completed the turn and persisting it failed.
    pub async fn on_error(
        &self,
        provider: &ProviderId,
        message: &str,
    ) -> Result<Option<TurnId>, OrchestratorError> {
        match self.current_ticket(provider) {
            Some(ticket) => self.error_for(&ticket, message.to_string()).await,
            None => Ok(None),
        }
    }

    /// Re-run the commit barrier
    ///
    /// Used to retry a commit whose persistence failed. Returns `Ok(None)`
    /// when there is no complete, uncommitted turn.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting the held turn failed again.
    pub async fn commit(&self) -> Result<Option<TurnId>, OrchestratorError> {
        let pending = self.inner.state.lock().take_commit();
        match pending {
            Some(pending) => self.persist(pending).await,
            None => Ok(None),
        }
    }

    pub(crate) fn chunk_for(&self, ticket: &Ticket, text: &str) -> bool {
        let mut state = self.inner.state.lock();
        let publishing = state.publishing;
        let Some(slot) = state.slot_mut(&ticket.provider) else {
            return false;
        };
        if !slot.accepts(ticket.generation) {
            tracing::trace!(provider = %ticket.provider, generation = ticket.generation, "Dropping stale chunk");
            return false;
        }

        slot.accumulator.append(text);
        slot.publish(publishing);
        tracing::trace!(provider = %ticket.provider, bytes = text.len(), "Chunk received");
        true
    }

    pub(crate) async fn done_for(&self, ticket: &Ticket) -> Result<Option<TurnId>, OrchestratorError> {
        self.complete(ticket, Outcome::Done).await
    }

    pub(crate) async fn error_for(
        &self,
        ticket: &Ticket,
        message: String,
    ) -> Result<Option<TurnId>, OrchestratorError> {
        self.complete(ticket, Outcome::Error(message)).await
    }

    /// Restart one provider against the most recent committed turn
    ///
    /// Sibling answers of that turn are restored; the target's answer keeps
    /// its message ID so the store updates it in place.
    pub(crate) fn restart_provider(&self, target: &ProviderId) -> bool {
        let mut state = self.inner.state.lock();
        if !state.is_ready() {
            tracing::debug!(provider = %target, "Rejecting retry while a turn is in progress");
            return false;
        }
        if state.slot(target).is_none() {
            tracing::debug!(provider = %target, "Rejecting retry for unknown provider");
            return false;
        }

        let enabled: Vec<ProviderId> = state.slots.iter().map(|s| s.id.clone()).collect();
        let Some(plan) = plan_retry(&state.history, &enabled, target) else {
            tracing::debug!(provider = %target, "Nothing to retry");
            return false;
        };

        state.history.retain(|m| !plan.drop_ids.contains(&m.id));
        state.question = plan.question;

        let publishing = state.publishing;
        for slot in state.slots.iter_mut().filter(|s| s.id != *target) {
            if slot.state != ProviderState::Idle {
                continue;
            }
            match plan.restored.get(&slot.id) {
                Some(answer) => slot.restore(answer.clone()),
                None => slot.clear(),
            }
            slot.publish(publishing);
        }

        let question = state.question.content.clone();
        let history = state.history_for(target);
        let system = state.system_prompt.clone();
        if let Some(slot) = state.slot_mut(target) {
            slot.abort();
            slot.accumulator.reset();
            slot.answer = Message {
                id: plan.target_answer_id.unwrap_or_default(),
                content: String::new(),
                created_at: now_secs(),
                provider: Some(target.clone()),
            };
            self.dispatch(slot, &question, history, system.as_deref(), publishing);
        }

        self.publish_idle(&state);
        tracing::info!(provider = %target, "Retrying provider");
        true
    }

    /// Reserve the orchestrator for editing the question `older`
    ///
    /// While reserved, `submit` and retries are rejected, so the store can be
    /// truncated without a new turn slipping in. Returns `false` if a turn is
    /// in progress or `older` is not a committed question.
    pub(crate) fn begin_edit(&self, older: &MessageId) -> bool {
        let mut state = self.inner.state.lock();
        if !state.is_ready() {
            tracing::debug!(message_id = %older, "Rejecting edit while a turn is in progress");
            return false;
        }
        if !state.history.iter().any(|m| m.id == *older && m.is_question()) {
            tracing::debug!(message_id = %older, "Rejecting edit of a message that is not a question");
            return false;
        }
        state.editing = true;
        self.publish_idle(&state);
        true
    }

    /// Release a reservation taken by [`begin_edit`](Self::begin_edit)
    pub(crate) fn cancel_edit(&self) {
        let mut state = self.inner.state.lock();
        state.editing = false;
        self.publish_idle(&state);
    }

    /// Finish an edit: drop in-memory history from `older` on and submit `content`
    ///
    /// Requires a reservation from [`begin_edit`](Self::begin_edit); the store
    /// must already have been truncated.
    pub(crate) fn resubmit_from(&self, older: &MessageId, content: &str) -> bool {
        let mut state = self.inner.state.lock();
        if !state.editing {
            tracing::debug!(message_id = %older, "Rejecting resubmit without an edit reservation");
            return false;
        }
        state.editing = false;
        if content.trim().is_empty() {
            self.publish_idle(&state);
            return false;
        }
        if let Some(index) = state.history.iter().position(|m| m.id == *older) {
            state.history.truncate(index);
        }
        self.start_turn(&mut state, Message::question(content));
        true
    }

    fn start_turn(&self, state: &mut TurnState, question: Message) {
        let question_id = question.id.clone();
        let text = question.content.clone();
        state.question = question;

        let publishing = state.publishing;
        let system = state.system_prompt.clone();
        let requests: Vec<Vec<HistoryMessage>> =
            state.slots.iter().map(|s| state.history_for(&s.id)).collect();
        for (slot, history) in state.slots.iter_mut().zip(requests) {
            slot.abort();
            slot.clear();
            self.dispatch(slot, &text, history, system.as_deref(), publishing);
        }

        self.publish_idle(state);
        tracing::info!(
            question_id = %question_id,
            providers = state.slots.len(),
            "Submitted question"
        );
    }

    /// Move a slot to `Loading` and spawn its task
    fn dispatch(
        &self,
        slot: &mut ProviderSlot,
        question: &str,
        history: Vec<HistoryMessage>,
        system: Option<&str>,
        publishing: bool,
    ) {
        let config = &self.inner.config;
        let mut request = CompletionRequest::new(question, slot.model.clone())
            .with_history(history)
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens);
        if let Some(system) = system {
            request = request.with_system(system);
        }

        slot.generation += 1;
        slot.state = ProviderState::Loading;
        slot.in_turn = true;
        let ticket = Ticket {
            provider: slot.id.clone(),
            generation: slot.generation,
        };
        tracing::debug!(provider = %slot.id, generation = slot.generation, "Dispatching provider");

        let task = ProviderTask::new(self.clone(), ticket, Arc::clone(&slot.provider), request);
        slot.task = Some(tokio::spawn(task.run()).abort_handle());
        slot.publish(publishing);
    }

    /// Publish readiness; callers hold the state lock
    fn publish_idle(&self, state: &TurnState) {
        self.inner.idle_tx.send_replace(state.is_ready());
    }

    fn current_ticket(&self, provider: &ProviderId) -> Option<Ticket> {
        let state = self.inner.state.lock();
        let slot = state.slot(provider)?;
        (slot.state == ProviderState::Loading).then(|| Ticket {
            provider: slot.id.clone(),
            generation: slot.generation,
        })
    }

    async fn complete(
        &self,
        ticket: &Ticket,
        outcome: Outcome,
    ) -> Result<Option<TurnId>, OrchestratorError> {
        let pending = {
            let mut state = self.inner.state.lock();
            let publishing = state.publishing;
            let Some(slot) = state.slot_mut(&ticket.provider) else {
                return Ok(None);
            };
            if !slot.accepts(ticket.generation) {
                tracing::debug!(
                    provider = %ticket.provider,
                    generation = ticket.generation,
                    "Ignoring terminal event from stale stream"
                );
                return Ok(None);
            }

            match outcome {
                Outcome::Done => {
                    slot.accumulator.finish();
                    slot.answer.content = slot.accumulator.final_text().to_string();
                    tracing::debug!(provider = %slot.id, chars = slot.answer.content.len(), "Provider finished");
                }
                Outcome::Error(message) => {
                    tracing::warn!(provider = %slot.id, error = %message, "Provider stream failed");
                    slot.accumulator.reset();
                    slot.answer.content = format!("Error: {message}");
                }
            }
            slot.answer.created_at = now_secs();
            slot.state = ProviderState::Idle;
            slot.task = None;
            slot.publish(publishing);

            let pending = state.take_commit();
            self.publish_idle(&state);
            pending
        };

        match pending {
            Some(pending) => self.persist(pending).await,
            None => Ok(None),
        }
    }

    async fn persist(&self, pending: PendingCommit) -> Result<Option<TurnId>, OrchestratorError> {
        let question_id = pending.question.id.clone();
        let result = self
            .inner
            .store
            .persist(&pending.question, &pending.answers)
            .await;

        match result {
            Ok(turn_id) => {
                {
                    let mut state = self.inner.state.lock();
                    state.finish_commit(pending);
                    self.publish_idle(&state);
                }
                tracing::info!(turn_id = %turn_id, question_id = %question_id, "Committed turn");
                let _ = self.inner.commit_tx.send(CommitEvent::Committed {
                    turn_id: turn_id.clone(),
                    question_id,
                });
                Ok(Some(turn_id))
            }
            Err(e) => {
                {
                    let mut state = self.inner.state.lock();
                    state.committing = false;
                    self.publish_idle(&state);
                }
                tracing::warn!(question_id = %question_id, error = %e, "Failed to persist turn");
                let _ = self.inner.commit_tx.send(CommitEvent::Failed {
                    error: e.to_string(),
                });
                Err(e.into())
            }
        }
    }
}
