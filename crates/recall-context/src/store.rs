//! Context store holding the durable transcript of one session

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use recall_config::ContextSettings;
use recall_events::{emit_guarded, Event, EventSink, NoopSink};
use recall_protocol::Message;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::compact::enforce_pairs;
use crate::summarize::{self, SummarizeError};
use crate::{
    importance, truncate, BudgetPolicy, BudgetSource, CharEstimator, CompactionResult,
    CompactionStrategy, ContextError, ImportanceWeights, MessageHistory, ResolvedBudget,
    Summarizer, TokenEstimator, TokenMonitor, TranscriptFile,
};

const DEFAULT_SUMMARIZER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Active,
    Cleared,
}

/// Per-request inputs for [`ContextStore::get_messages_for_request`]
#[derive(Default, Clone)]
pub struct RequestOptions<'a> {
    /// Explicit budget; takes precedence over everything else
    pub budget: Option<usize>,
    pub budget_source: Option<&'a dyn BudgetSource>,
    /// Overrides the store's summarizer timeout for this request
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl<'a> RequestOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_budget_source(mut self, source: &'a dyn BudgetSource) -> Self {
        self.budget_source = Some(source);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Messages prepared for a request, with how they were derived
#[derive(Debug, Clone)]
pub struct RequestView {
    pub messages: Vec<Message>,
    pub budget: ResolvedBudget,
    /// Present only when compaction ran
    pub compaction: Option<CompactionResult>,
}

struct StoreInner {
    history: MessageHistory,
    state: StoreState,
    transcript: Option<TranscriptFile>,
    /// History came from a persisted transcript and is authoritative
    loaded_from_transcript: bool,
}

pub struct ContextStore {
    session_id: String,
    inner: RwLock<StoreInner>,
    estimator: Arc<dyn TokenEstimator>,
    events: Arc<dyn EventSink>,
    summarizer: Option<Arc<dyn Summarizer>>,
    strategy: CompactionStrategy,
    importance_weights: ImportanceWeights,
    monitor: TokenMonitor,
    budget_policy: BudgetPolicy,
    summarizer_timeout: Duration,
}

impl ContextStore {
    /// In-memory store for `session_id`
    pub fn new(session_id: impl Into<String>) -> Self {
        Self::with_inner(session_id.into(), MessageHistory::new(), None, false)
    }

    /// File-backed store. An existing transcript at `path` is loaded and
    /// becomes authoritative over later `set_messages` calls.
    pub fn open(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Result<Self, ContextError> {
        let session_id = session_id.into();
        let (transcript, loaded) = TranscriptFile::open_or_create(path, &session_id)?;
        let loaded_from_transcript = loaded.is_some();
        if let Some(messages) = &loaded {
            tracing::info!(
                session_id = %session_id,
                messages = messages.len(),
                path = %transcript.path().display(),
                "resumed transcript"
            );
        }

        // The estimate is recomputed by with_estimator when one is set later
        let history =
            MessageHistory::from_messages(loaded.unwrap_or_default(), &CharEstimator::default());
        Ok(Self::with_inner(
            session_id,
            history,
            Some(transcript),
            loaded_from_transcript,
        ))
    }

    /// Build a store from configuration, file-backed when a transcript
    /// directory is configured.
    pub fn from_settings(
        session_id: impl Into<String>,
        settings: &ContextSettings,
    ) -> Result<Self, ContextError> {
        let session_id = session_id.into();
        let store = match &settings.transcript_dir {
            Some(dir) => {
                let path = TranscriptFile::path_for(&PathBuf::from(dir), &session_id);
                Self::open(path, session_id)?
            }
            None => Self::new(session_id),
        };

        Ok(store
            .with_default_budget(settings.default_budget)
            .with_safety_margin(settings.safety_margin)
            .with_threshold(settings.compaction_threshold)
            .with_strategy(CompactionStrategy::from(&settings.strategy))
            .with_summarizer_timeout(Duration::from_secs(settings.summarizer_timeout_secs)))
    }

    fn with_inner(
        session_id: String,
        history: MessageHistory,
        transcript: Option<TranscriptFile>,
        loaded_from_transcript: bool,
    ) -> Self {
        Self {
            session_id,
            inner: RwLock::new(StoreInner {
                history,
                state: StoreState::Active,
                transcript,
                loaded_from_transcript,
            }),
            estimator: Arc::new(CharEstimator::default()),
            events: Arc::new(NoopSink),
            summarizer: None,
            strategy: CompactionStrategy::default(),
            importance_weights: ImportanceWeights::default(),
            monitor: TokenMonitor::default(),
            budget_policy: BudgetPolicy::default(),
            summarizer_timeout: DEFAULT_SUMMARIZER_TIMEOUT,
        }
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        {
            let inner = self.inner.get_mut();
            let messages = inner.history.messages().to_vec();
            inner.history = MessageHistory::from_messages(messages, estimator.as_ref());
        }
        self.estimator = estimator;
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_strategy(mut self, strategy: CompactionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_importance_weights(mut self, weights: ImportanceWeights) -> Self {
        self.importance_weights = weights;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.monitor = TokenMonitor::new(threshold);
        self
    }

    pub fn with_default_budget(mut self, budget: usize) -> Self {
        self.budget_policy.default_budget = budget;
        self
    }

    pub fn with_safety_margin(mut self, margin: usize) -> Self {
        self.budget_policy.safety_margin = margin;
        self
    }

    pub fn with_summarizer_timeout(mut self, timeout: Duration) -> Self {
        self.summarizer_timeout = timeout;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn strategy(&self) -> &CompactionStrategy {
        &self.strategy
    }

    pub fn state(&self) -> StoreState {
        self.inner.read().state
    }

    pub fn len(&self) -> usize {
        self.inner.read().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().history.is_empty()
    }

    /// Cached estimate over the full history
    pub fn estimated_tokens(&self) -> usize {
        self.inner.read().history.estimated_tokens()
    }

    pub fn is_file_backed(&self) -> bool {
        self.inner.read().transcript.is_some()
    }

    /// Whether a request with `budget` would compact the current history
    pub fn needs_compaction(&self, budget: usize) -> bool {
        self.monitor.needs_compaction(self.estimated_tokens(), budget)
    }

    /// Append a message. Compaction is deferred to read time.
    pub fn add_message(&self, message: Message) -> Result<(), ContextError> {
        message.validate()?;
        let tokens = self.estimator.estimate(&message);

        let mut inner = self.inner.write();
        if let Some(transcript) = inner.transcript.as_mut() {
            if let Err(err) = transcript.append(&message) {
                tracing::warn!(
                    session_id = %self.session_id,
                    error = %err,
                    "failed to append to transcript"
                );
            }
        }
        inner.history.push(message, tokens);
        inner.state = StoreState::Active;
        Ok(())
    }

    /// Parse a wire-shape message and append it
    pub fn add_raw_message(&self, value: Value) -> Result<(), ContextError> {
        self.add_message(Message::from_value(value)?)
    }

    /// Copy of the full, uncompacted history
    pub fn get_messages(&self) -> Vec<Message> {
        self.inner.read().history.messages().to_vec()
    }

    /// Replace the history, e.g. when restoring a session.
    ///
    /// Ignored by file-backed stores whose history was loaded from their own
    /// transcript.
    pub fn set_messages(&self, messages: Vec<Message>) -> Result<(), ContextError> {
        let mut inner = self.inner.write();
        if inner.loaded_from_transcript {
            tracing::debug!(
                session_id = %self.session_id,
                offered = messages.len(),
                kept = inner.history.len(),
                "ignoring set_messages, persisted transcript is authoritative"
            );
            return Ok(());
        }

        for message in &messages {
            message.validate()?;
        }

        if let Some(transcript) = inner.transcript.as_mut() {
            if let Err(err) = transcript.rewrite(&messages) {
                tracing::warn!(
                    session_id = %self.session_id,
                    error = %err,
                    "failed to rewrite transcript"
                );
            }
        }
        inner.history = MessageHistory::from_messages(messages, self.estimator.as_ref());
        inner.state = StoreState::Active;
        Ok(())
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        if let Some(transcript) = inner.transcript.as_mut() {
            if let Err(err) = transcript.rewrite(&[]) {
                tracing::warn!(
                    session_id = %self.session_id,
                    error = %err,
                    "failed to clear transcript"
                );
            }
        }
        inner.history.clear();
        inner.state = StoreState::Cleared;
    }

    /// Messages for the next model request, compacted to fit the budget.
    ///
    /// Never fails and never modifies the stored history.
    pub async fn get_messages_for_request(&self, options: RequestOptions<'_>) -> Vec<Message> {
        self.prepare_request(options).await.messages
    }

    pub async fn prepare_request(&self, options: RequestOptions<'_>) -> RequestView {
        let (history, tokens_before) = {
            let inner = self.inner.read();
            (
                inner.history.messages().to_vec(),
                inner.history.estimated_tokens(),
            )
        };

        let budget = self
            .budget_policy
            .resolve(options.budget, options.budget_source);

        if !self.monitor.needs_compaction(tokens_before, budget.tokens) {
            return RequestView {
                messages: history,
                budget,
                compaction: None,
            };
        }

        tracing::debug!(
            session_id = %self.session_id,
            tokens = tokens_before,
            budget = budget.tokens,
            origin = ?budget.origin,
            strategy = self.strategy.name(),
            "compacting request view"
        );
        emit_guarded(
            self.events.as_ref(),
            &Event::PreCompact {
                session_id: self.session_id.clone(),
                message_count: history.len(),
                token_count: tokens_before,
            },
        );

        let (view, strategy_used, fell_back) =
            self.compact_view(&history, budget.tokens, &options).await;
        let view = enforce_pairs(&history, view);
        let tokens_after = self.estimator.estimate_all(&view);

        emit_guarded(
            self.events.as_ref(),
            &Event::PostCompact {
                session_id: self.session_id.clone(),
                message_count: view.len(),
                token_count: tokens_after,
                strategy: strategy_used.to_string(),
                budget: budget.tokens,
            },
        );

        let result = CompactionResult {
            tokens_before,
            tokens_after,
            messages_before: history.len(),
            messages_after: view.len(),
            strategy_used,
            fell_back,
        };
        tracing::info!(
            session_id = %self.session_id,
            tokens_before,
            tokens_after,
            removed = result.messages_removed(),
            strategy = strategy_used,
            fell_back,
            "compacted request view"
        );

        RequestView {
            messages: view,
            budget,
            compaction: Some(result),
        }
    }

    async fn compact_view(
        &self,
        history: &[Message],
        budget: usize,
        options: &RequestOptions<'_>,
    ) -> (Vec<Message>, &'static str, bool) {
        let estimator = self.estimator.as_ref();
        let truncated = || truncate::truncate(history, estimator, budget);

        match &self.strategy {
            CompactionStrategy::Truncate => (truncated(), "truncate", false),
            CompactionStrategy::Importance => (
                importance::rank_and_select(history, estimator, budget, &self.importance_weights),
                "importance",
                false,
            ),
            CompactionStrategy::Summarize { keep_recent } => {
                match self.summarized(history, budget, *keep_recent, options).await {
                    Ok(view) => (view, "summarize", false),
                    Err(SummarizeError::NothingToSummarize) => (truncated(), "truncate", false),
                    Err(err) => {
                        tracing::warn!(
                            session_id = %self.session_id,
                            error = %err,
                            "summarization unavailable, falling back to truncation"
                        );
                        (truncated(), "truncate", true)
                    }
                }
            }
        }
    }

    async fn summarized(
        &self,
        history: &[Message],
        budget: usize,
        keep_recent: Option<usize>,
        options: &RequestOptions<'_>,
    ) -> Result<Vec<Message>, SummarizeError> {
        let summarizer = self
            .summarizer
            .as_deref()
            .ok_or_else(|| SummarizeError::Failed("no summarizer configured".to_string()))?;
        let estimator = self.estimator.as_ref();

        let plan = summarize::plan(history, estimator, budget, keep_recent)?;
        let timeout = options.timeout.unwrap_or(self.summarizer_timeout);
        let summary = summarize::summarize_bounded(
            summarizer,
            &plan.to_summarize,
            timeout,
            options.cancel.as_ref(),
        )
        .await?;

        let view = summarize::assemble(history, &plan, &summary);
        let tokens = estimator.estimate_all(&view);
        if tokens > budget {
            return Err(SummarizeError::Oversized { tokens, budget });
        }
        Ok(view)
    }
}

impl std::fmt::Debug for ContextStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ContextStore")
            .field("session_id", &self.session_id)
            .field("messages", &inner.history.len())
            .field("estimated_tokens", &inner.history.estimated_tokens())
            .field("state", &inner.state)
            .field("strategy", &self.strategy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ModelInfo, PerMessageEstimator};
    use recall_events::CollectingSink;
    use recall_protocol::{Role, ToolCall};
    use serde_json::json;

    fn store() -> ContextStore {
        ContextStore::new("ses_test").with_estimator(Arc::new(PerMessageEstimator(3)))
    }

    #[test]
    fn test_context_store_basics() {
        let store = store();
        store.add_message(Message::user("Hello")).unwrap();
        store.add_message(Message::assistant("Hi there!")).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.estimated_tokens(), 6);
        assert_eq!(store.state(), StoreState::Active);
    }

    #[test]
    fn test_invalid_message_leaves_history_unchanged() {
        let store = store();
        store.add_message(Message::user("Hello")).unwrap();

        let mut bad = Message::user("orphan");
        bad.tool_call_id = Some("c1".to_string());
        assert!(matches!(
            store.add_message(bad),
            Err(ContextError::InvalidMessage(_))
        ));
        assert!(matches!(
            store.add_raw_message(json!({"content": "no role"})),
            Err(ContextError::InvalidMessage(_))
        ));

        assert_eq!(store.len(), 1);
        assert_eq!(store.estimated_tokens(), 3);
    }

    #[test]
    fn test_add_raw_message() {
        let store = store();
        store
            .add_raw_message(json!({"role": "user", "content": "hi"}))
            .unwrap();
        assert_eq!(store.get_messages()[0].role, Role::User);
    }

    #[test]
    fn test_clear_resets_state() {
        let store = store();
        store.add_message(Message::user("Hello")).unwrap();
        store.clear();

        assert!(store.is_empty());
        assert_eq!(store.estimated_tokens(), 0);
        assert_eq!(store.state(), StoreState::Cleared);

        store.add_message(Message::user("again")).unwrap();
        assert_eq!(store.state(), StoreState::Active);
    }

    #[test]
    fn test_set_messages_recomputes_estimate() {
        let store = store();
        store.add_message(Message::user("Hello")).unwrap();
        store
            .set_messages(vec![
                Message::system("rules"),
                Message::user("a"),
                Message::user("b"),
            ])
            .unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.estimated_tokens(), 9);
    }

    #[test]
    fn test_with_estimator_recomputes_existing_history() {
        let store = ContextStore::new("ses").with_estimator(Arc::new(PerMessageEstimator(1)));
        store.add_message(Message::user("a")).unwrap();
        let store = store.with_estimator(Arc::new(PerMessageEstimator(7)));
        assert_eq!(store.estimated_tokens(), 7);
    }

    #[tokio::test]
    async fn test_under_threshold_returns_full_history() {
        let sink = Arc::new(CollectingSink::new());
        let store = store().with_event_sink(sink.clone());
        for i in 0..5 {
            store.add_message(Message::user(format!("m{i}"))).unwrap();
        }

        let view = store
            .prepare_request(RequestOptions::new().with_budget(100))
            .await;
        assert_eq!(view.messages, store.get_messages());
        assert!(view.compaction.is_none());
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_compaction_emits_events() {
        let sink = Arc::new(CollectingSink::new());
        let store = store().with_event_sink(sink.clone());
        for i in 0..20 {
            store.add_message(Message::user(format!("m{i}"))).unwrap();
        }

        let view = store
            .prepare_request(RequestOptions::new().with_budget(30))
            .await;
        let result = view.compaction.unwrap();
        assert_eq!(result.tokens_before, 60);
        assert!(result.tokens_after <= 30);
        assert_eq!(result.strategy_used, "truncate");

        assert_eq!(
            sink.names(),
            vec!["context:pre_compact", "context:post_compact"]
        );
        match &sink.events()[0] {
            Event::PreCompact {
                message_count,
                token_count,
                ..
            } => {
                assert_eq!(*message_count, 20);
                assert_eq!(*token_count, 60);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_model_budget_source() {
        let store = store().with_default_budget(1_000_000);
        for i in 0..10 {
            store.add_message(Message::user(format!("m{i}"))).unwrap();
        }
        let info = ModelInfo::new(1015, 0);
        let view = store
            .prepare_request(
                RequestOptions::new()
                    .with_budget_source(&info)
                    .with_timeout(Duration::from_secs(1)),
            )
            .await;
        // 1015 - 0 - 1000 = 15 tokens, 5 messages at 3 each
        assert_eq!(view.budget.tokens, 15);
        assert_eq!(view.messages.len(), 5);
    }

    #[tokio::test]
    async fn test_summarize_without_summarizer_falls_back() {
        let store = store().with_strategy(CompactionStrategy::summarize());
        store.add_message(Message::user("read")).unwrap();
        store
            .add_message(Message::assistant_with_tool_calls(vec![ToolCall::new(
                "c1",
                "read",
                json!({}),
            )]))
            .unwrap();
        store.add_message(Message::tool_result("c1", "data")).unwrap();
        for i in 0..10 {
            store.add_message(Message::user(format!("m{i}"))).unwrap();
        }

        let view = store
            .prepare_request(RequestOptions::new().with_budget(12))
            .await;
        let result = view.compaction.unwrap();
        assert!(result.fell_back);
        assert_eq!(result.strategy_used, "truncate");
        assert_eq!(view.messages.len(), 4);
    }

    #[test]
    fn test_from_settings_in_memory() {
        let settings = ContextSettings {
            default_budget: 500,
            compaction_threshold: 0.5,
            strategy: recall_config::StrategySettings::Importance,
            ..Default::default()
        };
        let store = ContextStore::from_settings("ses", &settings).unwrap();
        assert!(!store.is_file_backed());
        assert_eq!(store.strategy(), &CompactionStrategy::Importance);
        assert_eq!(store.summarizer_timeout, Duration::from_secs(30));

        store.add_message(Message::user("x".repeat(400))).unwrap();
        // 104 tokens against a threshold of 100
        assert!(store.needs_compaction(200));
        assert!(!store.needs_compaction(500));
    }
}
