use crate::config::Texts;
use crate::conversation::{Conversation, Message};
use crate::events::{ExchangeEvent, RequestId};
use crate::llm::GenerativeModel;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Drives the conversation: turns submitted text into model calls and
/// folds their results back into the message list.
///
/// Owned by a single task (the UI loop or the one-shot command). Calls run on
/// spawned tasks and report back over a channel, so the owner never blocks.
pub struct ConversationController {
    conversation: Conversation,
    model: Arc<dyn GenerativeModel>,
    stream: bool,
    greeting: Option<String>,
    input: String,
    event_tx: mpsc::UnboundedSender<ExchangeEvent>,
    event_rx: mpsc::UnboundedReceiver<ExchangeEvent>,
}

impl ConversationController {
    pub fn new(model: Arc<dyn GenerativeModel>, texts: Texts) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            conversation: Conversation::new(texts),
            model,
            stream: false,
            greeting: None,
            input: String::new(),
            event_tx,
            event_rx,
        }
    }

    /// Open every conversation (including after `clear`) with this assistant entry
    pub fn with_greeting(mut self, greeting: Option<String>) -> Self {
        self.greeting = greeting.filter(|g| !g.trim().is_empty());
        self.seed_greeting();
        self
    }

    /// Forward answers fragment by fragment instead of all at once
    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub fn pending_count(&self) -> usize {
        self.conversation.pending_count()
    }

    pub fn is_waiting(&self) -> bool {
        self.pending_count() > 0
    }

    /// Current input buffer
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Submit whatever is in the input buffer
    pub fn submit_input(&mut self) -> Option<RequestId> {
        let text = self.input.clone();
        self.submit(&text)
    }

    /// Start an exchange for `text`.
    ///
    /// Blank text is ignored. Otherwise the user entry and a placeholder are
    /// appended, the input buffer is cleared and the model call is spawned.
    /// Must be called from within a tokio runtime.
    pub fn submit(&mut self, text: &str) -> Option<RequestId> {
        let (id, prompt) = self.conversation.begin_exchange(text)?;
        self.input.clear();
        debug!(request = %id, in_flight = self.pending_count(), "exchange started");

        let model = Arc::clone(&self.model);
        let tx = self.event_tx.clone();
        let stream = self.stream;

        tokio::spawn(async move {
            let outcome = if stream {
                let delta_tx = tx.clone();
                let on_delta = move |text: &str| {
                    let _ = delta_tx.send(ExchangeEvent::Delta {
                        id,
                        text: text.to_string(),
                    });
                };
                model.generate_streaming(&prompt, &on_delta).await
            } else {
                model.generate(&prompt).await
            };
            let _ = tx.send(ExchangeEvent::Completed { id, outcome });
        });

        Some(id)
    }

    /// Add a local assistant note (help text and the like)
    pub fn push_note(&mut self, text: impl Into<String>) {
        self.conversation.push(Message::assistant(text));
    }

    /// Apply every exchange event that is already available, without waiting.
    /// Returns the number of placeholders that settled; streamed fragments
    /// are applied but not counted.
    pub fn poll_completions(&mut self) -> usize {
        let mut settled = 0;
        while let Ok(event) = self.event_rx.try_recv() {
            if self.apply(event).is_some() {
                settled += 1;
            }
        }
        settled
    }

    /// Wait for the next exchange to finish and apply it, along with any
    /// fragments that arrive first. Returns `None` when nothing is in flight.
    pub async fn next_completion(&mut self) -> Option<RequestId> {
        while self.is_waiting() {
            let event = self.event_rx.recv().await?;
            if let Some(id) = self.apply(event) {
                return Some(id);
            }
        }
        None
    }

    /// Start over: drop all entries and forget in-flight placeholders.
    /// Answers that arrive later are discarded.
    pub fn clear(&mut self) {
        let dropped = self.pending_count();
        self.conversation.clear();
        self.input.clear();
        self.seed_greeting();
        debug!(dropped, "conversation cleared");
    }

    /// Returns the id when `event` settled a placeholder
    fn apply(&mut self, event: ExchangeEvent) -> Option<RequestId> {
        match event {
            ExchangeEvent::Delta { id, text } => {
                if !self.conversation.apply_delta(id, &text) {
                    debug!(request = %id, "fragment for unknown exchange dropped");
                }
                None
            }
            ExchangeEvent::Completed { id, outcome } => {
                if let Err(err) = &outcome {
                    error!(request = %id, error = %err, "model call failed");
                }
                if self.conversation.resolve(id, &outcome) {
                    debug!(request = %id, "exchange settled");
                    Some(id)
                } else {
                    debug!(request = %id, "answer for unknown exchange dropped");
                    None
                }
            }
        }
    }

    fn seed_greeting(&mut self) {
        if self.conversation.is_empty() {
            if let Some(greeting) = self.greeting.clone() {
                self.conversation.push(Message::assistant(greeting));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::events::Speaker;
    use crate::llm::DeltaSink;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    type Gate = oneshot::Sender<Result<String, ModelError>>;

    /// Answers each prompt only when the test opens its gate
    #[derive(Default)]
    struct GatedModel {
        gates: Mutex<HashMap<String, oneshot::Receiver<Result<String, ModelError>>>>,
    }

    impl GatedModel {
        fn gate(&self, prompt: &str) -> Gate {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().insert(prompt.to_string(), rx);
            tx
        }
    }

    #[async_trait]
    impl GenerativeModel for GatedModel {
        fn model_name(&self) -> &str {
            "gated"
        }

        async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
            let rx = self.gates.lock().unwrap().remove(prompt);
            match rx {
                Some(rx) => rx.await.unwrap_or(Err(ModelError::StreamClosed)),
                None => Err(ModelError::StreamClosed),
            }
        }
    }

    /// Streams each word of a fixed answer
    struct WordStreamModel(&'static str);

    #[async_trait]
    impl GenerativeModel for WordStreamModel {
        fn model_name(&self) -> &str {
            "words"
        }

        async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
            Ok(self.0.to_string())
        }

        async fn generate_streaming(
            &self,
            _prompt: &str,
            on_delta: DeltaSink<'_>,
        ) -> Result<String, ModelError> {
            for (i, word) in self.0.split(' ').enumerate() {
                if i == 0 {
                    on_delta(word);
                } else {
                    on_delta(&format!(" {word}"));
                }
            }
            Ok(self.0.to_string())
        }
    }

    /// Streams one fragment, then holds the answer until released
    struct HeldStreamModel {
        release: Mutex<Option<oneshot::Receiver<()>>>,
    }

    #[async_trait]
    impl GenerativeModel for HeldStreamModel {
        fn model_name(&self) -> &str {
            "held"
        }

        async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
            Ok("Hello".to_string())
        }

        async fn generate_streaming(
            &self,
            _prompt: &str,
            on_delta: DeltaSink<'_>,
        ) -> Result<String, ModelError> {
            on_delta("Hel");
            let release = self.release.lock().unwrap().take();
            if let Some(release) = release {
                let _ = release.await;
            }
            on_delta("lo");
            Ok("Hello".to_string())
        }
    }

    fn controller(model: Arc<GatedModel>) -> ConversationController {
        ConversationController::new(model, Texts::default())
    }

    #[tokio::test]
    async fn blank_submit_changes_nothing() {
        let mut ctrl = controller(Arc::new(GatedModel::default()));
        ctrl.set_input("   ");
        assert!(ctrl.submit_input().is_none());
        assert!(ctrl.messages().is_empty());
        assert_eq!(ctrl.input(), "   ");
        assert_eq!(ctrl.next_completion().await, None);
    }

    #[tokio::test]
    async fn submit_appends_two_entries_before_answer() {
        let model = Arc::new(GatedModel::default());
        let gate = model.gate("Hello");
        let mut ctrl = controller(model);

        ctrl.set_input("Hello");
        let id = ctrl.submit_input().unwrap();

        assert_eq!(ctrl.input(), "");
        assert_eq!(ctrl.messages().len(), 2);
        assert_eq!(ctrl.messages()[0].text, "Hello");
        assert!(ctrl.messages()[1].pending);
        assert_eq!(ctrl.poll_completions(), 0);

        gate.send(Ok("Hi there".to_string())).unwrap();
        assert_eq!(ctrl.next_completion().await, Some(id));
        assert_eq!(ctrl.messages().len(), 2);
        assert_eq!(ctrl.messages()[1].text, "Hi there");
        assert!(!ctrl.is_waiting());
    }

    #[tokio::test]
    async fn failure_shows_error_and_conversation_stays_usable() {
        let model = Arc::new(GatedModel::default());
        let first = model.gate("first");
        let second = model.gate("second");
        let mut ctrl = controller(model);

        ctrl.submit("first");
        first
            .send(Err(ModelError::Api {
                status: 429,
                message: "quota".to_string(),
            }))
            .unwrap();
        ctrl.next_completion().await;
        assert_eq!(ctrl.messages()[1].text, Texts::default().error);

        ctrl.submit("second");
        second.send(Ok("fine".to_string())).unwrap();
        ctrl.next_completion().await;
        assert_eq!(ctrl.messages()[3].text, "fine");
    }

    #[tokio::test]
    async fn overlapping_submissions_are_correlated_by_id() {
        let model = Arc::new(GatedModel::default());
        let gate_a = model.gate("a");
        let gate_b = model.gate("b");
        let mut ctrl = controller(model);

        let id_a = ctrl.submit("a").unwrap();
        let id_b = ctrl.submit("b").unwrap();
        assert_eq!(ctrl.pending_count(), 2);

        gate_b.send(Ok("B".to_string())).unwrap();
        assert_eq!(ctrl.next_completion().await, Some(id_b));
        assert!(ctrl.messages()[1].pending);
        assert_eq!(ctrl.messages()[3].text, "B");

        gate_a.send(Ok("A".to_string())).unwrap();
        assert_eq!(ctrl.next_completion().await, Some(id_a));
        let speakers: Vec<Speaker> = ctrl.messages().iter().map(|m| m.speaker).collect();
        assert_eq!(
            speakers,
            vec![Speaker::User, Speaker::Assistant, Speaker::User, Speaker::Assistant]
        );
        assert_eq!(ctrl.messages()[1].text, "A");
    }

    #[tokio::test]
    async fn greeting_survives_clear() {
        let model = Arc::new(GatedModel::default());
        let _gate = model.gate("Hello");
        let mut ctrl = controller(model).with_greeting(Some("Hi!".to_string()));
        assert_eq!(ctrl.messages().len(), 1);

        ctrl.submit("Hello");
        assert_eq!(ctrl.messages().len(), 3);

        ctrl.clear();
        assert_eq!(ctrl.messages().len(), 1);
        assert_eq!(ctrl.messages()[0].text, "Hi!");
        assert!(!ctrl.is_waiting());
        assert_eq!(ctrl.next_completion().await, None);
    }

    #[tokio::test]
    async fn streaming_fills_placeholder_and_settles() {
        let model = Arc::new(WordStreamModel("one two three"));
        let mut ctrl =
            ConversationController::new(model, Texts::default()).with_streaming(true);

        let id = ctrl.submit("count").unwrap();
        assert_eq!(ctrl.next_completion().await, Some(id));
        assert_eq!(ctrl.messages()[1].text, "one two three");
        assert!(!ctrl.messages()[1].pending);
    }

    #[tokio::test]
    async fn poll_counts_settled_exchanges_not_fragments() {
        let (release, held) = oneshot::channel();
        let model = Arc::new(HeldStreamModel {
            release: Mutex::new(Some(held)),
        });
        let mut ctrl =
            ConversationController::new(model, Texts::default()).with_streaming(true);
        ctrl.submit("Hi").unwrap();

        let mut settled = 0;
        while ctrl.messages()[1].text != "Hel" {
            tokio::task::yield_now().await;
            settled += ctrl.poll_completions();
        }
        assert_eq!(settled, 0);
        assert!(ctrl.messages()[1].pending);

        release.send(()).unwrap();
        while ctrl.is_waiting() {
            tokio::task::yield_now().await;
            settled += ctrl.poll_completions();
        }
        assert_eq!(settled, 1);
        assert_eq!(ctrl.messages()[1].text, "Hello");
    }
}
