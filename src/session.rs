use crate::agent::{ ChatAgent, TurnOutcome };
use crate::models::chat::Conversation;

/// Per-client chat state: the conversation plus at most one queued question
/// picked from the sample list, waiting to be asked.
#[derive(Debug, Default)]
pub struct ChatSession {
    conversation: Conversation,
    pending: Option<String>,
}

impl ChatSession {
    pub fn start() -> Self {
        Self { conversation: Conversation::start(), pending: None }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Queues a question for the next cycle. A second call before the slot
    /// is drained replaces the first question.
    pub fn queue_question(&mut self, question: impl Into<String>) {
        self.pending = Some(question.into());
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn take_pending(&mut self) -> Option<String> {
        self.pending.take()
    }

    pub fn reset(&mut self) {
        self.conversation.clear();
        self.pending = None;
    }

    pub async fn ask(&mut self, agent: &ChatAgent, prompt: &str) -> TurnOutcome {
        agent.process_turn(&mut self.conversation, prompt).await
    }

    /// Asks the queued question, if there is one.
    pub async fn ask_pending(&mut self, agent: &ChatAgent) -> Option<TurnOutcome> {
        let question = self.take_pending()?;
        Some(self.ask(agent, &question).await)
    }
}
