use crate::cli::Args;
use crate::cortex::reply::{ interpret_raw, Interpretation };
use crate::cortex::sql_api::SqlApiConfig;
use crate::cortex::{ new_invoker, AgentInvoker };
use crate::models::agent::{ AgentRequest, Budget, RequestMessage, ToolCallRecord };
use crate::models::chat::{ Conversation, Role };

use log::{ info, warn };
use std::error::Error;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnSettings {
    pub stream: bool,
    pub budget: Budget,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            stream: false,
            budget: Budget { seconds: 30, tokens: 16000 },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub text: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub timestamp: i64,
}

/// Runs conversation turns against the remote agent. Holds no conversation
/// state of its own, so one instance is shared by every connection.
#[derive(Clone)]
pub struct ChatAgent {
    invoker: Arc<dyn AgentInvoker>,
    settings: TurnSettings,
}

impl ChatAgent {
    pub fn new(invoker: Arc<dyn AgentInvoker>, settings: TurnSettings) -> Self {
        Self { invoker, settings }
    }

    pub fn from_args(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let config = SqlApiConfig {
            account_url: args.account_url.clone(),
            token: args.token.clone(),
            token_type: args.token_type.clone(),
            agent_name: args.agent_name.clone(),
            warehouse: args.warehouse.clone(),
            role: args.role.clone(),
            database: args.database.clone(),
            schema: args.schema.clone(),
            statement_timeout: args.statement_timeout,
        };
        let invoker = new_invoker(config)?;
        info!(
            "Agent client configured: Agent={}, Stream={}, Budget={}s/{} tokens",
            invoker.agent_name(),
            args.stream,
            args.budget_seconds,
            args.budget_tokens
        );

        Ok(
            Self::new(invoker, TurnSettings {
                stream: args.stream,
                budget: Budget { seconds: args.budget_seconds, tokens: args.budget_tokens },
            })
        )
    }

    pub fn build_request(&self, conversation: &Conversation, prompt: &str) -> AgentRequest {
        AgentRequest {
            messages: vec![RequestMessage { role: Role::User, content: prompt.to_string() }],
            thread_id: conversation.thread_id().to_string(),
            parent_message_id: conversation.parent_message_id().map(str::to_string),
            stream: self.settings.stream.then_some(true),
            budget: Some(self.settings.budget),
        }
    }

    /// Runs one full turn. Both the prompt and the reply (or the error text
    /// standing in for it) end up in the history; a failed call leaves the
    /// parent message id as it was.
    pub async fn process_turn(&self, conversation: &mut Conversation, prompt: &str) -> TurnOutcome {
        conversation.push(Role::User, prompt);
        let request = self.build_request(conversation, prompt);

        let interpretation = match self.invoker.invoke(&request).await {
            Ok(raw) => interpret_raw(raw),
            Err(e) => {
                warn!("Agent call failed on thread {}: {}", conversation.thread_id(), e);
                Interpretation::from_error(&e)
            }
        };

        conversation.record_parent(interpretation.parent_message_id.as_deref());
        let message = conversation.push(Role::Assistant, interpretation.text.as_str());
        let timestamp = message.timestamp;

        info!(
            "Turn complete on thread {}: {} chars, {} tool call(s)",
            conversation.short_thread_id(),
            interpretation.text.len(),
            interpretation.tool_calls.len()
        );

        TurnOutcome {
            text: interpretation.text,
            tool_calls: interpretation.tool_calls,
            timestamp,
        }
    }
}
