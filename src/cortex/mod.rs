pub mod reply;
pub mod sql_api;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

use crate::models::agent::AgentRequest;
use self::sql_api::{ SqlApiConfig, SqlApiInvoker };

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("malformed agent reply: {0}")]
    MalformedReply(String),
    #[error("{0}")]
    RemoteInvocation(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("failed to encode agent request: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Executes one agent call and hands back the raw reply cell, undecoded.
/// `Ok(None)` means the call succeeded but produced no reply.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, request: &AgentRequest) -> Result<Option<JsonValue>, AgentError>;

    fn agent_name(&self) -> &str;
}

pub fn new_invoker(
    config: SqlApiConfig
) -> Result<Arc<dyn AgentInvoker>, Box<dyn StdError + Send + Sync>> {
    let invoker = SqlApiInvoker::from_config(config)?;
    Ok(Arc::new(invoker))
}
