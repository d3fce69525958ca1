use async_trait::async_trait;
use log::{ debug, info };
use reqwest::{
    Client as HttpClient,
    StatusCode,
    header::{ HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT },
};
use serde::{ Deserialize, Serialize };
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::time::Duration;

use super::{ AgentError, AgentInvoker };
use crate::models::agent::AgentRequest;

const STATEMENTS_ROUTE: &str = "/api/v2/statements";
const INVOKE_AGENT_SQL: &str =
    "SELECT SNOWFLAKE.CORTEX.INVOKE_AGENT(?, PARSE_JSON(?)) AS RESPONSE";
const TOKEN_TYPE_HEADER: &str = "x-snowflake-authorization-token-type";
const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SqlApiConfig {
    pub account_url: String,
    pub token: String,
    pub token_type: String,
    pub agent_name: String,
    pub warehouse: Option<String>,
    pub role: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub statement_timeout: u32,
}

#[derive(Serialize, Debug)]
struct Binding {
    #[serde(rename = "type")]
    binding_type: &'static str,
    value: String,
}

impl Binding {
    fn text(value: impl Into<String>) -> Self {
        Self { binding_type: "TEXT", value: value.into() }
    }
}

#[derive(Serialize, Debug)]
struct StatementRequest<'a> {
    statement: &'static str,
    timeout: u32,
    bindings: BTreeMap<&'static str, Binding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    data: Option<Vec<Vec<JsonValue>>>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    statement_handle: Option<String>,
}

impl StatementResponse {
    fn first_cell(self) -> Option<JsonValue> {
        self.data
            .and_then(|rows| rows.into_iter().next())
            .and_then(|row| row.into_iter().next())
    }
}

/// Where a submitted statement stands after one SQL API response.
#[derive(Debug, PartialEq)]
enum StatementState {
    Done(Option<JsonValue>),
    Running(String),
}

/// Runs `INVOKE_AGENT` through the SQL REST API. The agent name and the
/// request JSON travel as bind parameters, never spliced into the SQL text.
pub struct SqlApiInvoker {
    http: HttpClient,
    url: String,
    config: SqlApiConfig,
    poll_interval: Duration,
}

impl SqlApiInvoker {
    pub fn new(config: SqlApiConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("cortex-agent-chat/", env!("CARGO_PKG_VERSION")))
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.token)).map_err(|e|
                format!("Invalid token format: {}", e)
            )?
        );
        headers.insert(
            HeaderName::from_static(TOKEN_TYPE_HEADER),
            HeaderValue::from_str(&config.token_type).map_err(|e|
                format!("Invalid token type '{}': {}", config.token_type, e)
            )?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        let url = format!("{}{}", config.account_url.trim_end_matches('/'), STATEMENTS_ROUTE);
        Ok(Self { http, url, config, poll_interval: STATUS_POLL_INTERVAL })
    }

    pub fn from_config(config: SqlApiConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        if config.account_url.trim().is_empty() {
            return Err("Account URL is required".into());
        }
        if config.token.trim().is_empty() {
            return Err("API token is required".into());
        }
        if config.agent_name.trim().is_empty() {
            return Err("Agent name is required".into());
        }
        Self::new(config)
    }

    fn build_statement(&self, request: &AgentRequest) -> Result<StatementRequest<'_>, AgentError> {
        let request_json = serde_json::to_string(request)?;
        let mut bindings = BTreeMap::new();
        bindings.insert("1", Binding::text(self.config.agent_name.as_str()));
        bindings.insert("2", Binding::text(request_json));

        Ok(StatementRequest {
            statement: INVOKE_AGENT_SQL,
            timeout: self.config.statement_timeout,
            bindings,
            warehouse: self.config.warehouse.as_deref(),
            role: self.config.role.as_deref(),
            database: self.config.database.as_deref(),
            schema: self.config.schema.as_deref(),
        })
    }

    fn status_url(&self, handle: &str) -> String {
        format!("{}/{}", self.url, handle)
    }

    /// The SQL API answers 202 once a statement outlives its synchronous
    /// window. The call is still running remotely, so keep asking for its
    /// result until it finishes or fails.
    async fn await_statement(&self, mut handle: String) -> Result<Option<JsonValue>, AgentError> {
        loop {
            debug!("Statement {} still running, checking again in {:?}", handle, self.poll_interval);
            tokio::time::sleep(self.poll_interval).await;

            let resp = self.http.get(self.status_url(&handle)).send().await?;
            let status = resp.status();
            let text = resp.text().await?;
            match parse_statement_body(status, &text)? {
                StatementState::Done(cell) => {
                    return Ok(cell);
                }
                StatementState::Running(next) => {
                    handle = next;
                }
            }
        }
    }
}

#[async_trait]
impl AgentInvoker for SqlApiInvoker {
    async fn invoke(&self, request: &AgentRequest) -> Result<Option<JsonValue>, AgentError> {
        let body = self.build_statement(request)?;
        info!(
            "Invoking agent '{}' on thread {} (parent: {})",
            self.config.agent_name,
            request.thread_id,
            request.parent_message_id.as_deref().unwrap_or("none")
        );

        let resp = self.http.post(&self.url).json(&body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        debug!("SQL API responded {} ({} bytes)", status, text.len());

        match parse_statement_body(status, &text)? {
            StatementState::Done(cell) => Ok(cell),
            StatementState::Running(handle) => self.await_statement(handle).await,
        }
    }

    fn agent_name(&self) -> &str {
        &self.config.agent_name
    }
}

fn parse_statement_body(status: StatusCode, body: &str) -> Result<StatementState, AgentError> {
    if status == StatusCode::ACCEPTED {
        return serde_json
            ::from_str::<StatementResponse>(body)
            .ok()
            .and_then(|r| r.statement_handle)
            .filter(|handle| !handle.trim().is_empty())
            .map(StatementState::Running)
            .ok_or_else(|| {
                AgentError::RemoteInvocation(
                    "SQL API accepted the statement without a handle".to_string()
                )
            });
    }

    if !status.is_success() {
        let message = serde_json
            ::from_str::<StatementResponse>(body)
            .ok()
            .and_then(|r| r.message)
            .unwrap_or_else(|| body.trim().to_string());
        return Err(AgentError::RemoteInvocation(format!("SQL API returned {}: {}", status, message)));
    }

    let parsed: StatementResponse = serde_json
        ::from_str(body)
        .map_err(|e| AgentError::MalformedReply(format!("unreadable SQL API result: {}", e)))?;
    Ok(StatementState::Done(parsed.first_cell()))
}
