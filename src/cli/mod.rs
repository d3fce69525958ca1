use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Agent Connection Args ---
    /// Account base URL for the SQL REST API (e.g., https://myorg-myaccount.snowflakecomputing.com)
    #[arg(long, env = "SNOWFLAKE_ACCOUNT_URL")]
    pub account_url: String,

    /// Bearer token used to authenticate SQL API calls.
    #[arg(long, env = "SNOWFLAKE_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Token type sent in X-Snowflake-Authorization-Token-Type (PROGRAMMATIC_ACCESS_TOKEN, KEYPAIR_JWT, OAUTH)
    #[arg(long, env = "SNOWFLAKE_TOKEN_TYPE", default_value = "PROGRAMMATIC_ACCESS_TOKEN")]
    pub token_type: String,

    /// Fully qualified name of the agent to invoke.
    #[arg(
        long,
        env = "AGENT_NAME",
        default_value = "SNOWFLAKE_EXAMPLE.MULTI_AGENT_ORCHESTRATION.BUSINESS_ANALYTICS_ASSISTANT"
    )]
    pub agent_name: String,

    /// Warehouse the invoking statement runs on.
    #[arg(long, env = "SNOWFLAKE_WAREHOUSE")]
    pub warehouse: Option<String>,

    /// Role the invoking statement runs as.
    #[arg(long, env = "SNOWFLAKE_ROLE")]
    pub role: Option<String>,

    /// Default database for the invoking statement.
    #[arg(long, env = "SNOWFLAKE_DATABASE")]
    pub database: Option<String>,

    /// Default schema for the invoking statement.
    #[arg(long, env = "SNOWFLAKE_SCHEMA")]
    pub schema: Option<String>,

    /// Statement timeout in seconds, enforced by the SQL API.
    #[arg(long, env = "STATEMENT_TIMEOUT", default_value = "60")]
    pub statement_timeout: u32,

    // --- Agent Request Args ---
    /// Ask the agent for an event-stream reply.
    #[arg(long, env = "AGENT_STREAM", default_value = "false")]
    pub stream: bool,

    /// Time ceiling in seconds the agent may spend on one reply. Sent with every request.
    #[arg(long, env = "AGENT_BUDGET_SECONDS", default_value = "30")]
    pub budget_seconds: u32,

    /// Token ceiling the agent may spend on one reply.
    #[arg(long, env = "AGENT_BUDGET_TOKENS", default_value = "16000")]
    pub budget_tokens: u32,

    // --- General App Args ---
    /// Path to a JSON file overriding the page title, caption and sample questions.
    #[arg(long, env = "UI_CONFIG_PATH")]
    pub ui_config_path: Option<String>,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    /// Host address and port for the WebSocket server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Optional API Key required for clients to connect to the WebSocket server. If set, clients must sign requests with it.
    #[arg(long, env = "SERVER_API_KEY")]
    pub server_api_key: Option<String>,

    /// Optional port for the HTTP API (page config, health).
    #[arg(long, env = "HTTP_PORT")]
    pub http_port: Option<u16>,

    /// Optional path to the TLS certificate file (PEM format) for enabling WSS. Requires --tls-key.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling WSS. Requires --tls-cert.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}
