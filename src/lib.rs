pub mod agent;
pub mod cli;
pub mod config;
pub mod cortex;
pub mod models;
pub mod server;
pub mod session;

use agent::ChatAgent;
use cli::Args;
use config::ui::initialize_ui_config;
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("HTTP Port: {:?}", args.http_port);
    info!("Account URL: {}", args.account_url);
    info!("Agent Name: {}", args.agent_name);
    info!("Token Type: {}", args.token_type);
    info!("Warehouse: {}", args.warehouse.as_deref().unwrap_or("(default)"));
    info!("Role: {}", args.role.as_deref().unwrap_or("(default)"));
    info!("Statement Timeout: {}s", args.statement_timeout);
    info!("Streaming Replies: {}", args.stream);
    info!("Budget: {}s / {} tokens", args.budget_seconds, args.budget_tokens);
    info!("UI Config Path: {}", args.ui_config_path.as_deref().unwrap_or("(built-in)"));
    info!("TLS Enabled: {}", args.enable_tls);
    info!("Handshake Auth: {}", args.server_api_key.is_some());
    info!("-------------------------");

    let ui = initialize_ui_config(args.ui_config_path.as_deref())?;
    let agent = Arc::new(ChatAgent::from_args(&args)?);
    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, agent, ui, args.clone());
    server.run().await?;

    Ok(())
}
