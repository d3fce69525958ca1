pub mod api;
pub mod websocket;

use crate::agent::ChatAgent;
use crate::cli::Args;
use crate::config::ui::UiConfig;
use self::api::HttpServerOptions;
use self::websocket::{ ChatContext, WsServerOptions };
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    addr: String,
    context: Arc<ChatContext>,
    args: Args,
}

impl Server {
    pub fn new(addr: String, agent: Arc<ChatAgent>, ui: Arc<UiConfig>, args: Args) -> Self {
        Self {
            addr,
            context: Arc::new(ChatContext { agent, ui }),
            args,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Some(http_port) = self.args.http_port {
            self.start_http_server(http_port).await?;
        }

        self.start_ws_server().await?;

        Ok(())
    }

    async fn start_http_server(&self, http_port: u16) -> Result<(), Box<dyn Error + Send + Sync>> {
        api::start_http_server(http_port, self.context.ui.clone(), HttpServerOptions {
            enable_tls: self.args.enable_tls,
            tls_cert_path: self.args.tls_cert_path.as_deref(),
            tls_key_path: self.args.tls_key_path.as_deref(),
        }).await
    }

    async fn start_ws_server(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        websocket::start_ws_server(&self.addr, self.context.clone(), WsServerOptions {
            api_key: self.args.server_api_key.clone(),
            enable_tls: self.args.enable_tls,
            tls_cert_path: self.args.tls_cert_path.as_deref(),
            tls_key_path: self.args.tls_key_path.as_deref(),
        }).await
    }
}
