pub mod api;
pub mod webhook_log;

use crate::agent::SlothAgent;
use crate::cli::Args;
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    addr: String,
    agent: Arc<SlothAgent>,
    args: Args,
}

impl Server {
    pub fn new(addr: String, agent: Arc<SlothAgent>, args: Args) -> Self {
        Self { addr, agent, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let state = api::AppState::new(
            self.agent.clone(),
            self.args.webhook_secret.clone(),
            self.args.webhook_rate_limit,
            self.args.webhook_log_capacity,
        );
        api::start_http_server(&self.addr, state, &self.args).await
    }
}
