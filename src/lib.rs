pub mod agent;
pub mod chart;
pub mod cli;
pub mod config;
pub mod history;
pub mod llm;
pub mod messaging;
pub mod models;
pub mod reply;
pub mod retry;
pub mod server;

use agent::SlothAgent;
use cli::Args;
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Webhook Signature Check: {}", args.webhook_secret.is_some());
    info!("Webhook Rate Limit: {}/s", args.webhook_rate_limit);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Pinnacle Base URL: {}", args.pinnacle_base_url);
    info!("Force SMS Fallback: {}", args.force_sms_fallback);
    info!("SMS Text Limit: {}", args.sms_text_limit);
    info!(
        "MMS Image Limits: {}KB / {}px",
        args.mms_image_max_size_kb,
        args.mms_image_max_dimension
    );
    info!("Send Retry: {} attempts, base {}ms", args.send_max_attempts, args.send_retry_base_ms);
    info!("History Store Type: {}", args.history_type);
    info!("History Turns In Prompt: {}", args.history_prompt_turns);
    info!("Prompt Path: {}", args.prompt_path.as_deref().unwrap_or("built-in"));
    info!("Patient Data Path: {}", args.patient_data_path.as_deref().unwrap_or("none"));
    info!("Chart Service URL: {}", args.chart_service_url.as_deref().unwrap_or("none"));
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let agent = Arc::new(SlothAgent::from_args(&args)?);
    let server = Server::new(args.server_addr.clone(), agent, args.clone());
    server.run().await?;

    Ok(())
}
