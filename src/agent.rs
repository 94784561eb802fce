use crate::chart::{ host::ImageHost, place_graph_url, ChartClient, GraphRenderer };
use crate::cli::Args;
use crate::config::prompt::{ build_system_prompt, load_patient_data, load_system_prompt };
use crate::history::{ initialize_history_store, HistoryStore };
use crate::llm::LlmConfig;
use crate::llm::chat::{ ChatClient, new_client as new_chat_client };
use crate::messaging::dispatcher::{ DeliveryDispatcher, DeliveryReceipt, DeliverySettings };
use crate::messaging::image::ImageLimits;
use crate::messaging::pinnacle::PinnacleClient;
use crate::models::chat::ChatMessage;
use crate::models::inbound::InboundMessage;
use crate::models::message::RichMessage;
use crate::reply::{ parse_model_reply, APOLOGY_TEXT };
use crate::retry::{ with_retry, RetryPolicy };

use chrono::Utc;
use log::{ info, warn, error };
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

pub const WELCOME_TEXT: &str =
    "Hey there, it's SlothMD! I can help with your health records, lab results, medications and appointments. Just text me a question.";
pub const SUBSCRIBED_TEXT: &str =
    "You're in! You'll now get health tips and reminders from SlothMD. Text us any time with a question.";
pub const FALLBACK_TEXT: &str =
    "Sorry, something went wrong on our end. Please try again in a few minutes.";

const DEFAULT_HISTORY_TURNS: usize = 5;

/// Handles one inbound message end to end: routing, model call, charting and delivery.
#[derive(Clone)]
pub struct SlothAgent {
    chat_client: Arc<dyn ChatClient>,
    dispatcher: DeliveryDispatcher,
    history_store: Arc<dyn HistoryStore>,
    charts: Option<Arc<dyn GraphRenderer>>,
    system_prompt: String,
    retry: RetryPolicy,
    history_turns: usize,
}

impl SlothAgent {
    pub fn new(
        chat_client: Arc<dyn ChatClient>,
        dispatcher: DeliveryDispatcher,
        history_store: Arc<dyn HistoryStore>,
        system_prompt: String
    ) -> Self {
        Self {
            chat_client,
            dispatcher,
            history_store,
            charts: None,
            system_prompt,
            retry: RetryPolicy::default(),
            history_turns: DEFAULT_HISTORY_TURNS,
        }
    }

    pub fn with_charts(mut self, charts: Arc<dyn GraphRenderer>) -> Self {
        self.charts = Some(charts);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns.max(1);
        self
    }

    fn initialize_chat_client(args: &Args) -> Result<Arc<dyn ChatClient>, Box<dyn Error + Send + Sync>> {
        let chat_api_key = if !args.chat_api_key.is_empty() {
            Some(args.chat_api_key.clone())
        } else {
            None
        };
        let chat_config = LlmConfig {
            llm_type: args.chat_llm_type.parse()?,
            base_url: args.chat_base_url.clone(),
            api_key: chat_api_key,
            completion_model: args.chat_model.clone(),
            max_tokens: Some(args.chat_max_tokens),
            temperature: Some(args.chat_temperature),
            timeout_secs: args.http_timeout_secs,
        };
        let chat_client = new_chat_client(&chat_config)?;
        info!(
            "Chat client configured: Type={}, Model={}, BaseURL={:?}",
            args.chat_llm_type,
            chat_client.get_model(),
            chat_config.base_url.as_deref().unwrap_or("adapter default")
        );
        Ok(chat_client)
    }

    fn initialize_charts(
        args: &Args,
        timeout: Duration
    ) -> Result<Option<Arc<dyn GraphRenderer>>, Box<dyn Error + Send + Sync>> {
        let Some(url) = args.chart_service_url.as_deref() else {
            info!("No chart service configured; graphs will be dropped");
            return Ok(None);
        };
        let host = args.image_host_url
            .as_deref()
            .map(|host_url| ImageHost::new(host_url, &args.image_host_api_key, timeout))
            .transpose()?;
        info!("Chart service: {} (image host: {})", url, args.image_host_url.as_deref().unwrap_or("none"));
        let charts: Arc<dyn GraphRenderer> = Arc::new(ChartClient::new(url, host, timeout)?);
        Ok(Some(charts))
    }

    pub fn from_args(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let timeout = Duration::from_secs(args.http_timeout_secs);
        let retry = RetryPolicy::new(args.send_max_attempts, Duration::from_millis(args.send_retry_base_ms));

        let chat_client = Self::initialize_chat_client(args)?;

        let provider = PinnacleClient::new(&args.pinnacle_api_key, &args.pinnacle_base_url, timeout)?;
        let dispatcher = DeliveryDispatcher::new(Arc::new(provider), DeliverySettings {
            force_fallback: args.force_sms_fallback,
            text_limit: args.sms_text_limit,
            image_limits: ImageLimits {
                max_size_kb: args.mms_image_max_size_kb,
                max_dimension: args.mms_image_max_dimension,
            },
            retry,
            from_number: args.pinnacle_from_number.clone(),
        });

        let history_store = initialize_history_store(args)?;

        let base_prompt = load_system_prompt(args.prompt_path.as_deref())?;
        let patient_data = load_patient_data(args.patient_data_path.as_deref())?;
        let system_prompt = build_system_prompt(&base_prompt, patient_data.as_ref());

        let mut agent = Self::new(chat_client, dispatcher, history_store, system_prompt)
            .with_retry(retry)
            .with_history_turns(args.history_prompt_turns);
        if let Some(charts) = Self::initialize_charts(args, timeout)? {
            agent = agent.with_charts(charts);
        }
        Ok(agent)
    }

    /// Replies to an inbound message. On failure a generic apology SMS is
    /// attempted before the error is returned.
    pub async fn handle_inbound(
        &self,
        inbound: &InboundMessage
    ) -> Result<DeliveryReceipt, Box<dyn Error + Send + Sync>> {
        let from = inbound.from.as_str();
        let reply_from = inbound.to.as_deref();
        let content = inbound.content();
        let lower = content.to_lowercase();

        if lower.contains("slothmd") {
            info!("Welcome keyword from {}", from);
            return Ok(self.dispatcher.send_text(from, reply_from, WELCOME_TEXT).await?);
        }
        if lower.contains("sloth") {
            info!("Subscription keyword from {}", from);
            return Ok(self.dispatcher.send_text(from, reply_from, SUBSCRIBED_TEXT).await?);
        }

        match self.respond(from, reply_from, content).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                error!("Failed to handle message from {}: {}", from, e);
                if let Err(send_err) = self.dispatcher.send_text(from, reply_from, FALLBACK_TEXT).await {
                    error!("Fallback SMS to {} failed: {}", from, send_err);
                }
                Err(e)
            }
        }
    }

    async fn conversation_for_prompt(&self, from: &str, content: &str) -> Vec<ChatMessage> {
        let current = ChatMessage {
            role: "user".to_string(),
            content: content.to_string(),
            timestamp: Utc::now().timestamp(),
        };
        if let Err(e) = self.history_store.add_message(from, "user", content).await {
            warn!("History write (user) failed: {}", e);
            return vec![current];
        }
        match self.history_store.get_conversation(from, self.history_turns).await {
            Ok(conversation) if !conversation.messages.is_empty() => conversation.messages,
            Ok(_) => vec![current],
            Err(e) => {
                warn!("History read failed: {}", e);
                vec![current]
            }
        }
    }

    async fn respond(
        &self,
        from: &str,
        reply_from: Option<&str>,
        content: &str
    ) -> Result<DeliveryReceipt, Box<dyn Error + Send + Sync>> {
        if content.is_empty() {
            return Err("inbound message has no content".into());
        }
        let messages = self.conversation_for_prompt(from, content).await;

        let completion = with_retry(self.retry, "Chat completion", || {
            self.chat_client.complete(&self.system_prompt, &messages)
        }).await?;

        let mut message = parse_model_reply(&completion.response);
        if message.is_empty() {
            warn!("Model reply for {} had no content", from);
            message = RichMessage::text_only(APOLOGY_TEXT);
        }

        let graph_url = match (&message.graph, &self.charts) {
            (Some(graph), Some(charts)) =>
                match charts.resolve(graph).await {
                    Ok(url) => Some(url),
                    Err(e) => {
                        warn!("Dropping {} graph: {}", graph.kind, e);
                        None
                    }
                }
            (Some(graph), None) => {
                warn!("Dropping {} graph: no chart service configured", graph.kind);
                None
            }
            (None, _) => None,
        };
        place_graph_url(&mut message, graph_url.as_deref());

        if let Err(e) = self.history_store.add_message(from, "assistant", &message.summary()).await {
            warn!("History write (assistant) failed: {}", e);
        }

        let receipt = self.dispatcher.send_message(from, reply_from, message).await?;
        info!("Replied to {} over {}", from, receipt.channel);
        Ok(receipt)
    }
}
