use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address and port for the webhook server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:5000")]
    pub server_addr: String,

    /// Shared secret for webhook signatures (X-Api-Ts / X-Api-Sign). Unset disables the check.
    #[arg(long, env = "WEBHOOK_SECRET")]
    pub webhook_secret: Option<String>,

    /// Maximum inbound webhooks accepted per second across all senders.
    #[arg(long, env = "WEBHOOK_RATE_LIMIT", default_value = "10")]
    pub webhook_rate_limit: u32,

    /// Number of received webhook payloads kept for GET /messages.
    #[arg(long, env = "WEBHOOK_LOG_CAPACITY", default_value = "200")]
    pub webhook_log_capacity: usize,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    // --- Pinnacle Messaging Args ---
    /// API key for the Pinnacle messaging provider.
    #[arg(long, env = "PINNACLE_API_KEY", default_value = "")]
    pub pinnacle_api_key: String,

    /// Base URL of the Pinnacle REST API.
    #[arg(long, env = "PINNACLE_BASE_URL", default_value = "https://api.pinnacle.sh")]
    pub pinnacle_base_url: String,

    /// Sender number used for outbound messages. Falls back to the inbound "to" number.
    #[arg(long, env = "PINNACLE_FROM_NUMBER")]
    pub pinnacle_from_number: Option<String>,

    /// Skip the RCS capability probe and always deliver over SMS/MMS.
    #[arg(long, env = "FORCE_SMS_FALLBACK", default_value = "false")]
    pub force_sms_fallback: bool,

    /// Character budget for flattened SMS/MMS text before truncation.
    #[arg(long, env = "SMS_TEXT_LIMIT", default_value = "1500")]
    pub sms_text_limit: usize,

    /// Target size in KB for images delivered over MMS.
    #[arg(long, env = "MMS_IMAGE_MAX_SIZE_KB", default_value = "100")]
    pub mms_image_max_size_kb: usize,

    /// Longest side in pixels for images delivered over MMS.
    #[arg(long, env = "MMS_IMAGE_MAX_DIMENSION", default_value = "800")]
    pub mms_image_max_dimension: u32,

    /// Attempts per provider send (and per LLM call) before giving up.
    #[arg(long, env = "SEND_MAX_ATTEMPTS", default_value = "3")]
    pub send_max_attempts: u32,

    /// Delay before the first retry in milliseconds; doubled on every further retry.
    #[arg(long, env = "SEND_RETRY_BASE_MS", default_value = "1000")]
    pub send_retry_base_ms: u64,

    /// Timeout in seconds for every outbound HTTP request.
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value = "30")]
    pub http_timeout_secs: u64,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (gemini, anthropic, openrouter)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "gemini")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gemini-2.0-flash, claude-3-5-haiku-latest)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    /// Maximum tokens requested per completion.
    #[arg(long, env = "CHAT_MAX_TOKENS", default_value = "1000")]
    pub chat_max_tokens: u32,

    /// Sampling temperature for completions.
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.7")]
    pub chat_temperature: f32,

    // --- Prompt Args ---
    /// Optional file replacing the built-in system prompt.
    #[arg(long, env = "PROMPT_PATH")]
    pub prompt_path: Option<String>,

    /// Optional FHIR JSON document appended to the system prompt as patient context.
    #[arg(long, env = "PATIENT_DATA_PATH")]
    pub patient_data_path: Option<String>,

    // --- History Store Args ---
    /// History chat store type (memory, redis)
    #[arg(long, env = "HISTORY_TYPE", default_value = "memory")]
    pub history_type: String,

    /// History chat store host endpoint (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "HISTORY_HOST", default_value = "redis://127.0.0.1:6379")]
    pub history_host: String,

    /// Prefix for Redis history keys.
    #[arg(long, env = "HISTORY_REDIS_PREFIX", default_value = "history:")]
    pub history_redis_prefix: String,

    /// Number of past turns sent to the model with each message.
    #[arg(long, env = "HISTORY_PROMPT_TURNS", default_value = "5")]
    pub history_prompt_turns: usize,

    /// Number of turns retained per phone number.
    #[arg(long, env = "HISTORY_MAX_TURNS", default_value = "50")]
    pub history_max_turns: usize,

    // --- Chart Args ---
    /// Base URL of the chart rendering service. Unset disables graph replies.
    #[arg(long, env = "CHART_SERVICE_URL")]
    pub chart_service_url: Option<String>,

    /// Upload endpoint of the image hosting service. Unset keeps charts as data URIs.
    #[arg(long, env = "IMAGE_HOST_URL")]
    pub image_host_url: Option<String>,

    /// API key sent to the image hosting service.
    #[arg(long, env = "IMAGE_HOST_API_KEY", default_value = "")]
    pub image_host_api_key: String,

    // --- General App Args ---
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}
