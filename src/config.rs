use clap::Parser;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Server host to bind to
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to bind to
    #[arg(long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// Zero-shot model used for grievance text
    #[arg(long, env = "TEXT_MODEL", default_value = "facebook/bart-large-mnli")]
    pub text_model: String,

    /// Zero-shot model used for grievance images
    #[arg(long, env = "IMAGE_MODEL", default_value = "openai/clip-vit-base-patch32")]
    pub image_model: String,

    /// Base URL of the hosted inference endpoint
    #[arg(
        long,
        env = "INFERENCE_URL",
        default_value = "https://api-inference.huggingface.co"
    )]
    pub inference_url: String,

    /// Bearer token for the inference endpoint
    #[arg(long, env = "HF_API_TOKEN")]
    pub hf_api_token: Option<String>,

    /// Seconds a cached classification stays valid
    #[arg(long, env = "CACHE_TTL_SECS", default_value = "3600")]
    pub cache_ttl_secs: u64,

    /// Maximum number of cached classification results
    #[arg(long, env = "CACHE_CAPACITY", default_value = "1024")]
    pub cache_capacity: usize,

    /// Seconds to wait for a classification before giving up
    #[arg(long, env = "CLASSIFY_TIMEOUT_SECS", default_value = "20")]
    pub classify_timeout_secs: u64,

    /// Number of classification worker tasks per model
    #[arg(long, env = "CLASSIFY_WORKERS", default_value = "4")]
    pub classify_workers: usize,

    /// Category reported for raw labels missing from the mapping table
    #[arg(long, env = "DEFAULT_CATEGORY", default_value = "Other")]
    pub default_category: String,

    /// Upstream JSON-RPC endpoint; /rpc is disabled when unset
    #[arg(long, env = "RPC_UPSTREAM_URL")]
    pub rpc_upstream_url: Option<String>,

    /// Seconds to wait for the RPC upstream
    #[arg(long, env = "RPC_TIMEOUT_SECS", default_value = "30")]
    pub rpc_timeout_secs: u64,

    /// SendGrid API key; email notifications are disabled when unset
    #[arg(long, env = "SENDGRID_API_KEY")]
    pub sendgrid_api_key: Option<String>,

    /// Verified sender address for email notifications
    #[arg(long, env = "EMAIL_FROM")]
    pub email_from: Option<String>,

    /// Comma-separated recipient list for email notifications
    #[arg(long, env = "EMAIL_TO")]
    pub email_to: Option<String>,

    /// Twilio account SID; SMS notifications are disabled when unset
    #[arg(long, env = "TWILIO_ACCOUNT_SID")]
    pub twilio_account_sid: Option<String>,

    /// Twilio auth token
    #[arg(long, env = "TWILIO_AUTH_TOKEN")]
    pub twilio_auth_token: Option<String>,

    /// Sender phone number for SMS notifications
    #[arg(long, env = "TWILIO_FROM")]
    pub twilio_from: Option<String>,

    /// Recipient phone number for SMS notifications
    #[arg(long, env = "SMS_TO")]
    pub sms_to: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub capacity: usize,
}

impl From<&Config> for CacheSettings {
    fn from(config: &Config) -> Self {
        Self {
            ttl: Duration::from_secs(config.cache_ttl_secs),
            capacity: config.cache_capacity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub workers: usize,
    pub classify_timeout: Duration,
}

impl From<&Config> for WorkerSettings {
    fn from(config: &Config) -> Self {
        Self {
            workers: config.classify_workers.max(1),
            classify_timeout: Duration::from_secs(config.classify_timeout_secs),
        }
    }
}

impl Config {
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn email_recipients(&self) -> Vec<String> {
        self.email_to
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(str::to_owned)
            .collect()
    }
}
