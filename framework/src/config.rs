use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

pub use config::ConfigError;

use crate::content::Content;
use crate::dispatch::{DispatchConfig, MAX_WINDOW};

pub trait EnvConfig: Sized {
    fn from_env() -> Result<Self, ConfigError>;
    fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError>;
}

impl<D> EnvConfig for D
where
    D: DeserializeOwned,
{
    fn from_env() -> Result<Self, ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::default())
            .build()?
            .try_deserialize()
    }

    fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix(prefix))
            .build()?
            .try_deserialize()
    }
}

/// Environment prefix for [`Settings`].
pub const SETTINGS_PREFIX: &str = "BATCHMAIL";

/// Service settings, read from `BATCHMAIL_*` variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// HTTP ingestion port.
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Pause between two recipient sends.
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,

    /// Backoff window after a rate-limit refusal.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Wait after each full batch; 0 disables.
    #[serde(default)]
    pub batch_pause_secs: u64,

    /// Operator mailbox for completion and resume notices.
    pub notify_address: Option<String>,

    /// Page whose title and HTML become the message.
    pub content_url: Option<String>,

    #[serde(default = "default_content_timeout_secs")]
    pub content_timeout_secs: u64,

    /// Static subject used when no `content_url` is set.
    pub subject: Option<String>,

    /// Static HTML body used when no `content_url` is set.
    pub body: Option<String>,
}

fn default_state_file() -> PathBuf {
    PathBuf::from("./data/state.json")
}

fn default_port() -> u16 {
    3030
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_send_delay_ms() -> u64 {
    1000
}

fn default_cooldown_secs() -> u64 {
    3600
}

fn default_batch_size() -> usize {
    500
}

fn default_content_timeout_secs() -> u64 {
    30
}

fn clamp_window(name: &str, secs: u64) -> Duration {
    let window = Duration::from_secs(secs);
    if window > MAX_WINDOW {
        tracing::warn!(setting = name, secs, max_secs = MAX_WINDOW.as_secs(), "window too long, clamping");
        return MAX_WINDOW;
    }
    window
}

impl Settings {
    /// Read `.env` (if present) and then `BATCHMAIL_*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env_with_prefix(SETTINGS_PREFIX)
    }

    /// Windows longer than [`MAX_WINDOW`] are clamped to it.
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            send_delay: Duration::from_millis(self.send_delay_ms),
            cooldown: clamp_window("cooldown_secs", self.cooldown_secs),
            batch_size: self.batch_size.max(1),
            batch_pause: (self.batch_pause_secs > 0)
                .then(|| clamp_window("batch_pause_secs", self.batch_pause_secs)),
        }
    }

    pub fn content_timeout(&self) -> Duration {
        Duration::from_secs(self.content_timeout_secs)
    }

    /// Content from `subject`/`body`, each falling back independently.
    pub fn static_content(&self) -> Content {
        let fallback = Content::fallback();
        Content::new(
            self.subject.clone().unwrap_or(fallback.subject),
            self.body.clone().unwrap_or(fallback.body),
            true,
        )
    }
}
