pub mod config;
pub mod content;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod mail;
pub mod notify;
pub mod queue;
pub mod serve;
pub mod shutdown;
pub mod store;

pub use config::{EnvConfig, Settings};
pub use dispatch::{DispatchConfig, Dispatcher, Tick};
pub use queue::RecipientQueue;
pub use serve::serve;
