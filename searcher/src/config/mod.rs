//! Configuration and dependency initialization.

mod dependencies;
mod settings;

pub use dependencies::Dependencies;
pub use settings::{Settings, DEFAULT_DLQ_TOPIC, DEFAULT_MAX_RETRIES};
