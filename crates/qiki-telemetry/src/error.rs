use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TelemetryError>;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to encode decision trace: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: io::Error,
    },

    #[error("Publish failed: {0}")]
    Publish(#[source] io::Error),

    #[error("Failed to start telemetry worker: {0}")]
    Spawn(#[source] io::Error),
}
