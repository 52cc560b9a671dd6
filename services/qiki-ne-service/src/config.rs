//! Service Configuration
//!
//! Configuration management for the QIKI decision service.
//! Supports config files, environment variables, and CLI arguments.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use qiki_telemetry::{NatsTransport, TelemetryPublisher};
use qiki_types::{ActionCatalog, ActionSpec, PipelineConfig};

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Decision pipeline parameters
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Actions the engine may propose
    #[serde(default = "default_catalog")]
    pub catalog: ActionCatalog,

    /// Fixed scorer output used when no model runtime is attached
    #[serde(default)]
    pub scorer: ScorerSettings,

    /// Decision trace publication
    #[serde(default)]
    pub telemetry: TelemetrySettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Static scorer output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerSettings {
    /// One raw score per action class
    #[serde(default = "default_scores")]
    pub scores: Vec<f64>,

    /// Priority attached to every proposal
    #[serde(default = "default_priority")]
    pub priority: f64,

    /// Continuous parameter vector
    #[serde(default = "default_params")]
    pub params: Vec<f64>,
}

impl Default for ScorerSettings {
    fn default() -> Self {
        Self {
            scores: default_scores(),
            priority: default_priority(),
            params: default_params(),
        }
    }
}

/// Telemetry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySettings {
    /// Publish one trace per decision cycle
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// NATS server URL. Traces go to the log when unset or unreachable.
    #[serde(default)]
    pub nats_url: Option<String>,

    /// NATS subject
    #[serde(default = "default_subject")]
    pub subject: String,

    /// Bounded queue between the engine and the transport worker
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            nats_url: None,
            subject: default_subject(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Serve a Prometheus scrape endpoint
    #[serde(default)]
    pub enabled: bool,

    /// Host to bind the endpoint to
    #[serde(default = "default_metrics_host")]
    pub host: String,

    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_metrics_host(),
            port: default_metrics_port(),
        }
    }
}

impl MetricsConfig {
    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

// =============================================================================
// Default Functions
// =============================================================================

fn default_catalog() -> ActionCatalog {
    ActionCatalog::new(vec![
        ActionSpec::new("HOLD_POSITION"),
        ActionSpec::new("COOLING_BOOST"),
    ])
    .unwrap_or_default()
}

fn default_scores() -> Vec<f64> {
    vec![2.0, 0.5, 0.0, 0.0, 0.0, 0.0]
}

fn default_priority() -> f64 {
    0.5
}

fn default_params() -> Vec<f64> {
    vec![0.0; 4]
}

fn default_subject() -> String {
    NatsTransport::DEFAULT_SUBJECT.to_string()
}

fn default_queue_capacity() -> usize {
    TelemetryPublisher::DEFAULT_CAPACITY
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_metrics_host() -> String {
    "0.0.0.0".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Configuration Loading
// =============================================================================

impl ServiceConfig {
    /// Load configuration from config files and environment
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        Self::load_from("config", config_path)
    }

    /// Layer `<config_dir>/default`, `<config_dir>/local`, the explicit file,
    /// then the environment. Later sources win.
    pub fn load_from(config_dir: &str, config_path: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name(&format!("{config_dir}/default")).required(false))
            .add_source(config::File::with_name(&format!("{config_dir}/local")).required(false));

        // An explicitly named file must exist
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        // Environment variables, e.g. QIKI__PIPELINE__TIME_BUDGET_MS=12
        builder = builder.add_source(
            config::Environment::with_prefix("QIKI")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Check the configuration as a whole before building the engine
    pub fn validate(&self) -> anyhow::Result<()> {
        self.pipeline.validate()?;

        if self.catalog.is_empty() {
            anyhow::bail!("catalog must declare at least one action");
        }
        if self.catalog.len() > self.pipeline.num_classes {
            anyhow::bail!(
                "catalog declares {} actions but the scorer emits only {} classes",
                self.catalog.len(),
                self.pipeline.num_classes
            );
        }
        if self.scorer.scores.len() != self.pipeline.num_classes {
            anyhow::bail!(
                "scorer.scores has {} entries, pipeline.num_classes is {}",
                self.scorer.scores.len(),
                self.pipeline.num_classes
            );
        }
        if self.scorer.params.len() != self.pipeline.param_dim {
            anyhow::bail!(
                "scorer.params has {} entries, pipeline.param_dim is {}",
                self.scorer.params.len(),
                self.pipeline.param_dim
            );
        }
        if self.telemetry.enabled && self.telemetry.queue_capacity == 0 {
            anyhow::bail!("telemetry.queue_capacity must be at least 1");
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            anyhow::bail!("logging.format must be \"json\" or \"pretty\", got {:?}", self.logging.format);
        }
        if self.metrics.enabled {
            self.metrics.socket_addr()?;
        }

        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            catalog: default_catalog(),
            scorer: ScorerSettings::default(),
            telemetry: TelemetrySettings::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServiceConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.catalog.len(), 2);
        assert!(config.catalog.contains("HOLD_POSITION"));
        assert_eq!(config.telemetry.subject, "qiki.neural.proposals");
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_deserializes_sections() {
        let json = r#"{
            "pipeline": {"topk": 2, "time_budget_ms": 12},
            "catalog": {"actions": [
                {"name": "THROTTLE_UP", "params": {"level": [0.0, 1.0]}}
            ]},
            "scorer": {"scores": [1.0, 0.0, 0.0, 0.0, 0.0, 0.0]},
            "logging": {"format": "json"}
        }"#;
        let config: ServiceConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.pipeline.topk, 2);
        assert_eq!(config.pipeline.time_budget_ms, 12);
        assert_eq!(config.pipeline.window, 16);
        assert_eq!(config.catalog.get("THROTTLE_UP").unwrap().bounds("level").unwrap().max, 1.0);
        assert_eq!(config.logging.format, "json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scorer_shape_must_match_pipeline() {
        let mut config = ServiceConfig::default();
        config.scorer.scores = vec![1.0, 2.0];

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_catalog_rejected() {
        let mut config = ServiceConfig::default();
        config.pipeline.num_classes = 1;
        config.scorer.scores = vec![1.0];

        assert!(config.validate().is_err());
    }

    fn write(path: &std::path::Path, contents: &str) {
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_explicit_file_overrides_default_and_local() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("default.toml"),
            r#"
            [pipeline]
            time_budget_ms = 8
            topk = 3

            [[catalog.actions]]
            name = "HOLD_POSITION"

            [[catalog.actions]]
            name = "COOLING_BOOST"
            "#,
        );
        write(&dir.path().join("local.toml"), "[pipeline]\nwindow = 4\n");
        let custom = dir.path().join("custom.toml");
        write(
            &custom,
            r#"
            [pipeline]
            time_budget_ms = 50
            topk = 1

            [[catalog.actions]]
            name = "THROTTLE_UP"
            params = { level = [0.0, 1.0] }
            "#,
        );

        let config = ServiceConfig::load_from(
            dir.path().to_str().unwrap(),
            Some(custom.to_str().unwrap()),
        )
        .unwrap();

        assert_eq!(config.pipeline.time_budget_ms, 50);
        assert_eq!(config.pipeline.topk, 1);
        assert_eq!(config.pipeline.window, 4);
        assert_eq!(config.catalog.len(), 1);
        assert_eq!(config.catalog.get("THROTTLE_UP").unwrap().bounds("level").unwrap().max, 1.0);
        assert!(!config.catalog.contains("HOLD_POSITION"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");

        let result = ServiceConfig::load_from(dir.path().to_str().unwrap(), Some(missing.to_str().unwrap()));

        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        let mut config = ServiceConfig::default();
        config.logging.format = "xml".to_string();

        assert!(config.validate().is_err());
    }
}
