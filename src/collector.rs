//! The OpenTelemetry collector that `otelup` installs and runs: where it is
//! released, how its assets are named, and the config it is started with.

use crate::config::{COLLECTOR_EXECUTABLE, COLLECTOR_REPO};
use crate::install::BinarySpec;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const METRIC_PREFIX: &str = "custom.googleapis.com/gemini_cli";
pub const LOG_NAME: &str = "gemini_cli";

pub fn binary_spec() -> BinarySpec {
    BinarySpec::new(
        COLLECTOR_EXECUTABLE,
        COLLECTOR_REPO,
        |version: &str, os: &str, arch: &str, ext: &str| {
            format!("{}_{}_{}_{}.{}", COLLECTOR_EXECUTABLE, version, os, arch, ext)
        },
    )
    .with_binary_name_in_archive(COLLECTOR_EXECUTABLE)
}

pub fn launch_args(config_file: &Path) -> Vec<String> {
    vec![
        "--config".to_string(),
        config_file.to_string_lossy().to_string(),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectorConfig {
    pub receivers: Receivers,
    pub processors: Processors,
    pub exporters: Exporters,
    pub service: Service,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receivers {
    pub otlp: OtlpReceiver,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OtlpReceiver {
    pub protocols: OtlpProtocols,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OtlpProtocols {
    pub grpc: Endpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Endpoint {
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Processors {
    pub batch: BatchProcessor,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchProcessor {
    pub timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Exporters {
    pub googlecloud: GoogleCloudExporter,
    pub debug: DebugExporter,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GoogleCloudExporter {
    pub project: String,
    pub metric: MetricSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricSettings {
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogSettings {
    pub default_log_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DebugExporter {
    pub verbosity: String,
    pub sampling_initial: u32,
    pub sampling_thereafter: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Service {
    pub telemetry: ServiceTelemetry,
    pub pipelines: Pipelines,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceTelemetry {
    pub logs: Level,
    pub metrics: Level,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Level {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pipelines {
    pub traces: Pipeline,
    pub metrics: Pipeline,
    pub logs: Pipeline,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pipeline {
    pub receivers: Vec<String>,
    pub processors: Vec<String>,
    pub exporters: Vec<String>,
}

impl Pipeline {
    fn otlp_to_google_cloud() -> Self {
        Pipeline {
            receivers: vec!["otlp".to_string()],
            processors: vec!["batch".to_string()],
            exporters: vec!["googlecloud".to_string(), "debug".to_string()],
        }
    }
}

impl CollectorConfig {
    /// Collector config exporting OTLP traffic received on `localhost:port`
    /// to Google Cloud project `project_id`.
    pub fn google_cloud(project_id: &str, port: u16) -> Self {
        CollectorConfig {
            receivers: Receivers {
                otlp: OtlpReceiver {
                    protocols: OtlpProtocols {
                        grpc: Endpoint {
                            endpoint: format!("localhost:{}", port),
                        },
                    },
                },
            },
            processors: Processors {
                batch: BatchProcessor {
                    timeout: "1s".to_string(),
                },
            },
            exporters: Exporters {
                googlecloud: GoogleCloudExporter {
                    project: project_id.to_string(),
                    metric: MetricSettings {
                        prefix: METRIC_PREFIX.to_string(),
                    },
                    log: LogSettings {
                        default_log_name: LOG_NAME.to_string(),
                    },
                },
                debug: DebugExporter {
                    verbosity: "detailed".to_string(),
                    sampling_initial: 2,
                    sampling_thereafter: 500,
                },
            },
            service: Service {
                telemetry: ServiceTelemetry {
                    logs: Level {
                        level: "debug".to_string(),
                    },
                    metrics: Level {
                        level: "none".to_string(),
                    },
                },
                pipelines: Pipelines {
                    traces: Pipeline::otlp_to_google_cloud(),
                    metrics: Pipeline::otlp_to_google_cloud(),
                    logs: Pipeline::otlp_to_google_cloud(),
                },
            },
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)
            .with_context(|| format!("Could not write collector config to {}", path.display()))?;
        Ok(())
    }
}

/// Console links for the telemetry exported to `project_id`.
pub fn console_links(project_id: &str) -> [(&'static str, String); 3] {
    [
        (
            "Logs",
            format!(
                "https://console.cloud.google.com/logs/query;query=logName%3D%22projects%2F{0}%2Flogs%2F{1}%22?project={0}",
                project_id, LOG_NAME
            ),
        ),
        (
            "Metrics",
            format!(
                "https://console.cloud.google.com/monitoring/metrics-explorer?project={}",
                project_id
            ),
        ),
        (
            "Traces",
            format!(
                "https://console.cloud.google.com/traces/list?project={}",
                project_id
            ),
        ),
    ]
}
