use otelup::config::DEFAULT_OTLP_PORT;
use otelup::readiness::DEFAULT_READY_TIMEOUT;
use clap::{Parser, Subcommand};

fn get_version() -> &'static str {
    const BASE_VERSION: &str = env!("CARGO_PKG_VERSION");

    // If there's a git tag at HEAD, use just the tag (release build)
    if let Some(tag) = option_env!("OTELUP_GIT_TAG") {
        return tag;
    }

    // Not on a tag - include commit hash and branch (dev build)
    let commit = option_env!("OTELUP_GIT_COMMIT").unwrap_or("unknown");
    let branch = option_env!("OTELUP_GIT_BRANCH").unwrap_or("unknown");

    // Leaked once at startup so clap can hold a &'static str
    let version = format!("v{}-{} ({})", BASE_VERSION, commit, branch);
    Box::leak(version.into_boxed_str())
}

#[derive(Parser)]
#[command(name = "otelup")]
#[command(about = "Provision and run a local OpenTelemetry collector for Google Cloud")]
#[command(version = get_version(), propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (use multiple times for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Reduce output to errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install the collector if needed, start it and wait until it listens
    #[command(
        after_help = "Requires OTLP_GOOGLE_CLOUD_PROJECT to be set.\n\nExamples:\n  otelup start\n  otelup start --port 4317 --timeout-ms 20000\n  otelup -v start --foreground"
    )]
    Start {
        /// Port the collector's OTLP gRPC receiver listens on
        #[arg(long, default_value_t = DEFAULT_OTLP_PORT)]
        port: u16,

        /// How long to wait for the collector to accept connections
        #[arg(long, default_value_t = DEFAULT_READY_TIMEOUT.as_millis() as u64)]
        timeout_ms: u64,

        /// Stay attached and stop the collector on Ctrl-C or SIGTERM
        #[arg(long)]
        foreground: bool,
    },

    /// Install the collector binary without starting it
    Install,

    /// Show where binaries, logs and config are kept for this directory
    Paths,

    /// Show the current version
    Version,
}
