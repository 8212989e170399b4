mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use console::style;
use otelup::cache::BinaryCache;
use otelup::cleanup::{register_cleanup, ProcessRegistry};
use otelup::collector::{self, CollectorConfig};
use otelup::config::{required_project_id, StatePaths};
use otelup::platform::PlatformTarget;
use otelup::readiness::wait_for_port;
use otelup::release::GitHubReleases;
use otelup::supervisor;
use std::sync::Arc;
use std::time::Duration;

struct StartOptions {
    port: u16,
    timeout: Duration,
    foreground: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli)?;

    match cli.command {
        Commands::Version => {
            println!("otelup v{}", env!("CARGO_PKG_VERSION"));
        }

        Commands::Paths => {
            let paths = StatePaths::resolve()?;
            println!("--- otelup state for this directory ---");
            println!("  root:   {}", paths.root.display());
            println!("  bin:    {}", paths.bin_dir.display());
            println!("  log:    {}", paths.log_file.display());
            println!("  config: {}", paths.config_file.display());
        }

        Commands::Install => {
            let paths = StatePaths::resolve()?;
            paths.ensure_dirs()?;
            let cache = BinaryCache::new(&paths.root);
            match cache
                .ensure_binary(
                    &GitHubReleases::new(),
                    &collector::binary_spec(),
                    &PlatformTarget::current(),
                )
                .await
            {
                Ok(path) => println!("{}", path.display()),
                Err(e) => {
                    eprintln!("{} Error getting collector: {}", style("✗").red(), e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Start {
            port,
            timeout_ms,
            foreground,
        } => {
            let options = StartOptions {
                port,
                timeout: Duration::from_millis(timeout_ms),
                foreground,
            };
            let code = match start(&options).await {
                Ok(code) => code,
                Err(e) => {
                    eprintln!("{} {:#}", style("Error:").red().bold(), e);
                    1
                }
            };
            std::process::exit(code);
        }
    }

    Ok(())
}

fn setup_logging(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if cli.quiet {
        "error"
    } else if cli.verbose == 0 {
        "info"
    } else if cli.verbose == 1 {
        "debug"
    } else {
        "trace"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Returns the process exit code. Cleanup state is dropped before returning,
/// so anything still tracked is torn down first.
async fn start(options: &StartOptions) -> Result<i32> {
    println!("Starting OpenTelemetry Collector for Google Cloud");

    // Checked before anything touches the filesystem.
    let project_id = match required_project_id() {
        Ok(project_id) => project_id,
        Err(e) => {
            eprintln!("{} {}.", style("Error:").red().bold(), e);
            return Ok(1);
        }
    };
    println!("{} Using Google Cloud Project: {}", style("✓").green(), project_id);
    print_settings_hint();

    let paths = StatePaths::resolve()?;
    paths.ensure_dirs()?;

    let registry = Arc::new(ProcessRegistry::new());
    let guard = register_cleanup(Arc::clone(&registry));

    let cache = BinaryCache::new(&paths.root);
    let binary = match cache
        .ensure_binary(
            &GitHubReleases::new(),
            &collector::binary_spec(),
            &PlatformTarget::current(),
        )
        .await
    {
        Ok(path) => path,
        Err(e) => {
            eprintln!("{} Error getting collector: {}", style("Error:").red().bold(), e);
            return Ok(1);
        }
    };

    CollectorConfig::google_cloud(&project_id, options.port).write_to(&paths.config_file)?;
    println!("Wrote collector config to {}", paths.config_file.display());

    println!("Starting collector... Logs: {}", paths.log_file.display());
    let mut process = supervisor::launch(
        &binary,
        &collector::launch_args(&paths.config_file),
        &paths.log_file,
        &registry,
    )
    .context("Could not start the collector")?;

    println!("Waiting for collector to start (PID: {})...", process.pid);
    if let Err(e) = wait_for_port(options.port, options.timeout).await {
        eprintln!(
            "{} Collector failed to start on port {}.",
            style("Error:").red().bold(),
            options.port
        );
        eprintln!("{}", e);
        if let Some(status) = process.try_status() {
            eprintln!("Collector exited early: {}", status);
        }
        if let Err(e) = supervisor::force_kill(process.pid) {
            tracing::warn!("Could not kill collector (PID: {}): {}", process.pid, e);
        }
        if let Some(log) = supervisor::dump_log(&process.log_path) {
            eprintln!("Collector Log Output:");
            eprintln!("{}", log);
        }
        return Ok(1);
    }

    println!(
        "{} Collector started successfully on port {}.",
        style("✓").green(),
        options.port
    );
    println!("Collector logs: {}", paths.log_file.display());
    println!("\nAfter your CLI runs, view telemetry data at:");
    for (kind, link) in collector::console_links(&project_id) {
        println!("   {}: {}", kind, link);
    }

    if options.foreground {
        println!("\nCollector running in the foreground. Press Ctrl-C to stop it.");
        let mut child = process.into_child();
        // Signals are handled by the cleanup task, which exits the process.
        let status = tokio::task::spawn_blocking(move || child.wait())
            .await
            .context("Collector wait task failed")?
            .context("Could not wait for collector")?;
        eprintln!(
            "{} Collector exited on its own: {}",
            style("Error:").red().bold(),
            status
        );
        if let Some(log) = supervisor::dump_log(&paths.log_file) {
            eprintln!("Collector Log Output:");
            eprintln!("{}", log);
        }
        return Ok(1);
    }

    // Detached: leave the collector running after we exit.
    registry.release(process.pid);
    drop(guard);
    Ok(0)
}

fn print_settings_hint() {
    println!("\nTo enable telemetry, include these settings in your settings_json:");
    println!("{{");
    println!("  \"telemetry\": {{");
    println!("    \"enabled\": true,");
    println!("    \"target\": \"gcp\"");
    println!("  }},");
    println!("  \"sandbox\": false");
    println!("}}");
}
