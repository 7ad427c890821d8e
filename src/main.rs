use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use helm_exporter::collector::HelmCollector;
use helm_exporter::config::ExporterConfig;
use helm_exporter::helm::{HelmCli, ReleaseLister};
use helm_exporter::scheduler::Scheduler;
use helm_exporter::server::MetricsServer;

#[derive(Parser, Debug)]
#[command(name = "helm-exporter", about = "Prometheus exporter for Helm release state")]
struct Cli {
    /// Port to serve metrics on
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Scrape interval in seconds
    #[arg(long, default_value_t = 60)]
    interval: u64,

    /// Log level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    log_level: String,

    /// Helm binary to invoke
    #[arg(long, default_value = "helm")]
    helm_bin: String,
}

#[tokio::main(worker_threads = 2)]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ExporterConfig {
        port: cli.port,
        interval_secs: cli.interval,
        log_level: cli.log_level,
        helm_bin: cli.helm_bin,
    };
    config.validate()?;

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        interval_secs = config.interval_secs,
        "Starting helm-exporter"
    );

    if let Err(e) = run(config).await {
        error!(error = %e, "Exporter terminated with error");
        return Err(e);
    }

    Ok(())
}

fn init_logging(config: &ExporterConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

async fn run(config: ExporterConfig) -> Result<()> {
    let collector = Arc::new(HelmCollector::new()?);
    let lister: Arc<dyn ReleaseLister> = Arc::new(HelmCli::new(&config.helm_bin));

    // Bind before spawning anything so a taken port fails fast.
    let server = MetricsServer::bind(config.port).await?;

    let scheduler = Scheduler::new(Duration::from_secs(config.interval_secs));
    tokio::spawn(scheduler.run(collector.clone(), lister));

    tokio::select! {
        result = server.run(collector) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, exiting");
            Ok(())
        }
    }
}
