use clap::Parser;
use sitemap_screenshot::{
    load_config_file, setup_logging, validate_config, validate_sitemap_arg, Cli, CliRunner,
    Config,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse CLI arguments
    let args = Cli::parse();

    // Setup logging
    if let Err(e) = setup_logging(args.verbose) {
        eprintln!("Failed to initialise logging: {e}");
    }

    info!("Starting sitemap-screenshot v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Some(addr) = args.metrics_addr {
        if let Err(e) = sitemap_screenshot::metrics::install_prometheus_exporter(addr) {
            warn!("Metrics exporter not started: {}", e);
        }
    }

    let runner = CliRunner::new(config);
    match runner.run(&args.sitemap).await {
        Ok(result) => {
            if result.failed > 0 {
                warn!(
                    "{} of {} screenshots failed",
                    result.failed, result.total_tasks
                );
            }
            info!(
                "Done: {} screenshots saved, {} failed",
                result.succeeded(),
                result.failed
            );
        }
        Err(e) if e.is_resolution_error() => {
            error!("Could not resolve sitemap {}: {}", args.sitemap, e);
            std::process::exit(1);
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn load_config(args: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    validate_sitemap_arg(&args.sitemap)?;

    let mut config = if let Some(config_path) = &args.config {
        load_config_file(config_path)?
    } else {
        Config::default()
    };

    // Override with CLI arguments
    args.apply_to(&mut config);

    validate_config(&config)?;

    info!("Output directory: {}", config.output_dir.display());
    info!("Concurrency: {}", config.concurrency);
    info!("Settle delay: {:?}", config.settle_delay);
    info!(
        "Devices: {}",
        config
            .devices
            .iter()
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(config)
}
