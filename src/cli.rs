use crate::{
    build_tasks, run_stamp, validate_url, CaptureScheduler, CaptureTask, Capturer,
    ChromeCapturer, Config, DeviceProfile, RunResult, ScreenshotError, SitemapResolver,
};
use chrono::Utc;
use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "sitemap-screenshot")]
#[command(about = "Capture every page listed in a sitemap on several device profiles")]
#[command(version)]
pub struct Cli {
    #[arg(long, help = "URL of the sitemap or sitemap index")]
    pub sitemap: String,

    #[arg(long, help = "Output directory [default: screenshots]")]
    pub output: Option<PathBuf>,

    #[arg(long, help = "Seconds to wait after page load before capturing [default: 5]")]
    pub wait: Option<u64>,

    #[arg(long, help = "Number of screenshots taken concurrently [default: 3]")]
    pub concurrency: Option<usize>,

    #[arg(long, help = "Per-screenshot timeout in seconds [default: 120]")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, help = "Configuration file path (JSON)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Chrome executable path")]
    pub chrome_path: Option<String>,

    #[arg(long, help = "Write device directories directly under the output directory")]
    pub no_timestamp_dir: bool,

    #[arg(long, help = "Serve Prometheus metrics on this address during the run")]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Overrides configuration values with the flags given on the command line.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(wait) = self.wait {
            config.settle_delay = Duration::from_secs(wait);
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(timeout) = self.timeout {
            config.task_timeout = Duration::from_secs(timeout);
        }
        if let Some(chrome_path) = &self.chrome_path {
            config.chrome_path = Some(chrome_path.clone());
        }
        if self.no_timestamp_dir {
            config.timestamp_dir = false;
        }
    }
}

/// Rejects an empty or non-HTTP sitemap URL before any work starts.
pub fn validate_sitemap_arg(sitemap: &str) -> Result<(), ScreenshotError> {
    if sitemap.trim().is_empty() {
        return Err(ScreenshotError::Configuration(
            "a sitemap URL is required (--sitemap)".to_string(),
        ));
    }
    validate_url(sitemap)
        .map(|_| ())
        .map_err(|e| ScreenshotError::Configuration(format!("invalid sitemap URL {sitemap}: {e}")))
}

pub struct CliRunner {
    pub config: Config,
}

impl CliRunner {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Resolves the sitemap, captures every (page, device) pair and reports.
    ///
    /// Only setup failures are returned: root sitemap resolution and browser
    /// launch. Individual capture failures are counted in the result.
    pub async fn run(&self, sitemap_url: &str) -> Result<RunResult, ScreenshotError> {
        let output_root = self.config.output_root(&run_stamp(Utc::now()));
        let tasks = self.resolve_tasks(sitemap_url, &output_root).await?;

        if tasks.is_empty() {
            warn!("Sitemap {} lists no pages, nothing to capture", sitemap_url);
            return Ok(RunResult::default());
        }

        let capturer = Arc::new(ChromeCapturer::launch(&self.config).await?);
        let result = self.capture(tasks, capturer.clone()).await;
        capturer.shutdown().await;

        info!("Output directory: {}", output_root.display());
        Ok(result)
    }

    /// Resolves `sitemap_url` and expands the pages against the configured devices.
    pub async fn resolve_tasks(
        &self,
        sitemap_url: &str,
        output_root: &Path,
    ) -> Result<Vec<CaptureTask>, ScreenshotError> {
        info!("Resolving sitemap {}", sitemap_url);
        let client = reqwest::Client::builder()
            .user_agent(concat!("sitemap-screenshot/", env!("CARGO_PKG_VERSION")))
            .timeout(self.config.task_timeout)
            .build()
            .map_err(|e| ScreenshotError::Configuration(format!("HTTP client: {e}")))?;
        let urls = SitemapResolver::with_client(client)
            .resolve(sitemap_url)
            .await?;

        let devices: Vec<Arc<DeviceProfile>> =
            self.config.devices.iter().cloned().map(Arc::new).collect();
        let tasks = build_tasks(&urls, &devices, output_root);

        info!(
            "{} pages x {} devices = {} screenshots",
            urls.len(),
            devices.len(),
            tasks.len()
        );
        Ok(tasks)
    }

    /// Runs `tasks` through `capturer` with the configured limits.
    pub async fn capture(&self, tasks: Vec<CaptureTask>, capturer: Arc<dyn Capturer>) -> RunResult {
        CaptureScheduler::new(capturer, self.config.settle_delay)
            .with_task_timeout(self.config.task_timeout)
            .run(tasks, self.config.concurrency)
            .await
    }
}

pub fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let builder = tracing_subscriber::fmt().with_target(false);

    if verbose {
        builder.with_max_level(tracing::Level::DEBUG).try_init()
    } else {
        builder
            .with_max_level(tracing::Level::INFO)
            .without_time()
            .try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_leave_config_untouched() {
        let args = Cli::parse_from(["sitemap-screenshot", "--sitemap", "https://a/sitemap.xml"]);
        let mut config = Config {
            concurrency: 9,
            ..Default::default()
        };
        args.apply_to(&mut config);

        assert_eq!(config.concurrency, 9);
        assert_eq!(config.settle_delay, Duration::from_secs(5));
        assert_eq!(config.output_dir, PathBuf::from("screenshots"));
        assert!(config.timestamp_dir);
        assert!(!args.verbose);
    }

    #[test]
    fn test_flags_override_config() {
        let args = Cli::parse_from([
            "sitemap-screenshot",
            "--sitemap",
            "https://a/sitemap.xml",
            "--output",
            "out",
            "--wait",
            "1",
            "--concurrency",
            "8",
            "--timeout",
            "30",
            "--no-timestamp-dir",
            "--verbose",
        ]);
        let mut config = Config::default();
        args.apply_to(&mut config);

        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.settle_delay, Duration::from_secs(1));
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.task_timeout, Duration::from_secs(30));
        assert!(!config.timestamp_dir);
        assert!(args.verbose);
    }

    #[test]
    fn test_sitemap_flag_is_required() {
        assert!(Cli::try_parse_from(["sitemap-screenshot"]).is_err());
    }

    #[test]
    fn test_validate_sitemap_arg() {
        assert!(validate_sitemap_arg("https://example.com/sitemap.xml").is_ok());
        assert!(matches!(
            validate_sitemap_arg(""),
            Err(ScreenshotError::Configuration(_))
        ));
        assert!(validate_sitemap_arg("   ").is_err());
        assert!(validate_sitemap_arg("example.com/sitemap.xml").is_err());
    }
}
