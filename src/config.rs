//! Configuration management with serde serialization/deserialization
//!
//! This module provides the run configuration, the built-in device profiles and
//! the Chrome launch arguments used by the capture backend.

use crate::ScreenshotError;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Per-task end-to-end budget used when nothing else is configured.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(120);

/// Offset of the zone the run stamp is rendered in (JST).
const RUN_STAMP_OFFSET_SECS: i32 = 9 * 60 * 60;

/// Main configuration structure for a capture run
///
/// Built from defaults, optionally replaced by a JSON file, then overridden by
/// command-line flags and validated with [`validate_config`].
///
/// # Examples
///
/// ```rust
/// use sitemap_screenshot::Config;
///
/// let config = Config {
///     concurrency: 5,
///     ..Default::default()
/// };
/// assert_eq!(config.devices.len(), 3);
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Base directory screenshots are written under (default: `screenshots`)
    pub output_dir: PathBuf,

    /// Delay between navigation and capture (default: 5 seconds)
    ///
    /// Gives client-side rendering and late network requests time to settle.
    pub settle_delay: Duration,

    /// Maximum number of captures in flight at once (default: 3)
    pub concurrency: usize,

    /// End-to-end budget for a single capture task (default: 2 minutes)
    ///
    /// Covers the browser call and the file write. Exceeding it fails that
    /// task only.
    pub task_timeout: Duration,

    /// Device profiles every page is captured with, in output order
    pub devices: Vec<DeviceProfile>,

    /// Nest a run timestamp directory between the output dir and device dirs
    /// (default: true)
    pub timestamp_dir: bool,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("screenshots"),
            settle_delay: Duration::from_secs(5),
            concurrency: 3,
            task_timeout: DEFAULT_TASK_TIMEOUT,
            devices: default_devices(),
            timestamp_dir: true,
            chrome_path: None,
        }
    }
}

impl Config {
    /// Directory device folders are created in for a run started with `stamp`.
    pub fn output_root(&self, stamp: &str) -> PathBuf {
        if self.timestamp_dir {
            self.output_dir.join(stamp)
        } else {
            self.output_dir.clone()
        }
    }
}

/// A device the page is rendered as
///
/// Forwarded as-is to the capture backend. `name` doubles as the directory
/// the device's screenshots land in.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceProfile {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub mobile: bool,
    pub user_agent: String,
}

impl DeviceProfile {
    pub fn new(name: &str, width: u32, height: u32, mobile: bool, user_agent: &str) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            mobile,
            user_agent: user_agent.to_string(),
        }
    }

    /// Checks the profile can be handed to the browser and used as a path segment.
    pub fn validate(&self) -> Result<(), ScreenshotError> {
        if self.name.is_empty()
            || self.name == "."
            || self.name == ".."
            || self.name.contains(['/', '\\'])
        {
            return Err(ScreenshotError::Configuration(format!(
                "device name {:?} is not usable as a directory name",
                self.name
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ScreenshotError::Configuration(format!(
                "device {} must have a positive viewport, got {}x{}",
                self.name, self.width, self.height
            )));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ScreenshotError::Configuration(format!(
                "device {} has an empty user agent",
                self.name
            )));
        }
        Ok(())
    }
}

/// The built-in desktop, tablet and smartphone profiles.
pub fn default_devices() -> Vec<DeviceProfile> {
    vec![
        DeviceProfile::new(
            "desktop",
            1920,
            1080,
            false,
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0.0.0 Safari/537.36",
        ),
        DeviceProfile::new(
            "tablet",
            1024,
            768,
            true,
            "Mozilla/5.0 (iPad; CPU OS 15_0 like Mac OS X) AppleWebKit/605.1.15",
        ),
        DeviceProfile::new(
            "smartphone",
            375,
            667,
            true,
            "Mozilla/5.0 (iPhone; CPU iPhone OS 15_0 like Mac OS X) AppleWebKit/605.1.15",
        ),
    ]
}

/// Rejects configurations the scheduler and capture backend cannot run with.
pub fn validate_config(config: &Config) -> Result<(), ScreenshotError> {
    if config.concurrency == 0 {
        return Err(ScreenshotError::Configuration(
            "concurrency must be greater than 0".to_string(),
        ));
    }

    if config.task_timeout.is_zero() {
        return Err(ScreenshotError::Configuration(
            "task timeout must be greater than 0".to_string(),
        ));
    }

    if config.devices.is_empty() {
        return Err(ScreenshotError::Configuration(
            "at least one device profile is required".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for device in &config.devices {
        device.validate()?;
        if !names.insert(device.name.as_str()) {
            return Err(ScreenshotError::Configuration(format!(
                "duplicate device name: {}",
                device.name
            )));
        }
    }

    Ok(())
}

/// Loads a JSON configuration file. Missing fields fall back to defaults.
pub fn load_config_file(path: &Path) -> Result<Config, ScreenshotError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Formats the run start time as `YYYYMMDD_HHMMSS` in JST.
pub fn run_stamp(now: DateTime<Utc>) -> String {
    const FORMAT: &str = "%Y%m%d_%H%M%S";
    match FixedOffset::east_opt(RUN_STAMP_OFFSET_SECS) {
        Some(offset) => now.with_timezone(&offset).format(FORMAT).to_string(),
        None => now.format(FORMAT).to_string(),
    }
}

/// Chrome user data directory for one launch, removed again on shutdown.
pub fn chrome_profile_dir(launch_id: &str) -> PathBuf {
    std::env::temp_dir().join(format!("sitemap-screenshot-{launch_id}"))
}

/// Generate Chrome command-line arguments for headless capture
///
/// The user data directory is unique per launch so concurrent runs on the same
/// host do not trip over Chrome's profile singleton lock.
pub fn get_chrome_args(launch_id: &str) -> Vec<String> {
    vec![
        "--headless".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-features=TranslateUI".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--hide-scrollbars".to_string(),
        format!("--user-data-dir={}", chrome_profile_dir(launch_id).display()),
    ]
}

/// Unique id for one browser launch: process id plus a random suffix.
pub fn new_launch_id() -> String {
    format!("{}-{}", std::process::id(), uuid::Uuid::new_v4())
}

pub fn create_browser_config(
    config: &Config,
    launch_id: &str,
) -> Result<chromiumoxide::browser::BrowserConfig, ScreenshotError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .request_timeout(config.task_timeout)
        .args(get_chrome_args(launch_id));

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(ScreenshotError::BrowserLaunch)
}
