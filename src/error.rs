use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ScreenshotError {
    #[error("Failed to fetch sitemap {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Failed to parse sitemap {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("Sitemap {0} was already resolved earlier in this run")]
    Revisited(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Screenshot capture failed: {0}")]
    Capture(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Browser launch failed: {0}")]
    BrowserLaunch(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ScreenshotError {
    /// True for errors raised while resolving sitemap documents.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            ScreenshotError::Fetch { .. }
                | ScreenshotError::Parse { .. }
                | ScreenshotError::Revisited(_)
        )
    }

    /// Short label used for log fields and metric dimensions.
    pub fn kind(&self) -> &'static str {
        match self {
            ScreenshotError::Fetch { .. } => "fetch",
            ScreenshotError::Parse { .. } => "parse",
            ScreenshotError::Revisited(_) => "revisited",
            ScreenshotError::Navigation(_) => "navigation",
            ScreenshotError::Capture(_) => "capture",
            ScreenshotError::Timeout(_) => "timeout",
            ScreenshotError::Io(_) => "io",
            ScreenshotError::BrowserLaunch(_) => "browser_launch",
            ScreenshotError::Configuration(_) => "configuration",
        }
    }
}

impl From<std::io::Error> for ScreenshotError {
    fn from(err: std::io::Error) -> Self {
        ScreenshotError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ScreenshotError {
    fn from(err: serde_json::Error) -> Self {
        ScreenshotError::Configuration(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for ScreenshotError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        ScreenshotError::Capture(err.to_string())
    }
}
