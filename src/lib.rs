//! # Sitemap Screenshot
//!
//! Turns a sitemap URL into a directory tree of full-page screenshots, one per
//! (page, device profile) pair, captured with headless Chrome.
//!
//! ## Pipeline
//!
//! | Stage | Module | Output |
//! |-------|--------|--------|
//! | Sitemap resolution | [`sitemap`] | Ordered page URLs, indexes followed recursively |
//! | Task building | [`task`] | One [`CaptureTask`] per page and device, output path fixed |
//! | Scheduling | [`scheduler`] | Captures with at most N in flight, one file per success |
//! | Aggregation | [`progress`] | [`RunResult`] with completed and failed counts |
//!
//! A broken child sitemap is skipped; a broken root sitemap aborts the run.
//! A failed capture only fails its own task and the run carries on.
//!
//! ## Output layout
//!
//! ```text
//! <output>/<YYYYMMDD_HHMMSS>/<device>/<escaped url>.png
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sitemap_screenshot::{CliRunner, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = CliRunner::new(Config::default());
//!     let result = runner.run("https://example.com/sitemap.xml").await?;
//!     println!("{} of {} screenshots failed", result.failed, result.total_tasks);
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! sitemap-screenshot --sitemap https://example.com/sitemap.xml --concurrency 5
//! ```

/// Configuration, device profiles and Chrome launch settings
pub mod config;

/// Error types
pub mod error;

/// Sitemap fetching and recursive resolution
pub mod sitemap;

/// Expansion of pages and devices into capture tasks
pub mod task;

/// Browser automation backend
pub mod capture;

/// Bounded-concurrency execution of capture tasks
pub mod scheduler;

/// Run counters and progress notifications
pub mod progress;

/// Command-line interface implementation
pub mod cli;

/// Prometheus metrics for sitemap fetches and captures
pub mod metrics;

/// Utility functions and helpers
pub mod utils;


pub use capture::*;
pub use cli::*;
pub use config::*;
pub use error::*;
pub use progress::*;
pub use scheduler::*;
pub use sitemap::*;
pub use task::*;
pub use utils::*;
