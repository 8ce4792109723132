use crate::{escape_url_filename, DeviceProfile};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One (page, device) capture, fully resolved before scheduling starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTask {
    /// Position in build order; tasks are dispatched in this order.
    pub index: usize,
    pub target_url: String,
    pub device: Arc<DeviceProfile>,
    pub output_path: PathBuf,
}

/// Where the screenshot of `target_url` on `device` is written.
///
/// `<output_root>/<device name>/<escaped url>.png`
pub fn output_path_for(output_root: &Path, device: &DeviceProfile, target_url: &str) -> PathBuf {
    output_root
        .join(&device.name)
        .join(escape_url_filename(target_url))
}

/// Expands every URL against every device, URL-major.
///
/// Deterministic: the same inputs always give the same tasks in the same
/// order with the same output paths. Duplicate URLs produce duplicate tasks.
pub fn build_tasks(
    urls: &[String],
    devices: &[Arc<DeviceProfile>],
    output_root: &Path,
) -> Vec<CaptureTask> {
    let mut tasks = Vec::with_capacity(urls.len() * devices.len());

    for url in urls {
        for device in devices {
            tasks.push(CaptureTask {
                index: tasks.len(),
                target_url: url.clone(),
                device: Arc::clone(device),
                output_path: output_path_for(output_root, device, url),
            });
        }
    }

    tasks
}
