//! Overlay discovery.
//!
//! Overlays are `*.safetensors` files in a directory; the file stem is the
//! name jobs refer to them by.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File extension recognised as an overlay weight file.
pub const OVERLAY_EXTENSION: &str = "safetensors";

/// Scan `dir` for overlay files. A missing directory yields an empty set.
pub async fn discover_overlays(dir: &Path) -> std::io::Result<BTreeMap<String, PathBuf>> {
    let mut overlays = BTreeMap::new();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(overlays),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(OVERLAY_EXTENSION) {
            continue;
        }
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            overlays.insert(stem.to_string(), path.clone());
        }
    }

    Ok(overlays)
}
