use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::core::params::RestoreParams;
use crate::core::processing::pipeline::{ChannelReport, Diagnostic, Restoration};

/// Everything recorded about one restoration in the JSON sidecar.
/// Non-finite losses serialize as `null`.
#[derive(Debug, Clone, Serialize)]
pub struct RestorationMetadata<'a> {
    pub software: &'static str,
    pub version: &'static str,
    /// UTC creation time, RFC 3339
    pub created: String,
    pub input: Option<String>,
    pub depth: Option<String>,
    pub width: usize,
    pub height: usize,
    pub params: &'a RestoreParams,
    pub neighborhood_count: usize,
    pub channels: &'a [ChannelReport; 3],
    pub diagnostics: &'a [Diagnostic],
}

impl<'a> RestorationMetadata<'a> {
    pub fn new(
        restoration: &'a Restoration,
        params: &'a RestoreParams,
        input: Option<&Path>,
        depth: Option<&Path>,
    ) -> Self {
        let (height, width, _) = restoration.image.dim();
        Self {
            software: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            created: chrono::Utc::now().to_rfc3339(),
            input: input.map(|p| p.display().to_string()),
            depth: depth.map(|p| p.display().to_string()),
            width,
            height,
            params,
            neighborhood_count: restoration.neighborhood_count,
            channels: &restoration.channels,
            diagnostics: &restoration.diagnostics,
        }
    }
}

/// Path of the sidecar that accompanies `output_path`.
pub fn sidecar_path(output_path: &Path) -> PathBuf {
    output_path.with_extension("json")
}

/// Write `metadata` as pretty JSON next to `output_path` and return the
/// sidecar's path.
pub fn create_metadata_sidecar(
    output_path: &Path,
    metadata: &RestorationMetadata<'_>,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let path = sidecar_path(output_path);
    let json_string = serde_json::to_string_pretty(metadata)?;
    std::fs::write(&path, json_string)?;
    info!("Wrote metadata sidecar {}", path.display());
    Ok(path)
}
