use std::path::{Path, PathBuf};

use crate::config::ResultFormat;

use super::{PrometheusTarget, TargetMap};

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("failed writing targets: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed encoding targets as json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed encoding targets as yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub fn encode(targets: &TargetMap, format: ResultFormat) -> Result<Vec<u8>, WriteError> {
    let document: Vec<&PrometheusTarget> = targets.values().collect();
    match format {
        ResultFormat::Json => Ok(serde_json::to_vec_pretty(&document)?),
        ResultFormat::Yaml => Ok(serde_yaml::to_string(&document)?.into_bytes()),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replaces the file at `path` with the encoded targets. The document is
/// written next to it first and renamed into place.
pub async fn write(path: &Path, format: ResultFormat, targets: &TargetMap) -> Result<(), WriteError> {
    let data = encode(targets, format)?;
    let tmp = temp_path(path);

    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
