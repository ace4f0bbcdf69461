//! Model artifact persistence (JSON on disk).

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::MlpRegressor;
use crate::result::AiError;

const FORMAT: &str = "meterflow.mlp";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    format: String,
    version: u32,
    saved_at: DateTime<Utc>,
    model: MlpRegressor,
}

/// Persist `model` at `path`, replacing any previous artifact.
///
/// Writes a sibling temp file and renames it, so readers never observe a
/// half-written artifact. Missing parent directories are created.
pub fn save(path: &Path, model: &MlpRegressor) -> Result<(), AiError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| AiError::Artifact(format!("create {}: {e}", parent.display())))?;
    }

    let envelope = Envelope {
        format: FORMAT.to_string(),
        version: FORMAT_VERSION,
        saved_at: Utc::now(),
        model: model.clone(),
    };
    let bytes = serde_json::to_vec(&envelope)
        .map_err(|e| AiError::Artifact(format!("serialize: {e}")))?;

    let tmp = temp_path(path);
    fs::write(&tmp, bytes).map_err(|e| AiError::Artifact(format!("write {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path)
        .map_err(|e| AiError::Artifact(format!("rename to {}: {e}", path.display())))?;
    Ok(())
}

/// Load the artifact at `path`; `Ok(None)` when there is none.
pub fn load(path: &Path) -> Result<Option<MlpRegressor>, AiError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(AiError::Artifact(format!("read {}: {e}", path.display()))),
    };

    let envelope: Envelope = serde_json::from_slice(&bytes)
        .map_err(|e| AiError::Artifact(format!("parse {}: {e}", path.display())))?;
    if envelope.format != FORMAT || envelope.version != FORMAT_VERSION {
        return Err(AiError::Artifact(format!(
            "unsupported artifact {} v{}",
            envelope.format, envelope.version
        )));
    }
    Ok(Some(envelope.model))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
