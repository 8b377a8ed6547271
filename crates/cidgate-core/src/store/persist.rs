// ── Versioned state documents ──
//
// Every persisted document is wrapped in `{namespace, version, saved_at,
// data}`. A reader that finds a different namespace or version drops the
// document instead of guessing at its shape.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CoreError;

/// Suffix counter so concurrent writers never share a temp file.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    namespace: &'a str,
    version: u32,
    saved_at: DateTime<Utc>,
    data: &'a T,
}

#[derive(Deserialize)]
struct Header {
    namespace: String,
    version: u32,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// One namespaced, versioned JSON document on disk.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
    namespace: &'static str,
    version: u32,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>, namespace: &'static str, version: u32) -> Self {
        Self {
            path: path.into(),
            namespace,
            version,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `data` atomically: a uniquely named sibling temp file is
    /// written and then renamed over the target.
    pub async fn save<T: Serialize>(&self, data: &T) -> Result<(), CoreError> {
        let envelope = EnvelopeRef {
            namespace: self.namespace,
            version: self.version,
            saved_at: Utc::now(),
            data,
        };
        let json = serde_json::to_vec_pretty(&envelope).map_err(|e| self.error(e))?;

        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| self.error(e))?;
        }
        let tmp = self.tmp_path();
        if let Err(e) = tokio::fs::write(&tmp, &json).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(self.error(e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(self.error(e));
        }

        debug!(path = %self.path.display(), bytes = json.len(), "state saved");
        Ok(())
    }

    /// Read the document. Missing, foreign, outdated, or corrupt files
    /// all yield `Ok(None)`; only I/O failures on an existing file error.
    pub async fn load<T: DeserializeOwned>(&self) -> Result<Option<T>, CoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.error(e)),
        };

        let header: Header = match serde_json::from_slice(&bytes) {
            Ok(h) => h,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "discarding unreadable state file");
                return Ok(None);
            }
        };
        if header.namespace != self.namespace || header.version != self.version {
            warn!(
                path = %self.path.display(),
                found_namespace = %header.namespace,
                found_version = header.version,
                expected_version = self.version,
                "discarding state file with mismatched format"
            );
            return Ok(None);
        }

        match serde_json::from_slice::<Envelope<T>>(&bytes) {
            Ok(env) => Ok(Some(env.data)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "discarding malformed state file");
                Ok(None)
            }
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(format!(".{}.{seq}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }

    fn error(&self, err: impl std::fmt::Display) -> CoreError {
        CoreError::Persistence {
            what: self.path.display().to_string(),
            message: err.to_string(),
        }
    }
}
