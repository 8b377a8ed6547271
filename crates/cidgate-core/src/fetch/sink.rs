// ── Download sinks ──
//
// Where transferred bytes go. A fallback to the next gateway resets the
// sink so a half-written body from a failed gateway never leaks into the
// result.

use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::error::CoreError;

pub(crate) enum Sink {
    Memory(BytesMut),
    File {
        file: File,
        part: PathBuf,
        dest: PathBuf,
    },
}

impl Sink {
    pub(crate) fn memory() -> Self {
        Self::Memory(BytesMut::new())
    }

    /// Open `<dest>.part` for writing; the final name appears only on
    /// [`finish_file`](Self::finish_file).
    pub(crate) async fn file(dest: &Path) -> Result<Self, CoreError> {
        let part = part_path(dest);
        if let Some(dir) = dest.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| io_error(&part, &e))?;
        }
        let file = File::create(&part).await.map_err(|e| io_error(&part, &e))?;
        Ok(Self::File {
            file,
            part,
            dest: dest.to_path_buf(),
        })
    }

    pub(crate) async fn write(&mut self, chunk: &[u8]) -> Result<(), CoreError> {
        match self {
            Self::Memory(buf) => {
                buf.extend_from_slice(chunk);
                Ok(())
            }
            Self::File { file, part, .. } => {
                file.write_all(chunk).await.map_err(|e| io_error(part, &e))
            }
        }
    }

    /// Discard everything written so far.
    pub(crate) async fn reset(&mut self) -> Result<(), CoreError> {
        match self {
            Self::Memory(buf) => {
                buf.clear();
                Ok(())
            }
            Self::File { file, part, .. } => {
                file.set_len(0).await.map_err(|e| io_error(part, &e))?;
                file.rewind().await.map_err(|e| io_error(part, &e))?;
                Ok(())
            }
        }
    }

    pub(crate) fn into_bytes(self) -> Bytes {
        match self {
            Self::Memory(buf) => buf.freeze(),
            Self::File { .. } => Bytes::new(),
        }
    }

    /// Flush and move the part file to its final name.
    pub(crate) async fn finish_file(self) -> Result<Option<PathBuf>, CoreError> {
        match self {
            Self::Memory(_) => Ok(None),
            Self::File {
                mut file,
                part,
                dest,
            } => {
                file.flush().await.map_err(|e| io_error(&part, &e))?;
                file.sync_all().await.map_err(|e| io_error(&part, &e))?;
                drop(file);
                tokio::fs::rename(&part, &dest)
                    .await
                    .map_err(|e| io_error(&dest, &e))?;
                Ok(Some(dest))
            }
        }
    }

    /// Remove the part file after a failed or cancelled fetch.
    pub(crate) async fn discard(self) {
        if let Self::File { file, part, .. } = self {
            drop(file);
            let _ = tokio::fs::remove_file(&part).await;
        }
    }
}

pub(crate) fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn io_error(path: &Path, err: &std::io::Error) -> CoreError {
    CoreError::Persistence {
        what: path.display().to_string(),
        message: err.to_string(),
    }
}
