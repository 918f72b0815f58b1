use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use time::OffsetDateTime;

use super::{PendingState, PendingStore, StoreError};

/// [`PendingStore`] backed by a single pretty-printed JSON file.
///
/// Saves go to a sibling temp file which is synced and renamed over the
/// target. A snapshot that fails to parse is moved aside to
/// `<file>.corrupt-<unix-seconds>` and treated as empty. A snapshot that
/// cannot be read is left in place and reported as an error.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Open a store at `path`, creating its parent directory if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn quarantine(&self) {
        let stamp = OffsetDateTime::now_utc().unix_timestamp();
        let mut target = self.path.clone().into_os_string();
        target.push(format!(".corrupt-{stamp}"));
        match fs::rename(&self.path, &target) {
            Ok(()) => tracing::warn!(
                path = %self.path.display(),
                moved_to = %PathBuf::from(&target).display(),
                "moved unreadable state file aside"
            ),
            Err(e) => tracing::error!(
                path = %self.path.display(),
                error = %e,
                "failed to move unreadable state file aside"
            ),
        }
    }
}

#[async_trait]
impl PendingStore for JsonFileStore {
    async fn try_load(&self) -> Result<PendingState, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(PendingState::default()),
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "failed to read state file");
                return Err(e.into());
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(state) => Ok(state),
            Err(e) => {
                // Once moved aside the empty default is safe to save over.
                tracing::error!(path = %self.path.display(), error = %e, "state file is corrupt");
                self.quarantine();
                Ok(PendingState::default())
            }
        }
    }

    async fn save(&self, state: &PendingState) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(state)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &content)).await??;
        Ok(())
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => dir.to_path_buf(),
        None => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    let tmp_path = dir.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

    let result = (|| -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;

        if let Ok(parent) = fs::File::open(&dir) {
            let _ = parent.sync_all();
        }
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
