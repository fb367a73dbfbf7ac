//! Scratch copies of uploaded documents.
//!
//! An upload lives on disk only for the duration of one extraction and is
//! deleted on every exit path. A failed delete is logged and never replaces
//! the extraction's own outcome.

use std::future::Future;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{Result, WhisperError};

/// A private temporary directory holding one uploaded document under its
/// original file name.
pub struct ScratchDocument {
    dir: TempDir,
    path: PathBuf,
}

impl ScratchDocument {
    pub fn create(bytes: &[u8], file_name: &str) -> Result<Self> {
        if bytes.is_empty() {
            return Err(WhisperError::InvalidRequest("no file provided".into()));
        }

        // Only the final component; uploads don't get to pick directories.
        let name = Path::new(file_name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "upload".into());

        let dir = tempfile::Builder::new()
            .prefix("whisper-")
            .tempdir()
            .map_err(|e| WhisperError::InvalidRequest(format!("cannot create scratch dir: {}", e)))?;
        let path = dir.path().join(name);
        std::fs::write(&path, bytes)
            .map_err(|e| WhisperError::InvalidRequest(format!("cannot write scratch file: {}", e)))?;

        tracing::debug!(path = %path.display(), size = bytes.len(), "Scratch document written");
        Ok(Self { dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the document now. Failures are logged, not returned.
    pub fn release(self) {
        let dir = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            tracing::warn!(path = %dir.display(), error = %e, "Failed to remove scratch document");
        }
    }
}

/// Run `f` against a scratch copy of `bytes`, removing it afterwards.
///
/// The copy is removed whether `f` succeeds, fails or times out. If the
/// returned future is dropped mid-flight the copy goes with it.
pub async fn with_scratch_document<F, Fut, R>(bytes: &[u8], file_name: &str, f: F) -> Result<R>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let scratch = ScratchDocument::create(bytes, file_name)?;
    let outcome = f(scratch.path().to_path_buf()).await;
    scratch.release();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_file_name() {
        let scratch = ScratchDocument::create(b"%PDF-1.7", "../../etc/report.pdf").unwrap();
        assert_eq!(scratch.path().file_name().unwrap(), "report.pdf");
        assert_eq!(std::fs::read(scratch.path()).unwrap(), b"%PDF-1.7");

        let path = scratch.path().to_path_buf();
        scratch.release();
        assert!(!path.exists());
    }

    #[test]
    fn test_empty_upload_rejected() {
        assert!(matches!(
            ScratchDocument::create(b"", "empty.pdf"),
            Err(WhisperError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_removed_after_error() {
        let mut seen = None;
        let result: Result<()> = with_scratch_document(b"data", "a.txt", |path| {
            seen = Some(path.clone());
            async move {
                assert!(path.exists());
                Err(WhisperError::Transport("connection reset".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(WhisperError::Transport(_))));
        assert!(!seen.unwrap().exists());
    }
}
