//! Where page text comes from.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncReadExt;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read page text from {source_name}: {err}")]
    Io {
        source_name: String,
        #[source]
        err: std::io::Error,
    },

    #[error("no text found on the page")]
    Empty,
}

/// Supplies the text of the page being summarized.
///
/// Implementations decide how the page is read; callers only see the
/// extracted text.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn page_text(&self) -> Result<String, ExtractError>;
}

/// Reads page text from a file, or from stdin when no path is given.
#[derive(Debug, Clone, Default)]
pub struct FilePageSource {
    path: Option<PathBuf>,
}

impl FilePageSource {
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
        }
    }

    pub fn stdin() -> Self {
        Self { path: None }
    }

    fn source_name(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => "stdin".to_string(),
        }
    }
}

#[async_trait]
impl PageSource for FilePageSource {
    async fn page_text(&self) -> Result<String, ExtractError> {
        let raw = match &self.path {
            Some(path) => tokio::fs::read_to_string(path).await,
            None => {
                let mut buf = String::new();
                tokio::io::stdin()
                    .read_to_string(&mut buf)
                    .await
                    .map(|_| buf)
            }
        }
        .map_err(|err| ExtractError::Io {
            source_name: self.source_name(),
            err,
        })?;

        let text = super::normalize_whitespace(&raw);
        if text.is_empty() {
            return Err(ExtractError::Empty);
        }
        log::debug!(
            "extract: read {} chars from {}",
            text.chars().count(),
            self.source_name()
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn file_text_is_normalized() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "  First line\n\n  second\tline  ").unwrap();

        let text = FilePageSource::file(file.path()).page_text().await.unwrap();
        assert_eq!(text, "First line second line");
    }

    #[tokio::test]
    async fn blank_file_is_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, " \n\t ").unwrap();

        let err = FilePageSource::file(file.path()).page_text().await.unwrap_err();
        assert!(matches!(err, ExtractError::Empty));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FilePageSource::file(dir.path().join("nope.txt"))
            .page_text()
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Io { .. }));
        assert!(err.to_string().contains("nope.txt"));
    }
}
