//! Per-request result files.
//!
//! A [`TempArtifact`] owns a scored CSV on disk and deletes it when it is
//! removed or dropped. [`CleanupStream`] ties that deletion to the response
//! body: the file goes away as soon as the last chunk has been read, or when
//! the body is dropped because the client disconnected.

use exoplanet_ml::{Dataset, MlError};
use futures::Stream;
use pin_project_lite::pin_project;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tempfile::TempPath;

const FILE_PREFIX: &str = "predicciones_";
const FILE_SUFFIX: &str = ".csv";

/// A scored CSV staged on disk for one response.
#[derive(Debug)]
pub struct TempArtifact {
    path: Option<TempPath>,
    len: u64,
}

impl TempArtifact {
    /// Write `dataset` to a fresh uniquely-named file in `dir` (or the OS
    /// temp dir).
    pub fn write(dir: Option<&Path>, dataset: &Dataset) -> Result<Self, MlError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(FILE_PREFIX).suffix(FILE_SUFFIX);
        let file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        {
            let mut writer = BufWriter::new(file.as_file());
            dataset.write_csv(&mut writer)?;
            writer.flush()?;
        }
        let len = file.as_file().metadata()?.len();
        let path = file.into_temp_path();
        tracing::debug!(path = %path.display(), bytes = len, "Staged prediction file");

        Ok(Self {
            path: Some(path),
            len,
        })
    }

    /// Location on disk, or `None` once removed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Size in bytes at the time it was written.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_removed(&self) -> bool {
        self.path.is_none()
    }

    /// Delete the file now. Safe to call more than once.
    pub fn remove(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        let shown = path.display().to_string();
        match path.close() {
            Ok(()) => tracing::debug!(path = %shown, "Removed prediction file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %shown, "Prediction file already gone");
            }
            Err(e) => {
                tracing::warn!(path = %shown, error = %e, "Failed to remove prediction file");
            }
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        self.remove();
    }
}

pin_project! {
    /// Wraps a body stream and removes its backing file once the stream
    /// ends or is dropped.
    pub struct CleanupStream<S> {
        #[pin]
        inner: S,
        artifact: Option<TempArtifact>,
    }
}

impl<S> CleanupStream<S> {
    pub fn new(inner: S, artifact: TempArtifact) -> Self {
        Self {
            inner,
            artifact: Some(artifact),
        }
    }

    /// The backing file, until the stream has been fully read.
    pub fn artifact(&self) -> Option<&TempArtifact> {
        self.artifact.as_ref()
    }
}

impl<S: Stream> Stream for CleanupStream<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let poll = this.inner.poll_next(cx);
        if let Poll::Ready(None) = poll {
            if let Some(mut artifact) = this.artifact.take() {
                artifact.remove();
            }
        }
        poll
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
