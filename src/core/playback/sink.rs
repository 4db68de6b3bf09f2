//! Audio output.
//!
//! The engine never touches an audio device itself. It hands clips to an
//! [`AudioSink`], and for streamed segments opens a [`StreamSession`] that
//! receives chunks as they arrive. Whether progressive appending is reliable
//! in the host environment is declared up front via [`RuntimeCapabilities`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::core::tts::AudioClip;
use crate::core::tts::format::essence;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The sink cannot append this mime type progressively.
    #[error("Progressive playback not supported for {0}")]
    Unsupported(String),

    #[error("Playback failed: {0}")]
    Failed(String),

    /// Playback was halted through [`AudioSink::stop`].
    #[error("Playback interrupted")]
    Interrupted,
}

/// What the host environment can do with streamed audio.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeCapabilities {
    pub progressive_append: bool,
    /// Mime types accepted for appending. Empty means any.
    pub append_mime_types: Vec<String>,
}

impl RuntimeCapabilities {
    pub fn buffered_only() -> Self {
        Self::default()
    }

    pub fn progressive() -> Self {
        Self {
            progressive_append: true,
            append_mime_types: Vec::new(),
        }
    }

    pub fn with_mime_types<I, S>(mut self, mime_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.append_mime_types = mime_types.into_iter().map(Into::into).collect();
        self
    }

    /// Whether a stream of `mime` may be appended progressively.
    pub fn supports(&self, mime: &str) -> bool {
        if !self.progressive_append {
            return false;
        }
        let mime = essence(mime);
        self.append_mime_types.is_empty()
            || self
                .append_mime_types
                .iter()
                .any(|accepted| essence(accepted) == mime)
    }
}

/// Destination of synthesized audio.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Plays a complete clip at `rate`, resolving when playback has finished.
    async fn play(&self, clip: AudioClip, rate: f32) -> Result<(), SinkError>;

    /// Opens a progressive session for audio of type `mime`.
    async fn open_stream(&self, mime: &str, rate: f32) -> Result<Box<dyn StreamSession>, SinkError>;

    /// Halts whatever is audible. Must be idempotent.
    fn stop(&self);
}

/// Progressive playback of one streamed response.
#[async_trait]
pub trait StreamSession: Send {
    async fn append(&mut self, chunk: Bytes) -> Result<(), SinkError>;

    /// Signals end of data and waits until everything appended was played.
    async fn finish(self: Box<Self>) -> Result<(), SinkError>;

    /// Discards the session without waiting.
    fn abort(self: Box<Self>);
}

// =============================================================================
// File Sink
// =============================================================================

/// Writes every clip to a numbered file in a directory.
///
/// Streamed sessions are written chunk by chunk as they arrive. Useful for
/// exporting an utterance and for running the pipeline headless.
pub struct FileSink {
    dir: PathBuf,
    next_index: AtomicUsize,
    written: Arc<Mutex<Vec<PathBuf>>>,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next_index: AtomicUsize::new(0),
            written: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files completed so far, in playback order.
    pub fn written(&self) -> Vec<PathBuf> {
        self.written.lock().clone()
    }

    fn next_path(&self, mime: &str) -> PathBuf {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        self.dir.join(format!("{index:04}.{}", extension_for(mime)))
    }
}

fn extension_for(mime: &str) -> &'static str {
    match essence(mime).as_str() {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/wave" | "audio/x-wav" => "wav",
        _ => "bin",
    }
}

#[async_trait]
impl AudioSink for FileSink {
    async fn play(&self, clip: AudioClip, rate: f32) -> Result<(), SinkError> {
        let path = self.next_path(&clip.content_type);
        tokio::fs::write(&path, &clip.data)
            .await
            .map_err(|e| SinkError::Failed(format!("{}: {e}", path.display())))?;

        debug!(path = %path.display(), bytes = clip.len(), rate, "Wrote audio clip");
        self.written.lock().push(path);
        Ok(())
    }

    async fn open_stream(
        &self,
        mime: &str,
        rate: f32,
    ) -> Result<Box<dyn StreamSession>, SinkError> {
        let path = self.next_path(mime);
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| SinkError::Failed(format!("{}: {e}", path.display())))?;

        debug!(path = %path.display(), mime, rate, "Opened streamed audio file");
        Ok(Box::new(FileStreamSession {
            file,
            path,
            bytes: 0,
            written: Arc::clone(&self.written),
        }))
    }

    fn stop(&self) {}
}

struct FileStreamSession {
    file: tokio::fs::File,
    path: PathBuf,
    bytes: usize,
    written: Arc<Mutex<Vec<PathBuf>>>,
}

#[async_trait]
impl StreamSession for FileStreamSession {
    async fn append(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        self.file
            .write_all(&chunk)
            .await
            .map_err(|e| SinkError::Failed(format!("{}: {e}", self.path.display())))?;
        self.bytes += chunk.len();
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<(), SinkError> {
        self.file
            .flush()
            .await
            .map_err(|e| SinkError::Failed(format!("{}: {e}", self.path.display())))?;

        debug!(path = %self.path.display(), bytes = self.bytes, "Finished streamed audio file");
        self.written.lock().push(self.path.clone());
        Ok(())
    }

    fn abort(self: Box<Self>) {
        let FileStreamSession { file, path, .. } = *self;
        drop(file);
        if let Err(e) = std::fs::remove_file(&path) {
            warn!(path = %path.display(), error = %e, "Failed to remove aborted audio file");
        }
    }
}
