//! Output writer
//!
//! Each recording session owns exactly one writer task. The task is the only
//! holder of the session's file handle: it drains the bounded chunk queue in
//! arrival order into a buffered sink and, once the queue is closed, flushes,
//! syncs and closes the file before publishing its report on the completion
//! signal.

use super::state::WriterReport;
use crate::utils::error::{RecordingError, RecordingResult};
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, watch};

/// Default size of the in-memory write buffer (1 MiB)
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 1024 * 1024;

/// Default number of chunks the queue holds before dropping
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Completion signal of a writer task
///
/// Cloneable so that any number of stop/delete callers can wait on the same
/// barrier.
#[derive(Debug, Clone)]
pub struct WriterDone {
    rx: watch::Receiver<Option<WriterReport>>,
}

impl WriterDone {
    /// Wait until the writer has flushed, synced and closed the file
    pub async fn wait(&self) -> WriterReport {
        let mut rx = self.rx.clone();
        let report = match rx.wait_for(|report| report.is_some()).await {
            Ok(report) => (*report).clone().unwrap_or_default(),
            Err(_) => WriterReport {
                error: Some("writer task ended without reporting".to_string()),
                ..WriterReport::default()
            },
        };
        report
    }

    /// The writer's report, if it has already finished
    pub fn report(&self) -> Option<WriterReport> {
        self.rx.borrow().clone()
    }

    pub fn is_done(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

/// Spawns the per-session writer task
pub struct OutputWriter {
    path: PathBuf,
    queue_capacity: usize,
    buffer_size: usize,
}

impl OutputWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
        }
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Create (or truncate) the output file and launch the writer task
    ///
    /// Returns the producer end of the chunk queue and the completion signal.
    /// Dropping every sender closes the queue; the writer then drains what is
    /// left and finalizes the file.
    pub async fn spawn(self) -> RecordingResult<(mpsc::Sender<Vec<u8>>, WriterDone)> {
        let file = File::create(&self.path)
            .await
            .map_err(|e| RecordingError::storage("failed to create", &self.path, e))?;

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let (done_tx, done_rx) = watch::channel(None);

        tracing::debug!(
            "Writer starting for {:?} (queue {}, buffer {} bytes)",
            self.path,
            self.queue_capacity,
            self.buffer_size
        );

        tokio::spawn(drain(self.path, file, rx, self.buffer_size, done_tx));

        Ok((tx, WriterDone { rx: done_rx }))
    }
}

async fn drain(
    path: PathBuf,
    file: File,
    mut rx: mpsc::Receiver<Vec<u8>>,
    buffer_size: usize,
    done_tx: watch::Sender<Option<WriterReport>>,
) {
    let mut writer = BufWriter::with_capacity(buffer_size, file);
    let mut report = WriterReport::default();

    while let Some(chunk) = rx.recv().await {
        // After a failure keep draining so producers and stop callers never hang.
        if report.error.is_some() {
            continue;
        }
        match writer.write_all(&chunk).await {
            Ok(()) => {
                report.chunks_written += 1;
                report.bytes_written += chunk.len() as u64;
            }
            Err(e) => {
                tracing::error!("Write to {:?} failed: {}", path, e);
                report.error = Some(e.to_string());
            }
        }
    }

    if let Err(e) = finalize(writer).await {
        tracing::error!("Failed to finalize {:?}: {}", path, e);
        report.error.get_or_insert_with(|| e.to_string());
    }

    tracing::info!(
        "Writer finished for {:?}: {} chunks, {} bytes",
        path,
        report.chunks_written,
        report.bytes_written
    );

    let _ = done_tx.send(Some(report));
}

/// Flush buffered bytes, sync to storage and close the handle
async fn finalize(mut writer: BufWriter<File>) -> std::io::Result<()> {
    writer.flush().await?;
    let file = writer.into_inner();
    file.sync_all().await?;
    let std_file = file.into_std().await;
    drop(std_file);
    Ok(())
}
