//! Job consumer: the receiving end of the simulator
//!
//! Drains the server's job queue, decodes each job on the blocking pool and
//! hands the result to a [`ContentSink`]. Delivered content is also kept in a
//! bounded history, newest last. Jobs with nothing renderable are dropped
//! quietly. Any other failure stops the server, so a broken consumer
//! never leaves clients printing into a queue nobody reads.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local};
use image::DynamicImage;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use crate::decoder::bitmap::{BitmapOps, save_png};
use crate::decoder::{DecodedContent, JobClassifier};
use crate::error::{PrinterError, PrinterResult};
use crate::server::{PrintJob, PrinterServer};

/// Destination for decoded jobs
pub trait ContentSink<T>: Send {
    /// # Errors
    ///
    /// Any error stops the consumer and the server.
    fn deliver(&mut self, job: &PrintJob, content: &DecodedContent<T>) -> PrinterResult<()>;
}

/// Default number of entries kept by [`JobConsumer::history`]
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// One delivered job
#[derive(Debug)]
pub struct ReceivedContent<T> {
    pub peer: SocketAddr,
    pub received_at: DateTime<Local>,
    pub content: DecodedContent<T>,
}

/// Per-kind job counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub text: usize,
    pub raster: usize,
    pub dropped: usize,
}

impl ConsumerStats {
    pub fn total(&self) -> usize {
        self.text + self.raster + self.dropped
    }
}

/// Decodes queued jobs and forwards them to a sink
pub struct JobConsumer<B: BitmapOps, S> {
    classifier: Arc<JobClassifier<B>>,
    sink: S,
    stats: ConsumerStats,
    history: VecDeque<ReceivedContent<B::Bitmap>>,
    history_limit: usize,
}

impl<B, S> JobConsumer<B, S>
where
    B: BitmapOps + 'static,
    S: ContentSink<B::Bitmap>,
{
    pub fn new(classifier: JobClassifier<B>, sink: S) -> Self {
        Self {
            classifier: Arc::new(classifier),
            sink,
            stats: ConsumerStats::default(),
            history: VecDeque::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Keep at most `limit` entries in the history, 0 disables it
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self.history.truncate(limit);
        self
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Delivered content, oldest first
    pub fn history(&self) -> &VecDeque<ReceivedContent<B::Bitmap>> {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consume until the queue closes
    ///
    /// On failure the server is stopped before the error is returned.
    ///
    /// # Errors
    ///
    /// [`PrinterError::Processing`] when decoding panics, or whatever the
    /// sink reports.
    pub async fn run(
        &mut self,
        server: &PrinterServer,
        mut jobs: mpsc::Receiver<PrintJob>,
    ) -> PrinterResult<ConsumerStats> {
        while let Some(job) = jobs.recv().await {
            if let Err(e) = self.process(job).await {
                error!(error = %e, "failed to process print job, stopping server");
                server.stop().await;
                return Err(e);
            }
        }
        Ok(self.stats)
    }

    /// Decode one job and deliver it
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    #[instrument(skip_all, fields(peer = %job.peer, bytes = job.data.len()))]
    pub async fn process(&mut self, job: PrintJob) -> PrinterResult<()> {
        let classifier = self.classifier.clone();
        let (job, content) = tokio::task::spawn_blocking(move || {
            let content = classifier.classify(&job.data);
            (job, content)
        })
        .await
        .map_err(|e| PrinterError::Processing(format!("decode task failed: {e}")))?;

        match &content {
            DecodedContent::None => {
                debug!("nothing renderable, job dropped");
                self.stats.dropped += 1;
                return Ok(());
            }
            DecodedContent::Text(_) => self.stats.text += 1,
            DecodedContent::Raster(_) => self.stats.raster += 1,
        }

        self.sink.deliver(&job, &content)?;
        self.remember(job.peer, content);
        Ok(())
    }

    fn remember(&mut self, peer: SocketAddr, content: DecodedContent<B::Bitmap>) {
        if self.history_limit == 0 {
            return;
        }
        while self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(ReceivedContent {
            peer,
            received_at: Local::now(),
            content,
        });
    }
}

/// Sink that logs text jobs and saves raster jobs as PNG
#[derive(Debug, Default)]
pub struct LogSink {
    output_dir: Option<PathBuf>,
    saved: usize,
}

impl LogSink {
    /// Save rasters into `output_dir` when set
    pub fn new(output_dir: Option<PathBuf>) -> Self {
        Self {
            output_dir,
            saved: 0,
        }
    }

    /// Number of PNG files written
    pub fn saved(&self) -> usize {
        self.saved
    }
}

impl ContentSink<DynamicImage> for LogSink {
    fn deliver(&mut self, job: &PrintJob, content: &DecodedContent<DynamicImage>) -> PrinterResult<()> {
        match content {
            DecodedContent::None => {}
            DecodedContent::Text(text) => {
                info!(peer = %job.peer, "text job\n{text}");
            }
            DecodedContent::Raster(bitmap) => {
                let (width, height) = (bitmap.width(), bitmap.height());
                let Some(dir) = &self.output_dir else {
                    info!(peer = %job.peer, width, height, "raster job");
                    return Ok(());
                };

                std::fs::create_dir_all(dir)?;
                self.saved += 1;
                let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
                let path = dir.join(format!("receipt-{stamp}-{:04}.png", self.saved));
                save_png(bitmap, &path)?;
                info!(peer = %job.peer, width, height, path = %path.display(), "raster job saved");
            }
        }
        Ok(())
    }
}
