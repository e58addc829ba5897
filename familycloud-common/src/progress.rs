//! Upload progress as a lazy, finite event sequence.
//!
//! An [`UploadHandle`] owns the not-yet-started upload future and the
//! receiving end of its progress channel. Polling the handle drives the
//! upload; it yields zero or more [`UploadEvent::Progress`] values and then
//! exactly one [`UploadEvent::Finished`].

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;

use crate::backend::StorageError;
use crate::documents::PhotoRecord;

#[derive(Debug)]
pub enum UploadEvent {
    /// Percentage in `0..=100`, never lower than a previous value.
    Progress(u8),
    Finished(Result<PhotoRecord, StorageError>),
}

/// Sending side handed to the transfer code.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<u8>,
}

impl ProgressReporter {
    /// Report `done` of `total` bytes transferred.
    pub fn bytes(&self, done: u64, total: u64) {
        if total == 0 {
            self.percent(100.0);
        } else {
            self.percent(done as f64 / total as f64 * 100.0);
        }
    }

    pub fn percent(&self, pct: f64) {
        let clamped = pct.clamp(0.0, 100.0).floor() as u8;
        // Receiver gone means the handle was dropped; nobody is listening.
        let _ = self.tx.send(clamped);
    }
}

pub struct UploadHandle {
    task: Option<BoxFuture<'static, Result<PhotoRecord, StorageError>>>,
    progress: mpsc::UnboundedReceiver<u8>,
    outcome: Option<Result<PhotoRecord, StorageError>>,
    last: Option<u8>,
    done: bool,
}

impl UploadHandle {
    /// Build a handle around `make`, which receives the reporter for its
    /// progress events. The future is not polled until the handle is.
    pub fn new<F, Fut>(make: F) -> Self
    where
        F: FnOnce(ProgressReporter) -> Fut,
        Fut: Future<Output = Result<PhotoRecord, StorageError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = make(ProgressReporter { tx }).boxed();
        Self {
            task: Some(task),
            progress: rx,
            outcome: None,
            last: None,
            done: false,
        }
    }

    /// A handle whose outcome is already known.
    pub fn ready(result: Result<PhotoRecord, StorageError>) -> Self {
        Self::new(|_| async move { result })
    }

    /// Next event, or `None` once `Finished` has been yielded.
    pub async fn next_event(&mut self) -> Option<UploadEvent> {
        loop {
            if self.done {
                return None;
            }

            if let Some(task) = self.task.as_mut() {
                tokio::select! {
                    biased;
                    Some(pct) = self.progress.recv() => {
                        if let Some(event) = self.accept(pct) {
                            return Some(event);
                        }
                    }
                    result = task => {
                        self.task = None;
                        self.outcome = Some(result);
                    }
                }
                continue;
            }

            if let Ok(pct) = self.progress.try_recv() {
                if let Some(event) = self.accept(pct) {
                    return Some(event);
                }
                continue;
            }

            let outcome = self.outcome.take()?;
            if outcome.is_ok() && self.last != Some(100) {
                self.last = Some(100);
                self.outcome = Some(outcome);
                return Some(UploadEvent::Progress(100));
            }
            self.done = true;
            return Some(UploadEvent::Finished(outcome));
        }
    }

    /// Drive the upload to completion, forwarding progress to `on_progress`.
    pub async fn finish<P>(mut self, mut on_progress: P) -> Result<PhotoRecord, StorageError>
    where
        P: FnMut(u8),
    {
        while let Some(event) = self.next_event().await {
            match event {
                UploadEvent::Progress(pct) => on_progress(pct),
                UploadEvent::Finished(result) => return result,
            }
        }
        Err(StorageError::Upload("upload handle already consumed".to_string()))
    }

    fn accept(&mut self, pct: u8) -> Option<UploadEvent> {
        if self.last.is_some_and(|last| pct < last) {
            return None;
        }
        if self.last == Some(pct) {
            return None;
        }
        self.last = Some(pct);
        Some(UploadEvent::Progress(pct))
    }
}
