//! Background execution of a batch with messages on a channel.

use deid_classifier::{load_classifier, SensitivityClassifier};
use deid_common::cancel::CancelToken;
use deid_common::config::{AppConfig, ProcessingMode};
use deid_model::{PatientCase, ProgressEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::orchestrator::{CaseReport, Orchestrator};

/// Everything the worker reports to its submitter.
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    Progress(ProgressEvent),
    CaseCompleted(CaseReport),
    /// The batch failed. Carries the file name and a short diagnostic.
    Error(String),
    /// The batch stopped on request.
    Terminated,
    /// Every case completed.
    Finished,
}

/// Submitter's handle on a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    cancel: CancelToken,
    mode: ProcessingMode,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stop the batch. Advanced mode stops gracefully at the next frame;
    /// normal mode kills the running transcoder.
    pub fn cancel(&self) {
        info!(mode = self.mode.as_str(), "Cancellation requested");
        match self.mode {
            ProcessingMode::Advanced => self.cancel.request_stop(),
            ProcessingMode::Normal => self.cancel.request_kill(),
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the worker task to end.
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.task.await
    }
}

/// Run `cases` on a blocking thread with the classifier named by the config.
///
/// Must be called from within a tokio runtime.
pub fn spawn_worker(
    config: AppConfig,
    cases: Vec<PatientCase>,
) -> (WorkerHandle, mpsc::UnboundedReceiver<WorkerMessage>) {
    spawn_inner(config, cases, None)
}

/// Like [`spawn_worker`], with a caller-supplied classifier.
pub fn spawn_worker_with(
    config: AppConfig,
    cases: Vec<PatientCase>,
    classifier: Box<dyn SensitivityClassifier>,
) -> (WorkerHandle, mpsc::UnboundedReceiver<WorkerMessage>) {
    spawn_inner(config, cases, Some(classifier))
}

fn spawn_inner(
    config: AppConfig,
    cases: Vec<PatientCase>,
    classifier: Option<Box<dyn SensitivityClassifier>>,
) -> (WorkerHandle, mpsc::UnboundedReceiver<WorkerMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancelToken::new();
    let mode = config.processing.mode;

    let worker_cancel = cancel.clone();
    let task = tokio::task::spawn_blocking(move || {
        let message = match run_batch(config, cases, classifier, worker_cancel, &tx) {
            Ok(()) => WorkerMessage::Finished,
            Err(e) if e.is_cancelled() => {
                info!("Batch terminated by request");
                WorkerMessage::Terminated
            }
            Err(e) => {
                error!(error = %e, "Batch failed");
                WorkerMessage::Error(e.report())
            }
        };
        // The receiver may already be gone.
        let _ = tx.send(message);
    });

    (WorkerHandle { cancel, mode, task }, rx)
}

fn run_batch(
    config: AppConfig,
    cases: Vec<PatientCase>,
    classifier: Option<Box<dyn SensitivityClassifier>>,
    cancel: CancelToken,
    tx: &mpsc::UnboundedSender<WorkerMessage>,
) -> deid_common::DeidResult<()> {
    let mut classifier = match classifier {
        Some(c) => c,
        None => load_classifier(&config.model)?,
    };
    info!(
        classifier = classifier.name(),
        cases = cases.len(),
        mode = config.processing.mode.as_str(),
        "Worker started"
    );

    let orchestrator = Orchestrator::new(config, cancel)?;
    let progress = |event: ProgressEvent| {
        let _ = tx.send(WorkerMessage::Progress(event));
    };
    orchestrator.run(classifier.as_mut(), &cases, &progress, |report| {
        let _ = tx.send(WorkerMessage::CaseCompleted(report.clone()));
    })?;
    Ok(())
}
