use crate::config::ClassifierConfig;
use crate::core_modules::classifier::{DefectClassificationClient, InferenceBackend};
use crate::core_modules::credential::Credential;
use crate::core_modules::image_preprocessor::ImagePreprocessor;
use crate::error::Error;
use crate::pipeline::{BatchReport, ClassificationResult, ImageUpload, missing_credential_results, prepare_off_runtime, record};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

pub struct UploadTask {
    /// Position of the upload in the operator's selection.
    pub index: usize,
    pub upload: ImageUpload,
    pub result_sender: oneshot::Sender<(usize, ClassificationResult)>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<UploadTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(
        worker_count: usize,
        client: Arc<DefectClassificationClient>,
        preprocessor: ImagePreprocessor,
        request_interval: Duration,
    ) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<UploadTask>();
        let mut workers = Vec::with_capacity(worker_count + 1);

        // Create a single dispatcher that distributes tasks to workers
        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<UploadTask>())
            .unzip();

        let dispatcher = tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                if let Err(mpsc::error::SendError(task)) = worker_senders[worker_idx].send(task) {
                    warn!(worker = worker_idx, file = %task.upload.filename, "worker gone; dropping task");
                }
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });
        workers.push(dispatcher);

        for (worker_id, mut worker_receiver) in worker_receivers.into_iter().enumerate() {
            let client = client.clone();

            let worker = tokio::spawn(async move {
                let mut called_before = false;

                while let Some(task) = worker_receiver.recv().await {
                    debug!(worker = worker_id, index = task.index, file = %task.upload.filename, "picked up upload");
                    let filename = task.upload.filename.clone();
                    let outcome = match prepare_off_runtime(preprocessor, task.upload).await {
                        Ok(request) => {
                            if called_before && !request_interval.is_zero() {
                                tokio::time::sleep(request_interval).await;
                            }
                            called_before = true;
                            client.submit(&request).await
                        }
                        Err(err) => Err(err),
                    };

                    let result = record(&filename, outcome);
                    let _ = task.result_sender.send((task.index, result));
                }
            });

            workers.push(worker);
        }

        Self { task_sender, workers }
    }

    pub fn submit(&self, index: usize, upload: ImageUpload) -> Result<oneshot::Receiver<(usize, ClassificationResult)>, &'static str> {
        let (result_sender, result_receiver) = oneshot::channel();

        let task = UploadTask {
            index,
            upload,
            result_sender,
        };

        self.task_sender
            .send(task)
            .map_err(|_| "Failed to send task to worker pool")?;

        Ok(result_receiver)
    }

    /// Closes the queue and waits for in-flight uploads to finish.
    pub async fn shutdown(self) {
        drop(self.task_sender);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Same contract as [`crate::pipeline::BatchOrchestrator`], with uploads spread over a bounded pool.
/// Results are collected as they complete and then put back into upload order.
pub struct ParallelBatchOrchestrator {
    config: ClassifierConfig,
    backend: Arc<dyn InferenceBackend>,
    preprocessor: ImagePreprocessor,
}

impl ParallelBatchOrchestrator {
    pub fn new(config: ClassifierConfig, backend: Arc<dyn InferenceBackend>) -> Self {
        let preprocessor = ImagePreprocessor::new(config.max_edge, config.scale_anchor);
        Self {
            config,
            backend,
            preprocessor,
        }
    }

    pub async fn run_batch(&self, credential: Credential, uploads: Vec<ImageUpload>) -> BatchReport {
        let started = Instant::now();
        let worker_count = self.config.concurrency.clamp(1, uploads.len().max(1));
        info!(images = uploads.len(), workers = worker_count, model = %self.config.model, "starting parallel batch");

        if !credential.is_present() {
            warn!("no API key supplied; skipping inference for the whole batch");
            return BatchReport {
                results: missing_credential_results(self.config.missing_credential_policy, &uploads),
                elapsed: started.elapsed(),
                credential_missing: true,
            };
        }

        let client = Arc::new(DefectClassificationClient::new(credential, self.backend.clone(), &self.config));
        let pool = WorkerPool::new(worker_count, client, self.preprocessor, self.config.request_interval);

        let filenames: Vec<String> = uploads.iter().map(|u| u.filename.clone()).collect();
        let mut pending = FuturesUnordered::new();
        let mut slots: Vec<Option<ClassificationResult>> = vec![None; uploads.len()];

        for (index, upload) in uploads.into_iter().enumerate() {
            match pool.submit(index, upload) {
                Ok(receiver) => pending.push(receiver),
                Err(reason) => slots[index] = Some(worker_lost(&filenames[index], reason)),
            }
        }

        while let Some(received) = pending.next().await {
            if let Ok((index, result)) = received {
                slots[index] = Some(result);
            }
        }
        pool.shutdown().await;

        // Reorder-after-collect: anything a worker never answered for is reported, not dropped.
        let results: Vec<ClassificationResult> = slots
            .into_iter()
            .zip(filenames.iter())
            .map(|(slot, filename)| slot.unwrap_or_else(|| worker_lost(filename, "worker stopped before replying")))
            .collect();

        let report = BatchReport {
            results,
            elapsed: started.elapsed(),
            credential_missing: false,
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "parallel batch complete"
        );
        report
    }
}

fn worker_lost(filename: &str, reason: &str) -> ClassificationResult {
    record(filename, Err(Error::Processing(reason.to_string())))
}
