//! Bulk downloader.
//!
//! Missing tiles are fetched in fixed-size batches. Each batch is staged in
//! the scratch namespace under keys private to its target, then promoted into
//! the target namespace in one transaction, so a target namespace only ever
//! gains whole batches. Batches
//! run strictly one after another with a short pause in between.
//!
//! Any failed tile fails the whole job; there is no retry. Running the job
//! again recomputes the missing set, so already promoted batches are kept.

pub mod jobs;
pub mod progress;

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;

use crate::fetch::HttpSource;
use crate::manifest::ManifestReader;
use crate::reconcile::Reconciler;
use crate::session::Session;
use tilesync_core::cache::cache_key;
use tilesync_core::tile::SCRATCH_NAMESPACE;
use tilesync_core::{CacheDb, CacheHandle, Error, LayerDescriptor};

pub use jobs::{JobRegistry, JobTicket};
pub use progress::{DownloadOptions, DownloadProgress, DownloadReport, JobState, ProgressCallback};

#[derive(Clone)]
pub struct BulkDownloader {
    db: CacheDb,
    http: Arc<dyn HttpSource>,
    session: Session,
    reconciler: Reconciler,
    jobs: JobRegistry,
    ephemeral: Vec<String>,
}

/// State of one running job.
struct DownloadJob {
    namespace: String,
    total: usize,
    completed: usize,
    on_progress: Option<ProgressCallback>,
}

impl DownloadJob {
    fn new(namespace: &str, total: usize, on_progress: Option<ProgressCallback>) -> Self {
        Self { namespace: namespace.to_string(), total, completed: 0, on_progress }
    }

    fn emit(&self, state: JobState) {
        if let Some(callback) = &self.on_progress {
            callback(DownloadProgress {
                namespace: self.namespace.clone(),
                completed: self.completed,
                total: self.total,
                state,
            });
        }
    }

    /// Emit the terminal event and build the report.
    fn finish(&self, state: JobState) -> DownloadReport {
        self.emit(state);
        DownloadReport { namespace: self.namespace.clone(), downloaded: self.completed, total: self.total, state }
    }
}

impl BulkDownloader {
    pub fn new(
        db: CacheDb, http: Arc<dyn HttpSource>, session: Session, reconciler: Reconciler, jobs: JobRegistry,
        ephemeral: Vec<String>,
    ) -> Self {
        Self { db, http, session, reconciler, jobs, ephemeral }
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    pub fn reader(&self) -> &ManifestReader {
        self.reconciler.reader()
    }

    /// Register a job for `layer` without starting it.
    ///
    /// The layer reports as loading from here on, until the returned ticket is
    /// dropped or handed to [`BulkDownloader::download_registered`] and the
    /// job ends.
    pub fn register(&self, layer: &LayerDescriptor) -> Result<JobTicket, Error> {
        layer.validate()?;
        Ok(self.jobs.register(&layer.namespace()))
    }

    /// Download every tile of `layer` that is listed remotely but not cached.
    ///
    /// The missing set is computed once the job holds its namespace, so a job
    /// queued behind another for the same layer only fetches what is still
    /// missing. Cancellation is not an error: the report says `Cancelled` and
    /// already promoted batches stay cached.
    pub async fn download(
        &self, layer: &LayerDescriptor, options: &DownloadOptions, on_progress: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> Result<DownloadReport, Error> {
        let ticket = self.register(layer)?;
        self.download_registered(ticket, layer, options, on_progress, cancel)
            .await
    }

    /// Run a job obtained from [`BulkDownloader::register`].
    pub async fn download_registered(
        &self, ticket: JobTicket, layer: &LayerDescriptor, options: &DownloadOptions,
        on_progress: Option<ProgressCallback>, cancel: CancellationToken,
    ) -> Result<DownloadReport, Error> {
        if ticket.namespace() != layer.namespace() {
            return Err(Error::InvalidInput(format!(
                "job registered for {} cannot download {}",
                ticket.namespace(),
                layer.namespace()
            )));
        }

        let Some(_lock) = acquire(&ticket, &cancel).await else {
            return Ok(DownloadJob::new(ticket.namespace(), 0, on_progress).finish(JobState::Cancelled));
        };

        let report = match self.reconciler.inspect(layer).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(layer = %layer.id, error = %e, "reconciliation failed, download not started");
                DownloadJob::new(ticket.namespace(), 0, on_progress).emit(JobState::Failed);
                return Err(e);
            }
        };
        if report.remote.is_empty() {
            tracing::warn!(layer = %layer.id, "remote manifest is empty, nothing to download");
        }

        self.run(&ticket, report.missing, true, options, on_progress, cancel).await
    }

    /// Download `urls` into `namespace`, skipping what it already holds.
    ///
    /// With `authenticated` the session token is added to each request.
    pub async fn download_urls(
        &self, namespace: &str, urls: &[String], authenticated: bool, options: &DownloadOptions,
        on_progress: Option<ProgressCallback>, cancel: CancellationToken,
    ) -> Result<DownloadReport, Error> {
        let ticket = self.jobs.register(namespace);

        let Some(_lock) = acquire(&ticket, &cancel).await else {
            return Ok(DownloadJob::new(namespace, 0, on_progress).finish(JobState::Cancelled));
        };

        let pending = match self.pending_keys(namespace, urls).await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(namespace, error = %e, "could not compute missing urls");
                DownloadJob::new(namespace, 0, on_progress).emit(JobState::Failed);
                return Err(e);
            }
        };

        self.run(&ticket, pending, authenticated, options, on_progress, cancel).await
    }

    /// Cache keys of `urls` not yet stored in `namespace`, deduplicated.
    async fn pending_keys(&self, namespace: &str, urls: &[String]) -> Result<Vec<String>, Error> {
        let target = self.db.open_namespace(namespace).await?;
        let cached: HashSet<String> = self.db.keys(&target).await?.into_iter().collect();

        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for url in urls {
            let key = cache_key(url, &self.ephemeral)?;
            if !cached.contains(&key) && seen.insert(key.clone()) {
                pending.push(key);
            }
        }
        Ok(pending)
    }

    async fn run(
        &self, ticket: &JobTicket, pending: Vec<String>, authenticated: bool, options: &DownloadOptions,
        on_progress: Option<ProgressCallback>, cancel: CancellationToken,
    ) -> Result<DownloadReport, Error> {
        let mut job = DownloadJob::new(ticket.namespace(), pending.len(), on_progress);
        let handles = tokio::try_join!(
            self.db.open_namespace(ticket.namespace()),
            self.db.open_namespace(SCRATCH_NAMESPACE)
        );
        let (target, scratch) = match handles {
            Ok(handles) => handles,
            Err(e) => {
                job.emit(JobState::Failed);
                return Err(e);
            }
        };

        tracing::info!(namespace = %job.namespace, total = job.total, "download started");

        for (index, batch) in pending.chunks(options.batch_size()).enumerate() {
            if index > 0 && !options.batch_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(options.batch_delay) => {}
                }
            }

            if cancel.is_cancelled() {
                tracing::info!(namespace = %job.namespace, completed = job.completed, "download cancelled");
                return Ok(job.finish(JobState::Cancelled));
            }

            let _staging = self.jobs.scratch().await;

            // Cancellation races the fetches only; a started promotion runs to completion.
            let staged = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.stage_batch(batch, &scratch, &target, authenticated) => Some(result),
            };

            let promoted = match staged {
                None => {
                    tracing::info!(namespace = %job.namespace, completed = job.completed, "download cancelled");
                    return Ok(job.finish(JobState::Cancelled));
                }
                Some(Ok(())) => self.db.promote(&scratch, &target, batch).await,
                Some(Err(e)) => Err(e),
            };

            match promoted {
                Ok(moved) => {
                    job.completed += moved as usize;
                    job.emit(JobState::Running);
                }
                Err(e) => {
                    tracing::warn!(
                        namespace = %job.namespace,
                        completed = job.completed,
                        error = %e,
                        "download failed"
                    );
                    job.emit(JobState::Failed);
                    return Err(e);
                }
            }
        }

        self.drain_scratch().await;

        tracing::info!(namespace = %job.namespace, downloaded = job.completed, "download completed");
        Ok(job.finish(JobState::Completed))
    }

    /// Fetch every tile of a batch into scratch, staged for `target`.
    ///
    /// Dropping the returned future aborts the in-flight requests.
    async fn stage_batch(
        &self, batch: &[String], scratch: &CacheHandle, target: &CacheHandle, authenticated: bool,
    ) -> Result<(), Error> {
        try_join_all(batch.iter().map(|key| self.stage(key, scratch, target, authenticated))).await?;
        Ok(())
    }

    async fn stage(
        &self, key: &str, scratch: &CacheHandle, target: &CacheHandle, authenticated: bool,
    ) -> Result<(), Error> {
        let request_url = if authenticated { self.session.authorize(key).await? } else { key.to_string() };

        let response = self.http.get(&request_url).await.map_err(|e| Error::TileFetch {
            url: key.to_string(),
            reason: match e {
                Error::HttpStatus { status, .. } => format!("status {status}"),
                other => other.to_string(),
            },
        })?;

        self.db
            .stage(scratch, target, key, &response.bytes, response.content_type.as_deref())
            .await
    }

    /// Empty the scratch namespace unless another job may still use it.
    async fn drain_scratch(&self) {
        let Some(_exclusive) = self.jobs.lock_if_sole() else {
            return;
        };
        match self.db.delete_namespace(SCRATCH_NAMESPACE).await {
            Ok(_) => tracing::debug!("scratch namespace drained"),
            Err(e) => tracing::warn!(error = %e, "failed to drain scratch namespace"),
        }
    }
}

/// Wait for the namespace lock, or give up once `cancel` fires.
async fn acquire(ticket: &JobTicket, cancel: &CancellationToken) -> Option<OwnedMutexGuard<()>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        lock = ticket.acquire() => Some(lock),
    }
}
