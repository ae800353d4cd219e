//! Deployment driver: health check, tokenizer, model, initialize, ready.
//!
//! Everything is strictly sequential. Chunk N+1 is only sent after chunk N
//! was acknowledged, and the first failure aborts the deployment with the
//! offset at which it stopped. A failed blob is left `Aborted` and must be
//! re-sent from its reset.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{timeout, Instant};

use kiln_core::{Blob, HostApi, HostError, HostResult};
use kiln_sizer::{CapacityPlan, ModelConfig};

use crate::chunk::{chunks, ChunkSize};
use crate::config::UploadConfig;
use crate::error::{DeployError, Result};
use crate::lifecycle::UploadSession;
use crate::source::read_blob;

/// What one blob upload moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlobReport {
    pub bytes: usize,
    pub chunks: usize,
}

/// Summary of a successful deployment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeployReport {
    pub tokenizer: BlobReport,
    pub model: BlobReport,
    /// Time between the `initialize` acknowledgment and the first ready poll
    /// that returned true.
    pub activation_wait: Duration,
    /// Header of the deployed model, when the capacity check decoded it.
    pub model_config: Option<ModelConfig>,
}

/// Drives one host through the upload protocol.
pub struct Deployer<H> {
    host: H,
    config: UploadConfig,
    session: UploadSession,
}

/// Await a host acknowledgment under the ack deadline.
async fn acked<F>(
    deadline: Duration,
    blob: Blob,
    offset: usize,
    operation: &'static str,
    fut: F,
) -> Result<()>
where
    F: Future<Output = HostResult<()>>,
{
    match timeout(deadline, fut).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(DeployError::from_host(operation, err, |source| {
            DeployError::ChunkRejected { blob, offset, source }
        })),
        Err(_) => Err(DeployError::AckTimeout { blob, offset, timeout: deadline }),
    }
}

impl<H: HostApi> Deployer<H> {
    pub fn new(host: H, config: UploadConfig) -> Self {
        Self { host, config, session: UploadSession::new() }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Lifecycle state as of the last acknowledged step.
    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    /// Read both sources from disk, then deploy them.
    ///
    /// Both files are read before the host is contacted, so an unreadable
    /// source never leaves the host half-reset.
    pub async fn deploy_files(&mut self, tokenizer: &Path, model: &Path) -> Result<DeployReport> {
        let tokenizer = read_blob(Blob::Tokenizer, tokenizer)?;
        let model = read_blob(Blob::Model, model)?;
        self.deploy(&tokenizer, &model).await
    }

    /// Upload both blobs, initialize, and wait until the host is ready.
    pub async fn deploy(&mut self, tokenizer: &[u8], model: &[u8]) -> Result<DeployReport> {
        let chunk_size = self
            .config
            .chunk_size()
            .ok_or(DeployError::InvalidChunkSize(self.config.chunk_size_mib))?;
        if tokenizer.is_empty() {
            return Err(DeployError::EmptySource { blob: Blob::Tokenizer });
        }
        if model.is_empty() {
            return Err(DeployError::EmptySource { blob: Blob::Model });
        }

        let model_config = self.preflight(model)?;
        self.check_health().await?;

        self.session = UploadSession::new();
        let tokenizer = self.upload_blob(Blob::Tokenizer, tokenizer, chunk_size).await?;
        let model = self.upload_blob(Blob::Model, model, chunk_size).await?;

        self.initialize().await?;
        let activation_wait = self.await_ready().await?;

        tracing::info!(
            "Deployment ready: tokenizer {} bytes, model {} bytes, activation took {:?}",
            tokenizer.bytes,
            model.bytes,
            activation_wait
        );
        Ok(DeployReport { tokenizer, model, activation_wait, model_config })
    }

    /// Refuse models that cannot serve the configured callers.
    fn preflight(&self, model: &[u8]) -> Result<Option<ModelConfig>> {
        let Some(check) = self.config.capacity else {
            return Ok(None);
        };
        let config = ModelConfig::from_bytes(model)?;
        let plan = CapacityPlan::new(config, check.callers);
        match plan.headroom(check.budget_bytes) {
            Some(headroom) => {
                tracing::info!(
                    callers = check.callers,
                    required = plan.total_bytes(),
                    headroom,
                    "capacity check passed"
                );
                Ok(Some(config))
            }
            None => Err(DeployError::WontFit {
                required: plan.total_bytes(),
                budget: check.budget_bytes,
            }),
        }
    }

    async fn check_health(&self) -> Result<()> {
        match timeout(self.config.ack_timeout(), self.host.is_healthy()).await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(DeployError::Unhealthy),
            Ok(Err(err)) => Err(DeployError::from_host("check health", err, DeployError::HealthCheck)),
            Err(_) => Err(DeployError::HealthCheck(HostError::Transport(format!(
                "no answer within {:?}",
                self.config.ack_timeout()
            )))),
        }
    }

    async fn upload_blob(&mut self, blob: Blob, data: &[u8], chunk_size: ChunkSize) -> Result<BlobReport> {
        self.session.admit_reset(blob)?;
        let ack = self.config.ack_timeout();

        let reset = match blob {
            Blob::Tokenizer => acked(ack, blob, 0, "reset tokenizer", self.host.reset_tokenizer()).await,
            Blob::Model => acked(ack, blob, 0, "reset model", self.host.reset_model()).await,
        };
        if let Err(err) = reset {
            self.session.blob_mut(blob).abort();
            return Err(err);
        }
        self.session.reset(blob, data.len())?;

        let total = chunk_size.chunk_count(data.len());
        tracing::info!("Uploading {} ({} bytes in {} chunks)", blob, data.len(), total);

        for chunk in chunks(data, chunk_size) {
            self.session.blob(blob).admit(chunk.bytes.len())?;
            let sent = match blob {
                Blob::Tokenizer => {
                    acked(ack, blob, chunk.offset, "upload tokenizer", self.host.upload_tokenizer_chunk(chunk.bytes))
                        .await
                }
                Blob::Model => {
                    acked(ack, blob, chunk.offset, "upload model", self.host.upload_model_chunk(chunk.bytes)).await
                }
            };
            if let Err(err) = sent {
                let offset = self.session.blob_mut(blob).abort();
                tracing::warn!(%blob, offset, "upload aborted: {}", err);
                return Err(err);
            }
            self.session.blob_mut(blob).advance(chunk.bytes.len())?;
            tracing::info!(
                "{} chunk {}/{}: {} bytes, {:.1}% sent",
                blob,
                chunk.index + 1,
                total,
                chunk.bytes.len(),
                chunk.end() as f64 * 100.0 / data.len() as f64
            );
        }

        Ok(BlobReport { bytes: data.len(), chunks: total })
    }

    async fn initialize(&mut self) -> Result<()> {
        self.session.admit_initialize()?;
        let deadline = self.config.ack_timeout();
        match timeout(deadline, self.host.initialize()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                return Err(DeployError::from_host("initialize", err, DeployError::InitializeRejected))
            }
            Err(_) => return Err(DeployError::ActivationTimeout { waited: deadline }),
        }
        self.session.mark_initialized()?;
        tracing::debug!("initialize acknowledged");
        Ok(())
    }

    /// Poll `is_ready` until it reports true or the ready deadline passes.
    async fn await_ready(&mut self) -> Result<Duration> {
        let started = Instant::now();
        let deadline = started + self.config.ready_timeout();
        let mut polls = 0u32;

        loop {
            polls += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, self.host.is_ready()).await {
                Ok(Ok(true)) => break,
                Ok(Ok(false)) => {}
                Ok(Err(err)) => {
                    return Err(DeployError::from_host("poll readiness", err, DeployError::ReadinessCheck))
                }
                Err(_) => return Err(DeployError::ActivationTimeout { waited: started.elapsed() }),
            }
            tracing::trace!("not ready after {} polls", polls);

            let next = Instant::now() + self.config.poll_interval();
            if next >= deadline {
                tokio::time::sleep_until(deadline).await;
                return Err(DeployError::ActivationTimeout { waited: started.elapsed() });
            }
            tokio::time::sleep_until(next).await;
        }

        self.session.mark_ready()?;
        Ok(started.elapsed())
    }
}
