use crate::config::HealthCheckConfig;
use crate::domain::ServiceInstance;
use crate::health::probe::{HealthProber, ProbeError};
use crate::registry::engine::{ProbeOutcome, RegistryEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives the periodic probing of every registered instance and feeds the
/// outcomes back into the engine.
///
/// One cycle: snapshot the registry, walk it in sequential batches, walk
/// each batch in sequential chunks, probe each chunk concurrently and drain
/// it fully before the next chunk starts. The next cycle is scheduled
/// `interval` after the previous one completed.
pub struct HealthSupervisor {
    engine: Arc<RegistryEngine>,
    prober: Arc<dyn HealthProber>,
    config: HealthCheckConfig,
}

impl HealthSupervisor {
    pub fn new(
        engine: Arc<RegistryEngine>,
        prober: Arc<dyn HealthProber>,
        config: HealthCheckConfig,
    ) -> Self {
        Self {
            engine,
            prober,
            config,
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(self, shutdown: CancellationToken) {
        if !self.config.enabled {
            info!("health checking disabled by configuration");
            return;
        }

        info!(
            interval_ms = self.config.interval_ms,
            batch_size = self.config.batch_size,
            max_concurrent = self.config.max_concurrent,
            ttl_ms = self.config.ttl_ms,
            "health supervisor started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.config.interval()) => {}
            }
            self.run_cycle(&shutdown).await;
            if shutdown.is_cancelled() {
                break;
            }
        }

        info!("health supervisor stopped");
    }

    /// One full pass over the current registry snapshot. Instances
    /// registered after the snapshot wait for the next cycle; instances
    /// unregistered mid-cycle resolve to index no-ops.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) {
        let snapshot = self.engine.all_instances();
        if snapshot.is_empty() {
            debug!("health cycle skipped, no registered instances");
            return;
        }

        debug!(instances = snapshot.len(), "health cycle started");

        let batch_size = self.config.batch_size.max(1);
        let chunk_size = self.config.max_concurrent.max(1);

        for batch in snapshot.chunks(batch_size) {
            for chunk in batch.chunks(chunk_size) {
                if self.probe_chunk(chunk, shutdown).await.is_err() {
                    debug!("health cycle aborted by shutdown");
                    return;
                }
            }
        }

        debug!(instances = snapshot.len(), "health cycle finished");
    }

    /// Probes every instance of the chunk concurrently and waits for all of
    /// them. Returns `Err(())` when cancelled, with all in-flight probes
    /// aborted.
    async fn probe_chunk(
        &self,
        chunk: &[ServiceInstance],
        shutdown: &CancellationToken,
    ) -> Result<(), ()> {
        let mut probes = JoinSet::new();
        let ttl = self.config.ttl();

        for instance in chunk {
            let prober = Arc::clone(&self.prober);
            let instance = instance.clone();
            probes.spawn(async move {
                let outcome = probe_one(prober.as_ref(), &instance, ttl).await;
                (instance, outcome)
            });
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    probes.abort_all();
                    while probes.join_next().await.is_some() {}
                    return Err(());
                }
                joined = probes.join_next() => match joined {
                    None => return Ok(()),
                    Some(Ok((instance, outcome))) => {
                        self.engine.record_probe_outcome(&instance, outcome);
                    }
                    Some(Err(join_err)) => {
                        if join_err.is_panic() {
                            warn!(error = %join_err, "health probe task panicked");
                        }
                    }
                },
            }
        }
    }
}

async fn probe_one(
    prober: &dyn HealthProber,
    instance: &ServiceInstance,
    ttl: Duration,
) -> ProbeOutcome {
    match timeout(ttl, prober.probe(instance)).await {
        Ok(Ok(body)) => ProbeOutcome::Passed { body },
        Ok(Err(err)) => {
            debug!(
                instance = %instance.id,
                address = %instance.address(),
                error = %err,
                "health probe failed"
            );
            ProbeOutcome::Failed
        }
        Err(_elapsed) => {
            debug!(
                instance = %instance.id,
                address = %instance.address(),
                error = %ProbeError::TimedOut,
                "health probe failed"
            );
            ProbeOutcome::Failed
        }
    }
}
