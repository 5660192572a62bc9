use crate::app_state::AppState;
use crate::config::BeaconConfig;
use crate::error::{Context, Result};
use crate::health::{HealthSupervisor, HttpHealthProber};
use crate::registry::{RegistryEngine, RegistryEvent};
use crate::transport;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const FORCED_EXIT_GRACE: Duration = Duration::from_secs(10);

pub struct BeaconApp {
    state: AppState,
    supervisor: HealthSupervisor,
    listen_addr: SocketAddr,
}

impl BeaconApp {
    pub async fn initialise(config: BeaconConfig) -> Result<Self> {
        config.validate()?;
        let registration_key = config
            .registration_key
            .clone()
            .ok_or_else(|| crate::err!("registration key missing after validation"))?;

        let engine = Arc::new(RegistryEngine::new(registration_key));
        engine.subscribe(log_lifecycle_event);

        let prober = Arc::new(HttpHealthProber::new(&config.health)?);
        let supervisor =
            HealthSupervisor::new(Arc::clone(&engine), prober, config.health.clone());

        let listen_addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port)
            .parse()
            .with_context(|| {
                format!(
                    "invalid listen address {}:{}",
                    config.http.host, config.http.port
                )
            })?;

        if config.admin_key.is_none() {
            warn!("no admin key configured; admin endpoints will reject every request");
        }

        Ok(Self {
            state: AppState {
                engine,
                admin_key: config.admin_key,
                shutdown: CancellationToken::new(),
            },
            supervisor,
            listen_addr,
        })
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            state,
            supervisor,
            listen_addr,
        } = self;
        let shutdown = state.shutdown.clone();

        let listener = TcpListener::bind(listen_addr)
            .await
            .with_context(|| format!("failed to bind registry listener on {listen_addr}"))?;
        info!("registry listening on {listen_addr}");

        let mut supervisor_task = supervisor.spawn(shutdown.clone());

        let server_state = state.clone();
        let server_shutdown = shutdown.clone();
        let mut server_task =
            tokio::spawn(
                async move { transport::serve(listener, server_state, server_shutdown).await },
            );

        tokio::select! {
            res = &mut server_task => {
                warn!("registry server task terminated unexpectedly");
                shutdown.cancel();
                state.engine.dispose();
                let _ = (&mut supervisor_task).await;
                return match res {
                    Ok(result) => result,
                    Err(join_err) => Err(crate::err!("registry server join error: {join_err}")),
                };
            }
            _ = shutdown.cancelled() => {
                info!("shutdown initiated");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
            }
        }

        shutdown.cancel();
        state.engine.dispose();

        let graceful = async {
            match (&mut server_task).await {
                Ok(result) => result?,
                Err(join_err) => {
                    return Err(crate::err!("registry server join error: {join_err}"))
                }
            }
            if let Err(join_err) = (&mut supervisor_task).await {
                if join_err.is_panic() {
                    warn!(error = %join_err, "health supervisor task panicked during shutdown");
                }
            }
            Ok::<(), crate::error::Error>(())
        };

        match timeout(FORCED_EXIT_GRACE, graceful).await {
            Ok(result) => {
                result?;
                info!("registry stopped");
                Ok(())
            }
            Err(_) => {
                error!(
                    timeout_secs = FORCED_EXIT_GRACE.as_secs(),
                    "graceful shutdown timed out; forcing exit"
                );
                server_task.abort();
                supervisor_task.abort();
                Err(crate::err!(
                    "graceful shutdown timed out after {:?}",
                    FORCED_EXIT_GRACE
                ))
            }
        }
    }
}

/// Startup-time subscriber exercising the lifecycle event hook.
fn log_lifecycle_event(event: &RegistryEvent) {
    let instance = event.instance();
    debug!(
        target: "beacon::lifecycle",
        event = event.kind(),
        instance = %instance.id,
        service_type = %instance.service_type,
        healthy = instance.healthy,
        "lifecycle event"
    );
}
