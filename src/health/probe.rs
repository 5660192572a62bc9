use crate::config::HealthCheckConfig;
use crate::domain::ServiceInstance;
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid probe url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("probe request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("probe returned status {status}")]
    UnexpectedStatus { status: u16 },
    #[error("probe body is not a JSON object")]
    MalformedBody,
    #[error("probe timed out")]
    TimedOut,
}

/// One health check against a single instance. Implementations must
/// resolve within the supervisor's ttl or be cancelled by it.
#[async_trait]
pub trait HealthProber: Send + Sync {
    async fn probe(&self, instance: &ServiceInstance) -> Result<JsonValue, ProbeError>;
}

/// Probes `{scheme}://{host}:{port}/health` and passes on a 2xx status
/// whose body parses as a JSON object.
pub struct HttpHealthProber {
    client: reqwest::Client,
    scheme: String,
}

impl HttpHealthProber {
    pub fn new(config: &HealthCheckConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.ttl())
            .build()
            .map_err(|err| crate::err!("failed to construct health probe client: {err}"))?;

        Ok(Self {
            client,
            scheme: config.scheme.clone(),
        })
    }

    fn probe_url(&self, instance: &ServiceInstance) -> Result<Url, ProbeError> {
        let raw = format!(
            "{}://{}:{}/health",
            self.scheme, instance.host, instance.port
        );
        Url::parse(&raw).map_err(|err| ProbeError::InvalidUrl {
            url: raw,
            reason: err.to_string(),
        })
    }
}

#[async_trait]
impl HealthProber for HttpHealthProber {
    async fn probe(&self, instance: &ServiceInstance) -> Result<JsonValue, ProbeError> {
        // A malformed address never reaches the network.
        let url = self.probe_url(instance)?;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let body: JsonValue = response
            .json()
            .await
            .map_err(|_| ProbeError::MalformedBody)?;
        if !body.is_object() {
            return Err(ProbeError::MalformedBody);
        }

        Ok(body)
    }
}
