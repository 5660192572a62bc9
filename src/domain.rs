#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single registered service instance as seen by callers.
///
/// The instance token is deliberately NOT part of this record: it lives in
/// the credential vault so it can never leak through lookups, events, or
/// serialized responses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    pub id: String,
    pub service_type: String,
    pub host: String,
    pub port: String,
    /// Wall-clock milliseconds at registration.
    pub created: i64,
    /// Wall-clock milliseconds of the last state-affecting event.
    pub last_updated: i64,
    pub healthy: bool,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl ServiceInstance {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Caller-supplied input to `register`, before ids and credentials exist.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub service_type: String,
    pub host: String,
    pub port: String,
    pub meta: BTreeMap<String, String>,
}

impl RegistrationRequest {
    pub fn new(
        service_type: impl Into<String>,
        host: impl Into<String>,
        port: impl Into<String>,
    ) -> Self {
        Self {
            service_type: service_type.into(),
            host: host.into(),
            port: port.into(),
            meta: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

/// Credentials handed back from a successful registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationReceipt {
    pub id: String,
    pub token: String,
}
