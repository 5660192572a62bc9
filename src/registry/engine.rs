use crate::domain::{RegistrationReceipt, RegistrationRequest, ServiceInstance};
use crate::registry::credentials::{self, CredentialVault};
use crate::registry::events::{EventChannel, RegistryEvent};
use crate::registry::index::DualIndex;
use chrono::Utc;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registration key rejected")]
    Authentication,
    #[error("invalid registration request: {reason}")]
    Validation { reason: String },
    #[error("registry engine is disposed")]
    Disposed,
}

/// Result of a single health probe, as fed back by the supervisor.
#[derive(Clone, Debug)]
pub enum ProbeOutcome {
    Passed { body: JsonValue },
    Failed,
}

/// Single owner of the dual index and the credential vault.
///
/// Mutations (`register`, `unregister`, `record_probe_outcome`, `dispose`,
/// `init`) are serialized by `mutate` and never suspend. Events are emitted
/// after the index write lock is released but while `mutate` is still held,
/// so emission order equals commit order and subscribers can re-enter the
/// lookup API from their handlers.
pub struct RegistryEngine {
    vault: CredentialVault,
    events: EventChannel,
    index: RwLock<DualIndex>,
    mutate: Mutex<()>,
    disposed: AtomicBool,
}

impl RegistryEngine {
    pub fn new(registration_key: impl Into<String>) -> Self {
        Self {
            vault: CredentialVault::new(registration_key),
            events: EventChannel::new(),
            index: RwLock::new(DualIndex::new()),
            mutate: Mutex::new(()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Registers an event subscriber. Expected at startup only.
    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(subscriber);
    }

    pub fn register(
        &self,
        request: RegistrationRequest,
        presented_key: &str,
    ) -> Result<RegistrationReceipt, RegistryError> {
        let _serial = self.mutate.lock().expect("mutation lock poisoned");
        self.ensure_running()?;

        if !self.vault.verify_registration_key(presented_key) {
            return Err(RegistryError::Authentication);
        }
        validate_request(&request)?;

        let id = credentials::mint_id();
        let token = credentials::mint_token();
        let now = now_ms();
        let record = ServiceInstance {
            id: id.clone(),
            service_type: request.service_type,
            host: request.host,
            port: request.port,
            created: now,
            last_updated: now,
            healthy: true,
            meta: request.meta,
        };

        {
            let mut index = self.index.write().expect("index lock poisoned");
            index.insert(record.clone());
        }
        self.vault.bind(&id, &token);

        info!(
            instance = %id,
            service_type = %record.service_type,
            address = %record.address(),
            "instance registered"
        );
        self.events
            .emit(&RegistryEvent::InstanceRegistered { instance: record });

        Ok(RegistrationReceipt { id, token })
    }

    /// Idempotent; unknown ids succeed silently.
    pub fn unregister(&self, id: &str) -> Result<(), RegistryError> {
        let _serial = self.mutate.lock().expect("mutation lock poisoned");
        self.ensure_running()?;

        let removed = {
            let mut index = self.index.write().expect("index lock poisoned");
            index.remove(id)
        };

        if let Some(record) = removed {
            self.vault.revoke(id);
            info!(
                instance = %id,
                service_type = %record.service_type,
                "instance removed"
            );
            self.events
                .emit(&RegistryEvent::InstanceRemoved { instance: record });
        }

        Ok(())
    }

    /// Returns the record regardless of health.
    pub fn instance_by_id(&self, id: &str) -> Option<ServiceInstance> {
        self.index
            .read()
            .expect("index lock poisoned")
            .get(id)
            .cloned()
    }

    /// Snapshot of the healthy instances of a type; empty when none.
    pub fn instances_by_type(&self, service_type: &str) -> Vec<ServiceInstance> {
        self.index
            .read()
            .expect("index lock poisoned")
            .list_by_type(service_type)
    }

    /// Snapshot of every registered record; the health supervisor cycles
    /// over this.
    pub fn all_instances(&self) -> Vec<ServiceInstance> {
        self.index.read().expect("index lock poisoned").list_all()
    }

    pub fn instance_count(&self) -> usize {
        self.index
            .read()
            .expect("index lock poisoned")
            .instance_count()
    }

    pub fn service_type_count(&self) -> usize {
        self.index
            .read()
            .expect("index lock poisoned")
            .service_type_count()
    }

    /// Constant-time token check against the vault binding. The binding
    /// exists exactly as long as the record does.
    pub fn validate_instance_auth(&self, id: &str, presented_token: &str) -> bool {
        self.vault.validate(id, presented_token)
    }

    /// Applies a probe result. Transitions are edge-triggered: a repeat
    /// outcome leaves the index untouched but still emits its event. An id
    /// unregistered since the cycle snapshot is a no-op on the index; the
    /// event then carries the caller's snapshot copy.
    pub fn record_probe_outcome(&self, snapshot: &ServiceInstance, outcome: ProbeOutcome) {
        let _serial = self.mutate.lock().expect("mutation lock poisoned");
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        let now = now_ms();
        let (changed, current) = {
            let mut index = self.index.write().expect("index lock poisoned");
            let changed = match outcome {
                ProbeOutcome::Passed { .. } => index.mark_healthy(&snapshot.id, now),
                ProbeOutcome::Failed => index.mark_unhealthy(&snapshot.id, now),
            };
            (changed, index.get(&snapshot.id).cloned())
        };
        let instance = current.unwrap_or_else(|| snapshot.clone());

        match outcome {
            ProbeOutcome::Passed { body } => {
                if changed {
                    info!(
                        instance = %instance.id,
                        service_type = %instance.service_type,
                        "instance recovered"
                    );
                }
                self.events
                    .emit(&RegistryEvent::HealthCheckPassed { instance, body });
            }
            ProbeOutcome::Failed => {
                if changed {
                    warn!(
                        instance = %instance.id,
                        service_type = %instance.service_type,
                        address = %instance.address(),
                        "instance marked unhealthy"
                    );
                }
                self.events
                    .emit(&RegistryEvent::HealthCheckFailed { instance });
            }
        }
    }

    /// Stops the engine and empties it. Idempotent. No event fires after
    /// this returns.
    pub fn dispose(&self) {
        let _serial = self.mutate.lock().expect("mutation lock poisoned");
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut index = self.index.write().expect("index lock poisoned");
            index.clear();
        }
        self.vault.clear();
        info!("registry engine disposed");
    }

    /// Rehydrates a disposed engine into an empty running one.
    pub fn init(&self) {
        let _serial = self.mutate.lock().expect("mutation lock poisoned");
        if self.disposed.swap(false, Ordering::SeqCst) {
            info!("registry engine reinitialised");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<(), RegistryError> {
        if self.disposed.load(Ordering::SeqCst) {
            Err(RegistryError::Disposed)
        } else {
            Ok(())
        }
    }
}

fn validate_request(request: &RegistrationRequest) -> Result<(), RegistryError> {
    if request.service_type.trim().is_empty() {
        return Err(RegistryError::Validation {
            reason: "serviceType must be a non-empty string".to_string(),
        });
    }
    if request.host.trim().is_empty() {
        return Err(RegistryError::Validation {
            reason: "host must be a non-empty string".to_string(),
        });
    }
    if request.port.is_empty() || !request.port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RegistryError::Validation {
            reason: format!("port must be a non-empty numeric string, found `{}`", request.port),
        });
    }
    Ok(())
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
