use crate::domain::ServiceInstance;
use serde_json::Value as JsonValue;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::RwLock;
use tracing::warn;

/// Lifecycle notifications emitted by the registry engine after the
/// corresponding state change has been committed. Payloads are value
/// copies; subscribers can hold them freely.
#[derive(Clone, Debug)]
pub enum RegistryEvent {
    InstanceRegistered {
        instance: ServiceInstance,
    },
    InstanceRemoved {
        instance: ServiceInstance,
    },
    HealthCheckPassed {
        instance: ServiceInstance,
        body: JsonValue,
    },
    HealthCheckFailed {
        instance: ServiceInstance,
    },
}

impl RegistryEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryEvent::InstanceRegistered { .. } => "instance_registered",
            RegistryEvent::InstanceRemoved { .. } => "instance_removed",
            RegistryEvent::HealthCheckPassed { .. } => "health_check_passed",
            RegistryEvent::HealthCheckFailed { .. } => "health_check_failed",
        }
    }

    pub fn instance(&self) -> &ServiceInstance {
        match self {
            RegistryEvent::InstanceRegistered { instance }
            | RegistryEvent::InstanceRemoved { instance }
            | RegistryEvent::HealthCheckPassed { instance, .. }
            | RegistryEvent::HealthCheckFailed { instance } => instance,
        }
    }
}

type Subscriber = Box<dyn Fn(&RegistryEvent) + Send + Sync>;

/// Synchronous fan-out of registry events, in emission order.
///
/// Subscription is expected at startup only. A panicking subscriber is
/// isolated and logged; it never rolls back the state change that
/// triggered the event.
#[derive(Default)]
pub struct EventChannel {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        let mut guard = self
            .subscribers
            .write()
            .expect("event channel lock poisoned");
        guard.push(Box::new(subscriber));
    }

    pub fn emit(&self, event: &RegistryEvent) {
        let guard = self
            .subscribers
            .read()
            .expect("event channel lock poisoned");
        for subscriber in guard.iter() {
            if catch_unwind(AssertUnwindSafe(|| subscriber(event))).is_err() {
                warn!(
                    event = event.kind(),
                    instance = %event.instance().id,
                    "event subscriber panicked; continuing"
                );
            }
        }
    }
}
