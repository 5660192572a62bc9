use crate::domain::ServiceInstance;
use std::collections::{BTreeSet, HashMap};

/// The two coupled lookup structures at the heart of the registry.
///
/// `instances` holds every registered record, healthy or not. `by_type`
/// holds only the ids of currently healthy instances, grouped by service
/// type. Every mutation keeps the two in lockstep; synchronization is the
/// engine's job, not this struct's.
#[derive(Debug, Default)]
pub struct DualIndex {
    instances: HashMap<String, ServiceInstance>,
    by_type: HashMap<String, BTreeSet<String>>,
}

impl DualIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Precondition: `record.id` is absent. Minted ids are unique per
    /// process lifetime, so a collision here is a caller bug.
    pub fn insert(&mut self, record: ServiceInstance) {
        debug_assert!(
            !self.instances.contains_key(&record.id),
            "duplicate instance id"
        );
        if record.healthy {
            self.by_type
                .entry(record.service_type.clone())
                .or_default()
                .insert(record.id.clone());
        }
        self.instances.insert(record.id.clone(), record);
    }

    /// Idempotent. Returns the removed record so callers can emit it.
    pub fn remove(&mut self, id: &str) -> Option<ServiceInstance> {
        let record = self.instances.remove(id)?;
        if let Some(ids) = self.by_type.get_mut(&record.service_type) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_type.remove(&record.service_type);
            }
        }
        Some(record)
    }

    /// Returns `true` only when the record existed and flipped state.
    pub fn mark_unhealthy(&mut self, id: &str, now_ms: i64) -> bool {
        let Some(record) = self.instances.get_mut(id) else {
            return false;
        };
        if !record.healthy {
            return false;
        }
        record.healthy = false;
        record.last_updated = now_ms;
        let service_type = record.service_type.clone();
        if let Some(ids) = self.by_type.get_mut(&service_type) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_type.remove(&service_type);
            }
        }
        true
    }

    /// Returns `true` only when the record existed and flipped state.
    pub fn mark_healthy(&mut self, id: &str, now_ms: i64) -> bool {
        let Some(record) = self.instances.get_mut(id) else {
            return false;
        };
        if record.healthy {
            return false;
        }
        record.healthy = true;
        record.last_updated = now_ms;
        self.by_type
            .entry(record.service_type.clone())
            .or_default()
            .insert(id.to_string());
        true
    }

    pub fn get(&self, id: &str) -> Option<&ServiceInstance> {
        self.instances.get(id)
    }

    /// Snapshot of the healthy instances of a type. Copies, never borrows
    /// into the index.
    pub fn list_by_type(&self, service_type: &str) -> Vec<ServiceInstance> {
        match self.by_type.get(service_type) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| self.instances.get(id))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Snapshot of every registered record, healthy or not.
    pub fn list_all(&self) -> Vec<ServiceInstance> {
        self.instances.values().cloned().collect()
    }

    /// Raw contents of the healthy-id set for a type. Exposed so invariant
    /// checks can observe the set without going through record resolution.
    pub fn healthy_ids(&self, service_type: &str) -> Vec<String> {
        match self.by_type.get(service_type) {
            Some(ids) => ids.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Number of service types with at least one healthy instance.
    pub fn service_type_count(&self) -> usize {
        self.by_type.len()
    }

    pub fn clear(&mut self) {
        self.instances.clear();
        self.by_type.clear();
    }
}
