//! Worker registry
//!
//! Maps worker names to implementations. Built once at process start and
//! shared immutably across runs.

use crate::worker::{Worker, WorkerDescriptor};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of all analysis workers (name -> worker)
#[derive(Default, Clone)]
pub struct WorkerRegistry {
    workers: HashMap<String, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker under its own name
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn register(&mut self, worker: Arc<dyn Worker>) {
        let name = worker.name().to_string();
        if self.workers.insert(name.clone(), worker).is_some() {
            tracing::warn!(worker = %name, "Replacing previously registered worker");
        }
    }

    /// Look up a worker by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Worker>> {
        self.workers.get(name).cloned()
    }

    /// Sorted list of registered worker names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Sorted name/description pairs for the strategy resolver and the API
    pub fn descriptors(&self) -> Vec<WorkerDescriptor> {
        let mut descriptors: Vec<WorkerDescriptor> = self
            .workers
            .values()
            .map(|worker| WorkerDescriptor {
                name: worker.name().to_string(),
                description: worker.description().to_string(),
            })
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Number of registered workers
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("workers", &self.names())
            .finish()
    }
}
