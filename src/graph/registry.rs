//! Keyed collection of open graphs, modeled on the storage engine's
//! name-to-instance table (grounded on `storage_engine::StorageEngine`'s
//! `databases: HashMap<String, Arc<RwLock<Database>>>`).

use super::Graph;
use crate::matrix::MatrixSyncPolicy;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("graph '{0}' already exists")]
    AlreadyExists(String),
    #[error("no graph named '{0}'")]
    NotFound(String),
}

/// Registry of open graphs, keyed by name. Each graph carries its own lock,
/// so two graphs may be accessed concurrently without contending on the
/// registry; the registry's own map is guarded separately so opening one
/// graph never blocks access to another.
#[derive(Default)]
pub struct GraphRegistry {
    graphs: parking_lot::RwLock<HashMap<String, Arc<Graph>>>,
}

impl GraphRegistry {
    pub fn new() -> Self {
        GraphRegistry { graphs: parking_lot::RwLock::new(HashMap::new()) }
    }

    pub fn create_graph(
        &self,
        name: &str,
        sync_policy: MatrixSyncPolicy,
    ) -> Result<Arc<Graph>, RegistryError> {
        let mut graphs = self.graphs.write();
        if graphs.contains_key(name) {
            return Err(RegistryError::AlreadyExists(name.to_string()));
        }
        let graph = Arc::new(Graph::new(name, sync_policy));
        graphs.insert(name.to_string(), Arc::clone(&graph));
        Ok(graph)
    }

    pub fn get_graph(&self, name: &str) -> Result<Arc<Graph>, RegistryError> {
        self.graphs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn drop_graph(&self, name: &str) -> Result<(), RegistryError> {
        self.graphs
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn list_graphs(&self) -> Vec<String> {
        let mut names: Vec<String> = self.graphs.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_round_trips() {
        let registry = GraphRegistry::new();
        registry.create_graph("g1", MatrixSyncPolicy::default()).unwrap();
        let graph = registry.get_graph("g1").unwrap();
        assert_eq!(graph.name(), "g1");
    }

    #[test]
    fn create_twice_fails() {
        let registry = GraphRegistry::new();
        registry.create_graph("g1", MatrixSyncPolicy::default()).unwrap();
        let err = registry.create_graph("g1", MatrixSyncPolicy::default()).unwrap_err();
        assert_eq!(err, RegistryError::AlreadyExists("g1".to_string()));
    }

    #[test]
    fn drop_removes_from_list() {
        let registry = GraphRegistry::new();
        registry.create_graph("g1", MatrixSyncPolicy::default()).unwrap();
        registry.create_graph("g2", MatrixSyncPolicy::default()).unwrap();
        registry.drop_graph("g1").unwrap();
        assert_eq!(registry.list_graphs(), vec!["g2".to_string()]);
    }

    #[test]
    fn get_unknown_graph_errors() {
        let registry = GraphRegistry::new();
        let err = registry.get_graph("missing").unwrap_err();
        assert_eq!(err, RegistryError::NotFound("missing".to_string()));
    }
}
