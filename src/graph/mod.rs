//! # Graph Facade
//!
//! Aggregates the node/edge stores and the label/relation/adjacency
//! delta-matrices behind a single writer-preferring lock (spec.md §4.3).

mod error;
mod lock;
mod registry;

pub use error::{GraphError, GraphResult};
pub use lock::{GraphLock, ReadGuard, WriteGuard};
pub use registry::{GraphRegistry, RegistryError};

use crate::entity::{Edge, EntityId, EntityStore, LabelId, Node};
use crate::matrix::{DeltaMatrix, MatrixSyncPolicy};
use crate::value::AttributeSet;
use std::collections::{BTreeMap, HashMap};

/// A relation-matrix cell either holds a direct edge id, or — once a second
/// edge shares the same `(src, dest)` pair under the same relation — an
/// index into the `multi_edges` arena holding the full id list. This
/// replaces the source's top-bit tagged pointer with a proper sum type
/// (spec.md §9 "Multi-edge encoding").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeSlot {
    Single(EntityId),
    Multi(EntityId),
}

/// The mutable state guarded by a [`Graph`]'s lock: stores, matrices, and
/// the multi-edge arena.
#[derive(Debug)]
pub struct GraphData {
    node_store: EntityStore<Node>,
    edge_store: EntityStore<Edge>,
    label_matrices: HashMap<LabelId, DeltaMatrix<bool>>,
    relation_matrices: HashMap<LabelId, DeltaMatrix<EdgeSlot>>,
    multi_edges: EntityStore<Vec<EntityId>>,
    adjacency_matrix: DeltaMatrix<bool>,
    /// Number of distinct relations with a present cell at `(src, dest)`;
    /// the adjacency matrix is the boolean OR of every relation matrix, so
    /// a cell only clears once its last contributing relation does.
    adjacency_refcount: BTreeMap<(EntityId, EntityId), u32>,
    sync_policy: MatrixSyncPolicy,
}

impl GraphData {
    pub fn new(sync_policy: MatrixSyncPolicy) -> Self {
        GraphData {
            node_store: EntityStore::new(),
            edge_store: EntityStore::new(),
            label_matrices: HashMap::new(),
            relation_matrices: HashMap::new(),
            multi_edges: EntityStore::new(),
            adjacency_matrix: DeltaMatrix::new(0, 0),
            adjacency_refcount: BTreeMap::new(),
            sync_policy,
        }
    }

    /// Pre-sized for snapshot decode (spec.md §4.6 "the decoder
    /// pre-allocates node and edge stores... to final sizes" on the first
    /// virtual key). Matrices themselves grow lazily via `ensure_capacity`
    /// as entities are restored, under `MatrixSyncPolicy::Resize`.
    pub fn with_capacity_hint(node_hint: usize, edge_hint: usize) -> Self {
        GraphData {
            node_store: EntityStore::with_capacity(node_hint),
            edge_store: EntityStore::with_capacity(edge_hint),
            label_matrices: HashMap::new(),
            relation_matrices: HashMap::new(),
            multi_edges: EntityStore::new(),
            adjacency_matrix: DeltaMatrix::new(0, 0),
            adjacency_refcount: BTreeMap::new(),
            sync_policy: MatrixSyncPolicy::Resize,
        }
    }

    pub fn sync_policy(&self) -> MatrixSyncPolicy {
        self.sync_policy
    }

    pub fn set_sync_policy(&mut self, policy: MatrixSyncPolicy) {
        self.sync_policy = policy;
    }

    pub fn node_store(&self) -> &EntityStore<Node> {
        &self.node_store
    }

    pub fn edge_store(&self) -> &EntityStore<Edge> {
        &self.edge_store
    }

    pub fn label_matrix(&self, label: LabelId) -> Option<&DeltaMatrix<bool>> {
        self.label_matrices.get(&label)
    }

    pub fn relation_matrix(&self, relation: LabelId) -> Option<&DeltaMatrix<EdgeSlot>> {
        self.relation_matrices.get(&relation)
    }

    pub fn adjacency_matrix(&self) -> &DeltaMatrix<bool> {
        &self.adjacency_matrix
    }

    /// Resolve a `Multi` relation-matrix slot into its arena-backed id list.
    /// `Single` slots carry their one id directly; callers branch on the
    /// slot before reaching for this.
    pub fn multi_edge_ids(&self, arena_idx: EntityId) -> &[EntityId] {
        self.multi_edges.get(arena_idx).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct labels with a matrix allocated (spec.md §4.6
    /// snapshot header "label-matrix count").
    pub fn label_count(&self) -> usize {
        self.label_matrices.len()
    }

    /// Relations with a matrix allocated, in an order stable enough for one
    /// `encode`/`decode` pair (not across separate encode calls, since
    /// `HashMap` iteration order is unspecified; the snapshot header's
    /// relation list and the `GRAPH_SCHEMA` payload are written from the
    /// same iterator within a single `encode_graph` call).
    pub fn relation_labels(&self) -> impl Iterator<Item = LabelId> + '_ {
        self.relation_matrices.keys().copied()
    }

    /// True if any cell of `relation`'s matrix holds a [`EdgeSlot::Multi`]
    /// slot (spec.md §4.6 snapshot header "per-relation multi-edge flag").
    pub fn relation_is_multi(&self, relation: LabelId) -> bool {
        let Some(matrix) = self.relation_matrices.get(&relation) else {
            return false;
        };
        if matrix.nrows() == 0 {
            return false;
        }
        let Ok(iter) = matrix.attach_range(0, matrix.nrows() - 1) else {
            return false;
        };
        iter.into_iter().any(|(_, _, slot)| matches!(slot, EdgeSlot::Multi(_)))
    }

    /// Restore a node at its exact snapshot id, growing stores/matrices as
    /// needed (spec.md §4.6 decoder behavior). Does not go through
    /// `create_node`'s id-allocation path — the id is fixed by the
    /// snapshot.
    pub fn restore_node(&mut self, id: EntityId, node: Node) {
        let labels = node.labels.clone();
        self.node_store.insert_at(id, node);
        self.ensure_capacity();
        for label in &labels {
            let n = self.node_store.capacity();
            let matrix = self.label_matrices.entry(*label).or_insert_with(|| DeltaMatrix::new(n, n));
            matrix.resize(n, n);
            matrix.set(id as usize, id as usize, true);
        }
    }

    /// Mark an id as deleted without a live occupant — used to restore the
    /// free-list layout exactly (spec.md §4.2/§4.6).
    pub fn restore_deleted_node(&mut self, id: EntityId) {
        self.node_store.insert_at(id, Node::new(id, Vec::new(), AttributeSet::new()));
        self.node_store.remove(id);
    }

    /// Restore an edge at its exact snapshot id (spec.md §4.6 decoder
    /// behavior), rebuilding the relation-matrix slot and adjacency
    /// refcount exactly as `create_edge` would, but without allocating a
    /// fresh id.
    pub fn restore_edge(&mut self, id: EntityId, edge: Edge) {
        let (src, dest, relation) = (edge.src, edge.dest, edge.relation);
        self.edge_store.insert_at(id, edge);
        self.ensure_capacity();

        let n = self.node_store.capacity();
        let matrix = self.relation_matrices.entry(relation).or_insert_with(|| DeltaMatrix::new(n, n));
        matrix.resize(n, n);

        let existing = matrix.get(src as usize, dest as usize).copied();
        let had_presence = existing.is_some();
        match existing {
            None => {
                matrix.set(src as usize, dest as usize, EdgeSlot::Single(id));
            }
            Some(EdgeSlot::Single(other)) => {
                let arena_idx = self.multi_edges.insert(vec![other, id]);
                let matrix = self.relation_matrices.get_mut(&relation).unwrap();
                matrix.set(src as usize, dest as usize, EdgeSlot::Multi(arena_idx));
            }
            Some(EdgeSlot::Multi(arena_idx)) => {
                let edges = self
                    .multi_edges
                    .get_mut(arena_idx)
                    .expect("multi-edge arena slot referenced by a live relation cell");
                edges.push(id);
            }
        }
        if !had_presence {
            self.incr_adjacency(src, dest);
        }
    }

    /// Mark an edge id as deleted without a live occupant, restoring the
    /// free-list layout exactly.
    pub fn restore_deleted_edge(&mut self, id: EntityId) {
        self.edge_store.insert_at(id, Edge::new(id, 0, 0, 0, AttributeSet::new()));
        self.edge_store.remove(id);
    }

    fn ensure_capacity(&mut self) {
        let n = self.node_store.capacity();
        self.adjacency_matrix.resize(n, n);
        for m in self.label_matrices.values_mut() {
            m.resize(n, n);
        }
        for m in self.relation_matrices.values_mut() {
            m.resize(n, n);
        }
    }

    fn incr_adjacency(&mut self, src: EntityId, dest: EntityId) {
        let count = self.adjacency_refcount.entry((src, dest)).or_insert(0);
        *count += 1;
        if *count == 1 {
            self.adjacency_matrix.set(src as usize, dest as usize, true);
        }
    }

    fn decr_adjacency(&mut self, src: EntityId, dest: EntityId) {
        if let Some(count) = self.adjacency_refcount.get_mut(&(src, dest)) {
            *count -= 1;
            if *count == 0 {
                self.adjacency_refcount.remove(&(src, dest));
                self.adjacency_matrix.clear(src as usize, dest as usize);
            }
        }
    }

    /// `create_node(labels, attrs) -> id`; stages the new row into every
    /// affected label matrix's `P⁺` (spec.md §4.3).
    pub fn create_node(&mut self, labels: Vec<LabelId>, attrs: AttributeSet) -> EntityId {
        let id = self.node_store.insert_with(|id| Node::new(id, labels.clone(), attrs));
        self.ensure_capacity();
        for label in &labels {
            let n = self.node_store.capacity();
            let matrix = self
                .label_matrices
                .entry(*label)
                .or_insert_with(|| DeltaMatrix::new(n, n));
            matrix.resize(n, n);
            matrix.set(id as usize, id as usize, true);
        }
        tracing::debug!(id, labels = labels.len(), "node_created");
        id
    }

    /// `create_edge(src, dest, rel, attrs) -> id`; inserts a direct id into
    /// an empty relation-matrix slot, upgrades a single id into a two-entry
    /// multi-edge array, or appends to an existing array (spec.md §4.3).
    pub fn create_edge(
        &mut self,
        src: EntityId,
        dest: EntityId,
        relation: LabelId,
        attrs: AttributeSet,
    ) -> GraphResult<EntityId> {
        if !self.node_store.contains(src) {
            return Err(GraphError::NoSuchNode(src));
        }
        if !self.node_store.contains(dest) {
            return Err(GraphError::NoSuchNode(dest));
        }

        let id = self
            .edge_store
            .insert_with(|id| Edge::new(id, src, dest, relation, attrs));
        self.ensure_capacity();

        let n = self.node_store.capacity();
        let matrix = self
            .relation_matrices
            .entry(relation)
            .or_insert_with(|| DeltaMatrix::new(n, n));
        matrix.resize(n, n);

        let existing = matrix.get(src as usize, dest as usize).copied();
        let had_presence = existing.is_some();
        match existing {
            None => {
                matrix.set(src as usize, dest as usize, EdgeSlot::Single(id));
            }
            Some(EdgeSlot::Single(other)) => {
                let arena_idx = self.multi_edges.insert(vec![other, id]);
                let matrix = self.relation_matrices.get_mut(&relation).unwrap();
                matrix.set(src as usize, dest as usize, EdgeSlot::Multi(arena_idx));
            }
            Some(EdgeSlot::Multi(arena_idx)) => {
                let edges = self
                    .multi_edges
                    .get_mut(arena_idx)
                    .expect("multi-edge arena slot referenced by a live relation cell");
                edges.push(id);
            }
        }

        if !had_presence {
            self.incr_adjacency(src, dest);
        }
        tracing::debug!(id, src, dest, relation, "edge_created");
        Ok(id)
    }

    /// `delete_node(id)`: tombstones the node and masks its label-matrix
    /// diagonal entries. Does not cascade to incident edges — the caller is
    /// expected to have removed those first (spec.md §4.3 scopes the
    /// facade to per-matrix overlay bookkeeping, not query-level cascade
    /// semantics).
    pub fn delete_node(&mut self, id: EntityId) -> GraphResult<()> {
        let node = self.node_store.remove(id).ok_or(GraphError::NoSuchNode(id))?;
        for label in &node.labels {
            if let Some(matrix) = self.label_matrices.get_mut(label) {
                matrix.clear(id as usize, id as usize);
            }
        }
        tracing::debug!(id, "node_deleted");
        Ok(())
    }

    /// `delete_edge(id)`: masks the relation-matrix cell (single slot) or
    /// removes the id from its multi-edge array, downgrading the array back
    /// to a direct id once it shrinks to one entry (spec.md §4.3).
    pub fn delete_edge(&mut self, id: EntityId) -> GraphResult<()> {
        let edge = self.edge_store.remove(id).ok_or(GraphError::NoSuchEdge(id))?;
        tracing::debug!(id, src = edge.src, dest = edge.dest, "edge_deleted");
        let Some(matrix) = self.relation_matrices.get_mut(&edge.relation) else {
            return Ok(());
        };
        let Some(slot) = matrix.get(edge.src as usize, edge.dest as usize).copied() else {
            return Ok(());
        };

        match slot {
            EdgeSlot::Single(eid) if eid == id => {
                matrix.clear(edge.src as usize, edge.dest as usize);
                self.decr_adjacency(edge.src, edge.dest);
            }
            EdgeSlot::Single(_) => {}
            EdgeSlot::Multi(arena_idx) => {
                let mut became_empty = false;
                let mut downgrade_to = None;
                if let Some(edges) = self.multi_edges.get_mut(arena_idx) {
                    edges.retain(|&e| e != id);
                    if edges.len() == 1 {
                        downgrade_to = Some(edges[0]);
                    } else if edges.is_empty() {
                        became_empty = true;
                    }
                }
                if let Some(remaining) = downgrade_to {
                    self.multi_edges.remove(arena_idx);
                    let matrix = self.relation_matrices.get_mut(&edge.relation).unwrap();
                    matrix.set(edge.src as usize, edge.dest as usize, EdgeSlot::Single(remaining));
                } else if became_empty {
                    self.multi_edges.remove(arena_idx);
                    let matrix = self.relation_matrices.get_mut(&edge.relation).unwrap();
                    matrix.clear(edge.src as usize, edge.dest as usize);
                    self.decr_adjacency(edge.src, edge.dest);
                }
            }
        }
        Ok(())
    }

    pub fn get_node(&self, id: EntityId) -> Option<&Node> {
        self.node_store.get(id)
    }

    pub fn get_edge(&self, id: EntityId) -> Option<&Edge> {
        self.edge_store.get(id)
    }

    /// Mutable access for attribute writes (`Update`). Never used to change
    /// `id`, `labels`, `src`/`dest`, or `relation` — those are matrix-backed
    /// and must go through `create_*`/`delete_*`.
    pub fn get_node_mut(&mut self, id: EntityId) -> Option<&mut Node> {
        self.node_store.get_mut(id)
    }

    pub fn get_edge_mut(&mut self, id: EntityId) -> Option<&mut Edge> {
        self.edge_store.get_mut(id)
    }

    /// Flushes every matrix; `force` additionally compacts the entity
    /// stores' free-lists (spec.md §4.3).
    pub fn apply_all_pending(&mut self, force: bool) {
        for m in self.label_matrices.values_mut() {
            m.flush();
        }
        for m in self.relation_matrices.values_mut() {
            m.flush();
        }
        self.adjacency_matrix.flush();
        if force {
            self.node_store.compact();
            self.edge_store.compact();
            self.multi_edges.compact();
        }
        tracing::debug!(force, "matrices_flushed");
    }
}

/// A named graph: its mutable state behind a writer-preferring lock.
/// `acquire_read_lock`/`acquire_write_lock`/`release_lock` (spec.md §4.3)
/// are realized idiomatically as RAII guards: acquiring returns a guard,
/// dropping it releases.
pub struct Graph {
    name: String,
    lock: GraphLock<GraphData>,
}

impl Graph {
    pub fn new(name: impl Into<String>, sync_policy: MatrixSyncPolicy) -> Self {
        Graph {
            name: name.into(),
            lock: GraphLock::new(GraphData::new(sync_policy)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquire the read lock. Blocks while a writer is active or waiting.
    pub fn acquire_read_lock(&self) -> ReadGuard<'_, GraphData> {
        self.lock.read()
    }

    /// Acquire the write lock. Blocks until all readers (and any
    /// earlier-arriving writer) have released.
    pub fn acquire_write_lock(&self) -> WriteGuard<'_, GraphData> {
        self.lock.write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::AttributeSet;

    fn graph() -> Graph {
        Graph::new("g", MatrixSyncPolicy::default())
    }

    #[test]
    fn create_node_sets_label_diagonal() {
        let g = graph();
        let mut data = g.acquire_write_lock();
        let id = data.create_node(vec![1], AttributeSet::new());
        assert_eq!(data.label_matrix(1).unwrap().get(id as usize, id as usize), Some(&true));
    }

    #[test]
    fn create_edge_direct_slot_then_upgrades_to_multi() {
        let g = graph();
        let mut data = g.acquire_write_lock();
        let a = data.create_node(vec![], AttributeSet::new());
        let b = data.create_node(vec![], AttributeSet::new());
        let e1 = data.create_edge(a, b, 10, AttributeSet::new()).unwrap();
        let slot = *data.relation_matrix(10).unwrap().get(a as usize, b as usize).unwrap();
        assert_eq!(slot, EdgeSlot::Single(e1));

        let e2 = data.create_edge(a, b, 10, AttributeSet::new()).unwrap();
        let slot = *data.relation_matrix(10).unwrap().get(a as usize, b as usize).unwrap();
        match slot {
            EdgeSlot::Multi(idx) => {
                assert_eq!(data.multi_edge_ids(idx), &[e1, e2]);
            }
            EdgeSlot::Single(_) => panic!("expected multi-edge slot after second insert"),
        }
    }

    #[test]
    fn delete_edge_downgrades_multi_back_to_single() {
        let g = graph();
        let mut data = g.acquire_write_lock();
        let a = data.create_node(vec![], AttributeSet::new());
        let b = data.create_node(vec![], AttributeSet::new());
        let e1 = data.create_edge(a, b, 10, AttributeSet::new()).unwrap();
        let e2 = data.create_edge(a, b, 10, AttributeSet::new()).unwrap();

        data.delete_edge(e1).unwrap();
        let slot = *data.relation_matrix(10).unwrap().get(a as usize, b as usize).unwrap();
        assert_eq!(slot, EdgeSlot::Single(e2));
    }

    #[test]
    fn adjacency_clears_only_after_last_relation_removed() {
        let g = graph();
        let mut data = g.acquire_write_lock();
        let a = data.create_node(vec![], AttributeSet::new());
        let b = data.create_node(vec![], AttributeSet::new());
        let e1 = data.create_edge(a, b, 1, AttributeSet::new()).unwrap();
        let e2 = data.create_edge(a, b, 2, AttributeSet::new()).unwrap();
        assert_eq!(data.adjacency_matrix().get(a as usize, b as usize), Some(&true));

        data.delete_edge(e1).unwrap();
        assert_eq!(data.adjacency_matrix().get(a as usize, b as usize), Some(&true));

        data.delete_edge(e2).unwrap();
        assert_eq!(data.adjacency_matrix().get(a as usize, b as usize), None);
    }

    #[test]
    fn delete_node_masks_label_matrix() {
        let g = graph();
        let mut data = g.acquire_write_lock();
        let id = data.create_node(vec![3], AttributeSet::new());
        data.delete_node(id).unwrap();
        assert_eq!(data.label_matrix(3).unwrap().get(id as usize, id as usize), None);
        assert!(data.get_node(id).is_none());
    }

    #[test]
    fn apply_all_pending_flushes_and_force_compacts() {
        let g = graph();
        let mut data = g.acquire_write_lock();
        let a = data.create_node(vec![1], AttributeSet::new());
        let b = data.create_node(vec![1], AttributeSet::new());
        data.delete_node(b).unwrap();
        data.apply_all_pending(true);
        assert!(!data.label_matrix(1).unwrap().pending());
        assert_eq!(data.node_store().capacity(), a as usize + 1);
    }

    #[test]
    fn create_edge_rejects_unknown_endpoints() {
        let g = graph();
        let mut data = g.acquire_write_lock();
        let a = data.create_node(vec![], AttributeSet::new());
        let err = data.create_edge(a, 999, 1, AttributeSet::new()).unwrap_err();
        assert_eq!(err, GraphError::NoSuchNode(999));
    }
}
