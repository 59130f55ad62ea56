//! # Index Population
//!
//! Batched, lock-yielding, resumable population of a node or edge index
//! (spec.md §4.5). Populating must not block writers for the whole
//! traversal, and must tolerate concurrent mutation without missing an
//! entity that was live at `Index_Enable` time.

use crate::entity::{EntityId, LabelId};
use crate::graph::{EdgeSlot, Graph};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Populator-level errors (spec.md §7's "storage errors" category, as it
/// applies to index population rather than matrix access directly).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("index target label/relation {0} has no matrix yet")]
    NoSuchTarget(LabelId),
    #[error("cannot populate an index that is not in the Created or Populating state")]
    NotPopulating,
}

pub type IndexResult<T> = Result<T, IndexError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IndexState {
    Created = 0,
    Populating = 1,
    Active = 2,
    Dropped = 3,
}

impl IndexState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => IndexState::Created,
            1 => IndexState::Populating,
            2 => IndexState::Active,
            _ => IndexState::Dropped,
        }
    }
}

/// What the index covers: a label (node index) or a relation (edge
/// index). Determines which matrix the populator attaches to and the
/// shape of the resume cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTarget {
    Label(LabelId),
    Relation(LabelId),
}

/// Resume cursor: the next row (node index) is monotonically increasing,
/// so it resumes at `last_id + 1`; the edge index's cursor is the
/// lexicographic `(src, dest)` of the last entity indexed, and the
/// populator resumes strictly after it (spec.md §9 "the edge-index
/// populator's ... boundary ... fixes it to resume strictly after the
/// last-indexed (src,dest) pair").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Start,
    AfterNode(EntityId),
    AfterEdge(EntityId, EntityId),
}

/// Called by the populator (and, per spec.md §4.5's correctness argument,
/// by writers directly while `state` is `Populating` or `Active`) for
/// every entity that should be present in the index.
///
/// `Any` lets callers holding a `dyn IndexSink` (erased behind the
/// `Mutex<dyn IndexSink>` every `Index` carries) recover the concrete
/// backend via `as_any().downcast_ref()` — needed by tests asserting
/// against `InMemoryIndex`'s contents, and by any backend-specific
/// introspection a real sink might want to expose.
pub trait IndexSink: Send + std::any::Any {
    fn index_node(&mut self, id: EntityId);
    fn index_edge(&mut self, id: EntityId, src: EntityId, dest: EntityId);
    fn as_any(&self) -> &dyn std::any::Any;
}

/// An in-memory sorted index sink, sufficient for both the populator and
/// tests; a real index backend (B-tree, full-text, vector) would implement
/// [`IndexSink`] instead.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    pub node_ids: Vec<EntityId>,
    pub edge_ids: Vec<EntityId>,
}

impl IndexSink for InMemoryIndex {
    fn index_node(&mut self, id: EntityId) {
        self.node_ids.push(id);
    }

    fn index_edge(&mut self, id: EntityId, _src: EntityId, _dest: EntityId) {
        self.edge_ids.push(id);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub struct Index {
    target: IndexTarget,
    state: AtomicU8,
    batch_size: usize,
    cursor: Mutex<Cursor>,
    sink: Arc<Mutex<dyn IndexSink>>,
}

impl Index {
    pub fn new(target: IndexTarget, batch_size: usize, sink: Arc<Mutex<dyn IndexSink>>) -> Self {
        Index {
            target,
            state: AtomicU8::new(IndexState::Created as u8),
            batch_size: batch_size.max(1),
            cursor: Mutex::new(Cursor::Start),
            sink,
        }
    }

    pub fn state(&self) -> IndexState {
        IndexState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: IndexState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn begin_populating(&self) {
        self.set_state(IndexState::Populating);
    }

    /// Validates the target matrix exists, transitions `Created` →
    /// `Populating`, and runs the populator to completion (or until
    /// dropped). Returns [`IndexError::NotPopulating`] if called on an
    /// index that has already left the `Created` state.
    pub fn start(&self, graph: &Graph) -> IndexResult<()> {
        if self.state() != IndexState::Created {
            return Err(IndexError::NotPopulating);
        }
        let label = match self.target {
            IndexTarget::Label(l) | IndexTarget::Relation(l) => l,
        };
        {
            let data = graph.acquire_read_lock();
            let exists = match self.target {
                IndexTarget::Label(l) => data.label_matrix(l).is_some(),
                IndexTarget::Relation(r) => data.relation_matrix(r).is_some(),
            };
            if !exists {
                return Err(IndexError::NoSuchTarget(label));
            }
        }
        self.begin_populating();
        self.run_population(graph);
        Ok(())
    }

    pub fn drop_index(&self) {
        tracing::debug!(target = ?self.target, "index_dropped");
        self.set_state(IndexState::Dropped);
    }

    /// `Index_Enable`: transitions to `Active` iff still `Populating`.
    fn enable(&self) {
        let became_active = self
            .state
            .compare_exchange(
                IndexState::Populating as u8,
                IndexState::Active as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if became_active {
            tracing::info!(target = ?self.target, "index_active");
        }
    }

    /// Directly index an entity a writer just committed, if the index is
    /// in a state where missing it would violate completeness.
    pub fn index_written_node(&self, id: EntityId) {
        if matches!(self.state(), IndexState::Populating | IndexState::Active) {
            self.sink.lock().unwrap().index_node(id);
        }
    }

    pub fn index_written_edge(&self, id: EntityId, src: EntityId, dest: EntityId) {
        if matches!(self.state(), IndexState::Populating | IndexState::Active) {
            self.sink.lock().unwrap().index_edge(id, src, dest);
        }
    }

    /// Run one populator iteration to completion — the "background task"
    /// of spec.md §4.5, expressed as a blocking call the caller runs on a
    /// dedicated thread. Returns once the iterator is exhausted (the index
    /// is then enabled) or the state changed away from `Populating`.
    pub fn run_population(&self, graph: &Graph) {
        let _span = tracing::debug_span!("index_populate", target = ?self.target).entered();
        loop {
            if self.state() != IndexState::Populating {
                return;
            }
            let processed = match self.target {
                IndexTarget::Label(label) => self.populate_node_batch(graph, label),
                IndexTarget::Relation(relation) => self.populate_edge_batch(graph, relation),
            };
            match processed {
                Some(n) if n < self.batch_size => {
                    self.enable();
                    return;
                }
                Some(_) => continue,
                None => {
                    self.enable();
                    return;
                }
            }
        }
    }

    fn populate_node_batch(&self, graph: &Graph, label: LabelId) -> Option<usize> {
        let resume_row = match *self.cursor.lock().unwrap() {
            Cursor::Start => 0,
            Cursor::AfterNode(last) => last as usize + 1,
            Cursor::AfterEdge(..) => unreachable!("node index never sees an edge cursor"),
        };

        let data = graph.acquire_read_lock();
        let matrix = data.label_matrix(label)?;
        if resume_row >= matrix.nrows() {
            return None;
        }
        let mut iter = matrix.attach_range(resume_row, matrix.nrows() - 1).ok()?;
        iter.jump_to_row(resume_row);

        let mut count = 0;
        let mut last_id = None;
        let mut sink = self.sink.lock().unwrap();
        while count < self.batch_size {
            let Some((row, _, _)) = iter.next() else { break };
            sink.index_node(row as EntityId);
            last_id = Some(row as EntityId);
            count += 1;
        }
        drop(sink);
        drop(data);

        if let Some(id) = last_id {
            *self.cursor.lock().unwrap() = Cursor::AfterNode(id);
        }
        if count == 0 {
            None
        } else {
            Some(count)
        }
    }

    fn populate_edge_batch(&self, graph: &Graph, relation: LabelId) -> Option<usize> {
        let (resume_row, skip_until) = match *self.cursor.lock().unwrap() {
            Cursor::Start => (0, None),
            Cursor::AfterEdge(src, dest) => (src as usize, Some((src, dest))),
            Cursor::AfterNode(..) => unreachable!("edge index never sees a node cursor"),
        };

        let data = graph.acquire_read_lock();
        let matrix = data.relation_matrix(relation)?;
        if resume_row >= matrix.nrows() {
            return None;
        }
        let mut iter = matrix.attach_range(resume_row, matrix.nrows() - 1).ok()?;
        iter.jump_to_row(resume_row);

        let mut count = 0;
        let mut last_pair = None;
        let mut sink = self.sink.lock().unwrap();
        for (row, col, slot) in iter.by_ref() {
            let pair = (row as EntityId, col as EntityId);
            if let Some(boundary) = skip_until {
                if pair <= boundary {
                    continue;
                }
            }
            match slot {
                EdgeSlot::Single(edge_id) => {
                    sink.index_edge(edge_id, pair.0, pair.1);
                }
                EdgeSlot::Multi(arena_idx) => {
                    for &edge_id in data.multi_edge_ids(arena_idx) {
                        sink.index_edge(edge_id, pair.0, pair.1);
                    }
                }
            }
            last_pair = Some(pair);
            count += 1;
            if count >= self.batch_size {
                break;
            }
        }
        drop(sink);
        drop(data);

        if let Some(pair) = last_pair {
            *self.cursor.lock().unwrap() = Cursor::AfterEdge(pair.0, pair.1);
        }
        if count == 0 {
            None
        } else {
            Some(count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::MatrixSyncPolicy;
    use crate::value::AttributeSet;

    fn populated_graph(n: usize, label: LabelId) -> Arc<Graph> {
        let graph = Arc::new(Graph::new("g", MatrixSyncPolicy::default()));
        let mut data = graph.acquire_write_lock();
        for _ in 0..n {
            data.create_node(vec![label], AttributeSet::new());
        }
        data.apply_all_pending(false);
        drop(data);
        graph
    }

    #[test]
    fn populator_indexes_every_node_in_batches() {
        let graph = populated_graph(10, 1);
        let sink: Arc<Mutex<dyn IndexSink>> = Arc::new(Mutex::new(InMemoryIndex::default()));
        let index = Index::new(IndexTarget::Label(1), 3, Arc::clone(&sink));
        index.begin_populating();
        index.run_population(&graph);
        assert_eq!(index.state(), IndexState::Active);
        let sink = sink.lock().unwrap();
        let ids = sink
            .as_any_node_ids()
            .expect("InMemoryIndex downcast should succeed in this test");
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn populator_survives_insertion_during_release_window() {
        let graph = populated_graph(100, 7);
        let sink: Arc<Mutex<dyn IndexSink>> = Arc::new(Mutex::new(InMemoryIndex::default()));
        let index = Arc::new(Index::new(IndexTarget::Label(7), 3, Arc::clone(&sink)));
        index.begin_populating();

        // Simulate a writer committing a new matching node directly while
        // the index is Populating, indexing it through the write path
        // rather than the populator's own scan.
        {
            let mut data = graph.acquire_write_lock();
            let id = data.create_node(vec![7], AttributeSet::new());
            data.apply_all_pending(false);
            index.index_written_node(id);
        }

        index.run_population(&graph);
        assert_eq!(index.state(), IndexState::Active);
        let sink = sink.lock().unwrap();
        let ids = sink.as_any_node_ids().unwrap();
        assert_eq!(ids.len(), 101);
    }

    #[test]
    fn start_rejects_a_target_with_no_matrix_yet() {
        let graph = Arc::new(Graph::new("g", MatrixSyncPolicy::default()));
        let sink: Arc<Mutex<dyn IndexSink>> = Arc::new(Mutex::new(InMemoryIndex::default()));
        let index = Index::new(IndexTarget::Label(99), 10, sink);
        let err = index.start(&graph).unwrap_err();
        assert_eq!(err, IndexError::NoSuchTarget(99));
        assert_eq!(index.state(), IndexState::Created);
    }

    #[test]
    fn dropping_mid_populate_aborts_without_enabling() {
        let graph = populated_graph(20, 2);
        let sink: Arc<Mutex<dyn IndexSink>> = Arc::new(Mutex::new(InMemoryIndex::default()));
        let index = Index::new(IndexTarget::Label(2), 1, Arc::clone(&sink));
        index.begin_populating();
        index.drop_index();
        index.run_population(&graph);
        assert_eq!(index.state(), IndexState::Dropped);
    }

    trait DowncastNodeIds {
        fn as_any_node_ids(&self) -> Option<&[EntityId]>;
    }

    impl DowncastNodeIds for dyn IndexSink {
        fn as_any_node_ids(&self) -> Option<&[EntityId]> {
            self.as_any().downcast_ref::<InMemoryIndex>().map(|idx| idx.node_ids.as_slice())
        }
    }
}
