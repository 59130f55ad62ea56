//! Traversal operators: evaluate an algebraic expression over matrices to
//! produce `(src, dest)` pairs, buffering source records so the product
//! runs batched against a filter built from the buffer (spec.md §4.4). No
//! general sparse-matrix-multiply kernel is linked into this crate (spec.md
//! §1 treats the linear-algebra library as an out-of-scope black box), so
//! the "product against a filter matrix" is realized directly as one
//! relation-matrix row lookup per buffered source id — observably
//! equivalent for the boolean/id-valued cells this crate stores.

use super::{OpIndex, OpKind, Operator, Plan, Record, RecordSlot, RuntimeResult};
use crate::entity::{EntityId, LabelId};
use crate::graph::{EdgeSlot, Graph};
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct PendingHop {
    base: Record,
    dest: EntityId,
    edge: Option<EntityId>,
}

/// Expands every `(src) -[relation]-> (dest)` edge reachable from the
/// bound source in `src_slot`, writing `dest_slot` (and optionally
/// `edge_slot`).
#[derive(Debug)]
pub struct ConditionalTraverse {
    graph: Arc<Graph>,
    child: OpIndex,
    relation: LabelId,
    src_slot: usize,
    dest_slot: usize,
    edge_slot: Option<usize>,
    record_cap: usize,
    pending: VecDeque<PendingHop>,
    child_exhausted: bool,
}

impl ConditionalTraverse {
    pub fn new(
        graph: Arc<Graph>,
        child: OpIndex,
        relation: LabelId,
        src_slot: usize,
        dest_slot: usize,
        edge_slot: Option<usize>,
        record_cap: usize,
    ) -> Self {
        ConditionalTraverse {
            graph,
            child,
            relation,
            src_slot,
            dest_slot,
            edge_slot,
            record_cap: record_cap.max(1),
            pending: VecDeque::new(),
            child_exhausted: false,
        }
    }

    fn refill(&mut self, plan: &Plan) -> RuntimeResult<()> {
        let mut buffered: Vec<(Record, EntityId)> = Vec::new();
        while buffered.len() < self.record_cap {
            match plan.consume(self.child)? {
                None => {
                    self.child_exhausted = true;
                    break;
                }
                Some(rec) => {
                    if let Some(src) = rec.get(self.src_slot).as_node() {
                        buffered.push((rec, src));
                    }
                }
            }
        }
        if buffered.is_empty() {
            return Ok(());
        }

        let data = self.graph.acquire_read_lock();
        let Some(matrix) = data.relation_matrix(self.relation) else {
            return Ok(());
        };
        for (base, src) in buffered {
            let row = src as usize;
            if row >= matrix.nrows() {
                continue;
            }
            let Ok(iter) = matrix.attach_range(row, row) else {
                continue;
            };
            for (_, dest, slot) in iter {
                match slot {
                    EdgeSlot::Single(edge_id) => {
                        self.pending.push_back(PendingHop {
                            base: base.clone(),
                            dest: dest as EntityId,
                            edge: Some(edge_id),
                        });
                    }
                    EdgeSlot::Multi(arena_idx) => {
                        for &edge_id in data.multi_edge_ids(arena_idx) {
                            self.pending.push_back(PendingHop {
                                base: base.clone(),
                                dest: dest as EntityId,
                                edge: Some(edge_id),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl Operator for ConditionalTraverse {
    fn init(&mut self, _plan: &Plan) -> RuntimeResult<()> {
        self.pending.clear();
        self.child_exhausted = false;
        Ok(())
    }

    fn consume(&mut self, plan: &Plan) -> RuntimeResult<Option<Record>> {
        loop {
            if let Some(hop) = self.pending.pop_front() {
                let mut record = hop.base;
                record.set(self.dest_slot, RecordSlot::Node(hop.dest));
                if let Some(edge_slot) = self.edge_slot {
                    if let Some(edge_id) = hop.edge {
                        record.set(edge_slot, RecordSlot::Edge(edge_id));
                    }
                }
                return Ok(Some(record));
            }
            if self.child_exhausted {
                return Ok(None);
            }
            self.refill(plan)?;
            if self.pending.is_empty() && self.child_exhausted {
                return Ok(None);
            }
        }
    }

    fn reset(&mut self, plan: &Plan) -> RuntimeResult<()> {
        plan.reset(self.child)?;
        self.pending.clear();
        self.child_exhausted = false;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(ConditionalTraverse {
            graph: Arc::clone(&self.graph),
            child: self.child,
            relation: self.relation,
            src_slot: self.src_slot,
            dest_slot: self.dest_slot,
            edge_slot: self.edge_slot,
            record_cap: self.record_cap,
            pending: self.pending.clone(),
            child_exhausted: self.child_exhausted,
        })
    }

    fn op_kind(&self) -> OpKind {
        OpKind::ConditionalTraverse
    }

    fn modifies(&self) -> &[usize] {
        std::slice::from_ref(&self.dest_slot)
    }
}

/// Iterative DFS from a bound source, visited-set bounded by `max_len`.
/// A cycle may close (revisit a node already on the current path) but is
/// not re-expanded from; minimum-length filtering is applied post-hoc;
/// distinct paths to the same destination are yielded separately without
/// deduplication (spec.md §4.4).
#[derive(Debug)]
pub struct VariableLengthTraverse {
    graph: Arc<Graph>,
    child: OpIndex,
    relation: LabelId,
    min_len: usize,
    max_len: usize,
    src_slot: usize,
    dest_slot: usize,
    pending: VecDeque<PendingHop>,
    child_exhausted: bool,
}

impl VariableLengthTraverse {
    pub fn new(
        graph: Arc<Graph>,
        child: OpIndex,
        relation: LabelId,
        min_len: usize,
        max_len: usize,
        src_slot: usize,
        dest_slot: usize,
    ) -> Self {
        VariableLengthTraverse {
            graph,
            child,
            relation,
            min_len,
            max_len,
            src_slot,
            dest_slot,
            pending: VecDeque::new(),
            child_exhausted: false,
        }
    }

    fn reachable(&self, start: EntityId) -> Vec<EntityId> {
        let data = self.graph.acquire_read_lock();
        let mut results = Vec::new();
        let mut stack: Vec<(EntityId, usize, Vec<EntityId>)> = vec![(start, 0, vec![start])];
        while let Some((node, depth, path)) = stack.pop() {
            if depth >= self.max_len {
                continue;
            }
            let Some(matrix) = data.relation_matrix(self.relation) else {
                continue;
            };
            let row = node as usize;
            if row >= matrix.nrows() {
                continue;
            }
            let Ok(iter) = matrix.attach_range(row, row) else {
                continue;
            };
            for (_, dest, _) in iter {
                let dest = dest as EntityId;
                let new_depth = depth + 1;
                if new_depth >= self.min_len && new_depth <= self.max_len {
                    results.push(dest);
                }
                if !path.contains(&dest) && new_depth < self.max_len {
                    let mut new_path = path.clone();
                    new_path.push(dest);
                    stack.push((dest, new_depth, new_path));
                }
            }
        }
        results
    }

    fn refill(&mut self, plan: &Plan) -> RuntimeResult<()> {
        loop {
            let Some(rec) = plan.consume(self.child)? else {
                self.child_exhausted = true;
                return Ok(());
            };
            let Some(src) = rec.get(self.src_slot).as_node() else {
                continue;
            };
            let dests = self.reachable(src);
            if dests.is_empty() {
                continue;
            }
            for dest in dests {
                self.pending.push_back(PendingHop { base: rec.clone(), dest, edge: None });
            }
            return Ok(());
        }
    }
}

impl Operator for VariableLengthTraverse {
    fn init(&mut self, _plan: &Plan) -> RuntimeResult<()> {
        self.pending.clear();
        self.child_exhausted = false;
        Ok(())
    }

    fn consume(&mut self, plan: &Plan) -> RuntimeResult<Option<Record>> {
        loop {
            if let Some(hop) = self.pending.pop_front() {
                let mut record = hop.base;
                record.set(self.dest_slot, RecordSlot::Node(hop.dest));
                return Ok(Some(record));
            }
            if self.child_exhausted {
                return Ok(None);
            }
            self.refill(plan)?;
            if self.pending.is_empty() && self.child_exhausted {
                return Ok(None);
            }
        }
    }

    fn reset(&mut self, plan: &Plan) -> RuntimeResult<()> {
        plan.reset(self.child)?;
        self.pending.clear();
        self.child_exhausted = false;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(VariableLengthTraverse {
            graph: Arc::clone(&self.graph),
            child: self.child,
            relation: self.relation,
            min_len: self.min_len,
            max_len: self.max_len,
            src_slot: self.src_slot,
            dest_slot: self.dest_slot,
            pending: self.pending.clone(),
            child_exhausted: self.child_exhausted,
        })
    }

    fn op_kind(&self) -> OpKind {
        OpKind::VariableLengthTraverse
    }

    fn modifies(&self) -> &[usize] {
        std::slice::from_ref(&self.dest_slot)
    }
}
