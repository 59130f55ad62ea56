//! Mutation operators: `Create`, `Update`, `Delete`, `Merge`. Each stages
//! writes into a per-operator pending buffer and commits them at one
//! barrier — end of stream, or the end of the read phase within a larger
//! query — so that reads within the same query never observe their own
//! writes until the commit (spec.md §4.4).

use super::{OpIndex, OpKind, Operator, Plan, Record, RecordSlot, RuntimeResult};
use crate::entity::{EntityId, LabelId};
use crate::graph::Graph;
use crate::value::AttributeSet;
use std::sync::Arc;

/// A node to create: fixed label set and attribute template (expression
/// evaluation that would bind attribute values dynamically from a record
/// is out of scope here — see spec.md §1's "arithmetic-expression
/// evaluator").
#[derive(Debug, Clone)]
pub struct NodeTemplate {
    pub output_slot: usize,
    pub labels: Vec<LabelId>,
    pub attributes: AttributeSet,
}

#[derive(Debug, Clone)]
pub struct EdgeTemplate {
    pub output_slot: Option<usize>,
    pub src_slot: usize,
    pub dest_slot: usize,
    pub relation: LabelId,
    pub attributes: AttributeSet,
}

#[derive(Debug)]
enum PendingCreate {
    Node { base: Record, template: usize },
    Edge { base: Record, template: usize, src: EntityId, dest: EntityId },
}

/// Stages node/edge creation for every child record (or once, for a
/// childless `CREATE`), committing the whole batch at stream exhaustion.
#[derive(Debug)]
pub struct Create {
    graph: Arc<Graph>,
    child: Option<OpIndex>,
    nodes: Vec<NodeTemplate>,
    edges: Vec<EdgeTemplate>,
    pending: Vec<PendingCreate>,
    committed: Vec<Record>,
    done: bool,
}

impl Create {
    pub fn new(
        graph: Arc<Graph>,
        child: Option<OpIndex>,
        nodes: Vec<NodeTemplate>,
        edges: Vec<EdgeTemplate>,
    ) -> Self {
        Create { graph, child, nodes, edges, pending: Vec::new(), committed: Vec::new(), done: false }
    }

    fn stage(&mut self, base: Record) {
        for (i, _) in self.nodes.iter().enumerate() {
            self.pending.push(PendingCreate::Node { base: base.clone(), template: i });
        }
        for (i, tmpl) in self.edges.iter().enumerate() {
            if let (Some(src), Some(dest)) = (
                base.get(tmpl.src_slot).as_node(),
                base.get(tmpl.dest_slot).as_node(),
            ) {
                self.pending.push(PendingCreate::Edge { base: base.clone(), template: i, src, dest });
            }
        }
    }

    fn commit(&mut self) -> RuntimeResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut data = self.graph.acquire_write_lock();
        for op in self.pending.drain(..) {
            match op {
                PendingCreate::Node { mut base, template } => {
                    let tmpl = &self.nodes[template];
                    let id = data.create_node(tmpl.labels.clone(), tmpl.attributes.clone());
                    base.set(tmpl.output_slot, RecordSlot::Node(id));
                    self.committed.push(base);
                }
                PendingCreate::Edge { mut base, template, src, dest } => {
                    let tmpl = &self.edges[template];
                    let id = data.create_edge(src, dest, tmpl.relation, tmpl.attributes.clone())?;
                    if let Some(slot) = tmpl.output_slot {
                        base.set(slot, RecordSlot::Edge(id));
                    }
                    self.committed.push(base);
                }
            }
        }
        data.apply_all_pending(false);
        Ok(())
    }
}

impl Operator for Create {
    fn init(&mut self, _plan: &Plan) -> RuntimeResult<()> {
        self.pending.clear();
        self.committed.clear();
        self.done = false;
        Ok(())
    }

    fn consume(&mut self, plan: &Plan) -> RuntimeResult<Option<Record>> {
        if !self.done {
            match self.child {
                Some(child) => {
                    while let Some(rec) = plan.consume(child)? {
                        self.stage(rec);
                    }
                }
                None => self.stage(Record::with_width(0)),
            }
            self.commit()?;
            self.done = true;
        }
        Ok(self.committed.pop())
    }

    fn reset(&mut self, plan: &Plan) -> RuntimeResult<()> {
        if let Some(child) = self.child {
            plan.reset(child)?;
        }
        self.pending.clear();
        self.committed.clear();
        self.done = false;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(Create {
            graph: Arc::clone(&self.graph),
            child: self.child,
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            pending: Vec::new(),
            committed: Vec::new(),
            done: false,
        })
    }

    fn op_kind(&self) -> OpKind {
        OpKind::Create
    }

    fn modifies(&self) -> &[usize] {
        &[]
    }
}

#[derive(Debug, Clone)]
pub enum TargetRef {
    Node(usize),
    Edge(usize),
}

#[derive(Debug, Clone)]
pub struct SetClause {
    pub target: TargetRef,
    pub attribute: crate::value::AttributeId,
    pub value: crate::value::Value,
}

/// Applies attribute writes against an already-matched node/edge slot.
/// Attribute updates do not touch any matrix — only the label/relation
/// matrices represent structure — so the barrier here takes the write
/// lock only to mutate the entity stores' attribute sets in place.
#[derive(Debug)]
pub struct Update {
    graph: Arc<Graph>,
    child: OpIndex,
    sets: Vec<SetClause>,
    pending: Vec<Record>,
    done: bool,
    emit_cursor: usize,
}

impl Update {
    pub fn new(graph: Arc<Graph>, child: OpIndex, sets: Vec<SetClause>) -> Self {
        Update { graph, child, sets, pending: Vec::new(), done: false, emit_cursor: 0 }
    }

    fn commit(&mut self) {
        let mut data = self.graph.acquire_write_lock();
        for rec in &self.pending {
            for clause in &self.sets {
                match clause.target {
                    TargetRef::Node(slot) => {
                        if let Some(id) = rec.get(slot).as_node() {
                            if let Some(node) = data.get_node_mut(id) {
                                node.attributes.set(clause.attribute, clause.value.clone());
                            }
                        }
                    }
                    TargetRef::Edge(slot) => {
                        if let Some(id) = rec.get(slot).as_edge() {
                            if let Some(edge) = data.get_edge_mut(id) {
                                edge.attributes.set(clause.attribute, clause.value.clone());
                            }
                        }
                    }
                }
            }
        }
    }
}

impl Operator for Update {
    fn init(&mut self, _plan: &Plan) -> RuntimeResult<()> {
        self.pending.clear();
        self.done = false;
        self.emit_cursor = 0;
        Ok(())
    }

    fn consume(&mut self, plan: &Plan) -> RuntimeResult<Option<Record>> {
        if !self.done {
            while let Some(rec) = plan.consume(self.child)? {
                self.pending.push(rec);
            }
            self.commit();
            self.done = true;
        }
        if self.emit_cursor >= self.pending.len() {
            return Ok(None);
        }
        let rec = self.pending[self.emit_cursor].clone();
        self.emit_cursor += 1;
        Ok(Some(rec))
    }

    fn reset(&mut self, plan: &Plan) -> RuntimeResult<()> {
        plan.reset(self.child)?;
        self.pending.clear();
        self.done = false;
        self.emit_cursor = 0;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(Update {
            graph: Arc::clone(&self.graph),
            child: self.child,
            sets: self.sets.clone(),
            pending: Vec::new(),
            done: false,
            emit_cursor: 0,
        })
    }

    fn op_kind(&self) -> OpKind {
        OpKind::Update
    }

    fn modifies(&self) -> &[usize] {
        &[]
    }
}

/// Deletes matched nodes/edges. Edges are always committed before nodes —
/// the graph facade's `delete_node` does not cascade, so dangling edges
/// left by a node-only delete would otherwise corrupt relation matrices.
#[derive(Debug)]
pub struct Delete {
    graph: Arc<Graph>,
    child: OpIndex,
    node_slots: Vec<usize>,
    edge_slots: Vec<usize>,
    pending_nodes: Vec<EntityId>,
    pending_edges: Vec<EntityId>,
    done: bool,
}

impl Delete {
    pub fn new(graph: Arc<Graph>, child: OpIndex, node_slots: Vec<usize>, edge_slots: Vec<usize>) -> Self {
        Delete {
            graph,
            child,
            node_slots,
            edge_slots,
            pending_nodes: Vec::new(),
            pending_edges: Vec::new(),
            done: false,
        }
    }

    fn commit(&mut self) {
        let mut data = self.graph.acquire_write_lock();
        for &id in &self.pending_edges {
            let _ = data.delete_edge(id);
        }
        for &id in &self.pending_nodes {
            let _ = data.delete_node(id);
        }
        data.apply_all_pending(false);
    }
}

impl Operator for Delete {
    fn init(&mut self, _plan: &Plan) -> RuntimeResult<()> {
        self.pending_nodes.clear();
        self.pending_edges.clear();
        self.done = false;
        Ok(())
    }

    fn consume(&mut self, plan: &Plan) -> RuntimeResult<Option<Record>> {
        if !self.done {
            while let Some(rec) = plan.consume(self.child)? {
                for &slot in &self.edge_slots {
                    if let Some(id) = rec.get(slot).as_edge() {
                        self.pending_edges.push(id);
                    }
                }
                for &slot in &self.node_slots {
                    if let Some(id) = rec.get(slot).as_node() {
                        self.pending_nodes.push(id);
                    }
                }
            }
            self.commit();
            self.done = true;
        }
        Ok(None)
    }

    fn reset(&mut self, plan: &Plan) -> RuntimeResult<()> {
        plan.reset(self.child)?;
        self.pending_nodes.clear();
        self.pending_edges.clear();
        self.done = false;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(Delete {
            graph: Arc::clone(&self.graph),
            child: self.child,
            node_slots: self.node_slots.clone(),
            edge_slots: self.edge_slots.clone(),
            pending_nodes: Vec::new(),
            pending_edges: Vec::new(),
            done: false,
        })
    }

    fn op_kind(&self) -> OpKind {
        OpKind::Delete
    }

    fn modifies(&self) -> &[usize] {
        &[]
    }
}

/// Passes matched records through unchanged; records for which the match
/// slot is empty fall back to the wrapped `Create` template, modeling
/// `MERGE`'s "match or create" semantics. Splits the child stream itself
/// (rather than delegating to `Create::consume`) so a record never reaches
/// both paths: matched records bypass `Create` entirely, unmatched ones are
/// staged into it.
#[derive(Debug)]
pub struct Merge {
    match_slot: usize,
    create: Create,
    passthrough: Vec<Record>,
    done: bool,
}

impl Merge {
    pub fn new(match_slot: usize, create: Create) -> Self {
        Merge { match_slot, create, passthrough: Vec::new(), done: false }
    }
}

impl Operator for Merge {
    fn init(&mut self, plan: &Plan) -> RuntimeResult<()> {
        self.create.init(plan)?;
        self.passthrough.clear();
        self.done = false;
        Ok(())
    }

    fn consume(&mut self, plan: &Plan) -> RuntimeResult<Option<Record>> {
        if !self.done {
            match self.create.child {
                Some(child) => {
                    while let Some(rec) = plan.consume(child)? {
                        if matches!(rec.get(self.match_slot), RecordSlot::Empty) {
                            self.create.stage(rec);
                        } else {
                            self.passthrough.push(rec);
                        }
                    }
                }
                None => self.create.stage(Record::with_width(0)),
            }
            self.create.commit()?;
            self.done = true;
        }
        if let Some(rec) = self.passthrough.pop() {
            return Ok(Some(rec));
        }
        Ok(self.create.committed.pop())
    }

    fn reset(&mut self, plan: &Plan) -> RuntimeResult<()> {
        self.create.reset(plan)?;
        self.passthrough.clear();
        self.done = false;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        let Create { graph, child, nodes, edges, .. } = &self.create;
        Box::new(Merge {
            match_slot: self.match_slot,
            create: Create::new(Arc::clone(graph), *child, nodes.clone(), edges.clone()),
            passthrough: Vec::new(),
            done: false,
        })
    }

    fn op_kind(&self) -> OpKind {
        OpKind::Merge
    }

    fn modifies(&self) -> &[usize] {
        std::slice::from_ref(&self.match_slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::MatrixSyncPolicy;
    use std::cell::Cell;

    /// Yields a fixed sequence of records, then exhausts. Stands in for a
    /// real scan/match operator so `Merge`'s split logic can be tested
    /// without driving an actual label/id scan.
    #[derive(Debug)]
    struct FixedRecords {
        records: Vec<Record>,
        cursor: Cell<usize>,
    }

    impl FixedRecords {
        fn new(records: Vec<Record>) -> Self {
            FixedRecords { records, cursor: Cell::new(0) }
        }
    }

    impl Operator for FixedRecords {
        fn init(&mut self, _plan: &Plan) -> RuntimeResult<()> {
            self.cursor.set(0);
            Ok(())
        }

        fn consume(&mut self, _plan: &Plan) -> RuntimeResult<Option<Record>> {
            let i = self.cursor.get();
            if i >= self.records.len() {
                return Ok(None);
            }
            self.cursor.set(i + 1);
            Ok(Some(self.records[i].clone()))
        }

        fn reset(&mut self, _plan: &Plan) -> RuntimeResult<()> {
            self.cursor.set(0);
            Ok(())
        }

        fn clone_op(&self) -> Box<dyn Operator> {
            Box::new(FixedRecords { records: self.records.clone(), cursor: Cell::new(self.cursor.get()) })
        }

        fn op_kind(&self) -> OpKind {
            OpKind::Argument
        }

        fn modifies(&self) -> &[usize] {
            &[]
        }
    }

    #[test]
    fn merge_passes_matched_records_through_and_creates_the_rest() {
        let graph = Arc::new(Graph::new("g", MatrixSyncPolicy::default()));
        let mut plan = Plan::new();

        let mut matched = Record::with_width(1);
        matched.set(0, RecordSlot::Node(99));
        let unmatched = Record::with_width(1);
        let source = plan.push(Box::new(FixedRecords::new(vec![matched, unmatched])));

        let create = Create::new(
            Arc::clone(&graph),
            Some(source),
            vec![NodeTemplate { output_slot: 0, labels: vec![], attributes: AttributeSet::new() }],
            vec![],
        );
        let merge = plan.push(Box::new(Merge::new(0, create)));
        plan.set_root(merge);
        plan.init().unwrap();

        let mut rows = Vec::new();
        while let Some(rec) = plan.run().unwrap() {
            rows.push(rec);
        }
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|r| r.get(0).as_node() == Some(99)));

        let data = graph.acquire_read_lock();
        assert_eq!(data.node_store().len(), 1);
    }
}
