//! `Project`/`Filter`: pure pass-through transformations over a child's
//! records, added as the minimal glue needed to assemble the seed
//! scenarios end to end (spec.md §8) — neither changes the `Operator`
//! contract.

use super::{OpIndex, OpKind, Operator, Plan, Record, RecordSlot, RuntimeError, RuntimeResult};
use crate::entity::EntityId;
use crate::graph::Graph;
use crate::value::{AttributeId, Value};
use std::sync::Arc;

/// One column of a projection: copy the child's slot `from` into this
/// operator's output slot `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectColumn {
    pub from: usize,
    pub to: usize,
}

/// Narrows or reorders a child's record into a fixed-width output record.
/// Slots not named by any column stay `RecordSlot::Empty`.
#[derive(Debug)]
pub struct Project {
    child: OpIndex,
    columns: Vec<ProjectColumn>,
    width: usize,
}

impl Project {
    pub fn new(child: OpIndex, columns: Vec<ProjectColumn>, width: usize) -> Self {
        Project { child, columns, width }
    }
}

impl Operator for Project {
    fn init(&mut self, _plan: &Plan) -> RuntimeResult<()> {
        Ok(())
    }

    fn consume(&mut self, plan: &Plan) -> RuntimeResult<Option<Record>> {
        let Some(input) = plan.consume(self.child)? else {
            return Ok(None);
        };
        let mut out = Record::with_width(self.width);
        for col in &self.columns {
            out.set(col.to, input.get(col.from).clone());
        }
        Ok(Some(out))
    }

    fn reset(&mut self, plan: &Plan) -> RuntimeResult<()> {
        plan.reset(self.child)
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(Project { child: self.child, columns: self.columns.clone(), width: self.width })
    }

    fn op_kind(&self) -> OpKind {
        OpKind::Project
    }

    fn modifies(&self) -> &[usize] {
        &[]
    }
}

/// A comparison against either a bound node/edge's attribute or a scalar
/// slot already present in the record. Arithmetic/boolean expression
/// evaluation is out of scope (spec.md §1) — this only covers the
/// single-comparison predicates needed to drive `WHERE`-style filtering in
/// the seed scenarios.
#[derive(Debug, Clone)]
pub enum Comparison {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Comparison {
    fn holds(&self, lhs: &Value, rhs: &Value) -> bool {
        match self {
            Comparison::Eq => lhs == rhs,
            Comparison::Neq => lhs != rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Lte => lhs <= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Gte => lhs >= rhs,
        }
    }
}

/// Where a predicate's left-hand value comes from.
#[derive(Debug, Clone)]
pub enum FilterOperand {
    /// A node's attribute, looked up by slot + attribute id. Missing
    /// node/attribute compares as `Value::Null`.
    NodeAttribute(usize, AttributeId),
    /// An edge's attribute, same fallback.
    EdgeAttribute(usize, AttributeId),
    /// A scalar already bound into the record (a parameter, or another
    /// operator's computed value).
    Scalar(usize),
    /// A literal constant.
    Literal(Value),
}

/// Drops records that fail a single comparison (spec.md §4.4 "minimal glue
/// operators"). Conjunctions of multiple predicates are expressed by
/// chaining several `Filter`s, matching how `Skip`/`Limit` compose.
#[derive(Debug)]
pub struct Filter {
    graph: Arc<Graph>,
    child: OpIndex,
    left: FilterOperand,
    op: Comparison,
    right: FilterOperand,
}

impl Filter {
    pub fn new(graph: Arc<Graph>, child: OpIndex, left: FilterOperand, op: Comparison, right: FilterOperand) -> Self {
        Filter { graph, child, left, op, right }
    }

    fn resolve(&self, operand: &FilterOperand, record: &Record) -> RuntimeResult<Value> {
        match operand {
            FilterOperand::Literal(v) => Ok(v.clone()),
            FilterOperand::Scalar(slot) => match record.get(*slot) {
                RecordSlot::Scalar(v) => Ok(v.clone()),
                RecordSlot::Empty => Ok(Value::Null),
                other => Err(RuntimeError::TypeMismatch { expected: "scalar", found: format!("{other:?}") }),
            },
            FilterOperand::NodeAttribute(slot, attr) => {
                let Some(id) = record.get(*slot).as_node() else {
                    return Ok(Value::Null);
                };
                Ok(self.lookup_node_attribute(id, *attr))
            }
            FilterOperand::EdgeAttribute(slot, attr) => {
                let Some(id) = record.get(*slot).as_edge() else {
                    return Ok(Value::Null);
                };
                Ok(self.lookup_edge_attribute(id, *attr))
            }
        }
    }

    fn lookup_node_attribute(&self, id: EntityId, attr: AttributeId) -> Value {
        let data = self.graph.acquire_read_lock();
        data.get_node(id).and_then(|n| n.attributes.get(attr)).cloned().unwrap_or(Value::Null)
    }

    fn lookup_edge_attribute(&self, id: EntityId, attr: AttributeId) -> Value {
        let data = self.graph.acquire_read_lock();
        data.get_edge(id).and_then(|e| e.attributes.get(attr)).cloned().unwrap_or(Value::Null)
    }
}

impl Operator for Filter {
    fn init(&mut self, _plan: &Plan) -> RuntimeResult<()> {
        Ok(())
    }

    fn consume(&mut self, plan: &Plan) -> RuntimeResult<Option<Record>> {
        loop {
            let Some(record) = plan.consume(self.child)? else {
                return Ok(None);
            };
            let lhs = self.resolve(&self.left, &record)?;
            let rhs = self.resolve(&self.right, &record)?;
            if self.op.holds(&lhs, &rhs) {
                return Ok(Some(record));
            }
        }
    }

    fn reset(&mut self, plan: &Plan) -> RuntimeResult<()> {
        plan.reset(self.child)
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(Filter {
            graph: Arc::clone(&self.graph),
            child: self.child,
            left: self.left.clone(),
            op: self.op.clone(),
            right: self.right.clone(),
        })
    }

    fn op_kind(&self) -> OpKind {
        OpKind::Filter
    }

    fn modifies(&self) -> &[usize] {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::AllNodeScan;
    use crate::matrix::MatrixSyncPolicy;
    use crate::value::AttributeSet;

    fn make_graph() -> Arc<Graph> {
        Arc::new(Graph::new("g", MatrixSyncPolicy::default()))
    }

    #[test]
    fn project_narrows_and_reorders_slots() {
        let graph = make_graph();
        let id;
        {
            let mut data = graph.acquire_write_lock();
            id = data.create_node(vec![], AttributeSet::new());
            data.apply_all_pending(false);
        }
        let mut plan = Plan::new();
        let scan = plan.push(Box::new(AllNodeScan::new(Arc::clone(&graph), 0, 1)));
        let project = plan.push(Box::new(Project::new(scan, vec![ProjectColumn { from: 0, to: 2 }], 3)));
        plan.set_root(project);
        plan.init().unwrap();

        let record = plan.run().unwrap().unwrap();
        assert_eq!(record.width(), 3);
        assert_eq!(record.get(2).as_node(), Some(id));
        assert!(matches!(record.get(0), RecordSlot::Empty));
    }

    #[test]
    fn filter_keeps_only_matching_attribute_values() {
        let graph = make_graph();
        let attr: AttributeId = 1;
        {
            let mut data = graph.acquire_write_lock();
            let mut attrs_a = AttributeSet::new();
            attrs_a.set(attr, Value::Int64(1));
            data.create_node(vec![], attrs_a);
            let mut attrs_b = AttributeSet::new();
            attrs_b.set(attr, Value::Int64(2));
            data.create_node(vec![], attrs_b);
            data.apply_all_pending(false);
        }
        let mut plan = Plan::new();
        let scan = plan.push(Box::new(AllNodeScan::new(Arc::clone(&graph), 0, 1)));
        let filter = plan.push(Box::new(Filter::new(
            Arc::clone(&graph),
            scan,
            FilterOperand::NodeAttribute(0, attr),
            Comparison::Eq,
            FilterOperand::Literal(Value::Int64(2)),
        )));
        plan.set_root(filter);
        plan.init().unwrap();

        let mut seen = Vec::new();
        while let Some(rec) = plan.run().unwrap() {
            seen.push(rec.get(0).as_node().unwrap());
        }
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn filter_missing_attribute_compares_as_null_and_is_dropped() {
        let graph = make_graph();
        let attr: AttributeId = 1;
        {
            let mut data = graph.acquire_write_lock();
            data.create_node(vec![], AttributeSet::new());
            data.apply_all_pending(false);
        }
        let mut plan = Plan::new();
        let scan = plan.push(Box::new(AllNodeScan::new(Arc::clone(&graph), 0, 1)));
        let filter = plan.push(Box::new(Filter::new(
            Arc::clone(&graph),
            scan,
            FilterOperand::NodeAttribute(0, attr),
            Comparison::Eq,
            FilterOperand::Literal(Value::Int64(2)),
        )));
        plan.set_root(filter);
        plan.init().unwrap();
        assert!(plan.run().unwrap().is_none());
    }
}
