//! # Operator Pipeline
//!
//! Pull-based, single-threaded, synchronous execution-plan model
//! (spec.md §4.4). Operators are arena-allocated in [`Plan`] and addressed
//! by integer index rather than by pointer — this is the systems
//! reimplementation of the source's back-pointer-carrying operator graph
//! (spec.md §9 "Cyclic ownership in operators"), and it is what makes
//! `clone_plan` a plain index-remapping copy instead of a pointer-fixup
//! pass.

mod apply;
mod bounded;
mod mutate;
mod project;
mod scan;
mod traverse;

pub use apply::{Apply, Argument};
pub use bounded::{CountExpr, Limit, Skip};
pub use mutate::{Create, Delete, EdgeTemplate, Merge, NodeTemplate, SetClause, TargetRef, Update};
pub use project::{Comparison, Filter, FilterOperand, Project, ProjectColumn};
pub use scan::{AllNodeScan, LoadCsv, NodeByLabelAndIdScan, NodeByLabelScan};
pub use traverse::{ConditionalTraverse, VariableLengthTraverse};

use crate::execution::QueryTimeout;
use crate::graph::GraphError;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while driving a plan. Compile-time errors (syntax, unknown
/// identifiers) are out of scope here (spec.md §1) — this covers only
/// spec.md §7's "runtime exceptions" and "storage errors" categories.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: String },
    #[error("{0} must be a non-negative integer")]
    NegativeBound(&'static str),
    #[error("unbound parameter ${0}")]
    UnboundParameter(String),
    #[error("failed to open CSV source: {0}")]
    CsvOpenFailed(String),
    #[error("query cancelled")]
    Cancelled,
    #[error("query exceeded its timeout")]
    TimedOut,
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// A reference to a graph entity or a scalar, held in one [`Record`] slot.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordSlot {
    Empty,
    Scalar(Value),
    Node(u64),
    Edge(u64),
}

impl RecordSlot {
    pub fn as_node(&self) -> Option<u64> {
        match self {
            RecordSlot::Node(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_edge(&self) -> Option<u64> {
        match self {
            RecordSlot::Edge(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            RecordSlot::Scalar(v) => Some(v),
            _ => None,
        }
    }
}

/// Fixed-width tuple of slots passed between operators (spec.md §3
/// "Record"). Width is set once by the plan builder and shared by every
/// record flowing through it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    slots: Vec<RecordSlot>,
}

impl Record {
    pub fn with_width(width: usize) -> Self {
        Record { slots: vec![RecordSlot::Empty; width] }
    }

    pub fn width(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, slot: usize) -> &RecordSlot {
        &self.slots[slot]
    }

    pub fn set(&mut self, slot: usize, value: RecordSlot) {
        self.slots[slot] = value;
    }
}

/// Tag identifying an operator's concrete kind, exposed for plan
/// introspection (`EXPLAIN`/`PROFILE` style tooling, out of scope here, but
/// the tag itself is part of the operator contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    AllNodeScan,
    NodeByLabelScan,
    NodeByLabelAndIdScan,
    LoadCsv,
    ConditionalTraverse,
    VariableLengthTraverse,
    Skip,
    Limit,
    Create,
    Update,
    Delete,
    Merge,
    Apply,
    Argument,
    Project,
    Filter,
}

/// Opaque index into a [`Plan`]'s operator arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpIndex(u32);

/// Every concrete operator implements this contract (spec.md §4.4).
/// `consume` is the pull primitive: a "none" return means the stream is
/// exhausted. Operators are stateful between calls; `reset` rewinds that
/// state without reallocating so an `Apply` operator can re-run its right
/// subtree once per left-hand record.
pub trait Operator: std::fmt::Debug {
    /// Called once before the first `consume`.
    fn init(&mut self, plan: &Plan) -> RuntimeResult<()>;

    fn consume(&mut self, plan: &Plan) -> RuntimeResult<Option<Record>>;

    /// Rewind to the initial state. Holders of child indices recurse via
    /// `plan.reset(child)`.
    fn reset(&mut self, plan: &Plan) -> RuntimeResult<()>;

    /// Deep structural copy, used to build an independent execution of the
    /// same plan template (e.g. a cloned subplan under re-parameterization).
    fn clone_op(&self) -> Box<dyn Operator>;

    /// Release any external resource (open file handles, detached matrix
    /// iterators). The default is a no-op; operators that own a resource
    /// override it.
    fn free(&mut self) {}

    fn op_kind(&self) -> OpKind;

    /// Record-slot indices this operator writes when it produces a record.
    fn modifies(&self) -> &[usize];
}

/// Arena of operators addressed by [`OpIndex`], plus the bound query
/// parameters consulted by operators like [`Skip`]/[`Limit`] at `init`
/// time. `RefCell` gives each operator independent interior mutability so
/// `consume` can recurse into a child's `consume` through a shared `&Plan`
/// without the arena itself needing `&mut` (spec.md §9 "arena-allocated
/// operators with integer indices").
#[derive(Debug, Default)]
pub struct Plan {
    ops: Vec<RefCell<Box<dyn Operator>>>,
    root: Option<OpIndex>,
    params: HashMap<Arc<str>, Value>,
    timeout: Option<QueryTimeout>,
}

impl Plan {
    pub fn new() -> Self {
        Plan { ops: Vec::new(), root: None, params: HashMap::new(), timeout: None }
    }

    /// Attach per-query cancellation/timeout (spec.md §5), checked at every
    /// `consume` entry rather than threaded through each operator's own
    /// `consume` body.
    pub fn set_timeout(&mut self, timeout: QueryTimeout) {
        self.timeout = Some(timeout);
    }

    /// Push an operator into the arena. Children must already be pushed —
    /// the arena is built bottom-up, so ascending index order is always
    /// children-before-parents.
    pub fn push(&mut self, op: Box<dyn Operator>) -> OpIndex {
        let idx = OpIndex(self.ops.len() as u32);
        self.ops.push(RefCell::new(op));
        idx
    }

    pub fn set_root(&mut self, root: OpIndex) {
        self.root = Some(root);
    }

    pub fn set_params(&mut self, params: HashMap<Arc<str>, Value>) {
        self.params = params;
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Initialize every operator, ascending index order (children first).
    pub fn init(&self) -> RuntimeResult<()> {
        tracing::debug!(ops = self.ops.len(), "plan_init");
        for op in &self.ops {
            op.borrow_mut().init(self)?;
        }
        Ok(())
    }

    pub fn consume(&self, idx: OpIndex) -> RuntimeResult<Option<Record>> {
        if let Some(timeout) = &self.timeout {
            if timeout.is_cancelled() {
                tracing::debug!("query_cancelled");
                return Err(RuntimeError::Cancelled);
            }
            if timeout.check().is_err() {
                tracing::debug!("query_timed_out");
                return Err(RuntimeError::TimedOut);
            }
        }
        self.ops[idx.0 as usize].borrow_mut().consume(self)
    }

    pub fn reset(&self, idx: OpIndex) -> RuntimeResult<()> {
        self.ops[idx.0 as usize].borrow_mut().reset(self)
    }

    pub fn run(&self) -> RuntimeResult<Option<Record>> {
        let root = self.root.expect("plan executed before set_root");
        self.consume(root)
    }

    pub fn free_all(&self) {
        for op in &self.ops {
            op.borrow_mut().free();
        }
    }

    /// Index-remapping deep copy: since every operator's children are
    /// addressed by `OpIndex` and the arena order is preserved, cloning
    /// each slot in place yields a structurally identical, independently
    /// mutable plan with no pointer fix-up needed.
    pub fn clone_plan(&self) -> Plan {
        Plan {
            ops: self.ops.iter().map(|op| RefCell::new(op.borrow().clone_op())).collect(),
            root: self.root,
            params: self.params.clone(),
            timeout: self.timeout.clone(),
        }
    }
}
