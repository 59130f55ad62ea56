//! `Apply`/`Argument`: run a right subtree once per left-hand record,
//! with the left record installed in a designated argument slot
//! (spec.md §4.4).

use super::{OpIndex, OpKind, Operator, Plan, Record, RuntimeResult};
use std::cell::RefCell;
use std::rc::Rc;

/// Shared cell an `Apply` writes the current left-hand record into and its
/// paired `Argument` reads from. `Rc<RefCell<_>>` rather than a plan-wide
/// slot because the argument only needs to be visible to the right
/// subtree, not threaded through every intervening operator's record
/// width.
pub type ArgumentSlot = Rc<RefCell<Option<Record>>>;

#[derive(Debug)]
pub struct Apply {
    left: OpIndex,
    right: OpIndex,
    argument: ArgumentSlot,
}

impl Apply {
    pub fn new(left: OpIndex, right: OpIndex, argument: ArgumentSlot) -> Self {
        Apply { left, right, argument }
    }
}

impl Operator for Apply {
    fn init(&mut self, _plan: &Plan) -> RuntimeResult<()> {
        Ok(())
    }

    fn consume(&mut self, plan: &Plan) -> RuntimeResult<Option<Record>> {
        loop {
            if let Some(rhs) = plan.consume(self.right)? {
                return Ok(Some(rhs));
            }
            let Some(left_record) = plan.consume(self.left)? else {
                return Ok(None);
            };
            *self.argument.borrow_mut() = Some(left_record);
            plan.reset(self.right)?;
        }
    }

    fn reset(&mut self, plan: &Plan) -> RuntimeResult<()> {
        plan.reset(self.left)?;
        plan.reset(self.right)?;
        *self.argument.borrow_mut() = None;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(Apply {
            left: self.left,
            right: self.right,
            argument: Rc::new(RefCell::new(self.argument.borrow().clone())),
        })
    }

    fn op_kind(&self) -> OpKind {
        OpKind::Apply
    }

    fn modifies(&self) -> &[usize] {
        &[]
    }
}

/// Yields the left-hand record installed by the enclosing `Apply`, once,
/// then exhausts until the next reset.
#[derive(Debug)]
pub struct Argument {
    slot: ArgumentSlot,
    yielded: bool,
}

impl Argument {
    pub fn new(slot: ArgumentSlot) -> Self {
        Argument { slot, yielded: false }
    }
}

impl Operator for Argument {
    fn init(&mut self, _plan: &Plan) -> RuntimeResult<()> {
        self.yielded = false;
        Ok(())
    }

    fn consume(&mut self, _plan: &Plan) -> RuntimeResult<Option<Record>> {
        if self.yielded {
            return Ok(None);
        }
        self.yielded = true;
        Ok(self.slot.borrow().clone())
    }

    fn reset(&mut self, _plan: &Plan) -> RuntimeResult<()> {
        self.yielded = false;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(Argument { slot: Rc::clone(&self.slot), yielded: self.yielded })
    }

    fn op_kind(&self) -> OpKind {
        OpKind::Argument
    }

    fn modifies(&self) -> &[usize] {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{AllNodeScan, Plan};
    use crate::graph::Graph;
    use crate::matrix::MatrixSyncPolicy;
    use crate::value::AttributeSet;
    use std::sync::Arc;

    #[test]
    fn apply_runs_right_once_per_left_record() {
        let graph = Arc::new(Graph::new("g", MatrixSyncPolicy::default()));
        {
            let mut data = graph.acquire_write_lock();
            for _ in 0..3 {
                data.create_node(vec![], AttributeSet::new());
            }
            data.apply_all_pending(false);
        }
        let mut plan = Plan::new();
        let left = plan.push(Box::new(AllNodeScan::new(Arc::clone(&graph), 0, 2)));
        let argument_slot: ArgumentSlot = Rc::new(RefCell::new(None));
        let right = plan.push(Box::new(Argument::new(Rc::clone(&argument_slot))));
        let apply = plan.push(Box::new(Apply::new(left, right, argument_slot)));
        plan.set_root(apply);
        plan.init().unwrap();

        let mut seen = Vec::new();
        while let Some(rec) = plan.run().unwrap() {
            seen.push(rec.get(0).as_node().unwrap());
        }
        assert_eq!(seen.len(), 3);
    }
}
