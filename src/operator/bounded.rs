//! `Skip`/`Limit`: discard or cap the number of records from a child
//! stream (spec.md §4.4).

use super::{OpIndex, OpKind, Operator, Plan, Record, RuntimeError, RuntimeResult};

/// The count expression bound to `Skip`/`Limit`. Evaluated once at
/// `init`, against the plan's current parameter bindings — cloning the
/// operator (via `clone_op`) carries the expression itself, not the
/// resolved count, so re-parameterizing a cloned plan and calling `init`
/// again yields a fresh count (spec.md §4.4 "Clone-time re-cloning
/// preserves parameterization").
#[derive(Debug, Clone, PartialEq)]
pub enum CountExpr {
    Literal(i64),
    Param(String),
}

impl CountExpr {
    fn eval(&self, plan: &Plan) -> RuntimeResult<i64> {
        match self {
            CountExpr::Literal(n) => Ok(*n),
            CountExpr::Param(name) => {
                let value = plan.param(name).ok_or_else(|| RuntimeError::UnboundParameter(name.clone()))?;
                value
                    .as_int64()
                    .ok_or_else(|| RuntimeError::TypeMismatch {
                        expected: "int64",
                        found: value.to_string(),
                    })
            }
        }
    }

    fn eval_non_negative(&self, plan: &Plan, name: &'static str) -> RuntimeResult<usize> {
        let n = self.eval(plan)?;
        if n < 0 {
            return Err(RuntimeError::NegativeBound(name));
        }
        Ok(n as usize)
    }
}

#[derive(Debug)]
pub struct Skip {
    child: OpIndex,
    expr: CountExpr,
    remaining: usize,
    discarded: bool,
}

impl Skip {
    pub fn new(child: OpIndex, expr: CountExpr) -> Self {
        Skip { child, expr, remaining: 0, discarded: false }
    }
}

impl Operator for Skip {
    fn init(&mut self, plan: &Plan) -> RuntimeResult<()> {
        self.remaining = self.expr.eval_non_negative(plan, "SKIP")?;
        self.discarded = false;
        Ok(())
    }

    fn consume(&mut self, plan: &Plan) -> RuntimeResult<Option<Record>> {
        if !self.discarded {
            self.discarded = true;
            while self.remaining > 0 {
                if plan.consume(self.child)?.is_none() {
                    return Ok(None);
                }
                self.remaining -= 1;
            }
        }
        plan.consume(self.child)
    }

    fn reset(&mut self, plan: &Plan) -> RuntimeResult<()> {
        plan.reset(self.child)?;
        self.remaining = self.expr.eval_non_negative(plan, "SKIP")?;
        self.discarded = false;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(Skip {
            child: self.child,
            expr: self.expr.clone(),
            remaining: self.remaining,
            discarded: self.discarded,
        })
    }

    fn op_kind(&self) -> OpKind {
        OpKind::Skip
    }

    fn modifies(&self) -> &[usize] {
        &[]
    }
}

#[derive(Debug)]
pub struct Limit {
    child: OpIndex,
    expr: CountExpr,
    remaining: usize,
}

impl Limit {
    pub fn new(child: OpIndex, expr: CountExpr) -> Self {
        Limit { child, expr, remaining: 0 }
    }
}

impl Operator for Limit {
    fn init(&mut self, plan: &Plan) -> RuntimeResult<()> {
        self.remaining = self.expr.eval_non_negative(plan, "LIMIT")?;
        Ok(())
    }

    fn consume(&mut self, plan: &Plan) -> RuntimeResult<Option<Record>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        plan.consume(self.child)
    }

    fn reset(&mut self, plan: &Plan) -> RuntimeResult<()> {
        plan.reset(self.child)?;
        self.remaining = self.expr.eval_non_negative(plan, "LIMIT")?;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(Limit { child: self.child, expr: self.expr.clone(), remaining: self.remaining })
    }

    fn op_kind(&self) -> OpKind {
        OpKind::Limit
    }

    fn modifies(&self) -> &[usize] {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::AllNodeScan;
    use crate::graph::Graph;
    use crate::matrix::MatrixSyncPolicy;
    use crate::value::AttributeSet;
    use std::sync::Arc;

    fn seeded_plan(param: i64) -> (Plan, OpIndex) {
        let graph = Arc::new(Graph::new("g", MatrixSyncPolicy::default()));
        {
            let mut data = graph.acquire_write_lock();
            for _ in 0..6 {
                data.create_node(vec![], AttributeSet::new());
            }
            data.apply_all_pending(false);
        }
        let mut plan = Plan::new();
        let scan = plan.push(Box::new(AllNodeScan::new(graph, 0, 1)));
        let skip = plan.push(Box::new(Skip::new(scan, CountExpr::Param("n".to_string()))));
        plan.set_root(skip);
        let mut params = std::collections::HashMap::new();
        params.insert(std::sync::Arc::from("n"), crate::value::Value::Int64(param));
        plan.set_params(params);
        (plan, skip)
    }

    #[test]
    fn skip_parameter_cloning_matches_seed_scenario() {
        let (mut plan, _) = seeded_plan(2);
        plan.init().unwrap();
        let mut first_run = Vec::new();
        while let Some(rec) = plan.run().unwrap() {
            first_run.push(rec.get(0).as_node().unwrap());
        }
        assert_eq!(first_run.len(), 4);

        let mut cloned = plan.clone_plan();
        let mut params = std::collections::HashMap::new();
        params.insert(std::sync::Arc::from("n"), crate::value::Value::Int64(5));
        cloned.set_params(params);
        cloned.init().unwrap();
        let mut second_run = Vec::new();
        while let Some(rec) = cloned.run().unwrap() {
            second_run.push(rec.get(0).as_node().unwrap());
        }
        assert_eq!(second_run.len(), 1);
    }

    #[test]
    fn skip_larger_than_stream_yields_empty_without_error() {
        let (mut plan, _) = seeded_plan(100);
        plan.init().unwrap();
        assert!(plan.run().unwrap().is_none());
    }

    #[test]
    fn negative_skip_is_a_runtime_error() {
        let (mut plan, _) = seeded_plan(-1);
        assert!(plan.init().is_err());
    }
}
