//! Source operators: produce records from a matrix iterator or an external
//! reader rather than from graph children (spec.md §4.4).

use super::{OpKind, Operator, Plan, Record, RecordSlot, RuntimeError, RuntimeResult};
use crate::entity::{EntityId, LabelId};
use crate::graph::Graph;
use crate::matrix::MatrixIter;
use std::io::{BufRead, BufReader};
use std::sync::Arc;

/// Scans every live node, ignoring labels.
#[derive(Debug)]
pub struct AllNodeScan {
    graph: Arc<Graph>,
    output_slot: usize,
    width: usize,
    ids: Vec<EntityId>,
    cursor: usize,
}

impl AllNodeScan {
    pub fn new(graph: Arc<Graph>, output_slot: usize, width: usize) -> Self {
        AllNodeScan { graph, output_slot, width, ids: Vec::new(), cursor: 0 }
    }

    fn snapshot(&mut self) {
        let data = self.graph.acquire_read_lock();
        self.ids = data.node_store().iter().map(|(id, _)| id).collect();
        self.cursor = 0;
    }
}

impl Operator for AllNodeScan {
    fn init(&mut self, _plan: &Plan) -> RuntimeResult<()> {
        self.snapshot();
        Ok(())
    }

    fn consume(&mut self, _plan: &Plan) -> RuntimeResult<Option<Record>> {
        if self.cursor >= self.ids.len() {
            return Ok(None);
        }
        let id = self.ids[self.cursor];
        self.cursor += 1;
        let mut record = Record::with_width(self.width);
        record.set(self.output_slot, RecordSlot::Node(id));
        Ok(Some(record))
    }

    fn reset(&mut self, _plan: &Plan) -> RuntimeResult<()> {
        self.cursor = 0;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(AllNodeScan {
            graph: Arc::clone(&self.graph),
            output_slot: self.output_slot,
            width: self.width,
            ids: self.ids.clone(),
            cursor: self.cursor,
        })
    }

    fn op_kind(&self) -> OpKind {
        OpKind::AllNodeScan
    }

    fn modifies(&self) -> &[usize] {
        std::slice::from_ref(&self.output_slot)
    }
}

#[derive(Debug)]
enum LabelScanMode {
    Uninitialized,
    NoOp,
    Standalone(MatrixIter<bool>),
    ChildDriven { current: Option<MatrixIter<bool>> },
}

/// Scans nodes carrying a given label, optionally restricted to an id range
/// and optionally driven by a parameter-binding child (spec.md §4.4).
#[derive(Debug)]
pub struct NodeByLabelScan {
    graph: Arc<Graph>,
    label: LabelId,
    child: Option<super::OpIndex>,
    range: (usize, usize),
    output_slot: usize,
    width: usize,
    mode: LabelScanMode,
    pending_child_record: Option<Record>,
}

impl NodeByLabelScan {
    pub fn new(
        graph: Arc<Graph>,
        label: LabelId,
        child: Option<super::OpIndex>,
        range: (usize, usize),
        output_slot: usize,
        width: usize,
    ) -> Self {
        NodeByLabelScan {
            graph,
            label,
            child,
            range,
            output_slot,
            width,
            mode: LabelScanMode::Uninitialized,
            pending_child_record: None,
        }
    }

    fn build_iterator(&self) -> LabelScanMode {
        let data = self.graph.acquire_read_lock();
        let Some(matrix) = data.label_matrix(self.label) else {
            return LabelScanMode::NoOp;
        };
        let nrows = matrix.nrows();
        if nrows == 0 || self.range.0 >= nrows {
            return LabelScanMode::NoOp;
        }
        let rmax = self.range.1.min(nrows - 1);
        if rmax < self.range.0 {
            return LabelScanMode::NoOp;
        }
        match matrix.attach_range(self.range.0, rmax) {
            Ok(iter) => LabelScanMode::Standalone(iter),
            Err(_) => LabelScanMode::NoOp,
        }
    }
}

impl Operator for NodeByLabelScan {
    fn init(&mut self, _plan: &Plan) -> RuntimeResult<()> {
        if self.child.is_some() {
            self.mode = LabelScanMode::ChildDriven { current: None };
        } else {
            self.mode = self.build_iterator();
        }
        Ok(())
    }

    fn consume(&mut self, plan: &Plan) -> RuntimeResult<Option<Record>> {
        match &mut self.mode {
            LabelScanMode::Uninitialized | LabelScanMode::NoOp => Ok(None),
            LabelScanMode::Standalone(iter) => {
                let Some((row, _, _)) = iter.next() else {
                    return Ok(None);
                };
                let mut record = Record::with_width(self.width);
                record.set(self.output_slot, RecordSlot::Node(row as EntityId));
                Ok(Some(record))
            }
            LabelScanMode::ChildDriven { .. } => {
                let child = self.child.expect("child-driven mode implies a child index");
                loop {
                    let needs_new_iter = matches!(
                        &self.mode,
                        LabelScanMode::ChildDriven { current: None }
                    ) || matches!(
                        &self.mode,
                        LabelScanMode::ChildDriven { current: Some(it) } if it.is_exhausted()
                    );
                    if needs_new_iter {
                        let Some(child_record) = plan.consume(child)? else {
                            return Ok(None);
                        };
                        let rebuilt = self.build_iterator();
                        let LabelScanMode::ChildDriven { current } = &mut self.mode else {
                            unreachable!()
                        };
                        *current = match rebuilt {
                            LabelScanMode::Standalone(it) => Some(it),
                            _ => None,
                        };
                        self.pending_child_record = Some(child_record);
                        if current.is_none() {
                            continue;
                        }
                    }
                    let LabelScanMode::ChildDriven { current: Some(it) } = &mut self.mode else {
                        continue;
                    };
                    match it.next() {
                        Some((row, _, _)) => {
                            let mut record = self
                                .pending_child_record
                                .clone()
                                .unwrap_or_else(|| Record::with_width(self.width));
                            record.set(self.output_slot, RecordSlot::Node(row as EntityId));
                            return Ok(Some(record));
                        }
                        None => continue,
                    }
                }
            }
        }
    }

    fn reset(&mut self, plan: &Plan) -> RuntimeResult<()> {
        if let Some(child) = self.child {
            plan.reset(child)?;
            self.pending_child_record = None;
            self.mode = LabelScanMode::ChildDriven { current: None };
        } else {
            self.mode = self.build_iterator();
        }
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(NodeByLabelScan {
            graph: Arc::clone(&self.graph),
            label: self.label,
            child: self.child,
            range: self.range,
            output_slot: self.output_slot,
            width: self.width,
            mode: LabelScanMode::Uninitialized,
            pending_child_record: None,
        })
    }

    fn op_kind(&self) -> OpKind {
        OpKind::NodeByLabelScan
    }

    fn modifies(&self) -> &[usize] {
        std::slice::from_ref(&self.output_slot)
    }
}

/// Direct O(1) lookup of a single node id, optionally checked against a
/// label.
#[derive(Debug)]
pub struct NodeByLabelAndIdScan {
    graph: Arc<Graph>,
    label: Option<LabelId>,
    id: EntityId,
    output_slot: usize,
    width: usize,
    done: bool,
}

impl NodeByLabelAndIdScan {
    pub fn new(
        graph: Arc<Graph>,
        label: Option<LabelId>,
        id: EntityId,
        output_slot: usize,
        width: usize,
    ) -> Self {
        NodeByLabelAndIdScan { graph, label, id, output_slot, width, done: false }
    }
}

impl Operator for NodeByLabelAndIdScan {
    fn init(&mut self, _plan: &Plan) -> RuntimeResult<()> {
        self.done = false;
        Ok(())
    }

    fn consume(&mut self, _plan: &Plan) -> RuntimeResult<Option<Record>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        let data = self.graph.acquire_read_lock();
        let Some(node) = data.get_node(self.id) else {
            return Ok(None);
        };
        if let Some(label) = self.label {
            if !node.has_label(label) {
                return Ok(None);
            }
        }
        let mut record = Record::with_width(self.width);
        record.set(self.output_slot, RecordSlot::Node(self.id));
        Ok(Some(record))
    }

    fn reset(&mut self, _plan: &Plan) -> RuntimeResult<()> {
        self.done = false;
        Ok(())
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(NodeByLabelAndIdScan {
            graph: Arc::clone(&self.graph),
            label: self.label,
            id: self.id,
            output_slot: self.output_slot,
            width: self.width,
            done: self.done,
        })
    }

    fn op_kind(&self) -> OpKind {
        OpKind::NodeByLabelAndIdScan
    }

    fn modifies(&self) -> &[usize] {
        std::slice::from_ref(&self.output_slot)
    }
}

/// Splits one CSV line into fields, honoring double-quoted fields with
/// embedded commas and doubled-quote escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Streams rows from a CSV file, one record per row. With headers, each row
/// is a map from header name to field; without, a plain array of fields.
/// The URI is a constant path bound at construction — the query-language
/// expression evaluator that would otherwise supply it dynamically is out
/// of scope here.
#[derive(Debug)]
pub struct LoadCsv {
    uri: String,
    with_headers: bool,
    output_slot: usize,
    width: usize,
    header: Option<Vec<String>>,
    reader: Option<BufReader<std::fs::File>>,
}

impl LoadCsv {
    pub fn new(uri: String, with_headers: bool, output_slot: usize, width: usize) -> Self {
        LoadCsv { uri, with_headers, output_slot, width, header: None, reader: None }
    }

    fn read_line(&mut self) -> RuntimeResult<Option<String>> {
        let reader = self.reader.as_mut().expect("init opens the reader before first consume");
        let mut line = String::new();
        let bytes = reader
            .read_line(&mut line)
            .map_err(|e| RuntimeError::CsvOpenFailed(e.to_string()))?;
        if bytes == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }
}

impl Operator for LoadCsv {
    fn init(&mut self, _plan: &Plan) -> RuntimeResult<()> {
        let file = std::fs::File::open(&self.uri)
            .map_err(|e| RuntimeError::CsvOpenFailed(format!("{}: {e}", self.uri)))?;
        self.reader = Some(BufReader::new(file));
        self.header = None;
        if self.with_headers {
            if let Some(line) = self.read_line()? {
                self.header = Some(split_csv_line(&line));
            }
        }
        Ok(())
    }

    fn consume(&mut self, _plan: &Plan) -> RuntimeResult<Option<Record>> {
        let Some(line) = self.read_line()? else {
            return Ok(None);
        };
        let fields = split_csv_line(&line);
        let value = match &self.header {
            Some(header) => {
                let mut map = crate::value::MapEntries::new();
                for (name, field) in header.iter().zip(fields.into_iter()) {
                    map.insert(Arc::from(name.as_str()), crate::value::Value::String(Arc::from(field)));
                }
                crate::value::Value::Map(map)
            }
            None => crate::value::Value::Array(
                fields.into_iter().map(|f| crate::value::Value::String(Arc::from(f))).collect(),
            ),
        };
        let mut record = Record::with_width(self.width);
        record.set(self.output_slot, RecordSlot::Scalar(value));
        Ok(Some(record))
    }

    fn reset(&mut self, plan: &Plan) -> RuntimeResult<()> {
        self.free();
        self.init(plan)
    }

    fn clone_op(&self) -> Box<dyn Operator> {
        Box::new(LoadCsv {
            uri: self.uri.clone(),
            with_headers: self.with_headers,
            output_slot: self.output_slot,
            width: self.width,
            header: None,
            reader: None,
        })
    }

    fn free(&mut self) {
        self.reader = None;
    }

    fn op_kind(&self) -> OpKind {
        OpKind::LoadCsv
    }

    fn modifies(&self) -> &[usize] {
        std::slice::from_ref(&self.output_slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::MatrixSyncPolicy;
    use crate::value::AttributeSet;

    fn test_graph() -> Arc<Graph> {
        let graph = Arc::new(Graph::new("g", MatrixSyncPolicy::default()));
        {
            let mut data = graph.acquire_write_lock();
            for i in 0..10 {
                let labels = if i % 2 == 0 { vec![1] } else { vec![] };
                data.create_node(labels, AttributeSet::new());
            }
            data.apply_all_pending(false);
        }
        graph
    }

    #[test]
    fn all_node_scan_yields_every_node() {
        let graph = test_graph();
        let mut plan = Plan::new();
        let scan = plan.push(Box::new(AllNodeScan::new(Arc::clone(&graph), 0, 1)));
        plan.set_root(scan);
        plan.init().unwrap();
        let mut ids = Vec::new();
        while let Some(rec) = plan.run().unwrap() {
            ids.push(rec.get(0).as_node().unwrap());
        }
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn label_scan_with_range_matches_seed_scenario() {
        let graph = test_graph();
        let mut plan = Plan::new();
        let scan = plan.push(Box::new(NodeByLabelScan::new(
            Arc::clone(&graph),
            1,
            None,
            (0, 5),
            0,
            1,
        )));
        plan.set_root(scan);
        plan.init().unwrap();
        let mut ids = Vec::new();
        while let Some(rec) = plan.run().unwrap() {
            ids.push(rec.get(0).as_node().unwrap());
        }
        assert_eq!(ids, vec![0, 2, 4]);
    }

    #[test]
    fn label_scan_over_unknown_label_exhausts_immediately() {
        let graph = test_graph();
        let mut plan = Plan::new();
        let scan = plan.push(Box::new(NodeByLabelScan::new(
            Arc::clone(&graph),
            99,
            None,
            (0, 100),
            0,
            1,
        )));
        plan.set_root(scan);
        plan.init().unwrap();
        assert!(plan.run().unwrap().is_none());
    }

    #[test]
    fn node_by_label_and_id_scan_checks_label() {
        let graph = test_graph();
        let mut plan = Plan::new();
        let scan = plan.push(Box::new(NodeByLabelAndIdScan::new(
            Arc::clone(&graph),
            Some(1),
            1,
            0,
            1,
        )));
        plan.set_root(scan);
        plan.init().unwrap();
        assert!(plan.run().unwrap().is_none());
    }

    #[test]
    fn split_csv_line_handles_quoted_commas() {
        let fields = split_csv_line(r#"a,"b,c",d"#);
        assert_eq!(fields, vec!["a", "b,c", "d"]);
    }
}
