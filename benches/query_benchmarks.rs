use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use graphcore::graph::Graph;
use graphcore::matrix::MatrixSyncPolicy;
use graphcore::operator::{AllNodeScan, CountExpr, Limit, NodeByLabelScan, Plan, Skip};
use graphcore::value::AttributeSet;
use std::sync::Arc;

const LABEL: u16 = 1;

fn seeded_graph(n: usize) -> Arc<Graph> {
    let graph = Arc::new(Graph::new("bench", MatrixSyncPolicy::default()));
    let mut data = graph.acquire_write_lock();
    for i in 0..n {
        let labels = if i % 2 == 0 { vec![LABEL] } else { vec![] };
        data.create_node(labels, AttributeSet::new());
    }
    data.apply_all_pending(true);
    drop(data);
    graph
}

fn bench_all_node_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("all_node_scan");
    for &n in &[1_000usize, 10_000, 100_000] {
        let graph = seeded_graph(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let mut plan = Plan::new();
                let scan = plan.push(Box::new(AllNodeScan::new(Arc::clone(&graph), 0, 1)));
                plan.set_root(scan);
                plan.init().unwrap();
                let mut count = 0usize;
                while plan.run().unwrap().is_some() {
                    count += 1;
                }
                count
            });
        });
    }
    group.finish();
}

fn bench_label_scan_with_skip_and_limit(c: &mut Criterion) {
    let mut group = c.benchmark_group("label_scan_skip_limit");
    for &n in &[1_000usize, 10_000, 100_000] {
        let graph = seeded_graph(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let mut plan = Plan::new();
                let scan = plan.push(Box::new(NodeByLabelScan::new(
                    Arc::clone(&graph),
                    LABEL,
                    None,
                    (0, n - 1),
                    0,
                    1,
                )));
                let skip = plan.push(Box::new(Skip::new(scan, CountExpr::Literal(10))));
                let limit = plan.push(Box::new(Limit::new(skip, CountExpr::Literal(100))));
                plan.set_root(limit);
                plan.init().unwrap();
                let mut count = 0usize;
                while plan.run().unwrap().is_some() {
                    count += 1;
                }
                count
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_all_node_scan, bench_label_scan_with_skip_and_limit);
criterion_main!(benches);
