//! Benchmarks for spark-tree
//!
//! Run with: cargo bench

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use serde_json::{Value, json};
use spark_tree::{Node, batch};

fn form(fields: usize) -> Value {
    let map: serde_json::Map<String, Value> = (0..fields)
        .map(|i| (format!("field{i}"), json!({"value": i, "touched": false})))
        .collect();
    Value::Object(map)
}

// =============================================================================
// CONSTRUCTION + READS
// =============================================================================

fn bench_node_create(c: &mut Criterion) {
    let value = form(20);
    c.bench_function("node_create_20_fields", |b| {
        b.iter(|| black_box(Node::new(value.clone())))
    });
}

fn bench_value_cached(c: &mut Criterion) {
    let root = Node::new(form(20));
    let _ = root.value();
    c.bench_function("value_cached", |b| b.iter(|| black_box(root.value())));
}

fn bench_value_after_leaf_write(c: &mut Criterion) {
    let root = Node::new(form(20));
    let leaf = root.at_path(["field10", "value"]);
    let mut n = 0;
    c.bench_function("value_after_leaf_write", |b| {
        b.iter(|| {
            n += 1;
            leaf.set(json!(n));
            black_box(root.value())
        })
    });
}

fn bench_navigation(c: &mut Criterion) {
    let root = Node::new(form(20));
    c.bench_function("at_path_existing", |b| {
        b.iter(|| black_box(root.at_path(["field19", "touched"])))
    });
}

// =============================================================================
// WRITES
// =============================================================================

fn bench_leaf_set(c: &mut Criterion) {
    let root = Node::new(form(20));
    let leaf = root.at_path(["field0", "value"]);
    let _unwatch = root.watch(|_, _| {});
    let mut n = 0;
    c.bench_function("leaf_set_with_root_watcher", |b| {
        b.iter(|| {
            n += 1;
            leaf.set(black_box(json!(n)))
        })
    });
}

fn bench_set_same_value(c: &mut Criterion) {
    let value = form(20);
    let root = Node::new(value.clone());
    c.bench_function("root_set_same_value", |b| {
        b.iter(|| root.set(black_box(value.clone())))
    });
}

fn bench_replace_object(c: &mut Criterion) {
    let mut group = c.benchmark_group("root_set_alternating");
    for fields in [10, 100] {
        let (a, b_value) = (form(fields), form(fields / 2));
        let root = Node::new(a.clone());
        group.bench_with_input(BenchmarkId::from_parameter(fields), &fields, |b, _| {
            b.iter(|| {
                root.set(b_value.clone());
                root.set(a.clone())
            })
        });
    }
    group.finish();
}

fn bench_array_insert_front(c: &mut Criterion) {
    c.bench_function("array_insert_front_100", |b| {
        b.iter(|| {
            let list = Node::new(json!([]));
            for i in 0..100 {
                list.insert(0, json!(i)).ok();
            }
            black_box(list)
        })
    });
}

fn bench_batched_writes(c: &mut Criterion) {
    let root = Node::new(form(20));
    let leaves: Vec<Node> = (0..20)
        .map(|i| root.at(format!("field{i}")).at("touched"))
        .collect();
    let _unwatch = root.watch(|_, _| {});
    let mut flag = false;
    c.bench_function("batched_20_writes", |b| {
        b.iter(|| {
            flag = !flag;
            batch(|| {
                for leaf in &leaves {
                    leaf.set(json!(flag));
                }
            })
        })
    });
}

criterion_group!(
    read_benches,
    bench_node_create,
    bench_value_cached,
    bench_value_after_leaf_write,
    bench_navigation,
);

criterion_group!(
    write_benches,
    bench_leaf_set,
    bench_set_same_value,
    bench_replace_object,
    bench_array_insert_front,
    bench_batched_writes,
);

criterion_main!(read_benches, write_benches);
