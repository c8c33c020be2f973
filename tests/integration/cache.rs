//! Cache concurrency: single-flight builds, waiter error propagation and
//! statistics under parallel compilation.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use filterql::compiler::ConditionCompiler;
use filterql::config::{CachePolicy, DslPolicy};
use filterql::model::{FilterRequest, Operator};

use crate::support::{definition, CountingContext, MemBackend};

fn request(expr: &str) -> FilterRequest {
    FilterRequest::builder()
        .filter("f1", definition("A", Operator::Eq, "v1"))
        .filter("f2", definition("B", Operator::Ne, "v2"))
        .combine_with(expr)
        .build()
        .unwrap()
}

#[test]
fn concurrent_compiles_build_each_leaf_at_most_once() {
    let compiler: Arc<ConditionCompiler<MemBackend>> = Arc::new(ConditionCompiler::new(
        DslPolicy::defaults(),
        CachePolicy::default(),
    ));
    let context = Arc::new(CountingContext::with_delay(Duration::from_millis(25)));
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let compiler = Arc::clone(&compiler);
            let context = Arc::clone(&context);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let compiled = compiler.compile(&request("f1 & f2"), &*context).unwrap();
                compiled.key().to_string()
            })
        })
        .collect();

    let keys: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(keys.windows(2).all(|w| w[0] == w[1]));
    // Two distinct (name, ref, op) triples in the expression; the build ran
    // once despite eight concurrent compiles.
    assert_eq!(context.calls(), 2);

    let stats = compiler.cache().stats();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.hits + stats.misses, threads as u64);
}

#[test]
fn different_structures_build_separately() {
    let compiler: ConditionCompiler<MemBackend> =
        ConditionCompiler::new(DslPolicy::defaults(), CachePolicy::default());
    let context = CountingContext::new();

    compiler.compile(&request("f1 & f2"), &context).unwrap();
    compiler.compile(&request("f1 | f2"), &context).unwrap();
    compiler.compile(&request("f1"), &context).unwrap();

    let stats = compiler.cache().stats();
    assert_eq!(stats.size, 3);
    // 2 + 2 + 1 leaves across three distinct structures.
    assert_eq!(context.calls(), 5);
}

#[test]
fn clear_forces_a_rebuild() {
    let compiler: ConditionCompiler<MemBackend> =
        ConditionCompiler::new(DslPolicy::defaults(), CachePolicy::default());
    let context = CountingContext::new();

    compiler.compile(&request("f1 & f2"), &context).unwrap();
    compiler.cache().clear();
    compiler.compile(&request("f1 & f2"), &context).unwrap();

    assert_eq!(context.calls(), 4);
    assert_eq!(compiler.cache().stats().size, 1);
}

#[test]
fn eviction_respects_the_size_bound() {
    let compiler: ConditionCompiler<MemBackend> =
        ConditionCompiler::new(DslPolicy::defaults(), CachePolicy { max_size: 2 });
    let context = CountingContext::new();

    compiler.compile(&request("f1"), &context).unwrap();
    compiler.compile(&request("f2"), &context).unwrap();
    compiler.compile(&request("f1 & f2"), &context).unwrap();

    let stats = compiler.cache().stats();
    assert_eq!(stats.size, 2);
    assert_eq!(stats.evictions, 1);
}
