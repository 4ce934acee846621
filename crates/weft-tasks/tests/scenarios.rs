//! End-to-end workflow scenarios over the blocking pool.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context;
use parking_lot::Mutex;

use weft_dag::{
    Error, InputBinding, Outcome, Pointer, RawOutputs, ResourceBudget, Task, TaskArgs,
    TaskState, WorkflowManager,
};
use weft_pool::BlockingPool;
use weft_tasks::{FnTask, ValueDatum, arg_value};

fn trace_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn num(args: &TaskArgs, name: &str) -> anyhow::Result<i64> {
    arg_value(args, name)?
        .as_i64()
        .with_context(|| format!("argument `{name}` is not a number"))
}

fn one_output(name: &str, value: i64) -> RawOutputs {
    let mut out = BTreeMap::new();
    out.insert(name.to_string(), Pointer::Value(value.into()));
    out
}

#[tokio::test]
async fn diamond_of_arithmetic_tasks_multiplies_out() {
    trace_init();
    let x = ValueDatum::with_value(3);
    let t0 = FnTask::new("t0", |args| Ok(one_output("out", num(&args, "x")? + 1)))
        .with_input("x", x)
        .with_output("out")
        .build();
    let t1 = FnTask::new("t1", |args| Ok(one_output("out", num(&args, "x")? + 1)))
        .with_upstream("x", &t0, "out")
        .with_output("out")
        .build();
    let t2 = FnTask::new("t2", |args| Ok(one_output("out", num(&args, "x")? * 2)))
        .with_upstream("x", &t0, "out")
        .with_output("out")
        .build();
    let t3 = FnTask::new("t3", |args| {
        Ok(one_output("out", num(&args, "x")? * num(&args, "y")?))
    })
    .with_upstream("x", &t1, "out")
    .with_upstream("y", &t2, "out")
    .with_output("out")
    .build();

    let mut manager = WorkflowManager::new(t3, BlockingPool::with_default_capacity()).unwrap();
    let report = manager.run().await.unwrap();

    assert_eq!(report.outcome, Outcome::Complete);
    assert!(report.tasks.values().all(|s| *s == TaskState::Complete));

    let (_, datum) = &manager.outputs("t3").unwrap()[0];
    assert_eq!(datum.pointer(), Some(Pointer::Value(40i64.into())));
}

#[tokio::test]
async fn mid_chain_failure_strands_the_tail() {
    trace_init();
    let a = FnTask::new("a", |_| Ok(one_output("out", 1)))
        .with_output("out")
        .build();
    let b = FnTask::new("b", |_| anyhow::bail!("deliberate failure"))
        .with_upstream("x", &a, "out")
        .with_output("out")
        .build();
    let c = FnTask::new("c", |args| Ok(one_output("out", num(&args, "x")?)))
        .with_upstream("x", &b, "out")
        .with_output("out")
        .build();

    let mut manager = WorkflowManager::new(c, BlockingPool::with_default_capacity()).unwrap();
    let report = manager.run().await.unwrap();

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(report.tasks["a"], TaskState::Complete);
    assert_eq!(report.tasks["b"], TaskState::Failed);
    assert_eq!(report.tasks["c"], TaskState::Waiting);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].error.contains("deliberate failure"));
    assert_eq!(report.stuck, ["c"]);
}

#[tokio::test]
async fn gpu_budget_caps_concurrency_and_preserves_order() {
    trace_init();
    let order = Arc::new(Mutex::new(Vec::<String>::new()));
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let workers: Vec<Arc<dyn Task>> = (0..4)
        .map(|i| {
            let name = format!("s{i}");
            let order = order.clone();
            let current = current.clone();
            let peak = peak.clone();
            let body_name = name.clone();
            FnTask::new(name, move |_| {
                order.lock().push(body_name.clone());
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(25));
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(one_output("out", i as i64))
            })
            .with_output("out")
            .with_resource("gpu", 1)
            .build()
        })
        .collect();

    let mut sink = FnTask::new("sink", |_| Ok(RawOutputs::new()));
    for (i, worker) in workers.iter().enumerate() {
        sink = sink.with_upstream(format!("in{i}"), worker, "out");
    }

    let budget = ResourceBudget::unbounded().with("gpu", 2);
    let mut manager =
        WorkflowManager::with_budget(sink.build(), BlockingPool::new(4), budget).unwrap();
    let report = manager.run().await.unwrap();

    assert_eq!(report.outcome, Outcome::Complete);
    assert!(peak.load(Ordering::SeqCst) <= 2);

    // Admission is deterministic even though completion within a wave is
    // not: the first wave is s0/s1, the second s2/s3.
    let order = order.lock();
    let mut first: Vec<_> = order[..2].to_vec();
    first.sort();
    assert_eq!(first, ["s0", "s1"]);
    let mut second: Vec<_> = order[2..].to_vec();
    second.sort();
    assert_eq!(second, ["s2", "s3"]);
}

#[tokio::test]
async fn mutual_dependency_is_rejected_before_any_dispatch() {
    trace_init();
    let ran = Arc::new(AtomicBool::new(false));
    let a = Arc::new(
        FnTask::new("a", {
            let ran = ran.clone();
            move |_| {
                ran.store(true, Ordering::SeqCst);
                Ok(RawOutputs::new())
            }
        })
        .with_output("out"),
    );
    let a_dyn: Arc<dyn Task> = a.clone();
    let b = FnTask::new("b", {
        let ran = ran.clone();
        move |_| {
            ran.store(true, Ordering::SeqCst);
            Ok(RawOutputs::new())
        }
    })
    .with_output("out")
    .with_upstream("x", &a_dyn, "out")
    .build();
    a.bind(InputBinding::output("y", &b, "out"));

    let err = WorkflowManager::new(b, BlockingPool::with_default_capacity()).unwrap_err();
    assert!(matches!(err, Error::CyclicGraph { .. }));
    assert!(!ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn demand_beyond_the_budget_fails_construction() {
    trace_init();
    let task = FnTask::new("greedy", |_| Ok(RawOutputs::new()))
        .with_output("out")
        .with_resource("gpu", 4)
        .build();

    let budget = ResourceBudget::unbounded().with("gpu", 2);
    let err = WorkflowManager::with_budget(task, BlockingPool::with_default_capacity(), budget)
        .unwrap_err();
    assert!(matches!(err, Error::UnsatisfiableResource { .. }));
}

#[tokio::test]
async fn cancellation_interrupts_exactly_once_and_strands_the_tail() {
    trace_init();
    let interrupts = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(AtomicBool::new(false));
    let stop = Arc::new(AtomicBool::new(false));

    let t1 = FnTask::new("t1", |_| Ok(one_output("out", 1)))
        .with_output("out")
        .build();
    let t2 = FnTask::new("t2", {
        let started = started.clone();
        let stop = stop.clone();
        move |_| {
            started.store(true, Ordering::SeqCst);
            while !stop.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
            anyhow::bail!("stopped by interrupt")
        }
    })
    .with_upstream("x", &t1, "out")
    .with_output("out")
    .on_interrupt({
        let interrupts = interrupts.clone();
        let stop = stop.clone();
        move || {
            interrupts.fetch_add(1, Ordering::SeqCst);
            stop.store(true, Ordering::SeqCst);
        }
    })
    .build();
    let t3 = FnTask::new("t3", |_| Ok(RawOutputs::new()))
        .with_upstream("x", &t2, "out")
        .build();

    let mut manager =
        WorkflowManager::new(t3, BlockingPool::with_default_capacity()).unwrap();
    let cancel = manager.cancel_handle();
    let canceller = {
        let started = started.clone();
        tokio::spawn(async move {
            while !started.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            cancel.cancel();
            cancel.cancel();
        })
    };

    let report = manager.run().await.unwrap();
    canceller.await.unwrap();

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(interrupts.load(Ordering::SeqCst), 1);
    assert_eq!(report.tasks["t1"], TaskState::Complete);
    assert_eq!(report.tasks["t2"], TaskState::Failed);
    assert_eq!(report.tasks["t3"], TaskState::Waiting);
}

#[tokio::test]
async fn parents_complete_before_children_start() {
    trace_init();
    let events = Arc::new(Mutex::new(Vec::<String>::new()));

    let make = |name: &str, events: &Arc<Mutex<Vec<String>>>| {
        let events = events.clone();
        let tag = name.to_string();
        FnTask::new(name, move |_| {
            events.lock().push(format!("start {tag}"));
            std::thread::sleep(Duration::from_millis(10));
            events.lock().push(format!("end {tag}"));
            Ok(one_output("out", 0))
        })
    };

    let parent = make("parent", &events).with_output("out").build();
    let child = make("child", &events)
        .with_upstream("x", &parent, "out")
        .with_output("out")
        .build();

    let mut manager =
        WorkflowManager::new(child, BlockingPool::with_default_capacity()).unwrap();
    let report = manager.run().await.unwrap();
    assert_eq!(report.outcome, Outcome::Complete);

    let events = events.lock();
    let pos = |tag: &str| events.iter().position(|e| e == tag).unwrap();
    assert!(pos("end parent") < pos("start child"));
}
