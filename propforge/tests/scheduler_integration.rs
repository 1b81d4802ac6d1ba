//! Scheduler semantics driven end-to-end: seed-reproducible interleavings
//! over real awaited futures.

use std::sync::{Arc, Mutex};

use propforge::{RandomSource, Scheduler};

#[tokio::test]
async fn both_interleavings_are_reachable_across_seeds() {
    // Scenario: two scheduled tasks; different seeds must be able to
    // produce both resolution orders.
    let mut orders = std::collections::HashSet::new();
    for seed in 0..32u64 {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::from_seed(seed);

        let log_a = log.clone();
        let a = scheduler.schedule_function("a", move || {
            log_a.lock().unwrap().push("a");
        });
        let log_b = log.clone();
        let b = scheduler.schedule_function("b", move || {
            log_b.lock().unwrap().push("b");
        });

        scheduler.wait_all().unwrap();
        a.await;
        b.await;

        let order = log.lock().unwrap().join(",");
        orders.insert(order);
    }
    assert!(orders.contains("a,b"));
    assert!(orders.contains("b,a"));
}

#[tokio::test]
async fn interleavings_replay_under_the_same_seed() {
    let run = |seed: u64| {
        let mut scheduler = Scheduler::from_seed(seed);
        for i in 0..6 {
            let _ = scheduler.schedule(format!("task-{}", i), i);
        }
        let mut labels = Vec::new();
        while scheduler.count() > 0 {
            labels.push(scheduler.wait_one().unwrap());
        }
        labels
    };
    assert_eq!(run(1234), run(1234));
    // Creation order confers no priority: at least one seed deviates from it.
    let in_creation_order = (0..16u64)
        .map(run)
        .filter(|labels| {
            labels
                .iter()
                .enumerate()
                .all(|(i, l)| l == &format!("task-{}", i))
        })
        .count();
    assert!(in_creation_order < 16);
}

#[tokio::test]
async fn wait_one_never_resolves_a_non_pending_task() {
    let mut scheduler = Scheduler::from_seed(7);
    let first = scheduler.schedule("first", 1u8);

    assert_eq!(scheduler.count(), 1);
    let released = scheduler.wait_one().unwrap();
    assert_eq!(released, "first");
    assert_eq!(first.await, 1);

    // Nothing is pending anymore: releasing again is an error, and a task
    // scheduled later is unaffected by the earlier drain.
    assert!(scheduler.wait_one().is_err());
    let second = scheduler.schedule("second", 2u8);
    assert_eq!(scheduler.wait_one().unwrap(), "second");
    assert_eq!(second.await, 2);
}

#[tokio::test]
async fn sequences_interleave_with_independent_tasks_but_keep_their_order() {
    for seed in 0..24u64 {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::from_seed(seed);

        let steps: Vec<(String, Box<dyn FnOnce() -> () + Send>)> = ["s0", "s1", "s2"]
            .into_iter()
            .map(|name| {
                let log = log.clone();
                (
                    name.to_string(),
                    Box::new(move || {
                        log.lock().unwrap().push(name.to_string());
                    }) as Box<dyn FnOnce() -> () + Send>,
                )
            })
            .collect();
        let step_futures = scheduler.schedule_sequence(steps);

        let log_free = log.clone();
        let free = scheduler.schedule_function("free", move || {
            log_free.lock().unwrap().push("free".to_string());
        });

        scheduler.wait_all().unwrap();
        for f in step_futures {
            f.await;
        }
        free.await;

        let log = log.lock().unwrap();
        let pos = |name: &str| log.iter().position(|l| l == name).unwrap();
        assert!(pos("s0") < pos("s1"));
        assert!(pos("s1") < pos("s2"));
    }
}

#[tokio::test]
async fn scheduler_can_fork_from_a_property_random_source() {
    // The scheduler draws from the property's own stream, so the
    // interleaving is part of the seed-reproducible run.
    let mut property_rng = RandomSource::from_seed(555);
    let mut scheduler = Scheduler::new(property_rng.fork());

    let _a = scheduler.schedule("a", ());
    let _b = scheduler.schedule("b", ());
    let first = scheduler.wait_one().unwrap();

    let mut property_rng2 = RandomSource::from_seed(555);
    let mut scheduler2 = Scheduler::new(property_rng2.fork());
    let _a2 = scheduler2.schedule("a", ());
    let _b2 = scheduler2.schedule("b", ());
    assert_eq!(scheduler2.wait_one().unwrap(), first);
}
