//! Cross-thread lock broker behavior: FIFO fairness, abandonment recovery,
//! and waiter cancellation.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use datasync_broker::{db_write_lock, LivenessToken, LockBroker};

#[test]
fn grants_follow_arrival_order() {
    let broker = Arc::new(LockBroker::with_sweep_interval(Duration::from_millis(10)));
    let order = Arc::new(Mutex::new(Vec::new()));
    let lock_name = db_write_lock("fifo.db");

    // Pin the lock so every contender queues behind it.
    let gate_token = LivenessToken::new();
    let mut gate = broker.acquire(&lock_name, &gate_token).expect("gate");

    let mut handles = Vec::new();
    for i in 0..5 {
        let broker = Arc::clone(&broker);
        let order = Arc::clone(&order);
        let lock_name = lock_name.clone();
        handles.push(thread::spawn(move || {
            let token = LivenessToken::new();
            let mut guard = broker.acquire(&lock_name, &token).expect("acquire");
            order.lock().expect("order").push(i);
            thread::sleep(Duration::from_millis(5));
            guard.release();
        }));
        // Stagger arrivals so queue order is deterministic.
        thread::sleep(Duration::from_millis(25));
    }

    gate.release();
    for h in handles {
        h.join().expect("contender");
    }

    assert_eq!(*order.lock().expect("order"), vec![0, 1, 2, 3, 4]);
}

#[test]
fn abandoned_holder_is_reclaimed() {
    let broker = Arc::new(LockBroker::with_sweep_interval(Duration::from_millis(10)));
    let lock_name = db_write_lock("crash.db");

    // Simulate a torn-down tab: the holder's liveness dies but the guard is
    // leaked, never released.
    let dead_token = LivenessToken::new();
    let guard = broker.acquire(&lock_name, &dead_token).expect("acquire");
    std::mem::forget(guard);
    dead_token.revoke();

    let start = Instant::now();
    let token = LivenessToken::new();
    let _reclaimed = broker.acquire(&lock_name, &token).expect("reclaim");
    assert!(
        start.elapsed() < Duration::from_secs(1),
        "reclaim took {:?}, expected bounded recovery",
        start.elapsed()
    );
}

#[test]
fn cancelled_waiter_unblocks_and_skips_queue() {
    let broker = Arc::new(LockBroker::with_sweep_interval(Duration::from_millis(10)));
    let lock_name = db_write_lock("cancel.db");

    let holder_token = LivenessToken::new();
    let mut holder = broker.acquire(&lock_name, &holder_token).expect("acquire");

    // First waiter will be cancelled mid-wait; second must still get the lock.
    let cancelled_token = LivenessToken::new();
    let waiter = {
        let broker = Arc::clone(&broker);
        let token = cancelled_token.clone();
        let lock_name = lock_name.clone();
        thread::spawn(move || broker.acquire(&lock_name, &token))
    };
    thread::sleep(Duration::from_millis(50));
    cancelled_token.revoke();
    let err = waiter.join().expect("join").unwrap_err();
    assert_eq!(err.code(), "CANCELLED");

    let second_token = LivenessToken::new();
    let second = {
        let broker = Arc::clone(&broker);
        let token = second_token.clone();
        let lock_name = lock_name.clone();
        thread::spawn(move || broker.acquire(&lock_name, &token).map(|_g| ()))
    };
    thread::sleep(Duration::from_millis(30));
    holder.release();
    second.join().expect("join").expect("second waiter acquires");
}

#[test]
fn serialized_sections_never_overlap() {
    let broker = Arc::new(LockBroker::with_sweep_interval(Duration::from_millis(10)));
    let lock_name = db_write_lock("excl.db");
    let in_section = Arc::new(Mutex::new(0_u32));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let broker = Arc::clone(&broker);
            let in_section = Arc::clone(&in_section);
            let lock_name = lock_name.clone();
            thread::spawn(move || {
                let token = LivenessToken::new();
                let mut guard = broker.acquire(&lock_name, &token).expect("acquire");
                {
                    let mut n = in_section.lock().expect("counter");
                    *n += 1;
                    assert_eq!(*n, 1, "two holders inside the exclusive section");
                }
                thread::sleep(Duration::from_millis(3));
                {
                    let mut n = in_section.lock().expect("counter");
                    *n -= 1;
                }
                guard.release();
            })
        })
        .collect();

    for h in handles {
        h.join().expect("worker");
    }
}
