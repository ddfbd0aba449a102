use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use crossbeam_channel::unbounded;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use raw_preview::error::FrameError;
use raw_preview::frame::{FrameBudget, FrameSlot};

/// Producers acquire on their own threads; a separate "completion" thread
/// releases after a random delay, as a GPU callback would.
#[test]
fn in_flight_stays_within_capacity_under_random_interleavings() {
    for seed in 0..8u64 {
        let budget = FrameBudget::new(3);
        let peak = Arc::new(AtomicUsize::new(0));
        let observed = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = unbounded::<(FrameSlot, u64)>();

        let completer = {
            let budget = budget.clone();
            thread::spawn(move || {
                while let Ok((slot, delay_us)) = done_rx.recv() {
                    thread::sleep(Duration::from_micros(delay_us));
                    assert!(budget.in_flight() <= budget.capacity());
                    slot.release();
                }
            })
        };

        let producers = 4;
        let frames_per_producer = 50;
        let start = Arc::new(Barrier::new(producers));
        let handles: Vec<_> = (0..producers)
            .map(|p| {
                let budget = budget.clone();
                let done_tx = done_tx.clone();
                let peak = Arc::clone(&peak);
                let observed = Arc::clone(&observed);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    let mut rng = StdRng::seed_from_u64(seed * 31 + p as u64);
                    start.wait();
                    for _ in 0..frames_per_producer {
                        let slot = budget.acquire_blocking().expect("budget open");
                        let now = budget.in_flight();
                        assert!(now >= 1 && now <= budget.capacity(), "in flight {now}");
                        peak.fetch_max(now, Ordering::AcqRel);
                        observed.fetch_add(1, Ordering::AcqRel);
                        if rng.random_bool(0.1) {
                            // completion on the acquiring thread
                            slot.release();
                        } else {
                            done_tx
                                .send((slot, rng.random_range(0..300)))
                                .expect("completer alive");
                        }
                        if rng.random_bool(0.3) {
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("producer panicked");
        }
        drop(done_tx);
        completer.join().expect("completer panicked");

        let total = (producers * frames_per_producer) as u64;
        assert_eq!(observed.load(Ordering::Acquire) as u64, total);
        assert!(peak.load(Ordering::Acquire) <= 3);
        assert_eq!(budget.in_flight(), 0, "no leaked slots");
        assert_eq!(budget.acquired(), total);
        assert_eq!(budget.released(), total);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fourth_acquire_waits_for_a_completion() {
    let budget = FrameBudget::new(3);
    let a = budget.acquire().await.unwrap();
    let _b = budget.acquire().await.unwrap();
    let _c = budget.acquire().await.unwrap();

    let blocked = tokio::time::timeout(Duration::from_millis(100), budget.acquire()).await;
    assert!(blocked.is_err(), "fourth slot must wait while three are in flight");

    let waiter = {
        let budget = budget.clone();
        tokio::spawn(async move { budget.acquire().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    std::thread::spawn(move || a.release())
        .join()
        .expect("release thread");

    let slot = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter woke")
        .expect("task joined")
        .expect("budget open");
    assert_eq!(budget.in_flight(), 3);
    drop(slot);
    assert_eq!(budget.in_flight(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closing_wakes_waiters() {
    let budget = FrameBudget::new(1);
    let held = budget.acquire().await.unwrap();
    let waiter = {
        let budget = budget.clone();
        tokio::spawn(async move { budget.acquire().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    budget.close();
    let result = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter woke")
        .expect("task joined");
    assert!(matches!(result, Err(FrameError::BudgetClosed)));
    drop(held);
    assert_eq!(budget.in_flight(), 0);
}
