use kernel_sync::SpinLock;
use std::{panic, thread};

#[test]
fn basic_lock_and_raii() {
    let l = SpinLock::new(0_u32);

    // take the lock, mutate, and drop
    {
        let mut g = l.lock();
        *g = 6;
    }

    // lock again; previous drop must have unlocked
    {
        let mut g = l.lock();
        *g *= 7;
        assert_eq!(*g, 42);
    }
}

#[test]
fn try_lock_semantics() {
    let l = SpinLock::new([0_u8; 4]);

    // first try_lock should succeed
    let g1 = l.try_lock();
    assert!(g1.is_some());

    // while held, try_lock must fail
    assert!(l.try_lock().is_none());

    // dropping the guard allows another try_lock
    drop(g1);
    assert!(l.try_lock().is_some());
}

#[test]
fn with_lock_works_and_unlocks() {
    let l = SpinLock::new(Vec::new());
    let len = l.with_lock(|v| {
        v.push(1_u8);
        v.len()
    });
    assert_eq!(len, 1);

    // lock must be free now
    let got = l.with_lock(|v| v.clone());
    assert_eq!(got, vec![1]);
}

#[test]
fn get_mut_allows_direct_mutation() {
    let mut l = SpinLock::new(String::from("spin"));
    // &mut self guarantees no contention; we get a plain &mut T
    l.get_mut().push_str("lock");
    assert_eq!(l.lock().as_str(), "spinlock");
}

#[test]
fn contended_increments_are_exact_and_exclusive() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    let threads = 6; // keep small for determinism
    let iters = 8_000; // likewise

    let lock = Arc::new(SpinLock::new(0_usize));
    let in_cs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let mut handles = Vec::with_capacity(threads);
    for _ in 0..threads {
        let lock = Arc::clone(&lock);
        let in_cs = Arc::clone(&in_cs);
        let start = Arc::clone(&start);
        handles.push(thread::spawn(move || {
            start.wait();
            for _ in 0..iters {
                lock.with_lock(|v| {
                    let prev = in_cs.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(prev, 0, "mutual exclusion violated");
                    *v += 1;
                    in_cs.fetch_sub(1, Ordering::SeqCst);
                });

                // yield only AFTER releasing the lock to reduce convoy effects
                thread::yield_now();
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    let total = lock.with_lock(|v| *v);
    assert_eq!(total, threads * iters);
    assert_eq!(in_cs.load(Ordering::SeqCst), 0);
}

#[test]
fn lock_is_released_on_panic() {
    let l = SpinLock::new(0_u32);

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        l.with_lock(|v| {
            *v = 7;
            panic!("boom");
        });
    }));
    assert!(res.is_err(), "expected panic");

    // We should be able to lock again right away.
    assert_eq!(l.with_lock(|v| *v), 7);
}

/// Spot-check a concrete instantiation compiles as Sync.
#[test]
fn spinlock_is_sync_for_send_t() {
    fn takes_sync<S: Sync>(_s: &S) {}
    let l = SpinLock::new(0_u8);
    takes_sync(&l);
}
