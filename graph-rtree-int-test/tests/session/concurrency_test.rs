use graph_rtree::Entry;
use graph_rtree_int_test::test_util::{
    brute_force_intersects, cleanup, collect_intersects, create_test_context, random_query,
    random_rects, run_test,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_parallel_readers() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("shared", 3, 10)?;
            let entries = Arc::new(random_rects(71, 2000, 1000.0, 15.0));
            let mut session = manager.open_session(&index, None)?;
            session.add_all(entries.to_vec())?;
            session.close()?;

            let mismatches = Arc::new(AtomicUsize::new(0));
            let handles: Vec<_> = (0..8u64)
                .map(|worker| {
                    let manager = manager.clone();
                    let index = index.clone();
                    let entries = entries.clone();
                    let mismatches = mismatches.clone();
                    thread::spawn(move || {
                        for round in 0..20 {
                            let query = random_query(worker * 100 + round, 1000.0, 200.0);
                            match collect_intersects(&manager, &index, &query) {
                                Ok(found) if found == brute_force_intersects(&entries, &query) => {}
                                _ => {
                                    mismatches.fetch_add(1, Ordering::SeqCst);
                                }
                            }
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().expect("reader thread panicked");
            }
            assert_eq!(mismatches.load(Ordering::SeqCst), 0);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_second_writer_waits_for_the_first() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let busy = manager.create_index("busy", 2, 4)?;
            let other = manager.create_index("other", 2, 4)?;

            let mut first = manager.open_session(&busy, None)?;
            first.add(Entry::point(vec![0.0, 0.0], "first")?)?;

            let acquired = Arc::new(AtomicBool::new(false));
            let waiter = {
                let manager = manager.clone();
                let busy = busy.clone();
                let acquired = acquired.clone();
                thread::spawn(move || {
                    let mut second = manager.open_session(&busy, None)?;
                    acquired.store(true, Ordering::SeqCst);
                    second.add(Entry::point(vec![1.0, 1.0], "second")?)?;
                    second.close()
                })
            };

            thread::sleep(Duration::from_millis(100));
            assert!(!acquired.load(Ordering::SeqCst));
            assert!(manager.try_open_session(&busy, None)?.is_none());

            // another index is not affected
            let mut unrelated = manager.open_session(&other, None)?;
            unrelated.add(Entry::point(vec![5.0, 5.0], "unrelated")?)?;
            unrelated.close()?;
            assert_eq!(manager.count(&other)?, 1);

            first.close()?;
            awaitility::at_most(Duration::from_secs(5)).until(|| acquired.load(Ordering::SeqCst));
            waiter.join().expect("writer thread panicked")?;

            assert_eq!(manager.count(&busy)?, 2);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_readers_wait_for_open_writer() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("guarded", 2, 4)?;

            let mut session = manager.open_session(&index, None)?;
            for i in 0..10 {
                session.add(Entry::point(vec![i as f64, 0.0], format!("p{}", i))?)?;
            }

            let observed = Arc::new(AtomicUsize::new(usize::MAX));
            let reader = {
                let manager = manager.clone();
                let index = index.clone();
                let observed = observed.clone();
                thread::spawn(move || {
                    let count = manager.count(&index)?;
                    observed.store(count, Ordering::SeqCst);
                    Ok::<_, graph_rtree::RTreeError>(())
                })
            };

            thread::sleep(Duration::from_millis(100));
            assert_eq!(observed.load(Ordering::SeqCst), usize::MAX);

            session.close()?;
            awaitility::at_most(Duration::from_secs(5))
                .until(|| observed.load(Ordering::SeqCst) != usize::MAX);
            reader.join().expect("reader thread panicked")?;

            // the reader sees the whole committed session
            assert_eq!(observed.load(Ordering::SeqCst), 10);
            Ok(())
        },
        cleanup,
    );
}
