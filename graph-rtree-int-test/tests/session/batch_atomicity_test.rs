use graph_rtree::{
    Entry, GraphStore, InMemoryGraphStore, PointNd, RTreeConfig, RTreeError, RTreeIndexManager,
    RectNd,
};
use graph_rtree_int_test::test_util::{
    cleanup, collect_intersects, create_persistent_test_context, create_test_context, grid_points,
    open_snapshot_store, random_rects, rect, run_test, FailingStore, TestContext,
};
use std::fs;

#[test]
fn test_full_batches_commit_automatically() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("batches", 2, 4)?;

            let mut session = manager.open_session(&index, Some(5))?;
            for entry in grid_points(4, 3) {
                session.add(entry)?;
            }
            assert_eq!(session.commit_count(), 2);
            assert_eq!(session.pending_changes(), 2);
            // the open batch is lost with the session
            drop(session);

            assert_eq!(manager.count(&index)?, 10);
            let report = manager.check_integrity(&index)?;
            assert!(report.is_valid(), "{:?}", report.violations);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_dropped_session_keeps_committed_batches_only() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("dropped", 2, 6)?;
            let entries = random_rects(61, 400, 100.0, 4.0);
            let (first, second) = entries.split_at(250);

            let mut session = manager.open_session(&index, Some(10_000))?;
            session.add_all(first.to_vec())?;
            session.commit()?;
            session.add_all(second.to_vec())?;
            for entry in &first[..50] {
                session.remove(entry)?;
            }
            drop(session);

            assert_eq!(manager.count(&index)?, 250);
            let report = manager.check_integrity(&index)?;
            assert!(report.is_valid(), "{:?}", report.violations);
            // nothing the rolled back batch created survives
            assert_eq!(manager.collect_garbage()?, 0);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_store_failure_poisons_the_session() {
    let store = InMemoryGraphStore::new();
    let failing = FailingStore::new(store.clone());
    let switch = failing.clone();

    run_test(
        || {
            let manager =
                RTreeIndexManager::new(GraphStore::new(failing), RTreeConfig::default())?;
            Ok(TestContext::new(store, manager))
        },
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("fragile", 2, 4)?;

            let mut session = manager.open_session(&index, Some(1000))?;
            session.add(Entry::point(vec![1.0, 1.0], "kept")?)?;
            session.commit()?;

            for entry in grid_points(5, 5) {
                session.add(entry)?;
            }
            switch.fail_commits(true);
            assert!(matches!(session.commit(), Err(RTreeError::StoreFailure(_))));
            switch.fail_commits(false);

            assert!(!session.is_open());
            assert!(matches!(
                session.add(Entry::point(vec![2.0, 2.0], "late")?),
                Err(RTreeError::SessionClosed)
            ));
            drop(session);

            // only the first batch is visible and the lock is free again
            assert_eq!(manager.count(&index)?, 1);
            let mut session = manager.open_session(&index, None)?;
            session.add(Entry::point(vec![3.0, 3.0], "retry")?)?;
            session.close()?;
            assert_eq!(manager.count(&index)?, 2);
            let report = manager.check_integrity(&index)?;
            assert!(report.is_valid(), "{:?}", report.violations);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_failed_snapshot_write_hides_the_batch() {
    run_test(
        create_persistent_test_context,
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("durable", 2, 4)?;
            let mut session = manager.open_session(&index, None)?;
            session.add_all(grid_points(5, 2))?;
            session.close()?;

            let path = ctx.snapshot_path().expect("persistent context has a snapshot");
            let dir = path.parent().expect("snapshot lives in a directory");
            // the snapshot is written through a temporary file; a directory in
            // its place makes every write fail
            let blocker = path.with_extension("tmp");
            fs::create_dir(&blocker).expect("blocking directory is created");

            let mut session = manager.open_session(&index, None)?;
            session.add_all(random_rects(91, 40, 50.0, 3.0))?;
            assert!(matches!(session.close(), Err(RTreeError::StoreFailure(_))));
            assert!(matches!(
                manager.create_index("late", 2, 4),
                Err(RTreeError::StoreFailure(_))
            ));

            assert_eq!(manager.index_names()?, vec!["durable".to_string()]);
            assert_eq!(manager.count(&index)?, 10);
            let everything = rect(-1.0, -1.0, 100.0, 100.0);
            assert_eq!(collect_intersects(manager, &index, &everything)?.len(), 10);
            let report = manager.check_integrity(&index)?;
            assert!(report.is_valid(), "{:?}", report.violations);

            // the file still holds the last good commit
            let reopened = RTreeIndexManager::new(
                GraphStore::new(open_snapshot_store(dir)?),
                RTreeConfig::default(),
            )?;
            let durable = reopened.get_index("durable")?;
            assert_eq!(reopened.count(&durable)?, 10);

            fs::remove_dir(&blocker).expect("blocking directory is removed");
            let mut session = manager.open_session(&index, None)?;
            session.add(Entry::point(vec![9.5, 9.5], "after")?)?;
            session.close()?;
            assert_eq!(manager.count(&index)?, 11);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_wrong_dimension_keeps_the_session_open() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("planar", 2, 4)?;
            let cube = Entry::new(RectNd::new(vec![0.0; 3], vec![1.0, 1.0, 100.0])?, "cube");

            let mut session = manager.open_session(&index, None)?;
            session.add_all(grid_points(4, 4))?;
            assert!(matches!(session.add(cube.clone()), Err(RTreeError::InvalidRect(_))));

            let mut mixed = grid_points(2, 2)
                .into_iter()
                .map(|mut e| {
                    e.data = format!("mixed {}", e.data);
                    e
                })
                .collect::<Vec<_>>();
            mixed.insert(1, cube.clone());
            assert!(matches!(session.add_all(mixed), Err(RTreeError::InvalidRect(_))));

            let origin = Entry::point(vec![0.0, 0.0], "0,0")?;
            assert!(matches!(
                session.update(&origin, cube.clone()),
                Err(RTreeError::InvalidRect(_))
            ));
            assert!(matches!(session.remove(&cube), Err(RTreeError::InvalidRect(_))));
            assert!(Entry::point(vec![f64::NAN, 1.0], "nan").is_err());

            assert!(session.is_open());
            session.add(Entry::point(vec![7.0, 7.0], "late")?)?;
            session.close()?;

            assert_eq!(manager.count(&index)?, 17);
            let report = manager.check_integrity(&index)?;
            assert!(report.is_valid(), "{:?}", report.violations);

            // queries of another dimension are rejected as well
            let window = RectNd::new(vec![0.0; 3], vec![10.0; 3])?;
            assert!(matches!(
                manager.intersects(&index, &window, |_| std::ops::ControlFlow::Continue(())),
                Err(RTreeError::InvalidRect(_))
            ));
            assert!(matches!(
                manager.nearest(&index, &PointNd::new(vec![1.0, 1.0, 1.0]), 3),
                Err(RTreeError::InvalidRect(_))
            ));
            Ok(())
        },
        cleanup,
    );
}
