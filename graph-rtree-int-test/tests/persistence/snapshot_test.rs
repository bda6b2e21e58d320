use graph_rtree::{GraphStore, PointNd, RTreeConfig, RTreeIndexManager};
use graph_rtree_int_test::test_util::{
    brute_force_intersects, cleanup, collect_intersects, create_persistent_test_context,
    grid_points, open_snapshot_store, random_query, random_rects, run_test,
};

#[test]
fn test_index_survives_reopen() {
    run_test(
        create_persistent_test_context,
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("durable", 3, 9)?;
            let entries = random_rects(81, 1200, 800.0, 12.0);
            let mut session = manager.open_session(&index, Some(400))?;
            for entry in entries.iter().cloned() {
                session.add(entry)?;
            }
            session.close()?;

            let path = ctx.snapshot_path().expect("persistent context has a snapshot");
            assert!(path.exists());
            let dir = path.parent().expect("snapshot lives in a directory");

            let reopened = open_snapshot_store(dir)?;
            assert_eq!(reopened.node_count(), ctx.store().node_count());
            let manager = RTreeIndexManager::new(GraphStore::new(reopened), RTreeConfig::default())?;
            assert_eq!(manager.index_names()?, vec!["durable".to_string()]);

            let index = manager.get_index("durable")?;
            assert_eq!((index.m_min(), index.m_max()), (3, 9));
            assert_eq!(manager.count(&index)?, 1200);
            let report = manager.check_integrity(&index)?;
            assert!(report.is_valid(), "{:?}", report.violations);

            for seed in 0..20 {
                let query = random_query(8000 + seed, 800.0, 150.0);
                assert_eq!(
                    collect_intersects(&manager, &index, &query)?,
                    brute_force_intersects(&entries, &query)
                );
            }
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_reopened_index_accepts_writes() {
    run_test(
        create_persistent_test_context,
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("grid", 2, 6)?;
            let mut session = manager.open_session(&index, None)?;
            session.add_all(grid_points(20, 20))?;
            session.close()?;

            let path = ctx.snapshot_path().expect("persistent context has a snapshot");
            let dir = path.parent().expect("snapshot lives in a directory");
            let manager = RTreeIndexManager::new(
                GraphStore::new(open_snapshot_store(dir)?),
                RTreeConfig::default(),
            )?;
            let index = manager.get_or_create_index("grid", 2, 6)?;

            let mut session = manager.open_session(&index, None)?;
            session.add_all(
                grid_points(5, 5)
                    .into_iter()
                    .map(|mut e| {
                        e.data = format!("extra {}", e.data);
                        e
                    })
                    .collect(),
            )?;
            session.close()?;

            assert_eq!(manager.count(&index)?, 425);
            let report = manager.check_integrity(&index)?;
            assert!(report.is_valid(), "{:?}", report.violations);

            let closest = manager.nearest(&index, &PointNd::new(vec![19.1, 19.1]), 1)?;
            assert_eq!(closest[0].entry.data, "19,19");
            Ok(())
        },
        cleanup,
    );
}
