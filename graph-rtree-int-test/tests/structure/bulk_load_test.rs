use graph_rtree::{Entry, RTreeConfig, RTreeResult};
use graph_rtree_int_test::test_util::{
    brute_force_intersects, cleanup, collect_intersects, create_test_context,
    create_test_context_with, random_query, random_rects, run_test, TestContext,
};

fn assert_queries_match(ctx: &TestContext, name: &str, entries: &[Entry]) -> RTreeResult<()> {
    let manager = ctx.manager();
    let index = manager.get_index(name)?;
    for seed in 0..40 {
        let query = random_query(seed, 1000.0, 150.0);
        assert_eq!(
            collect_intersects(manager, &index, &query)?,
            brute_force_intersects(entries, &query),
            "query {} on {}",
            query,
            name
        );
    }
    Ok(())
}

#[test]
fn test_bulk_load_answers_like_single_inserts() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let entries = random_rects(21, 1500, 1000.0, 15.0);

            let bulk = manager.create_index("bulk", 3, 10)?;
            let mut session = manager.open_session(&bulk, None)?;
            session.add_all(entries.clone())?;
            session.close()?;

            let single = manager.create_index("single", 3, 10)?;
            let mut session = manager.open_session(&single, Some(200))?;
            for entry in entries.iter().cloned() {
                session.add(entry)?;
            }
            session.close()?;

            for index in [&bulk, &single] {
                let report = manager.check_integrity(index)?;
                assert!(report.is_valid(), "{}: {:?}", index, report.violations);
                assert_eq!(manager.count(index)?, 1500);
            }
            assert_eq!(manager.bounds(&bulk)?, manager.bounds(&single)?);
            assert_eq!(manager.stats(&bulk)?.entry_count, 1500);

            assert_queries_match(&ctx, "bulk", &entries)?;
            assert_queries_match(&ctx, "single", &entries)?;
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_small_batch_grafts_into_existing_tree() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("graft", 4, 12)?;
            let base = random_rects(31, 2000, 1000.0, 10.0);
            let extra: Vec<_> = random_rects(32, 300, 1000.0, 10.0)
                .into_iter()
                .map(|mut e| {
                    e.data = format!("extra-{}", e.data);
                    e
                })
                .collect();

            let mut session = manager.open_session(&index, None)?;
            session.add_all(base.clone())?;
            session.add_all(extra.clone())?;
            session.close()?;

            let report = manager.check_integrity(&index)?;
            assert!(report.is_valid(), "{:?}", report.violations);
            assert_eq!(manager.count(&index)?, 2300);

            let all: Vec<_> = base.into_iter().chain(extra).collect();
            assert_queries_match(&ctx, "graft", &all)?;
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_grafting_with_subtree_merge() {
    run_test(
        || {
            create_test_context_with(
                RTreeConfig::default()
                    .with_merge_subtrees(true)
                    .with_merge_overlap_threshold(0.05),
            )
        },
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("merge", 2, 6)?;
            let base = random_rects(41, 1200, 1000.0, 8.0);
            let extra: Vec<_> = random_rects(42, 400, 1000.0, 8.0)
                .into_iter()
                .map(|mut e| {
                    e.data = format!("extra-{}", e.data);
                    e
                })
                .collect();

            let mut session = manager.open_session(&index, None)?;
            session.add_all(base.clone())?;
            session.add_all(extra.clone())?;
            session.close()?;

            let report = manager.check_integrity(&index)?;
            assert!(report.is_valid(), "{:?}", report.violations);
            assert_eq!(report.entries_checked, 1600);

            let all: Vec<_> = base.into_iter().chain(extra).collect();
            assert_queries_match(&ctx, "merge", &all)?;
            assert_eq!(manager.collect_garbage()?, 0);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_large_batches_load_in_chunks() {
    run_test(
        || create_test_context_with(RTreeConfig::default().with_max_bulk_chunk(100)),
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("chunks", 3, 9)?;
            let entries = random_rects(51, 1000, 1000.0, 12.0);

            let mut session = manager.open_session(&index, Some(10_000))?;
            session.add_all(entries.clone())?;
            session.close()?;

            let report = manager.check_integrity(&index)?;
            assert!(report.is_valid(), "{:?}", report.violations);
            assert_eq!(manager.count(&index)?, 1000);
            assert_queries_match(&ctx, "chunks", &entries)?;
            Ok(())
        },
        cleanup,
    );
}
