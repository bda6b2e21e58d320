use graph_rtree::{Entry, RTreeError};
use graph_rtree_int_test::test_util::{
    brute_force_intersects, cleanup, collect_intersects, create_test_context, random_query,
    random_rects, rect, run_test,
};
use std::collections::HashSet;
use std::ops::ControlFlow;

#[test]
fn test_intersects_matches_brute_force() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("windows", 4, 16)?;
            let entries = random_rects(101, 3000, 2000.0, 30.0);

            let mut session = manager.open_session(&index, None)?;
            session.add_all(entries.clone())?;
            session.close()?;

            for seed in 0..100 {
                let query = random_query(1000 + seed, 2000.0, 300.0);
                let found = collect_intersects(manager, &index, &query)?;
                assert_eq!(found, brute_force_intersects(&entries, &query));
            }

            // window covering everything
            let everything = collect_intersects(manager, &index, &rect(-1.0, -1.0, 3000.0, 3000.0))?;
            assert_eq!(everything.len(), 3000);

            // window outside the data
            let nothing = collect_intersects(manager, &index, &rect(5000.0, 5000.0, 6000.0, 6000.0))?;
            assert!(nothing.is_empty());
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_within_only_reports_contained_entries() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("contained", 2, 8)?;
            let entries = random_rects(202, 1000, 500.0, 25.0);

            let mut session = manager.open_session(&index, None)?;
            session.add_all(entries.clone())?;
            session.close()?;

            for seed in 0..30 {
                let query = random_query(2000 + seed, 500.0, 120.0);
                let mut found = Vec::new();
                let visited = manager.within(&index, &query, |entry| {
                    found.push(entry.data.clone());
                    ControlFlow::Continue(())
                })?;
                found.sort();

                let mut expected: Vec<_> = entries
                    .iter()
                    .filter(|e| query.contains(&e.rect))
                    .map(|e| e.data.clone())
                    .collect();
                expected.sort();
                assert_eq!(visited, expected.len());
                assert_eq!(found, expected);
            }
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_visitor_can_stop_the_search() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("stop", 2, 4)?;
            let mut session = manager.open_session(&index, None)?;
            session.add_all(random_rects(303, 200, 100.0, 5.0))?;
            session.close()?;

            let mut seen = 0;
            let visited = manager.intersects(&index, &rect(0.0, 0.0, 200.0, 200.0), |_| {
                seen += 1;
                if seen == 5 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })?;
            assert_eq!(seen, 5);
            assert_eq!(visited, 5);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_traverse_prunes_by_node_bounds() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("walk", 2, 6)?;
            let entries = random_rects(404, 500, 1000.0, 10.0);
            let mut session = manager.open_session(&index, None)?;
            session.add_all(entries.clone())?;
            session.close()?;

            // unconditional walk sees every entry once
            let mut payloads = HashSet::new();
            let mut nodes = 0;
            manager.traverse(
                &index,
                |_, _| {
                    nodes += 1;
                    true
                },
                |entry| {
                    assert!(payloads.insert(entry.data.clone()));
                    ControlFlow::Continue(())
                },
            )?;
            assert_eq!(payloads.len(), 500);
            assert_eq!(nodes, manager.stats(&index)?.node_count());

            // pruned walk behaves like a window query
            let window = rect(0.0, 0.0, 250.0, 250.0);
            let mut found = Vec::new();
            manager.traverse(
                &index,
                |_, mbr| mbr.is_some_and(|mbr| mbr.intersects(&window)),
                |entry| {
                    if entry.rect.intersects(&window) {
                        found.push(entry.data.clone());
                    }
                    ControlFlow::Continue(())
                },
            )?;
            found.sort();
            assert_eq!(found, brute_force_intersects(&entries, &window));
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_queries_on_missing_and_empty_indexes() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("empty", 2, 4)?;
            assert!(manager.is_empty(&index)?);
            assert!(collect_intersects(manager, &index, &rect(0.0, 0.0, 1.0, 1.0))?.is_empty());

            let mut session = manager.open_session(&index, None)?;
            session.add(Entry::point(vec![0.5, 0.5], "only")?)?;
            session.close()?;

            manager.drop_index("empty", |_| {})?;
            let err = collect_intersects(manager, &index, &rect(0.0, 0.0, 1.0, 1.0));
            assert!(matches!(err, Err(RTreeError::IndexNotFound(_))));
            Ok(())
        },
        cleanup,
    );
}
