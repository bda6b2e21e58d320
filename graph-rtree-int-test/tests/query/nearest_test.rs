use graph_rtree::rtree::point_distance;
use graph_rtree::{DistanceResult, Entry, PointNd};
use graph_rtree_int_test::test_util::{
    brute_force_nearest_distances, cleanup, create_test_context, grid_points, random_point,
    random_rects, run_test,
};

const EPSILON: f64 = 1e-9;

fn payloads(results: &[DistanceResult]) -> Vec<&str> {
    results.iter().map(|r| r.entry.data.as_str()).collect()
}

#[test]
fn test_nearest_on_grid() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("grid", 4, 16)?;
            let mut session = manager.open_session(&index, None)?;
            session.add_all(grid_points(100, 100))?;
            session.close()?;
            assert_eq!(manager.count(&index)?, 10_000);

            let query = PointNd::new(vec![10.2, 13.2]);
            let results = manager.nearest(&index, &query, 4)?;
            let found = payloads(&results);
            assert_eq!(found.len(), 4);
            assert_eq!(found[0], "10,13");
            // (10,14) and (11,13) are equally far
            let mut ties = vec![found[1], found[2]];
            ties.sort();
            assert_eq!(ties, vec!["10,14", "11,13"]);
            assert_eq!(found[3], "11,14");

            assert!((results[0].distance - 0.08f64.sqrt()).abs() < EPSILON);
            assert!((results[1].distance - 0.68f64.sqrt()).abs() < EPSILON);
            assert!((results[3].distance - 1.28f64.sqrt()).abs() < EPSILON);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_nearest_with_filter_and_custom_distance() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("filtered", 2, 8)?;
            let mut session = manager.open_session(&index, None)?;
            session.add_all(grid_points(30, 30))?;
            session.close()?;

            let query = PointNd::new(vec![10.2, 13.2]);
            let west_only = |entry: &Entry| entry.rect.min()[0] < 10.0;
            let results = manager.nearest_filtered(
                &index,
                &query,
                3,
                west_only,
                point_distance(query.clone()),
            )?;
            let found = payloads(&results);
            assert_eq!(found[0], "9,13");
            assert!(found.iter().all(|p| p.starts_with("9,")));

            // a distance that weighs y twice never underestimates Euclidean
            let stretched = {
                let query = query.clone();
                move |entry: &Entry| {
                    let dx = entry.rect.min()[0] - query.coords()[0];
                    let dy = entry.rect.min()[1] - query.coords()[1];
                    (dx * dx + 4.0 * dy * dy).sqrt()
                }
            };
            let results = manager.nearest_filtered(&index, &query, 2, |_| true, stretched)?;
            assert_eq!(payloads(&results), vec!["10,13", "11,13"]);
            assert!(results[0].distance <= results[1].distance);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_nearest_matches_brute_force() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("random", 3, 12)?;
            let entries = random_rects(501, 2500, 1000.0, 20.0);
            let mut session = manager.open_session(&index, Some(300))?;
            for entry in entries.iter().cloned() {
                session.add(entry)?;
            }
            session.close()?;

            for seed in 0..50 {
                let query = random_point(5000 + seed, 1000.0);
                for k in [1, 4, 25] {
                    let results = manager.nearest(&index, &query, k)?;
                    let expected = brute_force_nearest_distances(&entries, &query, k);
                    assert_eq!(results.len(), k);
                    for (result, expected) in results.iter().zip(&expected) {
                        assert!(
                            (result.distance - expected).abs() < EPSILON,
                            "k={} query={:?}: {} vs {}",
                            k,
                            query,
                            result.distance,
                            expected
                        );
                    }
                }
            }
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_nearest_edge_cases() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("small", 2, 4)?;
            let origin = PointNd::new(vec![0.0, 0.0]);
            assert!(manager.nearest(&index, &origin, 3)?.is_empty());

            let mut session = manager.open_session(&index, None)?;
            session.add_all(grid_points(2, 2))?;
            session.close()?;

            assert!(manager.nearest(&index, &origin, 0)?.is_empty());
            let all = manager.nearest(&index, &origin, 10)?;
            assert_eq!(all.len(), 4);
            assert_eq!(all[0].entry.data, "0,0");
            assert_eq!(all[3].entry.data, "1,1");
            assert!(all.windows(2).all(|w| w[0].distance <= w[1].distance));
            Ok(())
        },
        cleanup,
    );
}
