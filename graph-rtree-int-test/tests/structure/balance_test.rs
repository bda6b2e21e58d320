use graph_rtree::{Entry, MissingEntryPolicy, RTreeConfig, RTreeError, SplitStrategy};
use graph_rtree_int_test::test_util::{
    cleanup, collect_intersects, create_test_context, create_test_context_with, random_rects,
    rect, run_test,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

#[test]
fn test_random_inserts_keep_tree_valid() {
    for strategy in [SplitStrategy::Quadratic, SplitStrategy::Axial] {
        run_test(
            || create_test_context_with(RTreeConfig::default().with_split_strategy(strategy)),
            |ctx| {
                let manager = ctx.manager();
                let index = manager.create_index("balance", 2, 6)?;
                let entries = random_rects(7, 600, 1000.0, 20.0);

                let mut session = manager.open_session(&index, Some(50))?;
                for entry in entries.iter().cloned() {
                    session.add(entry)?;
                }
                session.close()?;

                let report = manager.check_integrity(&index)?;
                assert!(report.is_valid(), "{:?}: {:?}", strategy, report.violations);
                assert_eq!(report.entries_checked, 600);
                assert_eq!(manager.count(&index)?, 600);

                let stats = manager.stats(&index)?;
                assert!(stats.height >= 3);
                assert_eq!(stats.entry_count, 600);
                Ok(())
            },
            cleanup,
        );
    }
}

#[test]
fn test_mixed_edits_keep_tree_valid() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("mixed", 3, 8)?;
            let mut entries = random_rects(11, 800, 500.0, 10.0);
            let mut rng = StdRng::seed_from_u64(11);

            let mut session = manager.open_session(&index, Some(64))?;
            for entry in entries.iter().cloned() {
                session.add(entry)?;
            }

            entries.shuffle(&mut rng);
            let (removed, kept) = entries.split_at(300);
            for entry in removed {
                assert_eq!(session.remove(entry)?, 1);
            }

            let mut moved = Vec::new();
            for (i, entry) in kept.iter().take(100).enumerate() {
                let offset = i as f64;
                let target = Entry::new(
                    rect(offset, offset, offset + 2.0, offset + 2.0),
                    entry.data.clone(),
                );
                assert!(session.update(entry, target.clone())?);
                moved.push(target);
            }
            session.close()?;

            let report = manager.check_integrity(&index)?;
            assert!(report.is_valid(), "{:?}", report.violations);
            assert_eq!(manager.count(&index)?, 500);

            // moved entries answer at their new place only
            for (old, new) in kept.iter().zip(&moved) {
                assert!(collect_intersects(manager, &index, &new.rect)?.contains(&new.data));
                if !old.rect.intersects(&new.rect) {
                    let found = collect_intersects(manager, &index, &old.rect)?;
                    assert!(!found.contains(&old.data));
                }
            }

            for entry in removed {
                let found = collect_intersects(manager, &index, &entry.rect)?;
                assert!(!found.contains(&entry.data));
            }
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_remove_everything_leaves_no_orphans() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("drain", 2, 4)?;
            let entries = random_rects(3, 250, 100.0, 5.0);

            let mut session = manager.open_session(&index, Some(25))?;
            session.add_all(entries.clone())?;
            for entry in entries.iter().rev() {
                session.remove(entry)?;
            }
            session.close()?;

            assert!(manager.is_empty(&index)?);
            assert_eq!(manager.count(&index)?, 0);
            assert_eq!(manager.bounds(&index)?, None);
            assert_eq!(manager.stats(&index)?.node_count(), 0);
            assert_eq!(manager.collect_garbage()?, 0);
            // only the metadata node is left
            assert_eq!(ctx.store().node_count(), 1);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_missing_entries_follow_policy() {
    run_test(
        || {
            create_test_context_with(
                RTreeConfig::default().with_missing_entry_policy(MissingEntryPolicy::Fail),
            )
        },
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("strict", 2, 4)?;
            let mut session = manager.open_session(&index, None)?;
            session.add(Entry::point(vec![1.0, 1.0], "present")?)?;

            let ghost = Entry::point(vec![1.0, 1.0], "ghost")?;
            assert!(matches!(
                session.remove(&ghost),
                Err(RTreeError::EntryNotFound(_))
            ));
            assert!(matches!(
                session.update(&ghost, Entry::point(vec![2.0, 2.0], "ghost")?),
                Err(RTreeError::EntryNotFound(_))
            ));

            // the session survives a missing target
            assert!(session.is_open());
            session.add(Entry::point(vec![3.0, 3.0], "later")?)?;
            session.close()?;
            assert_eq!(manager.count(&index)?, 2);
            Ok(())
        },
        cleanup,
    );
}

#[test]
fn test_bounds_track_edits() {
    run_test(
        create_test_context,
        |ctx| {
            let manager = ctx.manager();
            let index = manager.create_index("bounds", 2, 4)?;
            let far = Entry::point(vec![100.0, 100.0], "far")?;

            let mut session = manager.open_session(&index, None)?;
            session.add(Entry::point(vec![0.0, 0.0], "origin")?)?;
            session.add(Entry::point(vec![5.0, 5.0], "near")?)?;
            session.add(far.clone())?;
            session.close()?;
            assert_eq!(manager.bounds(&index)?, Some(rect(0.0, 0.0, 100.0, 100.0)));

            let mut session = manager.open_session(&index, None)?;
            session.remove(&far)?;
            session.close()?;
            assert_eq!(manager.bounds(&index)?, Some(rect(0.0, 0.0, 5.0, 5.0)));
            Ok(())
        },
        cleanup,
    );
}
