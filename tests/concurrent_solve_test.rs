// ==========================================
// 并发求解测试
// ==========================================
// 职责: 验证同一范围的并发求解按队列串行执行, 且发布指针保持唯一
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod concurrent_solve_test {
    use futures::future::join_all;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use timetable_engine::engine::SolveOptions;

    use crate::test_helpers::*;

    fn quick() -> SolveOptions {
        SolveOptions {
            time_limit: Some(Duration::from_secs(10)),
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_solves_produce_distinct_majors() {
        let (_tmp, api) = create_test_api();
        api.upsert_courses(&small_week(PERIOD)).unwrap();

        let tasks = (0..4).map(|_| {
            Arc::clone(&api).solve_async(DEPT.to_string(), PERIOD.to_string(), quick())
        });
        let results = join_all(tasks).await;

        let majors: HashSet<i32> = results
            .into_iter()
            .map(|r| r.expect("排队求解不应失败").version.major)
            .collect();
        assert_eq!(majors, HashSet::from([0, 1, 2, 3]));

        // 首个提交的 major 被自动发布, 其余保持未发布
        let published = api.published_major(DEPT, PERIOD).unwrap();
        assert!(majors.contains(&published));
    }

    #[tokio::test]
    async fn test_different_scopes_solve_in_parallel() {
        let (_tmp, api) = create_test_api();
        api.upsert_courses(&small_week(PERIOD)).unwrap();
        api.upsert_courses(&small_week("2026-W11")).unwrap();

        let results = join_all(vec![
            Arc::clone(&api).solve_async(DEPT.to_string(), PERIOD.to_string(), quick()),
            Arc::clone(&api).solve_async(DEPT.to_string(), "2026-W11".to_string(), quick()),
        ])
        .await;

        for result in results {
            let report = result.unwrap();
            assert_eq!(report.version.major, 0);
        }
        assert_eq!(api.published_major(DEPT, PERIOD).unwrap(), 0);
        assert_eq!(api.published_major(DEPT, "2026-W11").unwrap(), 0);
    }

    #[test]
    fn test_concurrent_version_mutations_keep_one_published() {
        let (_tmp, api) = create_test_api();
        let solved = seed_and_solve(&api, 3);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let api = Arc::clone(&api);
                let solved = solved.clone();
                let target = solved[i % solved.len()];
                thread::spawn(move || {
                    let _ = api.promote(DEPT, PERIOD, target);
                    let published = api.published_major(DEPT, PERIOD).unwrap();
                    let other = if published == target { solved[(i + 1) % solved.len()] } else { target };
                    // 并发下发布指针可能已变化, 失败可接受
                    let _ = api.swap(DEPT, PERIOD, published, other);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let published = api.published_major(DEPT, PERIOD).unwrap();
        assert!(solved.contains(&published));
    }
}
