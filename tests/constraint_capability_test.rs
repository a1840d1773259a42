// ==========================================
// 约束能力契约集成测试
// ==========================================
// 覆盖: 畸形实例中止预分析、缺少能力的种类不给意见、
//       缺少建模能力的硬约束阻止求解、种类目录
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod constraint_capability_test {
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::NamedTempFile;
    use timetable_engine::domain::InstanceFilter;
    use timetable_engine::{ApiError, ConstraintKind, ConstraintRegistry, TimetableApi};

    use crate::test_helpers::*;

    const OPAQUE: &str = "opaque_rule";

    /// 只有名称, 三项能力都未实现
    struct OpaqueRuleKind;

    impl ConstraintKind for OpaqueRuleKind {
        fn name(&self) -> &'static str {
            OPAQUE
        }
    }

    fn api_with_opaque_kind() -> (NamedTempFile, TimetableApi) {
        timetable_engine::logging::init_test();
        let (tmp, db_path) = create_test_db().expect("创建临时数据库失败");
        let conn = timetable_engine::db::open_shared(&db_path).unwrap();
        let mut registry = ConstraintRegistry::with_builtin_kinds();
        assert!(registry.register(Arc::new(OpaqueRuleKind)));
        (tmp, TimetableApi::with_registry(conn, registry).unwrap())
    }

    #[test]
    fn test_malformed_instance_aborts_pre_analysis_beside_ko() {
        let (_tmp, api) = create_test_api();
        api.upsert_courses(&small_week(PERIOD)).unwrap();
        // ALB 必须讲授 ALGO-CM (90 分钟), 只声明 60 分钟
        api.set_tutor_availability(DEPT, PERIOD, "ALB", &[availability("ALB", PERIOD, "mon", 480, 60)])
            .unwrap();
        api.upsert_constraint(&hard_constraint("K1", "tutor_availability", json!({"tutor": "ALB"})))
            .unwrap();
        assert_eq!(api.pre_analyze(DEPT, PERIOD).unwrap().len(), 1);

        api.upsert_constraint(&hard_constraint("K2", "tutor_availability", json!({"teacher": "BOB"})))
            .unwrap();
        let err = api.pre_analyze(DEPT, PERIOD).unwrap_err();
        assert!(
            matches!(&err, ApiError::ConstraintConfigError(msg) if msg.contains("K2")),
            "{:?}",
            err
        );

        // 求解同样在预分析阶段中止
        let err = api.solve(DEPT, PERIOD, Default::default()).unwrap_err();
        assert!(matches!(err, ApiError::ConstraintConfigError(_)), "{:?}", err);
        assert!(api.list_versions(DEPT, PERIOD).unwrap().is_empty());
    }

    #[test]
    fn test_kind_without_capabilities_gives_no_opinion() {
        let (_tmp, api) = api_with_opaque_kind();
        api.upsert_courses(&small_week(PERIOD)).unwrap();
        let major = api.solve(DEPT, PERIOD, Default::default()).unwrap().version.major;

        api.upsert_constraint(&hard_constraint("O1", OPAQUE, json!({}))).unwrap();

        assert!(api.pre_analyze(DEPT, PERIOD).unwrap().is_empty());

        let report = api
            .validate(DEPT, PERIOD, major, None, InstanceFilter::default())
            .unwrap();
        assert_eq!(report.checked_instances, 0);
        assert_eq!(report.skipped_instances, 1);
        assert!(report.is_clean());
    }

    #[test]
    fn test_hard_kind_without_model_blocks_solve() {
        let (_tmp, api) = api_with_opaque_kind();
        api.upsert_courses(&small_week(PERIOD)).unwrap();
        api.upsert_constraint(&hard_constraint("O1", OPAQUE, json!({}))).unwrap();

        let err = api.solve(DEPT, PERIOD, Default::default()).unwrap_err();
        assert!(
            matches!(&err, ApiError::ConstraintConfigError(msg) if msg.contains("O1") && msg.contains(OPAQUE)),
            "{:?}",
            err
        );
        assert!(api.list_versions(DEPT, PERIOD).unwrap().is_empty());

        // 同一种类作为软约束只会被跳过
        api.upsert_constraint(&soft_constraint("O1", OPAQUE, 1.0, json!({}))).unwrap();
        assert!(api.solve(DEPT, PERIOD, Default::default()).is_ok());
    }

    #[test]
    fn test_kind_catalogue_lists_registered_kinds() {
        let (_tmp, api) = api_with_opaque_kind();
        let kinds = api.constraint_kinds();
        assert_eq!(kinds.len(), 6);

        let opaque = kinds.iter().find(|k| k.name == OPAQUE).unwrap();
        assert_eq!(opaque.description, "");
        assert_eq!(opaque.parent, None);

        let lunch = kinds.iter().find(|k| k.name == "lunch_break").unwrap();
        assert_eq!(lunch.parent, Some("avoid_time_window"));
        assert!(!lunch.description.is_empty());
    }
}
