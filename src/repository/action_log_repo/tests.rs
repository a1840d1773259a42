use super::ActionLogRepository;
use crate::db::open_in_memory_shared;
use crate::domain::action_log::ActionLog;
use crate::domain::scope::SchedulingScope;
use crate::domain::types::VersionActionType;
use serde_json::json;

fn make_test_log(scope: &SchedulingScope, action_type: VersionActionType) -> ActionLog {
    ActionLog::now(scope, action_type, Some(json!({"major": 1})), "测试日志")
}

#[test]
fn test_insert_and_find_by_id() {
    let repo = ActionLogRepository::new(open_in_memory_shared().unwrap());
    let scope = SchedulingScope::new("INFO", "W10");

    let log = make_test_log(&scope, VersionActionType::Promote);
    let action_id = repo.insert(&log).unwrap();

    let found = repo.find_by_id(&action_id).unwrap().unwrap();
    assert_eq!(found.department, "INFO");
    assert_eq!(found.action_type, "PROMOTE");
    assert_eq!(found.payload_json, Some(json!({"major": 1})));
    assert!(repo.find_by_id("missing").unwrap().is_none());
}

#[test]
fn test_find_by_scope_and_count() {
    let repo = ActionLogRepository::new(open_in_memory_shared().unwrap());
    let w10 = SchedulingScope::new("INFO", "W10");
    let w11 = SchedulingScope::new("INFO", "W11");

    repo.insert(&make_test_log(&w10, VersionActionType::Solve)).unwrap();
    repo.insert(&make_test_log(&w10, VersionActionType::Swap)).unwrap();
    repo.insert(&make_test_log(&w11, VersionActionType::Solve)).unwrap();

    let logs = repo.find_by_scope(&w10).unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].action_type, "SOLVE");
    assert_eq!(logs[1].action_type, "SWAP");
    assert_eq!(repo.count_by_scope(&w11).unwrap(), 1);
    assert_eq!(repo.find_by_action_type("SOLVE", 10).unwrap().len(), 2);
}
