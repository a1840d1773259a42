// ==========================================
// 排课引擎 - 范围级求解锁
// ==========================================
// 约束: 每个 (department, period) 同一时刻至多一个求解在途
// 策略: queue = true 时等待前一个求解结束; 否则立即报 ConcurrentSolveConflict
// 守卫: ScopeLockGuard 析构时释放并唤醒等待者
// ==========================================

use crate::domain::scope::SchedulingScope;
use crate::engine::error::{EngineError, EngineResult};
use std::collections::HashSet;
use std::sync::{Condvar, Mutex};

#[derive(Debug, Default)]
pub struct ScopeLocks {
    in_flight: Mutex<HashSet<SchedulingScope>>,
    released: Condvar,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取范围锁
    pub fn acquire(&self, scope: &SchedulingScope, queue: bool) -> EngineResult<ScopeLockGuard<'_>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|e| EngineError::Internal(format!("范围锁中毒: {}", e)))?;

        while in_flight.contains(scope) {
            if !queue {
                return Err(EngineError::ConcurrentSolveConflict {
                    scope: scope.clone(),
                });
            }
            tracing::debug!(scope = %scope, "范围正在求解, 排队等待");
            in_flight = self
                .released
                .wait(in_flight)
                .map_err(|e| EngineError::Internal(format!("范围锁中毒: {}", e)))?;
        }

        in_flight.insert(scope.clone());
        Ok(ScopeLockGuard {
            locks: self,
            scope: scope.clone(),
        })
    }

    pub fn is_locked(&self, scope: &SchedulingScope) -> bool {
        self.in_flight
            .lock()
            .map(|set| set.contains(scope))
            .unwrap_or(false)
    }
}

/// 范围锁守卫
pub struct ScopeLockGuard<'a> {
    locks: &'a ScopeLocks,
    scope: SchedulingScope,
}

impl Drop for ScopeLockGuard<'_> {
    fn drop(&mut self) {
        match self.locks.in_flight.lock() {
            Ok(mut set) => {
                set.remove(&self.scope);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(&self.scope);
            }
        }
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_reject_when_not_queueing() {
        let locks = ScopeLocks::new();
        let scope = SchedulingScope::new("INFO", "W10");
        let guard = locks.acquire(&scope, false).unwrap();
        assert!(locks.is_locked(&scope));
        assert!(matches!(
            locks.acquire(&scope, false),
            Err(EngineError::ConcurrentSolveConflict { .. })
        ));
        // 其他范围不受影响
        assert!(locks.acquire(&scope.with_period("W11"), false).is_ok());
        drop(guard);
        assert!(!locks.is_locked(&scope));
        assert!(locks.acquire(&scope, false).is_ok());
    }

    #[test]
    fn test_queueing_waits_for_release() {
        let locks = Arc::new(ScopeLocks::new());
        let scope = SchedulingScope::new("INFO", "W10");
        let guard = locks.acquire(&scope, true).unwrap();

        let waiter = {
            let locks = Arc::clone(&locks);
            let scope = scope.clone();
            thread::spawn(move || locks.acquire(&scope, true).map(|_| ()).is_ok())
        };

        thread::sleep(Duration::from_millis(50));
        drop(guard);
        assert!(waiter.join().unwrap());
    }
}
