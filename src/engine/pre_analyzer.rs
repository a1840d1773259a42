// ==========================================
// 排课引擎 - 可行性预分析
// ==========================================
// 职责: 求解前对全部在用硬约束运行免求解器检查
// 语义: 穷尽收集, 不在第一个 KO 处停止; 只返回 KO 报告
// 结论: 结果为空只说明没有单个实例能证明不可行, 不保证有解
// ==========================================

use crate::constraints::{Capability, ConstraintRegistry};
use crate::domain::constraint::InstanceFilter;
use crate::domain::report::FeasibilityReport;
use crate::domain::scope::SchedulingScope;
use crate::engine::context::{ScopeData, ScopeLoader};
use crate::engine::error::EngineResult;
use crate::repository::constraint_repo::ConstraintRepository;
use std::sync::Arc;
use tracing::instrument;

pub struct PreAnalyzer {
    registry: Arc<ConstraintRegistry>,
    constraint_repo: Arc<ConstraintRepository>,
    loader: Arc<ScopeLoader>,
}

impl PreAnalyzer {
    pub fn new(
        registry: Arc<ConstraintRegistry>,
        constraint_repo: Arc<ConstraintRepository>,
        loader: Arc<ScopeLoader>,
    ) -> Self {
        Self {
            registry,
            constraint_repo,
            loader,
        }
    }

    /// 预分析排课范围
    ///
    /// # 返回
    /// - `Ok(reports)`: 全部 KO 报告 (按 constraint_id 排序)
    /// - `Err(ScopeNotFound)`: 范围内没有课程
    /// - `Err(MalformedConstraint)`: 任一实例参数畸形, 整个预分析中止
    #[instrument(skip(self), fields(scope = %scope))]
    pub fn pre_analyze(&self, scope: &SchedulingScope) -> EngineResult<Vec<FeasibilityReport>> {
        let data = self.loader.load_required(scope)?;
        self.pre_analyze_data(&data)
    }

    /// 基于已加载的范围快照预分析 (求解编排复用同一快照)
    pub fn pre_analyze_data(&self, data: &ScopeData) -> EngineResult<Vec<FeasibilityReport>> {
        let filter = InstanceFilter::hard_active();
        let active = self
            .registry
            .active_instances(&self.constraint_repo, &data.scope, filter)?;

        for orphan in self
            .registry
            .unregistered_instances(&self.constraint_repo, &data.scope, filter)?
        {
            tracing::warn!(
                constraint_id = %orphan.constraint_id,
                kind = %orphan.kind,
                "约束种类未注册, 预分析跳过"
            );
        }

        let mut reports = Vec::new();
        let mut no_opinion = 0usize;
        for item in &active {
            match item.kind.pre_analyse(&item.instance, data) {
                Capability::Unsupported => no_opinion += 1,
                Capability::Supported(result) => {
                    let report = result?;
                    if !report.is_ok() {
                        tracing::info!(
                            constraint_id = %item.instance.constraint_id,
                            kind = item.kind.name(),
                            messages = ?report.messages,
                            "预分析发现不可行"
                        );
                        reports.push(report.from_constraint(&item.instance.constraint_id));
                    }
                }
            }
        }

        reports.sort_by(|a, b| a.constraint_id.cmp(&b.constraint_id));
        tracing::info!(
            scope = %data.scope,
            instances = active.len(),
            no_opinion,
            ko = reports.len(),
            "预分析完成"
        );
        Ok(reports)
    }
}
