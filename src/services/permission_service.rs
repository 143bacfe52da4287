//! 权限解析服务
//! 跨主体持有的全部角色合并有效权限集，并提供通配段匹配的授权判定

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::audit::RequestContext;
use crate::models::role::Permission;
use crate::services::audit_service::AuditService;
use crate::store::{AuditSink, RoleAssignmentStore};

/// 主体的有效权限集：按权限标识去重的计算投影，不落库。
/// 同一请求范围内可以持有它复用，避免重复解析。
#[derive(Debug, Clone)]
pub struct EffectivePermissionSet {
    permissions: Vec<Permission>,
}

impl EffectivePermissionSet {
    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    /// 集合中是否有权限码覆盖要求的码/模式
    pub fn covers(&self, required: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| code_matches(&p.code, required))
    }
}

pub struct PermissionService<R: RoleAssignmentStore> {
    assignments: Arc<R>,
}

impl<R: RoleAssignmentStore> PermissionService<R> {
    pub fn new(assignments: Arc<R>) -> Self {
        Self { assignments }
    }

    /// 解析主体的有效权限集
    ///
    /// 一次取回活跃角色列表，每个角色一次权限取回；同一权限经多个
    /// 角色可达时只保留首次出现的一份（内容与来源角色无关）。
    /// 没有任何活跃角色的主体得到空集，不是错误。
    pub async fn resolve_effective_permissions(
        &self,
        user_id: Uuid,
    ) -> Result<EffectivePermissionSet, AppError> {
        let role_ids = self.assignments.active_roles_for_user(user_id).await?;

        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut permissions = Vec::new();
        for role_id in role_ids {
            for permission in self.assignments.permissions_for_role(role_id).await? {
                if seen.insert(permission.id) {
                    permissions.push(permission);
                }
            }
        }

        Ok(EffectivePermissionSet { permissions })
    }

    /// 判定主体是否持有覆盖 `required` 的权限
    ///
    /// 读取失败以错误传播，绝不折叠成"无权限"——调用方必须能把
    /// 检索失败与真实的拒绝区分开。
    pub async fn authorize(&self, user_id: Uuid, required: &str) -> Result<bool, AppError> {
        let effective = self.resolve_effective_permissions(user_id).await?;
        Ok(effective.covers(required))
    }

    /// 检查权限，无权限时返回 Forbidden
    ///
    /// 只做判定与日志；是否记录拒绝日志由调用方决定
    /// （见 [`enforce_permission`]）。
    pub async fn require_permission(&self, user_id: Uuid, required: &str) -> Result<(), AppError> {
        if self.authorize(user_id, required).await? {
            return Ok(());
        }

        tracing::warn!(
            user_id = %user_id,
            required = %required,
            "Permission denied"
        );
        Err(AppError::Forbidden)
    }
}

/// 权限门卫：每个特权操作的入口检查
///
/// 校验未通过时先记录一条拒绝日志（尽力而为）再返回 Forbidden，
/// 使变更在任何状态被触碰之前就被拦下。系统发起的动作
/// （`operator_id` 为空）不持有角色，不参与授权模型。
pub async fn enforce_permission<R, S>(
    permissions: &PermissionService<R>,
    audit: &AuditService<S>,
    ctx: &RequestContext,
    required: &str,
) -> Result<(), AppError>
where
    R: RoleAssignmentStore,
    S: AuditSink,
{
    let operator_id = match ctx.operator_id {
        Some(operator_id) => operator_id,
        None => return Ok(()),
    };

    if permissions.authorize(operator_id, required).await? {
        return Ok(());
    }

    audit
        .record_denial(ctx, required, "permission not granted")
        .await;

    tracing::warn!(
        user_id = %operator_id,
        required = %required,
        "Permission denied"
    );
    Err(AppError::Forbidden)
}

/// 判定持有的权限码是否覆盖要求的码/模式
///
/// 完全相等总是匹配；不含通配段的模式只接受完全相等；含 `*` 段的
/// 模式按 `.` 分段比较：段数必须相等，模式中的 `*` 恰好匹配一段
/// （不跨段），其余段逐字符区分大小写比较。
pub fn code_matches(held: &str, required: &str) -> bool {
    if held == required {
        return true;
    }

    if !required.split('.').any(|segment| segment == "*") {
        return false;
    }

    let held_segments: Vec<&str> = held.split('.').collect();
    let required_segments: Vec<&str> = required.split('.').collect();
    if held_segments.len() != required_segments.len() {
        return false;
    }

    held_segments
        .iter()
        .zip(required_segments.iter())
        .all(|(held_segment, pattern_segment)| {
            *pattern_segment == "*" || held_segment == pattern_segment
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(code_matches("serviceOrder.buyback.read", "serviceOrder.buyback.read"));
        assert!(code_matches("user.create", "user.create"));
        assert!(!code_matches("user.create", "user.delete"));
    }

    #[test]
    fn test_wildcard_matches_exactly_one_segment() {
        assert!(code_matches("serviceOrder.buyback.read", "serviceOrder.*.read"));
        assert!(code_matches("serviceOrder.consignment.read", "serviceOrder.*.read"));

        // 段数必须相等：通配符不跨段
        assert!(!code_matches("serviceOrder.buyback.read.extra", "serviceOrder.*.read"));
        assert!(!code_matches("serviceOrder.read", "serviceOrder.*.read"));
    }

    #[test]
    fn test_pattern_without_wildcard_requires_equality() {
        // 含 `*` 字符但不构成通配段的模式只接受完全相等
        assert!(!code_matches("user.abc", "user.a*c"));
        assert!(code_matches("user.a*c", "user.a*c"));
    }

    #[test]
    fn test_multiple_wildcards() {
        assert!(code_matches("serviceOrder.buyback.read", "*.*.read"));
        assert!(code_matches("serviceOrder.buyback.read", "*.*.*"));
        assert!(!code_matches("serviceOrder.buyback", "*.*.*"));
    }

    #[test]
    fn test_case_sensitive() {
        assert!(!code_matches("ServiceOrder.buyback.read", "serviceOrder.*.read"));
        assert!(!code_matches("user.Create", "user.create"));
    }

    #[test]
    fn test_held_wildcard_is_literal() {
        // 通配符只在要求的模式中生效，持有码中的 `*` 是普通字符
        assert!(!code_matches("user.*", "user.read"));
        assert!(code_matches("user.*", "user.*"));
    }
}
