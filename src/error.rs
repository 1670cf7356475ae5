//! 规则引擎错误类型

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则定义无效: {0}")]
    InvalidRule(String),

    #[error("表达式解析失败: {0}")]
    ParseError(String),

    #[error("表达式编译失败: {0}")]
    CompileError(String),

    #[error("规则编译失败:\n{0}")]
    CompileFailed(CompileErrors),

    #[error("规则未找到: {0}")]
    RuleNotFound(String),

    #[error("诊断未启用: 引擎构造时未开启 collect_diagnostics")]
    DiagnosticsDisabled,

    #[error("规则 '{rule_id}' 执行失败: {detail}")]
    ExecutionFailed { rule_id: String, detail: String },

    #[error("表达式执行失败: {0}")]
    ExecutionError(String),

    #[error("类型不匹配: 期望 {expected}, 实际 {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RuleError>;

/// 单个节点的编译失败记录
#[derive(Debug, Clone)]
pub struct CompileFailure {
    /// 失败节点的规则 ID
    pub rule_id: String,
    /// 节点在规则树中的位置（根 ID 起，子键逐级用 '/' 相连）
    pub path: String,
    /// 失败原因，表达式错误携带 行:列 位置
    pub detail: String,
}

impl fmt::Display for CompileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "规则 '{}' ({}): {}", self.rule_id, self.path, self.detail)
    }
}

/// 一次规则树编译收集到的全部失败节点
///
/// 编译在遇到错误后继续遍历剩余节点，尽可能一次报告所有问题。
#[derive(Debug, Clone, Default)]
pub struct CompileErrors {
    pub failures: Vec<CompileFailure>,
}

impl CompileErrors {
    pub fn push(&mut self, rule_id: impl Into<String>, path: impl Into<String>, detail: impl Into<String>) {
        self.failures.push(CompileFailure {
            rule_id: rule_id.into(),
            path: path.into(),
            detail: detail.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// 合并另一批失败记录（批量加载时跨树聚合）
    pub fn extend(&mut self, other: CompileErrors) {
        self.failures.extend(other.failures);
    }
}

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_errors_display_lists_every_node() {
        let mut errors = CompileErrors::default();
        errors.push("honors_student", "student_actions/a", "1:13: 运算符 '!=' 不支持 (float, string)");
        errors.push("at_risk", "student_actions/b", "1:40: 运算符 '>' 不支持 (string, float)");

        let text = errors.to_string();
        assert!(text.contains("honors_student"));
        assert!(text.contains("at_risk"));
        assert!(text.contains("1:13"));
        assert!(text.contains("1:40"));
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_error_display() {
        let err = RuleError::RuleNotFound("missing".to_string());
        assert!(err.to_string().contains("missing"));

        let err = RuleError::TypeMismatch {
            expected: "bool".to_string(),
            actual: "float".to_string(),
        };
        assert!(err.to_string().contains("bool"));
        assert!(err.to_string().contains("float"));
    }
}
