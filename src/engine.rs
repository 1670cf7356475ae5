//! 规则引擎
//!
//! 持有顶层规则树集合：加入时整树深度优先编译并聚合全部失败，
//! 评估时按子节点声明顺序递归求值，支持短路选项与诊断收集。
//! 引擎是被动的线程安全对象，可被多个调用方并发加入和评估。

use crate::error::{CompileErrors, Result, RuleError};
use crate::evaluator::Evaluator;
use crate::models::{EvalOptions, EvaluationResult, Rule};
use crate::value::{DataSet, Value};
use dashmap::DashMap;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 引擎构造期配置，构造后不可变
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOptions {
    /// 编译期启用诊断插桩；未启用时评估请求诊断恒为错误
    pub collect_diagnostics: bool,
    /// 诊断扩展到所有带表达式的节点，而非仅叶子节点
    pub force_diagnostics_all_rules: bool,
}

/// 单次评估调用的选项
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalParams {
    /// 在结果树中返回诊断追踪
    pub return_diagnostics: bool,
}

impl EvalParams {
    pub fn with_diagnostics() -> Self {
        Self {
            return_diagnostics: true,
        }
    }
}

/// 单个节点的编译产物，引擎独占持有，加入后不可变
struct CompiledNode<P> {
    id: String,
    program: Option<P>,
    self_value: Option<Value>,
    options: EvalOptions,
    meta: serde_json::Value,
    children: IndexMap<String, CompiledNode<P>>,
}

/// 规则引擎
///
/// 评估器在构造时注入。同一顶层 ID 的重复加入重新编译并整树原子
/// 替换：在途评估始终看到完整一致的旧树或新树，绝不会看到半替换
/// 状态。不同顶层 ID 的加入与评估互不干扰。
pub struct Engine<E: Evaluator> {
    evaluator: E,
    options: EngineOptions,
    /// 顶层规则 ID -> 编译后的规则树
    rules: DashMap<String, Arc<CompiledNode<E::Program>>>,
}

impl<E: Evaluator> Engine<E> {
    pub fn new(evaluator: E) -> Self {
        Self::with_options(evaluator, EngineOptions::default())
    }

    pub fn with_options(evaluator: E, options: EngineOptions) -> Self {
        Self {
            evaluator,
            options,
            rules: DashMap::new(),
        }
    }

    /// 加入（或替换）一棵顶层规则树
    ///
    /// 深度优先编译每个带表达式的节点，遇到错误继续遍历，最终把
    /// 所有失败节点聚合成一个错误返回；任何节点失败时整棵树都不会
    /// 安装，同 ID 下已有的旧树保持原样可评估。成功返回后新树立即
    /// 对并发评估可见。
    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub fn add_rule(&self, rule: Rule) -> Result<()> {
        let mut errors = CompileErrors::default();
        let compiled = self.compile_node(&rule, &rule.id, &mut errors);
        if !errors.is_empty() {
            warn!(failures = errors.len(), "规则编译失败");
            return Err(RuleError::CompileFailed(errors));
        }

        let id = rule.id.clone();
        self.rules.insert(id.clone(), Arc::new(compiled));
        info!("规则已加入: {}", id);
        Ok(())
    }

    /// 批量加入规则树
    ///
    /// 每棵树独立编译安装（单树原子性不变），失败的树跨树聚合成
    /// 一个错误返回，编译通过的树照常安装。
    pub fn add_rules(&self, rules: Vec<Rule>) -> Result<()> {
        let mut all = CompileErrors::default();
        let mut loaded = 0usize;

        for rule in rules {
            match self.add_rule(rule) {
                Ok(()) => loaded += 1,
                Err(RuleError::CompileFailed(errors)) => all.extend(errors),
                Err(e) => return Err(e),
            }
        }

        info!(loaded, failures = all.len(), "批量加入完成");
        if all.is_empty() {
            Ok(())
        } else {
            Err(RuleError::CompileFailed(all))
        }
    }

    /// 从 JSON 文档加入规则树，返回顶层 ID
    pub fn add_rule_json(&self, json: &str) -> Result<String> {
        let rule = Rule::from_json(json)?;
        let id = rule.id.clone();
        self.add_rule(rule)?;
        Ok(id)
    }

    /// 移除一棵顶层规则树及其全部编译产物
    #[instrument(skip(self))]
    pub fn remove_rule(&self, rule_id: &str) -> Result<()> {
        if self.rules.remove(rule_id).is_some() {
            info!("规则已移除: {}", rule_id);
            Ok(())
        } else {
            warn!("移除不存在的规则: {}", rule_id);
            Err(RuleError::RuleNotFound(rule_id.to_string()))
        }
    }

    pub fn contains(&self, rule_id: &str) -> bool {
        self.rules.contains_key(rule_id)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule_ids(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.key().clone()).collect()
    }

    /// 评估一棵顶层规则树（默认调用选项）
    pub fn evaluate(&self, data: &DataSet, rule_id: &str) -> Result<EvaluationResult> {
        self.evaluate_with(data, rule_id, EvalParams::default())
    }

    /// 评估一棵顶层规则树
    ///
    /// 自根节点起深度优先、按子节点声明顺序递归求值，产出与实际
    /// 评估节点同构的结果树。任一节点的运行期错误中止整个调用。
    pub fn evaluate_with(
        &self,
        data: &DataSet,
        rule_id: &str,
        params: EvalParams,
    ) -> Result<EvaluationResult> {
        if params.return_diagnostics && !self.options.collect_diagnostics {
            return Err(RuleError::DiagnosticsDisabled);
        }

        // 克隆 Arc 后立即释放分片锁：遍历期间同 ID 的替换不受阻塞，
        // 本次评估继续持有替换前的完整快照
        let tree = self
            .rules
            .get(rule_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RuleError::RuleNotFound(rule_id.to_string()))?;

        let result = self.eval_node(&tree, data, &params)?;
        debug!(
            rule_id,
            rules_evaluated = result.rules_evaluated,
            pass = result.pass,
            "评估完成"
        );
        Ok(result)
    }

    /// 深度优先编译一个节点及其子树，失败记入 errors 后继续
    fn compile_node(
        &self,
        rule: &Rule,
        path: &str,
        errors: &mut CompileErrors,
    ) -> CompiledNode<E::Program> {
        if rule.id.is_empty() {
            errors.push("<未命名>", path, "规则 ID 不能为空");
        }
        if rule.options.stop_first_positive_child && rule.options.stop_first_negative_child {
            errors.push(
                &rule.id,
                path,
                "stop_first_positive_child 与 stop_first_negative_child 不能同时设置",
            );
        }

        let expr = rule.expr.as_deref().map(str::trim).filter(|e| !e.is_empty());
        let program = match expr {
            None => None,
            Some(expr) => match &rule.schema {
                None => {
                    errors.push(&rule.id, path, "带表达式的节点必须声明模式");
                    None
                }
                Some(schema) => match self.evaluator.compile(
                    expr,
                    schema,
                    rule.result_type.as_ref(),
                    self.options.collect_diagnostics,
                ) {
                    Ok(program) => Some(program),
                    Err(e) => {
                        errors.push(&rule.id, path, e.to_string());
                        None
                    }
                },
            },
        };

        let mut children = IndexMap::with_capacity(rule.rules.len());
        for (key, child) in &rule.rules {
            if key.is_empty() {
                errors.push(&child.id, path, "子键不能为空");
            }
            let child_path = format!("{}/{}", path, key);
            let compiled = self.compile_node(child, &child_path, errors);
            children.insert(key.clone(), compiled);
        }

        CompiledNode {
            id: rule.id.clone(),
            program,
            self_value: rule.self_value.clone(),
            options: rule.options,
            meta: rule.meta.clone(),
            children,
        }
    }

    fn eval_node(
        &self,
        node: &CompiledNode<E::Program>,
        data: &DataSet,
        params: &EvalParams,
    ) -> Result<EvaluationResult> {
        let mut result = EvaluationResult::new(node.id.clone(), node.meta.clone());

        if let Some(program) = &node.program {
            let evaluated = self
                .evaluator
                .evaluate(
                    program,
                    data,
                    node.self_value.as_ref(),
                    params.return_diagnostics,
                )
                .map_err(|e| RuleError::ExecutionFailed {
                    rule_id: node.id.clone(),
                    detail: e.to_string(),
                })?;

            // 布尔结果驱动通过与否；其余类型只携带值
            result.pass = !matches!(evaluated.value, Value::Bool(false));

            let leaf = node.children.is_empty();
            if self.options.collect_diagnostics
                && params.return_diagnostics
                && (leaf || self.options.force_diagnostics_all_rules)
            {
                result.diagnostics = evaluated.diagnostics;
            }
            result.value = Some(evaluated.value);
        }

        for (key, child) in &node.children {
            let child_result = self.eval_node(child, data, params)?;
            let child_pass = child_result.pass;
            result.rules_evaluated += child_result.rules_evaluated;
            result.results.insert(key.clone(), child_result);

            // 停止条件只看本节点自己的选项，不跨层继承
            if node.options.stop_first_positive_child && child_pass {
                break;
            }
            if node.options.stop_first_negative_child && !child_pass {
                break;
            }
        }

        Ok(result)
    }
}
