//! 规则树与评估结果模型
//!
//! 规则是一棵嵌套的树：每个节点可携带一条针对声明模式的类型化
//! 表达式，子规则按插入顺序保存（评估顺序与短路语义依赖该顺序）。
//! 评估结果树与被评估的规则子树一一对应。

use crate::error::Result;
use crate::schema::{Schema, ValueType};
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// 规则树节点
///
/// 无表达式的节点是纯分组节点：自身 Pass 恒为 true、Value 为空，
/// 但子规则照常评估。子键在同一父节点内唯一，节点自身的 ID 不必
/// 与其在父节点中的存储键一致；ID 用于顶层寻址与诊断报告。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    /// 表达式文本；存在时节点必须能看到一个模式
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<String>,
    /// 表达式可见的变量声明，仅编译期使用，不会自动继承
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
    /// 声明的结果类型；缺省时使用编译推导出的自然类型
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_type: Option<ValueType>,
    /// 绑定上下文值，表达式内以保留名 `self` 可见；仅程序化构建时设置
    #[serde(skip)]
    pub self_value: Option<Value>,
    /// 本节点的局部评估选项，只约束直接子节点的遍历
    #[serde(default)]
    pub options: EvalOptions,
    /// 子键 -> 子规则，插入顺序即评估顺序
    #[serde(default)]
    pub rules: IndexMap<String, Rule>,
    /// 不透明元数据，原样带入结果树
    #[serde(default)]
    pub meta: serde_json::Value,
}

impl Rule {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// 从 JSON 文档解析规则树
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_expr(mut self, expr: impl Into<String>) -> Self {
        self.expr = Some(expr.into());
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_result_type(mut self, result_type: ValueType) -> Self {
        self.result_type = Some(result_type);
        self
    }

    pub fn with_self_value(mut self, value: impl Into<Value>) -> Self {
        self.self_value = Some(value.into());
        self
    }

    pub fn with_options(mut self, options: EvalOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = meta;
        self
    }

    /// 追加子规则，以子规则自身的 ID 作为子键
    pub fn add_child(mut self, child: Rule) -> Self {
        self.rules.insert(child.id.clone(), child);
        self
    }

    /// 以显式子键追加子规则
    pub fn insert_child(&mut self, key: impl Into<String>, child: Rule) {
        self.rules.insert(key.into(), child);
    }

    /// 子树节点总数（含自身）
    pub fn node_count(&self) -> usize {
        1 + self.rules.values().map(Rule::node_count).sum::<usize>()
    }
}

/// 节点局部评估选项
///
/// 两个停止条件互斥，同一节点最多设置一个，加入规则时校验。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalOptions {
    /// 某个直接子节点 Pass == true 后跳过其余兄弟节点
    pub stop_first_positive_child: bool,
    /// 某个直接子节点 Pass == false 后跳过其余兄弟节点
    pub stop_first_negative_child: bool,
}

impl EvalOptions {
    pub fn stop_on_first_positive() -> Self {
        Self {
            stop_first_positive_child: true,
            ..Default::default()
        }
    }

    pub fn stop_on_first_negative() -> Self {
        Self {
            stop_first_negative_child: true,
            ..Default::default()
        }
    }
}

/// 评估结果树，与被评估的规则子树同构
///
/// 被短路跳过的子节点不出现在 `results` 中，也不计入
/// `rules_evaluated`。
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub rule_id: String,
    /// 布尔表达式结果驱动通过与否；非布尔结果只携带值，pass 为 true；
    /// 无表达式的分组节点 pass 恒为 true，子结果由调用方自行解读
    pub pass: bool,
    /// 表达式的类型化结果，无表达式的节点为 None
    pub value: Option<Value>,
    /// 从规则原样复制的元数据
    pub meta: serde_json::Value,
    /// 子键 -> 子结果，键与顺序和实际评估过的子规则一致
    pub results: IndexMap<String, EvaluationResult>,
    /// 本子树实际评估的节点数，含自身
    pub rules_evaluated: usize,
    /// 评估追踪文本，仅在编译期插桩且本次调用请求诊断时存在
    pub diagnostics: Option<String>,
}

impl EvaluationResult {
    pub(crate) fn new(rule_id: String, meta: serde_json::Value) -> Self {
        Self {
            rule_id,
            pass: true,
            value: None,
            meta,
            results: IndexMap::new(),
            rules_evaluated: 1,
            diagnostics: None,
        }
    }

    /// 按子键访问子结果
    pub fn child(&self, key: &str) -> Option<&EvaluationResult> {
        self.results.get(key)
    }
}
